//! Tomographic bin classification CLI
//!
//! Inspects configurations, inputs and class-id outputs of classification stages.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tomo_classify::{
    build_runtime, read_class_file, ChunkRanges, ClassAssignment, Config, InputSource,
    JsonLinesSource, UNASSIGNED,
};

#[derive(Parser)]
#[command(name = "tomo-classify")]
#[command(about = "Chunked tomographic bin classification", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.yaml", global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate configuration
    Validate,

    /// Generate a sample configuration file
    GenerateConfig {
        /// Output path for configuration file
        #[arg(short, long, default_value = "config.yaml")]
        output: PathBuf,
    },

    /// Show how a JSON-lines catalogue would be split into chunks
    Plan {
        /// Catalogue to plan
        input: PathBuf,

        /// Override the configured chunk size
        #[arg(long)]
        chunk_size: Option<usize>,
    },

    /// Summarize a class-id output file
    Inspect {
        /// Output file written by a stage
        path: PathBuf,
    },
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Validate => validate_command(cli.config)?,
        Commands::GenerateConfig { output } => generate_config_command(output)?,
        Commands::Plan { input, chunk_size } => plan_command(cli.config, input, chunk_size)?,
        Commands::Inspect { path } => inspect_command(path)?,
    }

    Ok(())
}

fn validate_command(config_path: PathBuf) -> Result<()> {
    let config = Config::from_file(&config_path)?;
    config.validate()?;
    println!("Configuration is valid");
    println!(
        "Stage '{}' writes to {}",
        config.stage.name,
        config.output.resolve_path(&config.stage.name).display()
    );
    Ok(())
}

fn plan_command(config_path: PathBuf, input: PathBuf, chunk_size: Option<usize>) -> Result<()> {
    let mut config = Config::from_file(&config_path)?;
    if let Some(c) = chunk_size {
        config.stage.chunk_size = c;
    }
    config.validate()?;
    let chunk_size = config.stage.chunk_size()?;

    let runtime = build_runtime(Some(1))?;
    let source = runtime.block_on(JsonLinesSource::open(&input, config.stage.groupname.clone()))?;
    let total_len = source.total_len();

    println!("\n=== Chunk Plan ===");
    println!("Input: {}", source.describe());
    println!("Columns: {}", source.columns().join(", "));
    println!("Chunk size: {}", chunk_size);
    println!("Chunks: {}", ChunkRanges::num_chunks(total_len, chunk_size));
    for (i, range) in ChunkRanges::new(total_len, chunk_size).enumerate() {
        println!("  {:>4}: [{}, {})", i, range.start, range.end);
    }
    println!(
        "Output: {}",
        config.output.resolve_path(&config.stage.name).display()
    );
    println!("==================\n");

    Ok(())
}

fn inspect_command(path: PathBuf) -> Result<()> {
    let runtime = build_runtime(Some(1))?;
    let (metadata, class_id) = runtime.block_on(read_class_file(&path))?;

    println!("\n=== {} ===", path.display());
    println!("Stage: {}", metadata.stage);
    println!("Rows: {}", metadata.total_len);
    println!("Dtype: {}", metadata.dtype);
    println!("Writers: {}", metadata.num_writers);

    println!("\n=== Class Counts ===");
    for (class, count) in ClassAssignment::from(class_id).counts() {
        let label = if class == UNASSIGNED {
            "unassigned".to_string()
        } else {
            class.to_string()
        };
        println!("  {:>10}: {}", label, count);
    }
    println!("====================\n");

    Ok(())
}

fn generate_config_command(output: PathBuf) -> Result<()> {
    // Generate a commented YAML config
    let yaml = r#"# Tomographic Bin Classification Configuration

# === STAGE: What is classified and how ===
stage:
  # Stage name, used in logs and the default output file name
  name: "tomo_bins"

  # Rows per chunk; bounds peak memory use
  chunk_size: 10000

  # Nested object holding the input columns in each catalogue row (optional)
  # groupname: "photometry"

  # Pre-trained model file; "None" or omitted for no model
  # model: "/models/tomo_bins.json"

# === OUTPUT: Where class ids are written ===
output:
  # Directory for output_<stage name>.bin
  output_dir: "."

  # Explicit output file, overriding output_dir
  # path: "/data/run1/tomo_bins.bin"

# === PROCESSING ===
processing:
  # Log a metrics summary after each run
  enable_metrics: true

  # Save metrics JSON after the run (optional)
  # metrics_output_path: "metrics.json"
"#;

    std::fs::write(&output, yaml)?;
    println!("Generated sample configuration at: {}", output.display());

    Ok(())
}
