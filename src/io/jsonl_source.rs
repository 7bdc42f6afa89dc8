//! Streaming catalogue reader over JSON-lines files.
//!
//! Each non-empty line is a JSON object mapping column name to a number. When a
//! group name is configured, the columns live in a nested object under that key
//! (`{"photometry": {"mag_i": 22.1, ...}, ...}`). Rows are read lazily and only
//! in ascending order, so memory use is bounded by the chunk size.

use crate::data::Table;
use crate::error::StageError;
use crate::io::InputSource;
use anyhow::{Context, Result};
use ndarray::Array2;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};

/// Sequential JSON-lines table source.
pub struct JsonLinesSource {
    path: PathBuf,
    groupname: Option<String>,
    columns: Vec<String>,
    total_len: usize,
    lines: Lines<BufReader<File>>,
    /// Next row index the reader will yield.
    cursor: usize,
}

impl JsonLinesSource {
    /// Open a file, counting its rows and taking the column set from the first row.
    pub async fn open(path: impl AsRef<Path>, groupname: Option<String>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let mut total_len = 0;
        let mut columns = Vec::new();
        {
            let file = File::open(&path)
                .await
                .with_context(|| format!("Failed to open {}", path.display()))?;
            let mut lines = BufReader::new(file).lines();
            while let Some(line) = lines.next_line().await? {
                if line.trim().is_empty() {
                    continue;
                }
                if total_len == 0 {
                    let row = parse_row(&line, groupname.as_deref(), 0)?;
                    columns = row.keys().cloned().collect();
                }
                total_len += 1;
            }
        }

        let file = File::open(&path).await?;
        tracing::debug!(
            "Opened {} ({} rows, {} columns)",
            path.display(),
            total_len,
            columns.len()
        );

        Ok(Self {
            path,
            groupname,
            columns,
            total_len,
            lines: BufReader::new(file).lines(),
            cursor: 0,
        })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl InputSource for JsonLinesSource {
    type Data = Table;

    fn total_len(&self) -> usize {
        self.total_len
    }

    async fn read_range(&mut self, start: usize, end: usize) -> Result<Table> {
        if start != self.cursor {
            return Err(StageError::NonSequentialRead {
                expected: self.cursor,
                got: start,
            }
            .into());
        }
        if end < start || end > self.total_len {
            anyhow::bail!(
                "Range [{}, {}) out of bounds for {} with {} rows",
                start,
                end,
                self.path.display(),
                self.total_len
            );
        }

        let mut data = Array2::<f64>::zeros((end - start, self.columns.len()));
        let mut i = 0;
        while i < end - start {
            let line = self.lines.next_line().await?.with_context(|| {
                format!("{} ended early at row {}", self.path.display(), start + i)
            })?;
            if line.trim().is_empty() {
                continue;
            }
            let row = parse_row(&line, self.groupname.as_deref(), start + i)?;
            for (j, name) in self.columns.iter().enumerate() {
                data[[i, j]] = match row.get(name) {
                    Some(Value::Null) => f64::NAN,
                    Some(v) => v.as_f64().with_context(|| {
                        format!("Row {} column '{}' is not numeric", start + i, name)
                    })?,
                    None => anyhow::bail!("Row {} is missing column '{}'", start + i, name),
                };
            }
            i += 1;
        }

        self.cursor = end;
        Table::new(self.columns.clone(), data)
    }

    fn describe(&self) -> String {
        match &self.groupname {
            Some(group) => format!("{}:{} ({} rows)", self.path.display(), group, self.total_len),
            None => format!("{} ({} rows)", self.path.display(), self.total_len),
        }
    }
}

fn parse_row(line: &str, groupname: Option<&str>, index: usize) -> Result<Map<String, Value>> {
    let value: Value =
        serde_json::from_str(line).with_context(|| format!("Row {} is not valid JSON", index))?;
    let value = match groupname {
        Some(group) => value
            .get(group)
            .cloned()
            .with_context(|| format!("Row {} has no group '{}'", index, group))?,
        None => value,
    };
    match value {
        Value::Object(map) => Ok(map),
        _ => anyhow::bail!("Row {} is not a JSON object", index),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_lines(lines: &[&str]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        for line in lines {
            writeln!(file, "{}", line).unwrap();
        }
        file
    }

    #[tokio::test]
    async fn test_sequential_reads() {
        let file = write_lines(&[
            r#"{"mag_i": 20.0, "z": 0.1}"#,
            r#"{"mag_i": 21.0, "z": 0.2}"#,
            "",
            r#"{"mag_i": 22.0, "z": null}"#,
        ]);
        let mut source = JsonLinesSource::open(file.path(), None).await.unwrap();
        assert_eq!(source.total_len(), 3);
        assert_eq!(source.columns(), &["mag_i".to_string(), "z".to_string()]);

        let first = source.read_range(0, 2).await.unwrap();
        assert_eq!(first.column("mag_i").unwrap().to_vec(), vec![20.0, 21.0]);

        let second = source.read_range(2, 3).await.unwrap();
        assert!(second.column("z").unwrap()[0].is_nan());
    }

    #[tokio::test]
    async fn test_groupname_selects_nested_object() {
        let file = write_lines(&[
            r#"{"id": 1, "photometry": {"mag_r": 20.5}}"#,
            r#"{"id": 2, "photometry": {"mag_r": 21.5}}"#,
        ]);
        let mut source = JsonLinesSource::open(file.path(), Some("photometry".to_string()))
            .await
            .unwrap();
        assert_eq!(source.columns(), &["mag_r".to_string()]);
        let rows = source.read_range(0, 2).await.unwrap();
        assert_eq!(rows.column("mag_r").unwrap().to_vec(), vec![20.5, 21.5]);
        assert!(source.describe().contains(":photometry"));
    }

    #[tokio::test]
    async fn test_out_of_order_read_rejected() {
        let file = write_lines(&[r#"{"a": 1}"#, r#"{"a": 2}"#, r#"{"a": 3}"#]);
        let mut source = JsonLinesSource::open(file.path(), None).await.unwrap();
        let err = source.read_range(1, 2).await.unwrap_err();
        assert_eq!(
            err.downcast_ref::<StageError>(),
            Some(&StageError::NonSequentialRead { expected: 0, got: 1 })
        );
    }

    #[tokio::test]
    async fn test_missing_column_is_error() {
        let file = write_lines(&[r#"{"a": 1, "b": 2}"#, r#"{"a": 3}"#]);
        let mut source = JsonLinesSource::open(file.path(), None).await.unwrap();
        assert!(source.read_range(0, 2).await.is_err());
    }

    #[tokio::test]
    async fn test_empty_file() {
        let file = write_lines(&[]);
        let source = JsonLinesSource::open(file.path(), None).await.unwrap();
        assert_eq!(source.total_len(), 0);
        assert!(source.columns().is_empty());
    }
}
