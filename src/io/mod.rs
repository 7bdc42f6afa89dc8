//! Input sources, output handles and the communicator passed between them.

mod class_writer;
mod comm;
mod jsonl_source;
mod sink;
mod source;

pub use class_writer::{read_class_file, ClassFileMetadata, ClassFileWriter, CLASS_FILE_DTYPE};
pub use comm::{Communicator, LocalCommunicator};
pub use jsonl_source::JsonLinesSource;
pub use sink::{MemoryOutput, OutputHandle};
pub use source::{InputSource, MemorySource};
