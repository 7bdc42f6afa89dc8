//! In-memory payloads carried through the pipeline.

mod assignment;
mod ensemble;
mod table;

pub use assignment::{ClassAssignment, UNASSIGNED};
pub use ensemble::PdfEnsemble;
pub use table::Table;

/// A row-indexed payload that can be cut into contiguous row ranges.
pub trait RowSlice: Sized {
    /// Number of rows (objects).
    fn row_count(&self) -> usize;

    /// Copy of rows `[start, end)`.
    fn slice_rows(&self, start: usize, end: usize) -> Self;
}
