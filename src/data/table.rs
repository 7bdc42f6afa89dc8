//! Catalogue-like tabular data.

use super::RowSlice;
use anyhow::Result;
use ndarray::{s, Array2, ArrayView1, Axis};

/// Named `f64` columns stored row-major as a `(rows, columns)` array.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    data: Array2<f64>,
}

impl Table {
    /// Build a table from column names and a `(rows, columns)` array.
    pub fn new(columns: Vec<String>, data: Array2<f64>) -> Result<Self> {
        if columns.len() != data.ncols() {
            anyhow::bail!(
                "Table has {} column names but {} data columns",
                columns.len(),
                data.ncols()
            );
        }
        Ok(Self { columns, data })
    }

    /// Build a table from `(name, values)` pairs. All columns must have the same length.
    pub fn from_columns(columns: Vec<(String, Vec<f64>)>) -> Result<Self> {
        let nrows = columns.first().map_or(0, |(_, v)| v.len());
        let mut data = Array2::<f64>::zeros((nrows, columns.len()));
        let mut names = Vec::with_capacity(columns.len());

        for (j, (name, values)) in columns.into_iter().enumerate() {
            if values.len() != nrows {
                anyhow::bail!(
                    "Column '{}' has {} rows, expected {}",
                    name,
                    values.len(),
                    nrows
                );
            }
            for (i, v) in values.into_iter().enumerate() {
                data[[i, j]] = v;
            }
            names.push(name);
        }

        Ok(Self { columns: names, data })
    }

    /// An empty table with the given columns.
    pub fn empty(columns: Vec<String>) -> Self {
        let ncols = columns.len();
        Self {
            columns,
            data: Array2::zeros((0, ncols)),
        }
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.data.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Column names in storage order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// View of a single column by name.
    pub fn column(&self, name: &str) -> Option<ArrayView1<'_, f64>> {
        let idx = self.columns.iter().position(|c| c == name)?;
        Some(self.data.index_axis(Axis(1), idx))
    }

    /// The underlying `(rows, columns)` array.
    pub fn data(&self) -> &Array2<f64> {
        &self.data
    }
}

impl RowSlice for Table {
    fn row_count(&self) -> usize {
        self.len()
    }

    fn slice_rows(&self, start: usize, end: usize) -> Self {
        Self {
            columns: self.columns.clone(),
            data: self.data.slice(s![start..end, ..]).to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mags() -> Table {
        Table::from_columns(vec![
            ("mag_i".to_string(), vec![20.0, 21.5, 22.1, 23.4]),
            ("mag_r".to_string(), vec![20.5, 21.9, 22.8, 23.9]),
        ])
        .unwrap()
    }

    #[test]
    fn test_from_columns() {
        let table = mags();
        assert_eq!(table.len(), 4);
        assert_eq!(table.columns(), &["mag_i".to_string(), "mag_r".to_string()]);
        assert_eq!(table.column("mag_r").unwrap()[2], 22.8);
        assert!(table.column("mag_z").is_none());
    }

    #[test]
    fn test_ragged_columns_rejected() {
        let result = Table::from_columns(vec![
            ("a".to_string(), vec![1.0, 2.0]),
            ("b".to_string(), vec![1.0]),
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_new_checks_width() {
        let result = Table::new(vec!["a".to_string()], Array2::zeros((3, 2)));
        assert!(result.is_err());
    }

    #[test]
    fn test_slice_rows() {
        let table = mags();
        let slice = table.slice_rows(1, 3);
        assert_eq!(slice.len(), 2);
        assert_eq!(slice.column("mag_i").unwrap().to_vec(), vec![21.5, 22.1]);
        assert_eq!(slice.columns(), table.columns());
    }

    #[test]
    fn test_empty() {
        let table = Table::empty(vec!["x".to_string()]);
        assert!(table.is_empty());
        assert_eq!(table.data().ncols(), 1);
    }
}
