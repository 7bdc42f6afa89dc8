//! Per-object redshift probability densities evaluated on a shared grid.

use super::RowSlice;
use anyhow::Result;
use ndarray::{s, Array1, Array2, ArrayView1, Axis};

/// A collection of p(z) curves, one row per object, sampled on `grid`.
#[derive(Debug, Clone, PartialEq)]
pub struct PdfEnsemble {
    grid: Array1<f64>,
    pdfs: Array2<f64>,
}

impl PdfEnsemble {
    /// Create an ensemble. `pdfs` is `(objects, grid points)`.
    pub fn new(grid: Array1<f64>, pdfs: Array2<f64>) -> Result<Self> {
        if pdfs.ncols() != grid.len() {
            anyhow::bail!(
                "PDF width {} does not match grid length {}",
                pdfs.ncols(),
                grid.len()
            );
        }
        if grid.windows(2).into_iter().any(|w| w[1] <= w[0]) {
            anyhow::bail!("Redshift grid must be strictly increasing");
        }
        Ok(Self { grid, pdfs })
    }

    /// Number of objects.
    pub fn len(&self) -> usize {
        self.pdfs.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn grid(&self) -> &Array1<f64> {
        &self.grid
    }

    pub fn pdfs(&self) -> &Array2<f64> {
        &self.pdfs
    }

    /// The density of object `i`.
    pub fn pdf(&self, i: usize) -> ArrayView1<'_, f64> {
        self.pdfs.index_axis(Axis(0), i)
    }

    /// Grid value at the peak of each object's density.
    ///
    /// Ties resolve to the lowest redshift. Objects with an empty grid get `NaN`.
    pub fn modes(&self) -> Array1<f64> {
        self.pdfs
            .axis_iter(Axis(0))
            .map(|row| {
                let mut best: Option<(usize, f64)> = None;
                for (k, &p) in row.iter().enumerate() {
                    match best {
                        Some((_, bp)) if p <= bp => {}
                        _ => best = Some((k, p)),
                    }
                }
                best.map_or(f64::NAN, |(k, _)| self.grid[k])
            })
            .collect()
    }
}

impl RowSlice for PdfEnsemble {
    fn row_count(&self) -> usize {
        self.len()
    }

    fn slice_rows(&self, start: usize, end: usize) -> Self {
        Self {
            grid: self.grid.clone(),
            pdfs: self.pdfs.slice(s![start..end, ..]).to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn ensemble() -> PdfEnsemble {
        PdfEnsemble::new(
            array![0.0, 0.5, 1.0, 1.5],
            array![
                [0.1, 0.7, 0.2, 0.0],
                [0.0, 0.1, 0.3, 0.6],
                [0.5, 0.5, 0.0, 0.0],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_modes() {
        let modes = ensemble().modes();
        assert_eq!(modes.to_vec(), vec![0.5, 1.5, 0.0]);
    }

    #[test]
    fn test_grid_mismatch_rejected() {
        let result = PdfEnsemble::new(array![0.0, 1.0], array![[0.2, 0.3, 0.5]]);
        assert!(result.is_err());
    }

    #[test]
    fn test_non_monotonic_grid_rejected() {
        let result = PdfEnsemble::new(array![0.0, 1.0, 0.5], array![[0.2, 0.3, 0.5]]);
        assert!(result.is_err());
    }

    #[test]
    fn test_slice_keeps_grid() {
        let ens = ensemble();
        let slice = ens.slice_rows(1, 3);
        assert_eq!(slice.len(), 2);
        assert_eq!(slice.grid(), ens.grid());
        assert_eq!(slice.pdf(0).to_vec(), vec![0.0, 0.1, 0.3, 0.6]);
    }
}
