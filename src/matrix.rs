//! # The Sensing Matrix
//!
//! This module is the exclusive entry point for assertion data. Its job is to
//! take a raw rows-of-cells representation of "who asserted what", validate it
//! against the invariants the estimator relies on, and hand the statistical
//! core a clean, immutable `ndarray` structure.
//!
//! - Rows are sources (reporting accounts), columns are claims.
//! - Every cell is exactly 0 or 1; jagged or empty input is rejected here,
//!   before any iteration begins.
//! - Failures are assumed to be input errors, so `MatrixError` messages name
//!   the offending row/column rather than the internal state.

use ndarray::{Array1, Array2, ArrayView1, Axis};
use thiserror::Error;

/// Errors raised while assembling a [`SensingMatrix`] from raw cells.
#[derive(Error, Debug)]
pub enum MatrixError {
    #[error("the report matrix is empty: at least one source row and one claim column are required")]
    EmptyMatrix,

    #[error(
        "row {row} has {found} entries but the matrix is {expected} claims wide; every source must report on the same claim set"
    )]
    JaggedRows {
        row: usize,
        found: usize,
        expected: usize,
    },

    #[error("cell ({row}, {col}) holds {value}; the report matrix must contain only 0 or 1")]
    NonBinaryValue { row: usize, col: usize, value: u8 },
}

/// A validated binary assertion matrix: rows are sources, columns are claims.
///
/// Immutable once constructed. Cell `(i, j)` is 1 iff source `i` asserted
/// claim `j`.
#[derive(Debug, Clone)]
pub struct SensingMatrix {
    cells: Array2<u8>,
}

impl SensingMatrix {
    /// Builds a matrix from dense rows, validating shape and cell values.
    pub fn from_rows(rows: &[Vec<u8>]) -> Result<Self, MatrixError> {
        let n_sources = rows.len();
        if n_sources == 0 {
            return Err(MatrixError::EmptyMatrix);
        }
        let n_claims = rows[0].len();
        if n_claims == 0 {
            return Err(MatrixError::EmptyMatrix);
        }

        for (row, cells) in rows.iter().enumerate() {
            if cells.len() != n_claims {
                return Err(MatrixError::JaggedRows {
                    row: row + 1,
                    found: cells.len(),
                    expected: n_claims,
                });
            }
            for (col, &value) in cells.iter().enumerate() {
                if value > 1 {
                    return Err(MatrixError::NonBinaryValue {
                        row: row + 1,
                        col: col + 1,
                        value,
                    });
                }
            }
        }

        let flat: Vec<u8> = rows.iter().flatten().copied().collect();
        let cells = Array2::from_shape_vec((n_sources, n_claims), flat)
            .map_err(|_| MatrixError::EmptyMatrix)?;
        Ok(Self { cells })
    }

    /// Builds a matrix of the given dimensions from 0-based `(source, claim)`
    /// assertion coordinates. Cells not named by any pair are 0; duplicate
    /// pairs are idempotent. Coordinates must lie inside the given
    /// dimensions.
    pub fn from_assertions(
        n_sources: usize,
        n_claims: usize,
        assertions: &[(usize, usize)],
    ) -> Result<Self, MatrixError> {
        if n_sources == 0 || n_claims == 0 {
            return Err(MatrixError::EmptyMatrix);
        }
        let mut cells = Array2::zeros((n_sources, n_claims));
        for &(source, claim) in assertions {
            cells[[source, claim]] = 1;
        }
        Ok(Self { cells })
    }

    pub fn n_sources(&self) -> usize {
        self.cells.nrows()
    }

    pub fn n_claims(&self) -> usize {
        self.cells.ncols()
    }

    /// Whether source `i` asserted claim `j`.
    #[inline]
    pub fn asserted(&self, source: usize, claim: usize) -> bool {
        self.cells[[source, claim]] == 1
    }

    /// The assertions of one source, as a row view.
    pub fn row(&self, source: usize) -> ArrayView1<'_, u8> {
        self.cells.row(source)
    }

    /// `k_i`: how many claims each source asserted.
    pub fn assertion_counts(&self) -> Vec<usize> {
        self.cells
            .axis_iter(Axis(0))
            .map(|row| row.iter().filter(|&&v| v == 1).count())
            .collect()
    }

    /// The observed-rate vector `s`: the fraction of claims each source
    /// asserted. Computed once; the estimator holds it fixed across
    /// iterations.
    pub fn observed_rates(&self) -> Array1<f64> {
        let n_claims = self.n_claims() as f64;
        self.cells.mapv(f64::from).sum_axis(Axis(1)) / n_claims
    }
}
