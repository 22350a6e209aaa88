//! Sparse matrix operations.
//!
//! The global tangent is accumulated as triplets (COO) during assembly and
//! converted to CSR (Compressed Sparse Row) for the linear solve.

use crate::error::{Error, Result};
use nalgebra_sparse::coo::CooMatrix;
use nalgebra_sparse::csr::CsrMatrix as NalgebraCsr;

/// Compressed Sparse Row matrix.
pub type CsrMatrix = NalgebraCsr<f64>;

/// Builder for assembling a sparse matrix from triplets (COO format).
///
/// Accumulates (row, col, value) triplets and converts to CSR when complete.
#[derive(Debug, Clone)]
pub struct TripletMatrix {
    n_rows: usize,
    n_cols: usize,
    rows: Vec<usize>,
    cols: Vec<usize>,
    values: Vec<f64>,
}

impl TripletMatrix {
    /// Create a new triplet matrix builder.
    pub fn new(n_rows: usize, n_cols: usize) -> Self {
        Self::with_capacity(n_rows, n_cols, 0)
    }

    /// Create with estimated capacity.
    pub fn with_capacity(n_rows: usize, n_cols: usize, nnz_estimate: usize) -> Self {
        Self {
            n_rows,
            n_cols,
            rows: Vec::with_capacity(nnz_estimate),
            cols: Vec::with_capacity(nnz_estimate),
            values: Vec::with_capacity(nnz_estimate),
        }
    }

    /// Add a value at (row, col). Duplicates are summed during conversion.
    pub fn add(&mut self, row: usize, col: usize, value: f64) {
        debug_assert!(row < self.n_rows, "Row index out of bounds");
        debug_assert!(col < self.n_cols, "Column index out of bounds");

        if value != 0.0 {
            self.rows.push(row);
            self.cols.push(col);
            self.values.push(value);
        }
    }

    /// Drop all triplets, keeping the allocation and dimensions.
    pub fn clear(&mut self) {
        self.rows.clear();
        self.cols.clear();
        self.values.clear();
    }

    /// Number of rows.
    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    /// Number of stored triplets.
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// Convert to CSR format, summing duplicate entries.
    pub fn to_csr(&self) -> Result<CsrMatrix> {
        let coo = CooMatrix::try_from_triplets(
            self.n_rows,
            self.n_cols,
            self.rows.clone(),
            self.cols.clone(),
            self.values.clone(),
        )
        .map_err(|e| Error::Assembly(format!("invalid triplet data: {}", e)))?;

        Ok(CsrMatrix::from(&coo))
    }
}

/// Global linear system K·δu = r, rebuilt from scratch every Newton iteration.
#[derive(Debug, Clone)]
pub struct GlobalSystem {
    /// Tangent stiffness accumulator.
    pub matrix: TripletMatrix,
    /// Residual (out-of-balance force) vector.
    pub rhs: Vec<f64>,
}

impl GlobalSystem {
    /// Zero system of the given size.
    pub fn new(n_dofs: usize) -> Self {
        // ~81 couplings per DoF for trilinear hexahedra
        Self {
            matrix: TripletMatrix::with_capacity(n_dofs, n_dofs, n_dofs * 81),
            rhs: vec![0.0; n_dofs],
        }
    }

    /// Number of unknowns.
    pub fn n_dofs(&self) -> usize {
        self.rhs.len()
    }

    /// Reset matrix and residual to zero.
    pub fn reset(&mut self) {
        self.matrix.clear();
        self.rhs.iter_mut().for_each(|v| *v = 0.0);
    }
}
