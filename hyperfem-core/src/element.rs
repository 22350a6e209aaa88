//! Discretization interface and element-level evaluation data.
//!
//! The assembler never touches geometry directly. It asks a [`Discretization`]
//! for DoF indices and for precomputed shape-function data at the quadrature
//! points of cells and boundary faces, enabling the assembly process to work
//! with any mesh or element type uniformly.
//!
//! # Submodules
//!
//! - [`gauss`] - Gauss-Legendre quadrature rules for numerical integration
//! - [`lagrange`] - Tensor-product Lagrange shape functions

use crate::constraints::ConstraintLine;
use crate::error::Result;
use crate::tensor::Vector;

pub mod gauss;
pub mod lagrange;

pub use gauss::{gauss_1d, gauss_face, gauss_tensor, GaussPoint};
pub use lagrange::TensorLagrange;

/// Boundary indicator attached to mesh faces.
pub type BoundaryId = u32;

/// Which end of a reference axis a cell face lies on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaceSide {
    /// Face at natural coordinate −1.
    Lower,
    /// Face at natural coordinate +1.
    Upper,
}

impl FaceSide {
    /// Natural coordinate of the face.
    pub fn coordinate(self) -> f64 {
        match self {
            FaceSide::Lower => -1.0,
            FaceSide::Upper => 1.0,
        }
    }
}

/// Shape-function data at one cell quadrature point.
#[derive(Debug, Clone)]
pub struct CellQuadraturePoint<const D: usize> {
    /// Shape function values, one per cell node.
    pub shape_values: Vec<f64>,
    /// Shape function gradients in the reference (undeformed) configuration.
    pub shape_gradients: Vec<Vector<D>>,
    /// Quadrature weight times the Jacobian of the reference map.
    pub jxw: f64,
}

/// Shape-function data at one boundary-face quadrature point.
#[derive(Debug, Clone)]
pub struct FaceQuadraturePoint<const D: usize> {
    /// Shape function values, one per cell node.
    pub shape_values: Vec<f64>,
    /// Outward unit normal in the reference configuration.
    pub normal: Vector<D>,
    /// Quadrature weight times the surface measure of the face map.
    pub jxw: f64,
}

/// Finite element discretization consumed by the assembler.
///
/// Local DoF `k` of a cell belongs to cell node `k / D` and displacement
/// component `k % D`. Implementations must be `Sync` to enable parallel assembly.
pub trait Discretization<const D: usize>: Sync {
    /// Polynomial degree of the shape functions.
    fn degree(&self) -> usize;

    /// Total number of degrees of freedom.
    fn n_dofs(&self) -> usize;

    /// Number of cells.
    fn n_cells(&self) -> usize;

    /// Global DoF indices of a cell, in local DoF order.
    fn cell_dof_indices(&self, cell: usize) -> Result<Vec<usize>>;

    /// Shape-function data at every quadrature point of a cell.
    fn cell_values(&self, cell: usize) -> Result<Vec<CellQuadraturePoint<D>>>;

    /// Shape-function data on the faces of `cell` tagged with `boundary_id`.
    ///
    /// Returns an empty list when the cell has no such face.
    fn boundary_face_values(
        &self,
        cell: usize,
        boundary_id: BoundaryId,
    ) -> Result<Vec<FaceQuadraturePoint<D>>>;

    /// Global DoFs of one displacement component on a tagged boundary.
    fn boundary_dofs(&self, boundary_id: BoundaryId, component: usize) -> Vec<usize>;

    /// Compatibility (hanging-node) relations between DoFs.
    fn compatibility_constraints(&self) -> Vec<ConstraintLine> {
        Vec::new()
    }
}
