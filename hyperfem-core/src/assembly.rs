//! Parallel finite element assembly of the linearized equilibrium equations.
//!
//! For the current total displacement the assembler builds, element by
//! element, the tangent K and the out-of-balance force r of
//! ```text
//! K δu = r,   r = f_ext − f_int(u)
//! ```
//! using Rayon for shared-memory parallelism. Each element's contribution is
//! scattered through the constraint handler under one lock acquisition.

use crate::constraints::ConstraintHandler;
use crate::element::{BoundaryId, Discretization};
use crate::error::{Error, Result};
use crate::kinematics::{deformation_gradient, displacement_gradient, inverse_deformation_gradient};
use crate::material::Hyperelastic;
use crate::sparse::GlobalSystem;
use crate::tensor::{double_contract, symmetrize, Tensor2, Vector};
use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tracing::{debug, error};

/// Boundary condition types.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum BoundaryCondition {
    /// Prescribed displacement of one component on a tagged boundary (Dirichlet).
    ///
    /// `value` is reached at the final load step; each step prescribes an
    /// equal share of it.
    Displacement {
        boundary_id: BoundaryId,
        component: usize,
        value: f64,
    },
    /// Normal traction t = load_fraction · magnitude · n on a tagged boundary (Neumann).
    Traction {
        boundary_id: BoundaryId,
        magnitude: f64,
    },
}

/// Dense element contribution before scattering.
#[derive(Debug, Clone)]
pub struct LocalSystem {
    /// Global DoF indices of the element.
    pub dofs: Vec<usize>,
    /// Element tangent.
    pub matrix: DMatrix<f64>,
    /// Element out-of-balance force.
    pub rhs: DVector<f64>,
}

/// Builds the global tangent and residual for a hyperelastic body.
pub struct Assembler<'a, const D: usize, X, M>
where
    X: Discretization<D>,
    M: Hyperelastic<D>,
{
    discretization: &'a X,
    material: &'a M,
    boundary_conditions: &'a [BoundaryCondition],
}

impl<'a, const D: usize, X, M> Assembler<'a, D, X, M>
where
    X: Discretization<D>,
    M: Hyperelastic<D>,
{
    /// Create an assembler. Only the traction entries of `boundary_conditions`
    /// are used here; displacement entries are imposed through constraints.
    pub fn new(
        discretization: &'a X,
        material: &'a M,
        boundary_conditions: &'a [BoundaryCondition],
    ) -> Self {
        Self {
            discretization,
            material,
            boundary_conditions,
        }
    }

    /// Compute one element's tangent and out-of-balance force.
    ///
    /// # Arguments
    ///
    /// * `cell` - Cell index
    /// * `solution` - Current total displacement (length = n_dofs)
    /// * `load_fraction` - Fraction of the full traction applied
    ///
    /// # Errors
    ///
    /// Propagates [`Error::NonPhysicalDeformation`] from any quadrature point.
    pub fn cell_contribution(
        &self,
        cell: usize,
        solution: &[f64],
        load_fraction: f64,
    ) -> Result<LocalSystem> {
        let dofs = self.discretization.cell_dof_indices(cell)?;
        let n = dofs.len();
        let u_local: Vec<f64> = dofs.iter().map(|&d| solution[d]).collect();

        let mut matrix = DMatrix::zeros(n, n);
        let mut rhs = DVector::zeros(n);

        for q in self.discretization.cell_values(cell)? {
            let f = deformation_gradient(&displacement_gradient(&u_local, &q.shape_gradients));
            let tau = self.material.kirchhoff_stress(&f)?;
            let tangent = self.material.tangent(&f)?;
            let f_inv_t = inverse_deformation_gradient(&f)?.transpose();

            // ∇φ_k F⁻¹ for the vector shape function of local DoF k
            let spatial_grads: Vec<Tensor2<D>> = (0..n)
                .map(|k| {
                    let g: Vector<D> = f_inv_t * q.shape_gradients[k / D];
                    let mut grad = Tensor2::<D>::zeros();
                    grad.set_row(k % D, &g.transpose());
                    grad
                })
                .collect();
            let sym_grads: Vec<Tensor2<D>> = spatial_grads.iter().map(symmetrize).collect();
            let c_sym_grads: Vec<Tensor2<D>> = sym_grads.iter().map(|g| tangent.ddot(g)).collect();

            for i in 0..n {
                rhs[i] -= double_contract(&sym_grads[i], &tau) * q.jxw;
                for j in 0..n {
                    let geometric = double_contract(
                        &symmetrize(&(spatial_grads[i].transpose() * spatial_grads[j])),
                        &tau,
                    );
                    let material = double_contract(&sym_grads[i], &c_sym_grads[j]);
                    matrix[(i, j)] += (geometric + material) * q.jxw;
                }
            }
        }

        for bc in self.boundary_conditions {
            if let BoundaryCondition::Traction {
                boundary_id,
                magnitude,
            } = *bc
            {
                for q in self.discretization.boundary_face_values(cell, boundary_id)? {
                    let traction = q.normal * (load_fraction * magnitude);
                    for k in 0..n {
                        rhs[k] += q.shape_values[k / D] * traction[k % D] * q.jxw;
                    }
                }
            }
        }

        Ok(LocalSystem { dofs, matrix, rhs })
    }

    /// Assemble the global system at the given total displacement.
    ///
    /// `system` is overwritten in place; `constraints` must be closed.
    ///
    /// # Arguments
    ///
    /// * `solution` - Current total displacement (length = n_dofs)
    /// * `load_fraction` - Fraction of the full traction applied
    /// * `constraints` - Closed constraint handler used for elimination
    /// * `system` - Global system (reset here before accumulation)
    pub fn assemble(
        &self,
        solution: &[f64],
        load_fraction: f64,
        constraints: &ConstraintHandler,
        system: &mut GlobalSystem,
    ) -> Result<()> {
        let n_dofs = self.discretization.n_dofs();
        if solution.len() != n_dofs || system.n_dofs() != n_dofs {
            return Err(Error::Assembly(format!(
                "size mismatch: solution has {} entries, system {}, discretization {}",
                solution.len(),
                system.n_dofs(),
                n_dofs
            )));
        }
        if !constraints.is_closed() {
            return Err(Error::Constraint(
                "assembly requires a closed constraint handler".into(),
            ));
        }

        system.reset();
        let shared = Mutex::new(system);

        (0..self.discretization.n_cells())
            .into_par_iter()
            .try_for_each(|cell| -> Result<()> {
                let local = self
                    .cell_contribution(cell, solution, load_fraction)
                    .inspect_err(|e| error!(cell, error = %e, "element evaluation failed"))?;
                let mut guard = shared
                    .lock()
                    .map_err(|_| Error::Assembly("global system lock poisoned".into()))?;
                constraints.distribute_local_to_global(
                    &local.matrix,
                    &local.rhs,
                    &local.dofs,
                    &mut **guard,
                )
            })?;

        let system = shared
            .into_inner()
            .map_err(|_| Error::Assembly("global system lock poisoned".into()))?;
        debug!(
            n_cells = self.discretization.n_cells(),
            triplets = system.matrix.nnz(),
            load_fraction,
            "assembled global system"
        );
        Ok(())
    }
}
