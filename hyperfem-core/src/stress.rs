//! Stress recovery from a displacement solution.
//!
//! After a converged load step, this module evaluates Cauchy stresses at the
//! quadrature points of every element:
//! 1. Loop through all elements in parallel
//! 2. Extract element nodal displacements from the global solution
//! 3. Compute F = I + ∇u at each quadrature point
//! 4. Compute σ = τ / J from the material law
//!
//! For nodal stress output, averaging from adjacent elements is typically performed.

use crate::element::Discretization;
use crate::error::{Error, Result};
use crate::kinematics::{deformation_gradient, displacement_gradient, jacobian};
use crate::material::Hyperelastic;
use crate::tensor::{double_contract, Tensor2};
use rayon::prelude::*;

/// Von Mises equivalent stress √(3/2 s:s).
///
/// For D < 3 the missing out-of-plane normal stress is taken as zero.
pub fn von_mises<const D: usize>(stress: &Tensor2<D>) -> f64 {
    let mean = stress.trace() / 3.0;
    let deviator = stress - Tensor2::<D>::identity() * mean;
    let out_of_plane = (3 - D.min(3)) as f64 * mean * mean;
    (1.5 * (double_contract(&deviator, &deviator) + out_of_plane)).sqrt()
}

/// Stress result for a single element.
#[derive(Debug, Clone)]
pub struct ElementStress<const D: usize> {
    /// Element index in the mesh.
    pub element_id: usize,
    /// Cauchy stress at each quadrature point.
    pub integration_point_stresses: Vec<Tensor2<D>>,
}

impl<const D: usize> ElementStress<D> {
    /// Compute the average stress across all integration points.
    pub fn average_stress(&self) -> Tensor2<D> {
        if self.integration_point_stresses.is_empty() {
            return Tensor2::<D>::zeros();
        }
        let n = self.integration_point_stresses.len() as f64;
        self.integration_point_stresses
            .iter()
            .fold(Tensor2::<D>::zeros(), |acc, s| acc + s)
            / n
    }

    /// Maximum von Mises stress among all integration points.
    pub fn max_von_mises(&self) -> f64 {
        self.integration_point_stresses
            .iter()
            .map(von_mises)
            .fold(0.0, f64::max)
    }
}

/// Stress recovery results for the entire mesh.
#[derive(Debug, Clone)]
pub struct StressField<const D: usize> {
    /// Element stresses indexed by element ID.
    pub element_stresses: Vec<ElementStress<D>>,
}

impl<const D: usize> StressField<D> {
    /// Get stress for a specific element.
    pub fn element(&self, elem_id: usize) -> Option<&ElementStress<D>> {
        self.element_stresses.get(elem_id)
    }

    /// Maximum von Mises stress across all elements.
    pub fn max_von_mises(&self) -> f64 {
        self.element_stresses
            .iter()
            .map(|es| es.max_von_mises())
            .fold(0.0, f64::max)
    }

    /// Compute average element stresses.
    pub fn average_stresses(&self) -> Vec<Tensor2<D>> {
        self.element_stresses
            .iter()
            .map(|es| es.average_stress())
            .collect()
    }

    /// Number of elements with stress data.
    pub fn n_elements(&self) -> usize {
        self.element_stresses.len()
    }

    /// Get all von Mises stresses (one per element, averaged).
    pub fn von_mises_stresses(&self) -> Vec<f64> {
        self.element_stresses
            .iter()
            .map(|es| von_mises(&es.average_stress()))
            .collect()
    }
}

/// Recover Cauchy stresses from a total displacement field.
///
/// # Arguments
///
/// * `discretization` - Mesh and DoF layout
/// * `material` - Hyperelastic law (uniform for all elements)
/// * `displacements` - Total displacement vector (length = n_dofs)
///
/// # Errors
///
/// Returns [`Error::Assembly`] when `displacements` does not hold one entry
/// per DoF, and propagates [`Error::NonPhysicalDeformation`] from any
/// quadrature point.
pub fn recover_stresses<const D: usize, X, M>(
    discretization: &X,
    material: &M,
    displacements: &[f64],
) -> Result<StressField<D>>
where
    X: Discretization<D>,
    M: Hyperelastic<D>,
{
    let n_dofs = discretization.n_dofs();
    if displacements.len() != n_dofs {
        return Err(Error::Assembly(format!(
            "size mismatch: displacement has {} entries, discretization {}",
            displacements.len(),
            n_dofs
        )));
    }

    let element_stresses = (0..discretization.n_cells())
        .into_par_iter()
        .map(|cell| -> Result<ElementStress<D>> {
            let dofs = discretization.cell_dof_indices(cell)?;
            let u_local: Vec<f64> = dofs.iter().map(|&d| displacements[d]).collect();

            let integration_point_stresses = discretization
                .cell_values(cell)?
                .iter()
                .map(|q| {
                    let f = deformation_gradient(&displacement_gradient(&u_local, &q.shape_gradients));
                    let det = jacobian(&f)?;
                    Ok(material.kirchhoff_stress(&f)? / det)
                })
                .collect::<Result<Vec<_>>>()?;

            Ok(ElementStress {
                element_id: cell,
                integration_point_stresses,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(StressField { element_stresses })
}
