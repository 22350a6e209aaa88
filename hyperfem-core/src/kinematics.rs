//! Finite-strain kinematics.
//!
//! Pure functions of the deformation gradient F = I + ∇u:
//! - Right Cauchy-Green C = FᵀF and left Cauchy-Green b = FFᵀ
//! - Green-Lagrange E = ½(C − I) and Almansi e = ½(I − b⁻¹)
//! - Jacobian J = det F, checked for physical admissibility
//!
//! Nothing is cached; every measure is recomputed from F on demand.

use crate::error::{Error, Result};
use crate::tensor::{determinant, symmetrize, Tensor2, Vector};

/// Displacement gradient ∇u at a quadrature point.
///
/// `u_local[k]` is the value of local DoF `k` (node `k / D`, component
/// `k % D`) and `shape_gradients[a]` the reference gradient of node `a`.
pub fn displacement_gradient<const D: usize>(
    u_local: &[f64],
    shape_gradients: &[Vector<D>],
) -> Tensor2<D> {
    let mut grad_u = Tensor2::<D>::zeros();
    for (k, &u) in u_local.iter().enumerate() {
        let grad = &shape_gradients[k / D];
        for j in 0..D {
            grad_u[(k % D, j)] += u * grad[j];
        }
    }
    grad_u
}

/// Deformation gradient F = I + ∇u from a displacement gradient.
pub fn deformation_gradient<const D: usize>(grad_u: &Tensor2<D>) -> Tensor2<D> {
    Tensor2::<D>::identity() + grad_u
}

/// Jacobian J = det F.
///
/// # Errors
///
/// Returns [`Error::NonPhysicalDeformation`] when det F ≤ 0 (inverted or
/// collapsed material). Every quantity that needs J goes through this check.
pub fn jacobian<const D: usize>(f: &Tensor2<D>) -> Result<f64> {
    let det = determinant(f);
    if det > 0.0 {
        Ok(det)
    } else {
        Err(Error::NonPhysicalDeformation { jacobian: det })
    }
}

/// Inverse deformation gradient F⁻¹, with the Jacobian check applied first.
pub fn inverse_deformation_gradient<const D: usize>(f: &Tensor2<D>) -> Result<Tensor2<D>> {
    let det = jacobian(f)?;
    f.try_inverse().ok_or(Error::NonPhysicalDeformation { jacobian: det })
}

/// Right Cauchy-Green tensor C = sym(FᵀF).
pub fn right_cauchy_green<const D: usize>(f: &Tensor2<D>) -> Tensor2<D> {
    symmetrize(&(f.transpose() * f))
}

/// Left Cauchy-Green tensor b = sym(FFᵀ).
pub fn left_cauchy_green<const D: usize>(f: &Tensor2<D>) -> Tensor2<D> {
    symmetrize(&(f * f.transpose()))
}

/// Green-Lagrange strain E = ½(C − I).
pub fn green_lagrange<const D: usize>(f: &Tensor2<D>) -> Tensor2<D> {
    (right_cauchy_green(f) - Tensor2::<D>::identity()) * 0.5
}

/// Euler-Almansi strain e = ½(I − b⁻¹).
///
/// b⁻¹ only exists for an admissible deformation, so this goes through
/// [`jacobian`] first instead of producing non-finite values.
pub fn almansi<const D: usize>(f: &Tensor2<D>) -> Result<Tensor2<D>> {
    let det = jacobian(f)?;
    let b = left_cauchy_green(f);
    let b_inv = b.try_inverse().ok_or(Error::NonPhysicalDeformation { jacobian: det })?;
    Ok((Tensor2::<D>::identity() - symmetrize(&b_inv)) * 0.5)
}
