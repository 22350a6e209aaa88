//! Hyperelastic material models.
//!
//! The assembler only needs a Kirchhoff stress and a spatial tangent at a
//! given deformation gradient, expressed by the [`Hyperelastic`] trait. The
//! compressible Neo-Hookean model is the one law implemented here.

use crate::error::{Error, Result};
use crate::kinematics::{inverse_deformation_gradient, jacobian, left_cauchy_green};
use crate::tensor::{symmetrize, Tensor2, Tensor4};
use serde::{Deserialize, Serialize};

/// Constitutive interface consumed by the assembler.
///
/// Implementations must be thread-safe (Send + Sync) to enable parallel assembly.
pub trait Hyperelastic<const D: usize>: Send + Sync {
    /// Kirchhoff stress τ = Jσ at deformation gradient F.
    fn kirchhoff_stress(&self, f: &Tensor2<D>) -> Result<Tensor2<D>>;

    /// Material part of the spatial tangent for the Kirchhoff stress.
    fn tangent(&self, f: &Tensor2<D>) -> Result<Tensor4<D>>;
}

/// Compressible Neo-Hookean material.
///
/// Cauchy stress:
/// ```text
/// σ = (μ/J)(b − I) + (λ ln J / J) I
/// ```
/// with b the left Cauchy-Green tensor and J = det F.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NeoHookean {
    /// Shear modulus μ.
    pub mu: f64,
    /// Lamé's first parameter λ.
    pub lambda: f64,
}

impl NeoHookean {
    /// Create a Neo-Hookean material from Lamé parameters.
    ///
    /// # Arguments
    ///
    /// * `mu` - Shear modulus μ (positive)
    /// * `lambda` - Lamé's first parameter λ (non-negative)
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the parameters are not physically valid.
    pub fn new(mu: f64, lambda: f64) -> Result<Self> {
        if !mu.is_finite() || mu <= 0.0 {
            return Err(Error::Configuration(format!(
                "shear modulus mu must be positive, got {mu}"
            )));
        }
        if !lambda.is_finite() || lambda < 0.0 {
            return Err(Error::Configuration(format!(
                "Lamé parameter lambda must be non-negative, got {lambda}"
            )));
        }
        Ok(Self { mu, lambda })
    }

    /// Create from Young's modulus and Poisson's ratio.
    ///
    /// λ = Eν / ((1+ν)(1-2ν)), μ = E / (2(1+ν)).
    pub fn from_youngs_modulus(youngs_modulus: f64, poissons_ratio: f64) -> Result<Self> {
        if youngs_modulus <= 0.0 {
            return Err(Error::Configuration(
                "Young's modulus must be positive".into(),
            ));
        }
        if poissons_ratio <= -1.0 || poissons_ratio >= 0.5 {
            return Err(Error::Configuration(
                "Poisson's ratio must be in range (-1, 0.5)".into(),
            ));
        }
        let e = youngs_modulus;
        let nu = poissons_ratio;
        Self::new(e / (2.0 * (1.0 + nu)), e * nu / ((1.0 + nu) * (1.0 - 2.0 * nu)))
    }

    /// Cauchy stress σ.
    pub fn cauchy_stress<const D: usize>(&self, f: &Tensor2<D>) -> Result<Tensor2<D>> {
        let det_f = jacobian(f)?;
        let b = left_cauchy_green(f);
        let identity = Tensor2::<D>::identity();
        Ok((b - identity) * (self.mu / det_f) + identity * (self.lambda * det_f.ln() / det_f))
    }

    /// Kirchhoff stress τ = Jσ.
    pub fn kirchhoff_stress<const D: usize>(&self, f: &Tensor2<D>) -> Result<Tensor2<D>> {
        let det_f = jacobian(f)?;
        Ok(self.cauchy_stress(f)? * det_f)
    }

    /// First Piola-Kirchhoff stress P = Jσ F⁻ᵀ (not symmetric in general).
    pub fn piola_stress<const D: usize>(&self, f: &Tensor2<D>) -> Result<Tensor2<D>> {
        let det_f = jacobian(f)?;
        let f_inv = inverse_deformation_gradient(f)?;
        Ok(self.cauchy_stress(f)? * f_inv.transpose() * det_f)
    }

    /// Second Piola-Kirchhoff stress S = sym(J F⁻¹ σ F⁻ᵀ).
    pub fn second_piola_kirchhoff_stress<const D: usize>(&self, f: &Tensor2<D>) -> Result<Tensor2<D>> {
        let det_f = jacobian(f)?;
        let f_inv = inverse_deformation_gradient(f)?;
        let sigma = self.cauchy_stress(f)?;
        Ok(symmetrize(&(f_inv * sigma * f_inv.transpose() * det_f)))
    }

    /// Spatial tangent for the Kirchhoff stress:
    /// ```text
    /// 𝕮 = J [ (λ/J) I⊗I + 2((μ − λ ln J)/J) 𝕊 ]
    /// ```
    pub fn material_tangent<const D: usize>(&self, f: &Tensor2<D>) -> Result<Tensor4<D>> {
        let det_f = jacobian(f)?;
        let volumetric = Tensor4::<D>::identity_dyad() * (self.lambda / det_f);
        let deviatoric = Tensor4::<D>::symmetric_identity()
            * (2.0 * (self.mu - self.lambda * det_f.ln()) / det_f);
        Ok((volumetric + deviatoric) * det_f)
    }
}

impl<const D: usize> Hyperelastic<D> for NeoHookean {
    fn kirchhoff_stress(&self, f: &Tensor2<D>) -> Result<Tensor2<D>> {
        NeoHookean::kirchhoff_stress(self, f)
    }

    fn tangent(&self, f: &Tensor2<D>) -> Result<Tensor4<D>> {
        self.material_tangent(f)
    }
}
