//! Solid solver configuration.
//!
//! Parameters that control the load stepping, the Newton iteration, the
//! material and the boundary tagging. Missing fields fall back to their
//! defaults when deserializing.

use crate::assembly::BoundaryCondition;
use crate::element::BoundaryId;
use crate::error::{Error, Result};
use crate::material::NeoHookean;
use crate::solver::SolverConfig;
use serde::{Deserialize, Serialize};

/// Configuration for a quasi-static hyperelastic solve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolidConfig {
    /// Number of equal load increments.
    pub load_steps: usize,

    /// Lagrange polynomial degree of the displacement field; must match the
    /// degree of the discretization handed to the solver.
    pub polynomial_degree: usize,

    /// Full traction magnitude along the outward normal (negative = pressure).
    pub load_magnitude: f64,

    /// Shear modulus μ.
    pub mu: f64,

    /// First Lamé parameter λ.
    pub lambda: f64,

    /// Newton iteration cap per load step.
    pub max_newton_iterations: usize,

    /// Normalized update threshold, reported for diagnostics.
    pub displacement_tolerance: f64,

    /// Normalized residual threshold that decides convergence.
    pub residual_tolerance: f64,

    /// Linear solver settings.
    pub linear_solver: SolverConfig,

    /// Boundary clamped in every component.
    pub dirichlet_boundary_id: BoundaryId,

    /// Boundary loaded by the traction.
    pub neumann_boundary_id: BoundaryId,
}

impl Default for SolidConfig {
    fn default() -> Self {
        Self {
            load_steps: 10,
            polynomial_degree: 1,
            load_magnitude: -7.0e3,
            mu: 70_000.0,
            lambda: 105_000.0,
            max_newton_iterations: 10,
            displacement_tolerance: 1e-6,
            residual_tolerance: 1e-6,
            linear_solver: SolverConfig::default(),
            dirichlet_boundary_id: 5,
            neumann_boundary_id: 6,
        }
    }
}

impl SolidConfig {
    pub fn with_load_steps(mut self, load_steps: usize) -> Self {
        self.load_steps = load_steps;
        self
    }

    pub fn with_polynomial_degree(mut self, degree: usize) -> Self {
        self.polynomial_degree = degree;
        self
    }

    pub fn with_load_magnitude(mut self, magnitude: f64) -> Self {
        self.load_magnitude = magnitude;
        self
    }

    pub fn with_lame_parameters(mut self, mu: f64, lambda: f64) -> Self {
        self.mu = mu;
        self.lambda = lambda;
        self
    }

    pub fn with_max_newton_iterations(mut self, iterations: usize) -> Self {
        self.max_newton_iterations = iterations;
        self
    }

    pub fn with_tolerances(mut self, displacement: f64, residual: f64) -> Self {
        self.displacement_tolerance = displacement;
        self.residual_tolerance = residual;
        self
    }

    pub fn with_linear_solver(mut self, linear_solver: SolverConfig) -> Self {
        self.linear_solver = linear_solver;
        self
    }

    pub fn with_boundary_ids(mut self, dirichlet: BoundaryId, neumann: BoundaryId) -> Self {
        self.dirichlet_boundary_id = dirichlet;
        self.neumann_boundary_id = neumann;
        self
    }

    /// Check every parameter, including the linear solver name.
    pub fn validate(&self) -> Result<()> {
        if self.load_steps == 0 {
            return Err(Error::Configuration("at least one load step is required".into()));
        }
        if !(1..=3).contains(&self.polynomial_degree) {
            return Err(Error::Configuration(format!(
                "polynomial degree must be 1, 2 or 3, got {}",
                self.polynomial_degree
            )));
        }
        if !self.load_magnitude.is_finite() {
            return Err(Error::Configuration("load magnitude must be finite".into()));
        }
        if self.max_newton_iterations == 0 {
            return Err(Error::Configuration(
                "at least one Newton iteration is required".into(),
            ));
        }
        for (name, value) in [
            ("displacement tolerance", self.displacement_tolerance),
            ("residual tolerance", self.residual_tolerance),
        ] {
            if !(value > 0.0 && value.is_finite()) {
                return Err(Error::Configuration(format!(
                    "{} must be positive, got {}",
                    name, value
                )));
            }
        }
        if self.dirichlet_boundary_id == self.neumann_boundary_id {
            return Err(Error::Configuration(format!(
                "Dirichlet and Neumann boundaries share id {}",
                self.dirichlet_boundary_id
            )));
        }
        self.material()?;
        self.linear_solver.validate()?;
        Ok(())
    }

    /// The Neo-Hookean law described by `mu` and `lambda`.
    pub fn material(&self) -> Result<NeoHookean> {
        NeoHookean::new(self.mu, self.lambda)
    }

    /// Clamp every component on the Dirichlet boundary and apply the traction
    /// on the Neumann boundary.
    pub fn boundary_conditions(&self, dim: usize) -> Vec<BoundaryCondition> {
        (0..dim)
            .map(|component| BoundaryCondition::Displacement {
                boundary_id: self.dirichlet_boundary_id,
                component,
                value: 0.0,
            })
            .chain(std::iter::once(BoundaryCondition::Traction {
                boundary_id: self.neumann_boundary_id,
                magnitude: self.load_magnitude,
            }))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_defaults() {
        let config = SolidConfig::default();
        assert_eq!(config.load_steps, 10);
        assert_eq!(config.polynomial_degree, 1);
        assert_relative_eq!(config.load_magnitude, -7.0e3);
        assert_relative_eq!(config.mu, 70_000.0);
        assert_relative_eq!(config.lambda, 105_000.0);
        assert_eq!(config.max_newton_iterations, 10);
        assert_eq!(config.linear_solver.solver_type, "CG");
        assert_eq!(config.linear_solver.max_iterations_multiplier, 1);
        assert_relative_eq!(config.linear_solver.ssor_relaxation, 1.2);
        assert_eq!(config.dirichlet_boundary_id, 5);
        assert_eq!(config.neumann_boundary_id, 6);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let json = r#"{ "load_steps": 4, "linear_solver": { "solver_type": "Direct" } }"#;
        let config: SolidConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.load_steps, 4);
        assert_eq!(config.linear_solver.solver_type, "Direct");
        assert_relative_eq!(config.linear_solver.ssor_relaxation, 1.2);
        assert_relative_eq!(config.mu, 70_000.0);

        let back: SolidConfig = serde_json::from_str(&serde_json::to_string(&config).unwrap()).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(SolidConfig::default().with_load_steps(0).validate().is_err());
        assert!(SolidConfig::default().with_polynomial_degree(4).validate().is_err());
        assert!(SolidConfig::default().with_lame_parameters(-1.0, 1.0).validate().is_err());
        assert!(SolidConfig::default().with_tolerances(0.0, 1e-6).validate().is_err());
        assert!(SolidConfig::default().with_boundary_ids(3, 3).validate().is_err());
        assert!(SolidConfig::default().with_max_newton_iterations(0).validate().is_err());

        let unsupported = SolverConfig {
            solver_type: "UMFPACK".into(),
            ..SolverConfig::default()
        };
        assert!(matches!(
            SolidConfig::default().with_linear_solver(unsupported).validate(),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_boundary_conditions() {
        let config = SolidConfig::default().with_boundary_ids(0, 1).with_load_magnitude(-5.0);
        let bcs = config.boundary_conditions(3);
        assert_eq!(bcs.len(), 4);
        for (component, bc) in bcs[..3].iter().enumerate() {
            assert_eq!(
                *bc,
                BoundaryCondition::Displacement {
                    boundary_id: 0,
                    component,
                    value: 0.0
                }
            );
        }
        assert_eq!(
            bcs[3],
            BoundaryCondition::Traction {
                boundary_id: 1,
                magnitude: -5.0
            }
        );
    }
}
