//! Error types for solver operations.

use thiserror::Error;

/// Result type alias using the crate Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while setting up or running a solve.
///
/// None of these are recoverable inside the solver: every stage propagates
/// them unchanged up to the caller of the load-stepping driver.
#[derive(Error, Debug)]
pub enum Error {
    /// Deformation gradient with non-positive determinant.
    #[error("non-physical deformation: det F = {jacobian:.6e} (must be positive)")]
    NonPhysicalDeformation { jacobian: f64 },

    /// Invalid parameter or unsupported option, detected at setup.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Newton iteration cap reached without meeting the residual tolerance.
    #[error(
        "Newton solver did not converge in load step {step} after {iterations} iterations \
         (normalized residual: {residual:.3e})"
    )]
    ConvergenceFailure {
        step: usize,
        iterations: usize,
        residual: f64,
    },

    /// Iterative linear solve stopped at its cap.
    #[error(
        "linear solve did not converge after {iterations} iterations \
         (residual: {residual:.3e}, tolerance: {tolerance:.3e})"
    )]
    LinearSolve {
        iterations: usize,
        residual: f64,
        tolerance: f64,
    },

    /// Other linear solver errors (dimension mismatch, factorization failure).
    #[error("solver error: {0}")]
    Solver(String),

    /// Matrix singularity or loss of positive definiteness.
    #[error("singular matrix: {0}")]
    SingularMatrix(String),

    /// Constraint handler misuse (open/closed state, cyclic relations).
    #[error("constraint error: {0}")]
    Constraint(String),

    /// Mesh-related errors.
    #[error("mesh error: {0}")]
    Mesh(String),

    /// Assembly errors.
    #[error("assembly error: {0}")]
    Assembly(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_stage() {
        let err = Error::NonPhysicalDeformation { jacobian: -0.5 };
        assert!(err.to_string().contains("non-physical deformation"));

        let err = Error::ConvergenceFailure {
            step: 3,
            iterations: 10,
            residual: 1e-2,
        };
        let msg = err.to_string();
        assert!(msg.contains("load step 3"));
        assert!(msg.contains("10 iterations"));

        let err = Error::LinearSolve {
            iterations: 12,
            residual: 1.0,
            tolerance: 1e-9,
        };
        assert!(err.to_string().starts_with("linear solve"));
    }
}
