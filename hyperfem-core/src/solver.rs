//! Linear system solvers.
//!
//! Solves the condensed Newton system K δu = r for the displacement correction.
//!
//! # Solver Backends
//!
//! - [`ConjugateGradient`]: Preconditioned conjugate gradients with an SSOR
//!   preconditioner. The default; the tangent is symmetric positive definite
//!   after constraint elimination as long as the deformation stays moderate.
//! - [`FaerCholeskySolver`]: Sparse Cholesky factorization using the faer library.
//!
//! Backends are chosen by name (`"CG"`, `"Direct"`) through [`select_solver`];
//! an unknown name is a configuration error.

use crate::constraints::ConstraintHandler;
use crate::error::{Error, Result};
use crate::sparse::CsrMatrix;
use faer::prelude::*;
use nalgebra::DVector;
use faer::sparse::linalg::solvers::{Llt, SymbolicLlt};
use faer::sparse::{SparseColMat, SymbolicSparseColMat};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Instant;
use tracing::{debug, warn};

/// Linear solver interface.
pub trait LinearSolver: Send + Sync {
    /// Solve the linear system Ax = b.
    ///
    /// # Arguments
    ///
    /// * `matrix` - System matrix (K)
    /// * `rhs` - Right-hand side vector (r)
    ///
    /// # Returns
    ///
    /// Solution vector and solve statistics.
    fn solve(&self, matrix: &CsrMatrix, rhs: &[f64]) -> Result<(Vec<f64>, SolveStats)>;

    /// Solver name for diagnostics.
    fn name(&self) -> &str;
}

/// Solver selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SolverType {
    /// SSOR-preconditioned conjugate gradients (`"CG"`).
    #[default]
    ConjugateGradient,
    /// Sparse Cholesky via faer (`"Direct"`).
    Direct,
}

impl FromStr for SolverType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "CG" | "cg" => Ok(SolverType::ConjugateGradient),
            "Direct" | "direct" => Ok(SolverType::Direct),
            other => Err(Error::Configuration(format!(
                "linear solver type '{}' is not implemented (available: CG, Direct)",
                other
            ))),
        }
    }
}

impl fmt::Display for SolverType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolverType::ConjugateGradient => write!(f, "CG"),
            SolverType::Direct => write!(f, "Direct"),
        }
    }
}

/// Linear solver configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Solver name, parsed with [`SolverType::from_str`].
    pub solver_type: String,
    /// Iteration cap as a multiple of the system size.
    pub max_iterations_multiplier: usize,
    /// Convergence threshold relative to ‖rhs‖.
    pub relative_tolerance: f64,
    /// SSOR relaxation parameter ω ∈ (0, 2).
    pub ssor_relaxation: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            solver_type: "CG".into(),
            max_iterations_multiplier: 1,
            relative_tolerance: 1e-9,
            ssor_relaxation: 1.2,
        }
    }
}

impl SolverConfig {
    /// Check parameter ranges and the solver name.
    pub fn validate(&self) -> Result<SolverType> {
        let solver_type = self.solver_type.parse::<SolverType>()?;
        if self.max_iterations_multiplier == 0 {
            return Err(Error::Configuration(
                "linear solver iteration multiplier must be at least 1".into(),
            ));
        }
        if !(self.relative_tolerance > 0.0 && self.relative_tolerance < 1.0) {
            return Err(Error::Configuration(format!(
                "linear solver tolerance must lie in (0, 1), got {}",
                self.relative_tolerance
            )));
        }
        if !(self.ssor_relaxation > 0.0 && self.ssor_relaxation < 2.0) {
            return Err(Error::Configuration(format!(
                "SSOR relaxation must lie in (0, 2), got {}",
                self.ssor_relaxation
            )));
        }
        Ok(solver_type)
    }
}

/// Solution statistics.
#[derive(Debug, Clone, PartialEq)]
pub struct SolveStats {
    /// Solver name used.
    pub solver: String,
    /// Number of iterations (0 for direct solvers).
    pub iterations: usize,
    /// Final residual norm ‖b − Ax‖.
    pub residual: f64,
    /// Wall-clock time in seconds.
    pub time_seconds: f64,
}

fn check_dimensions(matrix: &CsrMatrix, rhs: &[f64]) -> Result<()> {
    if matrix.nrows() != matrix.ncols() {
        return Err(Error::Solver("Matrix must be square".into()));
    }
    if matrix.nrows() != rhs.len() {
        return Err(Error::Solver("RHS size mismatch".into()));
    }
    Ok(())
}

/// Preconditioner interface: z = M⁻¹ r.
pub trait Preconditioner {
    /// Apply the inverse preconditioner to a residual.
    fn apply(&self, r: &DVector<f64>) -> DVector<f64>;
}

/// Symmetric successive over-relaxation preconditioner.
///
/// ```text
/// M = ω/(2−ω) · (D/ω + L) (D/ω)⁻¹ (D/ω + U)
/// ```
pub struct SsorPreconditioner<'a> {
    matrix: &'a CsrMatrix,
    diagonal: Vec<f64>,
    omega: f64,
}

impl<'a> SsorPreconditioner<'a> {
    /// Build from a matrix with strictly positive diagonal.
    pub fn new(matrix: &'a CsrMatrix, omega: f64) -> Result<Self> {
        let mut diagonal = vec![0.0; matrix.nrows()];
        for (i, row) in matrix.row_iter().enumerate() {
            if let Some(pos) = row.col_indices().iter().position(|&j| j == i) {
                diagonal[i] = row.values()[pos];
            }
        }
        if let Some(i) = diagonal.iter().position(|&d| d <= 0.0) {
            return Err(Error::SingularMatrix(format!(
                "non-positive diagonal entry {} at row {} (SSOR needs a positive diagonal)",
                diagonal[i], i
            )));
        }
        Ok(Self {
            matrix,
            diagonal,
            omega,
        })
    }
}

impl Preconditioner for SsorPreconditioner<'_> {
    fn apply(&self, r: &DVector<f64>) -> DVector<f64> {
        let n = r.len();
        let omega = self.omega;
        let offsets = self.matrix.row_offsets();
        let cols = self.matrix.col_indices();
        let vals = self.matrix.values();

        // Forward sweep: (D/ω + L) y = r
        let mut y = DVector::<f64>::zeros(n);
        for i in 0..n {
            let mut sum = r[i];
            for idx in offsets[i]..offsets[i + 1] {
                let j = cols[idx];
                if j < i {
                    sum -= vals[idx] * y[j];
                }
            }
            y[i] = sum * omega / self.diagonal[i];
        }

        // Scale by D/ω, then backward sweep: (D/ω + U) z = (D/ω) y
        let mut z = DVector::<f64>::zeros(n);
        for i in (0..n).rev() {
            let mut sum = self.diagonal[i] / omega * y[i];
            for idx in offsets[i]..offsets[i + 1] {
                let j = cols[idx];
                if j > i {
                    sum -= vals[idx] * z[j];
                }
            }
            z[i] = sum * omega / self.diagonal[i];
        }

        z * ((2.0 - omega) / omega)
    }
}

/// SSOR-preconditioned conjugate gradient solver.
///
/// Stops when ‖r‖ ≤ relative_tolerance · ‖b‖ or after
/// `n · max_iterations_multiplier` iterations, the latter being an error.
#[derive(Debug, Clone)]
pub struct ConjugateGradient {
    max_iterations_multiplier: usize,
    relative_tolerance: f64,
    relaxation: f64,
}

impl ConjugateGradient {
    /// Create a solver with explicit settings.
    pub fn new(max_iterations_multiplier: usize, relative_tolerance: f64, relaxation: f64) -> Self {
        Self {
            max_iterations_multiplier,
            relative_tolerance,
            relaxation,
        }
    }

    /// Create a solver from configuration.
    pub fn from_config(config: &SolverConfig) -> Self {
        Self::new(
            config.max_iterations_multiplier,
            config.relative_tolerance,
            config.ssor_relaxation,
        )
    }
}

impl Default for ConjugateGradient {
    fn default() -> Self {
        Self::from_config(&SolverConfig::default())
    }
}

impl LinearSolver for ConjugateGradient {
    fn solve(&self, matrix: &CsrMatrix, rhs: &[f64]) -> Result<(Vec<f64>, SolveStats)> {
        check_dimensions(matrix, rhs)?;
        let start = Instant::now();
        let n = rhs.len();
        let stats = |iterations, residual| SolveStats {
            solver: self.name().to_string(),
            iterations,
            residual,
            time_seconds: start.elapsed().as_secs_f64(),
        };

        let b = DVector::from_column_slice(rhs);
        let b_norm = b.norm();
        if b_norm == 0.0 {
            return Ok((vec![0.0; n], stats(0, 0.0)));
        }
        let tolerance = self.relative_tolerance * b_norm;
        let max_iterations = (n * self.max_iterations_multiplier).max(1);
        let preconditioner = SsorPreconditioner::new(matrix, self.relaxation)?;

        let mut x = DVector::<f64>::zeros(n);
        let mut r = b;
        let mut z = preconditioner.apply(&r);
        let mut p = z.clone();
        let mut rz = r.dot(&z);
        let mut residual = b_norm;

        for iteration in 1..=max_iterations {
            let q = matrix * &p;
            let pq = p.dot(&q);
            if pq <= 0.0 {
                return Err(Error::SingularMatrix(format!(
                    "matrix is not positive definite (pᵀAp = {:.3e} at CG iteration {})",
                    pq, iteration
                )));
            }
            let alpha = rz / pq;
            x.axpy(alpha, &p, 1.0);
            r.axpy(-alpha, &q, 1.0);

            residual = r.norm();
            if residual <= tolerance {
                debug!(iterations = iteration, residual, "CG converged");
                return Ok((x.as_slice().to_vec(), stats(iteration, residual)));
            }

            z = preconditioner.apply(&r);
            let rz_new = r.dot(&z);
            let beta = rz_new / rz;
            rz = rz_new;
            // p = z + β p
            p.axpy(1.0, &z, beta);
        }

        warn!(max_iterations, residual, tolerance, "CG reached its iteration cap");
        Err(Error::LinearSolve {
            iterations: max_iterations,
            residual,
            tolerance,
        })
    }

    fn name(&self) -> &str {
        "CG + SSOR"
    }
}

/// Convert nalgebra-sparse CSR matrix to faer SparseColMat (CSC format).
///
/// Each CSR row becomes a CSC column of the transpose; for the symmetric
/// tangent this is the matrix itself.
fn csr_to_faer_csc(csr: &CsrMatrix) -> SparseColMat<usize, f64> {
    let nrows = csr.nrows();
    let ncols = csr.ncols();
    let row_offsets = csr.row_offsets();
    let col_indices = csr.col_indices();
    let values = csr.values();

    let mut col_offsets = vec![0usize; ncols + 1];
    for &col in col_indices {
        col_offsets[col + 1] += 1;
    }
    for i in 0..ncols {
        col_offsets[i + 1] += col_offsets[i];
    }

    let nnz = values.len();
    let mut csc_row_indices = vec![0usize; nnz];
    let mut csc_values = vec![0.0f64; nnz];
    let mut col_positions = col_offsets[..ncols].to_vec();

    for row in 0..nrows {
        for idx in row_offsets[row]..row_offsets[row + 1] {
            let col = col_indices[idx];
            let pos = col_positions[col];
            csc_row_indices[pos] = row;
            csc_values[pos] = values[idx];
            col_positions[col] += 1;
        }
    }

    // SAFETY: offsets are monotone, row indices are in bounds and sorted
    // within each column because rows are visited in increasing order.
    unsafe {
        SparseColMat::new(
            SymbolicSparseColMat::new_unchecked(nrows, ncols, col_offsets, None, csc_row_indices),
            csc_values,
        )
    }
}

/// Sparse Cholesky solver using the faer library.
#[derive(Debug, Clone, Copy, Default)]
pub struct FaerCholeskySolver;

impl FaerCholeskySolver {
    /// Create a new sparse Cholesky solver.
    pub fn new() -> Self {
        Self
    }
}

impl LinearSolver for FaerCholeskySolver {
    fn solve(&self, matrix: &CsrMatrix, rhs: &[f64]) -> Result<(Vec<f64>, SolveStats)> {
        check_dimensions(matrix, rhs)?;
        let start = Instant::now();
        let n = matrix.nrows();
        let stats = |residual| SolveStats {
            solver: self.name().to_string(),
            iterations: 0,
            residual,
            time_seconds: start.elapsed().as_secs_f64(),
        };
        if n == 0 {
            return Ok((vec![], stats(0.0)));
        }

        let csc = csr_to_faer_csc(matrix);
        let csc_ref = csc.as_ref();

        let symbolic = SymbolicLlt::try_new(csc_ref.symbolic(), faer::Side::Lower)
            .map_err(|e| Error::Solver(format!("Symbolic Cholesky analysis failed: {:?}", e)))?;
        let llt = Llt::try_new_with_symbolic(symbolic, csc_ref, faer::Side::Lower).map_err(|e| {
            Error::SingularMatrix(format!("sparse Cholesky factorization failed: {:?}", e))
        })?;

        let mut x = faer::Mat::from_fn(n, 1, |i, _| rhs[i]);
        llt.solve_in_place(x.as_mut());
        let solution = DVector::from_fn(n, |i, _| x[(i, 0)]);

        let residual = (DVector::from_column_slice(rhs) - matrix * &solution).norm();
        Ok((solution.as_slice().to_vec(), stats(residual)))
    }

    fn name(&self) -> &str {
        "faer Sparse Cholesky (LLᵀ)"
    }
}

/// Build the configured solver.
///
/// # Errors
///
/// Returns [`Error::Configuration`] for an unknown solver name or invalid settings.
pub fn select_solver(config: &SolverConfig) -> Result<Box<dyn LinearSolver>> {
    match config.validate()? {
        SolverType::ConjugateGradient => Ok(Box::new(ConjugateGradient::from_config(config))),
        SolverType::Direct => Ok(Box::new(FaerCholeskySolver::new())),
    }
}

/// Solve for the Newton correction and make it satisfy the constraints.
///
/// # Returns
///
/// The correction and the (iterations, residual) statistics of the solve.
pub fn solve_linear_system(
    solver: &dyn LinearSolver,
    matrix: &CsrMatrix,
    rhs: &[f64],
    constraints: &ConstraintHandler,
) -> Result<(Vec<f64>, SolveStats)> {
    let (mut update, stats) = solver.solve(matrix, rhs)?;
    constraints.distribute(&mut update)?;
    debug!(
        solver = %stats.solver,
        iterations = stats.iterations,
        residual = stats.residual,
        "linear solve finished"
    );
    Ok((update, stats))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraints::ConstraintLine;
    use crate::sparse::TripletMatrix;
    use approx::assert_relative_eq;

    fn spd_3x3() -> CsrMatrix {
        // A = [4 2 0; 2 5 2; 0 2 3], solution of A x = [2; 8; 5] is [-3/16, 11/8, 3/4]
        let mut triplet = TripletMatrix::new(3, 3);
        triplet.add(0, 0, 4.0);
        triplet.add(0, 1, 2.0);
        triplet.add(1, 0, 2.0);
        triplet.add(1, 1, 5.0);
        triplet.add(1, 2, 2.0);
        triplet.add(2, 1, 2.0);
        triplet.add(2, 2, 3.0);
        triplet.to_csr().unwrap()
    }

    fn laplacian_1d(n: usize) -> CsrMatrix {
        let mut triplet = TripletMatrix::new(n, n);
        for i in 0..n {
            triplet.add(i, i, 2.0);
            if i + 1 < n {
                triplet.add(i, i + 1, -1.0);
                triplet.add(i + 1, i, -1.0);
            }
        }
        triplet.to_csr().unwrap()
    }

    #[test]
    fn test_solver_type_parsing() {
        assert_eq!("CG".parse::<SolverType>().unwrap(), SolverType::ConjugateGradient);
        assert_eq!("Direct".parse::<SolverType>().unwrap(), SolverType::Direct);
        assert!(matches!("GMRES".parse::<SolverType>(), Err(Error::Configuration(_))));
        assert_eq!(SolverType::ConjugateGradient.to_string(), "CG");
    }

    #[test]
    fn test_select_solver() {
        let solver = select_solver(&SolverConfig::default()).unwrap();
        assert_eq!(solver.name(), "CG + SSOR");

        let config = SolverConfig {
            solver_type: "Direct".into(),
            ..SolverConfig::default()
        };
        assert_eq!(select_solver(&config).unwrap().name(), "faer Sparse Cholesky (LLᵀ)");

        let config = SolverConfig {
            solver_type: "Bicgstab".into(),
            ..SolverConfig::default()
        };
        assert!(matches!(select_solver(&config), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_config_validation() {
        let mut config = SolverConfig::default();
        config.ssor_relaxation = 2.0;
        assert!(config.validate().is_err());
        config.ssor_relaxation = 1.0;
        config.max_iterations_multiplier = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_cg_3x3_spd() {
        let (x, stats) = ConjugateGradient::default()
            .solve(&spd_3x3(), &[2.0, 8.0, 5.0])
            .unwrap();
        let expected = [-0.1875, 1.375, 0.75];
        for i in 0..3 {
            assert_relative_eq!(x[i], expected[i], epsilon = 1e-8);
        }
        assert!(stats.iterations >= 1 && stats.iterations <= 3);
        assert!(stats.residual <= 1e-9 * DVector::from_column_slice(&[2.0, 8.0, 5.0]).norm());
    }

    #[test]
    fn test_cg_zero_rhs() {
        let (x, stats) = ConjugateGradient::default()
            .solve(&spd_3x3(), &[0.0, 0.0, 0.0])
            .unwrap();
        assert!(x.iter().all(|&v| v == 0.0));
        assert_eq!(stats.iterations, 0);
    }

    #[test]
    fn test_cg_larger_system_matches_direct() {
        let n = 40;
        let a = laplacian_1d(n);
        let b: Vec<f64> = (0..n).map(|i| (i as f64 * 0.3).sin()).collect();

        let (x_cg, stats) = ConjugateGradient::new(2, 1e-12, 1.2).solve(&a, &b).unwrap();
        let (x_direct, _) = FaerCholeskySolver::new().solve(&a, &b).unwrap();
        for i in 0..n {
            assert_relative_eq!(x_cg[i], x_direct[i], epsilon = 1e-6, max_relative = 1e-8);
        }
        assert!(stats.iterations < 2 * n);
    }

    #[test]
    fn test_cg_iteration_cap() {
        let n = 20;
        let a = laplacian_1d(n);
        let b = vec![1.0; n];
        // Unreachable tolerance forces the cap of n iterations
        let result = ConjugateGradient::new(1, 1e-30, 1.2).solve(&a, &b);
        match result {
            Err(Error::LinearSolve { iterations, .. }) => assert_eq!(iterations, n),
            other => panic!("expected LinearSolve error, got {:?}", other.map(|(_, s)| s)),
        }
    }

    #[test]
    fn test_cg_diagonal_one_iteration() {
        let n = 10;
        let mut triplet = TripletMatrix::new(n, n);
        for i in 0..n {
            triplet.add(i, i, 1.0 + i as f64 * 1e3);
        }
        // SSOR is exact for a diagonal matrix when omega = 1
        let (_, stats) = ConjugateGradient::new(1, 1e-9, 1.0)
            .solve(&triplet.to_csr().unwrap(), &vec![1.0; n])
            .unwrap();
        assert_eq!(stats.iterations, 1);
    }

    #[test]
    fn test_cg_rejects_indefinite() {
        let mut triplet = TripletMatrix::new(2, 2);
        triplet.add(0, 0, 1.0);
        triplet.add(0, 1, 2.0);
        triplet.add(1, 0, 2.0);
        triplet.add(1, 1, 1.0);
        let result = ConjugateGradient::default().solve(&triplet.to_csr().unwrap(), &[1.0, -1.0]);
        assert!(result.is_err());
    }

    #[test]
    fn test_ssor_nonpositive_diagonal() {
        let mut triplet = TripletMatrix::new(2, 2);
        triplet.add(0, 0, 1.0);
        triplet.add(0, 1, 1.0);
        triplet.add(1, 0, 1.0);
        let a = triplet.to_csr().unwrap();
        assert!(matches!(SsorPreconditioner::new(&a, 1.2), Err(Error::SingularMatrix(_))));
    }

    #[test]
    fn test_ssor_is_symmetric_operator() {
        let a = spd_3x3();
        let m = SsorPreconditioner::new(&a, 1.2).unwrap();
        let u = DVector::from_column_slice(&[1.0, -2.0, 0.5]);
        let v = DVector::from_column_slice(&[0.3, 0.7, -1.1]);
        assert_relative_eq!(u.dot(&m.apply(&v)), v.dot(&m.apply(&u)), epsilon = 1e-12);
    }

    #[test]
    fn test_faer_cholesky_3x3_spd() {
        let (x, stats) = FaerCholeskySolver::new()
            .solve(&spd_3x3(), &[2.0, 8.0, 5.0])
            .unwrap();
        let expected = [-0.1875, 1.375, 0.75];
        for i in 0..3 {
            assert_relative_eq!(x[i], expected[i], epsilon = 1e-10);
        }
        assert!(stats.residual < 1e-12);
    }

    #[test]
    fn test_faer_cholesky_not_positive_definite() {
        let mut triplet = TripletMatrix::new(2, 2);
        triplet.add(0, 0, 1.0);
        triplet.add(0, 1, 2.0);
        triplet.add(1, 0, 2.0);
        triplet.add(1, 1, 1.0);
        let result = FaerCholeskySolver::new().solve(&triplet.to_csr().unwrap(), &[1.0, 1.0]);
        assert!(result.is_err());
    }

    #[test]
    fn test_reported_residual_is_true_residual() {
        let a = laplacian_1d(12);
        let rhs: Vec<f64> = (0..12).map(|i| 1.0 + i as f64).collect();
        let b = DVector::from_column_slice(&rhs);
        let solvers: [Box<dyn LinearSolver>; 2] = [
            Box::new(ConjugateGradient::new(2, 1e-10, 1.2)),
            Box::new(FaerCholeskySolver::new()),
        ];
        for solver in &solvers {
            let (x, stats) = solver.solve(&a, &rhs).unwrap();
            let true_residual = (&b - &a * &DVector::from_vec(x)).norm();
            assert_relative_eq!(stats.residual, true_residual, epsilon = 1e-9);
            assert!(true_residual <= 1e-10 * b.norm() * 10.0);
        }
    }

    #[test]
    fn test_rhs_mismatch() {
        let a = spd_3x3();
        assert!(ConjugateGradient::default().solve(&a, &[1.0]).is_err());
        assert!(FaerCholeskySolver::new().solve(&a, &[1.0]).is_err());
    }

    #[test]
    fn test_solve_linear_system_distributes_constraints() {
        // Row 2 eliminated with prescribed value 0.25
        let mut constraints = ConstraintHandler::new(3);
        constraints.add_constraint(ConstraintLine::fixed(2, 0.25)).unwrap();
        constraints.close().unwrap();

        let mut triplet = TripletMatrix::new(3, 3);
        triplet.add(0, 0, 2.0);
        triplet.add(1, 1, 4.0);
        triplet.add(2, 2, 1.0);
        let a = triplet.to_csr().unwrap();

        let solver = ConjugateGradient::default();
        let (x, stats) = solve_linear_system(&solver, &a, &[2.0, 2.0, 7.0], &constraints).unwrap();
        assert_relative_eq!(x[0], 1.0, epsilon = 1e-10);
        assert_relative_eq!(x[1], 0.5, epsilon = 1e-10);
        assert_relative_eq!(x[2], 0.25);
        assert!(stats.iterations >= 1);
    }
}
