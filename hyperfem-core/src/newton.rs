//! Newton-Raphson iteration for one load step.
//!
//! Each iteration assembles the tangent and out-of-balance force at the
//! current total displacement, checks the residual, and otherwise solves for a
//! correction:
//!
//! ```text
//! Init → Iterating(0) → Iterating(1) → … → Converged | Failed
//! ```
//!
//! Dirichlet increments enter through the constraints of iteration 0 only;
//! later iterations reuse the same constraint structure made homogeneous.

use crate::assembly::{Assembler, BoundaryCondition};
use crate::config::SolidConfig;
use crate::constraints::{ConstraintHandler, ConstraintLine};
use crate::element::Discretization;
use crate::error::{Error, Result};
use crate::material::Hyperelastic;
use crate::solver::{solve_linear_system, LinearSolver};
use crate::sparse::GlobalSystem;
use tracing::{debug, warn};

/// Iteration limits and tolerances.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NewtonSettings {
    /// Iterations allowed before the step fails.
    pub max_iterations: usize,
    /// Bound on the normalized residual that ends the iteration.
    pub residual_tolerance: f64,
    /// Bound on the normalized update; reported, not used for convergence.
    pub displacement_tolerance: f64,
}

impl From<&SolidConfig> for NewtonSettings {
    fn from(config: &SolidConfig) -> Self {
        Self {
            max_iterations: config.max_newton_iterations,
            residual_tolerance: config.residual_tolerance,
            displacement_tolerance: config.displacement_tolerance,
        }
    }
}

/// Absolute and normalized norm of a quantity tracked over the iterations.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ResidualErrors {
    /// Latest ℓ² norm.
    pub norm: f64,
    /// First recorded norm of the load step.
    pub baseline: f64,
    /// `norm / baseline`, or `norm` while the baseline is zero.
    pub normalized: f64,
}

impl ResidualErrors {
    /// Forget the norms and the baseline.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Store a new norm; the first call of a step sets the baseline.
    pub fn record(&mut self, norm: f64, is_first: bool) {
        self.norm = norm;
        if is_first {
            self.baseline = norm;
        }
        self.normalized = if self.baseline != 0.0 {
            norm / self.baseline
        } else {
            norm
        };
    }
}

/// Phase of the Newton state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NewtonPhase {
    /// Step not started.
    Init,
    /// Inside the given iteration.
    Iterating(usize),
    /// Residual below tolerance after `iterations` linear solves.
    Converged { iterations: usize },
    /// Iteration cap reached.
    Failed { iterations: usize },
}

/// Diagnostics of one Newton iteration.
#[derive(Debug, Clone, PartialEq)]
pub struct IterationRecord {
    /// Zero-based iteration index.
    pub iteration: usize,
    /// ℓ² norm of the out-of-balance force over unconstrained DoFs.
    pub residual_norm: f64,
    /// Residual norm over the first residual norm of the step.
    pub normalized_residual: f64,
    /// Linear solve iterations, absent when the iteration converged before solving.
    pub linear_iterations: Option<usize>,
    /// Final residual of the linear solve.
    pub linear_residual: Option<f64>,
    /// Normalized correction norm over unconstrained DoFs.
    pub normalized_update: Option<f64>,
}

/// Mutable state of one load step.
#[derive(Debug, Clone)]
pub struct NewtonState {
    /// Accumulated displacement increment of the current step.
    pub solution_delta: Vec<f64>,
    /// Out-of-balance force norms.
    pub residual: ResidualErrors,
    /// Newton correction norms.
    pub update: ResidualErrors,
    /// Current phase.
    pub phase: NewtonPhase,
    /// Every phase entered during the current step, in order.
    pub transitions: Vec<NewtonPhase>,
    /// Diagnostics of every iteration of the current step.
    pub history: Vec<IterationRecord>,
}

impl NewtonState {
    /// State in `Init` with a zero increment of `n_dofs` entries.
    pub fn new(n_dofs: usize) -> Self {
        Self {
            solution_delta: vec![0.0; n_dofs],
            residual: ResidualErrors::default(),
            update: ResidualErrors::default(),
            phase: NewtonPhase::Init,
            transitions: vec![NewtonPhase::Init],
            history: Vec::new(),
        }
    }

    /// Back to `Init` with a zero increment.
    pub fn reset(&mut self) {
        self.solution_delta.iter_mut().for_each(|v| *v = 0.0);
        self.residual.reset();
        self.update.reset();
        self.history.clear();
        self.transitions.clear();
        self.enter(NewtonPhase::Init);
    }

    fn enter(&mut self, phase: NewtonPhase) {
        self.phase = phase;
        self.transitions.push(phase);
    }

    /// Number of linear solves performed so far in this step.
    pub fn iterations(&self) -> usize {
        self.history
            .iter()
            .filter(|r| r.linear_iterations.is_some())
            .count()
    }
}

/// Newton-Raphson driver for one load step.
pub struct NewtonRaphson<'a, const D: usize, X, M>
where
    X: Discretization<D>,
    M: Hyperelastic<D>,
{
    discretization: &'a X,
    boundary_conditions: &'a [BoundaryCondition],
    assembler: Assembler<'a, D, X, M>,
    solver: &'a dyn LinearSolver,
    settings: NewtonSettings,
}

impl<'a, const D: usize, X, M> NewtonRaphson<'a, D, X, M>
where
    X: Discretization<D>,
    M: Hyperelastic<D>,
{
    /// Driver borrowing the problem data for the duration of a step.
    pub fn new(
        discretization: &'a X,
        material: &'a M,
        boundary_conditions: &'a [BoundaryCondition],
        solver: &'a dyn LinearSolver,
        settings: NewtonSettings,
    ) -> Self {
        Self {
            discretization,
            boundary_conditions,
            assembler: Assembler::new(discretization, material, boundary_conditions),
            solver,
            settings,
        }
    }

    /// Iteration limits and tolerances.
    pub fn settings(&self) -> &NewtonSettings {
        &self.settings
    }

    /// Build the constraints for a Newton iteration.
    ///
    /// Iteration 0 rebuilds compatibility relations and the Dirichlet
    /// increments `value / n_steps`; later iterations only zero the
    /// inhomogeneities.
    pub fn make_constraints(
        &self,
        iteration: usize,
        n_steps: usize,
        constraints: &mut ConstraintHandler,
    ) -> Result<()> {
        if iteration >= 1 {
            constraints.make_homogeneous();
            return Ok(());
        }

        constraints.clear();
        for line in self.discretization.compatibility_constraints() {
            constraints.add_constraint(line)?;
        }
        for bc in self.boundary_conditions {
            if let BoundaryCondition::Displacement {
                boundary_id,
                component,
                value,
            } = *bc
            {
                if component >= D {
                    return Err(Error::Configuration(format!(
                        "displacement component {} out of range for dimension {}",
                        component, D
                    )));
                }
                let increment = value / n_steps as f64;
                for dof in self.discretization.boundary_dofs(boundary_id, component) {
                    constraints.add_constraint(ConstraintLine::fixed(dof, increment))?;
                }
            }
        }
        constraints.close()
    }

    /// Run Newton iterations for `step` of `n_steps`.
    ///
    /// On success `state.solution_delta` holds the converged increment.
    ///
    /// # Errors
    ///
    /// [`Error::ConvergenceFailure`] when the iteration cap is reached; any
    /// assembly or linear-solve error is propagated unchanged.
    pub fn solve_step(
        &self,
        state: &mut NewtonState,
        solution_n: &[f64],
        step: usize,
        n_steps: usize,
        constraints: &mut ConstraintHandler,
        system: &mut GlobalSystem,
    ) -> Result<()> {
        let n_dofs = self.discretization.n_dofs();
        if solution_n.len() != n_dofs || state.solution_delta.len() != n_dofs {
            return Err(Error::Assembly(format!(
                "state holds {} DoFs, discretization has {}",
                state.solution_delta.len(),
                n_dofs
            )));
        }
        state.reset();
        let load_fraction = step as f64 / n_steps as f64;

        for iteration in 0..self.settings.max_iterations {
            state.enter(NewtonPhase::Iterating(iteration));

            self.make_constraints(iteration, n_steps, constraints)?;

            let total: Vec<f64> = solution_n
                .iter()
                .zip(&state.solution_delta)
                .map(|(u, du)| u + du)
                .collect();
            self.assembler
                .assemble(&total, load_fraction, constraints, system)?;

            let residual_norm = unconstrained_norm(&system.rhs, constraints);
            state.residual.record(residual_norm, iteration == 0);

            let mut record = IterationRecord {
                iteration,
                residual_norm,
                normalized_residual: state.residual.normalized,
                linear_iterations: None,
                linear_residual: None,
                normalized_update: None,
            };

            if iteration > 0 && state.residual.normalized <= self.settings.residual_tolerance {
                debug!(
                    step,
                    iteration,
                    residual = state.residual.normalized,
                    "Newton converged"
                );
                state.history.push(record);
                state.enter(NewtonPhase::Converged {
                    iterations: iteration,
                });
                return Ok(());
            }

            let matrix = system.matrix.to_csr()?;
            let (newton_update, stats) =
                solve_linear_system(self.solver, &matrix, &system.rhs, constraints)?;
            for (du, dx) in state.solution_delta.iter_mut().zip(&newton_update) {
                *du += dx;
            }

            state
                .update
                .record(unconstrained_norm(&newton_update, constraints), iteration == 0);
            record.linear_iterations = Some(stats.iterations);
            record.linear_residual = Some(stats.residual);
            record.normalized_update = Some(state.update.normalized);

            debug!(
                step,
                iteration,
                residual = state.residual.normalized,
                update = state.update.normalized,
                update_below_tolerance =
                    state.update.normalized <= self.settings.displacement_tolerance,
                linear_iterations = stats.iterations,
                linear_residual = stats.residual,
                "Newton iteration"
            );
            state.history.push(record);
        }

        let iterations = self.settings.max_iterations;
        state.enter(NewtonPhase::Failed { iterations });
        warn!(
            step,
            iterations,
            residual = state.residual.normalized,
            "Newton iteration cap reached"
        );
        Err(Error::ConvergenceFailure {
            step,
            iterations,
            residual: state.residual.normalized,
        })
    }
}

/// ℓ² norm over the DoFs that carry no constraint.
fn unconstrained_norm(vector: &[f64], constraints: &ConstraintHandler) -> f64 {
    vector
        .iter()
        .enumerate()
        .filter(|(i, _)| !constraints.is_constrained(*i))
        .map(|(_, v)| v * v)
        .sum::<f64>()
        .sqrt()
}
