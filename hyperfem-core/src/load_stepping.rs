//! Incremental loading of a hyperelastic body.
//!
//! The full load is applied in `n_steps` equal increments. Every step starts
//! from a zero increment, runs Newton-Raphson to equilibrium and commits the
//! converged increment to the total displacement:
//!
//! ```text
//! for step in 1..=n_steps:
//!     Δu = 0
//!     newton(u_n, Δu)
//!     u_n += Δu
//!     output(step, u_n)
//! ```

use crate::assembly::BoundaryCondition;
use crate::config::SolidConfig;
use crate::constraints::ConstraintHandler;
use crate::element::Discretization;
use crate::error::{Error, Result};
use crate::material::{Hyperelastic, NeoHookean};
use crate::newton::{NewtonPhase, NewtonRaphson, NewtonSettings, NewtonState};
use crate::solver::{select_solver, LinearSolver};
use crate::sparse::GlobalSystem;
use crate::stress::{recover_stresses, StressField};
use std::time::Instant;
use tracing::info;

/// Receiver of the accepted solutions.
pub trait OutputSink {
    /// Called with step 0 for the initial state and after every accepted step.
    fn write_step(&mut self, step: usize, solution: &[f64]) -> Result<()>;
}

/// Keeps a copy of every emitted solution.
#[derive(Debug, Clone, Default)]
pub struct MemoryOutput {
    /// `(step, total displacement)` pairs in emission order.
    pub snapshots: Vec<(usize, Vec<f64>)>,
}

impl MemoryOutput {
    /// Empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Most recent snapshot.
    pub fn last(&self) -> Option<&(usize, Vec<f64>)> {
        self.snapshots.last()
    }
}

impl OutputSink for MemoryOutput {
    fn write_step(&mut self, step: usize, solution: &[f64]) -> Result<()> {
        self.snapshots.push((step, solution.to_vec()));
        Ok(())
    }
}

/// Discards every solution.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullOutput;

impl OutputSink for NullOutput {
    fn write_step(&mut self, _step: usize, _solution: &[f64]) -> Result<()> {
        Ok(())
    }
}

/// Progress of the load stepping.
#[derive(Debug, Clone)]
pub struct LoadStepState {
    /// Last accepted step (0 before the first one).
    pub step: usize,
    /// Number of equal load increments.
    pub n_steps: usize,
    /// Total displacement after the last accepted step.
    pub solution_n: Vec<f64>,
}

impl LoadStepState {
    /// Zero displacement before the first step.
    pub fn new(n_dofs: usize, n_steps: usize) -> Self {
        Self {
            step: 0,
            n_steps,
            solution_n: vec![0.0; n_dofs],
        }
    }

    /// Fraction of the full load reached by the last accepted step.
    pub fn load_fraction(&self) -> f64 {
        self.step as f64 / self.n_steps as f64
    }

    /// Whether every load step has been accepted.
    pub fn is_finished(&self) -> bool {
        self.step >= self.n_steps
    }
}

/// Summary of one accepted load step.
#[derive(Debug, Clone)]
pub struct StepReport {
    /// Step number, starting at 1.
    pub step: usize,
    /// Fraction of the full load after this step.
    pub load_fraction: f64,
    /// Linear solves needed to converge.
    pub newton_iterations: usize,
    /// Final normalized residual.
    pub residual: f64,
    /// Converged increment Δu added to the total displacement.
    pub increment: Vec<f64>,
}

/// Summary of a complete run.
#[derive(Debug, Clone, Default)]
pub struct SolveReport {
    /// Reports of the accepted steps, in order.
    pub steps: Vec<StepReport>,
    /// Wall-clock time in seconds.
    pub time_seconds: f64,
}

impl SolveReport {
    /// Linear solves summed over all steps.
    pub fn total_newton_iterations(&self) -> usize {
        self.steps.iter().map(|s| s.newton_iterations).sum()
    }

    /// Number of accepted steps.
    pub fn n_steps(&self) -> usize {
        self.steps.len()
    }
}

/// Quasi-static solver for a hyperelastic body under incremental loading.
pub struct SolidSolver<'a, const D: usize, X, M = NeoHookean>
where
    X: Discretization<D>,
    M: Hyperelastic<D>,
{
    config: SolidConfig,
    discretization: &'a X,
    material: M,
    boundary_conditions: Vec<BoundaryCondition>,
    linear_solver: Box<dyn LinearSolver>,
    state: LoadStepState,
    newton_state: NewtonState,
    constraints: ConstraintHandler,
    system: GlobalSystem,
}

impl<'a, const D: usize, X> SolidSolver<'a, D, X, NeoHookean>
where
    X: Discretization<D>,
{
    /// Neo-Hookean solver with the boundary conditions described by `config`:
    /// every component clamped on the Dirichlet boundary and the traction on
    /// the Neumann boundary.
    pub fn from_config(config: SolidConfig, discretization: &'a X) -> Result<Self> {
        let material = config.material()?;
        let boundary_conditions = config.boundary_conditions(D);
        Self::new(config, discretization, material, boundary_conditions)
    }
}

impl<'a, const D: usize, X, M> SolidSolver<'a, D, X, M>
where
    X: Discretization<D>,
    M: Hyperelastic<D>,
{
    /// Set up the solver.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] for invalid parameters, an
    /// unsupported linear solver name or a polynomial degree that differs
    /// from the discretization's.
    pub fn new(
        config: SolidConfig,
        discretization: &'a X,
        material: M,
        boundary_conditions: Vec<BoundaryCondition>,
    ) -> Result<Self> {
        config.validate()?;
        if config.polynomial_degree != discretization.degree() {
            return Err(Error::Configuration(format!(
                "configured polynomial degree {} does not match the discretization degree {}",
                config.polynomial_degree,
                discretization.degree()
            )));
        }
        let linear_solver = select_solver(&config.linear_solver)?;
        let n_dofs = discretization.n_dofs();

        info!(
            n_cells = discretization.n_cells(),
            n_dofs,
            load_steps = config.load_steps,
            solver = linear_solver.name(),
            "solid solver initialized"
        );

        Ok(Self {
            state: LoadStepState::new(n_dofs, config.load_steps),
            newton_state: NewtonState::new(n_dofs),
            constraints: ConstraintHandler::new(n_dofs),
            system: GlobalSystem::new(n_dofs),
            config,
            discretization,
            material,
            boundary_conditions,
            linear_solver,
        })
    }

    /// Configuration the solver was built with.
    pub fn config(&self) -> &SolidConfig {
        &self.config
    }

    /// Load-stepping progress.
    pub fn state(&self) -> &LoadStepState {
        &self.state
    }

    /// Newton state of the most recent step.
    pub fn newton_state(&self) -> &NewtonState {
        &self.newton_state
    }

    /// Material law shared by all elements.
    pub fn material(&self) -> &M {
        &self.material
    }

    /// Total displacement after the last accepted step.
    pub fn solution(&self) -> &[f64] {
        &self.state.solution_n
    }

    /// Run the next load step.
    ///
    /// The total displacement only changes when the step converges.
    ///
    /// # Errors
    ///
    /// [`Error::ConvergenceFailure`] and every assembly or solver error are
    /// propagated unchanged; [`Error::Configuration`] once all steps are done.
    pub fn advance(&mut self) -> Result<StepReport> {
        if self.state.is_finished() {
            return Err(Error::Configuration(format!(
                "all {} load steps have been completed",
                self.state.n_steps
            )));
        }
        let step = self.state.step + 1;
        let n_steps = self.state.n_steps;

        let newton = NewtonRaphson::new(
            self.discretization,
            &self.material,
            &self.boundary_conditions,
            self.linear_solver.as_ref(),
            NewtonSettings::from(&self.config),
        );
        newton.solve_step(
            &mut self.newton_state,
            &self.state.solution_n,
            step,
            n_steps,
            &mut self.constraints,
            &mut self.system,
        )?;

        for (u, du) in self
            .state
            .solution_n
            .iter_mut()
            .zip(&self.newton_state.solution_delta)
        {
            *u += du;
        }
        self.state.step = step;

        let newton_iterations = match self.newton_state.phase {
            NewtonPhase::Converged { iterations } => iterations,
            _ => self.newton_state.iterations(),
        };
        let report = StepReport {
            step,
            load_fraction: self.state.load_fraction(),
            newton_iterations,
            residual: self.newton_state.residual.normalized,
            increment: self.newton_state.solution_delta.clone(),
        };
        info!(
            step,
            n_steps,
            load_fraction = report.load_fraction,
            newton_iterations,
            residual = report.residual,
            "load step converged"
        );
        Ok(report)
    }

    /// Run every remaining load step, emitting the initial state first.
    pub fn run(&mut self, output: &mut dyn OutputSink) -> Result<SolveReport> {
        let start = Instant::now();
        if self.state.step == 0 {
            output.write_step(0, &self.state.solution_n)?;
        }

        let mut report = SolveReport::default();
        while !self.state.is_finished() {
            let step_report = self.advance()?;
            output.write_step(step_report.step, &self.state.solution_n)?;
            report.steps.push(step_report);
        }
        report.time_seconds = start.elapsed().as_secs_f64();

        info!(
            steps = report.n_steps(),
            newton_iterations = report.total_newton_iterations(),
            time_seconds = report.time_seconds,
            "load stepping finished"
        );
        Ok(report)
    }

    /// Cauchy stresses of the current total displacement.
    pub fn stresses(&self) -> Result<StressField<D>> {
        recover_stresses(self.discretization, &self.material, &self.state.solution_n)
    }
}
