//! HyperFEM Core - quasi-static finite-strain solid mechanics
//!
//! Finite element library for hyperelastic bodies under incremental loading:
//! - Neo-Hookean material law with its consistent spatial tangent
//! - Tensor-product Lagrange elements in 2D and 3D (const generic dimension)
//! - Parallel assembly using Rayon
//! - Constraint elimination for Dirichlet and hanging-node relations
//! - Newton-Raphson iteration inside a load-stepping loop
//! - Iterative (CG + SSOR) and direct (sparse Cholesky) linear solvers
//!
//! # Architecture
//!
//! The solver is designed around these core abstractions:
//!
//! - [`Hyperelastic`] trait: Stress and tangent as functions of F
//! - [`Discretization`] trait: DoF layout, quadrature values and boundary tags
//! - [`Mesh`]: Concrete structured/unstructured Lagrange mesh
//! - [`ConstraintHandler`]: Affine relations between DoFs
//! - [`LinearSolver`] trait: Linear system solution strategies
//! - [`SolidSolver`]: Load stepping around the Newton-Raphson driver
//!
//! # Example
//!
//! ```no_run
//! use hyperfem_core::{MemoryOutput, Mesh, SolidConfig, SolidSolver};
//! use nalgebra::Vector3;
//!
//! let mesh = Mesh::hyper_rectangle(Vector3::zeros(), Vector3::new(1.0, 1.0, 1.0), [4, 4, 4], 1)?;
//! let config = SolidConfig::default().with_boundary_ids(0, 1);
//! let mut solver = SolidSolver::from_config(config, &mesh)?;
//! let mut output = MemoryOutput::new();
//! let report = solver.run(&mut output)?;
//! println!("{} Newton iterations", report.total_newton_iterations());
//! # Ok::<(), hyperfem_core::Error>(())
//! ```

pub mod tensor;
pub mod kinematics;
pub mod material;
pub mod element;
pub mod mesh;
pub mod sparse;
pub mod constraints;
pub mod assembly;
pub mod solver;
pub mod newton;
pub mod load_stepping;
pub mod stress;
pub mod config;
pub mod error;

pub use tensor::{Tensor2, Tensor4, Vector};
pub use material::{Hyperelastic, NeoHookean};
pub use element::{BoundaryId, Discretization};
pub use mesh::Mesh;
pub use sparse::CsrMatrix;
pub use constraints::{ConstraintHandler, ConstraintLine};
pub use assembly::{Assembler, BoundaryCondition};
pub use solver::{select_solver, LinearSolver, SolverConfig, SolverType};
pub use newton::{NewtonPhase, NewtonRaphson, NewtonState};
pub use load_stepping::{MemoryOutput, NullOutput, OutputSink, SolidSolver, SolveReport, StepReport};
pub use stress::{recover_stresses, StressField};
pub use config::SolidConfig;
pub use error::{Error, Result};
