//! Dense linear-system backends and their registry.

pub mod backend;
pub mod registry;

pub use backend::{FaerSolver, GaussSolver, LinearSystemBackend};
pub use registry::LinearSolverKind;
