//! # gflow-algo: Steady-State Power Flow
//!
//! Solves the bus voltages of a network snapshot and derives everything that
//! follows from them: injections, branch flows, losses, loading and limit
//! violations.
//!
//! ## Methods
//!
//! | Method | Notes |
//! |--------|-------|
//! | [`SolverType::NewtonRaphson`] | Polar NR with backtracking |
//! | [`SolverType::IwamotoNr`] | NR with the optimal multiplier |
//! | [`SolverType::LevenbergMarquardt`] | Damped least squares |
//! | [`SolverType::FastDecoupled`] | XB scheme (B′, B″) |
//! | [`SolverType::NewtonRaphsonCurrent`] | Current-mismatch Newton |
//! | [`SolverType::HolomorphicEmbedding`] | HELM with Padé-type continuation |
//! | [`SolverType::DcLinear`] | DC approximation |
//! | [`SolverType::LinearAc`] | Linearised AC |
//!
//! ## Pipeline
//!
//! ```text
//! NetworkSnapshot ─▶ CalculationInputs ─▶ islands ─▶ retry( outer loop( method ) ) ─▶ NetworkResult
//! ```
//!
//! Islands are solved independently, in parallel with the `desktop` feature.
//! Diagnostics are collected in a [`gflow_core::Logger`] and returned with the
//! result.

pub mod power_flow;
pub mod sparse;

pub use power_flow::{
    ConvergenceReport, NetworkResult, PowerFlowDriver, PowerFlowOptions, SolverType,
};
pub use sparse::{AdmittanceModel, SparseComplexMatrix};
