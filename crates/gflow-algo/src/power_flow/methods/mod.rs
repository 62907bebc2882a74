//! Numerical power-flow methods behind one dispatch point.
//!
//! Every method takes the same [`MethodInput`] and returns the same six-field
//! [`SolverOutput`]. A method never fails: a singular system or a divergent
//! iterate is reported as `converged = false` with the last attempted voltage.
//!
//! ```text
//! ┌──────────────────────────┬──────────────────────────────────────────────┐
//! │  METHOD                  │  NOTES                                       │
//! │──────────────────────────│──────────────────────────────────────────────│
//! │  NewtonRaphson           │  polar NR, backtracking line search          │
//! │  IwamotoNR               │  NR with the optimal step multiplier          │
//! │  LevenbergMarquardt      │  damped least squares on the NR Jacobian     │
//! │  FastDecoupled           │  XB scheme, B′ / B″ half iterations          │
//! │  NewtonRaphsonCurrent    │  current-mismatch Newton                     │
//! │  DcLinear                │  B′θ = P, magnitudes from the seed            │
//! │  LinearAc                │  linearised AC around a flat profile          │
//! │  HolomorphicEmbedding    │  power series + Wynn epsilon, PQ-only grids  │
//! └──────────────────────────┴──────────────────────────────────────────────┘
//! ```

pub mod common;
pub mod fast_decoupled;
pub mod helm;
pub mod iwamoto;
pub mod levenberg_marquardt;
pub mod linear;
pub mod newton_current;
pub mod newton_raphson;

use super::options::SolverType;
use crate::sparse::SparseComplexMatrix;
use gflow_core::{LinearSystemBackend, Logger};
use num_complex::Complex64;
use serde::Serialize;
use sprs::CsMat;

/// Everything a method needs for one inner solve.
pub struct MethodInput<'a> {
    /// Initial voltage
    pub v0: &'a [Complex64],
    pub sbus: &'a [Complex64],
    pub ibus: &'a [Complex64],
    pub ybus: &'a SparseComplexMatrix,
    pub yseries: &'a SparseComplexMatrix,
    pub b1: &'a CsMat<f64>,
    pub b2: &'a CsMat<f64>,
    pub pq: &'a [usize],
    pub pv: &'a [usize],
    pub slack: &'a [usize],
    pub pqpv: &'a [usize],
    pub tolerance: f64,
    pub max_iterations: usize,
    /// Allow the Iwamoto optimal multiplier
    pub robust: bool,
    pub backend: &'a dyn LinearSystemBackend,
}

impl MethodInput<'_> {
    /// PV buses followed by PQ buses
    pub fn pvpq(&self) -> Vec<usize> {
        let mut out = Vec::with_capacity(self.pv.len() + self.pq.len());
        out.extend_from_slice(self.pv);
        out.extend_from_slice(self.pq);
        out
    }
}

/// Uniform result of every method.
#[derive(Debug, Clone, Serialize)]
pub struct SolverOutput {
    pub v: Vec<Complex64>,
    pub converged: bool,
    /// Infinity norm of the final mismatch
    pub norm_f: f64,
    pub scalc: Vec<Complex64>,
    pub iterations: usize,
    /// Wall time in seconds
    pub elapsed: f64,
}

impl SolverOutput {
    /// Result for a network with nothing to solve.
    pub(crate) fn trivial(input: &MethodInput<'_>, elapsed: f64) -> Self {
        Self {
            v: input.v0.to_vec(),
            converged: true,
            norm_f: 0.0,
            scalc: common::compute_power(input.ybus, input.v0, input.ibus),
            iterations: 0,
            elapsed,
        }
    }
}

/// Run `method` on `input`.
///
/// Holomorphic embedding handles PQ and slack buses only; a network with PV
/// buses is reported and solved with Levenberg-Marquardt instead.
pub fn solve(method: SolverType, input: &MethodInput<'_>, logger: &mut Logger) -> SolverOutput {
    match method {
        SolverType::NewtonRaphson => newton_raphson::solve(input, logger),
        SolverType::IwamotoNr => iwamoto::solve(input, logger),
        SolverType::LevenbergMarquardt => levenberg_marquardt::solve(input, logger),
        SolverType::FastDecoupled => fast_decoupled::solve(input, logger),
        SolverType::NewtonRaphsonCurrent => newton_current::solve(input, logger),
        SolverType::DcLinear => linear::solve_dc(input, logger),
        SolverType::LinearAc => linear::solve_linear_ac(input, logger),
        SolverType::HolomorphicEmbedding => {
            if input.pv.is_empty() {
                helm::solve(input, logger)
            } else {
                logger.warn(
                    "solver",
                    "holomorphic embedding does not support PV buses; using levenberg_marquardt",
                );
                levenberg_marquardt::solve(input, logger)
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests_support;
