//! Retry with alternative methods when the primary one fails.

use super::inputs::CalculationInputs;
use super::options::{PowerFlowOptions, SolverType};
use super::outer_loop::{run_outer_loop, SolveResult};
use super::report::ConvergenceReport;
use gflow_core::{LinearSystemBackend, Logger};
use num_complex::Complex64;
use std::sync::atomic::AtomicBool;

/// Fallback order after the primary method
const FALLBACKS: [SolverType; 4] = [
    SolverType::IwamotoNr,
    SolverType::FastDecoupled,
    SolverType::LevenbergMarquardt,
    SolverType::LinearAc,
];

/// Methods tried for `primary`, in order.
pub fn retry_candidates(primary: SolverType, retry: bool) -> Vec<SolverType> {
    let mut candidates = vec![primary];
    if retry {
        candidates.extend(FALLBACKS);
    }
    candidates
}

/// Winning attempt: the island state it left behind plus its result.
#[derive(Debug, Clone)]
pub struct RetryOutcome {
    pub island: CalculationInputs,
    pub result: SolveResult,
    pub method: SolverType,
}

/// Try each candidate on a fresh copy of `island`, seeded with `v0`.
///
/// The first method whose every outer iteration converged wins. `report`
/// receives the rows of every attempt. Returns `None` once the candidates are
/// exhausted or the run is cancelled.
#[allow(clippy::too_many_arguments)]
pub fn solve_with_retry(
    island: &CalculationInputs,
    primary: SolverType,
    v0: &[Complex64],
    options: &PowerFlowOptions,
    backend: &dyn LinearSystemBackend,
    cancel: &AtomicBool,
    report: &mut ConvergenceReport,
    logger: &mut Logger,
) -> Option<RetryOutcome> {
    for method in retry_candidates(primary, options.retry_with_other_methods) {
        let mut attempt = island.clone();
        let result = run_outer_loop(&mut attempt, method, v0, options, backend, cancel, logger);
        report.extend(result.report.clone());

        if result.converged {
            return Some(RetryOutcome {
                island: attempt,
                result,
                method,
            });
        }
        if result.cancelled {
            return None;
        }
        logger.progress(format!("{} did not converge (|f| = {:.3e})", method, result.norm_f));
    }

    logger.error("retry", "Did not converge, even after retry!");
    None
}
