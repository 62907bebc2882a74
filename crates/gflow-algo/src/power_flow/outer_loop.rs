//! Outer control loop around one inner solve.
//!
//! ```text
//! ┌──────────┐  converged   ┌──────────────┐  stable   ┌───────────────┐  stable   ┌──────┐
//! │ Solving  │ ───────────▶ │ CheckQLimits │ ────────▶ │ CheckTapLimits│ ────────▶ │ Done │
//! └──────────┘              └──────────────┘           └───────────────┘           └──────┘
//!      ▲                          │ switched                  │ moved
//!      └──────────────────────────┴───────────────────────────┘
//! ```
//!
//! The loop is capped at `max(10, Σ tap ranges)` iterations unless the
//! options override it; reaching the cap ends the loop without error. The
//! island passed in is the loop's own copy: bus types, reactive injections,
//! tap positions and admittances are updated on it in place.

use super::bus_types::classify;
use super::inputs::CalculationInputs;
use super::methods::{self, common::compute_power, MethodInput};
use super::options::{PowerFlowOptions, SolverType};
use super::reactive::control_reactive_power;
use super::report::{ConvergenceReport, ReportRow};
use super::taps::control_taps;
use gflow_core::{LinearSystemBackend, Logger};
use num_complex::Complex64;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};

/// Minimum number of outer iterations
const MIN_OUTER_ITERATIONS: usize = 10;

/// Outcome of the outer loop on one island.
#[derive(Debug, Clone, Serialize)]
pub struct SolveResult {
    /// Every inner solve converged and the loop was not cancelled
    pub converged: bool,
    /// Last attempted iterate
    pub v: Vec<Complex64>,
    pub norm_f: f64,
    pub scalc: Vec<Complex64>,
    /// Inner iterations over all outer iterations
    pub iterations: usize,
    pub elapsed: f64,
    pub report: ConvergenceReport,
    pub cancelled: bool,
}

impl SolveResult {
    /// Result of an island with no slack and no PV bus: zero voltage,
    /// trivially converged.
    pub fn without_slack(n_bus: usize, method: SolverType) -> Self {
        let mut report = ConvergenceReport::new();
        report.push(ReportRow {
            method,
            converged: true,
            error: 0.0,
            elapsed_seconds: 0.0,
            inner_iterations: 0,
        });
        Self {
            converged: true,
            v: vec![Complex64::default(); n_bus],
            norm_f: 0.0,
            scalc: vec![Complex64::default(); n_bus],
            iterations: 0,
            elapsed: 0.0,
            report,
            cancelled: false,
        }
    }
}

/// Iteration cap for `island` under `options`.
pub fn outer_iteration_cap(island: &CalculationInputs, options: &PowerFlowOptions) -> usize {
    options
        .max_outer_iterations
        .unwrap_or_else(|| MIN_OUTER_ITERATIONS.max(island.total_tap_range()))
}

/// Run `method` under reactive-limit and tap control until both are stable.
pub fn run_outer_loop(
    island: &mut CalculationInputs,
    method: SolverType,
    v0: &[Complex64],
    options: &PowerFlowOptions,
    backend: &dyn LinearSystemBackend,
    cancel: &AtomicBool,
    logger: &mut Logger,
) -> SolveResult {
    let cap = outer_iteration_cap(island, options);
    let control_taps_enabled = options.control_taps && !island.regulated_branches().is_empty();

    let mut v = v0.to_vec();
    let mut scalc = vec![Complex64::default(); island.n_bus];
    let mut norm_f = f64::INFINITY;
    let mut report = ConvergenceReport::new();
    let mut cancelled = false;

    for outer in 0..cap {
        if cancel.load(Ordering::Relaxed) {
            logger.warn("cancel", "power flow cancelled; returning the last iterate");
            cancelled = true;
            break;
        }

        let sets = classify(&island.sbus, &mut island.types, logger);
        if !sets.has_slack() {
            // nothing to solve against; the classifier already reported it
            v = vec![Complex64::default(); island.n_bus];
            scalc = vec![Complex64::default(); island.n_bus];
            norm_f = 0.0;
            report.push(ReportRow {
                method,
                converged: true,
                error: 0.0,
                elapsed_seconds: 0.0,
                inner_iterations: 0,
            });
            break;
        }

        let input = MethodInput {
            v0: &v,
            sbus: &island.sbus,
            ibus: &island.ibus,
            ybus: &island.admittance.ybus,
            yseries: &island.admittance.yseries,
            b1: &island.admittance.b1,
            b2: &island.admittance.b2,
            pq: &sets.pq,
            pv: &sets.pv,
            slack: &sets.slack,
            pqpv: &sets.pqpv,
            tolerance: options.tolerance,
            max_iterations: options.max_iterations,
            robust: options.robust,
            backend,
        };
        let out = methods::solve(method, &input, logger);
        logger.progress(format!(
            "outer iteration {}: {} converged={} |f|={:.3e} in {} iterations",
            outer, method, out.converged, out.norm_f, out.iterations
        ));
        report.push(ReportRow {
            method,
            converged: out.converged,
            error: out.norm_f,
            elapsed_seconds: out.elapsed,
            inner_iterations: out.iterations,
        });
        v = out.v;
        scalc = out.scalc;
        norm_f = out.norm_f;

        if !out.converged {
            break;
        }

        let mut unstable = false;
        if options.enforce_reactive_limits {
            unstable |= control_reactive_power(
                options.reactive_control_mode,
                options.q_steepness_factor,
                island,
                &mut v,
                &scalc,
                logger,
            );
        }
        if control_taps_enabled {
            match control_taps(
                options.tap_control_mode,
                options.tap_branch_strategy,
                island,
                &v,
                logger,
            ) {
                Ok(moved) => unstable |= moved,
                Err(err) => logger.error("tap_control", err.to_string()),
            }
        }
        if !unstable {
            break;
        }
        // the controls may have edited V
        scalc = compute_power(&island.admittance.ybus, &v, &island.ibus);
    }

    SolveResult {
        converged: report.all_converged() && !cancelled,
        v,
        norm_f,
        scalc,
        iterations: report.total_iterations(),
        elapsed: report.total_elapsed(),
        report,
        cancelled,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gflow_core::{BranchData, BusData, BusMode, FaerSolver, NetworkSnapshot, TapChanger};

    fn generator_case(q_max: f64) -> CalculationInputs {
        let mut net = NetworkSnapshot::new("gen");
        let s = net.add_bus(BusData::slack("S", 1.0));
        let g = net.add_bus(BusData::pv("G", -0.4, 1.0).with_q_limits(-q_max, q_max));
        net.add_branch(BranchData::line(s, g, 0.02, 0.04, 0.0));
        CalculationInputs::compile(&net).unwrap()
    }

    fn run(island: &mut CalculationInputs, options: &PowerFlowOptions) -> SolveResult {
        let v0 = island.vbus.clone();
        run_outer_loop(
            island,
            options.solver_type,
            &v0,
            options,
            &FaerSolver,
            &AtomicBool::new(false),
            &mut Logger::default(),
        )
    }

    #[test]
    fn test_without_controls_single_iteration() {
        let mut island = generator_case(0.1);
        let result = run(&mut island, &PowerFlowOptions::default());
        assert!(result.converged);
        assert_eq!(result.report.len(), 1);
        assert!((result.v[1].norm() - 1.0).abs() < 1e-9, "PV magnitude is held");
    }

    #[test]
    fn test_reactive_limit_clamps_generator() {
        let mut island = generator_case(0.1);
        let options = PowerFlowOptions::default().with_reactive_limits(true, Default::default());
        let result = run(&mut island, &options);
        assert!(result.converged);
        assert_eq!(island.types[1], BusMode::PQ);
        assert!((island.sbus[1].im - 0.1).abs() < 1e-12);
        assert!(result.v[1].norm() < 1.0, "voltage sags once Q is capped");
        // solve, switch, solve again and find the clamp stable
        assert_eq!(result.report.len(), 2);
    }

    #[test]
    fn test_no_slack_is_trivially_converged() {
        let mut island = generator_case(0.1);
        island.types = vec![BusMode::PQ, BusMode::PQ];
        let result = run(&mut island, &PowerFlowOptions::default());
        assert!(result.converged);
        assert!(result.v.iter().all(|v| v.norm() == 0.0));
        assert_eq!(result.norm_f, 0.0);

        let shortcut = SolveResult::without_slack(2, SolverType::NewtonRaphson);
        assert_eq!(shortcut.v, result.v);
        assert_eq!(shortcut.report.len(), result.report.len());
        assert!(shortcut.converged);
    }

    #[test]
    fn test_cancel_before_start() {
        let mut island = generator_case(0.1);
        let v0 = island.vbus.clone();
        let options = PowerFlowOptions::default();
        let result = run_outer_loop(
            &mut island,
            SolverType::NewtonRaphson,
            &v0,
            &options,
            &FaerSolver,
            &AtomicBool::new(true),
            &mut Logger::default(),
        );
        assert!(result.cancelled);
        assert!(!result.converged);
        assert_eq!(result.v, v0);
    }

    #[test]
    fn test_tap_control_reaches_dead_band() {
        let mut net = NetworkSnapshot::new("tap");
        let s = net.add_bus(BusData::slack("S", 1.0));
        let l = net.add_bus(BusData::pq("L", Complex64::new(-0.5, -0.2)));
        net.add_branch(BranchData::line(s, l, 0.01, 0.05, 0.0).with_tap_changer(TapChanger {
            min_position: -10,
            max_position: 10,
            ..TapChanger::default()
        }));
        let mut island = CalculationInputs::compile(&net).unwrap();
        let options = PowerFlowOptions::default().with_tap_control(
            true,
            Default::default(),
            Default::default(),
        );
        let result = run(&mut island, &options);
        assert!(result.converged);

        let changer = island.tap_changers[0].as_ref().unwrap();
        assert!(changer.position < 0 && changer.position >= -10);
        let vm = result.v[1].norm();
        assert!((vm - 1.0).abs() <= 0.01, "|V| = {} after {} steps", vm, changer.position);
        assert!(result.report.len() <= outer_iteration_cap(&island, &options));
    }
}
