//! Power-flow driver: compile, split, solve every island, merge.
//!
//! Islands are independent, so with `multi_threaded` they are solved on a
//! Rayon pool (`threads = 0` means one worker per CPU). Each island logs into
//! its own child [`Logger`]; the lists are merged back in island order.
//!
//! Cancellation is cooperative: [`PowerFlowDriver::request_cancel`] raises a
//! flag that is checked between islands and between outer iterations. A
//! cancelled run still returns a result, marked as not converged.

use super::inputs::CalculationInputs;
use super::island::split_islands;
use super::options::{PowerFlowOptions, SolverType};
use super::outer_loop::{run_outer_loop, SolveResult};
use super::report::ConvergenceReport;
use super::results::{check_active_limits, merge, IslandResult, NetworkResult};
use super::retry::solve_with_retry;
use gflow_core::{
    BusMode, Diagnostics, FlowError, FlowResult, LinearSystemBackend, Logger, NetworkSnapshot,
};
use num_complex::Complex64;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

#[cfg(feature = "desktop")]
use anyhow::Context;
#[cfg(feature = "desktop")]
use rayon::prelude::*;

pub struct PowerFlowDriver {
    options: PowerFlowOptions,
    cancel: Arc<AtomicBool>,
}

impl PowerFlowDriver {
    pub fn new(options: PowerFlowOptions) -> Self {
        Self {
            options,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn options(&self) -> &PowerFlowOptions {
        &self.options
    }

    /// Ask a running (or the next) solve to stop at the next checkpoint.
    pub fn request_cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    /// Clear a previous cancellation request
    pub fn reset_cancel(&self) {
        self.cancel.store(false, Ordering::Relaxed);
    }

    /// Shared flag, for cancelling from another thread
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Solve `snapshot`.
    ///
    /// Fails only on invalid input or configuration; numerical failure is
    /// reported through `converged = false` and the diagnostics.
    pub fn run(
        &self,
        snapshot: &NetworkSnapshot,
        logger: &mut Logger,
    ) -> FlowResult<NetworkResult> {
        self.options.check()?;
        if self.is_cancelled() {
            return Err(FlowError::Cancelled);
        }
        for name in &self.options.unknown_solver_names {
            SolverType::from_str_or_fallback(name, logger);
        }

        let mut inputs = CalculationInputs::compile(snapshot)?;
        if self.options.seed_with_existing_solution {
            if let Some(previous) = &snapshot.previous_voltage {
                logger.progress("seeding with the previous solution");
                inputs.vbus = previous.clone();
            }
        }

        let islands = split_islands(&inputs, self.options.ignore_single_node_islands, logger)?;
        let backend = self.options.linear_solver.build_solver();
        info!(
            network = %snapshot.name,
            buses = inputs.n_bus,
            branches = inputs.n_branch,
            islands = islands.len(),
            solver = %self.options.solver_type,
            "running power flow"
        );

        let solved = self.solve_islands(&islands, backend.as_ref(), logger)?;

        for (island, (res, _)) in islands.iter().zip(&solved) {
            info!(
                island = res.index,
                buses = island.n_bus,
                converged = res.converged,
                norm_f = res.norm_f,
                iterations = res.iterations,
                "island solved"
            );
        }

        let mut results = Vec::with_capacity(solved.len());
        for (res, diagnostics) in solved {
            logger.absorb(diagnostics);
            results.push(res);
        }

        let mut network = merge(
            inputs.n_bus,
            inputs.n_branch,
            &results,
            &inputs.vmin,
            &inputs.vmax,
            &self.options.limit_weights,
        );
        if self.is_cancelled() {
            network.converged = false;
        }
        network.diagnostics = logger.diagnostics().clone();
        info!(
            converged = network.converged,
            norm_f = network.norm_f,
            score = network.limits.score,
            "power flow finished: {}",
            network.diagnostics.summary()
        );
        Ok(network)
    }

    fn solve_islands(
        &self,
        islands: &[CalculationInputs],
        backend: &dyn LinearSystemBackend,
        logger: &Logger,
    ) -> FlowResult<Vec<(IslandResult, Diagnostics)>> {
        let solve = |(index, island): (usize, &CalculationInputs)| {
            let mut child = logger
                .child()
                .with_verbose(logger.is_verbose() || self.options.verbose);
            let res = self.solve_island(index, island, backend, &mut child);
            (res, child.into_diagnostics())
        };

        #[cfg(feature = "desktop")]
        if self.options.multi_threaded && islands.len() > 1 {
            let threads = if self.options.threads == 0 {
                num_cpus::get()
            } else {
                self.options.threads
            };
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .build()
                .context("building Rayon thread pool for island solves")?;
            return Ok(pool.install(|| islands.par_iter().enumerate().map(solve).collect()));
        }

        Ok(islands.iter().enumerate().map(solve).collect())
    }

    fn solve_island(
        &self,
        index: usize,
        island: &CalculationInputs,
        backend: &dyn LinearSystemBackend,
        logger: &mut Logger,
    ) -> IslandResult {
        let options = &self.options;
        if self.is_cancelled() {
            logger.warn("cancel", format!("island {} skipped after cancellation", index));
            return IslandResult::failed(index, island, &island.vbus, ConvergenceReport::new());
        }
        if !island.types.iter().any(|t| matches!(t, BusMode::Ref | BusMode::PV)) {
            logger.warn("island", format!("There are no slack nodes in the island {}", index));
            let solution = SolveResult::without_slack(island.n_bus, options.solver_type);
            return IslandResult::from_solution(index, island, &solution, Some(options.solver_type));
        }

        let v0 = self.seed(island, backend, logger);
        let mut report = ConvergenceReport::new();
        match solve_with_retry(
            island,
            options.solver_type,
            &v0,
            options,
            backend,
            &self.cancel,
            &mut report,
            logger,
        ) {
            Some(outcome) => {
                let mut res = IslandResult::from_solution(
                    index,
                    &outcome.island,
                    &outcome.result,
                    Some(outcome.method),
                );
                // keep the rows of the failed attempts too
                res.report = report;
                if options.enforce_active_limits {
                    check_active_limits(&outcome.island, &res, logger);
                }
                res
            }
            None => IslandResult::failed(index, island, &v0, report),
        }
    }

    /// Initial voltage, from the auxiliary method when one is configured.
    fn seed(
        &self,
        island: &CalculationInputs,
        backend: &dyn LinearSystemBackend,
        logger: &mut Logger,
    ) -> Vec<Complex64> {
        let Some(aux) = self.options.auxiliary_solver_type else {
            return island.vbus.clone();
        };

        let plain = PowerFlowOptions {
            enforce_reactive_limits: false,
            control_taps: false,
            ..self.options.clone()
        };
        let mut work = island.clone();
        let result = run_outer_loop(
            &mut work,
            aux,
            &island.vbus,
            &plain,
            backend,
            &self.cancel,
            logger,
        );
        if result.converged {
            logger.progress(format!("seeded with {} ({} iterations)", aux, result.iterations));
            result.v
        } else {
            logger.warn(
                "seed",
                format!("auxiliary solver {} did not converge; using the set-point seed", aux),
            );
            island.vbus.clone()
        }
    }
}
