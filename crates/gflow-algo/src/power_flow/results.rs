//! Post-processing and island merging.
//!
//! Per island (local indices, per unit on input):
//! ```text
//! S(slack) = V·conj(Ybus·V − Ibus)          S(pv).im = (V·conj(Ybus·V − Ibus)).im
//! If = Yf·V     It = Yt·V     Sf = Vf·conj(If)     St = Vt·conj(It)
//! losses = Sf + St              Vbranch = Vf − Vt
//! Sbranch = max(|Sf|, |St|)     loading = Sbranch / (rate + 1e-9)
//! flow_direction = Re(Sf) / (|Sf| + 1e-20)
//! ```
//! Powers are reported in MVA (× Sbase). Island arrays are then scattered
//! into full-network arrays through `original_bus_idx`/`original_branch_idx`.

use super::inputs::CalculationInputs;
use super::methods::common::compute_power;
use super::options::{LimitWeights, SolverType};
use super::outer_loop::SolveResult;
use super::report::ConvergenceReport;
use gflow_core::{BusMode, Diagnostics, Logger};
use num_complex::Complex64;
use serde::Serialize;

/// Post-processed solution of one island, in its local indices.
#[derive(Debug, Clone, Serialize)]
pub struct IslandResult {
    pub index: usize,
    pub original_bus_idx: Vec<usize>,
    pub original_branch_idx: Vec<usize>,
    /// Method that produced the accepted solution
    pub method: Option<SolverType>,
    pub converged: bool,
    pub norm_f: f64,
    pub iterations: usize,
    pub elapsed: f64,
    pub voltage: Vec<Complex64>,
    /// Bus injections (MVA)
    pub sbus: Vec<Complex64>,
    pub bus_types: Vec<BusMode>,
    pub s_from: Vec<Complex64>,
    pub s_to: Vec<Complex64>,
    /// Branch currents (p.u.)
    pub i_from: Vec<Complex64>,
    pub i_to: Vec<Complex64>,
    pub losses: Vec<Complex64>,
    pub vbranch: Vec<Complex64>,
    /// max(|Sf|, |St|) in MVA
    pub sbranch: Vec<f64>,
    /// max(|If|, |It|) in p.u.
    pub ibranch: Vec<f64>,
    pub loading: Vec<f64>,
    pub flow_direction: Vec<f64>,
    pub tap_positions: Vec<Option<i32>>,
    pub report: ConvergenceReport,
}

impl IslandResult {
    /// Compute injections and branch quantities from a solved island.
    pub fn from_solution(
        index: usize,
        island: &CalculationInputs,
        result: &SolveResult,
        method: Option<SolverType>,
    ) -> Self {
        let v = &result.v;
        let adm = &island.admittance;
        let sbase = island.sbase;

        let scalc = compute_power(&adm.ybus, v, &island.ibus);
        let sbus: Vec<Complex64> = (0..island.n_bus)
            .map(|i| {
                let s = match island.types[i] {
                    BusMode::Ref => scalc[i],
                    BusMode::PV => Complex64::new(island.sbus[i].re, scalc[i].im),
                    _ => island.sbus[i],
                };
                s * sbase
            })
            .collect();

        let i_from = adm.yf.mul_vec(v);
        let i_to = adm.yt.mul_vec(v);
        let m = island.n_branch;
        let mut s_from = Vec::with_capacity(m);
        let mut s_to = Vec::with_capacity(m);
        let mut vbranch = Vec::with_capacity(m);
        for (k, br) in adm.branches().iter().enumerate() {
            let (vf, vt) = (v[br.from], v[br.to]);
            s_from.push(vf * i_from[k].conj() * sbase);
            s_to.push(vt * i_to[k].conj() * sbase);
            vbranch.push(vf - vt);
        }

        let losses = s_from.iter().zip(&s_to).map(|(f, t)| f + t).collect();
        let sbranch: Vec<f64> = s_from
            .iter()
            .zip(&s_to)
            .map(|(f, t)| f.norm().max(t.norm()))
            .collect();
        let ibranch = i_from
            .iter()
            .zip(&i_to)
            .map(|(f, t)| f.norm().max(t.norm()))
            .collect();
        let loading = sbranch
            .iter()
            .zip(&island.branch_rates)
            .map(|(s, rate)| s / (rate + 1e-9))
            .collect();
        let flow_direction = s_from.iter().map(|s| s.re / (s.norm() + 1e-20)).collect();

        Self {
            index,
            original_bus_idx: island.original_bus_idx.clone(),
            original_branch_idx: island.original_branch_idx.clone(),
            method,
            converged: result.converged,
            norm_f: result.norm_f,
            iterations: result.iterations,
            elapsed: result.elapsed,
            voltage: v.clone(),
            sbus,
            bus_types: island.types.clone(),
            s_from,
            s_to,
            i_from,
            i_to,
            losses,
            vbranch,
            sbranch,
            ibranch,
            loading,
            flow_direction,
            tap_positions: tap_positions(island),
            report: result.report.clone(),
        }
    }

    /// Island for which every method failed: seed voltage, no flows.
    pub fn failed(
        index: usize,
        island: &CalculationInputs,
        v0: &[Complex64],
        report: ConvergenceReport,
    ) -> Self {
        let zeros_branch = vec![Complex64::default(); island.n_branch];
        Self {
            index,
            original_bus_idx: island.original_bus_idx.clone(),
            original_branch_idx: island.original_branch_idx.clone(),
            method: None,
            converged: false,
            norm_f: report.rows.last().map_or(f64::INFINITY, |r| r.error),
            iterations: report.total_iterations(),
            elapsed: report.total_elapsed(),
            voltage: v0.to_vec(),
            sbus: island.sbus.iter().map(|&s| s * island.sbase).collect(),
            bus_types: island.types.clone(),
            s_from: zeros_branch.clone(),
            s_to: zeros_branch.clone(),
            i_from: zeros_branch.clone(),
            i_to: zeros_branch.clone(),
            losses: zeros_branch.clone(),
            vbranch: zeros_branch,
            sbranch: vec![0.0; island.n_branch],
            ibranch: vec![0.0; island.n_branch],
            loading: vec![0.0; island.n_branch],
            flow_direction: vec![0.0; island.n_branch],
            tap_positions: tap_positions(island),
            report,
        }
    }
}

fn tap_positions(island: &CalculationInputs) -> Vec<Option<i32>> {
    island
        .tap_changers
        .iter()
        .map(|c| c.as_ref().map(|c| c.position))
        .collect()
}

/// Warn when the computed slack active power leaves `[Pmin, Pmax]`.
pub fn check_active_limits(island: &CalculationInputs, result: &IslandResult, logger: &mut Logger) {
    for i in 0..island.n_bus {
        if island.types[i] != BusMode::Ref {
            continue;
        }
        let p = result.sbus[i].re / island.sbase;
        if p > island.pmax[i] || p < island.pmin[i] {
            logger.warn_with_entity(
                "active_limits",
                format!(
                    "slack active power {:.4} pu outside [{:.4}, {:.4}]",
                    p, island.pmin[i], island.pmax[i]
                ),
                island.bus_names[i].clone(),
            );
        }
    }
}

/// Buses and branches violating their limits.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LimitViolations {
    /// Branches with loading above 1
    pub overloads: Vec<usize>,
    pub overvoltage: Vec<usize>,
    pub undervoltage: Vec<usize>,
    /// `|wo·Σ overload + wv1·Σ overvoltage + wv2·Σ undervoltage|`
    pub score: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct IslandSummary {
    pub index: usize,
    pub n_bus: usize,
    pub n_branch: usize,
    pub converged: bool,
    pub method: Option<SolverType>,
    pub norm_f: f64,
}

/// Full-network power-flow result.
#[derive(Debug, Clone, Serialize)]
pub struct NetworkResult {
    /// Every island converged
    pub converged: bool,
    pub voltage: Vec<Complex64>,
    /// Bus injections (MVA)
    pub sbus: Vec<Complex64>,
    pub bus_types: Vec<BusMode>,
    pub s_from: Vec<Complex64>,
    pub s_to: Vec<Complex64>,
    pub i_from: Vec<Complex64>,
    pub i_to: Vec<Complex64>,
    pub losses: Vec<Complex64>,
    pub vbranch: Vec<Complex64>,
    pub sbranch: Vec<f64>,
    pub ibranch: Vec<f64>,
    pub loading: Vec<f64>,
    pub flow_direction: Vec<f64>,
    pub tap_positions: Vec<Option<i32>>,
    /// Largest mismatch norm over islands
    pub norm_f: f64,
    pub iterations: usize,
    pub elapsed: f64,
    pub islands: Vec<IslandSummary>,
    pub report: ConvergenceReport,
    pub limits: LimitViolations,
    pub diagnostics: Diagnostics,
}

impl NetworkResult {
    pub fn new(n_bus: usize, n_branch: usize) -> Self {
        let zeros_bus = vec![Complex64::default(); n_bus];
        let zeros_branch = vec![Complex64::default(); n_branch];
        Self {
            converged: true,
            voltage: zeros_bus.clone(),
            sbus: zeros_bus,
            bus_types: vec![BusMode::PQ; n_bus],
            s_from: zeros_branch.clone(),
            s_to: zeros_branch.clone(),
            i_from: zeros_branch.clone(),
            i_to: zeros_branch.clone(),
            losses: zeros_branch.clone(),
            vbranch: zeros_branch,
            sbranch: vec![0.0; n_branch],
            ibranch: vec![0.0; n_branch],
            loading: vec![0.0; n_branch],
            flow_direction: vec![0.0; n_branch],
            tap_positions: vec![None; n_branch],
            norm_f: 0.0,
            iterations: 0,
            elapsed: 0.0,
            islands: Vec::new(),
            report: ConvergenceReport::new(),
            limits: LimitViolations::default(),
            diagnostics: Diagnostics::new(),
        }
    }

    /// Scatter one island into the network arrays.
    pub fn apply_island(&mut self, island: &IslandResult) {
        for (local, &global) in island.original_bus_idx.iter().enumerate() {
            self.voltage[global] = island.voltage[local];
            self.sbus[global] = island.sbus[local];
            self.bus_types[global] = island.bus_types[local];
        }
        for (local, &global) in island.original_branch_idx.iter().enumerate() {
            self.s_from[global] = island.s_from[local];
            self.s_to[global] = island.s_to[local];
            self.i_from[global] = island.i_from[local];
            self.i_to[global] = island.i_to[local];
            self.losses[global] = island.losses[local];
            self.vbranch[global] = island.vbranch[local];
            self.sbranch[global] = island.sbranch[local];
            self.ibranch[global] = island.ibranch[local];
            self.loading[global] = island.loading[local];
            self.flow_direction[global] = island.flow_direction[local];
            self.tap_positions[global] = island.tap_positions[local];
        }

        self.converged &= island.converged;
        if island.norm_f.is_nan() || island.norm_f > self.norm_f {
            self.norm_f = island.norm_f;
        }
        self.iterations += island.iterations;
        self.elapsed += island.elapsed;
        self.report.extend(island.report.clone());
        self.islands.push(IslandSummary {
            index: island.index,
            n_bus: island.original_bus_idx.len(),
            n_branch: island.original_branch_idx.len(),
            converged: island.converged,
            method: island.method,
            norm_f: island.norm_f,
        });
    }

    /// Fill [`LimitViolations`] from loading and voltage magnitudes.
    pub fn check_limits(&mut self, vmin: &[f64], vmax: &[f64], weights: &LimitWeights) {
        let mut limits = LimitViolations::default();
        let mut overload_sum = 0.0;
        for (k, &loading) in self.loading.iter().enumerate() {
            if loading > 1.0 {
                limits.overloads.push(k);
                overload_sum += loading - 1.0;
            }
        }

        let mut over_sum = 0.0;
        let mut under_sum = 0.0;
        for (i, v) in self.voltage.iter().enumerate() {
            let vm = v.norm();
            // de-energised buses are not voltage violations
            if vm == 0.0 {
                continue;
            }
            if vm > vmax[i] {
                limits.overvoltage.push(i);
                over_sum += vm - vmax[i];
            } else if vm < vmin[i] {
                limits.undervoltage.push(i);
                under_sum += vmin[i] - vm;
            }
        }

        limits.score = (weights.overload * overload_sum
            + weights.overvoltage * over_sum
            + weights.undervoltage * under_sum)
            .abs();
        self.limits = limits;
    }
}

/// Merge island results into a network result and evaluate limits.
pub fn merge(
    n_bus: usize,
    n_branch: usize,
    islands: &[IslandResult],
    vmin: &[f64],
    vmax: &[f64],
    weights: &LimitWeights,
) -> NetworkResult {
    let mut result = NetworkResult::new(n_bus, n_branch);
    for island in islands {
        result.apply_island(island);
    }
    result.check_limits(vmin, vmax, weights);
    result
}
