//! Generator reactive-power limits (PV ↔ PQ switching).
//!
//! ## Direct mode
//!
//! Zhao's switching logic, applied after a converged inner solve:
//!
//! ```text
//! PV               Q ≥ Qmax        → PQ at Qmax
//!                  Q ≤ Qmin        → PQ at Qmin
//! PQ (was PV)      clamped at Qmax, |V| < Vset   → stays PQ
//!                  clamped at Qmin, |V| > Vset   → stays PQ
//!                  otherwise                     → back to PV, V = Vset∠0
//! ```
//!
//! ## Iterative mode
//!
//! Every PV bus becomes PQ at `Q = 0`; afterwards the reactive injection of
//! those buses is walked towards the value that holds `Vset`, with a logistic
//! gain `2·(1/(1 + e^{−k·|Vset − V|}) − 0.5)` on the remaining headroom.

use super::inputs::CalculationInputs;
use super::options::ReactivePowerControlMode;
use gflow_core::{BusMode, Logger};
use num_complex::Complex64;

/// Tolerance used to decide that a clamped bus sits on its limit
const LIMIT_TOL: f64 = 1e-9;
/// Voltage comparisons in iterative mode are rounded to this many decimals
const PRECISION: i32 = 4;

/// Apply reactive-power limits; returns `true` when another solve is needed.
pub fn control_reactive_power(
    mode: ReactivePowerControlMode,
    steepness: f64,
    island: &mut CalculationInputs,
    v: &mut [Complex64],
    scalc: &[Complex64],
    logger: &mut Logger,
) -> bool {
    match mode {
        ReactivePowerControlMode::Direct => control_direct(island, v, scalc, logger),
        ReactivePowerControlMode::Iterative => control_iterative(island, v, steepness, logger),
    }
}

/// Direct switching. A clamped former PV bus returns to PV based on which side
/// of Vset its voltage sits, not on a fresh Q-band comparison.
fn control_direct(
    island: &mut CalculationInputs,
    v: &mut [Complex64],
    scalc: &[Complex64],
    logger: &mut Logger,
) -> bool {
    let mut any_issue = false;
    for i in 0..island.n_bus {
        let (qmin, qmax, vset) = (island.qmin[i], island.qmax[i], island.vm_set[i]);
        match island.types[i] {
            BusMode::PV => {
                let q = scalc[i].im;
                let clamp = if q >= qmax {
                    Some(qmax)
                } else if q <= qmin {
                    Some(qmin)
                } else {
                    None
                };
                if let Some(limit) = clamp {
                    island.types[i] = BusMode::PQ;
                    island.sbus[i].im = limit;
                    any_issue = true;
                    logger.progress(format!(
                        "bus {} switched to PQ: Q = {:.4} outside [{:.4}, {:.4}]",
                        island.bus_names[i], q, qmin, qmax
                    ));
                }
            }
            // Q is pinned at the limit here, so only |V| against Vset can move it
            BusMode::PQ if island.original_types[i] == BusMode::PV => {
                let vm = v[i].norm();
                let q = island.sbus[i].im;
                let holds = if q >= qmax - LIMIT_TOL {
                    vm < vset
                } else if q <= qmin + LIMIT_TOL {
                    vm > vset
                } else {
                    false
                };
                if !holds && vm != vset {
                    island.types[i] = BusMode::PV;
                    v[i] = Complex64::new(vset, 0.0);
                    any_issue = true;
                    logger.progress(format!(
                        "bus {} switched back to PV (|V| = {:.4}, Vset = {:.4})",
                        island.bus_names[i], vm, vset
                    ));
                }
            }
            _ => {}
        }
    }
    any_issue
}

/// Logistic Q increment gain; 0 at `v1 = v2`, approaching 1 as they diverge.
pub fn q_increment_gain(v1: f64, v2: f64, k: f64) -> f64 {
    2.0 * (1.0 / (1.0 + (-k * (v2 - v1).abs()).exp()) - 0.5)
}

fn round_to(x: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (x * scale).round() / scale
}

fn control_iterative(
    island: &mut CalculationInputs,
    v: &[Complex64],
    steepness: f64,
    logger: &mut Logger,
) -> bool {
    let inc_precision = (1.5 * PRECISION as f64) as i32;
    let mut any_issue = false;
    for i in 0..island.n_bus {
        match island.types[i] {
            BusMode::PV => {
                island.types[i] = BusMode::PQ;
                island.sbus[i].im = 0.0;
                any_issue = true;
                logger.progress(format!("bus {} switched to PQ control with Q = 0", island.bus_names[i]));
            }
            BusMode::PQ if island.original_types[i] == BusMode::PV => {
                let vm = round_to(v[i].norm(), PRECISION);
                let vset = round_to(island.vm_set[i].abs(), PRECISION);
                let q = island.sbus[i].im;
                let gain = q_increment_gain(v[i].norm(), island.vm_set[i].abs(), steepness);

                if vm < vset {
                    let increment = round_to((island.qmax[i] - q).abs() * gain, inc_precision);
                    if increment > 0.0 && q + increment < island.qmax[i] {
                        island.sbus[i].im = q + increment;
                        any_issue = true;
                    }
                } else if vm > vset {
                    let increment = round_to((island.qmin[i] - q).abs() * gain, inc_precision);
                    if increment > 0.0 && q - increment > island.qmin[i] {
                        island.sbus[i].im = q - increment;
                        any_issue = true;
                    }
                }
            }
            _ => {}
        }
    }
    any_issue
}

#[cfg(test)]
mod tests {
    use super::*;
    use gflow_core::{BranchData, BusData, NetworkSnapshot};

    fn generator_island(q_max: f64) -> CalculationInputs {
        let mut net = NetworkSnapshot::new("gen");
        let s = net.add_bus(BusData::slack("S", 1.0));
        let g = net.add_bus(BusData::pv("G", -0.4, 1.0).with_q_limits(-q_max, q_max));
        net.add_branch(BranchData::line(s, g, 0.02, 0.04, 0.0));
        CalculationInputs::compile(&net).unwrap()
    }

    #[test]
    fn test_pv_above_qmax_switches_to_pq() {
        let mut island = generator_island(0.1);
        let mut v = island.vbus.clone();
        let scalc = vec![Complex64::default(), Complex64::new(-0.4, 0.2)];
        let issue = control_direct(&mut island, &mut v, &scalc, &mut Logger::default());
        assert!(issue);
        assert_eq!(island.types[1], BusMode::PQ);
        assert_eq!(island.sbus[1].im, 0.1);
    }

    #[test]
    fn test_clamped_bus_below_setpoint_is_stable() {
        let mut island = generator_island(0.1);
        island.types[1] = BusMode::PQ;
        island.sbus[1].im = 0.1;
        let mut v = vec![Complex64::new(1.0, 0.0), Complex64::new(0.98, -0.02)];
        let scalc = vec![Complex64::default(), Complex64::new(-0.4, 0.1)];
        let issue = control_direct(&mut island, &mut v, &scalc, &mut Logger::default());
        assert!(!issue);
        assert_eq!(island.types[1], BusMode::PQ);
    }

    #[test]
    fn test_clamped_bus_above_setpoint_returns_to_pv() {
        let mut island = generator_island(0.1);
        island.types[1] = BusMode::PQ;
        island.sbus[1].im = 0.1;
        let mut v = vec![Complex64::new(1.0, 0.0), Complex64::new(1.03, 0.0)];
        let scalc = vec![Complex64::default(), Complex64::new(-0.4, 0.1)];
        assert!(control_direct(&mut island, &mut v, &scalc, &mut Logger::default()));
        assert_eq!(island.types[1], BusMode::PV);
        assert_eq!(v[1], Complex64::new(1.0, 0.0));
    }

    #[test]
    fn test_slack_untouched() {
        let mut island = generator_island(0.1);
        let mut v = island.vbus.clone();
        let scalc = vec![Complex64::new(0.4, 5.0), Complex64::new(-0.4, 0.0)];
        assert!(!control_direct(&mut island, &mut v, &scalc, &mut Logger::default()));
        assert_eq!(island.types[0], BusMode::Ref);
    }

    #[test]
    fn test_gain_is_zero_at_setpoint() {
        assert_eq!(q_increment_gain(1.0, 1.0, 30.0), 0.0);
        let g = q_increment_gain(0.95, 1.0, 30.0);
        assert!(g > 0.0 && g < 1.0);
        assert!(q_increment_gain(0.5, 1.0, 30.0) > g);
    }

    #[test]
    fn test_iterative_mode_walks_q_up() {
        let mut island = generator_island(0.5);
        let v = vec![Complex64::new(1.0, 0.0), Complex64::new(0.97, 0.0)];
        assert!(control_iterative(&mut island, &v, 30.0, &mut Logger::default()));
        assert_eq!(island.types[1], BusMode::PQ);
        assert_eq!(island.sbus[1].im, 0.0);

        assert!(control_iterative(&mut island, &v, 30.0, &mut Logger::default()));
        let q = island.sbus[1].im;
        assert!(q > 0.0 && q < 0.5, "Q = {}", q);
    }
}
