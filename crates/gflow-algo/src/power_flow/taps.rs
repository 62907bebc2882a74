//! Discrete tap-changer control.
//!
//! A regulating changer sits on the "from" side of its branch and holds the
//! voltage magnitude of the "to" bus near `v_set`. Lowering the position
//! lowers the tap magnitude, which raises the regulated voltage.
//!
//! Two modes:
//! - **Iterative**: move one position when the voltage is outside a half-step
//!   dead band around the set point.
//! - **Direct**: jump to `round((|V|/v_set · m − 1) / inc)` clamped to the
//!   changer bounds.
//!
//! After a change the tap magnitudes of every branch are recomputed and the
//! admittance matrices are rebuilt.

use super::inputs::CalculationInputs;
use super::options::{TapBranchStrategy, TapControlMode};
use gflow_core::{FlowError, FlowResult, Logger, TapChanger};
use num_complex::Complex64;

/// Apply one round of tap control; returns `true` when any position moved.
pub fn control_taps(
    mode: TapControlMode,
    strategy: TapBranchStrategy,
    inputs: &mut CalculationInputs,
    v: &[Complex64],
    logger: &mut Logger,
) -> FlowResult<bool> {
    let mut changed = false;
    for k in inputs.regulated_branches() {
        let to = inputs.admittance.branches()[k].to;
        let vm = v[to].norm();
        let name = inputs.branch_names[k].clone();
        let Some(changer) = inputs.tap_changers[k].as_mut() else {
            continue;
        };

        let moved = match mode {
            TapControlMode::Iterative => step_iterative(changer, vm, &name, logger),
            TapControlMode::Direct => step_direct(changer, vm),
        };
        if moved {
            logger.progress(format!(
                "branch {}: |V| = {:.4} pu, v_set = {:.4}, tap position {}",
                name, vm, changer.v_set, changer.position
            ));
            changed = true;
            if strategy == TapBranchStrategy::FirstRegulated {
                break;
            }
        }
    }

    if changed {
        let modules = inputs.tap_modules();
        inputs
            .admittance
            .recompute(&modules)
            .map_err(|e| FlowError::Network(e.to_string()))?;
    }
    Ok(changed)
}

fn step_iterative(changer: &mut TapChanger, vm: f64, name: &str, logger: &mut Logger) -> bool {
    // dead band: half a step on the side the changer would move towards
    let (down_band, up_band) = match changer.position {
        p if p > 0 => (changer.inc_reg_up, changer.inc_reg_up),
        p if p < 0 => (changer.inc_reg_down, changer.inc_reg_down),
        _ => (changer.inc_reg_up, changer.inc_reg_down),
    };

    if changer.v_set > vm + down_band / 2.0 {
        if changer.position <= changer.min_position {
            logger.warn_with_entity(
                "tap_control",
                format!("already at lowest tap ({})", changer.position),
                name,
            );
            return false;
        }
        changer.position -= 1;
        true
    } else if changer.v_set < vm - up_band / 2.0 {
        if changer.position >= changer.max_position {
            logger.warn_with_entity(
                "tap_control",
                format!("already at highest tap ({})", changer.position),
                name,
            );
            return false;
        }
        changer.position += 1;
        true
    } else {
        false
    }
}

fn step_direct(changer: &mut TapChanger, vm: f64) -> bool {
    let desired_module = vm / changer.v_set * changer.module();
    let inc = if desired_module >= 1.0 {
        changer.inc_reg_up
    } else {
        changer.inc_reg_down
    };
    if inc <= 0.0 {
        return false;
    }
    let desired = (((desired_module - 1.0) / inc).round() as i32)
        .clamp(changer.min_position, changer.max_position);
    if desired == changer.position {
        return false;
    }
    changer.position = desired;
    true
}
