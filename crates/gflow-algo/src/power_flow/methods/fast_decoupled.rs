//! Fast-Decoupled Power Flow (FDPF) Solver
//!
//! Implements the Stott-Alsac fast-decoupled load flow method which decouples
//! the P-θ and Q-V subproblems for faster convergence on well-conditioned networks.
//!
//! ## Algorithm Overview
//!
//! Instead of solving the full Jacobian system, FDPF uses:
//! - B' matrix for P-θ subproblem: ΔP/V = B' × Δθ
//! - B'' matrix for Q-V subproblem: ΔQ/V = B'' × ΔV
//!
//! The matrices are constant (don't need to be rebuilt each iteration); they
//! come from the admittance model (XB scheme). Each iteration is one P-θ half
//! step followed by one Q-V half step, with a convergence check after each.
//!
//! ## References
//!
//! - Stott & Alsac (1974): "Fast Decoupled Load Flow"
//!   IEEE Trans. PAS, 93(3), 859-869
//!   DOI: [10.1109/TPAS.1974.293985](https://doi.org/10.1109/TPAS.1974.293985)

use super::common::{angles, compute_power, inf_norm, magnitudes, polar};
use super::{MethodInput, SolverOutput};
use crate::sparse::real;
use gflow_core::Logger;
use num_complex::Complex64;
use web_time::Instant;

/// Scaled mismatches `(Sbus − Scalc)/|V|` split into ΔP over `pvpq` and ΔQ over `pq`.
fn scaled_mismatch(
    input: &MethodInput<'_>,
    v: &[Complex64],
    vm: &[f64],
    pvpq: &[usize],
) -> (Vec<f64>, Vec<f64>, Vec<Complex64>) {
    let scalc = compute_power(input.ybus, v, input.ibus);
    let d_p = pvpq
        .iter()
        .map(|&i| (input.sbus[i] - scalc[i]).re / vm[i])
        .collect();
    let d_q = input
        .pq
        .iter()
        .map(|&i| (input.sbus[i] - scalc[i]).im / vm[i])
        .collect();
    (d_p, d_q, scalc)
}

pub fn solve(input: &MethodInput<'_>, logger: &mut Logger) -> SolverOutput {
    let start = Instant::now();
    let pvpq = input.pvpq();
    if pvpq.is_empty() {
        return SolverOutput::trivial(input, start.elapsed().as_secs_f64());
    }

    let b_p = real::dense_block(input.b1, &pvpq, &pvpq);
    let b_pp = real::dense_block(input.b2, input.pq, input.pq);

    let mut vm = magnitudes(input.v0);
    let mut va = angles(input.v0);
    let mut v = input.v0.to_vec();
    let (mut d_p, mut d_q, mut scalc) = scaled_mismatch(input, &v, &vm, &pvpq);
    let mut norm_p = inf_norm(&d_p);
    let mut norm_q = inf_norm(&d_q);
    let mut converged = norm_p < input.tolerance && norm_q < input.tolerance;
    let mut iterations = 0;

    while !converged && iterations < input.max_iterations {
        iterations += 1;

        // P-θ half iteration
        let d_va = match input.backend.solve(&b_p, &d_p) {
            Ok(x) => x,
            Err(err) => {
                logger.warn("solver", format!("fast decoupled B′ solve: {}", err));
                break;
            }
        };
        for (k, &i) in pvpq.iter().enumerate() {
            va[i] += d_va[k];
        }
        v = polar(&vm, &va);
        (d_p, d_q, scalc) = scaled_mismatch(input, &v, &vm, &pvpq);
        norm_p = inf_norm(&d_p);
        norm_q = inf_norm(&d_q);
        converged = norm_p < input.tolerance && norm_q < input.tolerance;
        if converged {
            break;
        }

        // Q-V half iteration
        if !input.pq.is_empty() {
            let d_vm = match input.backend.solve(&b_pp, &d_q) {
                Ok(x) => x,
                Err(err) => {
                    logger.warn("solver", format!("fast decoupled B″ solve: {}", err));
                    break;
                }
            };
            for (k, &i) in input.pq.iter().enumerate() {
                vm[i] += d_vm[k];
            }
            v = polar(&vm, &va);
            (d_p, d_q, scalc) = scaled_mismatch(input, &v, &vm, &pvpq);
            norm_p = inf_norm(&d_p);
            norm_q = inf_norm(&d_q);
            converged = norm_p < input.tolerance && norm_q < input.tolerance;
        }

        logger.progress(format!(
            "FDPF iteration {}: |dP| = {:.3e}, |dQ| = {:.3e}",
            iterations, norm_p, norm_q
        ));
    }

    SolverOutput {
        v,
        converged,
        norm_f: norm_p.max(norm_q),
        scalc,
        iterations,
        elapsed: start.elapsed().as_secs_f64(),
    }
}
