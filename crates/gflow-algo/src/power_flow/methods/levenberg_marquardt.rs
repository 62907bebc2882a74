//! Levenberg-Marquardt power flow.
//!
//! Solves the mismatch equations as a damped least-squares problem on the
//! Newton-Raphson Jacobian `H`:
//!
//! ```text
//! (HᵀH + λI)·dx = Hᵀ·dz
//! ```
//!
//! with Nielsen's damping update: on an accepted step
//! `λ ← λ·max(1/3, 1 − (2ρ − 1)³)` and `ν = 2`; on a rejected step
//! `λ ← λ·ν`, `ν ← 2ν` and the Jacobian is kept. The initial damping is
//! `1e-3 · max diag(HᵀH)`.
//!
//! Slower than Newton-Raphson on healthy cases, but it tolerates singular
//! and badly conditioned Jacobians, which is why it is the fallback method.

use super::common::{
    angles, apply_step, compute_power, dot, inf_norm, jacobian, magnitudes, mismatch, polar,
    to_dense,
};
use super::{MethodInput, SolverOutput};
use gflow_core::Logger;
use web_time::Instant;

pub fn solve(input: &MethodInput<'_>, logger: &mut Logger) -> SolverOutput {
    let start = Instant::now();
    let pvpq = input.pvpq();
    if pvpq.is_empty() {
        return SolverOutput::trivial(input, start.elapsed().as_secs_f64());
    }
    let dim = pvpq.len() + input.pq.len();

    let mut vm = magnitudes(input.v0);
    let mut va = angles(input.v0);
    let mut v = input.v0.to_vec();
    let mut scalc = compute_power(input.ybus, &v, input.ibus);
    let mut dz = mismatch(&scalc, input.sbus, &pvpq, input.pq);
    let mut norm_f = inf_norm(&dz);
    let mut converged = norm_f < input.tolerance;

    let mut iterations = 0;
    let mut lambda = 0.0;
    let mut nu = 2.0;
    let mut f_prev = 1e9;
    let mut h: Vec<Vec<f64>> = Vec::new();
    let mut update_jacobian = true;

    while !converged && iterations < input.max_iterations {
        if update_jacobian {
            h = to_dense(&jacobian(input.ybus, &v, input.ibus, &pvpq, input.pq));
        }

        // HᵀH and Hᵀ·dz
        let mut hth = vec![vec![0.0; dim]; dim];
        let mut rhs = vec![0.0; dim];
        for (row, &dzr) in h.iter().zip(&dz) {
            for (a, &ha) in row.iter().enumerate() {
                if ha == 0.0 {
                    continue;
                }
                rhs[a] += ha * dzr;
                for (b, &hb) in row.iter().enumerate() {
                    hth[a][b] += ha * hb;
                }
            }
        }

        if iterations == 0 {
            let max_diag = (0..dim).map(|k| hth[k][k]).fold(0.0, f64::max);
            lambda = 1e-3 * max_diag;
        }

        let mut system = hth;
        for (k, row) in system.iter_mut().enumerate() {
            row[k] += lambda;
        }

        let dx = match input.backend.solve(&system, &rhs) {
            Ok(dx) => dx,
            Err(err) => {
                logger.warn(
                    "solver",
                    format!("Levenberg-Marquardt iteration {}: {}", iterations + 1, err),
                );
                break;
            }
        };

        let f = 0.5 * dot(&dz, &dz);
        let val: f64 = dx
            .iter()
            .zip(&rhs)
            .map(|(d, r)| d * (lambda * d + r))
            .sum();
        let rho = if val > 0.0 { (f_prev - f) / (0.5 * val) } else { -1.0 };

        if rho >= 0.0 {
            update_jacobian = true;
            lambda *= f64::max(1.0 / 3.0, 1.0 - (2.0 * rho - 1.0).powi(3));
            nu = 2.0;

            let (va_base, vm_base) = (va.clone(), vm.clone());
            apply_step(&mut va, &mut vm, &va_base, &vm_base, &dx, 1.0, &pvpq, input.pq);
            v = polar(&vm, &va);
        } else {
            update_jacobian = false;
            lambda *= nu;
            nu *= 2.0;
        }

        scalc = compute_power(input.ybus, &v, input.ibus);
        dz = mismatch(&scalc, input.sbus, &pvpq, input.pq);
        norm_f = inf_norm(&dz);
        converged = norm_f < input.tolerance;
        f_prev = f;
        iterations += 1;

        logger.progress(format!(
            "LM iteration {}: |f| = {:.3e}, lambda = {:.3e}, rho = {:.3}",
            iterations, norm_f, lambda, rho
        ));
    }

    SolverOutput {
        v,
        converged,
        norm_f,
        scalc,
        iterations,
        elapsed: start.elapsed().as_secs_f64(),
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests_support::{four_bus_with_pv, two_bus};
    use super::*;

    #[test]
    fn test_two_bus_converges() {
        let case = two_bus();
        let out = solve(&case.input(1e-6, 50), &mut Logger::default());
        assert!(out.converged, "|f| = {}", out.norm_f);
        assert!((0.90..=0.99).contains(&out.v[1].norm()));
    }

    #[test]
    fn test_meshed_case_matches_newton() {
        let case = four_bus_with_pv();
        let input = case.input(1e-8, 60);
        let lm = solve(&input, &mut Logger::default());
        let nr = super::super::newton_raphson::solve(&input, &mut Logger::default());
        assert!(lm.converged, "LM |f| = {}", lm.norm_f);
        for (a, b) in lm.v.iter().zip(&nr.v) {
            assert!((a - b).norm() < 1e-5, "{} vs {}", a, b);
        }
    }
}
