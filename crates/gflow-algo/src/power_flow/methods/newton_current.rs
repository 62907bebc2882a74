//! Newton-Raphson on the current mismatch.
//!
//! ```text
//! F  = conj(S/V) − (Ybus·V − Ibus)      rows: Re F[pvpq], Im F[pq]
//! J  = [ Re dI/dVa(pvpq, pvpq)   Re dI/dVm(pvpq, pq) ]
//!      [ Im dI/dVa(pq, pvpq)     Im dI/dVm(pq, pq)   ]
//! dI/dVa = j·Ybus·diag(V)     dI/dVm = Ybus·diag(V/|V|)
//! x ← x + μ·J⁻¹F
//! ```
//!
//! The injection term is held constant when differentiating. At PV buses the
//! reactive part of `S` is replaced by the computed value each iteration, so
//! the real current row only constrains active power. Convergence is judged on
//! the power mismatch, as for every other method.

use super::common::{angles, compute_power, inf_norm, magnitudes, mismatch, polar, solve_sparse};
use super::{MethodInput, SolverOutput};
use crate::sparse::SparseComplexMatrix;
use gflow_core::Logger;
use num_complex::Complex64;
use sprs::{CsMat, TriMat};
use web_time::Instant;

const BACKTRACK_FACTOR: f64 = 0.25;
const MAX_BACKTRACKS: usize = 10;

fn current_mismatch(
    input: &MethodInput<'_>,
    v: &[Complex64],
    scalc: &[Complex64],
    pvpq: &[usize],
) -> Vec<f64> {
    let icalc: Vec<Complex64> = input
        .ybus
        .mul_vec(v)
        .iter()
        .zip(input.ibus)
        .map(|(yv, i)| yv - i)
        .collect();

    let injection = |i: usize| -> Complex64 {
        let mut s = input.sbus[i];
        if input.pv.contains(&i) {
            s.im = scalc[i].im;
        }
        if v[i].norm() > 0.0 {
            (s / v[i]).conj()
        } else {
            Complex64::new(0.0, 0.0)
        }
    };

    let mut f = Vec::with_capacity(pvpq.len() + input.pq.len());
    f.extend(pvpq.iter().map(|&i| (injection(i) - icalc[i]).re));
    f.extend(input.pq.iter().map(|&i| (injection(i) - icalc[i]).im));
    f
}

fn current_jacobian(ybus: &SparseComplexMatrix, v: &[Complex64], pvpq: &[usize], pq: &[usize]) -> CsMat<f64> {
    let n = v.len();
    let j = Complex64::new(0.0, 1.0);
    let npvpq = pvpq.len();

    let mut angle_col = vec![None; n];
    for (c, &i) in pvpq.iter().enumerate() {
        angle_col[i] = Some(c);
    }
    let mut mag_col = vec![None; n];
    for (c, &i) in pq.iter().enumerate() {
        mag_col[i] = Some(npvpq + c);
    }

    let dim = npvpq + pq.len();
    let mut tri = TriMat::new((dim, dim));
    let mut fill = |r: usize, bus: usize, take_re: bool| {
        for (k, y) in ybus.row_iter(bus) {
            let d_va = j * y * v[k];
            let vnorm = if v[k].norm() > 0.0 { v[k] / v[k].norm() } else { Complex64::new(1.0, 0.0) };
            let d_vm = y * vnorm;
            let pick = |z: Complex64| if take_re { z.re } else { z.im };
            if let Some(c) = angle_col[k] {
                tri.add_triplet(r, c, pick(d_va));
            }
            if let Some(c) = mag_col[k] {
                tri.add_triplet(r, c, pick(d_vm));
            }
        }
    };
    for (r, &i) in pvpq.iter().enumerate() {
        fill(r, i, true);
    }
    for (r, &i) in pq.iter().enumerate() {
        fill(npvpq + r, i, false);
    }
    tri.to_csr()
}

pub fn solve(input: &MethodInput<'_>, logger: &mut Logger) -> SolverOutput {
    let start = Instant::now();
    let pvpq = input.pvpq();
    if pvpq.is_empty() {
        return SolverOutput::trivial(input, start.elapsed().as_secs_f64());
    }
    let npvpq = pvpq.len();

    let mut vm = magnitudes(input.v0);
    let mut va = angles(input.v0);
    let mut v = input.v0.to_vec();
    let mut scalc = compute_power(input.ybus, &v, input.ibus);
    let mut f = current_mismatch(input, &v, &scalc, &pvpq);
    let mut norm_i = inf_norm(&f);
    let mut norm_f = inf_norm(&mismatch(&scalc, input.sbus, &pvpq, input.pq));
    let mut converged = norm_f < input.tolerance;
    let mut iterations = 0;

    while !converged && iterations < input.max_iterations {
        iterations += 1;

        let jac = current_jacobian(input.ybus, &v, &pvpq, input.pq);
        let dx = match solve_sparse(input.backend, &jac, &f) {
            Ok(dx) => dx,
            Err(err) => {
                logger.warn(
                    "solver",
                    format!("current Newton iteration {}: {}", iterations, err),
                );
                break;
            }
        };

        let (va_base, vm_base) = (va.clone(), vm.clone());
        let mut mu = 1.0;
        let mut backtracks = 0;
        loop {
            for (k, &i) in pvpq.iter().enumerate() {
                va[i] = va_base[i] + mu * dx[k];
            }
            for (k, &i) in input.pq.iter().enumerate() {
                vm[i] = vm_base[i] + mu * dx[npvpq + k];
            }
            v = polar(&vm, &va);
            scalc = compute_power(input.ybus, &v, input.ibus);
            f = current_mismatch(input, &v, &scalc, &pvpq);
            let norm_new = inf_norm(&f);
            if norm_new < norm_i || backtracks >= MAX_BACKTRACKS {
                norm_i = norm_new;
                break;
            }
            mu *= BACKTRACK_FACTOR;
            backtracks += 1;
        }

        norm_f = inf_norm(&mismatch(&scalc, input.sbus, &pvpq, input.pq));
        converged = norm_f < input.tolerance;
        logger.progress(format!(
            "NR-I iteration {}: |f| = {:.3e}, |dI| = {:.3e}",
            iterations, norm_f, norm_i
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
    use super::super::tests_support::{four_bus_pq_only, two_bus};
    use super::*;

    #[test]
    fn test_two_bus_converges() {
        let case = two_bus();
        let out = solve(&case.input(1e-6, 40), &mut Logger::default());
        assert!(out.converged, "|f| = {}", out.norm_f);
        assert!((0.90..=0.99).contains(&out.v[1].norm()));
    }

    #[test]
    fn test_meshed_pq_case_matches_newton() {
        let case = four_bus_pq_only();
        let input = case.input(1e-8, 60);
        let nri = solve(&input, &mut Logger::default());
        let nr = super::super::newton_raphson::solve(&input, &mut Logger::default());
        assert!(nri.converged, "|f| = {}", nri.norm_f);
        for (a, b) in nri.v.iter().zip(&nr.v) {
            assert!((a - b).norm() < 1e-6);
        }
    }
}
