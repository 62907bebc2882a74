//! Newton-Raphson with the Iwamoto optimal multiplier.
//!
//! After solving `J dx = f`, the step length μ is chosen as a real root of
//! the derivative of the quadratic model of the mismatch along `dx`:
//!
//! ```text
//! a = f,  b = J·dx,  c = ½·J(dV)·dx
//! g3·μ³ + g2·μ² + g1·μ + g0 = 0
//! g0 = −a·b   g1 = b·b + 2a·c   g2 = −3b·c   g3 = 2c·c
//! ```
//!
//! where `J(dV)` is the Jacobian evaluated at the complex step
//! `dV = dVm·e^{j·dVa}`. The multiplier is only used with `robust = true`
//! and only when it actually lowers the mismatch; otherwise the plain Newton
//! step is taken.
//!
//! Reference: Iwamoto & Tamura (1981), "A Load Flow Calculation Method for
//! Ill-Conditioned Power Systems", IEEE Trans. PAS-100(4).

use super::common::{
    angles, apply_step, compute_power, dot, inf_norm, jacobian, magnitudes, mat_vec, mismatch,
    polar, solve_sparse,
};
use super::{MethodInput, SolverOutput};
use gflow_core::Logger;
use num_complex::Complex64;
use web_time::Instant;

pub fn solve(input: &MethodInput<'_>, logger: &mut Logger) -> SolverOutput {
    let start = Instant::now();
    let pvpq = input.pvpq();
    if pvpq.is_empty() {
        return SolverOutput::trivial(input, start.elapsed().as_secs_f64());
    }
    let npvpq = pvpq.len();
    let n = input.v0.len();

    let mut vm = magnitudes(input.v0);
    let mut va = angles(input.v0);
    let mut v = input.v0.to_vec();
    let mut scalc = compute_power(input.ybus, &v, input.ibus);
    let mut f = mismatch(&scalc, input.sbus, &pvpq, input.pq);
    let mut norm_f = inf_norm(&f);
    let mut converged = norm_f < input.tolerance;
    let mut iterations = 0;

    while !converged && iterations < input.max_iterations {
        iterations += 1;

        let jac = jacobian(input.ybus, &v, input.ibus, &pvpq, input.pq);
        let dx = match solve_sparse(input.backend, &jac, &f) {
            Ok(dx) => dx,
            Err(err) => {
                logger.warn("solver", format!("Iwamoto iteration {}: {}", iterations, err));
                break;
            }
        };

        let mut mu = 1.0;
        if input.robust {
            let mut d_va = vec![0.0; n];
            let mut d_vm = vec![0.0; n];
            for (k, &i) in pvpq.iter().enumerate() {
                d_va[i] = dx[k];
            }
            for (k, &i) in input.pq.iter().enumerate() {
                d_vm[i] = dx[npvpq + k];
            }
            let dv = polar(&d_vm, &d_va);
            if let Some(candidate) = optimal_multiplier(input, &jac, &f, &dv, &dx, &pvpq) {
                mu = candidate;
            }
        }

        let (va_base, vm_base) = (va.clone(), vm.clone());
        apply_step(&mut va, &mut vm, &va_base, &vm_base, &dx, mu, &pvpq, input.pq);
        v = polar(&vm, &va);
        scalc = compute_power(input.ybus, &v, input.ibus);
        f = mismatch(&scalc, input.sbus, &pvpq, input.pq);
        let mut norm_new = inf_norm(&f);

        if mu != 1.0 && norm_new >= norm_f {
            // multiplier did not help; take the full Newton step
            mu = 1.0;
            apply_step(&mut va, &mut vm, &va_base, &vm_base, &dx, mu, &pvpq, input.pq);
            v = polar(&vm, &va);
            scalc = compute_power(input.ybus, &v, input.ibus);
            f = mismatch(&scalc, input.sbus, &pvpq, input.pq);
            norm_new = inf_norm(&f);
        }

        // keep magnitudes and angles consistent with V
        vm = magnitudes(&v);
        va = angles(&v);
        norm_f = norm_new;
        converged = norm_f < input.tolerance;
        logger.progress(format!(
            "Iwamoto iteration {}: |f| = {:.3e}, mu = {:.4}",
            iterations, norm_f, mu
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

fn optimal_multiplier(
    input: &MethodInput<'_>,
    jac: &sprs::CsMat<f64>,
    f: &[f64],
    dv: &[Complex64],
    dx: &[f64],
    pvpq: &[usize],
) -> Option<f64> {
    let jac_dv = jacobian(input.ybus, dv, input.ibus, pvpq, input.pq);
    let b = mat_vec(jac, dx);
    let c: Vec<f64> = mat_vec(&jac_dv, dx).iter().map(|x| 0.5 * x).collect();

    let g0 = -dot(f, &b);
    let g1 = dot(&b, &b) + 2.0 * dot(f, &c);
    let g2 = -3.0 * dot(&b, &c);
    let g3 = 2.0 * dot(&c, &c);

    real_cubic_roots(g3, g2, g1, g0)
        .into_iter()
        .filter(|mu| mu.is_finite() && *mu > 0.0 && *mu <= 2.0)
        .min_by(|a, b| (a - 1.0).abs().total_cmp(&(b - 1.0).abs()))
}

/// Real roots of `a·x³ + b·x² + c·x + d` (Cardano, with degenerate cases).
pub(crate) fn real_cubic_roots(a: f64, b: f64, c: f64, d: f64) -> Vec<f64> {
    let scale = a.abs().max(b.abs()).max(c.abs()).max(d.abs());
    if scale == 0.0 {
        return Vec::new();
    }
    let eps = 1e-14 * scale;

    if a.abs() <= eps {
        if b.abs() <= eps {
            if c.abs() <= eps {
                return Vec::new();
            }
            return vec![-d / c];
        }
        let disc = c * c - 4.0 * b * d;
        if disc < 0.0 {
            return Vec::new();
        }
        let sq = disc.sqrt();
        return vec![(-c + sq) / (2.0 * b), (-c - sq) / (2.0 * b)];
    }

    // depressed cubic t³ + p·t + q with x = t − b/(3a)
    let (bn, cn, dn) = (b / a, c / a, d / a);
    let shift = bn / 3.0;
    let p = cn - bn * bn / 3.0;
    let q = 2.0 * bn * bn * bn / 27.0 - bn * cn / 3.0 + dn;
    let disc = (q / 2.0).powi(2) + (p / 3.0).powi(3);

    if disc > 0.0 {
        let sq = disc.sqrt();
        let u = (-q / 2.0 + sq).cbrt();
        let w = (-q / 2.0 - sq).cbrt();
        vec![u + w - shift]
    } else if p.abs() < 1e-300 {
        vec![-shift]
    } else {
        let r = (-p / 3.0).sqrt();
        let phi = (-q / (2.0 * r * r * r)).clamp(-1.0, 1.0).acos();
        (0..3)
            .map(|k| 2.0 * r * ((phi + 2.0 * std::f64::consts::PI * k as f64) / 3.0).cos() - shift)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests_support::{four_bus_with_pv, two_bus};
    use super::*;

    #[test]
    fn test_cubic_roots() {
        // (x − 1)(x − 2)(x − 3)
        let mut roots = real_cubic_roots(1.0, -6.0, 11.0, -6.0);
        roots.sort_by(f64::total_cmp);
        assert_eq!(roots.len(), 3);
        for (r, e) in roots.iter().zip([1.0, 2.0, 3.0]) {
            assert!((r - e).abs() < 1e-9, "root {} expected {}", r, e);
        }

        // x³ + x + 10 has the single real root −2
        let roots = real_cubic_roots(1.0, 0.0, 1.0, 10.0);
        assert_eq!(roots.len(), 1);
        assert!((roots[0] + 2.0).abs() < 1e-9);

        // degenerate to linear
        assert_eq!(real_cubic_roots(0.0, 0.0, 2.0, -1.0), vec![0.5]);
    }

    #[test]
    fn test_two_bus_converges() {
        let case = two_bus();
        let out = solve(&case.input(1e-6, 25), &mut Logger::default());
        assert!(out.converged, "|f| = {}", out.norm_f);
        assert!((0.90..=0.99).contains(&out.v[1].norm()));
    }

    #[test]
    fn test_matches_newton_raphson_solution() {
        let case = four_bus_with_pv();
        let input = case.input(1e-9, 30);
        let iw = solve(&input, &mut Logger::default());
        let nr = super::super::newton_raphson::solve(&input, &mut Logger::default());
        assert!(iw.converged && nr.converged);
        for (a, b) in iw.v.iter().zip(&nr.v) {
            assert!((a - b).norm() < 1e-6);
        }
    }
}
