//! Newton-Raphson in polar coordinates with a backtracking line search.
//!
//! ```text
//! repeat:
//!     f  = [Re(Scalc − Sbus)[pvpq], Im(Scalc − Sbus)[pq]]
//!     J dx = f
//!     x ← x − μ dx          μ = 1, 0.25, 0.0625, ... while ‖f‖ does not drop
//! until ‖f‖∞ < tol
//! ```
//!
//! Backtracking stops after ten reductions or once μ falls below 0.01; the
//! last trial point is kept either way.

use super::common::{
    angles, apply_step, compute_power, inf_norm, jacobian, magnitudes, mismatch, polar,
    solve_sparse,
};
use super::{MethodInput, SolverOutput};
use gflow_core::Logger;
use web_time::Instant;

const BACKTRACK_FACTOR: f64 = 0.25;
const MAX_BACKTRACKS: usize = 10;
const MIN_STEP: f64 = 0.01;

pub fn solve(input: &MethodInput<'_>, logger: &mut Logger) -> SolverOutput {
    let start = Instant::now();
    let pvpq = input.pvpq();
    if pvpq.is_empty() {
        return SolverOutput::trivial(input, start.elapsed().as_secs_f64());
    }

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
                logger.warn(
                    "solver",
                    format!("Newton-Raphson iteration {}: {}", iterations, err),
                );
                break;
            }
        };

        let (va_base, vm_base) = (va.clone(), vm.clone());
        let mut mu = 1.0;
        let mut backtracks = 0;
        loop {
            apply_step(&mut va, &mut vm, &va_base, &vm_base, &dx, mu, &pvpq, input.pq);
            v = polar(&vm, &va);
            scalc = compute_power(input.ybus, &v, input.ibus);
            let f_new = mismatch(&scalc, input.sbus, &pvpq, input.pq);
            let norm_new = inf_norm(&f_new);

            let improved = norm_new < norm_f;
            f = f_new;
            if improved || backtracks >= MAX_BACKTRACKS || mu <= MIN_STEP {
                norm_f = norm_new;
                break;
            }
            mu *= BACKTRACK_FACTOR;
            backtracks += 1;
        }

        converged = norm_f < input.tolerance;
        logger.progress(format!(
            "NR iteration {}: |f| = {:.3e}, mu = {}",
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
