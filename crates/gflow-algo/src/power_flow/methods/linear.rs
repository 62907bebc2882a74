//! Non-iterative power flows: DC and linearised AC.
//!
//! ## DC
//!
//! ```text
//! B′(pvpq, pvpq)·θ(pvpq) = P(pvpq) − B′(pvpq, slack)·θ(slack)
//! V = |V0|·e^{jθ}
//! ```
//! Magnitudes come from the seed. The result counts as converged whenever
//! the system is solvable; `norm_f` still reports the AC mismatch of the
//! resulting voltage.
//!
//! ## Linear AC
//!
//! Linearisation around a `1∠0` profile (Rossoni et al.):
//! ```text
//! [ −Im Ys(pvpq, pvpq)    Re Ybus(pvpq, pq) ] [ θ(pvpq)  ]   [ P(pvpq) ]
//! [ −Re Ys(pq, pvpq)     −Im Ybus(pq, pq)   ] [ ΔV(pq)   ] = [ Q(pq)   ]
//! ```
//! with `|V(pq)| = 1 + ΔV`. The solution is reported converged when its AC
//! mismatch is below `1e-3`.

use super::common::{compute_power, inf_norm, mismatch};
use super::{MethodInput, SolverOutput};
use crate::sparse::real;
use gflow_core::Logger;
use num_complex::Complex64;
use web_time::Instant;

const LINEAR_AC_TOLERANCE: f64 = 1e-3;

pub fn solve_dc(input: &MethodInput<'_>, logger: &mut Logger) -> SolverOutput {
    let start = Instant::now();
    let pvpq = input.pvpq();
    if pvpq.is_empty() {
        return SolverOutput::trivial(input, start.elapsed().as_secs_f64());
    }

    let b_red = real::dense_block(input.b1, &pvpq, &pvpq);
    let slack_angles: Vec<f64> = input.slack.iter().map(|&i| input.v0[i].arg()).collect();
    let coupling = real::block_mul(input.b1, &pvpq, input.slack, &slack_angles);
    let rhs: Vec<f64> = pvpq
        .iter()
        .zip(&coupling)
        .map(|(&i, c)| input.sbus[i].re - c)
        .collect();

    let mut v = input.v0.to_vec();
    let converged = match input.backend.solve(&b_red, &rhs) {
        Ok(theta) => {
            for (k, &i) in pvpq.iter().enumerate() {
                v[i] = Complex64::from_polar(input.v0[i].norm(), theta[k]);
            }
            true
        }
        Err(err) => {
            logger.warn("solver", format!("DC power flow: {}", err));
            false
        }
    };

    let scalc = compute_power(input.ybus, &v, input.ibus);
    let norm_f = inf_norm(&mismatch(&scalc, input.sbus, &pvpq, input.pq));
    logger.progress(format!("DC power flow: AC mismatch {:.3e}", norm_f));

    SolverOutput {
        v,
        converged,
        norm_f,
        scalc,
        iterations: 1,
        elapsed: start.elapsed().as_secs_f64(),
    }
}

pub fn solve_linear_ac(input: &MethodInput<'_>, logger: &mut Logger) -> SolverOutput {
    let start = Instant::now();
    let pvpq = input.pvpq();
    if pvpq.is_empty() {
        return SolverOutput::trivial(input, start.elapsed().as_secs_f64());
    }
    let npvpq = pvpq.len();
    let dim = npvpq + input.pq.len();

    let ys_aa = input.yseries.dense_block(&pvpq, &pvpq);
    let yb_am = input.ybus.dense_block(&pvpq, input.pq);
    let ys_ma = input.yseries.dense_block(input.pq, &pvpq);
    let yb_mm = input.ybus.dense_block(input.pq, input.pq);

    let mut system = vec![vec![0.0; dim]; dim];
    for r in 0..npvpq {
        for c in 0..npvpq {
            system[r][c] = -ys_aa[r][c].im;
        }
        for c in 0..input.pq.len() {
            system[r][npvpq + c] = yb_am[r][c].re;
        }
    }
    for r in 0..input.pq.len() {
        for c in 0..npvpq {
            system[npvpq + r][c] = -ys_ma[r][c].re;
        }
        for c in 0..input.pq.len() {
            system[npvpq + r][npvpq + c] = -yb_mm[r][c].im;
        }
    }

    let mut rhs: Vec<f64> = pvpq.iter().map(|&i| input.sbus[i].re).collect();
    rhs.extend(input.pq.iter().map(|&i| input.sbus[i].im));

    let mut v = input.v0.to_vec();
    let solved = match input.backend.solve(&system, &rhs) {
        Ok(x) => {
            let mut vm: Vec<f64> = input.v0.iter().map(|x| x.norm()).collect();
            for (k, &i) in input.pq.iter().enumerate() {
                vm[i] = 1.0 + x[npvpq + k];
            }
            for (k, &i) in pvpq.iter().enumerate() {
                v[i] = Complex64::from_polar(vm[i], x[k]);
            }
            true
        }
        Err(err) => {
            logger.warn("solver", format!("linear AC power flow: {}", err));
            false
        }
    };

    let scalc = compute_power(input.ybus, &v, input.ibus);
    let norm_f = inf_norm(&mismatch(&scalc, input.sbus, &pvpq, input.pq));
    logger.progress(format!("linear AC power flow: AC mismatch {:.3e}", norm_f));

    SolverOutput {
        v,
        converged: solved && norm_f < LINEAR_AC_TOLERANCE,
        norm_f,
        scalc,
        iterations: 1,
        elapsed: start.elapsed().as_secs_f64(),
    }
}
