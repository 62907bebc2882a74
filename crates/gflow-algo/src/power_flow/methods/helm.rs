//! Holomorphic embedding load flow (HELM) for networks of PQ and slack buses.
//!
//! The voltage is expanded as a power series in the embedding parameter `s`:
//!
//! ```text
//! Σ Yser·V(s) = s·conj(S)·conj(W(s)) − s·Ysh·V(s) + s·I      W(s) = 1/V(s)
//! Vslack(s)   = 1 + s·(Vs − 1)
//! ```
//!
//! Coefficients follow from matching powers of `s`:
//!
//! ```text
//! order 0:  Yser(pq,pq)·V[0] = −Yser(pq,slack)·1
//! order n:  Yser(pq,pq)·V[n] = conj(S)·conj(W[n−1]) − Ysh·V[n−1] + I·δ(n,1)
//!                              − Yser(pq,slack)·Vslack[n]
//!           W[n] = −Σ_{k<n} W[k]·V[n−k] / V[0]
//! ```
//!
//! The series is evaluated at `s = 1` with Wynn's epsilon algorithm applied
//! to the partial sums. Complex systems are solved through the real block
//! form `[[Re, −Im], [Im, Re]]`.

use super::common::{compute_power, inf_norm, mismatch};
use super::{MethodInput, SolverOutput};
use gflow_core::{FlowResult, LinearSystemBackend, Logger};
use num_complex::Complex64;
use web_time::Instant;

/// Coefficients computed before convergence is first checked
const MIN_ORDER: usize = 3;

fn solve_complex(
    backend: &dyn LinearSystemBackend,
    matrix: &[Vec<f64>],
    rhs: &[Complex64],
) -> FlowResult<Vec<Complex64>> {
    let n = rhs.len();
    let mut b = Vec::with_capacity(2 * n);
    b.extend(rhs.iter().map(|x| x.re));
    b.extend(rhs.iter().map(|x| x.im));
    let x = backend.solve(matrix, &b)?;
    Ok((0..n).map(|k| Complex64::new(x[k], x[n + k])).collect())
}

/// Real 2n×2n embedding of a complex matrix
fn embed(a: &[Vec<Complex64>]) -> Vec<Vec<f64>> {
    let n = a.len();
    let mut out = vec![vec![0.0; 2 * n]; 2 * n];
    for (i, row) in a.iter().enumerate() {
        for (j, y) in row.iter().enumerate() {
            out[i][j] = y.re;
            out[i][n + j] = -y.im;
            out[n + i][j] = y.im;
            out[n + i][n + j] = y.re;
        }
    }
    out
}

/// Wynn epsilon extrapolation of a sequence of partial sums.
pub(crate) fn wynn_epsilon(partial_sums: &[Complex64]) -> Complex64 {
    let n = partial_sums.len();
    let mut best = match partial_sums.last() {
        Some(&x) => x,
        None => return Complex64::new(0.0, 0.0),
    };
    if n < 3 {
        return best;
    }

    let mut prev = vec![Complex64::new(0.0, 0.0); n];
    let mut cur = partial_sums.to_vec();
    let mut column = 0;
    while cur.len() > 1 {
        let mut next = Vec::with_capacity(cur.len() - 1);
        for k in 0..cur.len() - 1 {
            let diff = cur[k + 1] - cur[k];
            if diff.norm() <= 1e-14 * (1.0 + cur[k + 1].norm()) {
                // converged column
                return if column % 2 == 0 { cur[k + 1] } else { best };
            }
            next.push(prev[k + 1] + diff.inv());
        }
        prev = cur;
        cur = next;
        column += 1;
        if column % 2 == 0 {
            if let Some(&x) = cur.last() {
                if x.is_finite() {
                    best = x;
                }
            }
        }
    }
    best
}

pub fn solve(input: &MethodInput<'_>, logger: &mut Logger) -> SolverOutput {
    let start = Instant::now();
    let pq = input.pq;
    if pq.is_empty() {
        return SolverOutput::trivial(input, start.elapsed().as_secs_f64());
    }
    let npq = pq.len();
    let pvpq = input.pvpq();

    let ys_pq = embed(&input.yseries.dense_block(pq, pq));
    let ys_slack = input.yseries.dense_block(pq, input.slack);
    let ysh: Vec<Complex64> = pq
        .iter()
        .map(|&i| input.ybus.get(i, i) - input.yseries.get(i, i))
        .collect();
    let s_conj: Vec<Complex64> = pq.iter().map(|&i| input.sbus[i].conj()).collect();
    let vs_minus_one: Vec<Complex64> = input
        .slack
        .iter()
        .map(|&i| input.v0[i] - Complex64::new(1.0, 0.0))
        .collect();

    let slack_term = |coeffs: &[Complex64]| -> Vec<Complex64> {
        ys_slack
            .iter()
            .map(|row| row.iter().zip(coeffs).map(|(y, c)| y * c).sum())
            .collect()
    };

    let mut v_coeffs: Vec<Vec<Complex64>> = Vec::new();
    let mut w_coeffs: Vec<Vec<Complex64>> = Vec::new();
    let mut partial: Vec<Vec<Complex64>> = vec![Vec::new(); npq];
    let mut v = input.v0.to_vec();
    let mut scalc = compute_power(input.ybus, &v, input.ibus);
    let mut norm_f = inf_norm(&mismatch(&scalc, input.sbus, &pvpq, pq));
    let mut converged = false;
    let max_order = input.max_iterations.max(MIN_ORDER + 1);

    for order in 0..max_order {
        let rhs: Vec<Complex64> = if order == 0 {
            let ones = vec![Complex64::new(1.0, 0.0); input.slack.len()];
            slack_term(&ones).into_iter().map(|x| -x).collect()
        } else {
            let slack_coeff = if order == 1 {
                vs_minus_one.clone()
            } else {
                vec![Complex64::new(0.0, 0.0); input.slack.len()]
            };
            let slack_rhs = slack_term(&slack_coeff);
            (0..npq)
                .map(|k| {
                    let mut value = s_conj[k] * w_coeffs[order - 1][k].conj()
                        - ysh[k] * v_coeffs[order - 1][k]
                        - slack_rhs[k];
                    if order == 1 {
                        value += input.ibus[pq[k]];
                    }
                    value
                })
                .collect()
        };

        let coeff = match solve_complex(input.backend, &ys_pq, &rhs) {
            Ok(x) => x,
            Err(err) => {
                logger.warn("solver", format!("holomorphic embedding order {}: {}", order, err));
                break;
            }
        };

        let w: Vec<Complex64> = if order == 0 {
            coeff.iter().map(|x| x.inv()).collect()
        } else {
            (0..npq)
                .map(|k| {
                    let acc: Complex64 = (0..order)
                        .map(|m| {
                            let vn = if m == 0 { coeff[k] } else { v_coeffs[order - m][k] };
                            w_coeffs[m][k] * vn
                        })
                        .sum();
                    -acc / v_coeffs[0][k]
                })
                .collect()
        };

        for k in 0..npq {
            let last = partial[k].last().copied().unwrap_or_default();
            partial[k].push(last + coeff[k]);
        }
        v_coeffs.push(coeff);
        w_coeffs.push(w);

        if order + 1 < MIN_ORDER {
            continue;
        }

        for (k, &i) in pq.iter().enumerate() {
            v[i] = wynn_epsilon(&partial[k]);
        }
        scalc = compute_power(input.ybus, &v, input.ibus);
        norm_f = inf_norm(&mismatch(&scalc, input.sbus, &pvpq, pq));
        logger.progress(format!("HELM order {}: |f| = {:.3e}", order, norm_f));
        if norm_f < input.tolerance {
            converged = true;
            break;
        }
    }

    SolverOutput {
        v,
        converged,
        norm_f,
        scalc,
        iterations: v_coeffs.len(),
        elapsed: start.elapsed().as_secs_f64(),
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests_support::{four_bus_pq_only, two_bus};
    use super::*;

    #[test]
    fn test_wynn_accelerates_geometric_series() {
        // Σ 0.5^k = 2
        let mut sums = Vec::new();
        let mut acc = Complex64::new(0.0, 0.0);
        for k in 0..6 {
            acc += Complex64::new(0.5f64.powi(k), 0.0);
            sums.push(acc);
        }
        let estimate = wynn_epsilon(&sums);
        assert!((estimate - Complex64::new(2.0, 0.0)).norm() < 1e-9, "got {}", estimate);
    }

    #[test]
    fn test_two_bus_matches_newton() {
        let case = two_bus();
        let input = case.input(1e-8, 40);
        let helm = solve(&input, &mut Logger::default());
        let nr = super::super::newton_raphson::solve(&input, &mut Logger::default());
        assert!(helm.converged, "|f| = {}", helm.norm_f);
        assert!((helm.v[1] - nr.v[1]).norm() < 1e-6);
    }

    #[test]
    fn test_meshed_pq_case_converges() {
        let case = four_bus_pq_only();
        let out = solve(&case.input(1e-8, 40), &mut Logger::default());
        assert!(out.converged, "|f| = {}", out.norm_f);
    }
}
