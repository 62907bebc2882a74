use crate::error::{FlowError, FlowResult};
use faer::{prelude::*, solvers::PartialPivLu, Mat};

/// Trait for solving dense linear systems (Ax = b).
///
/// Every Newton-type step, fast-decoupled half iteration and linear power
/// flow in the kernel ends in a call to this trait. A singular system is
/// reported as [`FlowError::SingularMatrix`]; callers turn that into a
/// non-converged result rather than a fatal error.
pub trait LinearSystemBackend: Send + Sync {
    /// Solve the linear system Ax = b
    fn solve(&self, matrix: &[Vec<f64>], rhs: &[f64]) -> FlowResult<Vec<f64>>;
}

fn check_dimensions(matrix: &[Vec<f64>], rhs: &[f64]) -> FlowResult<()> {
    let n = matrix.len();
    if rhs.len() != n {
        return Err(FlowError::Validation(format!(
            "rhs length ({}) does not match matrix dimension {}",
            rhs.len(),
            n
        )));
    }
    if matrix.iter().any(|row| row.len() != n) {
        return Err(FlowError::Validation("matrix must be square".into()));
    }
    Ok(())
}

/// Gauss-Jordan elimination with partial pivoting.
#[derive(Debug, Clone, Default)]
pub struct GaussSolver;

impl LinearSystemBackend for GaussSolver {
    fn solve(&self, matrix: &[Vec<f64>], rhs: &[f64]) -> FlowResult<Vec<f64>> {
        let n = matrix.len();
        if n == 0 {
            return Ok(Vec::new());
        }
        check_dimensions(matrix, rhs)?;

        let mut a = matrix.to_vec();
        let mut b = rhs.to_vec();

        for i in 0..n {
            let mut pivot = i;
            for row in i + 1..n {
                if a[row][i].abs() > a[pivot][i].abs() {
                    pivot = row;
                }
            }
            if pivot != i {
                a.swap(i, pivot);
                b.swap(i, pivot);
            }

            let diag = a[i][i];
            if diag.abs() < 1e-12 {
                return Err(FlowError::SingularMatrix(format!(
                    "pivot {} below threshold",
                    i
                )));
            }

            for value in a[i][i..].iter_mut() {
                *value /= diag;
            }
            b[i] /= diag;

            let pivot_segment = a[i][i..].to_vec();
            for row in 0..n {
                if row == i {
                    continue;
                }
                let factor = a[row][i];
                if factor == 0.0 {
                    continue;
                }
                for (target, &pivot) in a[row][i..].iter_mut().zip(pivot_segment.iter()) {
                    *target -= factor * pivot;
                }
                b[row] -= factor * b[i];
            }
        }

        Ok(b)
    }
}

/// LU with partial pivoting from `faer`.
#[derive(Debug, Clone, Default)]
pub struct FaerSolver;

impl LinearSystemBackend for FaerSolver {
    fn solve(&self, matrix: &[Vec<f64>], rhs: &[f64]) -> FlowResult<Vec<f64>> {
        let n = matrix.len();
        if n == 0 {
            return Ok(Vec::new());
        }
        check_dimensions(matrix, rhs)?;

        let mat = Mat::from_fn(n, n, |i, j| matrix[i][j]);
        let rhs_mat = Mat::from_fn(n, 1, |i, _| rhs[i]);
        let lu = PartialPivLu::new(mat.as_ref());
        let sol = lu.solve(&rhs_mat);

        let mut solution = Vec::with_capacity(n);
        for i in 0..n {
            let value = sol.read(i, 0);
            // faer does not report singularity; it shows up as non-finite output
            if !value.is_finite() {
                return Err(FlowError::SingularMatrix(
                    "LU solution contains non-finite values".into(),
                ));
            }
            solution.push(value);
        }
        Ok(solution)
    }
}
