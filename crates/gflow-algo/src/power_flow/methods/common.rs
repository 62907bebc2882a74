//! Shared building blocks of the Newton-type methods.
//!
//! Sign convention: the mismatch is `f = Scalc − Sbus` with
//! `Scalc = V · conj(Ybus·V − Ibus)`, stacked as
//! `[Re f(pv ∪ pq), Im f(pq)]`, so a Newton step is `x ← x − J⁻¹ f`.

use crate::sparse::{real, SparseComplexMatrix};
use gflow_core::{FlowResult, LinearSystemBackend};
use num_complex::Complex64;
use sprs::{CsMat, TriMat};

/// `V · conj(Ybus·V − Ibus)`
pub fn compute_power(ybus: &SparseComplexMatrix, v: &[Complex64], ibus: &[Complex64]) -> Vec<Complex64> {
    ybus.mul_vec(v)
        .iter()
        .zip(ibus)
        .zip(v)
        .map(|((yv, i), vi)| vi * (yv - i).conj())
        .collect()
}

/// Stacked real mismatch `[Re(Scalc − Sbus)[pvpq], Im(Scalc − Sbus)[pq]]`
pub fn mismatch(scalc: &[Complex64], sbus: &[Complex64], pvpq: &[usize], pq: &[usize]) -> Vec<f64> {
    let mut f = Vec::with_capacity(pvpq.len() + pq.len());
    f.extend(pvpq.iter().map(|&i| (scalc[i] - sbus[i]).re));
    f.extend(pq.iter().map(|&i| (scalc[i] - sbus[i]).im));
    f
}

pub fn inf_norm(x: &[f64]) -> f64 {
    x.iter().fold(0.0, |acc: f64, v| acc.max(v.abs()))
}

pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

pub fn magnitudes(v: &[Complex64]) -> Vec<f64> {
    v.iter().map(|x| x.norm()).collect()
}

pub fn angles(v: &[Complex64]) -> Vec<f64> {
    v.iter().map(|x| x.arg()).collect()
}

pub fn polar(vm: &[f64], va: &[f64]) -> Vec<Complex64> {
    vm.iter()
        .zip(va)
        .map(|(&m, &a)| Complex64::from_polar(m, a))
        .collect()
}

/// Partial derivatives of bus power with respect to angle and magnitude.
///
/// Returns `(dS/dVa, dS/dVm)` with the pattern of `Ybus`.
pub fn ds_dv(
    ybus: &SparseComplexMatrix,
    v: &[Complex64],
    ibus: &[Complex64],
) -> (SparseComplexMatrix, SparseComplexMatrix) {
    let n = v.len();
    let j = Complex64::new(0.0, 1.0);
    let vnorm: Vec<Complex64> = v
        .iter()
        .map(|x| if x.norm() > 0.0 { x / x.norm() } else { Complex64::new(1.0, 0.0) })
        .collect();
    let icalc: Vec<Complex64> = ybus
        .mul_vec(v)
        .iter()
        .zip(ibus)
        .map(|(yv, i)| yv - i)
        .collect();

    let mut d_va = Vec::new();
    let mut d_vm = Vec::new();
    for row in 0..n {
        for (col, y) in ybus.row_iter(row) {
            d_va.push((row, col, -j * v[row] * (y * v[col]).conj()));
            d_vm.push((row, col, v[row] * (y * vnorm[col]).conj()));
        }
        d_va.push((row, row, j * v[row] * icalc[row].conj()));
        d_vm.push((row, row, icalc[row].conj() * vnorm[row]));
    }

    (
        SparseComplexMatrix::from_triplets((n, n), &d_va),
        SparseComplexMatrix::from_triplets((n, n), &d_vm),
    )
}

/// Power-mismatch Jacobian in CSR form.
///
/// ```text
/// J = [ Re dS/dVa(pvpq, pvpq)   Re dS/dVm(pvpq, pq) ]
///     [ Im dS/dVa(pq, pvpq)     Im dS/dVm(pq, pq)   ]
/// ```
pub fn jacobian(
    ybus: &SparseComplexMatrix,
    v: &[Complex64],
    ibus: &[Complex64],
    pvpq: &[usize],
    pq: &[usize],
) -> CsMat<f64> {
    let (d_va, d_vm) = ds_dv(ybus, v, ibus);
    stack_jacobian(&d_va, &d_vm, pvpq, pq)
}

/// Arrange complex derivative matrices into the real block Jacobian.
pub fn stack_jacobian(
    d_va: &SparseComplexMatrix,
    d_vm: &SparseComplexMatrix,
    pvpq: &[usize],
    pq: &[usize],
) -> CsMat<f64> {
    let n = d_va.rows();
    let npvpq = pvpq.len();
    let dim = npvpq + pq.len();

    let mut angle_col = vec![None; n];
    for (c, &i) in pvpq.iter().enumerate() {
        angle_col[i] = Some(c);
    }
    let mut mag_col = vec![None; n];
    for (c, &i) in pq.iter().enumerate() {
        mag_col[i] = Some(npvpq + c);
    }

    let mut tri = TriMat::new((dim, dim));
    for (r, &i) in pvpq.iter().enumerate() {
        for (k, val) in d_va.row_iter(i) {
            if let Some(c) = angle_col[k] {
                tri.add_triplet(r, c, val.re);
            }
        }
        for (k, val) in d_vm.row_iter(i) {
            if let Some(c) = mag_col[k] {
                tri.add_triplet(r, c, val.re);
            }
        }
    }
    for (r, &i) in pq.iter().enumerate() {
        let r = npvpq + r;
        for (k, val) in d_va.row_iter(i) {
            if let Some(c) = angle_col[k] {
                tri.add_triplet(r, c, val.im);
            }
        }
        for (k, val) in d_vm.row_iter(i) {
            if let Some(c) = mag_col[k] {
                tri.add_triplet(r, c, val.im);
            }
        }
    }
    tri.to_csr()
}

pub fn to_dense(mat: &CsMat<f64>) -> Vec<Vec<f64>> {
    let rows: Vec<usize> = (0..mat.rows()).collect();
    let cols: Vec<usize> = (0..mat.cols()).collect();
    real::dense_block(mat, &rows, &cols)
}

/// Solve `J x = f` through the configured dense backend.
pub fn solve_sparse(
    backend: &dyn LinearSystemBackend,
    mat: &CsMat<f64>,
    rhs: &[f64],
) -> FlowResult<Vec<f64>> {
    backend.solve(&to_dense(mat), rhs)
}

/// `J · x`
pub fn mat_vec(mat: &CsMat<f64>, x: &[f64]) -> Vec<f64> {
    (0..mat.rows())
        .map(|i| real::row_iter(mat, i).map(|(j, v)| v * x[j]).sum())
        .collect()
}

/// Apply a Newton-type correction `x ← x − μ·dx` in polar form.
pub fn apply_step(
    va: &mut [f64],
    vm: &mut [f64],
    va_base: &[f64],
    vm_base: &[f64],
    dx: &[f64],
    mu: f64,
    pvpq: &[usize],
    pq: &[usize],
) {
    let npvpq = pvpq.len();
    for (k, &i) in pvpq.iter().enumerate() {
        va[i] = va_base[i] - mu * dx[k];
    }
    for (k, &i) in pq.iter().enumerate() {
        vm[i] = vm_base[i] - mu * dx[npvpq + k];
    }
}
