//! Helpers for the real-valued fast-decoupled matrices (B′, B″).

use super::complex::position_map;
use sprs::{CsMat, TriMat};

/// Iterate over non-zero entries in row i (zero-allocation).
pub fn row_iter(mat: &CsMat<f64>, i: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
    let indptr = mat.indptr();
    let start = indptr.index(i);
    let end = indptr.index(i + 1);
    let indices = &mat.indices()[start..end];
    let data = &mat.data()[start..end];
    indices.iter().zip(data.iter()).map(|(&j, &v)| (j, v))
}

pub fn get(mat: &CsMat<f64>, i: usize, j: usize) -> f64 {
    mat.get(i, j).copied().unwrap_or(0.0)
}

/// Dense copy of `A[rows, cols]`
pub fn dense_block(mat: &CsMat<f64>, rows: &[usize], cols: &[usize]) -> Vec<Vec<f64>> {
    let col_map = position_map(mat.cols(), cols);
    rows.iter()
        .map(|&i| {
            let mut row = vec![0.0; cols.len()];
            for (j, v) in row_iter(mat, i) {
                if let Some(c) = col_map[j] {
                    row[c] += v;
                }
            }
            row
        })
        .collect()
}

/// Sparse copy of `A[rows, cols]`
pub fn submatrix(mat: &CsMat<f64>, rows: &[usize], cols: &[usize]) -> CsMat<f64> {
    let col_map = position_map(mat.cols(), cols);
    let mut tri = TriMat::new((rows.len(), cols.len()));
    for (r, &i) in rows.iter().enumerate() {
        for (j, v) in row_iter(mat, i) {
            if let Some(c) = col_map[j] {
                tri.add_triplet(r, c, v);
            }
        }
    }
    tri.to_csr()
}

/// `A[rows, cols] · x[cols]`
pub fn block_mul(mat: &CsMat<f64>, rows: &[usize], cols: &[usize], x: &[f64]) -> Vec<f64> {
    let col_map = position_map(mat.cols(), cols);
    rows.iter()
        .map(|&i| {
            row_iter(mat, i)
                .filter_map(|(j, v)| col_map[j].map(|c| v * x[c]))
                .sum()
        })
        .collect()
}
