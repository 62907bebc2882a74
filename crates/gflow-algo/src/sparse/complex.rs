//! Sparse complex matrix stored as two CSR halves.
//!
//! ```text
//! Y = G + jB
//! ```
//!
//! Real (G) and imaginary (B) parts are kept in separate `sprs` CSR matrices
//! built from the same triplet stream, so the sparsity patterns agree except
//! where one half cancels to an explicit zero.

use num_complex::Complex64;
use sprs::{CsMat, TriMat};

#[derive(Debug, Clone)]
pub struct SparseComplexMatrix {
    rows: usize,
    cols: usize,
    /// Real part in CSR format
    g_matrix: CsMat<f64>,
    /// Imaginary part in CSR format
    b_matrix: CsMat<f64>,
}

impl SparseComplexMatrix {
    /// Assemble from `(row, col, value)` triplets; duplicates are summed.
    pub fn from_triplets(shape: (usize, usize), triplets: &[(usize, usize, Complex64)]) -> Self {
        let mut g_triplet = TriMat::with_capacity(shape, triplets.len());
        let mut b_triplet = TriMat::with_capacity(shape, triplets.len());
        for &(i, j, y) in triplets {
            g_triplet.add_triplet(i, j, y.re);
            b_triplet.add_triplet(i, j, y.im);
        }
        Self {
            rows: shape.0,
            cols: shape.1,
            g_matrix: g_triplet.to_csr(),
            b_matrix: b_triplet.to_csr(),
        }
    }

    /// Diagonal matrix
    pub fn diagonal(values: &[Complex64]) -> Self {
        let triplets: Vec<_> = values.iter().enumerate().map(|(i, &v)| (i, i, v)).collect();
        Self::from_triplets((values.len(), values.len()), &triplets)
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Non-zeros of the union pattern
    pub fn nnz(&self) -> usize {
        (0..self.rows).map(|i| self.row_iter(i).count()).sum()
    }

    /// Get G[i,j]
    pub fn g(&self, i: usize, j: usize) -> f64 {
        self.g_matrix.get(i, j).copied().unwrap_or(0.0)
    }

    /// Get B[i,j]
    pub fn b(&self, i: usize, j: usize) -> f64 {
        self.b_matrix.get(i, j).copied().unwrap_or(0.0)
    }

    /// Get complex Y[i,j] = G[i,j] + jB[i,j]
    pub fn get(&self, i: usize, j: usize) -> Complex64 {
        Complex64::new(self.g(i, j), self.b(i, j))
    }

    /// Iterate over the non-zero entries of row `i` in column order.
    ///
    /// Merges the two CSR rows so an entry present in only one half is still
    /// reported.
    pub fn row_iter(&self, i: usize) -> RowIter<'_> {
        RowIter {
            g: csr_row(&self.g_matrix, i),
            b: csr_row(&self.b_matrix, i),
            gi: 0,
            bi: 0,
        }
    }

    /// y = A x
    pub fn mul_vec(&self, x: &[Complex64]) -> Vec<Complex64> {
        (0..self.rows)
            .map(|i| self.row_iter(i).map(|(j, y)| y * x[j]).sum())
            .collect()
    }

    /// y = A^T x
    pub fn transpose_mul_vec(&self, x: &[Complex64]) -> Vec<Complex64> {
        let mut out = vec![Complex64::new(0.0, 0.0); self.cols];
        for (i, &xi) in x.iter().enumerate().take(self.rows) {
            for (j, y) in self.row_iter(i) {
                out[j] += y * xi;
            }
        }
        out
    }

    /// Extract `A[rows, cols]` keeping the given order.
    pub fn submatrix(&self, rows: &[usize], cols: &[usize]) -> Self {
        let col_map = position_map(self.cols, cols);
        let mut triplets = Vec::new();
        for (r, &i) in rows.iter().enumerate() {
            for (j, y) in self.row_iter(i) {
                if let Some(c) = col_map[j] {
                    triplets.push((r, c, y));
                }
            }
        }
        Self::from_triplets((rows.len(), cols.len()), &triplets)
    }

    /// Dense copy of `A[rows, cols]`
    pub fn dense_block(&self, rows: &[usize], cols: &[usize]) -> Vec<Vec<Complex64>> {
        let col_map = position_map(self.cols, cols);
        rows.iter()
            .map(|&i| {
                let mut row = vec![Complex64::new(0.0, 0.0); cols.len()];
                for (j, y) in self.row_iter(i) {
                    if let Some(c) = col_map[j] {
                        row[c] = y;
                    }
                }
                row
            })
            .collect()
    }

    pub fn to_dense(&self) -> Vec<Vec<Complex64>> {
        let all_rows: Vec<usize> = (0..self.rows).collect();
        let all_cols: Vec<usize> = (0..self.cols).collect();
        self.dense_block(&all_rows, &all_cols)
    }
}

fn csr_row(mat: &CsMat<f64>, i: usize) -> (&[usize], &[f64]) {
    let indptr = mat.indptr();
    let start = indptr.index(i);
    let end = indptr.index(i + 1);
    (&mat.indices()[start..end], &mat.data()[start..end])
}

/// `map[k] = Some(position of k in selection)`
pub(crate) fn position_map(len: usize, selection: &[usize]) -> Vec<Option<usize>> {
    let mut map = vec![None; len];
    for (pos, &k) in selection.iter().enumerate() {
        map[k] = Some(pos);
    }
    map
}

/// Column-ordered merge of the G and B rows.
pub struct RowIter<'a> {
    g: (&'a [usize], &'a [f64]),
    b: (&'a [usize], &'a [f64]),
    gi: usize,
    bi: usize,
}

impl Iterator for RowIter<'_> {
    type Item = (usize, Complex64);

    fn next(&mut self) -> Option<Self::Item> {
        let g_col = self.g.0.get(self.gi).copied();
        let b_col = self.b.0.get(self.bi).copied();
        match (g_col, b_col) {
            (None, None) => None,
            (Some(gc), Some(bc)) if gc == bc => {
                let value = Complex64::new(self.g.1[self.gi], self.b.1[self.bi]);
                self.gi += 1;
                self.bi += 1;
                Some((gc, value))
            }
            (Some(gc), Some(bc)) if gc < bc => {
                let value = Complex64::new(self.g.1[self.gi], 0.0);
                self.gi += 1;
                Some((gc, value))
            }
            (Some(gc), None) => {
                let value = Complex64::new(self.g.1[self.gi], 0.0);
                self.gi += 1;
                Some((gc, value))
            }
            (_, Some(bc)) => {
                let value = Complex64::new(0.0, self.b.1[self.bi]);
                self.bi += 1;
                Some((bc, value))
            }
        }
    }
}
