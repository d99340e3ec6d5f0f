//! Compressed sparse row operators.
//!
//! Operators assembled on the same degrees of freedom share one
//! [`SparsityPattern`] through an `Arc`, so linear combinations such as
//! `alpha0 * M + gamma0 * C2 * K` are plain value-array updates.

use std::collections::BTreeMap;
use std::sync::Arc;

use nalgebra::DMatrix;

use crate::error::{Error, Result};

/// Row-compressed sparsity structure with sorted column indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SparsityPattern {
    n_rows: usize,
    n_cols: usize,
    row_ptr: Vec<usize>,
    col_idx: Vec<usize>,
}

impl SparsityPattern {
    /// Build a pattern from (row, col) coordinates. Duplicates collapse.
    pub fn from_entries(
        n_rows: usize,
        n_cols: usize,
        entries: impl IntoIterator<Item = (usize, usize)>,
    ) -> Self {
        let mut rows: Vec<Vec<usize>> = vec![Vec::new(); n_rows];
        for (r, c) in entries {
            rows[r].push(c);
        }

        let mut row_ptr = Vec::with_capacity(n_rows + 1);
        let mut col_idx = Vec::new();
        row_ptr.push(0);
        for mut cols in rows {
            cols.sort_unstable();
            cols.dedup();
            col_idx.extend_from_slice(&cols);
            row_ptr.push(col_idx.len());
        }

        Self {
            n_rows,
            n_cols,
            row_ptr,
            col_idx,
        }
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_cols(&self) -> usize {
        self.n_cols
    }

    pub fn nnz(&self) -> usize {
        self.col_idx.len()
    }

    pub fn row_ptr(&self) -> &[usize] {
        &self.row_ptr
    }

    pub fn col_idx(&self) -> &[usize] {
        &self.col_idx
    }

    /// Column indices of one row.
    pub fn row(&self, row: usize) -> &[usize] {
        &self.col_idx[self.row_ptr[row]..self.row_ptr[row + 1]]
    }

    /// Position of `(row, col)` in the value array.
    pub fn find(&self, row: usize, col: usize) -> Option<usize> {
        let start = self.row_ptr[row];
        self.row(row)
            .binary_search(&col)
            .ok()
            .map(|offset| start + offset)
    }
}

/// Sparse matrix in CSR format.
#[derive(Debug, Clone)]
pub struct CsrMatrix {
    pattern: Arc<SparsityPattern>,
    values: Vec<f64>,
}

impl CsrMatrix {
    /// All-zero matrix on an existing pattern.
    pub fn zeros(pattern: Arc<SparsityPattern>) -> Self {
        let values = vec![0.0; pattern.nnz()];
        Self { pattern, values }
    }

    /// Build from (row, col, value) triplets. Duplicate entries are summed.
    pub fn from_triplets(n_rows: usize, n_cols: usize, triplets: &[(usize, usize, f64)]) -> Self {
        let mut map: BTreeMap<(usize, usize), f64> = BTreeMap::new();
        for &(r, c, v) in triplets {
            *map.entry((r, c)).or_insert(0.0) += v;
        }

        let pattern = SparsityPattern::from_entries(n_rows, n_cols, map.keys().copied());
        // BTreeMap iterates in (row, col) order, matching the CSR layout.
        let values = map.into_values().collect();
        Self {
            pattern: Arc::new(pattern),
            values,
        }
    }

    /// Build on a given pattern, summing triplets into it.
    pub fn from_triplets_with_pattern(
        pattern: Arc<SparsityPattern>,
        triplets: &[(usize, usize, f64)],
    ) -> Result<Self> {
        let mut matrix = Self::zeros(pattern);
        for &(r, c, v) in triplets {
            matrix.add(r, c, v)?;
        }
        Ok(matrix)
    }

    pub fn identity(n: usize) -> Self {
        let triplets: Vec<_> = (0..n).map(|i| (i, i, 1.0)).collect();
        Self::from_triplets(n, n, &triplets)
    }

    pub fn pattern(&self) -> &Arc<SparsityPattern> {
        &self.pattern
    }

    /// Whether `other` has the identical structure.
    pub fn shares_pattern(&self, other: &CsrMatrix) -> bool {
        Arc::ptr_eq(&self.pattern, &other.pattern) || self.pattern == other.pattern
    }

    pub fn n_rows(&self) -> usize {
        self.pattern.n_rows
    }

    pub fn n_cols(&self) -> usize {
        self.pattern.n_cols
    }

    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn values_mut(&mut self) -> &mut [f64] {
        &mut self.values
    }

    /// Entry value, zero outside the pattern.
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.pattern.find(row, col).map_or(0.0, |k| self.values[k])
    }

    /// Add into an existing entry.
    pub fn add(&mut self, row: usize, col: usize, value: f64) -> Result<()> {
        let k = self
            .pattern
            .find(row, col)
            .ok_or(Error::MissingEntry { row, col })?;
        self.values[k] += value;
        Ok(())
    }

    /// Iterate over the stored `(col, value)` pairs of a row.
    pub fn row_entries(&self, row: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        let range = self.pattern.row_ptr[row]..self.pattern.row_ptr[row + 1];
        self.pattern.col_idx[range.clone()]
            .iter()
            .copied()
            .zip(self.values[range].iter().copied())
    }

    pub fn set_zero(&mut self) {
        self.values.iter_mut().for_each(|v| *v = 0.0);
    }

    pub fn scale(&mut self, factor: f64) {
        self.values.iter_mut().for_each(|v| *v *= factor);
    }

    /// Overwrite values with those of a matrix on the same pattern.
    pub fn copy_from(&mut self, other: &CsrMatrix) -> Result<()> {
        if !self.shares_pattern(other) {
            return Err(Error::PatternMismatch);
        }
        self.values.copy_from_slice(&other.values);
        Ok(())
    }

    /// `self += factor * other` on a shared pattern.
    pub fn add_scaled(&mut self, factor: f64, other: &CsrMatrix) -> Result<()> {
        if !self.shares_pattern(other) {
            return Err(Error::PatternMismatch);
        }
        for (a, b) in self.values.iter_mut().zip(&other.values) {
            *a += factor * b;
        }
        Ok(())
    }

    /// `a * lhs + b * rhs` on a shared pattern.
    pub fn linear_combination(a: f64, lhs: &CsrMatrix, b: f64, rhs: &CsrMatrix) -> Result<Self> {
        let mut out = lhs.clone();
        out.scale(a);
        out.add_scaled(b, rhs)?;
        Ok(out)
    }

    /// `y = A * x`
    pub fn mul_vec(&self, x: &[f64], y: &mut [f64]) {
        debug_assert_eq!(x.len(), self.n_cols());
        debug_assert_eq!(y.len(), self.n_rows());
        let row_ptr = &self.pattern.row_ptr;
        let col_idx = &self.pattern.col_idx;
        for (i, yi) in y.iter_mut().enumerate() {
            let mut acc = 0.0;
            for k in row_ptr[i]..row_ptr[i + 1] {
                acc += self.values[k] * x[col_idx[k]];
            }
            *yi = acc;
        }
    }

    /// `y += alpha * A * x`
    pub fn mul_vec_add(&self, alpha: f64, x: &[f64], y: &mut [f64]) {
        debug_assert_eq!(x.len(), self.n_cols());
        debug_assert_eq!(y.len(), self.n_rows());
        let row_ptr = &self.pattern.row_ptr;
        let col_idx = &self.pattern.col_idx;
        for (i, yi) in y.iter_mut().enumerate() {
            let mut acc = 0.0;
            for k in row_ptr[i]..row_ptr[i + 1] {
                acc += self.values[k] * x[col_idx[k]];
            }
            *yi += alpha * acc;
        }
    }

    /// `y = A^T * x`
    pub fn transpose_mul_vec(&self, x: &[f64], y: &mut [f64]) {
        debug_assert_eq!(x.len(), self.n_rows());
        debug_assert_eq!(y.len(), self.n_cols());
        y.iter_mut().for_each(|v| *v = 0.0);
        for (i, xi) in x.iter().enumerate() {
            for (j, a) in self.row_entries(i) {
                y[j] += a * xi;
            }
        }
    }

    /// Diagonal entries (zero where the pattern has none).
    pub fn diagonal(&self) -> Vec<f64> {
        (0..self.n_rows().min(self.n_cols()))
            .map(|i| self.get(i, i))
            .collect()
    }

    pub fn is_symmetric(&self, tol: f64) -> bool {
        if self.n_rows() != self.n_cols() {
            return false;
        }
        (0..self.n_rows()).all(|i| {
            self.row_entries(i)
                .all(|(j, a)| (a - self.get(j, i)).abs() <= tol)
        })
    }

    /// Dense copy, used by direct solves on small systems.
    pub fn to_dense(&self) -> DMatrix<f64> {
        let mut dense = DMatrix::zeros(self.n_rows(), self.n_cols());
        for i in 0..self.n_rows() {
            for (j, a) in self.row_entries(i) {
                dense[(i, j)] = a;
            }
        }
        dense
    }
}
