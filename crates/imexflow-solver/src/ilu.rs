//! Zero fill-in incomplete LU factorization.
//!
//! The factors live in a copy of the matrix values on the matrix's own
//! sparsity pattern: strictly lower entries hold `L` (unit diagonal
//! implied), the diagonal and upper entries hold `U`. Updates that would
//! create an entry outside the pattern are discarded.
//!
//! Momentum and heat operators are mass dominated, so this is usually the
//! cheapest preconditioner that keeps GMRES iteration counts flat under
//! refinement.

use std::sync::Arc;

use imexflow_core::{CsrMatrix, SparsityPattern};
use thiserror::Error;

use crate::preconditioner::Preconditioner;

const PIVOT_FLOOR: f64 = 1e-300;
const UNSET: usize = usize::MAX;

/// Failure while building an incomplete factorization.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum IluError {
    #[error("zero pivot at row {0}")]
    ZeroPivot(usize),

    #[error("row {0} has no diagonal entry in its sparsity pattern")]
    MissingDiagonal(usize),

    #[error("invalid structure: {0}")]
    InvalidStructure(String),
}

/// ILU(0) factors of an assembled operator.
pub struct Ilu0Preconditioner {
    pattern: Arc<SparsityPattern>,
    factors: Vec<f64>,
    /// Position of `(i, i)` in `factors` for every row.
    diagonal: Vec<usize>,
}

impl Ilu0Preconditioner {
    /// Factorize `matrix`. The pattern must be square with every diagonal
    /// entry present.
    pub fn from_matrix(matrix: &CsrMatrix) -> Result<Self, IluError> {
        let pattern = Arc::clone(matrix.pattern());
        if pattern.n_rows() != pattern.n_cols() {
            return Err(IluError::InvalidStructure(format!(
                "{}x{} operator is not square",
                pattern.n_rows(),
                pattern.n_cols()
            )));
        }

        let diagonal = (0..pattern.n_rows())
            .map(|row| pattern.find(row, row).ok_or(IluError::MissingDiagonal(row)))
            .collect::<Result<Vec<_>, _>>()?;

        let mut ilu = Self {
            pattern,
            factors: matrix.values().to_vec(),
            diagonal,
        };
        ilu.factorize()?;
        Ok(ilu)
    }

    /// Refactorize for new values on the pattern the factors were built on.
    pub fn update_values(&mut self, values: &[f64]) -> Result<(), IluError> {
        if values.len() != self.factors.len() {
            return Err(IluError::InvalidStructure(format!(
                "{} values for a pattern with {} entries",
                values.len(),
                self.factors.len()
            )));
        }
        self.factors.copy_from_slice(values);
        self.factorize()
    }

    pub fn nnz(&self) -> usize {
        self.factors.len()
    }

    fn factorize(&mut self) -> Result<(), IluError> {
        let n = self.pattern.n_rows();
        let row_ptr = self.pattern.row_ptr();
        let cols = self.pattern.col_idx();
        let values = &mut self.factors;

        // slot_of[j] is the position of (i, j) while row i is processed
        let mut slot_of = vec![UNSET; n];

        for i in 0..n {
            let row = row_ptr[i]..row_ptr[i + 1];
            for pos in row.clone() {
                slot_of[cols[pos]] = pos;
            }

            for pos in row_ptr[i]..self.diagonal[i] {
                let k = cols[pos];
                let pivot = values[self.diagonal[k]];
                if pivot.abs() < PIVOT_FLOOR {
                    return Err(IluError::ZeroPivot(k));
                }
                let l_ik = values[pos] / pivot;
                values[pos] = l_ik;

                for upper in (self.diagonal[k] + 1)..row_ptr[k + 1] {
                    let target = slot_of[cols[upper]];
                    if target != UNSET {
                        values[target] -= l_ik * values[upper];
                    }
                }
            }

            if values[self.diagonal[i]].abs() < PIVOT_FLOOR {
                return Err(IluError::ZeroPivot(i));
            }
            for pos in row {
                slot_of[cols[pos]] = UNSET;
            }
        }
        Ok(())
    }
}

impl Preconditioner for Ilu0Preconditioner {
    fn apply(&self, x: &[f64], y: &mut [f64]) {
        let n = self.dim();
        debug_assert!(x.len() == n && y.len() == n);
        let row_ptr = self.pattern.row_ptr();
        let cols = self.pattern.col_idx();

        // L z = x
        for i in 0..n {
            let lower: f64 = (row_ptr[i]..self.diagonal[i])
                .map(|pos| self.factors[pos] * y[cols[pos]])
                .sum();
            y[i] = x[i] - lower;
        }
        // U y = z
        for i in (0..n).rev() {
            let d = self.diagonal[i];
            let upper: f64 = ((d + 1)..row_ptr[i + 1])
                .map(|pos| self.factors[pos] * y[cols[pos]])
                .sum();
            y[i] = (y[i] - upper) / self.factors[d];
        }
    }

    fn dim(&self) -> usize {
        self.pattern.n_rows()
    }

    fn name(&self) -> &'static str {
        "ilu0"
    }
}
