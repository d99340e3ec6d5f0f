//! Cached dense LU factorization.
//!
//! Small systems and the direct pressure-mass solve of the rotational
//! correction factorize once and reuse the factors every step.

use imexflow_core::CsrMatrix;
use nalgebra::{DVector, Dyn, LU};

use crate::error::{Error, Result};

/// LU factors of an assembled square matrix.
pub struct DenseLu {
    factors: LU<f64, Dyn, Dyn>,
    size: usize,
}

impl DenseLu {
    pub fn factorize(matrix: &CsrMatrix) -> Result<Self> {
        if matrix.n_rows() != matrix.n_cols() {
            return Err(Error::DimensionMismatch {
                expected: matrix.n_rows(),
                actual: matrix.n_cols(),
            });
        }
        let factors = matrix.to_dense().lu();
        if !factors.is_invertible() {
            return Err(Error::SingularMatrix);
        }
        Ok(Self {
            factors,
            size: matrix.n_rows(),
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Solve `A x = b` into `x`.
    pub fn solve(&self, b: &[f64], x: &mut [f64]) -> Result<()> {
        let n = self.size();
        if let Some(&actual) = [b.len(), x.len()].iter().find(|&&len| len != n) {
            return Err(Error::DimensionMismatch { expected: n, actual });
        }
        let solution = self
            .factors
            .solve(&DVector::from_column_slice(b))
            .ok_or(Error::SingularMatrix)?;
        x.copy_from_slice(solution.as_slice());
        Ok(())
    }
}
