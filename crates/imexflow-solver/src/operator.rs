//! Matrix-vector action seen by the Krylov methods.

use imexflow_core::CsrMatrix;

/// Square linear map `x -> A x`.
///
/// Krylov solvers never look inside the operator, so an assembled matrix
/// and a matrix-free action are interchangeable.
pub trait LinearOperator: Send + Sync {
    fn dim(&self) -> usize;

    /// Overwrite `y` with `A x`.
    fn apply(&self, x: &[f64], y: &mut [f64]);

    /// `r = b - A x`, returning `|r|`.
    fn residual(&self, x: &[f64], b: &[f64], r: &mut [f64]) -> f64 {
        self.apply(x, r);
        for (ri, bi) in r.iter_mut().zip(b) {
            *ri = bi - *ri;
        }
        imexflow_core::vector::norm2(r)
    }
}

impl LinearOperator for CsrMatrix {
    fn dim(&self) -> usize {
        self.n_rows()
    }

    fn apply(&self, x: &[f64], y: &mut [f64]) {
        self.mul_vec(x, y);
    }
}
