//! Error types for imexflow-solver.

use thiserror::Error;

use crate::ilu::IluError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("singular matrix")]
    SingularMatrix,

    #[error("convergence failed after {iterations} iterations (residual {residual:.3e})")]
    ConvergenceFailed { iterations: usize, residual: f64 },

    #[error("invalid matrix dimensions: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("zero diagonal entry at row {row}")]
    ZeroDiagonal { row: usize },

    #[error("{method} breakdown: {reason}")]
    Breakdown { method: &'static str, reason: String },

    #[error("preconditioner construction failed: {0}")]
    Preconditioner(#[from] IluError),
}

impl Error {
    /// Whether the failure came from building a preconditioner or a factorization.
    pub fn is_singular(&self) -> bool {
        matches!(
            self,
            Error::SingularMatrix | Error::ZeroDiagonal { .. } | Error::Preconditioner(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
