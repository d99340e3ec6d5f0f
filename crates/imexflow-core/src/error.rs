//! Error types for imexflow-core.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid dimensions: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("operators do not share a sparsity pattern")]
    PatternMismatch,

    #[error("entry ({row}, {col}) is not part of the sparsity pattern")]
    MissingEntry { row: usize, col: usize },

    #[error("constraint on dof {dof} is out of range for {n_dofs} dofs")]
    InvalidConstraint { dof: usize, n_dofs: usize },

    #[error("history of field '{field}' already rotated since its last solve")]
    HistoryAlreadyRotated { field: String },
}

pub type Result<T> = std::result::Result<T, Error>;
