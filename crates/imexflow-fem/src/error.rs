//! Error types for imexflow-fem.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid mesh: {0}")]
    InvalidMesh(String),

    #[error("vector of length {actual} does not match {expected} dofs")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error(transparent)]
    Core(#[from] imexflow_core::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
