//! Preconditioner trait, simple preconditioners and the kind selector.

use std::fmt;

use imexflow_core::CsrMatrix;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::ilu::Ilu0Preconditioner;

/// Approximate inverse applied as `y = M^{-1} x`.
pub trait Preconditioner: Send + Sync {
    fn apply(&self, x: &[f64], y: &mut [f64]);

    fn dim(&self) -> usize;

    /// Short name for diagnostics.
    fn name(&self) -> &'static str;
}

/// `M = I`.
#[derive(Debug, Clone)]
pub struct IdentityPreconditioner {
    dim: usize,
}

impl IdentityPreconditioner {
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }
}

impl Preconditioner for IdentityPreconditioner {
    fn apply(&self, x: &[f64], y: &mut [f64]) {
        y.copy_from_slice(x);
    }

    fn dim(&self) -> usize {
        self.dim
    }

    fn name(&self) -> &'static str {
        "identity"
    }
}

/// `M = diag(A)`.
#[derive(Debug, Clone)]
pub struct JacobiPreconditioner {
    inv_diag: Vec<f64>,
}

impl JacobiPreconditioner {
    pub fn from_matrix(matrix: &CsrMatrix) -> Result<Self> {
        let inv_diag = matrix
            .diagonal()
            .into_iter()
            .enumerate()
            .map(|(row, d)| {
                if d.abs() < 1e-300 {
                    Err(Error::ZeroDiagonal { row })
                } else {
                    Ok(1.0 / d)
                }
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { inv_diag })
    }
}

impl Preconditioner for JacobiPreconditioner {
    fn apply(&self, x: &[f64], y: &mut [f64]) {
        for ((yi, xi), d) in y.iter_mut().zip(x).zip(&self.inv_diag) {
            *yi = xi * d;
        }
    }

    fn dim(&self) -> usize {
        self.inv_diag.len()
    }

    fn name(&self) -> &'static str {
        "jacobi"
    }
}

/// Preconditioner selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreconditionerKind {
    /// No preconditioning.
    Identity,
    /// Diagonal scaling.
    Jacobi,
    /// Incomplete LU with zero fill-in (default).
    #[default]
    Ilu0,
}

impl PreconditionerKind {
    /// Parse from string (for CLI).
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "identity" | "none" => Some(Self::Identity),
            "jacobi" | "diagonal" => Some(Self::Jacobi),
            "ilu" | "ilu0" => Some(Self::Ilu0),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Identity => "identity",
            Self::Jacobi => "jacobi",
            Self::Ilu0 => "ilu0",
        }
    }
}

impl fmt::Display for PreconditionerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Build a preconditioner of the requested kind from an assembled matrix.
pub fn build_preconditioner(
    matrix: &CsrMatrix,
    kind: PreconditionerKind,
) -> Result<Box<dyn Preconditioner>> {
    if matrix.n_rows() != matrix.n_cols() {
        return Err(Error::DimensionMismatch {
            expected: matrix.n_rows(),
            actual: matrix.n_cols(),
        });
    }
    Ok(match kind {
        PreconditionerKind::Identity => Box::new(IdentityPreconditioner::new(matrix.n_rows())),
        PreconditionerKind::Jacobi => Box::new(JacobiPreconditioner::from_matrix(matrix)?),
        PreconditionerKind::Ilu0 => Box::new(Ilu0Preconditioner::from_matrix(matrix)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_name() {
        assert_eq!(PreconditionerKind::from_name("ILU"), Some(PreconditionerKind::Ilu0));
        assert_eq!(PreconditionerKind::from_name("none"), Some(PreconditionerKind::Identity));
        assert_eq!(PreconditionerKind::from_name("amg"), None);
        assert_eq!(PreconditionerKind::Jacobi.to_string(), "jacobi");
        assert_eq!(PreconditionerKind::default(), PreconditionerKind::Ilu0);
    }

    #[test]
    fn test_jacobi_scales_by_inverse_diagonal() {
        let a = CsrMatrix::from_triplets(2, 2, &[(0, 0, 4.0), (0, 1, 1.0), (1, 1, 0.5)]);
        let p = build_preconditioner(&a, PreconditionerKind::Jacobi).unwrap();
        let mut y = vec![0.0; 2];
        p.apply(&[2.0, 2.0], &mut y);
        assert_eq!(y, vec![0.5, 4.0]);
        assert_eq!(p.name(), "jacobi");
    }

    #[test]
    fn test_jacobi_zero_diagonal() {
        let a = CsrMatrix::from_triplets(2, 2, &[(0, 0, 1.0), (1, 0, 1.0)]);
        let err = build_preconditioner(&a, PreconditionerKind::Jacobi).err().unwrap();
        assert!(matches!(err, Error::ZeroDiagonal { row: 1 }));
        assert!(err.is_singular());
    }
}
