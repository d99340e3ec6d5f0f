//! Solver parameters, method selection and solve statistics.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::preconditioner::PreconditionerKind;

/// Krylov (or direct) method used for a solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum KrylovMethod {
    /// Restarted GMRES for non-symmetric operators.
    Gmres,
    /// Conjugate gradients for symmetric positive definite operators.
    Cg,
    /// Dense LU, for small systems only.
    DirectLu,
}

impl KrylovMethod {
    /// Parse from string (for CLI).
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "gmres" => Some(Self::Gmres),
            "cg" => Some(Self::Cg),
            "lu" | "direct" => Some(Self::DirectLu),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Gmres => "GMRES",
            Self::Cg => "CG",
            Self::DirectLu => "direct (LU)",
        }
    }
}

impl fmt::Display for KrylovMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Parameters of one linear solve stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinearSolverParameters {
    pub relative_tolerance: f64,
    pub absolute_tolerance: f64,
    pub n_maximum_iterations: usize,
    /// GMRES restart length.
    pub krylov_size: usize,
    pub preconditioner: PreconditionerKind,
}

impl Default for LinearSolverParameters {
    fn default() -> Self {
        Self {
            relative_tolerance: 1e-6,
            absolute_tolerance: 1e-9,
            n_maximum_iterations: 1000,
            krylov_size: 30,
            preconditioner: PreconditionerKind::Ilu0,
        }
    }
}

impl LinearSolverParameters {
    /// Tight tolerances, useful in tests and convergence studies.
    pub fn tight() -> Self {
        Self {
            relative_tolerance: 1e-12,
            absolute_tolerance: 1e-14,
            ..Default::default()
        }
    }

    pub fn with_preconditioner(mut self, kind: PreconditionerKind) -> Self {
        self.preconditioner = kind;
        self
    }

    /// Effective residual threshold `max(rtol * |rhs|, atol)`.
    pub fn threshold(&self, rhs_norm: f64) -> f64 {
        (self.relative_tolerance * rhs_norm).max(self.absolute_tolerance)
    }
}

/// Iteration count and final residual of a solve.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SolveStats {
    pub iterations: usize,
    pub residual: f64,
}

impl fmt::Display for SolveStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} iterations, residual {:.3e}", self.iterations, self.residual)
    }
}
