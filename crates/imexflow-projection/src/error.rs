//! Error types for imexflow-projection.

use std::fmt;

use thiserror::Error;

/// Linear solve stage of a time step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SolveStage {
    HeatEquation,
    Diffusion,
    Projection,
    PressureCorrection,
    PoissonPrestep,
}

impl SolveStage {
    pub const ALL: [SolveStage; 5] = [
        SolveStage::HeatEquation,
        SolveStage::Diffusion,
        SolveStage::Projection,
        SolveStage::PressureCorrection,
        SolveStage::PoissonPrestep,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            SolveStage::HeatEquation => "heat equation",
            SolveStage::Diffusion => "diffusion step",
            SolveStage::Projection => "projection step",
            SolveStage::PressureCorrection => "pressure correction",
            SolveStage::PoissonPrestep => "Poisson pre-step",
        }
    }
}

impl fmt::Display for SolveStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid step size {step_size}: {reason}")]
    InvalidStepSize { step_size: f64, reason: String },

    #[error("time controller not ready: {0}")]
    NotReady(String),

    #[error(
        "{stage} failed at step {step}: no convergence after {iterations} iterations (residual {residual:.3e})"
    )]
    SolverDivergence {
        stage: SolveStage,
        step: usize,
        iterations: usize,
        residual: f64,
    },

    #[error("{stage} failed at step {step}: singular system ({reason})")]
    SingularSystem {
        stage: SolveStage,
        step: usize,
        reason: String,
    },

    #[error("configuration conflict: {0}")]
    ConfigurationConflict(String),

    #[error(transparent)]
    Core(#[from] imexflow_core::Error),
}

impl Error {
    /// Attach the stage and step number to a linear-solver failure.
    pub fn from_solver(stage: SolveStage, step: usize, err: imexflow_solver::Error) -> Self {
        use imexflow_solver::Error as SolverError;

        match err {
            SolverError::ConvergenceFailed {
                iterations,
                residual,
            } => Error::SolverDivergence {
                stage,
                step,
                iterations,
                residual,
            },
            SolverError::DimensionMismatch { expected, actual } => {
                Error::Core(imexflow_core::Error::DimensionMismatch { expected, actual })
            }
            other => Error::SingularSystem {
                stage,
                step,
                reason: other.to_string(),
            },
        }
    }

    /// Stage and step of a solve failure.
    pub fn stage(&self) -> Option<(SolveStage, usize)> {
        match self {
            Error::SolverDivergence { stage, step, .. } | Error::SingularSystem { stage, step, .. } => {
                Some((*stage, *step))
            }
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_divergence_reports_stage_and_step() {
        let err = Error::from_solver(
            SolveStage::Diffusion,
            7,
            imexflow_solver::Error::ConvergenceFailed {
                iterations: 1000,
                residual: 2.5e-3,
            },
        );
        assert_eq!(err.stage(), Some((SolveStage::Diffusion, 7)));
        assert_eq!(
            err.to_string(),
            "diffusion step failed at step 7: no convergence after 1000 iterations (residual 2.500e-3)"
        );
    }

    #[test]
    fn test_preconditioner_failure_is_singular() {
        let err = Error::from_solver(
            SolveStage::Projection,
            1,
            imexflow_solver::Error::ZeroDiagonal { row: 3 },
        );
        assert!(matches!(
            err,
            Error::SingularSystem {
                stage: SolveStage::Projection,
                step: 1,
                ..
            }
        ));
    }
}
