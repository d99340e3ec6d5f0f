//! The linear-solve service consumed by the time-stepping core.
//!
//! The core only needs two capabilities: build a preconditioner from an
//! assembled matrix, and solve a system with it to a tolerance under an
//! iteration cap. [`KrylovSolver`] is the serial implementation.

use imexflow_core::CsrMatrix;
use imexflow_core::vector::norm2;
use log::debug;

use crate::cg::{CgConfig, solve_cg};
use crate::control::{KrylovMethod, LinearSolverParameters, SolveStats};
use crate::direct::DenseLu;
use crate::error::{Error, Result};
use crate::gmres::{GmresConfig, solve_gmres};
use crate::preconditioner::{Preconditioner, PreconditionerKind, build_preconditioner};

/// Linear-algebra collaborator.
pub trait LinearSolve: Send + Sync {
    /// Build a preconditioner handle for `matrix`.
    fn build_preconditioner(
        &self,
        matrix: &CsrMatrix,
        kind: PreconditionerKind,
    ) -> Result<Box<dyn Preconditioner>>;

    /// Solve `matrix * x = rhs` starting from the content of `x`.
    ///
    /// Stops once the residual drops below
    /// `max(relative_tolerance * |rhs|, absolute_tolerance)`. Exceeding
    /// `n_maximum_iterations` is an error, never a silent return.
    fn solve(
        &self,
        method: KrylovMethod,
        matrix: &CsrMatrix,
        x: &mut [f64],
        rhs: &[f64],
        preconditioner: &dyn Preconditioner,
        parameters: &LinearSolverParameters,
    ) -> Result<SolveStats>;
}

/// Serial Krylov solver service.
#[derive(Debug, Clone, Copy, Default)]
pub struct KrylovSolver;

impl KrylovSolver {
    pub fn new() -> Self {
        Self
    }
}

impl LinearSolve for KrylovSolver {
    fn build_preconditioner(
        &self,
        matrix: &CsrMatrix,
        kind: PreconditionerKind,
    ) -> Result<Box<dyn Preconditioner>> {
        build_preconditioner(matrix, kind)
    }

    fn solve(
        &self,
        method: KrylovMethod,
        matrix: &CsrMatrix,
        x: &mut [f64],
        rhs: &[f64],
        preconditioner: &dyn Preconditioner,
        parameters: &LinearSolverParameters,
    ) -> Result<SolveStats> {
        let n = matrix.n_rows();
        if matrix.n_cols() != n {
            return Err(Error::DimensionMismatch {
                expected: n,
                actual: matrix.n_cols(),
            });
        }
        for len in [x.len(), rhs.len(), preconditioner.dim()] {
            if len != n {
                return Err(Error::DimensionMismatch {
                    expected: n,
                    actual: len,
                });
            }
        }

        let tol = parameters.threshold(norm2(rhs));
        let (iterations, residual, converged) = match method {
            KrylovMethod::Gmres => {
                let config = GmresConfig {
                    max_iter: parameters.n_maximum_iterations,
                    tol,
                    restart: parameters.krylov_size,
                };
                let r = solve_gmres(matrix, preconditioner, rhs, x, &config);
                (r.iterations, r.residual, r.converged)
            }
            KrylovMethod::Cg => {
                let config = CgConfig {
                    max_iter: parameters.n_maximum_iterations,
                    tol,
                };
                let r = solve_cg(matrix, preconditioner, rhs, x, &config);
                if r.breakdown {
                    return Err(Error::Breakdown {
                        method: "CG",
                        reason: format!(
                            "operator not positive definite at iteration {}",
                            r.iterations
                        ),
                    });
                }
                (r.iterations, r.residual, r.converged)
            }
            KrylovMethod::DirectLu => {
                DenseLu::factorize(matrix)?.solve(rhs, x)?;
                let mut ax = vec![0.0; n];
                matrix.mul_vec(x, &mut ax);
                let residual = norm2(
                    &ax.iter().zip(rhs).map(|(a, b)| b - a).collect::<Vec<_>>(),
                );
                (1, residual, true)
            }
        };

        debug!(
            "{} ({}): {} iterations, residual {:.3e} (threshold {:.3e})",
            method,
            preconditioner.name(),
            iterations,
            residual,
            tol
        );

        if !converged {
            return Err(Error::ConvergenceFailed {
                iterations,
                residual,
            });
        }
        Ok(SolveStats {
            iterations,
            residual,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spd(n: usize) -> CsrMatrix {
        let mut triplets = Vec::new();
        for i in 0..n {
            triplets.push((i, i, 3.0));
            if i + 1 < n {
                triplets.push((i, i + 1, -1.0));
                triplets.push((i + 1, i, -1.0));
            }
        }
        CsrMatrix::from_triplets(n, n, &triplets)
    }

    #[test]
    fn test_service_methods_agree() {
        let a = spd(20);
        let rhs: Vec<f64> = (0..20).map(|i| (i as f64 * 0.3).cos()).collect();
        let service = KrylovSolver::new();
        let params = LinearSolverParameters::tight();

        let mut solutions = Vec::new();
        for (method, kind) in [
            (KrylovMethod::Gmres, PreconditionerKind::Ilu0),
            (KrylovMethod::Cg, PreconditionerKind::Jacobi),
            (KrylovMethod::DirectLu, PreconditionerKind::Identity),
        ] {
            let p = service.build_preconditioner(&a, kind).unwrap();
            let mut x = vec![0.0; 20];
            let stats = service.solve(method, &a, &mut x, &rhs, p.as_ref(), &params).unwrap();
            assert!(stats.residual < 1e-10, "{}: {}", method, stats);
            solutions.push(x);
        }

        for i in 0..20 {
            assert!((solutions[0][i] - solutions[1][i]).abs() < 1e-10);
            assert!((solutions[0][i] - solutions[2][i]).abs() < 1e-10);
        }
    }

    #[test]
    fn test_iteration_cap_is_an_error() {
        let a = spd(50);
        let rhs = vec![1.0; 50];
        let service = KrylovSolver::new();
        let params = LinearSolverParameters {
            n_maximum_iterations: 2,
            relative_tolerance: 1e-14,
            absolute_tolerance: 1e-16,
            preconditioner: PreconditionerKind::Identity,
            ..Default::default()
        };
        let p = service.build_preconditioner(&a, params.preconditioner).unwrap();
        let mut x = vec![0.0; 50];

        let err = service
            .solve(KrylovMethod::Gmres, &a, &mut x, &rhs, p.as_ref(), &params)
            .unwrap_err();

        assert!(matches!(err, Error::ConvergenceFailed { iterations: 2, .. }));
    }

    #[test]
    fn test_dimension_checks() {
        let a = spd(3);
        let service = KrylovSolver::new();
        let p = service.build_preconditioner(&a, PreconditionerKind::Identity).unwrap();
        let mut x = vec![0.0; 2];
        let err = service
            .solve(KrylovMethod::Cg, &a, &mut x, &[1.0; 3], p.as_ref(), &LinearSolverParameters::default())
            .unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { expected: 3, actual: 2 }));
    }
}
