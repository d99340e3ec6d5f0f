//! Preconditioned conjugate gradients for symmetric positive definite systems.

use imexflow_core::vector::{axpy, dot, norm2, xpay};

use crate::operator::LinearOperator;
use crate::preconditioner::Preconditioner;

/// CG solver configuration.
#[derive(Debug, Clone)]
pub struct CgConfig {
    /// Maximum number of iterations.
    pub max_iter: usize,
    /// Absolute stopping threshold on the residual 2-norm.
    pub tol: f64,
}

impl Default for CgConfig {
    fn default() -> Self {
        Self {
            max_iter: 1000,
            tol: 1e-10,
        }
    }
}

/// Outcome of a CG solve. The solution is written in place.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CgResult {
    pub iterations: usize,
    pub residual: f64,
    pub converged: bool,
    /// Set when `p·Ap <= 0`, i.e. the operator is not positive definite.
    pub breakdown: bool,
}

/// Solve A*x = b with preconditioned CG starting from the content of `x`.
pub fn solve_cg(
    op: &dyn LinearOperator,
    precond: &dyn Preconditioner,
    b: &[f64],
    x: &mut [f64],
    config: &CgConfig,
) -> CgResult {
    let n = op.dim();
    debug_assert_eq!(b.len(), n, "RHS dimension mismatch");

    let mut q = vec![0.0; n];
    op.apply(x, &mut q);
    let mut r: Vec<f64> = b.iter().zip(&q).map(|(bi, qi)| bi - qi).collect();
    let mut residual = norm2(&r);
    if residual <= config.tol {
        return CgResult {
            iterations: 0,
            residual,
            converged: true,
            breakdown: false,
        };
    }

    let mut z = vec![0.0; n];
    precond.apply(&r, &mut z);
    let mut p = z.clone();
    let mut rz = dot(&r, &z);

    for iter in 1..=config.max_iter {
        op.apply(&p, &mut q);
        let pq = dot(&p, &q);
        if pq <= 0.0 || !pq.is_finite() {
            return CgResult {
                iterations: iter,
                residual,
                converged: false,
                breakdown: true,
            };
        }

        let alpha = rz / pq;
        axpy(alpha, &p, x);
        axpy(-alpha, &q, &mut r);
        residual = norm2(&r);
        if residual <= config.tol {
            return CgResult {
                iterations: iter,
                residual,
                converged: true,
                breakdown: false,
            };
        }

        precond.apply(&r, &mut z);
        let rz_new = dot(&r, &z);
        let beta = rz_new / rz;
        rz = rz_new;
        // p = z + beta * p
        xpay(&z, beta, &mut p);
    }

    CgResult {
        iterations: config.max_iter,
        residual,
        converged: false,
        breakdown: false,
    }
}
