//! Restarted GMRES with right preconditioning.
//!
//! Right preconditioning keeps the least-squares residual equal to the
//! unpreconditioned residual, so the stopping test compares the true
//! `|b - A x|` with the threshold. `x` enters as the initial guess.

use imexflow_core::vector::{axpy, dot, norm2, scale};

use crate::operator::LinearOperator;
use crate::preconditioner::Preconditioner;

const TINY: f64 = 1e-300;

/// GMRES(m) settings.
#[derive(Debug, Clone)]
pub struct GmresConfig {
    pub max_iter: usize,
    /// Absolute threshold on the residual 2-norm.
    pub tol: f64,
    /// Krylov dimension between restarts.
    pub restart: usize,
}

impl Default for GmresConfig {
    fn default() -> Self {
        Self {
            max_iter: 500,
            tol: 1e-8,
            restart: 30,
        }
    }
}

/// Outcome of a GMRES solve. The solution is written in place.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GmresResult {
    pub iterations: usize,
    pub residual: f64,
    pub converged: bool,
}

/// Plane rotation zeroing the subdiagonal of one Hessenberg column.
#[derive(Debug, Clone, Copy)]
struct Givens {
    c: f64,
    s: f64,
}

impl Givens {
    fn annihilating(a: f64, b: f64) -> Self {
        if b.abs() < TINY {
            return Self { c: 1.0, s: 0.0 };
        }
        let r = a.hypot(b);
        Self { c: a / r, s: b / r }
    }

    fn rotate(&self, a: f64, b: f64) -> (f64, f64) {
        (self.c * a + self.s * b, self.c * b - self.s * a)
    }
}

/// Solve `A x = b`, counting every Arnoldi step across restarts against
/// `config.max_iter`.
pub fn solve_gmres(
    op: &dyn LinearOperator,
    precond: &dyn Preconditioner,
    b: &[f64],
    x: &mut [f64],
    config: &GmresConfig,
) -> GmresResult {
    let n = op.dim();
    debug_assert!(b.len() == n && x.len() == n);

    let krylov_dim = config.restart.clamp(1, n.max(1));
    let mut iterations = 0;
    let mut r = vec![0.0; n];

    loop {
        let residual = op.residual(x, b, &mut r);
        let converged = residual <= config.tol;
        if converged || iterations >= config.max_iter {
            return GmresResult {
                iterations,
                residual,
                converged,
            };
        }
        let budget = krylov_dim.min(config.max_iter - iterations);
        iterations += cycle(op, precond, &r, residual, x, budget, config.tol);
    }
}

/// One Arnoldi cycle of at most `budget` steps from residual `r0`.
/// Adds the correction to `x` and returns the number of steps taken.
fn cycle(
    op: &dyn LinearOperator,
    precond: &dyn Preconditioner,
    r0: &[f64],
    beta: f64,
    x: &mut [f64],
    budget: usize,
    tol: f64,
) -> usize {
    let n = r0.len();
    let mut basis: Vec<Vec<f64>> = Vec::with_capacity(budget + 1);
    basis.push(r0.iter().map(|v| v / beta).collect());

    // columns of the rotated (upper triangular) Hessenberg matrix
    let mut columns: Vec<Vec<f64>> = Vec::with_capacity(budget);
    let mut rotations: Vec<Givens> = Vec::with_capacity(budget);
    let mut g = vec![0.0; budget + 1];
    g[0] = beta;

    let mut z = vec![0.0; n];
    let mut steps = 0;
    while steps < budget {
        let k = steps;
        precond.apply(&basis[k], &mut z);
        let mut w = vec![0.0; n];
        op.apply(&z, &mut w);

        // modified Gram-Schmidt
        let mut h = Vec::with_capacity(k + 2);
        for v in &basis {
            let hjk = dot(v, &w);
            axpy(-hjk, v, &mut w);
            h.push(hjk);
        }
        let w_norm = norm2(&w);
        h.push(w_norm);

        for (j, rot) in rotations.iter().enumerate() {
            (h[j], h[j + 1]) = rot.rotate(h[j], h[j + 1]);
        }
        let rot = Givens::annihilating(h[k], h[k + 1]);
        h[k] = rot.c * h[k] + rot.s * h[k + 1];
        h.truncate(k + 1);
        (g[k], g[k + 1]) = rot.rotate(g[k], 0.0);

        rotations.push(rot);
        columns.push(h);
        steps += 1;

        // small residual estimate, or an invariant Krylov space
        if g[steps].abs() <= tol || w_norm < TINY {
            break;
        }
        scale(1.0 / w_norm, &mut w);
        basis.push(w);
    }

    // R y = g by back substitution
    let mut y = vec![0.0; steps];
    for i in (0..steps).rev() {
        let tail: f64 = ((i + 1)..steps).map(|j| columns[j][i] * y[j]).sum();
        let diag = columns[i][i];
        if diag.abs() > TINY {
            y[i] = (g[i] - tail) / diag;
        }
    }

    let mut correction = vec![0.0; n];
    for (v, yi) in basis.iter().zip(&y) {
        axpy(*yi, v, &mut correction);
    }
    precond.apply(&correction, &mut z);
    axpy(1.0, &z, x);
    steps
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preconditioner::IdentityPreconditioner;
    use crate::{Ilu0Preconditioner, PreconditionerKind, build_preconditioner};
    use imexflow_core::CsrMatrix;

    /// Simple diagonal operator for testing.
    struct DiagOp {
        diag: Vec<f64>,
    }

    impl LinearOperator for DiagOp {
        fn dim(&self) -> usize {
            self.diag.len()
        }

        fn apply(&self, x: &[f64], y: &mut [f64]) {
            for ((yi, d), xi) in y.iter_mut().zip(&self.diag).zip(x) {
                *yi = d * xi;
            }
        }
    }

    /// Non-symmetric convection-diffusion stencil on a 1D grid.
    fn convection_diffusion(n: usize, peclet: f64) -> CsrMatrix {
        let mut triplets = Vec::new();
        for i in 0..n {
            triplets.push((i, i, 2.0));
            if i > 0 {
                triplets.push((i, i - 1, -1.0 - 0.5 * peclet));
            }
            if i + 1 < n {
                triplets.push((i, i + 1, -1.0 + 0.5 * peclet));
            }
        }
        CsrMatrix::from_triplets(n, n, &triplets)
    }

    #[test]
    fn gmres_diagonal_system() {
        let n = 10;
        let diag: Vec<f64> = (1..=n).map(|i| i as f64).collect();
        let op = DiagOp { diag: diag.clone() };
        let b = diag.clone();
        let mut x = vec![0.0; n];

        let result = solve_gmres(&op, &IdentityPreconditioner::new(n), &b, &mut x, &GmresConfig::default());

        assert!(result.converged, "GMRES did not converge");
        for xi in &x {
            assert!((xi - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn gmres_zero_rhs_keeps_zero_guess() {
        let n = 5;
        let op = DiagOp { diag: vec![2.0; n] };
        let b = vec![0.0; n];
        let mut x = vec![0.0; n];

        let result = solve_gmres(&op, &IdentityPreconditioner::new(n), &b, &mut x, &GmresConfig::default());

        assert!(result.converged);
        assert_eq!(result.iterations, 0);
        assert!(x.iter().all(|&xi| xi == 0.0));
    }

    #[test]
    fn gmres_exact_initial_guess_needs_no_iterations() {
        let a = convection_diffusion(8, 0.3);
        let exact: Vec<f64> = (0..8).map(|i| (i as f64).sin()).collect();
        let mut b = vec![0.0; 8];
        a.mul_vec(&exact, &mut b);
        let mut x = exact.clone();

        let result = solve_gmres(&a, &IdentityPreconditioner::new(8), &b, &mut x, &GmresConfig::default());

        assert_eq!(result.iterations, 0);
        assert_eq!(x, exact);
    }

    #[test]
    fn gmres_nonsymmetric_with_ilu() {
        let n = 40;
        let a = convection_diffusion(n, 1.2);
        let exact: Vec<f64> = (0..n).map(|i| 1.0 + 0.1 * i as f64).collect();
        let mut b = vec![0.0; n];
        a.mul_vec(&exact, &mut b);

        let ilu = Ilu0Preconditioner::from_matrix(&a).unwrap();
        let mut x = vec![0.0; n];
        let config = GmresConfig {
            tol: 1e-12,
            ..Default::default()
        };
        let result = solve_gmres(&a, &ilu, &b, &mut x, &config);

        assert!(result.converged);
        // ILU(0) of a tridiagonal matrix is exact
        assert!(result.iterations <= 2, "iterations = {}", result.iterations);
        for (xi, ei) in x.iter().zip(&exact) {
            assert!((xi - ei).abs() < 1e-9, "x = {} (expected {})", xi, ei);
        }
    }

    #[test]
    fn gmres_restart_behavior() {
        let n = 50;
        // Diagonally dominant so GMRES(5) converges in a few cycles.
        let mut a = convection_diffusion(n, 0.5);
        for i in 0..n {
            a.add(i, i, 2.0).unwrap();
        }
        let b = vec![1.0; n];
        let jacobi = build_preconditioner(&a, PreconditionerKind::Jacobi).unwrap();

        let mut x = vec![0.0; n];
        let config = GmresConfig {
            max_iter: 2000,
            tol: 1e-10,
            restart: 5,
        };
        let result = solve_gmres(&a, jacobi.as_ref(), &b, &mut x, &config);

        assert!(result.converged, "restarted GMRES stalled at {}", result.residual);
        let mut ax = vec![0.0; n];
        a.mul_vec(&x, &mut ax);
        let res: f64 = ax.iter().zip(&b).map(|(l, r)| (l - r).powi(2)).sum::<f64>().sqrt();
        assert!(res <= 1e-9, "true residual {}", res);
    }

    #[test]
    fn gmres_iteration_cap() {
        let n = 60;
        let a = convection_diffusion(n, 0.0);
        let b = vec![1.0; n];
        let mut x = vec![0.0; n];
        let config = GmresConfig {
            max_iter: 3,
            tol: 1e-14,
            restart: 30,
        };

        let result = solve_gmres(&a, &IdentityPreconditioner::new(n), &b, &mut x, &config);

        assert!(!result.converged);
        assert_eq!(result.iterations, 3);
        assert!(result.residual > 1e-14);
    }
}
