//! Dense vector kernels used by the solvers and the time-stepping core.
//!
//! All functions operate on plain slices so that field snapshots, Krylov
//! work vectors and right-hand sides share one set of primitives.

/// Inner product `x · y`.
#[inline]
pub fn dot(x: &[f64], y: &[f64]) -> f64 {
    debug_assert_eq!(x.len(), y.len());
    x.iter().zip(y).map(|(a, b)| a * b).sum()
}

/// Euclidean norm.
#[inline]
pub fn norm2(x: &[f64]) -> f64 {
    dot(x, x).sqrt()
}

/// Maximum absolute entry.
pub fn norm_inf(x: &[f64]) -> f64 {
    x.iter().fold(0.0_f64, |m, v| m.max(v.abs()))
}

/// `y += alpha * x`
#[inline]
pub fn axpy(alpha: f64, x: &[f64], y: &mut [f64]) {
    debug_assert_eq!(x.len(), y.len());
    for (yi, xi) in y.iter_mut().zip(x) {
        *yi += alpha * xi;
    }
}

/// `y = x + alpha * y`
#[inline]
pub fn xpay(x: &[f64], alpha: f64, y: &mut [f64]) {
    debug_assert_eq!(x.len(), y.len());
    for (yi, xi) in y.iter_mut().zip(x) {
        *yi = xi + alpha * *yi;
    }
}

/// `x *= alpha`
#[inline]
pub fn scale(alpha: f64, x: &mut [f64]) {
    for xi in x.iter_mut() {
        *xi *= alpha;
    }
}

/// `z = alpha * x + beta * y`
pub fn linear_combination(alpha: f64, x: &[f64], beta: f64, y: &[f64], z: &mut [f64]) {
    debug_assert_eq!(x.len(), y.len());
    debug_assert_eq!(x.len(), z.len());
    for ((zi, xi), yi) in z.iter_mut().zip(x).zip(y) {
        *zi = alpha * xi + beta * yi;
    }
}

/// Allocating variant of [`linear_combination`].
pub fn combine(alpha: f64, x: &[f64], beta: f64, y: &[f64]) -> Vec<f64> {
    let mut z = vec![0.0; x.len()];
    linear_combination(alpha, x, beta, y, &mut z);
    z
}

/// Sum of all entries.
pub fn sum(x: &[f64]) -> f64 {
    x.iter().sum()
}
