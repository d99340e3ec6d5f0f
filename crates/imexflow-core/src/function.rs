//! Analytic functions of space and time.
//!
//! Used for boundary data, initial conditions, body forces and analytic
//! transport velocities. Closures implement the traits directly.

/// Scalar function `f(x, t)`.
pub trait ScalarFunction: Send + Sync {
    fn value(&self, point: &[f64], time: f64) -> f64;
}

impl<F> ScalarFunction for F
where
    F: Fn(&[f64], f64) -> f64 + Send + Sync,
{
    fn value(&self, point: &[f64], time: f64) -> f64 {
        self(point, time)
    }
}

/// Vector-valued function `f(x, t)` writing one value per component.
pub trait VectorFunction: Send + Sync {
    fn value(&self, point: &[f64], time: f64, values: &mut [f64]);
}

impl<F> VectorFunction for F
where
    F: Fn(&[f64], f64, &mut [f64]) + Send + Sync,
{
    fn value(&self, point: &[f64], time: f64, values: &mut [f64]) {
        self(point, time, values)
    }
}

/// Constant vector.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstantVector(pub Vec<f64>);

impl VectorFunction for ConstantVector {
    fn value(&self, _point: &[f64], _time: f64, values: &mut [f64]) {
        values.copy_from_slice(&self.0);
    }
}

/// Identically zero vector.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZeroVector;

impl VectorFunction for ZeroVector {
    fn value(&self, _point: &[f64], _time: f64, values: &mut [f64]) {
        values.iter_mut().for_each(|v| *v = 0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closures_as_functions() {
        let f = |p: &[f64], t: f64| p[0] + t;
        assert_eq!(ScalarFunction::value(&f, &[1.0, 0.0], 2.0), 3.0);

        let g = |p: &[f64], _t: f64, v: &mut [f64]| {
            v[0] = p[1];
            v[1] = 0.0;
        };
        let mut out = [0.0; 2];
        VectorFunction::value(&g, &[0.0, 0.5], 0.0, &mut out);
        assert_eq!(out, [0.5, 0.0]);

        ConstantVector(vec![1.0, 2.0]).value(&[0.0, 0.0], 0.0, &mut out);
        assert_eq!(out, [1.0, 2.0]);
        ZeroVector.value(&[0.0, 0.0], 0.0, &mut out);
        assert_eq!(out, [0.0, 0.0]);
    }
}
