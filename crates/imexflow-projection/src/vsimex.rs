//! Variable-step IMEX (VSIMEX) coefficients.
//!
//! With `ω = Δt_n / Δt_{n-1}` the second-order set is
//!
//! ```text
//! α = [(1 + 2ω)/(1 + ω), -(1 + ω), ω²/(1 + ω)] / Δt_n
//! β = η = [1 + ω, -ω]
//! γ = [1, 0, 0]
//! ```
//!
//! `α` multiplies `[u^{n+1}, u^n, u^{n-1}]` and already includes the
//! `1/Δt_n` factor. Without a previous step the engine falls back to the
//! one-step set `α = [1, -1, 0]/Δt`, `β = η = [1, 0]`.

use log::debug;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VsimexCoefficients {
    /// Time-derivative stencil, scaled by `1/Δt_n`.
    pub alpha: [f64; 3],
    /// Extrapolation weights of explicit terms.
    pub beta: [f64; 2],
    /// Implicit/explicit blend of diffusive terms.
    pub gamma: [f64; 3],
    /// Extrapolation weights of the semi-implicit transport velocity.
    pub eta: [f64; 2],
}

impl VsimexCoefficients {
    /// Backward Euler with explicit Euler extrapolation.
    pub fn first_order(step_size: f64) -> Self {
        Self {
            alpha: [1.0 / step_size, -1.0 / step_size, 0.0],
            beta: [1.0, 0.0],
            gamma: [1.0, 0.0, 0.0],
            eta: [1.0, 0.0],
        }
    }

    /// Variable-step BDF2 with linear extrapolation.
    pub fn second_order(step_size: f64, omega: f64) -> Self {
        let extrapolation = [1.0 + omega, -omega];
        Self {
            alpha: [
                (1.0 + 2.0 * omega) / (1.0 + omega) / step_size,
                -(1.0 + omega) / step_size,
                omega * omega / (1.0 + omega) / step_size,
            ],
            beta: extrapolation,
            gamma: [1.0, 0.0, 0.0],
            eta: extrapolation,
        }
    }
}

/// Computes and caches the coefficient set.
#[derive(Debug, Clone)]
pub struct VsimexEngine {
    interval_length: f64,
    max_step_fraction: Option<f64>,
    coefficients: VsimexCoefficients,
    /// `(order, ω)` of the last update.
    key: Option<(usize, f64)>,
    changed: bool,
    version: u64,
}

impl VsimexEngine {
    pub fn new(start_time: f64, end_time: f64, max_step_fraction: Option<f64>) -> Self {
        Self {
            interval_length: end_time - start_time,
            max_step_fraction,
            coefficients: VsimexCoefficients::first_order(1.0),
            key: None,
            changed: false,
            version: 0,
        }
    }

    /// Recompute the coefficients for a new step.
    ///
    /// `previous_step_size` is `None` on the first step.
    pub fn update_coefficients(
        &mut self,
        step_size: f64,
        previous_step_size: Option<f64>,
    ) -> Result<&VsimexCoefficients> {
        self.check_step_size(step_size)?;
        if let Some(previous) = previous_step_size {
            if !(previous > 0.0 && previous.is_finite()) {
                return Err(Error::InvalidStepSize {
                    step_size: previous,
                    reason: "previous step size must be positive".to_string(),
                });
            }
        }

        let (coefficients, key) = match previous_step_size {
            None => (VsimexCoefficients::first_order(step_size), (1, 1.0)),
            Some(previous) => {
                let omega = step_size / previous;
                (VsimexCoefficients::second_order(step_size, omega), (2, omega))
            }
        };

        self.changed = self.key != Some(key);
        self.key = Some(key);
        if self.version == 0 || coefficients != self.coefficients {
            self.version += 1;
            self.coefficients = coefficients;
        }
        if self.changed {
            debug!(
                "VSIMEX order {} coefficients for ω = {}: α = {:?}",
                key.0, key.1, self.coefficients.alpha
            );
        }
        Ok(&self.coefficients)
    }

    /// Whether the last update saw a different `ω` (or order) than the one
    /// before it.
    pub fn coefficients_changed(&self) -> bool {
        self.changed
    }

    /// Incremented whenever any coefficient value changes, including a
    /// change of `Δt_n` at constant `ω`. Cached operators compare against it.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn coefficients(&self) -> &VsimexCoefficients {
        &self.coefficients
    }

    pub fn omega(&self) -> Option<f64> {
        match self.key {
            Some((2, omega)) => Some(omega),
            _ => None,
        }
    }

    /// Order of the last coefficient set, 0 before the first update.
    pub fn order(&self) -> usize {
        self.key.map_or(0, |(order, _)| order)
    }

    /// Forget the history; the next update is a first step again.
    pub fn reset(&mut self) {
        self.key = None;
        self.changed = false;
    }

    fn check_step_size(&self, step_size: f64) -> Result<()> {
        if !(step_size > 0.0 && step_size.is_finite()) {
            return Err(Error::InvalidStepSize {
                step_size,
                reason: "step size must be positive".to_string(),
            });
        }
        if let Some(fraction) = self.max_step_fraction {
            let bound = fraction * self.interval_length;
            if step_size > bound {
                return Err(Error::InvalidStepSize {
                    step_size,
                    reason: format!(
                        "exceeds {} of the simulated interval ({})",
                        fraction, bound
                    ),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn engine() -> VsimexEngine {
        VsimexEngine::new(0.0, 10.0, Some(0.5))
    }

    #[test]
    fn test_constant_step_reduces_to_bdf2() {
        let mut e = engine();
        for dt in [0.1, 0.37, 2.0] {
            let c = *e.update_coefficients(dt, Some(dt)).unwrap();
            assert_relative_eq!(c.alpha[0], 1.5 / dt, epsilon = 1e-12);
            assert_relative_eq!(c.alpha[1], -2.0 / dt, epsilon = 1e-12);
            assert_relative_eq!(c.alpha[2], 0.5 / dt, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_extrapolation_weights() {
        let mut e = engine();
        for (dt, prev) in [(0.1, 0.2), (0.3, 0.1), (1.0, 1.0), (0.05, 0.07)] {
            let c = *e.update_coefficients(dt, Some(prev)).unwrap();
            let omega = dt / prev;
            assert_eq!(c.beta, c.eta);
            assert_relative_eq!(c.beta[0], 1.0 + omega, epsilon = 1e-14);
            assert_relative_eq!(c.beta[1], -omega, epsilon = 1e-14);
            assert_relative_eq!(c.beta[0] - c.beta[1], 1.0 + 2.0 * omega, epsilon = 1e-14);
            assert_relative_eq!(c.beta[0] + c.beta[1], 1.0, epsilon = 1e-14);
            assert_eq!(c.gamma, [1.0, 0.0, 0.0]);
        }
    }

    #[test]
    fn test_alpha_is_consistent() {
        // The stencil annihilates constants and differentiates linears exactly.
        let mut e = engine();
        let (dt, prev) = (0.3, 0.2);
        let c = *e.update_coefficients(dt, Some(prev)).unwrap();
        assert_relative_eq!(c.alpha.iter().sum::<f64>(), 0.0, epsilon = 1e-12);
        let times = [dt, 0.0, -prev];
        let slope: f64 = c.alpha.iter().zip(times).map(|(a, t)| a * t).sum();
        assert_relative_eq!(slope, 1.0, epsilon = 1e-12);
        let curvature: f64 = c.alpha.iter().zip(times).map(|(a, t)| a * t * t).sum();
        assert_relative_eq!(curvature, 2.0 * dt, epsilon = 1e-12);
    }

    #[test]
    fn test_first_step_falls_back_to_first_order() {
        let mut e = engine();
        let c = *e.update_coefficients(0.1, None).unwrap();
        assert_relative_eq!(c.alpha[0], 10.0);
        assert_relative_eq!(c.alpha[1], -10.0);
        assert_eq!(c.alpha[2], 0.0);
        assert_eq!(c.beta, [1.0, 0.0]);
        assert_eq!(e.order(), 1);
        assert_eq!(e.omega(), None);
    }

    #[test]
    fn test_coefficients_changed_tracks_omega() {
        let mut e = engine();
        e.update_coefficients(0.1, Some(0.1)).unwrap();
        assert!(e.coefficients_changed());
        e.update_coefficients(0.1, Some(0.1)).unwrap();
        assert!(!e.coefficients_changed());
        e.update_coefficients(0.2, Some(0.1)).unwrap();
        assert!(e.coefficients_changed());
        e.update_coefficients(0.2, Some(0.1)).unwrap();
        assert!(!e.coefficients_changed());
    }

    #[test]
    fn test_version_follows_values_not_only_omega() {
        let mut e = engine();
        e.update_coefficients(0.1, Some(0.05)).unwrap();
        let v = e.version();
        // Same ω = 2, different Δt: α changes.
        e.update_coefficients(0.2, Some(0.1)).unwrap();
        assert!(!e.coefficients_changed());
        assert_eq!(e.version(), v + 1);
        e.update_coefficients(0.2, Some(0.1)).unwrap();
        assert_eq!(e.version(), v + 1);
    }

    #[test]
    fn test_invalid_step_sizes() {
        let mut e = engine();
        assert!(matches!(
            e.update_coefficients(0.0, None),
            Err(Error::InvalidStepSize { .. })
        ));
        assert!(matches!(
            e.update_coefficients(0.1, Some(-1.0)),
            Err(Error::InvalidStepSize { .. })
        ));
        assert!(matches!(
            e.update_coefficients(5.5, None),
            Err(Error::InvalidStepSize { .. })
        ));

        let mut unbounded = VsimexEngine::new(0.0, 10.0, None);
        unbounded.update_coefficients(9.0, None).unwrap();
    }
}
