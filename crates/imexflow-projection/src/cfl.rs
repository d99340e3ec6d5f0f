//! Adaptive step-size control from a CFL bound.

use imexflow_core::{CellGeometry, Communicator};
use log::{debug, warn};

use crate::params::TimeSteppingParameters;

/// Computes the next step size from the current velocity.
#[derive(Debug, Clone, PartialEq)]
pub struct CflController {
    adaptive: bool,
    courant_number: f64,
    initial_step_size: f64,
    velocity_floor: f64,
    minimum_step_size: Option<f64>,
    maximum_step_size: Option<f64>,
}

impl CflController {
    pub fn from_parameters(params: &TimeSteppingParameters) -> Self {
        let fraction_bound = params
            .max_step_fraction
            .map(|fraction| fraction * params.interval_length());
        let maximum_step_size = match (params.maximum_step_size, fraction_bound) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        Self {
            adaptive: params.adaptive_time_stepping,
            courant_number: params.courant_number,
            initial_step_size: params.initial_step_size,
            velocity_floor: params.velocity_floor,
            minimum_step_size: params.minimum_step_size,
            maximum_step_size,
        }
    }

    pub fn is_adaptive(&self) -> bool {
        self.adaptive
    }

    pub fn initial_step_size(&self) -> f64 {
        self.initial_step_size
    }

    pub fn set_initial_step_size(&mut self, step_size: f64) {
        self.initial_step_size = step_size;
    }

    /// Smallest `diameter / max(|u|, floor)` over all cells, reduced
    /// across workers.
    pub fn min_transit_time(
        &self,
        geometry: &dyn CellGeometry,
        comm: &dyn Communicator,
        velocity: &[f64],
    ) -> f64 {
        let local = (0..geometry.n_active_cells())
            .map(|cell| {
                let speed = geometry
                    .max_velocity_magnitude(cell, velocity)
                    .max(self.velocity_floor);
                geometry.cell_diameter(cell) / speed
            })
            .fold(f64::INFINITY, f64::min);
        comm.min(local)
    }

    /// Step size for the step following `step_number`.
    ///
    /// Non-adaptive runs and the very first step use the configured
    /// initial step size.
    pub fn compute_next_step_size(
        &self,
        geometry: &dyn CellGeometry,
        comm: &dyn Communicator,
        velocity: &[f64],
        step_number: usize,
    ) -> f64 {
        if !self.adaptive || step_number == 0 {
            return self.initial_step_size;
        }
        let candidate = self.courant_number * self.min_transit_time(geometry, comm, velocity);
        let mut step_size = candidate;
        if let Some(max) = self.maximum_step_size {
            step_size = step_size.min(max);
        }
        if let Some(min) = self.minimum_step_size {
            if step_size < min {
                warn!(
                    "CFL step size {:.3e} below minimum {:.3e}; using the minimum",
                    step_size, min
                );
                step_size = min;
            }
        }
        debug!("CFL candidate {:.3e}, next step size {:.3e}", candidate, step_size);
        step_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use imexflow_core::SerialCommunicator;

    struct UniformCells {
        n: usize,
        h: f64,
    }

    impl CellGeometry for UniformCells {
        fn n_active_cells(&self) -> usize {
            self.n
        }

        fn cell_diameter(&self, _cell: usize) -> f64 {
            self.h
        }

        fn max_velocity_magnitude(&self, cell: usize, velocity: &[f64]) -> f64 {
            velocity[cell].abs()
        }
    }

    fn adaptive(courant: f64) -> TimeSteppingParameters {
        TimeSteppingParameters {
            end_time: 100.0,
            adaptive_time_stepping: true,
            courant_number: courant,
            max_step_fraction: None,
            ..Default::default()
        }
    }

    #[test]
    fn test_uniform_velocity_gives_courant_bound() {
        let cfl = CflController::from_parameters(&adaptive(0.5));
        let geometry = UniformCells { n: 16, h: 0.125 };
        let velocity = vec![2.0; 16];

        let dt = cfl.compute_next_step_size(&geometry, &SerialCommunicator, &velocity, 3);

        assert_eq!(dt, 0.5 * 0.125 / 2.0);
    }

    #[test]
    fn test_fastest_cell_wins() {
        let cfl = CflController::from_parameters(&adaptive(1.0));
        let geometry = UniformCells { n: 4, h: 1.0 };
        let dt = cfl.compute_next_step_size(&geometry, &SerialCommunicator, &[1.0, -4.0, 2.0, 0.5], 1);
        assert!((dt - 0.25).abs() < 1e-15, "dt = {} (expected 0.25)", dt);
    }

    #[test]
    fn test_first_step_and_fixed_stepping_use_initial_size() {
        let geometry = UniformCells { n: 2, h: 1.0 };
        let velocity = [10.0, 10.0];

        let cfl = CflController::from_parameters(&adaptive(1.0));
        assert_eq!(cfl.compute_next_step_size(&geometry, &SerialCommunicator, &velocity, 0), 1e-2);

        let fixed = CflController::from_parameters(&TimeSteppingParameters {
            initial_step_size: 0.3,
            ..Default::default()
        });
        assert_eq!(fixed.compute_next_step_size(&geometry, &SerialCommunicator, &velocity, 7), 0.3);
    }

    #[test]
    fn test_static_flow_is_floored_and_clamped() {
        let params = TimeSteppingParameters {
            maximum_step_size: Some(2.0),
            max_step_fraction: Some(0.01),
            ..adaptive(1.0)
        };
        let cfl = CflController::from_parameters(&params);
        let geometry = UniformCells { n: 3, h: 0.1 };

        let dt = cfl.compute_next_step_size(&geometry, &SerialCommunicator, &[0.0; 3], 5);

        assert!(dt.is_finite());
        assert!((dt - 1.0).abs() < 1e-12, "dt = {} (expected 0.01 * 100)", dt);
    }

    #[test]
    fn test_minimum_step_size_clamp() {
        let params = TimeSteppingParameters {
            minimum_step_size: Some(1e-3),
            ..adaptive(1.0)
        };
        let cfl = CflController::from_parameters(&params);
        let geometry = UniformCells { n: 1, h: 1e-3 };
        let dt = cfl.compute_next_step_size(&geometry, &SerialCommunicator, &[100.0], 2);
        assert_eq!(dt, 1e-3);
    }
}
