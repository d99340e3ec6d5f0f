//! Discrete time controller and the VSIMEX time-stepping method.

use std::fmt;

use log::debug;

use crate::error::{Error, Result};
use crate::params::TimeSteppingParameters;
use crate::vsimex::{VsimexCoefficients, VsimexEngine};

/// Remaining intervals shorter than this fraction of the run are merged
/// into the current step.
const END_TIME_SNAP: f64 = 1e-10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeState {
    NotStarted,
    Running,
    Finished,
}

/// Simulation clock.
///
/// The desired step size persists across steps and is clipped so the last
/// step lands exactly on `end_time`.
#[derive(Debug, Clone)]
pub struct DiscreteTime {
    start_time: f64,
    end_time: f64,
    current_time: f64,
    previous_time: f64,
    next_time: f64,
    step_number: usize,
    desired_step_size: Option<f64>,
    step_size: Option<f64>,
    previous_step_size: Option<f64>,
    state: TimeState,
}

impl DiscreteTime {
    pub fn new(start_time: f64, end_time: f64) -> Self {
        Self {
            start_time,
            end_time,
            current_time: start_time,
            previous_time: start_time,
            next_time: start_time,
            step_number: 0,
            desired_step_size: None,
            step_size: None,
            previous_step_size: None,
            state: TimeState::NotStarted,
        }
    }

    pub fn start_time(&self) -> f64 {
        self.start_time
    }

    pub fn end_time(&self) -> f64 {
        self.end_time
    }

    pub fn current_time(&self) -> f64 {
        self.current_time
    }

    pub fn previous_time(&self) -> f64 {
        self.previous_time
    }

    /// Time the step in progress will reach.
    pub fn next_time(&self) -> f64 {
        self.next_time
    }

    /// Number of accepted steps.
    pub fn step_number(&self) -> usize {
        self.step_number
    }

    /// `Δt_n` of the step in progress, after clipping.
    pub fn step_size(&self) -> Option<f64> {
        self.step_size
    }

    /// `Δt_{n-1}`, the last accepted step.
    pub fn previous_step_size(&self) -> Option<f64> {
        self.previous_step_size
    }

    pub fn state(&self) -> TimeState {
        self.state
    }

    pub fn is_finished(&self) -> bool {
        self.state == TimeState::Finished
    }

    /// Request `step_size` for the coming steps.
    pub fn set_desired_next_step_size(&mut self, step_size: f64) -> Result<()> {
        if !(step_size > 0.0 && step_size.is_finite()) {
            return Err(Error::InvalidStepSize {
                step_size,
                reason: "step size must be positive".to_string(),
            });
        }
        if self.is_finished() {
            return Err(Error::NotReady(format!(
                "cannot set a step size after reaching end time {}",
                self.end_time
            )));
        }
        self.desired_step_size = Some(step_size);
        self.clip_step();
        Ok(())
    }

    /// Accept the step in progress.
    pub fn advance_time(&mut self) -> Result<()> {
        if self.is_finished() {
            return Err(Error::NotReady(format!(
                "end time {} already reached",
                self.end_time
            )));
        }
        let step_size = self.step_size.ok_or_else(|| {
            Error::NotReady("advance_time called before a step size was set".to_string())
        })?;

        self.previous_time = self.current_time;
        self.current_time = self.next_time;
        self.previous_step_size = Some(step_size);
        self.step_number += 1;

        if self.current_time == self.end_time {
            self.state = TimeState::Finished;
            self.step_size = None;
            self.next_time = self.current_time;
        } else {
            self.state = TimeState::Running;
            self.clip_step();
        }
        Ok(())
    }

    /// Back to the start with the configured bounds.
    pub fn restart(&mut self) {
        *self = Self::new(self.start_time, self.end_time);
    }

    fn clip_step(&mut self) {
        let Some(desired) = self.desired_step_size else {
            return;
        };
        let remaining = self.end_time - self.current_time;
        let snap = END_TIME_SNAP * (self.end_time - self.start_time);
        if desired >= remaining - snap {
            if desired > remaining + snap {
                debug!(
                    "step size {} clipped to {} to land on end time {}",
                    desired, remaining, self.end_time
                );
            }
            self.step_size = Some(remaining);
            self.next_time = self.end_time;
        } else {
            self.step_size = Some(desired);
            self.next_time = self.current_time + desired;
        }
    }
}

impl fmt::Display for DiscreteTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "step {:5}, t = {:.6e}, dt = {:.6e}",
            self.step_number,
            self.current_time,
            self.previous_step_size.unwrap_or(0.0)
        )
    }
}

/// Clock plus VSIMEX coefficients.
#[derive(Debug, Clone)]
pub struct VsimexMethod {
    time: DiscreteTime,
    engine: VsimexEngine,
}

impl VsimexMethod {
    pub fn new(params: &TimeSteppingParameters) -> Self {
        Self {
            time: DiscreteTime::new(params.start_time, params.end_time),
            engine: VsimexEngine::new(params.start_time, params.end_time, params.max_step_fraction),
        }
    }

    pub fn time(&self) -> &DiscreteTime {
        &self.time
    }

    pub fn set_desired_next_step_size(&mut self, step_size: f64) -> Result<()> {
        self.time.set_desired_next_step_size(step_size)
    }

    /// Coefficients of the step in progress.
    pub fn update_coefficients(&mut self) -> Result<&VsimexCoefficients> {
        let step_size = self.time.step_size().ok_or_else(|| {
            Error::NotReady("update_coefficients called before a step size was set".to_string())
        })?;
        self.engine
            .update_coefficients(step_size, self.time.previous_step_size())
    }

    pub fn advance_time(&mut self) -> Result<()> {
        self.time.advance_time()
    }

    pub fn coefficients(&self) -> &VsimexCoefficients {
        self.engine.coefficients()
    }

    pub fn coefficients_changed(&self) -> bool {
        self.engine.coefficients_changed()
    }

    pub fn coefficients_version(&self) -> u64 {
        self.engine.version()
    }

    pub fn order(&self) -> usize {
        self.engine.order()
    }

    pub fn current_time(&self) -> f64 {
        self.time.current_time()
    }

    pub fn previous_time(&self) -> f64 {
        self.time.previous_time()
    }

    pub fn next_time(&self) -> f64 {
        self.time.next_time()
    }

    pub fn step_number(&self) -> usize {
        self.time.step_number()
    }

    pub fn step_size(&self) -> Option<f64> {
        self.time.step_size()
    }

    pub fn is_finished(&self) -> bool {
        self.time.is_finished()
    }

    /// Reset clock and coefficient history for another run.
    pub fn restart(&mut self) {
        self.time.restart();
        self.engine.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_advance_k_steps() {
        let mut t = DiscreteTime::new(0.5, 10.0);
        t.set_desired_next_step_size(0.1).unwrap();
        for _ in 0..7 {
            t.advance_time().unwrap();
        }
        assert_eq!(t.step_number(), 7);
        assert_relative_eq!(t.current_time(), 0.5 + 7.0 * 0.1, epsilon = 1e-12);
        assert_eq!(t.state(), TimeState::Running);
    }

    #[test]
    fn test_last_step_lands_on_end_time() {
        let mut t = DiscreteTime::new(0.0, 1.0);
        t.set_desired_next_step_size(0.3).unwrap();
        let mut steps = 0;
        while !t.is_finished() {
            t.advance_time().unwrap();
            steps += 1;
        }
        assert_eq!(steps, 4);
        assert_eq!(t.current_time(), 1.0);
        assert_relative_eq!(t.previous_step_size().unwrap(), 0.1, epsilon = 1e-12);
    }

    #[test]
    fn test_not_ready() {
        let mut t = DiscreteTime::new(0.0, 1.0);
        assert!(matches!(t.advance_time(), Err(Error::NotReady(_))));

        t.set_desired_next_step_size(2.0).unwrap();
        t.advance_time().unwrap();
        assert!(t.is_finished());
        assert!(matches!(t.advance_time(), Err(Error::NotReady(_))));
        assert!(matches!(t.set_desired_next_step_size(0.1), Err(Error::NotReady(_))));
    }

    #[test]
    fn test_non_positive_step_rejected() {
        let mut t = DiscreteTime::new(0.0, 1.0);
        assert!(matches!(
            t.set_desired_next_step_size(-0.1),
            Err(Error::InvalidStepSize { .. })
        ));
    }

    #[test]
    fn test_restart() {
        let mut t = DiscreteTime::new(0.0, 1.0);
        t.set_desired_next_step_size(0.25).unwrap();
        t.advance_time().unwrap();
        t.restart();
        assert_eq!(t.state(), TimeState::NotStarted);
        assert_eq!(t.step_number(), 0);
        assert_eq!(t.current_time(), 0.0);
        assert_eq!(t.step_size(), None);
    }

    #[test]
    fn test_method_switches_to_second_order() {
        let params = TimeSteppingParameters {
            end_time: 1.0,
            ..Default::default()
        };
        let mut m = VsimexMethod::new(&params);
        assert!(matches!(m.update_coefficients(), Err(Error::NotReady(_))));

        m.set_desired_next_step_size(0.1).unwrap();
        m.update_coefficients().unwrap();
        assert_eq!(m.order(), 1);
        m.advance_time().unwrap();

        m.set_desired_next_step_size(0.05).unwrap();
        let c = *m.update_coefficients().unwrap();
        assert_eq!(m.order(), 2);
        assert_relative_eq!(c.beta[0], 1.5, epsilon = 1e-14);
        assert!(m.coefficients_changed());

        m.restart();
        assert_eq!(m.step_number(), 0);
        m.set_desired_next_step_size(0.1).unwrap();
        m.update_coefficients().unwrap();
        assert_eq!(m.order(), 1);
    }
}
