//! The coupled time loop.
//!
//! Every step runs, in this order:
//!
//! 1. step-size selection from the CFL bound,
//! 2. coefficient update,
//! 3. heat equation (transport velocity lagged by one step),
//! 4. diffusion step (buoyancy from the temperature of step 3),
//! 5. projection step,
//! 6. pressure update,
//! 7. history rotation of every field,
//! 8. time advance.

use std::borrow::Cow;
use std::sync::Arc;

use imexflow_core::{CellGeometry, Communicator, FlowAssembler, HeatAssembler};
use imexflow_solver::LinearSolve;
use log::{debug, info};

use crate::cache::PreconditionerPolicy;
use crate::cfl::CflController;
use crate::error::{Error, Result, SolveStage};
use crate::heat::{HeatEquation, TransportVelocity};
use crate::navier_stokes::NavierStokesProjection;
use crate::observer::{StepFields, StepObserver, StepReport};
use crate::params::{ProblemParameters, ProblemType};
use crate::session::{SimulationSession, StepContext};
use crate::time::VsimexMethod;

/// Owns the solvers of one run and advances them together.
pub struct Simulation {
    problem_type: ProblemType,
    time: VsimexMethod,
    cfl: CflController,
    n_maximum_steps: Option<usize>,
    terminal_output_frequency: usize,
    geometry: Arc<dyn CellGeometry>,
    linear: Arc<dyn LinearSolve>,
    comm: Arc<dyn Communicator>,
    flow: Option<NavierStokesProjection>,
    heat: Option<HeatEquation>,
    flow_policy: PreconditionerPolicy,
    heat_policy: PreconditionerPolicy,
    initialized: bool,
}

impl Simulation {
    pub fn new(
        parameters: &ProblemParameters,
        geometry: Arc<dyn CellGeometry>,
        linear: Arc<dyn LinearSolve>,
        comm: Arc<dyn Communicator>,
    ) -> Result<Self> {
        parameters.validate()?;
        Ok(Self {
            problem_type: parameters.problem_type,
            time: VsimexMethod::new(&parameters.time_stepping),
            cfl: CflController::from_parameters(&parameters.time_stepping),
            n_maximum_steps: parameters.time_stepping.n_maximum_steps,
            terminal_output_frequency: parameters.terminal_output_frequency,
            geometry,
            linear,
            comm,
            flow: None,
            heat: None,
            flow_policy: PreconditionerPolicy::new(parameters.navier_stokes.preconditioner_update_frequency),
            heat_policy: PreconditionerPolicy::new(parameters.heat_equation.preconditioner_update_frequency),
            initialized: false,
        })
    }

    pub fn with_flow(mut self, flow: NavierStokesProjection) -> Self {
        self.flow_policy = PreconditionerPolicy::new(flow.parameters().preconditioner_update_frequency);
        self.flow = Some(flow);
        self
    }

    pub fn with_heat(mut self, heat: HeatEquation) -> Self {
        self.heat_policy = PreconditionerPolicy::new(heat.parameters().preconditioner_update_frequency);
        self.heat = Some(heat);
        self
    }

    pub fn time(&self) -> &VsimexMethod {
        &self.time
    }

    pub fn flow(&self) -> Option<&NavierStokesProjection> {
        self.flow.as_ref()
    }

    pub fn flow_mut(&mut self) -> Option<&mut NavierStokesProjection> {
        self.flow.as_mut()
    }

    pub fn heat(&self) -> Option<&HeatEquation> {
        self.heat.as_ref()
    }

    pub fn heat_mut(&mut self) -> Option<&mut HeatEquation> {
        self.heat.as_mut()
    }

    pub fn is_finished(&self) -> bool {
        self.time.is_finished()
    }

    /// Fields for an observer.
    pub fn fields(&self) -> StepFields<'_> {
        StepFields {
            velocity: self.flow.as_ref().map(|f| f.velocity()),
            pressure: self.flow.as_ref().map(|f| f.pressure()),
            temperature: self.heat.as_ref().map(|h| h.temperature()),
        }
    }

    fn check_configuration(&self) -> Result<()> {
        let needs_flow = !matches!(self.problem_type, ProblemType::HeatConvectionDiffusion);
        let needs_heat = !matches!(self.problem_type, ProblemType::Hydrodynamic);
        if needs_flow && self.flow.is_none() {
            return Err(Error::ConfigurationConflict(format!(
                "{:?} problem without a Navier-Stokes solver",
                self.problem_type
            )));
        }
        if needs_heat && self.heat.is_none() {
            return Err(Error::ConfigurationConflict(format!(
                "{:?} problem without a heat equation",
                self.problem_type
            )));
        }
        if let Some(heat) = &self.heat {
            if matches!(heat.transport(), TransportVelocity::Coupled) && self.flow.is_none() {
                return Err(Error::ConfigurationConflict(
                    "coupled transport velocity requires a Navier-Stokes solver".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Check the solver set and run the Poisson pre-step if enabled.
    pub fn initialize(&mut self, session: &mut SimulationSession) -> Result<()> {
        self.check_configuration()?;
        if let Some(flow) = self.flow.as_mut() {
            if flow.parameters().poisson_prestep {
                let mut ctx = StepContext {
                    time: &self.time,
                    linear: self.linear.as_ref(),
                    comm: self.comm.as_ref(),
                    session,
                };
                let temperature = self.heat.as_ref().map(|h| h.temperature().solution());
                flow.solve_poisson_prestep(&mut ctx, temperature)?;
            }
        }
        self.initialized = true;
        info!("simulation initialized at t = {:.6e}", self.time.current_time());
        Ok(())
    }

    fn next_step_size(&self) -> f64 {
        let velocity: Option<Cow<'_, [f64]>> = match (&self.flow, &self.heat) {
            (Some(flow), _) => Some(Cow::Borrowed(flow.velocity().old_solution())),
            (None, Some(heat)) => heat.transport_field(self.time.current_time()).map(Cow::Owned),
            (None, None) => None,
        };
        match velocity {
            Some(velocity) => self.cfl.compute_next_step_size(
                self.geometry.as_ref(),
                self.comm.as_ref(),
                &velocity,
                self.time.step_number(),
            ),
            None => self.cfl.initial_step_size(),
        }
    }

    /// Compute one full step and accept it.
    pub fn step(&mut self, session: &mut SimulationSession) -> Result<StepReport> {
        if self.time.is_finished() {
            return Err(Error::NotReady("simulation already reached its end time".to_string()));
        }
        if !self.initialized {
            self.initialize(session)?;
        }

        let step_number = self.time.step_number();
        self.time.set_desired_next_step_size(self.next_step_size())?;
        self.time.update_coefficients()?;
        let step_size = self
            .time
            .step_size()
            .ok_or_else(|| Error::NotReady("step size missing after update".to_string()))?;
        if self.time.coefficients_changed() {
            debug!(
                "step {}: coefficients changed (order {}, dt = {:.4e})",
                step_number + 1,
                self.time.order(),
                step_size
            );
        }

        let mut stats = Vec::with_capacity(4);
        {
            let mut ctx = StepContext {
                time: &self.time,
                linear: self.linear.as_ref(),
                comm: self.comm.as_ref(),
                session: &mut *session,
            };

            if let Some(heat) = self.heat.as_mut() {
                let velocity = self
                    .flow
                    .as_ref()
                    .map(|f| (f.velocity().old_solution(), f.velocity().old_old_solution()));
                let reinit = self.heat_policy.should_reinit(step_number);
                stats.push((SolveStage::HeatEquation, heat.solve(&mut ctx, reinit, velocity)?));
            }

            if let Some(flow) = self.flow.as_mut() {
                let reinit = self.flow_policy.should_reinit(step_number);
                let temperature = self.heat.as_ref().map(|h| h.temperature().solution());
                stats.push((
                    SolveStage::Diffusion,
                    flow.solve_diffusion_step(&mut ctx, reinit, temperature)?,
                ));
                stats.push((SolveStage::Projection, flow.solve_projection_step(&mut ctx, reinit)?));
                if let Some(correction) = flow.update_pressure(&mut ctx, reinit)? {
                    stats.push((SolveStage::PressureCorrection, correction));
                }
            }
        }

        if let Some(flow) = self.flow.as_mut() {
            flow.update_solution_vectors()?;
        }
        if let Some(heat) = self.heat.as_mut() {
            heat.update_solution_vectors()?;
        }
        self.time.advance_time()?;

        Ok(StepReport {
            step: self.time.step_number(),
            time: self.time.current_time(),
            step_size,
            stats,
        })
    }

    /// Step until the end time or the step cap. Returns the number of
    /// steps taken.
    pub fn run(
        &mut self,
        session: &mut SimulationSession,
        observer: &mut dyn StepObserver,
    ) -> Result<usize> {
        let mut n_steps = 0;
        while !self.time.is_finished() {
            if self.n_maximum_steps.is_some_and(|cap| n_steps >= cap) {
                info!("stopping after the maximum of {} steps", n_steps);
                break;
            }
            let report = self.step(session)?;
            n_steps += 1;

            let last = self.time.is_finished() || self.n_maximum_steps == Some(n_steps);
            if report.step % self.terminal_output_frequency == 0 || last {
                observer.on_step(&report, &self.fields())?;
            }
        }
        info!(
            "run finished after {} steps at t = {:.6e}",
            n_steps,
            self.time.current_time()
        );
        Ok(n_steps)
    }

    /// Rewind the clock for another run on the same discretization. Field
    /// initial conditions must be set again by the caller.
    pub fn restart(&mut self) {
        self.time.restart();
        self.initialized = false;
    }

    /// Step size of fixed stepping and of the first adaptive step.
    pub fn set_initial_step_size(&mut self, step_size: f64) -> Result<()> {
        if !(step_size > 0.0 && step_size.is_finite()) {
            return Err(Error::InvalidStepSize {
                step_size,
                reason: "initial step size must be positive".to_string(),
            });
        }
        self.cfl.set_initial_step_size(step_size);
        Ok(())
    }

    /// Switch to a new mesh. Resets the clock and every field.
    pub fn replace_discretization(
        &mut self,
        geometry: Arc<dyn CellGeometry>,
        flow_assembler: Option<Arc<dyn FlowAssembler>>,
        heat_assembler: Option<Arc<dyn HeatAssembler>>,
    ) {
        self.geometry = geometry;
        if let (Some(flow), Some(assembler)) = (self.flow.as_mut(), flow_assembler) {
            flow.replace_assembler(assembler);
        }
        if let (Some(heat), Some(assembler)) = (self.heat.as_mut(), heat_assembler) {
            heat.replace_assembler(assembler);
        }
        self.restart();
    }
}
