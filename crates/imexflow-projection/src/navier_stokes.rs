//! Incremental pressure-projection solver for the momentum equation.
//!
//! One step runs [`solve_diffusion_step`], [`solve_projection_step`] and
//! [`update_pressure`] in that order, followed by
//! [`update_solution_vectors`] once all fields of the step are solved.
//!
//! [`solve_diffusion_step`]: NavierStokesProjection::solve_diffusion_step
//! [`solve_projection_step`]: NavierStokesProjection::solve_projection_step
//! [`update_pressure`]: NavierStokesProjection::update_pressure
//! [`update_solution_vectors`]: NavierStokesProjection::update_solution_vectors

use std::sync::Arc;
use std::time::Instant;

use imexflow_core::{CsrMatrix, FieldEntity, FlowAssembler, global_mean};
use imexflow_solver::{DenseLu, KrylovMethod, LinearSolverParameters, SolveStats};
use log::{debug, info};

use crate::cache::{CachedOperator, PreconditionerSlot};
use crate::error::{Error, Result, SolveStage};
use crate::params::NavierStokesParameters;
use crate::session::StepContext;

/// Operators assembled once per mesh.
pub(crate) struct FlowOperators {
    pub(crate) mesh_version: u64,
    pub(crate) mass: CsrMatrix,
    pub(crate) stiffness: CsrMatrix,
    pub(crate) gradient: CsrMatrix,
    pub(crate) pressure_mass: CsrMatrix,
    pub(crate) pressure_laplace: CsrMatrix,
    pub(crate) coriolis: Option<CsrMatrix>,
    pub(crate) buoyancy: Option<CsrMatrix>,
}

impl FlowOperators {
    fn assemble(assembler: &dyn FlowAssembler) -> Result<Self> {
        Ok(Self {
            mesh_version: assembler.mesh_version(),
            mass: assembler.velocity_mass_matrix()?,
            stiffness: assembler.velocity_stiffness_matrix()?,
            gradient: assembler.pressure_gradient_matrix()?,
            pressure_mass: assembler.pressure_mass_matrix()?,
            pressure_laplace: assembler.pressure_laplace_matrix()?,
            coriolis: assembler.coriolis_matrix(),
            buoyancy: assembler.buoyancy_matrix(),
        })
    }
}

/// Velocity/pressure solver state.
pub struct NavierStokesProjection {
    pub(crate) parameters: NavierStokesParameters,
    pub(crate) assembler: Arc<dyn FlowAssembler>,
    pub(crate) velocity: FieldEntity,
    pub(crate) pressure: FieldEntity,
    pub(crate) phi: Vec<f64>,
    pub(crate) old_phi: Vec<f64>,
    /// Unconstrained right-hand side of the last projection solve.
    pub(crate) projection_rhs: Vec<f64>,
    pub(crate) operators: Option<FlowOperators>,
    pub(crate) mass_plus_stiffness: CachedOperator,
    pub(crate) system_matrix: Option<CsrMatrix>,
    pub(crate) projection_matrix: CachedOperator,
    pub(crate) correction_lu: Option<(u64, DenseLu)>,
    pub(crate) diffusion_preconditioner: PreconditionerSlot,
    pub(crate) projection_preconditioner: PreconditionerSlot,
    pub(crate) correction_preconditioner: PreconditionerSlot,
}

impl NavierStokesProjection {
    pub fn new(parameters: NavierStokesParameters, assembler: Arc<dyn FlowAssembler>) -> Result<Self> {
        parameters.validate()?;
        let n_velocity = assembler.n_velocity_dofs();
        let n_pressure = assembler.n_pressure_dofs();
        let dim = assembler.dim();
        info!(
            "Navier-Stokes projection: {} velocity dofs, {} pressure dofs, {} pressure correction",
            n_velocity, n_pressure, parameters.pressure_correction_scheme
        );
        Ok(Self {
            parameters,
            velocity: FieldEntity::vector("velocity", dim, n_velocity),
            pressure: FieldEntity::scalar("pressure", n_pressure),
            phi: vec![0.0; n_pressure],
            old_phi: vec![0.0; n_pressure],
            projection_rhs: vec![0.0; n_pressure],
            operators: None,
            mass_plus_stiffness: CachedOperator::new(),
            system_matrix: None,
            projection_matrix: CachedOperator::new(),
            correction_lu: None,
            diffusion_preconditioner: PreconditionerSlot::new(),
            projection_preconditioner: PreconditionerSlot::new(),
            correction_preconditioner: PreconditionerSlot::new(),
            assembler,
        })
    }

    pub fn parameters(&self) -> &NavierStokesParameters {
        &self.parameters
    }

    pub fn assembler(&self) -> &Arc<dyn FlowAssembler> {
        &self.assembler
    }

    pub fn velocity(&self) -> &FieldEntity {
        &self.velocity
    }

    pub fn velocity_mut(&mut self) -> &mut FieldEntity {
        &mut self.velocity
    }

    pub fn pressure(&self) -> &FieldEntity {
        &self.pressure
    }

    pub fn pressure_mut(&mut self) -> &mut FieldEntity {
        &mut self.pressure
    }

    /// Current pressure increment.
    pub fn phi(&self) -> &[f64] {
        &self.phi
    }

    pub fn old_phi(&self) -> &[f64] {
        &self.old_phi
    }

    /// System matrix of the last diffusion solve, constraints eliminated.
    pub fn system_matrix(&self) -> Option<&CsrMatrix> {
        self.system_matrix.as_ref()
    }

    /// Number of times `α0 M + γ0 C2 K` was recombined.
    pub fn n_operator_rebuilds(&self) -> usize {
        self.mass_plus_stiffness.n_builds()
    }

    /// Initial velocity and pressure at every time level.
    pub fn set_initial_conditions(&mut self, velocity: &[f64], pressure: &[f64]) -> Result<()> {
        self.velocity.set_initial_condition(velocity)?;
        self.pressure.set_initial_condition(pressure)?;
        self.phi.iter_mut().for_each(|v| *v = 0.0);
        self.old_phi.iter_mut().for_each(|v| *v = 0.0);
        Ok(())
    }

    /// Swap in an assembler for a changed mesh. Fields are resized to zero
    /// and every cached operator and preconditioner is dropped.
    pub fn replace_assembler(&mut self, assembler: Arc<dyn FlowAssembler>) {
        let n_velocity = assembler.n_velocity_dofs();
        let n_pressure = assembler.n_pressure_dofs();
        self.assembler = assembler;
        self.velocity.reinit(n_velocity);
        self.pressure.reinit(n_pressure);
        for v in [&mut self.phi, &mut self.old_phi, &mut self.projection_rhs] {
            v.clear();
            v.resize(n_pressure, 0.0);
        }
        self.operators = None;
        self.mass_plus_stiffness.invalidate();
        self.projection_matrix.invalidate();
        self.system_matrix = None;
        self.correction_lu = None;
        self.diffusion_preconditioner.clear();
        self.projection_preconditioner.clear();
        self.correction_preconditioner.clear();
    }

    /// Rotate velocity and pressure histories after a completed step.
    pub fn update_solution_vectors(&mut self) -> Result<()> {
        self.velocity.update_solution_vectors()?;
        self.pressure.update_solution_vectors()?;
        Ok(())
    }

    /// Assemble the constant operators if missing or built for another mesh.
    pub(crate) fn ensure_operators(&mut self) -> Result<()> {
        let version = self.assembler.mesh_version();
        let stale = self
            .operators
            .as_ref()
            .is_none_or(|ops| ops.mesh_version != version);
        if stale {
            debug!("assembling constant flow operators for mesh version {}", version);
            self.operators = Some(FlowOperators::assemble(self.assembler.as_ref())?);
        }
        Ok(())
    }

    /// Pressure Laplacian with the homogeneous datum constraints eliminated.
    pub(crate) fn ensure_projection_matrix(&mut self) -> Result<()> {
        self.ensure_operators()?;
        let Some(ops) = self.operators.as_ref() else {
            return Err(Error::NotReady("flow operators missing".to_string()));
        };
        let constraints = self.assembler.pressure_constraints().homogenized();
        let n = ops.pressure_laplace.n_rows();
        self.projection_matrix
            .get_or_rebuild(crate::cache::OperatorStamp::mesh_only(ops.mesh_version), || {
                let mut matrix = ops.pressure_laplace.clone();
                let mut rhs = vec![0.0; n];
                let mut x = vec![0.0; n];
                constraints.apply_to_system(&mut matrix, &mut rhs, &mut x)?;
                Ok::<_, Error>(matrix)
            })?;
        Ok(())
    }

    /// Subtract the global mean if the pressure is fixed only up to a
    /// constant.
    pub(crate) fn normalize(&self, ctx: &StepContext<'_>, values: &mut [f64]) {
        if self.assembler.pressure_needs_normalization() {
            let mean = global_mean(ctx.comm, values);
            values.iter_mut().for_each(|v| *v -= mean);
        }
    }

    pub(crate) fn log_solve(&self, ctx: &StepContext<'_>, stage: SolveStage, stats: &SolveStats) {
        if self.parameters.verbose {
            info!("step {:5}: {} took {}", ctx.step(), stage, stats);
        }
    }

    /// Initial pressure from `(∇p, ∇q) = (C5 f(t0) + C3 θ e_g, ∇q)`.
    pub fn solve_poisson_prestep(
        &mut self,
        ctx: &mut StepContext<'_>,
        temperature: Option<&[f64]>,
    ) -> Result<SolveStats> {
        let timer = Instant::now();
        let stage = SolveStage::PoissonPrestep;
        self.ensure_projection_matrix()?;

        let constants = self.parameters.physical_constants;
        let buoyancy = match temperature {
            Some(theta) if constants.c3 != 0.0 => Some((constants.c3, theta)),
            _ => None,
        };
        let mut rhs = self
            .assembler
            .poisson_prestep_load(ctx.time.current_time(), constants.c5, buoyancy);
        let constraints = self.assembler.pressure_constraints().homogenized();
        constraints.set_zero(&mut rhs);

        let Some(matrix) = self.projection_matrix.get() else {
            return Err(Error::NotReady("projection matrix missing".to_string()));
        };
        let mut pressure = vec![0.0; rhs.len()];
        let stats = solve_stage(
            ctx,
            &mut self.projection_preconditioner,
            stage,
            KrylovMethod::Cg,
            matrix,
            &mut pressure,
            &rhs,
            &self.parameters.poisson_prestep_solver,
            self.assembler.mesh_version(),
            true,
        )?;
        constraints.distribute(&mut pressure);
        self.normalize(ctx, &mut pressure);
        self.pressure.set_initial_condition(&pressure)?;

        ctx.session.record(stage, timer.elapsed(), stats);
        self.log_solve(ctx, stage, &stats);
        Ok(stats)
    }
}

/// Solve with the stage's preconditioner slot and translate failures.
#[allow(clippy::too_many_arguments)]
pub(crate) fn solve_stage(
    ctx: &StepContext<'_>,
    slot: &mut PreconditionerSlot,
    stage: SolveStage,
    method: KrylovMethod,
    matrix: &CsrMatrix,
    x: &mut [f64],
    rhs: &[f64],
    params: &LinearSolverParameters,
    mesh_version: u64,
    reinit: bool,
) -> Result<SolveStats> {
    let step = ctx.step();
    let preconditioner = slot
        .prepare(ctx.linear, matrix, params.preconditioner, mesh_version, reinit, stage.name())
        .map_err(|e| Error::from_solver(stage, step, e))?;
    ctx.linear
        .solve(method, matrix, x, rhs, preconditioner, params)
        .map_err(|e| Error::from_solver(stage, step, e))
}
