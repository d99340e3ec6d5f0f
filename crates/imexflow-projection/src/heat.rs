//! Convection-diffusion of the temperature.
//!
//! ```text
//! (α0 M + γ0 C4 K + C(w*)) θ^{n+1} =
//!     - M (α1 θ^n + α2 θ^{n-1}) - C4 K (γ1 θ^n + γ2 θ^{n-1})
//!     + C6 r(t^{n+1}) + C4 (q(t^{n+1}), ψ)_Γ
//! ```
//!
//! with `q = ∇θ·n` the prescribed boundary flux. The transport velocity `w`
//! comes from a [`TransportVelocity`]. A coupled velocity lags one step: the
//! heat equation runs before the momentum solve and sees `u^n`, `u^{n-1}`
//! only, so `w* = η0 u^n + η1 u^{n-1}`. An analytic velocity is known at
//! `t^{n+1}` and enters the matrix unextrapolated.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use imexflow_core::vector::{axpy, combine};
use imexflow_core::{CsrMatrix, FieldEntity, HeatAssembler, VectorFunction};
use imexflow_solver::{KrylovMethod, SolveStats};
use log::{debug, info};

use crate::cache::{CachedOperator, OperatorStamp, PreconditionerSlot};
use crate::error::{Error, Result, SolveStage};
use crate::navier_stokes::solve_stage;
use crate::params::{ConvectiveTermTimeDiscretization, HeatEquationParameters, PhysicalConstants};
use crate::session::StepContext;

/// Source of the advecting velocity.
#[derive(Clone, Default)]
pub enum TransportVelocity {
    /// The velocity field of the coupled flow solver.
    Coupled,
    /// A prescribed velocity `w(x, t)`.
    Analytic(Arc<dyn VectorFunction>),
    /// Pure diffusion.
    #[default]
    None,
}

impl fmt::Debug for TransportVelocity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportVelocity::Coupled => write!(f, "Coupled"),
            TransportVelocity::Analytic(_) => write!(f, "Analytic(..)"),
            TransportVelocity::None => write!(f, "None"),
        }
    }
}

/// Velocity snapshots `(u^n, u^{n-1})` of the coupled flow.
pub type CoupledVelocity<'a> = (&'a [f64], &'a [f64]);

/// Advecting field of one step in velocity layout.
#[derive(Debug, Clone, PartialEq)]
enum StepTransport {
    /// `w*` at `t^{n+1}` for the system matrix.
    Implicit(Vec<f64>),
    /// `(w^n, w^{n-1})` for the right-hand side.
    Explicit(Vec<f64>, Vec<f64>),
}

struct HeatOperators {
    mesh_version: u64,
    mass: CsrMatrix,
    stiffness: CsrMatrix,
}

/// Temperature solver state.
pub struct HeatEquation {
    parameters: HeatEquationParameters,
    constants: PhysicalConstants,
    assembler: Arc<dyn HeatAssembler>,
    transport: TransportVelocity,
    temperature: FieldEntity,
    operators: Option<HeatOperators>,
    mass_plus_stiffness: CachedOperator,
    preconditioner: PreconditionerSlot,
}

impl HeatEquation {
    pub fn new(
        parameters: HeatEquationParameters,
        constants: PhysicalConstants,
        assembler: Arc<dyn HeatAssembler>,
        transport: TransportVelocity,
    ) -> Result<Self> {
        parameters.validate()?;
        let n = assembler.n_temperature_dofs();
        info!("heat equation: {} temperature dofs, transport {:?}", n, transport);
        Ok(Self {
            parameters,
            constants,
            assembler,
            transport,
            temperature: FieldEntity::scalar("temperature", n),
            operators: None,
            mass_plus_stiffness: CachedOperator::new(),
            preconditioner: PreconditionerSlot::new(),
        })
    }

    pub fn parameters(&self) -> &HeatEquationParameters {
        &self.parameters
    }

    pub fn transport(&self) -> &TransportVelocity {
        &self.transport
    }

    pub fn temperature(&self) -> &FieldEntity {
        &self.temperature
    }

    pub fn temperature_mut(&mut self) -> &mut FieldEntity {
        &mut self.temperature
    }

    pub fn set_initial_condition(&mut self, values: &[f64]) -> Result<()> {
        self.temperature.set_initial_condition(values)?;
        Ok(())
    }

    pub fn update_solution_vectors(&mut self) -> Result<()> {
        self.temperature.update_solution_vectors()?;
        Ok(())
    }

    /// Resize for a changed mesh and drop every cached operator.
    pub fn replace_assembler(&mut self, assembler: Arc<dyn HeatAssembler>) {
        self.temperature.reinit(assembler.n_temperature_dofs());
        self.assembler = assembler;
        self.operators = None;
        self.mass_plus_stiffness.invalidate();
        self.preconditioner.clear();
    }

    /// Prescribed transport field at `time`, if the velocity is analytic.
    pub fn transport_field(&self, time: f64) -> Option<Vec<f64>> {
        match &self.transport {
            TransportVelocity::Analytic(f) => Some(self.assembler.interpolate_transport(f.as_ref(), time)),
            _ => None,
        }
    }

    fn ensure_operators(&mut self) -> Result<()> {
        let version = self.assembler.mesh_version();
        if self
            .operators
            .as_ref()
            .is_none_or(|ops| ops.mesh_version != version)
        {
            debug!("assembling constant heat operators for mesh version {}", version);
            self.operators = Some(HeatOperators {
                mesh_version: version,
                mass: self.assembler.temperature_mass_matrix()?,
                stiffness: self.assembler.temperature_stiffness_matrix()?,
            });
        }
        Ok(())
    }

    /// Advecting field for the configured convective discretization, or
    /// `None` without advection.
    fn step_transport(
        &self,
        ctx: &StepContext<'_>,
        velocity: Option<CoupledVelocity<'_>>,
    ) -> Result<Option<StepTransport>> {
        let explicit = self.parameters.convective_term_time_discretization
            == ConvectiveTermTimeDiscretization::FullyExplicit;
        match &self.transport {
            TransportVelocity::None => Ok(None),
            TransportVelocity::Coupled => {
                let (u_n, u_nm1) = velocity.ok_or_else(|| {
                    Error::ConfigurationConflict(
                        "heat equation expects a coupled velocity but none was passed".to_string(),
                    )
                })?;
                if explicit {
                    return Ok(Some(StepTransport::Explicit(u_n.to_vec(), u_nm1.to_vec())));
                }
                let [eta0, eta1] = ctx.time.coefficients().eta;
                Ok(Some(StepTransport::Implicit(combine(eta0, u_n, eta1, u_nm1))))
            }
            TransportVelocity::Analytic(f) => {
                let interpolate = |t: f64| self.assembler.interpolate_transport(f.as_ref(), t);
                if !explicit {
                    return Ok(Some(StepTransport::Implicit(interpolate(ctx.time.next_time()))));
                }
                let time = ctx.time.time();
                let w_n = interpolate(time.current_time());
                let w_nm1 = match time.previous_step_size() {
                    Some(dt) => interpolate(time.current_time() - dt),
                    None => w_n.clone(),
                };
                Ok(Some(StepTransport::Explicit(w_n, w_nm1)))
            }
        }
    }

    /// Solve for `θ^{n+1}` and store it in `temperature.solution`.
    pub fn solve(
        &mut self,
        ctx: &mut StepContext<'_>,
        reinit_preconditioner: bool,
        velocity: Option<CoupledVelocity<'_>>,
    ) -> Result<SolveStats> {
        let timer = Instant::now();
        let stage = SolveStage::HeatEquation;
        self.ensure_operators()?;
        let transport = self.step_transport(ctx, velocity)?;
        let Some(ops) = self.operators.as_ref() else {
            return Err(Error::NotReady("heat operators missing".to_string()));
        };

        let coefficients = *ctx.time.coefficients();
        let [alpha0, alpha1, alpha2] = coefficients.alpha;
        let [beta0, beta1] = coefficients.beta;
        let [gamma0, gamma1, gamma2] = coefficients.gamma;
        let c4 = self.constants.c4;
        let form = self.parameters.convective_term_weak_form;
        let next_time = ctx.time.next_time();
        let assembler = self.assembler.as_ref();

        let stamp = OperatorStamp {
            coefficients: ctx.time.coefficients_version(),
            mesh: ops.mesh_version,
        };
        let mass_plus_stiffness = self.mass_plus_stiffness.get_or_rebuild(stamp, || {
            CsrMatrix::linear_combination(alpha0, &ops.mass, gamma0 * c4, &ops.stiffness)
        })?;

        let theta_n = self.temperature.old_solution();
        let theta_nm1 = self.temperature.old_old_solution();
        let mut system = mass_plus_stiffness.clone();
        let mut rhs = vec![0.0; theta_n.len()];

        match &transport {
            Some(StepTransport::Implicit(w_star)) => {
                system.add_scaled(1.0, &assembler.temperature_advection_matrix(w_star, form)?)?;
            }
            Some(StepTransport::Explicit(w_n, w_nm1)) => {
                for (weight, w, theta) in [(beta0, w_n, theta_n), (beta1, w_nm1, theta_nm1)] {
                    if weight != 0.0 {
                        assembler
                            .temperature_advection_matrix(w, form)?
                            .mul_vec_add(-weight, theta, &mut rhs);
                    }
                }
            }
            None => {}
        }

        ops.mass.mul_vec_add(-1.0, &combine(alpha1, theta_n, alpha2, theta_nm1), &mut rhs);
        if gamma1 != 0.0 || gamma2 != 0.0 {
            ops.stiffness
                .mul_vec_add(-c4, &combine(gamma1, theta_n, gamma2, theta_nm1), &mut rhs);
        }
        if self.constants.c6 != 0.0 {
            if let Some(source) = assembler.heat_source_load(next_time) {
                axpy(self.constants.c6, &source, &mut rhs);
            }
        }
        if c4 != 0.0 {
            if let Some(flux) = assembler.temperature_neumann_load(next_time) {
                axpy(c4, &flux, &mut rhs);
            }
        }

        let constraints = assembler.temperature_constraints(next_time);
        let mut x = self.temperature.solution().to_vec();
        constraints.apply_to_system(&mut system, &mut rhs, &mut x)?;

        let stats = solve_stage(
            ctx,
            &mut self.preconditioner,
            stage,
            KrylovMethod::Gmres,
            &system,
            &mut x,
            &rhs,
            &self.parameters.solver,
            ops.mesh_version,
            reinit_preconditioner,
        )?;
        constraints.distribute(&mut x);
        self.temperature.set_constraints(constraints)?;
        self.temperature.set_solution(&x)?;

        ctx.session.record(stage, timer.elapsed(), stats);
        if self.parameters.verbose {
            info!("step {:5}: {} took {}", ctx.step(), stage, stats);
        }
        Ok(stats)
    }
}
