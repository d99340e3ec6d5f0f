//! Diffusion step: the provisional velocity `u^{n+1}`.
//!
//! ```text
//! (α0 M + γ0 C2 K + C(u*)) u^{n+1} =
//!     - M (α1 u^n + α2 u^{n-1}) - C2 K (γ1 u^n + γ2 u^{n-1})
//!     - D p#  - C1 R (β0 u^n + β1 u^{n-1})
//!     + C3 B θ^{n+1} + C5 f(t^{n+1})
//! ```
//!
//! with `u* = η0 u^n + η1 u^{n-1}` and `p# = p^n + 4/3 φ^n - 1/3 φ^{n-1}`.
//! With fully explicit convection `C(u*)` leaves the matrix and the
//! right-hand side gains `-β0 C(u^n) u^n - β1 C(u^{n-1}) u^{n-1}`.

use std::time::Instant;

use imexflow_core::CsrMatrix;
use imexflow_core::vector::{axpy, combine};
use imexflow_solver::{KrylovMethod, SolveStats};

use crate::cache::OperatorStamp;
use crate::error::{Error, Result, SolveStage};
use crate::navier_stokes::{NavierStokesProjection, solve_stage};
use crate::params::ConvectiveTermTimeDiscretization;
use crate::session::StepContext;

impl NavierStokesProjection {
    /// Solve for the provisional velocity and store it in
    /// `velocity.solution`.
    ///
    /// `temperature` is the temperature at `t^{n+1}` for the buoyancy term.
    pub fn solve_diffusion_step(
        &mut self,
        ctx: &mut StepContext<'_>,
        reinit_preconditioner: bool,
        temperature: Option<&[f64]>,
    ) -> Result<SolveStats> {
        let timer = Instant::now();
        let stage = SolveStage::Diffusion;
        self.ensure_operators()?;
        let Some(ops) = self.operators.as_ref() else {
            return Err(Error::NotReady("flow operators missing".to_string()));
        };

        let coefficients = *ctx.time.coefficients();
        let [alpha0, alpha1, alpha2] = coefficients.alpha;
        let [beta0, beta1] = coefficients.beta;
        let [gamma0, gamma1, gamma2] = coefficients.gamma;
        let [eta0, eta1] = coefficients.eta;
        let constants = self.parameters.physical_constants;
        let form = self.parameters.convective_term_weak_form;
        let next_time = ctx.time.next_time();
        let assembler = self.assembler.as_ref();

        let stamp = OperatorStamp {
            coefficients: ctx.time.coefficients_version(),
            mesh: ops.mesh_version,
        };
        let mass_plus_stiffness = self.mass_plus_stiffness.get_or_rebuild(stamp, || {
            CsrMatrix::linear_combination(alpha0, &ops.mass, gamma0 * constants.c2, &ops.stiffness)
        })?;

        let u_n = self.velocity.old_solution();
        let u_nm1 = self.velocity.old_old_solution();
        let n = u_n.len();

        let mut system = mass_plus_stiffness.clone();
        let mut rhs = vec![0.0; n];

        match self.parameters.convective_term_time_discretization {
            ConvectiveTermTimeDiscretization::SemiImplicit => {
                let transport = combine(eta0, u_n, eta1, u_nm1);
                let advection = assembler.velocity_advection_matrix(&transport, form)?;
                system.add_scaled(1.0, &advection)?;
            }
            ConvectiveTermTimeDiscretization::FullyExplicit => {
                for (weight, u) in [(beta0, u_n), (beta1, u_nm1)] {
                    if weight != 0.0 {
                        assembler
                            .velocity_advection_matrix(u, form)?
                            .mul_vec_add(-weight, u, &mut rhs);
                    }
                }
            }
        }

        ops.mass.mul_vec_add(-1.0, &combine(alpha1, u_n, alpha2, u_nm1), &mut rhs);
        if gamma1 != 0.0 || gamma2 != 0.0 {
            ops.stiffness
                .mul_vec_add(-constants.c2, &combine(gamma1, u_n, gamma2, u_nm1), &mut rhs);
        }

        let mut extrapolated_pressure = self.pressure.old_solution().to_vec();
        axpy(4.0 / 3.0, &self.phi, &mut extrapolated_pressure);
        axpy(-1.0 / 3.0, &self.old_phi, &mut extrapolated_pressure);
        ops.gradient.mul_vec_add(-1.0, &extrapolated_pressure, &mut rhs);

        if constants.c1 != 0.0 {
            let coriolis = ops.coriolis.as_ref().ok_or_else(|| {
                Error::ConfigurationConflict(
                    "C1 is non-zero but the assembler provides no Coriolis operator".to_string(),
                )
            })?;
            coriolis.mul_vec_add(-constants.c1, &combine(beta0, u_n, beta1, u_nm1), &mut rhs);
        }

        if constants.c3 != 0.0 {
            let buoyancy = ops.buoyancy.as_ref().ok_or_else(|| {
                Error::ConfigurationConflict(
                    "C3 is non-zero but the assembler provides no buoyancy operator".to_string(),
                )
            })?;
            let theta = temperature.ok_or_else(|| {
                Error::ConfigurationConflict("C3 is non-zero but no temperature is coupled".to_string())
            })?;
            buoyancy.mul_vec_add(constants.c3, theta, &mut rhs);
        }

        if constants.c5 != 0.0 {
            if let Some(force) = assembler.body_force_load(next_time) {
                axpy(constants.c5, &force, &mut rhs);
            }
        }

        let constraints = assembler.velocity_constraints(next_time);
        let mut x = self.velocity.solution().to_vec();
        constraints.apply_to_system(&mut system, &mut rhs, &mut x)?;

        let stats = solve_stage(
            ctx,
            &mut self.diffusion_preconditioner,
            stage,
            KrylovMethod::Gmres,
            &system,
            &mut x,
            &rhs,
            &self.parameters.diffusion_step_solver,
            ops.mesh_version,
            reinit_preconditioner,
        )?;
        constraints.distribute(&mut x);

        self.velocity.set_constraints(constraints)?;
        self.velocity.set_solution(&x)?;
        self.system_matrix = Some(system);

        ctx.session.record(stage, timer.elapsed(), stats);
        self.log_solve(ctx, stage, &stats);
        Ok(stats)
    }
}
