//! Pressure update from the projection increment.
//!
//! Standard: `p^{n+1} = p^n + φ^{n+1}`.
//! Rotational: `p^{n+1} = p^n + φ^{n+1} + C2 M_p⁻¹ b`, where `b` is the
//! projection right-hand side `-(∇·u^{n+1}, q)`, i.e. the `-C2 ∇·u`
//! correction projected onto the pressure space.

use std::time::Instant;

use imexflow_core::vector::axpy;
use imexflow_solver::{DenseLu, KrylovMethod, SolveStats};

use crate::error::{Error, Result, SolveStage};
use crate::navier_stokes::{NavierStokesProjection, solve_stage};
use crate::params::PressureCorrectionScheme;
use crate::session::StepContext;

impl NavierStokesProjection {
    /// Write `p^{n+1}` into `pressure.solution`.
    ///
    /// Returns the statistics of the mass-matrix solve for the rotational
    /// scheme, `None` for the standard one.
    pub fn update_pressure(
        &mut self,
        ctx: &mut StepContext<'_>,
        reinit_preconditioner: bool,
    ) -> Result<Option<SolveStats>> {
        let mut pressure = self.pressure.old_solution().to_vec();
        axpy(1.0, &self.phi, &mut pressure);

        let stats = match self.parameters.pressure_correction_scheme {
            PressureCorrectionScheme::Standard => None,
            PressureCorrectionScheme::Rotational => {
                let timer = Instant::now();
                let (correction_stats, correction) = self.solve_correction(ctx, reinit_preconditioner)?;
                axpy(self.parameters.physical_constants.c2, &correction, &mut pressure);
                *self.pressure.distributed_mut() = correction;
                ctx.session
                    .record(SolveStage::PressureCorrection, timer.elapsed(), correction_stats);
                self.log_solve(ctx, SolveStage::PressureCorrection, &correction_stats);
                Some(correction_stats)
            }
        };

        self.normalize(ctx, &mut pressure);
        self.pressure.set_solution(&pressure)?;
        Ok(stats)
    }

    /// Solve `M_p x = b` for the rotational correction `x`.
    fn solve_correction(
        &mut self,
        ctx: &StepContext<'_>,
        reinit: bool,
    ) -> Result<(SolveStats, Vec<f64>)> {
        let stage = SolveStage::PressureCorrection;
        let params = self.parameters.correction_step_solver.clone().ok_or_else(|| {
            Error::ConfigurationConflict(
                "rotational pressure correction needs a correction step solver".to_string(),
            )
        })?;
        self.ensure_operators()?;
        let Some(ops) = self.operators.as_ref() else {
            return Err(Error::NotReady("flow operators missing".to_string()));
        };

        let n = self.projection_rhs.len();
        let mut x = vec![0.0; n];
        let stats = match self.parameters.correction_step_method {
            KrylovMethod::DirectLu => {
                let stale = self
                    .correction_lu
                    .as_ref()
                    .is_none_or(|(version, _)| *version != ops.mesh_version);
                if stale {
                    let lu = DenseLu::factorize(&ops.pressure_mass)
                        .map_err(|e| Error::from_solver(stage, ctx.step(), e))?;
                    self.correction_lu = Some((ops.mesh_version, lu));
                }
                let Some((_, lu)) = self.correction_lu.as_ref() else {
                    return Err(Error::NotReady("mass matrix factorization missing".to_string()));
                };
                lu.solve(&self.projection_rhs, &mut x)
                    .map_err(|e| Error::from_solver(stage, ctx.step(), e))?;
                SolveStats {
                    iterations: 1,
                    residual: 0.0,
                }
            }
            method => solve_stage(
                ctx,
                &mut self.correction_preconditioner,
                stage,
                method,
                &ops.pressure_mass,
                &mut x,
                &self.projection_rhs,
                &params,
                ops.mesh_version,
                reinit,
            )?,
        };

        Ok((stats, x))
    }
}
