//! Projection step: the pressure increment `φ`.
//!
//! `(∇φ, ∇q) = -(∇·u^{n+1}, q)` on the pressure space with the datum
//! anchored, then `φ ← α0 φ`. The right-hand side is kept for the
//! rotational pressure correction.

use std::time::Instant;

use imexflow_core::{Communicator, global_norm2};
use imexflow_solver::{KrylovMethod, SolveStats};
use log::info;

use crate::error::{Error, Result, SolveStage};
use crate::navier_stokes::{NavierStokesProjection, solve_stage};
use crate::session::StepContext;

impl NavierStokesProjection {
    /// Solve for `φ^{n+1}`; the previous `φ` moves to `old_phi`.
    pub fn solve_projection_step(
        &mut self,
        ctx: &mut StepContext<'_>,
        reinit_preconditioner: bool,
    ) -> Result<SolveStats> {
        let timer = Instant::now();
        let stage = SolveStage::Projection;
        self.ensure_projection_matrix()?;
        let (Some(ops), Some(matrix)) = (self.operators.as_ref(), self.projection_matrix.get()) else {
            return Err(Error::NotReady("projection operators missing".to_string()));
        };

        let n = matrix.n_rows();
        self.projection_rhs.resize(n, 0.0);
        ops.gradient
            .transpose_mul_vec(self.velocity.solution(), &mut self.projection_rhs);
        if self.parameters.verbose {
            info!(
                "step {:5}: provisional divergence {:.3e}",
                ctx.step(),
                global_norm2(ctx.comm, &self.projection_rhs)
            );
        }

        let constraints = self.assembler.pressure_constraints().homogenized();
        let mut rhs = self.projection_rhs.clone();
        constraints.set_zero(&mut rhs);

        let mut phi = vec![0.0; n];
        let stats = solve_stage(
            ctx,
            &mut self.projection_preconditioner,
            stage,
            KrylovMethod::Cg,
            matrix,
            &mut phi,
            &rhs,
            &self.parameters.projection_step_solver,
            ops.mesh_version,
            reinit_preconditioner,
        )?;
        constraints.distribute(&mut phi);

        let alpha0 = ctx.time.coefficients().alpha[0];
        phi.iter_mut().for_each(|v| *v *= alpha0);
        self.normalize(ctx, &mut phi);

        std::mem::swap(&mut self.old_phi, &mut self.phi);
        self.phi = phi;

        ctx.session.record(stage, timer.elapsed(), stats);
        self.log_solve(ctx, stage, &stats);
        Ok(stats)
    }

    /// Global norm of `-(∇·u, ψ_j)` for the velocity held in `solution`,
    /// zero for a discretely solenoidal field.
    pub fn divergence_norm(&self, comm: &dyn Communicator) -> Result<f64> {
        let gradient = self.assembler.pressure_gradient_matrix()?;
        let mut divergence = vec![0.0; gradient.n_cols()];
        gradient.transpose_mul_vec(self.velocity.solution(), &mut divergence);
        Ok(global_norm2(comm, &divergence))
    }
}
