//! Collaborator traits for operator assembly and mesh geometry.
//!
//! The time-stepping core never integrates anything itself. It asks an
//! assembler for the operators and load vectors it needs and combines them
//! with the IMEX weights. Operators assembled on the same space must share
//! one sparsity pattern so they can be summed in place.
//!
//! Velocity vectors use the assembler's own dof layout; the core only
//! requires that transport fields passed back to the assembler are vectors
//! in the velocity layout.

use serde::{Deserialize, Serialize};

use crate::constraints::Constraints;
use crate::error::Result;
use crate::function::VectorFunction;
use crate::sparse::CsrMatrix;

/// Weak form of the convective term `(w·∇)u` for a transport field `w`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConvectiveTermWeakForm {
    /// `((w·∇)φ_j, φ_i)`.
    Standard,
    /// `((w·∇)φ_j + ½(∇·w)φ_j, φ_i)`, energy neutral for any `w`.
    #[default]
    SkewSymmetric,
    /// `((w·∇)φ_j + (∇·w)φ_j, φ_i)`, i.e. `∇·(w ⊗ u)`.
    Divergence,
    /// `((∇×φ_j)×w, φ_i)`; the kinetic energy gradient is left to the
    /// pressure. Scalar fields have no curl and use the standard form.
    Rotational,
}

impl ConvectiveTermWeakForm {
    /// Weight of the `(∇·w)φ_j` term.
    pub fn divergence_weight(self) -> f64 {
        match self {
            ConvectiveTermWeakForm::Standard | ConvectiveTermWeakForm::Rotational => 0.0,
            ConvectiveTermWeakForm::SkewSymmetric => 0.5,
            ConvectiveTermWeakForm::Divergence => 1.0,
        }
    }
}

/// State shared by every assembler.
pub trait Discretization: Send + Sync {
    /// Changes whenever the mesh or dof numbering changes.
    fn mesh_version(&self) -> u64;

    /// Spatial dimension.
    fn dim(&self) -> usize;
}

/// Operators of the momentum and pressure equations.
pub trait FlowAssembler: Discretization {
    fn n_velocity_dofs(&self) -> usize;

    fn n_pressure_dofs(&self) -> usize;

    /// `(φ_i, φ_j)` on the velocity space.
    fn velocity_mass_matrix(&self) -> Result<CsrMatrix>;

    /// `(∇φ_i, ∇φ_j)` on the velocity space.
    fn velocity_stiffness_matrix(&self) -> Result<CsrMatrix>;

    /// Advection in the given weak form for a transport field `w` in
    /// velocity layout. Shares the mass pattern.
    fn velocity_advection_matrix(
        &self,
        transport: &[f64],
        form: ConvectiveTermWeakForm,
    ) -> Result<CsrMatrix>;

    /// Velocity rows by pressure columns: `-(∇·φ_i, ψ_j)`.
    ///
    /// Its transpose applied to a velocity gives `-(∇·u, ψ_j)`.
    fn pressure_gradient_matrix(&self) -> Result<CsrMatrix>;

    /// `(ψ_i, ψ_j)` on the pressure space.
    fn pressure_mass_matrix(&self) -> Result<CsrMatrix>;

    /// `(∇ψ_i, ∇ψ_j)` on the pressure space.
    fn pressure_laplace_matrix(&self) -> Result<CsrMatrix>;

    /// Velocity boundary values at `time`.
    fn velocity_constraints(&self, time: f64) -> Constraints;

    /// Pressure datum constraints (anchors of the pure-Neumann problem).
    fn pressure_constraints(&self) -> Constraints;

    /// Whether the pressure is only determined up to a constant.
    fn pressure_needs_normalization(&self) -> bool;

    /// `(f(t), φ_i)` or `None` without a body force.
    fn body_force_load(&self, time: f64) -> Option<Vec<f64>>;

    /// Rotation operator `(e_Ω × φ_j, φ_i)` for the Coriolis term.
    fn coriolis_matrix(&self) -> Option<CsrMatrix> {
        None
    }

    /// Temperature-to-velocity operator `(ψ_j e_g, φ_i)` with `e_g` the
    /// unit vector opposite to gravity.
    fn buoyancy_matrix(&self) -> Option<CsrMatrix> {
        None
    }

    /// Right-hand side `(F, ∇ψ_i)` of the initial pressure problem with
    /// `F = body_force_scale * f(t) + buoyancy_scale * θ e_g`.
    fn poisson_prestep_load(
        &self,
        time: f64,
        body_force_scale: f64,
        buoyancy: Option<(f64, &[f64])>,
    ) -> Vec<f64>;
}

/// Operators of the heat equation.
pub trait HeatAssembler: Discretization {
    fn n_temperature_dofs(&self) -> usize;

    fn temperature_mass_matrix(&self) -> Result<CsrMatrix>;

    fn temperature_stiffness_matrix(&self) -> Result<CsrMatrix>;

    /// Advection by a transport field in velocity layout.
    fn temperature_advection_matrix(
        &self,
        transport: &[f64],
        form: ConvectiveTermWeakForm,
    ) -> Result<CsrMatrix>;

    fn temperature_constraints(&self, time: f64) -> Constraints;

    /// `(r(t), ψ_i)` or `None` without a heat source.
    fn heat_source_load(&self, time: f64) -> Option<Vec<f64>>;

    /// Boundary flux `(q(t), ψ_i)_Γ` with `q = ∇θ·n` on Neumann sides, or
    /// `None` when every side is insulated or constrained.
    fn temperature_neumann_load(&self, _time: f64) -> Option<Vec<f64>> {
        None
    }

    /// Interpolate an analytic velocity into the transport layout.
    fn interpolate_transport(&self, velocity: &dyn VectorFunction, time: f64) -> Vec<f64>;
}

/// Cell-wise geometry used by the step-size controller.
pub trait CellGeometry: Send + Sync {
    /// Locally owned active cells.
    fn n_active_cells(&self) -> usize;

    fn cell_diameter(&self, cell: usize) -> f64;

    /// Largest velocity magnitude on a cell for a velocity-layout vector.
    fn max_velocity_magnitude(&self, cell: usize, velocity: &[f64]) -> f64;
}
