//! # imexflow
//!
//! Incompressible Navier–Stokes and heat transport with a variable-step
//! IMEX incremental pressure-projection method.
//!
//! imexflow provides:
//! - Second-order variable-step IMEX (VSIMEX) time stepping with adaptive
//!   CFL step control
//! - Diffusion, projection and standard/rotational pressure-correction steps
//! - Convection-diffusion of a temperature, coupled by buoyancy
//! - Krylov solvers with Jacobi and ILU(0) preconditioning
//! - A bilinear reference discretization on structured meshes
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use imexflow::prelude::*;
//!
//! let mut params = ProblemParameters::default();
//! params.time_stepping.end_time = 0.05;
//! params.time_stepping.initial_step_size = 0.01;
//!
//! let assembler = Arc::new(
//!     unit_square(4)
//!         .unwrap()
//!         .with_no_slip(BoundaryId::Left)
//!         .with_no_slip(BoundaryId::Right)
//!         .with_no_slip(BoundaryId::Bottom)
//!         .with_velocity_bc(BoundaryId::Top, ConstantVector(vec![1.0, 0.0])),
//! );
//! let flow = NavierStokesProjection::new(params.navier_stokes.clone(), assembler.clone()).unwrap();
//! let mut sim = Simulation::new(
//!     &params,
//!     assembler,
//!     Arc::new(KrylovSolver::new()),
//!     Arc::new(SerialCommunicator),
//! )
//! .unwrap()
//! .with_flow(flow);
//!
//! let mut session = SimulationSession::new();
//! let steps = sim.run(&mut session, &mut NullObserver).unwrap();
//! assert_eq!(steps, 5);
//! ```

// Re-export member crates
pub use imexflow_core as core;
pub use imexflow_fem as fem;
pub use imexflow_projection as projection;
pub use imexflow_solver as solver;

// ============================================================================
// Convenient re-exports from imexflow_core
// ============================================================================

pub use imexflow_core::{
    // Collaborator traits
    CellGeometry,
    Communicator,
    // Constraints
    Constraints,
    // Assembly
    ConvectiveTermWeakForm,
    // Sparse operators
    CsrMatrix,
    Discretization,
    // Errors
    Error as CoreError,
    // Fields
    FieldEntity,
    FlowAssembler,
    HeatAssembler,
    // Functions
    ConstantVector,
    ScalarFunction,
    SerialCommunicator,
    SparsityPattern,
    VectorFunction,
    ZeroVector,
};

// ============================================================================
// Convenient re-exports from imexflow_solver
// ============================================================================

pub use imexflow_solver::{
    // Errors
    Error as SolverError,
    KrylovMethod,
    // Service
    KrylovSolver,
    LinearSolve,
    LinearSolverParameters,
    // Preconditioners
    PreconditionerKind,
    SolveStats,
};

// ============================================================================
// Convenient re-exports from imexflow_fem
// ============================================================================

pub use imexflow_fem::{
    BoundaryId,
    ErrorNorms,
    // Errors
    Error as FemError,
    Q1Assembler,
    StructuredQuadMesh,
    scalar_error,
    unit_square,
    vector_error,
};

// ============================================================================
// Convenient re-exports from imexflow_projection
// ============================================================================

pub use imexflow_projection::{
    CflController,
    ConvergenceTable,
    // Errors
    Error,
    HeatEquation,
    LoggingObserver,
    NavierStokesProjection,
    NullObserver,
    // Parameters
    ProblemParameters,
    ProblemType,
    Result,
    // Driver
    Simulation,
    SimulationSession,
    SolveStage,
    StepObserver,
    StepReport,
    TransportVelocity,
    // Time stepping
    VsimexCoefficients,
    VsimexMethod,
};

/// Re-export of nalgebra's dynamic matrix type.
pub use nalgebra::DMatrix;

// ============================================================================
// Prelude module for convenient imports
// ============================================================================

/// Prelude module containing commonly used types and traits.
///
/// ```rust
/// use imexflow::prelude::*;
/// ```
pub mod prelude {
    // Core types
    pub use crate::{
        CellGeometry, ConstantVector, FlowAssembler, HeatAssembler, ScalarFunction,
        SerialCommunicator, VectorFunction,
    };

    // Solver
    pub use crate::{KrylovSolver, LinearSolverParameters, PreconditionerKind};

    // Discretization
    pub use crate::{BoundaryId, Q1Assembler, unit_square};

    // Time stepping and driver
    pub use crate::{
        HeatEquation, NavierStokesProjection, NullObserver, ProblemParameters, ProblemType,
        Simulation, SimulationSession, StepObserver, TransportVelocity,
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prelude_imports() {
        use crate::prelude::*;

        let params = ProblemParameters::default();
        assert_eq!(params.problem_type, ProblemType::Hydrodynamic);
        let asm = unit_square(2).unwrap().with_no_slip(BoundaryId::Top);
        assert_eq!(asm.n_nodes(), 9);
    }

    #[test]
    fn test_coefficients_reachable() {
        let c = VsimexCoefficients::second_order(0.1, 1.0);
        assert!((c.alpha.iter().sum::<f64>()).abs() < 1e-12);
    }
}
