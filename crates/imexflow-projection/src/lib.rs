//! Variable-step IMEX incremental pressure-projection solver.
//!
//! This crate provides:
//! - The VSIMEX coefficient engine and the discrete time controller
//! - Diffusion, projection and pressure-correction steps of the
//!   incremental projection method, in standard or rotational form
//! - A convection-diffusion solver for the temperature
//! - CFL-based adaptive step-size control
//! - The coupled driver loop with per-run session bookkeeping
//! - Run-time parameters and convergence tables

pub mod cache;
pub mod cfl;
pub mod convergence;
mod diffusion;
pub mod driver;
pub mod error;
pub mod heat;
pub mod navier_stokes;
pub mod observer;
pub mod params;
mod pressure;
mod projection;
pub mod session;
pub mod time;
pub mod vsimex;

pub use cache::{CachedOperator, OperatorStamp, PreconditionerPolicy, PreconditionerSlot};
pub use cfl::CflController;
pub use convergence::{ConvergenceRow, ConvergenceTable};
pub use driver::Simulation;
pub use error::{Error, Result, SolveStage};
pub use heat::{CoupledVelocity, HeatEquation, TransportVelocity};
pub use navier_stokes::NavierStokesProjection;
pub use observer::{LoggingObserver, NullObserver, StepFields, StepObserver, StepReport};
pub use params::{
    ConvectiveTermTimeDiscretization, ConvectiveTermWeakForm, ConvergenceTestParameters,
    ConvergenceTestType, DimensionlessNumbers, HeatEquationParameters, NavierStokesParameters,
    PhysicalConstants, PressureCorrectionScheme, ProblemParameters, ProblemType,
    TimeSteppingParameters,
};
pub use session::{SimulationSession, StageRecord, StepContext};
pub use time::{DiscreteTime, TimeState, VsimexMethod};
pub use vsimex::{VsimexCoefficients, VsimexEngine};
