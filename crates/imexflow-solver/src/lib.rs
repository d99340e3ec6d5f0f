//! Linear solvers for imexflow.
//!
//! This crate provides:
//! - Restarted, right-preconditioned GMRES for non-symmetric systems
//! - Preconditioned conjugate gradients for SPD systems
//! - Identity, Jacobi and ILU(0) preconditioners
//! - Dense LU for small systems and cached direct mass solves
//! - The [`LinearSolve`] service trait consumed by the time-stepping core

pub mod cg;
pub mod control;
pub mod direct;
pub mod error;
pub mod gmres;
pub mod ilu;
pub mod operator;
pub mod preconditioner;
pub mod service;

pub use cg::{CgConfig, CgResult, solve_cg};
pub use control::{KrylovMethod, LinearSolverParameters, SolveStats};
pub use direct::DenseLu;
pub use error::{Error, Result};
pub use gmres::{GmresConfig, GmresResult, solve_gmres};
pub use ilu::{Ilu0Preconditioner, IluError};
pub use operator::LinearOperator;
pub use preconditioner::{
    IdentityPreconditioner, JacobiPreconditioner, Preconditioner, PreconditionerKind,
    build_preconditioner,
};
pub use service::{KrylovSolver, LinearSolve};
