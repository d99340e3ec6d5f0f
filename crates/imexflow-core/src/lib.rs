//! Core data structures for imexflow.
//!
//! This crate provides:
//! - Compressed sparse row operators sharing sparsity patterns
//! - Dirichlet/datum constraint sets with symmetric elimination
//! - Field snapshots holding three time levels and their history rotation
//! - Collaborator traits for assembly, cell geometry and global reductions

pub mod assembly;
pub mod comm;
pub mod constraints;
pub mod error;
pub mod field;
pub mod function;
pub mod sparse;
pub mod vector;

pub use assembly::{
    CellGeometry, ConvectiveTermWeakForm, Discretization, FlowAssembler, HeatAssembler,
};
pub use comm::{Communicator, SerialCommunicator, global_mean, global_norm2};
pub use constraints::Constraints;
pub use error::{Error, Result};
pub use field::{FieldEntity, FieldKind};
pub use function::{ConstantVector, ScalarFunction, VectorFunction, ZeroVector};
pub use sparse::{CsrMatrix, SparsityPattern};
