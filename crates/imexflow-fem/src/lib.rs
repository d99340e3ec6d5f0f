//! Structured bilinear finite elements for imexflow.
//!
//! A reference discretization of the assembly collaborators: rectangles
//! meshed with `nx x ny` quadrilaterals, Q1 velocity, pressure and
//! temperature, rayon-parallel cell loops, interpolation and error norms.

pub mod assembler;
pub mod element;
pub mod error;
pub mod interpolate;
pub mod mesh;
pub mod parallel;

pub use assembler::{Q1Assembler, unit_square};
pub use element::Q1Element;
pub use error::{Error, Result};
pub use interpolate::{ErrorNorms, interpolate_scalar, interpolate_vector, scalar_error, vector_error};
pub use mesh::{BoundaryId, StructuredQuadMesh};
