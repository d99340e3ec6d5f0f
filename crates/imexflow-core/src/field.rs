//! Field snapshots with three time levels.

use crate::constraints::Constraints;
use crate::error::{Error, Result};

/// Kind of a discrete field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Scalar,
    Vector { components: usize },
}

impl FieldKind {
    pub fn n_components(self) -> usize {
        match self {
            FieldKind::Scalar => 1,
            FieldKind::Vector { components } => components,
        }
    }
}

/// Degree-of-freedom vectors of one physical field.
///
/// `solution` holds the value at the time just computed, `old_solution` and
/// `old_old_solution` the two preceding accepted values. The `distributed`
/// vector is scratch space for solves.
#[derive(Debug, Clone)]
pub struct FieldEntity {
    name: String,
    kind: FieldKind,
    solution: Vec<f64>,
    old_solution: Vec<f64>,
    old_old_solution: Vec<f64>,
    distributed: Vec<f64>,
    constraints: Constraints,
    /// Set when `solution` is written, cleared by the history rotation.
    updated: bool,
}

impl FieldEntity {
    pub fn new(name: impl Into<String>, kind: FieldKind, n_dofs: usize) -> Self {
        Self {
            name: name.into(),
            kind,
            solution: vec![0.0; n_dofs],
            old_solution: vec![0.0; n_dofs],
            old_old_solution: vec![0.0; n_dofs],
            distributed: vec![0.0; n_dofs],
            constraints: Constraints::new(),
            updated: false,
        }
    }

    pub fn scalar(name: impl Into<String>, n_dofs: usize) -> Self {
        Self::new(name, FieldKind::Scalar, n_dofs)
    }

    pub fn vector(name: impl Into<String>, components: usize, n_dofs: usize) -> Self {
        Self::new(name, FieldKind::Vector { components }, n_dofs)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> FieldKind {
        self.kind
    }

    pub fn n_dofs(&self) -> usize {
        self.solution.len()
    }

    pub fn solution(&self) -> &[f64] {
        &self.solution
    }

    pub fn old_solution(&self) -> &[f64] {
        &self.old_solution
    }

    pub fn old_old_solution(&self) -> &[f64] {
        &self.old_old_solution
    }

    /// Mutable access to the newest level; marks the field as updated.
    pub fn solution_mut(&mut self) -> &mut [f64] {
        self.updated = true;
        &mut self.solution
    }

    /// Replace the newest level with a solved vector.
    pub fn set_solution(&mut self, values: &[f64]) -> Result<()> {
        self.check_len(values.len())?;
        self.solution.copy_from_slice(values);
        self.updated = true;
        Ok(())
    }

    /// Initialize every time level with the same values.
    pub fn set_initial_condition(&mut self, values: &[f64]) -> Result<()> {
        self.check_len(values.len())?;
        self.solution.copy_from_slice(values);
        self.old_solution.copy_from_slice(values);
        self.old_old_solution.copy_from_slice(values);
        self.updated = false;
        Ok(())
    }

    pub fn distributed_mut(&mut self) -> &mut Vec<f64> {
        &mut self.distributed
    }

    pub fn constraints(&self) -> &Constraints {
        &self.constraints
    }

    pub fn set_constraints(&mut self, constraints: Constraints) -> Result<()> {
        constraints.check_range(self.n_dofs())?;
        self.constraints = constraints;
        Ok(())
    }

    /// Whether `solution` was written since the last rotation.
    pub fn is_updated(&self) -> bool {
        self.updated
    }

    /// Shift the history: old-old takes old, old takes solution.
    ///
    /// `solution` keeps its value so it serves as the initial guess of the
    /// next solve. Rotating twice without writing `solution` in between is
    /// rejected.
    pub fn update_solution_vectors(&mut self) -> Result<()> {
        if !self.updated {
            return Err(Error::HistoryAlreadyRotated {
                field: self.name.clone(),
            });
        }
        std::mem::swap(&mut self.old_old_solution, &mut self.old_solution);
        self.old_solution.copy_from_slice(&self.solution);
        self.updated = false;
        Ok(())
    }

    /// Size all levels to a new dof count and zero them.
    pub fn reinit(&mut self, n_dofs: usize) {
        for v in [
            &mut self.solution,
            &mut self.old_solution,
            &mut self.old_old_solution,
            &mut self.distributed,
        ] {
            v.clear();
            v.resize(n_dofs, 0.0);
        }
        self.constraints = Constraints::new();
        self.updated = false;
    }

    fn check_len(&self, len: usize) -> Result<()> {
        if len != self.n_dofs() {
            return Err(Error::DimensionMismatch {
                expected: self.n_dofs(),
                actual: len,
            });
        }
        Ok(())
    }
}
