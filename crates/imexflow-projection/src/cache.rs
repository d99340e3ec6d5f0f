//! Stamped operator caches and the preconditioner rebuild policy.
//!
//! A cached operator remembers the coefficient version and mesh version it
//! was built for and is recombined only when either differs.

use imexflow_core::CsrMatrix;
use imexflow_solver::{LinearSolve, Preconditioner, PreconditionerKind};
use log::{debug, warn};

/// Versions an operator depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperatorStamp {
    pub coefficients: u64,
    pub mesh: u64,
}

impl OperatorStamp {
    /// Stamp of an operator that depends on the mesh only.
    pub fn mesh_only(mesh: u64) -> Self {
        Self {
            coefficients: 0,
            mesh,
        }
    }
}

/// Matrix rebuilt only when its stamp goes stale.
#[derive(Debug, Clone, Default)]
pub struct CachedOperator {
    matrix: Option<CsrMatrix>,
    stamp: Option<OperatorStamp>,
    n_builds: usize,
}

impl CachedOperator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_stale(&self, stamp: OperatorStamp) -> bool {
        self.matrix.is_none() || self.stamp != Some(stamp)
    }

    /// Return the cached matrix, rebuilding it first if `stamp` differs.
    pub fn get_or_rebuild<E, F>(&mut self, stamp: OperatorStamp, build: F) -> Result<&CsrMatrix, E>
    where
        F: FnOnce() -> Result<CsrMatrix, E>,
    {
        let matrix = match self.matrix.take() {
            Some(matrix) if self.stamp == Some(stamp) => matrix,
            _ => {
                let matrix = build()?;
                self.stamp = Some(stamp);
                self.n_builds += 1;
                matrix
            }
        };
        Ok(&*self.matrix.insert(matrix))
    }

    pub fn get(&self) -> Option<&CsrMatrix> {
        self.matrix.as_ref()
    }

    /// Number of (re)builds so far.
    pub fn n_builds(&self) -> usize {
        self.n_builds
    }

    pub fn invalidate(&mut self) {
        self.matrix = None;
        self.stamp = None;
    }
}

/// Periodic rebuild schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreconditionerPolicy {
    pub update_frequency: usize,
}

impl PreconditionerPolicy {
    pub fn new(update_frequency: usize) -> Self {
        Self {
            update_frequency: update_frequency.max(1),
        }
    }

    /// Whether the step with this number is a scheduled rebuild.
    pub fn should_reinit(&self, step_number: usize) -> bool {
        step_number % self.update_frequency == 0
    }
}

/// Preconditioner handle of one solve stage.
#[derive(Default)]
pub struct PreconditionerSlot {
    handle: Option<Box<dyn Preconditioner>>,
    mesh_version: Option<u64>,
    n_builds: usize,
}

impl PreconditionerSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild regardless of the schedule: nothing built yet, or the mesh
    /// changed since.
    pub fn needs_rebuild(&self, mesh_version: u64) -> bool {
        self.handle.is_none() || self.mesh_version != Some(mesh_version)
    }

    /// Build from `matrix` if requested or required, then hand out the
    /// current preconditioner.
    pub fn prepare(
        &mut self,
        linear: &dyn LinearSolve,
        matrix: &CsrMatrix,
        kind: PreconditionerKind,
        mesh_version: u64,
        reinit: bool,
        label: &str,
    ) -> imexflow_solver::Result<&dyn Preconditioner> {
        if !reinit && self.handle.is_none() {
            warn!("{}: no preconditioner at a non-rebuild step, building one", label);
        }
        let rebuild = reinit || self.needs_rebuild(mesh_version);
        let handle = match self.handle.take() {
            Some(existing) if !rebuild && existing.dim() == matrix.n_rows() => existing,
            _ => {
                let handle = linear.build_preconditioner(matrix, kind)?;
                self.mesh_version = Some(mesh_version);
                self.n_builds += 1;
                debug!("{}: built {} preconditioner (build {})", label, kind, self.n_builds);
                handle
            }
        };
        Ok(&**self.handle.insert(handle))
    }

    pub fn n_builds(&self) -> usize {
        self.n_builds
    }

    pub fn clear(&mut self) {
        self.handle = None;
        self.mesh_version = None;
    }
}
