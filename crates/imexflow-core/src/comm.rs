//! Global reductions.
//!
//! Every quantity the time-stepping core derives from more than one cell
//! (CFL minimum, mean values, norms) goes through a [`Communicator`] so a
//! distributed backend can make it collective.

/// Collective reduction interface.
pub trait Communicator: Send + Sync {
    /// Index of this worker.
    fn rank(&self) -> usize;

    /// Number of participating workers.
    fn n_ranks(&self) -> usize;

    /// Global minimum of a locally reduced value.
    fn min(&self, local: f64) -> f64;

    /// Global maximum of a locally reduced value.
    fn max(&self, local: f64) -> f64;

    /// Global sum of a locally reduced value.
    fn sum(&self, local: f64) -> f64;
}

/// Single-worker reductions.
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialCommunicator;

impl Communicator for SerialCommunicator {
    fn rank(&self) -> usize {
        0
    }

    fn n_ranks(&self) -> usize {
        1
    }

    fn min(&self, local: f64) -> f64 {
        local
    }

    fn max(&self, local: f64) -> f64 {
        local
    }

    fn sum(&self, local: f64) -> f64 {
        local
    }
}

/// Global arithmetic mean of a distributed vector slice.
pub fn global_mean(comm: &dyn Communicator, local: &[f64]) -> f64 {
    let total = comm.sum(local.iter().sum());
    let count = comm.sum(local.len() as f64);
    if count > 0.0 { total / count } else { 0.0 }
}

/// Global Euclidean norm of a distributed vector slice.
pub fn global_norm2(comm: &dyn Communicator, local: &[f64]) -> f64 {
    comm.sum(local.iter().map(|v| v * v).sum()).sqrt()
}
