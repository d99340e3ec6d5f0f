//! Per-run bookkeeping and the context handed to every solve stage.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::time::{Duration, Instant};

use imexflow_core::Communicator;
use imexflow_solver::{LinearSolve, SolveStats};
use log::info;

use crate::error::SolveStage;
use crate::time::VsimexMethod;

/// Accumulated statistics of one solve stage.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StageRecord {
    pub n_solves: usize,
    pub total_iterations: usize,
    pub max_iterations: usize,
    pub last: Option<SolveStats>,
    pub wall_time: Duration,
}

impl StageRecord {
    pub fn mean_iterations(&self) -> f64 {
        if self.n_solves == 0 {
            0.0
        } else {
            self.total_iterations as f64 / self.n_solves as f64
        }
    }
}

/// Timers and counters of one simulation run.
#[derive(Debug, Clone)]
pub struct SimulationSession {
    started: Instant,
    stages: BTreeMap<SolveStage, StageRecord>,
}

impl Default for SimulationSession {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulationSession {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            stages: BTreeMap::new(),
        }
    }

    /// Record one finished solve.
    pub fn record(&mut self, stage: SolveStage, elapsed: Duration, stats: SolveStats) {
        let record = self.stages.entry(stage).or_default();
        record.n_solves += 1;
        record.total_iterations += stats.iterations;
        record.max_iterations = record.max_iterations.max(stats.iterations);
        record.last = Some(stats);
        record.wall_time += elapsed;
    }

    pub fn stage(&self, stage: SolveStage) -> StageRecord {
        self.stages.get(&stage).copied().unwrap_or_default()
    }

    pub fn n_solves(&self, stage: SolveStage) -> usize {
        self.stage(stage).n_solves
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Table of per-stage solves, iterations and wall time.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "{:<22} {:>8} {:>10} {:>8} {:>12}",
            "stage", "solves", "mean its", "max its", "wall [s]"
        );
        for (stage, record) in &self.stages {
            let _ = writeln!(
                out,
                "{:<22} {:>8} {:>10.1} {:>8} {:>12.3}",
                stage.name(),
                record.n_solves,
                record.mean_iterations(),
                record.max_iterations,
                record.wall_time.as_secs_f64()
            );
        }
        let _ = write!(out, "total wall time {:.3} s", self.elapsed().as_secs_f64());
        out
    }

    pub fn log_summary(&self) {
        for line in self.summary().lines() {
            info!("{}", line);
        }
    }
}

/// Everything a solve stage borrows from the driver for one step.
pub struct StepContext<'a> {
    pub time: &'a VsimexMethod,
    pub linear: &'a dyn LinearSolve,
    pub comm: &'a dyn Communicator,
    pub session: &'a mut SimulationSession,
}

impl StepContext<'_> {
    /// Number of the step being computed, starting at 1.
    pub fn step(&self) -> usize {
        self.time.step_number() + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_accumulates() {
        let mut session = SimulationSession::new();
        for iterations in [4, 10, 7] {
            session.record(
                SolveStage::Diffusion,
                Duration::from_millis(2),
                SolveStats {
                    iterations,
                    residual: 1e-9,
                },
            );
        }
        let record = session.stage(SolveStage::Diffusion);
        assert_eq!(record.n_solves, 3);
        assert_eq!(record.max_iterations, 10);
        assert!((record.mean_iterations() - 7.0).abs() < 1e-12);
        assert_eq!(record.wall_time, Duration::from_millis(6));
        assert_eq!(session.n_solves(SolveStage::Projection), 0);
    }

    #[test]
    fn test_summary_lists_stages() {
        let mut session = SimulationSession::new();
        session.record(SolveStage::Projection, Duration::ZERO, SolveStats::default());
        let summary = session.summary();
        assert!(summary.contains("projection step"));
        assert!(!summary.contains("diffusion step"));
    }
}
