//! Per-step reporting.

use imexflow_core::FieldEntity;
use imexflow_solver::SolveStats;
use log::info;

use crate::error::{Result, SolveStage};

/// Summary of one accepted step.
#[derive(Debug, Clone, PartialEq)]
pub struct StepReport {
    pub step: usize,
    pub time: f64,
    pub step_size: f64,
    pub stats: Vec<(SolveStage, SolveStats)>,
}

impl StepReport {
    pub fn stats_for(&self, stage: SolveStage) -> Option<SolveStats> {
        self.stats.iter().find(|(s, _)| *s == stage).map(|(_, st)| *st)
    }
}

/// Fields visible to an observer after a step.
pub struct StepFields<'a> {
    pub velocity: Option<&'a FieldEntity>,
    pub pressure: Option<&'a FieldEntity>,
    pub temperature: Option<&'a FieldEntity>,
}

/// Called by the driver every `terminal_output_frequency` steps and after
/// the final step.
pub trait StepObserver {
    fn on_step(&mut self, report: &StepReport, fields: &StepFields<'_>) -> Result<()>;
}

/// Observer that ignores every step.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullObserver;

impl StepObserver for NullObserver {
    fn on_step(&mut self, _report: &StepReport, _fields: &StepFields<'_>) -> Result<()> {
        Ok(())
    }
}

/// Logs step, time and iteration counts at `info`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingObserver;

impl StepObserver for LoggingObserver {
    fn on_step(&mut self, report: &StepReport, _fields: &StepFields<'_>) -> Result<()> {
        let iterations: Vec<String> = report
            .stats
            .iter()
            .map(|(stage, stats)| format!("{}: {}", stage, stats.iterations))
            .collect();
        info!(
            "step {:6}  t = {:.6e}  dt = {:.4e}  [{}]",
            report.step,
            report.time,
            report.step_size,
            iterations.join(", ")
        );
        Ok(())
    }
}
