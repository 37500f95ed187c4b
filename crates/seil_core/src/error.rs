//! Error types surfaced by a simulation run.

use thiserror::Error;

use crate::newton::SolveError;
use crate::trajectory::{Trajectory, MAX_GRID_STEPS};

/// Failure of a single integration run.
///
/// Variants raised after the run has started carry the index of the grid
/// step that failed and the trajectory computed up to (and excluding) that
/// step, so the caller can still display what was reached.
#[derive(Debug, Clone, Error)]
pub enum SimulationError {
    #[error(
        "invalid time span: t0 = {t0}, tf = {tf}, h = {h} \
         (need tf >= t0, h > 0 and at most {max} grid steps)",
        max = MAX_GRID_STEPS
    )]
    InvalidTimeSpec { t0: f64, tf: f64, h: f64 },

    #[error("parameter `{name}` must be a finite non-negative rate (got {value})")]
    InvalidParameters { name: &'static str, value: f64 },

    #[error("initial state must be finite (got {0:?})")]
    InvalidInitialState([f64; 4]),

    #[error("implicit step {step} at t = {time} failed: {source}")]
    ConvergenceFailure {
        step: usize,
        time: f64,
        #[source]
        source: SolveError,
        partial: Box<Trajectory>,
    },

    #[error("state became non-finite at step {step} (t = {time})")]
    NumericOverflow {
        step: usize,
        time: f64,
        partial: Box<Trajectory>,
    },

    #[error("adaptive step size collapsed near t = {time} (report step {step})")]
    StepSizeTooSmall {
        step: usize,
        time: f64,
        partial: Box<Trajectory>,
    },

    #[error("adaptive integrator exceeded its step budget near t = {time} (report step {step})")]
    TooManySteps {
        step: usize,
        time: f64,
        partial: Box<Trajectory>,
    },
}

impl SimulationError {
    /// Trajectory computed before the failure, if the run had started.
    pub fn partial(&self) -> Option<&Trajectory> {
        match self {
            Self::ConvergenceFailure { partial, .. }
            | Self::NumericOverflow { partial, .. }
            | Self::StepSizeTooSmall { partial, .. }
            | Self::TooManySteps { partial, .. } => Some(partial),
            _ => None,
        }
    }

    /// Index of the grid step that failed.
    pub fn step(&self) -> Option<usize> {
        match self {
            Self::ConvergenceFailure { step, .. }
            | Self::NumericOverflow { step, .. }
            | Self::StepSizeTooSmall { step, .. }
            | Self::TooManySteps { step, .. } => Some(*step),
            _ => None,
        }
    }
}
