//! Time grid and the trajectory assembled on it.

use serde::{Deserialize, Serialize};

use crate::error::SimulationError;
use crate::model::State;
use crate::traits::StateVector;

/// Relative slack for `ceil((tf − t0)/h)`; absorbs the rounding of spans
/// that are an exact multiple of h.
const GRID_SLACK: f64 = 1e-12;

/// Largest number of grid intervals a run may request.
pub const MAX_GRID_STEPS: usize = 10_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeSpec {
    pub t0: f64,
    pub tf: f64,
    /// Reporting step.
    pub h: f64,
}

impl TimeSpec {
    pub fn new(t0: f64, tf: f64, h: f64) -> Self {
        Self { t0, tf, h }
    }

    pub fn validate(&self) -> Result<(), SimulationError> {
        let finite = self.t0.is_finite() && self.tf.is_finite() && self.h.is_finite();
        if !finite || self.tf < self.t0 || self.h <= 0.0 || !self.steps_fit() {
            return Err(SimulationError::InvalidTimeSpec {
                t0: self.t0,
                tf: self.tf,
                h: self.h,
            });
        }
        Ok(())
    }

    fn steps_fit(&self) -> bool {
        let ratio = (self.tf - self.t0) / self.h;
        ratio.is_finite() && ratio <= MAX_GRID_STEPS as f64
    }

    /// Number of grid intervals N.
    pub fn steps(&self) -> usize {
        let ratio = (self.tf - self.t0) / self.h;
        (ratio * (1.0 - GRID_SLACK)).ceil().max(0.0) as usize
    }

    /// `t_i = t0 + i·h` for `i < N`, then `tf`.
    pub fn grid(&self) -> Vec<f64> {
        let n = self.steps();
        let mut grid: Vec<f64> = (0..n).map(|i| self.t0 + i as f64 * self.h).collect();
        grid.push(self.tf);
        grid
    }
}

/// Time grid paired with one sequence per compartment, all of equal length.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    pub time: Vec<f64>,
    pub susceptible: Vec<f64>,
    pub exposed: Vec<f64>,
    pub infectious: Vec<f64>,
    pub lost: Vec<f64>,
}

impl Trajectory {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            time: Vec::with_capacity(capacity),
            susceptible: Vec::with_capacity(capacity),
            exposed: Vec::with_capacity(capacity),
            infectious: Vec::with_capacity(capacity),
            lost: Vec::with_capacity(capacity),
        }
    }

    pub(crate) fn push(&mut self, t: f64, y: &StateVector) {
        self.time.push(t);
        self.susceptible.push(y[0]);
        self.exposed.push(y[1]);
        self.infectious.push(y[2]);
        self.lost.push(y[3]);
    }

    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    pub fn state_at(&self, index: usize) -> Option<State> {
        Some(State::new(
            *self.susceptible.get(index)?,
            *self.exposed.get(index)?,
            *self.infectious.get(index)?,
            *self.lost.get(index)?,
        ))
    }

    pub fn last_state(&self) -> Option<State> {
        self.state_at(self.len().checked_sub(1)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn grid_covers_span_with_exact_multiple() {
        let span = TimeSpec::new(1.0, 5.0, 0.01);
        assert_eq!(span.steps(), 400);
        let grid = span.grid();
        assert_eq!(grid.len(), 401);
        assert_eq!(grid[0], 1.0);
        assert_eq!(*grid.last().unwrap(), 5.0);
        assert_relative_eq!(grid[200], 3.0, epsilon = 1e-12);
    }

    #[test]
    fn final_point_is_clamped_to_tf() {
        let span = TimeSpec::new(0.0, 1.05, 0.1);
        assert_eq!(span.steps(), 11);
        let grid = span.grid();
        assert_eq!(grid.len(), 12);
        assert_relative_eq!(grid[10], 1.0, epsilon = 1e-12);
        assert_eq!(grid[11], 1.05);
        assert!(grid.windows(2).all(|w| w[1] > w[0]));
    }

    #[test]
    fn empty_span_yields_single_point() {
        let span = TimeSpec::new(2.0, 2.0, 0.5);
        assert!(span.validate().is_ok());
        assert_eq!(span.grid(), vec![2.0]);
    }

    #[test]
    fn rejects_reversed_span_and_non_positive_step() {
        assert!(matches!(
            TimeSpec::new(5.0, 1.0, 0.1).validate(),
            Err(SimulationError::InvalidTimeSpec { .. })
        ));
        assert!(TimeSpec::new(0.0, 1.0, 0.0).validate().is_err());
        assert!(TimeSpec::new(0.0, 1.0, -0.1).validate().is_err());
        assert!(TimeSpec::new(0.0, f64::INFINITY, 0.1).validate().is_err());
    }

    #[test]
    fn rejects_spans_with_too_many_steps() {
        // tf − t0 overflows to infinity.
        assert!(TimeSpec::new(-1e308, 1e308, 1.0).validate().is_err());
        assert!(TimeSpec::new(0.0, 1.0, 1e-300).validate().is_err());
        let cap = MAX_GRID_STEPS as f64;
        assert!(TimeSpec::new(0.0, cap, 1.0).validate().is_ok());
        assert!(TimeSpec::new(0.0, 2.0 * cap, 1.0).validate().is_err());
    }

    #[test]
    fn trajectory_accessors() {
        let mut trajectory = Trajectory::with_capacity(2);
        assert!(trajectory.is_empty());
        assert_eq!(trajectory.last_state(), None);
        trajectory.push(0.0, &StateVector::new(1.0, 2.0, 3.0, 4.0));
        trajectory.push(1.0, &StateVector::new(5.0, 6.0, 7.0, 8.0));
        assert_eq!(trajectory.len(), 2);
        assert_eq!(trajectory.state_at(0), Some(State::new(1.0, 2.0, 3.0, 4.0)));
        assert_eq!(trajectory.last_state(), Some(State::new(5.0, 6.0, 7.0, 8.0)));
        assert_eq!(trajectory.state_at(2), None);
    }
}
