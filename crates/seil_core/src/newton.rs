//! Newton iteration for the small nonlinear systems posed by implicit steps.
//!
//! One solver serves every residual: backward Euler, the trapezoidal rule and
//! the equilibrium search all hand it a [`StepResidual`] and the previous
//! state as initial guess.

use nalgebra::Matrix4;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::traits::StateVector;

/// A stagnated iterate is accepted only if its residual is within this
/// multiple of the tolerance.
const STAGNATION_SLACK: f64 = 1e3;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NewtonSettings {
    pub max_steps: usize,
    pub damping: f64,
    /// Bound on the max-component residual.
    pub tolerance: f64,
    /// Relative bound on the Newton update, scaled by `1 + max|x|`.
    pub step_tolerance: f64,
}

impl Default for NewtonSettings {
    fn default() -> Self {
        Self {
            max_steps: 100,
            damping: 1.0,
            tolerance: 1e-12,
            step_tolerance: 1e-15,
        }
    }
}

/// A residual R(x) whose root is the sought state.
pub trait StepResidual {
    fn residual(&self, x: &StateVector) -> StateVector;

    /// Jacobian ∂R/∂x.
    fn jacobian(&self, x: &StateVector) -> Matrix4<f64>;
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SolveError {
    #[error("Newton solver failed to converge in {iterations} steps (max |R(x)| = {residual})")]
    NotConverged { iterations: usize, residual: f64 },

    #[error("Jacobian is singular at Newton iteration {iterations}")]
    SingularJacobian { iterations: usize },

    #[error("residual became non-finite at Newton iteration {iterations}")]
    NonFinite { iterations: usize },

    #[error("invalid Newton settings: {0}")]
    InvalidSettings(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NewtonOutcome {
    pub state: StateVector,
    pub iterations: usize,
    pub residual_norm: f64,
}

pub fn solve_step(
    problem: &impl StepResidual,
    initial_guess: &StateVector,
    settings: &NewtonSettings,
) -> Result<NewtonOutcome, SolveError> {
    if settings.max_steps == 0 {
        return Err(SolveError::InvalidSettings("max_steps must be greater than zero"));
    }
    if settings.damping <= 0.0 {
        return Err(SolveError::InvalidSettings("damping must be positive"));
    }
    if settings.tolerance <= 0.0 {
        return Err(SolveError::InvalidSettings("tolerance must be positive"));
    }

    let mut state = *initial_guess;
    let mut residual = problem.residual(&state);
    let mut iterations = 0usize;

    loop {
        if !is_finite(&residual) {
            return Err(SolveError::NonFinite { iterations });
        }
        let residual_norm = residual.amax();
        if residual_norm <= settings.tolerance {
            return Ok(NewtonOutcome {
                state,
                iterations,
                residual_norm,
            });
        }

        if iterations >= settings.max_steps {
            return Err(SolveError::NotConverged {
                iterations,
                residual: residual_norm,
            });
        }

        let delta = problem
            .jacobian(&state)
            .lu()
            .solve(&residual)
            .ok_or(SolveError::SingularJacobian { iterations })?;
        let update = delta * settings.damping;
        state -= update;
        iterations += 1;
        residual = problem.residual(&state);

        // Stagnation at round-off: the update no longer moves the iterate and
        // the residual is already close to the tolerance.
        if is_finite(&residual)
            && update.amax() <= settings.step_tolerance * (1.0 + state.amax())
            && residual.amax() <= STAGNATION_SLACK * settings.tolerance
        {
            return Ok(NewtonOutcome {
                state,
                iterations,
                residual_norm: residual.amax(),
            });
        }
    }
}

fn is_finite(v: &StateVector) -> bool {
    v.iter().all(|x| x.is_finite())
}
