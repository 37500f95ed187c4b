//! Run requests: method selection and the driver that assembles a trajectory.

use std::fmt;
use std::str::FromStr;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::adaptive::{AdaptiveFailure, AdaptiveFailureKind, AdaptiveSettings, DormandPrince};
use crate::error::SimulationError;
use crate::implicit::{BackwardEuler, Trapezoidal};
use crate::model::{Parameters, State};
use crate::newton::NewtonSettings;
use crate::solvers::{ForwardEuler, Rk2, Rk4};
use crate::trajectory::{TimeSpec, Trajectory};
use crate::traits::{StateVector, Steppable, VectorField};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    ForwardEuler,
    BackwardEuler,
    Trapezoidal,
    Rk2,
    Rk4,
    AdaptiveRk45,
}

impl Method {
    pub const ALL: [Method; 6] = [
        Method::ForwardEuler,
        Method::BackwardEuler,
        Method::Trapezoidal,
        Method::Rk2,
        Method::Rk4,
        Method::AdaptiveRk45,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Method::ForwardEuler => "forward_euler",
            Method::BackwardEuler => "backward_euler",
            Method::Trapezoidal => "trapezoidal",
            Method::Rk2 => "rk2",
            Method::Rk4 => "rk4",
            Method::AdaptiveRk45 => "adaptive_rk45",
        }
    }

    /// Global convergence order.
    pub fn order(self) -> u32 {
        match self {
            Method::ForwardEuler | Method::BackwardEuler => 1,
            Method::Trapezoidal | Method::Rk2 => 2,
            Method::Rk4 => 4,
            Method::AdaptiveRk45 => 5,
        }
    }

    pub fn is_implicit(self) -> bool {
        matches!(self, Method::BackwardEuler | Method::Trapezoidal)
    }

    fn build(self, settings: &SimulationSettings) -> Integrator {
        match self {
            Method::ForwardEuler => Integrator::ForwardEuler(ForwardEuler),
            Method::BackwardEuler => {
                Integrator::BackwardEuler(BackwardEuler::new(settings.newton))
            }
            Method::Trapezoidal => Integrator::Trapezoidal(Trapezoidal::new(settings.newton)),
            Method::Rk2 => Integrator::Rk2(Rk2),
            Method::Rk4 => Integrator::Rk4(Rk4),
            Method::AdaptiveRk45 => {
                Integrator::Adaptive(DormandPrince::new(settings.adaptive))
            }
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Method {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "forward_euler" | "euler" => Ok(Method::ForwardEuler),
            "backward_euler" => Ok(Method::BackwardEuler),
            "trapezoidal" | "modified_euler" => Ok(Method::Trapezoidal),
            "rk2" => Ok(Method::Rk2),
            "rk4" => Ok(Method::Rk4),
            "adaptive_rk45" | "rk45" => Ok(Method::AdaptiveRk45),
            other => Err(format!("Unknown integration method \"{other}\"")),
        }
    }
}

/// Tuning for the implicit solves and the adaptive controller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SimulationSettings {
    #[serde(default)]
    pub newton: NewtonSettings,
    #[serde(default)]
    pub adaptive: AdaptiveSettings,
}

enum Integrator {
    ForwardEuler(ForwardEuler),
    BackwardEuler(BackwardEuler),
    Trapezoidal(Trapezoidal),
    Rk2(Rk2),
    Rk4(Rk4),
    Adaptive(DormandPrince),
}

/// Runs `method` with default settings.
pub fn simulate(
    params: &Parameters,
    initial: &State,
    span: &TimeSpec,
    method: Method,
) -> Result<Trajectory, SimulationError> {
    simulate_with(params, initial, span, method, &SimulationSettings::default())
}

pub fn simulate_with(
    params: &Parameters,
    initial: &State,
    span: &TimeSpec,
    method: Method,
    settings: &SimulationSettings,
) -> Result<Trajectory, SimulationError> {
    span.validate()?;
    params.validate()?;
    if !initial.is_finite() {
        return Err(SimulationError::InvalidInitialState(initial.to_array()));
    }

    let grid = span.grid();
    debug!(
        "{method}: integrating t = {}..{} with h = {} ({} steps)",
        span.t0,
        span.tf,
        span.h,
        grid.len() - 1
    );

    let y0 = StateVector::from(*initial);
    let result = match method.build(settings) {
        Integrator::ForwardEuler(s) => run_fixed(&s, params, &y0, &grid),
        Integrator::BackwardEuler(s) => run_fixed(&s, params, &y0, &grid),
        Integrator::Trapezoidal(s) => run_fixed(&s, params, &y0, &grid),
        Integrator::Rk2(s) => run_fixed(&s, params, &y0, &grid),
        Integrator::Rk4(s) => run_fixed(&s, params, &y0, &grid),
        Integrator::Adaptive(dp) => run_adaptive(&dp, params, &y0, &grid),
    };

    match &result {
        Ok(trajectory) => debug!("{method}: finished with {} points", trajectory.len()),
        Err(err) => warn!("{method}: run aborted: {err}"),
    }
    result
}

/// One stepper call per grid interval; the clamped last interval may be
/// shorter than h.
fn run_fixed(
    stepper: &impl Steppable,
    field: &impl VectorField,
    y0: &StateVector,
    grid: &[f64],
) -> Result<Trajectory, SimulationError> {
    let mut trajectory = Trajectory::with_capacity(grid.len());
    trajectory.push(grid[0], y0);
    let mut y = *y0;

    for (index, window) in grid.windows(2).enumerate() {
        let step = index + 1;
        let (t, t_next) = (window[0], window[1]);
        y = match stepper.step(field, &y, t_next - t) {
            Ok(next) => next,
            Err(source) => {
                return Err(SimulationError::ConvergenceFailure {
                    step,
                    time: t_next,
                    source,
                    partial: Box::new(trajectory),
                })
            }
        };
        if !y.iter().all(|v| v.is_finite()) {
            return Err(SimulationError::NumericOverflow {
                step,
                time: t_next,
                partial: Box::new(trajectory),
            });
        }
        trajectory.push(t_next, &y);
    }

    Ok(trajectory)
}

fn run_adaptive(
    integrator: &DormandPrince,
    field: &impl VectorField,
    y0: &StateVector,
    grid: &[f64],
) -> Result<Trajectory, SimulationError> {
    let states = match integrator.integrate(field, y0, grid) {
        Ok(output) => {
            debug!(
                "adaptive run: {} accepted, {} rejected steps, {} evaluations",
                output.stats.accepted, output.stats.rejected, output.stats.evaluations
            );
            output.states
        }
        Err(AdaptiveFailure {
            kind, time, states, ..
        }) => {
            let step = states.len();
            let partial = Box::new(assemble(grid, &states));
            return Err(match kind {
                AdaptiveFailureKind::StepSizeTooSmall => SimulationError::StepSizeTooSmall {
                    step,
                    time,
                    partial,
                },
                AdaptiveFailureKind::TooManySteps => SimulationError::TooManySteps {
                    step,
                    time,
                    partial,
                },
            });
        }
    };

    if let Some(step) = states.iter().position(|y| !y.iter().all(|v| v.is_finite())) {
        return Err(SimulationError::NumericOverflow {
            step,
            time: grid[step],
            partial: Box::new(assemble(grid, &states[..step])),
        });
    }
    Ok(assemble(grid, &states))
}

fn assemble(grid: &[f64], states: &[StateVector]) -> Trajectory {
    let mut trajectory = Trajectory::with_capacity(states.len());
    for (t, y) in grid.iter().zip(states) {
        trajectory.push(*t, y);
    }
    trajectory
}
