//! Implicit one-step methods. Each step poses a residual in the unknown next
//! state and hands it to the shared Newton solver, seeded with the previous
//! state.

use log::trace;
use nalgebra::Matrix4;

use crate::newton::{solve_step, NewtonSettings, SolveError, StepResidual};
use crate::traits::{StateVector, Steppable, VectorField};

/// Backward Euler: y₁ = y₀ + h·F(y₁).
#[derive(Debug, Clone, Copy, Default)]
pub struct BackwardEuler {
    pub newton: NewtonSettings,
}

impl BackwardEuler {
    pub fn new(newton: NewtonSettings) -> Self {
        Self { newton }
    }
}

/// Trapezoidal rule ("modified Euler"): y₁ = y₀ + h/2·(F(y₀) + F(y₁)).
#[derive(Debug, Clone, Copy, Default)]
pub struct Trapezoidal {
    pub newton: NewtonSettings,
}

impl Trapezoidal {
    pub fn new(newton: NewtonSettings) -> Self {
        Self { newton }
    }
}

/// R(y₁) = base + weight·F(y₁) − y₁.
///
/// Backward Euler uses `base = y₀`, `weight = h`; the trapezoidal rule uses
/// `base = y₀ + h/2·F(y₀)`, `weight = h/2`.
struct ImplicitResidual<'a, F> {
    field: &'a F,
    base: StateVector,
    weight: f64,
}

impl<F: VectorField> StepResidual for ImplicitResidual<'_, F> {
    fn residual(&self, x: &StateVector) -> StateVector {
        self.base + self.field.derivative(x) * self.weight - x
    }

    fn jacobian(&self, x: &StateVector) -> Matrix4<f64> {
        self.field.jacobian(x) * self.weight - Matrix4::identity()
    }
}

fn solve_implicit(
    residual: &ImplicitResidual<'_, impl VectorField>,
    previous: &StateVector,
    settings: &NewtonSettings,
) -> Result<StateVector, SolveError> {
    let outcome = solve_step(residual, previous, settings)?;
    trace!(
        "implicit step converged in {} iterations (max |R| = {:e})",
        outcome.iterations,
        outcome.residual_norm
    );
    Ok(outcome.state)
}

impl Steppable for BackwardEuler {
    fn step(
        &self,
        field: &impl VectorField,
        y: &StateVector,
        h: f64,
    ) -> Result<StateVector, SolveError> {
        let residual = ImplicitResidual {
            field,
            base: *y,
            weight: h,
        };
        solve_implicit(&residual, y, &self.newton)
    }
}

impl Steppable for Trapezoidal {
    fn step(
        &self,
        field: &impl VectorField,
        y: &StateVector,
        h: f64,
    ) -> Result<StateVector, SolveError> {
        let half = 0.5 * h;
        let residual = ImplicitResidual {
            field,
            base: y + field.derivative(y) * half,
            weight: half,
        };
        solve_implicit(&residual, y, &self.newton)
    }
}
