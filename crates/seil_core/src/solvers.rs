use crate::newton::SolveError;
use crate::traits::{StateVector, Steppable, VectorField};

/// Forward (explicit) Euler, first order.
#[derive(Debug, Clone, Copy, Default)]
pub struct ForwardEuler;

impl Steppable for ForwardEuler {
    fn step(
        &self,
        field: &impl VectorField,
        y: &StateVector,
        h: f64,
    ) -> Result<StateVector, SolveError> {
        Ok(y + field.derivative(y) * h)
    }
}

/// Heun's method: Euler predictor, trapezoidal corrector. Second order.
#[derive(Debug, Clone, Copy, Default)]
pub struct Rk2;

impl Steppable for Rk2 {
    fn step(
        &self,
        field: &impl VectorField,
        y: &StateVector,
        h: f64,
    ) -> Result<StateVector, SolveError> {
        // k1 = f(y)
        let k1 = field.derivative(y);

        // k2 = f(y + h*k1)
        let predictor = y + k1 * h;
        let k2 = field.derivative(&predictor);

        // y_next = y + h/2 * (k1 + k2)
        Ok(y + (k1 + k2) * (0.5 * h))
    }
}

/// Classic Runge-Kutta 4th Order Solver
#[derive(Debug, Clone, Copy, Default)]
pub struct Rk4;

impl Steppable for Rk4 {
    fn step(
        &self,
        field: &impl VectorField,
        y: &StateVector,
        h: f64,
    ) -> Result<StateVector, SolveError> {
        let half = 0.5 * h;

        // k1 = f(y)
        let k1 = field.derivative(y);

        // k2 = f(y + h*k1/2)
        let k2 = field.derivative(&(y + k1 * half));

        // k3 = f(y + h*k2/2)
        let k3 = field.derivative(&(y + k2 * half));

        // k4 = f(y + h*k3)
        let k4 = field.derivative(&(y + k3 * h));

        // y_next = y + h/6 * (k1 + 2k2 + 2k3 + k4)
        Ok(y + (k1 + k2 * 2.0 + k3 * 2.0 + k4) * (h / 6.0))
    }
}
