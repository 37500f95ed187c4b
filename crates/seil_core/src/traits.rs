use nalgebra::{Matrix4, Vector4};

use crate::newton::SolveError;

/// Working representation of a compartment state, ordered (S, E, I, L).
pub type StateVector = Vector4<f64>;

/// Right-hand side of an autonomous four-compartment flow.
pub trait VectorField {
    /// Evaluates dy/dt at `y`.
    fn derivative(&self, y: &StateVector) -> StateVector;

    /// Jacobian with entries `j[(i, k)] = ∂F_i/∂y_k`.
    /// Defaults to central differences; override when a closed form exists.
    fn jacobian(&self, y: &StateVector) -> Matrix4<f64> {
        let mut jac = Matrix4::zeros();
        for k in 0..4 {
            let step = f64::EPSILON.cbrt() * y[k].abs().max(1.0);
            let mut forward = *y;
            let mut backward = *y;
            forward[k] += step;
            backward[k] -= step;
            let column = (self.derivative(&forward) - self.derivative(&backward)) / (2.0 * step);
            jac.set_column(k, &column);
        }
        jac
    }
}

/// A one-step method that advances a state by `h`.
pub trait Steppable {
    /// Returns the state one step of size `h` after `y`.
    /// Implicit methods fail when their per-step solve does not converge.
    fn step(
        &self,
        field: &impl VectorField,
        y: &StateVector,
        h: f64,
    ) -> Result<StateVector, SolveError>;
}
