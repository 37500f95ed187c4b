use nalgebra::{DMatrix, Matrix4};
use num_complex::Complex;
use serde::{Deserialize, Serialize};

use crate::model::{Parameters, State};
use crate::newton::{solve_step, NewtonSettings, SolveError, StepResidual};
use crate::traits::{StateVector, VectorField};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stability {
    /// Every eigenvalue has negative real part.
    Stable,
    /// At least one eigenvalue has positive real part.
    Unstable,
    Marginal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EquilibriumResult {
    pub state: State,
    pub residual_norm: f64,
    pub iterations: usize,
    /// Row-major Jacobian at the equilibrium.
    pub jacobian: Vec<f64>,
    pub eigenvalues: Vec<Complex<f64>>,
    pub stability: Stability,
}

/// Real parts within this distance of zero count as marginal.
const MARGINAL_BAND: f64 = 1e-10;

/// The vector field itself is the residual: F(x*) = 0.
struct Stationary<'a>(&'a Parameters);

impl StepResidual for Stationary<'_> {
    fn residual(&self, x: &StateVector) -> StateVector {
        self.0.derivative(x)
    }

    fn jacobian(&self, x: &StateVector) -> Matrix4<f64> {
        self.0.jacobian(x)
    }
}

/// (Λ/μ, 0, 0, 0); `None` without natural death.
pub fn disease_free_equilibrium(params: &Parameters) -> Option<State> {
    (params.natural_death > 0.0)
        .then(|| State::new(params.recruitment / params.natural_death, 0.0, 0.0, 0.0))
}

pub fn solve_equilibrium(
    params: &Parameters,
    initial_guess: &State,
    settings: &NewtonSettings,
) -> Result<EquilibriumResult, SolveError> {
    let outcome = solve_step(&Stationary(params), &StateVector::from(*initial_guess), settings)?;

    let jacobian = params.jacobian(&outcome.state);
    let eigenvalues = compute_eigenvalues(&jacobian);
    let stability = classify(&eigenvalues);

    Ok(EquilibriumResult {
        state: State::from(outcome.state),
        residual_norm: outcome.residual_norm,
        iterations: outcome.iterations,
        jacobian: jacobian.transpose().iter().copied().collect(),
        eigenvalues,
        stability,
    })
}

fn compute_eigenvalues(jacobian: &Matrix4<f64>) -> Vec<Complex<f64>> {
    let matrix = DMatrix::from_iterator(4, 4, jacobian.iter().copied());
    matrix.complex_eigenvalues().iter().copied().collect()
}

fn classify(eigenvalues: &[Complex<f64>]) -> Stability {
    let max_re = eigenvalues
        .iter()
        .map(|lambda| lambda.re)
        .fold(f64::NEG_INFINITY, f64::max);
    if max_re < -MARGINAL_BAND {
        Stability::Stable
    } else if max_re > MARGINAL_BAND {
        Stability::Unstable
    } else {
        Stability::Marginal
    }
}
