//! The SEIL compartment model: parameters, state and its vector field.
//!
//! ```text
//! dS = Λ − βS(I+δL) − μS
//! dE = β(1−ρ)S(I+δL) + r₂I − (μ + k(1−r₁))E
//! dI = βρS(I+δL) + k(1−r₁)E + γL − (μ + d₁ + φ(1−r₂) + r₂)I
//! dL = φ(1−r₂)I − (μ + d₂ + γ)L
//! ```
//!
//! No non-negativity clamp is applied: negative intermediate populations are
//! returned as computed.

use nalgebra::Matrix4;
use serde::{Deserialize, Serialize};

use crate::error::SimulationError;
use crate::traits::{StateVector, VectorField};

/// Twelve epidemiological rates, immutable for the duration of a run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Parameters {
    /// Λ
    pub recruitment: f64,
    /// β
    pub transmission: f64,
    /// δ, fraction of lost-to-follow-up individuals that mix with susceptibles.
    pub lost_mixing: f64,
    /// ρ (`p`), proportion of new infections that progress fast.
    pub fast_progression: f64,
    /// μ
    pub natural_death: f64,
    /// k, exposed to infectious progression rate.
    pub progression: f64,
    /// r₁, chemoprophylaxis efficacy.
    pub chemoprophylaxis: f64,
    /// r₂, successful therapy rate.
    pub therapy_success: f64,
    /// φ, rate at which infectious individuals are lost to follow-up.
    pub loss_of_trace: f64,
    /// γ, return-to-care rate.
    pub return_to_care: f64,
    /// d₁
    pub infectious_death: f64,
    /// d₂
    pub lost_death: f64,
}

impl Parameters {
    /// Field names in transfer-record order (Λ,β,δ,ρ,μ,k,r1,r2,φ,γ,d1,d2).
    pub const NAMES: [&'static str; 12] = [
        "recruitment",
        "transmission",
        "lost_mixing",
        "fast_progression",
        "natural_death",
        "progression",
        "chemoprophylaxis",
        "therapy_success",
        "loss_of_trace",
        "return_to_care",
        "infectious_death",
        "lost_death",
    ];

    /// All rates zero: every derivative vanishes.
    pub fn zero() -> Self {
        Self::from_record([0.0; 12])
    }

    pub fn from_record(record: [f64; 12]) -> Self {
        let [
            recruitment,
            transmission,
            lost_mixing,
            fast_progression,
            natural_death,
            progression,
            chemoprophylaxis,
            therapy_success,
            loss_of_trace,
            return_to_care,
            infectious_death,
            lost_death,
        ] = record;
        Self {
            recruitment,
            transmission,
            lost_mixing,
            fast_progression,
            natural_death,
            progression,
            chemoprophylaxis,
            therapy_success,
            loss_of_trace,
            return_to_care,
            infectious_death,
            lost_death,
        }
    }

    pub fn to_record(&self) -> [f64; 12] {
        [
            self.recruitment,
            self.transmission,
            self.lost_mixing,
            self.fast_progression,
            self.natural_death,
            self.progression,
            self.chemoprophylaxis,
            self.therapy_success,
            self.loss_of_trace,
            self.return_to_care,
            self.infectious_death,
            self.lost_death,
        ]
    }

    /// Rejects negative or non-finite rates.
    pub fn validate(&self) -> Result<(), SimulationError> {
        for (name, value) in Self::NAMES.iter().zip(self.to_record()) {
            if !value.is_finite() || value < 0.0 {
                return Err(SimulationError::InvalidParameters { name, value });
            }
        }
        Ok(())
    }

    /// Force of infection weight I + δL.
    fn contact(&self, y: &StateVector) -> f64 {
        y[2] + self.lost_mixing * y[3]
    }

    /// k(1 − r₁), the effective exposed to infectious flow rate.
    fn activation(&self) -> f64 {
        self.progression * (1.0 - self.chemoprophylaxis)
    }

    /// φ(1 − r₂), the effective infectious to lost flow rate.
    fn dropout(&self) -> f64 {
        self.loss_of_trace * (1.0 - self.therapy_success)
    }

    fn exposed_outflow(&self) -> f64 {
        self.natural_death + self.activation()
    }

    fn infectious_outflow(&self) -> f64 {
        self.natural_death + self.infectious_death + self.dropout() + self.therapy_success
    }

    fn lost_outflow(&self) -> f64 {
        self.natural_death + self.lost_death + self.return_to_care
    }
}

impl From<[f64; 12]> for Parameters {
    fn from(record: [f64; 12]) -> Self {
        Self::from_record(record)
    }
}

impl VectorField for Parameters {
    fn derivative(&self, y: &StateVector) -> StateVector {
        let (s, e, i, l) = (y[0], y[1], y[2], y[3]);
        let infection = self.transmission * s * self.contact(y);
        let rho = self.fast_progression;

        StateVector::new(
            self.recruitment - infection - self.natural_death * s,
            (1.0 - rho) * infection + self.therapy_success * i - self.exposed_outflow() * e,
            rho * infection + self.activation() * e + self.return_to_care * l
                - self.infectious_outflow() * i,
            self.dropout() * i - self.lost_outflow() * l,
        )
    }

    fn jacobian(&self, y: &StateVector) -> Matrix4<f64> {
        let s = y[0];
        let beta = self.transmission;
        let rho = self.fast_progression;
        let delta = self.lost_mixing;
        // ∂(βS(I+δL)) with respect to S, I and L.
        let d_s = beta * self.contact(y);
        let d_i = beta * s;
        let d_l = beta * delta * s;

        Matrix4::new(
            -d_s - self.natural_death,
            0.0,
            -d_i,
            -d_l,
            (1.0 - rho) * d_s,
            -self.exposed_outflow(),
            (1.0 - rho) * d_i + self.therapy_success,
            (1.0 - rho) * d_l,
            rho * d_s,
            self.activation(),
            rho * d_i - self.infectious_outflow(),
            rho * d_l + self.return_to_care,
            0.0,
            0.0,
            self.dropout(),
            -self.lost_outflow(),
        )
    }
}

/// Compartment populations (S, E, I, L).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct State {
    pub susceptible: f64,
    pub exposed: f64,
    pub infectious: f64,
    pub lost: f64,
}

impl State {
    pub fn new(susceptible: f64, exposed: f64, infectious: f64, lost: f64) -> Self {
        Self {
            susceptible,
            exposed,
            infectious,
            lost,
        }
    }

    pub fn to_array(&self) -> [f64; 4] {
        [self.susceptible, self.exposed, self.infectious, self.lost]
    }

    pub fn is_finite(&self) -> bool {
        self.to_array().iter().all(|v| v.is_finite())
    }
}

impl From<[f64; 4]> for State {
    fn from([s, e, i, l]: [f64; 4]) -> Self {
        Self::new(s, e, i, l)
    }
}

impl From<State> for StateVector {
    fn from(state: State) -> Self {
        StateVector::new(state.susceptible, state.exposed, state.infectious, state.lost)
    }
}

impl From<StateVector> for State {
    fn from(y: StateVector) -> Self {
        Self::new(y[0], y[1], y[2], y[3])
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    /// Rates used by the reference run of the original model.
    pub(crate) fn reference_parameters() -> Parameters {
        Parameters::from_record([
            100.0, 0.1, 0.2, 0.1, 0.3, 0.4, 0.56, 0.2, 0.3, 0.5, 0.6, 0.1,
        ])
    }

    pub(crate) fn reference_state() -> State {
        let world = 7_800_000_000.0;
        State::new(
            35_400_000.0 / world,
            1_500_000.0 / world,
            12_500_000.0 / world,
            365_000_000.0 / world,
        )
    }

    /// Only natural death is active: every compartment decays as e^(−μt).
    pub(crate) fn decay_parameters(mu: f64) -> Parameters {
        Parameters {
            natural_death: mu,
            ..Parameters::zero()
        }
    }

    #[test]
    fn derivative_matches_hand_computation() {
        let params = Parameters::from_record([
            1.0, 1.0, 1.0, 0.5, 1.0, 1.0, 0.5, 0.5, 1.0, 1.0, 1.0, 1.0,
        ]);
        let dy = params.derivative(&StateVector::new(1.0, 1.0, 1.0, 1.0));
        assert_abs_diff_eq!(dy[0], -2.0, epsilon = 1e-15);
        assert_abs_diff_eq!(dy[1], 0.0, epsilon = 1e-15);
        assert_abs_diff_eq!(dy[2], -0.5, epsilon = 1e-15);
        assert_abs_diff_eq!(dy[3], -2.5, epsilon = 1e-15);
    }

    #[test]
    fn zero_parameters_give_zero_derivative() {
        let dy = Parameters::zero().derivative(&StateVector::new(3.0, 2.0, 1.0, 0.5));
        assert_eq!(dy, StateVector::zeros());
    }

    #[test]
    fn lost_compartment_uses_population_loss_sign() {
        let params = Parameters {
            natural_death: 0.3,
            lost_death: 0.1,
            return_to_care: 0.5,
            ..Parameters::zero()
        };
        let dy = params.derivative(&StateVector::new(0.0, 0.0, 0.0, 2.0));
        assert_abs_diff_eq!(dy[3], -(0.3 + 0.1 + 0.5) * 2.0, epsilon = 1e-15);
    }

    #[test]
    fn analytic_jacobian_matches_finite_differences() {
        struct Numeric(Parameters);
        impl VectorField for Numeric {
            fn derivative(&self, y: &StateVector) -> StateVector {
                self.0.derivative(y)
            }
        }

        let params = reference_parameters();
        let y = StateVector::new(120.0, 15.0, 2.5, 0.4);
        let analytic = params.jacobian(&y);
        let numeric = Numeric(params).jacobian(&y);
        for i in 0..4 {
            for k in 0..4 {
                assert_abs_diff_eq!(analytic[(i, k)], numeric[(i, k)], epsilon = 1e-7);
            }
        }
    }

    #[test]
    fn record_order_is_preserved() {
        let record = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0, 11.0, 12.0];
        let params = Parameters::from(record);
        assert_eq!(params.recruitment, 1.0);
        assert_eq!(params.fast_progression, 4.0);
        assert_eq!(params.therapy_success, 8.0);
        assert_eq!(params.loss_of_trace, 9.0);
        assert_eq!(params.lost_death, 12.0);
        assert_eq!(params.to_record(), record);
    }

    #[test]
    fn validate_rejects_negative_and_non_finite_rates() {
        assert!(reference_parameters().validate().is_ok());

        let negative = Parameters {
            return_to_care: -0.1,
            ..reference_parameters()
        };
        match negative.validate() {
            Err(SimulationError::InvalidParameters { name, value }) => {
                assert_eq!(name, "return_to_care");
                assert_eq!(value, -0.1);
            }
            other => panic!("expected InvalidParameters, got {other:?}"),
        }

        let nan = Parameters {
            transmission: f64::NAN,
            ..reference_parameters()
        };
        assert!(nan.validate().is_err());
    }

    #[test]
    fn state_converts_to_vector_in_compartment_order() {
        let state = State::new(1.0, 2.0, 3.0, 4.0);
        let y = StateVector::from(state);
        assert_eq!(y, StateVector::new(1.0, 2.0, 3.0, 4.0));
        assert_eq!(State::from(y), state);
        assert!(!State::new(f64::INFINITY, 0.0, 0.0, 0.0).is_finite());
    }
}
