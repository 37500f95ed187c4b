//! Dormand–Prince 5(4) with step-size control and dense output.
//!
//! Internal steps are chosen from the embedded error estimate and are
//! independent of the report times; states at report times come from the
//! continuous extension of each accepted step.
//!
//! Reference: E. Hairer, S. P. Nørsett, G. Wanner, "Solving Ordinary
//! Differential Equations I. Nonstiff Problems", 2nd ed., Springer (1993).

use log::trace;
use serde::{Deserialize, Serialize};

use crate::traits::{StateVector, VectorField};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdaptiveSettings {
    pub rtol: f64,
    pub atol: f64,
    pub safety: f64,
    /// Lower bound on h_new / h.
    pub min_factor: f64,
    /// Upper bound on h_new / h.
    pub max_factor: f64,
    pub max_steps: usize,
    /// Estimated from the derivative norms when `None`.
    #[serde(default)]
    pub initial_step: Option<f64>,
    /// Defaults to the whole span.
    #[serde(default)]
    pub max_step: Option<f64>,
}

impl Default for AdaptiveSettings {
    fn default() -> Self {
        Self {
            rtol: 1e-6,
            atol: 1e-9,
            safety: 0.9,
            min_factor: 0.2,
            max_factor: 10.0,
            max_steps: 100_000,
            initial_step: None,
            max_step: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdaptiveStats {
    pub accepted: usize,
    pub rejected: usize,
    pub evaluations: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdaptiveFailureKind {
    StepSizeTooSmall,
    TooManySteps,
}

/// Abort of an adaptive run. `states` holds the report-time states already
/// produced, starting with the initial state.
#[derive(Debug, Clone)]
pub struct AdaptiveFailure {
    pub kind: AdaptiveFailureKind,
    pub time: f64,
    pub states: Vec<StateVector>,
    pub stats: AdaptiveStats,
}

#[derive(Debug, Clone)]
pub struct AdaptiveOutput {
    /// One state per requested report time.
    pub states: Vec<StateVector>,
    pub stats: AdaptiveStats,
}

/// Steps below this fraction of max(1, |t|) are treated as a collapse.
const MIN_STEP_SCALE: f64 = 1e-14;

#[derive(Debug, Clone, Copy, Default)]
pub struct DormandPrince {
    pub settings: AdaptiveSettings,
}

impl DormandPrince {
    pub fn new(settings: AdaptiveSettings) -> Self {
        Self { settings }
    }

    /// Integrates from `times[0]` to the last entry of `times` (ascending)
    /// and returns the state at every entry.
    pub fn integrate(
        &self,
        field: &impl VectorField,
        y0: &StateVector,
        times: &[f64],
    ) -> Result<AdaptiveOutput, AdaptiveFailure> {
        let settings = &self.settings;
        let mut stats = AdaptiveStats::default();
        let mut states = Vec::with_capacity(times.len());
        states.push(*y0);

        let (Some(&t0), Some(&tf)) = (times.first(), times.last()) else {
            return Ok(AdaptiveOutput {
                states: Vec::new(),
                stats,
            });
        };
        if times.len() == 1 || tf <= t0 {
            states.resize(times.len(), *y0);
            return Ok(AdaptiveOutput { states, stats });
        }

        let h_max = settings.max_step.map_or(tf - t0, f64::abs).min(tf - t0);
        let mut t = t0;
        let mut y = *y0;
        let mut k1 = field.derivative(&y);
        stats.evaluations += 1;
        let mut h = match settings.initial_step {
            Some(h0) => h0.abs().min(h_max),
            None => {
                stats.evaluations += 1;
                initial_step(field, &y, &k1, h_max, settings)
            }
        };
        let mut next = 1usize;
        let mut reject = false;
        let mut steps = 0usize;

        while next < times.len() {
            if steps >= settings.max_steps {
                return Err(AdaptiveFailure {
                    kind: AdaptiveFailureKind::TooManySteps,
                    time: t,
                    states,
                    stats,
                });
            }
            // Land exactly on tf instead of leaving a sliver. The closing step
            // may be shorter than the collapse floor.
            let last = t + 1.01 * h >= tf;
            if last {
                h = tf - t;
            } else if h.is_nan() || h <= MIN_STEP_SCALE * t.abs().max(1.0) {
                return Err(AdaptiveFailure {
                    kind: AdaptiveFailureKind::StepSizeTooSmall,
                    time: t,
                    states,
                    stats,
                });
            }
            steps += 1;

            let stage = Stages::evaluate(field, &y, &k1, h);
            stats.evaluations += 6;

            let err = error_norm(&stage.error, &y, &stage.y1, settings);
            if err.is_finite() && err <= 1.0 {
                stats.accepted += 1;
                let t_new = if last { tf } else { t + h };
                let dense = DenseOutput::new(&y, &stage, h);
                while next < times.len() && (times[next] <= t_new || last) {
                    let theta = ((times[next] - t) / h).clamp(0.0, 1.0);
                    states.push(dense.evaluate(theta));
                    next += 1;
                }

                y = stage.y1;
                k1 = stage.k7;
                t = t_new;

                let grow = if err == 0.0 {
                    settings.max_factor
                } else {
                    settings.safety * err.powf(-0.2)
                };
                let cap = if reject { 1.0 } else { settings.max_factor };
                h = (h * grow.max(settings.min_factor).min(cap)).min(h_max);
                reject = false;
            } else {
                stats.rejected += 1;
                trace!("rejected step at t = {t} (h = {h:e}, err = {err:e})");
                let shrink = if err.is_finite() {
                    (settings.safety * err.powf(-0.2)).max(settings.min_factor).min(1.0)
                } else {
                    settings.min_factor
                };
                h *= shrink;
                reject = true;
            }
        }

        Ok(AdaptiveOutput { states, stats })
    }
}

/// Stage derivatives of one trial step. `k7 = f(y1)` is reused as `k1` of the
/// next step.
struct Stages {
    k1: StateVector,
    k3: StateVector,
    k4: StateVector,
    k5: StateVector,
    k6: StateVector,
    k7: StateVector,
    y1: StateVector,
    error: StateVector,
}

impl Stages {
    fn evaluate(field: &impl VectorField, y: &StateVector, k1: &StateVector, h: f64) -> Self {
        let k1 = *k1;
        let k2 = field.derivative(&(y + k1 * (h * A21)));
        let k3 = field.derivative(&(y + (k1 * A31 + k2 * A32) * h));
        let k4 = field.derivative(&(y + (k1 * A41 + k2 * A42 + k3 * A43) * h));
        let k5 = field.derivative(&(y + (k1 * A51 + k2 * A52 + k3 * A53 + k4 * A54) * h));
        let k6 = field
            .derivative(&(y + (k1 * A61 + k2 * A62 + k3 * A63 + k4 * A64 + k5 * A65) * h));
        let y1 = y + (k1 * A71 + k3 * A73 + k4 * A74 + k5 * A75 + k6 * A76) * h;
        let k7 = field.derivative(&y1);
        let error = (k1 * E1 + k3 * E3 + k4 * E4 + k5 * E5 + k6 * E6 + k7 * E7) * h;

        Self {
            k1,
            k3,
            k4,
            k5,
            k6,
            k7,
            y1,
            error,
        }
    }
}

/// RMS of the error scaled by atol + rtol·max(|y|, |y1|).
fn error_norm(
    error: &StateVector,
    y: &StateVector,
    y1: &StateVector,
    settings: &AdaptiveSettings,
) -> f64 {
    let sum: f64 = (0..4)
        .map(|i| {
            let scale = settings.atol + settings.rtol * y[i].abs().max(y1[i].abs());
            (error[i] / scale).powi(2)
        })
        .sum();
    (sum / 4.0).sqrt()
}

/// Starting step from the norms of y, f(y) and a second-derivative estimate.
fn initial_step(
    field: &impl VectorField,
    y: &StateVector,
    f0: &StateVector,
    h_max: f64,
    settings: &AdaptiveSettings,
) -> f64 {
    let scale = y.map(|v| settings.atol + settings.rtol * v.abs());
    let rms = |v: &StateVector| (v.component_div(&scale).norm_squared() / 4.0).sqrt();

    let d0 = rms(y);
    let d1 = rms(f0);
    let h0 = if d0 < 1e-5 || d1 < 1e-5 {
        1e-6
    } else {
        0.01 * d0 / d1
    }
    .min(h_max);

    let f1 = field.derivative(&(y + f0 * h0));
    let d2 = rms(&(f1 - f0)) / h0;

    let h1 = if d1.max(d2) <= 1e-15 {
        (h0 * 1e-3).max(1e-6)
    } else {
        (0.01 / d1.max(d2)).powf(1.0 / 5.0)
    };
    (100.0 * h0).min(h1).min(h_max)
}

/// Quartic continuous extension of an accepted step.
struct DenseOutput {
    cont: [StateVector; 5],
}

impl DenseOutput {
    fn new(y: &StateVector, stage: &Stages, h: f64) -> Self {
        let ydiff = stage.y1 - y;
        let bspl = stage.k1 * h - ydiff;
        let c3 = ydiff - stage.k7 * h - bspl;
        let c4 = (stage.k1 * D1
            + stage.k3 * D3
            + stage.k4 * D4
            + stage.k5 * D5
            + stage.k6 * D6
            + stage.k7 * D7)
            * h;
        Self {
            cont: [*y, ydiff, bspl, c3, c4],
        }
    }

    /// State at t_old + θ·h, θ ∈ [0, 1].
    fn evaluate(&self, theta: f64) -> StateVector {
        let theta1 = 1.0 - theta;
        let [c0, c1, c2, c3, c4] = &self.cont;
        c0 + (c1 + (c2 + (c3 + c4 * theta1) * theta) * theta1) * theta
    }
}

// Butcher tableau
const A21: f64 = 0.2;
const A31: f64 = 3.0 / 40.0;
const A32: f64 = 9.0 / 40.0;
const A41: f64 = 44.0 / 45.0;
const A42: f64 = -56.0 / 15.0;
const A43: f64 = 32.0 / 9.0;
const A51: f64 = 19372.0 / 6561.0;
const A52: f64 = -25360.0 / 2187.0;
const A53: f64 = 64448.0 / 6561.0;
const A54: f64 = -212.0 / 729.0;
const A61: f64 = 9017.0 / 3168.0;
const A62: f64 = -355.0 / 33.0;
const A63: f64 = 46732.0 / 5247.0;
const A64: f64 = 49.0 / 176.0;
const A65: f64 = -5103.0 / 18656.0;
const A71: f64 = 35.0 / 384.0;
const A73: f64 = 500.0 / 1113.0;
const A74: f64 = 125.0 / 192.0;
const A75: f64 = -2187.0 / 6784.0;
const A76: f64 = 11.0 / 84.0;

// 5th minus 4th order weights
const E1: f64 = 71.0 / 57600.0;
const E3: f64 = -71.0 / 16695.0;
const E4: f64 = 71.0 / 1920.0;
const E5: f64 = -17253.0 / 339200.0;
const E6: f64 = 22.0 / 525.0;
const E7: f64 = -1.0 / 40.0;

// Dense output
const D1: f64 = -12715105075.0 / 11282082432.0;
const D3: f64 = 87487479700.0 / 32700410799.0;
const D4: f64 = -10690763975.0 / 1880347072.0;
const D5: f64 = 701980252875.0 / 199316789632.0;
const D6: f64 = -1453857185.0 / 822651844.0;
const D7: f64 = 69997945.0 / 29380423.0;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::tests::{decay_parameters, reference_parameters, reference_state};
    use crate::model::Parameters;
    use approx::assert_abs_diff_eq;

    fn report_times(t0: f64, tf: f64, n: usize) -> Vec<f64> {
        (0..=n)
            .map(|i| t0 + (tf - t0) * i as f64 / n as f64)
            .collect()
    }

    #[test]
    fn decay_matches_closed_form_at_every_report_time() {
        let mu = 0.5;
        let y0 = StateVector::new(1.0, 2.0, 3.0, 4.0);
        let times = report_times(0.0, 2.0, 20);
        let output = DormandPrince::default()
            .integrate(&decay_parameters(mu), &y0, &times)
            .expect("integration");

        assert_eq!(output.states.len(), times.len());
        for (t, y) in times.iter().zip(&output.states) {
            let exact = y0 * (-mu * t).exp();
            assert_abs_diff_eq!((y - exact).amax(), 0.0, epsilon = 1e-5);
        }
        // Internal steps are far coarser than the report grid.
        assert!(output.stats.accepted < times.len());
    }

    #[test]
    fn tighter_tolerance_reduces_error() {
        let mu = 1.5;
        let y0 = StateVector::repeat(1.0);
        let times = report_times(0.0, 4.0, 8);
        let error = |rtol: f64| {
            let settings = AdaptiveSettings {
                rtol,
                atol: rtol * 1e-3,
                ..AdaptiveSettings::default()
            };
            let output = DormandPrince::new(settings)
                .integrate(&decay_parameters(mu), &y0, &times)
                .expect("integration");
            (output.states[8] - y0 * (-mu * 4.0f64).exp()).amax()
        };
        assert!(error(1e-10) < error(1e-4));
    }

    #[test]
    fn constant_field_stays_constant() {
        let y0 = StateVector::new(0.5, 0.25, 0.125, 0.0625);
        let times = report_times(1.0, 5.0, 40);
        let output = DormandPrince::default()
            .integrate(&Parameters::zero(), &y0, &times)
            .expect("integration");
        assert!(output.states.iter().all(|y| *y == y0));
        assert_eq!(output.stats.rejected, 0);
    }

    #[test]
    fn single_report_time_returns_initial_state() {
        let y0 = StateVector::repeat(2.0);
        let output = DormandPrince::default()
            .integrate(&decay_parameters(1.0), &y0, &[3.0])
            .expect("integration");
        assert_eq!(output.states, vec![y0]);
        assert_eq!(output.stats.evaluations, 0);
    }

    #[test]
    fn step_budget_is_enforced() {
        let settings = AdaptiveSettings {
            max_steps: 2,
            initial_step: Some(1e-3),
            max_step: Some(1e-3),
            ..AdaptiveSettings::default()
        };
        let times = report_times(0.0, 1.0, 10);
        let failure = DormandPrince::new(settings)
            .integrate(&decay_parameters(1.0), &StateVector::repeat(1.0), &times)
            .unwrap_err();
        assert_eq!(failure.kind, AdaptiveFailureKind::TooManySteps);
        assert_eq!(failure.states.len(), 1);
        assert!(failure.time > 0.0 && failure.time < 0.1);
    }

    #[test]
    fn dense_output_reproduces_step_endpoints() {
        let params = decay_parameters(0.7);
        let y = StateVector::new(1.0, 2.0, 3.0, 4.0);
        let h = 0.3;
        let k1 = params.derivative(&y);
        let stage = Stages::evaluate(&params, &y, &k1, h);
        let dense = DenseOutput::new(&y, &stage, h);
        assert_abs_diff_eq!((dense.evaluate(0.0) - y).amax(), 0.0, epsilon = 1e-15);
        assert_abs_diff_eq!((dense.evaluate(1.0) - stage.y1).amax(), 0.0, epsilon = 1e-14);
        let midpoint = y * (-0.7f64 * 0.15).exp();
        assert_abs_diff_eq!((dense.evaluate(0.5) - midpoint).amax(), 0.0, epsilon = 1e-5);
    }

    #[test]
    fn span_below_collapse_floor_takes_one_closing_step() {
        let y0 = StateVector::from(reference_state());
        let times = [1.0, 1.0 + 4.0 * f64::EPSILON];
        let output = DormandPrince::default()
            .integrate(&reference_parameters(), &y0, &times)
            .expect("integration");
        assert_eq!(output.states.len(), 2);
        assert_eq!(output.stats.accepted, 1);
        assert_abs_diff_eq!((output.states[1] - y0).amax(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn strong_transmission_forces_step_rejections() {
        let params = Parameters {
            transmission: 50.0,
            ..reference_parameters()
        };
        let times = report_times(1.0, 5.0, 400);
        let output = DormandPrince::default()
            .integrate(&params, &StateVector::from(reference_state()), &times)
            .expect("integration");
        assert_eq!(output.states.len(), times.len());
        assert!(output.stats.rejected > 0, "{:?}", output.stats);
        assert!(output.stats.accepted > output.stats.rejected);
    }
}
