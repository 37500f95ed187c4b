use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_wasm_bindgen::{from_value, to_value};
use wasm_bindgen::prelude::*;

use seil_core::equilibrium::{solve_equilibrium, EquilibriumResult};
use seil_core::newton::NewtonSettings;
use seil_core::{
    simulate_with, Method, Parameters, SimulationError, SimulationSettings, State, TimeSpec,
    Trajectory,
};

use crate::record::record_from_slice;

/// Model inputs shared by every method of a run.
#[derive(Debug, Clone, Copy)]
pub struct RunInputs {
    pub params: Parameters,
    pub initial: State,
    pub span: TimeSpec,
}

impl RunInputs {
    pub fn parse(params: &[f64], initial: &[f64], t0: f64, tf: f64, h: f64) -> Result<Self> {
        Ok(Self {
            params: Parameters::from_record(record_from_slice(params)?),
            initial: state_from_slice(initial)?,
            span: TimeSpec::new(t0, tf, h),
        })
    }

    fn simulate(
        &self,
        method: Method,
        settings: &SimulationSettings,
    ) -> Result<Trajectory, SimulationError> {
        simulate_with(&self.params, &self.initial, &self.span, method, settings)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RunRequest {
    pub inputs: RunInputs,
    pub method: Method,
}

impl RunRequest {
    pub fn parse(
        params: &[f64],
        initial: &[f64],
        t0: f64,
        tf: f64,
        h: f64,
        method: &str,
    ) -> Result<Self> {
        let inputs = RunInputs::parse(params, initial, t0, tf, h)?;
        let method = method.parse::<Method>().map_err(|e| anyhow!(e))?;
        Ok(Self { inputs, method })
    }

    pub fn run(&self, settings: &SimulationSettings) -> Result<Trajectory> {
        self.inputs
            .simulate(self.method, settings)
            .with_context(|| format!("{} run failed", self.method))
    }
}

fn state_from_slice(values: &[f64]) -> Result<State> {
    if values.len() != 4 {
        bail!("Initial state must have 4 values, got {}.", values.len());
    }
    Ok(State::new(values[0], values[1], values[2], values[3]))
}

/// One entry of a method comparison; exactly one of `trajectory` and `error`
/// is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodRun {
    pub method: Method,
    pub trajectory: Option<Trajectory>,
    pub error: Option<String>,
    /// Partial trajectory of a failed run.
    pub partial: Option<Trajectory>,
}

/// Runs every method on the same inputs. A failing method does not stop the
/// others.
pub fn run_all(inputs: &RunInputs, settings: &SimulationSettings) -> Vec<MethodRun> {
    Method::ALL
        .iter()
        .map(|&method| match inputs.simulate(method, settings) {
            Ok(trajectory) => MethodRun {
                method,
                trajectory: Some(trajectory),
                error: None,
                partial: None,
            },
            Err(e) => MethodRun {
                method,
                trajectory: None,
                error: Some(e.to_string()),
                partial: e.partial().cloned(),
            },
        })
        .collect()
}

pub fn find_equilibrium(
    params: &[f64],
    guess: &[f64],
    settings: &NewtonSettings,
) -> Result<EquilibriumResult> {
    let params = Parameters::from_record(record_from_slice(params)?);
    params.validate()?;
    let guess = state_from_slice(guess)?;
    solve_equilibrium(&params, &guess, settings).context("Equilibrium solve failed")
}

fn settings_from_js<T>(value: JsValue) -> Result<T, JsValue>
where
    T: Default + for<'de> Deserialize<'de>,
{
    if value.is_undefined() || value.is_null() {
        return Ok(T::default());
    }
    from_value(value).map_err(|e| JsValue::from_str(&format!("Invalid settings: {}", e)))
}

fn to_js_error(e: anyhow::Error) -> JsValue {
    JsValue::from_str(&format!("{:#}", e))
}

/// Runs one method and returns the trajectory as a JS object. `settings` may
/// be `undefined` for the defaults.
#[wasm_bindgen]
pub fn run_simulation(
    params: Vec<f64>,
    initial: Vec<f64>,
    t0: f64,
    tf: f64,
    h: f64,
    method: &str,
    settings: JsValue,
) -> Result<JsValue, JsValue> {
    console_error_panic_hook::set_once();

    let settings: SimulationSettings = settings_from_js(settings)?;
    let request =
        RunRequest::parse(&params, &initial, t0, tf, h, method).map_err(to_js_error)?;
    let trajectory = request.run(&settings).map_err(to_js_error)?;

    to_value(&trajectory).map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
}

#[wasm_bindgen]
pub fn compare_methods(
    params: Vec<f64>,
    initial: Vec<f64>,
    t0: f64,
    tf: f64,
    h: f64,
    settings: JsValue,
) -> Result<JsValue, JsValue> {
    console_error_panic_hook::set_once();

    let settings: SimulationSettings = settings_from_js(settings)?;
    let inputs = RunInputs::parse(&params, &initial, t0, tf, h).map_err(to_js_error)?;
    let runs = run_all(&inputs, &settings);

    to_value(&runs).map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
}

#[wasm_bindgen]
pub fn equilibrium(
    params: Vec<f64>,
    guess: Vec<f64>,
    settings: JsValue,
) -> Result<JsValue, JsValue> {
    console_error_panic_hook::set_once();

    let settings: NewtonSettings = settings_from_js(settings)?;
    let result = find_equilibrium(&params, &guess, &settings).map_err(to_js_error)?;

    to_value(&result).map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
}
