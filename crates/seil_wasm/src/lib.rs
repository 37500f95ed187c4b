//! Browser bridge for `seil_core`: run requests in, trajectories out as JS
//! objects via `serde-wasm-bindgen`.

pub mod record;
pub mod runner;

pub use record::{decode_parameters, decode_record, encode_parameters, encode_record};
pub use runner::{compare_methods, equilibrium, run_simulation, MethodRun, RunInputs, RunRequest};
