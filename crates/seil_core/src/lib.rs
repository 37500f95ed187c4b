//! The `seil_core` crate is the numerical engine behind the SEIL
//! (Susceptible, Exposed, Infectious, Lost-to-follow-up) epidemic model.
//! A run takes an immutable [`Parameters`] snapshot, an initial [`State`] and
//! a [`TimeSpec`], and returns a [`Trajectory`] on the fixed reporting grid.
//!
//! Key components:
//! - **Traits**: `VectorField` (right-hand sides), `Steppable` (one-step methods).
//! - **Model**: the twelve-rate SEIL vector field with its closed-form Jacobian.
//! - **Solvers**: explicit steppers (forward Euler, RK2, RK4), implicit steppers
//!   (backward Euler, trapezoidal) built on a shared Newton solver, and an
//!   adaptive Dormand–Prince 5(4) integrator with dense output.
//! - **Simulation**: method selection and trajectory assembly.
//! - **Equilibrium**: stationary points and their linear stability.

pub mod adaptive;
pub mod equilibrium;
pub mod error;
pub mod implicit;
pub mod model;
pub mod newton;
pub mod simulation;
pub mod solvers;
pub mod trajectory;
pub mod traits;

pub use error::SimulationError;
pub use model::{Parameters, State};
pub use simulation::{simulate, simulate_with, Method, SimulationSettings};
pub use trajectory::{TimeSpec, Trajectory};
