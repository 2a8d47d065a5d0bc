//! # Wiechert Core
//!
//! Retarded-time electrodynamics of moving point charges and Lorentz
//! oscillator dipoles. Fields and potentials are evaluated from the exact
//! Liénard–Wiechert expressions, with the retarded time of every charge
//! solved per observation point.
//!
//! ## Architecture
//!
//! A [`Simulation`] owns every source: point charges on prescribed
//! [`Trajectory`]s and [`Dipole`]s whose charge separation is integrated in
//! time. Field queries borrow the simulation immutably; a run advances the
//! dipoles step by step, each driven by the field of all other charges.
//!
//! ## Modules
//!
//! - [`types`]: Vectors, field containers, run parameters.
//! - [`charge`]: The `Charge` and `Trajectory` traits, point charges.
//! - [`trajectories`]: Prescribed charge motions.
//! - [`dipole`]: Lorentz-oscillator dipoles and their histories.
//! - [`retarded`]: Newton solver for the retarded time.
//! - [`fields`]: Liénard–Wiechert field and potential kernels.
//! - [`simulation`]: Source registry and field queries.
//! - [`integrator`]: RK4 stepping and the run loop.
//! - [`store`]: Run-state persistence.

pub mod charge;
pub mod constants;
pub mod dipole;
pub mod error;
pub mod fields;
pub mod integrator;
pub mod retarded;
pub mod simulation;
pub mod store;
pub mod trajectories;
pub mod types;

pub use charge::{Charge, PointCharge, Trajectory};
pub use dipole::{Dipole, Member};
pub use error::SimulationError;
pub use integrator::DipoleUpdate;
pub use simulation::{ChargeId, Simulation, Source};
pub use types::{FieldComponent, RunConfig, RunSummary, Vec3, VectorField};
