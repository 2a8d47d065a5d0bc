//! Errors raised by field queries and dipole runs.

use thiserror::Error;

/// Errors that can occur during a field query or a dipole run.
///
/// Every variant carries plain data so the error can be cloned and sent
/// between parallel workers.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimulationError {
    #[error(
        "Retarded time failed to converge at t = {t:.6e} s after {iterations} iterations \
         (residual: {residual:.2e} m)"
    )]
    RetardedTimeConvergence {
        t: f64,
        iterations: usize,
        residual: f64,
    },

    #[error(
        "Dipole {dipole} charge speed {speed:.4e} m/s exceeds the ceiling of {limit:.4e} m/s \
         at timestep {timestep}"
    )]
    VelocityExceeded {
        dipole: usize,
        timestep: usize,
        speed: f64,
        limit: f64,
    },

    #[error("Coordinate arrays must share one shape (x: {x:?}, y: {y:?}, z: {z:?})")]
    ShapeMismatch {
        x: Vec<usize>,
        y: Vec<usize>,
        z: Vec<usize>,
    },

    #[error("Invalid dipole: {0}")]
    InvalidDipole(String),

    #[error("Invalid run configuration: {0}")]
    InvalidRun(String),

    #[error("Unknown charge handle {0}")]
    UnknownCharge(usize),

    #[error("Unknown dipole index {0}")]
    UnknownDipole(usize),

    #[error("Run-state persistence failed: {0}")]
    Persistence(String),
}
