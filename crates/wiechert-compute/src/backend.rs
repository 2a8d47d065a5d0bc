//! Compute backend trait and device abstraction.
//!
//! The [`ComputeBackend`] trait abstracts over execution strategies (serial,
//! shared-memory threads, distributed workers) so that the physics in
//! `wiechert-core` stays unaware of how dipole steps are scheduled. Every
//! backend follows the same two-phase step, so all of them produce identical
//! dipole histories.

use thiserror::Error;
use wiechert_core::{RunConfig, RunSummary, Simulation, SimulationError};

/// Errors originating from compute backends.
#[derive(Debug, Error)]
pub enum ComputeError {
    #[error("Backend not available: {0}")]
    Unavailable(String),

    #[error("Invalid backend configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Device error: {0}")]
    Device(String),

    #[error(transparent)]
    Simulation(#[from] SimulationError),

    #[error("Worker {worker} disconnected before the run finished")]
    WorkerDisconnected { worker: usize },
}

/// Describes the capabilities of a compute backend.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub name: String,
    pub backend_type: BackendType,
    pub compute_units: Option<usize>,
}

/// The type of compute backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendType {
    Serial,
    Cpu,
    Distributed,
}

/// Abstraction over run executors.
pub trait ComputeBackend: Send + Sync {
    /// Return information about the device.
    fn device_info(&self) -> DeviceInfo;

    /// Integrate every dipole of `sim` over the run described by `config`.
    ///
    /// On success the dipole histories in `sim` hold the full run, exactly
    /// as [`Simulation::run`] would leave them.
    fn run(&self, sim: &mut Simulation, config: &RunConfig) -> Result<RunSummary, ComputeError>;
}

/// Single-threaded backend; a thin wrapper over [`Simulation::run`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialBackend;

impl ComputeBackend for SerialBackend {
    fn device_info(&self) -> DeviceInfo {
        DeviceInfo {
            name: "Serial".into(),
            backend_type: BackendType::Serial,
            compute_units: Some(1),
        }
    }

    fn run(&self, sim: &mut Simulation, config: &RunConfig) -> Result<RunSummary, ComputeError> {
        Ok(sim.run(config)?)
    }
}

/// Build a backend by name.
///
/// `workers` sets the thread count of the `cpu` backend and the worker count
/// of the `distributed` backend; `None` picks a default. Backends compiled
/// out of this build are reported as [`ComputeError::Unavailable`] here,
/// before any computation starts.
pub fn create_backend(name: &str, workers: Option<usize>) -> Result<Box<dyn ComputeBackend>, ComputeError> {
    if workers == Some(0) {
        return Err(ComputeError::InvalidConfiguration(
            "worker count must be at least 1".into(),
        ));
    }
    match name {
        "serial" => Ok(Box::new(SerialBackend)),
        "cpu" => cpu_backend(workers),
        "distributed" => distributed_backend(workers),
        other => Err(ComputeError::InvalidConfiguration(format!(
            "unknown backend '{other}' (expected serial, cpu or distributed)"
        ))),
    }
}

#[cfg(feature = "cpu")]
fn cpu_backend(workers: Option<usize>) -> Result<Box<dyn ComputeBackend>, ComputeError> {
    Ok(Box::new(match workers {
        Some(n) => crate::cpu::CpuBackend::with_threads(n),
        None => crate::cpu::CpuBackend::new(),
    }))
}

#[cfg(not(feature = "cpu"))]
fn cpu_backend(_workers: Option<usize>) -> Result<Box<dyn ComputeBackend>, ComputeError> {
    Err(ComputeError::Unavailable(
        "the cpu backend requires the `cpu` feature".into(),
    ))
}

#[cfg(feature = "distributed")]
fn distributed_backend(workers: Option<usize>) -> Result<Box<dyn ComputeBackend>, ComputeError> {
    let workers = workers.unwrap_or_else(|| {
        std::thread::available_parallelism().map_or(1, |n| n.get())
    });
    Ok(Box::new(crate::distributed::DistributedBackend::new(workers)?))
}

#[cfg(not(feature = "distributed"))]
fn distributed_backend(_workers: Option<usize>) -> Result<Box<dyn ComputeBackend>, ComputeError> {
    Err(ComputeError::Unavailable(
        "the distributed backend requires the `distributed` feature".into(),
    ))
}
