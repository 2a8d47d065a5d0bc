//! # Wiechert Compute
//!
//! Execution backends for dipole runs. This crate provides a
//! [`ComputeBackend`](backend::ComputeBackend) trait that isolates the
//! physics in `wiechert-core` from how dipole updates are scheduled.
//!
//! ## Available backends
//!
//! | Backend | Feature flag | Strategy |
//! |---------|-------------|----------|
//! | Serial | always | `Simulation::run` on the calling thread |
//! | CPU (Rayon) | `cpu` (default) | Dipole updates in parallel within each step |
//! | Distributed | `distributed` (default) | Round-robin dipole ownership, per-step exchange |
//!
//! All backends produce bit-identical dipole histories.

pub mod backend;

#[cfg(feature = "cpu")]
pub mod cpu;

#[cfg(feature = "distributed")]
pub mod distributed;

pub use backend::{create_backend, BackendType, ComputeBackend, ComputeError, DeviceInfo, SerialBackend};

#[cfg(feature = "cpu")]
pub use cpu::CpuBackend;

#[cfg(feature = "distributed")]
pub use distributed::DistributedBackend;
