//! CPU compute backend using Rayon for shared-memory parallelism.
//!
//! Within a step every dipole update is computed in parallel from the same
//! read-only snapshot of the simulation, then the updates are applied in
//! dipole order on the calling thread. Saved driving fields for the new step
//! are evaluated in the pool as well.

use rayon::prelude::*;
use wiechert_core::integrator::ProgressLog;
use wiechert_core::{RunConfig, RunSummary, Simulation};

use crate::backend::{BackendType, ComputeBackend, ComputeError, DeviceInfo};

/// CPU backend that parallelises dipole updates across threads via Rayon.
pub struct CpuBackend {
    num_threads: usize,
}

impl CpuBackend {
    /// Create a new CPU backend using all available threads.
    pub fn new() -> Self {
        Self {
            num_threads: rayon::current_num_threads(),
        }
    }

    /// Create a CPU backend with a specified thread count.
    pub fn with_threads(num_threads: usize) -> Self {
        Self { num_threads }
    }
}

impl Default for CpuBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ComputeBackend for CpuBackend {
    fn device_info(&self) -> DeviceInfo {
        DeviceInfo {
            name: format!("CPU ({} threads)", self.num_threads),
            backend_type: BackendType::Cpu,
            compute_units: Some(self.num_threads),
        }
    }

    fn run(&self, sim: &mut Simulation, config: &RunConfig) -> Result<RunSummary, ComputeError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.num_threads)
            .build()
            .map_err(|e| ComputeError::Device(e.to_string()))?;

        if sim.begin_run(config)? {
            return Ok(RunSummary {
                steps: 0,
                restored: true,
            });
        }
        let steps = config.timesteps - 1;
        log::info!(
            "Running {} dipoles for {} steps on {} threads",
            sim.dipole_count(),
            steps,
            self.num_threads
        );
        let progress = ProgressLog::new(steps);
        for tstep in 0..steps {
            let snapshot: &Simulation = sim;
            let updates = pool.install(|| {
                (0..snapshot.dipole_count())
                    .into_par_iter()
                    .map(|i| snapshot.compute_update(i, tstep, config).map(|u| (i, u)))
                    .collect::<Result<Vec<_>, _>>()
            })?;
            sim.write_updates(tstep, &updates, config)?;
            if config.save_e {
                let step = tstep + 1;
                let t = step as f64 * config.dt;
                let snapshot: &Simulation = sim;
                let fields = pool.install(|| {
                    (0..snapshot.dipole_count())
                        .into_par_iter()
                        .map(|i| snapshot.driving_field(i, t))
                        .collect::<Result<Vec<_>, _>>()
                })?;
                sim.record_driving_fields(step, &fields)?;
            }
            progress.step_done(tstep);
        }
        sim.finish_run(config)?;
        Ok(RunSummary {
            steps,
            restored: false,
        })
    }
}
