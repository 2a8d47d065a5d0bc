//! Time stepping of dipoles.
//!
//! Each step is split in two phases so that any partition of the dipoles
//! over workers gives the same result:
//!
//! 1. [`Simulation::compute_update`] advances one dipole by classical RK4
//!    from the state at step `n`, reading but never writing the simulation.
//! 2. [`Simulation::apply_updates`] writes the step `n + 1` samples, checks
//!    the velocity ceiling and records the driving field.
//!
//! The driving field is the total field of every other charge, plus any
//! external field, at the dipole origin, projected on the polarization axis.

use serde::{Deserialize, Serialize};

use crate::dipole::{Dipole, Member};
use crate::error::SimulationError;
use crate::simulation::Simulation;
use crate::store;
use crate::types::{add, dot, scale, sub, DrivingFieldSampling, FieldTerms, RunConfig, RunSummary, Vec3};

/// New state of one dipole at step `n + 1`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DipoleUpdate {
    pub displacement: Vec3,
    pub velocity: Vec3,
    pub acceleration: Vec3,
}

/// Driving field decomposition at a dipole origin, already projected.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DrivingField {
    pub total: Vec3,
    pub velocity: Vec3,
    pub acceleration: Vec3,
}

fn project(p: &Vec3, v: &Vec3) -> Vec3 {
    scale(dot(p, v), p)
}

impl RunConfig {
    /// Check the run parameters before anything is allocated.
    pub fn validate(&self) -> Result<(), SimulationError> {
        if self.timesteps == 0 {
            return Err(SimulationError::InvalidRun(
                "timesteps must be at least 1".into(),
            ));
        }
        if !(self.dt.is_finite() && self.dt > 0.0) {
            return Err(SimulationError::InvalidRun(format!(
                "dt must be positive, got {}",
                self.dt
            )));
        }
        if self.max_vel.is_nan() || self.max_vel <= 0.0 {
            return Err(SimulationError::InvalidRun(format!(
                "max_vel must be positive, got {}",
                self.max_vel
            )));
        }
        Ok(())
    }
}

/// Logs progress roughly every tenth of a run.
#[derive(Debug, Clone, Copy)]
pub struct ProgressLog {
    steps: usize,
    every: usize,
}

impl ProgressLog {
    pub fn new(steps: usize) -> Self {
        Self {
            steps,
            every: (steps / 10).max(1),
        }
    }

    /// Report completion of step `tstep` (zero-based).
    pub fn step_done(&self, tstep: usize) {
        let done = tstep + 1;
        if done % self.every == 0 || done == self.steps {
            log::info!(
                "Step {}/{} ({:.0}%)",
                done,
                self.steps,
                100.0 * done as f64 / self.steps as f64
            );
        }
    }
}

/// Step `tstep` must be the dipole's latest recorded sample and step
/// `tstep + 1` must be allocated.
fn check_step(dipole: &Dipole, tstep: usize) -> Result<(), SimulationError> {
    if tstep + 1 != dipole.recorded_steps() || tstep + 1 >= dipole.timesteps() {
        return Err(SimulationError::InvalidRun(format!(
            "cannot advance from step {tstep}: {} of {} steps recorded",
            dipole.recorded_steps(),
            dipole.timesteps()
        )));
    }
    Ok(())
}

impl Simulation {
    /// Driving field of dipole `index` at time `t` with its origin at `at`.
    fn driving_terms(&self, index: usize, t: f64, at: &Vec3) -> Result<(FieldTerms, Vec3), SimulationError> {
        let exclude = self.dipole_charges(index)?;
        let terms = self.field_terms_at(t, at, &exclude)?;
        Ok((terms, self.external_fields().e_at(t, at)))
    }

    /// Projected driving field of dipole `index` at time `t`.
    pub fn driving_field(&self, index: usize, t: f64) -> Result<DrivingField, SimulationError> {
        let dipole = self.dipole(index)?;
        let p = dipole.polarization();
        let (terms, external) = self.driving_terms(index, t, &dipole.origin().position(t))?;
        Ok(DrivingField {
            total: project(&p, &add(&terms.total(), &external)),
            velocity: project(&p, &terms.velocity),
            acceleration: project(&p, &terms.acceleration),
        })
    }

    /// Advance dipole `index` from step `tstep` to `tstep + 1` by RK4.
    pub fn compute_update(
        &self,
        index: usize,
        tstep: usize,
        config: &RunConfig,
    ) -> Result<DipoleUpdate, SimulationError> {
        let dipole = self.dipole(index)?;
        check_step(dipole, tstep)?;
        let dt = config.dt;
        let t = tstep as f64 * dt;
        let p = dipole.polarization();
        let q_over_m = dipole.q() / dipole.m_eff();
        let gamma = dipole.gamma_0();
        let w2 = dipole.omega_0() * dipole.omega_0();

        // Forcing acceleration (q/m) E_drive at a stage time.
        let forcing = |time: f64| -> Result<Vec3, SimulationError> {
            let (terms, external) = self.driving_terms(index, time, &dipole.origin().position(time))?;
            Ok(scale(q_over_m, &project(&p, &add(&terms.total(), &external))))
        };
        let (f_start, f_mid, f_end) = match config.driving_field {
            DrivingFieldSampling::StepStart => {
                let f = forcing(t)?;
                (f, f, f)
            }
            DrivingFieldSampling::PerStage => {
                (forcing(t)?, forcing(t + 0.5 * dt)?, forcing(t + dt)?)
            }
        };

        let derivative = |d: &Vec3, v: &Vec3, f: &Vec3| -> (Vec3, Vec3) {
            let accel = sub(&sub(f, &scale(gamma, v)), &scale(w2, d));
            (*v, accel)
        };

        let (d0, v0) = dipole.moment_at(tstep);
        let k1 = derivative(&d0, &v0, &f_start);
        let k2 = derivative(
            &add(&d0, &scale(0.5 * dt, &k1.0)),
            &add(&v0, &scale(0.5 * dt, &k1.1)),
            &f_mid,
        );
        let k3 = derivative(
            &add(&d0, &scale(0.5 * dt, &k2.0)),
            &add(&v0, &scale(0.5 * dt, &k2.1)),
            &f_mid,
        );
        let k4 = derivative(
            &add(&d0, &scale(dt, &k3.0)),
            &add(&v0, &scale(dt, &k3.1)),
            &f_end,
        );

        let combine = |x0: &Vec3, a: &Vec3, b: &Vec3, c: &Vec3, d: &Vec3| -> Vec3 {
            std::array::from_fn(|i| x0[i] + dt / 6.0 * (a[i] + 2.0 * b[i] + 2.0 * c[i] + d[i]))
        };
        let displacement = combine(&d0, &k1.0, &k2.0, &k3.0, &k4.0);
        let velocity = combine(&v0, &k1.1, &k2.1, &k3.1, &k4.1);
        let acceleration = scale(1.0 / dt, &sub(&velocity, &v0));

        Ok(DipoleUpdate {
            displacement,
            velocity,
            acceleration,
        })
    }

    /// Write step `tstep + 1` for the given dipoles, then check member speeds
    /// and record driving fields.
    ///
    /// Samples are written before the velocity check, so a failing run keeps
    /// the offending sample.
    pub fn apply_updates(
        &mut self,
        tstep: usize,
        updates: &[(usize, DipoleUpdate)],
        config: &RunConfig,
    ) -> Result<(), SimulationError> {
        self.write_updates(tstep, updates, config)?;
        if config.save_e {
            let step = tstep + 1;
            let fields = (0..self.dipole_count())
                .map(|i| self.driving_field(i, step as f64 * config.dt))
                .collect::<Result<Vec<_>, _>>()?;
            self.record_driving_fields(step, &fields)?;
        }
        Ok(())
    }

    /// The moment half of [`apply_updates`](Self::apply_updates): write step
    /// `tstep + 1` and check member speeds, leaving driving fields to the
    /// caller.
    ///
    /// Nothing is written unless every index is known and step `tstep` is the
    /// dipole's latest recorded sample with room for one more.
    pub fn write_updates(
        &mut self,
        tstep: usize,
        updates: &[(usize, DipoleUpdate)],
        config: &RunConfig,
    ) -> Result<(), SimulationError> {
        for (index, _) in updates {
            check_step(self.dipole(*index)?, tstep)?;
        }
        let step = tstep + 1;
        for (index, update) in updates {
            let dipole = self
                .dipoles
                .get_mut(*index)
                .ok_or(SimulationError::UnknownDipole(*index))?;
            dipole.record_step(
                step,
                &update.displacement,
                &update.velocity,
                &update.acceleration,
            );
        }

        for (index, _) in updates {
            let dipole = self.dipole(*index)?;
            for member in Member::BOTH {
                let speed = dipole.member_speed(member, step);
                // NaN speeds fail too.
                if !speed.is_finite() || speed > config.max_vel {
                    return Err(SimulationError::VelocityExceeded {
                        dipole: *index,
                        timestep: step,
                        speed,
                        limit: config.max_vel,
                    });
                }
            }
        }
        Ok(())
    }

    /// Store one projected driving field per dipole, in dipole order, at `step`.
    pub fn record_driving_fields(
        &mut self,
        step: usize,
        fields: &[DrivingField],
    ) -> Result<(), SimulationError> {
        if fields.len() != self.dipole_count() {
            return Err(SimulationError::InvalidRun(format!(
                "{} driving fields given for {} dipoles",
                fields.len(),
                self.dipole_count()
            )));
        }
        if let Some(dipole) = self.dipoles.iter().find(|d| step >= d.timesteps()) {
            return Err(SimulationError::InvalidRun(format!(
                "step {step} is outside a history of {} steps",
                dipole.timesteps()
            )));
        }
        for (dipole, field) in self.dipoles.iter_mut().zip(fields) {
            dipole.record_driving_field(step, &field.total, &field.velocity, &field.acceleration);
        }
        Ok(())
    }

    /// Advance every dipole by one step.
    pub fn step(&mut self, tstep: usize, config: &RunConfig) -> Result<(), SimulationError> {
        let updates = (0..self.dipole_count())
            .map(|i| self.compute_update(i, tstep, config).map(|u| (i, u)))
            .collect::<Result<Vec<_>, _>>()?;
        self.apply_updates(tstep, &updates, config)
    }

    /// Prepare a run: validate, reset every dipole, and try the state file.
    ///
    /// Returns `true` when the histories were restored and no integration
    /// is needed.
    pub fn begin_run(&mut self, config: &RunConfig) -> Result<bool, SimulationError> {
        config.validate()?;
        for dipole in &mut self.dipoles {
            dipole.reset(config.timesteps, config.dt, config.save_e);
        }
        if let Some(path) = &config.state_file {
            if store::restore_run(self, config, path)? {
                log::info!("Restored dipole histories from {}", path.display());
                return Ok(true);
            }
            log::debug!("No matching run in {}", path.display());
        }
        if config.save_e {
            let fields = (0..self.dipole_count())
                .map(|i| self.driving_field(i, 0.0))
                .collect::<Result<Vec<_>, _>>()?;
            self.record_driving_fields(0, &fields)?;
        }
        Ok(false)
    }

    /// Persist the finished run if a state file is configured.
    pub fn finish_run(&self, config: &RunConfig) -> Result<(), SimulationError> {
        if let Some(path) = &config.state_file {
            store::save_run(self, config, path)?;
            log::debug!("Saved run to {}", path.display());
        }
        Ok(())
    }

    /// Integrate every dipole over the whole run.
    pub fn run(&mut self, config: &RunConfig) -> Result<RunSummary, SimulationError> {
        if self.begin_run(config)? {
            return Ok(RunSummary {
                steps: 0,
                restored: true,
            });
        }
        let steps = config.timesteps - 1;
        log::info!(
            "Running {} dipoles for {} steps (dt = {:e} s)",
            self.dipole_count(),
            steps,
            config.dt
        );
        let progress = ProgressLog::new(steps);
        for tstep in 0..steps {
            self.step(tstep, config)?;
            progress.step_done(tstep);
        }
        self.finish_run(config)?;
        Ok(RunSummary {
            steps,
            restored: false,
        })
    }
}
