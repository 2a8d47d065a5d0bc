//! Simulation runner: builds sources from the job file, runs the dipoles on
//! the chosen backend, and writes results.

use std::f64::consts::PI;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use ndarray::Array3;
use wiechert_compute::{create_backend, ComputeBackend};
use wiechert_core::charge::Trajectory;
use wiechert_core::constants::C;
use wiechert_core::trajectories::{
    LinearAcceleration, LinearDeceleration, LinearVelocity, Oscillating, Orbiting, Stationary,
};
use wiechert_core::types::{cross, dot, linspace, meshgrid_ij, normalise, scale, Vec3};
use wiechert_core::{Dipole, PointCharge, RunConfig, RunSummary, Simulation, VectorField};

use crate::config::{ExternalFieldConfig, FieldMapConfig, JobConfig, TrajectoryConfig};

/// Everything needed to start a run.
pub struct PreparedJob {
    pub simulation: Simulation,
    pub run: RunConfig,
    pub backend: Box<dyn ComputeBackend>,
}

/// Build the simulation, run configuration and backend, checking all of them.
pub fn prepare(job: &JobConfig) -> Result<PreparedJob> {
    let run = job.run.to_run_config();
    run.validate().context("Invalid [run] section")?;
    let backend = create_backend(&job.compute.backend, job.compute.workers)
        .context("Invalid [compute] section")?;
    let simulation = build_simulation(job)?;
    Ok(PreparedJob {
        simulation,
        run,
        backend,
    })
}

fn build_trajectory(config: &TrajectoryConfig) -> Arc<dyn Trajectory> {
    match config.clone() {
        TrajectoryConfig::Stationary { position } => Arc::new(Stationary::new(position)),
        TrajectoryConfig::Oscillating {
            origin,
            direction,
            amplitude,
            omega,
            start_zero,
            stop_t,
        } => {
            let mut t = Oscillating::new(origin, direction, amplitude, omega);
            if start_zero {
                t = t.starting_at_rest();
            }
            if let Some(stop) = stop_t {
                t = t.stopping_at(stop);
            }
            Arc::new(t)
        }
        TrajectoryConfig::Orbiting {
            radius,
            omega,
            start_zero,
            stop_t,
        } => {
            let mut t = Orbiting::new(radius, omega);
            if start_zero {
                t = t.starting_at_rest();
            }
            if let Some(stop) = stop_t {
                t = t.stopping_at(stop);
            }
            Arc::new(t)
        }
        TrajectoryConfig::LinearVelocity { speed, initial } => {
            Arc::new(LinearVelocity::new(speed, initial))
        }
        TrajectoryConfig::LinearAcceleration { acceleration } => {
            Arc::new(LinearAcceleration::new(acceleration))
        }
        TrajectoryConfig::LinearDeceleration {
            initial_speed,
            deceleration,
            stop_t,
        } => {
            let mut t = LinearDeceleration::new(initial_speed, deceleration);
            if let Some(stop) = stop_t {
                t = t.stopping_at(stop);
            }
            Arc::new(t)
        }
    }
}

/// Build the simulation from the `[[charge]]`, `[[dipole]]` and
/// `[external_field]` sections.
pub fn build_simulation(job: &JobConfig) -> Result<Simulation> {
    let mut sim = Simulation::default();
    for charge in &job.charges {
        sim.add_source(PointCharge::from_shared(
            charge.q,
            build_trajectory(&charge.trajectory),
        ));
    }
    for (i, config) in job.dipoles.iter().enumerate() {
        let mut dipole = Dipole::with_shared_origin(
            config.omega_0,
            build_trajectory(&config.origin),
            config.init_d,
        )
        .with_context(|| format!("Dipole {i}"))?
        .with_initial_velocity(config.init_v);
        if let Some(q) = config.q {
            dipole = dipole.with_charge(q);
        }
        if let Some([m_neg, m_pos]) = config.masses {
            dipole = dipole.with_masses(m_neg, m_pos);
        }
        if let Some(gamma) = config.gamma_0 {
            dipole = dipole.with_damping(gamma);
        }
        sim.add_source(dipole);
    }
    if let Some(field) = &job.external_field {
        sim = attach_external_field(sim, field)?;
    }
    log::info!(
        "Simulation: {} point charges, {} dipoles",
        sim.point_charges().len(),
        sim.dipole_count()
    );
    Ok(sim)
}

fn attach_external_field(sim: Simulation, config: &ExternalFieldConfig) -> Result<Simulation> {
    match *config {
        ExternalFieldConfig::Uniform { e } => Ok(sim.with_external_e(move |_, _| e)),
        ExternalFieldConfig::PlaneWave {
            amplitude,
            wavelength,
            direction,
            polarization,
        } => {
            let n = normalise(&direction).context("Plane wave direction must be non-zero")?;
            let p = normalise(&polarization).context("Plane wave polarization must be non-zero")?;
            let k = 2.0 * PI / wavelength;
            let e_at = move |t: f64, r: Vec3| scale(amplitude * (k * (dot(&n, &r) - C * t)).sin(), &p);
            Ok(sim
                .with_external_e(e_at)
                .with_external_b(move |t, r| scale(1.0 / C, &cross(&n, &e_at(t, r)))))
        }
    }
}

/// Run the dipoles on the prepared backend.
pub fn run(prepared: &mut PreparedJob) -> Result<RunSummary> {
    let info = prepared.backend.device_info();
    log::info!("Backend: {}", info.name);
    let summary = prepared
        .backend
        .run(&mut prepared.simulation, &prepared.run)
        .context("Run failed")?;
    if summary.restored {
        log::info!("Dipole histories restored from the state file");
    }
    Ok(summary)
}

fn create_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    Ok(())
}

/// Write every dipole's moment history to a CSV file with a metadata header.
pub fn write_moments_csv(sim: &Simulation, run: &RunConfig, path: &Path) -> Result<()> {
    create_parent(path)?;
    let file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    let mut file = std::io::BufWriter::new(file);

    writeln!(file, "# Wiechert dipole moment histories")?;
    writeln!(file, "# Version: {}", env!("CARGO_PKG_VERSION"))?;
    writeln!(file, "# timesteps: {}, dt: {:e} s", run.timesteps, run.dt)?;
    writeln!(file, "#")?;
    writeln!(file, "dipole,step,t_s,d_x,d_y,d_z,v_x,v_y,v_z,a_x,a_y,a_z")?;

    for (i, dipole) in sim.dipoles().iter().enumerate() {
        let (disp, vel, acc) = (
            dipole.moment_displacement(),
            dipole.moment_velocity(),
            dipole.moment_acceleration(),
        );
        for step in 0..dipole.recorded_steps() {
            write!(file, "{},{},{:.6e}", i, step, step as f64 * run.dt)?;
            for array in [disp, vel, acc] {
                for c in 0..3 {
                    write!(file, ",{:.9e}", array[[step, c]])?;
                }
            }
            writeln!(file)?;
        }
    }
    file.flush()?;

    println!("Dipole moments written to: {}", path.display());
    Ok(())
}

/// Evaluate the electric field on a z-plane and write it to CSV.
pub fn write_field_map_csv(
    sim: &Simulation,
    run: &RunConfig,
    map: &FieldMapConfig,
    path: &Path,
) -> Result<()> {
    let t = map
        .t
        .unwrap_or((run.timesteps.saturating_sub(1)) as f64 * run.dt);
    let axis = linspace(-map.half_width, map.half_width, map.points);
    let (x, y, z): (Array3<f64>, Array3<f64>, Array3<f64>) = meshgrid_ij(&axis, &axis, &[map.z]);
    let field: VectorField<_> = sim
        .calculate_e(t, &x, &y, &z, map.component, &[])
        .context("Field map evaluation failed")?;
    let magnitude = field.magnitude();

    create_parent(path)?;
    let file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    let mut file = std::io::BufWriter::new(file);
    writeln!(file, "# Wiechert electric field map")?;
    writeln!(file, "# t: {:e} s, component: {:?}", t, map.component)?;
    writeln!(file, "# Grid: {}x{} at z = {:e} m", map.points, map.points, map.z)?;
    writeln!(file, "#")?;
    writeln!(file, "x_m,y_m,z_m,E_x,E_y,E_z,|E|")?;
    for ((idx, xv), yv) in x.indexed_iter().zip(y.iter()) {
        writeln!(
            file,
            "{:.6e},{:.6e},{:.6e},{:.6e},{:.6e},{:.6e},{:.6e}",
            xv, yv, z[idx], field.x[idx], field.y[idx], field.z[idx], magnitude[idx]
        )?;
    }
    file.flush()?;

    println!("Field map written to: {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::JobConfig;

    fn job(text: &str) -> JobConfig {
        toml::from_str(text).unwrap()
    }

    #[test]
    fn test_sources_are_built_in_order() {
        let job = job(
            r#"
            [[charge]]
            trajectory = { type = "stationary", position = [1e-9, 0.0, 0.0] }

            [[charge]]
            q = -1.0e-19
            trajectory = { type = "linear_deceleration", initial_speed = 1e6, deceleration = 1e15 }

            [[dipole]]
            omega_0 = 1e15
            init_d = [0.0, 0.0, 1e-11]
            gamma_0 = 0.0
            masses = [1e-30, 2e-30]
            "#,
        );
        let sim = build_simulation(&job).unwrap();
        assert_eq!(sim.point_charges().len(), 2);
        assert_eq!(sim.charge_count(), 4);
        assert_eq!(sim.dipoles()[0].gamma_0(), 0.0);
        assert_eq!(sim.dipoles()[0].masses(), [1e-30, 2e-30]);
    }

    #[test]
    fn test_zero_dipole_displacement_is_rejected() {
        let job = job(
            r#"
            [[dipole]]
            omega_0 = 1e15
            init_d = [0.0, 0.0, 0.0]
            "#,
        );
        assert!(build_simulation(&job).is_err());
    }

    #[test]
    fn test_plane_wave_fields_are_orthogonal() {
        let job = job(
            r#"
            [external_field]
            type = "plane_wave"
            amplitude = 1e8
            wavelength = 1e-8
            direction = [1.0, 0.0, 0.0]
            polarization = [0.0, 0.0, 1.0]
            "#,
        );
        let sim = build_simulation(&job).unwrap();
        let fields = sim.external_fields();
        let r = [2.5e-9, 0.0, 0.0];
        let e = fields.e_at(0.0, &r);
        let b = fields.b_at(0.0, &r);
        assert!((e[2] - 1e8).abs() < 1e-3);
        assert!((b[1] + 1e8 / C).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_backend_fails_preparation() {
        let job = job(
            r#"
            [compute]
            backend = "quantum"
            "#,
        );
        assert!(prepare(&job).is_err());
    }
}
