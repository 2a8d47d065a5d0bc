//! TOML configuration deserialisation for simulation jobs.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;
use wiechert_core::constants::ELEMENTARY_CHARGE;
use wiechert_core::types::DrivingFieldSampling;
use wiechert_core::{FieldComponent, RunConfig};

/// Top-level job configuration.
#[derive(Debug, Deserialize)]
pub struct JobConfig {
    #[serde(default)]
    pub run: RunSection,
    #[serde(default)]
    pub compute: ComputeConfig,
    #[serde(default, rename = "charge")]
    pub charges: Vec<ChargeConfig>,
    #[serde(default, rename = "dipole")]
    pub dipoles: Vec<DipoleConfig>,
    pub external_field: Option<ExternalFieldConfig>,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Run parameters from TOML.
#[derive(Debug, Deserialize)]
pub struct RunSection {
    #[serde(default = "default_timesteps")]
    pub timesteps: usize,
    #[serde(default = "default_dt")]
    pub dt: f64,
    #[serde(default)]
    pub save_e: bool,
    /// Speed ceiling for dipole charges (m/s). Default: c/100.
    pub max_vel: Option<f64>,
    #[serde(default)]
    pub driving_field: DrivingFieldSampling,
    /// Run-state file to restore from and append to.
    pub state_file: Option<PathBuf>,
}

impl Default for RunSection {
    fn default() -> Self {
        Self {
            timesteps: default_timesteps(),
            dt: default_dt(),
            save_e: false,
            max_vel: None,
            driving_field: DrivingFieldSampling::default(),
            state_file: None,
        }
    }
}

impl RunSection {
    pub fn to_run_config(&self) -> RunConfig {
        let mut config = RunConfig::new(self.timesteps, self.dt)
            .with_saved_fields(self.save_e)
            .with_driving_field(self.driving_field);
        if let Some(max_vel) = self.max_vel {
            config = config.with_max_velocity(max_vel);
        }
        if let Some(path) = &self.state_file {
            config = config.with_state_file(path);
        }
        config
    }
}

fn default_timesteps() -> usize {
    1000
}
fn default_dt() -> f64 {
    1e-18
}

/// Backend selection.
#[derive(Debug, Deserialize)]
pub struct ComputeConfig {
    /// Compute backend: "serial", "cpu", or "distributed". Default: "serial".
    #[serde(default = "default_backend")]
    pub backend: String,
    /// Threads or workers; default depends on the backend.
    pub workers: Option<usize>,
}

impl Default for ComputeConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            workers: None,
        }
    }
}

fn default_backend() -> String {
    "serial".into()
}

/// A prescribed trajectory.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TrajectoryConfig {
    Stationary {
        #[serde(default)]
        position: [f64; 3],
    },
    Oscillating {
        #[serde(default)]
        origin: [f64; 3],
        #[serde(default = "default_axis")]
        direction: [f64; 3],
        amplitude: f64,
        omega: f64,
        #[serde(default)]
        start_zero: bool,
        stop_t: Option<f64>,
    },
    Orbiting {
        radius: f64,
        omega: f64,
        #[serde(default)]
        start_zero: bool,
        stop_t: Option<f64>,
    },
    LinearVelocity {
        speed: f64,
        #[serde(default)]
        initial: [f64; 3],
    },
    LinearAcceleration {
        acceleration: f64,
    },
    LinearDeceleration {
        initial_speed: f64,
        deceleration: f64,
        stop_t: Option<f64>,
    },
}

impl Default for TrajectoryConfig {
    fn default() -> Self {
        TrajectoryConfig::Stationary { position: [0.0; 3] }
    }
}

fn default_axis() -> [f64; 3] {
    [1.0, 0.0, 0.0]
}

/// A point charge.
#[derive(Debug, Deserialize)]
pub struct ChargeConfig {
    /// Charge (C). Default: the elementary charge.
    #[serde(default = "default_q")]
    pub q: f64,
    pub trajectory: TrajectoryConfig,
}

fn default_q() -> f64 {
    ELEMENTARY_CHARGE
}

/// A Lorentz-oscillator dipole.
#[derive(Debug, Deserialize)]
pub struct DipoleConfig {
    pub omega_0: f64,
    #[serde(default)]
    pub origin: TrajectoryConfig,
    pub init_d: [f64; 3],
    #[serde(default)]
    pub init_v: [f64; 3],
    pub q: Option<f64>,
    /// Masses of the negative and positive charge (kg).
    pub masses: Option<[f64; 2]>,
    /// Fixed damping rate (1/s); radiative damping when absent.
    pub gamma_0: Option<f64>,
}

/// An analytic external field.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExternalFieldConfig {
    /// Constant electric field (V/m).
    Uniform { e: [f64; 3] },
    /// Sinusoidal plane wave $A \sin(k(\hat{n}\cdot\mathbf{r} - ct))\,\hat{\epsilon}$.
    PlaneWave {
        amplitude: f64,
        wavelength: f64,
        #[serde(default = "default_axis")]
        direction: [f64; 3],
        #[serde(default = "default_axis")]
        polarization: [f64; 3],
    },
}

/// Output configuration.
#[derive(Debug, Deserialize)]
pub struct OutputConfig {
    /// Output directory (default: "./output").
    #[serde(default = "default_output_dir")]
    pub directory: PathBuf,
    /// Whether to save dipole moment histories as CSV (default: true).
    #[serde(default = "default_true")]
    pub save_moments: bool,
    /// Optional field map written after the run.
    pub field_map: Option<FieldMapConfig>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: default_output_dir(),
            save_moments: true,
            field_map: None,
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./output")
}
fn default_true() -> bool {
    true
}

/// Field map on a plane of constant z.
#[derive(Debug, Deserialize)]
pub struct FieldMapConfig {
    /// Evaluation time (s). Default: the last recorded time of the run.
    pub t: Option<f64>,
    /// Half width of the square map (m).
    pub half_width: f64,
    #[serde(default = "default_points")]
    pub points: usize,
    #[serde(default)]
    pub z: f64,
    #[serde(default)]
    pub component: FieldComponent,
}

fn default_points() -> usize {
    101
}

/// Load and parse a TOML job configuration file.
pub fn load_config(path: &Path) -> anyhow::Result<JobConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let config: JobConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_job_uses_defaults() {
        let job: JobConfig = toml::from_str(
            r#"
            [[dipole]]
            omega_0 = 1e15
            init_d = [0.0, 0.0, 1e-11]
            "#,
        )
        .unwrap();
        assert_eq!(job.run.timesteps, 1000);
        assert_eq!(job.compute.backend, "serial");
        assert_eq!(job.dipoles.len(), 1);
        assert!(matches!(job.dipoles[0].origin, TrajectoryConfig::Stationary { .. }));
        assert!(job.output.save_moments);
    }

    #[test]
    fn test_tagged_trajectories_and_field() {
        let job: JobConfig = toml::from_str(
            r#"
            [run]
            timesteps = 50
            dt = 1e-17
            driving_field = "per_stage"
            state_file = "runs.jsonl"

            [[charge]]
            q = -1.6e-19
            trajectory = { type = "orbiting", radius = 1e-10, omega = 1e16, stop_t = 1e-15 }

            [external_field]
            type = "plane_wave"
            amplitude = 1e8
            wavelength = 1e-8

            [output.field_map]
            half_width = 1e-8
            component = "Acceleration"
            "#,
        )
        .unwrap();
        let config = job.run.to_run_config();
        assert_eq!(config.driving_field, DrivingFieldSampling::PerStage);
        assert_eq!(config.state_file, Some(PathBuf::from("runs.jsonl")));
        assert!(matches!(
            job.charges[0].trajectory,
            TrajectoryConfig::Orbiting { stop_t: Some(_), .. }
        ));
        assert!(matches!(job.external_field, Some(ExternalFieldConfig::PlaneWave { .. })));
        let map = job.output.field_map.unwrap();
        assert_eq!(map.component, FieldComponent::Acceleration);
        assert_eq!(map.points, 101);
    }
}
