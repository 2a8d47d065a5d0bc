//! Core types shared across the engine.
//!
//! Small fixed-size vector helpers, the field-component selector, the
//! array containers returned by field queries, and the parameters of a
//! dipole run.

use std::path::PathBuf;

use ndarray::{Array, Array3, Dimension};
use serde::{Deserialize, Serialize};

use crate::constants::C;

/// A Cartesian 3-vector in SI units.
pub type Vec3 = [f64; 3];

pub fn dot(a: &Vec3, b: &Vec3) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

pub fn cross(a: &Vec3, b: &Vec3) -> Vec3 {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

pub fn norm(v: &Vec3) -> f64 {
    dot(v, v).sqrt()
}

pub fn add(a: &Vec3, b: &Vec3) -> Vec3 {
    [a[0] + b[0], a[1] + b[1], a[2] + b[2]]
}

pub fn sub(a: &Vec3, b: &Vec3) -> Vec3 {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

pub fn scale(s: f64, v: &Vec3) -> Vec3 {
    [s * v[0], s * v[1], s * v[2]]
}

/// Unit vector along `v`, or `None` for a zero or non-finite vector.
pub fn normalise(v: &Vec3) -> Option<Vec3> {
    let len = norm(v);
    if len > 0.0 && len.is_finite() {
        Some(scale(1.0 / len, v))
    } else {
        None
    }
}

/// Which Liénard–Wiechert term a field query returns.
///
/// The velocity term falls off as $1/r^2$ and dominates in the near field;
/// the acceleration term falls off as $1/r$ and carries the radiation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldComponent {
    #[default]
    Total,
    Velocity,
    Acceleration,
}

/// Velocity and acceleration contributions to a field at one point.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FieldTerms {
    pub velocity: Vec3,
    pub acceleration: Vec3,
}

impl FieldTerms {
    pub fn total(&self) -> Vec3 {
        add(&self.velocity, &self.acceleration)
    }

    pub fn select(&self, component: FieldComponent) -> Vec3 {
        match component {
            FieldComponent::Total => self.total(),
            FieldComponent::Velocity => self.velocity,
            FieldComponent::Acceleration => self.acceleration,
        }
    }

    /// Accumulate another contribution in place.
    pub fn accumulate(&mut self, other: &FieldTerms) {
        self.velocity = add(&self.velocity, &other.velocity);
        self.acceleration = add(&self.acceleration, &other.acceleration);
    }
}

/// A vector field sampled on a coordinate mesh: one array per component,
/// each shaped like the query coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorField<D: Dimension> {
    pub x: Array<f64, D>,
    pub y: Array<f64, D>,
    pub z: Array<f64, D>,
}

impl<D: Dimension> VectorField<D> {
    /// Split an array of 3-vectors into its component arrays.
    pub fn from_vectors(vectors: &Array<Vec3, D>) -> Self {
        Self {
            x: vectors.mapv(|v| v[0]),
            y: vectors.mapv(|v| v[1]),
            z: vectors.mapv(|v| v[2]),
        }
    }

    /// Pointwise magnitude $|\mathbf{F}|$.
    pub fn magnitude(&self) -> Array<f64, D> {
        let mut out = self.x.mapv(|v| v * v);
        out.zip_mut_with(&self.y, |acc, &v| *acc += v * v);
        out.zip_mut_with(&self.z, |acc, &v| *acc += v * v);
        out.mapv_inplace(f64::sqrt);
        out
    }

    pub fn components(&self) -> [&Array<f64, D>; 3] {
        [&self.x, &self.y, &self.z]
    }
}

/// Build matrix-indexed (`ij`) coordinate meshes from three axes.
///
/// `x[[i, j, k]] == xs[i]`, `y[[i, j, k]] == ys[j]`, `z[[i, j, k]] == zs[k]`.
pub fn meshgrid_ij(xs: &[f64], ys: &[f64], zs: &[f64]) -> (Array3<f64>, Array3<f64>, Array3<f64>) {
    let shape = (xs.len(), ys.len(), zs.len());
    (
        Array3::from_shape_fn(shape, |(i, _, _)| xs[i]),
        Array3::from_shape_fn(shape, |(_, j, _)| ys[j]),
        Array3::from_shape_fn(shape, |(_, _, k)| zs[k]),
    )
}

/// Evenly spaced samples over `[start, end]`, endpoints included.
pub fn linspace(start: f64, end: f64, points: usize) -> Vec<f64> {
    (0..points)
        .map(|i| start + (end - start) * i as f64 / (points.saturating_sub(1)).max(1) as f64)
        .collect()
}

/// When the driving field of a dipole is evaluated inside one RK4 step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrivingFieldSampling {
    /// Evaluate once at $t_n$ and hold it constant over all four stages.
    /// The forcing is first-order accurate in time; the oscillator itself
    /// stays fourth-order.
    #[default]
    StepStart,
    /// Re-evaluate at $t_n$, $t_n + dt/2$ and $t_n + dt$ with the dipole
    /// origin moved to each stage time.
    PerStage,
}

/// Parameters defining a dipole run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Number of recorded time samples (including $t = 0$).
    pub timesteps: usize,
    /// Time step (s).
    pub dt: f64,
    /// Record the driving-field decomposition for every dipole at every step.
    pub save_e: bool,
    /// Speed ceiling for dipole member charges (m/s).
    pub max_vel: f64,
    /// Forcing evaluation inside the RK4 step.
    pub driving_field: DrivingFieldSampling,
    /// Run-state file to restore from before and append to after the run.
    pub state_file: Option<PathBuf>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            timesteps: 1000,
            dt: 1e-18,
            save_e: false,
            max_vel: C / 100.0,
            driving_field: DrivingFieldSampling::StepStart,
            state_file: None,
        }
    }
}

impl RunConfig {
    pub fn new(timesteps: usize, dt: f64) -> Self {
        Self {
            timesteps,
            dt,
            ..Default::default()
        }
    }

    pub fn with_saved_fields(mut self, save_e: bool) -> Self {
        self.save_e = save_e;
        self
    }

    pub fn with_max_velocity(mut self, max_vel: f64) -> Self {
        self.max_vel = max_vel;
        self
    }

    pub fn with_driving_field(mut self, sampling: DrivingFieldSampling) -> Self {
        self.driving_field = sampling;
        self
    }

    pub fn with_state_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.state_file = Some(path.into());
        self
    }
}

/// Outcome of a completed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    /// Number of integration steps performed (zero when restored).
    pub steps: usize,
    /// The dipole histories were restored from a state file.
    pub restored: bool,
}
