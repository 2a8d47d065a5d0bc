//! Point charges and the trajectories that move them.
//!
//! A [`Trajectory`] supplies position, velocity and acceleration as functions
//! of time. A [`Charge`] adds a signed charge magnitude and the light-cone
//! residual the retarded-time solver drives to zero. Prescribed motions live
//! in [`crate::trajectories`]; dipole member charges are views over a
//! [`Dipole`](crate::dipole::Dipole) history.

use std::fmt::Debug;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::constants::C;
use crate::types::{norm, sub, Vec3};

/// Identity of a trajectory: a kind tag plus the numeric parameters that
/// determine it. Two trajectories with equal keys move identically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryKey {
    pub kind: String,
    pub params: Vec<f64>,
}

impl TrajectoryKey {
    pub fn new(kind: impl Into<String>, params: Vec<f64>) -> Self {
        Self {
            kind: kind.into(),
            params,
        }
    }
}

/// Kinematic state of a charge at one instant.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Kinematics {
    pub position: Vec3,
    pub velocity: Vec3,
    pub acceleration: Vec3,
}

/// A prescribed path through space.
pub trait Trajectory: Debug + Send + Sync {
    /// Position at time `t` (m).
    fn position(&self, t: f64) -> Vec3;

    /// Velocity at time `t` (m/s).
    fn velocity(&self, t: f64) -> Vec3;

    /// Acceleration at time `t` (m/s²).
    fn acceleration(&self, t: f64) -> Vec3;

    /// Identity key used to match persisted runs.
    fn key(&self) -> TrajectoryKey;

    fn kinematics(&self, t: f64) -> Kinematics {
        Kinematics {
            position: self.position(t),
            velocity: self.velocity(t),
            acceleration: self.acceleration(t),
        }
    }
}

/// Identity of a charge for run matching: charge magnitude plus trajectory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChargeKey {
    pub q: f64,
    pub trajectory: TrajectoryKey,
}

/// A source of Liénard–Wiechert fields.
pub trait Charge {
    /// Signed charge (C).
    fn q(&self) -> f64;

    /// Kinematic state at time `t`.
    fn kinematics(&self, t: f64) -> Kinematics;

    fn key(&self) -> ChargeKey;

    fn position(&self, t: f64) -> Vec3 {
        self.kinematics(t).position
    }

    fn velocity(&self, t: f64) -> Vec3 {
        self.kinematics(t).velocity
    }

    fn acceleration(&self, t: f64) -> Vec3 {
        self.kinematics(t).acceleration
    }

    /// Light-cone residual $|\mathbf{r} - \mathbf{r}_q(t_r)| - c(t - t_r)$ (m).
    ///
    /// Zero exactly when `tr` is the retarded time of `observer` at `t`.
    fn solve_time(&self, tr: f64, t: f64, observer: &Vec3) -> f64 {
        norm(&sub(observer, &self.position(tr))) - C * (t - tr)
    }
}

/// A point charge moving along a prescribed trajectory.
#[derive(Debug, Clone)]
pub struct PointCharge {
    q: f64,
    trajectory: Arc<dyn Trajectory>,
}

impl PointCharge {
    pub fn new(q: f64, trajectory: impl Trajectory + 'static) -> Self {
        Self {
            q,
            trajectory: Arc::new(trajectory),
        }
    }

    /// Build from a trajectory that is already shared.
    pub fn from_shared(q: f64, trajectory: Arc<dyn Trajectory>) -> Self {
        Self { q, trajectory }
    }

    pub fn trajectory(&self) -> &dyn Trajectory {
        self.trajectory.as_ref()
    }
}

impl Charge for PointCharge {
    fn q(&self) -> f64 {
        self.q
    }

    fn kinematics(&self, t: f64) -> Kinematics {
        self.trajectory.kinematics(t)
    }

    fn key(&self) -> ChargeKey {
        ChargeKey {
            q: self.q,
            trajectory: self.trajectory.key(),
        }
    }
}
