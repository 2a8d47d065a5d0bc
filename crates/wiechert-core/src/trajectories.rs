//! Prescribed charge trajectories.
//!
//! Each motion is analytic, so position, velocity and acceleration are
//! exactly consistent with one another. Motions with an optional active
//! window (`start_zero`, `stop_t`) hold the boundary position with zero
//! velocity and acceleration outside it.

use crate::charge::{Trajectory, TrajectoryKey};
use crate::types::{add, normalise, scale, Vec3};

/// Encode an optional stop time as two finite parameters.
fn stop_params(stop_t: Option<f64>) -> [f64; 2] {
    match stop_t {
        Some(t) => [1.0, t],
        None => [0.0, 0.0],
    }
}

/// Clamp `t` into an active window, returning the effective time and
/// whether the motion is live at `t`.
fn active_time(t: f64, start_zero: bool, stop_t: Option<f64>) -> (f64, bool) {
    if start_zero && t < 0.0 {
        return (0.0, false);
    }
    match stop_t {
        Some(stop) if t > stop => (stop, false),
        _ => (t, true),
    }
}

/// A charge fixed in space.
#[derive(Debug, Clone, PartialEq)]
pub struct Stationary {
    pub position: Vec3,
}

impl Stationary {
    pub fn new(position: Vec3) -> Self {
        Self { position }
    }
}

impl Trajectory for Stationary {
    fn position(&self, _t: f64) -> Vec3 {
        self.position
    }

    fn velocity(&self, _t: f64) -> Vec3 {
        [0.0; 3]
    }

    fn acceleration(&self, _t: f64) -> Vec3 {
        [0.0; 3]
    }

    fn key(&self) -> TrajectoryKey {
        TrajectoryKey::new("stationary", self.position.to_vec())
    }
}

/// Sinusoidal motion $\mathbf{r}(t) = \mathbf{r}_0 + \hat{\mathbf{d}} A \cos(\omega t)$.
#[derive(Debug, Clone, PartialEq)]
pub struct Oscillating {
    origin: Vec3,
    direction: Vec3,
    amplitude: f64,
    omega: f64,
    start_zero: bool,
    stop_t: Option<f64>,
}

impl Oscillating {
    /// A zero `direction` leaves the charge at `origin`.
    pub fn new(origin: Vec3, direction: Vec3, amplitude: f64, omega: f64) -> Self {
        Self {
            origin,
            direction: normalise(&direction).unwrap_or([0.0; 3]),
            amplitude,
            omega,
            start_zero: false,
            stop_t: None,
        }
    }

    /// Hold the $t = 0$ position for all negative times.
    pub fn starting_at_rest(mut self) -> Self {
        self.start_zero = true;
        self
    }

    /// Freeze the motion after `stop_t`.
    pub fn stopping_at(mut self, stop_t: f64) -> Self {
        self.stop_t = Some(stop_t);
        self
    }
}

impl Trajectory for Oscillating {
    fn position(&self, t: f64) -> Vec3 {
        let (te, _) = active_time(t, self.start_zero, self.stop_t);
        add(
            &self.origin,
            &scale(self.amplitude * (self.omega * te).cos(), &self.direction),
        )
    }

    fn velocity(&self, t: f64) -> Vec3 {
        match active_time(t, self.start_zero, self.stop_t) {
            (te, true) => scale(
                -self.amplitude * self.omega * (self.omega * te).sin(),
                &self.direction,
            ),
            _ => [0.0; 3],
        }
    }

    fn acceleration(&self, t: f64) -> Vec3 {
        match active_time(t, self.start_zero, self.stop_t) {
            (te, true) => scale(
                -self.amplitude * self.omega.powi(2) * (self.omega * te).cos(),
                &self.direction,
            ),
            _ => [0.0; 3],
        }
    }

    fn key(&self) -> TrajectoryKey {
        let stop = stop_params(self.stop_t);
        TrajectoryKey::new(
            "oscillating",
            vec![
                self.origin[0],
                self.origin[1],
                self.origin[2],
                self.direction[0],
                self.direction[1],
                self.direction[2],
                self.amplitude,
                self.omega,
                if self.start_zero { 1.0 } else { 0.0 },
                stop[0],
                stop[1],
            ],
        )
    }
}

/// Circular orbit of radius `radius` about the origin in the x–y plane,
/// counter-clockwise at angular frequency `omega`.
#[derive(Debug, Clone, PartialEq)]
pub struct Orbiting {
    radius: f64,
    omega: f64,
    start_zero: bool,
    stop_t: Option<f64>,
}

impl Orbiting {
    pub fn new(radius: f64, omega: f64) -> Self {
        Self {
            radius,
            omega,
            start_zero: false,
            stop_t: None,
        }
    }

    pub fn starting_at_rest(mut self) -> Self {
        self.start_zero = true;
        self
    }

    pub fn stopping_at(mut self, stop_t: f64) -> Self {
        self.stop_t = Some(stop_t);
        self
    }
}

impl Trajectory for Orbiting {
    fn position(&self, t: f64) -> Vec3 {
        let (te, _) = active_time(t, self.start_zero, self.stop_t);
        let phase = self.omega * te;
        [self.radius * phase.cos(), self.radius * phase.sin(), 0.0]
    }

    fn velocity(&self, t: f64) -> Vec3 {
        match active_time(t, self.start_zero, self.stop_t) {
            (te, true) => {
                let phase = self.omega * te;
                let speed = self.radius * self.omega;
                [-speed * phase.sin(), speed * phase.cos(), 0.0]
            }
            _ => [0.0; 3],
        }
    }

    fn acceleration(&self, t: f64) -> Vec3 {
        match active_time(t, self.start_zero, self.stop_t) {
            (te, true) => {
                let phase = self.omega * te;
                let centripetal = self.radius * self.omega.powi(2);
                [-centripetal * phase.cos(), -centripetal * phase.sin(), 0.0]
            }
            _ => [0.0; 3],
        }
    }

    fn key(&self) -> TrajectoryKey {
        let stop = stop_params(self.stop_t);
        TrajectoryKey::new(
            "orbiting",
            vec![
                self.radius,
                self.omega,
                if self.start_zero { 1.0 } else { 0.0 },
                stop[0],
                stop[1],
            ],
        )
    }
}

/// Uniform motion along x: $x(t) = x_0 + v t$.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearVelocity {
    speed: f64,
    initial: Vec3,
}

impl LinearVelocity {
    pub fn new(speed: f64, initial: Vec3) -> Self {
        Self { speed, initial }
    }
}

impl Trajectory for LinearVelocity {
    fn position(&self, t: f64) -> Vec3 {
        [self.initial[0] + self.speed * t, self.initial[1], self.initial[2]]
    }

    fn velocity(&self, _t: f64) -> Vec3 {
        [self.speed, 0.0, 0.0]
    }

    fn acceleration(&self, _t: f64) -> Vec3 {
        [0.0; 3]
    }

    fn key(&self) -> TrajectoryKey {
        TrajectoryKey::new(
            "linear_velocity",
            vec![self.speed, self.initial[0], self.initial[1], self.initial[2]],
        )
    }
}

/// At rest at the origin for $t < 0$, then uniformly accelerated along x.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearAcceleration {
    acceleration: f64,
}

impl LinearAcceleration {
    pub fn new(acceleration: f64) -> Self {
        Self { acceleration }
    }
}

impl Trajectory for LinearAcceleration {
    fn position(&self, t: f64) -> Vec3 {
        let t = t.max(0.0);
        [0.5 * self.acceleration * t * t, 0.0, 0.0]
    }

    fn velocity(&self, t: f64) -> Vec3 {
        [self.acceleration * t.max(0.0), 0.0, 0.0]
    }

    fn acceleration(&self, t: f64) -> Vec3 {
        if t < 0.0 {
            [0.0; 3]
        } else {
            [self.acceleration, 0.0, 0.0]
        }
    }

    fn key(&self) -> TrajectoryKey {
        TrajectoryKey::new("linear_acceleration", vec![self.acceleration])
    }
}

/// Uniform motion along x at `initial_speed` for $t < 0$, deceleration at
/// `deceleration` from $t = 0$ until `stop_t`, and rest afterwards.
///
/// `stop_t` defaults to `initial_speed / deceleration`, the instant the
/// charge comes to rest on its own.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearDeceleration {
    initial_speed: f64,
    deceleration: f64,
    stop_t: f64,
}

impl LinearDeceleration {
    pub fn new(initial_speed: f64, deceleration: f64) -> Self {
        Self {
            initial_speed,
            deceleration,
            stop_t: initial_speed / deceleration,
        }
    }

    pub fn stopping_at(mut self, stop_t: f64) -> Self {
        self.stop_t = stop_t;
        self
    }

    fn x(&self, t: f64) -> f64 {
        self.initial_speed * t - 0.5 * self.deceleration * t * t
    }
}

impl Trajectory for LinearDeceleration {
    fn position(&self, t: f64) -> Vec3 {
        let x = if t < 0.0 {
            self.initial_speed * t
        } else {
            self.x(t.min(self.stop_t))
        };
        [x, 0.0, 0.0]
    }

    fn velocity(&self, t: f64) -> Vec3 {
        let v = if t < 0.0 {
            self.initial_speed
        } else if t < self.stop_t {
            self.initial_speed - self.deceleration * t
        } else {
            0.0
        };
        [v, 0.0, 0.0]
    }

    fn acceleration(&self, t: f64) -> Vec3 {
        if (0.0..self.stop_t).contains(&t) {
            [-self.deceleration, 0.0, 0.0]
        } else {
            [0.0; 3]
        }
    }

    fn key(&self) -> TrajectoryKey {
        TrajectoryKey::new(
            "linear_deceleration",
            vec![self.initial_speed, self.deceleration, self.stop_t],
        )
    }
}
