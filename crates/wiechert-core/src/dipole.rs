//! Lorentz-oscillator dipoles.
//!
//! A [`Dipole`] binds two opposite charges about an origin trajectory. The
//! charge separation $\mathbf{d}$ obeys the driven damped oscillator
//!
//! $$
//! \ddot{\mathbf{d}} = \frac{q}{m_\text{eff}} \mathbf{E}_\text{drive}
//! - \gamma_0 \dot{\mathbf{d}} - \omega_0^2 \mathbf{d}
//! $$
//!
//! along a fixed polarization axis. The dipole records $\mathbf{d}$,
//! $\dot{\mathbf{d}}$ and $\ddot{\mathbf{d}}$ once per timestep; its two
//! member charges are derived from that history on demand, so field queries
//! at any recorded time see a consistent pair.

use std::fmt;
use std::sync::Arc;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::charge::{Charge, ChargeKey, Kinematics, Trajectory, TrajectoryKey};
use crate::constants::{C, COULOMB, ELECTRON_MASS, ELEMENTARY_CHARGE};
use crate::error::SimulationError;
use crate::types::{add, dot, norm, normalise, scale, Vec3};

/// One of the two charges bound in a dipole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Member {
    Negative,
    Positive,
}

impl Member {
    pub const BOTH: [Member; 2] = [Member::Negative, Member::Positive];

    fn label(self) -> &'static str {
        match self {
            Member::Negative => "negative",
            Member::Positive => "positive",
        }
    }
}

/// Source of the damping rate $\gamma_0$.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Damping {
    /// Free-space radiative damping
    /// $\gamma_0 = \frac{1}{4\pi\epsilon_0} \frac{2 q^2 \omega_0^2}{3 m_\text{eff} c^3}$.
    Radiative,
    /// A fixed rate (1/s).
    Fixed(f64),
}

/// Displacement, velocity and acceleration of the dipole moment at one instant.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MomentSample {
    pub displacement: Vec3,
    pub velocity: Vec3,
    pub acceleration: Vec3,
}

impl MomentSample {
    fn lerp(a: &MomentSample, b: &MomentSample, frac: f64) -> MomentSample {
        let mix = |x: &Vec3, y: &Vec3| -> Vec3 {
            [
                x[0] + frac * (y[0] - x[0]),
                x[1] + frac * (y[1] - x[1]),
                x[2] + frac * (y[2] - x[2]),
            ]
        };
        MomentSample {
            displacement: mix(&a.displacement, &b.displacement),
            velocity: mix(&a.velocity, &b.velocity),
            acceleration: mix(&a.acceleration, &b.acceleration),
        }
    }
}

/// Per-timestep driving field seen by a dipole, projected on its
/// polarization axis. Arrays have shape `(timesteps, 3)`.
#[derive(Debug, Clone, PartialEq)]
pub struct DrivingFieldHistory {
    pub total: Array2<f64>,
    pub velocity: Array2<f64>,
    pub acceleration: Array2<f64>,
}

impl DrivingFieldHistory {
    fn zeros(timesteps: usize) -> Self {
        Self {
            total: Array2::zeros((timesteps, 3)),
            velocity: Array2::zeros((timesteps, 3)),
            acceleration: Array2::zeros((timesteps, 3)),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct History {
    dt: f64,
    recorded: usize,
    displacement: Array2<f64>,
    velocity: Array2<f64>,
    acceleration: Array2<f64>,
    driving: Option<DrivingFieldHistory>,
}

fn row(a: &Array2<f64>, i: usize) -> Vec3 {
    [a[[i, 0]], a[[i, 1]], a[[i, 2]]]
}

fn set_row(a: &mut Array2<f64>, i: usize, v: &Vec3) {
    for (c, value) in v.iter().enumerate() {
        a[[i, c]] = *value;
    }
}

fn rows(a: &Array2<f64>, len: usize) -> Vec<Vec3> {
    (0..len).map(|i| row(a, i)).collect()
}

fn from_rows(values: &[Vec3], len: usize) -> Array2<f64> {
    let mut a = Array2::zeros((len, 3));
    for (i, v) in values.iter().enumerate() {
        set_row(&mut a, i, v);
    }
    a
}

/// Serializable snapshot of a dipole's full run history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DipoleState {
    pub dt: f64,
    pub timesteps: usize,
    pub recorded: usize,
    pub displacement: Vec<Vec3>,
    pub velocity: Vec<Vec3>,
    pub acceleration: Vec<Vec3>,
    pub driving: Option<DrivingFieldState>,
}

/// Serializable form of [`DrivingFieldHistory`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrivingFieldState {
    pub total: Vec<Vec3>,
    pub velocity: Vec<Vec3>,
    pub acceleration: Vec<Vec3>,
}

/// A Lorentz-oscillator dipole.
#[derive(Clone)]
pub struct Dipole {
    omega_0: f64,
    q: f64,
    /// Masses of the negative and positive charge (kg).
    masses: [f64; 2],
    damping: Damping,
    polarization: Vec3,
    init_d: Vec3,
    init_v: Vec3,
    origin: Arc<dyn Trajectory>,
    history: History,
}

impl fmt::Debug for Dipole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dipole")
            .field("omega_0", &self.omega_0)
            .field("q", &self.q)
            .field("masses", &self.masses)
            .field("damping", &self.damping)
            .field("polarization", &self.polarization)
            .field("origin", &self.origin)
            .field("recorded", &self.history.recorded)
            .finish()
    }
}

impl Dipole {
    /// Create a dipole of two electron-mass charges $\pm e$ with radiative
    /// damping.
    ///
    /// # Arguments
    /// * `omega_0` - Natural angular frequency (rad/s).
    /// * `origin` - Trajectory of the dipole's centre of mass.
    /// * `init_d` - Initial charge separation (m). Its direction fixes the
    ///   polarization axis, so it must be non-zero.
    pub fn new(
        omega_0: f64,
        origin: impl Trajectory + 'static,
        init_d: Vec3,
    ) -> Result<Self, SimulationError> {
        Self::with_shared_origin(omega_0, Arc::new(origin), init_d)
    }

    pub fn with_shared_origin(
        omega_0: f64,
        origin: Arc<dyn Trajectory>,
        init_d: Vec3,
    ) -> Result<Self, SimulationError> {
        if !(omega_0.is_finite() && omega_0 > 0.0) {
            return Err(SimulationError::InvalidDipole(format!(
                "natural frequency must be positive, got {omega_0}"
            )));
        }
        let polarization = normalise(&init_d).ok_or_else(|| {
            SimulationError::InvalidDipole(
                "initial displacement must be non-zero to fix the polarization".into(),
            )
        })?;
        Ok(Self {
            omega_0,
            q: ELEMENTARY_CHARGE,
            masses: [ELECTRON_MASS, ELECTRON_MASS],
            damping: Damping::Radiative,
            polarization,
            init_d,
            init_v: [0.0; 3],
            origin,
            history: History::default(),
        })
    }

    /// Set the charge magnitude (C); the members carry $\mp q$.
    pub fn with_charge(mut self, q: f64) -> Self {
        self.q = q;
        self
    }

    /// Set the masses of the negative and positive charge (kg).
    pub fn with_masses(mut self, m_negative: f64, m_positive: f64) -> Self {
        self.masses = [m_negative, m_positive];
        self
    }

    /// Set the initial moment velocity (m/s), projected on the polarization axis.
    pub fn with_initial_velocity(mut self, init_v: Vec3) -> Self {
        self.init_v = scale(dot(&init_v, &self.polarization), &self.polarization);
        self
    }

    /// Replace radiative damping with a fixed rate (1/s).
    pub fn with_damping(mut self, gamma_0: f64) -> Self {
        self.damping = Damping::Fixed(gamma_0);
        self
    }

    pub fn omega_0(&self) -> f64 {
        self.omega_0
    }

    pub fn q(&self) -> f64 {
        self.q
    }

    pub fn masses(&self) -> [f64; 2] {
        self.masses
    }

    /// Reduced mass $m_1 m_2 / (m_1 + m_2)$.
    pub fn m_eff(&self) -> f64 {
        self.masses[0] * self.masses[1] / (self.masses[0] + self.masses[1])
    }

    pub fn damping(&self) -> Damping {
        self.damping
    }

    /// Damping rate $\gamma_0$ (1/s).
    pub fn gamma_0(&self) -> f64 {
        match self.damping {
            Damping::Fixed(gamma) => gamma,
            Damping::Radiative => {
                COULOMB * 2.0 * self.q * self.q * self.omega_0 * self.omega_0
                    / (3.0 * self.m_eff() * C.powi(3))
            }
        }
    }

    /// Unit polarization vector.
    pub fn polarization(&self) -> Vec3 {
        self.polarization
    }

    pub fn initial_displacement(&self) -> Vec3 {
        self.init_d
    }

    pub fn initial_velocity(&self) -> Vec3 {
        self.init_v
    }

    pub fn origin(&self) -> &dyn Trajectory {
        self.origin.as_ref()
    }

    /// Time step of the current history (zero before the first reset).
    pub fn dt(&self) -> f64 {
        self.history.dt
    }

    /// Number of allocated timesteps.
    pub fn timesteps(&self) -> usize {
        self.history.displacement.nrows()
    }

    /// Number of timesteps holding computed state.
    pub fn recorded_steps(&self) -> usize {
        self.history.recorded
    }

    /// Moment displacement history, shape `(timesteps, 3)`.
    pub fn moment_displacement(&self) -> &Array2<f64> {
        &self.history.displacement
    }

    pub fn moment_velocity(&self) -> &Array2<f64> {
        &self.history.velocity
    }

    pub fn moment_acceleration(&self) -> &Array2<f64> {
        &self.history.acceleration
    }

    /// Saved driving-field decomposition, if the run recorded it.
    pub fn driving_field(&self) -> Option<&DrivingFieldHistory> {
        self.history.driving.as_ref()
    }

    /// (Re)allocate the history for a run of `timesteps` samples and seed
    /// sample 0 with the initial conditions.
    pub fn reset(&mut self, timesteps: usize, dt: f64, save_e: bool) {
        let mut history = History {
            dt,
            recorded: 0,
            displacement: Array2::zeros((timesteps, 3)),
            velocity: Array2::zeros((timesteps, 3)),
            acceleration: Array2::zeros((timesteps, 3)),
            driving: save_e.then(|| DrivingFieldHistory::zeros(timesteps)),
        };
        if timesteps > 0 {
            set_row(&mut history.displacement, 0, &self.init_d);
            set_row(&mut history.velocity, 0, &self.init_v);
            history.recorded = 1;
        }
        self.history = history;
    }

    /// Displacement and velocity recorded at `step`.
    pub fn moment_at(&self, step: usize) -> (Vec3, Vec3) {
        (
            row(&self.history.displacement, step),
            row(&self.history.velocity, step),
        )
    }

    fn sample(&self, step: usize) -> MomentSample {
        MomentSample {
            displacement: row(&self.history.displacement, step),
            velocity: row(&self.history.velocity, step),
            acceleration: row(&self.history.acceleration, step),
        }
    }

    /// Moment state at an arbitrary time.
    ///
    /// Times at or before zero return sample 0, times past the last recorded
    /// step return that step, and times in between interpolate linearly.
    /// Before any run the dipole sits at its initial conditions.
    pub fn moment_at_time(&self, t: f64) -> MomentSample {
        let recorded = self.history.recorded;
        if recorded == 0 {
            return MomentSample {
                displacement: self.init_d,
                velocity: self.init_v,
                acceleration: [0.0; 3],
            };
        }
        let last = recorded - 1;
        if t <= 0.0 || last == 0 {
            return self.sample(0);
        }
        let index = t / self.history.dt;
        if index >= last as f64 {
            return self.sample(last);
        }
        let lower = index.floor() as usize;
        MomentSample::lerp(
            &self.sample(lower),
            &self.sample(lower + 1),
            index - lower as f64,
        )
    }

    /// Signed share of the separation carried by a member, so that the
    /// centre of mass stays on the origin.
    pub fn member_weight(&self, member: Member) -> f64 {
        let total = self.masses[0] + self.masses[1];
        match member {
            Member::Negative => -self.masses[1] / total,
            Member::Positive => self.masses[0] / total,
        }
    }

    /// Kinematics of a member charge at time `t`.
    pub fn member_kinematics(&self, member: Member, t: f64) -> Kinematics {
        let w = self.member_weight(member);
        let origin = self.origin.kinematics(t);
        let moment = self.moment_at_time(t);
        Kinematics {
            position: add(&origin.position, &scale(w, &moment.displacement)),
            velocity: add(&origin.velocity, &scale(w, &moment.velocity)),
            acceleration: add(&origin.acceleration, &scale(w, &moment.acceleration)),
        }
    }

    /// Speed of a member charge at a recorded step.
    pub fn member_speed(&self, member: Member, step: usize) -> f64 {
        let t = step as f64 * self.history.dt;
        let v = add(
            &self.origin.velocity(t),
            &scale(self.member_weight(member), &row(&self.history.velocity, step)),
        );
        norm(&v)
    }

    /// Borrow one member as a field source.
    pub fn member(&self, member: Member) -> DipoleCharge<'_> {
        DipoleCharge {
            dipole: self,
            member,
        }
    }

    fn member_key(&self, member: Member) -> ChargeKey {
        let origin = self.origin.key();
        let mut params = vec![
            self.omega_0,
            self.gamma_0(),
            self.masses[0],
            self.masses[1],
        ];
        params.extend_from_slice(&self.init_d);
        params.extend_from_slice(&self.init_v);
        params.extend(origin.params);
        let sign = match member {
            Member::Negative => -1.0,
            Member::Positive => 1.0,
        };
        ChargeKey {
            q: sign * self.q,
            trajectory: TrajectoryKey::new(
                format!("dipole_{}:{}", member.label(), origin.kind),
                params,
            ),
        }
    }

    /// Write the state of step `step` and mark it recorded.
    pub(crate) fn record_step(&mut self, step: usize, displacement: &Vec3, velocity: &Vec3, acceleration: &Vec3) {
        set_row(&mut self.history.displacement, step, displacement);
        set_row(&mut self.history.velocity, step, velocity);
        set_row(&mut self.history.acceleration, step, acceleration);
        self.history.recorded = self.history.recorded.max(step + 1);
    }

    /// Store the driving-field decomposition at `step` if saving is enabled.
    pub(crate) fn record_driving_field(&mut self, step: usize, total: &Vec3, velocity: &Vec3, acceleration: &Vec3) {
        if let Some(driving) = self.history.driving.as_mut() {
            set_row(&mut driving.total, step, total);
            set_row(&mut driving.velocity, step, velocity);
            set_row(&mut driving.acceleration, step, acceleration);
        }
    }

    /// Snapshot the full history.
    pub fn state(&self) -> DipoleState {
        let timesteps = self.timesteps();
        DipoleState {
            dt: self.history.dt,
            timesteps,
            recorded: self.history.recorded,
            displacement: rows(&self.history.displacement, timesteps),
            velocity: rows(&self.history.velocity, timesteps),
            acceleration: rows(&self.history.acceleration, timesteps),
            driving: self.history.driving.as_ref().map(|d| DrivingFieldState {
                total: rows(&d.total, timesteps),
                velocity: rows(&d.velocity, timesteps),
                acceleration: rows(&d.acceleration, timesteps),
            }),
        }
    }

    /// Replace the history with a previously captured snapshot.
    pub fn restore_state(&mut self, state: &DipoleState) -> Result<(), SimulationError> {
        let n = state.timesteps;
        let consistent = state.displacement.len() == n
            && state.velocity.len() == n
            && state.acceleration.len() == n
            && state.recorded <= n
            && state.driving.as_ref().map_or(true, |d| {
                d.total.len() == n && d.velocity.len() == n && d.acceleration.len() == n
            });
        if !consistent {
            return Err(SimulationError::InvalidDipole(format!(
                "inconsistent state snapshot for {n} timesteps"
            )));
        }
        self.history = History {
            dt: state.dt,
            recorded: state.recorded,
            displacement: from_rows(&state.displacement, n),
            velocity: from_rows(&state.velocity, n),
            acceleration: from_rows(&state.acceleration, n),
            driving: state.driving.as_ref().map(|d| DrivingFieldHistory {
                total: from_rows(&d.total, n),
                velocity: from_rows(&d.velocity, n),
                acceleration: from_rows(&d.acceleration, n),
            }),
        };
        Ok(())
    }
}

/// A dipole member viewed as a field source.
#[derive(Debug, Clone, Copy)]
pub struct DipoleCharge<'a> {
    dipole: &'a Dipole,
    member: Member,
}

impl DipoleCharge<'_> {
    pub fn member(&self) -> Member {
        self.member
    }
}

impl Charge for DipoleCharge<'_> {
    fn q(&self) -> f64 {
        match self.member {
            Member::Negative => -self.dipole.q,
            Member::Positive => self.dipole.q,
        }
    }

    fn kinematics(&self, t: f64) -> Kinematics {
        self.dipole.member_kinematics(self.member, t)
    }

    fn key(&self) -> ChargeKey {
        self.dipole.member_key(self.member)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trajectories::Stationary;
    use approx::assert_relative_eq;

    fn dipole() -> Dipole {
        Dipole::new(1e15, Stationary::new([1e-9, 0.0, 0.0]), [0.0, 0.0, 1e-11]).unwrap()
    }

    #[test]
    fn test_zero_displacement_is_rejected() {
        let err = Dipole::new(1e15, Stationary::new([0.0; 3]), [0.0; 3]).unwrap_err();
        assert!(matches!(err, SimulationError::InvalidDipole(_)));
    }

    #[test]
    fn test_equal_masses_split_separation_in_half() {
        let d = dipole();
        let neg = d.member_kinematics(Member::Negative, 0.0).position;
        let pos = d.member_kinematics(Member::Positive, 0.0).position;
        assert_relative_eq!(pos[2], 0.5e-11);
        assert_relative_eq!(neg[2], -0.5e-11);
        assert_relative_eq!(pos[0], 1e-9);
        assert_relative_eq!(d.m_eff(), ELECTRON_MASS / 2.0);
    }

    #[test]
    fn test_unequal_masses_keep_centre_of_mass_on_origin() {
        let d = dipole().with_masses(1.0, 3.0);
        let neg = d.member_kinematics(Member::Negative, 0.0).position;
        let pos = d.member_kinematics(Member::Positive, 0.0).position;
        assert_relative_eq!(pos[2] - neg[2], 1e-11, max_relative = 1e-12);
        assert_relative_eq!(1.0 * neg[2] + 3.0 * pos[2], 0.0, epsilon = 1e-25);
    }

    #[test]
    fn test_radiative_damping_rate() {
        let d = dipole();
        let m_eff = ELECTRON_MASS / 2.0;
        let expected = COULOMB * 2.0 * ELEMENTARY_CHARGE.powi(2) * 1e30 / (3.0 * m_eff * C.powi(3));
        assert_relative_eq!(d.gamma_0(), expected, max_relative = 1e-12);
        assert_eq!(d.with_damping(5.0).gamma_0(), 5.0);
    }

    #[test]
    fn test_initial_velocity_is_projected() {
        let d = dipole().with_initial_velocity([3.0, 4.0, 5.0]);
        assert_eq!(d.initial_velocity(), [0.0, 0.0, 5.0]);
    }

    #[test]
    fn test_history_interpolation_and_clamping() {
        let mut d = dipole();
        d.reset(4, 1.0, false);
        d.record_step(1, &[0.0, 0.0, 3e-11], &[0.0, 0.0, 2.0], &[0.0, 0.0, 1.0]);

        assert_eq!(d.recorded_steps(), 2);
        assert_eq!(d.moment_at_time(-1.0).displacement, [0.0, 0.0, 1e-11]);
        assert_relative_eq!(d.moment_at_time(0.5).displacement[2], 2e-11);
        assert_relative_eq!(d.moment_at_time(0.5).velocity[2], 1.0);
        // Beyond the last recorded step the state is held.
        assert_eq!(d.moment_at_time(3.0).displacement, [0.0, 0.0, 3e-11]);
    }

    #[test]
    fn test_state_round_trip() {
        let mut d = dipole();
        d.reset(3, 2.0, true);
        d.record_step(1, &[0.0, 0.0, 1.0], &[0.0, 0.0, 2.0], &[0.0, 0.0, 3.0]);
        d.record_driving_field(1, &[0.0, 0.0, 4.0], &[0.0, 0.0, 5.0], &[0.0, 0.0, -1.0]);
        let state = d.state();

        let mut fresh = dipole();
        fresh.restore_state(&state).unwrap();
        assert_eq!(fresh.state(), state);
        assert_eq!(fresh.dt(), 2.0);
        assert_eq!(fresh.driving_field().unwrap().total[[1, 2]], 4.0);
    }

    #[test]
    fn test_member_charges_are_opposite() {
        let d = dipole();
        assert_eq!(d.member(Member::Negative).q(), -ELEMENTARY_CHARGE);
        assert_eq!(d.member(Member::Positive).q(), ELEMENTARY_CHARGE);
        assert_ne!(d.member(Member::Negative).key(), d.member(Member::Positive).key());
    }
}
