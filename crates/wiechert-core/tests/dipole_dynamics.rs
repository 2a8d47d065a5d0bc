//! Dipole integration: free oscillation, driving, coupling and the velocity
//! ceiling.

use approx::{assert_abs_diff_eq, assert_relative_eq};
use wiechert_core::constants::{ELECTRON_MASS, ELEMENTARY_CHARGE};
use wiechert_core::trajectories::Stationary;
use wiechert_core::types::DrivingFieldSampling;
use wiechert_core::{Dipole, RunConfig, Simulation, SimulationError};

const OMEGA_0: f64 = 1e15;

fn dipole_at(position: [f64; 3], gamma: f64) -> Dipole {
    Dipole::new(OMEGA_0, Stationary::new(position), [0.0, 0.0, 1e-11])
        .unwrap()
        .with_damping(gamma)
}

#[test]
fn test_free_dipole_matches_damped_oscillator() {
    let gamma = 1e13;
    let mut sim = Simulation::new([dipole_at([0.0; 3], gamma)]);
    let config = RunConfig::new(2000, 1e-17);
    let summary = sim.run(&config).unwrap();
    assert_eq!(summary.steps, 1999);
    assert!(!summary.restored);

    let omega_d = (OMEGA_0 * OMEGA_0 - gamma * gamma / 4.0).sqrt();
    let d0 = 1e-11;
    let b = gamma * d0 / (2.0 * omega_d);
    let disp = sim.dipoles()[0].moment_displacement();

    let mut max_err: f64 = 0.0;
    for n in (0..2000).step_by(50) {
        let t = n as f64 * config.dt;
        let expected = (-gamma * t / 2.0).exp() * (d0 * (omega_d * t).cos() + b * (omega_d * t).sin());
        max_err = max_err.max((disp[[n, 2]] - expected).abs());
        assert_abs_diff_eq!(disp[[n, 2]], expected, epsilon = 1e-17);
        assert_eq!(disp[[n, 0]], 0.0);
    }
    eprintln!("max displacement error = {max_err:.3e} m");
}

#[test]
fn test_constant_drive_shifts_equilibrium() {
    // Static force balance: d = q E / (m_eff w0^2).
    let e0 = 1e7;
    let mut sim = Simulation::new([dipole_at([0.0; 3], 5e14)])
        .with_external_e(move |_, _| [3.0, 0.0, e0]);
    sim.run(&RunConfig::new(4000, 2e-17)).unwrap();

    let m_eff = ELECTRON_MASS / 2.0;
    let expected = ELEMENTARY_CHARGE * e0 / (m_eff * OMEGA_0 * OMEGA_0);
    let dipole = &sim.dipoles()[0];
    let last = dipole.recorded_steps() - 1;
    assert_relative_eq!(dipole.moment_displacement()[[last, 2]], expected, max_relative = 1e-3);
    // The off-axis field component never drives the dipole.
    assert_eq!(dipole.moment_displacement()[[last, 0]], 0.0);
}

#[test]
fn test_stage_sampling_agrees_for_static_drive() {
    let build = || {
        Simulation::new([dipole_at([0.0; 3], 1e13)]).with_external_e(|_, _| [0.0, 0.0, 1e6])
    };
    let mut start = build();
    let mut staged = build();
    start.run(&RunConfig::new(200, 1e-17)).unwrap();
    staged
        .run(&RunConfig::new(200, 1e-17).with_driving_field(DrivingFieldSampling::PerStage))
        .unwrap();
    assert_eq!(
        start.dipoles()[0].moment_displacement(),
        staged.dipoles()[0].moment_displacement()
    );
}

#[test]
fn test_saved_driving_field_records_projection() {
    let mut sim = Simulation::new([dipole_at([0.0; 3], 1e13)])
        .with_external_e(|t, _| [1.0, 2.0, 1e20 * t]);
    let config = RunConfig::new(10, 1e-17).with_saved_fields(true);
    sim.run(&config).unwrap();

    let driving = sim.dipoles()[0].driving_field().unwrap();
    for n in 0..10 {
        let t = n as f64 * 1e-17;
        assert_relative_eq!(driving.total[[n, 2]], 1e20 * t, max_relative = 1e-12);
        assert_eq!(driving.total[[n, 0]], 0.0);
        assert_eq!(driving.velocity[[n, 2]], 0.0);
    }
}

#[test]
fn test_coupled_dipole_is_driven_by_neighbour() {
    let spacing = 2e-8;
    let mut sim = Simulation::new([
        dipole_at([0.0; 3], 0.0),
        Dipole::new(OMEGA_0, Stationary::new([spacing, 0.0, 0.0]), [0.0, 0.0, 1e-14])
            .unwrap()
            .with_damping(0.0),
    ]);
    sim.run(&RunConfig::new(600, 1e-17)).unwrap();

    // The quiet dipole is driven by its neighbour once the field arrives.
    let delay_steps = (spacing / wiechert_core::constants::C / 1e-17).ceil() as usize;
    let quiet = sim.dipoles()[1].moment_displacement();
    let free = 1e-14 * (OMEGA_0 * 599e-17).cos();
    assert!(delay_steps < 599);
    assert!((quiet[[599, 2]] - free).abs() > 1e-16);
}

#[test]
fn test_velocity_ceiling_stops_run_at_offending_step() {
    let mut sim = Simulation::new([dipole_at([0.0; 3], 0.0)]);
    // Member speed is 5000 |sin(w t)| m/s; 1000 m/s is crossed between steps 20 and 21.
    let config = RunConfig::new(100, 1e-17).with_max_velocity(1000.0);
    let err = sim.run(&config).unwrap_err();
    match err {
        SimulationError::VelocityExceeded {
            dipole,
            timestep,
            speed,
            limit,
        } => {
            assert_eq!(dipole, 0);
            assert_eq!(timestep, 21);
            assert!(speed > limit);
            assert_eq!(limit, 1000.0);
        }
        other => panic!("unexpected error: {other}"),
    }

    let dipole = &sim.dipoles()[0];
    assert_eq!(dipole.recorded_steps(), 22);
    assert_ne!(dipole.moment_velocity()[[21, 2]], 0.0);
    assert_eq!(dipole.moment_velocity()[[22, 2]], 0.0);
}

#[test]
fn test_non_finite_state_trips_velocity_ceiling() {
    let mut sim =
        Simulation::new([dipole_at([0.0; 3], 0.0)]).with_external_e(|_, _| [0.0, 0.0, f64::NAN]);
    let err = sim.run(&RunConfig::new(10, 1e-17)).unwrap_err();
    match err {
        SimulationError::VelocityExceeded {
            dipole: 0,
            timestep: 1,
            speed,
            ..
        } => assert!(speed.is_nan()),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(sim.dipoles()[0].recorded_steps(), 2);
}

