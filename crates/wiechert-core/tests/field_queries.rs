//! Field queries over coordinate meshes.

use approx::{assert_abs_diff_eq, assert_relative_eq};
use ndarray::{Array1, Array2};
use wiechert_core::constants::{C, COULOMB, ELEMENTARY_CHARGE};
use wiechert_core::trajectories::{Oscillating, Orbiting, Stationary};
use wiechert_core::types::meshgrid_ij;
use wiechert_core::{ChargeId, FieldComponent, PointCharge, Simulation, Source};

fn plane_mesh() -> (Array2<f64>, Array2<f64>, Array2<f64>) {
    let (x, y, z) = meshgrid_ij(
        &[-3e-8, -1e-8, 2e-8, 4e-8],
        &[-2e-8, 1.5e-8, 3e-8],
        &[5e-9],
    );
    let shape = (4, 3);
    (
        x.into_shape_with_order(shape).unwrap(),
        y.into_shape_with_order(shape).unwrap(),
        z.into_shape_with_order(shape).unwrap(),
    )
}

#[test]
fn test_static_charge_gives_coulomb_field() {
    let sim = Simulation::new([PointCharge::new(ELEMENTARY_CHARGE, Stationary::new([0.0; 3]))]);
    let x = Array1::from(vec![1e-9, 2e-9, 5e-8]);
    let zeros = Array1::zeros(3);

    let e = sim
        .calculate_e(1e-15, &x, &zeros, &zeros, FieldComponent::Total, &[])
        .unwrap();
    let b = sim
        .calculate_b(1e-15, &x, &zeros, &zeros, FieldComponent::Total, &[])
        .unwrap();
    let v = sim.calculate_v(1e-15, &x, &zeros, &zeros, &[]).unwrap();

    for i in 0..3 {
        let r = x[i];
        assert_relative_eq!(e.x[i], COULOMB * ELEMENTARY_CHARGE / (r * r), max_relative = 1e-9);
        assert_eq!(e.y[i], 0.0);
        assert_abs_diff_eq!(b.magnitude()[i], 0.0, epsilon = 1e-30);
        assert_relative_eq!(v[i], COULOMB * ELEMENTARY_CHARGE / r, max_relative = 1e-9);
    }
}

#[test]
fn test_total_is_sum_of_velocity_and_acceleration_terms() {
    let sim = Simulation::new([
        PointCharge::new(
            ELEMENTARY_CHARGE,
            Oscillating::new([0.0; 3], [1.0, 0.0, 0.0], 2e-10, 1e16),
        ),
        PointCharge::new(-ELEMENTARY_CHARGE, Orbiting::new(1e-9, 5e15)),
    ]);
    let (x, y, z) = plane_mesh();
    let snapshot = sim.retarded(2e-16, &x, &y, &z, &[]).unwrap();

    let total = snapshot.e(FieldComponent::Total);
    let vel = snapshot.e(FieldComponent::Velocity);
    let acc = snapshot.e(FieldComponent::Acceleration);
    for ((t, v), a) in total.x.iter().zip(vel.x.iter()).zip(acc.x.iter()) {
        assert_relative_eq!(*t, v + a, max_relative = 1e-12, epsilon = 1e-6);
    }

    let b_total = snapshot.b(FieldComponent::Total);
    let b_vel = snapshot.b(FieldComponent::Velocity);
    let b_acc = snapshot.b(FieldComponent::Acceleration);
    for ((t, v), a) in b_total.z.iter().zip(b_vel.z.iter()).zip(b_acc.z.iter()) {
        assert_relative_eq!(*t, v + a, max_relative = 1e-12, epsilon = 1e-15);
    }

    // Accelerating charges radiate.
    assert!(acc.magnitude().iter().all(|m| *m > 0.0));
}

#[test]
fn test_snapshot_matches_individual_queries() {
    let sim = Simulation::new([PointCharge::new(
        ELEMENTARY_CHARGE,
        Oscillating::new([1e-9, 0.0, 0.0], [0.0, 0.0, 1.0], 1e-10, 2e16),
    )]);
    let (x, y, z) = plane_mesh();
    let snapshot = sim.retarded(1e-16, &x, &y, &z, &[]).unwrap();

    let e = sim
        .calculate_e(1e-16, &x, &y, &z, FieldComponent::Acceleration, &[])
        .unwrap();
    assert_eq!(snapshot.e(FieldComponent::Acceleration), e);
    assert_eq!(snapshot.v(), sim.calculate_v(1e-16, &x, &y, &z, &[]).unwrap());
    assert_eq!(snapshot.a(), sim.calculate_a(1e-16, &x, &y, &z, &[]).unwrap());
    assert_eq!(e.x.shape(), &[4, 3]);
}

#[test]
fn test_excluded_charge_does_not_contribute() {
    let near = PointCharge::new(ELEMENTARY_CHARGE, Orbiting::new(1e-9, 1e16));
    let far = PointCharge::new(-ELEMENTARY_CHARGE, Stationary::new([0.0, 2e-8, 0.0]));
    let both = Simulation::new([near.clone(), far]);
    let alone = Simulation::new([near]);
    let (x, y, z) = plane_mesh();

    let excluded = both
        .calculate_e(3e-16, &x, &y, &z, FieldComponent::Total, &[ChargeId(1)])
        .unwrap();
    let expected = alone
        .calculate_e(3e-16, &x, &y, &z, FieldComponent::Total, &[])
        .unwrap();
    assert_eq!(excluded, expected);

    let none = both
        .calculate_v(3e-16, &x, &y, &z, &[ChargeId(0), ChargeId(1)])
        .unwrap();
    assert!(none.iter().all(|v| *v == 0.0));
}

#[test]
fn test_empty_simulation_returns_external_field_exactly() {
    let sim = Simulation::new(Vec::<Source>::new())
        .with_external_e(|t, r| [t * 1e15, r[0], -2.0])
        .with_external_b(|_, r| [0.0, 0.0, r[1]]);
    let (x, y, z) = plane_mesh();

    let e = sim
        .calculate_e(3e-15, &x, &y, &z, FieldComponent::Total, &[])
        .unwrap();
    assert_eq!(e.x, x.mapv(|_| 3e-15 * 1e15));
    assert_eq!(e.y, x);
    assert_eq!(e.z, x.mapv(|_| -2.0));

    let b = sim
        .calculate_b(3e-15, &x, &y, &z, FieldComponent::Total, &[])
        .unwrap();
    assert_eq!(b.z, y);

    // External fields belong to the total only.
    let e_vel = sim
        .calculate_e(3e-15, &x, &y, &z, FieldComponent::Velocity, &[])
        .unwrap();
    assert!(e_vel.magnitude().iter().all(|m| *m == 0.0));
}

#[test]
fn test_field_at_source_position_is_skipped() {
    let sim = Simulation::new([
        PointCharge::new(ELEMENTARY_CHARGE, Stationary::new([0.0; 3])),
        PointCharge::new(ELEMENTARY_CHARGE, Stationary::new([1e-8, 0.0, 0.0])),
    ]);
    let x = Array1::from(vec![0.0]);
    let zeros = Array1::zeros(1);
    let e = sim
        .calculate_e(0.0, &x, &zeros, &zeros, FieldComponent::Total, &[])
        .unwrap();
    // Only the second charge acts on the first one's position.
    assert_relative_eq!(e.x[0], -COULOMB * ELEMENTARY_CHARGE / 1e-16, max_relative = 1e-9);
}

#[test]
fn test_moving_charge_vector_potential_follows_velocity() {
    let speed = 1e6;
    let sim = Simulation::new([PointCharge::new(
        ELEMENTARY_CHARGE,
        wiechert_core::trajectories::LinearVelocity::new(speed, [0.0; 3]),
    )]);
    let x = Array1::from(vec![0.0]);
    let y = Array1::from(vec![1e-8]);
    let z = Array1::zeros(1);
    let snapshot = sim.retarded(0.0, &x, &y, &z, &[]).unwrap();
    let a = snapshot.a();
    let v = snapshot.v();
    assert_relative_eq!(a.x[0], v[0] * speed / (C * C), max_relative = 1e-12);
    assert_eq!(a.y[0], 0.0);
}
