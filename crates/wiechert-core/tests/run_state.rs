//! Saving, restoring and combining run-state files.

use std::fs;
use std::path::PathBuf;

use wiechert_core::store::{self, count_runs, combine_files, RunRecord};
use wiechert_core::trajectories::{Oscillating, Stationary};
use wiechert_core::{Dipole, PointCharge, RunConfig, Simulation};

fn scratch_file(name: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("wiechert-{}-{name}.jsonl", std::process::id()));
    let _ = fs::remove_file(&path);
    path
}

fn build() -> Simulation {
    let driver = PointCharge::new(
        1.602_176_634e-19,
        Oscillating::new([0.0, 3e-8, 0.0], [0.0, 0.0, 1.0], 1e-10, 1e15),
    );
    let dipole = Dipole::new(1e15, Stationary::new([0.0; 3]), [0.0, 0.0, 1e-11])
        .unwrap()
        .with_damping(1e13);
    let mut sim = Simulation::new([driver]);
    sim.add_source(dipole);
    sim
}

#[test]
fn test_restore_reproduces_history_without_integrating() {
    let path = scratch_file("restore");
    let config = RunConfig::new(50, 1e-17)
        .with_saved_fields(true)
        .with_state_file(&path);

    let mut first = build();
    let summary = first.run(&config).unwrap();
    assert!(!summary.restored);
    assert_eq!(summary.steps, 49);
    assert_eq!(count_runs(&path).unwrap(), Some(1));

    let mut second = build();
    let summary = second.run(&config).unwrap();
    assert!(summary.restored);
    assert_eq!(summary.steps, 0);
    assert_eq!(first.dipoles()[0].state(), second.dipoles()[0].state());
    // A restored run is not appended again.
    assert_eq!(count_runs(&path).unwrap(), Some(1));

    fs::remove_file(&path).unwrap();
}

#[test]
fn test_different_setup_is_not_restored() {
    let path = scratch_file("mismatch");
    let config = RunConfig::new(20, 1e-17).with_state_file(&path);
    build().run(&config).unwrap();

    // Same charges, different step.
    let mut other = build();
    let summary = other.run(&RunConfig::new(20, 2e-17).with_state_file(&path)).unwrap();
    assert!(!summary.restored);

    // Same run, one more charge.
    let mut extended = build();
    extended.add_source(PointCharge::new(1.0e-19, Stationary::new([1e-7, 0.0, 0.0])));
    assert!(!extended.run(&config).unwrap().restored);

    assert_eq!(count_runs(&path).unwrap(), Some(3));
    fs::remove_file(&path).unwrap();
}

#[test]
fn test_malformed_file_means_no_prior_state() {
    let path = scratch_file("malformed");
    fs::write(&path, "{\"format\": 1, \"key\": tru").unwrap();

    let mut sim = build();
    let config = RunConfig::new(10, 1e-17);
    sim.begin_run(&config).unwrap();
    assert!(!store::restore_run(&mut sim, &config, &path).unwrap());
    assert_eq!(count_runs(&path).unwrap(), Some(0));

    fs::remove_file(&path).unwrap();
}

#[test]
fn test_missing_file_is_reported_as_absent() {
    let path = scratch_file("missing");
    assert_eq!(count_runs(&path).unwrap(), None);
    let mut sim = build();
    assert!(!store::restore_run(&mut sim, &RunConfig::new(10, 1e-17), &path).unwrap());
}

#[test]
fn test_combine_appends_every_record() {
    let a = scratch_file("combine-a");
    let b = scratch_file("combine-b");
    let out = scratch_file("combine-out");

    build().run(&RunConfig::new(10, 1e-17).with_state_file(&a)).unwrap();
    build().run(&RunConfig::new(12, 1e-17).with_state_file(&b)).unwrap();
    build().run(&RunConfig::new(14, 1e-17).with_state_file(&b)).unwrap();

    let copied = combine_files(&[&a, &b, &scratch_file("combine-none")], &out).unwrap();
    assert_eq!(copied, 3);
    assert_eq!(count_runs(&out).unwrap(), Some(3));

    let records = store::read_records(&out).unwrap().unwrap();
    let steps: Vec<usize> = records.iter().map(|r: &RunRecord| r.key.timesteps).collect();
    assert_eq!(steps, vec![10, 12, 14]);

    for path in [a, b, out] {
        fs::remove_file(path).unwrap();
    }
}
