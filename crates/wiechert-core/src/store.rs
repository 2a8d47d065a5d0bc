//! Run-state persistence.
//!
//! A state file is an append-only stream of JSON [`RunRecord`]s. Each record
//! is identified by a [`RunKey`] built from the run parameters and the
//! identity of every charge, so a later run with the same setup can load the
//! dipole histories instead of integrating them again.

use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::charge::ChargeKey;
use crate::dipole::DipoleState;
use crate::error::SimulationError;
use crate::simulation::Simulation;
use crate::types::RunConfig;

/// Version of the record layout. Records of any other version are skipped.
pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Malformed run record: {0}")]
    Format(#[from] serde_json::Error),
}

impl From<StoreError> for SimulationError {
    fn from(err: StoreError) -> Self {
        SimulationError::Persistence(err.to_string())
    }
}

/// Identity of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunKey {
    pub dt: f64,
    pub timesteps: usize,
    pub save_e: bool,
    pub charges: Vec<ChargeKey>,
}

impl RunKey {
    pub fn new(sim: &Simulation, config: &RunConfig) -> Self {
        Self {
            dt: config.dt,
            timesteps: config.timesteps,
            save_e: config.save_e,
            charges: sim.charge_keys(),
        }
    }
}

/// One persisted run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub format: u32,
    pub key: RunKey,
    pub dipoles: Vec<DipoleState>,
}

impl RunRecord {
    pub fn capture(sim: &Simulation, config: &RunConfig) -> Self {
        Self {
            format: FORMAT_VERSION,
            key: RunKey::new(sim, config),
            dipoles: sim.dipoles().iter().map(|d| d.state()).collect(),
        }
    }
}

fn open_existing(path: &Path) -> Result<Option<File>, StoreError> {
    match File::open(path) {
        Ok(file) => Ok(Some(file)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}

/// Read every well-formed record from the front of a state file.
///
/// Reading stops at the first malformed record.
pub fn read_records(path: &Path) -> Result<Option<Vec<RunRecord>>, StoreError> {
    let Some(file) = open_existing(path)? else {
        return Ok(None);
    };
    let mut records = Vec::new();
    for item in serde_json::Deserializer::from_reader(BufReader::new(file)).into_iter::<RunRecord>() {
        match item {
            Ok(record) => records.push(record),
            Err(err) if err.is_io() => return Err(err.into()),
            Err(err) => {
                log::warn!("Discarding malformed run record in {}: {err}", path.display());
                break;
            }
        }
    }
    Ok(Some(records))
}

fn append(path: &Path, records: &[RunRecord]) -> Result<(), StoreError> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut writer = BufWriter::new(file);
    for record in records {
        serde_json::to_writer(&mut writer, record)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}

/// Append the current dipole histories to `path`.
pub fn save_run(sim: &Simulation, config: &RunConfig, path: &Path) -> Result<(), StoreError> {
    append(path, &[RunRecord::capture(sim, config)])
}

/// Load the first record in `path` matching this simulation and run.
///
/// Returns `false` if the file is missing, holds no matching record, or the
/// matching record does not fit the simulation's dipoles.
pub fn restore_run(sim: &mut Simulation, config: &RunConfig, path: &Path) -> Result<bool, StoreError> {
    let Some(records) = read_records(path)? else {
        return Ok(false);
    };
    let key = RunKey::new(sim, config);
    let Some(record) = records
        .into_iter()
        .find(|r| r.format == FORMAT_VERSION && r.key == key)
    else {
        return Ok(false);
    };
    if record.dipoles.len() != sim.dipole_count() {
        log::warn!(
            "Run record in {} holds {} dipoles, expected {}",
            path.display(),
            record.dipoles.len(),
            sim.dipole_count()
        );
        return Ok(false);
    }

    let mut restored = sim.dipoles.clone();
    for (dipole, state) in restored.iter_mut().zip(&record.dipoles) {
        if let Err(err) = dipole.restore_state(state) {
            log::warn!("Ignoring run record in {}: {err}", path.display());
            return Ok(false);
        }
    }
    sim.dipoles = restored;
    Ok(true)
}

/// Number of run records in `path`, or `None` if it does not exist.
pub fn count_runs(path: &Path) -> Result<Option<usize>, StoreError> {
    Ok(read_records(path)?.map(|records| records.len()))
}

/// Append every record of each input file to `output`. Missing inputs are
/// skipped. Returns the number of records copied.
pub fn combine_files<P: AsRef<Path>>(inputs: &[P], output: &Path) -> Result<usize, StoreError> {
    let mut copied = 0;
    for input in inputs {
        let input = input.as_ref();
        match read_records(input)? {
            Some(records) => {
                append(output, &records)?;
                copied += records.len();
            }
            None => log::warn!("Skipping missing state file {}", input.display()),
        }
    }
    Ok(copied)
}
