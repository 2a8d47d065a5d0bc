//! Wiechert command-line interface.
//!
//! Run dipole simulations from TOML configuration files:
//! ```sh
//! wiechert run job.toml
//! wiechert validate job.toml
//! wiechert count-runs runs.jsonl
//! wiechert combine all.jsonl a.jsonl b.jsonl
//! ```

mod config;
mod runner;

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use wiechert_core::store;

#[derive(Parser)]
#[command(name = "wiechert")]
#[command(about = "Wiechert: retarded-time fields of point charges and Lorentz-oscillator dipoles")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a simulation from a TOML configuration file.
    Run {
        /// Path to the job configuration file.
        config: PathBuf,
        /// Output directory (overrides config file setting).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Validate a configuration file without running the simulation.
    Validate {
        /// Path to the job configuration file.
        config: PathBuf,
    },
    /// Count the runs stored in a run-state file.
    CountRuns {
        /// Path to the run-state file.
        file: PathBuf,
    },
    /// Append every run stored in the input files to one output file.
    Combine {
        /// Destination run-state file.
        output: PathBuf,
        /// Run-state files to copy from.
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config, output } => {
            println!("Wiechert Dipole Simulation");
            println!("==========================");
            let job = config::load_config(&config)?;
            println!("Configuration: {}", config.display());

            let mut prepared = runner::prepare(&job)?;
            let summary = runner::run(&mut prepared)?;
            if !summary.restored {
                println!("Completed {} steps.", summary.steps);
            }

            let out_dir = output.unwrap_or_else(|| job.output.directory.clone());

            if job.output.save_moments {
                runner::write_moments_csv(
                    &prepared.simulation,
                    &prepared.run,
                    &out_dir.join("dipole_moments.csv"),
                )?;
            }

            if let Some(map) = &job.output.field_map {
                runner::write_field_map_csv(
                    &prepared.simulation,
                    &prepared.run,
                    map,
                    &out_dir.join("field_map.csv"),
                )?;
            }

            println!("Simulation complete.");
            Ok(())
        }
        Commands::Validate { config } => {
            let job = config::load_config(&config)?;
            let prepared = runner::prepare(&job)?;
            println!("Configuration is valid: {}", config.display());
            println!(
                "  {} charges, {} dipoles, {} timesteps, backend: {}",
                prepared.simulation.charge_count(),
                prepared.simulation.dipole_count(),
                prepared.run.timesteps,
                prepared.backend.device_info().name
            );
            Ok(())
        }
        Commands::CountRuns { file } => {
            match store::count_runs(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?
            {
                Some(n) => println!("{}: {} runs", file.display(), n),
                None => println!("{} does not exist", file.display()),
            }
            Ok(())
        }
        Commands::Combine { output, inputs } => {
            let copied = store::combine_files(&inputs, &output)
                .with_context(|| format!("Failed to combine into {}", output.display()))?;
            println!("Copied {} runs into {}", copied, output.display());
            Ok(())
        }
    }
}
