use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

mod config;
mod export;
mod plotting;
mod workflow;

#[derive(Parser)]
#[command(name = "stemforge", version, about = "Costing of hiPSC bioreactor expansion")]
struct Cli {
    /// Reference catalog YAML. Defaults to the built-in catalog.
    #[arg(long, global = true)]
    reference: Option<PathBuf>,

    /// Scenario and study presets YAML.
    #[arg(long, global = true)]
    scenarios: Option<PathBuf>,

    /// Simulation, allocation and process settings YAML.
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Fixes every random draw.
    #[arg(long, global = true)]
    seed: Option<u64>,

    /// Directory the timestamped run folders are created in.
    #[arg(long, global = true, default_value = "./data/runs")]
    output: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Optimizes and costs a single scenario.
    Simulate {
        #[arg(long, default_value = "Default")]
        scenario: String,
    },
    /// Runs every scenario of a study and compares them.
    Compare {
        #[arg(long)]
        study: String,
    },
    /// Prints a summary of the reference catalog.
    Data,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let mut inputs = config::Inputs::load(
        cli.reference.as_deref(),
        cli.scenarios.as_deref(),
        cli.settings.as_deref(),
    )?;
    if let Some(seed) = cli.seed {
        inputs.settings.simulation.seed = Some(seed);
    }

    match &cli.command {
        Command::Simulate { scenario } => {
            let output_dir = run_directory(&cli.output, scenario);
            workflow::run_simulation(&inputs, scenario, &output_dir)?;
            println!("\nResults are in '{}'", output_dir.display());
        }
        Command::Compare { study } => {
            let output_dir = run_directory(&cli.output, study);
            if workflow::run_comparison(&inputs, study, &output_dir)? {
                println!("\nResults are in '{}'", output_dir.display());
            }
        }
        Command::Data => workflow::print_catalog(&inputs),
    }
    Ok(())
}

/// Reads `STEMFORGE_LOG`, defaulting to `info`.
fn init_tracing() {
    let filter = EnvFilter::try_from_env("STEMFORGE_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Timestamped folder for one run. It is only created once there is something to write.
fn run_directory(base: &Path, label: &str) -> PathBuf {
    base.join(format!(
        "{}_{}",
        workflow::slug(label),
        chrono::Utc::now().format("%Y%m%d_%H%M%S")
    ))
}
