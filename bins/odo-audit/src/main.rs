//! odoledger audit tool.
//!
//! Offline operator commands over registry snapshots: verify hash chains,
//! print summaries, and replay recorded submissions through the fraud
//! engine.

mod replay;
mod settings;

use std::fs;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};

use odo_core::chain::VehicleChain;
use odo_core::config::FraudConfig;
use odo_ledger::{ChainRegistry, MemoryDedupOracle};

#[derive(Parser, Debug)]
#[command(
    name = "odo-audit",
    version,
    about = "Verify, summarize, and replay odoledger vehicle chains"
)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    /// Log output format ("text" or "json")
    #[arg(long, default_value = "text", global = true)]
    log_format: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Verify every chain in a snapshot; exits 1 if any chain is corrupt.
    Verify {
        /// Snapshot file (JSON array of chains)
        #[arg(long)]
        snapshot: PathBuf,
    },
    /// Print chain summaries as JSON.
    Summary {
        #[arg(long)]
        snapshot: PathBuf,
        /// Only summarize this vehicle
        #[arg(long)]
        vehicle: Option<String>,
    },
    /// Replay JSON Lines submissions through a fresh registry.
    Replay {
        /// Input file, one submission per line
        #[arg(long)]
        input: PathBuf,
        /// Fraud config file (TOML or JSON)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Write the resulting registry snapshot here
        #[arg(long)]
        snapshot_out: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli.log_level, &cli.log_format);

    match run(cli.command).await {
        Ok(code) => code,
        Err(e) => {
            error!("{e:#}");
            ExitCode::from(2)
        }
    }
}

async fn run(command: Command) -> Result<ExitCode> {
    match command {
        Command::Verify { snapshot } => {
            let corrupt = verify(&snapshot).await?;
            Ok(if corrupt == 0 {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(1)
            })
        }
        Command::Summary { snapshot, vehicle } => {
            summary(&snapshot, vehicle.as_deref()).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Replay {
            input,
            config,
            snapshot_out,
        } => {
            replay_file(&input, config.as_deref(), snapshot_out.as_deref()).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

// ---------------------------------------------------------------------------
// Snapshots
// ---------------------------------------------------------------------------

fn read_snapshot(path: &Path) -> Result<Vec<VehicleChain>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read snapshot {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("snapshot {} is not a list of chains", path.display()))
}

fn write_snapshot(path: &Path, chains: &[VehicleChain]) -> Result<()> {
    let raw = serde_json::to_string_pretty(chains).context("failed to encode snapshot")?;
    fs::write(path, raw).with_context(|| format!("failed to write snapshot {}", path.display()))
}

/// Load a snapshot into a registry. Snapshots carry no config, so the
/// registry uses defaults; verification and summaries do not depend on it.
fn load_registry(path: &Path) -> Result<ChainRegistry> {
    let chains = read_snapshot(path)?;
    let registry = ChainRegistry::from_chains(
        FraudConfig::default(),
        Arc::new(MemoryDedupOracle::new()),
        chains,
    )?;
    info!(chains = registry.len(), snapshot = %path.display(), "snapshot loaded");
    Ok(registry)
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

/// Verify every chain in `snapshot`, returning how many are corrupt.
async fn verify(snapshot: &Path) -> Result<usize> {
    let registry = load_registry(snapshot)?;
    let mut corrupt = 0usize;

    for id in registry.vehicle_ids() {
        let report = registry.verify_integrity(&id).await?;
        if report.is_valid {
            println!("{id}: ok");
        } else {
            corrupt += 1;
            println!("{id}: CORRUPT");
            for finding in &report.errors {
                println!("  - {finding}");
            }
            warn!(vehicle = %id, findings = report.errors.len(), "chain failed verification");
        }
    }

    info!(chains = registry.len(), corrupt, "verification complete");
    Ok(corrupt)
}

async fn summary(snapshot: &Path, vehicle: Option<&str>) -> Result<()> {
    let registry = load_registry(snapshot)?;
    let ids = match vehicle {
        Some(v) => vec![v.to_string()],
        None => registry.vehicle_ids(),
    };

    let mut summaries = Vec::with_capacity(ids.len());
    for id in &ids {
        summaries.push(registry.summarize(id).await?);
    }
    let out = serde_json::to_string_pretty(&summaries).context("failed to encode summaries")?;
    println!("{out}");
    Ok(())
}

async fn replay_file(
    input: &Path,
    config_path: Option<&Path>,
    snapshot_out: Option<&Path>,
) -> Result<()> {
    let cfg = settings::load(config_path)?;
    info!(source_id = %cfg.source_id, reject_threshold = cfg.reject_threshold, "fraud config loaded");

    let registry = ChainRegistry::new(cfg, Arc::new(MemoryDedupOracle::new()));
    let file = fs::File::open(input)
        .with_context(|| format!("failed to open replay input {}", input.display()))?;

    let stats = replay::run(&registry, BufReader::new(file), io::stdout().lock()).await?;
    info!(
        submitted = stats.submitted,
        accepted = stats.accepted,
        rejected = stats.rejected,
        refused = stats.refused,
        "replay complete"
    );

    if let Some(path) = snapshot_out {
        write_snapshot(path, &registry.snapshot().await)?;
        info!(snapshot = %path.display(), "snapshot written");
    }
    Ok(())
}

/// Initialize tracing subscriber with the given log level and output format.
///
/// Logs go to stderr so command output on stdout stays machine-readable.
fn init_logging(level_str: &str, format: &str) {
    use tracing_subscriber::filter::EnvFilter;
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level_str));

    if format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(io::stderr))
            .init();
    }
}
