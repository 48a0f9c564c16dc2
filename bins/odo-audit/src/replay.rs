//! Replay of recorded submissions through a fresh registry.
//!
//! Input is JSON Lines; each line is a submission plus the Unix time it
//! arrived:
//!
//! ```json
//! {"timestamp":1700000000,"vehicle_id":"V1","odometer_km":100,"image_fingerprint":"a","device_fingerprint":"d"}
//! ```

use std::io::{BufRead, Write};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use odo_core::error::ChainError;
use odo_core::types::ReadingSubmission;
use odo_ledger::ChainRegistry;

/// One line of replay input.
#[derive(Debug, Clone, Deserialize)]
pub struct ReplayEntry {
    pub timestamp: u64,
    #[serde(flatten)]
    pub submission: ReadingSubmission,
}

/// Totals for a replay run.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct ReplayStats {
    pub submitted: usize,
    pub accepted: usize,
    pub rejected: usize,
    /// Submissions refused with an error (suspended chain, oracle outage).
    pub refused: usize,
}

/// Feed every entry in `input` through `registry`, writing one JSON result
/// line per entry to `out`. Chains are created on first sight.
pub async fn run<R: BufRead, W: Write>(
    registry: &ChainRegistry,
    input: R,
    mut out: W,
) -> Result<ReplayStats> {
    let mut stats = ReplayStats::default();

    for (n, line) in input.lines().enumerate() {
        let line_no = n + 1;
        let line = line.with_context(|| format!("failed to read line {line_no}"))?;
        if line.trim().is_empty() {
            continue;
        }
        let entry: ReplayEntry = serde_json::from_str(&line)
            .with_context(|| format!("malformed entry on line {line_no}"))?;
        stats.submitted += 1;

        let result = submit(registry, &entry).await?;
        let record = match result {
            Ok(outcome) => {
                if outcome.success {
                    stats.accepted += 1;
                } else {
                    stats.rejected += 1;
                }
                json!({ "line": line_no, "vehicle_id": entry.submission.vehicle_id, "outcome": outcome })
            }
            Err(e) => {
                stats.refused += 1;
                warn!(line = line_no, vehicle = %entry.submission.vehicle_id, error = %e, "replay: submission refused");
                json!({ "line": line_no, "vehicle_id": entry.submission.vehicle_id, "error": e.to_string() })
            }
        };
        writeln!(out, "{record}").context("failed to write replay output")?;
    }

    debug!(?stats, "replay: finished");
    Ok(stats)
}

/// Submit one entry, creating its chain if it does not exist yet.
///
/// The outer `Result` is a replay failure; the inner one is the registry's
/// answer for this submission.
async fn submit(
    registry: &ChainRegistry,
    entry: &ReplayEntry,
) -> Result<Result<odo_core::chain::ReadingOutcome, ChainError>> {
    let first = registry
        .add_reading_at(&entry.submission, entry.timestamp)
        .await;
    match first {
        Err(ChainError::NotFound(id)) => {
            registry.create_chain(&id)?;
            Ok(registry
                .add_reading_at(&entry.submission, entry.timestamp)
                .await)
        }
        other => Ok(other),
    }
}
