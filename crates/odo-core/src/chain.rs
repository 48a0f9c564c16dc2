//! Per-vehicle, append-only, hash-linked chain of odometer readings.
//!
//! [`VehicleChain`] gates every append through [`crate::fraud::evaluate`],
//! accumulates fraud scores, and suspends itself once the cumulative score
//! reaches [`FraudConfig::suspension_threshold`]. Rejected submissions never
//! become blocks; when auditing is enabled they are kept in a separate,
//! unhashed log.
//!
//! Not thread-safe: callers must serialize all mutation of one chain (the
//! registry in odo-ledger holds a per-vehicle async mutex around
//! [`VehicleChain::add_reading`]).

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, warn};

use crate::config::FraudConfig;
use crate::error::ChainError;
use crate::fraud::{self, CrossAppStatus, FraudCheck, FraudVerdict};
use crate::traits::{DedupClaim, DedupOracle};
use crate::types::{reading_fingerprint, Block, Hash256, ReadingSubmission};

/// Result of [`VehicleChain::add_reading`] when the chain could evaluate the
/// reading. `success == false` is a fraud verdict, not an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadingOutcome {
    pub success: bool,
    /// The appended block, when accepted.
    pub block: Option<Block>,
    /// User-facing rejection message, when rejected.
    pub fraud_alert: Option<String>,
    pub verdict: FraudVerdict,
    /// Whether the chain still accepts readings after this call.
    pub chain_active: bool,
}

/// Audit record of a submission that was scored and rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedAttempt {
    pub odometer_km: u64,
    pub image_fingerprint: String,
    pub device_fingerprint: String,
    pub attempted_at: u64,
    pub score: u64,
    pub reasons: Vec<FraudCheck>,
    pub alert: String,
}

/// A single discrepancy found by [`VehicleChain::verify_integrity`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IntegrityFinding {
    /// A block's stored index does not match its position.
    IndexMismatch { position: u64, index: u64 },
    /// The genesis block does not link to the zero hash.
    GenesisPreviousHash { found: Hash256 },
    /// A block's stored hash differs from the hash of its fields.
    HashMismatch { index: u64, stored: Hash256, computed: Hash256 },
    /// A block's previous hash differs from the recomputed hash of its
    /// predecessor.
    BrokenLink { index: u64, expected: Hash256, found: Hash256 },
    /// A block's reading is not greater than its predecessor's.
    NonIncreasingOdometer { index: u64, previous_km: u64, km: u64 },
    /// The chain's last valid km disagrees with its last block.
    LastValidKmMismatch { recorded: Option<u64>, actual: Option<u64> },
}

impl fmt::Display for IntegrityFinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntegrityFinding::IndexMismatch { position, index } => {
                write!(f, "block at position {position} has index {index}")
            }
            IntegrityFinding::GenesisPreviousHash { found } => {
                write!(f, "genesis block previous hash is {found}, expected zero hash")
            }
            IntegrityFinding::HashMismatch { index, stored, computed } => {
                write!(f, "block {index} hash mismatch: stored {stored}, computed {computed}")
            }
            IntegrityFinding::BrokenLink { index, expected, found } => {
                write!(
                    f,
                    "block {index} previous hash {found} does not match block {} hash {expected}",
                    index.saturating_sub(1)
                )
            }
            IntegrityFinding::NonIncreasingOdometer { index, previous_km, km } => {
                write!(f, "block {index} reading {km} km not greater than previous {previous_km} km")
            }
            IntegrityFinding::LastValidKmMismatch { recorded, actual } => {
                write!(f, "last valid km {recorded:?} does not match last block {actual:?}")
            }
        }
    }
}

/// Result of walking a chain and re-deriving every hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub is_valid: bool,
    /// Every discrepancy found, in block order.
    pub errors: Vec<IntegrityFinding>,
}

/// Chain-level statistics for status endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainSummary {
    pub vehicle_id: String,
    pub total_blocks: usize,
    /// Blocks accepted with a zero fraud score.
    pub valid_readings: usize,
    /// Rejected submissions kept in the audit log.
    pub rejected_attempts: usize,
    pub cumulative_fraud_score: u64,
    pub is_active: bool,
    pub last_valid_km: Option<u64>,
    pub integrity: IntegrityReport,
}

/// The append-only reading history of one vehicle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleChain {
    vehicle_id: String,
    blocks: Vec<Block>,
    cumulative_fraud_score: u64,
    is_active: bool,
    last_valid_km: Option<u64>,
    #[serde(default)]
    rejected_attempts: Vec<RejectedAttempt>,
}

impl VehicleChain {
    /// Create an empty, active chain. The first accepted reading becomes the
    /// genesis block.
    pub fn new(vehicle_id: impl Into<String>) -> Self {
        Self {
            vehicle_id: vehicle_id.into(),
            blocks: Vec::new(),
            cumulative_fraud_score: 0,
            is_active: true,
            last_valid_km: None,
            rejected_attempts: Vec::new(),
        }
    }

    pub fn vehicle_id(&self) -> &str {
        &self.vehicle_id
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn last_block(&self) -> Option<&Block> {
        self.blocks.last()
    }

    pub fn cumulative_fraud_score(&self) -> u64 {
        self.cumulative_fraud_score
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn last_valid_km(&self) -> Option<u64> {
        self.last_valid_km
    }

    pub fn rejected_attempts(&self) -> &[RejectedAttempt] {
        &self.rejected_attempts
    }

    /// Hash the next block will link to.
    fn tip_hash(&self) -> Hash256 {
        self.blocks.last().map(|b| b.hash).unwrap_or(Hash256::ZERO)
    }

    /// Validate and, if accepted, append a reading submitted at `now`.
    ///
    /// The oracle is consulted before scoring and, for accepted readings,
    /// the claim is recorded before the block is appended; an oracle failure
    /// at either point leaves the chain untouched.
    ///
    /// # Errors
    ///
    /// - [`ChainError::Suspended`] if the chain is suspended
    /// - [`ChainError::OracleUnavailable`] if the dedup oracle fails
    pub async fn add_reading(
        &mut self,
        oracle: &dyn DedupOracle,
        submission: &ReadingSubmission,
        now: u64,
        cfg: &FraudConfig,
    ) -> Result<ReadingOutcome, ChainError> {
        if !self.is_active {
            warn!(vehicle = %self.vehicle_id, "chain: reading refused, chain suspended");
            return Err(ChainError::Suspended);
        }

        let fingerprint = reading_fingerprint(&self.vehicle_id, submission.odometer_km);
        let lookup = oracle.check(&fingerprint).await.map_err(|e| {
            warn!(vehicle = %self.vehicle_id, "chain: dedup lookup failed: {e}");
            ChainError::from(e)
        })?;
        let cross_app = CrossAppStatus::from_lookup(&lookup, &cfg.source_id, now, cfg.dedup_window_secs);

        let verdict = fraud::evaluate(&self.blocks, submission, now, &cross_app, cfg);

        if !verdict.accepted {
            let alert = verdict.alert.clone().unwrap_or_default();
            warn!(
                vehicle = %self.vehicle_id,
                km = submission.odometer_km,
                score = verdict.score,
                alert = %alert,
                "chain: reading rejected"
            );
            if cfg.audit_rejected_attempts {
                self.rejected_attempts.push(RejectedAttempt {
                    odometer_km: submission.odometer_km,
                    image_fingerprint: submission.image_fingerprint.clone(),
                    device_fingerprint: submission.device_fingerprint.clone(),
                    attempted_at: now,
                    score: verdict.score,
                    reasons: verdict.reasons.clone(),
                    alert: alert.clone(),
                });
            }
            self.accumulate(verdict.score, cfg);
            return Ok(ReadingOutcome {
                success: false,
                block: None,
                fraud_alert: Some(alert),
                verdict,
                chain_active: self.is_active,
            });
        }

        let claim = DedupClaim {
            source: cfg.source_id.clone(),
            vehicle_id: self.vehicle_id.clone(),
            odometer_km: submission.odometer_km,
            claimed_at: now,
        };
        oracle.record(&fingerprint, claim).await.map_err(|e| {
            warn!(vehicle = %self.vehicle_id, "chain: dedup record failed: {e}");
            ChainError::from(e)
        })?;

        let block = Block::new(
            self.blocks.len() as u64,
            self.tip_hash(),
            now,
            submission.odometer_km,
            submission.image_fingerprint.clone(),
            submission.location_accuracy_m,
            submission.device_fingerprint.clone(),
            verdict.score,
        );
        self.blocks.push(block.clone());
        self.last_valid_km = Some(block.odometer_km);
        self.accumulate(verdict.score, cfg);

        info!(
            vehicle = %self.vehicle_id,
            index = block.index,
            km = block.odometer_km,
            score = block.fraud_score,
            "chain: reading accepted"
        );

        Ok(ReadingOutcome {
            success: true,
            block: Some(block),
            fraud_alert: None,
            verdict,
            chain_active: self.is_active,
        })
    }

    /// Add `score` to the running total and suspend the chain if it reaches
    /// the threshold. Returns `true` if this call suspended the chain.
    fn accumulate(&mut self, score: u64, cfg: &FraudConfig) -> bool {
        self.cumulative_fraud_score = self.cumulative_fraud_score.saturating_add(score);
        debug!(
            vehicle = %self.vehicle_id,
            cumulative = self.cumulative_fraud_score,
            score,
            "chain: score accumulated"
        );
        if self.is_active && self.cumulative_fraud_score >= cfg.suspension_threshold {
            self.is_active = false;
            warn!(
                vehicle = %self.vehicle_id,
                cumulative = self.cumulative_fraud_score,
                threshold = cfg.suspension_threshold,
                "chain: suspended"
            );
            return true;
        }
        false
    }

    /// Operator action: lift a suspension and reset the cumulative score.
    ///
    /// Returns `true` if the chain was suspended. Never invoked by the chain
    /// itself.
    pub fn reactivate(&mut self) -> bool {
        let was_suspended = !self.is_active;
        self.is_active = true;
        self.cumulative_fraud_score = 0;
        if was_suspended {
            info!(vehicle = %self.vehicle_id, "chain: reactivated by operator");
        }
        was_suspended
    }

    /// Walk the chain from genesis, re-deriving every hash and link.
    ///
    /// Collects every discrepancy instead of stopping at the first one.
    pub fn verify_integrity(&self) -> IntegrityReport {
        let mut errors = Vec::new();

        for (position, block) in self.blocks.iter().enumerate() {
            let position = position as u64;
            if block.index != position {
                errors.push(IntegrityFinding::IndexMismatch {
                    position,
                    index: block.index,
                });
            }

            let computed = block.compute_hash();
            if computed != block.hash {
                errors.push(IntegrityFinding::HashMismatch {
                    index: position,
                    stored: block.hash,
                    computed,
                });
            }

            if position == 0 {
                if !block.previous_hash.is_zero() {
                    errors.push(IntegrityFinding::GenesisPreviousHash {
                        found: block.previous_hash,
                    });
                }
                continue;
            }

            let prev = &self.blocks[position as usize - 1];
            let expected = prev.compute_hash();
            if block.previous_hash != expected {
                errors.push(IntegrityFinding::BrokenLink {
                    index: position,
                    expected,
                    found: block.previous_hash,
                });
            }
            if block.odometer_km <= prev.odometer_km {
                errors.push(IntegrityFinding::NonIncreasingOdometer {
                    index: position,
                    previous_km: prev.odometer_km,
                    km: block.odometer_km,
                });
            }
        }

        let actual = self.blocks.last().map(|b| b.odometer_km);
        if self.last_valid_km != actual {
            errors.push(IntegrityFinding::LastValidKmMismatch {
                recorded: self.last_valid_km,
                actual,
            });
        }

        if !errors.is_empty() {
            warn!(
                vehicle = %self.vehicle_id,
                findings = errors.len(),
                "chain: integrity check failed"
            );
        }

        IntegrityReport {
            is_valid: errors.is_empty(),
            errors,
        }
    }

    /// Chain statistics with an embedded integrity report.
    pub fn summarize(&self) -> ChainSummary {
        ChainSummary {
            vehicle_id: self.vehicle_id.clone(),
            total_blocks: self.blocks.len(),
            valid_readings: self.blocks.iter().filter(|b| b.fraud_score == 0).count(),
            rejected_attempts: self.rejected_attempts.len(),
            cumulative_fraud_score: self.cumulative_fraud_score,
            is_active: self.is_active,
            last_valid_km: self.last_valid_km,
            integrity: self.verify_integrity(),
        }
    }
}
