//! Fraud heuristics for candidate odometer readings.
//!
//! Pure computation: no storage, no IO, integer-only math. The chain hands in
//! its accepted history, the candidate, and the already-resolved answer from
//! the cross-app dedup oracle; [`evaluate`] returns a [`FraudVerdict`].
//!
//! Checks run in a fixed order. Soft checks add penalty points; hard checks
//! add [`FraudConfig::hard_failure_penalty`] and stop evaluation. A reading
//! is rejected on any hard failure or when its total score exceeds
//! [`FraudConfig::reject_threshold`].

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use crate::config::FraudConfig;
use crate::constants::SECS_PER_HOUR;
use crate::traits::DedupLookup;
use crate::types::{Block, ReadingSubmission};

/// Alert text for a non-increasing reading.
pub const ALERT_NOT_INCREASING: &str = "reading not greater than last recorded value";
/// Alert text for a photo already used in this chain.
pub const ALERT_IMAGE_REUSED: &str = "image reused";
/// Alert prefix for a reading claimed by another application.
pub const ALERT_CROSS_APP_DUPLICATE: &str = "cross-app duplicate";

// ---------------------------------------------------------------------------
// Check identifiers
// ---------------------------------------------------------------------------

/// A single heuristic that fired for a candidate reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FraudCheck {
    Monotonicity,
    ImpossibleSpeed,
    ImageReused,
    DeviceChanged,
    LowLocationAccuracy,
    LowOcrConfidence,
    StaleImage,
    CrossAppDuplicate,
}

impl FraudCheck {
    /// Stable name surfaced to API callers.
    pub fn name(&self) -> &'static str {
        match self {
            FraudCheck::Monotonicity => "monotonicity",
            FraudCheck::ImpossibleSpeed => "impossible-speed",
            FraudCheck::ImageReused => "image-reused",
            FraudCheck::DeviceChanged => "device-changed",
            FraudCheck::LowLocationAccuracy => "low-location-accuracy",
            FraudCheck::LowOcrConfidence => "low-ocr-confidence",
            FraudCheck::StaleImage => "stale-image",
            FraudCheck::CrossAppDuplicate => "cross-app-duplicate",
        }
    }
}

impl fmt::Display for FraudCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Inputs and outputs
// ---------------------------------------------------------------------------

/// What the dedup oracle said about the candidate's reading fingerprint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrossAppStatus {
    /// Nobody else has claimed this reading.
    Clear,
    /// Another application already claimed it.
    ClaimedElsewhere { source: String, seen_at: Option<u64> },
}

impl CrossAppStatus {
    /// Interpret an oracle lookup for a reading submitted at `now`.
    ///
    /// A foreign claim is a duplicate when it was seen within `window_secs`
    /// of `now`, on either side. A claim with no `seen_at` always counts.
    /// A claim recorded under `own_source` is not a cross-app duplicate; the
    /// chain's own checks cover repeats from this application. A claim with no
    /// source is attributed to an unknown application.
    pub fn from_lookup(lookup: &DedupLookup, own_source: &str, now: u64, window_secs: u64) -> Self {
        if !lookup.exists {
            return CrossAppStatus::Clear;
        }
        if let Some(seen_at) = lookup.seen_at {
            if now.abs_diff(seen_at) > window_secs {
                return CrossAppStatus::Clear;
            }
        }
        match lookup.source.as_deref() {
            Some(source) if source == own_source => CrossAppStatus::Clear,
            source => CrossAppStatus::ClaimedElsewhere {
                source: source.unwrap_or("unknown").to_string(),
                seen_at: lookup.seen_at,
            },
        }
    }
}

/// Outcome of scoring a candidate reading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FraudVerdict {
    pub accepted: bool,
    /// Total penalty points, including any hard-failure penalty.
    pub score: u64,
    /// Every check that fired, in evaluation order.
    pub reasons: Vec<FraudCheck>,
    /// The hard failure that stopped evaluation, if any.
    pub hard_failure: Option<FraudCheck>,
    /// User-facing rejection message. `None` when accepted.
    pub alert: Option<String>,
}

/// Classification of an implied average speed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeedAssessment {
    Plausible,
    /// Over the plausible maximum; carries the penalty.
    Excessive(u64),
    /// Over the hard ceiling.
    Impossible,
}

// ---------------------------------------------------------------------------
// Individual heuristics
// ---------------------------------------------------------------------------

/// Average speed in km/h implied by covering `delta_km` in `elapsed_secs`.
///
/// Rounds up, so a speed a fraction over a limit counts as over it. Zero
/// elapsed time is treated as one second, so any distance covered
/// "instantly" produces a very large speed rather than a division by zero.
///
/// # Examples
///
/// ```
/// use odo_core::fraud::implied_speed_kmh;
///
/// assert_eq!(implied_speed_kmh(50, 3_600), 50);
/// assert_eq!(implied_speed_kmh(100, 1_800), 200);
/// assert_eq!(implied_speed_kmh(1, 0), 3_600);
/// assert_eq!(implied_speed_kmh(151, 3_601), 151);
/// ```
pub fn implied_speed_kmh(delta_km: u64, elapsed_secs: u64) -> u64 {
    delta_km.saturating_mul(SECS_PER_HOUR).div_ceil(elapsed_secs.max(1))
}

/// Classify `speed_kmh` against the configured limits.
pub fn assess_speed(speed_kmh: u64, cfg: &FraudConfig) -> SpeedAssessment {
    if speed_kmh > cfg.hard_speed_ceiling_kmh {
        SpeedAssessment::Impossible
    } else if speed_kmh > cfg.max_plausible_speed_kmh {
        let excess = speed_kmh - cfg.max_plausible_speed_kmh;
        SpeedAssessment::Excessive(excess.saturating_mul(cfg.speed_penalty_per_kmh))
    } else {
        SpeedAssessment::Plausible
    }
}

/// Penalty for a missing or coarse location fix.
pub fn location_penalty(accuracy_m: Option<u32>, cfg: &FraudConfig) -> u64 {
    match accuracy_m {
        Some(accuracy) if accuracy <= cfg.coarse_location_accuracy_m => 0,
        _ => cfg.low_location_penalty,
    }
}

/// Penalty for low OCR confidence. No confidence reported means no penalty;
/// the location check already covers submissions lacking metadata.
pub fn ocr_penalty(confidence: Option<u8>, cfg: &FraudConfig) -> u64 {
    match confidence {
        Some(c) if c < cfg.min_ocr_confidence => cfg.low_ocr_penalty,
        _ => 0,
    }
}

/// Penalty for a photo captured more than `max_image_age_secs` before `now`.
pub fn stale_image_penalty(captured_at: Option<u64>, now: u64, cfg: &FraudConfig) -> u64 {
    match captured_at {
        Some(at) if now.saturating_sub(at) > cfg.max_image_age_secs => cfg.stale_image_penalty,
        _ => 0,
    }
}

// ---------------------------------------------------------------------------
// Composite evaluation
// ---------------------------------------------------------------------------

struct Tally {
    score: u64,
    reasons: Vec<FraudCheck>,
}

impl Tally {
    fn soft(&mut self, check: FraudCheck, penalty: u64) {
        if penalty > 0 {
            self.score = self.score.saturating_add(penalty);
            self.reasons.push(check);
            debug!(check = check.name(), penalty, "fraud: soft penalty");
        }
    }

    fn hard(mut self, check: FraudCheck, alert: String, cfg: &FraudConfig) -> FraudVerdict {
        self.score = self.score.saturating_add(cfg.hard_failure_penalty);
        self.reasons.push(check);
        debug!(check = check.name(), score = self.score, "fraud: hard failure");
        FraudVerdict {
            accepted: false,
            score: self.score,
            reasons: self.reasons,
            hard_failure: Some(check),
            alert: Some(alert),
        }
    }
}

/// Score `candidate`, submitted at `now`, against the accepted `history`.
///
/// `history` is the chain's blocks in order; its last element is the last
/// valid reading. With an empty history the candidate is a genesis reading
/// and only the image, metadata, and cross-app checks apply.
pub fn evaluate(
    history: &[Block],
    candidate: &ReadingSubmission,
    now: u64,
    cross_app: &CrossAppStatus,
    cfg: &FraudConfig,
) -> FraudVerdict {
    let mut tally = Tally {
        score: 0,
        reasons: Vec::new(),
    };

    if let Some(last) = history.last() {
        if candidate.odometer_km <= last.odometer_km {
            return tally.hard(FraudCheck::Monotonicity, ALERT_NOT_INCREASING.to_string(), cfg);
        }

        let delta_km = candidate.odometer_km - last.odometer_km;
        let elapsed = now.saturating_sub(last.timestamp);
        let speed = implied_speed_kmh(delta_km, elapsed);
        match assess_speed(speed, cfg) {
            SpeedAssessment::Plausible => {}
            SpeedAssessment::Excessive(penalty) => tally.soft(FraudCheck::ImpossibleSpeed, penalty),
            SpeedAssessment::Impossible => {
                return tally.hard(
                    FraudCheck::ImpossibleSpeed,
                    format!("impossible speed: {speed} km/h"),
                    cfg,
                );
            }
        }
    }

    if history
        .iter()
        .any(|b| b.image_fingerprint == candidate.image_fingerprint)
    {
        return tally.hard(FraudCheck::ImageReused, ALERT_IMAGE_REUSED.to_string(), cfg);
    }

    if let Some(last) = history.last() {
        if last.device_fingerprint != candidate.device_fingerprint {
            tally.soft(FraudCheck::DeviceChanged, cfg.device_change_penalty);
        }
    }

    tally.soft(
        FraudCheck::LowLocationAccuracy,
        location_penalty(candidate.location_accuracy_m, cfg),
    );
    tally.soft(
        FraudCheck::LowOcrConfidence,
        ocr_penalty(candidate.proof.ocr_confidence, cfg),
    );
    tally.soft(
        FraudCheck::StaleImage,
        stale_image_penalty(candidate.proof.image_captured_at, now, cfg),
    );

    if let CrossAppStatus::ClaimedElsewhere { source, .. } = cross_app {
        return tally.hard(
            FraudCheck::CrossAppDuplicate,
            format!("{ALERT_CROSS_APP_DUPLICATE}: already claimed by {source}"),
            cfg,
        );
    }

    let accepted = tally.score <= cfg.reject_threshold;
    let alert = (!accepted).then(|| {
        format!(
            "fraud score {} exceeds threshold {}",
            tally.score, cfg.reject_threshold
        )
    });
    FraudVerdict {
        accepted,
        score: tally.score,
        reasons: tally.reasons,
        hard_failure: None,
        alert,
    }
}
