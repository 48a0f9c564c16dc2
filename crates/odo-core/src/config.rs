//! Fraud-scoring configuration.
//!
//! Every threshold and weight used by [`crate::fraud`] and
//! [`crate::chain`] lives in [`FraudConfig`]. Defaults come from
//! [`crate::constants`]; missing fields in a deserialized config fall back to
//! those defaults.

use serde::{Deserialize, Serialize};

use crate::constants::*;
use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FraudConfig {
    /// Highest plausible average speed between readings, km/h.
    pub max_plausible_speed_kmh: u64,
    /// Average speed above which a reading is a hard failure, km/h.
    pub hard_speed_ceiling_kmh: u64,
    /// Penalty points per km/h above `max_plausible_speed_kmh`.
    pub speed_penalty_per_kmh: u64,
    pub device_change_penalty: u64,
    pub low_location_penalty: u64,
    /// Accuracy radius (metres) above which a location fix is coarse.
    pub coarse_location_accuracy_m: u32,
    pub low_ocr_penalty: u64,
    /// Minimum OCR confidence percent that earns no penalty.
    pub min_ocr_confidence: u8,
    pub stale_image_penalty: u64,
    pub max_image_age_secs: u64,
    /// Points added for every hard failure.
    pub hard_failure_penalty: u64,
    /// Readings scoring strictly above this are rejected.
    pub reject_threshold: u64,
    /// Chains are suspended once their cumulative score reaches this.
    pub suspension_threshold: u64,
    /// Timestamp bucket width for cross-app reading fingerprints.
    pub dedup_window_secs: u64,
    /// Source name recorded with every claim sent to the dedup oracle.
    pub source_id: String,
    /// Keep an audit trail of rejected submissions on each chain.
    pub audit_rejected_attempts: bool,
}

impl Default for FraudConfig {
    fn default() -> Self {
        Self {
            max_plausible_speed_kmh: DEFAULT_MAX_PLAUSIBLE_SPEED_KMH,
            hard_speed_ceiling_kmh: DEFAULT_HARD_SPEED_CEILING_KMH,
            speed_penalty_per_kmh: DEFAULT_SPEED_PENALTY_PER_KMH,
            device_change_penalty: DEFAULT_DEVICE_CHANGE_PENALTY,
            low_location_penalty: DEFAULT_LOW_LOCATION_PENALTY,
            coarse_location_accuracy_m: DEFAULT_COARSE_LOCATION_ACCURACY_M,
            low_ocr_penalty: DEFAULT_LOW_OCR_PENALTY,
            min_ocr_confidence: DEFAULT_MIN_OCR_CONFIDENCE,
            stale_image_penalty: DEFAULT_STALE_IMAGE_PENALTY,
            max_image_age_secs: DEFAULT_MAX_IMAGE_AGE_SECS,
            hard_failure_penalty: DEFAULT_HARD_FAILURE_PENALTY,
            reject_threshold: DEFAULT_REJECT_THRESHOLD,
            suspension_threshold: DEFAULT_SUSPENSION_THRESHOLD,
            dedup_window_secs: DEFAULT_DEDUP_WINDOW_SECS,
            source_id: DEFAULT_SOURCE_ID.to_string(),
            audit_rejected_attempts: true,
        }
    }
}

impl FraudConfig {
    /// Check that the thresholds are mutually consistent.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_plausible_speed_kmh == 0 {
            return Err(ConfigError::ZeroValue("max_plausible_speed_kmh"));
        }
        if self.hard_speed_ceiling_kmh < self.max_plausible_speed_kmh {
            return Err(ConfigError::SpeedCeilingBelowMax {
                ceiling: self.hard_speed_ceiling_kmh,
                max: self.max_plausible_speed_kmh,
            });
        }
        if self.suspension_threshold == 0 {
            return Err(ConfigError::ZeroValue("suspension_threshold"));
        }
        if self.dedup_window_secs == 0 {
            return Err(ConfigError::ZeroValue("dedup_window_secs"));
        }
        if self.min_ocr_confidence > 100 {
            return Err(ConfigError::OcrConfidenceOutOfRange(self.min_ocr_confidence));
        }
        if self.source_id.trim().is_empty() {
            return Err(ConfigError::EmptySourceId);
        }
        Ok(())
    }
}
