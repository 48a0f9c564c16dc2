//! Default fraud-scoring parameters. Scores are dimensionless integer points;
//! speeds are km/h; durations are seconds.

/// Highest average speed between two readings that is considered plausible.
pub const DEFAULT_MAX_PLAUSIBLE_SPEED_KMH: u64 = 150;

/// Average speed above which a reading is rejected outright.
pub const DEFAULT_HARD_SPEED_CEILING_KMH: u64 = 300;

/// Penalty points per km/h above the plausible maximum.
pub const DEFAULT_SPEED_PENALTY_PER_KMH: u64 = 1;

/// Penalty when the submitting device differs from the previous block's device.
pub const DEFAULT_DEVICE_CHANGE_PENALTY: u64 = 25;

/// Penalty for missing or coarse geolocation accuracy.
pub const DEFAULT_LOW_LOCATION_PENALTY: u64 = 5;

/// Accuracy radius (metres) above which a location fix counts as coarse.
pub const DEFAULT_COARSE_LOCATION_ACCURACY_M: u32 = 500;

/// Penalty for OCR confidence under [`DEFAULT_MIN_OCR_CONFIDENCE`].
pub const DEFAULT_LOW_OCR_PENALTY: u64 = 10;

/// Minimum OCR confidence (percent) that earns no penalty.
pub const DEFAULT_MIN_OCR_CONFIDENCE: u8 = 60;

/// Penalty for a photo captured long before it was submitted.
pub const DEFAULT_STALE_IMAGE_PENALTY: u64 = 10;

/// Maximum age of a photo at submission time before it counts as stale.
pub const DEFAULT_MAX_IMAGE_AGE_SECS: u64 = 15 * 60;

/// Points added for every hard failure (monotonicity, impossible speed,
/// image reuse, cross-app duplicate).
pub const DEFAULT_HARD_FAILURE_PENALTY: u64 = 50;

/// A reading whose total score exceeds this value is rejected.
pub const DEFAULT_REJECT_THRESHOLD: u64 = 60;

/// A chain is suspended once its cumulative score reaches this value: the
/// boundary is inclusive, so a cumulative score of exactly 150 suspends.
pub const DEFAULT_SUSPENSION_THRESHOLD: u64 = 150;

/// Width of the timestamp bucket used when fingerprinting readings for the
/// cross-app dedup oracle.
pub const DEFAULT_DEDUP_WINDOW_SECS: u64 = 60 * 60;

/// Source identifier this deployment records claims under.
pub const DEFAULT_SOURCE_ID: &str = "odoledger";

/// Seconds per hour, used for km/h conversion.
pub const SECS_PER_HOUR: u64 = 3600;
