//! Error types for odometer chain validation.
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OracleError {
    #[error("transport: {0}")] Transport(String),
    #[error("oracle unavailable")] Unavailable,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("vehicle chain not found: {0}")] NotFound(String),
    #[error("duplicate chain creation: {0}")] AlreadyExists(String),
    #[error("chain suspended")] Suspended,
    #[error("validation unavailable, retry later: {0}")] OracleUnavailable(#[from] OracleError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("hard speed ceiling {ceiling} km/h is below plausible maximum {max} km/h")] SpeedCeilingBelowMax { ceiling: u64, max: u64 },
    #[error("{0} must be greater than zero")] ZeroValue(&'static str),
    #[error("minimum OCR confidence {0} exceeds 100")] OcrConfidenceOutOfRange(u8),
    #[error("source id must not be empty")] EmptySourceId,
}
