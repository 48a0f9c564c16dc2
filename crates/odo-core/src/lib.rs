//! # odo-core
//! Foundation types, fraud heuristics, and hash-linked vehicle chains for
//! odometer-reading validation.

pub mod chain;
pub mod config;
pub mod constants;
pub mod error;
pub mod fraud;
pub mod traits;
pub mod types;
