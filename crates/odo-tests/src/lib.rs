//! Adversarial and end-to-end test suite for odoledger.
//!
//! Integration tests drive the registry the way the API layer does and try
//! to break chain invariants: linkage, monotonic readings, score
//! accumulation, and per-vehicle serialization.

pub mod helpers;
