//! # odo-ledger
//! Process-level composition of vehicle chains: the [`ChainRegistry`] the API
//! layer talks to and an in-memory cross-app dedup oracle.
//!
//! - [`registry::ChainRegistry`]: per-vehicle serialized access to chains
//! - [`oracle::MemoryDedupOracle`]: in-process dedup registry

pub mod oracle;
pub mod registry;

pub use oracle::MemoryDedupOracle;
pub use registry::ChainRegistry;
