//! In-process stand-in for the shared cross-app dedup registry.
//!
//! Keeps claims in a `HashMap` behind a `parking_lot::RwLock`. First claim
//! for a fingerprint wins; later claims are ignored. An availability switch
//! lets tests and the audit tool simulate an unreachable registry.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::debug;

use odo_core::error::OracleError;
use odo_core::traits::{DedupClaim, DedupLookup, DedupOracle};
use odo_core::types::Hash256;

/// Dedup oracle backed by process memory.
pub struct MemoryDedupOracle {
    claims: RwLock<HashMap<Hash256, DedupClaim>>,
    available: AtomicBool,
}

impl MemoryDedupOracle {
    /// Create an empty, available oracle.
    pub fn new() -> Self {
        Self {
            claims: RwLock::new(HashMap::new()),
            available: AtomicBool::new(true),
        }
    }

    /// Make subsequent calls succeed (`true`) or fail with
    /// [`OracleError::Unavailable`] (`false`).
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Insert a claim directly, as another application would.
    pub fn seed(&self, fingerprint: Hash256, claim: DedupClaim) {
        self.claims.write().entry(fingerprint).or_insert(claim);
    }

    /// Number of recorded claims.
    pub fn len(&self) -> usize {
        self.claims.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.claims.read().is_empty()
    }

    fn ensure_available(&self) -> Result<(), OracleError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(OracleError::Unavailable)
        }
    }
}

impl Default for MemoryDedupOracle {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DedupOracle for MemoryDedupOracle {
    async fn check(&self, fingerprint: &Hash256) -> Result<DedupLookup, OracleError> {
        self.ensure_available()?;
        let claims = self.claims.read();
        Ok(match claims.get(fingerprint) {
            Some(claim) => DedupLookup {
                exists: true,
                source: Some(claim.source.clone()),
                seen_at: Some(claim.claimed_at),
            },
            None => DedupLookup::default(),
        })
    }

    async fn record(&self, fingerprint: &Hash256, claim: DedupClaim) -> Result<(), OracleError> {
        self.ensure_available()?;
        debug!(%fingerprint, source = %claim.source, "oracle: claim recorded");
        self.claims.write().entry(*fingerprint).or_insert(claim);
        Ok(())
    }
}
