//! Trait interfaces for collaborators outside the chain core.
//!
//! - [`DedupOracle`]: shared registry answering whether a reading has
//!   already been claimed by another participating application
//!   (odo-ledger provides an in-memory implementation).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::OracleError;
use crate::types::Hash256;

/// Answer to a dedup lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DedupLookup {
    /// Whether the fingerprint has been claimed before.
    pub exists: bool,
    /// Application that recorded the claim.
    pub source: Option<String>,
    /// When the claim was recorded, Unix seconds.
    pub seen_at: Option<u64>,
}

/// A claim recorded against a reading fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DedupClaim {
    pub source: String,
    pub vehicle_id: String,
    pub odometer_km: u64,
    pub claimed_at: u64,
}

/// Cross-application duplicate registry.
///
/// Calls may suspend; the chain awaits them while holding its per-vehicle
/// lock. A transport failure is reported as [`OracleError`] and must never be
/// read as either "clear" or "duplicate".
#[async_trait]
pub trait DedupOracle: Send + Sync {
    /// Look up a reading fingerprint.
    async fn check(&self, fingerprint: &Hash256) -> Result<DedupLookup, OracleError>;

    /// Record a claim for a reading fingerprint.
    async fn record(&self, fingerprint: &Hash256, claim: DedupClaim) -> Result<(), OracleError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    // ------------------------------------------------------------------
    // Mock: DedupOracle
    // ------------------------------------------------------------------

    #[derive(Default)]
    struct MockOracle {
        claims: Mutex<HashMap<Hash256, DedupClaim>>,
    }

    #[async_trait]
    impl DedupOracle for MockOracle {
        async fn check(&self, fingerprint: &Hash256) -> Result<DedupLookup, OracleError> {
            let claims = self.claims.lock().unwrap();
            Ok(match claims.get(fingerprint) {
                Some(c) => DedupLookup {
                    exists: true,
                    source: Some(c.source.clone()),
                    seen_at: Some(c.claimed_at),
                },
                None => DedupLookup::default(),
            })
        }

        async fn record(&self, fingerprint: &Hash256, claim: DedupClaim) -> Result<(), OracleError> {
            self.claims.lock().unwrap().insert(*fingerprint, claim);
            Ok(())
        }
    }

    #[tokio::test]
    async fn oracle_is_object_safe_and_roundtrips() {
        let oracle: Box<dyn DedupOracle> = Box::new(MockOracle::default());
        let fp = Hash256([7; 32]);

        assert!(!oracle.check(&fp).await.unwrap().exists);

        let claim = DedupClaim {
            source: "app-b".into(),
            vehicle_id: "V1".into(),
            odometer_km: 100,
            claimed_at: 42,
        };
        oracle.record(&fp, claim).await.unwrap();

        let lookup = oracle.check(&fp).await.unwrap();
        assert!(lookup.exists);
        assert_eq!(lookup.source.as_deref(), Some("app-b"));
        assert_eq!(lookup.seen_at, Some(42));
    }

    #[test]
    fn default_lookup_is_not_found() {
        let l = DedupLookup::default();
        assert!(!l.exists);
        assert!(l.source.is_none());
    }
}
