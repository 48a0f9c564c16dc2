//! Shared test helpers for E2E and integration tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use odo_core::config::FraudConfig;
use odo_core::error::OracleError;
use odo_core::traits::{DedupClaim, DedupLookup, DedupOracle};
use odo_core::types::{Hash256, ReadingSubmission};
use odo_ledger::{ChainRegistry, MemoryDedupOracle};

/// Fixed start time for deterministic scenarios.
pub const T0: u64 = 1_700_000_000;
pub const HOUR: u64 = 3_600;

/// A clean submission: precise location, default device.
pub fn reading(vehicle: &str, km: u64, image: &str) -> ReadingSubmission {
    ReadingSubmission::new(vehicle, km, image, "device-1").with_location_accuracy(10)
}

/// Registry with default config backed by a fresh in-memory oracle.
pub fn new_registry() -> (ChainRegistry, Arc<MemoryDedupOracle>) {
    new_registry_with(FraudConfig::default())
}

pub fn new_registry_with(config: FraudConfig) -> (ChainRegistry, Arc<MemoryDedupOracle>) {
    let oracle = Arc::new(MemoryDedupOracle::new());
    let registry = ChainRegistry::new(config, oracle.clone());
    (registry, oracle)
}

/// Feed `kms` into `vehicle`'s chain one hour apart, starting at [`T0`],
/// each with a distinct image. Panics if any reading is rejected.
pub async fn seed_chain(registry: &ChainRegistry, vehicle: &str, kms: &[u64]) {
    for (i, km) in kms.iter().enumerate() {
        let out = registry
            .add_reading_at(&reading(vehicle, *km, &format!("{vehicle}-img-{i}")), T0 + i as u64 * HOUR)
            .await
            .expect("seed reading");
        assert!(out.success, "seed reading {km} rejected: {:?}", out.fraud_alert);
    }
}

/// Oracle that yields to the scheduler on every call and counts how many
/// calls are in flight at once. Used to provoke interleaving.
#[derive(Default)]
pub struct YieldingOracle {
    inner: MemoryDedupOracle,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl YieldingOracle {
    /// Highest number of concurrent calls observed.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn enter_and_yield(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl DedupOracle for YieldingOracle {
    async fn check(&self, fingerprint: &Hash256) -> Result<DedupLookup, OracleError> {
        self.enter_and_yield().await;
        self.inner.check(fingerprint).await
    }

    async fn record(&self, fingerprint: &Hash256, claim: DedupClaim) -> Result<(), OracleError> {
        self.enter_and_yield().await;
        self.inner.record(fingerprint, claim).await
    }
}
