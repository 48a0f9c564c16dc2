//! Registry of vehicle chains, the entry point for the API layer.
//!
//! Each chain sits behind its own `tokio::sync::Mutex`, held for the whole
//! read-check-append sequence including the awaited dedup-oracle calls, so
//! submissions for one vehicle never interleave. The `DashMap` itself is only
//! touched to look up or insert a chain handle; different vehicles proceed in
//! parallel.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, info};

use odo_core::chain::{ChainSummary, IntegrityReport, ReadingOutcome, VehicleChain};
use odo_core::config::FraudConfig;
use odo_core::error::ChainError;
use odo_core::traits::DedupOracle;
use odo_core::types::ReadingSubmission;

type ChainHandle = Arc<Mutex<VehicleChain>>;

/// Owns every vehicle chain in the process.
///
/// Construct one at startup and share it (e.g. in an `Arc`) with the request
/// handlers; tests build their own.
pub struct ChainRegistry {
    chains: DashMap<String, ChainHandle>,
    oracle: Arc<dyn DedupOracle>,
    config: FraudConfig,
}

impl ChainRegistry {
    /// Create an empty registry.
    pub fn new(config: FraudConfig, oracle: Arc<dyn DedupOracle>) -> Self {
        Self {
            chains: DashMap::new(),
            oracle,
            config,
        }
    }

    /// Rebuild a registry from previously snapshotted chains.
    ///
    /// # Errors
    ///
    /// - [`ChainError::AlreadyExists`] if two chains share a vehicle id
    pub fn from_chains(
        config: FraudConfig,
        oracle: Arc<dyn DedupOracle>,
        chains: impl IntoIterator<Item = VehicleChain>,
    ) -> Result<Self, ChainError> {
        let registry = Self::new(config, oracle);
        for chain in chains {
            let id = chain.vehicle_id().to_string();
            match registry.chains.entry(id) {
                Entry::Occupied(e) => return Err(ChainError::AlreadyExists(e.key().clone())),
                Entry::Vacant(e) => {
                    e.insert(Arc::new(Mutex::new(chain)));
                }
            }
        }
        info!(chains = registry.len(), "registry: restored from snapshot");
        Ok(registry)
    }

    pub fn config(&self) -> &FraudConfig {
        &self.config
    }

    /// Number of registered vehicles.
    pub fn len(&self) -> usize {
        self.chains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }

    /// Registered vehicle ids, sorted.
    pub fn vehicle_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.chains.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    fn handle(&self, vehicle_id: &str) -> Result<ChainHandle, ChainError> {
        // Clone the handle so the map shard lock is released before awaiting.
        self.chains
            .get(vehicle_id)
            .map(|e| Arc::clone(e.value()))
            .ok_or_else(|| ChainError::NotFound(vehicle_id.to_string()))
    }

    /// Register a new, empty chain.
    ///
    /// # Errors
    ///
    /// - [`ChainError::AlreadyExists`] if the vehicle already has a chain
    pub fn create_chain(&self, vehicle_id: &str) -> Result<VehicleChain, ChainError> {
        match self.chains.entry(vehicle_id.to_string()) {
            Entry::Occupied(_) => Err(ChainError::AlreadyExists(vehicle_id.to_string())),
            Entry::Vacant(e) => {
                let chain = VehicleChain::new(vehicle_id);
                e.insert(Arc::new(Mutex::new(chain.clone())));
                info!(vehicle = %vehicle_id, "registry: chain created");
                Ok(chain)
            }
        }
    }

    /// Snapshot of one chain, or `None` if the vehicle is unknown.
    pub async fn get_chain(&self, vehicle_id: &str) -> Option<VehicleChain> {
        let handle = self.handle(vehicle_id).ok()?;
        let chain = handle.lock().await;
        Some(chain.clone())
    }

    /// Validate and append a reading, timestamped with the current wall clock.
    pub async fn add_reading(
        &self,
        submission: &ReadingSubmission,
    ) -> Result<ReadingOutcome, ChainError> {
        let now = chrono::Utc::now().timestamp().max(0) as u64;
        self.add_reading_at(submission, now).await
    }

    /// Validate and append a reading submitted at `now` (Unix seconds).
    ///
    /// # Errors
    ///
    /// - [`ChainError::NotFound`] if the vehicle has no chain
    /// - [`ChainError::Suspended`] if the chain is suspended
    /// - [`ChainError::OracleUnavailable`] if the dedup oracle fails
    pub async fn add_reading_at(
        &self,
        submission: &ReadingSubmission,
        now: u64,
    ) -> Result<ReadingOutcome, ChainError> {
        let handle = self.handle(&submission.vehicle_id)?;
        let mut chain = handle.lock().await;
        debug!(vehicle = %submission.vehicle_id, km = submission.odometer_km, "registry: reading submitted");
        chain
            .add_reading(self.oracle.as_ref(), submission, now, &self.config)
            .await
    }

    /// Chain statistics for one vehicle.
    pub async fn summarize(&self, vehicle_id: &str) -> Result<ChainSummary, ChainError> {
        let handle = self.handle(vehicle_id)?;
        let chain = handle.lock().await;
        Ok(chain.summarize())
    }

    /// Full integrity walk for one vehicle.
    pub async fn verify_integrity(&self, vehicle_id: &str) -> Result<IntegrityReport, ChainError> {
        let handle = self.handle(vehicle_id)?;
        let chain = handle.lock().await;
        Ok(chain.verify_integrity())
    }

    /// Operator action: lift a suspension. Returns `true` if the chain was
    /// suspended.
    pub async fn reactivate(&self, vehicle_id: &str) -> Result<bool, ChainError> {
        let handle = self.handle(vehicle_id)?;
        let mut chain = handle.lock().await;
        Ok(chain.reactivate())
    }

    /// Consistent copy of every chain, sorted by vehicle id, for persistence.
    pub async fn snapshot(&self) -> Vec<VehicleChain> {
        let handles: Vec<(String, ChainHandle)> = self
            .chains
            .iter()
            .map(|e| (e.key().clone(), Arc::clone(e.value())))
            .collect();
        let mut chains = Vec::with_capacity(handles.len());
        for (_, handle) in handles {
            chains.push(handle.lock().await.clone());
        }
        chains.sort_by(|a, b| a.vehicle_id().cmp(b.vehicle_id()));
        chains
    }
}
