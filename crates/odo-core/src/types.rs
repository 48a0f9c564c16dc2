//! Core ledger types: hashes, blocks, and reading submissions.
//!
//! Odometer values are whole kilometres. Timestamps are Unix seconds.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// A 32-byte hash value.
///
/// Used for block hashes (SHA-256) and cross-app reading fingerprints
/// (BLAKE3). Serialized as lowercase hex.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    /// The zero hash. Used as the genesis block's previous hash.
    pub const ZERO: Self = Self([0u8; 32]);

    /// Create a Hash256 from a byte array.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Return the underlying bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Check if this is the zero hash.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl From<[u8; 32]> for Hash256 {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Hash256 {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl FromStr for Hash256 {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s, &mut bytes)?;
        Ok(Self(bytes))
    }
}

impl Serialize for Hash256 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Hash256 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// One immutable, hash-linked odometer reading.
///
/// Fields are public so the persistence layer can rebuild blocks from
/// storage; [`Block::compute_hash`] and chain integrity verification detect
/// any field changed after creation.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Block {
    /// Position within the chain, 0-based.
    pub index: u64,
    /// Hash of the preceding block. [`Hash256::ZERO`] for genesis.
    pub previous_hash: Hash256,
    /// Creation time, Unix seconds.
    pub timestamp: u64,
    /// Odometer reading in kilometres.
    pub odometer_km: u64,
    /// Content hash of the odometer photo.
    pub image_fingerprint: String,
    /// Geolocation accuracy radius in metres, if the client supplied one.
    pub location_accuracy_m: Option<u32>,
    /// Summary of the submitting device/browser.
    pub device_fingerprint: String,
    /// Fraud score assigned when the block was accepted (0 = clean).
    pub fraud_score: u64,
    /// SHA-256 over all of the above.
    pub hash: Hash256,
}

impl Block {
    /// Build a block and seal it with its hash.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        index: u64,
        previous_hash: Hash256,
        timestamp: u64,
        odometer_km: u64,
        image_fingerprint: impl Into<String>,
        location_accuracy_m: Option<u32>,
        device_fingerprint: impl Into<String>,
        fraud_score: u64,
    ) -> Self {
        let mut block = Self {
            index,
            previous_hash,
            timestamp,
            odometer_km,
            image_fingerprint: image_fingerprint.into(),
            location_accuracy_m,
            device_fingerprint: device_fingerprint.into(),
            fraud_score,
            hash: Hash256::ZERO,
        };
        block.hash = block.compute_hash();
        block
    }

    /// Recompute the block hash from the stored fields.
    ///
    /// Layout: index || previous_hash || timestamp || odometer_km ||
    /// len(image) || image || location_tag [|| accuracy] || len(device) ||
    /// device || fraud_score. Integers little-endian, lengths as u64.
    pub fn compute_hash(&self) -> Hash256 {
        let mut hasher = Sha256::new();
        hasher.update(self.index.to_le_bytes());
        hasher.update(self.previous_hash.as_bytes());
        hasher.update(self.timestamp.to_le_bytes());
        hasher.update(self.odometer_km.to_le_bytes());
        hasher.update((self.image_fingerprint.len() as u64).to_le_bytes());
        hasher.update(self.image_fingerprint.as_bytes());
        match self.location_accuracy_m {
            Some(accuracy) => {
                hasher.update([1u8]);
                hasher.update(accuracy.to_le_bytes());
            }
            None => hasher.update([0u8]),
        }
        hasher.update((self.device_fingerprint.len() as u64).to_le_bytes());
        hasher.update(self.device_fingerprint.as_bytes());
        hasher.update(self.fraud_score.to_le_bytes());
        Hash256(hasher.finalize().into())
    }

    /// Whether this block is the first in its chain.
    pub fn is_genesis(&self) -> bool {
        self.index == 0
    }
}

/// Supporting evidence extracted by the capture/OCR front end.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct ValidationProof {
    /// OCR confidence for the extracted reading, percent 0-100.
    pub ocr_confidence: Option<u8>,
    /// Capture time from the photo's metadata, Unix seconds.
    pub image_captured_at: Option<u64>,
}

/// A reading as handed over by the API layer after decoding and
/// fingerprinting.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ReadingSubmission {
    pub vehicle_id: String,
    pub odometer_km: u64,
    pub image_fingerprint: String,
    #[serde(default)]
    pub location_accuracy_m: Option<u32>,
    pub device_fingerprint: String,
    #[serde(default)]
    pub proof: ValidationProof,
}

impl ReadingSubmission {
    /// Submission with no location or OCR metadata.
    pub fn new(
        vehicle_id: impl Into<String>,
        odometer_km: u64,
        image_fingerprint: impl Into<String>,
        device_fingerprint: impl Into<String>,
    ) -> Self {
        Self {
            vehicle_id: vehicle_id.into(),
            odometer_km,
            image_fingerprint: image_fingerprint.into(),
            location_accuracy_m: None,
            device_fingerprint: device_fingerprint.into(),
            proof: ValidationProof::default(),
        }
    }

    pub fn with_location_accuracy(mut self, accuracy_m: u32) -> Self {
        self.location_accuracy_m = Some(accuracy_m);
        self
    }

    pub fn with_proof(mut self, proof: ValidationProof) -> Self {
        self.proof = proof;
        self
    }
}

/// Fingerprint identifying a reading across participating applications.
///
/// BLAKE3 over `vehicle_id || odometer_km`. Time is not part of the key: the
/// oracle returns when a claim was seen and the dedup window is applied to
/// that (see [`crate::fraud::CrossAppStatus::from_lookup`]).
pub fn reading_fingerprint(vehicle_id: &str, odometer_km: u64) -> Hash256 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&(vehicle_id.len() as u64).to_le_bytes());
    hasher.update(vehicle_id.as_bytes());
    hasher.update(&odometer_km.to_le_bytes());
    Hash256(*hasher.finalize().as_bytes())
}
