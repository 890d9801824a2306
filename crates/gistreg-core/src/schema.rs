//! Versioned feature schema shared by model training and prediction.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Feature names of the v1 hardware schema, in vector order.
pub const V1_FEATURES: [&str; 4] = [
    "hash_enabled",
    "gc_clock_freq",
    "sbm_clock_freq",
    "wr_rd_latency",
];

/// Ordered, versioned description of a model's input vector.
///
/// The digest covers the version and the ordered feature names, so a model
/// trained against one ordering cannot silently be fed another.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeatureSchema {
    /// Schema version.
    pub version: u32,

    /// Feature names in vector order.
    pub features: Vec<String>,

    /// SHA-256 over version and ordered names (hex).
    pub digest: String,
}

impl FeatureSchema {
    /// Create a schema from ordered feature names.
    pub fn new(version: u32, features: &[&str]) -> Self {
        let features: Vec<String> = features.iter().map(|f| f.to_string()).collect();
        let digest = compute_schema_digest(version, &features);
        Self {
            version,
            features,
            digest,
        }
    }

    /// The hardware schema: `[hash_enabled, gc_clock_freq, sbm_clock_freq, wr_rd_latency]`.
    pub fn v1() -> Self {
        Self::new(1, &V1_FEATURES)
    }

    /// Number of features.
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// Whether the schema has no features.
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Whether the stored digest matches the version and names.
    pub fn is_consistent(&self) -> bool {
        compute_schema_digest(self.version, &self.features) == self.digest
    }
}

impl Default for FeatureSchema {
    fn default() -> Self {
        Self::v1()
    }
}

fn compute_schema_digest(version: u32, features: &[String]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(version.to_le_bytes());
    for feature in features {
        hasher.update(feature.as_bytes());
        hasher.update(b"\0");
    }
    hex::encode(hasher.finalize())
}
