//! Hardware configuration under test and the per-run environment derived from it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::PredictError;
use crate::schema::FeatureSchema;

/// Environment variable carrying the model build path.
pub const ENV_MODEL_PATH: &str = "MODEL_PATH";
/// Environment variable carrying the hash-enable flag.
pub const ENV_HASH_ENABLED: &str = "HASH_ENABLED";
/// Environment variable carrying the GC clock frequency.
pub const ENV_GC_CLOCK_FREQ: &str = "GC_CLOCK_FREQ";
/// Environment variable carrying the SBM clock frequency.
pub const ENV_SBM_CLOCK_FREQ: &str = "SBM_CLOCK_FREQ";
/// Environment variable carrying the write/read latency.
pub const ENV_WR_RD_LATENCY: &str = "WR_RD_LATENCY";

/// Timing and feature parameters under test.
///
/// Shared read-only across every cell of one regression invocation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub struct HardwareConfig {
    pub hash_enabled: bool,
    pub gc_clock_freq: i64,
    pub sbm_clock_freq: i64,
    pub wr_rd_latency: i64,
}

impl HardwareConfig {
    /// Look up a single feature value by schema name.
    pub fn feature(&self, name: &str) -> Option<f64> {
        match name {
            "hash_enabled" => Some(if self.hash_enabled { 1.0 } else { 0.0 }),
            "gc_clock_freq" => Some(self.gc_clock_freq as f64),
            "sbm_clock_freq" => Some(self.sbm_clock_freq as f64),
            "wr_rd_latency" => Some(self.wr_rd_latency as f64),
            _ => None,
        }
    }

    /// Build the feature vector in the order named by `schema`.
    pub fn features(&self, schema: &FeatureSchema) -> Result<Vec<f64>, PredictError> {
        schema
            .features
            .iter()
            .map(|name| {
                self.feature(name)
                    .ok_or_else(|| PredictError::UnknownFeature(name.clone()))
            })
            .collect()
    }
}

/// Environment handed to one gist invocation.
///
/// Built fresh for every matrix cell and passed to the child process only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunEnvironment {
    pub model_path: PathBuf,
    pub config: HardwareConfig,
}

impl RunEnvironment {
    pub fn new(model_path: impl Into<PathBuf>, config: HardwareConfig) -> Self {
        Self {
            model_path: model_path.into(),
            config,
        }
    }

    /// Render the environment variables for the child process.
    ///
    /// Fails when the model path is not valid UTF-8.
    pub fn to_env(&self) -> Result<BTreeMap<String, String>, String> {
        let model_path = path_to_env_value(&self.model_path)?;
        let mut env = BTreeMap::new();
        env.insert(ENV_MODEL_PATH.to_string(), model_path);
        env.insert(
            ENV_HASH_ENABLED.to_string(),
            if self.config.hash_enabled { "True" } else { "False" }.to_string(),
        );
        env.insert(
            ENV_GC_CLOCK_FREQ.to_string(),
            self.config.gc_clock_freq.to_string(),
        );
        env.insert(
            ENV_SBM_CLOCK_FREQ.to_string(),
            self.config.sbm_clock_freq.to_string(),
        );
        env.insert(
            ENV_WR_RD_LATENCY.to_string(),
            self.config.wr_rd_latency.to_string(),
        );
        Ok(env)
    }
}

fn path_to_env_value(path: &Path) -> Result<String, String> {
    path.to_str()
        .map(str::to_string)
        .ok_or_else(|| format!("model path is not valid UTF-8: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> HardwareConfig {
        HardwareConfig {
            hash_enabled: true,
            gc_clock_freq: 100,
            sbm_clock_freq: 200,
            wr_rd_latency: 5,
        }
    }

    #[test]
    fn test_features_follow_v1_order() {
        let features = sample().features(&FeatureSchema::v1()).unwrap();
        assert_eq!(features, vec![1.0, 100.0, 200.0, 5.0]);
    }

    #[test]
    fn test_features_follow_schema_not_field_order() {
        let schema = FeatureSchema::new(7, &["wr_rd_latency", "hash_enabled"]);
        let features = sample().features(&schema).unwrap();
        assert_eq!(features, vec![5.0, 1.0]);
    }

    #[test]
    fn test_unknown_feature_rejected() {
        let schema = FeatureSchema::new(1, &["core_voltage"]);
        let err = sample().features(&schema).unwrap_err();
        assert!(matches!(err, PredictError::UnknownFeature(name) if name == "core_voltage"));
    }

    #[test]
    fn test_run_environment_variables() {
        let env = RunEnvironment::new("/builds/m1", sample()).to_env().unwrap();
        assert_eq!(env.len(), 5);
        assert_eq!(env[ENV_MODEL_PATH], "/builds/m1");
        assert_eq!(env[ENV_HASH_ENABLED], "True");
        assert_eq!(env[ENV_GC_CLOCK_FREQ], "100");
        assert_eq!(env[ENV_SBM_CLOCK_FREQ], "200");
        assert_eq!(env[ENV_WR_RD_LATENCY], "5");
    }

    #[test]
    fn test_hash_disabled_renders_false() {
        let config = HardwareConfig {
            hash_enabled: false,
            ..sample()
        };
        let env = RunEnvironment::new("m", config).to_env().unwrap();
        assert_eq!(env[ENV_HASH_ENABLED], "False");
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_model_path_rejected() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let path = PathBuf::from(OsStr::from_bytes(b"/builds/\xff"));
        let err = RunEnvironment::new(path, sample()).to_env().unwrap_err();
        assert!(err.contains("not valid UTF-8"));
    }
}
