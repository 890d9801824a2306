//! Harness settings: timeouts, pool sizes, work-area policy and tool commands.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::SettingsError;

/// How concurrent trace replays share the work area.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum WorkAreaPolicy {
    /// Every replay writes to the work area root; traces must target disjoint paths.
    #[default]
    Shared,

    /// Trace `i` replays into `<work_area>/<i>-<file stem>`.
    PerTrace,
}

/// Settings for one harness invocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HarnessSettings {
    /// Per-subprocess timeout in seconds (0 = unbounded).
    pub timeout_secs: u64,

    /// Concurrent trace replays (0 = host parallelism).
    pub replay_workers: usize,

    /// Concurrent gist runs in the matrix (1 = sequential).
    pub matrix_parallelism: usize,

    /// Work-area sharing policy for trace replay.
    pub work_area_policy: WorkAreaPolicy,

    /// Replayer command prefix; invoked as `<cmd...> <trace> <work_area>`.
    pub replayer: Vec<String>,

    /// Intent-capture command prefix; invoked as `<cmd...> <work_area>`.
    pub intent_capture: Vec<String>,
}

impl Default for HarnessSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 0,
            replay_workers: 0,
            matrix_parallelism: 1,
            work_area_policy: WorkAreaPolicy::Shared,
            replayer: vec!["python".to_string(), "replay.py".to_string()],
            intent_capture: vec!["python".to_string(), "intent_capture.py".to_string()],
        }
    }
}

impl HarnessSettings {
    /// Read settings from a JSON file; absent keys keep their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self, SettingsError> {
        let content = std::fs::read_to_string(path)?;
        let settings: Self = serde_json::from_str(&content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject settings that cannot launch anything.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.replayer.is_empty() {
            return Err(SettingsError::Invalid(
                "replayer command is empty".to_string(),
            ));
        }
        if self.intent_capture.is_empty() {
            return Err(SettingsError::Invalid(
                "intent_capture command is empty".to_string(),
            ));
        }
        if self.matrix_parallelism == 0 {
            return Err(SettingsError::Invalid(
                "matrix_parallelism must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Subprocess timeout, if bounded.
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }

    /// Effective replay pool size.
    pub fn replay_pool_size(&self) -> usize {
        if self.replay_workers > 0 {
            self.replay_workers
        } else {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        }
    }
}
