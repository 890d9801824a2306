//! Error types for the harness stages.
//!
//! Each variant names the stage and the input that caused the abort.
//! Failures that are data (a non-zero gist exit, one bad trace replay) never
//! surface here at the stage boundary.

use std::path::PathBuf;

use gistreg_core::PredictError;

/// Errors produced while launching a subprocess.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("command is empty")]
    EmptyCommand,

    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to collect output of {program}: {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Errors that abort a harness stage.
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error("trace replay: missing trace {}", .path.display())]
    MissingTrace { path: PathBuf },

    #[error("trace replay: replay of {} failed: {reason}", .trace.display())]
    Replay { trace: PathBuf, reason: String },

    #[error("intent capture: work area {} failed: {reason}", .work_area.display())]
    IntentCapture { work_area: PathBuf, reason: String },

    #[error("trace replay: work area {} unavailable: {source}", .path.display())]
    WorkArea {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("test directory: {} could not be built: {source}", .path.display())]
    TestDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("regression matrix: environment for model {} invalid: {reason}", .model_path.display())]
    Environment { model_path: PathBuf, reason: String },

    #[error("regression matrix: prediction failed: {0}")]
    Prediction(#[from] PredictError),

    #[error("results: report {} could not be written: {source}", .path.display())]
    Report {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Process(#[from] ProcessError),
}

/// Result type for harness operations.
pub type Result<T> = std::result::Result<T, HarnessError>;
