//! gistreg harness - regression orchestration
//!
//! Provides the stages of a hardware-configuration regression:
//! - Replays captured traces concurrently and captures intents
//! - Materializes test directories from the populated work area
//! - Runs the gist script across model builds × test directories
//! - Collects run records into a tabular report

pub mod corpus;
pub mod error;
pub mod matrix;
pub mod process;
pub mod replay;
pub mod report;
pub mod testdir;

// Re-export key types
pub use corpus::{CorpusReport, TestCorpusGenerator};
pub use error::{HarnessError, ProcessError, Result};
pub use matrix::{GistCommand, RegressionMatrixRunner, RunRecord, RunStatus};
pub use process::{ProcessOutcome, ProcessRunner, ProcessSpec, ProcessStatus, TokioProcessRunner};
pub use replay::{check_traces, replay_trace, ReplaySummary, TraceFailure, TraceReplayStage};
pub use report::{RegressionSummary, ResultsCollector, DEFAULT_REPORT_PATH, REPORT_COLUMNS};
pub use testdir::{BuildReport, TestDirectoryBuilder, TEST_DIRECTORY_MANIFEST};
