//! Regression report artifacts.
//!
//! - `regression_results.csv`: one row per run record, in matrix order
//! - optional JSON summary with aggregate counts per invocation

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;
use uuid::Uuid;

use gistreg_core::HardwareConfig;

use crate::error::{HarnessError, Result};
use crate::matrix::{RunRecord, RunStatus};

/// Default report destination.
pub const DEFAULT_REPORT_PATH: &str = "regression_results.csv";

/// Report columns, in order.
pub const REPORT_COLUMNS: [&str; 6] = [
    "test_dir",
    "model_path",
    "return_code",
    "stdout",
    "stderr",
    "predicted_performance",
];

/// Serializes run records to the tabular report.
pub struct ResultsCollector;

impl ResultsCollector {
    /// Render the header and one row per record.
    pub fn render(records: &[RunRecord]) -> String {
        let mut table = REPORT_COLUMNS.join(",");
        table.push_str("\r\n");
        for record in records {
            let row = [
                escape_field(&record.test_dir.to_string_lossy()),
                escape_field(&record.model_path.to_string_lossy()),
                record.return_code.to_string(),
                escape_field(&record.stdout),
                escape_field(&record.stderr),
                format!("{:?}", record.predicted_performance),
            ];
            table.push_str(&row.join(","));
            table.push_str("\r\n");
        }
        table
    }

    /// Write the report, replacing any existing file.
    pub fn write(records: &[RunRecord], destination: &Path) -> Result<()> {
        std::fs::write(destination, Self::render(records)).map_err(|source| {
            HarnessError::Report {
                path: destination.to_path_buf(),
                source,
            }
        })?;
        info!(path = %destination.display(), rows = records.len(), "Results collected");
        Ok(())
    }
}

/// Quote a field containing a delimiter, quote or line break.
fn escape_field(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') || field.contains('\r') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Status of one record in the JSON summary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecordStatus {
    pub test_dir: PathBuf,
    pub model_path: PathBuf,
    pub status: RunStatus,
    pub return_code: i32,
    pub duration_ms: u64,
}

/// Aggregate outcome of one regression invocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegressionSummary {
    pub invocation_id: Uuid,
    pub run_at: DateTime<Utc>,
    pub config: HardwareConfig,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub timed_out: usize,
    pub spawn_failed: usize,
    pub predicted_performance: Option<f64>,
    pub records: Vec<RecordStatus>,
}

impl RegressionSummary {
    pub fn new(config: HardwareConfig, records: &[RunRecord]) -> Self {
        let count = |status: RunStatus| records.iter().filter(|r| r.status == status).count();

        Self {
            invocation_id: Uuid::new_v4(),
            run_at: Utc::now(),
            config,
            total: records.len(),
            passed: count(RunStatus::Passed),
            failed: count(RunStatus::Failed),
            timed_out: count(RunStatus::TimedOut),
            spawn_failed: count(RunStatus::SpawnFailed),
            predicted_performance: records.first().map(|r| r.predicted_performance),
            records: records
                .iter()
                .map(|r| RecordStatus {
                    test_dir: r.test_dir.clone(),
                    model_path: r.model_path.clone(),
                    status: r.status,
                    return_code: r.return_code,
                    duration_ms: r.duration_ms,
                })
                .collect(),
        }
    }

    /// Whether every run passed.
    pub fn all_passed(&self) -> bool {
        self.passed == self.total
    }

    pub fn write_json(&self, destination: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(destination, json).map_err(|source| HarnessError::Report {
            path: destination.to_path_buf(),
            source,
        })
    }
}
