//! Integration tests for the regression matrix against real stub gist scripts.

use gistreg_core::{HardwareConfig, PredictError, PredictionClient};
use gistreg_harness::{
    GistCommand, RegressionMatrixRunner, ResultsCollector, RunStatus, TokioProcessRunner,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Predictor returning a constant, standing in for a trained model.
struct FixedPredictor(f64);

impl PredictionClient for FixedPredictor {
    fn predict(&self, _config: &HardwareConfig) -> Result<f64, PredictError> {
        Ok(self.0)
    }
}

fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).expect("write script");
    path
}

fn matrix(script: &Path, predicted: f64) -> RegressionMatrixRunner {
    RegressionMatrixRunner::new(
        Arc::new(TokioProcessRunner),
        Arc::new(FixedPredictor(predicted)),
        GistCommand::new(script).with_interpreter("sh"),
    )
}

fn config() -> HardwareConfig {
    HardwareConfig {
        hash_enabled: false,
        gc_clock_freq: 100,
        sbm_clock_freq: 200,
        wr_rd_latency: 5,
    }
}

fn paths(names: &[&str]) -> Vec<PathBuf> {
    names.iter().map(PathBuf::from).collect()
}

/// Test: two test dirs, one model, echoing script, constant prediction
#[tokio::test]
async fn test_end_to_end_report() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(dir.path(), "gist.sh", "echo \"$2\"\nexit 0");

    let records = matrix(&script, 42.0)
        .run(&paths(&["A", "B"]), &paths(&["m1"]), &config())
        .await
        .expect("matrix failed");

    assert_eq!(records.len(), 2);
    assert_eq!(records[0].test_dir, PathBuf::from("A"));
    assert_eq!(records[1].test_dir, PathBuf::from("B"));
    for record in &records {
        assert_eq!(record.return_code, 0);
        assert_eq!(record.predicted_performance, 42.0);
        assert_eq!(record.status, RunStatus::Passed);
    }
    assert!(records[0].stdout.contains('A'));
    assert!(records[1].stdout.contains('B'));

    let report = dir.path().join("regression_results.csv");
    ResultsCollector::write(&records, &report).unwrap();
    let table = std::fs::read_to_string(&report).unwrap();
    assert!(table.starts_with(
        "test_dir,model_path,return_code,stdout,stderr,predicted_performance\r\n"
    ));
    assert!(table.contains("A,m1,0,\"A\n\",,42.0\r\n"));
    assert!(table.contains("B,m1,0,\"B\n\",,42.0\r\n"));
}

/// Test: record count is models × test dirs, outer models
#[tokio::test]
async fn test_matrix_cardinality_and_order() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(dir.path(), "gist.sh", "echo \"$MODEL_PATH:$2\"");

    let records = matrix(&script, 1.0)
        .run(&paths(&["t1", "t2"]), &paths(&["m1", "m2", "m3"]), &config())
        .await
        .unwrap();

    let seen: Vec<String> = records.iter().map(|r| r.stdout.trim().to_string()).collect();
    assert_eq!(
        seen,
        vec!["m1:t1", "m1:t2", "m2:t1", "m2:t2", "m3:t1", "m3:t2"]
    );
}

/// Test: every config field reaches the script as an environment variable
#[tokio::test]
async fn test_environment_injected() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(
        dir.path(),
        "gist.sh",
        "echo \"$MODEL_PATH|$HASH_ENABLED|$GC_CLOCK_FREQ|$SBM_CLOCK_FREQ|$WR_RD_LATENCY\"",
    );
    let config = HardwareConfig {
        hash_enabled: true,
        ..config()
    };

    let records = matrix(&script, 0.0)
        .run(&paths(&["A"]), &paths(&["/builds/m7"]), &config)
        .await
        .unwrap();

    assert_eq!(records[0].stdout.trim(), "/builds/m7|True|100|200|5");
}

/// Test: failing, timed-out and unlaunchable runs are data, not errors
#[tokio::test]
async fn test_failures_recorded_as_data() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(
        dir.path(),
        "gist.sh",
        "case \"$2\" in\n  fail) echo broken >&2; exit 3;;\n  hang) echo started; sleep 30;;\nesac\necho ok",
    );

    let records = matrix(&script, 2.0)
        .with_timeout(Some(Duration::from_millis(500)))
        .run(&paths(&["fail", "hang", "ok"]), &paths(&["m1"]), &config())
        .await
        .unwrap();

    assert_eq!(records[0].status, RunStatus::Failed);
    assert_eq!(records[0].return_code, 3);
    assert!(records[0].stderr.contains("broken"));

    assert_eq!(records[1].status, RunStatus::TimedOut);
    assert_eq!(records[1].return_code, -1);
    assert_eq!(records[1].stdout.trim(), "started");
    assert!(records[1].stderr.contains("timed out after 500ms"));

    assert_eq!(records[2].status, RunStatus::Passed);
    assert_eq!(records[2].stdout.trim(), "ok");
}

/// Test: a script that cannot be launched is recorded per cell
#[tokio::test]
async fn test_unlaunchable_script_recorded() {
    let runner = RegressionMatrixRunner::new(
        Arc::new(TokioProcessRunner),
        Arc::new(FixedPredictor(3.0)),
        GistCommand::new("/nonexistent/gist_script"),
    );

    let records = runner
        .run(&paths(&["A", "B"]), &paths(&["m1"]), &config())
        .await
        .unwrap();

    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.status == RunStatus::SpawnFailed));
    assert!(records.iter().all(|r| r.return_code == -1));
    assert!(records[0].stderr.contains("failed to spawn"));
}

/// Test: parallel runs still emit records in matrix order
#[tokio::test]
async fn test_parallel_runs_keep_matrix_order() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(
        dir.path(),
        "gist.sh",
        "case \"$2\" in\n  slow) sleep 1;;\nesac\necho \"$2\"",
    );

    let records = matrix(&script, 0.0)
        .with_parallelism(3)
        .run(&paths(&["slow", "fast1", "fast2"]), &paths(&["m1"]), &config())
        .await
        .unwrap();

    let seen: Vec<&str> = records.iter().map(|r| r.stdout.trim()).collect();
    assert_eq!(seen, vec!["slow", "fast1", "fast2"]);
}
