//! Regression matrix: every model build against every test directory.

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use gistreg_core::{HardwareConfig, PredictionClient, RunEnvironment};

use crate::error::{HarnessError, Result};
use crate::process::{ProcessRunner, ProcessSpec, ProcessStatus};

/// How the test-execution program is launched.
///
/// Invoked as `[interpreter] <script> --test_dir <dir>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GistCommand {
    pub interpreter: Option<String>,
    pub script: PathBuf,
}

impl GistCommand {
    pub fn new(script: impl Into<PathBuf>) -> Self {
        Self {
            interpreter: None,
            script: script.into(),
        }
    }

    pub fn with_interpreter(mut self, interpreter: impl Into<String>) -> Self {
        self.interpreter = Some(interpreter.into());
        self
    }

    /// Spec for one cell, with the run environment applied to the child only.
    pub fn spec(
        &self,
        test_dir: &Path,
        env: &RunEnvironment,
        timeout: Option<Duration>,
    ) -> Result<ProcessSpec> {
        let overlay = env.to_env().map_err(|reason| HarnessError::Environment {
            model_path: env.model_path.clone(),
            reason,
        })?;

        let spec = match &self.interpreter {
            Some(interpreter) => ProcessSpec::new(interpreter.clone()).arg(&self.script),
            None => ProcessSpec::new(self.script.to_string_lossy().into_owned()),
        };
        Ok(spec
            .arg("--test_dir")
            .arg(test_dir)
            .envs(overlay)
            .timeout(timeout))
    }
}

/// Outcome class of one matrix cell.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Passed,
    Failed,
    TimedOut,
    SpawnFailed,
}

/// Result of one (model_path, test_dir) cell.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunRecord {
    pub test_dir: PathBuf,
    pub model_path: PathBuf,

    /// Exit code, or -1 when the script did not exit normally.
    pub return_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub predicted_performance: f64,

    pub status: RunStatus,
    pub duration_ms: u64,
}

impl RunRecord {
    pub fn passed(&self) -> bool {
        self.status == RunStatus::Passed
    }
}

/// A prepared matrix cell: prediction made, environment built.
struct Cell {
    test_dir: PathBuf,
    model_path: PathBuf,
    predicted: f64,
    spec: ProcessSpec,
}

/// Runs the gist script across the cross-product of model builds and test directories.
pub struct RegressionMatrixRunner {
    runner: Arc<dyn ProcessRunner>,
    predictor: Arc<dyn PredictionClient>,
    gist: GistCommand,
    timeout: Option<Duration>,
    parallelism: usize,
}

impl RegressionMatrixRunner {
    pub fn new(
        runner: Arc<dyn ProcessRunner>,
        predictor: Arc<dyn PredictionClient>,
        gist: GistCommand,
    ) -> Self {
        Self {
            runner,
            predictor,
            gist,
            timeout: None,
            parallelism: 1,
        }
    }

    /// Per-run deadline.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Maximum concurrent runs; records are still emitted in matrix order.
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism.max(1);
        self
    }

    /// Run the matrix: `model_paths` outer, `test_dirs` inner.
    ///
    /// Every cell is prepared (prediction and environment) before any run
    /// starts, so a predictor or environment error aborts with nothing
    /// launched. Run failures are recorded and iteration continues.
    pub async fn run(
        &self,
        test_dirs: &[PathBuf],
        model_paths: &[PathBuf],
        config: &HardwareConfig,
    ) -> Result<Vec<RunRecord>> {
        let mut cells = Vec::with_capacity(test_dirs.len() * model_paths.len());
        for model_path in model_paths {
            for test_dir in test_dirs {
                let predicted = self.predictor.predict(config)?;
                let env = RunEnvironment::new(model_path.clone(), *config);
                let spec = self.gist.spec(test_dir, &env, self.timeout)?;
                cells.push(Cell {
                    test_dir: test_dir.clone(),
                    model_path: model_path.clone(),
                    predicted,
                    spec,
                });
            }
        }

        info!(
            cells = cells.len(),
            models = model_paths.len(),
            test_dirs = test_dirs.len(),
            parallelism = self.parallelism,
            "Starting regression matrix"
        );

        // `buffered` yields in submission order regardless of completion order.
        let records = stream::iter(cells)
            .map(|cell| self.execute(cell))
            .buffered(self.parallelism)
            .collect::<Vec<_>>()
            .await;

        Ok(records)
    }

    async fn execute(&self, cell: Cell) -> RunRecord {
        info!(
            test_dir = %cell.test_dir.display(),
            model_path = %cell.model_path.display(),
            predicted_performance = cell.predicted,
            "Running gist"
        );

        match self.runner.run(&cell.spec).await {
            Ok(outcome) => {
                let status = match outcome.status {
                    ProcessStatus::Exited(0) => RunStatus::Passed,
                    ProcessStatus::TimedOut(_) => RunStatus::TimedOut,
                    _ => RunStatus::Failed,
                };
                let return_code = outcome.exit_code();
                if status != RunStatus::Passed {
                    warn!(
                        test_dir = %cell.test_dir.display(),
                        model_path = %cell.model_path.display(),
                        exit_code = return_code,
                        "Gist run did not pass"
                    );
                }
                RunRecord {
                    test_dir: cell.test_dir,
                    model_path: cell.model_path,
                    return_code,
                    stdout: outcome.stdout,
                    stderr: outcome.stderr,
                    predicted_performance: cell.predicted,
                    status,
                    duration_ms: outcome.duration_ms,
                }
            }
            Err(e) => {
                warn!(
                    test_dir = %cell.test_dir.display(),
                    model_path = %cell.model_path.display(),
                    error = %e,
                    "Gist run could not be launched"
                );
                RunRecord {
                    test_dir: cell.test_dir,
                    model_path: cell.model_path,
                    return_code: -1,
                    stdout: String::new(),
                    stderr: e.to_string(),
                    predicted_performance: cell.predicted,
                    status: RunStatus::SpawnFailed,
                    duration_ms: 0,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProcessError;
    use crate::process::ProcessOutcome;
    use async_trait::async_trait;
    use gistreg_core::{PredictError, ENV_GC_CLOCK_FREQ, ENV_MODEL_PATH};
    use std::ffi::OsString;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct FixedPredictor(f64);

    impl PredictionClient for FixedPredictor {
        fn predict(&self, _config: &HardwareConfig) -> std::result::Result<f64, PredictError> {
            Ok(self.0)
        }
    }

    struct FailingPredictor;

    impl PredictionClient for FailingPredictor {
        fn predict(&self, _config: &HardwareConfig) -> std::result::Result<f64, PredictError> {
            Err(PredictError::MalformedModel("forest has no trees".to_string()))
        }
    }

    /// Echoes the test dir; exits 1 for test dirs named `fail`.
    #[derive(Default)]
    struct EchoRunner {
        calls: Mutex<Vec<ProcessSpec>>,
        launched: AtomicUsize,
    }

    #[async_trait]
    impl ProcessRunner for EchoRunner {
        async fn run(&self, spec: &ProcessSpec) -> std::result::Result<ProcessOutcome, ProcessError> {
            self.launched.fetch_add(1, Ordering::SeqCst);
            self.calls.lock().unwrap().push(spec.clone());
            let test_dir = spec.args.last().cloned().unwrap_or_default();
            let code = if test_dir == OsString::from("fail") { 1 } else { 0 };
            Ok(ProcessOutcome {
                status: ProcessStatus::Exited(code),
                stdout: test_dir.to_string_lossy().into_owned(),
                stderr: String::new(),
                duration_ms: 1,
            })
        }
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

    #[test]
    fn test_gist_spec_shape() {
        let env = RunEnvironment::new("m1", config());
        let spec = GistCommand::new("gist.py")
            .with_interpreter("python")
            .spec(Path::new("A"), &env, None)
            .unwrap();
        assert_eq!(spec.program, "python");
        assert_eq!(spec.display(), "python gist.py --test_dir A");
        assert_eq!(spec.env[ENV_MODEL_PATH], "m1");
        assert_eq!(spec.env[ENV_GC_CLOCK_FREQ], "100");
    }

    #[tokio::test]
    async fn test_matrix_order_outer_models_inner_tests() {
        let runner = Arc::new(EchoRunner::default());
        let matrix = RegressionMatrixRunner::new(
            runner.clone(),
            Arc::new(FixedPredictor(7.5)),
            GistCommand::new("gist"),
        );

        let records = matrix
            .run(&paths(&["A", "B", "C"]), &paths(&["m1", "m2"]), &config())
            .await
            .unwrap();

        let order: Vec<(String, String)> = records
            .iter()
            .map(|r| {
                (
                    r.model_path.display().to_string(),
                    r.test_dir.display().to_string(),
                )
            })
            .collect();
        assert_eq!(
            order,
            vec![
                ("m1".into(), "A".into()),
                ("m1".into(), "B".into()),
                ("m1".into(), "C".into()),
                ("m2".into(), "A".into()),
                ("m2".into(), "B".into()),
                ("m2".into(), "C".into()),
            ]
        );
        assert!(records.iter().all(|r| r.predicted_performance == 7.5));
    }

    #[tokio::test]
    async fn test_failing_run_recorded_and_matrix_continues() {
        let runner = Arc::new(EchoRunner::default());
        let matrix = RegressionMatrixRunner::new(
            runner.clone(),
            Arc::new(FixedPredictor(1.0)),
            GistCommand::new("gist"),
        );

        let records = matrix
            .run(&paths(&["fail", "B"]), &paths(&["m1"]), &config())
            .await
            .unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].status, RunStatus::Failed);
        assert_eq!(records[0].return_code, 1);
        assert_eq!(records[1].status, RunStatus::Passed);
        assert_eq!(records[1].stdout, "B");
    }

    #[tokio::test]
    async fn test_predictor_error_aborts_before_launch() {
        let runner = Arc::new(EchoRunner::default());
        let matrix = RegressionMatrixRunner::new(
            runner.clone(),
            Arc::new(FailingPredictor),
            GistCommand::new("gist"),
        );

        let err = matrix
            .run(&paths(&["A"]), &paths(&["m1"]), &config())
            .await
            .unwrap_err();
        assert!(matches!(err, HarnessError::Prediction(_)));
        assert_eq!(runner.launched.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_each_cell_gets_its_own_model_path() {
        let runner = Arc::new(EchoRunner::default());
        let matrix = RegressionMatrixRunner::new(
            runner.clone(),
            Arc::new(FixedPredictor(0.0)),
            GistCommand::new("gist"),
        )
        .with_parallelism(4);

        matrix
            .run(&paths(&["A"]), &paths(&["m1", "m2", "m3"]), &config())
            .await
            .unwrap();

        let mut seen: Vec<String> = runner
            .calls
            .lock()
            .unwrap()
            .iter()
            .map(|spec| spec.env[ENV_MODEL_PATH].clone())
            .collect();
        seen.sort();
        assert_eq!(seen, vec!["m1", "m2", "m3"]);
    }

    #[tokio::test]
    async fn test_empty_inputs_produce_no_records() {
        let runner = Arc::new(EchoRunner::default());
        let matrix = RegressionMatrixRunner::new(
            runner.clone(),
            Arc::new(FixedPredictor(0.0)),
            GistCommand::new("gist"),
        );
        let records = matrix.run(&[], &paths(&["m1"]), &config()).await.unwrap();
        assert!(records.is_empty());
    }
}
