//! Concurrent trace replay followed by a single intent capture.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use gistreg_core::{HarnessSettings, WorkAreaPolicy};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{HarnessError, Result};
use crate::process::{ProcessOutcome, ProcessRunner, ProcessSpec};
use crate::testdir::copy_artifact;

/// A trace whose replay failed without aborting the stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceFailure {
    pub trace: PathBuf,
    pub reason: String,
}

/// Per-trace outcomes of one replay stage, in input order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub completed: Vec<PathBuf>,
    pub failed: Vec<TraceFailure>,
}

impl ReplaySummary {
    pub fn all_completed(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Every trace must exist before any replay starts.
pub fn check_traces(traces: &[PathBuf]) -> Result<()> {
    match traces.iter().find(|trace| !trace.exists()) {
        Some(missing) => Err(HarnessError::MissingTrace {
            path: missing.clone(),
        }),
        None => Ok(()),
    }
}

/// Replay one trace. A non-zero replayer exit is an error.
pub async fn replay_trace(
    runner: &dyn ProcessRunner,
    spec: &ProcessSpec,
    trace: &Path,
) -> Result<()> {
    let outcome = runner
        .run(spec)
        .await
        .map_err(|e| HarnessError::Replay {
            trace: trace.to_path_buf(),
            reason: e.to_string(),
        })?;

    if outcome.success() {
        Ok(())
    } else {
        Err(HarnessError::Replay {
            trace: trace.to_path_buf(),
            reason: failure_reason(&outcome),
        })
    }
}

/// Replays traces into a work area and captures intents from it.
pub struct TraceReplayStage {
    runner: Arc<dyn ProcessRunner>,
    replayer: Vec<String>,
    intent_capture: Vec<String>,
    workers: usize,
    timeout: Option<Duration>,
    policy: WorkAreaPolicy,
}

impl TraceReplayStage {
    pub fn new(runner: Arc<dyn ProcessRunner>, settings: &HarnessSettings) -> Self {
        Self {
            runner,
            replayer: settings.replayer.clone(),
            intent_capture: settings.intent_capture.clone(),
            workers: settings.replay_pool_size(),
            timeout: settings.timeout(),
            policy: settings.work_area_policy,
        }
    }

    /// Directory trace `index` replays into under the configured policy.
    pub fn trace_area(&self, work_area: &Path, index: usize, trace: &Path) -> PathBuf {
        match self.policy {
            WorkAreaPolicy::Shared => work_area.to_path_buf(),
            WorkAreaPolicy::PerTrace => {
                let stem = trace
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "trace".to_string());
                work_area.join(format!("{}-{}", index, stem))
            }
        }
    }

    /// Replay every trace concurrently on a bounded pool.
    ///
    /// Fails before launching anything if a trace is missing. Individual
    /// replay failures are logged and returned in the summary.
    pub async fn replay_all(&self, traces: &[PathBuf], work_area: &Path) -> Result<ReplaySummary> {
        check_traces(traces)?;

        let mut specs = Vec::with_capacity(traces.len());
        for (index, trace) in traces.iter().enumerate() {
            let area = self.trace_area(work_area, index, trace);
            std::fs::create_dir_all(&area).map_err(|source| HarnessError::WorkArea {
                path: area.clone(),
                source,
            })?;
            let spec = ProcessSpec::from_command(&self.replayer)?
                .arg(trace)
                .arg(&area)
                .timeout(self.timeout);
            specs.push(spec);
        }

        info!(
            traces = traces.len(),
            workers = self.workers,
            work_area = %work_area.display(),
            "Replaying traces"
        );

        let semaphore = Arc::new(Semaphore::new(self.workers.max(1)));
        let mut tasks: Vec<(PathBuf, JoinHandle<Result<()>>)> = Vec::with_capacity(traces.len());

        for (trace, spec) in traces.iter().cloned().zip(specs) {
            let runner = Arc::clone(&self.runner);
            let semaphore = Arc::clone(&semaphore);
            let task_trace = trace.clone();

            let task = tokio::spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| HarnessError::Replay {
                        trace: task_trace.clone(),
                        reason: e.to_string(),
                    })?;
                let result = replay_trace(runner.as_ref(), &spec, &task_trace).await;
                match &result {
                    Ok(()) => info!(trace = %task_trace.display(), "Replay completed"),
                    Err(e) => warn!(trace = %task_trace.display(), error = %e, "Replay failed"),
                }
                result
            });
            tasks.push((trace, task));
        }

        // Join point: every replay settles before the stage returns.
        let mut summary = ReplaySummary::default();
        for (trace, task) in tasks {
            match task.await {
                Ok(Ok(())) => summary.completed.push(trace),
                Ok(Err(e)) => summary.failed.push(TraceFailure {
                    trace,
                    reason: e.to_string(),
                }),
                Err(join_error) => {
                    warn!(trace = %trace.display(), error = %join_error, "Replay task aborted");
                    summary.failed.push(TraceFailure {
                        trace,
                        reason: join_error.to_string(),
                    });
                }
            }
        }

        info!(
            completed = summary.completed.len(),
            failed = summary.failed.len(),
            "Trace replay settled"
        );
        Ok(summary)
    }

    /// Capture intents once for the work area. Any failure is stage-fatal.
    pub async fn capture_intents(&self, work_area: &Path) -> Result<ProcessOutcome> {
        let spec = ProcessSpec::from_command(&self.intent_capture)?
            .arg(work_area)
            .timeout(self.timeout);

        info!(work_area = %work_area.display(), "Capturing intents");
        let outcome = self
            .runner
            .run(&spec)
            .await
            .map_err(|e| HarnessError::IntentCapture {
                work_area: work_area.to_path_buf(),
                reason: e.to_string(),
            })?;

        if !outcome.success() {
            return Err(HarnessError::IntentCapture {
                work_area: work_area.to_path_buf(),
                reason: failure_reason(&outcome),
            });
        }
        Ok(outcome)
    }

    /// Copy the contents of each completed trace's sub-area into the work
    /// area root. Later traces overwrite earlier ones on name clashes.
    /// Nothing to do under [`WorkAreaPolicy::Shared`].
    pub fn merge_trace_areas(
        &self,
        traces: &[PathBuf],
        work_area: &Path,
        summary: &ReplaySummary,
    ) -> Result<()> {
        if self.policy == WorkAreaPolicy::Shared {
            return Ok(());
        }

        for (index, trace) in traces.iter().enumerate() {
            if !summary.completed.contains(trace) {
                continue;
            }
            let area = self.trace_area(work_area, index, trace);
            let entries = std::fs::read_dir(&area).map_err(|source| HarnessError::WorkArea {
                path: area.clone(),
                source,
            })?;
            for entry in entries {
                let entry = entry.map_err(|source| HarnessError::WorkArea {
                    path: area.clone(),
                    source,
                })?;
                let target = work_area.join(entry.file_name());
                copy_artifact(&entry.path(), &target)
                    .map_err(|source| HarnessError::WorkArea { path: target, source })?;
            }
            debug!(area = %area.display(), "Merged trace area into work area");
        }
        Ok(())
    }

    /// Replay all traces, then capture intents exactly once on the work
    /// area root.
    pub async fn run(&self, traces: &[PathBuf], work_area: &Path) -> Result<ReplaySummary> {
        let summary = self.replay_all(traces, work_area).await?;
        self.merge_trace_areas(traces, work_area, &summary)?;
        self.capture_intents(work_area).await?;
        Ok(summary)
    }
}

fn failure_reason(outcome: &ProcessOutcome) -> String {
    let stderr = outcome.stderr.trim();
    if stderr.is_empty() {
        outcome.describe()
    } else {
        format!("{}: {}", outcome.describe(), stderr)
    }
}
