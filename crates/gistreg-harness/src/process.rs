//! Subprocess execution with captured output and an optional deadline.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::ffi::{OsStr, OsString};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::ProcessError;

/// Everything needed to launch one subprocess.
///
/// `env` is overlaid onto the inherited environment of this child only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSpec {
    /// Executable to launch.
    pub program: String,

    /// Positional arguments.
    pub args: Vec<OsString>,

    /// Environment overlay (wins over inherited variables).
    pub env: BTreeMap<String, String>,

    /// Deadline for the whole invocation.
    pub timeout: Option<Duration>,

    /// Working directory, inherited when `None`.
    pub current_dir: Option<PathBuf>,
}

impl ProcessSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            timeout: None,
            current_dir: None,
        }
    }

    /// Build a spec from a command prefix (first element is the executable).
    pub fn from_command(command: &[String]) -> Result<Self, ProcessError> {
        let (program, rest) = command.split_first().ok_or(ProcessError::EmptyCommand)?;
        Ok(Self::new(program.clone()).args(rest))
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    pub fn envs(mut self, env: BTreeMap<String, String>) -> Self {
        self.env.extend(env);
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Human-readable command line for logs and error messages.
    pub fn display(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(&arg.to_string_lossy());
        }
        line
    }
}

/// How a subprocess ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessStatus {
    /// Exited normally with this code.
    Exited(i32),

    /// Terminated by a signal.
    Signaled,

    /// Killed after exceeding its deadline.
    TimedOut(Duration),
}

/// Captured result of one subprocess.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutcome {
    pub status: ProcessStatus,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

impl ProcessOutcome {
    /// Exit code, or -1 when the process did not exit normally.
    pub fn exit_code(&self) -> i32 {
        match self.status {
            ProcessStatus::Exited(code) => code,
            _ => -1,
        }
    }

    /// Whether the process exited with code 0.
    pub fn success(&self) -> bool {
        self.status == ProcessStatus::Exited(0)
    }

    /// Short description used in failure messages.
    pub fn describe(&self) -> String {
        match self.status {
            ProcessStatus::Exited(code) => format!("exited with code {}", code),
            ProcessStatus::Signaled => "terminated by signal".to_string(),
            ProcessStatus::TimedOut(limit) => format!("timed out after {:?}", limit),
        }
    }
}

/// Launches subprocesses.
///
/// A non-zero exit or a timeout is an outcome, not an error; only failing to
/// launch or collect the process is an error.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(&self, spec: &ProcessSpec) -> Result<ProcessOutcome, ProcessError>;
}

/// [`ProcessRunner`] backed by `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioProcessRunner;

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    async fn run(&self, spec: &ProcessSpec) -> Result<ProcessOutcome, ProcessError> {
        let start = Instant::now();

        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .envs(&spec.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &spec.current_dir {
            command.current_dir(dir);
        }

        debug!(command = %spec.display(), "Spawning process");
        let mut child = command.spawn().map_err(|source| ProcessError::Spawn {
            program: spec.program.clone(),
            source,
        })?;

        let stdout = OutputCapture::start(child.stdout.take());
        let stderr = OutputCapture::start(child.stderr.take());

        let waited = match spec.timeout {
            Some(limit) => tokio::time::timeout(limit, child.wait()).await.ok(),
            None => Some(child.wait().await),
        };

        let status = match waited {
            Some(result) => {
                let exit = result.map_err(|source| ProcessError::Wait {
                    program: spec.program.clone(),
                    source,
                })?;
                match exit.code() {
                    Some(code) => ProcessStatus::Exited(code),
                    None => ProcessStatus::Signaled,
                }
            }
            None => {
                let limit = spec.timeout.unwrap_or_default();
                warn!(command = %spec.display(), timeout = ?limit, "Process timed out");
                if let Err(e) = child.kill().await {
                    warn!(command = %spec.display(), error = %e, "Failed to kill timed out process");
                }
                ProcessStatus::TimedOut(limit)
            }
        };
        let duration_ms = start.elapsed().as_millis() as u64;

        // Descendants of a killed child may still hold the pipes open.
        let grace = match status {
            ProcessStatus::TimedOut(_) => Some(OUTPUT_DRAIN_GRACE),
            _ => None,
        };
        let stdout = stdout.finish(grace).await;
        let mut stderr = stderr.finish(grace).await;

        if let ProcessStatus::TimedOut(limit) = status {
            if !stderr.is_empty() && !stderr.ends_with('\n') {
                stderr.push('\n');
            }
            stderr.push_str(&format!("timed out after {:?}", limit));
        }

        Ok(ProcessOutcome {
            status,
            stdout,
            stderr,
            duration_ms,
        })
    }
}

/// How long to keep reading a timed out child's pipes after killing it.
const OUTPUT_DRAIN_GRACE: Duration = Duration::from_millis(250);

/// Reads one child pipe into a shared buffer so partial output survives a kill.
struct OutputCapture {
    buffer: Arc<Mutex<Vec<u8>>>,
    reader: JoinHandle<()>,
}

impl OutputCapture {
    fn start<R>(pipe: Option<R>) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&buffer);
        let reader = tokio::spawn(async move {
            let Some(mut pipe) = pipe else {
                return;
            };
            let mut chunk = [0u8; 8192];
            loop {
                match pipe.read(&mut chunk).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => match sink.lock() {
                        Ok(mut buf) => buf.extend_from_slice(&chunk[..n]),
                        Err(_) => break,
                    },
                }
            }
        });
        Self { buffer, reader }
    }

    /// Wait for end of stream (bounded by `grace` if set) and return what was read.
    async fn finish(mut self, grace: Option<Duration>) -> String {
        match grace {
            Some(grace) => {
                if tokio::time::timeout(grace, &mut self.reader).await.is_err() {
                    self.reader.abort();
                }
            }
            None => {
                let _ = (&mut self.reader).await;
            }
        }
        let captured = match self.buffer.lock() {
            Ok(buf) => String::from_utf8_lossy(&buf).into_owned(),
            Err(_) => String::new(),
        };
        captured
    }
}
