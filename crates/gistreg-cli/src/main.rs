//! gistreg - hardware-configuration regression harness CLI
//!
//! ## Commands
//!
//! - `run`: run the gist script across model builds × test directories and
//!   write the regression report
//! - `generate`: replay traces, capture intents and build a test directory
//!
//! Invoking without a subcommand (`gistreg --test_dirs ... --gist_script ...`)
//! runs the regression matrix.

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, Level};

use gistreg_core::{
    HardwareConfig, HarnessSettings, ModelError, ModelPredictor, ModelResult, ModelStore,
    ModelTrainer, PerformanceModel, WorkAreaPolicy, DEFAULT_MODEL_STORE,
};
use gistreg_harness::{
    GistCommand, RegressionMatrixRunner, RegressionSummary, ResultsCollector, TestCorpusGenerator,
    TestDirectoryBuilder, TokioProcessRunner, TraceReplayStage, DEFAULT_REPORT_PATH,
};

#[derive(Parser)]
#[command(name = "gistreg")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Regression setup for gist runs with performance prediction", long_about = None)]
#[command(after_help = "Without a subcommand, the arguments are parsed as `gistreg run`.")]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the regression matrix and collect results
    Run(RunArgs),

    /// Replay traces into a work area and generate a test directory
    Generate(GenerateArgs),
}

#[derive(Args)]
struct RunArgs {
    /// List of test directories
    #[arg(long = "test_dirs", required = true, num_args = 1..)]
    test_dirs: Vec<PathBuf>,

    /// List of model build paths
    #[arg(long = "model_paths", required = true, num_args = 1..)]
    model_paths: Vec<PathBuf>,

    /// Enable or disable hash
    #[arg(
        long = "hash_enabled",
        action = ArgAction::Set,
        num_args = 0..=1,
        default_value_t = false,
        default_missing_value = "true"
    )]
    hash_enabled: bool,

    /// GC clock frequency
    #[arg(long = "gc_clock_freq")]
    gc_clock_freq: i64,

    /// SBM clock frequency
    #[arg(long = "sbm_clock_freq")]
    sbm_clock_freq: i64,

    /// Write/Read latency
    #[arg(long = "wr_rd_latency")]
    wr_rd_latency: i64,

    /// Path to the gist run script
    #[arg(long = "gist_script")]
    gist_script: PathBuf,

    /// Interpreter to launch the gist script with (e.g. python)
    #[arg(long)]
    interpreter: Option<String>,

    /// Persisted performance model
    #[arg(long, env = "GISTREG_MODEL_STORE", default_value = DEFAULT_MODEL_STORE)]
    model_store: PathBuf,

    /// Command that trains a model when none is stored; receives the store path
    #[arg(long, num_args = 1.., value_delimiter = ' ')]
    train_command: Option<Vec<String>>,

    /// Report destination
    #[arg(short, long, default_value = DEFAULT_REPORT_PATH)]
    output: PathBuf,

    /// Also write a JSON summary here
    #[arg(long)]
    summary_json: Option<PathBuf>,

    /// Maximum concurrent gist runs (records stay in matrix order)
    #[arg(long)]
    parallel: Option<usize>,

    #[command(flatten)]
    harness: HarnessArgs,
}

#[derive(Args)]
struct GenerateArgs {
    /// Trace files to replay
    #[arg(long, required = true, num_args = 1..)]
    traces: Vec<PathBuf>,

    /// Work area populated by replay and intent capture
    #[arg(long)]
    work_area: PathBuf,

    /// Test directory to generate
    #[arg(long)]
    test_dir: PathBuf,

    /// Concurrent replays (default: host parallelism)
    #[arg(long)]
    workers: Option<usize>,

    /// Give each trace its own sub-directory of the work area
    #[arg(long)]
    per_trace: bool,

    #[command(flatten)]
    harness: HarnessArgs,
}

#[derive(Args)]
struct HarnessArgs {
    /// JSON settings file
    #[arg(long, env = "GISTREG_SETTINGS")]
    settings: Option<PathBuf>,

    /// Per-subprocess timeout in seconds (0 = unbounded)
    #[arg(long, env = "GISTREG_TIMEOUT_SECS")]
    timeout_secs: Option<u64>,
}

impl HarnessArgs {
    fn load(&self) -> Result<HarnessSettings> {
        let mut settings = match &self.settings {
            Some(path) => HarnessSettings::from_json_file(path)
                .with_context(|| format!("Failed to read settings file: {:?}", path))?,
            None => HarnessSettings::default(),
        };
        if let Some(timeout_secs) = self.timeout_secs {
            settings.timeout_secs = timeout_secs;
        }
        Ok(settings)
    }
}

/// Trains the model by running an external command with the store path.
struct CommandTrainer {
    command: Vec<String>,
}

impl ModelTrainer for CommandTrainer {
    fn train(&self, path: &Path) -> ModelResult<()> {
        let (program, args) = self
            .command
            .split_first()
            .ok_or_else(|| ModelError::TrainingFailed("train command is empty".to_string()))?;

        info!(command = %self.command.join(" "), "Training performance model");
        let output = std::process::Command::new(program)
            .args(args)
            .arg(path)
            .output()?;

        if !output.status.success() {
            return Err(ModelError::TrainingFailed(format!(
                "{} exited with {}: {}",
                program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }
}

/// Insert the `run` subcommand when the first non-global argument is a flag,
/// so `gistreg --test_dirs A --model_paths m1 ...` still parses.
fn with_default_command<I>(args: I) -> Vec<OsString>
where
    I: IntoIterator,
    I::Item: Into<OsString>,
{
    let mut args: Vec<OsString> = args.into_iter().map(Into::into).collect();
    let first = args
        .iter()
        .skip(1)
        .position(|arg| !matches!(arg.to_str(), Some("-v" | "--verbose" | "--json")))
        .map(|i| i + 1);

    if let Some(index) = first {
        let is_flag = args[index]
            .to_str()
            .map(|arg| {
                arg.starts_with('-') && !matches!(arg, "-h" | "--help" | "-V" | "--version")
            })
            .unwrap_or(false);
        if is_flag {
            args.insert(index, OsString::from("run"));
        }
    }
    args
}

/// Load the stored model, training it first if needed, off the async runtime.
async fn load_model(
    store: ModelStore,
    trainer: Option<CommandTrainer>,
) -> Result<PerformanceModel> {
    let path = store.path().to_path_buf();
    tokio::task::spawn_blocking(move || {
        store.load_or_train(trainer.as_ref().map(|t| t as &dyn ModelTrainer))
    })
    .await
    .context("Model loading task failed")?
    .with_context(|| format!("Failed to load performance model from {:?}", path))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_from(with_default_command(std::env::args_os()));

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    gistreg_core::init_tracing(cli.json, level);

    match cli.command {
        Commands::Run(args) => cmd_run(args).await,
        Commands::Generate(args) => cmd_generate(args).await,
    }
}

/// Run the regression matrix and write the report
async fn cmd_run(args: RunArgs) -> Result<()> {
    let mut settings = args.harness.load()?;
    if let Some(parallel) = args.parallel {
        settings.matrix_parallelism = parallel;
    }
    settings.validate().context("Invalid harness settings")?;

    let config = HardwareConfig {
        hash_enabled: args.hash_enabled,
        gc_clock_freq: args.gc_clock_freq,
        sbm_clock_freq: args.sbm_clock_freq,
        wr_rd_latency: args.wr_rd_latency,
    };

    let trainer = args
        .train_command
        .map(|command| CommandTrainer { command });
    let model = load_model(ModelStore::new(&args.model_store), trainer).await?;

    let mut gist = GistCommand::new(&args.gist_script);
    if let Some(interpreter) = args.interpreter {
        gist = gist.with_interpreter(interpreter);
    }

    let runner = RegressionMatrixRunner::new(
        Arc::new(TokioProcessRunner),
        Arc::new(ModelPredictor::new(model)),
        gist,
    )
    .with_timeout(settings.timeout())
    .with_parallelism(settings.matrix_parallelism);

    let records = runner
        .run(&args.test_dirs, &args.model_paths, &config)
        .await
        .context("Regression matrix aborted")?;

    ResultsCollector::write(&records, &args.output)
        .with_context(|| format!("Failed to write report {:?}", args.output))?;

    let summary = RegressionSummary::new(config, &records);
    if let Some(path) = &args.summary_json {
        summary
            .write_json(path)
            .with_context(|| format!("Failed to write summary {:?}", path))?;
    }

    println!("Invocation: {}", summary.invocation_id);
    if let Some(predicted) = summary.predicted_performance {
        println!("Predicted performance: {}", predicted);
    }
    println!();
    for record in &records {
        let status = if record.passed() { "✓" } else { "✗" };
        println!(
            "  {} {} @ {} (exit code: {}, {}ms)",
            status,
            record.test_dir.display(),
            record.model_path.display(),
            record.return_code,
            record.duration_ms
        );
    }
    println!();
    println!(
        "Passed: {}  Failed: {}  Timed out: {}  Not launched: {}",
        summary.passed, summary.failed, summary.timed_out, summary.spawn_failed
    );
    println!("Results collected in {}", args.output.display());

    Ok(())
}

/// Replay traces and generate a test directory
async fn cmd_generate(args: GenerateArgs) -> Result<()> {
    let mut settings = args.harness.load()?;
    if let Some(workers) = args.workers {
        settings.replay_workers = workers;
    }
    if args.per_trace {
        settings.work_area_policy = WorkAreaPolicy::PerTrace;
    }
    settings.validate().context("Invalid harness settings")?;

    let stage = TraceReplayStage::new(Arc::new(TokioProcessRunner), &settings);
    let generator = TestCorpusGenerator::new(stage, TestDirectoryBuilder::default());

    let report = generator
        .generate(&args.traces, &args.work_area, &args.test_dir)
        .await
        .context("Test directory generation aborted")?;

    for trace in &report.replay.completed {
        println!("  ✓ replayed {}", trace.display());
    }
    for failure in &report.replay.failed {
        println!("  ✗ {}: {}", failure.trace.display(), failure.reason);
    }
    for missing in &report.build.missing {
        println!("  warning: {} not found in {}", missing, args.work_area.display());
    }
    println!(
        "Test directory generated successfully at {}",
        report.test_dir.display()
    );

    Ok(())
}
