//! One-shot test corpus generation: replay, capture, harvest.

use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::Result;
use crate::replay::{ReplaySummary, TraceReplayStage};
use crate::testdir::{BuildReport, TestDirectoryBuilder};

/// Outcome of generating one test directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorpusReport {
    pub test_dir: PathBuf,
    pub replay: ReplaySummary,
    pub build: BuildReport,
}

/// Replays traces into a work area and harvests it into a test directory.
pub struct TestCorpusGenerator {
    stage: TraceReplayStage,
    builder: TestDirectoryBuilder,
}

impl TestCorpusGenerator {
    pub fn new(stage: TraceReplayStage, builder: TestDirectoryBuilder) -> Self {
        Self { stage, builder }
    }

    /// Missing traces and intent-capture failures abort; individual replay
    /// failures are carried in the report.
    pub async fn generate(
        &self,
        traces: &[PathBuf],
        work_area: &Path,
        test_dir: &Path,
    ) -> Result<CorpusReport> {
        let replay = self.stage.run(traces, work_area).await?;
        let build = self.builder.build(work_area, test_dir)?;

        info!(test_dir = %test_dir.display(), "Test directory generated successfully");
        Ok(CorpusReport {
            test_dir: test_dir.to_path_buf(),
            replay,
            build,
        })
    }
}
