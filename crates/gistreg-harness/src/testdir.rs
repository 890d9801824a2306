//! Materialize a self-contained test directory from a populated work area.

use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::error::{HarnessError, Result};

/// Artifacts harvested from the work area into each test directory.
pub const TEST_DIRECTORY_MANIFEST: [&str; 5] =
    ["sp3", "command.txt", "intent_capture", "intent.cpp", "tcore.log"];

/// What a build copied and what it skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildReport {
    pub copied: Vec<String>,
    pub missing: Vec<String>,
}

/// Copies the manifest artifacts from a source area into a test directory.
#[derive(Debug, Clone)]
pub struct TestDirectoryBuilder {
    manifest: Vec<String>,
}

impl Default for TestDirectoryBuilder {
    fn default() -> Self {
        Self::new(&TEST_DIRECTORY_MANIFEST)
    }
}

impl TestDirectoryBuilder {
    pub fn new(manifest: &[&str]) -> Self {
        Self {
            manifest: manifest.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Create `dest_dir` if needed and copy every present artifact into it.
    ///
    /// Missing artifacts are logged and skipped. Re-running on an existing
    /// destination overwrites artifacts in place.
    pub fn build(&self, source_dir: &Path, dest_dir: &Path) -> Result<BuildReport> {
        std::fs::create_dir_all(dest_dir).map_err(|source| HarnessError::TestDirectory {
            path: dest_dir.to_path_buf(),
            source,
        })?;

        let mut report = BuildReport::default();
        for name in &self.manifest {
            let src = source_dir.join(name);
            if !src.exists() {
                warn!(artifact = %name, source = %source_dir.display(), "Artifact not found, skipping");
                report.missing.push(name.clone());
                continue;
            }

            let dst = dest_dir.join(name);
            copy_artifact(&src, &dst).map_err(|source| HarnessError::TestDirectory {
                path: dst.clone(),
                source,
            })?;
            report.copied.push(name.clone());
        }

        info!(
            dest = %dest_dir.display(),
            copied = report.copied.len(),
            missing = report.missing.len(),
            "Test directory generated"
        );
        Ok(report)
    }
}

/// Copy a file, or a directory tree (intent captures may be directories).
pub(crate) fn copy_artifact(src: &Path, dst: &Path) -> std::io::Result<()> {
    if src.is_dir() {
        std::fs::create_dir_all(dst)?;
        for entry in std::fs::read_dir(src)? {
            let entry = entry?;
            let target: PathBuf = dst.join(entry.file_name());
            copy_artifact(&entry.path(), &target)?;
        }
        Ok(())
    } else {
        std::fs::copy(src, dst).map(|_| ())
    }
}
