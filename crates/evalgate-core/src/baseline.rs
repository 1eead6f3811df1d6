//! Baseline persistence and the guarded update path.
//!
//! A baseline is one suite's accepted metrics snapshot at
//! `<baseline dir>/summary.json`. Updates are refused unless the run that
//! produced them is healthy: zero failed cases and a non-empty non-refusal
//! aggregate. A crashed backend must never become the new normal.

use crate::model::Baseline;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum BaselineError {
    #[error("failed to read baseline {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid baseline {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to write baseline {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode baseline: {0}")]
    Encode(serde_json::Error),
    #[error("refusing to update baseline: {failed} case(s) failed; fix them before accepting new metrics")]
    UnhealthyRun { failed: usize },
    #[error("refusing to update baseline: run produced no non-refusal rows to aggregate")]
    EmptyRun,
}

/// One suite's baseline directory.
#[derive(Debug, Clone)]
pub struct BaselineStore {
    dir: PathBuf,
}

impl BaselineStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Conventional location for a suite: `<root>/<suite_name>`.
    pub fn for_suite(root: &Path, suite_name: &str) -> Self {
        Self {
            dir: root.join(suite_name),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join("summary.json")
    }

    /// Loads the stored baseline, `None` when absent.
    pub fn load(&self) -> Result<Option<Baseline>, BaselineError> {
        let path = self.path();
        if !path.exists() {
            return Ok(None);
        }
        let text = fs::read_to_string(&path).map_err(|e| BaselineError::Read {
            path: path.clone(),
            source: e,
        })?;
        let baseline = serde_json::from_str(&text)
            .map_err(|e| BaselineError::Parse { path, source: e })?;
        Ok(Some(baseline))
    }

    pub fn write(&self, baseline: &Baseline) -> Result<PathBuf, BaselineError> {
        fs::create_dir_all(&self.dir).map_err(|e| BaselineError::Write {
            path: self.dir.clone(),
            source: e,
        })?;
        let path = self.path();
        let mut text = serde_json::to_string_pretty(baseline).map_err(BaselineError::Encode)?;
        text.push('\n');
        fs::write(&path, text).map_err(|e| BaselineError::Write {
            path: path.clone(),
            source: e,
        })?;
        info!("baseline updated at {}", path.display());
        Ok(path)
    }

    /// Precondition for `--update-baseline`.
    pub fn guard_update(failed_cases: usize, non_refusal_count: usize) -> Result<(), BaselineError> {
        if failed_cases > 0 {
            return Err(BaselineError::UnhealthyRun {
                failed: failed_cases,
            });
        }
        if non_refusal_count == 0 {
            return Err(BaselineError::EmptyRun);
        }
        Ok(())
    }
}
