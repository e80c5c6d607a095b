//! Periodic `report.json` output.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use gone_core::Report;

/// File name of the report kept next to each week's store.
pub const REPORT_FILE: &str = "report.json";

/// Writes reports to a fixed path, replacing the previous one atomically.
#[derive(Debug, Clone)]
pub struct ReportWriter {
    path: PathBuf,
}

impl ReportWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Writer for `report.json` inside `dir`.
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(REPORT_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Serializes `report` to a temp file and renames it over the target,
    /// so readers never see a half-written report.
    pub fn write(&self, report: &Report) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let content = serde_json::to_string_pretty(report).context("failed to serialize report")?;
        let tmp_path = self.path.with_extension("json.tmp");

        fs::write(&tmp_path, content)
            .with_context(|| format!("failed to write {}", tmp_path.display()))?;
        if let Err(err) = fs::rename(&tmp_path, &self.path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(err).with_context(|| format!("failed to replace {}", self.path.display()));
        }

        tracing::debug!(path = %self.path.display(), records = report.records.len(), "wrote report");
        Ok(())
    }
}

/// Reads a report previously written by [`ReportWriter`].
pub fn read_report(path: &Path) -> Result<Report> {
    let content =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("failed to parse {}", path.display()))
}
