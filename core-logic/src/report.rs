//! # Run Report
//!
//! Final artifact of a batch run: counts, operation metadata and one detail
//! entry per input entity, persisted as pretty JSON.

use crate::aggregator::{EntityResult, ResultAggregator};
use crate::error::ReportError;
use chrono::Local;
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::info;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub timestamp: String,
    #[serde(flatten)]
    pub metadata: Map<String, Value>,
    pub total: u64,
    pub success: u64,
    pub failed: u64,
    pub already_claimed: u64,
    pub details: Vec<EntityResult>,
}

impl RunReport {
    /// Snapshot of the aggregator, details ordered by input position.
    pub fn from_aggregator(aggregator: &ResultAggregator, metadata: Map<String, Value>) -> Self {
        let counts = aggregator.counts();
        Self {
            timestamp: Local::now().format(TIMESTAMP_FORMAT).to_string(),
            metadata,
            total: counts.total,
            success: counts.success,
            failed: counts.failed,
            already_claimed: counts.already_claimed,
            details: aggregator.results(),
        }
    }

    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = timestamp.into();
        self
    }

    pub fn to_json(&self) -> Result<String, ReportError> {
        let mut json = serde_json::to_string_pretty(self)?;
        json.push('\n');
        Ok(json)
    }
}

/// Writes reports with replace-on-success semantics: the target is either
/// the previous file or the complete new one, never a partial write.
#[derive(Debug, Clone)]
pub struct ReportWriter {
    path: PathBuf,
}

impl ReportWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn staging_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "report.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    pub async fn write(&self, report: &RunReport) -> Result<(), ReportError> {
        let json = report.to_json()?;
        let staging = self.staging_path();

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| Self::io_error(parent, source))?;
        }

        if let Err(e) = Self::write_staged(&staging, json.as_bytes()).await {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(Self::io_error(&staging, e));
        }

        if let Err(e) = tokio::fs::rename(&staging, &self.path).await {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(Self::io_error(&self.path, e));
        }

        info!(target: "batch", "Report saved to {}", self.path.display());
        Ok(())
    }

    async fn write_staged(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
        let mut file = tokio::fs::File::create(path).await?;
        file.write_all(bytes).await?;
        file.sync_all().await?;
        Ok(())
    }

    fn io_error(path: &Path, source: std::io::Error) -> ReportError {
        ReportError::Io {
            path: path.display().to_string(),
            source,
        }
    }
}
