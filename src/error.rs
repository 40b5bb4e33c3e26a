//! Error taxonomy for the pipeline.
//!
//! Errors are split by the scope they abort:
//!
//! - **Run-level**: [`PipelineError::LedgerUnreadable`], [`PipelineError::ManifestMissing`],
//!   [`PipelineError::UnknownDataset`] stop the whole invocation before any batch starts.
//! - **Batch-level**: [`PipelineError::BatchDownloadFailed`], [`PipelineError::ExtractionFailed`],
//!   [`PipelineError::PublishFailed`] abort the in-flight batch. Nothing is ledgered and the
//!   scratch directories are still purged.
//! - **File-level** corruption is not a `PipelineError` at all: see
//!   [`crate::extract::ExtractError`] and [`crate::classify::Classification`], which the
//!   batch processor recovers from locally.

use crate::sink::SinkError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("batch {batch_id}: {failed} of {total} downloads still failing after {attempts} attempts")]
    BatchDownloadFailed {
        batch_id: String,
        failed: usize,
        total: usize,
        attempts: u32,
    },

    #[error("extraction of {} failed: {reason}", path.display())]
    ExtractionFailed { path: PathBuf, reason: String },

    #[error("publishing batch {batch_id} to {repo_id} failed: {source}")]
    PublishFailed {
        batch_id: String,
        repo_id: String,
        #[source]
        source: SinkError,
    },

    #[error("progress ledger {} is unreadable: {reason}", path.display())]
    LedgerUnreadable { path: PathBuf, reason: String },

    #[error("manifest {} does not exist (run with --fetch-manifests first)", path.display())]
    ManifestMissing { path: PathBuf },

    #[error("fetching URL list {url} failed: {reason}")]
    ManifestFetch { url: String, reason: String },

    #[error("dataset '{name}' not found. Available datasets: {}", available.join(", "))]
    UnknownDataset { name: String, available: Vec<String> },

    #[error("scratch directory {}: {reason}", path.display())]
    Scratch { path: PathBuf, reason: String },

    #[error("artifact {}: {reason}", path.display())]
    Artifact { path: PathBuf, reason: String },

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl PipelineError {
    /// Whether this error aborted a single batch (as opposed to the whole run).
    #[must_use]
    pub fn is_batch_scoped(&self) -> bool {
        matches!(
            self,
            Self::BatchDownloadFailed { .. }
                | Self::ExtractionFailed { .. }
                | Self::PublishFailed { .. }
                | Self::Artifact { .. }
        )
    }

    pub(crate) fn artifact(path: impl Into<PathBuf>, err: &anyhow::Error) -> Self {
        Self::Artifact {
            path: path.into(),
            reason: format!("{err:#}"),
        }
    }
}
