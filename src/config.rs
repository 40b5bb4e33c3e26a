//! Runtime configuration for a pipeline invocation.
//!
//! Everything that was tuned per cluster in the past (worker counts, batch sizes, retry
//! ceilings, backoff) lives here rather than in the dataset registry, so it can be
//! overridden from the command line without touching the registry.

use crate::datasets::{DatasetConfig, VariantConfig};
use crate::retry::RetryConfig;
use crate::scratch::ScratchDir;
use std::path::PathBuf;
use std::time::Duration;

/// Directory (under `work_dir`) holding the filtered URL manifests.
pub const MANIFEST_DIR: &str = "urls";
/// Directory (under `work_dir`) holding the progress ledgers.
pub const LEDGER_DIR: &str = "completed";

/// Configuration shared by every component of a run.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// Root for `urls/` manifests and `completed/` ledgers.
    pub work_dir: PathBuf,
    /// Root for `downloads/<dataset>` and `intermediate/<dataset>` scratch dirs.
    pub scratch_root: PathBuf,
    /// Hub user or organisation that owns the published dataset repos.
    pub hub_namespace: String,
    /// Overrides the dataset's own batch size when set.
    pub batch_size: Option<usize>,
    /// Concurrent downloads per batch.
    pub download_workers: usize,
    /// Concurrent per-file extractions per batch.
    pub extract_workers: usize,
    /// Attempts made by a single transfer before it reports failure.
    pub transfer_tries: u32,
    /// Pause between two attempts of a single transfer.
    pub transfer_retry_delay: Duration,
    /// Attempts of the whole batch download step.
    pub batch_download_attempts: u32,
    /// Base of the exponential backoff between batch download attempts.
    pub backoff_base: Duration,
    /// Extra extraction attempts per file after a corrupt-file signal.
    pub extract_retries: u32,
    /// TCP connect timeout for HTTP transfers.
    pub connect_timeout: Duration,
    /// Limit on waiting for a response, and on reading one response body. A body cut
    /// off by it stays in the `.part` file and the next try resumes from there.
    pub read_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("."),
            scratch_root: PathBuf::from("./scratch"),
            hub_namespace: String::new(),
            batch_size: None,
            download_workers: 8,
            extract_workers: num_cpus::get().clamp(1, 8),
            transfer_tries: 10,
            transfer_retry_delay: Duration::from_secs(1),
            batch_download_attempts: 3,
            backoff_base: Duration::from_secs(60),
            extract_retries: 2,
            connect_timeout: Duration::from_secs(30),
            read_timeout: Duration::from_secs(900),
        }
    }
}

impl PipelineConfig {
    #[must_use]
    pub fn manifest_path(&self, dataset: &DatasetConfig, variant: &VariantConfig) -> PathBuf {
        self.work_dir
            .join(MANIFEST_DIR)
            .join(dataset.manifest_file_name(variant))
    }

    #[must_use]
    pub fn ledger_path(&self, dataset: &DatasetConfig, variant: &VariantConfig) -> PathBuf {
        self.work_dir
            .join(LEDGER_DIR)
            .join(dataset.manifest_file_name(variant))
    }

    /// Scratch directories for one dataset; shared by all its batches, one at a time.
    #[must_use]
    pub fn scratch_for(&self, dataset: &DatasetConfig) -> ScratchDir {
        ScratchDir::new(
            self.scratch_root.join("downloads").join(dataset.name),
            self.scratch_root.join("intermediate").join(dataset.name),
        )
    }

    #[must_use]
    pub fn effective_batch_size(&self, dataset: &DatasetConfig) -> usize {
        self.batch_size.unwrap_or(dataset.batch_size).max(1)
    }

    /// Backoff schedule for the batch download step: `backoff_base × 2^attempt`.
    #[must_use]
    pub fn batch_retry(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.batch_download_attempts.max(1),
            initial_delay: self.backoff_base,
            max_delay: self.backoff_base.saturating_mul(1 << 10),
            backoff_multiplier: 2,
        }
    }

    /// Schedule for the attempts of a single transfer (constant delay).
    #[must_use]
    pub fn transfer_retry(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.transfer_tries.max(1),
            initial_delay: self.transfer_retry_delay,
            max_delay: self.transfer_retry_delay,
            backoff_multiplier: 1,
        }
    }
}
