//! One batch, from download to ledger.
//!
//! ```text
//! Planned -> Downloading -> Extracting -> Merging -> Publishing -> Ledgering -> Purged
//!                 |              |           |            |
//!                 +--------------+-----------+------------+------> Failed
//! ```
//!
//! A batch either ends `Purged` with its URLs in the ledger, or `Failed` with none of
//! them there. Scratch is drained on both paths. A URL that does not parse gets no
//! local file and is never ledgered.
//!
//! Inside `Extracting`, files are handled independently. A file holding a service error
//! document is skipped outright. A corrupt file is re-fetched from the URL recorded for
//! it in the batch's [`UrlMapping`] and tried again, up to `extract_retries` times; after
//! that it is dropped and the batch carries on without it.

use crate::classify::{Classification, classify_file};
use crate::config::PipelineConfig;
use crate::datasets::{DatasetConfig, VariantConfig};
use crate::error::{PipelineError, Result};
use crate::extract::{ExtractError, RecordExtractor};
use crate::fetch::{Fetcher, UrlMapping};
use crate::io::parquet::merge_files;
use crate::ledger::ProgressLedger;
use crate::metrics::BatchReport;
use crate::scratch::ScratchDir;
use crate::sink::DatasetSink;
use rayon::prelude::*;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchState {
    Planned,
    Downloading,
    Extracting,
    Merging,
    Publishing,
    Ledgering,
    Purged,
    Failed,
}

impl BatchState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Planned => "planned",
            Self::Downloading => "downloading",
            Self::Extracting => "extracting",
            Self::Merging => "merging",
            Self::Publishing => "publishing",
            Self::Ledgering => "ledgering",
            Self::Purged => "purged",
            Self::Failed => "failed",
        }
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Purged | Self::Failed)
    }
}

impl fmt::Display for BatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stable id of a batch: the first 16 hex digits of SHA-256 over its URLs joined by `_`.
///
/// The same URLs in the same order always give the same id, so a batch that is re-run
/// after a failure overwrites its own remote artifact instead of adding a second one.
#[must_use]
pub fn batch_id(urls: &[String]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(urls.join("_").as_bytes());
    format!("{:x}", hasher.finalize())[..16].to_string()
}

/// Remote file name of a batch artifact.
#[must_use]
pub fn remote_name(batch_id: &str) -> String {
    format!("batch_{batch_id}.parquet")
}

/// What extraction made of one source file.
enum FileOutcome {
    Extracted {
        output: PathBuf,
        rows: usize,
        refetches: usize,
    },
    Wrapper {
        refetches: usize,
    },
    Dropped {
        refetches: usize,
    },
}

impl FileOutcome {
    fn refetches(&self) -> usize {
        match self {
            Self::Extracted { refetches, .. }
            | Self::Wrapper { refetches }
            | Self::Dropped { refetches } => *refetches,
        }
    }
}

/// Runs batches of one dataset variant, one at a time.
pub struct BatchProcessor<'a> {
    config: &'a PipelineConfig,
    dataset: &'static DatasetConfig,
    variant: &'static VariantConfig,
    scratch: ScratchDir,
    fetcher: &'a Fetcher,
    sink: &'a dyn DatasetSink,
    ledger: &'a ProgressLedger,
    extractor: RecordExtractor,
    extract_pool: rayon::ThreadPool,
    repo_id: String,
}

impl<'a> BatchProcessor<'a> {
    /// # Errors
    ///
    /// Returns an error if the extraction worker pool cannot be started.
    pub fn new(
        config: &'a PipelineConfig,
        dataset: &'static DatasetConfig,
        variant: &'static VariantConfig,
        fetcher: &'a Fetcher,
        sink: &'a dyn DatasetSink,
        ledger: &'a ProgressLedger,
    ) -> Result<Self> {
        let extract_pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.extract_workers.max(1))
            .thread_name(|i| format!("extract-{i}"))
            .build()
            .map_err(io::Error::other)?;
        Ok(Self {
            config,
            dataset,
            variant,
            scratch: config.scratch_for(dataset),
            fetcher,
            sink,
            ledger,
            extractor: RecordExtractor::new(variant.selector),
            extract_pool,
            repo_id: dataset.repo_id(variant, &config.hub_namespace),
        })
    }

    #[must_use]
    pub fn repo_id(&self) -> &str {
        &self.repo_id
    }

    #[must_use]
    pub fn scratch(&self) -> &ScratchDir {
        &self.scratch
    }

    /// Take `urls` through the whole state machine.
    ///
    /// # Errors
    ///
    /// Returns the error that moved the batch to `Failed`. The ledger is untouched in
    /// that case and the scratch directories have been purged.
    pub fn process(&self, urls: &[String]) -> Result<BatchReport> {
        let started = Instant::now();
        let id = batch_id(urls);
        let mut report = BatchReport {
            batch_id: id.clone(),
            urls: urls.len(),
            remote_path: remote_name(&id),
            ..BatchReport::default()
        };
        self.enter(&id, BatchState::Planned);

        let outcome = self
            .scratch
            .create()
            .and_then(|()| self.run(&id, urls, &mut report));
        let purged = self.scratch.purge();

        match outcome {
            Ok(()) => {
                let removed = purged?;
                report.elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
                tracing::info!(
                    batch = %id,
                    state = %BatchState::Purged,
                    removed,
                    rows = report.rows,
                    elapsed_ms = report.elapsed_ms,
                    "batch complete"
                );
                Ok(report)
            }
            Err(err) => {
                if let Err(purge_err) = purged {
                    tracing::error!(batch = %id, error = %purge_err, "scratch purge failed");
                }
                tracing::error!(batch = %id, state = %BatchState::Failed, error = %err, "batch failed");
                Err(err)
            }
        }
    }

    fn run(&self, id: &str, urls: &[String], report: &mut BatchReport) -> Result<()> {
        self.enter(id, BatchState::Downloading);
        let mapping = UrlMapping::for_dataset(urls, self.scratch.downloads(), self.dataset);
        mapping.save(&self.scratch.downloads().join(format!("url_mapping_{id}.json")))?;
        report.files = mapping.len();
        let mapped: HashSet<&str> = mapping.iter().map(|(_, url)| url).collect();
        let processed: Vec<String> = urls
            .iter()
            .filter(|url| mapped.contains(url.as_str()))
            .cloned()
            .collect();
        if processed.len() < urls.len() {
            tracing::warn!(
                batch = id,
                unprocessed = urls.len() - processed.len(),
                "URLs without a local file stay out of the ledger"
            );
        }
        let fetched = self.fetcher.fetch(&mapping, id)?;
        report.downloaded = fetched.downloaded;
        report.reused = fetched.skipped;
        report.download_attempts = fetched.attempts;

        self.enter(id, BatchState::Extracting);
        let outputs = self.extract_all(id, &mapping, report)?;

        self.enter(id, BatchState::Merging);
        let merged = self.scratch.intermediate().join(format!(
            "{}_{}.parquet",
            self.dataset.name, self.variant.name
        ));
        report.rows =
            merge_files(&outputs, &merged).map_err(|err| PipelineError::artifact(&merged, &err))?;

        self.enter(id, BatchState::Publishing);
        self.publish(id, &merged)?;

        self.enter(id, BatchState::Ledgering);
        self.ledger.append(&processed)?;
        report.ledgered = processed.len();
        Ok(())
    }

    fn extract_all(
        &self,
        id: &str,
        mapping: &UrlMapping,
        report: &mut BatchReport,
    ) -> Result<Vec<PathBuf>> {
        let mut sources: Vec<&Path> = Vec::with_capacity(mapping.len());
        for (path, url) in mapping.iter() {
            match classify_file(path) {
                Classification::ErrorWrapper { reason } => {
                    tracing::warn!(batch = id, url, path = %path.display(), reason = %reason, "error wrapper, skipping file");
                    report.wrappers_skipped += 1;
                }
                Classification::Payload => sources.push(path),
            }
        }

        let outcomes: Vec<FileOutcome> = self.extract_pool.install(|| {
            sources
                .par_iter()
                .map(|path| self.extract_file(id, path, mapping))
                .collect::<Result<Vec<_>>>()
        })?;

        let mut outputs = Vec::with_capacity(outcomes.len());
        for outcome in outcomes {
            report.refetches += outcome.refetches();
            match outcome {
                FileOutcome::Extracted { output, rows, .. } => {
                    tracing::debug!(batch = id, path = %output.display(), rows, "file extracted");
                    outputs.push(output);
                }
                FileOutcome::Wrapper { .. } => report.wrappers_skipped += 1,
                FileOutcome::Dropped { .. } => report.files_dropped += 1,
            }
        }
        Ok(outputs)
    }

    /// Extract one file, re-fetching it while it reads as corrupt.
    fn extract_file(&self, id: &str, path: &Path, mapping: &UrlMapping) -> Result<FileOutcome> {
        let output = RecordExtractor::output_path(path);
        let mut refetches = 0;
        loop {
            let reason = match self.extractor.extract_to_parquet(path, &output) {
                Ok(rows) => {
                    return Ok(FileOutcome::Extracted {
                        output,
                        rows,
                        refetches,
                    });
                }
                Err(ExtractError::Failed { path, reason }) => {
                    return Err(PipelineError::ExtractionFailed { path, reason });
                }
                Err(ExtractError::Corrupt { reason, .. }) => reason,
            };

            if refetches >= self.config.extract_retries as usize {
                tracing::error!(batch = id, path = %path.display(), reason = %reason, attempts = refetches + 1, "file still corrupt, dropping");
                return Ok(FileOutcome::Dropped { refetches });
            }
            let Some(url) = mapping.url_for(path) else {
                tracing::error!(batch = id, path = %path.display(), reason = %reason, "corrupt file has no source URL, dropping");
                return Ok(FileOutcome::Dropped { refetches });
            };

            tracing::warn!(batch = id, url, path = %path.display(), reason = %reason, attempt = refetches + 1, "corrupt file, re-fetching");
            refetches += 1;
            if let Err(err) = self.fetcher.refetch(url, path) {
                tracing::error!(batch = id, url, error = %err, "re-fetch failed, dropping file");
                return Ok(FileOutcome::Dropped { refetches });
            }
            if let Classification::ErrorWrapper { reason } = classify_file(path) {
                tracing::warn!(batch = id, url, reason = %reason, "re-fetch returned an error wrapper, skipping file");
                return Ok(FileOutcome::Wrapper { refetches });
            }
        }
    }

    fn publish(&self, id: &str, merged: &Path) -> Result<()> {
        let path_in_repo = remote_name(id);
        let message = format!(
            "Add batch batch_{id} of {}",
            self.dataset.manifest_file_name(self.variant)
        );
        let wrap = |source| PipelineError::PublishFailed {
            batch_id: id.to_string(),
            repo_id: self.repo_id.clone(),
            source,
        };

        self.sink.ensure_repo(&self.repo_id).map_err(wrap)?;
        self.sink
            .upload_file(merged, &self.repo_id, &path_in_repo, &message)
            .map_err(wrap)?;
        tracing::info!(batch = id, repo = %self.repo_id, path = %path_in_repo, "artifact published");
        Ok(())
    }

    fn enter(&self, id: &str, state: BatchState) {
        tracing::info!(
            batch = id,
            state = %state,
            dataset = self.dataset.name,
            variant = self.variant.name,
            "batch transition"
        );
    }
}
