//! Batch downloads.
//!
//! A [`Fetcher`] drives a [`Transfer`] (one URL to one local file) over a bounded
//! worker pool. Each batch gets a [`UrlMapping`] first, which fixes where every URL is
//! stored; the same mapping is later used to find the URL behind a corrupt file.
//!
//! Downloads are no-clobber: a non-empty file at the destination is taken as complete,
//! so a batch interrupted mid-download resumes without fetching anything twice.

mod fake;
mod http;

pub use fake::FakeTransfer;
pub use http::HttpTransfer;

use crate::config::PipelineConfig;
use crate::datasets::DatasetConfig;
use crate::error::{PipelineError, Result};
use crate::retry::{RetryConfig, retry_with_backoff};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use url::Url;

/// How a URL is turned into a path under the downloads directory.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FetchLayout {
    /// Last path segment only.
    Flat,
    /// Full URL path minus the host and the first `strip` segments.
    Nested { strip: usize },
}

impl FetchLayout {
    /// Local path of `url` under `dest_dir`, or `None` if the URL has no usable path.
    #[must_use]
    pub fn local_path(self, url: &str, dest_dir: &Path) -> Option<PathBuf> {
        let parsed = Url::parse(url).ok()?;
        let segments: Vec<&str> = parsed
            .path_segments()?
            .filter(|s| !s.is_empty() && *s != "." && *s != "..")
            .collect();

        let relative: PathBuf = match self {
            Self::Flat => PathBuf::from(segments.last()?),
            Self::Nested { strip } => {
                let kept = segments.get(strip..).filter(|rest| !rest.is_empty())?;
                kept.iter().collect()
            }
        };
        Some(dest_dir.join(relative))
    }
}

/// Batch-scoped mapping from local file path to the URL it was downloaded from.
///
/// Serialized as a flat JSON object, `{"<path>": "<url>", ...}`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UrlMapping {
    by_path: BTreeMap<PathBuf, String>,
}

impl UrlMapping {
    /// Compute the destination of every URL.
    ///
    /// Every URL that parses gets its own file. A URL whose layout path is already taken
    /// by a different URL is stored as `<tag>-<file name>` next to it, and a URL with no
    /// usable path segments as `<tag><fallback_suffix>`, where `<tag>` is a short hash
    /// of the URL. Repeated URLs share one file. URLs that do not parse are logged and
    /// left out; [`contains_url`](Self::contains_url) is false for them.
    pub fn build<S: AsRef<str>>(
        urls: &[S],
        dest_dir: &Path,
        layout: FetchLayout,
        fallback_suffix: &str,
    ) -> Self {
        let mut by_path = BTreeMap::new();
        for url in urls {
            let url = url.as_ref();
            let path = match layout.local_path(url, dest_dir) {
                Some(path) => path,
                None if Url::parse(url).is_ok() => {
                    dest_dir.join(format!("{}{fallback_suffix}", url_tag(url)))
                }
                None => {
                    tracing::warn!(url, "URL does not parse, leaving it unprocessed");
                    continue;
                }
            };

            let path = match by_path.get(&path) {
                None => path,
                Some(existing) if existing == url => continue,
                Some(existing) => {
                    let tagged = tagged_path(&path, url);
                    tracing::debug!(url, shared_with = %existing, path = %tagged.display(), "layout path taken, using tagged name");
                    tagged
                }
            };
            if let Some(existing) = by_path.get(&path) {
                tracing::warn!(url, kept = %existing, path = %path.display(), "URL tag collision, leaving URL unprocessed");
                continue;
            }
            by_path.insert(path, url.to_string());
        }
        Self { by_path }
    }

    /// [`build`](Self::build) with the layout and file suffix of `dataset`.
    pub fn for_dataset<S: AsRef<str>>(urls: &[S], dest_dir: &Path, dataset: &DatasetConfig) -> Self {
        Self::build(urls, dest_dir, dataset.layout, dataset.file_suffix)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_path.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_path.is_empty()
    }

    /// Source URL of the file at `path`.
    #[must_use]
    pub fn url_for(&self, path: &Path) -> Option<&str> {
        self.by_path.get(path).map(String::as_str)
    }

    /// Whether `url` has a local file in this mapping.
    #[must_use]
    pub fn contains_url(&self, url: &str) -> bool {
        self.by_path.values().any(|mapped| mapped == url)
    }

    /// `(path, url)` pairs, ordered by path.
    pub fn iter(&self) -> impl Iterator<Item = (&Path, &str)> {
        self.by_path
            .iter()
            .map(|(path, url)| (path.as_path(), url.as_str()))
    }

    /// Write the mapping as JSON.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_vec_pretty(self).map_err(io::Error::other)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Read a mapping written by [`save`](Self::save). A missing file is an empty mapping.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file exists but is not a valid mapping.
    pub fn load(path: &Path) -> Result<Self> {
        match fs::read(path) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)
                .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(err.into()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransferErrorKind {
    /// The server says the URL does not exist (404, 410) or is forbidden (403).
    NotFound,
    /// Any other unsuccessful HTTP status.
    Status(u16),
    /// Connection, TLS, timeout, or a body cut short.
    Network,
    /// Local filesystem failure.
    Io,
}

#[derive(Debug, Error)]
#[error("fetch {url}: {kind:?}: {message}")]
pub struct TransferError {
    pub url: String,
    pub kind: TransferErrorKind,
    pub message: String,
}

impl TransferError {
    pub fn new(url: impl Into<String>, kind: TransferErrorKind, message: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            kind,
            message: message.into(),
        }
    }

    pub(crate) fn io(url: &str, err: &io::Error) -> Self {
        Self::new(url, TransferErrorKind::Io, err.to_string())
    }

    /// Whether another attempt could succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self.kind {
            TransferErrorKind::NotFound => false,
            TransferErrorKind::Status(code) => code >= 500 || code == 408 || code == 429,
            TransferErrorKind::Network | TransferErrorKind::Io => true,
        }
    }
}

/// Downloads one URL to one local file.
pub trait Transfer: Send + Sync {
    /// Download `url` into `dest`. The parent directory exists.
    ///
    /// # Errors
    ///
    /// Returns a [`TransferError`] once the implementation has given up on the URL.
    fn download(&self, url: &str, dest: &Path) -> std::result::Result<(), TransferError>;
}

/// Outcome of a successful [`Fetcher::fetch`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FetchReport {
    /// Files transferred by this call.
    pub downloaded: usize,
    /// Files already present when the call started.
    pub skipped: usize,
    /// Batch-level attempts used (1 if nothing had to be retried).
    pub attempts: u32,
}

pub struct Fetcher {
    transfer: Arc<dyn Transfer>,
    pool: rayon::ThreadPool,
    retry: RetryConfig,
}

impl Fetcher {
    /// # Errors
    ///
    /// Returns an error if the worker pool cannot be started.
    pub fn new(transfer: Arc<dyn Transfer>, config: &PipelineConfig) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.download_workers.max(1))
            .thread_name(|i| format!("fetch-{i}"))
            .build()
            .map_err(io::Error::other)?;
        Ok(Self {
            transfer,
            pool,
            retry: config.batch_retry(),
        })
    }

    /// Download every file of `mapping` that is not already present.
    ///
    /// Files that fail are retried as a group with exponential backoff; files completed
    /// by an earlier attempt are not touched again.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::BatchDownloadFailed`] if files are still missing after
    /// the last attempt.
    pub fn fetch(&self, mapping: &UrlMapping, batch_id: &str) -> Result<FetchReport> {
        let mut report = FetchReport {
            skipped: mapping.iter().filter(|(path, _)| is_complete(path)).count(),
            ..FetchReport::default()
        };

        let outcome = retry_with_backoff(
            &self.retry,
            |_failed: &usize| true,
            |attempt| {
                report.attempts = attempt + 1;
                let pending: Vec<(&Path, &str)> =
                    mapping.iter().filter(|(path, _)| !is_complete(path)).collect();
                let failures: Vec<TransferError> = self.pool.install(|| {
                    pending
                        .par_iter()
                        .filter_map(|(path, url)| self.download_one(url, path).err())
                        .collect()
                });
                report.downloaded += pending.len() - failures.len();

                if failures.is_empty() {
                    return Ok(());
                }
                for failure in &failures {
                    tracing::warn!(batch = batch_id, attempt = attempt + 1, error = %failure, "download failed");
                }
                tracing::warn!(
                    batch = batch_id,
                    attempt = attempt + 1,
                    failed = failures.len(),
                    total = mapping.len(),
                    "batch download incomplete"
                );
                Err(failures.len())
            },
        );

        match outcome {
            Ok(()) => Ok(report),
            Err(failed) => Err(PipelineError::BatchDownloadFailed {
                batch_id: batch_id.to_string(),
                failed,
                total: mapping.len(),
                attempts: report.attempts,
            }),
        }
    }

    /// Delete `path` (and any partial download) and fetch `url` into it again.
    ///
    /// # Errors
    ///
    /// Returns the transfer's error if the new download fails.
    pub fn refetch(&self, url: &str, path: &Path) -> std::result::Result<(), TransferError> {
        for stale in [path.to_path_buf(), part_path(path)] {
            match fs::remove_file(&stale) {
                Ok(()) => {}
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => return Err(TransferError::io(url, &err)),
            }
        }
        self.download_one(url, path)
    }

    fn download_one(&self, url: &str, path: &Path) -> std::result::Result<(), TransferError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| TransferError::io(url, &err))?;
        }
        self.transfer.download(url, path)
    }
}

/// Sibling file holding the bytes of an unfinished download.
#[must_use]
pub fn part_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

/// First 12 hex digits of SHA-256 over `url`.
fn url_tag(url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    format!("{:x}", hasher.finalize())[..12].to_string()
}

/// `path` with its file name prefixed by the tag of `url`.
fn tagged_path(path: &Path, url: &str) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!("{}-{name}", url_tag(url)))
}

fn is_complete(path: &Path) -> bool {
    fs::metadata(path).is_ok_and(|meta| meta.is_file() && meta.len() > 0)
}
