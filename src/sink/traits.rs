//! Core trait and error type for dataset publishing.

use std::error::Error;
use std::fmt;

// ============================================================================
// Core Error Type
// ============================================================================

/// Error returned by a [`DatasetSink`].
#[derive(Debug, Clone)]
pub struct SinkError {
    pub message: String,
    pub kind: ErrorKind,
    pub source: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Authentication,
    Authorization,
    NotFound,
    AlreadyExists,
    InvalidInput,
    Network,
    RateLimited,
    ServiceUnavailable,
    Io,
    Other,
}

impl ErrorKind {
    /// Kind matching an unsuccessful HTTP status.
    #[must_use]
    pub fn from_status(code: u16) -> Self {
        match code {
            401 => Self::Authentication,
            403 => Self::Authorization,
            404 => Self::NotFound,
            409 => Self::AlreadyExists,
            400 | 413 | 422 => Self::InvalidInput,
            429 => Self::RateLimited,
            500..=599 => Self::ServiceUnavailable,
            _ => Self::Other,
        }
    }
}

impl fmt::Display for SinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)?;
        if let Some(source) = &self.source {
            write!(f, " ({source})")?;
        }
        Ok(())
    }
}

impl Error for SinkError {}

impl SinkError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind,
            source: None,
        }
    }

    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

pub type SinkResult<T> = Result<T, SinkError>;

// ============================================================================
// Sink Trait
// ============================================================================

/// A remote dataset repository that accepts whole files.
///
/// Implementations are synchronous and must be safe to share across threads.
pub trait DatasetSink: Send + Sync {
    /// Create the dataset repo `repo_id` (`namespace/name`) if it does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the repo neither exists nor can be created.
    fn ensure_repo(&self, repo_id: &str) -> SinkResult<()>;

    /// Upload `local` to `path_in_repo` in one commit with `message`.
    ///
    /// Uploading to an existing path replaces the file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or the upload is not acknowledged.
    fn upload_file(
        &self,
        local: &std::path::Path,
        repo_id: &str,
        path_in_repo: &str,
        message: &str,
    ) -> SinkResult<()>;
}
