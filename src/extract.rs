//! Per-file record extraction: compressed JSONL in, `(url, domain)` Parquet out.
//!
//! Failures are split in two. A file whose bytes cannot be decoded or parsed is
//! [`ExtractError::Corrupt`]; the batch processor answers that by re-fetching the file.
//! Everything else (the file cannot be opened, the output cannot be written) is
//! [`ExtractError::Failed`] and aborts the batch.

use crate::domain::extract_domain_str;
use crate::io::compression::open_decompressed;
use crate::io::jsonl::{FieldPath, JsonlError, for_each_field};
use crate::io::parquet::{DomainRow, write_rows};
use regex::Regex;
use serde_json::error::Category;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use thiserror::Error;

/// Last-resort match on error text for failures that carry no typed signal.
static CORRUPTION_VOCABULARY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)parse error|invalid|unexpected|corrupt|malformed|numeric literal")
        .expect("valid corruption regex")
});

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("{} is corrupt: {reason}", path.display())]
    Corrupt { path: PathBuf, reason: String },
    #[error("extracting {} failed: {reason}", path.display())]
    Failed { path: PathBuf, reason: String },
}

impl ExtractError {
    #[must_use]
    pub fn is_corrupt(&self) -> bool {
        matches!(self, Self::Corrupt { .. })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::Corrupt { path, .. } | Self::Failed { path, .. } => path,
        }
    }
}

/// Extracts the URL field selected by a dotted path from every record of a file.
#[derive(Clone, Debug)]
pub struct RecordExtractor {
    field: FieldPath,
}

impl RecordExtractor {
    #[must_use]
    pub fn new(selector: &str) -> Self {
        Self {
            field: FieldPath::parse(selector),
        }
    }

    #[must_use]
    pub fn field(&self) -> &FieldPath {
        &self.field
    }

    /// Parquet output location for `source`: the source name plus `.parquet`.
    #[must_use]
    pub fn output_path(source: &Path) -> PathBuf {
        let mut name = source.as_os_str().to_owned();
        name.push(".parquet");
        PathBuf::from(name)
    }

    /// Read every record of `path` into rows.
    ///
    /// Non-string, missing, and empty URLs are dropped, as are URLs whose domain cannot
    /// be resolved.
    ///
    /// # Errors
    ///
    /// [`ExtractError::Corrupt`] when the content cannot be decoded or parsed,
    /// [`ExtractError::Failed`] when the file cannot be opened.
    pub fn extract(&self, path: &Path) -> Result<Vec<DomainRow>, ExtractError> {
        let reader = open_decompressed(path).map_err(|err| ExtractError::Failed {
            path: path.to_path_buf(),
            reason: format!("{err:#}"),
        })?;

        let mut rows = Vec::new();
        let records = for_each_field(reader, &self.field, |value| {
            let Some(url) = value.map(str::trim).filter(|u| !u.is_empty()) else {
                return;
            };
            if let Some(domain) = extract_domain_str(url) {
                rows.push(DomainRow {
                    url: url.to_string(),
                    domain,
                });
            }
        })
        .map_err(|err| classify_error(path, err))?;

        tracing::debug!(
            path = %path.display(),
            records,
            rows = rows.len(),
            "extracted records"
        );
        Ok(rows)
    }

    /// [`extract`](Self::extract) and write the rows to `out`.
    ///
    /// # Errors
    ///
    /// As [`extract`](Self::extract), plus [`ExtractError::Failed`] if `out` cannot be
    /// written.
    pub fn extract_to_parquet(&self, path: &Path, out: &Path) -> Result<usize, ExtractError> {
        let rows = self.extract(path)?;
        write_rows(out, &rows).map_err(|err| ExtractError::Failed {
            path: path.to_path_buf(),
            reason: format!("write {}: {err:#}", out.display()),
        })
    }
}

fn classify_error(path: &Path, err: JsonlError) -> ExtractError {
    let corrupt = match &err {
        JsonlError::Parse { source, .. } => match source.classify() {
            Category::Syntax | Category::Eof => true,
            Category::Io | Category::Data => matches_vocabulary(&source.to_string()),
        },
        JsonlError::Read { source, .. } => match source.kind() {
            io::ErrorKind::InvalidData | io::ErrorKind::UnexpectedEof => true,
            _ => matches_vocabulary(&source.to_string()),
        },
    };

    let path = path.to_path_buf();
    let reason = err.to_string();
    if corrupt {
        ExtractError::Corrupt { path, reason }
    } else {
        ExtractError::Failed { path, reason }
    }
}

fn matches_vocabulary(message: &str) -> bool {
    CORRUPTION_VOCABULARY.is_match(message)
}
