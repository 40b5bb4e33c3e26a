//! Durable record of which manifest URLs have been fully processed.
//!
//! The ledger is a newline-delimited file of absolute URLs that is only ever appended
//! to. It is the single piece of state a run needs to resume: a URL is appended only
//! after the artifact holding its rows has been published, so a crash at any other
//! point just means the batch is recomputed from the same manifest position.
//!
//! # Example
//!
//! ```no_run
//! use corpus_domains::ledger::ProgressLedger;
//!
//! # fn main() -> corpus_domains::Result<()> {
//! let ledger = ProgressLedger::new("completed/dolma_v1.5.txt");
//! let done = ledger.load()?;
//! ledger.append(&["https://example.org/a.json.gz".to_string()])?;
//! # Ok(())
//! # }
//! ```

use crate::error::{PipelineError, Result};
use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use url::Url;

#[derive(Clone, Debug)]
pub struct ProgressLedger {
    path: PathBuf,
}

impl ProgressLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every URL recorded so far.
    ///
    /// A missing file is an empty ledger.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::LedgerUnreadable`] if the file exists but cannot be read
    /// as UTF-8, or if any non-blank line is not an absolute URL.
    pub fn load(&self) -> Result<HashSet<String>> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(HashSet::new()),
            Err(err) => return Err(self.unreadable(err.to_string())),
        };

        let mut done = HashSet::new();
        for (idx, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if let Err(err) = Url::parse(line) {
                return Err(self.unreadable(format!("line {}: {err}: {line}", idx + 1)));
            }
            done.insert(line.to_string());
        }
        Ok(done)
    }

    /// Durably append `urls`, one per line.
    ///
    /// Must only be called once the batch holding these URLs has been published; the
    /// ledger does no duplicate suppression of its own.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be opened, written, or synced.
    pub fn append(&self, urls: &[String]) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut w = BufWriter::new(file);
        for url in urls {
            w.write_all(url.as_bytes())?;
            w.write_all(b"\n")?;
        }
        w.flush()?;
        w.get_ref().sync_all()?;
        Ok(())
    }

    fn unreadable(&self, reason: String) -> PipelineError {
        PipelineError::LedgerUnreadable {
            path: self.path.clone(),
            reason,
        }
    }
}
