//! Per-dataset scratch directories.
//!
//! A [`ScratchDir`] is handed to the batch processor explicitly; nothing in the crate
//! builds scratch paths on its own. Both directories are exclusively owned by the one
//! batch in flight and must be drained before the next batch starts.

use crate::error::{PipelineError, Result};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Clone, Debug)]
pub struct ScratchDir {
    downloads: PathBuf,
    intermediate: PathBuf,
}

impl ScratchDir {
    pub fn new(downloads: impl Into<PathBuf>, intermediate: impl Into<PathBuf>) -> Self {
        Self {
            downloads: downloads.into(),
            intermediate: intermediate.into(),
        }
    }

    /// Where source files are downloaded (plus per-file Parquet outputs and mapping files).
    #[must_use]
    pub fn downloads(&self) -> &Path {
        &self.downloads
    }

    /// Where the merged per-batch artifact is written.
    #[must_use]
    pub fn intermediate(&self) -> &Path {
        &self.intermediate
    }

    /// Create both directories if they do not exist yet.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Scratch`] if a directory cannot be created.
    pub fn create(&self) -> Result<()> {
        for dir in [&self.downloads, &self.intermediate] {
            fs::create_dir_all(dir).map_err(|err| PipelineError::Scratch {
                path: dir.clone(),
                reason: format!("create: {err}"),
            })?;
        }
        Ok(())
    }

    /// Remove everything inside both directories, keeping the directories themselves.
    ///
    /// Idempotent: missing directories and entries that vanish concurrently are fine.
    /// Returns the number of top-level entries removed.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Scratch`] for the first entry that cannot be removed.
    pub fn purge(&self) -> Result<usize> {
        let mut removed = 0;
        for dir in [&self.downloads, &self.intermediate] {
            removed += drain_dir(dir).map_err(|err| PipelineError::Scratch {
                path: dir.clone(),
                reason: format!("purge: {err}"),
            })?;
        }
        Ok(removed)
    }

    /// Whether both directories are empty (or absent).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        [&self.downloads, &self.intermediate].iter().all(|dir| {
            fs::read_dir(dir).map_or(true, |mut entries| entries.next().is_none())
        })
    }
}

fn drain_dir(dir: &Path) -> io::Result<usize> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(err) => return Err(err),
    };

    let mut removed = 0;
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        let result = if entry.file_type()?.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        match result {
            Ok(()) => removed += 1,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(err),
        }
    }
    Ok(removed)
}
