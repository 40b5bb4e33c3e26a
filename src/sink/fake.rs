//! In-memory [`DatasetSink`] for tests.

use super::traits::{DatasetSink, ErrorKind, SinkError, SinkResult};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};

type FileStorage = Arc<Mutex<HashMap<(String, String), Vec<u8>>>>;

/// One accepted upload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Commit {
    pub repo_id: String,
    pub path_in_repo: String,
    pub message: String,
}

#[derive(Clone, Default)]
pub struct FakeSink {
    repos: Arc<Mutex<HashSet<String>>>,
    files: FileStorage,
    commits: Arc<Mutex<Vec<Commit>>>,
    fail_uploads: Arc<Mutex<bool>>,
}

impl FakeSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following upload fail with [`ErrorKind::ServiceUnavailable`].
    ///
    /// # Panics
    ///
    /// Panics if the flag mutex is poisoned.
    pub fn fail_uploads(&self, fail: bool) {
        *self.fail_uploads.lock().expect("flag mutex poisoned") = fail;
    }

    /// # Panics
    ///
    /// Panics if the repos mutex is poisoned.
    #[must_use]
    pub fn has_repo(&self, repo_id: &str) -> bool {
        self.repos.lock().expect("repos mutex poisoned").contains(repo_id)
    }

    /// Stored content of `path_in_repo` in `repo_id`.
    ///
    /// # Panics
    ///
    /// Panics if the files mutex is poisoned.
    #[must_use]
    pub fn file(&self, repo_id: &str, path_in_repo: &str) -> Option<Vec<u8>> {
        self.files
            .lock()
            .expect("files mutex poisoned")
            .get(&(repo_id.to_string(), path_in_repo.to_string()))
            .cloned()
    }

    /// Every accepted upload, oldest first.
    ///
    /// # Panics
    ///
    /// Panics if the commits mutex is poisoned.
    #[must_use]
    pub fn commits(&self) -> Vec<Commit> {
        self.commits.lock().expect("commits mutex poisoned").clone()
    }
}

impl DatasetSink for FakeSink {
    fn ensure_repo(&self, repo_id: &str) -> SinkResult<()> {
        if !repo_id.contains('/') {
            return Err(SinkError::new(
                ErrorKind::InvalidInput,
                format!("repo id {repo_id} has no namespace"),
            ));
        }
        self.repos
            .lock()
            .expect("repos mutex poisoned")
            .insert(repo_id.to_string());
        Ok(())
    }

    fn upload_file(
        &self,
        local: &Path,
        repo_id: &str,
        path_in_repo: &str,
        message: &str,
    ) -> SinkResult<()> {
        if *self.fail_uploads.lock().expect("flag mutex poisoned") {
            return Err(SinkError::new(
                ErrorKind::ServiceUnavailable,
                format!("upload of {path_in_repo} rejected"),
            ));
        }
        if !self.has_repo(repo_id) {
            return Err(SinkError::new(
                ErrorKind::NotFound,
                format!("repo {repo_id} not found"),
            ));
        }
        let data = fs::read(local).map_err(|err| {
            SinkError::new(ErrorKind::Io, format!("read {}", local.display()))
                .with_source(err.to_string())
        })?;

        self.files
            .lock()
            .expect("files mutex poisoned")
            .insert((repo_id.to_string(), path_in_repo.to_string()), data);
        self.commits
            .lock()
            .expect("commits mutex poisoned")
            .push(Commit {
                repo_id: repo_id.to_string(),
                path_in_repo: path_in_repo.to_string(),
                message: message.to_string(),
            });
        Ok(())
    }
}
