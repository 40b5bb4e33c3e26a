//! Hugging Face Hub dataset repos over the Hub's HTTP API.
//!
//! An upload is three requests: a Git LFS batch negotiation for the file's SHA-256,
//! a `PUT` of the bytes to the storage URL the Hub hands back (skipped when the Hub
//! already has the object), and an NDJSON commit that points `path_in_repo` at the
//! LFS object.

use super::traits::{DatasetSink, ErrorKind, SinkError, SinkResult};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::time::Duration;
use ureq::Agent;

pub const DEFAULT_ENDPOINT: &str = "https://huggingface.co";
const LFS_CONTENT_TYPE: &str = "application/vnd.git-lfs+json";

pub struct HubSink {
    agent: Agent,
    endpoint: String,
    token: String,
}

impl HubSink {
    #[must_use]
    pub fn new(endpoint: impl Into<String>, token: impl Into<String>) -> Self {
        let agent: Agent = Agent::config_builder()
            .timeout_connect(Some(Duration::from_secs(30)))
            .build()
            .into();
        Self {
            agent,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    /// Credentials from `HF_TOKEN`, endpoint from `HF_ENDPOINT` (optional).
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::Authentication`] if `HF_TOKEN` is unset or empty.
    pub fn from_env() -> SinkResult<Self> {
        let token = std::env::var("HF_TOKEN")
            .ok()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| SinkError::new(ErrorKind::Authentication, "HF_TOKEN is not set"))?;
        let endpoint =
            std::env::var("HF_ENDPOINT").unwrap_or_else(|_| DEFAULT_ENDPOINT.to_string());
        Ok(Self::new(endpoint, token))
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.token)
    }

    fn lfs_upload(&self, local: &Path, repo_id: &str, object: &LfsPointer) -> SinkResult<()> {
        let url = format!("{}/datasets/{repo_id}.git/info/lfs/objects/batch", self.endpoint);
        let request = json!({
            "operation": "upload",
            "transfers": ["basic"],
            "objects": [object],
            "hash_algo": "sha256",
            "ref": { "name": "main" },
        });
        let body = serde_json::to_vec(&request)
            .map_err(|err| SinkError::new(ErrorKind::InvalidInput, err.to_string()))?;

        let mut response = self
            .agent
            .post(&url)
            .header("Authorization", self.bearer())
            .header("Accept", LFS_CONTENT_TYPE)
            .header("Content-Type", LFS_CONTENT_TYPE)
            .send(body)
            .map_err(|err| http_error("LFS batch request", err))?;
        let batch: LfsBatchResponse = response
            .body_mut()
            .read_json()
            .map_err(|err| http_error("LFS batch response", err))?;

        let Some(entry) = batch.objects.into_iter().find(|o| o.oid == object.oid) else {
            return Err(SinkError::new(
                ErrorKind::Other,
                format!("LFS batch response has no entry for {}", object.oid),
            ));
        };
        if let Some(error) = entry.error {
            return Err(SinkError::new(
                ErrorKind::from_status(error.code),
                format!("LFS rejected {}: {}", object.oid, error.message),
            ));
        }
        let Some(actions) = entry.actions else {
            tracing::debug!(oid = %object.oid, "LFS object already present");
            return Ok(());
        };

        if let Some(upload) = actions.upload {
            if upload.header.contains_key("chunk_size") {
                return Err(SinkError::new(
                    ErrorKind::InvalidInput,
                    "multipart LFS uploads are not supported",
                ));
            }
            let file = File::open(local).map_err(|err| io_error(local, &err))?;
            let mut put = self.agent.put(&upload.href);
            for (name, value) in &upload.header {
                put = put.header(name, value);
            }
            put.send(file).map_err(|err| http_error("LFS upload", err))?;
        }

        if let Some(verify) = actions.verify {
            let mut post = self
                .agent
                .post(&verify.href)
                .header("Authorization", self.bearer())
                .header("Accept", LFS_CONTENT_TYPE)
                .header("Content-Type", LFS_CONTENT_TYPE);
            for (name, value) in &verify.header {
                post = post.header(name, value);
            }
            let body = serde_json::to_vec(object)
                .map_err(|err| SinkError::new(ErrorKind::InvalidInput, err.to_string()))?;
            post.send(body).map_err(|err| http_error("LFS verify", err))?;
        }
        Ok(())
    }

    fn commit(
        &self,
        repo_id: &str,
        path_in_repo: &str,
        message: &str,
        object: &LfsPointer,
    ) -> SinkResult<()> {
        let url = format!("{}/api/datasets/{repo_id}/commit/main", self.endpoint);
        let lines = [
            json!({ "key": "header", "value": { "summary": message, "description": "" } }),
            json!({
                "key": "lfsFile",
                "value": {
                    "path": path_in_repo,
                    "algo": "sha256",
                    "oid": object.oid,
                    "size": object.size,
                },
            }),
        ];
        let body = lines
            .iter()
            .map(serde_json::Value::to_string)
            .collect::<Vec<_>>()
            .join("\n");

        self.agent
            .post(&url)
            .header("Authorization", self.bearer())
            .header("Content-Type", "application/x-ndjson")
            .send(body)
            .map_err(|err| http_error("commit", err))?;
        Ok(())
    }
}

impl DatasetSink for HubSink {
    fn ensure_repo(&self, repo_id: &str) -> SinkResult<()> {
        let (organization, name) = repo_id.split_once('/').ok_or_else(|| {
            SinkError::new(
                ErrorKind::InvalidInput,
                format!("repo id {repo_id} has no namespace"),
            )
        })?;
        let url = format!("{}/api/repos/create", self.endpoint);
        let result = self
            .agent
            .post(&url)
            .header("Authorization", self.bearer())
            .send_json(json!({
                "type": "dataset",
                "name": name,
                "organization": organization,
            }));
        match result {
            Ok(_) => {
                tracing::info!(repo = repo_id, "created dataset repo");
                Ok(())
            }
            Err(ureq::Error::StatusCode(409)) => Ok(()),
            Err(err) => Err(http_error("create repo", err)),
        }
    }

    fn upload_file(
        &self,
        local: &Path,
        repo_id: &str,
        path_in_repo: &str,
        message: &str,
    ) -> SinkResult<()> {
        let object = LfsPointer::for_file(local)?;
        tracing::debug!(repo = repo_id, path = path_in_repo, oid = %object.oid, size = object.size, "uploading");
        self.lfs_upload(local, repo_id, &object)?;
        self.commit(repo_id, path_in_repo, message, &object)
    }
}

#[derive(Clone, Debug, Serialize)]
struct LfsPointer {
    oid: String,
    size: u64,
}

impl LfsPointer {
    fn for_file(path: &Path) -> SinkResult<Self> {
        let mut file = File::open(path).map_err(|err| io_error(path, &err))?;
        let mut hasher = Sha256::new();
        let mut buf = vec![0u8; 64 * 1024];
        let mut size = 0u64;
        loop {
            let n = file.read(&mut buf).map_err(|err| io_error(path, &err))?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
            size += n as u64;
        }
        Ok(Self {
            oid: format!("{:x}", hasher.finalize()),
            size,
        })
    }
}

#[derive(Debug, Deserialize)]
struct LfsBatchResponse {
    objects: Vec<LfsObject>,
}

#[derive(Debug, Deserialize)]
struct LfsObject {
    oid: String,
    actions: Option<LfsActions>,
    error: Option<LfsObjectError>,
}

#[derive(Debug, Deserialize)]
struct LfsActions {
    upload: Option<LfsAction>,
    verify: Option<LfsAction>,
}

#[derive(Debug, Deserialize)]
struct LfsAction {
    href: String,
    #[serde(default)]
    header: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct LfsObjectError {
    code: u16,
    message: String,
}

fn http_error(context: &str, err: ureq::Error) -> SinkError {
    let kind = match &err {
        ureq::Error::StatusCode(code) => ErrorKind::from_status(*code),
        _ => ErrorKind::Network,
    };
    SinkError::new(kind, format!("{context} failed")).with_source(err.to_string())
}

fn io_error(path: &Path, err: &io::Error) -> SinkError {
    SinkError::new(ErrorKind::Io, format!("read {}", path.display())).with_source(err.to_string())
}
