//! HTTP transfers over `ureq`, resumable through a `.part` file.

use super::{Transfer, TransferError, TransferErrorKind, part_path};
use crate::config::PipelineConfig;
use crate::retry::{RetryConfig, retry_with_backoff};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use ureq::Agent;

/// Downloads with HTTP range resume and a fixed number of tries per URL.
///
/// Bytes are streamed into `<dest>.part`; a later try (or a later run) asks the server
/// for the remainder with a `Range` header. The part file is renamed onto `dest` only
/// once the body has been read to the end. Waiting for a response and reading its body
/// are both bounded by `read_timeout`, so a stalled server fails the try instead of
/// holding a worker.
#[derive(Clone, Debug)]
pub struct HttpTransfer {
    agent: Agent,
    retry: RetryConfig,
}

impl HttpTransfer {
    #[must_use]
    pub fn new(config: &PipelineConfig) -> Self {
        let agent: Agent = Agent::config_builder()
            .timeout_connect(Some(config.connect_timeout))
            .timeout_recv_response(Some(config.read_timeout))
            .timeout_recv_body(Some(config.read_timeout))
            .user_agent(concat!("corpus-domains/", env!("CARGO_PKG_VERSION")))
            .build()
            .into();
        Self {
            agent,
            retry: config.transfer_retry(),
        }
    }

    #[must_use]
    pub fn agent(&self) -> &Agent {
        &self.agent
    }

    fn try_once(&self, url: &str, dest: &Path) -> Result<(), TransferError> {
        let part = part_path(dest);
        let offset = fs::metadata(&part).map_or(0, |meta| meta.len());

        let mut request = self.agent.get(url);
        if offset > 0 {
            request = request.header("Range", format!("bytes={offset}-"));
        }
        let response = match request.call() {
            Ok(response) => response,
            // Nothing left past `offset`: the part file already holds the whole body.
            Err(ureq::Error::StatusCode(416)) if offset > 0 => return promote(url, &part, dest),
            Err(ureq::Error::StatusCode(code)) => return Err(status_error(url, code)),
            Err(err) => {
                return Err(TransferError::new(url, TransferErrorKind::Network, err.to_string()));
            }
        };

        let resumed = offset > 0 && response.status().as_u16() == 206;
        let file = if resumed {
            OpenOptions::new().append(true).open(&part)
        } else {
            File::create(&part)
        }
        .map_err(|err| TransferError::io(url, &err))?;

        let mut writer = BufWriter::new(file);
        let mut body = response.into_body().into_reader();
        io::copy(&mut body, &mut writer)
            .map_err(|err| TransferError::new(url, TransferErrorKind::Network, err.to_string()))?;
        writer.flush().map_err(|err| TransferError::io(url, &err))?;
        drop(writer);

        promote(url, &part, dest)
    }
}

impl Transfer for HttpTransfer {
    fn download(&self, url: &str, dest: &Path) -> Result<(), TransferError> {
        retry_with_backoff(&self.retry, TransferError::is_retryable, |attempt| {
            let result = self.try_once(url, dest);
            if let Err(err) = &result {
                tracing::debug!(url, attempt = attempt + 1, error = %err, "transfer attempt failed");
            }
            result
        })
    }
}

fn promote(url: &str, part: &Path, dest: &Path) -> Result<(), TransferError> {
    fs::rename(part, dest).map_err(|err| TransferError::io(url, &err))
}

fn status_error(url: &str, code: u16) -> TransferError {
    let kind = match code {
        403 | 404 | 410 => TransferErrorKind::NotFound,
        _ => TransferErrorKind::Status(code),
    };
    TransferError::new(url, kind, format!("HTTP {code}"))
}
