//! Fixtures for tests of the pipeline and of code built on it.
//!
//! - Payload builders: [`record_line`], [`gzip_payload`], [`truncated`],
//!   [`xml_error_payload`]
//! - Workspace helpers: [`test_config`], [`write_manifest`]
//!
//! # Example
//!
//! ```
//! use corpus_domains::testing::*;
//!
//! let lines = vec![record_line("metadata.url", "https://news.bbc.co.uk/a")];
//! let payload = gzip_payload(&lines);
//! assert_eq!(&payload[..2], &[0x1f, 0x8b]);
//! ```

use crate::config::PipelineConfig;
use crate::datasets::{DatasetConfig, VariantConfig};
use serde_json::{Map, Value, json};
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::time::Duration;

/// One JSONL record with `url` stored at the dotted `selector` path.
#[must_use]
pub fn record_line(selector: &str, url: &str) -> String {
    let mut value = Value::String(url.to_string());
    for segment in selector.trim_start_matches('.').rsplit('.') {
        let mut map = Map::new();
        map.insert(segment.to_string(), value);
        value = Value::Object(map);
    }
    if let Value::Object(map) = &mut value {
        map.insert("text".to_string(), json!("lorem ipsum"));
    }
    value.to_string()
}

/// Gzip-compressed JSONL made of `lines`.
///
/// # Panics
///
/// Panics if compressing into memory fails, which does not happen in practice.
#[cfg(feature = "compression-gzip")]
#[must_use]
pub fn gzip_payload<S: AsRef<str>>(lines: &[S]) -> Vec<u8> {
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    for line in lines {
        encoder
            .write_all(line.as_ref().as_bytes())
            .and_then(|()| encoder.write_all(b"\n"))
            .expect("in-memory gzip write");
    }
    encoder.finish().expect("in-memory gzip finish")
}

/// The first half of `payload`, as left behind by an interrupted transfer.
#[must_use]
pub fn truncated(payload: &[u8]) -> Vec<u8> {
    payload[..payload.len() / 2].to_vec()
}

/// An S3-style XML error document of the kind stored in place of a real file.
#[must_use]
pub fn xml_error_payload(code: &str, message: &str) -> Vec<u8> {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<Error><Code>{code}</Code><Message>{message}</Message><RequestId>4442587FB7D0A2F9</RequestId></Error>"
    )
    .into_bytes()
}

/// Configuration rooted at `root` with no backoff pauses and small worker pools.
#[must_use]
pub fn test_config(root: &Path) -> PipelineConfig {
    PipelineConfig {
        work_dir: root.join("work"),
        scratch_root: root.join("scratch"),
        hub_namespace: "tester".to_string(),
        batch_size: None,
        download_workers: 4,
        extract_workers: 2,
        transfer_tries: 1,
        transfer_retry_delay: Duration::ZERO,
        batch_download_attempts: 3,
        backoff_base: Duration::ZERO,
        extract_retries: 2,
        connect_timeout: Duration::from_secs(5),
        read_timeout: Duration::from_secs(5),
    }
}

/// Write `urls` as the manifest of `variant`.
///
/// # Errors
///
/// Returns an I/O error if the manifest cannot be written.
pub fn write_manifest<S: AsRef<str>>(
    config: &PipelineConfig,
    dataset: &DatasetConfig,
    variant: &VariantConfig,
    urls: &[S],
) -> io::Result<()> {
    let path = config.manifest_path(dataset, variant);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut body = String::new();
    for url in urls {
        body.push_str(url.as_ref());
        body.push('\n');
    }
    fs::write(path, body)
}
