//! Streaming JSON Lines reader with dotted field projection.
//!
//! Records are read one line at a time from an already-decompressed stream and parsed
//! with `serde_json`; only the value at the configured field path is handed to the
//! caller. Blank lines are skipped. Errors keep their typed source so callers can tell a
//! truncated or garbled file apart from an I/O problem.

use serde_json::Value;
use std::fmt;
use std::io::{self, BufRead};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum JsonlError {
    #[error("read line {line}: {source}")]
    Read {
        line: usize,
        #[source]
        source: io::Error,
    },
    #[error("parse JSONL line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// A dotted path into a JSON record, e.g. `metadata.url`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldPath {
    segments: Vec<String>,
}

impl FieldPath {
    /// Parse a dotted selector. A leading `.` (jq style) is accepted and ignored.
    #[must_use]
    pub fn parse(selector: &str) -> Self {
        let segments = selector
            .trim()
            .trim_start_matches('.')
            .split('.')
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
            .collect();
        Self { segments }
    }

    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// The value at this path inside `record`; `None` if any segment is missing.
    #[must_use]
    pub fn project<'v>(&self, record: &'v Value) -> Option<&'v Value> {
        self.segments
            .iter()
            .try_fold(record, |value, segment| match value {
                Value::Object(map) => map.get(segment),
                Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
                _ => None,
            })
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, ".{}", self.segments.join("."))
    }
}

/// Parse every record of `reader` and call `visit` with the projected field.
///
/// `visit` receives `Some(s)` for string values and `None` for anything else (missing,
/// null, numbers, objects). Returns the number of records seen.
///
/// # Errors
///
/// Stops at the first line that cannot be read or parsed.
pub fn for_each_field<R, F>(mut reader: R, path: &FieldPath, mut visit: F) -> Result<usize, JsonlError>
where
    R: BufRead,
    F: FnMut(Option<&str>),
{
    let mut buf = Vec::with_capacity(8 * 1024);
    let mut line = 0usize;
    let mut records = 0usize;
    loop {
        buf.clear();
        line += 1;
        let n = reader
            .read_until(b'\n', &mut buf)
            .map_err(|source| JsonlError::Read { line, source })?;
        if n == 0 {
            break;
        }
        if buf.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        let record: Value =
            serde_json::from_slice(&buf).map_err(|source| JsonlError::Parse { line, source })?;
        visit(path.project(&record).and_then(Value::as_str));
        records += 1;
    }
    Ok(records)
}
