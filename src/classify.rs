//! Detection of downloaded files that are not payload at all.
//!
//! Object stores answer some failed requests with `200 OK` and an XML error document as
//! the body (`<?xml ...?><Error><Code>SlowDown</Code>...`). Saved under the requested
//! name, such a file looks like a normal shard until it is parsed. Re-fetching it tends
//! to return the same envelope, so wrappers are excluded from the batch instead of being
//! retried.
//!
//! Inspection is fail-open: if the prefix cannot be read, the file is classified as
//! [`Classification::Payload`] and left to the extractor.

use crate::io::compression::read_prefix;
use quick_xml::events::Event;
use quick_xml::reader::Reader;
use std::path::Path;

/// Bytes of (decompressed) content inspected per file.
pub const PREFIX_LEN: usize = 4 * 1024;

/// Starts of an XML error document. Only checked at the very beginning of the content.
const XML_LEADS: [&[u8]; 2] = [b"<?xml", b"<Error"];
/// S3 Select failure text; only meaningful when the content is not JSON.
const SELECT_MARKER: &[u8] = b"SelectObjectContentRequest";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Classification {
    /// Looks like real records (or could not be inspected).
    Payload,
    /// A service error document stored in place of the payload.
    ErrorWrapper { reason: String },
}

impl Classification {
    #[must_use]
    pub fn is_wrapper(&self) -> bool {
        matches!(self, Self::ErrorWrapper { .. })
    }
}

/// Classify `path` from its first [`PREFIX_LEN`] decompressed bytes.
#[must_use]
pub fn classify_file(path: impl AsRef<Path>) -> Classification {
    let path = path.as_ref();
    match read_prefix(path, PREFIX_LEN) {
        Ok(prefix) => classify_bytes(&prefix),
        Err(err) => {
            tracing::debug!(path = %path.display(), error = %err, "prefix unreadable, assuming payload");
            Classification::Payload
        }
    }
}

/// Whether `path` holds an error envelope instead of records.
#[must_use]
pub fn is_corrupt_wrapper(path: impl AsRef<Path>) -> bool {
    classify_file(path).is_wrapper()
}

/// Classify an already-read content prefix.
#[must_use]
pub fn classify_bytes(prefix: &[u8]) -> Classification {
    let head = trim_leading(prefix);
    let marker = if let Some(lead) = XML_LEADS.iter().find(|lead| head.starts_with(lead)) {
        *lead
    } else if !head.starts_with(b"{") && !head.starts_with(b"[") && contains(head, SELECT_MARKER) {
        SELECT_MARKER
    } else {
        return Classification::Payload;
    };

    let reason = match error_summary(head) {
        Some(summary) => summary,
        None => format!("found {}", String::from_utf8_lossy(marker)),
    };
    Classification::ErrorWrapper { reason }
}

fn trim_leading(bytes: &[u8]) -> &[u8] {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    &bytes[start..]
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

/// `Code: Message` of an S3-style error document, if one can be read.
fn error_summary(xml: &[u8]) -> Option<String> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut current: Option<Vec<u8>> = None;
    let mut code: Option<String> = None;
    let mut message: Option<String> = None;

    loop {
        buf.clear();
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => current = Some(e.name().as_ref().to_vec()),
            Ok(Event::End(_)) => current = None,
            Ok(Event::Text(t)) => {
                let text = String::from_utf8_lossy(&t).trim().to_string();
                match current.as_deref() {
                    Some(b"Code") if code.is_none() => code = Some(text),
                    Some(b"Message") if message.is_none() => message = Some(text),
                    _ => {}
                }
            }
            // A truncated prefix ends mid-document; keep what was read.
            Ok(Event::Eof) | Err(_) => break,
            Ok(_) => {}
        }
        if code.is_some() && message.is_some() {
            break;
        }
    }

    match (code, message) {
        (Some(code), Some(message)) => Some(format!("{code}: {message}")),
        (Some(code), None) => Some(code),
        (None, Some(message)) => Some(message),
        (None, None) => None,
    }
}
