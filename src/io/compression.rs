//! Transparent decompression of downloaded source files.
//!
//! Source corpora ship as gzip (`.json.gz`), zstd, or plain JSONL. A file is decoded by
//! the first codec whose extension matches its name; when none matches, the leading
//! bytes are compared against each codec's magic signature, so a mislabeled file is
//! still decoded correctly.
//!
//! ## Built-in Codecs
//!
//! When enabled via feature flags, the following codecs are available:
//! - **Gzip** (`.gz`) - via `flate2` crate (feature: `compression-gzip`)
//! - **Zstd** (`.zst`) - via `zstd` crate (feature: `compression-zstd`)
//! - **Bzip2** (`.bz2`) - via `bzip2` crate (feature: `compression-bzip2`)
//! - **Xz** (`.xz`) - via `xz2` crate (feature: `compression-xz`)
//!
//! Decoder failures surface as `std::io::Error`s (usually `InvalidData` or
//! `UnexpectedEof`); the record extractor treats those as a corrupt file.

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;

/// A decompression algorithm the pipeline can read.
pub trait CompressionCodec: Send + Sync {
    /// Human-readable codec name (e.g., "gzip", "zstd").
    fn name(&self) -> &str;

    /// File extensions associated with this codec, lowercase with the leading dot.
    fn extensions(&self) -> &[&str];

    /// Byte signature at the start of a stream in this format.
    fn magic_bytes(&self) -> &[u8];

    /// Wrap a reader with decompression.
    fn wrap_reader(&self, reader: Box<dyn Read>) -> io::Result<Box<dyn Read>>;
}

static CODECS: &[&dyn CompressionCodec] = &[
    #[cfg(feature = "compression-gzip")]
    &GzipCodec,
    #[cfg(feature = "compression-zstd")]
    &ZstdCodec,
    #[cfg(feature = "compression-bzip2")]
    &Bzip2Codec,
    #[cfg(feature = "compression-xz")]
    &XzCodec,
];

/// Codec selected by the file name alone.
#[must_use]
pub fn codec_for_path(path: impl AsRef<Path>) -> Option<&'static dyn CompressionCodec> {
    let name = path.as_ref().to_string_lossy().to_lowercase();
    CODECS
        .iter()
        .copied()
        .find(|codec| codec.extensions().iter().any(|ext| name.ends_with(ext)))
}

/// Codec whose magic bytes prefix `head`.
#[must_use]
pub fn codec_for_magic(head: &[u8]) -> Option<&'static dyn CompressionCodec> {
    CODECS
        .iter()
        .copied()
        .find(|codec| !head.is_empty() && head.starts_with(codec.magic_bytes()))
}

/// Open `path` and wrap it with the decompressor it needs, if any.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or the decoder cannot be set up.
pub fn open_decompressed(path: impl AsRef<Path>) -> Result<Box<dyn BufRead>> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let reader = wrap_reader(file, path)
        .with_context(|| format!("setup decompression for {}", path.display()))?;
    Ok(Box::new(BufReader::new(reader)))
}

/// Wrap `reader` (content of `path_hint`) with the matching decompressor.
///
/// # Errors
///
/// Returns the decoder's setup error.
pub fn wrap_reader<R: Read + 'static>(reader: R, path_hint: &Path) -> io::Result<Box<dyn Read>> {
    if let Some(codec) = codec_for_path(path_hint) {
        return codec.wrap_reader(Box::new(reader));
    }

    let mut buffered = BufReader::new(reader);
    let head = buffered.fill_buf()?;
    if let Some(codec) = codec_for_magic(head) {
        return codec.wrap_reader(Box::new(buffered));
    }
    Ok(Box::new(buffered))
}

/// Up to `limit` bytes of the decompressed content of `path`.
///
/// Falls back to the raw leading bytes when the decoder rejects the data, which is
/// exactly what happens when a `.gz` file actually holds a plain-text error page.
///
/// # Errors
///
/// Returns an error only if the raw file cannot be read.
pub fn read_prefix(path: impl AsRef<Path>, limit: usize) -> io::Result<Vec<u8>> {
    let path = path.as_ref();
    let mut raw = Vec::with_capacity(limit);
    File::open(path)?
        .take(limit as u64)
        .read_to_end(&mut raw)?;

    let decoded = File::open(path)
        .and_then(|file| wrap_reader(file, path))
        .and_then(|reader| {
            let mut out = Vec::with_capacity(limit);
            reader.take(limit as u64).read_to_end(&mut out)?;
            Ok(out)
        });
    match decoded {
        Ok(bytes) if !bytes.is_empty() => Ok(bytes),
        _ => Ok(raw),
    }
}

// ============================================================================
// Built-in Codec Implementations
// ============================================================================

#[cfg(feature = "compression-gzip")]
struct GzipCodec;

#[cfg(feature = "compression-gzip")]
impl CompressionCodec for GzipCodec {
    fn name(&self) -> &str {
        "gzip"
    }

    fn extensions(&self) -> &[&str] {
        &[".gz", ".gzip"]
    }

    fn magic_bytes(&self) -> &[u8] {
        &[0x1f, 0x8b]
    }

    fn wrap_reader(&self, reader: Box<dyn Read>) -> io::Result<Box<dyn Read>> {
        // Corpus shards are often several gzip members concatenated.
        Ok(Box::new(flate2::read::MultiGzDecoder::new(reader)))
    }
}

#[cfg(feature = "compression-zstd")]
struct ZstdCodec;

#[cfg(feature = "compression-zstd")]
impl CompressionCodec for ZstdCodec {
    fn name(&self) -> &str {
        "zstd"
    }

    fn extensions(&self) -> &[&str] {
        &[".zst", ".zstd"]
    }

    fn magic_bytes(&self) -> &[u8] {
        &[0x28, 0xb5, 0x2f, 0xfd]
    }

    fn wrap_reader(&self, reader: Box<dyn Read>) -> io::Result<Box<dyn Read>> {
        zstd::stream::read::Decoder::new(reader).map(|d| Box::new(d) as Box<dyn Read>)
    }
}

#[cfg(feature = "compression-bzip2")]
struct Bzip2Codec;

#[cfg(feature = "compression-bzip2")]
impl CompressionCodec for Bzip2Codec {
    fn name(&self) -> &str {
        "bzip2"
    }

    fn extensions(&self) -> &[&str] {
        &[".bz2", ".bzip2"]
    }

    fn magic_bytes(&self) -> &[u8] {
        b"BZh"
    }

    fn wrap_reader(&self, reader: Box<dyn Read>) -> io::Result<Box<dyn Read>> {
        Ok(Box::new(bzip2::read::MultiBzDecoder::new(reader)))
    }
}

#[cfg(feature = "compression-xz")]
struct XzCodec;

#[cfg(feature = "compression-xz")]
impl CompressionCodec for XzCodec {
    fn name(&self) -> &str {
        "xz"
    }

    fn extensions(&self) -> &[&str] {
        &[".xz"]
    }

    fn magic_bytes(&self) -> &[u8] {
        &[0xfd, 0x37, 0x7a, 0x58, 0x5a, 0x00]
    }

    fn wrap_reader(&self, reader: Box<dyn Read>) -> io::Result<Box<dyn Read>> {
        Ok(Box::new(xz2::read::XzDecoder::new_multi_decoder(reader)))
    }
}
