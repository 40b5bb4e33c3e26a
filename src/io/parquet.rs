//! Parquet artifacts of `(url, domain)` rows.
//!
//! This module provides:
//! - [`write_rows`] to write one per-source-file artifact from typed rows
//! - [`read_rows`] to read an artifact back into `Vec<DomainRow>`
//! - [`merge_files`] to concatenate per-file artifacts into one batch artifact by
//!   streaming record batches, without materializing rows
//!
//! Every file is written with ZSTD compression and carries exactly two string
//! columns, `url` and `domain`, inferred from [`DomainRow`] through `serde_arrow`.

use anyhow::{Context, Result};
use arrow::datatypes::{FieldRef, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::arrow_writer::ArrowWriter;
use parquet::basic::{Compression, ZstdLevel};
use parquet::file::properties::WriterProperties;
use serde::{Deserialize, Serialize};
use serde_arrow::schema::{SchemaLike, TracingOptions};
use serde_arrow::{from_record_batch, to_record_batch};
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

/// One extracted row: a document's source URL and its registrable domain.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DomainRow {
    pub url: String,
    pub domain: String,
}

fn row_fields() -> Result<Vec<FieldRef>> {
    Vec::<FieldRef>::from_type::<DomainRow>(TracingOptions::default())
        .context("infer Arrow schema from DomainRow")
}

/// Arrow schema shared by every artifact.
///
/// # Errors
///
/// Returns an error if schema inference fails.
pub fn row_schema() -> Result<SchemaRef> {
    Ok(Arc::new(Schema::new(row_fields()?)))
}

fn writer_props() -> WriterProperties {
    WriterProperties::builder()
        .set_compression(Compression::ZSTD(ZstdLevel::default()))
        .build()
}

/// Write `rows` to a ZSTD-compressed Parquet file.
///
/// Zero rows still produce a valid file with the full schema.
///
/// # Returns
/// Number of rows written.
///
/// # Errors
/// An error is returned if the conversion, file creation, or writing fails.
pub fn write_rows(path: impl AsRef<Path>, rows: &[DomainRow]) -> Result<usize> {
    let path = path.as_ref();
    let fields = row_fields()?;
    let batch: RecordBatch = to_record_batch(&fields, &rows).context("convert rows to RecordBatch")?;

    let file = File::create(path).with_context(|| format!("create {}", path.display()))?;
    let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(writer_props()))
        .context("create ArrowWriter")?;
    writer.write(&batch).context("write batch to parquet")?;
    writer.close().context("close ArrowWriter")?;
    Ok(rows.len())
}

/// Read a whole artifact into memory.
///
/// # Errors
/// Returns an error if the file cannot be opened or decoded into [`DomainRow`]s.
pub fn read_rows(path: impl AsRef<Path>) -> Result<Vec<DomainRow>> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut reader = ParquetRecordBatchReaderBuilder::try_new(file)
        .context("open ParquetRecordBatchReader")?
        .with_batch_size(64 * 1024)
        .build()
        .context("build ParquetRecordBatchReader")?;

    let mut out: Vec<DomainRow> = Vec::new();
    while let Some(batch) = reader.next().transpose().context("read next batch")? {
        let mut rows: Vec<DomainRow> =
            from_record_batch(&batch).context("deserialize RecordBatch rows")?;
        out.append(&mut rows);
    }
    Ok(out)
}

/// Concatenate `inputs` into a single artifact at `output`.
///
/// Record batches are streamed from each input in the order given. With no inputs (or
/// only empty ones) a zero-row artifact is written.
///
/// # Returns
/// Total number of rows written.
///
/// # Errors
/// Returns an error if any input cannot be read or the output cannot be written.
pub fn merge_files<P: AsRef<Path>>(inputs: &[P], output: impl AsRef<Path>) -> Result<u64> {
    let output = output.as_ref();
    let schema = row_schema()?;
    let file = File::create(output).with_context(|| format!("create {}", output.display()))?;
    let mut writer = ArrowWriter::try_new(file, schema.clone(), Some(writer_props()))
        .context("create ArrowWriter")?;

    let mut total = 0u64;
    for input in inputs {
        let input = input.as_ref();
        let f = File::open(input).with_context(|| format!("open {}", input.display()))?;
        let reader = ParquetRecordBatchReaderBuilder::try_new(f)
            .with_context(|| format!("open ParquetRecordBatchReader for {}", input.display()))?
            .build()
            .with_context(|| format!("build reader for {}", input.display()))?;
        for batch in reader {
            let batch = batch.with_context(|| format!("read batch from {}", input.display()))?;
            if batch.num_rows() == 0 {
                continue;
            }
            let batch = RecordBatch::try_new(schema.clone(), batch.columns().to_vec())
                .with_context(|| format!("schema mismatch in {}", input.display()))?;
            total += batch.num_rows() as u64;
            writer.write(&batch).context("write merged batch")?;
        }
    }
    writer.close().context("close ArrowWriter")?;
    Ok(total)
}
