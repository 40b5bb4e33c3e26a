//! File formats the pipeline reads and writes: compressed JSONL sources in,
//! ZSTD-compressed Parquet artifacts out.

pub mod compression;
pub mod jsonl;
pub mod parquet;

pub use parquet::DomainRow;
