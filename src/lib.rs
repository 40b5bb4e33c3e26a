//! # corpus-domains
//!
//! A resumable batch pipeline that walks the file list of a web-text corpus, pulls the
//! source URL out of every document, resolves its registrable domain, and publishes the
//! `(url, domain)` pairs as ZSTD-compressed Parquet to a Hugging Face dataset repo.
//!
//! ## Key Features
//!
//! - **Resumable** - a per-variant ledger records every URL whose rows have been
//!   published; a rerun skips them and picks up at the first unpublished batch
//! - **Batch atomicity** - a batch is ledgered in full after its artifact is
//!   acknowledged, or not at all
//! - **Corruption-aware** - truncated or garbled files are re-fetched and retried;
//!   service error documents saved in place of a file are detected and skipped
//! - **Bounded parallelism** - separate worker pools for downloads and extraction
//! - **Pluggable edges** - downloads go through [`fetch::Transfer`] and publishing
//!   through [`sink::DatasetSink`], both with in-memory fakes for tests
//!
//! ## Flow
//!
//! ```text
//! manifest + ledger -> planner -> [ fetch -> classify -> extract ]* -> merge
//!                                -> publish -> ledger append -> purge scratch
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use corpus_domains::config::PipelineConfig;
//! use corpus_domains::datasets::find_dataset;
//! use corpus_domains::fetch::HttpTransfer;
//! use corpus_domains::runner::Runner;
//! use corpus_domains::sink::HubSink;
//! use std::sync::Arc;
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = PipelineConfig {
//!     hub_namespace: "my-org".to_string(),
//!     ..PipelineConfig::default()
//! };
//! let dataset = find_dataset("dolma")?;
//! let sink = HubSink::from_env()?;
//! let runner = Runner::new(config.clone(), Arc::new(HttpTransfer::new(&config)), &sink)?;
//! let summary = runner.run_dataset(dataset)?;
//! summary.print();
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`domain`] - registrable domain of a URL
//! - [`ledger`] - durable set of completed URLs
//! - [`planner`] - pending URLs sliced into batches
//! - [`fetch`] - batch downloads with retry and resume
//! - [`classify`] - error-document detection
//! - [`extract`] - per-file JSONL to Parquet extraction
//! - [`batch`] - the per-batch state machine
//! - [`sink`] - dataset repo publishing
//! - [`runner`] - whole-dataset driver
//! - [`datasets`], [`manifest`], [`config`] - what to process and where
//! - [`io`] - compression, JSONL, and Parquet helpers

pub mod batch;
pub mod classify;
pub mod config;
pub mod datasets;
pub mod domain;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod io;
pub mod ledger;
pub mod logging;
pub mod manifest;
pub mod metrics;
pub mod planner;
pub mod retry;
pub mod runner;
pub mod scratch;
pub mod sink;
pub mod testing;

pub use batch::{BatchProcessor, BatchState, batch_id};
pub use config::PipelineConfig;
pub use domain::extract_domain;
pub use error::{PipelineError, Result};
pub use io::DomainRow;
pub use runner::Runner;
