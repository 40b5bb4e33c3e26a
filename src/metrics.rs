//! Per-batch and per-run statistics.
//!
//! The batch processor fills one [`BatchReport`] per published batch; the runner
//! collects them into a [`RunSummary`], which can be printed at the end of a run or
//! saved as JSON (`--report`).
//!
//! # Example
//!
//! ```no_run
//! use corpus_domains::metrics::{BatchReport, RunSummary, VariantSummary};
//!
//! # fn main() -> anyhow::Result<()> {
//! let mut summary = RunSummary::new("dolma");
//! let mut variant = VariantSummary::new("v1.5", "me/dolma_urls_v1.5", 100);
//! variant.batches.push(BatchReport { urls: 100, ledgered: 100, rows: 42_000, ..BatchReport::default() });
//! summary.variants.push(variant);
//! summary.print();
//! summary.save_to_file("report.json")?;
//! # Ok(())
//! # }
//! ```

use anyhow::{Context, Result};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// What happened to one published batch.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub batch_id: String,
    /// Manifest URLs in the batch.
    pub urls: usize,
    /// URLs appended to the ledger; those without a local file are left out.
    pub ledgered: usize,
    /// Distinct local files the URLs mapped to.
    pub files: usize,
    /// Files transferred during this batch.
    pub downloaded: usize,
    /// Files found complete in scratch from an interrupted earlier run.
    pub reused: usize,
    pub download_attempts: u32,
    /// Files holding a service error document instead of records.
    pub wrappers_skipped: usize,
    pub refetches: usize,
    /// Corrupt files given up on.
    pub files_dropped: usize,
    pub rows: u64,
    /// Artifact name in the remote repo.
    pub remote_path: String,
    pub elapsed_ms: u64,
}

/// All batches of one dataset variant processed during a run.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct VariantSummary {
    pub variant: String,
    pub repo_id: String,
    /// Manifest URLs not yet ledgered when the variant started.
    pub pending: usize,
    pub batches: Vec<BatchReport>,
}

impl VariantSummary {
    pub fn new(variant: impl Into<String>, repo_id: impl Into<String>, pending: usize) -> Self {
        Self {
            variant: variant.into(),
            repo_id: repo_id.into(),
            pending,
            batches: Vec::new(),
        }
    }

    #[must_use]
    pub fn urls_ledgered(&self) -> usize {
        self.batches.iter().map(|b| b.ledgered).sum()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub dataset: String,
    pub variants: Vec<VariantSummary>,
    pub elapsed_ms: u64,
}

impl RunSummary {
    pub fn new(dataset: impl Into<String>) -> Self {
        Self {
            dataset: dataset.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn batches(&self) -> usize {
        self.variants.iter().map(|v| v.batches.len()).sum()
    }

    #[must_use]
    pub fn urls_ledgered(&self) -> usize {
        self.variants.iter().map(VariantSummary::urls_ledgered).sum()
    }

    #[must_use]
    pub fn rows(&self) -> u64 {
        self.all_batches().map(|b| b.rows).sum()
    }

    #[must_use]
    pub fn files_dropped(&self) -> usize {
        self.all_batches().map(|b| b.files_dropped).sum()
    }

    #[must_use]
    pub fn wrappers_skipped(&self) -> usize {
        self.all_batches().map(|b| b.wrappers_skipped).sum()
    }

    fn all_batches(&self) -> impl Iterator<Item = &BatchReport> {
        self.variants.iter().flat_map(|v| v.batches.iter())
    }

    /// Print a human-readable summary to stdout.
    pub fn print(&self) {
        println!("\n========== {} ==========", self.dataset);
        for v in &self.variants {
            println!(
                "{:<10} {:>6} batches {:>9} urls ledgered ({} pending at start) -> {}",
                v.variant,
                v.batches.len(),
                v.urls_ledgered(),
                v.pending,
                v.repo_id
            );
        }
        println!("--------------------------------------");
        println!("Rows published:   {}", self.rows());
        println!("Wrappers skipped: {}", self.wrappers_skipped());
        println!("Files dropped:    {}", self.files_dropped());
        println!(
            "Elapsed:          {:.3}s",
            std::time::Duration::from_millis(self.elapsed_ms).as_secs_f64()
        );
        println!("======================================\n");
    }

    /// Save the summary as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or written to.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let file = File::create(path).with_context(|| format!("create {}", path.display()))?;
        let mut w = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut w, self).context("serialize run summary")?;
        w.flush()?;
        Ok(())
    }
}
