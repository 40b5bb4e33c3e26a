//! Drives a whole dataset: every variant, every pending batch, strictly in order.

use crate::batch::BatchProcessor;
use crate::config::PipelineConfig;
use crate::datasets::DatasetConfig;
use crate::error::Result;
use crate::fetch::{Fetcher, Transfer};
use crate::ledger::ProgressLedger;
use crate::manifest::load_manifest;
use crate::metrics::{RunSummary, VariantSummary};
use crate::planner::plan;
use crate::sink::DatasetSink;
use std::sync::Arc;
use std::time::Instant;

pub struct Runner<'a> {
    config: PipelineConfig,
    fetcher: Fetcher,
    sink: &'a dyn DatasetSink,
}

impl<'a> Runner<'a> {
    /// # Errors
    ///
    /// Returns an error if the download worker pool cannot be started.
    pub fn new(
        config: PipelineConfig,
        transfer: Arc<dyn Transfer>,
        sink: &'a dyn DatasetSink,
    ) -> Result<Self> {
        let fetcher = Fetcher::new(transfer, &config)?;
        Ok(Self {
            config,
            fetcher,
            sink,
        })
    }

    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Process every pending batch of every variant of `dataset`.
    ///
    /// Batches run one at a time. The first batch that fails stops the run; batches
    /// ledgered before it stay ledgered, and the next run resumes from the failed one.
    ///
    /// # Errors
    ///
    /// Returns run-level errors (missing manifest, unreadable ledger) and the error of
    /// the first failed batch.
    pub fn run_dataset(&self, dataset: &'static DatasetConfig) -> Result<RunSummary> {
        let started = Instant::now();
        let mut summary = RunSummary::new(dataset.name);
        let batch_size = self.config.effective_batch_size(dataset);

        for variant in dataset.variants {
            let manifest = load_manifest(&self.config.manifest_path(dataset, variant))?;
            let ledger = ProgressLedger::new(self.config.ledger_path(dataset, variant));
            let done = ledger.load()?;

            let batches = plan(&manifest, &done, batch_size);
            let processor =
                BatchProcessor::new(&self.config, dataset, variant, &self.fetcher, self.sink, &ledger)?;
            tracing::info!(
                dataset = dataset.name,
                variant = variant.name,
                manifest = manifest.len(),
                done = done.len(),
                pending = batches.pending(),
                batches = batches.batches_left(),
                batch_size,
                repo = processor.repo_id(),
                "processing variant"
            );

            let mut variant_summary =
                VariantSummary::new(variant.name, processor.repo_id(), batches.pending());
            let total = batches.batches_left();
            for (n, urls) in batches.enumerate() {
                tracing::info!(variant = variant.name, batch = n + 1, of = total, urls = urls.len(), "starting batch");
                let report = processor.process(&urls)?;
                variant_summary.batches.push(report);
            }
            summary.variants.push(variant_summary);
        }

        summary.elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        Ok(summary)
    }
}
