#![cfg(feature = "compression-gzip")]

use corpus_domains::batch::{BatchProcessor, BatchState, batch_id, remote_name};
use corpus_domains::config::PipelineConfig;
use corpus_domains::datasets::{DOLMA, VariantConfig};
use corpus_domains::domain::extract_domain_str;
use corpus_domains::fetch::{FakeTransfer, Fetcher};
use corpus_domains::io::parquet::read_rows;
use corpus_domains::ledger::ProgressLedger;
use corpus_domains::sink::FakeSink;
use corpus_domains::testing::{gzip_payload, record_line, test_config, truncated, xml_error_payload};
use corpus_domains::PipelineError;
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

struct Harness {
    tmp: TempDir,
    config: PipelineConfig,
    variant: &'static VariantConfig,
    transfer: Arc<FakeTransfer>,
    sink: FakeSink,
}

impl Harness {
    fn new() -> anyhow::Result<Self> {
        let tmp = tempfile::tempdir()?;
        let config = test_config(tmp.path());
        Ok(Self {
            tmp,
            config,
            variant: DOLMA.variant("v1.5").expect("dolma v1.5"),
            transfer: Arc::new(FakeTransfer::new()),
            sink: FakeSink::new(),
        })
    }

    fn ledger(&self) -> ProgressLedger {
        ProgressLedger::new(self.config.ledger_path(&DOLMA, self.variant))
    }

    /// Serve a good shard for `url` holding `n` documents; returns the document URLs.
    fn serve_shard(&self, url: &str, n: usize) -> Vec<String> {
        let docs: Vec<String> = (0..n)
            .map(|i| format!("https://www.site{i}.example.com/{}", url.rsplit('/').next().unwrap_or_default()))
            .collect();
        self.transfer.serve(url, shard_bytes(&docs));
        docs
    }

    /// Run one batch through a fresh processor.
    fn process(&self, urls: &[String]) -> corpus_domains::Result<corpus_domains::metrics::BatchReport> {
        let fetcher = Fetcher::new(self.transfer.clone(), &self.config)?;
        let ledger = self.ledger();
        let processor =
            BatchProcessor::new(&self.config, &DOLMA, self.variant, &fetcher, &self.sink, &ledger)?;
        let result = processor.process(urls);
        assert!(processor.scratch().is_empty(), "scratch must be purged on every exit path");
        result
    }

    fn published_rows(&self, id: &str) -> anyhow::Result<Vec<corpus_domains::DomainRow>> {
        let bytes = self
            .sink
            .file("tester/dolma_urls_v1.5", &remote_name(id))
            .ok_or_else(|| anyhow::anyhow!("artifact not published"))?;
        let local = self.tmp.path().join(format!("published_{id}.parquet"));
        fs::write(&local, bytes)?;
        read_rows(&local)
    }
}

fn shard_bytes(docs: &[String]) -> Vec<u8> {
    let lines: Vec<String> = docs.iter().map(|u| record_line("metadata.url", u)).collect();
    gzip_payload(&lines)
}

fn shard_urls(n: usize) -> Vec<String> {
    (0..n)
        .map(|i| format!("https://olmo-data.org/dolma-v1_5/cc_en_head/cc_en_head-{i:04}.json.gz"))
        .collect()
}

#[test]
fn batch_id_is_deterministic() {
    let urls = shard_urls(3);
    let id = batch_id(&urls);
    assert_eq!(id.len(), 16);
    assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    assert_eq!(id, batch_id(&urls.clone()));

    let mut reversed = urls.clone();
    reversed.reverse();
    assert_ne!(id, batch_id(&reversed));
}

#[test]
fn state_names() {
    assert_eq!(BatchState::Ledgering.to_string(), "ledgering");
    assert!(BatchState::Purged.is_terminal());
    assert!(BatchState::Failed.is_terminal());
    assert!(!BatchState::Publishing.is_terminal());
}

#[test]
fn successful_batch_is_published_then_ledgered() -> anyhow::Result<()> {
    let h = Harness::new()?;
    let urls = shard_urls(3);
    let mut docs = Vec::new();
    for url in &urls {
        docs.extend(h.serve_shard(url, 4));
    }

    let report = h.process(&urls)?;
    let id = batch_id(&urls);
    assert_eq!(report.batch_id, id);
    assert_eq!(report.urls, 3);
    assert_eq!(report.downloaded, 3);
    assert_eq!(report.rows, 12);
    assert_eq!(report.ledgered, 3);
    assert_eq!((report.refetches, report.files_dropped, report.wrappers_skipped), (0, 0, 0));

    let commits = h.sink.commits();
    assert_eq!(commits.len(), 1);
    assert_eq!(commits[0].repo_id, "tester/dolma_urls_v1.5");
    assert_eq!(commits[0].path_in_repo, format!("batch_{id}.parquet"));
    assert_eq!(commits[0].message, format!("Add batch batch_{id} of dolma_v1.5.txt"));

    let rows = h.published_rows(&id)?;
    assert_eq!(rows.len(), 12);
    for row in &rows {
        assert!(!row.url.is_empty());
        assert_eq!(extract_domain_str(&row.url).as_deref(), Some(row.domain.as_str()));
    }
    let mut published: Vec<String> = rows.into_iter().map(|r| r.url).collect();
    published.sort();
    docs.sort();
    assert_eq!(published, docs);

    let ledgered = h.ledger().load()?;
    assert_eq!(ledgered.len(), 3);
    assert!(urls.iter().all(|u| ledgered.contains(u)));
    Ok(())
}

#[test]
fn corrupt_file_is_recovered_with_exactly_one_refetch() -> anyhow::Result<()> {
    let h = Harness::new()?;
    let urls = shard_urls(2);
    h.serve_shard(&urls[0], 3);
    let docs: Vec<String> = (0..200)
        .map(|i| format!("https://doc{i}.example.org/page"))
        .collect();
    let good = shard_bytes(&docs);
    h.transfer
        .serve_sequence(&urls[1], vec![truncated(&good), good.clone()]);

    let report = h.process(&urls)?;
    assert_eq!(report.refetches, 1);
    assert_eq!(report.files_dropped, 0);
    assert_eq!(report.rows, 203);
    assert_eq!(h.transfer.downloads(&urls[1]), 2);
    assert_eq!(h.ledger().load()?.len(), 2);
    Ok(())
}

#[test]
fn persistently_corrupt_file_is_dropped_and_batch_succeeds() -> anyhow::Result<()> {
    let h = Harness::new()?;
    let urls = shard_urls(2);
    h.serve_shard(&urls[0], 5);
    let docs: Vec<String> = (0..200)
        .map(|i| format!("https://doc{i}.example.org/page"))
        .collect();
    h.transfer.serve(&urls[1], truncated(&shard_bytes(&docs)));

    let report = h.process(&urls)?;
    assert_eq!(report.refetches, h.config.extract_retries as usize);
    assert_eq!(report.files_dropped, 1);
    assert_eq!(report.rows, 5);
    assert_eq!(
        h.transfer.downloads(&urls[1]),
        1 + h.config.extract_retries as usize
    );

    // The batch is still atomic: every URL is ledgered.
    let ledgered = h.ledger().load()?;
    assert!(urls.iter().all(|u| ledgered.contains(u)));
    Ok(())
}

#[test]
fn error_wrapper_is_excluded_and_never_refetched() -> anyhow::Result<()> {
    let h = Harness::new()?;
    let urls = shard_urls(2);
    h.serve_shard(&urls[0], 2);
    h.transfer
        .serve(&urls[1], xml_error_payload("SlowDown", "Please reduce your request rate."));

    let report = h.process(&urls)?;
    assert_eq!(report.wrappers_skipped, 1);
    assert_eq!(report.refetches, 0);
    assert_eq!(report.files_dropped, 0);
    assert_eq!(report.rows, 2);
    assert_eq!(h.transfer.downloads(&urls[1]), 1);
    assert_eq!(h.ledger().load()?.len(), 2);
    Ok(())
}

#[test]
fn download_failure_leaves_ledger_untouched() -> anyhow::Result<()> {
    let h = Harness::new()?;
    let urls = shard_urls(3);
    h.serve_shard(&urls[0], 1);
    h.serve_shard(&urls[1], 1);
    // urls[2] is never served.

    let err = h.process(&urls).unwrap_err();
    assert!(matches!(err, PipelineError::BatchDownloadFailed { failed: 1, total: 3, .. }), "{err}");
    assert!(err.is_batch_scoped());
    assert!(h.ledger().load()?.is_empty());
    assert!(h.sink.commits().is_empty());
    Ok(())
}

#[test]
fn publish_failure_leaves_ledger_untouched() -> anyhow::Result<()> {
    let h = Harness::new()?;
    let urls = shard_urls(2);
    for url in &urls {
        h.serve_shard(url, 2);
    }
    h.sink.fail_uploads(true);

    let err = h.process(&urls).unwrap_err();
    assert!(matches!(err, PipelineError::PublishFailed { .. }), "{err}");
    assert!(h.ledger().load()?.is_empty());

    // A retry of the same batch after the sink recovers publishes under the same name.
    h.sink.fail_uploads(false);
    let report = h.process(&urls)?;
    assert_eq!(report.remote_path, remote_name(&batch_id(&urls)));
    assert_eq!(h.ledger().load()?.len(), 2);
    Ok(())
}

#[test]
fn batch_without_usable_records_still_publishes() -> anyhow::Result<()> {
    let h = Harness::new()?;
    let urls = shard_urls(1);
    h.transfer.serve(&urls[0], gzip_payload(&["{\"metadata\":{\"url\":null}}"]));

    let report = h.process(&urls)?;
    assert_eq!(report.rows, 0);
    assert!(h.published_rows(&batch_id(&urls))?.is_empty());
    assert_eq!(h.ledger().load()?.len(), 1);
    Ok(())
}

#[test]
fn record_mentioning_xml_is_published_not_skipped() -> anyhow::Result<()> {
    let h = Harness::new()?;
    let urls = shard_urls(1);
    let line = r#"{"text":"How to start a feed: <?xml version=\"1.0\"?> then <rss>","metadata":{"url":"https://blog.example.com/rss-howto"}}"#;
    h.transfer.serve(&urls[0], gzip_payload(&[line]));

    let report = h.process(&urls)?;
    assert_eq!(report.wrappers_skipped, 0);
    assert_eq!(report.rows, 1);
    let rows = h.published_rows(&batch_id(&urls))?;
    assert_eq!(rows[0].url, "https://blog.example.com/rss-howto");
    assert_eq!(rows[0].domain, "example.com");
    assert!(h.ledger().load()?.contains(&urls[0]));
    Ok(())
}

#[test]
fn urls_sharing_a_file_name_are_both_downloaded() -> anyhow::Result<()> {
    let h = Harness::new()?;
    let urls = vec![
        "https://olmo-data.org/dolma-v1_7/c4-filtered/part-0000.json.gz".to_string(),
        "https://olmo-data.org/dolma-v1_7/cc_en_head/part-0000.json.gz".to_string(),
    ];
    h.serve_shard(&urls[0], 1);
    h.transfer.serve(
        &urls[1],
        shard_bytes(&["https://other.example.org/page".to_string()]),
    );

    let report = h.process(&urls)?;
    assert_eq!(report.files, 2);
    assert_eq!(report.rows, 2);
    assert_eq!(h.transfer.downloads(&urls[0]), 1);
    assert_eq!(h.transfer.downloads(&urls[1]), 1);
    assert_eq!(report.ledgered, 2);

    let published: Vec<String> = h
        .published_rows(&batch_id(&urls))?
        .into_iter()
        .map(|r| r.url)
        .collect();
    assert!(published.contains(&"https://other.example.org/page".to_string()));
    Ok(())
}

#[test]
fn unparseable_url_is_not_ledgered() -> anyhow::Result<()> {
    let h = Harness::new()?;
    let mut urls = shard_urls(1);
    h.serve_shard(&urls[0], 1);
    urls.push("olmo data dump part 7".to_string());

    let report = h.process(&urls)?;
    assert_eq!(report.urls, 2);
    assert_eq!(report.ledgered, 1);
    let ledgered = h.ledger().load()?;
    assert!(ledgered.contains(&urls[0]));
    assert_eq!(ledgered.len(), 1);
    Ok(())
}

#[test]
fn extraction_failure_aborts_the_batch() -> anyhow::Result<()> {
    let h = Harness::new()?;
    let urls = shard_urls(1);
    h.serve_shard(&urls[0], 3);

    // A directory where the per-file output goes makes the write fail.
    let downloads = h.config.scratch_for(&DOLMA).downloads().to_path_buf();
    fs::create_dir_all(downloads.join("cc_en_head-0000.json.gz.parquet"))?;

    let err = h.process(&urls).unwrap_err();
    assert!(matches!(err, PipelineError::ExtractionFailed { .. }), "{err}");
    assert!(err.is_batch_scoped());
    assert!(h.sink.commits().is_empty());
    assert!(h.ledger().load()?.is_empty());
    Ok(())
}
