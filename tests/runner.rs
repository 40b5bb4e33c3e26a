use anyhow::Result;
use corpus_domains::config::PipelineConfig;
use corpus_domains::datasets::REDPAJAMA_1T;
use corpus_domains::fetch::FakeTransfer;
use corpus_domains::ledger::ProgressLedger;
use corpus_domains::runner::Runner;
use corpus_domains::sink::FakeSink;
use corpus_domains::testing::{record_line, test_config, write_manifest};
use corpus_domains::PipelineError;
use std::sync::Arc;

const REPO: &str = "tester/redpajama-data-1t_urls";

fn shard_url(i: usize) -> String {
    format!("https://data.together.xyz/redpajama-data-1T/v1.0.0/c4/c4-train.{i:05}-of-01024.jsonl")
}

/// Manifest of `n` shards, each served with two documents.
fn setup(config: &PipelineConfig, transfer: &FakeTransfer, n: usize) -> Result<Vec<String>> {
    let urls: Vec<String> = (0..n).map(shard_url).collect();
    write_manifest(config, &REDPAJAMA_1T, &REDPAJAMA_1T.variants[0], &urls)?;
    for (i, url) in urls.iter().enumerate() {
        transfer.serve(url, shard_body(i));
    }
    Ok(urls)
}

fn shard_body(i: usize) -> String {
    let mut body = record_line("meta.url", &format!("https://blog{i}.example.com/post"));
    body.push('\n');
    body.push_str(&record_line("meta.url", &format!("http://news.bbc.co.uk/{i}")));
    body.push('\n');
    body
}

fn ledger(config: &PipelineConfig) -> ProgressLedger {
    ProgressLedger::new(config.ledger_path(&REDPAJAMA_1T, &REDPAJAMA_1T.variants[0]))
}

#[test]
fn runs_every_batch_in_manifest_order() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let config = test_config(tmp.path());
    let transfer = Arc::new(FakeTransfer::new());
    let sink = FakeSink::new();
    let urls = setup(&config, &transfer, 250)?;

    let runner = Runner::new(config.clone(), transfer.clone(), &sink)?;
    let summary = runner.run_dataset(&REDPAJAMA_1T)?;

    assert_eq!(summary.dataset, "redpajama-data-1t");
    assert_eq!(summary.batches(), 3);
    assert_eq!(summary.urls_ledgered(), 250);
    assert_eq!(summary.rows(), 500);
    let sizes: Vec<usize> = summary.variants[0].batches.iter().map(|b| b.urls).collect();
    assert_eq!(sizes, vec![100, 100, 50]);
    assert_eq!(summary.variants[0].repo_id, REPO);

    let commits = sink.commits();
    assert_eq!(commits.len(), 3);
    assert!(commits.iter().all(|c| c.repo_id == REPO));
    assert_eq!(ledger(&config).load()?.len(), urls.len());
    assert_eq!(transfer.total_downloads(), 250);
    Ok(())
}

#[test]
fn rerun_after_completion_does_nothing() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let config = test_config(tmp.path());
    let transfer = Arc::new(FakeTransfer::new());
    let sink = FakeSink::new();
    setup(&config, &transfer, 120)?;

    Runner::new(config.clone(), transfer.clone(), &sink)?.run_dataset(&REDPAJAMA_1T)?;
    let downloads = transfer.total_downloads();
    let commits = sink.commits().len();

    let summary = Runner::new(config, transfer.clone(), &sink)?.run_dataset(&REDPAJAMA_1T)?;
    assert_eq!(summary.batches(), 0);
    assert_eq!(summary.variants[0].pending, 0);
    assert_eq!(transfer.total_downloads(), downloads);
    assert_eq!(sink.commits().len(), commits);
    Ok(())
}

#[test]
fn failed_batch_stops_the_run_and_resumes_there() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let config = PipelineConfig {
        batch_size: Some(10),
        ..test_config(tmp.path())
    };
    let transfer = Arc::new(FakeTransfer::new());
    let sink = FakeSink::new();
    let urls = setup(&config, &transfer, 30)?;
    // Nothing answers for one URL of the second batch.
    let transfer_missing = Arc::new(FakeTransfer::new());
    for (i, url) in urls.iter().enumerate() {
        if i != 15 {
            transfer_missing.serve(url, shard_body(i));
        }
    }

    let err = Runner::new(config.clone(), transfer_missing, &sink)?
        .run_dataset(&REDPAJAMA_1T)
        .unwrap_err();
    assert!(matches!(err, PipelineError::BatchDownloadFailed { .. }), "{err}");
    let done = ledger(&config).load()?;
    assert_eq!(done.len(), 10);
    assert!(urls[..10].iter().all(|u| done.contains(u)));
    assert_eq!(sink.commits().len(), 1);

    let summary = Runner::new(config.clone(), transfer.clone(), &sink)?.run_dataset(&REDPAJAMA_1T)?;
    assert_eq!(summary.batches(), 2);
    assert_eq!(summary.variants[0].pending, 20);
    for url in &urls[..10] {
        assert_eq!(transfer.downloads(url), 0, "{url} was already ledgered");
    }
    assert_eq!(ledger(&config).load()?.len(), 30);
    Ok(())
}

#[test]
fn missing_manifest_is_a_run_error() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let config = test_config(tmp.path());
    let sink = FakeSink::new();

    let err = Runner::new(config, Arc::new(FakeTransfer::new()), &sink)?
        .run_dataset(&REDPAJAMA_1T)
        .unwrap_err();
    assert!(matches!(err, PipelineError::ManifestMissing { .. }), "{err}");
    assert!(!err.is_batch_scoped());
    assert!(sink.commits().is_empty());
    Ok(())
}

#[test]
fn unreadable_ledger_aborts_before_any_batch() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let config = test_config(tmp.path());
    let transfer = Arc::new(FakeTransfer::new());
    let sink = FakeSink::new();
    setup(&config, &transfer, 5)?;

    let path = ledger(&config).path().to_path_buf();
    std::fs::create_dir_all(path.parent().expect("ledger has a parent"))?;
    std::fs::write(&path, b"this is not a url\n")?;

    let err = Runner::new(config, transfer.clone(), &sink)?
        .run_dataset(&REDPAJAMA_1T)
        .unwrap_err();
    assert!(matches!(err, PipelineError::LedgerUnreadable { .. }), "{err}");
    assert_eq!(transfer.total_downloads(), 0);
    Ok(())
}
