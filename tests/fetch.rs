use corpus_domains::PipelineError;
use corpus_domains::config::PipelineConfig;
use corpus_domains::fetch::{
    FakeTransfer, FetchLayout, Fetcher, HttpTransfer, Transfer, TransferErrorKind, UrlMapping,
};
use corpus_domains::testing::test_config;
use std::fs;
use std::io::{Read, Write};
use std::net::TcpListener;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

#[test]
fn flat_layout_keeps_the_file_name() {
    let dest = Path::new("/scratch/downloads/dolma");
    assert_eq!(
        FetchLayout::Flat.local_path("https://olmo-data.org/dolma/v1_5/cc_en_head-0000.json.gz", dest),
        Some(dest.join("cc_en_head-0000.json.gz"))
    );
    assert_eq!(FetchLayout::Flat.local_path("https://host.example/", dest), None);
    assert_eq!(FetchLayout::Flat.local_path("not a url", dest), None);
}

#[test]
fn nested_layout_strips_leading_segments() {
    let dest = Path::new("/dl");
    let url = "https://data.together.xyz/redpajama-data-v2/v1.0.0/documents/2023-06/0000/en_head.json.gz";
    assert_eq!(
        FetchLayout::Nested { strip: 1 }.local_path(url, dest),
        Some(dest.join("v1.0.0/documents/2023-06/0000/en_head.json.gz"))
    );
    assert_eq!(
        FetchLayout::Nested { strip: 9 }.local_path(url, dest),
        None
    );
}

#[test]
fn mapping_gives_every_url_its_own_file() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let urls = [
        "https://olmo-data.org/dolma-v1_7/c4-filtered/part-0000.json.gz",
        "https://olmo-data.org/dolma-v1_7/cc_en_head/part-0000.json.gz",
        "https://olmo-data.org/dolma-v1_7/c4-filtered/part-0001.json.gz",
        "https://olmo-data.org/dolma-v1_7/c4-filtered/part-0000.json.gz",
        "https://olmo-data.org/",
        "not a url",
    ];
    let mapping = UrlMapping::build(&urls, tmp.path(), FetchLayout::Flat, ".json.gz");

    assert_eq!(mapping.len(), 4);
    assert_eq!(
        mapping.url_for(&tmp.path().join("part-0000.json.gz")),
        Some(urls[0])
    );
    for url in &urls[..5] {
        assert!(mapping.contains_url(url), "{url} has no file");
    }
    assert!(!mapping.contains_url("not a url"));

    let (shared, _) = mapping
        .iter()
        .find(|(_, url)| *url == urls[1])
        .expect("colliding URL is mapped");
    let name = shared.file_name().and_then(|n| n.to_str()).unwrap_or_default();
    assert!(name.ends_with("-part-0000.json.gz"), "{name}");
    assert_eq!(shared.parent(), Some(tmp.path()));

    let (bare, _) = mapping
        .iter()
        .find(|(_, url)| *url == urls[4])
        .expect("path-less URL is mapped");
    assert!(bare.to_string_lossy().ends_with(".json.gz"));

    let saved = tmp.path().join("url_mapping_abc.json");
    mapping.save(&saved)?;
    assert_eq!(UrlMapping::load(&saved)?, mapping);
    assert!(UrlMapping::load(&tmp.path().join("missing.json"))?.is_empty());
    Ok(())
}

#[test]
fn fetch_downloads_everything_once() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let config = test_config(tmp.path());
    let transfer = Arc::new(FakeTransfer::new());
    let urls: Vec<String> = (0..6).map(|i| format!("https://h.example/f{i}.jsonl")).collect();
    for url in &urls {
        transfer.serve(url, format!("{{\"url\":\"{url}\"}}\n"));
    }
    let dest = tmp.path().join("dl");
    let mapping = UrlMapping::build(&urls, &dest, FetchLayout::Flat, "");

    let fetcher = Fetcher::new(transfer.clone(), &config)?;
    let report = fetcher.fetch(&mapping, "b1")?;
    assert_eq!(report.downloaded, 6);
    assert_eq!(report.skipped, 0);
    assert_eq!(report.attempts, 1);
    assert!(dest.join("f3.jsonl").exists());

    // Second call finds everything in place.
    let again = fetcher.fetch(&mapping, "b1")?;
    assert_eq!(again.downloaded, 0);
    assert_eq!(again.skipped, 6);
    assert_eq!(transfer.total_downloads(), 6);
    Ok(())
}

#[test]
fn existing_files_are_not_clobbered() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let config = test_config(tmp.path());
    let transfer = Arc::new(FakeTransfer::new());
    let url = "https://h.example/kept.jsonl";
    transfer.serve(url, "new");

    let dest = tmp.path().join("dl");
    fs::create_dir_all(&dest)?;
    fs::write(dest.join("kept.jsonl"), "old")?;

    let mapping = UrlMapping::build(&[url], &dest, FetchLayout::Flat, "");
    Fetcher::new(transfer.clone(), &config)?.fetch(&mapping, "b")?;
    assert_eq!(fs::read_to_string(dest.join("kept.jsonl"))?, "old");
    assert_eq!(transfer.downloads(url), 0);
    Ok(())
}

#[test]
fn transient_failures_are_retried_at_batch_level() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let config = test_config(tmp.path());
    let transfer = Arc::new(FakeTransfer::new());
    let flaky = "https://h.example/flaky.jsonl";
    let steady = "https://h.example/steady.jsonl";
    transfer.serve(flaky, "{}\n");
    transfer.serve(steady, "{}\n");
    transfer.fail_times(flaky, 2);

    let mapping = UrlMapping::build(&[flaky, steady], &tmp.path().join("dl"), FetchLayout::Flat, "");
    let report = Fetcher::new(transfer.clone(), &config)?.fetch(&mapping, "b")?;

    assert_eq!(report.attempts, 3);
    assert_eq!(report.downloaded, 2);
    assert_eq!(transfer.downloads(flaky), 3);
    assert_eq!(transfer.downloads(steady), 1);
    Ok(())
}

#[test]
fn persistent_failure_fails_the_batch() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let config = test_config(tmp.path());
    let transfer = Arc::new(FakeTransfer::new());
    let ok = "https://h.example/ok.jsonl";
    transfer.serve(ok, "{}\n");
    let gone = "https://h.example/gone.jsonl";

    let mapping = UrlMapping::build(&[ok, gone], &tmp.path().join("dl"), FetchLayout::Flat, "");
    let err = Fetcher::new(transfer.clone(), &config)?
        .fetch(&mapping, "deadbeef")
        .unwrap_err();

    match err {
        PipelineError::BatchDownloadFailed {
            batch_id,
            failed,
            total,
            attempts,
        } => {
            assert_eq!(batch_id, "deadbeef");
            assert_eq!((failed, total, attempts), (1, 2, config.batch_download_attempts));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(transfer.downloads(ok), 1);
    Ok(())
}

#[test]
fn refetch_replaces_the_local_file() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let config = test_config(tmp.path());
    let transfer = Arc::new(FakeTransfer::new());
    let url = "https://h.example/f.jsonl";
    transfer.serve_sequence(url, vec![b"first".to_vec(), b"second".to_vec()]);

    let dest = tmp.path().join("dl");
    let mapping = UrlMapping::build(&[url], &dest, FetchLayout::Flat, "");
    let fetcher = Fetcher::new(transfer.clone(), &config)?;
    fetcher.fetch(&mapping, "b")?;

    let path = dest.join("f.jsonl");
    fs::write(dest.join("f.jsonl.part"), "stale")?;
    fetcher.refetch(url, &path)?;
    assert_eq!(fs::read_to_string(&path)?, "second");
    assert!(!dest.join("f.jsonl.part").exists());

    let err = fetcher.refetch("https://h.example/unknown.jsonl", &dest.join("u.jsonl")).unwrap_err();
    assert_eq!(err.kind, TransferErrorKind::NotFound);
    assert!(!err.is_retryable());
    Ok(())
}

#[test]
fn stalled_body_times_out() -> anyhow::Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    let addr = listener.local_addr()?;
    thread::spawn(move || {
        if let Ok((mut stream, _)) = listener.accept() {
            let mut request = [0u8; 4096];
            let _ = stream.read(&mut request);
            let _ = stream.write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 1000\r\n\r\npartial");
            let _ = stream.flush();
            thread::sleep(Duration::from_secs(10));
        }
    });

    let tmp = tempfile::tempdir()?;
    let config = PipelineConfig {
        read_timeout: Duration::from_millis(300),
        ..test_config(tmp.path())
    };
    let dest = tmp.path().join("shard.json.gz");
    let started = Instant::now();
    let err = HttpTransfer::new(&config)
        .download(&format!("http://{addr}/shard.json.gz"), &dest)
        .unwrap_err();

    assert!(started.elapsed() < Duration::from_secs(5), "took {:?}", started.elapsed());
    assert_eq!(err.kind, TransferErrorKind::Network);
    assert!(err.is_retryable());
    assert!(!dest.exists());
    Ok(())
}
