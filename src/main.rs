use anyhow::{Result, bail};
use clap::Parser;
use corpus_domains::config::PipelineConfig;
use corpus_domains::datasets::find_dataset;
use corpus_domains::fetch::HttpTransfer;
use corpus_domains::logging::{LogFormat, init_logging};
use corpus_domains::manifest::fetch_manifests;
use corpus_domains::runner::Runner;
use corpus_domains::sink::HubSink;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "corpus-domains")]
#[command(about = "Harvest (url, domain) pairs from web-text corpora and publish them as Parquet")]
#[command(version)]
struct Cli {
    /// Dataset to process (dolma, redpajama-data-1t, redpajama-data-v2)
    dataset: String,

    /// Directory holding urls/ manifests and completed/ ledgers
    #[arg(long, default_value = ".")]
    work_dir: PathBuf,

    /// Root of the downloads/ and intermediate/ scratch directories
    #[arg(long, default_value = "./scratch")]
    scratch_dir: PathBuf,

    /// Hub user or organisation owning the published repos
    #[arg(long, env = "HUB_NAMESPACE")]
    namespace: Option<String>,

    /// URLs per batch (defaults to the dataset's own batch size)
    #[arg(long)]
    batch_size: Option<usize>,

    /// Concurrent downloads
    #[arg(long, default_value_t = 8)]
    download_workers: usize,

    /// Concurrent file extractions (defaults to the CPU count, at most 8)
    #[arg(long)]
    extract_workers: Option<usize>,

    /// Rebuild the manifests from the remote URL lists before processing
    #[arg(long)]
    fetch_manifests: bool,

    /// Only build the manifests, then exit
    #[arg(long)]
    setup_only: bool,

    /// Write a JSON run report to this path
    #[arg(long)]
    report: Option<PathBuf>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(err) = init_logging(cli.log_format) {
        eprintln!("Warning: logging not initialised: {err}");
    }

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %format!("{err:#}"), "run aborted");
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let dataset = find_dataset(&cli.dataset)?;

    let mut config = PipelineConfig {
        work_dir: cli.work_dir,
        scratch_root: cli.scratch_dir,
        hub_namespace: cli.namespace.unwrap_or_default(),
        batch_size: cli.batch_size,
        download_workers: cli.download_workers,
        ..PipelineConfig::default()
    };
    if let Some(workers) = cli.extract_workers {
        config.extract_workers = workers;
    }

    let transfer = HttpTransfer::new(&config);
    if cli.fetch_manifests || cli.setup_only {
        let urls = fetch_manifests(transfer.agent(), &config, dataset)?;
        tracing::info!(dataset = dataset.name, urls, "manifests ready");
    }
    if cli.setup_only {
        return Ok(());
    }

    if config.hub_namespace.trim().is_empty() {
        bail!("--namespace (or HUB_NAMESPACE) is required to publish");
    }
    let sink = HubSink::from_env()?;
    let runner = Runner::new(config, Arc::new(transfer), &sink)?;
    let summary = runner.run_dataset(dataset)?;

    summary.print();
    if let Some(path) = cli.report {
        summary.save_to_file(&path)?;
        tracing::info!(path = %path.display(), "report written");
    }
    Ok(())
}
