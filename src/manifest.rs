//! Manifests: the filtered, ordered list of file URLs a variant is processed from.
//!
//! A manifest is built once (`--fetch-manifests`) from the variant's remote URL list and
//! then only read. Its order defines the batches, so it must not be rebuilt while a
//! ledger for it is in use unless the remote list is known to be unchanged.

use crate::config::PipelineConfig;
use crate::datasets::{DatasetConfig, VariantConfig};
use crate::error::{PipelineError, Result};
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use ureq::Agent;

/// Whether `line` passes the variant's filters.
///
/// A line is kept when it contains at least one inclusion filter (or there are none)
/// and none of the exclusion filters.
#[must_use]
pub fn keep_url(line: &str, variant: &VariantConfig) -> bool {
    let included = variant.inclusion_filters.is_empty()
        || variant.inclusion_filters.iter().any(|f| line.contains(f));
    included && !variant.exclusion_filters.iter().any(|f| line.contains(f))
}

/// Trimmed, non-empty `lines` that pass the variant's filters, in input order.
pub fn filter_urls<'a, I>(lines: I, variant: &VariantConfig) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    lines
        .into_iter()
        .map(str::trim)
        .filter(|line| !line.is_empty() && keep_url(line, variant))
        .map(str::to_owned)
        .collect()
}

/// Download the variant's URL list and write the filtered manifest to `path`.
///
/// The list is streamed line by line; the manifest replaces `path` only once it is
/// complete. Returns the number of URLs written.
///
/// # Errors
///
/// Returns [`PipelineError::ManifestFetch`] if the list cannot be downloaded, or an I/O
/// error if the manifest cannot be written.
pub fn fetch_manifest(agent: &Agent, variant: &VariantConfig, path: &Path) -> Result<usize> {
    let url = variant.url_list_url;
    let fetch_err = |reason: String| PipelineError::ManifestFetch {
        url: url.to_string(),
        reason,
    };

    tracing::info!(variant = variant.name, url, "fetching URL list");
    let response = agent.get(url).call().map_err(|err| fetch_err(err.to_string()))?;
    let reader = BufReader::new(response.into_body().into_reader());

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp = Path::new(&tmp_name);

    let mut out = BufWriter::new(File::create(tmp)?);
    let mut seen = 0usize;
    let mut kept = 0usize;
    for line in reader.lines() {
        let line = line.map_err(|err| fetch_err(err.to_string()))?;
        seen += 1;
        let line = line.trim();
        if line.is_empty() || !keep_url(line, variant) {
            continue;
        }
        writeln!(out, "{line}")?;
        kept += 1;
    }
    out.flush()?;
    out.get_ref().sync_all()?;
    drop(out);
    fs::rename(tmp, path)?;

    tracing::info!(variant = variant.name, seen, kept, path = %path.display(), "manifest written");
    Ok(kept)
}

/// Build the manifest of every variant of `dataset` under `config.work_dir`.
///
/// Returns the total number of URLs written.
///
/// # Errors
///
/// Stops at the first variant whose list cannot be fetched or written.
pub fn fetch_manifests(
    agent: &Agent,
    config: &PipelineConfig,
    dataset: &DatasetConfig,
) -> Result<usize> {
    let mut total = 0;
    for variant in dataset.variants {
        total += fetch_manifest(agent, variant, &config.manifest_path(dataset, variant))?;
    }
    Ok(total)
}

/// Read a manifest: trimmed, non-empty lines in file order.
///
/// # Errors
///
/// Returns [`PipelineError::ManifestMissing`] if `path` does not exist.
pub fn load_manifest(path: &Path) -> Result<Vec<String>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            return Err(PipelineError::ManifestMissing {
                path: path.to_path_buf(),
            });
        }
        Err(err) => return Err(err.into()),
    };

    let mut urls = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line?;
        let line = line.trim();
        if !line.is_empty() {
            urls.push(line.to_string());
        }
    }
    Ok(urls)
}
