//! Static registry of the corpora this pipeline knows how to process.
//!
//! A dataset has one or more variants. Each variant names the remote URL list it is
//! built from, the JSON field path holding each document's source URL, and the substring
//! filters applied once when its manifest is built.

use crate::error::PipelineError;
use crate::fetch::FetchLayout;

/// One version-specific slice of a dataset.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VariantConfig {
    pub name: &'static str,
    /// Remote newline-delimited list of every file URL of this variant.
    pub url_list_url: &'static str,
    /// Dotted JSON path of the source URL inside each record, e.g. `metadata.url`.
    pub selector: &'static str,
    /// A URL is kept if it contains at least one of these substrings.
    pub inclusion_filters: &'static [&'static str],
    /// A URL is dropped if it contains any of these substrings.
    pub exclusion_filters: &'static [&'static str],
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DatasetConfig {
    pub name: &'static str,
    /// Suffix of the downloaded files that carry records, e.g. `.json.gz`. Downloads
    /// whose URL yields no file name are stored under a hash of the URL plus this suffix.
    pub file_suffix: &'static str,
    /// How downloaded files are laid out under the downloads scratch dir.
    pub layout: FetchLayout,
    /// Default number of manifest URLs per batch.
    pub batch_size: usize,
    pub variants: &'static [VariantConfig],
}

/// Variant name that does not get a suffix in the published repo id.
pub const DEFAULT_VARIANT: &str = "default";

impl DatasetConfig {
    /// `<dataset>_<variant>.txt`; names both the manifest and the ledger file.
    #[must_use]
    pub fn manifest_file_name(&self, variant: &VariantConfig) -> String {
        format!("{}_{}.txt", self.name, variant.name)
    }

    /// Hub dataset repo receiving this variant's batches.
    #[must_use]
    pub fn repo_id(&self, variant: &VariantConfig, namespace: &str) -> String {
        let mut repo = format!("{namespace}/{}_urls", self.name);
        if variant.name != DEFAULT_VARIANT {
            repo.push('_');
            repo.push_str(variant.name);
        }
        repo
    }

    #[must_use]
    pub fn variant(&self, name: &str) -> Option<&'static VariantConfig> {
        self.variants.iter().find(|v| v.name == name)
    }
}

pub static DOLMA: DatasetConfig = DatasetConfig {
    name: "dolma",
    file_suffix: ".json.gz",
    layout: FetchLayout::Flat,
    batch_size: 100,
    variants: &[
        VariantConfig {
            name: "v1.5",
            url_list_url: "https://huggingface.co/datasets/allenai/dolma/resolve/main/urls/v1_5.txt",
            selector: "metadata.url",
            inclusion_filters: &["c4-", "cc_"],
            exclusion_filters: &[],
        },
        VariantConfig {
            name: "v1.6",
            url_list_url: "https://huggingface.co/datasets/allenai/dolma/resolve/main/urls/v1_6.txt",
            selector: "metadata.url",
            inclusion_filters: &["c4-", "cc_"],
            exclusion_filters: &[],
        },
        VariantConfig {
            name: "v1.7",
            url_list_url: "https://huggingface.co/datasets/allenai/dolma/resolve/main/urls/v1_7.txt",
            selector: "metadata.url",
            inclusion_filters: &["c4-", "cc_", "falcon-refinedweb"],
            exclusion_filters: &[],
        },
    ],
};

pub static REDPAJAMA_1T: DatasetConfig = DatasetConfig {
    name: "redpajama-data-1t",
    file_suffix: ".jsonl",
    layout: FetchLayout::Flat,
    batch_size: 100,
    variants: &[VariantConfig {
        name: DEFAULT_VARIANT,
        url_list_url: "https://data.together.xyz/redpajama-data-1T/v1.0.0/urls.txt",
        selector: "meta.url",
        inclusion_filters: &["c4-train"],
        exclusion_filters: &[],
    }],
};

pub static REDPAJAMA_V2: DatasetConfig = DatasetConfig {
    name: "redpajama-data-v2",
    file_suffix: ".json.gz",
    // Files share names across snapshots; keep the path below the first segment.
    layout: FetchLayout::Nested { strip: 1 },
    batch_size: 10_000,
    variants: &[VariantConfig {
        name: DEFAULT_VARIANT,
        url_list_url: "https://data.together.xyz/redpajama-data-v2/v1.0.0/urls/document-urls.txt",
        selector: "url",
        inclusion_filters: &[".json.gz"],
        exclusion_filters: &[],
    }],
};

pub static DATASETS: [&DatasetConfig; 3] = [&DOLMA, &REDPAJAMA_1T, &REDPAJAMA_V2];

#[must_use]
pub fn dataset_names() -> Vec<&'static str> {
    DATASETS.iter().map(|d| d.name).collect()
}

/// Look a dataset up by name.
///
/// # Errors
///
/// Returns [`PipelineError::UnknownDataset`] listing the available names.
pub fn find_dataset(name: &str) -> Result<&'static DatasetConfig, PipelineError> {
    DATASETS
        .iter()
        .copied()
        .find(|d| d.name == name)
        .ok_or_else(|| PipelineError::UnknownDataset {
            name: name.to_string(),
            available: dataset_names().into_iter().map(String::from).collect(),
        })
}
