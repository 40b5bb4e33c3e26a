//! Batch planning: pending manifest entries, sliced into fixed-size batches.
//!
//! The plan is recomputed from scratch on every run because both inputs (manifest and
//! ledger) are re-read each invocation. It is lazy: batches are materialized one at a
//! time as the runner asks for them.

use std::collections::HashSet;

/// Lazy, finite sequence of batches over the pending part of a manifest.
///
/// Produced by [`plan`].
pub struct BatchPlan<'a> {
    pending: Box<dyn Iterator<Item = &'a String> + 'a>,
    batch_size: usize,
    remaining: usize,
}

/// Plan the batches for `manifest` given the URLs already in `ledger`.
///
/// Entries present in `ledger` are skipped; the rest keep manifest order and are grouped
/// into consecutive batches of `batch_size` (the last one may be shorter). A
/// `batch_size` of zero is treated as one.
///
/// # Example
///
/// ```
/// use corpus_domains::planner::plan;
/// use std::collections::HashSet;
///
/// let manifest: Vec<String> = (1..=5).map(|i| format!("https://h/{i}")).collect();
/// let ledger: HashSet<String> = HashSet::from(["https://h/2".to_string()]);
/// let batches: Vec<Vec<String>> = plan(&manifest, &ledger, 3).collect();
/// assert_eq!(batches.len(), 2);
/// assert_eq!(batches[0], vec!["https://h/1", "https://h/3", "https://h/4"]);
/// ```
pub fn plan<'a>(
    manifest: &'a [String],
    ledger: &'a HashSet<String>,
    batch_size: usize,
) -> BatchPlan<'a> {
    let remaining = manifest.iter().filter(|u| !ledger.contains(*u)).count();
    BatchPlan {
        pending: Box::new(manifest.iter().filter(move |u| !ledger.contains(*u))),
        batch_size: batch_size.max(1),
        remaining,
    }
}

impl BatchPlan<'_> {
    /// Number of manifest URLs not yet handed out in a batch.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.remaining
    }

    /// Number of batches not yet handed out.
    #[must_use]
    pub fn batches_left(&self) -> usize {
        self.remaining.div_ceil(self.batch_size)
    }
}

impl Iterator for BatchPlan<'_> {
    type Item = Vec<String>;

    fn next(&mut self) -> Option<Self::Item> {
        let batch: Vec<String> = self
            .pending
            .by_ref()
            .take(self.batch_size)
            .cloned()
            .collect();
        if batch.is_empty() {
            return None;
        }
        self.remaining -= batch.len();
        Some(batch)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.batches_left();
        (n, Some(n))
    }
}
