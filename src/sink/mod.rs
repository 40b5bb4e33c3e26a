//! Publishing of batch artifacts to a remote dataset repository.
//!
//! The batch processor only sees the [`DatasetSink`] trait. Two implementations ship:
//!
//! - [`HubSink`] - Hugging Face Hub dataset repos over HTTP
//! - [`FakeSink`] - in-memory storage for tests, with injectable upload failures
//!
//! Like the rest of the crate the interface is synchronous; a call returns once the
//! remote side has acknowledged the commit.
//!
//! ## Usage
//!
//! ```
//! use corpus_domains::sink::{DatasetSink, FakeSink};
//!
//! let sink = FakeSink::new();
//! sink.ensure_repo("me/dolma_urls_v1.5").unwrap();
//! sink.ensure_repo("me/dolma_urls_v1.5").unwrap();
//! assert!(sink.has_repo("me/dolma_urls_v1.5"));
//! ```

pub mod fake;
pub mod hub;
pub mod traits;

pub use fake::{Commit, FakeSink};
pub use hub::HubSink;
pub use traits::{DatasetSink, ErrorKind, SinkError, SinkResult};
