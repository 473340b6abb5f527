//! # oaharvest
//!
//! OpenAlex works harvester: cursor-paginated or random-sampled retrieval,
//! flattened into fixed-schema CSV batches.
//!
//! ## Modules
//!
//! - [`retriever`] - Cursor and sampling traversal, batching, retention
//! - [`flatten`] - Nested work record to flat CSV row
//! - [`openalex`] - OpenAlex `/works` client
//! - [`sink`] - Batch CSV writer
//! - [`query`] - Search conditions and filter expression
//! - [`config`] - Fetch mode and retriever tuning
//! - [`retry`] - Bounded exponential backoff
//! - [`json_path`] - Non-failing nested JSON lookups
//! - [`error`] - Custom error types
//!
//! ## Usage
//!
//! ```rust,no_run
//! use oaharvest::{CsvBatchWriter, Mode, OpenAlexClient, Query, Retriever, RetrieverConfig};
//! use std::num::NonZeroUsize;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let query = Query::new("machine learning", Some(2020), Some(2021));
//!     let mode = Mode::Sampling { cap: NonZeroUsize::new(50).unwrap_or(NonZeroUsize::MIN) };
//!     let mut retriever = Retriever::new(OpenAlexClient::new(None)?, RetrieverConfig::default());
//!     let mut sink = CsvBatchWriter::new("ml_papers");
//!     let summary = retriever.retrieve(&query, mode, &mut sink).await?;
//!     println!("Saved {} papers", summary.saved);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod flatten;
pub mod json_path;
pub mod openalex;
pub mod query;
pub mod retriever;
pub mod retry;
pub mod sink;

pub use config::{FetchMode, Mode, Retention, RetrieverConfig};
pub use error::{HarvestError, Result};
pub use flatten::{flatten, FlatRow};
pub use openalex::{OpenAlexClient, WorksApi};
pub use query::Query;
pub use retriever::{RecordBatch, RetrievalSummary, Retriever};
pub use sink::{BatchSink, CsvBatchWriter};
