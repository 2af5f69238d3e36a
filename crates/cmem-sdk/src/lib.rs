//! cmem-sdk: the public async facade for the causal memory store.
//!
//! # Overview
//!
//! A conversational agent accumulates chunks of dialogue linked by causal and
//! referential edges. This crate exposes the handful of operations an agent
//! runtime actually needs against that graph — recall, predict, cluster,
//! prune — without exposing the synchronous storage and graph-algorithm
//! layers underneath.
//!
//! # Quickstart
//!
//! ```no_run
//! use cmem_sdk::{Client, RecallRequest, CancelToken};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let client = Client::connect_default().await?;
//!
//! let query_embedding = vec![0.1_f32; 384];
//! let outcome = client
//!     .recall(RecallRequest::new(query_embedding).project("acme-web"), &CancelToken::new())
//!     .await;
//! println!("{}", outcome.text());
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! This crate is a facade over:
//! - `cmem-types`: core domain models (Chunk, Edge, Cluster, VectorClock)
//! - `cmem-core`: decay kernels, angular distance, cancellation
//! - `cmem-store`: SQLite persistence and the in-memory vector index
//! - `cmem-graph`: traversal, chain walking, HDBSCAN clustering
//! - `cmem-runtime`: retrieval assembly, cluster lifecycle, pruning
//!
//! Everything below this crate is synchronous. `Client` is the only place
//! `tokio` appears in the workspace: every call crosses into a
//! `spawn_blocking` task so an agent runtime can await it without stalling
//! its executor.
//!
//! # Usage Patterns
//!
//! ## Recall never crashes the caller
//!
//! ```no_run
//! use cmem_sdk::{Client, RecallRequest, CancelToken, RecallOutcome};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let client = Client::connect_default().await?;
//! let outcome = client.recall(RecallRequest::new(vec![0.0; 384]), &CancelToken::new()).await;
//! match outcome {
//!     RecallOutcome::Hit(result) => println!("{} chunks", result.chunks.len()),
//!     RecallOutcome::Degraded(d) => println!("degraded: {}", d.summary),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Cancelling a long-running cluster pass
//!
//! ```no_run
//! use cmem_sdk::{Client, CancelToken};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let client = Client::connect_default().await?;
//! let cancel = CancelToken::new();
//! let cancel_clone = cancel.clone();
//! tokio::spawn(async move {
//!     tokio::time::sleep(std::time::Duration::from_secs(30)).await;
//!     cancel_clone.cancel();
//! });
//! let _ = client.cluster(&cancel).await;
//! # Ok(())
//! # }
//! ```

mod client;
mod contracts;
mod error;
mod types;

pub use client::Client;
pub use contracts::{EmbedError, Embedder, IngestChunk};
pub use error::{degraded_hint, Error, Result};
pub use types::{DegradedResult, RecallOutcome, RecallRequest};

pub use cmem_core::cancel::CancelToken;
pub use cmem_runtime::{ClusterRunReport, FullPruneProgress, FullPruneStatus};
pub use cmem_types::DecayRange;

/// Installs a `tracing` subscriber reading its filter from `RUST_LOG`,
/// falling back to `info` for this crate's logs and `warn` elsewhere. Safe
/// to call more than once; later calls are no-ops.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn,cmem_sdk=info,cmem_runtime=info"));
    let _ = fmt().with_env_filter(filter).try_init();
}
