//! Runtime assembly for the causal memory store: the retrieval assembler
//! (seed search -> chain walk or traversal fallback -> formatted output),
//! the cluster lifecycle manager (full re-cluster, noise reassignment,
//! label carry-forward), and the debounced/full pruners. Persistence comes
//! from `cmem-store`, graph algorithms from `cmem-graph`; this crate wires
//! them together into a usable workspace supervisor.

mod cluster_manager;
mod config;
mod error;
mod pruner;
mod retrieval;

pub use cluster_manager::{assign_online, recluster, ClusterRunReport};
pub use config::{resolve_workspace_path, ClusteringConfig, MemoryConfig, PruningConfig, RetrievalConfig};
pub use error::{Error, Result};
pub use pruner::{sweep_dangling_edges, FullPruneProgress, FullPruneStatus, FullPruner, Pruner};
pub use retrieval::{assemble, RetrievalHit, RetrievalMode, RetrievalRequest, RetrievalResult};

pub use cmem_core::cancel::CancelToken;
