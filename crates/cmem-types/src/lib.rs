//! Core domain types for the causal memory store.
//!
//! This crate defines the data model only (chunks, edges, clusters, vector
//! clocks, decay config, embedding wire format) plus the shared error type.
//! Persistence lives in `cmem-store`; pure algebra over these types (clock
//! operations, decay weights, angular distance) lives in `cmem-core`.

mod chunk;
mod cluster;
mod clock;
mod decay;
mod edge;
mod embedding;
mod error;

pub use chunk::{Chunk, NewChunk, SessionSummary};
pub use cluster::{membership_hash, Cluster, ClusterAssignment};
pub use clock::VectorClock;
pub use decay::{DecayConfig, DecayRange, DecaySettings, DecayTier};
pub use edge::{Edge, EdgeDirection, ReferenceType};
pub use embedding::{decode_embedding, encode_embedding, VectorRecord};
pub use error::{Error, Result};
