//! SQLite persistence for the causal memory store.
//!
//! Schema is created on write (`Database::open`/`open_in_memory` run
//! `init_schema` eagerly); query functions are plain functions over
//! `&rusqlite::Connection`, grouped by entity under `queries`, and
//! `Database` is a thin convenience wrapper over them.

mod db;
mod error;
mod queries;
mod schema;
mod vector_index;

pub use db::Database;
pub use error::{Error, Result};
pub use schema::SCHEMA_VERSION;
pub use vector_index::VectorIndex;

// Re-exported so callers that only depend on cmem-store still have the
// query module layout available for advanced use (transactions spanning
// multiple entities).
pub use queries::{chunk as chunk_queries, clock as clock_queries, cluster as cluster_queries, edge as edge_queries, vector as vector_queries};
