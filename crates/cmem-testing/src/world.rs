//! `MemoryWorld` pattern for declarative graph test setup.
//!
//! Builds an in-memory [`Database`] populated with chunks, edges, and
//! vectors in a single fluent chain, so a test can describe the causal
//! graph it needs without re-deriving id/timestamp plumbing by hand.

use chrono::{DateTime, Utc};
use cmem_store::{Database, VectorIndex};
use cmem_types::{Chunk, Edge, EdgeDirection};

use crate::fixtures::{self, ChunkBuilder};

/// An in-memory store plus an index of the chunks/edges inserted into it,
/// keyed by the short label a test gave them.
pub struct MemoryWorld {
    pub db: Database,
    pub index: VectorIndex,
    chunks_by_label: std::collections::HashMap<String, Chunk>,
}

impl Default for MemoryWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryWorld {
    pub fn new() -> Self {
        Self {
            db: Database::open_in_memory().expect("open in-memory database"),
            index: VectorIndex::new(),
            chunks_by_label: std::collections::HashMap::new(),
        }
    }

    /// Insert a chunk built from its defaults, overridden by `configure`.
    pub fn with_chunk(
        mut self,
        label: &str,
        session_slug: &str,
        configure: impl FnOnce(ChunkBuilder) -> ChunkBuilder,
    ) -> Self {
        let chunk = configure(ChunkBuilder::new(label, session_slug)).build();
        self.db.insert_chunk(&chunk).expect("insert fixture chunk");
        self.chunks_by_label.insert(label.to_string(), chunk);
        self
    }

    /// Insert a chunk with only its label and session, using all defaults.
    pub fn with_plain_chunk(self, label: &str, session_slug: &str) -> Self {
        self.with_chunk(label, session_slug, |b| b)
    }

    /// Insert an edge between two already-inserted chunk labels.
    pub fn with_edge(mut self, label: &str, source: &str, target: &str, direction: EdgeDirection, weight: f64) -> Self {
        let source_chunk = self.chunk(source).clone();
        let target_chunk = self.chunk(target).clone();
        let edge = fixtures::edge(label, &source_chunk, &target_chunk, direction, weight);
        self.db.insert_edge(&edge).expect("insert fixture edge");
        self
    }

    /// Insert a deterministic embedding for an already-inserted chunk label.
    pub fn with_vector(mut self, chunk_label: &str, seed: u64, dims: usize) -> Self {
        let chunk_id = self.chunk(chunk_label).id.clone();
        let project = self.chunk(chunk_label).session_slug.clone();
        let embedding = fixtures::deterministic_embedding(seed, dims);
        self.index
            .insert(&self.db, &chunk_id, embedding, &project)
            .expect("insert fixture vector");
        self
    }

    /// Build a straight-line causal chain of `count` chunks in `session_slug`,
    /// connected by backward edges each pointing at the previous chunk, with
    /// strictly ascending start times so chain-walk order is unambiguous.
    pub fn with_chain(mut self, label_prefix: &str, session_slug: &str, count: usize, weight: f64) -> Self {
        let mut previous: Option<String> = None;
        for i in 0..count {
            let label = format!("{label_prefix}-{i}");
            let start = fixtures::offset_secs(i as i64 * 60);
            let end = start + chrono::Duration::seconds(30);
            self = self.with_chunk(&label, session_slug, |b| b.at(start, end));
            if let Some(prev_label) = previous.take() {
                let edge_label = format!("{label_prefix}-edge-{i}");
                self = self.with_edge(&edge_label, &label, &prev_label, EdgeDirection::Backward, weight);
            }
            previous = Some(label);
        }
        self
    }

    pub fn chunk(&self, label: &str) -> &Chunk {
        self.chunks_by_label
            .get(label)
            .unwrap_or_else(|| panic!("no fixture chunk inserted under label {label}"))
    }

    pub fn chunk_id(&self, label: &str) -> String {
        self.chunk(label).id.clone()
    }

    pub fn all_edges(&self) -> Vec<Edge> {
        self.db.all_edges().expect("list all edges")
    }

    pub fn set_reference_clock(&self, project_slug: &str, at: DateTime<Utc>) {
        let clock = cmem_types::VectorClock::new();
        self.db
            .set_reference_clock(project_slug, &clock, at)
            .expect("set reference clock");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_chain_links_consecutive_chunks_backward() {
        let world = MemoryWorld::new().with_chain("turn", "proj", 3, 0.8);
        let edges = world.all_edges();
        assert_eq!(edges.len(), 2);
        assert!(edges.iter().all(|e| e.direction == EdgeDirection::Backward));
    }

    #[test]
    fn with_vector_makes_chunk_searchable() {
        let world = MemoryWorld::new()
            .with_plain_chunk("a", "proj")
            .with_vector("a", 1, 8);
        assert!(world.index.has(&world.chunk_id("a")));
    }
}
