//! Deterministic fixture builders for chunks, edges, clocks, and embeddings.
//!
//! Every id and vector here is derived from its inputs via SHA-256 rather
//! than randomness, so two tests that build "the same" fixture always agree,
//! and a failing assertion's expected/actual ids are reproducible across runs.

use chrono::{DateTime, Duration, Utc};
use cmem_types::{Chunk, Edge, EdgeDirection, ReferenceType, VectorClock};
use sha2::{Digest, Sha256};

/// A fixed epoch so fixture timestamps are reproducible without needing a
/// real clock: `base_time() + offset_secs(n)` gives an ascending sequence.
pub fn base_time() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

pub fn offset_secs(n: i64) -> DateTime<Utc> {
    base_time() + Duration::seconds(n)
}

/// Deterministic id derived from a short label, namespaced so fixture chunk
/// ids never collide with fixture edge/cluster ids built from the same label.
fn derive_id(namespace: &str, label: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(namespace.as_bytes());
    hasher.update(b":");
    hasher.update(label.as_bytes());
    let hash = hasher.finalize();
    format!("{namespace}-{:016x}", u64::from_be_bytes(hash[0..8].try_into().unwrap()))
}

pub fn chunk_id(label: &str) -> String {
    derive_id("chunk", label)
}

pub fn edge_id(label: &str) -> String {
    derive_id("edge", label)
}

/// Builder for a [`Chunk`] fixture. Every field has a sane default; override
/// only what the test cares about.
pub struct ChunkBuilder {
    chunk: Chunk,
}

impl ChunkBuilder {
    pub fn new(label: &str, session_slug: &str) -> Self {
        let start = offset_secs(0);
        Self {
            chunk: Chunk {
                id: chunk_id(label),
                session_id: format!("session-{session_slug}"),
                session_slug: session_slug.to_string(),
                turn_indices: vec![0],
                start_time: start,
                end_time: start + Duration::seconds(30),
                content: format!("fixture content for {label}"),
                code_block_count: 0,
                tool_use_count: 0,
                approx_tokens: 64,
                created_at: start,
                agent_id: None,
                spawn_depth: 0,
                project_path: None,
                team_name: None,
            },
        }
    }

    pub fn at(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.chunk.start_time = start;
        self.chunk.end_time = end;
        self.chunk.created_at = start;
        self
    }

    pub fn content(mut self, content: &str) -> Self {
        self.chunk.content = content.to_string();
        self
    }

    pub fn agent(mut self, agent_id: &str) -> Self {
        self.chunk.agent_id = Some(agent_id.to_string());
        self
    }

    pub fn spawn_depth(mut self, depth: u32) -> Self {
        self.chunk.spawn_depth = depth;
        self
    }

    pub fn team(mut self, team_name: &str) -> Self {
        self.chunk.team_name = Some(team_name.to_string());
        self
    }

    pub fn build(self) -> Chunk {
        self.chunk
    }
}

/// Builds an [`Edge`] fixture between two fixture chunk labels.
pub fn edge(label: &str, source: &Chunk, target: &Chunk, direction: EdgeDirection, weight: f64) -> Edge {
    Edge {
        id: edge_id(label),
        source_chunk_id: source.id.clone(),
        target_chunk_id: target.id.clone(),
        direction,
        reference_type: Some(ReferenceType::WithinChain),
        initial_weight: weight,
        link_count: 1,
        created_at: offset_secs(0),
        clock: VectorClock::new(),
    }
}

/// A unit-length-ish embedding deterministically derived from `seed` and
/// `dims`, so two fixtures built from the same seed always compare as
/// identical and distinct seeds almost always separate in angular distance.
pub fn deterministic_embedding(seed: u64, dims: usize) -> Vec<f32> {
    let mut hasher = Sha256::new();
    hasher.update(seed.to_le_bytes());
    let mut block = hasher.finalize_reset().to_vec();

    let mut out = Vec::with_capacity(dims);
    while out.len() < dims {
        if block.len() < 4 {
            hasher.update(&block);
            block = hasher.finalize_reset().to_vec();
        }
        let bytes: [u8; 4] = block[0..4].try_into().unwrap();
        block.drain(0..4);
        // Map the raw bytes into [-1.0, 1.0] rather than consuming them as an
        // arbitrary f32 bit pattern, so every component is finite.
        let raw = i32::from_le_bytes(bytes);
        out.push(raw as f32 / i32::MAX as f32);
    }
    out
}
