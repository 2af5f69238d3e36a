//! Contracts this crate consumes from external collaborators (an embedding
//! model, an ingest pipeline) without depending on any concrete
//! implementation of either — the store and retrieval layers are
//! embedder-agnostic by construction.

use std::fmt;

use chrono::{DateTime, Utc};

/// Error surfaced by an [`Embedder`] implementation.
#[derive(Debug)]
pub enum EmbedError {
    /// The model is unavailable (not loaded, network down, rate limited).
    Unavailable(String),
    /// The returned vector's dimensionality didn't match what was expected.
    DimensionMismatch { expected: usize, got: usize },
}

impl fmt::Display for EmbedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmbedError::Unavailable(msg) => write!(f, "embedder unavailable: {msg}"),
            EmbedError::DimensionMismatch { expected, got } => {
                write!(f, "embedder returned {got}-dim vector, expected {expected}")
            }
        }
    }
}

impl std::error::Error for EmbedError {}

/// External embedding model contract. Implementations may call out to an
/// ONNX runtime, a hosted API, or anything else; this crate only needs the
/// two entry points below and treats a call as a suspension point.
pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError>;
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedError>;
}

/// A chunk as handed over by an external transcript parser, before it has
/// been assigned a store-generated id or embedded. Mirrors the `Parser`
/// interface's chunk shape; ingest (turning this into a stored `Chunk` plus
/// causal edges plus a vector) lives above this crate, in the caller.
#[derive(Debug, Clone)]
pub struct IngestChunk {
    pub id: String,
    pub content: String,
    pub session_id: String,
    pub session_slug: String,
    pub turn_indices: Vec<u32>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub approx_tokens: u32,
    pub code_block_count: u32,
    pub tool_use_count: u32,
    pub agent_id: Option<String>,
    pub spawn_depth: u32,
    pub project_path: Option<String>,
    pub team_name: Option<String>,
}

impl From<IngestChunk> for cmem_types::NewChunk {
    fn from(chunk: IngestChunk) -> Self {
        cmem_types::NewChunk {
            id: chunk.id,
            session_id: chunk.session_id,
            session_slug: chunk.session_slug,
            turn_indices: chunk.turn_indices,
            start_time: Some(chunk.start_time),
            end_time: Some(chunk.end_time),
            content: chunk.content,
            code_block_count: chunk.code_block_count,
            tool_use_count: chunk.tool_use_count,
            approx_tokens: chunk.approx_tokens,
            created_at: Some(chunk.start_time),
            agent_id: chunk.agent_id,
            spawn_depth: chunk.spawn_depth,
            project_path: chunk.project_path,
            team_name: chunk.team_name,
        }
    }
}
