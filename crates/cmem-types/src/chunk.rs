use chrono::{DateTime, Utc};

use crate::error::{Error, Result};

/// A contiguous span of conversation captured as a unit of memory.
///
/// `session_slug` is the project-level display/grouping identifier (the
/// `chunks.session_slug` column); despite the name it is
/// shared by every chunk belonging to the same project, while `session_id`
/// identifies one particular conversation instance within that project.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub id: String,
    pub session_id: String,
    pub session_slug: String,
    pub turn_indices: Vec<u32>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub content: String,
    pub code_block_count: u32,
    pub tool_use_count: u32,
    pub approx_tokens: u32,
    pub created_at: DateTime<Utc>,
    pub agent_id: Option<String>,
    pub spawn_depth: u32,
    pub project_path: Option<String>,
    pub team_name: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct NewChunk {
    pub id: String,
    pub session_id: String,
    pub session_slug: String,
    pub turn_indices: Vec<u32>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub content: String,
    pub code_block_count: u32,
    pub tool_use_count: u32,
    pub approx_tokens: u32,
    pub created_at: Option<DateTime<Utc>>,
    pub agent_id: Option<String>,
    pub spawn_depth: u32,
    pub project_path: Option<String>,
    pub team_name: Option<String>,
}

impl Chunk {
    /// Builds a chunk, validating its invariants:
    /// turn indices are nonempty and sorted ascending, and `end >= start`.
    pub fn build(new: NewChunk) -> Result<Self> {
        if new.turn_indices.is_empty() {
            return Err(Error::Validation(
                "chunk turn_indices must be nonempty".to_string(),
            ));
        }
        if !new.turn_indices.windows(2).all(|w| w[0] <= w[1]) {
            return Err(Error::Validation(
                "chunk turn_indices must be sorted ascending".to_string(),
            ));
        }
        let start_time = new.start_time.unwrap_or_else(Utc::now);
        let end_time = new.end_time.unwrap_or(start_time);
        if end_time < start_time {
            return Err(Error::Validation(
                "chunk end_time must be >= start_time".to_string(),
            ));
        }
        Ok(Chunk {
            id: new.id,
            session_id: new.session_id,
            session_slug: new.session_slug,
            turn_indices: new.turn_indices,
            start_time,
            end_time,
            content: new.content,
            code_block_count: new.code_block_count,
            tool_use_count: new.tool_use_count,
            approx_tokens: new.approx_tokens,
            created_at: new.created_at.unwrap_or(start_time),
            agent_id: new.agent_id,
            spawn_depth: new.spawn_depth,
            project_path: new.project_path,
            team_name: new.team_name,
        })
    }
}

/// Summary row for `list sessions for a project`.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSummary {
    pub session_id: String,
    pub chunk_count: u64,
    pub total_tokens: u64,
    pub first_time: DateTime<Utc>,
    pub last_time: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> NewChunk {
        NewChunk {
            id: "c1".to_string(),
            session_id: "s1".to_string(),
            session_slug: "proj".to_string(),
            turn_indices: vec![1, 2, 3],
            content: "hello".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn rejects_empty_turn_indices() {
        let mut new = base();
        new.turn_indices = vec![];
        assert!(Chunk::build(new).is_err());
    }

    #[test]
    fn rejects_unsorted_turn_indices() {
        let mut new = base();
        new.turn_indices = vec![3, 1, 2];
        assert!(Chunk::build(new).is_err());
    }

    #[test]
    fn rejects_end_before_start() {
        let mut new = base();
        let now = Utc::now();
        new.start_time = Some(now);
        new.end_time = Some(now - chrono::Duration::seconds(1));
        assert!(Chunk::build(new).is_err());
    }

    #[test]
    fn builds_valid_chunk() {
        let chunk = Chunk::build(base()).unwrap();
        assert_eq!(chunk.turn_indices, vec![1, 2, 3]);
    }
}
