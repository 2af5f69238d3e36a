use chrono::{DateTime, Utc};
use cmem_types::{Edge, EdgeDirection, ReferenceType, VectorClock};
use rusqlite::{params, Connection, OptionalExtension};

use crate::Result;

pub fn insert(conn: &Connection, edge: &Edge) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO edges (
            id, source_chunk_id, target_chunk_id, direction, reference_type,
            initial_weight, link_count, created_at, clock
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        ON CONFLICT(id) DO UPDATE SET
            initial_weight = ?6,
            link_count = ?7,
            clock = ?9
        "#,
        params![
            &edge.id,
            &edge.source_chunk_id,
            &edge.target_chunk_id,
            edge.direction.as_str(),
            edge.reference_type.as_ref().map(|r| r.as_str()),
            edge.initial_weight,
            edge.link_count,
            edge.created_at.to_rfc3339(),
            edge.clock.to_json(),
        ],
    )?;
    Ok(())
}

/// Inserts a new edge, or if one already exists for the same
/// (source, target, direction) bumps its `link_count` and merges the
/// newly observed clock into it instead of creating a duplicate. This is
/// the entry point ingestion should use; `insert` is for callers (fixtures,
/// schema tests) that already know no edge exists for the pair.
pub fn upsert(conn: &Connection, edge: &Edge) -> Result<()> {
    let existing_id: Option<String> = conn
        .query_row(
            "SELECT id FROM edges WHERE source_chunk_id = ?1 AND target_chunk_id = ?2 AND direction = ?3",
            params![&edge.source_chunk_id, &edge.target_chunk_id, edge.direction.as_str()],
            |row| row.get(0),
        )
        .optional()?;

    match existing_id {
        Some(existing_id) => record_additional_link(conn, &existing_id, &edge.clock),
        None => insert(conn, edge),
    }
}

/// Bumps `link_count` by one and merges `observed_at` into the edge's clock,
/// used when the same causal link is re-observed instead of inserting a
/// duplicate.
pub fn record_additional_link(conn: &Connection, edge_id: &str, observed_at: &VectorClock) -> Result<()> {
    let existing = get(conn, edge_id)?;
    let Some(existing) = existing else {
        return Err(crate::Error::Query(format!("no such edge: {edge_id}")));
    };
    let merged = cmem_core::clock::merge(&existing.clock, observed_at);
    conn.execute(
        "UPDATE edges SET link_count = link_count + 1, clock = ?2 WHERE id = ?1",
        params![edge_id, merged.to_json()],
    )?;
    Ok(())
}

pub fn get(conn: &Connection, id: &str) -> Result<Option<Edge>> {
    conn.query_row(
        r#"
        SELECT id, source_chunk_id, target_chunk_id, direction, reference_type,
               initial_weight, link_count, created_at, clock
        FROM edges WHERE id = ?1
        "#,
        [id],
        row_to_edge,
    )
    .optional()
    .map_err(Into::into)
}

pub fn all(conn: &Connection) -> Result<Vec<Edge>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT id, source_chunk_id, target_chunk_id, direction, reference_type,
               initial_weight, link_count, created_at, clock
        FROM edges
        "#,
    )?;
    let edges = stmt
        .query_map([], row_to_edge)?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
    Ok(edges)
}

/// All edges of a single direction, regardless of chunk.
pub fn by_direction(conn: &Connection, direction: EdgeDirection) -> Result<Vec<Edge>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT id, source_chunk_id, target_chunk_id, direction, reference_type,
               initial_weight, link_count, created_at, clock
        FROM edges WHERE direction = ?1
        "#,
    )?;
    let edges = stmt
        .query_map([direction.as_str()], row_to_edge)?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
    Ok(edges)
}

/// Removes every edge whose source chunk belongs to `session_id`.
pub fn delete_by_session(conn: &Connection, session_id: &str) -> Result<usize> {
    let affected = conn.execute(
        r#"
        DELETE FROM edges WHERE source_chunk_id IN (
            SELECT id FROM chunks WHERE session_id = ?1
        )
        "#,
        [session_id],
    )?;
    Ok(affected)
}

/// All edges leaving `chunk_id`, optionally restricted to one direction.
pub fn outgoing(conn: &Connection, chunk_id: &str, direction: Option<EdgeDirection>) -> Result<Vec<Edge>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT id, source_chunk_id, target_chunk_id, direction, reference_type,
               initial_weight, link_count, created_at, clock
        FROM edges WHERE source_chunk_id = ?1
        "#,
    )?;
    let edges = stmt
        .query_map([chunk_id], row_to_edge)?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
    Ok(match direction {
        Some(d) => edges.into_iter().filter(|e| e.direction == d).collect(),
        None => edges,
    })
}

/// All edges arriving at `chunk_id`, optionally restricted to one direction.
pub fn incoming(conn: &Connection, chunk_id: &str, direction: Option<EdgeDirection>) -> Result<Vec<Edge>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT id, source_chunk_id, target_chunk_id, direction, reference_type,
               initial_weight, link_count, created_at, clock
        FROM edges WHERE target_chunk_id = ?1
        "#,
    )?;
    let edges = stmt
        .query_map([chunk_id], row_to_edge)?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
    Ok(match direction {
        Some(d) => edges.into_iter().filter(|e| e.direction == d).collect(),
        None => edges,
    })
}

/// Edges whose source or target chunk no longer exists; candidates for
/// lazy pruning.
pub fn dangling(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT e.id FROM edges e
        LEFT JOIN chunks s ON e.source_chunk_id = s.id
        LEFT JOIN chunks t ON e.target_chunk_id = t.id
        WHERE s.id IS NULL OR t.id IS NULL
        "#,
    )?;
    let ids = stmt
        .query_map([], |row| row.get(0))?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
    Ok(ids)
}

pub fn delete(conn: &Connection, id: &str) -> Result<()> {
    conn.execute("DELETE FROM edges WHERE id = ?1", [id])?;
    Ok(())
}

pub fn delete_many(conn: &Connection, ids: &[String]) -> Result<usize> {
    if ids.is_empty() {
        return Ok(0);
    }
    let placeholders = ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
    let query = format!("DELETE FROM edges WHERE id IN ({placeholders})");
    let params: Vec<&dyn rusqlite::ToSql> = ids.iter().map(|id| id as &dyn rusqlite::ToSql).collect();
    let affected = conn.execute(&query, params.as_slice())?;
    Ok(affected)
}

fn row_to_edge(row: &rusqlite::Row) -> std::result::Result<Edge, rusqlite::Error> {
    let direction: String = row.get(3)?;
    let reference_type: Option<String> = row.get(4)?;
    let created_at: String = row.get(7)?;
    let clock_json: String = row.get(8)?;

    let direction = EdgeDirection::parse(&direction)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e)))?;
    let clock = VectorClock::from_json(&clock_json)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(8, rusqlite::types::Type::Text, Box::new(e)))?;

    Ok(Edge {
        id: row.get(0)?,
        source_chunk_id: row.get(1)?,
        target_chunk_id: row.get(2)?,
        direction,
        reference_type: reference_type.map(|s| ReferenceType::parse(&s)),
        initial_weight: row.get(5)?,
        link_count: row.get(6)?,
        created_at: parse_ts(&created_at)?,
        clock,
    })
}

fn parse_ts(s: &str) -> std::result::Result<DateTime<Utc>, rusqlite::Error> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::chunk;
    use crate::schema::init_schema;
    use cmem_types::NewChunk;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        for id in ["a", "b"] {
            let c = cmem_types::Chunk::build(NewChunk {
                id: id.to_string(),
                session_id: "s1".to_string(),
                session_slug: "proj".to_string(),
                turn_indices: vec![1],
                content: "x".to_string(),
                ..Default::default()
            })
            .unwrap();
            chunk::insert(&conn, &c).unwrap();
        }
        conn
    }

    fn sample_edge() -> Edge {
        Edge {
            id: "e1".to_string(),
            source_chunk_id: "a".to_string(),
            target_chunk_id: "b".to_string(),
            direction: EdgeDirection::Backward,
            reference_type: Some(ReferenceType::WithinChain),
            initial_weight: 0.9,
            link_count: 1,
            created_at: Utc::now(),
            clock: VectorClock::new(),
        }
    }

    #[test]
    fn insert_and_get_round_trips() {
        let conn = setup();
        let edge = sample_edge();
        insert(&conn, &edge).unwrap();
        let fetched = get(&conn, "e1").unwrap().unwrap();
        assert_eq!(fetched, edge);
    }

    #[test]
    fn outgoing_filters_by_direction() {
        let conn = setup();
        insert(&conn, &sample_edge()).unwrap();
        let matches = outgoing(&conn, "a", Some(EdgeDirection::Backward)).unwrap();
        assert_eq!(matches.len(), 1);
        let none = outgoing(&conn, "a", Some(EdgeDirection::Forward)).unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn record_additional_link_bumps_count_and_merges_clock() {
        let conn = setup();
        insert(&conn, &sample_edge()).unwrap();
        let mut observed = VectorClock::new();
        observed.set("agent-1", 3);
        record_additional_link(&conn, "e1", &observed).unwrap();
        let updated = get(&conn, "e1").unwrap().unwrap();
        assert_eq!(updated.link_count, 2);
        assert_eq!(updated.clock.get("agent-1"), 3);
    }

    #[test]
    fn upsert_inserts_new_pair() {
        let conn = setup();
        upsert(&conn, &sample_edge()).unwrap();
        assert_eq!(get(&conn, "e1").unwrap().unwrap().link_count, 1);
    }

    #[test]
    fn upsert_on_re_observed_pair_bumps_link_count_instead_of_duplicating() {
        let conn = setup();
        upsert(&conn, &sample_edge()).unwrap();

        let mut second = sample_edge();
        second.id = "e2".to_string();
        second.clock.set("agent-1", 5);
        upsert(&conn, &second).unwrap();

        assert_eq!(all(&conn).unwrap().len(), 1);
        let stored = get(&conn, "e1").unwrap().unwrap();
        assert_eq!(stored.link_count, 2);
        assert_eq!(stored.clock.get("agent-1"), 5);
        assert!(get(&conn, "e2").unwrap().is_none());
    }

    #[test]
    fn by_direction_returns_only_matching_edges() {
        let conn = setup();
        insert(&conn, &sample_edge()).unwrap();
        let mut forward = sample_edge();
        forward.id = "e2".to_string();
        forward.direction = EdgeDirection::Forward;
        insert(&conn, &forward).unwrap();

        let backward = by_direction(&conn, EdgeDirection::Backward).unwrap();
        assert_eq!(backward.len(), 1);
        assert_eq!(backward[0].id, "e1");
    }

    #[test]
    fn dangling_detects_orphaned_edges() {
        // `chunk::delete` cascades edges away itself, so an edge only ends
        // up dangling if its chunk is removed through some other path (a
        // direct row delete, a restored backup missing a chunk, etc).
        let conn = setup();
        insert(&conn, &sample_edge()).unwrap();
        conn.execute("DELETE FROM chunks WHERE id = ?1", ["b"]).unwrap();
        let orphans = dangling(&conn).unwrap();
        assert_eq!(orphans, vec!["e1".to_string()]);
    }

    #[test]
    fn delete_by_session_removes_only_that_sessions_edges() {
        let conn = setup();
        insert(&conn, &sample_edge()).unwrap();
        let deleted = delete_by_session(&conn, "s1").unwrap();
        assert_eq!(deleted, 1);
        assert!(all(&conn).unwrap().is_empty());
    }
}
