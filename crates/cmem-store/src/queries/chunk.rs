use chrono::{DateTime, Utc};
use cmem_types::Chunk;
use rusqlite::{params, Connection, OptionalExtension};

use crate::Result;

pub fn insert(conn: &Connection, chunk: &Chunk) -> Result<()> {
    let turn_indices = serde_json::to_string(&chunk.turn_indices)
        .expect("turn_indices is a plain Vec<u32>, never fails to serialize");

    conn.execute(
        r#"
        INSERT INTO chunks (
            id, session_id, session_slug, turn_indices, start_time, end_time,
            content, code_block_count, tool_use_count, approx_tokens, created_at,
            agent_id, spawn_depth, project_path, team_name
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
        ON CONFLICT(id) DO UPDATE SET
            session_id = ?2,
            session_slug = ?3,
            turn_indices = ?4,
            start_time = ?5,
            end_time = ?6,
            content = ?7,
            code_block_count = ?8,
            tool_use_count = ?9,
            approx_tokens = ?10,
            agent_id = ?12,
            spawn_depth = ?13,
            project_path = ?14,
            team_name = ?15
        "#,
        params![
            &chunk.id,
            &chunk.session_id,
            &chunk.session_slug,
            turn_indices,
            chunk.start_time.to_rfc3339(),
            chunk.end_time.to_rfc3339(),
            &chunk.content,
            chunk.code_block_count,
            chunk.tool_use_count,
            chunk.approx_tokens,
            chunk.created_at.to_rfc3339(),
            &chunk.agent_id,
            chunk.spawn_depth,
            &chunk.project_path,
            &chunk.team_name,
        ],
    )?;
    Ok(())
}

pub fn get(conn: &Connection, id: &str) -> Result<Option<Chunk>> {
    conn.query_row(
        r#"
        SELECT id, session_id, session_slug, turn_indices, start_time, end_time,
               content, code_block_count, tool_use_count, approx_tokens, created_at,
               agent_id, spawn_depth, project_path, team_name
        FROM chunks WHERE id = ?1
        "#,
        [id],
        row_to_chunk,
    )
    .optional()
    .map_err(Into::into)
}

pub fn get_many(conn: &Connection, ids: &[String]) -> Result<Vec<Chunk>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let placeholders = ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
    let query = format!(
        r#"
        SELECT id, session_id, session_slug, turn_indices, start_time, end_time,
               content, code_block_count, tool_use_count, approx_tokens, created_at,
               agent_id, spawn_depth, project_path, team_name
        FROM chunks WHERE id IN ({placeholders})
        "#
    );
    let mut stmt = conn.prepare(&query)?;
    let params: Vec<&dyn rusqlite::ToSql> = ids.iter().map(|id| id as &dyn rusqlite::ToSql).collect();
    let rows = stmt
        .query_map(params.as_slice(), row_to_chunk)?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
    Ok(rows)
}

pub fn insert_many(conn: &Connection, chunks: &[Chunk]) -> Result<()> {
    for chunk in chunks {
        insert(conn, chunk)?;
    }
    Ok(())
}

pub fn list_by_project(conn: &Connection, session_slug: &str) -> Result<Vec<Chunk>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT id, session_id, session_slug, turn_indices, start_time, end_time,
               content, code_block_count, tool_use_count, approx_tokens, created_at,
               agent_id, spawn_depth, project_path, team_name
        FROM chunks WHERE session_slug = ?1 ORDER BY start_time ASC
        "#,
    )?;
    let rows = stmt
        .query_map([session_slug], row_to_chunk)?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
    Ok(rows)
}

/// Half-open `[from, to)` range, ascending by start time, optionally scoped
/// to one session and limited to the first `limit` rows.
pub fn list_by_time_range(
    conn: &Connection,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
    session_id: Option<&str>,
    limit: Option<u32>,
) -> Result<Vec<Chunk>> {
    let base = r#"
        SELECT id, session_id, session_slug, turn_indices, start_time, end_time,
               content, code_block_count, tool_use_count, approx_tokens, created_at,
               agent_id, spawn_depth, project_path, team_name
        FROM chunks WHERE start_time >= ?1 AND start_time < ?2
    "#;
    let mut query = base.to_string();
    if session_id.is_some() {
        query.push_str(" AND session_id = ?3");
    }
    query.push_str(" ORDER BY start_time ASC");
    if let Some(limit) = limit {
        query.push_str(&format!(" LIMIT {limit}"));
    }

    let mut stmt = conn.prepare(&query)?;
    let rows = if let Some(session_id) = session_id {
        stmt.query_map(params![from.to_rfc3339(), to.to_rfc3339(), session_id], row_to_chunk)?
            .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?
    } else {
        stmt.query_map(params![from.to_rfc3339(), to.to_rfc3339()], row_to_chunk)?
            .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?
    };
    Ok(rows)
}

/// The most recent session in the same project ending strictly before
/// `before_session`'s own start time.
pub fn find_previous_session(conn: &Connection, session_slug: &str, before_session: &str) -> Result<Option<String>> {
    let current_start: Option<String> = conn
        .query_row(
            "SELECT MIN(start_time) FROM chunks WHERE session_id = ?1",
            [before_session],
            |row| row.get(0),
        )
        .optional()?
        .flatten();
    let Some(current_start) = current_start else {
        return Ok(None);
    };

    conn.query_row(
        r#"
        SELECT session_id FROM chunks
        WHERE session_slug = ?1 AND session_id != ?2 AND end_time < ?3
        ORDER BY end_time DESC
        LIMIT 1
        "#,
        params![session_slug, before_session, current_start],
        |row| row.get(0),
    )
    .optional()
    .map_err(Into::into)
}

pub fn list_by_session(conn: &Connection, session_id: &str) -> Result<Vec<Chunk>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT id, session_id, session_slug, turn_indices, start_time, end_time,
               content, code_block_count, tool_use_count, approx_tokens, created_at,
               agent_id, spawn_depth, project_path, team_name
        FROM chunks WHERE session_id = ?1 ORDER BY start_time ASC
        "#,
    )?;
    let rows = stmt
        .query_map([session_id], row_to_chunk)?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
    Ok(rows)
}

pub fn list_sessions(conn: &Connection, session_slug: &str) -> Result<Vec<cmem_types::SessionSummary>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT session_id, COUNT(*), SUM(approx_tokens), MIN(start_time), MAX(end_time)
        FROM chunks
        WHERE session_slug = ?1
        GROUP BY session_id
        ORDER BY MIN(start_time) ASC
        "#,
    )?;
    let rows = stmt
        .query_map([session_slug], |row| {
            let first_time: String = row.get(3)?;
            let last_time: String = row.get(4)?;
            Ok(cmem_types::SessionSummary {
                session_id: row.get(0)?,
                chunk_count: row.get::<_, i64>(1)? as u64,
                total_tokens: row.get::<_, i64>(2)? as u64,
                first_time: parse_ts(&first_time)?,
                last_time: parse_ts(&last_time)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
    Ok(rows)
}

/// Deletes a chunk and cascades by hand, since the schema carries no
/// `ON DELETE CASCADE` (the store never enables `PRAGMA foreign_keys`):
/// every edge touching the chunk, its cluster memberships, and its vector
/// (orphaned rather than deleted, so it stays searchable until TTL expiry).
/// All four statements run in one transaction so a partial failure leaves
/// the database unchanged.
pub fn delete(conn: &Connection, id: &str) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "DELETE FROM edges WHERE source_chunk_id = ?1 OR target_chunk_id = ?1",
        [id],
    )?;
    tx.execute("DELETE FROM chunk_clusters WHERE chunk_id = ?1", [id])?;
    tx.execute(
        "UPDATE vectors SET orphaned_at = ?2 WHERE chunk_id = ?1 AND orphaned_at IS NULL",
        params![id, Utc::now().to_rfc3339()],
    )?;
    tx.execute("DELETE FROM chunks WHERE id = ?1", [id])?;
    tx.commit()?;
    Ok(())
}

fn parse_ts(s: &str) -> std::result::Result<DateTime<Utc>, rusqlite::Error> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e)))
}

fn row_to_chunk(row: &rusqlite::Row) -> std::result::Result<Chunk, rusqlite::Error> {
    let turn_indices_json: String = row.get(3)?;
    let turn_indices: Vec<u32> = serde_json::from_str(&turn_indices_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let start_time: String = row.get(4)?;
    let end_time: String = row.get(5)?;
    let created_at: String = row.get(10)?;

    Ok(Chunk {
        id: row.get(0)?,
        session_id: row.get(1)?,
        session_slug: row.get(2)?,
        turn_indices,
        start_time: parse_ts(&start_time)?,
        end_time: parse_ts(&end_time)?,
        content: row.get(6)?,
        code_block_count: row.get(7)?,
        tool_use_count: row.get(8)?,
        approx_tokens: row.get(9)?,
        created_at: parse_ts(&created_at)?,
        agent_id: row.get(11)?,
        spawn_depth: row.get(12)?,
        project_path: row.get(13)?,
        team_name: row.get(14)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::init_schema;
    use cmem_types::NewChunk;

    fn sample(id: &str, session_id: &str) -> Chunk {
        Chunk::build(NewChunk {
            id: id.to_string(),
            session_id: session_id.to_string(),
            session_slug: "proj".to_string(),
            turn_indices: vec![1, 2],
            content: "hello".to_string(),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn insert_and_get_round_trips() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        let chunk = sample("c1", "s1");
        insert(&conn, &chunk).unwrap();
        let fetched = get(&conn, "c1").unwrap().unwrap();
        assert_eq!(fetched, chunk);
    }

    #[test]
    fn missing_chunk_is_none() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        assert!(get(&conn, "nope").unwrap().is_none());
    }

    #[test]
    fn list_sessions_aggregates_by_session_id() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        insert(&conn, &sample("c1", "s1")).unwrap();
        insert(&conn, &sample("c2", "s1")).unwrap();
        insert(&conn, &sample("c3", "s2")).unwrap();

        let sessions = list_sessions(&conn, "proj").unwrap();
        assert_eq!(sessions.len(), 2);
        let s1 = sessions.iter().find(|s| s.session_id == "s1").unwrap();
        assert_eq!(s1.chunk_count, 2);
    }

    #[test]
    fn delete_removes_chunk() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        insert(&conn, &sample("c1", "s1")).unwrap();
        delete(&conn, "c1").unwrap();
        assert!(get(&conn, "c1").unwrap().is_none());
    }

    #[test]
    fn delete_cascades_to_edges_clusters_and_orphans_the_vector() {
        use crate::queries::{cluster, edge, vector};
        use cmem_types::{Cluster, Edge, EdgeDirection, VectorClock, VectorRecord};

        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        insert(&conn, &sample("a", "s1")).unwrap();
        insert(&conn, &sample("b", "s1")).unwrap();
        insert(&conn, &sample("c", "s1")).unwrap();

        edge::insert(
            &conn,
            &Edge {
                id: "ab".to_string(),
                source_chunk_id: "a".to_string(),
                target_chunk_id: "b".to_string(),
                direction: EdgeDirection::Backward,
                reference_type: None,
                initial_weight: 0.8,
                link_count: 1,
                created_at: Utc::now(),
                clock: VectorClock::new(),
            },
        )
        .unwrap();
        edge::insert(
            &conn,
            &Edge {
                id: "bc".to_string(),
                source_chunk_id: "b".to_string(),
                target_chunk_id: "c".to_string(),
                direction: EdgeDirection::Backward,
                reference_type: None,
                initial_weight: 0.6,
                link_count: 1,
                created_at: Utc::now(),
                clock: VectorClock::new(),
            },
        )
        .unwrap();

        cluster::upsert(
            &conn,
            &Cluster {
                id: "x".to_string(),
                name: Some("topic".to_string()),
                description: None,
                centroid: vec![0.0, 0.0],
                exemplar_ids: vec!["a".to_string(), "b".to_string()],
                membership_hash: "hash".to_string(),
                created_at: Utc::now(),
                refreshed_at: None,
            },
        )
        .unwrap();
        cluster::assign(&conn, "a", "x", 0.01).unwrap();
        cluster::assign(&conn, "b", "x", 0.02).unwrap();

        vector::upsert(
            &conn,
            &VectorRecord {
                chunk_id: "b".to_string(),
                embedding: vec![1.0, 0.0],
                orphaned_at: None,
                last_accessed: Utc::now(),
            },
        )
        .unwrap();

        delete(&conn, "b").unwrap();

        assert!(get(&conn, "b").unwrap().is_none());
        assert!(edge::get(&conn, "ab").unwrap().is_none());
        assert!(edge::get(&conn, "bc").unwrap().is_none());
        assert_eq!(cluster::members(&conn, "x").unwrap(), vec!["a".to_string()]);
        let orphaned_vector = vector::get(&conn, "b").unwrap().unwrap();
        assert!(orphaned_vector.orphaned_at.is_some());
    }

    #[test]
    fn find_previous_session_is_most_recent_before_current() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        let mut older = sample("c1", "s1");
        older.start_time = Utc::now() - chrono::Duration::hours(3);
        older.end_time = Utc::now() - chrono::Duration::hours(2);
        insert(&conn, &older).unwrap();

        let mut newer = sample("c2", "s2");
        newer.start_time = Utc::now() - chrono::Duration::hours(1);
        newer.end_time = Utc::now();
        insert(&conn, &newer).unwrap();

        let previous = find_previous_session(&conn, "proj", "s2").unwrap();
        assert_eq!(previous, Some("s1".to_string()));
    }

    #[test]
    fn time_range_is_half_open_and_ascending() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        let base = Utc::now();

        let mut c1 = sample("c1", "s1");
        c1.start_time = base;
        c1.end_time = base;
        insert(&conn, &c1).unwrap();

        let mut c2 = sample("c2", "s1");
        c2.start_time = base + chrono::Duration::seconds(10);
        c2.end_time = c2.start_time;
        insert(&conn, &c2).unwrap();

        let results = list_by_time_range(&conn, base, base + chrono::Duration::seconds(10), None, None).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "c1");
    }
}
