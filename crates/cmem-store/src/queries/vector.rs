use chrono::{DateTime, Utc};
use cmem_types::{decode_embedding, encode_embedding, VectorRecord};
use rusqlite::{params, Connection, OptionalExtension};

use crate::Result;

pub fn upsert(conn: &Connection, record: &VectorRecord) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO vectors (chunk_id, embedding, orphaned_at, last_accessed)
        VALUES (?1, ?2, ?3, ?4)
        ON CONFLICT(chunk_id) DO UPDATE SET
            embedding = ?2,
            orphaned_at = ?3,
            last_accessed = ?4
        "#,
        params![
            &record.chunk_id,
            encode_embedding(&record.embedding),
            record.orphaned_at.map(|t| t.to_rfc3339()),
            record.last_accessed.to_rfc3339(),
        ],
    )?;
    Ok(())
}

pub fn get(conn: &Connection, chunk_id: &str) -> Result<Option<VectorRecord>> {
    conn.query_row(
        "SELECT chunk_id, embedding, orphaned_at, last_accessed FROM vectors WHERE chunk_id = ?1",
        [chunk_id],
        row_to_record,
    )
    .optional()
    .map_err(Into::into)
}

pub fn all(conn: &Connection) -> Result<Vec<VectorRecord>> {
    let mut stmt = conn.prepare("SELECT chunk_id, embedding, orphaned_at, last_accessed FROM vectors")?;
    let rows = stmt
        .query_map([], row_to_record)?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
    Ok(rows)
}

pub fn touch(conn: &Connection, chunk_id: &str, at: DateTime<Utc>) -> Result<()> {
    conn.execute(
        "UPDATE vectors SET last_accessed = ?2 WHERE chunk_id = ?1",
        params![chunk_id, at.to_rfc3339()],
    )?;
    Ok(())
}

/// Marks a vector as orphaned (its chunk was deleted but the embedding is
/// kept around for a grace period before `delete_expired_orphans` reaps it).
pub fn mark_orphaned(conn: &Connection, chunk_id: &str, at: DateTime<Utc>) -> Result<()> {
    conn.execute(
        "UPDATE vectors SET orphaned_at = ?2 WHERE chunk_id = ?1",
        params![chunk_id, at.to_rfc3339()],
    )?;
    Ok(())
}

pub fn delete_expired_orphans(conn: &Connection, ttl_cutoff: DateTime<Utc>) -> Result<usize> {
    let affected = conn.execute(
        "DELETE FROM vectors WHERE orphaned_at IS NOT NULL AND orphaned_at < ?1",
        params![ttl_cutoff.to_rfc3339()],
    )?;
    Ok(affected)
}

fn row_to_record(row: &rusqlite::Row) -> std::result::Result<VectorRecord, rusqlite::Error> {
    let embedding_blob: Vec<u8> = row.get(1)?;
    let orphaned_at: Option<String> = row.get(2)?;
    let last_accessed: String = row.get(3)?;

    let embedding = decode_embedding(&embedding_blob)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Blob, Box::new(e)))?;
    let orphaned_at = orphaned_at.map(|s| parse_ts(&s)).transpose()?;

    Ok(VectorRecord {
        chunk_id: row.get(0)?,
        embedding,
        orphaned_at,
        last_accessed: parse_ts(&last_accessed)?,
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
    use crate::schema::init_schema;

    fn sample(chunk_id: &str) -> VectorRecord {
        VectorRecord {
            chunk_id: chunk_id.to_string(),
            embedding: vec![1.0, 2.0, 3.0],
            orphaned_at: None,
            last_accessed: Utc::now(),
        }
    }

    #[test]
    fn upsert_and_get_round_trips() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        let record = sample("c1");
        upsert(&conn, &record).unwrap();
        let fetched = get(&conn, "c1").unwrap().unwrap();
        assert_eq!(fetched.embedding, record.embedding);
    }

    #[test]
    fn orphaned_records_past_ttl_are_deleted() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        upsert(&conn, &sample("c1")).unwrap();
        let orphaned_at = Utc::now() - chrono::Duration::days(10);
        mark_orphaned(&conn, "c1", orphaned_at).unwrap();

        let cutoff = Utc::now() - chrono::Duration::days(7);
        let deleted = delete_expired_orphans(&conn, cutoff).unwrap();
        assert_eq!(deleted, 1);
        assert!(get(&conn, "c1").unwrap().is_none());
    }

    #[test]
    fn orphaned_records_within_ttl_survive() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        upsert(&conn, &sample("c1")).unwrap();
        mark_orphaned(&conn, "c1", Utc::now()).unwrap();

        let cutoff = Utc::now() - chrono::Duration::days(7);
        let deleted = delete_expired_orphans(&conn, cutoff).unwrap();
        assert_eq!(deleted, 0);
        assert!(get(&conn, "c1").unwrap().is_some());
    }
}
