use chrono::{DateTime, Utc};
use cmem_types::{encode_embedding, Cluster};
use rusqlite::{params, Connection, OptionalExtension};

use crate::Result;

pub fn upsert(conn: &Connection, cluster: &Cluster) -> Result<()> {
    let exemplar_ids = serde_json::to_string(&cluster.exemplar_ids)
        .expect("exemplar_ids is a plain Vec<String>, never fails to serialize");

    conn.execute(
        r#"
        INSERT INTO clusters (id, name, description, centroid, exemplar_ids, membership_hash, created_at, refreshed_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        ON CONFLICT(id) DO UPDATE SET
            name = ?2,
            description = ?3,
            centroid = ?4,
            exemplar_ids = ?5,
            membership_hash = ?6,
            refreshed_at = ?8
        "#,
        params![
            &cluster.id,
            &cluster.name,
            &cluster.description,
            encode_embedding(&cluster.centroid),
            exemplar_ids,
            &cluster.membership_hash,
            cluster.created_at.to_rfc3339(),
            cluster.refreshed_at.map(|t| t.to_rfc3339()),
        ],
    )?;
    Ok(())
}

pub fn get(conn: &Connection, id: &str) -> Result<Option<Cluster>> {
    conn.query_row(
        r#"
        SELECT id, name, description, centroid, exemplar_ids, membership_hash, created_at, refreshed_at
        FROM clusters WHERE id = ?1
        "#,
        [id],
        row_to_cluster,
    )
    .optional()
    .map_err(Into::into)
}

pub fn all(conn: &Connection) -> Result<Vec<Cluster>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT id, name, description, centroid, exemplar_ids, membership_hash, created_at, refreshed_at
        FROM clusters
        "#,
    )?;
    let rows = stmt
        .query_map([], row_to_cluster)?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
    Ok(rows)
}

pub fn delete(conn: &Connection, id: &str) -> Result<()> {
    conn.execute("DELETE FROM chunk_clusters WHERE cluster_id = ?1", [id])?;
    conn.execute("DELETE FROM clusters WHERE id = ?1", [id])?;
    Ok(())
}

pub fn delete_all(conn: &Connection) -> Result<()> {
    conn.execute("DELETE FROM chunk_clusters", [])?;
    conn.execute("DELETE FROM clusters", [])?;
    Ok(())
}

pub fn assign(conn: &Connection, chunk_id: &str, cluster_id: &str, distance: f32) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO chunk_clusters (chunk_id, cluster_id, distance)
        VALUES (?1, ?2, ?3)
        ON CONFLICT(chunk_id, cluster_id) DO UPDATE SET distance = ?3
        "#,
        params![chunk_id, cluster_id, distance],
    )?;
    Ok(())
}

/// Assigns a batch of (chunk_id, distance) pairs to a single cluster in one
/// transaction.
pub fn assign_batch(conn: &Connection, cluster_id: &str, assignments: &[(String, f32)]) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    for (chunk_id, distance) in assignments {
        tx.execute(
            r#"
            INSERT INTO chunk_clusters (chunk_id, cluster_id, distance)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(chunk_id, cluster_id) DO UPDATE SET distance = ?3
            "#,
            params![chunk_id, cluster_id, distance],
        )?;
    }
    tx.commit()?;
    Ok(())
}

pub fn unassign(conn: &Connection, chunk_id: &str, cluster_id: &str) -> Result<()> {
    conn.execute(
        "DELETE FROM chunk_clusters WHERE chunk_id = ?1 AND cluster_id = ?2",
        params![chunk_id, cluster_id],
    )?;
    Ok(())
}

pub fn members(conn: &Connection, cluster_id: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT chunk_id FROM chunk_clusters WHERE cluster_id = ?1")?;
    let rows = stmt
        .query_map([cluster_id], |row| row.get(0))?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
    Ok(rows)
}

fn row_to_cluster(row: &rusqlite::Row) -> std::result::Result<Cluster, rusqlite::Error> {
    let centroid_blob: Vec<u8> = row.get(3)?;
    let exemplar_ids_json: String = row.get(4)?;
    let created_at: String = row.get(6)?;
    let refreshed_at: Option<String> = row.get(7)?;

    let centroid = cmem_types::decode_embedding(&centroid_blob)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Blob, Box::new(e)))?;
    let exemplar_ids: Vec<String> = serde_json::from_str(&exemplar_ids_json)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e)))?;

    Ok(Cluster {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        centroid,
        exemplar_ids,
        membership_hash: row.get(5)?,
        created_at: parse_ts(&created_at)?,
        refreshed_at: refreshed_at.map(|s| parse_ts(&s)).transpose()?,
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

    fn sample(id: &str) -> Cluster {
        Cluster {
            id: id.to_string(),
            name: Some("topic".to_string()),
            description: None,
            centroid: vec![0.1, 0.2],
            exemplar_ids: vec!["c1".to_string(), "c2".to_string()],
            membership_hash: "deadbeef".to_string(),
            created_at: Utc::now(),
            refreshed_at: None,
        }
    }

    #[test]
    fn upsert_and_get_round_trips() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        let cluster = sample("cl1");
        upsert(&conn, &cluster).unwrap();
        let fetched = get(&conn, "cl1").unwrap().unwrap();
        assert_eq!(fetched, cluster);
    }

    #[test]
    fn assign_and_members_round_trip() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        upsert(&conn, &sample("cl1")).unwrap();
        assign(&conn, "c1", "cl1", 0.05).unwrap();
        assign(&conn, "c2", "cl1", 0.12).unwrap();
        let members = members(&conn, "cl1").unwrap();
        assert_eq!(members.len(), 2);
    }

    #[test]
    fn assign_batch_assigns_all_in_one_transaction() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        upsert(&conn, &sample("cl1")).unwrap();
        assign_batch(
            &conn,
            "cl1",
            &[("c1".to_string(), 0.05), ("c2".to_string(), 0.1), ("c3".to_string(), 0.2)],
        )
        .unwrap();
        let members = members(&conn, "cl1").unwrap();
        assert_eq!(members.len(), 3);
    }

    #[test]
    fn delete_cascades_to_assignments() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        upsert(&conn, &sample("cl1")).unwrap();
        assign(&conn, "c1", "cl1", 0.05).unwrap();
        delete(&conn, "cl1").unwrap();
        assert!(members(&conn, "cl1").unwrap().is_empty());
        assert!(get(&conn, "cl1").unwrap().is_none());
    }
}
