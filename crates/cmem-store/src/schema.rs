use rusqlite::Connection;

use crate::Result;

/// Bump whenever a table definition changes. `init_schema` drops and
/// recreates all tables on mismatch rather than carrying forward a
/// migration chain, since the store is a derived index that can always be
/// rebuilt from re-ingested chunks.
pub const SCHEMA_VERSION: i32 = 1;

pub fn init_schema(conn: &Connection) -> Result<()> {
    let current_version: i32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;

    if current_version != 0 && current_version != SCHEMA_VERSION {
        drop_all_tables(conn)?;
    }

    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS chunks (
            id TEXT PRIMARY KEY,
            session_id TEXT NOT NULL,
            session_slug TEXT NOT NULL,
            turn_indices TEXT NOT NULL,
            start_time TEXT NOT NULL,
            end_time TEXT NOT NULL,
            content TEXT NOT NULL,
            code_block_count INTEGER NOT NULL DEFAULT 0,
            tool_use_count INTEGER NOT NULL DEFAULT 0,
            approx_tokens INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            agent_id TEXT,
            spawn_depth INTEGER NOT NULL DEFAULT 0,
            project_path TEXT,
            team_name TEXT
        );

        CREATE TABLE IF NOT EXISTS edges (
            id TEXT PRIMARY KEY,
            source_chunk_id TEXT NOT NULL,
            target_chunk_id TEXT NOT NULL,
            direction TEXT NOT NULL,
            reference_type TEXT,
            initial_weight REAL NOT NULL,
            link_count INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL,
            clock TEXT NOT NULL,
            FOREIGN KEY (source_chunk_id) REFERENCES chunks(id),
            FOREIGN KEY (target_chunk_id) REFERENCES chunks(id),
            UNIQUE (source_chunk_id, target_chunk_id, direction)
        );

        CREATE TABLE IF NOT EXISTS vectors (
            chunk_id TEXT PRIMARY KEY,
            embedding BLOB NOT NULL,
            orphaned_at TEXT,
            last_accessed TEXT NOT NULL,
            FOREIGN KEY (chunk_id) REFERENCES chunks(id)
        );

        CREATE TABLE IF NOT EXISTS clusters (
            id TEXT PRIMARY KEY,
            name TEXT,
            description TEXT,
            centroid BLOB NOT NULL,
            exemplar_ids TEXT NOT NULL,
            membership_hash TEXT NOT NULL,
            created_at TEXT NOT NULL,
            refreshed_at TEXT
        );

        CREATE TABLE IF NOT EXISTS chunk_clusters (
            chunk_id TEXT NOT NULL,
            cluster_id TEXT NOT NULL,
            distance REAL NOT NULL,
            PRIMARY KEY (chunk_id, cluster_id),
            FOREIGN KEY (chunk_id) REFERENCES chunks(id),
            FOREIGN KEY (cluster_id) REFERENCES clusters(id)
        );

        CREATE TABLE IF NOT EXISTS vector_clocks (
            id TEXT PRIMARY KEY,
            project_slug TEXT NOT NULL,
            clock_data TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_chunks_session ON chunks(session_id);
        CREATE INDEX IF NOT EXISTS idx_chunks_slug ON chunks(session_slug);
        CREATE INDEX IF NOT EXISTS idx_edges_source ON edges(source_chunk_id);
        CREATE INDEX IF NOT EXISTS idx_edges_target ON edges(target_chunk_id);
        CREATE INDEX IF NOT EXISTS idx_chunk_clusters_cluster ON chunk_clusters(cluster_id);
        CREATE INDEX IF NOT EXISTS idx_vectors_orphaned ON vectors(orphaned_at);
        CREATE INDEX IF NOT EXISTS idx_vector_clocks_project ON vector_clocks(project_slug);
        "#,
    )?;

    conn.execute(&format!("PRAGMA user_version = {}", SCHEMA_VERSION), [])?;

    Ok(())
}

fn drop_all_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        DROP TABLE IF EXISTS chunk_clusters;
        DROP TABLE IF EXISTS clusters;
        DROP TABLE IF EXISTS vectors;
        DROP TABLE IF EXISTS edges;
        DROP TABLE IF EXISTS vector_clocks;
        DROP TABLE IF EXISTS chunks;
        "#,
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap();

        let version: i32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0)).unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[test]
    fn stale_version_triggers_rebuild() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn.execute("INSERT INTO chunks (id, session_id, session_slug, turn_indices, start_time, end_time, content) VALUES ('c1', 's1', 'proj', '[1]', 't', 't', 'hi')", []).unwrap();
        conn.execute("PRAGMA user_version = 999", []).unwrap();

        init_schema(&conn).unwrap();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0)).unwrap();
        assert_eq!(count, 0);
    }
}
