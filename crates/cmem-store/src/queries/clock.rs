use chrono::{DateTime, Utc};
use cmem_types::VectorClock;
use rusqlite::{params, Connection, OptionalExtension};

use crate::Result;

fn reference_id(project_slug: &str) -> String {
    format!("project:{project_slug}")
}

fn agent_id(project_slug: &str, agent: &str) -> String {
    format!("agent:{project_slug}:{agent}")
}

fn row_clock(conn: &Connection, id: &str) -> Result<VectorClock> {
    let raw: Option<String> = conn
        .query_row("SELECT clock_data FROM vector_clocks WHERE id = ?1", [id], |row| row.get(0))
        .optional()?;
    match raw {
        Some(json) => Ok(VectorClock::from_json(&json)?),
        None => Ok(VectorClock::new()),
    }
}

fn put_row(conn: &Connection, id: &str, project_slug: &str, clock: &VectorClock, at: DateTime<Utc>) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO vector_clocks (id, project_slug, clock_data, updated_at)
        VALUES (?1, ?2, ?3, ?4)
        ON CONFLICT(id) DO UPDATE SET clock_data = ?3, updated_at = ?4
        "#,
        params![id, project_slug, clock.to_json(), at.to_rfc3339()],
    )?;
    Ok(())
}

pub fn get_reference_clock(conn: &Connection, project_slug: &str) -> Result<VectorClock> {
    row_clock(conn, &reference_id(project_slug))
}

pub fn set_reference_clock(conn: &Connection, project_slug: &str, clock: &VectorClock, at: DateTime<Utc>) -> Result<()> {
    put_row(conn, &reference_id(project_slug), project_slug, clock, at)
}

/// Merges `update` into the stored reference clock and persists the result.
pub fn merge_reference_clock(conn: &Connection, project_slug: &str, update: &VectorClock, at: DateTime<Utc>) -> Result<VectorClock> {
    let current = get_reference_clock(conn, project_slug)?;
    let merged = cmem_core::clock::merge(&current, update);
    set_reference_clock(conn, project_slug, &merged, at)?;
    Ok(merged)
}

pub fn get_agent_clock(conn: &Connection, project_slug: &str, agent: &str) -> Result<VectorClock> {
    row_clock(conn, &agent_id(project_slug, agent))
}

pub fn update_agent_clock(conn: &Connection, project_slug: &str, agent: &str, clock: &VectorClock, at: DateTime<Utc>) -> Result<()> {
    put_row(conn, &agent_id(project_slug, agent), project_slug, clock, at)
}

pub fn get_all_agent_clocks(conn: &Connection, project_slug: &str) -> Result<Vec<(String, VectorClock)>> {
    let prefix = format!("agent:{project_slug}:");
    let mut stmt = conn.prepare(
        "SELECT id, clock_data FROM vector_clocks WHERE project_slug = ?1 AND id LIKE ?2",
    )?;
    let like_pattern = format!("{prefix}%");
    let rows = stmt
        .query_map(params![project_slug, like_pattern], |row| {
            let id: String = row.get(0)?;
            let json: String = row.get(1)?;
            Ok((id, json))
        })?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;

    rows.into_iter()
        .map(|(id, json)| {
            let agent = id.strip_prefix(&prefix).unwrap_or(&id).to_string();
            let clock = VectorClock::from_json(&json)?;
            Ok((agent, clock))
        })
        .collect()
}

pub fn delete_project_clocks(conn: &Connection, project_slug: &str) -> Result<usize> {
    let n = conn.execute("DELETE FROM vector_clocks WHERE project_slug = ?1", [project_slug])?;
    Ok(n)
}

pub fn last_update_time(conn: &Connection, project_slug: &str) -> Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT MAX(updated_at) FROM vector_clocks WHERE project_slug = ?1",
            [project_slug],
            |row| row.get(0),
        )
        .optional()?
        .flatten();
    raw.map(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| cmem_types::Error::Validation(format!("bad updated_at timestamp: {e}")).into())
    })
    .transpose()
}

/// Recomputes the reference clock as the fold-merge of every agent clock
/// currently on record for the project, and persists it.
pub fn refresh_reference_clock(conn: &Connection, project_slug: &str, at: DateTime<Utc>) -> Result<VectorClock> {
    let agent_clocks = get_all_agent_clocks(conn, project_slug)?;
    let clocks: Vec<VectorClock> = agent_clocks.into_iter().map(|(_, clock)| clock).collect();
    let folded = cmem_core::clock::fold_merge(&clocks);
    set_reference_clock(conn, project_slug, &folded, at)?;
    Ok(folded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::init_schema;

    #[test]
    fn missing_project_returns_empty_clocks() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        assert!(get_reference_clock(&conn, "proj").unwrap().is_empty());
        assert!(get_agent_clock(&conn, "proj", "agent-1").unwrap().is_empty());
        assert!(last_update_time(&conn, "proj").unwrap().is_none());
    }

    #[test]
    fn merge_reference_clock_accumulates_across_calls() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        let mut a = VectorClock::new();
        a.set("agent-1", 2);
        merge_reference_clock(&conn, "proj", &a, Utc::now()).unwrap();

        let mut b = VectorClock::new();
        b.set("agent-1", 1);
        b.set("agent-2", 5);
        let merged = merge_reference_clock(&conn, "proj", &b, Utc::now()).unwrap();

        assert_eq!(merged.get("agent-1"), 2);
        assert_eq!(merged.get("agent-2"), 5);
    }

    #[test]
    fn agent_clocks_are_scoped_per_project_and_listed_together() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        let mut c1 = VectorClock::new();
        c1.set("agent-1", 3);
        update_agent_clock(&conn, "proj-a", "agent-1", &c1, Utc::now()).unwrap();

        let mut c2 = VectorClock::new();
        c2.set("agent-2", 7);
        update_agent_clock(&conn, "proj-a", "agent-2", &c2, Utc::now()).unwrap();

        let mut other = VectorClock::new();
        other.set("agent-1", 99);
        update_agent_clock(&conn, "proj-b", "agent-1", &other, Utc::now()).unwrap();

        let all = get_all_agent_clocks(&conn, "proj-a").unwrap();
        assert_eq!(all.len(), 2);
        assert!(all.iter().any(|(a, c)| a == "agent-1" && c.get("agent-1") == 3));
        assert!(all.iter().any(|(a, c)| a == "agent-2" && c.get("agent-2") == 7));
    }

    #[test]
    fn refresh_reference_clock_is_fold_merge_of_agent_clocks() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        let mut c1 = VectorClock::new();
        c1.set("agent-1", 3);
        update_agent_clock(&conn, "proj", "agent-1", &c1, Utc::now()).unwrap();

        let mut c2 = VectorClock::new();
        c2.set("agent-1", 1);
        c2.set("agent-2", 8);
        update_agent_clock(&conn, "proj", "agent-2", &c2, Utc::now()).unwrap();

        let refreshed = refresh_reference_clock(&conn, "proj", Utc::now()).unwrap();
        assert_eq!(refreshed.get("agent-1"), 3);
        assert_eq!(refreshed.get("agent-2"), 8);
        assert_eq!(get_reference_clock(&conn, "proj").unwrap(), refreshed);
    }

    #[test]
    fn delete_project_clocks_removes_reference_and_agent_rows() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        let mut c = VectorClock::new();
        c.set("agent-1", 1);
        update_agent_clock(&conn, "proj", "agent-1", &c, Utc::now()).unwrap();
        merge_reference_clock(&conn, "proj", &c, Utc::now()).unwrap();

        let deleted = delete_project_clocks(&conn, "proj").unwrap();
        assert_eq!(deleted, 2);
        assert!(get_reference_clock(&conn, "proj").unwrap().is_empty());
        assert!(get_all_agent_clocks(&conn, "proj").unwrap().is_empty());
    }

    #[test]
    fn last_update_time_tracks_most_recent_write() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        let earlier = Utc::now() - chrono::Duration::seconds(60);
        let later = Utc::now();

        let mut c = VectorClock::new();
        c.set("agent-1", 1);
        update_agent_clock(&conn, "proj", "agent-1", &c, earlier).unwrap();
        set_reference_clock(&conn, "proj", &c, later).unwrap();

        let last = last_update_time(&conn, "proj").unwrap().unwrap();
        assert_eq!(last.timestamp(), later.timestamp());
    }
}
