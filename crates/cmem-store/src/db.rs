use std::path::Path;

use cmem_types::{Chunk, Cluster, Edge, EdgeDirection, SessionSummary, VectorClock, VectorRecord};
use rusqlite::Connection;

use crate::queries;
use crate::schema::init_schema;
use crate::Result;

/// A handle to the memory store's SQLite file (or in-memory database in
/// tests). Holds the single `Connection`; callers do not see `rusqlite`
/// types outside of this crate's public surface.
pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        init_schema(&db.conn)?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        init_schema(&db.conn)?;
        Ok(db)
    }

    /// Direct access to the connection, for callers that need to run a
    /// transaction spanning multiple query modules.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    pub fn insert_chunk(&self, chunk: &Chunk) -> Result<()> {
        queries::chunk::insert(&self.conn, chunk)
    }

    pub fn insert_chunks(&self, chunks: &[Chunk]) -> Result<()> {
        queries::chunk::insert_many(&self.conn, chunks)
    }

    pub fn list_chunks_by_project(&self, session_slug: &str) -> Result<Vec<Chunk>> {
        queries::chunk::list_by_project(&self.conn, session_slug)
    }

    pub fn list_chunks_by_time_range(
        &self,
        from: chrono::DateTime<chrono::Utc>,
        to: chrono::DateTime<chrono::Utc>,
        session_id: Option<&str>,
        limit: Option<u32>,
    ) -> Result<Vec<Chunk>> {
        queries::chunk::list_by_time_range(&self.conn, from, to, session_id, limit)
    }

    pub fn find_previous_session(&self, session_slug: &str, before_session: &str) -> Result<Option<String>> {
        queries::chunk::find_previous_session(&self.conn, session_slug, before_session)
    }

    pub fn get_chunk(&self, id: &str) -> Result<Option<Chunk>> {
        queries::chunk::get(&self.conn, id)
    }

    pub fn get_chunks(&self, ids: &[String]) -> Result<Vec<Chunk>> {
        queries::chunk::get_many(&self.conn, ids)
    }

    pub fn list_chunks_by_session(&self, session_id: &str) -> Result<Vec<Chunk>> {
        queries::chunk::list_by_session(&self.conn, session_id)
    }

    pub fn list_sessions(&self, session_slug: &str) -> Result<Vec<SessionSummary>> {
        queries::chunk::list_sessions(&self.conn, session_slug)
    }

    pub fn delete_chunk(&self, id: &str) -> Result<()> {
        queries::chunk::delete(&self.conn, id)
    }

    /// Inserts a new causal link, or folds it into an existing one for the
    /// same (source, target, direction) by bumping `link_count` and merging
    /// clocks — see `queries::edge::upsert`.
    pub fn insert_edge(&self, edge: &Edge) -> Result<()> {
        queries::edge::upsert(&self.conn, edge)
    }

    pub fn all_edges(&self) -> Result<Vec<Edge>> {
        queries::edge::all(&self.conn)
    }

    pub fn edges_by_direction(&self, direction: EdgeDirection) -> Result<Vec<Edge>> {
        queries::edge::by_direction(&self.conn, direction)
    }

    pub fn delete_edges_by_session(&self, session_id: &str) -> Result<usize> {
        queries::edge::delete_by_session(&self.conn, session_id)
    }

    pub fn record_additional_link(&self, edge_id: &str, observed_at: &VectorClock) -> Result<()> {
        queries::edge::record_additional_link(&self.conn, edge_id, observed_at)
    }

    pub fn get_edge(&self, id: &str) -> Result<Option<Edge>> {
        queries::edge::get(&self.conn, id)
    }

    pub fn outgoing_edges(&self, chunk_id: &str, direction: Option<EdgeDirection>) -> Result<Vec<Edge>> {
        queries::edge::outgoing(&self.conn, chunk_id, direction)
    }

    pub fn incoming_edges(&self, chunk_id: &str, direction: Option<EdgeDirection>) -> Result<Vec<Edge>> {
        queries::edge::incoming(&self.conn, chunk_id, direction)
    }

    pub fn dangling_edges(&self) -> Result<Vec<String>> {
        queries::edge::dangling(&self.conn)
    }

    pub fn delete_edges(&self, ids: &[String]) -> Result<usize> {
        queries::edge::delete_many(&self.conn, ids)
    }

    pub fn upsert_vector(&self, record: &VectorRecord) -> Result<()> {
        queries::vector::upsert(&self.conn, record)
    }

    pub fn get_vector(&self, chunk_id: &str) -> Result<Option<VectorRecord>> {
        queries::vector::get(&self.conn, chunk_id)
    }

    pub fn all_vectors(&self) -> Result<Vec<VectorRecord>> {
        queries::vector::all(&self.conn)
    }

    pub fn touch_vector(&self, chunk_id: &str, at: chrono::DateTime<chrono::Utc>) -> Result<()> {
        queries::vector::touch(&self.conn, chunk_id, at)
    }

    pub fn mark_vector_orphaned(&self, chunk_id: &str, at: chrono::DateTime<chrono::Utc>) -> Result<()> {
        queries::vector::mark_orphaned(&self.conn, chunk_id, at)
    }

    pub fn delete_expired_orphan_vectors(&self, ttl_cutoff: chrono::DateTime<chrono::Utc>) -> Result<usize> {
        queries::vector::delete_expired_orphans(&self.conn, ttl_cutoff)
    }

    pub fn upsert_cluster(&self, cluster: &Cluster) -> Result<()> {
        queries::cluster::upsert(&self.conn, cluster)
    }

    pub fn get_cluster(&self, id: &str) -> Result<Option<Cluster>> {
        queries::cluster::get(&self.conn, id)
    }

    pub fn all_clusters(&self) -> Result<Vec<Cluster>> {
        queries::cluster::all(&self.conn)
    }

    pub fn delete_cluster(&self, id: &str) -> Result<()> {
        queries::cluster::delete(&self.conn, id)
    }

    pub fn delete_all_clusters(&self) -> Result<()> {
        queries::cluster::delete_all(&self.conn)
    }

    pub fn assign_cluster(&self, chunk_id: &str, cluster_id: &str, distance: f32) -> Result<()> {
        queries::cluster::assign(&self.conn, chunk_id, cluster_id, distance)
    }

    pub fn assign_cluster_batch(&self, cluster_id: &str, assignments: &[(String, f32)]) -> Result<()> {
        queries::cluster::assign_batch(&self.conn, cluster_id, assignments)
    }

    pub fn unassign_cluster(&self, chunk_id: &str, cluster_id: &str) -> Result<()> {
        queries::cluster::unassign(&self.conn, chunk_id, cluster_id)
    }

    pub fn cluster_members(&self, cluster_id: &str) -> Result<Vec<String>> {
        queries::cluster::members(&self.conn, cluster_id)
    }

    pub fn get_reference_clock(&self, project_slug: &str) -> Result<VectorClock> {
        queries::clock::get_reference_clock(&self.conn, project_slug)
    }

    pub fn set_reference_clock(
        &self,
        project_slug: &str,
        clock: &VectorClock,
        at: chrono::DateTime<chrono::Utc>,
    ) -> Result<()> {
        queries::clock::set_reference_clock(&self.conn, project_slug, clock, at)
    }

    pub fn merge_reference_clock(
        &self,
        project_slug: &str,
        update: &VectorClock,
        at: chrono::DateTime<chrono::Utc>,
    ) -> Result<VectorClock> {
        queries::clock::merge_reference_clock(&self.conn, project_slug, update, at)
    }

    pub fn get_agent_clock(&self, project_slug: &str, agent: &str) -> Result<VectorClock> {
        queries::clock::get_agent_clock(&self.conn, project_slug, agent)
    }

    pub fn update_agent_clock(
        &self,
        project_slug: &str,
        agent: &str,
        clock: &VectorClock,
        at: chrono::DateTime<chrono::Utc>,
    ) -> Result<()> {
        queries::clock::update_agent_clock(&self.conn, project_slug, agent, clock, at)
    }

    pub fn get_all_agent_clocks(&self, project_slug: &str) -> Result<Vec<(String, VectorClock)>> {
        queries::clock::get_all_agent_clocks(&self.conn, project_slug)
    }

    pub fn delete_project_clocks(&self, project_slug: &str) -> Result<usize> {
        queries::clock::delete_project_clocks(&self.conn, project_slug)
    }

    pub fn clocks_last_update_time(
        &self,
        project_slug: &str,
    ) -> Result<Option<chrono::DateTime<chrono::Utc>>> {
        queries::clock::last_update_time(&self.conn, project_slug)
    }

    pub fn refresh_reference_clock(
        &self,
        project_slug: &str,
        at: chrono::DateTime<chrono::Utc>,
    ) -> Result<VectorClock> {
        queries::clock::refresh_reference_clock(&self.conn, project_slug, at)
    }
}
