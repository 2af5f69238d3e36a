use std::collections::HashMap;
use std::sync::RwLock;

use chrono::Utc;
use cmem_core::geometry::angular;
use cmem_types::VectorRecord;

use crate::db::Database;
use crate::Result;

/// Lazy-loaded in-memory index over the `vectors` table. Guarded by a
/// read-write lock per the store's concurrency model: mutations (insert,
/// delete, cleanup) take the write side, reads (search) take the read side.
/// `project_of` is a side index (chunk id -> session slug) used by
/// `search_by_project`; it is populated from the chunks table on load and
/// kept current by callers passing the slug on each insert.
pub struct VectorIndex {
    loaded: RwLock<bool>,
    vectors: RwLock<HashMap<String, Vec<f32>>>,
    project_of: RwLock<HashMap<String, String>>,
}

impl Default for VectorIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl VectorIndex {
    pub fn new() -> Self {
        Self {
            loaded: RwLock::new(false),
            vectors: RwLock::new(HashMap::new()),
            project_of: RwLock::new(HashMap::new()),
        }
    }

    /// Populates the index from persisted vectors and their owning chunks'
    /// project slugs. A no-op once already loaded.
    pub fn load(&self, db: &Database) -> Result<()> {
        {
            let loaded = self.loaded.read().expect("vector index lock poisoned");
            if *loaded {
                return Ok(());
            }
        }
        let records = db.all_vectors()?;
        let mut vectors = self.vectors.write().expect("vector index lock poisoned");
        let mut project_of = self.project_of.write().expect("vector index lock poisoned");
        for record in records {
            if let Some(chunk) = db.get_chunk(&record.chunk_id)? {
                project_of.insert(record.chunk_id.clone(), chunk.session_slug);
            }
            vectors.insert(record.chunk_id, record.embedding);
        }
        *self.loaded.write().expect("vector index lock poisoned") = true;
        Ok(())
    }

    pub fn insert(&self, db: &Database, chunk_id: &str, embedding: Vec<f32>, project: &str) -> Result<()> {
        let record = VectorRecord {
            chunk_id: chunk_id.to_string(),
            embedding: embedding.clone(),
            orphaned_at: None,
            last_accessed: Utc::now(),
        };
        db.upsert_vector(&record)?;
        self.vectors
            .write()
            .expect("vector index lock poisoned")
            .insert(chunk_id.to_string(), embedding);
        self.project_of
            .write()
            .expect("vector index lock poisoned")
            .insert(chunk_id.to_string(), project.to_string());
        Ok(())
    }

    /// Inserts a batch of `(chunk_id, embedding, project)` triples under a
    /// single transaction: a partial failure leaves the database unchanged.
    pub fn insert_batch(&self, db: &Database, batch: &[(String, Vec<f32>, String)]) -> Result<()> {
        let tx = db.conn().unchecked_transaction()?;
        let now = Utc::now();
        for (chunk_id, embedding, _) in batch {
            crate::queries::vector::upsert(
                &tx,
                &VectorRecord {
                    chunk_id: chunk_id.clone(),
                    embedding: embedding.clone(),
                    orphaned_at: None,
                    last_accessed: now,
                },
            )?;
        }
        tx.commit()?;

        let mut vectors = self.vectors.write().expect("vector index lock poisoned");
        let mut project_of = self.project_of.write().expect("vector index lock poisoned");
        for (chunk_id, embedding, project) in batch {
            vectors.insert(chunk_id.clone(), embedding.clone());
            project_of.insert(chunk_id.clone(), project.clone());
        }
        Ok(())
    }

    pub fn get(&self, chunk_id: &str) -> Option<Vec<f32>> {
        self.vectors.read().expect("vector index lock poisoned").get(chunk_id).cloned()
    }

    pub fn has(&self, chunk_id: &str) -> bool {
        self.vectors.read().expect("vector index lock poisoned").contains_key(chunk_id)
    }

    pub fn count(&self) -> usize {
        self.vectors.read().expect("vector index lock poisoned").len()
    }

    pub fn all_ids(&self) -> Vec<String> {
        self.vectors.read().expect("vector index lock poisoned").keys().cloned().collect()
    }

    /// All (chunk_id, embedding) pairs, for feeding into HDBSCAN.
    pub fn all_vectors(&self) -> Vec<(String, Vec<f32>)> {
        self.vectors
            .read()
            .expect("vector index lock poisoned")
            .iter()
            .map(|(id, v)| (id.clone(), v.clone()))
            .collect()
    }

    pub fn delete(&self, db: &Database, chunk_id: &str) -> Result<()> {
        db.delete_chunk(chunk_id)?;
        self.vectors.write().expect("vector index lock poisoned").remove(chunk_id);
        self.project_of.write().expect("vector index lock poisoned").remove(chunk_id);
        Ok(())
    }

    pub fn delete_batch(&self, db: &Database, chunk_ids: &[String]) -> Result<()> {
        for id in chunk_ids {
            db.delete_chunk(id)?;
        }
        let mut vectors = self.vectors.write().expect("vector index lock poisoned");
        let mut project_of = self.project_of.write().expect("vector index lock poisoned");
        for id in chunk_ids {
            vectors.remove(id);
            project_of.remove(id);
        }
        Ok(())
    }

    pub fn mark_orphaned(&self, db: &Database, chunk_id: &str) -> Result<()> {
        db.mark_vector_orphaned(chunk_id, Utc::now())
    }

    pub fn mark_orphaned_batch(&self, db: &Database, chunk_ids: &[String]) -> Result<()> {
        let now = Utc::now();
        for id in chunk_ids {
            db.mark_vector_orphaned(id, now)?;
        }
        Ok(())
    }

    /// Removes vectors both orphaned and untouched for at least `ttl_days`,
    /// then deletes their chunks, which cascades to cluster memberships and
    /// edges (`queries::chunk::delete`). Empty clusters are left for the
    /// caller to reap, per the store's "chunk lifecycle" contract.
    pub fn cleanup_expired(&self, db: &Database, ttl_days: i64) -> Result<usize> {
        let cutoff = Utc::now() - chrono::Duration::days(ttl_days);
        let expired: Vec<String> = db
            .all_vectors()?
            .into_iter()
            .filter(|record| {
                record
                    .orphaned_at
                    .map(|orphaned_at| orphaned_at < cutoff && record.last_accessed < cutoff)
                    .unwrap_or(false)
            })
            .map(|record| record.chunk_id)
            .collect();

        let deleted = db.delete_expired_orphan_vectors(cutoff)?;
        for id in &expired {
            db.delete_chunk(id)?;
        }
        let mut vectors = self.vectors.write().expect("vector index lock poisoned");
        let mut project_of = self.project_of.write().expect("vector index lock poisoned");
        for id in &expired {
            vectors.remove(id);
            project_of.remove(id);
        }
        Ok(deleted)
    }

    /// Touches `last_accessed` for returned ids so TTL eviction tracks
    /// actual use rather than insertion order.
    fn touch_hits(&self, db: &Database, ids: &[String]) -> Result<()> {
        let now = Utc::now();
        for id in ids {
            db.touch_vector(id, now)?;
        }
        Ok(())
    }

    pub fn search(&self, db: &Database, query: &[f32], k: usize) -> Result<Vec<(String, f32)>> {
        let candidates = self.vectors.read().expect("vector index lock poisoned");
        let hits = top_k(candidates.iter().map(|(id, v)| (id.as_str(), v.as_slice())), query, k);
        let ids: Vec<String> = hits.iter().map(|(id, _)| id.clone()).collect();
        drop(candidates);
        self.touch_hits(db, &ids)?;
        Ok(hits)
    }

    pub fn search_within_ids(&self, db: &Database, query: &[f32], candidate_ids: &[String], k: usize) -> Result<Vec<(String, f32)>> {
        let vectors = self.vectors.read().expect("vector index lock poisoned");
        let candidates = candidate_ids.iter().filter_map(|id| vectors.get(id).map(|v| (id.as_str(), v.as_slice())));
        let hits = top_k(candidates, query, k);
        let ids: Vec<String> = hits.iter().map(|(id, _)| id.clone()).collect();
        drop(vectors);
        self.touch_hits(db, &ids)?;
        Ok(hits)
    }

    pub fn search_by_project(&self, db: &Database, query: &[f32], project: &str, k: usize) -> Result<Vec<(String, f32)>> {
        let vectors = self.vectors.read().expect("vector index lock poisoned");
        let project_of = self.project_of.read().expect("vector index lock poisoned");
        let candidates = vectors
            .iter()
            .filter(|(id, _)| project_of.get(*id).map(|p| p == project).unwrap_or(false))
            .map(|(id, v)| (id.as_str(), v.as_slice()));
        let hits = top_k(candidates, query, k);
        let ids: Vec<String> = hits.iter().map(|(id, _)| id.clone()).collect();
        drop(vectors);
        drop(project_of);
        self.touch_hits(db, &ids)?;
        Ok(hits)
    }
}

/// Returns the `k` smallest-angular-distance candidates, sorted ascending.
fn top_k<'a>(candidates: impl Iterator<Item = (&'a str, &'a [f32])>, query: &[f32], k: usize) -> Vec<(String, f32)> {
    let mut scored: Vec<(String, f32)> = candidates.map(|(id, v)| (id.to_string(), angular(query, v))).collect();
    scored.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(k);
    scored
}

#[cfg(test)]
mod tests {
    use super::*;
    use cmem_types::{Chunk, NewChunk};

    fn chunk(id: &str, slug: &str) -> Chunk {
        Chunk::build(NewChunk {
            id: id.to_string(),
            session_id: "s1".to_string(),
            session_slug: slug.to_string(),
            turn_indices: vec![1],
            content: "hi".to_string(),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn search_returns_k_closest_ascending() {
        let db = Database::open_in_memory().unwrap();
        let index = VectorIndex::new();
        db.insert_chunk(&chunk("a", "proj")).unwrap();
        db.insert_chunk(&chunk("b", "proj")).unwrap();
        db.insert_chunk(&chunk("c", "proj")).unwrap();
        index.insert(&db, "a", vec![1.0, 0.0], "proj").unwrap();
        index.insert(&db, "b", vec![0.9, 0.1], "proj").unwrap();
        index.insert(&db, "c", vec![-1.0, 0.0], "proj").unwrap();

        let hits = index.search(&db, &[1.0, 0.0], 2).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].0, "a");
        assert_eq!(hits[1].0, "b");
    }

    #[test]
    fn search_by_project_excludes_other_projects() {
        let db = Database::open_in_memory().unwrap();
        let index = VectorIndex::new();
        db.insert_chunk(&chunk("a", "proj-x")).unwrap();
        db.insert_chunk(&chunk("b", "proj-y")).unwrap();
        index.insert(&db, "a", vec![1.0, 0.0], "proj-x").unwrap();
        index.insert(&db, "b", vec![1.0, 0.0], "proj-y").unwrap();

        let hits = index.search_by_project(&db, &[1.0, 0.0], "proj-x", 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, "a");
    }

    #[test]
    fn load_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        db.insert_chunk(&chunk("a", "proj")).unwrap();
        db.upsert_vector(&VectorRecord {
            chunk_id: "a".to_string(),
            embedding: vec![1.0, 0.0],
            orphaned_at: None,
            last_accessed: Utc::now(),
        })
        .unwrap();

        let index = VectorIndex::new();
        index.load(&db).unwrap();
        index.load(&db).unwrap();
        assert_eq!(index.count(), 1);
    }

    #[test]
    fn cleanup_expired_removes_chunk_and_vector() {
        let db = Database::open_in_memory().unwrap();
        let index = VectorIndex::new();
        db.insert_chunk(&chunk("a", "proj")).unwrap();
        index.insert(&db, "a", vec![1.0, 0.0], "proj").unwrap();
        db.mark_vector_orphaned("a", Utc::now() - chrono::Duration::days(10)).unwrap();
        db.touch_vector("a", Utc::now() - chrono::Duration::days(10)).unwrap();

        let deleted = index.cleanup_expired(&db, 7).unwrap();
        assert_eq!(deleted, 1);
        assert!(db.get_chunk("a").unwrap().is_none());
        assert!(!index.has("a"));
    }
}
