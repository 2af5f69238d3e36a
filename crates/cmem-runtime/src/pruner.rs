use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use chrono::{DateTime, Utc};
use cmem_core::cancel::CancelToken;
use cmem_core::clock::hop_count;
use cmem_core::decay;
use cmem_store::Database;
use cmem_types::{DecaySettings, EdgeDirection};

use crate::config::PruningConfig;
use crate::Result;

const FLUSH_BATCH_SIZE: usize = 100;

enum WorkerMsg {
    Wake,
    Shutdown,
}

/// A debounced collector of edges whose weight was observed to have crossed
/// the decay floor during a read. A single background thread owns the
/// `pending` set and the shared database handle; `mark_suspect` just records
/// intent and wakes it.
pub struct Pruner {
    pending: Arc<Mutex<HashSet<String>>>,
    armed: Arc<AtomicBool>,
    tx: Sender<WorkerMsg>,
    _handle: JoinHandle<()>,
}

impl Pruner {
    pub fn start(db: Arc<Mutex<Database>>, decay: DecaySettings, config: PruningConfig) -> Self {
        let pending = Arc::new(Mutex::new(HashSet::new()));
        let armed = Arc::new(AtomicBool::new(false));
        let (tx, rx) = channel();

        let worker_pending = Arc::clone(&pending);
        let worker_armed = Arc::clone(&armed);
        let debounce = Duration::from_millis(config.debounce_ms);

        let handle = std::thread::Builder::new()
            .name("cmem-pruner".to_string())
            .spawn(move || loop {
                match rx.recv_timeout(debounce) {
                    Ok(WorkerMsg::Wake) => {
                        std::thread::sleep(debounce);
                        flush(&db, &worker_pending, &worker_armed, &decay);
                    }
                    Ok(WorkerMsg::Shutdown) => break,
                    Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            })
            .expect("failed to spawn pruner thread");

        Self { pending, armed, tx, _handle: handle }
    }

    /// Records an edge under suspicion. Re-enqueuing an already-pending
    /// flush is a no-op: the debounce window isn't restarted, only the
    /// pending set grows.
    pub fn mark_suspect(&self, edge_id: String) {
        self.pending.lock().expect("pruner pending lock poisoned").insert(edge_id);
        if !self.armed.swap(true, Ordering::SeqCst) {
            let _ = self.tx.send(WorkerMsg::Wake);
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().expect("pruner pending lock poisoned").len()
    }
}

impl Drop for Pruner {
    fn drop(&mut self) {
        let _ = self.tx.send(WorkerMsg::Shutdown);
    }
}

fn flush(db: &Arc<Mutex<Database>>, pending: &Arc<Mutex<HashSet<String>>>, armed: &Arc<AtomicBool>, decay_settings: &DecaySettings) {
    loop {
        let batch: Vec<String> = {
            let mut pending = pending.lock().expect("pruner pending lock poisoned");
            if pending.is_empty() {
                armed.store(false, Ordering::SeqCst);
                return;
            }
            let batch: Vec<String> = pending.iter().take(FLUSH_BATCH_SIZE).cloned().collect();
            for id in &batch {
                pending.remove(id);
            }
            batch
        };

        let db = db.lock().expect("database lock poisoned");
        let mut to_check: HashSet<String> = HashSet::new();

        for edge_id in &batch {
            let Ok(Some(edge)) = db.get_edge(edge_id) else {
                continue;
            };
            let clock_scope = "default";
            let Ok(reference_clock) = db.get_reference_clock(clock_scope) else {
                continue;
            };
            let hops = hop_count(&edge.clock, &reference_clock);
            let kernel = match edge.direction {
                EdgeDirection::Backward => &decay_settings.backward,
                EdgeDirection::Forward => &decay_settings.forward,
            };
            let weight = decay::weight(kernel, hops) * edge.initial_weight * decay::link_boost(edge.link_count);

            if weight <= 0.0 {
                if db.delete_edges(&[edge_id.clone()]).is_ok() {
                    to_check.insert(edge.source_chunk_id.clone());
                    to_check.insert(edge.target_chunk_id.clone());
                }
            }
        }

        for chunk_id in &to_check {
            let has_outgoing = db.outgoing_edges(chunk_id, None).map(|e| !e.is_empty()).unwrap_or(true);
            let has_incoming = db.incoming_edges(chunk_id, None).map(|e| !e.is_empty()).unwrap_or(true);
            if !has_outgoing && !has_incoming {
                // Recording failures here must never break the caller: log
                // and move on rather than propagate.
                if let Err(err) = db.mark_vector_orphaned(chunk_id, Utc::now()) {
                    tracing::warn!(chunk_id, error = %err, "failed to mark vector orphaned during prune flush");
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FullPruneStatus {
    Idle,
    Running,
    Completed,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FullPruneProgress {
    pub status: FullPruneStatus,
    pub scanned: u64,
    pub deleted: u64,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

impl Default for FullPruneProgress {
    fn default() -> Self {
        Self {
            status: FullPruneStatus::Idle,
            scanned: 0,
            deleted: 0,
            started_at: None,
            ended_at: None,
            error_message: None,
        }
    }
}

/// Idempotent full walk over every edge and chunk, reaping dead edges and
/// orphaning vectors left with no remaining links. `running` is singleton
/// per process: a start request while one is in flight returns the
/// in-flight handle instead of spawning a second walk.
pub struct FullPruner {
    progress: Arc<Mutex<FullPruneProgress>>,
}

impl Default for FullPruner {
    fn default() -> Self {
        Self::new()
    }
}

impl FullPruner {
    pub fn new() -> Self {
        Self { progress: Arc::new(Mutex::new(FullPruneProgress::default())) }
    }

    pub fn progress(&self) -> FullPruneProgress {
        self.progress.lock().expect("full prune progress lock poisoned").clone()
    }

    /// Starts a full prune in the background unless one is already running,
    /// in which case the current progress handle is returned untouched.
    pub fn start(&self, db: Arc<Mutex<Database>>, decay_settings: DecaySettings, cancel: CancelToken) -> Arc<Mutex<FullPruneProgress>> {
        {
            let mut progress = self.progress.lock().expect("full prune progress lock poisoned");
            if progress.status == FullPruneStatus::Running {
                return Arc::clone(&self.progress);
            }
            *progress = FullPruneProgress {
                status: FullPruneStatus::Running,
                scanned: 0,
                deleted: 0,
                started_at: Some(Utc::now()),
                ended_at: None,
                error_message: None,
            };
        }

        let progress_handle = Arc::clone(&self.progress);
        std::thread::Builder::new()
            .name("cmem-full-prune".to_string())
            .spawn(move || run_full_prune(db, decay_settings, cancel, progress_handle))
            .expect("failed to spawn full prune thread");

        Arc::clone(&self.progress)
    }
}

fn run_full_prune(db: Arc<Mutex<Database>>, decay_settings: DecaySettings, cancel: CancelToken, progress: Arc<Mutex<FullPruneProgress>>) {
    let result = (|| -> Result<(u64, u64)> {
        let mut scanned = 0u64;
        let mut deleted = 0u64;

        let edges = {
            let db = db.lock().expect("database lock poisoned");
            db.all_edges()?
        };

        for edge in edges {
            if cancel.is_cancelled() {
                break;
            }
            scanned += 1;
            let db = db.lock().expect("database lock poisoned");
            let clock_scope = "default";
            let reference_clock = db.get_reference_clock(clock_scope)?;
            let hops = hop_count(&edge.clock, &reference_clock);
            let kernel = match edge.direction {
                EdgeDirection::Backward => &decay_settings.backward,
                EdgeDirection::Forward => &decay_settings.forward,
            };
            let weight = decay::weight(kernel, hops) * edge.initial_weight * decay::link_boost(edge.link_count);
            if weight <= 0.0 {
                db.delete_edges(&[edge.id.clone()])?;
                deleted += 1;
            }
            drop(db);

            if scanned % 50 == 0 {
                let mut progress = progress.lock().expect("full prune progress lock poisoned");
                progress.scanned = scanned;
                progress.deleted = deleted;
            }
        }

        let dangling = {
            let db = db.lock().expect("database lock poisoned");
            db.dangling_edges()?
        };
        if !dangling.is_empty() {
            let db = db.lock().expect("database lock poisoned");
            deleted += db.delete_edges(&dangling)? as u64;
        }

        let orphan_candidates: Vec<String> = {
            let db = db.lock().expect("database lock poisoned");
            db.all_vectors()?.into_iter().map(|v| v.chunk_id).collect()
        };
        for chunk_id in orphan_candidates {
            if cancel.is_cancelled() {
                break;
            }
            let db = db.lock().expect("database lock poisoned");
            let has_outgoing = db.outgoing_edges(&chunk_id, None).map(|e| !e.is_empty()).unwrap_or(true);
            let has_incoming = db.incoming_edges(&chunk_id, None).map(|e| !e.is_empty()).unwrap_or(true);
            if !has_outgoing && !has_incoming {
                db.mark_vector_orphaned(&chunk_id, Utc::now())?;
            }
        }

        Ok((scanned, deleted))
    })();

    let mut progress = progress.lock().expect("full prune progress lock poisoned");
    progress.ended_at = Some(Utc::now());
    match result {
        Ok((scanned, deleted)) => {
            progress.scanned = scanned;
            progress.deleted = deleted;
            progress.status = FullPruneStatus::Completed;
        }
        Err(err) => {
            progress.status = FullPruneStatus::Error;
            progress.error_message = Some(err.to_string());
        }
    }
}

/// Deletes every edge referencing a chunk that no longer exists. Exposed
/// separately from the full-prune walk since the pruner's debounce flush
/// and the lazy dead-edge cleanup path both need it without paying for a
/// full scan.
pub fn sweep_dangling_edges(db: &Database) -> Result<usize> {
    let dangling = db.dangling_edges()?;
    Ok(db.delete_edges(&dangling)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cmem_types::{Chunk, Edge, NewChunk, VectorClock};

    fn chunk(id: &str) -> Chunk {
        Chunk::build(NewChunk {
            id: id.to_string(),
            session_id: "s1".to_string(),
            session_slug: "proj".to_string(),
            turn_indices: vec![1],
            content: "hi".to_string(),
            ..Default::default()
        })
        .unwrap()
    }

    fn edge(id: &str, from: &str, to: &str, weight: f64) -> Edge {
        Edge {
            id: id.to_string(),
            source_chunk_id: from.to_string(),
            target_chunk_id: to.to_string(),
            direction: EdgeDirection::Backward,
            reference_type: None,
            initial_weight: weight,
            link_count: 1,
            created_at: Utc::now(),
            clock: VectorClock::new(),
        }
    }

    #[test]
    fn sweep_dangling_edges_removes_orphaned_links() {
        let db = Database::open_in_memory().unwrap();
        db.insert_chunk(&chunk("a")).unwrap();
        db.insert_edge(&edge("e1", "a", "missing", 0.5)).unwrap();
        let removed = sweep_dangling_edges(&db).unwrap();
        assert_eq!(removed, 1);
    }

    #[test]
    fn full_prune_reports_completed_status() {
        let db = Arc::new(Mutex::new(Database::open_in_memory().unwrap()));
        {
            let db = db.lock().unwrap();
            db.insert_chunk(&chunk("a")).unwrap();
            db.insert_chunk(&chunk("b")).unwrap();
            db.insert_edge(&edge("e1", "a", "b", 0.9)).unwrap();
        }

        let pruner = FullPruner::new();
        let handle = pruner.start(Arc::clone(&db), DecaySettings::default(), CancelToken::new());

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        loop {
            let progress = handle.lock().unwrap().clone();
            if progress.status != FullPruneStatus::Running || std::time::Instant::now() > deadline {
                assert_eq!(progress.status, FullPruneStatus::Completed);
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    #[test]
    fn concurrent_start_returns_in_flight_handle() {
        let db = Arc::new(Mutex::new(Database::open_in_memory().unwrap()));
        let pruner = FullPruner::new();
        let first = pruner.start(Arc::clone(&db), DecaySettings::default(), CancelToken::new());
        let second = pruner.start(Arc::clone(&db), DecaySettings::default(), CancelToken::new());
        assert!(Arc::ptr_eq(&first, &second));
    }
}
