use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use cmem_core::cancel::CancelToken;
use cmem_runtime::{ClusterRunReport, FullPruneProgress, FullPruner, MemoryConfig, Pruner};
use cmem_store::{Database, VectorIndex};
use cmem_types::{DecaySettings, EdgeDirection};

use crate::error::{degraded_hint, Error, Result};
use crate::types::{DegradedResult, RecallOutcome, RecallRequest};

/// Facade over the store, the in-memory vector index, and the background
/// pruner. Construct one per process and share it (it is cheaply `Clone`,
/// wrapping only `Arc`s) — this mirrors the "instantiate once, pass through
/// APIs" guidance for the store's mutable singletons.
#[derive(Clone)]
pub struct Client {
    db: Arc<Mutex<Database>>,
    index: Arc<VectorIndex>,
    config: MemoryConfig,
    pruner: Arc<Pruner>,
    full_pruner: Arc<FullPruner>,
}

impl Client {
    /// Opens (creating if absent) the database at `path` and starts the
    /// background debounced pruner.
    pub async fn connect(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let config = MemoryConfig::load().unwrap_or_default();
        Self::connect_with_config(path, config).await
    }

    /// Connects to the workspace path resolved the same way the CLI/config
    /// layer resolves it: explicit path, then `CMEM_PATH`, then XDG data
    /// dir, then `~/.cmem`.
    pub async fn connect_default() -> Result<Self> {
        let workspace = cmem_runtime::resolve_workspace_path(None).map_err(cmem_runtime::Error::from)?;
        let db_path = workspace.join("memory.db");
        Self::connect(db_path).await
    }

    pub async fn connect_with_config(path: PathBuf, config: MemoryConfig) -> Result<Self> {
        let db = tokio::task::spawn_blocking(move || -> std::result::Result<Database, cmem_store::Error> {
            Database::open(&path)
        })
        .await?
        .map_err(cmem_runtime::Error::from)?;

        let index = VectorIndex::new();
        {
            let db_ref = &db;
            index.load(db_ref).map_err(cmem_runtime::Error::from)?;
        }

        let db = Arc::new(Mutex::new(db));
        let pruner = Pruner::start(Arc::clone(&db), DecaySettings::default(), config.pruning.clone());

        Ok(Self {
            db,
            index: Arc::new(index),
            config,
            pruner: Arc::new(pruner),
            full_pruner: Arc::new(FullPruner::new()),
        })
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    /// Marks an edge as suspect for the debounced pruner's next flush.
    pub fn mark_suspect(&self, edge_id: String) {
        self.pruner.mark_suspect(edge_id);
    }

    /// Backward-direction retrieval: "what led up to this".
    pub async fn recall(&self, request: RecallRequest, cancel: &CancelToken) -> RecallOutcome {
        self.retrieve(request, EdgeDirection::Backward, cancel).await
    }

    /// Forward-direction retrieval: "what tends to follow from this".
    pub async fn predict(&self, request: RecallRequest, cancel: &CancelToken) -> RecallOutcome {
        self.retrieve(request, EdgeDirection::Forward, cancel).await
    }

    async fn retrieve(&self, request: RecallRequest, direction: EdgeDirection, cancel: &CancelToken) -> RecallOutcome {
        let db = Arc::clone(&self.db);
        let index = Arc::clone(&self.index);
        let retrieval_config = self.config.retrieval.clone();
        let cancel = cancel.clone();

        let outcome = tokio::task::spawn_blocking(move || -> cmem_runtime::Result<cmem_runtime::RetrievalResult> {
            let db = db.lock().expect("database lock poisoned");
            let runtime_request = cmem_runtime::RetrievalRequest {
                query_embedding: &request.query_embedding,
                direction,
                current_session: request.current_session.as_deref(),
                project: request.project.as_deref(),
                max_tokens: request.max_tokens.unwrap_or(retrieval_config.max_tokens),
                range: request.range,
            };
            cmem_runtime::assemble(&db, &index, &retrieval_config, &runtime_request, &cancel)
        })
        .await;

        match outcome {
            Ok(Ok(result)) => RecallOutcome::Hit(result),
            Ok(Err(err)) => {
                let err = Error::from(err);
                tracing::warn!(error = %err, ?direction, "retrieval failed, returning degraded result");
                RecallOutcome::Degraded(DegradedResult::new(degraded_hint(&err)))
            }
            Err(join_err) => {
                let err = Error::from(join_err);
                tracing::warn!(error = %err, ?direction, "retrieval task panicked, returning degraded result");
                RecallOutcome::Degraded(DegradedResult::new(degraded_hint(&err)))
            }
        }
    }

    /// Runs a full re-cluster over every stored embedding.
    pub async fn cluster(&self, cancel: &CancelToken) -> Result<ClusterRunReport> {
        let db = Arc::clone(&self.db);
        let clustering_config = self.config.clustering.clone();
        let cancel = cancel.clone();

        let report = tokio::task::spawn_blocking(move || {
            let db = db.lock().expect("database lock poisoned");
            cmem_runtime::recluster(&db, &clustering_config, &cancel)
        })
        .await??;
        Ok(report)
    }

    /// Starts (or returns the already-running) full prune walk and hands
    /// back its live progress handle.
    pub fn prune_full(&self, cancel: CancelToken) -> Arc<Mutex<FullPruneProgress>> {
        self.full_pruner.start(Arc::clone(&self.db), DecaySettings::default(), cancel)
    }

    /// Direct access to the underlying database, for callers that need
    /// ingest-time operations (inserting chunks/edges/vectors) this facade
    /// doesn't wrap directly.
    pub fn database(&self) -> Arc<Mutex<Database>> {
        Arc::clone(&self.db)
    }

    pub fn vector_index(&self) -> Arc<VectorIndex> {
        Arc::clone(&self.index)
    }

    #[cfg(test)]
    pub(crate) async fn connect_in_memory(config: MemoryConfig) -> Result<Self> {
        let db = Database::open_in_memory().map_err(cmem_runtime::Error::from)?;
        let index = VectorIndex::new();
        index.load(&db).map_err(cmem_runtime::Error::from)?;
        let db = Arc::new(Mutex::new(db));
        let pruner = Pruner::start(Arc::clone(&db), DecaySettings::default(), config.pruning.clone());
        Ok(Self {
            db,
            index: Arc::new(index),
            config,
            pruner: Arc::new(pruner),
            full_pruner: Arc::new(FullPruner::new()),
        })
    }
}

#[allow(dead_code)]
fn _path_hint(_: &Path) {}
