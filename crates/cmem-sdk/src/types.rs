use cmem_types::DecayRange;
use serde::Serialize;

/// Input to [`crate::Client::recall`] / [`crate::Client::predict`]. Owned
/// rather than borrowed since it crosses the async/blocking boundary into a
/// `spawn_blocking` task.
#[derive(Debug, Clone)]
pub struct RecallRequest {
    pub query_embedding: Vec<f32>,
    pub project: Option<String>,
    pub current_session: Option<String>,
    pub max_tokens: Option<u32>,
    pub range: DecayRange,
}

impl RecallRequest {
    pub fn new(query_embedding: Vec<f32>) -> Self {
        Self {
            query_embedding,
            project: None,
            current_session: None,
            max_tokens: None,
            range: DecayRange::Short,
        }
    }

    pub fn project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    pub fn current_session(mut self, session_id: impl Into<String>) -> Self {
        self.current_session = Some(session_id.into());
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn range(mut self, range: DecayRange) -> Self {
        self.range = range;
        self
    }
}

/// The degraded payload returned in place of a crash when retrieval fails.
/// `degraded` is always `true` on this variant; it exists as a field (rather
/// than being implied by the enum variant alone) because callers commonly
/// serialise this struct directly to JSON for a downstream agent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DegradedResult {
    pub summary: String,
    pub degraded: bool,
    pub hint: String,
}

impl DegradedResult {
    pub fn new(hint: &str) -> Self {
        Self {
            summary: format!("Memory context temporarily unavailable ({hint})"),
            degraded: true,
            hint: hint.to_string(),
        }
    }
}

/// Outcome of a recall or predict call: either a normal retrieval result, or
/// a degraded placeholder when the underlying operation failed. Recall never
/// propagates an `Err` to the caller for retrieval failures specifically, per
/// the degraded-result contract — only setup failures (e.g. `Client::connect`)
/// return a `Result`.
#[derive(Debug, Clone)]
pub enum RecallOutcome {
    Hit(cmem_runtime::RetrievalResult),
    Degraded(DegradedResult),
}

impl RecallOutcome {
    pub fn is_degraded(&self) -> bool {
        matches!(self, RecallOutcome::Degraded(_))
    }

    /// The text to splice into a prompt, whichever variant this is.
    pub fn text(&self) -> &str {
        match self {
            RecallOutcome::Hit(result) => &result.text,
            RecallOutcome::Degraded(degraded) => &degraded.summary,
        }
    }
}
