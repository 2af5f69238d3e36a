use chrono::{DateTime, Utc};

use crate::clock::VectorClock;
use crate::error::{Error, Result};

/// Direction semantics: a backward edge S -> T means "S was
/// causally influenced by T" (used for recall); a forward edge S -> T means
/// "T builds on S" (used for prediction).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeDirection {
    Backward,
    Forward,
}

impl EdgeDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeDirection::Backward => "backward",
            EdgeDirection::Forward => "forward",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "backward" => Ok(EdgeDirection::Backward),
            "forward" => Ok(EdgeDirection::Forward),
            other => Err(Error::Validation(format!("unknown edge direction: {other}"))),
        }
    }
}

/// Reference type classifying *why* an edge was observed. The open-ended
/// `Other` variant covers detectors added after this enum was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReferenceType {
    WithinChain,
    FilePath,
    CodeEntity,
    ExplicitBackref,
    ErrorFragment,
    ToolOutput,
    Other(String),
}

impl ReferenceType {
    pub fn as_str(&self) -> &str {
        match self {
            ReferenceType::WithinChain => "within-chain",
            ReferenceType::FilePath => "file-path",
            ReferenceType::CodeEntity => "code-entity",
            ReferenceType::ExplicitBackref => "explicit-backref",
            ReferenceType::ErrorFragment => "error-fragment",
            ReferenceType::ToolOutput => "tool-output",
            ReferenceType::Other(s) => s.as_str(),
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "within-chain" => ReferenceType::WithinChain,
            "file-path" => ReferenceType::FilePath,
            "code-entity" => ReferenceType::CodeEntity,
            "explicit-backref" => ReferenceType::ExplicitBackref,
            "error-fragment" => ReferenceType::ErrorFragment,
            "tool-output" => ReferenceType::ToolOutput,
            other => ReferenceType::Other(other.to_string()),
        }
    }
}

/// A directed causal or referential link between two chunks.
#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    pub id: String,
    pub source_chunk_id: String,
    pub target_chunk_id: String,
    pub direction: EdgeDirection,
    pub reference_type: Option<ReferenceType>,
    pub initial_weight: f64,
    pub link_count: u32,
    pub created_at: DateTime<Utc>,
    pub clock: VectorClock,
}

impl Edge {
    pub fn validate_weight(weight: f64) -> Result<()> {
        if weight > 0.0 && weight <= 1.0 {
            Ok(())
        } else {
            Err(Error::Validation(format!(
                "edge initial_weight must be in (0, 1], got {weight}"
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_weight() {
        assert!(Edge::validate_weight(0.0).is_err());
    }

    #[test]
    fn rejects_weight_above_one() {
        assert!(Edge::validate_weight(1.1).is_err());
    }

    #[test]
    fn accepts_boundary_weight() {
        assert!(Edge::validate_weight(1.0).is_ok());
    }

    #[test]
    fn direction_round_trips() {
        assert_eq!(
            EdgeDirection::parse(EdgeDirection::Backward.as_str()).unwrap(),
            EdgeDirection::Backward
        );
    }
}
