use std::collections::HashSet;

use cmem_core::cancel::CancelToken;

use crate::traversal::WeightedEdge;

/// One step of a walked episodic chain.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainStep {
    pub chunk_id: String,
    pub approx_tokens: u32,
    pub edge_weight: f64,
    /// Combined selection score (`edge_weight * local_score(chunk_id)`) used
    /// to rank this step's successor against its siblings.
    pub score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    NoSuccessor,
    MaxLength,
    TokenBudgetExhausted,
    WeightBelowThreshold,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChainWalk {
    pub steps: Vec<ChainStep>,
    pub stop_reason: StopReason,
}

pub struct ChainWalkLimits {
    pub max_length: usize,
    pub token_budget: u32,
    pub min_weight: f64,
}

/// Greedily walks forward from `start`, at each step following the
/// outgoing edge (that clears `min_weight` and has not already been
/// visited in this chain) ranked highest by `edge_weight * local_score`,
/// until a termination gate trips: no successor, `max_length` steps taken,
/// the token budget is exhausted, or the best candidate's raw edge weight
/// falls below `min_weight`. A visited set keeps the walk from looping back
/// through a chunk it has already passed through.
pub fn walk_chain(
    edges: &[WeightedEdge],
    tokens_by_chunk: &dyn Fn(&str) -> u32,
    local_score: &dyn Fn(&str) -> f64,
    start: &str,
    start_tokens: u32,
    limits: &ChainWalkLimits,
    cancel: &CancelToken,
) -> ChainWalk {
    let mut steps = Vec::new();
    let mut current = start.to_string();
    let mut tokens_used = start_tokens;
    let mut visited: HashSet<String> = HashSet::new();
    visited.insert(start.to_string());

    loop {
        if cancel.is_cancelled() {
            return ChainWalk { steps, stop_reason: StopReason::Cancelled };
        }
        if steps.len() >= limits.max_length {
            return ChainWalk { steps, stop_reason: StopReason::MaxLength };
        }

        let best_successor = edges
            .iter()
            .filter(|e| e.from == current && !visited.contains(&e.to))
            .max_by(|a, b| {
                let score_a = a.weight * local_score(&a.to);
                let score_b = b.weight * local_score(&b.to);
                score_a.partial_cmp(&score_b).unwrap_or(std::cmp::Ordering::Equal)
            });

        let Some(successor) = best_successor else {
            return ChainWalk { steps, stop_reason: StopReason::NoSuccessor };
        };

        if successor.weight < limits.min_weight {
            return ChainWalk { steps, stop_reason: StopReason::WeightBelowThreshold };
        }

        let next_tokens = tokens_by_chunk(&successor.to);
        if tokens_used + next_tokens > limits.token_budget {
            return ChainWalk { steps, stop_reason: StopReason::TokenBudgetExhausted };
        }

        tokens_used += next_tokens;
        let score = successor.weight * local_score(&successor.to);
        current = successor.to.clone();
        visited.insert(current.clone());
        steps.push(ChainStep {
            chunk_id: successor.to.clone(),
            approx_tokens: next_tokens,
            edge_weight: successor.weight,
            score,
        });
    }
}
