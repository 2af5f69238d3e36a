use std::collections::HashMap;

use chrono::Utc;
use cmem_core::cancel::CancelToken;
use cmem_core::clock::hop_count;
use cmem_core::decay;
use cmem_graph::chain::{walk_chain, ChainWalkLimits, StopReason};
use cmem_graph::traversal::{traverse, WeightedEdge};
use cmem_store::{Database, VectorIndex};
use cmem_types::{DecayConfig, DecayRange, Edge, EdgeDirection};

use crate::config::RetrievalConfig;
use crate::Result;

/// Which path the assembler actually took, reported back to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrievalMode {
    Chain,
    SearchFallback,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalHit {
    pub chunk_id: String,
    pub session_slug: String,
    pub weight: f64,
    pub preview: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalResult {
    pub text: String,
    pub chunks: Vec<RetrievalHit>,
    pub mode: RetrievalMode,
    pub chain_length: usize,
    pub duration_ms: u64,
}

pub struct RetrievalRequest<'a> {
    pub query_embedding: &'a [f32],
    pub direction: EdgeDirection,
    pub current_session: Option<&'a str>,
    pub project: Option<&'a str>,
    pub max_tokens: u32,
    pub range: DecayRange,
}

const SEARCH_SEEDS: usize = 8;
const RECENCY_BOOST: f64 = 1.2;
const PREVIEW_CHARS: usize = 160;

/// Maps the 'short'/'long' decay range preset onto a concrete kernel for the
/// requested direction. Short biases toward tightly local context (faster
/// falloff); long keeps a wider window alive, useful for cross-session
/// recall. Chosen to differ by roughly 2x in decay rate/hold between the two
/// presets in absence of a more specific source for the constants.
fn decay_config_for(range: DecayRange, direction: EdgeDirection) -> DecayConfig {
    match (range, direction) {
        (DecayRange::Short, EdgeDirection::Backward) => DecayConfig::Linear { rate: 0.2 },
        (DecayRange::Long, EdgeDirection::Backward) => DecayConfig::Linear { rate: 0.05 },
        (DecayRange::Short, EdgeDirection::Forward) => DecayConfig::DelayedLinear { hold: 2, rate: 0.2 },
        (DecayRange::Long, EdgeDirection::Forward) => DecayConfig::DelayedLinear { hold: 10, rate: 0.05 },
    }
}

/// Composes seed search, chain walking (falling back to graph traversal),
/// and output formatting into a single ranked, token-budgeted result.
pub fn assemble(
    db: &Database,
    index: &VectorIndex,
    config: &RetrievalConfig,
    request: &RetrievalRequest,
    cancel: &CancelToken,
) -> Result<RetrievalResult> {
    let started = Utc::now();

    let seeds = if let Some(project) = request.project {
        index.search_by_project(db, request.query_embedding, project, SEARCH_SEEDS)?
    } else {
        index.search(db, request.query_embedding, SEARCH_SEEDS)?
    };

    if seeds.is_empty() {
        return Ok(RetrievalResult {
            text: String::new(),
            chunks: Vec::new(),
            mode: RetrievalMode::SearchFallback,
            chain_length: 0,
            duration_ms: elapsed_ms(started),
        });
    }

    let directed_edges = db.edges_by_direction(request.direction)?;
    let kernel = decay_config_for(request.range, request.direction);
    let clock_scope = request.project.unwrap_or("default");
    let reference_clock = db.get_reference_clock(clock_scope)?;
    let weighted: Vec<WeightedEdge> = directed_edges
        .iter()
        .map(|e| to_weighted(e, &kernel, &reference_clock))
        .collect();

    let seed_scores: Vec<(String, f64)> = seeds
        .iter()
        .map(|(id, distance)| {
            let mut score = 1.0 - *distance as f64;
            if request.current_session.is_some() && belongs_to_current_session(db, id, request.current_session) {
                score *= RECENCY_BOOST;
            }
            (id.clone(), score)
        })
        .collect();

    let best_seed = seed_scores
        .iter()
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));

    if let Some((seed_id, seed_score)) = best_seed {
        let limits = ChainWalkLimits {
            max_length: config.max_hops as usize,
            token_budget: request.max_tokens,
            min_weight: config.min_weight,
        };
        let seed_chunk = db.get_chunk(seed_id)?;
        let start_tokens = seed_chunk.as_ref().map(|c| c.approx_tokens).unwrap_or(0);
        let local_score = |chunk_id: &str| {
            if request.current_session.is_some() && belongs_to_current_session(db, chunk_id, request.current_session) {
                RECENCY_BOOST
            } else {
                1.0
            }
        };
        let chain = walk_chain(
            &weighted,
            &|chunk_id| db.get_chunk(chunk_id).ok().flatten().map(|c| c.approx_tokens).unwrap_or(0),
            &local_score,
            seed_id,
            start_tokens,
            &limits,
            cancel,
        );

        if !chain.steps.is_empty() && chain.stop_reason != StopReason::Cancelled {
            let mut chunk_ids = Vec::with_capacity(chain.steps.len() + 1);
            chunk_ids.push(seed_id.clone());
            chunk_ids.extend(chain.steps.iter().map(|s| s.chunk_id.clone()));

            let mut scores: Vec<f64> = Vec::with_capacity(chain.steps.len() + 1);
            scores.push(*seed_score);
            scores.extend(chain.steps.iter().map(|s| s.score));
            let reported_weight = median(&scores);

            let mut hits = Vec::with_capacity(chunk_ids.len());
            for chunk_id in &chunk_ids {
                hits.push(to_hit(db, chunk_id, reported_weight)?);
            }
            if request.direction == EdgeDirection::Backward {
                hits.reverse();
            }
            let chain_length = hits.len();
            let text = render(db, &hits, request.max_tokens);
            return Ok(RetrievalResult {
                text,
                chunks: hits,
                mode: RetrievalMode::Chain,
                chain_length,
                duration_ms: elapsed_ms(started),
            });
        }
    }

    let traversal_hits = traverse(&weighted, &seed_scores, config.max_hops, config.min_weight, cancel);
    let mut hits = Vec::with_capacity(traversal_hits.len());
    for hit in &traversal_hits {
        hits.push(to_hit(db, &hit.chunk_id, hit.score)?);
    }
    let text = render(db, &hits, request.max_tokens);
    Ok(RetrievalResult {
        text,
        chunks: hits,
        mode: RetrievalMode::SearchFallback,
        chain_length: 0,
        duration_ms: elapsed_ms(started),
    })
}

fn to_weighted(edge: &Edge, kernel: &DecayConfig, reference_clock: &cmem_types::VectorClock) -> WeightedEdge {
    let hops = hop_count(&edge.clock, reference_clock);
    let decayed = decay::weight(kernel, hops) * edge.initial_weight * decay::link_boost(edge.link_count);
    WeightedEdge {
        from: edge.source_chunk_id.clone(),
        to: edge.target_chunk_id.clone(),
        weight: decayed,
    }
}

/// Middle value of `scores` once sorted (average of the two middle values
/// for an even count). Used to report a chain's weight as a single,
/// outlier-resistant figure rather than each step's individual edge weight.
fn median(scores: &[f64]) -> f64 {
    let mut sorted = scores.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let len = sorted.len();
    if len == 0 {
        return 0.0;
    }
    if len % 2 == 1 {
        sorted[len / 2]
    } else {
        (sorted[len / 2 - 1] + sorted[len / 2]) / 2.0
    }
}

fn belongs_to_current_session(db: &Database, chunk_id: &str, current_session: Option<&str>) -> bool {
    let Some(current_session) = current_session else {
        return false;
    };
    db.get_chunk(chunk_id)
        .ok()
        .flatten()
        .map(|c| c.session_id == current_session)
        .unwrap_or(false)
}

fn to_hit(db: &Database, chunk_id: &str, weight: f64) -> Result<RetrievalHit> {
    let chunk = db.get_chunk(chunk_id)?;
    let (session_slug, preview) = match chunk {
        Some(c) => (c.session_slug, preview_of(&c.content)),
        None => (String::new(), String::new()),
    };
    Ok(RetrievalHit { chunk_id: chunk_id.to_string(), session_slug, weight, preview })
}

fn preview_of(content: &str) -> String {
    if content.chars().count() <= PREVIEW_CHARS {
        content.to_string()
    } else {
        let truncated: String = content.chars().take(PREVIEW_CHARS).collect();
        format!("{truncated}…")
    }
}

/// Lays out each chunk as `[Session: slug | Date: … | Relevance: NN%]`
/// followed by its body and a `---` separator, truncating the final chunk
/// at a paragraph boundary within the second half of the remaining budget
/// (falling back to a hard cap with `…[truncated]`).
fn render(db: &Database, hits: &[RetrievalHit], max_tokens: u32) -> String {
    let mut out = String::new();
    let mut tokens_used: u32 = 0;
    let mut dates: HashMap<String, String> = HashMap::new();

    for (i, hit) in hits.iter().enumerate() {
        let date = dates.entry(hit.chunk_id.clone()).or_insert_with(|| {
            db.get_chunk(&hit.chunk_id)
                .ok()
                .flatten()
                .map(|c| c.start_time.format("%Y-%m-%d").to_string())
                .unwrap_or_else(|| "unknown".to_string())
        });
        let relevance = (hit.weight.clamp(0.0, 1.0) * 100.0).round() as i64;
        let header = format!("[Session: {} | Date: {} | Relevance: {}%]\n", hit.session_slug, date, relevance);
        let header_tokens = approx_tokens(&header);

        let remaining_budget = max_tokens.saturating_sub(tokens_used);
        if header_tokens >= remaining_budget {
            break;
        }

        let body_budget = remaining_budget - header_tokens;
        let is_last = i == hits.len() - 1 || approx_tokens(&hit.preview) + header_tokens > remaining_budget;
        let body = if is_last {
            truncate_to_budget(&hit.preview, body_budget)
        } else {
            hit.preview.clone()
        };

        out.push_str(&header);
        out.push_str(&body);
        out.push_str("\n---\n");
        tokens_used += header_tokens + approx_tokens(&body);

        if tokens_used >= max_tokens {
            break;
        }
    }
    out
}

/// A rough tokens-per-word approximation; good enough for budget accounting
/// without depending on a real tokenizer.
fn approx_tokens(text: &str) -> u32 {
    (text.split_whitespace().count() as u32).max(1)
}

fn truncate_to_budget(text: &str, budget_tokens: u32) -> String {
    if approx_tokens(text) <= budget_tokens {
        return text.to_string();
    }
    let words: Vec<&str> = text.split_whitespace().collect();
    let take = (budget_tokens as usize).min(words.len());
    let hard_cut = words[..take].join(" ");

    let search_from = hard_cut.len() / 2;
    if let Some(idx) = hard_cut[search_from..].rfind("\n\n") {
        let cut_at = search_from + idx;
        return format!("{}…[truncated]", &hard_cut[..cut_at]);
    }
    format!("{hard_cut}…[truncated]")
}

fn elapsed_ms(started: chrono::DateTime<Utc>) -> u64 {
    (Utc::now() - started).num_milliseconds().max(0) as u64
}
