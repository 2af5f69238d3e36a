use std::collections::{HashMap, VecDeque};

use cmem_core::cancel::CancelToken;

/// A single decayed, direction-resolved edge ready for traversal. Decay and
/// link-count boost are applied by the caller (`cmem_core::decay::weight`)
/// before handing edges here; this module is pure graph algebra.
#[derive(Debug, Clone)]
pub struct WeightedEdge {
    pub from: String,
    pub to: String,
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TraversalHit {
    pub chunk_id: String,
    pub score: f64,
    pub hops: u32,
}

/// Weighted breadth-first traversal from a set of seed chunks. A node's
/// score is the sum of the path weights reaching it; a path weight is the
/// product of its edge weights, so disjoint paths into the same node both
/// contribute. A separate "best weight so far" table gates re-expansion:
/// a node is only pushed back onto the queue (and its neighbours explored
/// again) when a newly arriving path strictly beats the best one recorded
/// for it, which makes the search cycle-safe — a cycle's weight is
/// strictly less than 1 per hop (weights are decayed into `[0,1]`), so a
/// path looping back can never keep improving and the queue drains. Every
/// arriving path still adds to the node's score even when it does not
/// clear that bar, since it is still a genuine path into the node.
pub fn traverse(
    edges: &[WeightedEdge],
    seeds: &[(String, f64)],
    max_hops: u32,
    min_score: f64,
    cancel: &CancelToken,
) -> Vec<TraversalHit> {
    let adjacency = build_adjacency(edges);
    let mut best: HashMap<String, f64> = HashMap::new();
    let mut totals: HashMap<String, (f64, u32)> = HashMap::new();
    let mut queue: VecDeque<(String, f64, u32)> = VecDeque::new();

    for (chunk_id, score) in seeds {
        if *score < min_score {
            continue;
        }
        add_arrival(&mut totals, chunk_id, *score, 0);
        let improved = best.get(chunk_id).map(|&b| *score > b).unwrap_or(true);
        if improved {
            best.insert(chunk_id.clone(), *score);
            queue.push_back((chunk_id.clone(), *score, 0));
        }
    }

    while let Some((node, score, hops)) = queue.pop_front() {
        if cancel.is_cancelled() {
            break;
        }
        if hops >= max_hops {
            continue;
        }
        let Some(neighbors) = adjacency.get(&node) else {
            continue;
        };
        for (target, weight) in neighbors {
            let next_score = score * weight;
            if next_score < min_score {
                continue;
            }
            add_arrival(&mut totals, target, next_score, hops + 1);
            let improved = best.get(target).map(|&b| next_score > b).unwrap_or(true);
            if improved {
                best.insert(target.clone(), next_score);
                queue.push_back((target.clone(), next_score, hops + 1));
            }
        }
    }

    let mut hits: Vec<TraversalHit> = totals
        .into_iter()
        .map(|(chunk_id, (score, hops))| TraversalHit { chunk_id, score, hops })
        .collect();
    hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    hits
}

/// Records one more path arriving at `node`, summing into its running score
/// and keeping the shallowest depth at which it was reached.
fn add_arrival(totals: &mut HashMap<String, (f64, u32)>, node: &str, weight: f64, hops: u32) {
    totals
        .entry(node.to_string())
        .and_modify(|(sum, min_hops)| {
            *sum += weight;
            *min_hops = (*min_hops).min(hops);
        })
        .or_insert((weight, hops));
}

fn build_adjacency(edges: &[WeightedEdge]) -> HashMap<String, Vec<(String, f64)>> {
    let mut adjacency: HashMap<String, Vec<(String, f64)>> = HashMap::new();
    for edge in edges {
        adjacency
            .entry(edge.from.clone())
            .or_default()
            .push((edge.to.clone(), edge.weight));
    }
    adjacency
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge(from: &str, to: &str, weight: f64) -> WeightedEdge {
        WeightedEdge { from: from.to_string(), to: to.to_string(), weight }
    }

    #[test]
    fn accumulates_sum_product_along_a_chain() {
        let edges = vec![edge("a", "b", 0.8), edge("b", "c", 0.5)];
        let seeds = vec![("a".to_string(), 1.0)];
        let hits = traverse(&edges, &seeds, 10, 0.0, &CancelToken::new());

        let c = hits.iter().find(|h| h.chunk_id == "c").unwrap();
        assert!((c.score - 0.4).abs() < 1e-9);
    }

    #[test]
    fn cycles_attenuate_rather_than_loop_forever() {
        let edges = vec![edge("a", "b", 0.9), edge("b", "a", 0.9), edge("b", "c", 0.5)];
        let seeds = vec![("a".to_string(), 1.0)];
        let hits = traverse(&edges, &seeds, 50, 0.0, &CancelToken::new());

        let c = hits.iter().find(|h| h.chunk_id == "c").unwrap();
        assert!((c.score - 0.45).abs() < 1e-9);
    }

    #[test]
    fn disjoint_paths_into_the_same_node_sum_rather_than_take_the_max() {
        let edges = vec![
            edge("s", "a", 0.5),
            edge("s", "b", 0.4),
            edge("a", "t", 0.6),
            edge("b", "t", 0.7),
        ];
        let seeds = vec![("s".to_string(), 1.0)];
        let hits = traverse(&edges, &seeds, 10, 0.0, &CancelToken::new());

        let a = hits.iter().find(|h| h.chunk_id == "a").unwrap();
        let b = hits.iter().find(|h| h.chunk_id == "b").unwrap();
        let t = hits.iter().find(|h| h.chunk_id == "t").unwrap();
        assert!((a.score - 0.5).abs() < 1e-9);
        assert!((b.score - 0.4).abs() < 1e-9);
        assert!((t.score - 0.58).abs() < 1e-9);
    }

    #[test]
    fn min_score_floor_prunes_weak_paths() {
        let edges = vec![edge("a", "b", 0.01)];
        let seeds = vec![("a".to_string(), 1.0)];
        let hits = traverse(&edges, &seeds, 10, 0.5, &CancelToken::new());

        assert!(hits.iter().all(|h| h.chunk_id != "b"));
    }

    #[test]
    fn max_hops_bounds_depth() {
        let edges = vec![edge("a", "b", 1.0), edge("b", "c", 1.0), edge("c", "d", 1.0)];
        let seeds = vec![("a".to_string(), 1.0)];
        let hits = traverse(&edges, &seeds, 1, 0.0, &CancelToken::new());

        assert!(hits.iter().any(|h| h.chunk_id == "b"));
        assert!(hits.iter().all(|h| h.chunk_id != "c"));
    }

    #[test]
    fn cancellation_stops_exploration_early() {
        let edges = vec![edge("a", "b", 1.0), edge("b", "c", 1.0)];
        let seeds = vec![("a".to_string(), 1.0)];
        let cancel = CancelToken::new();
        cancel.cancel();
        let hits = traverse(&edges, &seeds, 10, 0.0, &cancel);

        // The seed itself is always recorded; nothing beyond it is explored.
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk_id, "a");
    }
}
