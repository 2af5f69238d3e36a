use std::collections::HashMap;

use cmem_core::cancel::CancelToken;
use cmem_core::geometry::angular;

/// How a flat clustering is carved out of the condensed cluster tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterSelectionMethod {
    /// Excess-of-mass: prefer a cluster over its children whenever its own
    /// stability already exceeds the sum of their stabilities.
    Eom,
    /// Always descend to the leaves of the condensed tree, ignoring
    /// stability. Produces many small, tight clusters.
    Leaf,
}

#[derive(Debug, Clone)]
pub struct HdbscanConfig {
    pub min_cluster_size: usize,
    pub min_samples: usize,
    pub selection: ClusterSelectionMethod,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HdbscanResult {
    /// One entry per input point, in input order. `None` means noise.
    pub labels: Vec<Option<usize>>,
    /// Membership confidence per point; 1.0 for any clustered point, 0.0
    /// for noise (per the fixed-confidence convention adopted here instead
    /// of distance-scaled soft membership).
    pub probabilities: Vec<f64>,
}

#[derive(Debug, Clone, Copy)]
enum NodeRef {
    Leaf(usize),
    Internal(usize),
}

struct DendroNode {
    left: NodeRef,
    right: NodeRef,
    distance: f64,
    size: usize,
}

struct CondensedCluster {
    parent: Option<usize>,
    birth_lambda: f64,
    children: Vec<usize>,
    direct_members: Vec<(usize, f64)>,
}

impl CondensedCluster {
    fn stability(&self) -> f64 {
        self.direct_members
            .iter()
            .map(|&(_, lambda_death)| (lambda_death - self.birth_lambda).max(0.0))
            .sum()
    }
}

/// Runs density-based clustering over a set of embeddings using angular
/// distance. Returns noise (`None`) for any point not part of a dense
/// enough region.
pub fn cluster(embeddings: &[Vec<f32>], config: &HdbscanConfig, cancel: &CancelToken) -> HdbscanResult {
    let n = embeddings.len();
    if n == 0 {
        return HdbscanResult { labels: Vec::new(), probabilities: Vec::new() };
    }
    if n == 1 {
        return HdbscanResult { labels: vec![None], probabilities: vec![0.0] };
    }

    let dist = pairwise_distances(embeddings);
    let core = core_distances(&dist, config.min_samples);
    let mutual = mutual_reachability(&dist, &core);

    if cancel.is_cancelled() {
        return HdbscanResult { labels: vec![None; n], probabilities: vec![0.0; n] };
    }

    let mst = minimum_spanning_tree(&mutual);
    let nodes = build_dendrogram(n, &mst);

    if cancel.is_cancelled() {
        return HdbscanResult { labels: vec![None; n], probabilities: vec![0.0; n] };
    }

    let root_idx = nodes.len() - 1;
    let mut clusters = vec![CondensedCluster {
        parent: None,
        birth_lambda: 0.0,
        children: Vec::new(),
        direct_members: Vec::new(),
    }];
    condense(&nodes, NodeRef::Internal(root_idx), 0, &mut clusters, config.min_cluster_size);

    let selected = match config.selection {
        ClusterSelectionMethod::Eom => select_eom(&clusters),
        ClusterSelectionMethod::Leaf => select_leaves(&clusters),
    };

    assign_labels(n, &clusters, &selected)
}

fn pairwise_distances(embeddings: &[Vec<f32>]) -> Vec<Vec<f64>> {
    let n = embeddings.len();
    let mut dist = vec![vec![0.0_f64; n]; n];
    for i in 0..n {
        for j in (i + 1)..n {
            let d = angular(&embeddings[i], &embeddings[j]) as f64;
            dist[i][j] = d;
            dist[j][i] = d;
        }
    }
    dist
}

/// Distance to the `min_samples`-th nearest neighbour (excluding self).
fn core_distances(dist: &[Vec<f64>], min_samples: usize) -> Vec<f64> {
    let n = dist.len();
    let k = min_samples.max(1).min(n.saturating_sub(1)).max(1);
    (0..n)
        .map(|i| {
            let mut row: Vec<f64> = dist[i].iter().enumerate().filter(|&(j, _)| j != i).map(|(_, &d)| d).collect();
            row.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
            row.get(k - 1).copied().unwrap_or(0.0)
        })
        .collect()
}

fn mutual_reachability(dist: &[Vec<f64>], core: &[f64]) -> Vec<Vec<f64>> {
    let n = dist.len();
    let mut mutual = vec![vec![0.0_f64; n]; n];
    for i in 0..n {
        for j in 0..n {
            if i == j {
                continue;
            }
            mutual[i][j] = dist[i][j].max(core[i]).max(core[j]);
        }
    }
    mutual
}

/// Prim's algorithm over a dense distance matrix.
fn minimum_spanning_tree(mutual: &[Vec<f64>]) -> Vec<(usize, usize, f64)> {
    let n = mutual.len();
    let mut in_tree = vec![false; n];
    let mut best_dist = vec![f64::INFINITY; n];
    let mut best_from = vec![0usize; n];
    best_dist[0] = 0.0;
    in_tree[0] = true;

    let mut edges = Vec::with_capacity(n.saturating_sub(1));
    let mut last_added = 0usize;
    for _ in 1..n {
        // Update frontier distances from the most recently added node, then
        // pick the globally closest frontier point.
        for j in 0..n {
            if in_tree[j] {
                continue;
            }
            let d = mutual[last_added][j];
            if d < best_dist[j] {
                best_dist[j] = d;
                best_from[j] = last_added;
            }
        }

        let next = (0..n)
            .filter(|&j| !in_tree[j])
            .min_by(|&a, &b| best_dist[a].partial_cmp(&best_dist[b]).unwrap_or(std::cmp::Ordering::Equal))
            .unwrap();
        in_tree[next] = true;
        edges.push((best_from[next], next, best_dist[next]));
        last_added = next;
    }
    edges
}

fn build_dendrogram(n: usize, mst_edges: &[(usize, usize, f64)]) -> Vec<DendroNode> {
    let mut sorted = mst_edges.to_vec();
    sorted.sort_by(|a, b| a.2.partial_cmp(&b.2).unwrap_or(std::cmp::Ordering::Equal));

    let mut parent: Vec<usize> = (0..n).collect();
    let mut node_ref: Vec<NodeRef> = (0..n).map(NodeRef::Leaf).collect();
    let mut nodes = Vec::with_capacity(n.saturating_sub(1));

    fn find(parent: &mut [usize], x: usize) -> usize {
        if parent[x] != x {
            parent[x] = find(parent, parent[x]);
        }
        parent[x]
    }

    for (a, b, distance) in sorted {
        let ra = find(&mut parent, a);
        let rb = find(&mut parent, b);
        if ra == rb {
            continue;
        }
        let left = node_ref[ra];
        let right = node_ref[rb];
        let size = size_of(&nodes, left) + size_of(&nodes, right);
        let new_idx = nodes.len();
        nodes.push(DendroNode { left, right, distance, size });
        parent[ra] = rb;
        node_ref[rb] = NodeRef::Internal(new_idx);
    }
    nodes
}

fn size_of(nodes: &[DendroNode], node: NodeRef) -> usize {
    match node {
        NodeRef::Leaf(_) => 1,
        NodeRef::Internal(idx) => nodes[idx].size,
    }
}

fn condense(
    nodes: &[DendroNode],
    node: NodeRef,
    enclosing_cluster: usize,
    clusters: &mut Vec<CondensedCluster>,
    min_cluster_size: usize,
) {
    let NodeRef::Internal(node_idx) = node else {
        return;
    };
    let distance = nodes[node_idx].distance;
    let lambda = if distance > 0.0 { 1.0 / distance } else { f64::MAX };

    for child in [nodes[node_idx].left, nodes[node_idx].right] {
        match child {
            NodeRef::Leaf(point) => {
                clusters[enclosing_cluster].direct_members.push((point, lambda));
            }
            NodeRef::Internal(child_idx) => {
                if nodes[child_idx].size < min_cluster_size {
                    collect_points(nodes, NodeRef::Internal(child_idx), &mut |point| {
                        clusters[enclosing_cluster].direct_members.push((point, lambda));
                    });
                } else {
                    let new_id = clusters.len();
                    clusters.push(CondensedCluster {
                        parent: Some(enclosing_cluster),
                        birth_lambda: lambda,
                        children: Vec::new(),
                        direct_members: Vec::new(),
                    });
                    clusters[enclosing_cluster].children.push(new_id);
                    condense(nodes, NodeRef::Internal(child_idx), new_id, clusters, min_cluster_size);
                }
            }
        }
    }
}

fn collect_points(nodes: &[DendroNode], node: NodeRef, out: &mut impl FnMut(usize)) {
    match node {
        NodeRef::Leaf(point) => out(point),
        NodeRef::Internal(idx) => {
            collect_points(nodes, nodes[idx].left, out);
            collect_points(nodes, nodes[idx].right, out);
        }
    }
}

fn select_eom(clusters: &[CondensedCluster]) -> Vec<usize> {
    let n = clusters.len();
    let mut agg = vec![0.0_f64; n];
    for id in (0..n).rev() {
        let own = clusters[id].stability();
        let children_sum: f64 = clusters[id].children.iter().map(|&c| agg[c]).sum();
        agg[id] = own.max(children_sum);
    }

    let mut selected = Vec::new();
    let mut stack = vec![0usize];
    while let Some(id) = stack.pop() {
        let own = clusters[id].stability();
        let children_sum: f64 = clusters[id].children.iter().map(|&c| agg[c]).sum();
        if clusters[id].children.is_empty() || own >= children_sum {
            selected.push(id);
        } else {
            stack.extend(clusters[id].children.iter().copied());
        }
    }
    selected
}

fn select_leaves(clusters: &[CondensedCluster]) -> Vec<usize> {
    (0..clusters.len()).filter(|&id| clusters[id].children.is_empty()).collect()
}

fn assign_labels(n: usize, clusters: &[CondensedCluster], selected: &[usize]) -> HdbscanResult {
    let selected_set: std::collections::HashSet<usize> = selected.iter().copied().collect();
    let mut labels = vec![None; n];

    for (cluster_id, cluster) in clusters.iter().enumerate() {
        for &(point, _lambda_death) in &cluster.direct_members {
            let mut current = Some(cluster_id);
            let mut resolved = None;
            while let Some(id) = current {
                if selected_set.contains(&id) {
                    resolved = Some(id);
                    break;
                }
                current = clusters[id].parent;
            }
            labels[point] = resolved;
        }
    }

    let probabilities = labels.iter().map(|l| if l.is_some() { 1.0 } else { 0.0 }).collect();
    HdbscanResult { labels, probabilities }
}

/// Assigns a freshly embedded chunk to the nearest existing cluster
/// centroid, or leaves it unassigned if nothing is close enough.
pub fn predict(embedding: &[f32], centroids: &[(usize, Vec<f32>)], max_distance: f32) -> Option<usize> {
    centroids
        .iter()
        .map(|(id, centroid)| (*id, angular(embedding, centroid)))
        .filter(|&(_, d)| d <= max_distance)
        .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(id, _)| id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(x: f32, y: f32) -> Vec<f32> {
        vec![x, y]
    }

    #[test]
    fn empty_input_returns_empty_result() {
        let result = cluster(&[], &HdbscanConfig { min_cluster_size: 2, min_samples: 1, selection: ClusterSelectionMethod::Eom }, &CancelToken::new());
        assert!(result.labels.is_empty());
    }

    #[test]
    fn single_point_is_noise() {
        let result = cluster(&[point(1.0, 0.0)], &HdbscanConfig { min_cluster_size: 2, min_samples: 1, selection: ClusterSelectionMethod::Eom }, &CancelToken::new());
        assert_eq!(result.labels, vec![None]);
    }

    #[test]
    fn two_separated_dense_groups_form_two_clusters() {
        let embeddings = vec![
            point(1.0, 0.0),
            point(0.99, 0.01),
            point(0.98, 0.02),
            point(0.0, 1.0),
            point(0.01, 0.99),
            point(0.02, 0.98),
        ];
        let config = HdbscanConfig { min_cluster_size: 3, min_samples: 2, selection: ClusterSelectionMethod::Eom };
        let result = cluster(&embeddings, &config, &CancelToken::new());

        let group_a: std::collections::HashSet<_> = result.labels[0..3].iter().collect();
        let group_b: std::collections::HashSet<_> = result.labels[3..6].iter().collect();
        assert_eq!(group_a.len(), 1, "first group should share one label");
        assert_eq!(group_b.len(), 1, "second group should share one label");
        assert_ne!(result.labels[0], result.labels[3], "the two groups should differ");
        assert!(result.labels[0].is_some());
    }

    #[test]
    fn leaf_selection_never_panics_on_uniform_cloud() {
        let embeddings: Vec<Vec<f32>> = (0..8).map(|i| point(i as f32, 0.0)).collect();
        let config = HdbscanConfig { min_cluster_size: 2, min_samples: 1, selection: ClusterSelectionMethod::Leaf };
        let result = cluster(&embeddings, &config, &CancelToken::new());
        assert_eq!(result.labels.len(), 8);
    }

    #[test]
    fn predict_assigns_nearest_centroid_within_threshold() {
        let centroids = vec![(1usize, point(1.0, 0.0)), (2usize, point(0.0, 1.0))];
        let label = predict(&point(0.9, 0.1), &centroids, 0.3);
        assert_eq!(label, Some(1));
    }

    #[test]
    fn predict_returns_none_when_nothing_close_enough() {
        let centroids = vec![(1usize, point(1.0, 0.0))];
        let label = predict(&point(-1.0, 0.0), &centroids, 0.1);
        assert_eq!(label, None);
    }
}
