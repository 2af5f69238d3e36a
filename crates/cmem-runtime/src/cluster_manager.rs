use std::collections::{HashMap, HashSet};

use chrono::Utc;
use cmem_core::cancel::CancelToken;
use cmem_core::geometry::{angular, centroid};
use cmem_graph::hdbscan::{self, ClusterSelectionMethod, HdbscanConfig};
use cmem_store::Database;
use cmem_types::{membership_hash, Cluster};

use crate::config::ClusteringConfig;
use crate::Result;

const EXEMPLAR_COUNT: usize = 3;
const JACCARD_MATCH_THRESHOLD: f64 = 0.5;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClusterRunReport {
    pub num_clusters: usize,
    pub assigned: usize,
    pub noise: usize,
    pub noise_ratio: f64,
    pub cluster_sizes: Vec<usize>,
    pub reassigned_noise: usize,
    pub duration_ms: u64,
}

struct OldCluster {
    name: Option<String>,
    description: Option<String>,
    members: HashSet<String>,
}

/// Full re-clustering: snapshot existing clusters for name/description
/// carry-forward, clear all cluster records, run HDBSCAN over every stored
/// embedding, persist the result, then reassign leftover noise points to any
/// cluster whose centroid they fall within the angular threshold of.
pub fn recluster(db: &Database, config: &ClusteringConfig, cancel: &CancelToken) -> Result<ClusterRunReport> {
    let started = Utc::now();

    let old_clusters = snapshot_old_clusters(db)?;
    db.delete_all_clusters()?;

    let vectors = db.all_vectors()?;
    let ids: Vec<String> = vectors.iter().map(|v| v.chunk_id.clone()).collect();
    let embeddings: Vec<Vec<f32>> = vectors.iter().map(|v| v.embedding.clone()).collect();

    let hdbscan_config = HdbscanConfig {
        min_cluster_size: config.min_cluster_size,
        min_samples: config.min_samples,
        selection: if config.use_leaf_selection { ClusterSelectionMethod::Leaf } else { ClusterSelectionMethod::Eom },
    };
    let result = hdbscan::cluster(&embeddings, &hdbscan_config, cancel);

    let mut by_label: HashMap<usize, Vec<usize>> = HashMap::new();
    let mut noise_indices = Vec::new();
    for (idx, label) in result.labels.iter().enumerate() {
        match label {
            Some(label) => by_label.entry(*label).or_default().push(idx),
            None => noise_indices.push(idx),
        }
    }

    let mut new_clusters: Vec<(Cluster, Vec<String>)> = Vec::new();
    for member_indices in by_label.values() {
        let member_ids: Vec<String> = member_indices.iter().map(|&i| ids[i].clone()).collect();
        let member_embeddings: Vec<&[f32]> = member_indices.iter().map(|&i| embeddings[i].as_slice()).collect();
        let centroid_vec = centroid(member_embeddings.iter().copied());

        let mut exemplars = member_indices.clone();
        exemplars.sort_by(|&a, &b| {
            angular(&embeddings[a], &centroid_vec)
                .partial_cmp(&angular(&embeddings[b], &centroid_vec))
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let exemplar_ids: Vec<String> = exemplars.iter().take(EXEMPLAR_COUNT).map(|&i| ids[i].clone()).collect();

        let cluster = Cluster {
            id: format!("cluster-{}", uuid_like(&member_ids)),
            name: None,
            description: None,
            centroid: centroid_vec,
            exemplar_ids,
            membership_hash: membership_hash(&member_ids),
            created_at: Utc::now(),
            refreshed_at: None,
        };
        new_clusters.push((cluster, member_ids));
    }

    let matched = carry_forward_labels(new_clusters, &old_clusters);

    for (cluster, member_ids) in &matched {
        db.upsert_cluster(cluster)?;
        for member_id in member_ids {
            let distance = db
                .get_vector(member_id)?
                .map(|v| angular(&v.embedding, &cluster.centroid))
                .unwrap_or(0.0);
            db.assign_cluster(member_id, &cluster.id, distance)?;
        }
    }

    let reassigned_noise = reassign_noise(db, &matched, &ids, &embeddings, &noise_indices, config.min_cluster_size)?;

    let assigned: usize = matched.iter().map(|(_, members)| members.len()).sum();
    let total = ids.len();
    let noise = total.saturating_sub(assigned).saturating_sub(reassigned_noise);
    let noise_ratio = if total == 0 { 0.0 } else { noise as f64 / total as f64 };

    Ok(ClusterRunReport {
        num_clusters: matched.len(),
        assigned: assigned + reassigned_noise,
        noise,
        noise_ratio,
        cluster_sizes: matched.iter().map(|(_, members)| members.len()).collect(),
        reassigned_noise,
        duration_ms: (Utc::now() - started).num_milliseconds().max(0) as u64,
    })
}

fn snapshot_old_clusters(db: &Database) -> Result<Vec<OldCluster>> {
    let mut snapshot = Vec::new();
    for cluster in db.all_clusters()? {
        let members = db.cluster_members(&cluster.id)?.into_iter().collect();
        snapshot.push(OldCluster { name: cluster.name, description: cluster.description, members });
    }
    Ok(snapshot)
}

/// Greedy Jaccard matching (threshold >= 0.5) between snapshotted old
/// clusters and freshly computed ones, consuming both sides as matches are
/// made; a matched new cluster inherits the old cluster's name/description.
fn carry_forward_labels(mut new_clusters: Vec<(Cluster, Vec<String>)>, old_clusters: &[OldCluster]) -> Vec<(Cluster, Vec<String>)> {
    let mut used_old: HashSet<usize> = HashSet::new();

    for (cluster, members) in new_clusters.iter_mut() {
        let member_set: HashSet<&String> = members.iter().collect();
        let mut best: Option<(usize, f64)> = None;

        for (old_idx, old) in old_clusters.iter().enumerate() {
            if used_old.contains(&old_idx) {
                continue;
            }
            let intersection = member_set.iter().filter(|m| old.members.contains(**m)).count();
            let union = member_set.len() + old.members.len() - intersection;
            if union == 0 {
                continue;
            }
            let jaccard = intersection as f64 / union as f64;
            if jaccard >= JACCARD_MATCH_THRESHOLD && best.map(|(_, b)| jaccard > b).unwrap_or(true) {
                best = Some((old_idx, jaccard));
            }
        }

        if let Some((old_idx, _)) = best {
            used_old.insert(old_idx);
            cluster.name = old_clusters[old_idx].name.clone();
            cluster.description = old_clusters[old_idx].description.clone();
        }
    }

    new_clusters
}

/// Assigns each still-noise point to every existing cluster whose centroid
/// it falls within `angular_threshold` of, then refreshes affected
/// centroids. Returns the count of points that gained at least one
/// assignment.
fn reassign_noise(
    db: &Database,
    clusters: &[(Cluster, Vec<String>)],
    ids: &[String],
    embeddings: &[Vec<f32>],
    noise_indices: &[usize],
    min_cluster_size: usize,
) -> Result<usize> {
    let angular_threshold = noise_threshold(min_cluster_size);
    let mut reassigned = 0usize;
    let mut gained: HashMap<String, Vec<String>> = HashMap::new();

    for &idx in noise_indices {
        let point_id = &ids[idx];
        let mut matched_any = false;
        for (cluster, _) in clusters {
            let distance = angular(&embeddings[idx], &cluster.centroid);
            if distance <= angular_threshold {
                db.assign_cluster(point_id, &cluster.id, distance)?;
                gained.entry(cluster.id.clone()).or_default().push(point_id.clone());
                matched_any = true;
            }
        }
        if matched_any {
            reassigned += 1;
        }
    }

    for (cluster, _) in clusters {
        let Some(new_members) = gained.get(&cluster.id) else {
            continue;
        };
        let mut all_vectors: Vec<Vec<f32>> = db
            .cluster_members(&cluster.id)?
            .iter()
            .filter_map(|id| db.get_vector(id).ok().flatten())
            .map(|v| v.embedding)
            .collect();
        all_vectors.extend(new_members.iter().filter_map(|id| db.get_vector(id).ok().flatten()).map(|v| v.embedding));
        let refreshed_centroid = centroid(all_vectors.iter().map(|v| v.as_slice()));

        let mut updated = cluster.clone();
        updated.centroid = refreshed_centroid;
        updated.refreshed_at = Some(Utc::now());
        db.upsert_cluster(&updated)?;
    }

    Ok(reassigned)
}

/// Online path: assign a newly embedded point to every existing cluster
/// whose centroid is within the configured angular threshold, without a
/// full re-cluster.
pub fn assign_online(db: &Database, chunk_id: &str, embedding: &[f32], min_cluster_size: usize) -> Result<Vec<String>> {
    let angular_threshold = noise_threshold(min_cluster_size);
    let mut assigned = Vec::new();
    for cluster in db.all_clusters()? {
        let distance = angular(embedding, &cluster.centroid);
        if distance <= angular_threshold {
            db.assign_cluster(chunk_id, &cluster.id, distance)?;
            assigned.push(cluster.id);
        }
    }
    Ok(assigned)
}

/// A configured threshold for "close enough to join without re-clustering".
/// Scales gently with `min_cluster_size` since larger target clusters
/// tolerate a slightly looser boundary.
fn noise_threshold(min_cluster_size: usize) -> f32 {
    (0.15 + 0.01 * min_cluster_size as f32).min(0.35)
}

/// A short, deterministic id derived from a cluster's member set so tests
/// and re-runs are reproducible without a random id generator.
fn uuid_like(member_ids: &[String]) -> String {
    membership_hash(member_ids)[..12].to_string()
}
