use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

/// A named grouping of chunks produced by HDBSCAN clustering.
#[derive(Debug, Clone, PartialEq)]
pub struct Cluster {
    pub id: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub centroid: Vec<f32>,
    pub exemplar_ids: Vec<String>,
    pub membership_hash: String,
    pub created_at: DateTime<Utc>,
    pub refreshed_at: Option<DateTime<Utc>>,
}

/// A chunk's assignment into a cluster, with angular distance to centroid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClusterAssignment<'a> {
    pub chunk_id: &'a str,
    pub cluster_id: &'a str,
    pub distance: f32,
}

/// Stable digest of a cluster's sorted member-id list: used to
/// detect a no-op re-cluster outcome without comparing full member sets.
pub fn membership_hash<I, S>(member_ids: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut ids: Vec<String> = member_ids.into_iter().map(|s| s.as_ref().to_string()).collect();
    ids.sort_unstable();
    let joined = ids.join("\n");
    let mut hasher = Sha256::new();
    hasher.update(joined.as_bytes());
    hex_encode(&hasher.finalize())
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        write!(out, "{:02x}", b).expect("writing to a String never fails");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_order_independent() {
        let a = membership_hash(["x", "y", "z"]);
        let b = membership_hash(["z", "x", "y"]);
        assert_eq!(a, b);
    }

    #[test]
    fn hash_changes_with_membership() {
        let a = membership_hash(["x", "y"]);
        let b = membership_hash(["x", "y", "z"]);
        assert_ne!(a, b);
    }

    #[test]
    fn empty_set_is_deterministic() {
        let a = membership_hash(Vec::<String>::new());
        let b = membership_hash(Vec::<String>::new());
        assert_eq!(a, b);
    }
}
