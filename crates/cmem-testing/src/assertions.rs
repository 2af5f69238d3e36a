//! Custom assertions for store-shaped test expectations. Each function
//! panics with a descriptive message on failure so call sites read like
//! plain `assert!` statements without duplicating lookup code everywhere.

use cmem_store::Database;
use cmem_types::EdgeDirection;

/// Panics unless an edge exists from `source` to `target` in `direction`.
pub fn assert_edge_exists(db: &Database, source: &str, target: &str, direction: EdgeDirection) {
    let outgoing = db
        .outgoing_edges(source, Some(direction))
        .expect("list outgoing edges");
    assert!(
        outgoing.iter().any(|e| e.target_chunk_id == target),
        "expected an edge {source} -> {target} ({direction:?}), found none among {outgoing:?}"
    );
}

/// Panics unless no edge exists between `source` and `target` in either
/// direction.
pub fn assert_no_edge_between(db: &Database, source: &str, target: &str) {
    let outgoing = db.outgoing_edges(source, None).expect("list outgoing edges");
    assert!(
        !outgoing.iter().any(|e| e.target_chunk_id == target),
        "expected no edge between {source} and {target}, found one"
    );
}

/// Panics unless `chunk_id` is currently assigned to `cluster_id`.
pub fn assert_cluster_contains(db: &Database, cluster_id: &str, chunk_id: &str) {
    let members = db.cluster_members(cluster_id).expect("list cluster members");
    assert!(
        members.iter().any(|m| m == chunk_id),
        "expected cluster {cluster_id} to contain {chunk_id}, members were {members:?}"
    );
}

/// Panics unless the chunk has no remaining edges in the store (a pruning
/// postcondition).
pub fn assert_chunk_has_no_edges(db: &Database, chunk_id: &str) {
    let outgoing = db.outgoing_edges(chunk_id, None).expect("list outgoing edges");
    let incoming = db.incoming_edges(chunk_id, None).expect("list incoming edges");
    assert!(
        outgoing.is_empty() && incoming.is_empty(),
        "expected chunk {chunk_id} to have no edges, found {} outgoing and {} incoming",
        outgoing.len(),
        incoming.len()
    );
}
