//! Graph algorithms over the causal memory store: weighted traversal,
//! episodic chain walking, and HDBSCAN density clustering. Pure
//! computation over data handed in by the caller; no I/O, no persistence.

pub mod chain;
pub mod hdbscan;
pub mod traversal;
