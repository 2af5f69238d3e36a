//! Pure algebra over the causal memory store's domain types: vector clock
//! operations, decay kernel evaluation, and angular distance / centroid
//! geometry. No I/O, no persistence — those live in `cmem-store`.

pub mod cancel;
pub mod clock;
pub mod decay;
pub mod geometry;
