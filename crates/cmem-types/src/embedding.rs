use chrono::{DateTime, Utc};

use crate::error::{Error, Result};

/// In-memory mirror of a `vectors` row: the embedding plus
/// TTL bookkeeping used by the vector store's orphan/cleanup semantics.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorRecord {
    pub chunk_id: String,
    pub embedding: Vec<f32>,
    pub orphaned_at: Option<DateTime<Utc>>,
    pub last_accessed: DateTime<Utc>,
}

impl VectorRecord {
    pub fn is_orphaned(&self) -> bool {
        self.orphaned_at.is_some()
    }
}

/// Encodes an embedding as a packed little-endian 4-byte-per-component
/// blob.
pub fn encode_embedding(vector: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vector.len() * 4);
    for component in vector {
        bytes.extend_from_slice(&component.to_le_bytes());
    }
    bytes
}

/// Decodes a packed little-endian 4-byte-per-component blob back into an
/// embedding. Errors if the byte length is not a multiple of 4.
pub fn decode_embedding(bytes: &[u8]) -> Result<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(Error::Validation(format!(
            "embedding blob length {} is not a multiple of 4",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes(chunk.try_into().expect("chunk is exactly 4 bytes")))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_bit_exact() {
        let original = vec![1.0_f32, -2.5, 0.0, f32::MAX, f32::MIN_POSITIVE];
        let blob = encode_embedding(&original);
        let decoded = decode_embedding(&blob).unwrap();
        assert_eq!(original, decoded);
    }

    #[test]
    fn rejects_truncated_blob() {
        let bytes = vec![0u8; 5];
        assert!(decode_embedding(&bytes).is_err());
    }

    #[test]
    fn empty_vector_round_trips() {
        let blob = encode_embedding(&[]);
        assert!(blob.is_empty());
        assert_eq!(decode_embedding(&blob).unwrap(), Vec::<f32>::new());
    }
}
