//! Vector scoring and the on-disk encoding of embedding vectors.

use anyhow::{anyhow, Result};
use zerocopy::IntoBytes;

/// Cosine similarity in `[-1, 1]`.
///
/// Degenerate inputs score `0.0` instead of failing: an empty vector, a
/// zero-magnitude vector, or vectors of different lengths (mixed embedding
/// models would otherwise be compared index-by-index against each other).
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || b.is_empty() || a.len() != b.len() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    let score = dot / (norm_a.sqrt() * norm_b.sqrt());
    if !score.is_finite() {
        return 0.0;
    }
    score.clamp(-1.0, 1.0) as f32
}

/// Packs a vector as native-endian `f32` bytes for a SQLite BLOB column.
pub fn vector_to_blob(vector: &[f32]) -> Vec<u8> {
    vector.as_bytes().to_vec()
}

/// Decodes native-endian `f32` bytes by copying, since SQLite BLOBs carry no alignment guarantee.
pub fn vector_from_blob(blob: &[u8]) -> Result<Vec<f32>> {
    if blob.len() % 4 != 0 {
        return Err(anyhow!(
            "embedding blob length {} is not a multiple of 4",
            blob.len()
        ));
    }
    Ok(blob
        .chunks_exact(4)
        .map(|c| f32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blob_roundtrip_preserves_values() {
        let v = vec![0.25f32, -1.5, 3.0];
        assert_eq!(vector_from_blob(&vector_to_blob(&v)).expect("decode"), v);
        assert!(vector_from_blob(&[]).expect("empty").is_empty());
    }

    #[test]
    fn blob_decodes_from_unaligned_slice() {
        let v = vec![1.5f32, -2.25];
        let mut padded = vec![0u8];
        padded.extend_from_slice(&vector_to_blob(&v));
        assert_eq!(vector_from_blob(&padded[1..]).expect("decode"), v);
    }

    #[test]
    fn truncated_blob_is_rejected() {
        assert!(vector_from_blob(&[0u8, 1, 2]).is_err());
    }

    #[test]
    fn opposite_vectors_score_minus_one() {
        let score = cosine_similarity(&[1.0, 2.0], &[-1.0, -2.0]);
        assert!((score + 1.0).abs() < 1e-6, "score was {score}");
    }
}
