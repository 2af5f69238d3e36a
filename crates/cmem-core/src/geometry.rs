/// `cos(a,b) = clamp(dot(a,b) / (|a|*|b|), -1, 1)`. Zero vectors yield 0,
/// (avoids a NaN from dividing by a zero norm).
pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "cosine requires equal-dimension vectors");
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a = l2_norm(a);
    let norm_b = l2_norm(b);
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a * norm_b)).clamp(-1.0, 1.0)
}

/// `angular(a,b) = acos(cos(a,b)) / pi`, in `[0, 1]`. 0 means identical
/// direction, 1 means opposite.
pub fn angular(a: &[f32], b: &[f32]) -> f32 {
    let cos = cosine(a, b);
    cos.acos() / std::f32::consts::PI
}

fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Component-wise mean of a set of embeddings, re-normalised to unit
/// length. The empty set returns an empty vector.
pub fn centroid<'a>(vectors: impl IntoIterator<Item = &'a [f32]>) -> Vec<f32> {
    let mut sum: Vec<f32> = Vec::new();
    let mut count = 0usize;
    for v in vectors {
        if sum.is_empty() {
            sum = vec![0.0; v.len()];
        }
        debug_assert_eq!(sum.len(), v.len(), "centroid requires equal-dimension vectors");
        for (s, x) in sum.iter_mut().zip(v.iter()) {
            *s += x;
        }
        count += 1;
    }
    if count == 0 {
        return Vec::new();
    }
    for s in sum.iter_mut() {
        *s /= count as f32;
    }
    let norm = l2_norm(&sum);
    if norm > 0.0 {
        for s in sum.iter_mut() {
            *s /= norm;
        }
    }
    sum
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_vectors_have_zero_angular_distance() {
        let a = [1.0_f32, 2.0, 3.0];
        assert!(angular(&a, &a) < 1e-5);
    }

    #[test]
    fn opposite_vectors_have_max_angular_distance() {
        let a = [1.0_f32, 0.0];
        let b = [-1.0_f32, 0.0];
        assert!((angular(&a, &b) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn orthogonal_vectors_are_midpoint() {
        let a = [1.0_f32, 0.0];
        let b = [0.0_f32, 1.0];
        assert!((angular(&a, &b) - 0.5).abs() < 1e-5);
    }

    #[test]
    fn zero_vector_yields_zero_cosine() {
        let a = [0.0_f32, 0.0];
        let b = [1.0_f32, 1.0];
        assert_eq!(cosine(&a, &b), 0.0);
    }

    #[test]
    fn centroid_of_empty_set_is_empty() {
        let c = centroid(std::iter::empty());
        assert!(c.is_empty());
    }

    #[test]
    fn centroid_is_unit_normalised() {
        let vectors: Vec<Vec<f32>> = vec![vec![1.0, 0.0], vec![3.0, 0.0]];
        let refs: Vec<&[f32]> = vectors.iter().map(|v| v.as_slice()).collect();
        let c = centroid(refs);
        let norm = l2_norm(&c);
        assert!((norm - 1.0).abs() < 1e-5);
    }
}
