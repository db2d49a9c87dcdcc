//! Distance functions for the similarity methods the index supports.
//!
//! All three methods are expressed as *distances*: smaller values mean more
//! similar vectors, so result lists sort ascending regardless of the method.
//!
//! | Method     | Distance                         | Identical vectors |
//! |------------|----------------------------------|-------------------|
//! | cosine     | `1 - (a·b) / (‖a‖‖b‖)`           | 0.0               |
//! | dotp       | `-(a·b)`                         | `-‖a‖²`           |
//! | l2norm     | `√Σ(aᵢ-bᵢ)²`                     | 0.0               |

/// Similarity method, fixed per index at allocation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Cosine,
    DotProduct,
    L2Norm,
}

impl Method {
    /// Distance between two vectors of equal length.
    #[inline]
    pub fn distance(self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Method::Cosine => cosine_distance(a, b),
            Method::DotProduct => -dot_product(a, b),
            Method::L2Norm => l2_distance(a, b),
        }
    }
}

/// Plain dot product. The scalar loop auto-vectorizes well enough here; the
/// hot path is a hash-map lookup per candidate, not the multiply-adds.
#[inline]
pub fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Cosine distance: `1 - cos(θ)`. Zero-norm inputs are treated as maximally
/// dissimilar rather than producing NaN.
#[inline]
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let dot = dot_product(a, b);
    let na = dot_product(a, a).sqrt();
    let nb = dot_product(b, b).sqrt();
    if na == 0.0 || nb == 0.0 {
        return 1.0;
    }
    1.0 - dot / (na * nb)
}

/// Euclidean (L2) distance.
#[inline]
pub fn l2_distance(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum::<f32>()
        .sqrt()
}

/// Return a unit-length copy of `v` (zero vectors pass through unchanged).
pub fn l2_normalized(v: &[f32]) -> Vec<f32> {
    let norm = dot_product(v, v).sqrt();
    if norm == 0.0 {
        return v.to_vec();
    }
    v.iter().map(|x| x / norm).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_identical_is_zero() {
        let v = [1.0, 0.0, 0.0, 0.0];
        assert_eq!(cosine_distance(&v, &v), 0.0);
        assert_eq!(Method::Cosine.distance(&v, &v), 0.0);
    }

    #[test]
    fn test_cosine_orthogonal() {
        let a = [1.0, 0.0];
        let b = [0.0, 1.0];
        assert!((cosine_distance(&a, &b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_zero_norm_does_not_nan() {
        let a = [0.0, 0.0];
        let b = [1.0, 0.0];
        let d = cosine_distance(&a, &b);
        assert!(!d.is_nan());
        assert_eq!(d, 1.0);
    }

    #[test]
    fn test_l2_distance() {
        let a = [0.0, 0.0];
        let b = [3.0, 4.0];
        assert!((l2_distance(&a, &b) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_dotp_orders_by_similarity() {
        let q = [1.0, 0.0];
        let near = [0.9, 0.1];
        let far = [0.1, 0.9];
        assert!(Method::DotProduct.distance(&q, &near) < Method::DotProduct.distance(&q, &far));
    }

    #[test]
    fn test_l2_normalized() {
        let v = l2_normalized(&[3.0, 4.0]);
        let norm = dot_product(&v, &v).sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
    }
}
