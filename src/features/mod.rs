//! Feature extraction over the canonical canvas
//!
//! Two independent sub-operations: a color-histogram descriptor computed
//! directly from pixels, and a deep embedding read from a pretrained
//! classification backbone after global average pooling.

pub mod embedding;
pub mod histogram;

pub use embedding::EmbeddingExtractor;
pub use histogram::HistogramExtractor;

/// Concatenated per-channel histogram descriptor (`3 × bin_count` values)
pub type ColorHistogramFeature = Vec<f32>;

/// Pooled backbone activation, flattened to 1-D
pub type DeepEmbedding = Vec<f32>;

/// L2 norm of a feature vector, for display descriptions
#[must_use]
pub fn vector_norm(values: &[f32]) -> f32 {
    values.iter().map(|v| v * v).sum::<f32>().sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vector_norm() {
        assert!((vector_norm(&[3.0, 4.0]) - 5.0).abs() < f32::EPSILON);
        assert!(vector_norm(&[]) < f32::EPSILON);
    }
}
