//! Color-histogram descriptor
//!
//! Each of the three channels gets an independent intensity histogram over the
//! 0-255 range, min-max normalized into 0-1 (unit scale, deliberately not a
//! probability or L2 normalization), then the three are concatenated in
//! channel order R‖G‖B.

use super::{vector_norm, ColorHistogramFeature};
use crate::preprocess::FixedImage;

/// Computes color-histogram descriptors with a fixed bin count
#[derive(Debug, Clone)]
pub struct HistogramExtractor {
    bins: usize,
}

impl HistogramExtractor {
    /// Create an extractor with the given per-channel bin count
    ///
    /// The bin count is validated by `AnalysisConfigBuilder`; values outside
    /// 1..=256 are rejected there.
    #[must_use]
    pub fn new(bins: usize) -> Self {
        Self { bins }
    }

    /// Per-channel bin count
    #[must_use]
    pub fn bins(&self) -> usize {
        self.bins
    }

    /// Extract the descriptor and its display description
    ///
    /// The returned vector always has length `3 × bins`; each per-channel
    /// segment's values lie within 0-1. Pure function of the image pixels.
    #[must_use]
    pub fn extract(&self, image: &FixedImage) -> (ColorHistogramFeature, String) {
        let mut counts = vec![0u32; self.bins * 3];

        #[allow(clippy::indexing_slicing)]
        // Bin index is bounded by construction: value * bins / 256 < bins.
        for pixel in image.as_rgb().pixels() {
            for channel in 0..3 {
                let bin = usize::from(pixel.0[channel]) * self.bins / 256;
                counts[channel * self.bins + bin] += 1;
            }
        }

        let mut feature = Vec::with_capacity(self.bins * 3);
        for channel in 0..3 {
            let segment = counts
                .get(channel * self.bins..(channel + 1) * self.bins)
                .unwrap_or_default();
            feature.extend(min_max_normalize(segment));
        }

        let description = format!(
            "--- Color Histogram Feature ---\n\
             Type: RGB three-channel concatenation\n\
             Bins per channel: {}\n\
             Vector shape: ({},)\n\
             Vector norm: {:.4}",
            self.bins,
            feature.len(),
            vector_norm(&feature)
        );

        (feature, description)
    }
}

/// Min-max normalize one channel's counts into 0-1
///
/// A flat segment (all counts equal) normalizes to all zeros.
fn min_max_normalize(counts: &[u32]) -> Vec<f32> {
    let min = counts.iter().copied().min().unwrap_or(0);
    let max = counts.iter().copied().max().unwrap_or(0);
    if max == min {
        return vec![0.0; counts.len()];
    }
    let range = (max - min) as f32;
    counts
        .iter()
        .map(|&c| (c - min) as f32 / range)
        .collect()
}
