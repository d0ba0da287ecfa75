//! Analysis configuration types
//!
//! Configuration is fixed at construction time; there is no runtime
//! reconfiguration API. The builder validates ranges so that downstream
//! stages can assume well-formed parameters.

use crate::{
    error::{PixelscopeError, Result},
    models::{ModelKind, ModelSpec},
};

/// Default canonical canvas width
pub const DEFAULT_TARGET_WIDTH: u32 = 512;
/// Default canonical canvas height
pub const DEFAULT_TARGET_HEIGHT: u32 = 512;
/// Default per-channel histogram bin count
pub const DEFAULT_HIST_BINS: usize = 64;
/// Default blend weight applied to the original image in overlays
pub const DEFAULT_OVERLAY_WEIGHT: f32 = 0.6;

/// Execution provider for inference backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ExecutionProvider {
    /// Auto-detect the best available provider (CUDA if present, else CPU)
    Auto,
    /// CPU execution only
    Cpu,
    /// NVIDIA CUDA GPU acceleration
    Cuda,
}

impl std::str::FromStr for ExecutionProvider {
    type Err = PixelscopeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "cpu" => Ok(Self::Cpu),
            "cuda" => Ok(Self::Cuda),
            other => Err(PixelscopeError::invalid_config(format!(
                "unknown execution provider '{other}' (expected auto, cpu, or cuda)"
            ))),
        }
    }
}

impl std::fmt::Display for ExecutionProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Cpu => write!(f, "cpu"),
            Self::Cuda => write!(f, "cuda"),
        }
    }
}

/// Unified configuration for the analysis pipeline
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    /// Canonical canvas width every input is stretched to
    pub target_width: u32,
    /// Canonical canvas height every input is stretched to
    pub target_height: u32,
    /// Per-channel histogram bin count over the 0-255 intensity range
    pub hist_bins: usize,
    /// Blend weight on the original image when compositing the segmentation
    /// overlay; the colorized mask gets `1.0 - overlay_weight`
    pub overlay_weight: f32,
    /// Execution provider for both model backends
    pub execution_provider: ExecutionProvider,
    /// Number of intra-op threads (0 = auto)
    pub intra_threads: usize,
    /// Number of inter-op threads (0 = auto)
    pub inter_threads: usize,
    /// Classification backbone specification
    pub classifier_spec: ModelSpec,
    /// Segmentation network specification
    pub segmenter_spec: ModelSpec,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            target_width: DEFAULT_TARGET_WIDTH,
            target_height: DEFAULT_TARGET_HEIGHT,
            hist_bins: DEFAULT_HIST_BINS,
            overlay_weight: DEFAULT_OVERLAY_WEIGHT,
            execution_provider: ExecutionProvider::Auto,
            intra_threads: 0,
            inter_threads: 0,
            classifier_spec: ModelSpec::registry_default(ModelKind::Classifier),
            segmenter_spec: ModelSpec::registry_default(ModelKind::Segmenter),
        }
    }
}

impl AnalysisConfig {
    /// Create a new configuration builder
    #[must_use]
    pub fn builder() -> AnalysisConfigBuilder {
        AnalysisConfigBuilder::new()
    }
}

/// Builder for `AnalysisConfig`
pub struct AnalysisConfigBuilder {
    config: AnalysisConfig,
}

impl AnalysisConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: AnalysisConfig::default(),
        }
    }

    #[must_use]
    pub fn target_size(mut self, width: u32, height: u32) -> Self {
        self.config.target_width = width;
        self.config.target_height = height;
        self
    }

    #[must_use]
    pub fn hist_bins(mut self, bins: usize) -> Self {
        self.config.hist_bins = bins;
        self
    }

    #[must_use]
    pub fn overlay_weight(mut self, weight: f32) -> Self {
        self.config.overlay_weight = weight;
        self
    }

    #[must_use]
    pub fn execution_provider(mut self, provider: ExecutionProvider) -> Self {
        self.config.execution_provider = provider;
        self
    }

    #[must_use]
    pub fn intra_threads(mut self, threads: usize) -> Self {
        self.config.intra_threads = threads;
        self
    }

    #[must_use]
    pub fn inter_threads(mut self, threads: usize) -> Self {
        self.config.inter_threads = threads;
        self
    }

    #[must_use]
    pub fn classifier_spec(mut self, spec: ModelSpec) -> Self {
        self.config.classifier_spec = spec;
        self
    }

    #[must_use]
    pub fn segmenter_spec(mut self, spec: ModelSpec) -> Self {
        self.config.segmenter_spec = spec;
        self
    }

    /// Build the configuration
    ///
    /// # Errors
    ///
    /// Returns `PixelscopeError::InvalidConfig` for:
    /// - Zero target dimensions
    /// - Histogram bin counts outside 1..=256
    /// - Overlay weights outside 0.0..=1.0
    pub fn build(self) -> Result<AnalysisConfig> {
        if self.config.target_width == 0 || self.config.target_height == 0 {
            return Err(PixelscopeError::invalid_config(
                "target dimensions must be non-zero",
            ));
        }
        if self.config.hist_bins == 0 || self.config.hist_bins > 256 {
            return Err(PixelscopeError::invalid_config(format!(
                "histogram bins must be 1-256, got {}",
                self.config.hist_bins
            )));
        }
        if !(0.0..=1.0).contains(&self.config.overlay_weight) {
            return Err(PixelscopeError::invalid_config(format!(
                "overlay weight must be within 0.0-1.0, got {}",
                self.config.overlay_weight
            )));
        }
        Ok(self.config)
    }
}

impl Default for AnalysisConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_matches_reference_values() {
        let config = AnalysisConfig::default();
        assert_eq!(config.target_width, 512);
        assert_eq!(config.target_height, 512);
        assert_eq!(config.hist_bins, 64);
        assert!((config.overlay_weight - 0.6).abs() < f32::EPSILON);
    }

    #[test]
    fn test_builder_chain() {
        let config = AnalysisConfig::builder()
            .target_size(256, 256)
            .hist_bins(32)
            .overlay_weight(0.4)
            .intra_threads(2)
            .build()
            .unwrap();
        assert_eq!(config.target_width, 256);
        assert_eq!(config.hist_bins, 32);
        assert!((config.overlay_weight - 0.4).abs() < f32::EPSILON);
        assert_eq!(config.intra_threads, 2);
    }

    #[test]
    fn test_builder_rejects_invalid_values() {
        assert!(AnalysisConfig::builder().hist_bins(0).build().is_err());
        assert!(AnalysisConfig::builder().hist_bins(300).build().is_err());
        assert!(AnalysisConfig::builder().overlay_weight(1.5).build().is_err());
        assert!(AnalysisConfig::builder().target_size(0, 512).build().is_err());
    }

    #[test]
    fn test_execution_provider_parsing() {
        assert_eq!(
            "cuda".parse::<ExecutionProvider>().unwrap(),
            ExecutionProvider::Cuda
        );
        assert_eq!(
            "AUTO".parse::<ExecutionProvider>().unwrap(),
            ExecutionProvider::Auto
        );
        assert!("metal".parse::<ExecutionProvider>().is_err());
    }
}
