#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::unused_async)]

//! # Pixelscope Image Analysis Library
//!
//! A Rust library for single-image analysis using ONNX Runtime: every input
//! is stretched onto a fixed canonical canvas and run through three
//! representations in one pass:
//!
//! - **Color histogram**: per-channel RGB histograms, min-max normalized and
//!   concatenated into one descriptor vector
//! - **Deep embedding**: the pooled activation of a pretrained classification
//!   backbone truncated after global average pooling
//! - **Semantic segmentation**: a 21-class dense prediction, colorized with a
//!   fixed palette and blended over the original image
//!
//! ## Features
//!
//! - **Model Management**: Automatic downloading and caching of registry
//!   models, with external ONNX files as an alternative
//! - **Hardware Acceleration**: CUDA and CPU execution providers
//! - **Background Worker**: Generation-tagged event stream for interactive
//!   front ends; newer submissions supersede in-flight runs
//! - **CLI Integration**: Optional command-line interface (enable with the
//!   `cli` feature)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pixelscope::{analyze_image_file, AnalysisConfig};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = AnalysisConfig::builder()
//!     .hist_bins(64)
//!     .overlay_weight(0.6)
//!     .build()?;
//!
//! let report = analyze_image_file("input.jpg", config).await?;
//! println!("{}", report.histogram_description);
//! println!("{}", report.embedding_description);
//! println!("{}", report.segmentation_description);
//! report.overlay.save("overlay.png")?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Background Worker
//!
//! Interactive consumers submit images to a worker and render only events
//! carrying the newest generation:
//!
//! ```rust,no_run
//! use pixelscope::{AnalysisConfig, AnalysisEvent, AnalysisWorker};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let (worker, mut events) = AnalysisWorker::spawn(AnalysisConfig::default())?;
//! let generation = worker.submit("input.jpg")?;
//!
//! while let Some(event) = events.recv().await {
//!     if event.generation() != generation {
//!         continue; // stale run
//!     }
//!     if let AnalysisEvent::Completed { report, .. } = event {
//!         report.overlay.save("overlay.png")?;
//!         break;
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ### Feature Flags
//!
//! - `onnx` (default): ONNX Runtime backend with GPU acceleration support
//! - `cli` (default): Command-line interface and progress reporting

pub mod backends;
pub mod cache;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod download;
pub mod error;
pub mod features;
pub mod inference;
pub mod models;
pub mod pipeline;
pub mod preprocess;
pub mod progress;
pub mod segmentation;
pub mod tensor;
#[cfg(feature = "cli")]
pub mod tracing_config;
pub mod worker;

// Public API exports
pub use backends::*;
pub use cache::{format_size, CachedModelInfo, ModelCache};
pub use config::{AnalysisConfig, AnalysisConfigBuilder, ExecutionProvider};
pub use download::{ModelDownloader, ProgressIndicator};
pub use error::{PixelscopeError, Result};
pub use features::{
    ColorHistogramFeature, DeepEmbedding, EmbeddingExtractor, HistogramExtractor,
};
pub use inference::{BackendFactory, BackendOptions, InferenceBackend};
pub use models::{ModelKind, ModelManager, ModelSource, ModelSpec, EMBEDDING_DIM};
pub use pipeline::{AnalysisPipeline, AnalysisReport, AnalysisTimings};
pub use preprocess::{load_image, FixedImage, Preprocessor};
pub use progress::{AnalysisStage, ProgressReporter, ProgressUpdate};
pub use segmentation::{overlay, SegmentationMask, Segmenter, PALETTE};
pub use worker::{AnalysisEvent, AnalysisWorker};
#[cfg(feature = "cli")]
pub use tracing_config::TracingConfig;

/// Analyze an image file with a one-shot pipeline
///
/// Convenience wrapper that builds an [`AnalysisPipeline`] over the default
/// ONNX Runtime backend, runs one analysis and drops the pipeline. For
/// repeated analyses keep a pipeline (or an [`AnalysisWorker`]) alive so the
/// model sessions are reused.
///
/// # Errors
///
/// - `NotReadable` when the path does not decode
/// - `ModelUnavailable` when configured weights cannot be resolved or loaded
/// - Inference failures from the backend
#[cfg(feature = "onnx")]
pub async fn analyze_image_file<P: AsRef<std::path::Path>>(
    path: P,
    config: AnalysisConfig,
) -> Result<AnalysisReport> {
    let mut pipeline = AnalysisPipeline::new(config)?;
    pipeline.analyze_file(path)
}

/// Analyze an already-decoded image with a one-shot pipeline
///
/// # Errors
///
/// - `ModelUnavailable` when configured weights cannot be resolved or loaded
/// - Inference failures from the backend
#[cfg(feature = "onnx")]
pub async fn analyze_image(
    image: &image::DynamicImage,
    config: AnalysisConfig,
) -> Result<AnalysisReport> {
    let mut pipeline = AnalysisPipeline::new(config)?;
    pipeline.analyze_image(image)
}
