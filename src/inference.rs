//! Inference backend abstraction

use crate::{
    config::{AnalysisConfig, ExecutionProvider},
    error::Result,
    models::ModelFile,
};
use instant::Duration;
use ndarray::{Array4, ArrayD};

/// Runtime options for backend session construction
#[derive(Debug, Clone, Copy)]
pub struct BackendOptions {
    /// Execution provider selection
    pub execution_provider: ExecutionProvider,
    /// Number of intra-op threads (0 = auto)
    pub intra_threads: usize,
    /// Number of inter-op threads (0 = auto)
    pub inter_threads: usize,
}

impl BackendOptions {
    /// Derive backend options from pipeline configuration
    #[must_use]
    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self {
            execution_provider: config.execution_provider,
            intra_threads: config.intra_threads,
            inter_threads: config.inter_threads,
        }
    }
}

impl Default for BackendOptions {
    fn default() -> Self {
        Self {
            execution_provider: ExecutionProvider::Auto,
            intra_threads: 0,
            inter_threads: 0,
        }
    }
}

/// Trait for inference backends
///
/// A backend is constructed cold and initialized exactly once with resolved
/// model weights; initialization is idempotent and subsequent calls reuse the
/// loaded session (weight loading dominates cost and is amortized across the
/// owner's lifetime). Output rank varies by model — pooled feature vectors are
/// `[1, C]`, dense score grids are `[1, C, H, W]` — so `infer` returns a
/// dynamic-rank array.
pub trait InferenceBackend: Send + std::fmt::Debug {
    /// Load model weights and build the inference session
    ///
    /// Returns the model-loading duration on the first call, `None` when the
    /// backend was already initialized.
    ///
    /// # Errors
    /// - Weights unreadable or invalid
    /// - Session construction failures
    fn initialize(&mut self, model: &ModelFile, options: &BackendOptions)
        -> Result<Option<Duration>>;

    /// Run one forward pass in inference mode
    ///
    /// # Errors
    /// - Backend not initialized
    /// - Model inference failures
    /// - Tensor conversion errors
    fn infer(&mut self, input: &Array4<f32>) -> Result<ArrayD<f32>>;

    /// Check if the backend has a loaded session
    fn is_initialized(&self) -> bool;
}

/// Factory trait for creating cold inference backends
pub trait BackendFactory: Send + Sync {
    /// Create an uninitialized backend instance
    ///
    /// # Errors
    /// - Backend construction failures
    fn create_backend(&self) -> Result<Box<dyn InferenceBackend>>;

    /// Backend name for logging
    fn name(&self) -> &'static str;
}
