//! Mock backends for testing inference functionality
//!
//! These implement `InferenceBackend` with deterministic synthetic outputs so
//! the feature extractor, segmenter and pipeline can be exercised without
//! model weights or an ONNX Runtime installation.

use crate::{
    error::{PixelscopeError, Result},
    inference::{BackendFactory, BackendOptions, InferenceBackend},
    models::{ModelFile, EMBEDDING_DIM},
};
use instant::Duration;
use ndarray::{Array2, Array4, ArrayD};
use std::sync::{Arc, Mutex};

/// Which synthetic output a mock backend produces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MockOutput {
    /// `[1, 2048]` pooled feature vector derived from the input sum
    PooledFeatures,
    /// `[1, 21, H, W]` score grid whose argmax at (y, x) is `(x + y) % 21`
    ClassScores,
}

/// Mock inference backend with deterministic outputs and call recording
#[derive(Debug, Clone)]
pub struct MockBackend {
    output: MockOutput,
    initialized: bool,
    should_fail_init: bool,
    should_fail_inference: bool,
    call_history: Arc<Mutex<Vec<String>>>,
}

impl MockBackend {
    /// Mock classification backbone producing pooled 2048-d features
    #[must_use]
    pub fn classifier() -> Self {
        Self::with_output(MockOutput::PooledFeatures)
    }

    /// Mock segmentation network producing a 21-class score grid
    #[must_use]
    pub fn segmenter() -> Self {
        Self::with_output(MockOutput::ClassScores)
    }

    fn with_output(output: MockOutput) -> Self {
        Self {
            output,
            initialized: false,
            should_fail_init: false,
            should_fail_inference: false,
            call_history: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Make `initialize` fail with `ModelUnavailable`
    #[must_use]
    pub fn failing_init(mut self) -> Self {
        self.should_fail_init = true;
        self
    }

    /// Make `infer` fail with an inference error
    #[must_use]
    pub fn failing_inference(mut self) -> Self {
        self.should_fail_inference = true;
        self
    }

    /// Recorded method invocations, for verification in tests
    #[must_use]
    pub fn call_history(&self) -> Vec<String> {
        self.call_history.lock().map(|h| h.clone()).unwrap_or_default()
    }

    fn record(&self, call: &str) {
        if let Ok(mut history) = self.call_history.lock() {
            history.push(call.to_string());
        }
    }
}

impl InferenceBackend for MockBackend {
    fn initialize(
        &mut self,
        model: &ModelFile,
        _options: &BackendOptions,
    ) -> Result<Option<Duration>> {
        self.record(&format!("initialize:{}", model.descriptor.id));
        if self.should_fail_init {
            return Err(PixelscopeError::model_unavailable(
                "mock backend configured to fail initialization",
            ));
        }
        if self.initialized {
            return Ok(None);
        }
        self.initialized = true;
        Ok(Some(Duration::from_millis(1)))
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<ArrayD<f32>> {
        self.record("infer");
        if !self.initialized {
            return Err(PixelscopeError::inference("mock backend not initialized"));
        }
        if self.should_fail_inference {
            return Err(PixelscopeError::inference(
                "mock backend configured to fail inference",
            ));
        }

        match self.output {
            MockOutput::PooledFeatures => {
                // Deterministic function of the input so identical tensors
                // produce identical embeddings and different inputs differ.
                let seed = input.sum();
                let features = Array2::from_shape_fn((1, EMBEDDING_DIM), |(_, i)| {
                    (i as f32).mul_add(0.001, seed * 0.0001).sin()
                });
                Ok(features.into_dyn())
            },
            MockOutput::ClassScores => {
                let (_, _, height, width) = input.dim();
                let scores = Array4::from_shape_fn((1, 21, height, width), |(_, c, y, x)| {
                    if c == (x + y) % 21 {
                        1.0
                    } else {
                        0.0
                    }
                });
                Ok(scores.into_dyn())
            },
        }
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }
}

/// Factory producing clones of a prototype mock backend
#[derive(Debug, Clone)]
pub struct MockBackendFactory {
    prototype: MockBackend,
}

impl MockBackendFactory {
    /// Factory for mock classification backbones
    #[must_use]
    pub fn classifier() -> Self {
        Self {
            prototype: MockBackend::classifier(),
        }
    }

    /// Factory for mock segmentation networks
    #[must_use]
    pub fn segmenter() -> Self {
        Self {
            prototype: MockBackend::segmenter(),
        }
    }

    /// Factory over an explicit prototype (for failure-mode tests)
    #[must_use]
    pub fn from_prototype(prototype: MockBackend) -> Self {
        Self { prototype }
    }
}

impl BackendFactory for MockBackendFactory {
    fn create_backend(&self) -> Result<Box<dyn InferenceBackend>> {
        Ok(Box::new(self.prototype.clone()))
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

/// Write a placeholder weights file and return a `ModelFile` for tests
///
/// Mock backends never parse the bytes; only resolution requires the file to
/// exist.
#[must_use]
pub fn placeholder_model_file(
    dir: &std::path::Path,
    kind: crate::models::ModelKind,
) -> ModelFile {
    let descriptor = crate::models::descriptor_for(kind);
    let path = dir.join(descriptor.file_name);
    std::fs::write(&path, b"mock-onnx").expect("write placeholder weights");
    ModelFile { path, descriptor }
}
