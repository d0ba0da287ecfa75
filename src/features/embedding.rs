//! Deep embedding extraction from a pretrained classification backbone
//!
//! The backbone is an ONNX export truncated after global average pooling, so
//! one forward pass yields the pooled activation directly. The session is
//! built lazily on the first extraction and reused afterwards; weight loading
//! dominates the cost and is paid once per extractor lifetime.

use super::{vector_norm, DeepEmbedding};
use crate::{
    config::AnalysisConfig,
    error::{PixelscopeError, Result},
    inference::{BackendFactory, BackendOptions, InferenceBackend},
    models::{ModelFile, ModelManager},
    preprocess::FixedImage,
    tensor,
};

/// Extracts pooled deep features from the classification backbone
pub struct EmbeddingExtractor {
    model: ModelFile,
    options: BackendOptions,
    backend: Box<dyn InferenceBackend>,
}

impl std::fmt::Debug for EmbeddingExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingExtractor")
            .field("model", &self.model.descriptor.id)
            .field("initialized", &self.backend.is_initialized())
            .finish()
    }
}

impl EmbeddingExtractor {
    /// Resolve the configured classifier and build a cold extractor
    ///
    /// # Errors
    /// - `ModelUnavailable` when the configured weights are not resolvable
    pub fn new(
        manager: &ModelManager,
        config: &AnalysisConfig,
        factory: &dyn BackendFactory,
    ) -> Result<Self> {
        let model = manager.resolve(&config.classifier_spec)?;
        Ok(Self {
            model,
            options: BackendOptions::from_config(config),
            backend: factory.create_backend()?,
        })
    }

    /// Build an extractor over an explicit model file and backend
    #[must_use]
    pub fn with_backend(
        model: ModelFile,
        options: BackendOptions,
        backend: Box<dyn InferenceBackend>,
    ) -> Self {
        Self {
            model,
            options,
            backend,
        }
    }

    /// Whether the backbone session has been built
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.backend.is_initialized()
    }

    fn ensure_initialized(&mut self) -> Result<()> {
        if let Some(load_time) = self.backend.initialize(&self.model, &self.options)? {
            tracing::info!(
                model = %self.model.descriptor.display_name,
                load_ms = load_time.as_millis() as u64,
                "classification backbone initialized"
            );
        }
        Ok(())
    }

    /// Extract the pooled embedding and its display description
    ///
    /// Applies the backbone's canonical recipe (short-side resize, center
    /// crop, 0-1 scaling, per-channel normalization), runs one inference pass
    /// and flattens the pooled activation to 1-D. Deterministic: identical
    /// canvases yield identical vectors.
    ///
    /// # Errors
    /// - `ModelUnavailable` when weights cannot be loaded on first use
    /// - Inference failures from the backend
    /// - Unexpected output dimensionality
    pub fn extract(&mut self, image: &FixedImage) -> Result<(DeepEmbedding, String)> {
        self.ensure_initialized()?;

        let input = tensor::to_model_input(image.as_rgb(), &self.model.descriptor.preprocessing);
        let output = self.backend.infer(&input)?;

        // Pooled output may arrive as [1, C] or [1, C, 1, 1]; both flatten to
        // the backbone's feature dimensionality.
        let embedding: DeepEmbedding = output.iter().copied().collect();
        let expected = self.model.descriptor.output_channels;
        if embedding.len() != expected {
            return Err(PixelscopeError::processing(format!(
                "backbone produced {} values, expected {expected}",
                embedding.len()
            )));
        }

        let description = format!(
            "--- Deep Feature ({}) ---\n\
             Model: {}\n\
             Feature source: after global average pooling\n\
             Vector shape: ({},)\n\
             Vector norm: {:.4}",
            self.model.descriptor.id,
            self.model.descriptor.display_name,
            embedding.len(),
            vector_norm(&embedding)
        );

        Ok((embedding, description))
    }
}
