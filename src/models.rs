//! Model registry and resolution
//!
//! The crate ships a fixed registry of two pretrained backbones: a ResNet-50
//! classification backbone truncated after global average pooling (2048-d
//! feature output) and a DeepLabV3 ResNet-101 segmentation network (21-class
//! score grid). `ModelManager` resolves a `ModelSpec` to an on-disk ONNX file,
//! either from the download cache or from an external path.

use crate::{
    cache::ModelCache,
    error::{PixelscopeError, Result},
};
use std::path::{Path, PathBuf};

/// Pooled feature dimensionality of the classification backbone
pub const EMBEDDING_DIM: usize = 2048;

/// ImageNet per-channel normalization mean (RGB)
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
/// ImageNet per-channel normalization standard deviation (RGB)
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Which role a model plays in the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ModelKind {
    /// Classification backbone used for deep embeddings
    Classifier,
    /// Dense-prediction network used for semantic segmentation
    Segmenter,
}

impl std::fmt::Display for ModelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Classifier => write!(f, "classifier"),
            Self::Segmenter => write!(f, "segmenter"),
        }
    }
}

/// Model source specification
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum ModelSource {
    /// External ONNX model from a filesystem path (file, or directory
    /// containing the registry file name)
    External(PathBuf),
    /// Downloaded model from the cache by model ID
    Downloaded(String),
}

impl ModelSource {
    /// Get a display name for tracing and logging
    #[must_use]
    pub fn display_name(&self) -> String {
        match self {
            ModelSource::External(path) => format!(
                "external:{}",
                path.file_name().unwrap_or_default().to_string_lossy()
            ),
            ModelSource::Downloaded(model_id) => format!("cached:{model_id}"),
        }
    }
}

/// Complete model specification: role plus where the weights come from
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ModelSpec {
    pub kind: ModelKind,
    pub source: ModelSource,
}

impl ModelSpec {
    /// The registry's default spec for a model role (downloaded by ID)
    #[must_use]
    pub fn registry_default(kind: ModelKind) -> Self {
        let descriptor = descriptor_for(kind);
        Self {
            kind,
            source: ModelSource::Downloaded(descriptor.id.to_string()),
        }
    }
}

/// How an image is mapped onto the model's input grid
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizePolicy {
    /// Resize the short side, then center-crop a square (classification recipe)
    ShortSideCrop {
        /// Short-side length after the initial resize
        resize_to: u32,
        /// Square crop edge fed to the network
        crop: u32,
    },
    /// Direct non-aspect-preserving stretch to a square grid (dense prediction)
    Stretch {
        /// Square input edge
        size: u32,
    },
}

impl ResizePolicy {
    /// Edge length of the square tensor the policy produces
    #[must_use]
    pub fn input_size(&self) -> u32 {
        match self {
            Self::ShortSideCrop { crop, .. } => *crop,
            Self::Stretch { size } => *size,
        }
    }
}

/// Canonical preprocessing recipe published with a pretrained model
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PreprocessingConfig {
    /// Spatial mapping onto the input grid
    pub resize: ResizePolicy,
    /// Per-channel normalization mean (applied after scaling to 0-1)
    pub normalization_mean: [f32; 3],
    /// Per-channel normalization standard deviation
    pub normalization_std: [f32; 3],
}

/// Registry entry describing a known pretrained model
#[derive(Debug, Clone, Copy)]
pub struct ModelDescriptor {
    /// Cache identifier
    pub id: &'static str,
    /// Role in the pipeline
    pub kind: ModelKind,
    /// Human-readable model identity for descriptions and logs
    pub display_name: &'static str,
    /// Repository URL the weights are fetched from
    pub url: &'static str,
    /// ONNX file name inside the repository and the cache directory
    pub file_name: &'static str,
    /// Canonical preprocessing recipe
    pub preprocessing: PreprocessingConfig,
    /// Channel count of the output tensor (pooled features or classes)
    pub output_channels: usize,
}

/// Built-in model registry
static REGISTRY: &[ModelDescriptor] = &[
    ModelDescriptor {
        id: "resnet50-gap",
        kind: ModelKind::Classifier,
        display_name: "ResNet-50 (ImageNet, pooled features)",
        url: "https://huggingface.co/pixelscope/resnet50-gap-onnx",
        file_name: "resnet50_gap.onnx",
        preprocessing: PreprocessingConfig {
            resize: ResizePolicy::ShortSideCrop {
                resize_to: 256,
                crop: 224,
            },
            normalization_mean: IMAGENET_MEAN,
            normalization_std: IMAGENET_STD,
        },
        output_channels: EMBEDDING_DIM,
    },
    ModelDescriptor {
        id: "deeplabv3-resnet101",
        kind: ModelKind::Segmenter,
        display_name: "DeepLabV3 ResNet-101 (VOC, 21 classes)",
        url: "https://huggingface.co/pixelscope/deeplabv3-resnet101-onnx",
        file_name: "deeplabv3_resnet101.onnx",
        preprocessing: PreprocessingConfig {
            resize: ResizePolicy::Stretch { size: 520 },
            normalization_mean: IMAGENET_MEAN,
            normalization_std: IMAGENET_STD,
        },
        output_channels: 21,
    },
];

/// All registry entries
#[must_use]
pub fn registry() -> &'static [ModelDescriptor] {
    REGISTRY
}

/// The registry entry for a model role
#[must_use]
pub fn descriptor_for(kind: ModelKind) -> &'static ModelDescriptor {
    // The registry always carries exactly one entry per role.
    REGISTRY
        .iter()
        .find(|d| d.kind == kind)
        .expect("registry covers every ModelKind")
}

/// Look up a registry entry by cache identifier
#[must_use]
pub fn descriptor_by_id(id: &str) -> Option<&'static ModelDescriptor> {
    REGISTRY.iter().find(|d| d.id == id)
}

/// Metadata recorded next to downloaded weights
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CachedModelMetadata {
    /// Registry identifier
    pub model_id: String,
    /// Repository URL the weights came from
    pub source_url: String,
    /// SHA-256 digest of the ONNX file, hex encoded
    pub sha256: String,
    /// Size of the ONNX file in bytes
    pub size_bytes: u64,
}

/// A resolved, loadable model: weights on disk plus its registry entry
#[derive(Debug, Clone)]
pub struct ModelFile {
    /// Path to the ONNX weights
    pub path: PathBuf,
    /// Registry entry for preprocessing and output shape
    pub descriptor: &'static ModelDescriptor,
}

impl ModelFile {
    /// Load the raw ONNX bytes
    ///
    /// # Errors
    /// - Weights file missing or unreadable
    pub fn load_bytes(&self) -> Result<Vec<u8>> {
        std::fs::read(&self.path)
            .map_err(|e| PixelscopeError::file_io_error("read model weights", &self.path, &e))
    }
}

/// Resolves model specifications to on-disk weights
#[derive(Debug)]
pub struct ModelManager {
    cache: ModelCache,
}

impl ModelManager {
    /// Create a manager over the default cache location
    ///
    /// # Errors
    /// - Cache directory cannot be determined or created
    pub fn new() -> Result<Self> {
        Ok(Self {
            cache: ModelCache::new()?,
        })
    }

    /// Create a manager over an explicit cache
    #[must_use]
    pub fn with_cache(cache: ModelCache) -> Self {
        Self { cache }
    }

    /// Resolve a spec to a loadable model file
    ///
    /// Downloaded specs must already be present in the cache; an absent entry
    /// is a `ModelUnavailable` failure (weights are fetched separately, so an
    /// offline run with an empty cache fails here rather than deep inside the
    /// backend).
    ///
    /// # Errors
    /// - Unknown model ID for downloaded specs
    /// - Weights not cached and therefore unavailable
    /// - External path missing or not containing the expected ONNX file
    pub fn resolve(&self, spec: &ModelSpec) -> Result<ModelFile> {
        let descriptor = descriptor_for(spec.kind);
        match &spec.source {
            ModelSource::Downloaded(model_id) => {
                let descriptor = descriptor_by_id(model_id).ok_or_else(|| {
                    PixelscopeError::model_unavailable(format!(
                        "unknown model id '{model_id}' (known: {})",
                        known_ids().join(", ")
                    ))
                })?;
                if descriptor.kind != spec.kind {
                    return Err(PixelscopeError::invalid_config(format!(
                        "model '{model_id}' is a {} but a {} was requested",
                        descriptor.kind, spec.kind
                    )));
                }
                let path = self.cache.model_dir(model_id).join(descriptor.file_name);
                if !path.is_file() {
                    return Err(PixelscopeError::model_unavailable(format!(
                        "weights for '{model_id}' are not cached; download them from {} first",
                        descriptor.url
                    )));
                }
                Ok(ModelFile { path, descriptor })
            },
            ModelSource::External(path) => {
                let path = Self::resolve_external(path, descriptor.file_name)?;
                Ok(ModelFile { path, descriptor })
            },
        }
    }

    fn resolve_external(path: &Path, file_name: &str) -> Result<PathBuf> {
        if path.is_file() {
            return Ok(path.to_path_buf());
        }
        if path.is_dir() {
            let candidate = path.join(file_name);
            if candidate.is_file() {
                return Ok(candidate);
            }
            return Err(PixelscopeError::model_unavailable(format!(
                "external model directory '{}' does not contain '{file_name}'",
                path.display()
            )));
        }
        Err(PixelscopeError::model_unavailable(format!(
            "external model path does not exist: {}",
            path.display()
        )))
    }

    /// The cache this manager resolves against
    #[must_use]
    pub fn cache(&self) -> &ModelCache {
        &self.cache
    }
}

fn known_ids() -> Vec<&'static str> {
    REGISTRY.iter().map(|d| d.id).collect()
}
