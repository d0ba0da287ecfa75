//! Model cache management for downloaded weights
//!
//! Downloaded weights live in an XDG-compliant directory structure, one
//! subdirectory per model ID. The cache survives process restarts so that
//! weight downloads are a one-time cost.

use crate::{
    error::{PixelscopeError, Result},
    models::{descriptor_by_id, CachedModelMetadata},
};
use std::fs;
use std::path::PathBuf;

/// Metadata file recorded next to downloaded weights
pub const METADATA_FILE: &str = "pixelscope.json";

/// Information about a cached model
#[derive(Debug, Clone)]
pub struct CachedModelInfo {
    /// Model identifier
    pub model_id: String,
    /// Path to the cached model directory
    pub path: PathBuf,
    /// Whether the ONNX weights file is present
    pub has_weights: bool,
    /// Total size of the model directory in bytes
    pub size_bytes: u64,
}

/// Model cache manager
#[derive(Debug)]
pub struct ModelCache {
    cache_dir: PathBuf,
}

impl ModelCache {
    /// Create a new model cache manager at the default location
    ///
    /// Uses the XDG Base Directory specification:
    /// - Linux/macOS: `~/.cache/pixelscope/models/`
    /// - Windows: `%LOCALAPPDATA%/pixelscope/models/`
    ///
    /// `PIXELSCOPE_CACHE_DIR` overrides the base directory.
    ///
    /// # Errors
    /// - Failed to determine the cache directory
    /// - Failed to create the cache directory
    pub fn new() -> Result<Self> {
        Self::with_dir(Self::default_cache_dir()?)
    }

    /// Create a cache manager over an explicit directory
    ///
    /// # Errors
    /// - Failed to create the directory
    pub fn with_dir(cache_dir: PathBuf) -> Result<Self> {
        if !cache_dir.exists() {
            fs::create_dir_all(&cache_dir).map_err(|e| {
                PixelscopeError::file_io_error("create cache directory", &cache_dir, &e)
            })?;
        }
        Ok(Self { cache_dir })
    }

    /// The XDG-compliant default cache directory path
    ///
    /// # Errors
    /// - No user cache directory and no `PIXELSCOPE_CACHE_DIR` override
    pub fn default_cache_dir() -> Result<PathBuf> {
        if let Ok(cache_override) = std::env::var("PIXELSCOPE_CACHE_DIR") {
            return Ok(PathBuf::from(cache_override).join("models"));
        }
        Ok(dirs::cache_dir()
            .ok_or_else(|| {
                PixelscopeError::invalid_config(
                    "failed to determine cache directory; set PIXELSCOPE_CACHE_DIR",
                )
            })?
            .join("pixelscope")
            .join("models"))
    }

    /// Root of the cache
    #[must_use]
    pub fn cache_dir(&self) -> &PathBuf {
        &self.cache_dir
    }

    /// Directory a model's weights live in
    #[must_use]
    pub fn model_dir(&self, model_id: &str) -> PathBuf {
        self.cache_dir.join(model_id)
    }

    /// Whether a model's weights are cached
    #[must_use]
    pub fn is_model_cached(&self, model_id: &str) -> bool {
        descriptor_by_id(model_id)
            .map(|d| self.model_dir(model_id).join(d.file_name).is_file())
            .unwrap_or(false)
    }

    /// Read the metadata recorded when a model was downloaded
    ///
    /// # Errors
    /// - Metadata file missing or unreadable
    /// - Metadata JSON malformed
    pub fn read_metadata(&self, model_id: &str) -> Result<CachedModelMetadata> {
        let path = self.model_dir(model_id).join(METADATA_FILE);
        let data = fs::read_to_string(&path)
            .map_err(|e| PixelscopeError::file_io_error("read model metadata", &path, &e))?;
        serde_json::from_str(&data).map_err(|e| {
            PixelscopeError::processing(format!("malformed metadata in '{}': {e}", path.display()))
        })
    }

    /// Scan the cache for downloaded models
    ///
    /// # Errors
    /// - Cache directory unreadable
    pub fn scan_cached_models(&self) -> Result<Vec<CachedModelInfo>> {
        let mut models = Vec::new();
        let entries = fs::read_dir(&self.cache_dir).map_err(|e| {
            PixelscopeError::file_io_error("scan cache directory", &self.cache_dir, &e)
        })?;
        for entry in entries {
            let entry = entry.map_err(|e| {
                PixelscopeError::file_io_error("read cache entry", &self.cache_dir, &e)
            })?;
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let model_id = entry.file_name().to_string_lossy().into_owned();
            let has_weights = self.is_model_cached(&model_id);
            let size_bytes = directory_size(&path);
            models.push(CachedModelInfo {
                model_id,
                path,
                has_weights,
                size_bytes,
            });
        }
        models.sort_by(|a, b| a.model_id.cmp(&b.model_id));
        Ok(models)
    }

    /// Remove one model from the cache
    ///
    /// # Errors
    /// - Model not cached
    /// - Filesystem removal failures
    pub fn clear_model(&self, model_id: &str) -> Result<()> {
        let dir = self.model_dir(model_id);
        if !dir.exists() {
            return Err(PixelscopeError::invalid_config(format!(
                "model '{model_id}' is not cached"
            )));
        }
        fs::remove_dir_all(&dir)
            .map_err(|e| PixelscopeError::file_io_error("remove cached model", &dir, &e))?;
        log::info!("Removed cached model: {model_id}");
        Ok(())
    }

    /// Remove every cached model
    ///
    /// # Errors
    /// - Filesystem removal failures
    pub fn clear_all(&self) -> Result<usize> {
        let models = self.scan_cached_models()?;
        let count = models.len();
        for model in models {
            fs::remove_dir_all(&model.path)
                .map_err(|e| PixelscopeError::file_io_error("remove cached model", &model.path, &e))?;
        }
        log::info!("Cleared {count} cached model(s)");
        Ok(count)
    }
}

fn directory_size(path: &std::path::Path) -> u64 {
    let Ok(entries) = fs::read_dir(path) else {
        return 0;
    };
    entries
        .flatten()
        .map(|entry| {
            let p = entry.path();
            if p.is_dir() {
                directory_size(&p)
            } else {
                entry.metadata().map(|m| m.len()).unwrap_or(0)
            }
        })
        .sum()
}

/// Format a byte count for display (e.g. "102.3 MB")
#[must_use]
pub fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} {}", UNITS[0])
    } else {
        format!("{size:.1} {}", UNITS.get(unit).unwrap_or(&"B"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ModelCache::with_dir(dir.path().join("models")).unwrap();
        assert!(cache.scan_cached_models().unwrap().is_empty());
        assert!(!cache.is_model_cached("resnet50-gap"));
    }

    #[test]
    fn test_cached_model_detection_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ModelCache::with_dir(dir.path().join("models")).unwrap();

        let model_dir = cache.model_dir("resnet50-gap");
        fs::create_dir_all(&model_dir).unwrap();
        fs::write(model_dir.join("resnet50_gap.onnx"), b"weights").unwrap();

        assert!(cache.is_model_cached("resnet50-gap"));
        let scanned = cache.scan_cached_models().unwrap();
        assert_eq!(scanned.len(), 1);
        assert!(scanned.first().unwrap().has_weights);
        assert!(scanned.first().unwrap().size_bytes > 0);

        cache.clear_model("resnet50-gap").unwrap();
        assert!(!cache.is_model_cached("resnet50-gap"));
    }

    #[test]
    fn test_clear_unknown_model_errors() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ModelCache::with_dir(dir.path().join("models")).unwrap();
        assert!(cache.clear_model("nothing-here").is_err());
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.0 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.0 MB");
    }
}
