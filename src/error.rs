//! Error types for image analysis operations

use thiserror::Error;

/// Result type alias for analysis operations
pub type Result<T> = std::result::Result<T, PixelscopeError>;

/// Error types for analysis operations
#[derive(Error, Debug)]
pub enum PixelscopeError {
    /// Input image could not be read or decoded
    #[error("Image not readable '{path}': {reason}")]
    NotReadable {
        /// Path of the offending input
        path: std::path::PathBuf,
        /// Decoder or filesystem failure detail
        reason: String,
    },

    /// Model weights missing, corrupt or otherwise unloadable
    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),

    /// Backend inference errors
    #[error("Inference error: {0}")]
    Inference(String),

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Unexpected data shapes or values inside the pipeline
    #[error("Processing error: {0}")]
    Processing(String),

    /// Model download failures
    #[error("Network error: {0}")]
    Network(String),

    /// Run abandoned because a newer request superseded it
    #[error("Analysis cancelled: superseded by a newer request")]
    Cancelled,

    /// Input/output errors (file not found, permission denied, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image format or encoding errors
    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),
}

impl PixelscopeError {
    /// Create a not-readable error for an input path
    pub fn not_readable<P: AsRef<std::path::Path>, S: Into<String>>(path: P, reason: S) -> Self {
        Self::NotReadable {
            path: path.as_ref().to_path_buf(),
            reason: reason.into(),
        }
    }

    /// Create a model-unavailable error
    pub fn model_unavailable<S: Into<String>>(msg: S) -> Self {
        Self::ModelUnavailable(msg.into())
    }

    /// Create an inference error
    pub fn inference<S: Into<String>>(msg: S) -> Self {
        Self::Inference(msg.into())
    }

    /// Create an invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a processing error
    pub fn processing<S: Into<String>>(msg: S) -> Self {
        Self::Processing(msg.into())
    }

    /// Create a network error from a request failure
    pub fn network_error(context: &str, error: &reqwest::Error) -> Self {
        Self::Network(format!("{context}: {error}"))
    }

    /// Create a file I/O error with operation context
    pub fn file_io_error<P: AsRef<std::path::Path>>(
        operation: &str,
        path: P,
        error: &std::io::Error,
    ) -> Self {
        Self::Io(std::io::Error::new(
            error.kind(),
            format!("Failed to {} '{}': {}", operation, path.as_ref().display(), error),
        ))
    }

    /// Whether this error occurred before any model stage ran
    #[must_use]
    pub fn is_preprocessing_failure(&self) -> bool {
        matches!(self, Self::NotReadable { .. })
    }

    /// Whether this error is a cancellation rather than a failure
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_readable_display_includes_path_and_reason() {
        let err = PixelscopeError::not_readable("/tmp/missing.png", "no such file");
        let text = err.to_string();
        assert!(text.contains("/tmp/missing.png"));
        assert!(text.contains("no such file"));
        assert!(err.is_preprocessing_failure());
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: PixelscopeError = io.into();
        assert!(matches!(err, PixelscopeError::Io(_)));
        assert!(!err.is_preprocessing_failure());
    }

    #[test]
    fn test_file_io_error_keeps_kind_and_context() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = PixelscopeError::file_io_error("read model", "/models/net.onnx", &io);
        match err {
            PixelscopeError::Io(inner) => {
                assert_eq!(inner.kind(), std::io::ErrorKind::NotFound);
                assert!(inner.to_string().contains("read model"));
                assert!(inner.to_string().contains("/models/net.onnx"));
            },
            other => panic!("expected Io, got {other:?}"),
        }
    }

    #[test]
    fn test_cancelled_is_not_a_preprocessing_failure() {
        let err = PixelscopeError::Cancelled;
        assert!(err.is_cancelled());
        assert!(!err.is_preprocessing_failure());
    }

    #[test]
    fn test_helper_constructors_map_to_variants() {
        assert!(matches!(
            PixelscopeError::model_unavailable("x"),
            PixelscopeError::ModelUnavailable(_)
        ));
        assert!(matches!(
            PixelscopeError::inference("x"),
            PixelscopeError::Inference(_)
        ));
        assert!(matches!(
            PixelscopeError::invalid_config("x"),
            PixelscopeError::InvalidConfig(_)
        ));
        assert!(matches!(
            PixelscopeError::processing("x"),
            PixelscopeError::Processing(_)
        ));
    }
}
