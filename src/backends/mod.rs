//! Backend implementations for the inference seam
//!
//! The ONNX Runtime backend is the production path; mock backends back the
//! test suites so model weights are never required at test time.

#[cfg(feature = "onnx")]
pub mod onnx;

pub mod test_utils;

#[cfg(feature = "onnx")]
pub use self::onnx::{OnnxBackend, OnnxBackendFactory};
