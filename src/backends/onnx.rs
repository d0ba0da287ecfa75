//! ONNX Runtime backend
//!
//! Session construction mirrors the execution-provider selection order used
//! across the crate's tooling: an explicitly requested provider is used when
//! available and falls back to CPU with a warning; `Auto` probes CUDA first.

use crate::{
    config::ExecutionProvider,
    error::{PixelscopeError, Result},
    inference::{BackendFactory, BackendOptions, InferenceBackend},
    models::ModelFile,
};
use instant::Duration;
use ndarray::{Array4, ArrayD};
use ort::execution_providers::{CUDAExecutionProvider, ExecutionProvider as OrtExecutionProvider};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Value;

/// ONNX Runtime backend for running pretrained models
#[derive(Debug, Default)]
pub struct OnnxBackend {
    session: Option<Session>,
}

impl OnnxBackend {
    /// Create a cold backend; the session is built on `initialize`
    #[must_use]
    pub fn new() -> Self {
        Self { session: None }
    }

    fn load_model(&mut self, model: &ModelFile, options: &BackendOptions) -> Result<Duration> {
        let load_start = instant::Instant::now();
        let model_data = model.load_bytes().map_err(|e| {
            PixelscopeError::model_unavailable(format!(
                "cannot load weights for {}: {e}",
                model.descriptor.display_name
            ))
        })?;

        let mut session_builder = Session::builder()
            .map_err(|e| {
                PixelscopeError::inference(format!("failed to create session builder: {e}"))
            })?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| {
                PixelscopeError::inference(format!("failed to set optimization level: {e}"))
            })?;

        session_builder = match options.execution_provider {
            ExecutionProvider::Auto => {
                let cuda_provider = CUDAExecutionProvider::default();
                if OrtExecutionProvider::is_available(&cuda_provider).unwrap_or(false) {
                    log::info!("CUDA execution provider is available and will be used");
                    session_builder
                        .with_execution_providers([cuda_provider.build()])
                        .map_err(|e| {
                            PixelscopeError::inference(format!(
                                "failed to set CUDA execution provider: {e}"
                            ))
                        })?
                } else {
                    log::debug!("CUDA not available, using CPU");
                    session_builder
                }
            },
            ExecutionProvider::Cpu => {
                log::info!("Using CPU execution provider");
                session_builder
            },
            ExecutionProvider::Cuda => {
                let cuda_provider = CUDAExecutionProvider::default();
                if OrtExecutionProvider::is_available(&cuda_provider).unwrap_or(false) {
                    log::info!("Using CUDA execution provider");
                    session_builder
                        .with_execution_providers([cuda_provider.build()])
                        .map_err(|e| {
                            PixelscopeError::inference(format!(
                                "failed to set CUDA execution provider: {e}"
                            ))
                        })?
                } else {
                    log::warn!("CUDA requested but not available, falling back to CPU");
                    session_builder
                }
            },
        };

        let intra_threads = if options.intra_threads > 0 {
            options.intra_threads
        } else {
            std::thread::available_parallelism()
                .map(std::num::NonZero::get)
                .unwrap_or(8)
        };
        let inter_threads = if options.inter_threads > 0 {
            options.inter_threads
        } else {
            (std::thread::available_parallelism()
                .map(std::num::NonZero::get)
                .unwrap_or(8)
                / 4)
            .max(1)
        };

        let session = session_builder
            .with_parallel_execution(true)
            .map_err(|e| {
                PixelscopeError::inference(format!("failed to enable parallel execution: {e}"))
            })?
            .with_intra_threads(intra_threads)
            .map_err(|e| PixelscopeError::inference(format!("failed to set intra threads: {e}")))?
            .with_inter_threads(inter_threads)
            .map_err(|e| PixelscopeError::inference(format!("failed to set inter threads: {e}")))?
            .commit_from_memory(&model_data)
            .map_err(|e| {
                PixelscopeError::model_unavailable(format!(
                    "failed to build session for {}: {e}",
                    model.descriptor.display_name
                ))
            })?;

        self.session = Some(session);

        let load_time = load_start.elapsed();
        log::info!(
            "Loaded {} in {:.0}ms ({intra_threads} intra / {inter_threads} inter threads)",
            model.descriptor.display_name,
            load_time.as_secs_f64() * 1000.0
        );
        Ok(load_time)
    }
}

impl InferenceBackend for OnnxBackend {
    fn initialize(
        &mut self,
        model: &ModelFile,
        options: &BackendOptions,
    ) -> Result<Option<Duration>> {
        if self.session.is_some() {
            return Ok(None);
        }
        let load_time = self.load_model(model, options)?;
        Ok(Some(load_time))
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<ArrayD<f32>> {
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| PixelscopeError::inference("backend not initialized"))?;

        let inference_start = instant::Instant::now();
        log::debug!("Starting inference with input shape: {:?}", input.dim());

        let input_value = Value::from_array(input.clone()).map_err(|e| {
            PixelscopeError::processing(format!("failed to convert input tensor: {e}"))
        })?;

        // Positional inputs/outputs: the two registry models each expose one
        // input and one primary output.
        let outputs = session
            .run(ort::inputs![input_value])
            .map_err(|e| PixelscopeError::inference(format!("ONNX inference failed: {e}")))?;

        let keys: Vec<_> = outputs.keys().collect();
        let first_key = keys
            .first()
            .ok_or_else(|| PixelscopeError::processing("no output tensors found"))?;
        let output_tensor = outputs
            .get(first_key)
            .ok_or_else(|| PixelscopeError::processing("first output tensor not found"))?
            .try_extract_array::<f32>()
            .map_err(|e| {
                PixelscopeError::processing(format!("failed to extract output tensor: {e}"))
            })?;

        let result = output_tensor.view().to_owned();
        log::debug!(
            "Inference complete: {:.2}ms, output shape {:?}",
            inference_start.elapsed().as_secs_f64() * 1000.0,
            result.shape()
        );
        Ok(result)
    }

    fn is_initialized(&self) -> bool {
        self.session.is_some()
    }
}

/// Factory producing cold ONNX Runtime backends
#[derive(Debug, Default, Clone, Copy)]
pub struct OnnxBackendFactory;

impl BackendFactory for OnnxBackendFactory {
    fn create_backend(&self) -> Result<Box<dyn InferenceBackend>> {
        Ok(Box::new(OnnxBackend::new()))
    }

    fn name(&self) -> &'static str {
        "onnx"
    }
}
