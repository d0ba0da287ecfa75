//! Unified analysis pipeline
//!
//! Sequences Loading → Preprocessing → ExtractingFeatures → Segmenting over a
//! single image and collects every representation into an `AnalysisReport`.
//! Stages are strictly sequential; each stage's output is the next stage's
//! only input, and a failure stops the run before any downstream stage
//! executes. The lazily-built model sessions are the only state carried
//! across invocations — every call produces a fresh report.

use crate::{
    config::AnalysisConfig,
    error::Result,
    features::{ColorHistogramFeature, DeepEmbedding, EmbeddingExtractor, HistogramExtractor},
    inference::BackendFactory,
    models::ModelManager,
    preprocess::{load_image, FixedImage, Preprocessor},
    progress::{AnalysisStage, NoOpProgressReporter, ProgressReporter, ProgressTracker},
    segmentation::{overlay, SegmentationMask, Segmenter},
};
use crate::error::PixelscopeError;
use image::{DynamicImage, RgbImage};
use instant::Instant;
use log::{debug, info};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// Per-stage wall-clock timings in milliseconds
#[derive(Debug, Clone, Default)]
pub struct AnalysisTimings {
    /// Decode time
    pub loading_ms: u64,
    /// Canvas stretch time
    pub preprocessing_ms: u64,
    /// Histogram computation time
    pub histogram_ms: u64,
    /// Deep embedding time (includes first-call model loading)
    pub embedding_ms: u64,
    /// Segmentation inference and argmax time
    pub segmentation_ms: u64,
    /// Overlay compositing time
    pub overlay_ms: u64,
    /// End-to-end time
    pub total_ms: u64,
}

/// Everything one analysis run produces
#[derive(Debug, Clone)]
pub struct AnalysisReport {
    /// Source path, when the run started from a file
    pub source: Option<PathBuf>,
    /// Input dimensions before the canvas stretch
    pub original_dimensions: (u32, u32),
    /// The canonical canvas every stage consumed
    pub canvas: FixedImage,
    /// Concatenated per-channel histogram descriptor
    pub histogram: ColorHistogramFeature,
    /// Display description of the histogram feature
    pub histogram_description: String,
    /// Pooled backbone activation
    pub embedding: DeepEmbedding,
    /// Display description of the deep feature
    pub embedding_description: String,
    /// Per-pixel class-id mask at the model's grid resolution
    pub mask: SegmentationMask,
    /// Display description of the segmentation result
    pub segmentation_description: String,
    /// Palette overlay composited onto the canvas
    pub overlay: RgbImage,
    /// Per-stage timings
    pub timings: AnalysisTimings,
}

/// Single-image analysis pipeline
///
/// Owns the preprocessor, both extractors and the segmenter; model sessions
/// inside the extractors are built lazily on the first run and reused for the
/// pipeline's lifetime.
pub struct AnalysisPipeline {
    config: AnalysisConfig,
    preprocessor: Preprocessor,
    histogram: HistogramExtractor,
    embedding: EmbeddingExtractor,
    segmenter: Segmenter,
    tracker: ProgressTracker,
}

impl std::fmt::Debug for AnalysisPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisPipeline")
            .field("config", &self.config)
            .field("tracker", &self.tracker)
            .finish()
    }
}

impl AnalysisPipeline {
    /// Create a pipeline over the default ONNX Runtime backend
    ///
    /// # Errors
    /// - `ModelUnavailable` when configured weights cannot be resolved
    #[cfg(feature = "onnx")]
    pub fn new(config: AnalysisConfig) -> Result<Self> {
        let factory = crate::backends::OnnxBackendFactory;
        Self::with_factory(config, &factory)
    }

    /// Create a pipeline with an explicit backend factory
    ///
    /// # Errors
    /// - `ModelUnavailable` when configured weights cannot be resolved
    /// - Backend construction failures
    pub fn with_factory(config: AnalysisConfig, factory: &dyn BackendFactory) -> Result<Self> {
        info!("Initializing analysis pipeline ({} backend)", factory.name());
        debug!("Classifier spec: {:?}", config.classifier_spec);
        debug!("Segmenter spec: {:?}", config.segmenter_spec);

        let manager = ModelManager::new()?;
        let embedding = EmbeddingExtractor::new(&manager, &config, factory)?;
        let segmenter = Segmenter::new(&manager, &config, factory)?;
        Ok(Self::from_parts(config, embedding, segmenter))
    }

    /// Assemble a pipeline from pre-built extractors (tests, custom wiring)
    #[must_use]
    pub fn from_parts(
        config: AnalysisConfig,
        embedding: EmbeddingExtractor,
        segmenter: Segmenter,
    ) -> Self {
        let preprocessor = Preprocessor::from_config(&config);
        let histogram = HistogramExtractor::new(config.hist_bins);
        Self {
            config,
            preprocessor,
            histogram,
            embedding,
            segmenter,
            tracker: ProgressTracker::new(Box::new(NoOpProgressReporter)),
        }
    }

    /// Replace the progress reporter
    pub fn set_progress_reporter(&mut self, reporter: Box<dyn ProgressReporter>) {
        self.tracker = ProgressTracker::new(reporter);
    }

    /// The pipeline's configuration
    #[must_use]
    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// The stage the pipeline is currently in
    #[must_use]
    pub fn current_stage(&self) -> AnalysisStage {
        self.tracker.current_stage()
    }

    /// Analyze an image file
    ///
    /// # Errors
    /// - `NotReadable` when the path does not decode; no downstream stage runs
    /// - `ModelUnavailable` when weights cannot be loaded on first use
    /// - Inference failures from either backend
    pub fn analyze_file<P: AsRef<Path>>(&mut self, path: P) -> Result<AnalysisReport> {
        self.analyze_file_with_token(path, &CancellationToken::new())
    }

    /// Analyze an image file, abandoning the run if the token is cancelled
    ///
    /// The token is checked at every stage boundary; a cancelled run returns
    /// `Cancelled` without executing any further stage. Cancellation leaves
    /// the pipeline in `Idle`, not `Failed`.
    ///
    /// # Errors
    /// - `Cancelled` when the token fires before the run completes
    /// - Everything `analyze_file` can return
    #[instrument(skip(self, token), fields(path = %path.as_ref().display()))]
    pub fn analyze_file_with_token<P: AsRef<Path>>(
        &mut self,
        path: P,
        token: &CancellationToken,
    ) -> Result<AnalysisReport> {
        let path = path.as_ref();
        let total_start = Instant::now();
        let mut timings = AnalysisTimings::default();

        self.tracker.enter_stage(AnalysisStage::Loading);
        let load_start = Instant::now();
        let image = match load_image(path) {
            Ok(image) => image,
            Err(e) => {
                self.tracker.enter_stage(AnalysisStage::Failed);
                return Err(e);
            },
        };
        timings.loading_ms = load_start.elapsed().as_millis() as u64;

        self.analyze_decoded(&image, Some(path.to_path_buf()), timings, total_start, token)
    }

    /// Analyze an already-decoded image
    ///
    /// # Errors
    /// - `ModelUnavailable` when weights cannot be loaded on first use
    /// - Inference failures from either backend
    pub fn analyze_image(&mut self, image: &DynamicImage) -> Result<AnalysisReport> {
        let total_start = Instant::now();
        self.tracker.enter_stage(AnalysisStage::Loading);
        self.analyze_decoded(
            image,
            None,
            AnalysisTimings::default(),
            total_start,
            &CancellationToken::new(),
        )
    }

    fn check_cancelled(&mut self, token: &CancellationToken) -> Result<()> {
        if token.is_cancelled() {
            debug!("Run superseded, abandoning before next stage");
            self.tracker.enter_stage(AnalysisStage::Idle);
            return Err(PixelscopeError::Cancelled);
        }
        Ok(())
    }

    fn analyze_decoded(
        &mut self,
        image: &DynamicImage,
        source: Option<PathBuf>,
        mut timings: AnalysisTimings,
        total_start: Instant,
        token: &CancellationToken,
    ) -> Result<AnalysisReport> {
        let original_dimensions = (image.width(), image.height());

        self.check_cancelled(token)?;
        self.tracker.enter_stage(AnalysisStage::Preprocessing);
        let preprocess_start = Instant::now();
        let canvas = self.preprocessor.preprocess_image(image);
        timings.preprocessing_ms = preprocess_start.elapsed().as_millis() as u64;
        debug!(
            "Canvas ready: {}x{} from {}x{}",
            canvas.width(),
            canvas.height(),
            original_dimensions.0,
            original_dimensions.1
        );

        let run = self.run_model_stages(&canvas, &mut timings, token);
        let (histogram, histogram_description, embedding, embedding_description, mask, segmentation_description, composited) =
            match run {
                Ok(parts) => parts,
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => {
                    self.tracker.enter_stage(AnalysisStage::Failed);
                    return Err(e);
                },
            };

        timings.total_ms = total_start.elapsed().as_millis() as u64;
        self.tracker.enter_stage(AnalysisStage::Completed);
        info!(
            "Analysis complete in {}ms (embedding {}ms, segmentation {}ms)",
            timings.total_ms, timings.embedding_ms, timings.segmentation_ms
        );

        Ok(AnalysisReport {
            source,
            original_dimensions,
            canvas,
            histogram,
            histogram_description,
            embedding,
            embedding_description,
            mask,
            segmentation_description,
            overlay: composited,
            timings,
        })
    }

    #[allow(clippy::type_complexity)]
    fn run_model_stages(
        &mut self,
        canvas: &FixedImage,
        timings: &mut AnalysisTimings,
        token: &CancellationToken,
    ) -> Result<(
        ColorHistogramFeature,
        String,
        DeepEmbedding,
        String,
        SegmentationMask,
        String,
        RgbImage,
    )> {
        self.check_cancelled(token)?;
        self.tracker.enter_stage(AnalysisStage::ExtractingFeatures);

        let histogram_start = Instant::now();
        let (histogram, histogram_description) = self.histogram.extract(canvas);
        timings.histogram_ms = histogram_start.elapsed().as_millis() as u64;

        let embedding_start = Instant::now();
        let (embedding, embedding_description) = self.embedding.extract(canvas)?;
        timings.embedding_ms = embedding_start.elapsed().as_millis() as u64;

        self.check_cancelled(token)?;
        self.tracker.enter_stage(AnalysisStage::Segmenting);

        let segmentation_start = Instant::now();
        let mask = self.segmenter.segment(canvas)?;
        timings.segmentation_ms = segmentation_start.elapsed().as_millis() as u64;
        let segmentation_description = self.segmenter.describe(&mask);

        let overlay_start = Instant::now();
        let composited = overlay(canvas, &mask, self.config.overlay_weight);
        timings.overlay_ms = overlay_start.elapsed().as_millis() as u64;

        Ok((
            histogram,
            histogram_description,
            embedding,
            embedding_description,
            mask,
            segmentation_description,
            composited,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::test_utils::{placeholder_model_file, MockBackend};
    use crate::inference::BackendOptions;
    use crate::models::{ModelKind, EMBEDDING_DIM};
    use crate::progress::ProgressUpdate;
    use image::{ImageBuffer, Rgb};
    use std::sync::{Arc, Mutex};

    fn mock_pipeline(config: AnalysisConfig, dir: &Path) -> AnalysisPipeline {
        let classifier = placeholder_model_file(dir, ModelKind::Classifier);
        let segmenter_model = placeholder_model_file(dir, ModelKind::Segmenter);
        let embedding = EmbeddingExtractor::with_backend(
            classifier,
            BackendOptions::from_config(&config),
            Box::new(MockBackend::classifier()),
        );
        let segmenter = Segmenter::with_backend(
            segmenter_model,
            BackendOptions::from_config(&config),
            Box::new(MockBackend::segmenter()),
        );
        AnalysisPipeline::from_parts(config, embedding, segmenter)
    }

    fn write_jpeg(dir: &Path, width: u32, height: u32) -> PathBuf {
        let path = dir.join("input.jpg");
        let img: ImageBuffer<Rgb<u8>, Vec<u8>> = ImageBuffer::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, 64])
        });
        img.save(&path).unwrap();
        path
    }

    #[derive(Clone, Default)]
    struct StageRecorder {
        stages: Arc<Mutex<Vec<AnalysisStage>>>,
    }

    impl ProgressReporter for StageRecorder {
        fn report(&mut self, update: &ProgressUpdate) {
            self.stages.lock().unwrap().push(update.stage);
        }
    }

    #[test]
    fn test_reference_scenario_1024x768_jpeg() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_jpeg(dir.path(), 1024, 768);
        let mut pipeline = mock_pipeline(AnalysisConfig::default(), dir.path());

        let report = pipeline.analyze_file(&input).unwrap();
        assert_eq!(report.original_dimensions, (1024, 768));
        assert_eq!((report.canvas.width(), report.canvas.height()), (512, 512));
        assert_eq!(report.histogram.len(), 192);
        assert_eq!(report.embedding.len(), EMBEDDING_DIM);
        assert!(report
            .mask
            .labels()
            .iter()
            .all(|&l| usize::from(l) <= 20));
        assert_eq!(report.overlay.dimensions(), (512, 512));
        assert_eq!(report.source.as_deref(), Some(input.as_path()));
    }

    #[test]
    fn test_nonexistent_path_halts_before_model_stages() {
        let dir = tempfile::tempdir().unwrap();
        let mut pipeline = mock_pipeline(AnalysisConfig::default(), dir.path());
        let recorder = StageRecorder::default();
        let stages = Arc::clone(&recorder.stages);
        pipeline.set_progress_reporter(Box::new(recorder));

        let err = pipeline.analyze_file("/no/such/image.png").unwrap_err();
        assert!(err.is_preprocessing_failure());
        assert_eq!(
            *stages.lock().unwrap(),
            vec![AnalysisStage::Loading, AnalysisStage::Failed]
        );
        // No model was touched.
        assert_eq!(pipeline.current_stage(), AnalysisStage::Failed);
    }

    #[test]
    fn test_stage_sequence_on_success() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_jpeg(dir.path(), 64, 64);
        let mut pipeline = mock_pipeline(AnalysisConfig::default(), dir.path());
        let recorder = StageRecorder::default();
        let stages = Arc::clone(&recorder.stages);
        pipeline.set_progress_reporter(Box::new(recorder));

        pipeline.analyze_file(&input).unwrap();
        assert_eq!(
            *stages.lock().unwrap(),
            vec![
                AnalysisStage::Loading,
                AnalysisStage::Preprocessing,
                AnalysisStage::ExtractingFeatures,
                AnalysisStage::Segmenting,
                AnalysisStage::Completed
            ]
        );
    }

    #[test]
    fn test_model_failure_enters_failed_state() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_jpeg(dir.path(), 64, 64);
        let config = AnalysisConfig::default();
        let embedding = EmbeddingExtractor::with_backend(
            placeholder_model_file(dir.path(), ModelKind::Classifier),
            BackendOptions::from_config(&config),
            Box::new(MockBackend::classifier().failing_init()),
        );
        let segmenter = Segmenter::with_backend(
            placeholder_model_file(dir.path(), ModelKind::Segmenter),
            BackendOptions::from_config(&config),
            Box::new(MockBackend::segmenter()),
        );
        let mut pipeline = AnalysisPipeline::from_parts(config, embedding, segmenter);

        let err = pipeline.analyze_file(&input).unwrap_err();
        assert!(matches!(
            err,
            PixelscopeError::ModelUnavailable(_)
        ));
        assert_eq!(pipeline.current_stage(), AnalysisStage::Failed);
    }

    #[test]
    fn test_reinvocation_produces_fresh_reports() {
        let dir = tempfile::tempdir().unwrap();
        let first = write_jpeg(dir.path(), 200, 100);
        let second_path = dir.path().join("second.png");
        let img: ImageBuffer<Rgb<u8>, Vec<u8>> = ImageBuffer::from_pixel(80, 80, Rgb([200, 10, 10]));
        img.save(&second_path).unwrap();

        let mut pipeline = mock_pipeline(AnalysisConfig::default(), dir.path());
        let report_a = pipeline.analyze_file(&first).unwrap();
        let report_b = pipeline.analyze_file(&second_path).unwrap();

        assert_eq!(report_a.original_dimensions, (200, 100));
        assert_eq!(report_b.original_dimensions, (80, 80));
        assert_ne!(report_a.histogram, report_b.histogram);
        assert_ne!(report_a.embedding, report_b.embedding);
    }

    #[test]
    fn test_pre_cancelled_token_skips_model_stages() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_jpeg(dir.path(), 64, 64);
        let config = AnalysisConfig::default();
        let backend = MockBackend::classifier();
        let history = backend.clone();
        let embedding = EmbeddingExtractor::with_backend(
            placeholder_model_file(dir.path(), ModelKind::Classifier),
            BackendOptions::from_config(&config),
            Box::new(backend),
        );
        let segmenter = Segmenter::with_backend(
            placeholder_model_file(dir.path(), ModelKind::Segmenter),
            BackendOptions::from_config(&config),
            Box::new(MockBackend::segmenter()),
        );
        let mut pipeline = AnalysisPipeline::from_parts(config, embedding, segmenter);

        let token = CancellationToken::new();
        token.cancel();
        let err = pipeline.analyze_file_with_token(&input, &token).unwrap_err();
        assert!(err.is_cancelled());
        assert!(history.call_history().is_empty());
        assert_eq!(pipeline.current_stage(), AnalysisStage::Idle);
    }

    #[test]
    fn test_custom_bins_and_overlay_weight() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_jpeg(dir.path(), 128, 128);
        let config = AnalysisConfig::builder()
            .hist_bins(32)
            .overlay_weight(0.0)
            .build()
            .unwrap();
        let mut pipeline = mock_pipeline(config, dir.path());

        let report = pipeline.analyze_file(&input).unwrap();
        assert_eq!(report.histogram.len(), 96);
        // Weight 0.0 means the overlay is pure palette color everywhere.
        for pixel in report.overlay.pixels() {
            assert!(crate::segmentation::PALETTE.contains(&pixel.0));
        }
    }
}
