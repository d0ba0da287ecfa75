//! Integration tests for complete analysis workflows
//!
//! These tests verify end-to-end functionality without relying on external
//! models, using mock backends to simulate real inference.

use image::{DynamicImage, ImageBuffer, Rgb};
use pixelscope::{
    backends::test_utils::{placeholder_model_file, MockBackend},
    config::AnalysisConfig,
    error::PixelscopeError,
    features::EmbeddingExtractor,
    inference::BackendOptions,
    models::{ModelKind, EMBEDDING_DIM},
    pipeline::AnalysisPipeline,
    segmentation::{Segmenter, PALETTE},
};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Build a pipeline whose model stages run on mock backends
fn mock_pipeline(config: AnalysisConfig, model_dir: &Path) -> AnalysisPipeline {
    let embedding = EmbeddingExtractor::with_backend(
        placeholder_model_file(model_dir, ModelKind::Classifier),
        BackendOptions::from_config(&config),
        Box::new(MockBackend::classifier()),
    );
    let segmenter = Segmenter::with_backend(
        placeholder_model_file(model_dir, ModelKind::Segmenter),
        BackendOptions::from_config(&config),
        Box::new(MockBackend::segmenter()),
    );
    AnalysisPipeline::from_parts(config, embedding, segmenter)
}

/// Write a gradient test image in the requested format
fn write_test_image(dir: &Path, name: &str, width: u32, height: u32) -> PathBuf {
    let path = dir.join(name);
    let image: ImageBuffer<Rgb<u8>, Vec<u8>> = ImageBuffer::from_fn(width, height, |x, y| {
        let intensity = ((x + y) % 100) as u8;
        Rgb([intensity, 128, 255 - intensity])
    });
    image.save(&path).unwrap();
    path
}

#[test]
fn test_full_analysis_of_landscape_jpeg() {
    let dir = TempDir::new().unwrap();
    let input = write_test_image(dir.path(), "photo.jpg", 1024, 768);
    let mut pipeline = mock_pipeline(AnalysisConfig::default(), dir.path());

    let report = pipeline.analyze_file(&input).unwrap();

    assert_eq!(report.original_dimensions, (1024, 768));
    assert_eq!((report.canvas.width(), report.canvas.height()), (512, 512));

    // 64 bins per channel, three channels.
    assert_eq!(report.histogram.len(), 192);
    assert!(report.histogram.iter().all(|&v| (0.0..=1.0).contains(&v)));

    assert_eq!(report.embedding.len(), EMBEDDING_DIM);
    assert!(report.mask.labels().iter().all(|&l| usize::from(l) < PALETTE.len()));
    assert_eq!(report.overlay.dimensions(), (512, 512));

    assert!(report.histogram_description.contains("Color Histogram"));
    assert!(report.embedding_description.contains("(2048,)"));
    assert!(report.segmentation_description.contains("---"));
}

#[test]
fn test_unreadable_input_runs_no_model_stage() {
    let dir = TempDir::new().unwrap();
    let mut pipeline = mock_pipeline(AnalysisConfig::default(), dir.path());

    let err = pipeline
        .analyze_file(dir.path().join("does_not_exist.png"))
        .unwrap_err();
    assert!(matches!(err, PixelscopeError::NotReadable { .. }));
}

#[test]
fn test_corrupt_input_is_rejected_with_path_context() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.jpg");
    std::fs::write(&path, b"definitely not a jpeg").unwrap();

    let mut pipeline = mock_pipeline(AnalysisConfig::default(), dir.path());
    let err = pipeline.analyze_file(&path).unwrap_err();
    assert!(err.to_string().contains("broken.jpg"));
}

#[test]
fn test_analysis_is_deterministic_for_identical_inputs() {
    let dir = TempDir::new().unwrap();
    let input = write_test_image(dir.path(), "repeat.png", 320, 240);
    let mut pipeline = mock_pipeline(AnalysisConfig::default(), dir.path());

    let first = pipeline.analyze_file(&input).unwrap();
    let second = pipeline.analyze_file(&input).unwrap();

    assert_eq!(first.histogram, second.histogram);
    assert_eq!(first.embedding, second.embedding);
    assert_eq!(first.mask.labels(), second.mask.labels());
    assert_eq!(first.overlay.as_raw(), second.overlay.as_raw());
}

#[test]
fn test_overlay_weight_one_reproduces_the_canvas() {
    let dir = TempDir::new().unwrap();
    let input = write_test_image(dir.path(), "plain.png", 64, 64);
    let config = AnalysisConfig::builder().overlay_weight(1.0).build().unwrap();
    let mut pipeline = mock_pipeline(config, dir.path());

    let report = pipeline.analyze_file(&input).unwrap();
    assert_eq!(report.overlay.as_raw(), report.canvas.as_rgb().as_raw());
}

#[test]
fn test_custom_canvas_and_bins_propagate_through_the_report() {
    let dir = TempDir::new().unwrap();
    let input = write_test_image(dir.path(), "small.png", 777, 333);
    let config = AnalysisConfig::builder()
        .target_size(256, 256)
        .hist_bins(16)
        .build()
        .unwrap();
    let mut pipeline = mock_pipeline(config, dir.path());

    let report = pipeline.analyze_file(&input).unwrap();
    assert_eq!((report.canvas.width(), report.canvas.height()), (256, 256));
    assert_eq!(report.histogram.len(), 48);
    assert_eq!(report.overlay.dimensions(), (256, 256));
}

#[test]
fn test_analyze_decoded_image_without_a_file() {
    let dir = TempDir::new().unwrap();
    let mut pipeline = mock_pipeline(AnalysisConfig::default(), dir.path());

    let image: ImageBuffer<Rgb<u8>, Vec<u8>> = ImageBuffer::from_pixel(90, 60, Rgb([10, 200, 30]));
    let report = pipeline
        .analyze_image(&DynamicImage::ImageRgb8(image))
        .unwrap();

    assert_eq!(report.original_dimensions, (90, 60));
    assert!(report.source.is_none());
    assert_eq!(report.embedding.len(), EMBEDDING_DIM);
}
