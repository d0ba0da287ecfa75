//! Image analysis CLI tool
//!
//! Command-line interface for the pixelscope analysis pipeline: histogram,
//! deep feature and segmentation of a single image, with overlay export.

use super::config::CliConfigBuilder;
use crate::{
    cache::{format_size, ModelCache},
    download::ModelDownloader,
    models::{descriptor_by_id, registry, ModelSource, ModelSpec},
    pipeline::{AnalysisPipeline, AnalysisReport},
    progress::{ProgressReporter, ProgressUpdate},
    tracing_config::TracingConfig,
};
use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use log::info;
use std::path::PathBuf;

/// Image analysis CLI tool
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(name = "pixelscope")]
#[allow(clippy::struct_excessive_bools)]
pub struct Cli {
    /// Input image file
    #[arg(value_name = "INPUT", required_unless_present_any = &["only_download", "list_models", "clear_cache", "show_cache_dir"])]
    pub input: Option<PathBuf>,

    /// Write the segmentation overlay to this path
    #[arg(short, long, value_name = "OUTPUT")]
    pub output: Option<PathBuf>,

    /// Write the colorized class mask (without blending) to this path
    #[arg(long, value_name = "PATH")]
    pub mask_output: Option<PathBuf>,

    /// Canvas size every input is stretched to, as WIDTHxHEIGHT
    #[arg(long, default_value = "512x512")]
    pub size: String,

    /// Histogram bins per color channel (1-256)
    #[arg(long, default_value_t = 64)]
    pub bins: usize,

    /// Blend weight of the original image in the overlay (0.0-1.0)
    #[arg(long, default_value_t = 0.6)]
    pub overlay_weight: f32,

    /// Execution provider (auto, cpu, cuda)
    #[arg(short, long, default_value = "auto")]
    pub execution_provider: String,

    /// Number of threads (0 = auto-detect optimal threading)
    #[arg(short, long, default_value_t = 0)]
    pub threads: usize,

    /// Enable verbose logging (-v: DEBUG, -vv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Path to an external classification backbone ONNX file
    #[arg(long, value_name = "PATH")]
    pub classifier_model: Option<PathBuf>,

    /// Path to an external segmentation network ONNX file
    #[arg(long, value_name = "PATH")]
    pub segmenter_model: Option<PathBuf>,

    /// Download the registry models but don't process any image
    #[arg(long)]
    pub only_download: bool,

    /// List cached models and exit
    #[arg(long)]
    pub list_models: bool,

    /// Clear all cached models and exit
    #[arg(long)]
    pub clear_cache: bool,

    /// Show current cache directory and exit
    #[arg(long)]
    pub show_cache_dir: bool,

    /// Use custom cache directory
    #[arg(long, value_name = "PATH")]
    pub cache_dir: Option<PathBuf>,
}

pub async fn main() -> Result<()> {
    let cli = Cli::parse();

    TracingConfig::new()
        .with_verbosity(cli.verbose)
        .init()
        .context("Failed to initialize tracing")?;

    if let Some(dir) = &cli.cache_dir {
        // ModelCache reads this override everywhere it is constructed.
        std::env::set_var("PIXELSCOPE_CACHE_DIR", dir);
    }

    if cli.list_models {
        return list_cached_models();
    }
    if cli.clear_cache {
        return clear_cached_models();
    }
    if cli.show_cache_dir {
        return show_current_cache_dir();
    }
    if cli.only_download {
        return download_registry_models().await;
    }

    let input = cli
        .input
        .clone()
        .context("At least one input image is required")?;
    let config = CliConfigBuilder::from_cli(&cli).context("Failed to build configuration")?;

    info!("Input: {}", input.display());
    info!(
        "Canvas: {}x{}, bins: {}, overlay weight: {}",
        config.target_width, config.target_height, config.hist_bins, config.overlay_weight
    );

    ensure_model_available(&config.classifier_spec).await?;
    ensure_model_available(&config.segmenter_spec).await?;

    let mut pipeline =
        AnalysisPipeline::new(config).context("Failed to create analysis pipeline")?;
    pipeline.set_progress_reporter(Box::new(SpinnerReporter::new()));

    let report = pipeline
        .analyze_file(&input)
        .with_context(|| format!("Failed to analyze '{}'", input.display()))?;

    print_report(&report);
    save_outputs(&cli, &report)?;
    Ok(())
}

/// Ensure a model's weights are available, auto-downloading registry entries
async fn ensure_model_available(spec: &ModelSpec) -> Result<()> {
    if let ModelSource::Downloaded(model_id) = &spec.source {
        let cache = ModelCache::new().context("Failed to create model cache")?;
        if cache.is_model_cached(model_id) {
            return Ok(());
        }

        let descriptor = descriptor_by_id(model_id).with_context(|| {
            format!("Model '{model_id}' is not in the registry and not cached. Use --list-models to see cached models.")
        })?;

        println!("Model '{model_id}' not cached, downloading...");
        let downloader = ModelDownloader::new().context("Failed to create model downloader")?;
        downloader
            .download_model(descriptor, true)
            .await
            .with_context(|| format!("Failed to download model '{model_id}'"))?;
    }
    Ok(())
}

/// Download every registry model into the cache
async fn download_registry_models() -> Result<()> {
    let downloader = ModelDownloader::new().context("Failed to create model downloader")?;
    for descriptor in registry() {
        let path = downloader
            .ensure_model(descriptor, true)
            .await
            .with_context(|| format!("Failed to download model '{}'", descriptor.id))?;
        println!("{} -> {}", descriptor.id, path.display());
    }
    Ok(())
}

/// List cached models
fn list_cached_models() -> Result<()> {
    let cache = ModelCache::new().context("Failed to initialize model cache")?;
    let models = cache
        .scan_cached_models()
        .context("Failed to list cached models")?;

    println!("Cached models in {}", cache.cache_dir().display());
    if models.is_empty() {
        println!("  (none)");
        println!("\nRun with --only-download to fetch the default models.");
        return Ok(());
    }

    for model in models {
        let status = if model.has_weights {
            "ok"
        } else {
            "missing weights"
        };
        println!(
            "  {} [{}] {} ({})",
            model.model_id,
            status,
            model.path.display(),
            format_size(model.size_bytes)
        );
    }
    Ok(())
}

/// Clear all cached models
fn clear_cached_models() -> Result<()> {
    let cache = ModelCache::new().context("Failed to initialize model cache")?;
    let removed = cache.clear_all().context("Failed to clear model cache")?;
    println!("Removed {removed} cached model(s)");
    Ok(())
}

/// Show the active cache directory
fn show_current_cache_dir() -> Result<()> {
    let cache = ModelCache::new().context("Failed to initialize model cache")?;
    println!("{}", cache.cache_dir().display());
    Ok(())
}

/// Print the three analysis descriptions and timings to stdout
fn print_report(report: &AnalysisReport) {
    println!(
        "Input: {}x{} -> canvas {}x{}",
        report.original_dimensions.0,
        report.original_dimensions.1,
        report.canvas.width(),
        report.canvas.height()
    );
    println!();
    println!("{}", report.histogram_description);
    println!();
    println!("{}", report.embedding_description);
    println!();
    println!("{}", report.segmentation_description);
    println!();
    println!(
        "Timings: load {}ms, preprocess {}ms, histogram {}ms, embedding {}ms, segmentation {}ms, overlay {}ms, total {}ms",
        report.timings.loading_ms,
        report.timings.preprocessing_ms,
        report.timings.histogram_ms,
        report.timings.embedding_ms,
        report.timings.segmentation_ms,
        report.timings.overlay_ms,
        report.timings.total_ms
    );
}

/// Save the overlay and mask images where requested
fn save_outputs(cli: &Cli, report: &AnalysisReport) -> Result<()> {
    if let Some(path) = &cli.output {
        report
            .overlay
            .save(path)
            .with_context(|| format!("Failed to save overlay to '{}'", path.display()))?;
        println!("Overlay saved to {}", path.display());
    }
    if let Some(path) = &cli.mask_output {
        report
            .mask
            .colorize()
            .save(path)
            .with_context(|| format!("Failed to save mask to '{}'", path.display()))?;
        println!("Mask saved to {}", path.display());
    }
    Ok(())
}

/// Spinner-based stage reporter for interactive terminals
struct SpinnerReporter {
    bar: ProgressBar,
}

impl SpinnerReporter {
    fn new() -> Self {
        let bar = ProgressBar::new(100);
        if let Ok(style) =
            ProgressStyle::default_bar().template("{spinner:.green} [{bar:30.cyan/blue}] {msg}")
        {
            bar.set_style(style.progress_chars("#>-"));
        }
        Self { bar }
    }
}

impl ProgressReporter for SpinnerReporter {
    fn report(&mut self, update: &ProgressUpdate) {
        use crate::progress::AnalysisStage;
        match update.stage {
            AnalysisStage::Completed | AnalysisStage::Failed => {
                self.bar.set_position(u64::from(update.progress));
                self.bar.finish_with_message(update.description.clone());
            },
            _ => {
                self.bar.set_position(u64::from(update.progress));
                self.bar.set_message(update.description.clone());
            },
        }
    }
}
