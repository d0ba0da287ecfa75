//! Configuration conversion utilities for CLI arguments

use crate::cli::main_impl::Cli;
use crate::{
    config::{AnalysisConfig, ExecutionProvider},
    models::{ModelKind, ModelSource, ModelSpec},
};
use anyhow::{Context, Result};

/// Convert CLI arguments to a unified `AnalysisConfig`
pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Build an `AnalysisConfig` from CLI arguments
    pub(crate) fn from_cli(cli: &Cli) -> Result<AnalysisConfig> {
        let (width, height) = parse_size(&cli.size).context("Invalid --size argument")?;
        let provider: ExecutionProvider = cli
            .execution_provider
            .parse()
            .context("Invalid --execution-provider argument")?;

        let mut builder = AnalysisConfig::builder()
            .target_size(width, height)
            .hist_bins(cli.bins)
            .overlay_weight(cli.overlay_weight)
            .execution_provider(provider)
            .intra_threads(cli.threads)
            .inter_threads(cli.threads);

        if let Some(path) = &cli.classifier_model {
            builder = builder.classifier_spec(ModelSpec {
                kind: ModelKind::Classifier,
                source: ModelSource::External(path.clone()),
            });
        }
        if let Some(path) = &cli.segmenter_model {
            builder = builder.segmenter_spec(ModelSpec {
                kind: ModelKind::Segmenter,
                source: ModelSource::External(path.clone()),
            });
        }

        builder.build().context("Invalid analysis configuration")
    }
}

/// Parse a `WIDTHxHEIGHT` argument such as `512x512`
pub(crate) fn parse_size(value: &str) -> Result<(u32, u32)> {
    let (w, h) = value
        .split_once(['x', 'X'])
        .with_context(|| format!("expected WIDTHxHEIGHT, got '{value}'"))?;
    let width = w
        .trim()
        .parse::<u32>()
        .with_context(|| format!("invalid width '{w}'"))?;
    let height = h
        .trim()
        .parse::<u32>()
        .with_context(|| format!("invalid height '{h}'"))?;
    Ok((width, height))
}
