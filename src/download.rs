//! Model weight downloading
//!
//! Async downloading of registry models with progress reporting, SHA-256
//! digests and atomic cache placement. Weights are streamed into a temporary
//! directory and only renamed into the cache after the whole file and its
//! metadata are on disk, so a crashed download never leaves a half-usable
//! cache entry behind.

use crate::cache::{ModelCache, METADATA_FILE};
use crate::error::{PixelscopeError, Result};
use crate::models::{CachedModelMetadata, ModelDescriptor};
use futures_util::stream::TryStreamExt;
#[cfg(feature = "cli")]
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::Client;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio_util::io::StreamReader;

/// Repository path prefix that resolves raw files
const RAW_FILE_SEGMENT: &str = "resolve/main";

/// Downloads registry model weights into the cache
#[derive(Debug)]
pub struct ModelDownloader {
    client: Client,
    cache: ModelCache,
}

/// Progress bar abstraction that works with and without CLI features
#[derive(Debug)]
pub enum ProgressIndicator {
    /// Interactive terminal progress bar
    #[cfg(feature = "cli")]
    Indicatif(ProgressBar),
    /// Silent operation
    NoOp,
}

impl ProgressIndicator {
    /// Set message for progress indicator
    #[cfg_attr(not(feature = "cli"), allow(unused_variables))]
    pub fn set_message(&self, msg: String) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.set_message(msg),
            Self::NoOp => {},
        }
    }

    /// Set length for progress indicator
    #[cfg_attr(not(feature = "cli"), allow(unused_variables))]
    pub fn set_length(&self, len: u64) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.set_length(len),
            Self::NoOp => {},
        }
    }

    /// Set position for progress indicator
    #[cfg_attr(not(feature = "cli"), allow(unused_variables))]
    pub fn set_position(&self, pos: u64) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.set_position(pos),
            Self::NoOp => {},
        }
    }

    /// Finish progress indicator with message
    #[cfg_attr(not(feature = "cli"), allow(unused_variables))]
    pub fn finish_with_message(&self, msg: String) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.finish_with_message(msg),
            Self::NoOp => {},
        }
    }
}

impl ModelDownloader {
    /// Create a downloader over the default cache location
    ///
    /// # Errors
    /// - Failed to create HTTP client
    /// - Failed to initialize model cache
    pub fn new() -> Result<Self> {
        let cache = ModelCache::new()?;
        Self::with_cache(cache)
    }

    /// Create a downloader over an explicit cache
    ///
    /// # Errors
    /// - Failed to create HTTP client
    pub fn with_cache(cache: ModelCache) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(300))
            .build()
            .map_err(|e| PixelscopeError::network_error("Failed to create HTTP client", &e))?;
        Ok(Self { client, cache })
    }

    /// Ensure a registry model's weights are present in the cache
    ///
    /// Returns the cached weights path, downloading them first when missing.
    ///
    /// # Errors
    /// - Network errors during download
    /// - File system errors during caching
    pub async fn ensure_model(
        &self,
        descriptor: &ModelDescriptor,
        show_progress: bool,
    ) -> Result<PathBuf> {
        if self.cache.is_model_cached(descriptor.id) {
            log::debug!("Model already cached: {}", descriptor.id);
            return Ok(self.cache.model_dir(descriptor.id).join(descriptor.file_name));
        }
        self.download_model(descriptor, show_progress).await
    }

    /// Download a registry model's weights into the cache
    ///
    /// Streams the ONNX file into a temporary directory, records a metadata
    /// file with its SHA-256 digest and size, then renames the directory into
    /// the cache.
    ///
    /// # Errors
    /// - Network errors during download
    /// - File system errors during caching
    pub async fn download_model(
        &self,
        descriptor: &ModelDescriptor,
        show_progress: bool,
    ) -> Result<PathBuf> {
        let file_url = format!("{}/{}/{}", descriptor.url, RAW_FILE_SEGMENT, descriptor.file_name);
        log::info!("Downloading model '{}' from {}", descriptor.id, file_url);

        let temp_dir = Self::create_temp_download_dir(descriptor.id)?;
        let final_dir = self.cache.model_dir(descriptor.id);

        let progress = if show_progress {
            Some(Self::create_progress_indicator())
        } else {
            None
        };
        if let Some(pb) = progress.as_ref() {
            pb.set_message(format!("Downloading {}", descriptor.display_name));
        }

        let weights_path = temp_dir.join(descriptor.file_name);
        let result = self
            .download_file(&file_url, &weights_path, progress.as_ref())
            .await
            .and_then(|(sha256, size_bytes)| {
                Self::write_metadata(&temp_dir, descriptor, sha256, size_bytes)
            });

        match result {
            Ok(()) => {
                if final_dir.exists() {
                    fs::remove_dir_all(&final_dir).map_err(|e| {
                        PixelscopeError::file_io_error(
                            "remove existing model directory",
                            &final_dir,
                            &e,
                        )
                    })?;
                }
                fs::rename(&temp_dir, &final_dir).map_err(|e| {
                    PixelscopeError::file_io_error("move downloaded model to cache", &final_dir, &e)
                })?;

                if let Some(pb) = progress {
                    pb.finish_with_message(format!("Downloaded {}", descriptor.id));
                }
                log::info!("Successfully downloaded model: {}", descriptor.id);
                Ok(final_dir.join(descriptor.file_name))
            },
            Err(e) => {
                if temp_dir.exists() {
                    if let Err(cleanup_err) = fs::remove_dir_all(&temp_dir) {
                        log::warn!("Failed to cleanup temp directory: {cleanup_err}");
                    }
                }
                if let Some(pb) = progress {
                    pb.finish_with_message("Download failed".to_string());
                }
                Err(e)
            },
        }
    }

    fn create_temp_download_dir(model_id: &str) -> Result<PathBuf> {
        let temp_dir = std::env::temp_dir().join(format!("pixelscope-download-{model_id}"));

        if temp_dir.exists() {
            fs::remove_dir_all(&temp_dir).map_err(|e| {
                PixelscopeError::file_io_error("remove existing temp directory", &temp_dir, &e)
            })?;
        }
        fs::create_dir_all(&temp_dir)
            .map_err(|e| PixelscopeError::file_io_error("create temp directory", &temp_dir, &e))?;
        Ok(temp_dir)
    }

    fn create_progress_indicator() -> ProgressIndicator {
        #[cfg(feature = "cli")]
        {
            let pb = ProgressBar::new(100);
            if let Ok(style) = ProgressStyle::default_bar().template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}",
            ) {
                pb.set_style(style.progress_chars("#>-"));
            }
            ProgressIndicator::Indicatif(pb)
        }
        #[cfg(not(feature = "cli"))]
        {
            ProgressIndicator::NoOp
        }
    }

    fn write_metadata(
        dir: &Path,
        descriptor: &ModelDescriptor,
        sha256: String,
        size_bytes: u64,
    ) -> Result<()> {
        let metadata = CachedModelMetadata {
            model_id: descriptor.id.to_string(),
            source_url: descriptor.url.to_string(),
            sha256,
            size_bytes,
        };
        let path = dir.join(METADATA_FILE);
        let json = serde_json::to_string_pretty(&metadata)
            .map_err(|e| PixelscopeError::processing(format!("serialize model metadata: {e}")))?;
        fs::write(&path, json)
            .map_err(|e| PixelscopeError::file_io_error("write model metadata", &path, &e))
    }

    /// Download a single file, returning its SHA-256 digest and byte count
    async fn download_file(
        &self,
        url: &str,
        local_path: &Path,
        progress: Option<&ProgressIndicator>,
    ) -> Result<(String, u64)> {
        log::debug!("Downloading: {} -> {}", url, local_path.display());

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| PixelscopeError::network_error("Failed to start download", &e))?;

        if !response.status().is_success() {
            return Err(PixelscopeError::Network(format!(
                "HTTP error {} for {url}",
                response.status()
            )));
        }

        let total_size = response.content_length();

        let mut file = tokio::fs::File::create(local_path)
            .await
            .map_err(|e| PixelscopeError::file_io_error("create file", local_path, &e))?;

        let mut stream = StreamReader::new(
            response
                .bytes_stream()
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e)),
        );

        let mut hasher = Sha256::new();
        let mut downloaded = 0u64;
        let mut buffer = vec![0; 8192];

        loop {
            let bytes_read = tokio::io::AsyncReadExt::read(&mut stream, &mut buffer)
                .await
                .map_err(|e| PixelscopeError::Network(format!("read download stream: {e}")))?;
            if bytes_read == 0 {
                break;
            }

            let chunk = buffer.get(..bytes_read).unwrap_or(&[]);
            hasher.update(chunk);
            file.write_all(chunk)
                .await
                .map_err(|e| PixelscopeError::file_io_error("write to file", local_path, &e))?;
            downloaded += bytes_read as u64;

            if let Some(pb) = progress {
                if let Some(total) = total_size {
                    pb.set_length(total);
                    pb.set_position(downloaded);
                } else {
                    pb.set_message(format!(
                        "Downloaded {:.1} MB",
                        downloaded as f64 / 1_024_000.0
                    ));
                }
            }
        }

        file.flush()
            .await
            .map_err(|e| PixelscopeError::file_io_error("flush file", local_path, &e))?;

        log::debug!("Downloaded {downloaded} bytes to {}", local_path.display());
        Ok((format!("{:x}", hasher.finalize()), downloaded))
    }

    /// Verify a cached file against an expected SHA-256 digest
    ///
    /// # Errors
    /// - File unreadable
    pub fn verify_file_integrity(file_path: &Path, expected_hash: &str) -> Result<bool> {
        let contents = fs::read(file_path).map_err(|e| {
            PixelscopeError::file_io_error("read file for verification", file_path, &e)
        })?;

        let mut hasher = Sha256::new();
        hasher.update(&contents);
        let actual_hash = format!("{:x}", hasher.finalize());

        if actual_hash == expected_hash {
            Ok(true)
        } else {
            log::warn!(
                "File integrity check failed for {}: expected {expected_hash}, got {actual_hash}",
                file_path.display(),
            );
            Ok(false)
        }
    }

    /// The model cache this downloader fills
    #[must_use]
    pub fn cache(&self) -> &ModelCache {
        &self.cache
    }
}
