//! Image loading and canonical-canvas preprocessing
//!
//! Every input image is decoded and stretched (non-aspect-preserving, by
//! design) onto a fixed canvas before any feature or segmentation stage sees
//! it. Downstream stages rely on the `FixedImage` invariant and never
//! re-validate dimensions.

use crate::{
    config::AnalysisConfig,
    error::{PixelscopeError, Result},
};
use image::{imageops::FilterType, DynamicImage, RgbImage};
use std::path::Path;

/// An RGB image constrained to the configured canonical dimensions
///
/// Invariant: `width()` and `height()` always equal the dimensions the
/// producing `Preprocessor` was configured with, regardless of input aspect
/// ratio. Instances are immutable; stages derive new images instead of
/// mutating.
#[derive(Debug, Clone)]
pub struct FixedImage {
    image: RgbImage,
}

impl FixedImage {
    /// Canvas width in pixels
    #[must_use]
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    /// Canvas height in pixels
    #[must_use]
    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Borrow the underlying RGB pixel buffer
    #[must_use]
    pub fn as_rgb(&self) -> &RgbImage {
        &self.image
    }

    /// Consume into the underlying RGB pixel buffer
    #[must_use]
    pub fn into_rgb(self) -> RgbImage {
        self.image
    }
}

/// Decode an image file, mapping every decode failure to `NotReadable`
///
/// # Errors
/// - `PixelscopeError::NotReadable` when the path does not decode
pub fn load_image<P: AsRef<Path>>(path: P) -> Result<DynamicImage> {
    let path = path.as_ref();
    image::open(path).map_err(|e| PixelscopeError::not_readable(path, e.to_string()))
}

/// Loads images from disk and stretches them onto the canonical canvas
#[derive(Debug, Clone)]
pub struct Preprocessor {
    target_width: u32,
    target_height: u32,
}

impl Preprocessor {
    /// Create a preprocessor for an explicit canvas size
    #[must_use]
    pub fn new(target_width: u32, target_height: u32) -> Self {
        Self {
            target_width,
            target_height,
        }
    }

    /// Create a preprocessor from pipeline configuration
    #[must_use]
    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self::new(config.target_width, config.target_height)
    }

    /// Decode an image file and stretch it to the canonical canvas
    ///
    /// Pure function of the path and the configured dimensions; no other side
    /// effects. Any decode failure (missing file, corrupt data, unsupported
    /// format) maps to `NotReadable` so the caller can branch without a panic
    /// crossing this boundary.
    ///
    /// # Errors
    /// - `PixelscopeError::NotReadable` when the path does not decode
    pub fn preprocess<P: AsRef<Path>>(&self, path: P) -> Result<FixedImage> {
        let path = path.as_ref();
        let image = load_image(path)?;
        log::debug!(
            "Decoded '{}' ({}x{}), stretching to {}x{}",
            path.display(),
            image.width(),
            image.height(),
            self.target_width,
            self.target_height
        );
        Ok(self.preprocess_image(&image))
    }

    /// Stretch an already-decoded image to the canonical canvas
    ///
    /// CatmullRom favors quality when shrinking; nearest-neighbor would change
    /// observable pixel values and is not an acceptable substitute here.
    #[must_use]
    pub fn preprocess_image(&self, image: &DynamicImage) -> FixedImage {
        let rgb = image.to_rgb8();
        let resized = image::imageops::resize(
            &rgb,
            self.target_width,
            self.target_height,
            FilterType::CatmullRom,
        );
        FixedImage { image: resized }
    }

    /// Configured canvas dimensions
    #[must_use]
    pub fn target_dimensions(&self) -> (u32, u32) {
        (self.target_width, self.target_height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};
    use std::io::Write;

    fn gradient_image(width: u32, height: u32) -> DynamicImage {
        let img: ImageBuffer<Rgb<u8>, Vec<u8>> = ImageBuffer::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
        });
        DynamicImage::ImageRgb8(img)
    }

    #[test]
    fn test_output_is_always_canvas_sized() {
        let preprocessor = Preprocessor::new(512, 512);
        for (w, h) in [(1024, 768), (50, 900), (512, 512), (3, 7)] {
            let fixed = preprocessor.preprocess_image(&gradient_image(w, h));
            assert_eq!((fixed.width(), fixed.height()), (512, 512));
        }
    }

    #[test]
    fn test_preprocess_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("input.png");
        gradient_image(100, 40).save(&path).unwrap();

        let preprocessor = Preprocessor::new(64, 64);
        let fixed = preprocessor.preprocess(&path).unwrap();
        assert_eq!((fixed.width(), fixed.height()), (64, 64));
    }

    #[test]
    fn test_missing_file_is_not_readable() {
        let preprocessor = Preprocessor::new(512, 512);
        let err = preprocessor.preprocess("/definitely/not/here.png").unwrap_err();
        assert!(err.is_preprocessing_failure());
    }

    #[test]
    fn test_corrupt_file_is_not_readable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garbage.png");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(b"this is not an image").unwrap();

        let preprocessor = Preprocessor::new(512, 512);
        let err = preprocessor.preprocess(&path).unwrap_err();
        assert!(matches!(err, PixelscopeError::NotReadable { .. }));
    }

    #[test]
    fn test_deterministic_resize() {
        let preprocessor = Preprocessor::new(128, 128);
        let source = gradient_image(300, 200);
        let a = preprocessor.preprocess_image(&source);
        let b = preprocessor.preprocess_image(&source);
        assert_eq!(a.as_rgb().as_raw(), b.as_rgb().as_raw());
    }

    #[test]
    fn test_smooth_interpolation_blends_values() {
        // A 2x1 black/white image stretched to 8x1 must contain intermediate
        // values; nearest-neighbor would produce only 0 and 255.
        let img: ImageBuffer<Rgb<u8>, Vec<u8>> =
            ImageBuffer::from_fn(2, 1, |x, _| if x == 0 { Rgb([0; 3]) } else { Rgb([255; 3]) });
        let preprocessor = Preprocessor::new(8, 1);
        let fixed = preprocessor.preprocess_image(&DynamicImage::ImageRgb8(img));
        let blended = fixed
            .as_rgb()
            .pixels()
            .any(|p| p.0[0] > 0 && p.0[0] < 255);
        assert!(blended);
    }
}
