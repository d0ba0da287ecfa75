//! Semantic segmentation and overlay compositing
//!
//! The segmentation network produces a per-class score grid; reducing it with
//! a per-pixel argmax yields the label mask. The mask's grid is the model's
//! prediction resolution, not the canvas resolution, so compositing rescales
//! it with nearest-neighbor interpolation — smooth interpolation would blend
//! unrelated class colors at boundaries.

use crate::{
    config::AnalysisConfig,
    error::{PixelscopeError, Result},
    inference::{BackendFactory, BackendOptions, InferenceBackend},
    models::{ModelFile, ModelManager},
    preprocess::FixedImage,
    tensor,
};
use image::{imageops::FilterType, RgbImage};
use ndarray::Array2;

/// Fixed 21-entry RGB palette indexed by class id; id 0 is background/black
pub static PALETTE: [[u8; 3]; 21] = [
    [0, 0, 0],
    [128, 0, 0],
    [0, 128, 0],
    [128, 128, 0],
    [0, 0, 128],
    [128, 0, 128],
    [0, 128, 128],
    [128, 128, 128],
    [64, 0, 0],
    [192, 0, 0],
    [64, 128, 0],
    [192, 128, 0],
    [64, 0, 128],
    [192, 0, 128],
    [64, 128, 128],
    [192, 128, 128],
    [0, 64, 0],
    [128, 64, 0],
    [0, 192, 0],
    [128, 192, 0],
    [0, 64, 128],
];

/// Per-pixel class-id labels over the model's prediction grid
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentationMask {
    labels: Array2<u8>,
}

impl SegmentationMask {
    /// Wrap a label grid
    ///
    /// # Errors
    /// - Any label outside the palette
    pub fn new(labels: Array2<u8>) -> Result<Self> {
        if let Some(&bad) = labels.iter().find(|&&l| usize::from(l) >= PALETTE.len()) {
            return Err(PixelscopeError::processing(format!(
                "label {bad} exceeds palette size {}",
                PALETTE.len()
            )));
        }
        Ok(Self { labels })
    }

    /// Grid dimensions as (width, height)
    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        let (rows, cols) = self.labels.dim();
        (cols as u32, rows as u32)
    }

    /// Borrow the label grid (rows × cols)
    #[must_use]
    pub fn labels(&self) -> &Array2<u8> {
        &self.labels
    }

    /// Class ids present in the mask, ascending
    #[must_use]
    pub fn present_classes(&self) -> Vec<u8> {
        let mut seen = [false; PALETTE.len()];
        for &label in &self.labels {
            if let Some(slot) = seen.get_mut(usize::from(label)) {
                *slot = true;
            }
        }
        seen.iter()
            .enumerate()
            .filter_map(|(id, &present)| present.then_some(id as u8))
            .collect()
    }

    /// Palette-colorize the mask at its native grid resolution
    #[must_use]
    pub fn colorize(&self) -> RgbImage {
        let (width, height) = self.dimensions();
        RgbImage::from_fn(width, height, |x, y| {
            let label = self
                .labels
                .get((y as usize, x as usize))
                .copied()
                .unwrap_or(0);
            let color = PALETTE.get(usize::from(label)).copied().unwrap_or([0; 3]);
            image::Rgb(color)
        })
    }
}

/// Runs the segmentation network and composites overlays
pub struct Segmenter {
    model: ModelFile,
    options: BackendOptions,
    backend: Box<dyn InferenceBackend>,
}

impl std::fmt::Debug for Segmenter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Segmenter")
            .field("model", &self.model.descriptor.id)
            .field("initialized", &self.backend.is_initialized())
            .finish()
    }
}

impl Segmenter {
    /// Resolve the configured segmentation network and build a cold segmenter
    ///
    /// # Errors
    /// - `ModelUnavailable` when the configured weights are not resolvable
    pub fn new(
        manager: &ModelManager,
        config: &AnalysisConfig,
        factory: &dyn BackendFactory,
    ) -> Result<Self> {
        let model = manager.resolve(&config.segmenter_spec)?;
        Ok(Self {
            model,
            options: BackendOptions::from_config(config),
            backend: factory.create_backend()?,
        })
    }

    /// Build a segmenter over an explicit model file and backend
    #[must_use]
    pub fn with_backend(
        model: ModelFile,
        options: BackendOptions,
        backend: Box<dyn InferenceBackend>,
    ) -> Self {
        Self {
            model,
            options,
            backend,
        }
    }

    /// Whether the network session has been built
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.backend.is_initialized()
    }

    fn ensure_initialized(&mut self) -> Result<()> {
        if let Some(load_time) = self.backend.initialize(&self.model, &self.options)? {
            tracing::info!(
                model = %self.model.descriptor.display_name,
                load_ms = load_time.as_millis() as u64,
                "segmentation network initialized"
            );
        }
        Ok(())
    }

    /// Produce the per-pixel class-id mask for a canonical canvas
    ///
    /// One forward pass over the model's input grid, reduced with an argmax
    /// over the class dimension. Deterministic for identical canvases.
    ///
    /// # Errors
    /// - `ModelUnavailable` when weights cannot be loaded on first use
    /// - Inference failures from the backend
    /// - Output tensors that are not `[1, C, H, W]` with `C <= 21`
    pub fn segment(&mut self, image: &FixedImage) -> Result<SegmentationMask> {
        self.ensure_initialized()?;

        let input = tensor::to_model_input(image.as_rgb(), &self.model.descriptor.preprocessing);
        let output = self.backend.infer(&input)?;

        let shape = output.shape().to_vec();
        if shape.len() != 4 || shape.first() != Some(&1) {
            return Err(PixelscopeError::processing(format!(
                "expected [1, C, H, W] score tensor, got {shape:?}"
            )));
        }
        let classes = shape.get(1).copied().unwrap_or(0);
        if classes == 0 || classes > PALETTE.len() {
            return Err(PixelscopeError::processing(format!(
                "score tensor has {classes} classes, palette holds {}",
                PALETTE.len()
            )));
        }
        let height = shape.get(2).copied().unwrap_or(0);
        let width = shape.get(3).copied().unwrap_or(0);

        let labels = Array2::from_shape_fn((height, width), |(y, x)| {
            let mut best_class = 0u8;
            let mut best_score = f32::NEG_INFINITY;
            for class in 0..classes {
                let score = output.get([0, class, y, x]).copied().unwrap_or(f32::NEG_INFINITY);
                if score > best_score {
                    best_score = score;
                    best_class = class as u8;
                }
            }
            best_class
        });

        SegmentationMask::new(labels)
    }

    /// Display description for a computed mask
    #[must_use]
    pub fn describe(&self, mask: &SegmentationMask) -> String {
        let (width, height) = mask.dimensions();
        let present = mask.present_classes();
        format!(
            "--- Semantic Segmentation ({}) ---\n\
             Model: {}\n\
             Label grid: {width}x{height}\n\
             Classes present: {} of {}",
            self.model.descriptor.id,
            self.model.descriptor.display_name,
            present.len(),
            PALETTE.len()
        )
    }
}

/// Composite a palette-colorized mask over a canonical canvas
///
/// The colorized mask is rescaled to the target resolution with
/// nearest-neighbor interpolation before blending; `original_weight` is the
/// blend weight on the original image, the mask color gets the remainder.
#[must_use]
pub fn overlay(original: &FixedImage, mask: &SegmentationMask, original_weight: f32) -> RgbImage {
    let weight = original_weight.clamp(0.0, 1.0);
    let (width, height) = (original.width(), original.height());

    let color_mask = mask.colorize();
    let resized_mask = image::imageops::resize(&color_mask, width, height, FilterType::Nearest);

    RgbImage::from_fn(width, height, |x, y| {
        let base = original.as_rgb().get_pixel(x, y);
        let color = resized_mask.get_pixel(x, y);
        let mut blended = [0u8; 3];
        for channel in 0..3 {
            let value = weight.mul_add(
                f32::from(base.0[channel]),
                (1.0 - weight) * f32::from(color.0[channel]),
            );
            blended[channel] = value.round().clamp(0.0, 255.0) as u8;
        }
        image::Rgb(blended)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::test_utils::{placeholder_model_file, MockBackend};
    use crate::models::ModelKind;
    use crate::preprocess::Preprocessor;
    use image::{DynamicImage, ImageBuffer, Rgb};

    fn canvas(width: u32, height: u32) -> FixedImage {
        let img = ImageBuffer::from_pixel(width, height, Rgb([120, 60, 30]));
        Preprocessor::new(width, height).preprocess_image(&DynamicImage::ImageRgb8(img))
    }

    fn segmenter_with(backend: MockBackend) -> Segmenter {
        let dir = tempfile::tempdir().unwrap();
        let model = placeholder_model_file(dir.path(), ModelKind::Segmenter);
        Segmenter::with_backend(model, BackendOptions::default(), Box::new(backend))
    }

    #[test]
    fn test_palette_has_21_entries_black_background() {
        assert_eq!(PALETTE.len(), 21);
        assert_eq!(PALETTE[0], [0, 0, 0]);
    }

    #[test]
    fn test_mask_rejects_out_of_palette_labels() {
        let labels = Array2::from_elem((4, 4), 21u8);
        assert!(SegmentationMask::new(labels).is_err());
        let labels = Array2::from_elem((4, 4), 20u8);
        assert!(SegmentationMask::new(labels).is_ok());
    }

    #[test]
    fn test_segment_labels_follow_argmax() {
        let mut segmenter = segmenter_with(MockBackend::segmenter());
        let mask = segmenter.segment(&canvas(512, 512)).unwrap();

        // Mock scores put class (x + y) % 21 on top; the grid is the model's
        // 520x520 input, not the 512x512 canvas.
        assert_eq!(mask.dimensions(), (520, 520));
        assert_eq!(mask.labels()[(0, 0)], 0);
        assert_eq!(mask.labels()[(3, 5)], 8);
        assert_eq!(mask.labels()[(20, 22)], 0);
        assert!(mask
            .labels()
            .iter()
            .all(|&l| usize::from(l) < PALETTE.len()));
    }

    #[test]
    fn test_segment_deterministic() {
        let mut segmenter = segmenter_with(MockBackend::segmenter());
        let image = canvas(512, 512);
        let a = segmenter.segment(&image).unwrap();
        let b = segmenter.segment(&image).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_model_unavailable_propagates() {
        let mut segmenter = segmenter_with(MockBackend::segmenter().failing_init());
        let err = segmenter.segment(&canvas(64, 64)).unwrap_err();
        assert!(matches!(err, PixelscopeError::ModelUnavailable(_)));
    }

    #[test]
    fn test_overlay_matches_target_resolution() {
        // 8x8 mask onto a 512x512 canvas: resolution follows the target.
        let labels = Array2::from_shape_fn((8, 8), |(y, x)| ((x + y) % 21) as u8);
        let mask = SegmentationMask::new(labels).unwrap();
        let image = canvas(512, 512);
        let composited = overlay(&image, &mask, 0.6);
        assert_eq!(composited.dimensions(), (512, 512));
    }

    #[test]
    fn test_overlay_weight_extremes() {
        let labels = Array2::from_elem((4, 4), 1u8); // maroon [128, 0, 0]
        let mask = SegmentationMask::new(labels).unwrap();
        let image = canvas(16, 16);

        // Weight 1.0: pure original.
        let pure = overlay(&image, &mask, 1.0);
        assert_eq!(pure.get_pixel(0, 0).0, image.as_rgb().get_pixel(0, 0).0);

        // Weight 0.0: pure palette color.
        let colored = overlay(&image, &mask, 0.0);
        assert_eq!(colored.get_pixel(0, 0).0, [128, 0, 0]);
    }

    #[test]
    fn test_overlay_blend_is_weighted_sum() {
        let labels = Array2::from_elem((2, 2), 2u8); // green [0, 128, 0]
        let mask = SegmentationMask::new(labels).unwrap();
        let image = canvas(4, 4); // uniform [120, 60, 30]

        let composited = overlay(&image, &mask, 0.6);
        let pixel = composited.get_pixel(1, 1).0;
        // 0.6 * original + 0.4 * color, rounded.
        assert_eq!(pixel, [72, 87, 18]);
    }

    #[test]
    fn test_nearest_neighbor_keeps_palette_colors() {
        // Two classes side by side; after rescale every pixel must still be an
        // exact palette color (no blended boundary colors).
        let labels = Array2::from_shape_fn((2, 2), |(_, x)| if x == 0 { 1u8 } else { 2u8 });
        let mask = SegmentationMask::new(labels).unwrap();
        let colorized = mask.colorize();
        let resized = image::imageops::resize(&colorized, 64, 64, FilterType::Nearest);
        for pixel in resized.pixels() {
            assert!(PALETTE.contains(&pixel.0));
        }
    }

    #[test]
    fn test_describe_reports_grid_and_classes() {
        let mut segmenter = segmenter_with(MockBackend::segmenter());
        let mask = segmenter.segment(&canvas(512, 512)).unwrap();
        let description = segmenter.describe(&mask);
        assert!(description.contains("Label grid: 520x520"));
        assert!(description.contains("of 21"));
    }
}
