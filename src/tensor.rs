//! Model input tensor conversion
//!
//! Maps RGB pixel buffers onto normalized NCHW tensors according to a model's
//! canonical preprocessing recipe. The spatial step (short-side resize plus
//! center crop, or direct stretch) is driven by the registry's `ResizePolicy`;
//! the value step scales to 0-1 and applies the published per-channel
//! statistics.

use crate::models::{PreprocessingConfig, ResizePolicy};
use image::{imageops::FilterType, RgbImage};
use ndarray::Array4;

/// Apply a model's spatial recipe to an RGB image
#[must_use]
pub fn apply_resize_policy(image: &RgbImage, policy: ResizePolicy) -> RgbImage {
    match policy {
        ResizePolicy::Stretch { size } => {
            image::imageops::resize(image, size, size, FilterType::CatmullRom)
        },
        ResizePolicy::ShortSideCrop { resize_to, crop } => {
            let (width, height) = image.dimensions();
            // Scale so the short side lands on `resize_to`.
            let (new_width, new_height) = if width <= height {
                let scaled = (f64::from(height) * f64::from(resize_to) / f64::from(width))
                    .round() as u32;
                (resize_to, scaled.max(resize_to))
            } else {
                let scaled = (f64::from(width) * f64::from(resize_to) / f64::from(height))
                    .round() as u32;
                (scaled.max(resize_to), resize_to)
            };
            let resized =
                image::imageops::resize(image, new_width, new_height, FilterType::CatmullRom);
            let offset_x = (new_width - crop.min(new_width)) / 2;
            let offset_y = (new_height - crop.min(new_height)) / 2;
            image::imageops::crop_imm(&resized, offset_x, offset_y, crop, crop).to_image()
        },
    }
}

/// Convert an RGB image to a normalized NCHW tensor per the model recipe
///
/// The spatial policy is applied first, then each pixel is scaled to 0-1 and
/// normalized channel-wise with the recipe's mean and standard deviation.
#[must_use]
pub fn to_model_input(image: &RgbImage, config: &PreprocessingConfig) -> Array4<f32> {
    let prepared = apply_resize_policy(image, config.resize);
    let (width, height) = prepared.dimensions();
    let mut tensor = Array4::<f32>::zeros((1, 3, height as usize, width as usize));

    #[allow(clippy::indexing_slicing)]
    // Tensor dimensions are pre-allocated to match the prepared image.
    for (y, row) in prepared.rows().enumerate() {
        for (x, pixel) in row.enumerate() {
            for channel in 0..3 {
                let normalized = (f32::from(pixel.0[channel]) / 255.0
                    - config.normalization_mean[channel])
                    / config.normalization_std[channel];
                tensor[[0, channel, y, x]] = normalized;
            }
        }
    }

    tensor
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{IMAGENET_MEAN, IMAGENET_STD};
    use image::{ImageBuffer, Rgb};

    fn uniform_image(width: u32, height: u32, value: u8) -> RgbImage {
        ImageBuffer::from_pixel(width, height, Rgb([value; 3]))
    }

    fn imagenet_config(resize: ResizePolicy) -> PreprocessingConfig {
        PreprocessingConfig {
            resize,
            normalization_mean: IMAGENET_MEAN,
            normalization_std: IMAGENET_STD,
        }
    }

    #[test]
    fn test_stretch_policy_shape() {
        let config = imagenet_config(ResizePolicy::Stretch { size: 520 });
        let tensor = to_model_input(&uniform_image(512, 512, 128), &config);
        assert_eq!(tensor.shape(), &[1, 3, 520, 520]);
    }

    #[test]
    fn test_short_side_crop_shape() {
        let config = imagenet_config(ResizePolicy::ShortSideCrop {
            resize_to: 256,
            crop: 224,
        });
        // Landscape, portrait and square all land on the crop size.
        for (w, h) in [(512, 512), (800, 400), (300, 900)] {
            let tensor = to_model_input(&uniform_image(w, h, 50), &config);
            assert_eq!(tensor.shape(), &[1, 3, 224, 224]);
        }
    }

    #[test]
    fn test_normalization_values() {
        let config = imagenet_config(ResizePolicy::Stretch { size: 4 });
        let tensor = to_model_input(&uniform_image(4, 4, 255), &config);
        // White pixel: (1.0 - mean) / std per channel.
        for channel in 0..3 {
            let expected = (1.0 - IMAGENET_MEAN[channel]) / IMAGENET_STD[channel];
            let got = tensor[[0, channel, 0, 0]];
            assert!((got - expected).abs() < 1e-5, "channel {channel}: {got} vs {expected}");
        }
    }

    #[test]
    fn test_short_side_crop_is_centered() {
        // Left half black, right half white, landscape. The center crop keeps
        // the seam in the middle of the tensor.
        let img: RgbImage = ImageBuffer::from_fn(512, 256, |x, _| {
            if x < 256 {
                Rgb([0; 3])
            } else {
                Rgb([255; 3])
            }
        });
        let config = imagenet_config(ResizePolicy::ShortSideCrop {
            resize_to: 256,
            crop: 224,
        });
        let tensor = to_model_input(&img, &config);
        let left = tensor[[0, 0, 112, 4]];
        let right = tensor[[0, 0, 112, 219]];
        assert!(left < 0.0, "left side should normalize below the mean");
        assert!(right > 0.0, "right side should normalize above the mean");
    }
}
