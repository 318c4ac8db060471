//! Image decoding and per-architecture input preparation.

use crate::error::VisionResult;
use image::imageops::FilterType;
use image::{DynamicImage, RgbImage};
use lumen_training::{ImageProbe, SampleTransform, TrainingError, TrainingResult};
use std::path::Path;
use tracing::trace;

/// ImageNet channel statistics the pretrained backbones were trained with.
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// How a decoded image is brought to the network's input size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputPolicy {
    /// Stretch to `size`×`size`, ignoring aspect ratio.
    Resize { size: u32 },
    /// Scale the shorter side to `shorter`, then take the centered `crop`×`crop` window.
    ResizeCenterCrop { shorter: u32, crop: u32 },
}

impl InputPolicy {
    #[must_use]
    pub fn output_side(self) -> u32 {
        match self {
            Self::Resize { size } => size,
            Self::ResizeCenterCrop { crop, .. } => crop,
        }
    }
}

/// Decode, resize/crop and normalize images into CHW float buffers.
#[derive(Debug, Clone, Copy)]
pub struct ImagePipeline {
    policy: InputPolicy,
}

impl ImagePipeline {
    #[must_use]
    pub fn new(policy: InputPolicy) -> Self {
        Self { policy }
    }

    #[must_use]
    pub fn policy(&self) -> InputPolicy {
        self.policy
    }

    pub fn prepare(&self, image: &DynamicImage) -> RgbImage {
        match self.policy {
            InputPolicy::Resize { size } => image.resize_exact(size, size, FilterType::Triangle).to_rgb8(),
            InputPolicy::ResizeCenterCrop { shorter, crop } => {
                let (w, h) = (image.width(), image.height());
                let (new_w, new_h) = if w <= h {
                    (shorter, (u64::from(h) * u64::from(shorter) / u64::from(w.max(1))) as u32)
                } else {
                    ((u64::from(w) * u64::from(shorter) / u64::from(h.max(1))) as u32, shorter)
                };
                let resized = image.resize_exact(new_w.max(crop), new_h.max(crop), FilterType::Triangle);
                let left = crop_offset(resized.width(), crop);
                let top = crop_offset(resized.height(), crop);
                resized.crop_imm(left, top, crop, crop).to_rgb8()
            }
        }
    }

    pub fn decode(&self, path: &Path) -> VisionResult<Vec<f32>> {
        let image = image::open(path)?;
        trace!(path = %path.display(), width = image.width(), height = image.height(), "decoded image");
        Ok(to_normalized_chw(&self.prepare(&image)))
    }
}

/// Leading margin of a centered crop; halves round to even, as torchvision does.
fn crop_offset(side: u32, crop: u32) -> u32 {
    (f64::from(side.saturating_sub(crop)) / 2.0).round_ties_even() as u32
}

/// Scale to `[0, 1]`, normalize per channel and lay out as planar CHW.
pub fn to_normalized_chw(rgb: &RgbImage) -> Vec<f32> {
    let plane = (rgb.width() * rgb.height()) as usize;
    let mut out = vec![0f32; 3 * plane];
    for (idx, pixel) in rgb.pixels().enumerate() {
        for c in 0..3 {
            out[c * plane + idx] = (f32::from(pixel[c]) / 255.0 - IMAGENET_MEAN[c]) / IMAGENET_STD[c];
        }
    }
    out
}

impl ImageProbe for ImagePipeline {
    fn is_decodable(&self, path: &Path) -> bool {
        image::open(path).is_ok()
    }
}

impl SampleTransform for ImagePipeline {
    fn sample_dims(&self) -> [usize; 3] {
        let side = self.policy.output_side() as usize;
        [3, side, side]
    }

    fn load(&self, path: &Path) -> TrainingResult<Vec<f32>> {
        self.decode(path)
            .map_err(|e| TrainingError::Dataset(format!("failed to load {}: {e}", path.display())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use tempfile::TempDir;

    fn solid(w: u32, h: u32, color: [u8; 3]) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(w, h, Rgb(color)))
    }

    #[test]
    fn test_resize_policy_ignores_aspect_ratio() {
        let pipeline = ImagePipeline::new(InputPolicy::Resize { size: 16 });
        let out = pipeline.prepare(&solid(40, 10, [10, 20, 30]));
        assert_eq!(out.dimensions(), (16, 16));
    }

    #[test]
    fn test_center_crop_keeps_middle() {
        // Left half black, right half white, wide image.
        let mut img = RgbImage::new(64, 32);
        for (x, _, p) in img.enumerate_pixels_mut() {
            *p = if x < 32 { Rgb([0, 0, 0]) } else { Rgb([255, 255, 255]) };
        }
        let pipeline = ImagePipeline::new(InputPolicy::ResizeCenterCrop { shorter: 16, crop: 8 });
        let out = pipeline.prepare(&DynamicImage::ImageRgb8(img));

        assert_eq!(out.dimensions(), (8, 8));
        // The crop straddles the boundary, so both halves survive.
        assert!(out.get_pixel(0, 4)[0] < 64);
        assert!(out.get_pixel(7, 4)[0] > 192);
    }

    #[test]
    fn test_crop_offset_rounds_half_to_even() {
        assert_eq!(crop_offset(256, 224), 16);
        assert_eq!(crop_offset(257, 224), 16);
        assert_eq!(crop_offset(259, 224), 18);
        assert_eq!(crop_offset(225, 224), 0);
        assert_eq!(crop_offset(227, 224), 2);
        assert_eq!(crop_offset(224, 224), 0);
    }

    #[test]
    fn test_normalization_is_planar() {
        let rgb = RgbImage::from_pixel(2, 1, Rgb([255, 0, 128]));
        let chw = to_normalized_chw(&rgb);
        assert_eq!(chw.len(), 6);
        let red = (1.0 - IMAGENET_MEAN[0]) / IMAGENET_STD[0];
        let green = (0.0 - IMAGENET_MEAN[1]) / IMAGENET_STD[1];
        assert!((chw[0] - red).abs() < 1e-6 && (chw[1] - red).abs() < 1e-6);
        assert!((chw[2] - green).abs() < 1e-6);
    }

    #[test]
    fn test_probe_and_load_from_disk() {
        let temp = TempDir::new().unwrap();
        let good = temp.path().join("good.png");
        let bad = temp.path().join("bad.png");
        solid(30, 20, [200, 100, 50]).save(&good).unwrap();
        std::fs::write(&bad, b"\x89PNG truncated").unwrap();

        let pipeline = ImagePipeline::new(InputPolicy::ResizeCenterCrop { shorter: 12, crop: 10 });
        assert!(pipeline.is_decodable(&good));
        assert!(!pipeline.is_decodable(&bad));
        assert!(!pipeline.is_decodable(&temp.path().join("missing.png")));

        assert_eq!(pipeline.sample_dims(), [3, 10, 10]);
        assert_eq!(pipeline.load(&good).unwrap().len(), 300);
        assert!(matches!(pipeline.load(&bad), Err(TrainingError::Dataset(_))));
    }
}
