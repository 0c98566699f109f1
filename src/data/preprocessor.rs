// ============================================================
// Layer 4 — Image Preprocessor
// ============================================================
// Turns decoded frames and masks into the fixed-size float
// buffers the network consumes.
//
// Ultrasound frame:
//   1. Resize to size x size (bilinear)
//   2. Divide by the frame's own maximum → values in [0, 1]
//
//   Scanners differ in gain, so per-frame max scaling is used
//   instead of a fixed /255. An all-black frame stays all zero.
//
// Segmentation mask:
//   1. Resize to size x size (nearest neighbour, so no new
//      in-between label values are invented at edges)
//   2. Divide by 255 → values in [0, 1]
//   3. One-hot encode into num_classes channels
//
// Buffers are row-major (H, W) for single channel data and
// channel-major (C, H, W) for one-hot targets, matching the
// NCHW layout used by Burn's convolutions.
//
// Reference: image crate documentation (imageops::resize)
//            Rust Book §13 (Iterators)

use image::{imageops::FilterType, GrayImage};

/// Resizes and normalises frames and masks to a fixed square resolution.
#[derive(Debug, Clone, Copy)]
pub struct Preprocessor {
    size: u32,
}

impl Preprocessor {
    pub fn new(size: u32) -> Self {
        Self { size }
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    /// Resize a frame and scale it by its maximum value.
    /// Returns `size * size` values in [0, 1].
    pub fn process_ultrasound(&self, image: &GrayImage) -> Vec<f32> {
        let resized = image::imageops::resize(image, self.size, self.size, FilterType::Triangle);

        let max = resized.pixels().map(|p| p[0]).max().unwrap_or(0);
        if max == 0 {
            return vec![0.0; resized.as_raw().len()];
        }

        let scale = max as f32;
        resized.as_raw().iter().map(|&v| v as f32 / scale).collect()
    }

    /// Resize a mask and map 0..=255 to 0.0..=1.0.
    pub fn process_mask(&self, mask: &GrayImage) -> Vec<f32> {
        let resized = image::imageops::resize(mask, self.size, self.size, FilterType::Nearest);
        resized.as_raw().iter().map(|&v| v as f32 / 255.0).collect()
    }

    /// Full target pipeline: resize, scale, one-hot.
    pub fn process_target(&self, mask: &GrayImage, num_classes: usize) -> Vec<f32> {
        one_hot(&self.process_mask(mask), num_classes)
    }
}

/// One-hot encode a [0, 1] label map into `num_classes` channels.
///
/// A pixel value `v` becomes class `round(v * (num_classes - 1))`,
/// so with two classes anything ≥ 0.5 is foreground.
/// The result is channel-major: `num_classes * mask.len()` values.
pub fn one_hot(mask: &[f32], num_classes: usize) -> Vec<f32> {
    let pixels   = mask.len();
    let top      = num_classes.saturating_sub(1);
    let mut out  = vec![0.0f32; num_classes * pixels];

    for (i, &v) in mask.iter().enumerate() {
        let class = ((v.clamp(0.0, 1.0) * top as f32).round() as usize).min(top);
        out[class * pixels + i] = 1.0;
    }
    out
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn test_ultrasound_is_scaled_by_its_max() {
        let img = GrayImage::from_fn(4, 4, |x, _| Luma([if x < 2 { 50 } else { 100 }]));
        let out = Preprocessor::new(4).process_ultrasound(&img);

        assert_eq!(out.len(), 16);
        assert!((out.iter().cloned().fold(0.0f32, f32::max) - 1.0).abs() < 1e-6);
        assert!((out[0] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_black_frame_stays_zero() {
        let img = GrayImage::new(10, 6);
        let out = Preprocessor::new(8).process_ultrasound(&img);
        assert_eq!(out.len(), 64);
        assert!(out.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_mask_keeps_binary_values_after_resize() {
        let mask = GrayImage::from_fn(16, 16, |x, _| Luma([if x < 8 { 0 } else { 255 }]));
        let out  = Preprocessor::new(4).process_mask(&mask);
        assert_eq!(out.len(), 16);
        assert!(out.iter().all(|&v| v == 0.0 || v == 1.0));
        assert_eq!(out[0], 0.0);
        assert_eq!(out[3], 1.0);
    }

    #[test]
    fn test_one_hot_two_classes() {
        let out = one_hot(&[0.0, 1.0, 0.6, 0.2], 2);
        // channel 0 (background) then channel 1 (foreground)
        assert_eq!(out, vec![1.0, 0.0, 0.0, 1.0, 0.0, 1.0, 1.0, 0.0]);
    }

    #[test]
    fn test_one_hot_each_pixel_has_exactly_one_class() {
        let mask: Vec<f32> = (0..=10).map(|i| i as f32 / 10.0).collect();
        let out = one_hot(&mask, 3);
        for i in 0..mask.len() {
            let sum: f32 = (0..3).map(|c| out[c * mask.len() + i]).sum();
            assert_eq!(sum, 1.0);
        }
    }
}
