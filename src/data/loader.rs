// ============================================================
// Layer 4 — Image Loader
// ============================================================
// Reads ultrasound frames and segmentation masks from disk
// using the `image` crate.
//
// Frames may be stored as PNG, JPEG, BMP or TIFF; the format
// is detected from the file contents. Colour images (for
// example RGB screen captures of the scanner) are collapsed
// to a single luminance channel, which is all the network
// consumes.
//
// Reference: image crate documentation
//            Rust Book §9 (Error Handling)

use anyhow::{Context, Result};
use image::GrayImage;
use std::path::Path;

use crate::domain::traits::ImageSource;

/// Loads images from the local filesystem.
/// Implements the ImageSource trait from Layer 3.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileImageSource;

impl FileImageSource {
    pub fn new() -> Self {
        Self
    }
}

impl ImageSource for FileImageSource {
    fn load_gray(&self, reference: &Path) -> Result<GrayImage> {
        let img = image::open(reference)
            .with_context(|| format!("Cannot open image '{}'", reference.display()))?;

        tracing::trace!(
            "Loaded '{}' ({}x{})",
            reference.display(),
            img.width(),
            img.height()
        );

        Ok(img.to_luma8())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rgb_file_is_converted_to_gray() {
        let dir  = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.png");
        image::RgbImage::from_fn(4, 3, |_, _| image::Rgb([255, 255, 255]))
            .save(&path)
            .unwrap();

        let gray = FileImageSource::new().load_gray(&path).unwrap();
        assert_eq!(gray.dimensions(), (4, 3));
        assert!(gray.pixels().all(|p| p[0] == 255));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = FileImageSource::new()
            .load_gray(&dir.path().join("nope.png"))
            .unwrap_err();
        assert!(err.to_string().contains("nope.png"));
    }
}
