// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// The data pipeline only needs one thing from the outside
// world: "give me the grayscale pixels behind this reference".
//
// Implementations:
//   - FileImageSource → decodes files from the local disk
//
// Keeping this behind a trait lets tests feed synthetic images
// without touching the filesystem.
//
// Reference: Rust Book §10 (Traits: Defining Shared Behaviour)

use std::path::Path;

use anyhow::Result;
use image::GrayImage;

// ─── ImageSource ──────────────────────────────────────────────────────────────
/// Any component that can resolve an image reference to pixels.
pub trait ImageSource {
    /// Load the referenced image as 8-bit grayscale.
    fn load_gray(&self, reference: &Path) -> Result<GrayImage>;
}
