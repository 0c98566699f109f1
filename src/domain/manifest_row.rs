// ============================================================
// Layer 3 — ManifestRow Domain Type
// ============================================================
// One usable row of the training manifest, with its file
// references already resolved to paths on disk.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::domain::split::SplitSet;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestRow {
    /// 0-based data row number in the CSV (header excluded).
    /// This is the index returned when querying a fold/role.
    pub row: usize,

    /// Cross-validation fold this row belongs to
    pub fold: usize,

    /// Role of the row inside its fold
    pub set: SplitSet,

    /// Ultrasound frame
    pub image: PathBuf,

    /// Segmentation mask for the frame
    pub mask: PathBuf,
}
