// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// This layer contains the Burn framework specific code: the
// network, the loss and metric math, and the loops that drive
// them. The data layer only touches Burn through the Batcher
// and Dataset traits.
//
// What's in this layer:
//
//   model.rs      — U-Net encoder/decoder
//                   • conv3x3-ReLU ×2 + dropout per stage
//                   • 2x2 max-pool down, 2x2 transposed conv up
//                   • skip connections by channel concatenation
//                   • 1x1 conv head → per-pixel class logits
//
//   losses.rs     — Segmentation losses and metrics
//                   weighted cross-entropy, IoU, mean IoU,
//                   focal loss; IoU score and pixel accuracy
//
//   schedule.rs   — Early stopping, plateau learning-rate decay
//
//   trainer.rs    — The per-fold training loop
//
//   inferencer.rs — Loads a fold checkpoint and segments images
//
// Reference: Burn Book §3 (Building Blocks)
//            Burn Book §5 (Training)
//            Ronneberger et al. (2015) U-Net

use serde::{Deserialize, Serialize};

/// U-Net architecture
pub mod model;

/// Loss functions and segmentation metrics
pub mod losses;

/// Epoch-end callbacks as plain state machines
pub mod schedule;

/// Training loop with validation, checkpointing and test evaluation
pub mod trainer;

/// Inference engine: loads a fold checkpoint and predicts masks
pub mod inferencer;

/// Which Burn backend runs the tensors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ComputeBackend {
    /// GPU through wgpu (Vulkan / Metal / DX12)
    #[default]
    Wgpu,
    /// Pure-Rust CPU backend
    NdArray,
}
