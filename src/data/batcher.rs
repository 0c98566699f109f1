// ============================================================
// Layer 4 — Segmentation Batcher
// ============================================================
// Implements Burn's Batcher trait to stack a Vec of
// SegmentationItems into NCHW tensors.
//
// How batching works here:
//   Input:  N items, each image [H*W] and target [C*H*W]
//   Output: images  [N, 1, H, W]
//           targets [N, C, H, W]
//
// All items were resized to the same square resolution by the
// Preprocessor, so stacking is a flat concatenation followed by
// a reshape; no padding is needed.
//
// Reference: Burn Book §4 (Batcher)

use burn::{
    data::dataloader::batcher::Batcher,
    prelude::*,
    tensor::TensorData,
};

use crate::data::dataset::SegmentationItem;

// ─── SegmentationBatch ────────────────────────────────────────────────────────
/// A batch ready for the U-Net forward pass.
#[derive(Debug, Clone)]
pub struct SegmentationBatch<B: Backend> {
    /// Normalised frames, shape [batch_size, 1, size, size]
    pub images: Tensor<B, 4>,

    /// One-hot masks, shape [batch_size, num_classes, size, size]
    pub targets: Tensor<B, 4>,
}

// ─── SegmentationBatcher ──────────────────────────────────────────────────────
#[derive(Clone, Debug)]
pub struct SegmentationBatcher {
    image_size:  usize,
    num_classes: usize,
}

impl SegmentationBatcher {
    pub fn new(image_size: usize, num_classes: usize) -> Self {
        Self { image_size, num_classes }
    }
}

impl<B: Backend> Batcher<B, SegmentationItem, SegmentationBatch<B>> for SegmentationBatcher {
    fn batch(&self, items: Vec<SegmentationItem>, device: &B::Device) -> SegmentationBatch<B> {
        let batch_size = items.len();
        let size       = self.image_size;
        let pixels     = size * size;

        let mut image_buf  = Vec::with_capacity(batch_size * pixels);
        let mut target_buf = Vec::with_capacity(batch_size * self.num_classes * pixels);

        for item in &items {
            debug_assert_eq!(item.image.len(), pixels);
            debug_assert_eq!(item.target.len(), self.num_classes * pixels);
            image_buf.extend_from_slice(&item.image);
            target_buf.extend_from_slice(&item.target);
        }

        let images = Tensor::<B, 4>::from_data(
            TensorData::new(image_buf, [batch_size, 1, size, size]),
            device,
        );
        let targets = Tensor::<B, 4>::from_data(
            TensorData::new(target_buf, [batch_size, self.num_classes, size, size]),
            device,
        );

        SegmentationBatch { images, targets }
    }
}
