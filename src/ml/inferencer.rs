// ============================================================
// Layer 5 — Inferencer
// ============================================================
// Segments single ultrasound frames with a trained fold model.
//
//   frame ─► Preprocessor ─► [1,1,S,S] ─► U-Net ─► softmax
//         ─► argmax over classes ─► 8-bit mask (S x S)
//         ─► optional nearest-neighbour resize to the frame size
//
// Class c is written as c * 255 / (C - 1), so with two classes
// the mask is 0 for background and 255 for foreground.

use anyhow::{Context, Result};
use burn::{prelude::*, tensor::TensorData};
use image::{imageops::FilterType, GrayImage};

use crate::data::preprocessor::Preprocessor;
use crate::infra::checkpoint::CheckpointManager;
use crate::ml::model::UNet;

pub struct Inferencer<B: Backend> {
    model:        UNet<B>,
    preprocessor: Preprocessor,
    num_classes:  usize,
    device:       B::Device,
}

impl<B: Backend> Inferencer<B> {
    pub fn new(model: UNet<B>, preprocessor: Preprocessor, num_classes: usize, device: B::Device) -> Self {
        Self { model, preprocessor, num_classes, device }
    }

    /// Rebuild the architecture from train_config.json and load
    /// the fold's best (else final) weights into it.
    pub fn from_checkpoint(ckpt_manager: &CheckpointManager, device: B::Device) -> Result<Self> {
        let cfg       = ckpt_manager.load_config()?;
        let model_cfg = cfg.model_config().with_dropout(0.0);
        let model: UNet<B> = model_cfg.init(&device);
        let model = ckpt_manager.load_model(model, &device)?;
        tracing::info!("Model loaded from '{}'", ckpt_manager.dir().display());

        let preprocessor = Preprocessor::new(cfg.image_size as u32);
        Ok(Self::new(model, preprocessor, cfg.num_classes, device))
    }

    /// Mask at network resolution.
    pub fn predict(&self, image: &GrayImage) -> Result<GrayImage> {
        let size   = self.preprocessor.size();
        let side   = size as usize;
        let pixels = self.preprocessor.process_ultrasound(image);

        let input = Tensor::<B, 4>::from_data(TensorData::new(pixels, [1, 1, side, side]), &self.device);
        let classes = self.model.predict(input).argmax(1);

        let top = self.num_classes.saturating_sub(1).max(1) as i64;
        let raw: Vec<u8> = classes
            .into_data()
            .iter::<i64>()
            .map(|c| (c.clamp(0, top) * 255 / top) as u8)
            .collect();

        GrayImage::from_raw(size, size, raw).context("model output has an unexpected size")
    }

    /// Mask resized back to the frame's own dimensions.
    pub fn predict_resized(&self, image: &GrayImage) -> Result<GrayImage> {
        let mask = self.predict(image)?;
        let (w, h) = image.dimensions();
        Ok(image::imageops::resize(&mask, w, h, FilterType::Nearest))
    }
}
