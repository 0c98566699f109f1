// ============================================================
// Layer 2 — PredictUseCase
// ============================================================
// Segments a list of ultrasound frames with one trained fold:
//
//   Step 1: Read train_config.json from the fold directory
//   Step 2: Rebuild the U-Net and load its weights  (Layer 5)
//   Step 3: For each frame: load → predict → save <stem>_mask.png
//
// The backend defaults to the one the fold was trained on.

use anyhow::{Context, Result};
use burn::{
    backend::{NdArray, Wgpu},
    prelude::Backend,
};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::data::loader::FileImageSource;
use crate::domain::traits::ImageSource;
use crate::infra::checkpoint::CheckpointManager;
use crate::ml::{inferencer::Inferencer, ComputeBackend};

pub struct PredictUseCase {
    fold_dir:   PathBuf,
    output_dir: PathBuf,
    backend:    Option<ComputeBackend>,
    /// Resize masks back to each frame's own size
    resize:     bool,
}

impl PredictUseCase {
    pub fn new(
        fold_dir:   impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
        backend:    Option<ComputeBackend>,
        resize:     bool,
    ) -> Self {
        Self { fold_dir: fold_dir.into(), output_dir: output_dir.into(), backend, resize }
    }

    /// Write one mask per input frame and return their paths.
    pub fn execute(&self, images: &[PathBuf]) -> Result<Vec<PathBuf>> {
        let ckpt    = CheckpointManager::open(&self.fold_dir)?;
        let backend = match self.backend {
            Some(b) => b,
            None    => ckpt.load_config()?.backend,
        };
        match ckpt.best_epoch()? {
            Some(best) => tracing::info!("Using weights from epoch {} (val_IoU {:.4})", best.epoch, best.val_iou),
            None       => tracing::info!("No best checkpoint recorded, using the final weights"),
        }
        fs::create_dir_all(&self.output_dir)
            .with_context(|| format!("Cannot create '{}'", self.output_dir.display()))?;

        match backend {
            ComputeBackend::Wgpu => {
                self.run::<Wgpu>(&ckpt, images, burn::backend::wgpu::WgpuDevice::default())
            }
            ComputeBackend::NdArray => {
                self.run::<NdArray>(&ckpt, images, burn::backend::ndarray::NdArrayDevice::Cpu)
            }
        }
    }

    fn run<B: Backend>(
        &self,
        ckpt:   &CheckpointManager,
        images: &[PathBuf],
        device: B::Device,
    ) -> Result<Vec<PathBuf>> {
        let inferencer = Inferencer::<B>::from_checkpoint(ckpt, device)?;
        let source     = FileImageSource::new();

        images
            .iter()
            .map(|path| {
                let frame = source.load_gray(path)?;
                let mask  = if self.resize {
                    inferencer.predict_resized(&frame)?
                } else {
                    inferencer.predict(&frame)?
                };

                let out = self.output_dir.join(mask_name(path));
                mask.save(&out)
                    .with_context(|| format!("Cannot write mask '{}'", out.display()))?;
                tracing::info!("{} → {}", path.display(), out.display());
                Ok(out)
            })
            .collect()
    }
}

/// `frames/0001_us.png` → `0001_us_mask.png`
fn mask_name(image: &Path) -> String {
    let stem = image
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    format!("{stem}_mask.png")
}
