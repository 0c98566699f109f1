// ============================================================
// Layer 6 — Checkpoint Manager
// ============================================================
// Saves and restores U-Net weights using Burn's CompactRecorder.
//
// One manager per fold directory. What gets saved:
//   1. unet_best.mpk.gz   — weights from the epoch with the best val_IoU
//   2. best_epoch.json    — which epoch that was, and its val_IoU
//   3. unet_final.mpk.gz  — weights after the last epoch that ran
//   4. train_config.json  — the full run configuration
//
// The config is needed to rebuild the same architecture
// (depth, base filters, class count, image size) before the
// weights can be loaded into it.
//
// File layout:
//   <save_location>_Fold_0/
//     unet_best.mpk.gz
//     best_epoch.json
//     unet_final.mpk.gz
//     train_config.json
//     history.csv
//     trainingInfo.txt
//
// Reference: Burn Book §5 (Records and Checkpointing)

use anyhow::{Context, Result};
use burn::{
    prelude::*,
    record::{CompactRecorder, Recorder},
};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::application::train_use_case::TrainConfig;
use crate::ml::model::{UNet, UNetRecord};

const BEST_MODEL:  &str = "unet_best";
const FINAL_MODEL: &str = "unet_final";
const BEST_EPOCH:  &str = "best_epoch.json";
const CONFIG_FILE: &str = "train_config.json";

/// Contents of best_epoch.json
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BestEpoch {
    pub epoch:   usize,
    pub val_iou: f64,
}

/// Manages the model files of a single fold.
pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    /// Create a manager rooted at `dir`, creating it if needed.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create checkpoint dir '{}'", dir.display()))?;
        Ok(Self { dir })
    }

    /// Open an existing fold directory for reading.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        if !dir.is_dir() {
            anyhow::bail!("'{}' is not a trained fold directory", dir.display());
        }
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Overwrite the best-model weights and remember the epoch.
    pub fn save_best<B: Backend>(&self, model: &UNet<B>, best: BestEpoch) -> Result<()> {
        self.record(model, BEST_MODEL)?;
        fs::write(self.dir.join(BEST_EPOCH), serde_json::to_string(&best)?)
            .with_context(|| format!("Failed to write {BEST_EPOCH}"))?;
        tracing::debug!("Saved best model: epoch {} (val_IoU={:.4})", best.epoch, best.val_iou);
        Ok(())
    }

    /// Save the weights as they stand after the last epoch.
    pub fn save_final<B: Backend>(&self, model: &UNet<B>) -> Result<()> {
        self.record(model, FINAL_MODEL)?;
        tracing::debug!("Saved final model to '{}'", self.dir.display());
        Ok(())
    }

    /// Epoch and score of the saved best model, if one exists.
    pub fn best_epoch(&self) -> Result<Option<BestEpoch>> {
        let path = self.dir.join(BEST_EPOCH);
        if !path.exists() {
            return Ok(None);
        }
        let s = fs::read_to_string(&path)
            .with_context(|| format!("Cannot read '{}'", path.display()))?;
        Ok(Some(serde_json::from_str(&s)?))
    }

    /// Load the best weights into `model`, falling back to the
    /// final weights when no best checkpoint was written.
    pub fn load_model<B: Backend>(&self, model: UNet<B>, device: &B::Device) -> Result<UNet<B>> {
        let name = if self.model_path(BEST_MODEL).exists() { BEST_MODEL } else { FINAL_MODEL };
        let path = self.dir.join(name);
        tracing::info!("Loading weights from '{}'", path.display());

        let record: UNetRecord<B> = CompactRecorder::new()
            .load(path.clone(), device)
            .with_context(|| {
                format!(
                    "Cannot load checkpoint '{}'. Have you trained this fold first?",
                    path.display()
                )
            })?;
        Ok(model.load_record(record))
    }

    pub fn save_config(&self, cfg: &TrainConfig) -> Result<()> {
        let path = self.dir.join(CONFIG_FILE);
        let json = serde_json::to_string_pretty(cfg)?;
        fs::write(&path, json)
            .with_context(|| format!("Cannot write config to '{}'", path.display()))?;
        tracing::debug!("Saved training config to '{}'", path.display());
        Ok(())
    }

    pub fn load_config(&self) -> Result<TrainConfig> {
        let path = self.dir.join(CONFIG_FILE);
        let json = fs::read_to_string(&path).with_context(|| {
            format!(
                "Cannot read config from '{}'. \
                 Make sure you have run 'train' before 'predict'.",
                path.display()
            )
        })?;
        Ok(serde_json::from_str(&json)?)
    }

    fn record<B: Backend>(&self, model: &UNet<B>, name: &str) -> Result<()> {
        let path = self.dir.join(name);
        CompactRecorder::new()
            .record(model.clone().into_record(), path.clone())
            .with_context(|| format!("Failed to save checkpoint to '{}'", path.display()))?;
        Ok(())
    }

    /// CompactRecorder appends its own extension.
    fn model_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.mpk.gz"))
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::model::UNetConfig;
    use burn::backend::NdArray;

    type TB = NdArray<f32>;

    fn tiny() -> UNetConfig {
        UNetConfig::new(1, 2).with_base_filters(2).with_depth(1)
    }

    #[test]
    fn test_config_round_trips_through_json() {
        let dir  = tempfile::tempdir().unwrap();
        let ckpt = CheckpointManager::new(dir.path()).unwrap();
        let cfg  = TrainConfig::default();
        ckpt.save_config(&cfg).unwrap();
        let loaded = ckpt.load_config().unwrap();
        assert_eq!(loaded.num_epochs, cfg.num_epochs);
        assert_eq!(loaded.class_weights, cfg.class_weights);
    }

    #[test]
    fn test_best_epoch_absent_until_saved() {
        let dir  = tempfile::tempdir().unwrap();
        let ckpt = CheckpointManager::new(dir.path()).unwrap();
        assert!(ckpt.best_epoch().unwrap().is_none());

        let device = <TB as Backend>::Device::default();
        let model: UNet<TB> = tiny().init(&device);
        let best = BestEpoch { epoch: 3, val_iou: 0.42 };
        ckpt.save_best(&model, best).unwrap();
        assert_eq!(ckpt.best_epoch().unwrap(), Some(best));
    }

    #[test]
    fn test_load_falls_back_to_final_weights() {
        let dir    = tempfile::tempdir().unwrap();
        let ckpt   = CheckpointManager::new(dir.path()).unwrap();
        let device = <TB as Backend>::Device::default();

        let model: UNet<TB> = tiny().init(&device);
        ckpt.save_final(&model).unwrap();

        let fresh: UNet<TB> = tiny().init(&device);
        assert!(ckpt.load_model(fresh, &device).is_ok());
    }

    #[test]
    fn test_load_without_weights_is_an_error() {
        let dir    = tempfile::tempdir().unwrap();
        let ckpt   = CheckpointManager::new(dir.path()).unwrap();
        let device = <TB as Backend>::Device::default();
        let model: UNet<TB> = tiny().init(&device);
        assert!(ckpt.load_model(model, &device).is_err());
    }

    #[test]
    fn test_open_missing_dir_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(CheckpointManager::open(dir.path().join("nope")).is_err());
    }
}
