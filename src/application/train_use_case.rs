// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Orchestrates k-fold cross-validation training:
//
//   Step 1: Read the manifest                 (Layer 4 - data)
//   Step 2: Count folds: max(Fold) + 1        (Layer 4 - data)
//   For every fold k:
//     Step 3: Create <save_location>_Fold_k   (Layer 6 - infra)
//     Step 4: Split rows by Set, disjoint     (Layer 4 - data)
//     Step 5: Load + preprocess the images    (Layer 4 - data)
//     Step 6: Save config for prediction      (Layer 6 - infra)
//     Step 7: Train a fresh U-Net             (Layer 5 - ml)
//     Step 8: Write trainingInfo.txt          (Layer 6 - infra)
//
// Reference: Rust Book §13 (Iterators and Closures)
//            Burn Book §5 (Training)

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    ffi::OsString,
    path::{Path, PathBuf},
};

use crate::data::{
    dataset::SegmentationDataset,
    loader::FileImageSource,
    manifest::{Manifest, ManifestColumns},
    preprocessor::Preprocessor,
};
use crate::domain::split::SplitSet;
use crate::infra::{
    checkpoint::{BestEpoch, CheckpointManager},
    metrics::{EvalStats, MetricsLogger},
    report::TrainingReport,
};
use crate::ml::{
    losses::{LossKind, SegmentationLoss},
    model::UNetConfig,
    trainer::{run_training, FoldData},
    ComputeBackend,
};

// ─── Training Configuration ──────────────────────────────────────────────────
// All hyperparameters for a training run.
// Serialisable so it can be saved next to each fold's weights
// and reloaded for prediction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    /// Fold directories are `<save_location>_Fold_<k>`
    pub save_location: PathBuf,
    pub data_csv_file: PathBuf,
    pub image_column:  String,
    pub mask_column:   String,

    pub num_epochs:    usize,
    pub batch_size:    usize,
    pub learning_rate: f64,

    pub loss:          LossKind,
    pub class_weights: Vec<f32>,
    /// Focal loss focusing parameter, applied to every class
    pub gamma:         f32,

    pub image_size:    usize,
    pub num_classes:   usize,
    pub base_filters:  usize,
    pub depth:         usize,
    pub dropout:       f64,

    /// Epochs without a better val_IoU before stopping
    pub early_stopping_patience: usize,
    /// Epochs without a better val_loss before reducing the learning rate
    pub lr_patience:   usize,
    pub lr_factor:     f64,
    pub lr_min_delta:  f64,
    /// Epochs to wait after a reduction before counting again
    pub lr_cooldown:   usize,
    /// The learning rate is never reduced below this
    pub min_lr:        f64,

    pub seed:          u64,
    pub backend:       ComputeBackend,
    /// Train only this fold instead of all of them
    pub fold:          Option<usize>,
}

impl Default for TrainConfig {
    fn default() -> Self {
        let columns = ManifestColumns::default();
        Self {
            save_location: PathBuf::from("models/UNet/unet"),
            data_csv_file: PathBuf::from("data/folds.csv"),
            image_column:  columns.image,
            mask_column:   columns.mask,
            num_epochs:    500,
            batch_size:    8,
            learning_rate: 1e-6,
            loss:          LossKind::WeightedCrossEntropy,
            class_weights: vec![0.1, 0.9],
            gamma:         2.0,
            image_size:    128,
            num_classes:   2,
            base_filters:  16,
            depth:         4,
            dropout:       0.1,
            early_stopping_patience: 10,
            lr_patience:   4,
            lr_factor:     0.7,
            lr_min_delta:  0.001,
            lr_cooldown:   0,
            min_lr:        0.0,
            seed:          42,
            backend:       ComputeBackend::Wgpu,
            fold:          None,
        }
    }
}

impl TrainConfig {
    /// Name of the directory that holds `save_location`, e.g. "UNet"
    /// for `models/UNet/unet`.
    pub fn network_type(&self) -> String {
        self.save_location
            .parent()
            .and_then(Path::file_name)
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn fold_dir(&self, fold: usize) -> PathBuf {
        let mut dir: OsString = self.save_location.clone().into_os_string();
        dir.push(format!("_Fold_{fold}"));
        PathBuf::from(dir)
    }

    pub fn columns(&self) -> ManifestColumns {
        ManifestColumns { image: self.image_column.clone(), mask: self.mask_column.clone() }
    }

    /// Single channel input: frames are decoded as greyscale.
    pub fn model_config(&self) -> UNetConfig {
        UNetConfig::new(1, self.num_classes)
            .with_base_filters(self.base_filters)
            .with_depth(self.depth)
            .with_dropout(self.dropout)
    }

    pub fn loss_function(&self) -> Result<SegmentationLoss> {
        SegmentationLoss::from_kind(self.loss, &self.class_weights, self.gamma, self.num_classes)
    }

    /// Reject settings that would only fail after the images are loaded.
    pub fn validate(&self) -> Result<()> {
        if self.num_epochs == 0 {
            bail!("num_epochs must be at least 1");
        }
        if self.batch_size == 0 {
            bail!("batch_size must be at least 1");
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            bail!("learning_rate must be positive (got {})", self.learning_rate);
        }
        if !(self.lr_factor > 0.0 && self.lr_factor < 1.0) {
            bail!("lr_factor must be in (0, 1) (got {})", self.lr_factor);
        }
        if !(self.min_lr.is_finite() && self.min_lr >= 0.0) {
            bail!("min_lr must be non-negative (got {})", self.min_lr);
        }
        if !(0.0..1.0).contains(&self.dropout) {
            bail!("dropout must be in [0, 1) (got {})", self.dropout);
        }
        if self.base_filters == 0 {
            bail!("base_filters must be at least 1");
        }
        let model = self.model_config();
        let Some(factor) = model.downsample_factor() else {
            bail!("depth {} is too large", self.depth);
        };
        if !model.supports_size(self.image_size) {
            bail!(
                "image_size {} must be a positive multiple of 2^depth = {factor}",
                self.image_size,
            );
        }
        self.loss_function()?;
        Ok(())
    }
}

/// Test statistics of one trained fold.
#[derive(Debug, Clone)]
pub struct FoldResult {
    pub fold:       usize,
    pub dir:        PathBuf,
    pub epochs_run: usize,
    pub test:       EvalStats,
    /// Epoch with the highest val_IoU, stored as `unet_best`
    pub best:       Option<BestEpoch>,
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
pub struct TrainUseCase {
    config: TrainConfig,
}

impl TrainUseCase {
    pub fn new(config: TrainConfig) -> Self {
        Self { config }
    }

    /// Train every fold (or only `config.fold`) and return their test results.
    pub fn execute(&self) -> Result<Vec<FoldResult>> {
        let cfg = &self.config;
        cfg.validate()?;

        // ── Steps 1-2: manifest and fold count ────────────────────────────────
        let manifest  = Manifest::from_csv(&cfg.data_csv_file, &cfg.columns())?;
        let num_folds = manifest.num_folds()?;
        tracing::info!(
            "{num_folds} folds in '{}' ({} rows, {} without a mask skipped)",
            cfg.data_csv_file.display(),
            manifest.rows().len(),
            manifest.skipped(),
        );

        let folds: Vec<usize> = match cfg.fold {
            Some(f) if f >= num_folds => bail!("fold {f} does not exist (manifest has {num_folds})"),
            Some(f) => vec![f],
            None    => (0..num_folds).collect(),
        };

        folds
            .into_iter()
            .map(|fold| {
                self.train_fold(&manifest, fold, num_folds)
                    .with_context(|| format!("Training fold {fold} failed"))
            })
            .collect()
    }

    fn train_fold(&self, manifest: &Manifest, fold: usize, num_folds: usize) -> Result<FoldResult> {
        let cfg = &self.config;

        // ── Step 3: fold directory ────────────────────────────────────────────
        let dir    = cfg.fold_dir(fold);
        let ckpt   = CheckpointManager::new(&dir)?;
        let logger = MetricsLogger::new(&dir)?;
        tracing::info!("Fold {fold}/{num_folds} → '{}'", dir.display());

        // ── Step 4: disjoint split ────────────────────────────────────────────
        let split = manifest.split(fold)?;
        for set in [SplitSet::Train, SplitSet::Validation] {
            if split.indexes(set).is_empty() {
                bail!("fold {fold} has no {set} rows");
            }
        }

        // ── Step 5: datasets ──────────────────────────────────────────────────
        let source       = FileImageSource::new();
        let preprocessor = Preprocessor::new(cfg.image_size as u32);
        let load = |set: SplitSet| {
            SegmentationDataset::load(manifest, split.indexes(set), &source, &preprocessor, cfg.num_classes)
                .with_context(|| format!("Cannot load {set} images of fold {fold}"))
        };
        let data = FoldData {
            train:      load(SplitSet::Train)?,
            validation: load(SplitSet::Validation)?,
            test:       load(SplitSet::Test)?,
        };
        tracing::info!(
            "Fold {fold}: {} train, {} validation, {} test images (foreground {:.1}%)",
            data.train.sample_count(),
            data.validation.sample_count(),
            data.test.sample_count(),
            data.train.foreground_fraction() * 100.0,
        );

        // ── Step 6: config for prediction ─────────────────────────────────────
        ckpt.save_config(cfg)?;

        // ── Step 7: train ─────────────────────────────────────────────────────
        let outcome = run_training(cfg, fold, data, &ckpt, &logger)?;
        let last    = outcome.last_epoch().context("no epochs were run")?;
        match outcome.best {
            Some(best) => tracing::info!("Fold {fold}: best val_IoU {:.4} at epoch {}", best.val_iou, best.epoch),
            None       => tracing::warn!("Fold {fold}: val_IoU never became finite, no best checkpoint"),
        }

        // ── Step 8: report ────────────────────────────────────────────────────
        TrainingReport {
            fold,
            num_folds,
            network_type:  cfg.network_type(),
            data_csv:      cfg.data_csv_file.clone(),
            epochs_run:    outcome.epochs_run(),
            batch_size:    cfg.batch_size,
            learning_rate: cfg.learning_rate,
            loss_function: cfg.loss_function()?.to_string(),
            train:         last.train,
            validation:    last.validation,
            test:          outcome.test,
        }
        .write(&dir)?;

        Ok(FoldResult {
            fold,
            dir,
            epochs_run: outcome.epochs_run(),
            test:       outcome.test,
            best:       outcome.best,
        })
    }
}
