// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the three subcommands: `train`, `predict` and `folds`
// and all their configurable flags.
//
// clap's derive macros automatically generate:
//   - help text (--help)
//   - error messages for missing args
//   - type conversion (string → usize, f64, enums, etc.)
//
// Reference: Rust Book §12 (Building a CLI Program)

use clap::{Args, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::application::train_use_case::TrainConfig;
use crate::ml::{losses::LossKind, ComputeBackend};

/// The top-level subcommands available to the user
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train one U-Net per cross-validation fold
    Train(TrainArgs),

    /// Segment ultrasound frames with a trained fold
    Predict(PredictArgs),

    /// Build a k-fold manifest from a flat image/mask CSV
    Folds(FoldsArgs),
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum LossArg {
    /// Cross-entropy with per-class weights (--class-weights)
    WeightedCrossEntropy,
    /// Unweighted cross-entropy
    CategoricalCrossEntropy,
    /// 1 - IoU of the foreground class
    Iou,
    /// 1 - weighted mean of per-class IoU
    MeanIou,
    /// Focal loss (--gamma)
    Focal,
}

impl From<LossArg> for LossKind {
    fn from(a: LossArg) -> Self {
        match a {
            LossArg::WeightedCrossEntropy    => LossKind::WeightedCrossEntropy,
            LossArg::CategoricalCrossEntropy => LossKind::CategoricalCrossEntropy,
            LossArg::Iou                     => LossKind::Iou,
            LossArg::MeanIou                 => LossKind::MeanIou,
            LossArg::Focal                   => LossKind::Focal,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendArg {
    /// GPU via wgpu
    Wgpu,
    /// CPU via ndarray
    Ndarray,
}

impl From<BackendArg> for ComputeBackend {
    fn from(a: BackendArg) -> Self {
        match a {
            BackendArg::Wgpu    => ComputeBackend::Wgpu,
            BackendArg::Ndarray => ComputeBackend::NdArray,
        }
    }
}

/// All arguments for the `train` command.
#[derive(Args, Debug)]
pub struct TrainArgs {
    /// Checkpoint prefix; fold k is saved to <save-location>_Fold_k.
    /// Its parent directory name is reported as the network type.
    #[arg(long)]
    pub save_location: PathBuf,

    /// Manifest CSV with Fold, Set, image and mask columns
    #[arg(long)]
    pub data_csv_file: PathBuf,

    /// Manifest column holding the ultrasound file name
    #[arg(long, default_value = "FileName")]
    pub image_column: String,

    /// Manifest column holding the segmentation file name
    #[arg(long, default_value = "Segmentation_Left_Calyx_LG-segmentation")]
    pub mask_column: String,

    /// Maximum number of epochs per fold
    #[arg(long, default_value_t = 500)]
    pub num_epochs: usize,

    #[arg(long, default_value_t = 8)]
    pub batch_size: usize,

    /// Initial Adam learning rate
    #[arg(long, default_value_t = 1e-6)]
    pub learning_rate: f64,

    #[arg(long, value_enum, default_value_t = LossArg::WeightedCrossEntropy)]
    pub loss: LossArg,

    /// One weight per class, background first
    #[arg(long, value_delimiter = ',', default_values_t = vec![0.1f32, 0.9])]
    pub class_weights: Vec<f32>,

    /// Focal loss focusing parameter
    #[arg(long, default_value_t = 2.0)]
    pub gamma: f32,

    /// Frames and masks are resized to image_size x image_size
    #[arg(long, default_value_t = 128)]
    pub image_size: usize,

    #[arg(long, default_value_t = 2)]
    pub num_classes: usize,

    /// Filters in the first U-Net stage, doubled at each level
    #[arg(long, default_value_t = 16)]
    pub base_filters: usize,

    /// Number of down-sampling stages
    #[arg(long, default_value_t = 4)]
    pub depth: usize,

    #[arg(long, default_value_t = 0.1)]
    pub dropout: f64,

    /// Stop after this many epochs without a better val_IoU
    #[arg(long, default_value_t = 10)]
    pub early_stopping_patience: usize,

    /// Reduce the learning rate after this many epochs without a better val_loss
    #[arg(long, default_value_t = 4)]
    pub lr_patience: usize,

    #[arg(long, default_value_t = 0.7)]
    pub lr_factor: f64,

    /// Minimum val_loss decrease that counts as progress
    #[arg(long, default_value_t = 0.001)]
    pub lr_min_delta: f64,

    /// Epochs to wait after a learning-rate reduction before counting again
    #[arg(long, default_value_t = 0)]
    pub lr_cooldown: usize,

    /// Lower bound for the learning rate
    #[arg(long, default_value_t = 0.0)]
    pub min_lr: f64,

    /// Seed for training batch shuffling
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    #[arg(long, value_enum, default_value_t = BackendArg::Wgpu)]
    pub backend: BackendArg,

    /// Train only this fold
    #[arg(long)]
    pub fold: Option<usize>,
}

/// Convert CLI TrainArgs into the application-layer TrainConfig.
/// This is the boundary between Layer 1 and Layer 2 —
/// the application layer never sees clap types.
impl From<TrainArgs> for TrainConfig {
    fn from(a: TrainArgs) -> Self {
        TrainConfig {
            save_location: a.save_location,
            data_csv_file: a.data_csv_file,
            image_column:  a.image_column,
            mask_column:   a.mask_column,
            num_epochs:    a.num_epochs,
            batch_size:    a.batch_size,
            learning_rate: a.learning_rate,
            loss:          a.loss.into(),
            class_weights: a.class_weights,
            gamma:         a.gamma,
            image_size:    a.image_size,
            num_classes:   a.num_classes,
            base_filters:  a.base_filters,
            depth:         a.depth,
            dropout:       a.dropout,
            early_stopping_patience: a.early_stopping_patience,
            lr_patience:   a.lr_patience,
            lr_factor:     a.lr_factor,
            lr_min_delta:  a.lr_min_delta,
            lr_cooldown:   a.lr_cooldown,
            min_lr:        a.min_lr,
            seed:          a.seed,
            backend:       a.backend.into(),
            fold:          a.fold,
        }
    }
}

/// All arguments for the `predict` command
#[derive(Args, Debug)]
pub struct PredictArgs {
    /// A trained fold directory, e.g. models/UNet/unet_Fold_0
    #[arg(long)]
    pub fold_dir: PathBuf,

    /// Where <name>_mask.png files are written
    #[arg(long, default_value = "masks")]
    pub output_dir: PathBuf,

    /// Defaults to the backend the fold was trained with
    #[arg(long, value_enum)]
    pub backend: Option<BackendArg>,

    /// Keep masks at network resolution instead of the frame size
    #[arg(long)]
    pub no_resize: bool,

    /// Ultrasound frames to segment
    #[arg(required = true)]
    pub images: Vec<PathBuf>,
}

/// All arguments for the `folds` command
#[derive(Args, Debug)]
pub struct FoldsArgs {
    /// Flat CSV with one row per image
    #[arg(long)]
    pub input: PathBuf,

    /// Long-form manifest to write
    #[arg(long)]
    pub output: PathBuf,

    /// Number of folds (at least 3)
    #[arg(long, short = 'k', default_value_t = 5)]
    pub num_folds: usize,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    #[arg(long, default_value = "FileName")]
    pub image_column: String,

    #[arg(long, default_value = "Segmentation_Left_Calyx_LG-segmentation")]
    pub mask_column: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use clap::Parser;

    fn train_config(args: &[&str]) -> TrainConfig {
        let mut argv = vec!["ultrasound-unet", "train", "--save-location", "m/UNet/u", "--data-csv-file", "d.csv"];
        argv.extend_from_slice(args);
        match Cli::parse_from(argv).command {
            Commands::Train(a) => a.into(),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_train_defaults_match_config_defaults() {
        let cfg = train_config(&[]);
        let def = TrainConfig::default();
        assert_eq!(cfg.num_epochs, def.num_epochs);
        assert_eq!(cfg.batch_size, def.batch_size);
        assert_eq!(cfg.learning_rate, def.learning_rate);
        assert_eq!(cfg.class_weights, def.class_weights);
        assert_eq!(cfg.mask_column, def.mask_column);
        assert_eq!(cfg.loss, LossKind::WeightedCrossEntropy);
        assert_eq!(cfg.backend, ComputeBackend::Wgpu);
        assert_eq!(cfg.lr_cooldown, def.lr_cooldown);
        assert_eq!(cfg.min_lr, def.min_lr);
    }

    #[test]
    fn test_train_flags_are_mapped() {
        let cfg = train_config(&[
            "--loss", "focal", "--gamma", "1.5", "--class-weights", "0.3,0.7",
            "--backend", "ndarray", "--fold", "2", "--lr-cooldown", "3", "--min-lr", "1e-8",
        ]);
        assert_eq!(cfg.lr_cooldown, 3);
        assert_eq!(cfg.min_lr, 1e-8);
        assert_eq!(cfg.loss, LossKind::Focal);
        assert_eq!(cfg.gamma, 1.5);
        assert_eq!(cfg.class_weights, vec![0.3, 0.7]);
        assert_eq!(cfg.backend, ComputeBackend::NdArray);
        assert_eq!(cfg.fold, Some(2));
    }

    #[test]
    fn test_predict_requires_images() {
        assert!(Cli::try_parse_from(["ultrasound-unet", "predict", "--fold-dir", "x"]).is_err());
    }
}
