// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// This is the entry point for all user interaction.
// It uses the `clap` crate to parse command line arguments.
// All business logic is delegated to Layer 2 (application).
//
// Three commands are supported:
//   1. `folds`   — builds a k-fold manifest from a flat CSV
//   2. `train`   — trains one U-Net per fold
//   3. `predict` — segments frames with a trained fold
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, FoldsArgs, PredictArgs, TrainArgs};

use crate::data::manifest::ManifestColumns;

/// The main CLI struct. clap reads the fields and generates
/// argument parsing code automatically via the Parser derive macro.
#[derive(Parser, Debug)]
#[command(
    name = "ultrasound-unet",
    version,
    about = "K-fold U-Net training for ultrasound segmentation."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Match on the subcommand and dispatch to the correct use case.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Train(args)   => run_train(args),
            Commands::Predict(args) => run_predict(args),
            Commands::Folds(args)   => run_folds(args),
        }
    }
}

fn run_train(args: TrainArgs) -> Result<()> {
    use crate::application::train_use_case::TrainUseCase;

    tracing::info!("Starting training from manifest: {}", args.data_csv_file.display());

    let results = TrainUseCase::new(args.into()).execute()?;

    println!("\nTraining complete.");
    for r in &results {
        let best = r.best.map_or_else(|| "-".to_string(), |b| format!("{:.4} @ {}", b.val_iou, b.epoch));
        println!(
            "  Fold {} ({} epochs, best val_IoU {best}): test loss={:.4} IoU={:.4} accuracy={:.4}  [{}]",
            r.fold, r.epochs_run, r.test.loss, r.test.iou, r.test.accuracy, r.dir.display(),
        );
    }
    Ok(())
}

fn run_predict(args: PredictArgs) -> Result<()> {
    use crate::application::predict_use_case::PredictUseCase;

    let use_case = PredictUseCase::new(
        args.fold_dir,
        args.output_dir,
        args.backend.map(Into::into),
        !args.no_resize,
    );
    let written = use_case.execute(&args.images)?;
    println!("Wrote {} mask(s).", written.len());
    Ok(())
}

fn run_folds(args: FoldsArgs) -> Result<()> {
    use crate::application::folds_use_case::FoldsUseCase;

    let columns = ManifestColumns { image: args.image_column, mask: args.mask_column };
    let written = FoldsUseCase::new(&args.input, &args.output, args.num_folds, args.seed, columns)
        .execute()?;
    println!("Wrote {written} rows to {}", args.output.display());
    Ok(())
}
