// ============================================================
// Layer 6 — Metrics Logger
// ============================================================
// Records training metrics to a CSV file after each epoch.
//
// Metrics recorded per epoch:
//   - loss / val_loss          : the configured segmentation loss
//   - IoU / val_IoU            : foreground intersection over union
//   - accuracy / val_accuracy  : fraction of correctly labelled pixels
//   - learning_rate            : the rate used during that epoch
//
// Output file: <fold dir>/history.csv
//
// Example CSV output:
//   epoch,loss,IoU,accuracy,val_loss,val_IoU,val_accuracy,learning_rate
//   1,0.412300,0.103100,0.882000,0.398700,0.120400,0.890100,0.000001
//   2,0.401900,0.118000,0.884500,0.390200,0.131100,0.891300,0.000001
//
// How to read the metrics:
//   - loss should decrease each epoch
//   - val_loss rising while loss falls → overfitting
//   - accuracy is dominated by background pixels; IoU is the
//     number to watch for the segmented structure
//
// Reference: Rust Book §12 (I/O and File Handling)

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

pub const HISTORY_FILE: &str = "history.csv";
const HISTORY_HEADER: &str = "epoch,loss,IoU,accuracy,val_loss,val_IoU,val_accuracy,learning_rate";

/// Loss, IoU and accuracy over one pass of a dataset
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvalStats {
    pub loss:     f64,
    pub iou:      f64,
    pub accuracy: f64,
}

impl EvalStats {
    /// Result of evaluating an empty dataset
    pub fn nan() -> Self {
        Self { loss: f64::NAN, iou: f64::NAN, accuracy: f64::NAN }
    }
}

/// Running mean of per-batch loss, IoU and accuracy.
///
/// Each batch is weighted by its sample count so a short final
/// batch does not count as much as a full one.
#[derive(Debug, Clone, Default)]
pub struct MetricAccumulator {
    loss:     f64,
    iou:      f64,
    accuracy: f64,
    samples:  usize,
}

impl MetricAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, samples: usize, loss: f64, iou: f64, accuracy: f64) {
        let w = samples as f64;
        self.loss     += loss * w;
        self.iou      += iou * w;
        self.accuracy += accuracy * w;
        self.samples  += samples;
    }

    pub fn samples(&self) -> usize {
        self.samples
    }

    pub fn finish(&self) -> EvalStats {
        if self.samples == 0 {
            return EvalStats::nan();
        }
        let n = self.samples as f64;
        EvalStats {
            loss:     self.loss / n,
            iou:      self.iou / n,
            accuracy: self.accuracy / n,
        }
    }
}

/// One row of metrics data for a single training epoch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpochMetrics {
    /// The epoch number (starts at 1)
    pub epoch:         usize,
    pub train:         EvalStats,
    pub validation:    EvalStats,
    pub learning_rate: f64,
}

impl EpochMetrics {
    pub fn new(epoch: usize, train: EvalStats, validation: EvalStats, learning_rate: f64) -> Self {
        Self { epoch, train, validation, learning_rate }
    }

    fn csv_row(&self) -> String {
        format!(
            "{},{:.6},{:.6},{:.6},{:.6},{:.6},{:.6},{}",
            self.epoch,
            self.train.loss,
            self.train.iou,
            self.train.accuracy,
            self.validation.loss,
            self.validation.iou,
            self.validation.accuracy,
            self.learning_rate,
        )
    }
}

/// Logs epoch metrics to a CSV file for later analysis.
pub struct MetricsLogger {
    csv_path: PathBuf,
}

impl MetricsLogger {
    /// Start a fresh history in `dir`, replacing any previous run's file.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)
            .with_context(|| format!("Cannot create '{}'", dir.display()))?;

        let csv_path = dir.join(HISTORY_FILE);
        let mut f = fs::File::create(&csv_path)
            .with_context(|| format!("Cannot create '{}'", csv_path.display()))?;
        writeln!(f, "{HISTORY_HEADER}")?;
        tracing::debug!("Created metrics CSV: '{}'", csv_path.display());

        Ok(Self { csv_path })
    }

    /// Append one epoch's metrics as a new row in the CSV.
    pub fn log(&self, m: &EpochMetrics) -> Result<()> {
        let mut f = OpenOptions::new()
            .append(true)
            .open(&self.csv_path)
            .with_context(|| format!("Cannot append to '{}'", self.csv_path.display()))?;

        writeln!(f, "{}", m.csv_row())?;

        tracing::debug!(
            "Logged epoch {} metrics: loss={:.4}, val_loss={:.4}, val_IoU={:.4}",
            m.epoch,
            m.train.loss,
            m.validation.loss,
            m.validation.iou,
        );
        Ok(())
    }

    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn stats(loss: f64, iou: f64, accuracy: f64) -> EvalStats {
        EvalStats { loss, iou, accuracy }
    }

    #[test]
    fn test_accumulator_weights_by_samples() {
        let mut acc = MetricAccumulator::new();
        acc.add(3, 1.0, 0.0, 1.0);
        acc.add(1, 5.0, 1.0, 0.0);
        let s = acc.finish();
        assert_eq!(acc.samples(), 4);
        assert!((s.loss - 2.0).abs() < 1e-12);
        assert!((s.iou - 0.25).abs() < 1e-12);
        assert!((s.accuracy - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_empty_accumulator_is_nan() {
        let s = MetricAccumulator::new().finish();
        assert!(s.loss.is_nan() && s.iou.is_nan() && s.accuracy.is_nan());
    }

    #[test]
    fn test_logger_writes_header_and_rows() {
        let dir    = tempfile::tempdir().unwrap();
        let logger = MetricsLogger::new(dir.path()).unwrap();
        logger
            .log(&EpochMetrics::new(1, stats(0.5, 0.1, 0.9), stats(0.6, 0.2, 0.8), 1e-6))
            .unwrap();

        let text  = fs::read_to_string(logger.csv_path()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], HISTORY_HEADER);
        assert_eq!(lines[1], "1,0.500000,0.100000,0.900000,0.600000,0.200000,0.800000,0.000001");
    }

    #[test]
    fn test_new_logger_truncates_old_history() {
        let dir = tempfile::tempdir().unwrap();
        let first = MetricsLogger::new(dir.path()).unwrap();
        first
            .log(&EpochMetrics::new(1, stats(1.0, 0.0, 0.0), stats(1.0, 0.0, 0.0), 0.1))
            .unwrap();

        let second = MetricsLogger::new(dir.path()).unwrap();
        let text   = fs::read_to_string(second.csv_path()).unwrap();
        assert_eq!(text.lines().count(), 1);
    }
}
