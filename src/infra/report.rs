// ============================================================
// Layer 6 — Training Report
// ============================================================
// Human-readable summary of one fold, written next to the
// checkpoints as trainingInfo.txt:
//
//   Fold 1/5
//   Network type: UNet
//   Data CSV: data/manifest.csv
//   Number of Epochs: 37
//   Batch size: 8
//   Learning rate: 1e-06
//   Loss function: multiclass_weighted_cross_entropy(class_weights=[0.1, 0.9])
//
//   Training Statistics:
//   	Final training loss: ...
//   	Final training IoU: ...
//   	...
//
//   Testing Statistics:
//   	Test loss: ...
//
// The learning rate line is the configured starting rate; the
// per-epoch rate after plateau reductions is in history.csv.
// Numbers use Python's float spelling (1e-06, 0.25, nan) so
// reports line up with those of earlier runs.

use anyhow::{Context, Result};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::infra::metrics::EvalStats;

pub const REPORT_FILE: &str = "trainingInfo.txt";

#[derive(Debug, Clone)]
pub struct TrainingReport {
    pub fold:          usize,
    pub num_folds:     usize,
    pub network_type:  String,
    pub data_csv:      PathBuf,
    pub epochs_run:    usize,
    pub batch_size:    usize,
    pub learning_rate: f64,
    pub loss_function: String,
    pub train:         EvalStats,
    pub validation:    EvalStats,
    pub test:          EvalStats,
}

impl TrainingReport {
    pub fn render(&self) -> String {
        format!(
            "Fold {}/{}\n\
             Network type: {}\n\
             Data CSV: {}\n\
             Number of Epochs: {}\n\
             Batch size: {}\n\
             Learning rate: {}\n\
             Loss function: {}\n\
             \n\
             Training Statistics:\n\
             {}{}\
             \n\
             Testing Statistics:\n\
             {}",
            self.fold,
            self.num_folds,
            self.network_type,
            self.data_csv.display(),
            self.epochs_run,
            self.batch_size,
            py_float(self.learning_rate),
            self.loss_function,
            stats_lines("Final training ", &self.train),
            stats_lines("Final validation ", &self.validation),
            stats_lines("Test ", &self.test),
        )
    }

    /// Write trainingInfo.txt into `dir`, replacing any previous report.
    pub fn write(&self, dir: impl AsRef<Path>) -> Result<PathBuf> {
        let path = dir.as_ref().join(REPORT_FILE);
        fs::write(&path, self.render())
            .with_context(|| format!("Cannot write report '{}'", path.display()))?;
        tracing::info!("Wrote '{}'", path.display());
        Ok(path)
    }
}

fn stats_lines(prefix: &str, s: &EvalStats) -> String {
    format!(
        "\t{prefix}loss: {}\n\t{prefix}IoU: {}\n\t{prefix}accuracy: {}\n",
        py_float(s.loss),
        py_float(s.iou),
        py_float(s.accuracy),
    )
}

/// Spell a float the way Python's `str()` does: scientific notation with a
/// two-digit exponent below 1e-4 and from 1e16 up, `.0` on whole numbers.
fn py_float(v: f64) -> String {
    if v.is_nan() {
        return "nan".into();
    }
    if v.is_infinite() {
        return if v > 0.0 { "inf" } else { "-inf" }.into();
    }
    let magnitude = v.abs();
    if magnitude != 0.0 && !(1e-4..1e16).contains(&magnitude) {
        let sci = format!("{v:e}");
        return match sci.split_once('e') {
            Some((mantissa, exp)) => {
                let (sign, digits) = match exp.strip_prefix('-') {
                    Some(d) => ('-', d),
                    None    => ('+', exp),
                };
                format!("{mantissa}e{sign}{digits:0>2}")
            }
            None => sci,
        };
    }
    if v.fract() == 0.0 {
        format!("{v:.1}")
    } else {
        format!("{v}")
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn report() -> TrainingReport {
        TrainingReport {
            fold:          0,
            num_folds:     5,
            network_type:  "UNet".into(),
            data_csv:      PathBuf::from("data/folds.csv"),
            epochs_run:    12,
            batch_size:    8,
            learning_rate: 1e-6,
            loss_function: "iou_loss".into(),
            train:         EvalStats { loss: 0.25, iou: 0.5, accuracy: 0.75 },
            validation:    EvalStats { loss: 0.5, iou: 0.25, accuracy: 0.5 },
            test:          EvalStats::nan(),
        }
    }

    #[test]
    fn test_header_lines() {
        let text  = report().render();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Fold 0/5");
        assert_eq!(lines[1], "Network type: UNet");
        assert_eq!(lines[2], "Data CSV: data/folds.csv");
        assert_eq!(lines[3], "Number of Epochs: 12");
        assert_eq!(lines[4], "Batch size: 8");
        assert_eq!(lines[5], "Learning rate: 1e-06");
        assert_eq!(lines[6], "Loss function: iou_loss");
    }

    #[test]
    fn test_statistics_sections() {
        let text = report().render();
        assert!(text.contains("Training Statistics:\n\tFinal training loss: 0.25\n"));
        assert!(text.contains("\tFinal validation IoU: 0.25\n"));
        assert!(text.contains("Testing Statistics:\n\tTest loss: nan\n"));
        assert!(text.ends_with("\tTest accuracy: nan\n"));
    }

    #[test]
    fn test_floats_are_spelled_like_python() {
        assert_eq!(py_float(1e-6), "1e-06");
        assert_eq!(py_float(1.5e-7), "1.5e-07");
        assert_eq!(py_float(0.001), "0.001");
        assert_eq!(py_float(0.0001), "0.0001");
        assert_eq!(py_float(2.0), "2.0");
        assert_eq!(py_float(0.0), "0.0");
        assert_eq!(py_float(1e16), "1e+16");
        assert_eq!(py_float(-3e-5), "-3e-05");
        assert_eq!(py_float(f64::NAN), "nan");
    }

    #[test]
    fn test_report_has_blank_lines_between_sections() {
        let text  = report().render();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[7], "");
        assert_eq!(lines[8], "Training Statistics:");
        assert_eq!(lines[15], "");
        assert_eq!(lines[16], "Testing Statistics:");
        assert_eq!(lines.len(), 20);
    }

    #[test]
    fn test_write_creates_file() {
        let dir  = tempfile::tempdir().unwrap();
        let path = report().write(dir.path()).unwrap();
        assert!(path.ends_with(REPORT_FILE));
        assert_eq!(fs::read_to_string(path).unwrap(), report().render());
    }
}
