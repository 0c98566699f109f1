// ============================================================
// Layer 5 — Segmentation Losses and Metrics
// ============================================================
// All functions take NCHW tensors:
//
//   y_true  one-hot masks          [batch, classes, H, W]
//   y_pred  class probabilities    [batch, classes, H, W]
//
// Channel 1 is the structure being segmented (foreground);
// channel 0 is background.
//
// Losses:
//
//   Weighted cross-entropy
//     WCE(p, p̂) = −mean( p · ln(p̂) · w_c )
//     Foreground pixels are rare (a calyx covers a few percent
//     of a frame) so the background class gets a small weight.
//
//   IoU (Jaccard) loss
//     1 − (I + s) / (Σ(p + p̂) − I + s),  I = Σ p · p̂
//     computed on the foreground channel over the whole batch.
//
//   Mean IoU loss
//     1 − Σ_c w_c · IoU_c / Σ_c w_c   (soft IoU per class)
//
//   Focal loss
//     FL(p, p̂) = −mean( w_c · (1 − p̂)^γ_c · p · ln(p̂) )
//     down-weights pixels the network already gets right.
//
// Metrics:
//
//   iou_score       foreground IoU, thresholded intersection over
//                   a union of the raw probabilities
//   pixel_accuracy  fraction of pixels with the right argmax class
//
// Per-image means averaged over the batch equal the mean over all
// elements because every image has the same size, so `mean()` is
// used directly.
//
// Reference: Jadon (2020) A survey of loss functions for semantic segmentation
//            Lin et al. (2017) Focal Loss for Dense Object Detection

use std::fmt;

use anyhow::{bail, Result};
use burn::{prelude::*, tensor::TensorData};
use serde::{Deserialize, Serialize};

/// Clipping bound keeping ln(p̂) finite
pub const EPSILON: f64 = 1e-7;

/// Smoothing term of the Jaccard index
pub const SMOOTH: f64 = 1e-12;

const FOREGROUND: usize = 1;

// ─── Loss functions ───────────────────────────────────────────────────────────

/// Multi-class weighted cross-entropy.
///
/// With `from_logits` the prediction is softmaxed over the class axis first.
pub fn weighted_cross_entropy<B: Backend>(
    y_true:        Tensor<B, 4>,
    y_pred:        Tensor<B, 4>,
    class_weights: &[f32],
    from_logits:   bool,
) -> Result<Tensor<B, 1>> {
    let dims = y_pred.dims();
    check_per_class("class_weights", class_weights, dims[1])?;

    let y_pred = if from_logits {
        burn::tensor::activation::softmax(y_pred, 1)
    } else {
        y_pred
    };

    let weights = per_class(class_weights, dims, &y_pred.device());
    let y_pred  = y_pred.clamp(EPSILON, 1.0 - EPSILON);

    Ok((y_true * y_pred.log() * weights).mean().neg())
}

/// 1 − soft Jaccard index of the foreground channel.
pub fn iou_loss<B: Backend>(y_true: Tensor<B, 4>, y_pred: Tensor<B, 4>) -> Tensor<B, 1> {
    let t = foreground(y_true);
    let p = foreground(y_pred);

    jaccard(t, p).neg().add_scalar(1.0)
}

/// 1 − class-weighted mean of the soft per-class IoU.
pub fn mean_iou_loss<B: Backend>(
    y_true:        Tensor<B, 4>,
    y_pred:        Tensor<B, 4>,
    class_weights: &[f32],
) -> Result<Tensor<B, 1>> {
    let [_, classes, _, _] = y_pred.dims();
    check_per_class("class_weights", class_weights, classes)?;
    let weight_sum: f32 = class_weights.iter().sum();
    if weight_sum <= 0.0 {
        bail!("class_weights must not all be zero");
    }

    let intersection = per_class_sum(y_true.clone() * y_pred.clone(), classes);
    let total        = per_class_sum(y_true + y_pred, classes);
    let iou = (intersection.clone().add_scalar(SMOOTH))
        / (total - intersection).add_scalar(SMOOTH);

    let device  = iou.device();
    let weights = Tensor::<B, 1>::from_data(
        TensorData::new(class_weights.to_vec(), [classes]),
        &device,
    );

    Ok(((iou * weights).sum() / weight_sum).neg().add_scalar(1.0))
}

/// Multi-class focal loss with per-class weights and focusing parameters.
pub fn focal_loss<B: Backend>(
    y_true:        Tensor<B, 4>,
    y_pred:        Tensor<B, 4>,
    class_weights: &[f32],
    gamma:         &[f32],
) -> Result<Tensor<B, 1>> {
    let dims   = y_pred.dims();
    let device = y_pred.device();
    check_per_class("class_weights", class_weights, dims[1])?;
    check_per_class("gamma", gamma, dims[1])?;

    let weights = per_class(class_weights, dims, &device);
    let gamma   = per_class(gamma, dims, &device);
    let y_pred  = y_pred.clamp(EPSILON, 1.0 - EPSILON);

    let modulating = y_pred.clone().neg().add_scalar(1.0).powf(gamma);

    Ok((weights * modulating * y_true * y_pred.log()).mean().neg())
}

// ─── Metrics ──────────────────────────────────────────────────────────────────

/// Foreground IoU: the intersection uses the thresholded prediction
/// (probability ≥ 0.5), the union the raw probabilities.
pub fn iou_score<B: Backend>(y_true: Tensor<B, 4>, y_pred: Tensor<B, 4>) -> Tensor<B, 1> {
    let t    = foreground(y_true);
    let p    = foreground(y_pred);
    let mask = p.clone().clamp(0.0, 1.0).round();

    let intersection = (t.clone() * mask).sum();
    let total        = (t + p).sum();
    intersection.clone().add_scalar(SMOOTH) / (total - intersection).add_scalar(SMOOTH)
}

/// Fraction of pixels whose predicted class matches the target class.
pub fn pixel_accuracy<B: Backend>(y_true: Tensor<B, 4>, y_pred: Tensor<B, 4>) -> Tensor<B, 1> {
    y_pred
        .argmax(1)
        .equal(y_true.argmax(1))
        .float()
        .mean()
}

// ─── Helpers ──────────────────────────────────────────────────────────────────

/// One finite, non-negative value per class.
fn check_per_class(name: &str, values: &[f32], num_classes: usize) -> Result<()> {
    if values.len() != num_classes {
        bail!(
            "Number of {name} ({}) needs to be the same as number of classes ({num_classes})",
            values.len()
        );
    }
    if values.iter().any(|v| !v.is_finite() || *v < 0.0) {
        bail!("{name} must be finite and non-negative: {values:?}");
    }
    Ok(())
}

fn foreground<B: Backend>(x: Tensor<B, 4>) -> Tensor<B, 4> {
    let [n, _, h, w] = x.dims();
    x.slice([0..n, FOREGROUND..FOREGROUND + 1, 0..h, 0..w])
}

fn jaccard<B: Backend>(t: Tensor<B, 4>, p: Tensor<B, 4>) -> Tensor<B, 1> {
    let intersection = (t.clone() * p.clone()).sum();
    let total        = (t + p).sum();
    intersection.clone().add_scalar(SMOOTH) / (total - intersection).add_scalar(SMOOTH)
}

/// Sum over batch and spatial axes, leaving one value per class.
fn per_class_sum<B: Backend>(x: Tensor<B, 4>, classes: usize) -> Tensor<B, 1> {
    x.sum_dim(0).sum_dim(2).sum_dim(3).reshape([classes])
}

/// Broadcast one value per class to the full NCHW shape.
fn per_class<B: Backend>(values: &[f32], dims: [usize; 4], device: &B::Device) -> Tensor<B, 4> {
    let [n, c, h, w] = dims;
    Tensor::<B, 4>::from_data(TensorData::new(values.to_vec(), [1, c, 1, 1]), device)
        .expand([n, c, h, w])
}

// ─── Loss selection ───────────────────────────────────────────────────────────

/// The loss families that can be chosen for a training run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LossKind {
    WeightedCrossEntropy,
    CategoricalCrossEntropy,
    Iou,
    MeanIou,
    Focal,
}

/// A fully parameterised loss.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SegmentationLoss {
    WeightedCrossEntropy { class_weights: Vec<f32> },
    Iou,
    MeanIou { class_weights: Vec<f32> },
    Focal { class_weights: Vec<f32>, gamma: Vec<f32> },
}

impl SegmentationLoss {
    /// Build a loss for `num_classes` outputs. Class weights must have one
    /// entry per class (ignored by `Iou`, all ones for categorical CE).
    pub fn from_kind(
        kind:          LossKind,
        class_weights: &[f32],
        gamma:         f32,
        num_classes:   usize,
    ) -> Result<Self> {
        let loss = match kind {
            LossKind::WeightedCrossEntropy => SegmentationLoss::WeightedCrossEntropy {
                class_weights: class_weights.to_vec(),
            },
            LossKind::CategoricalCrossEntropy => SegmentationLoss::WeightedCrossEntropy {
                class_weights: vec![1.0; num_classes],
            },
            LossKind::Iou => SegmentationLoss::Iou,
            LossKind::MeanIou => SegmentationLoss::MeanIou {
                class_weights: class_weights.to_vec(),
            },
            LossKind::Focal => SegmentationLoss::Focal {
                class_weights: class_weights.to_vec(),
                gamma:         vec![gamma; num_classes],
            },
        };
        loss.validate(num_classes)?;
        Ok(loss)
    }

    /// Check the parameters against the network's number of output classes.
    pub fn validate(&self, num_classes: usize) -> Result<()> {
        if num_classes < 2 {
            bail!("segmentation losses need at least 2 classes (got {num_classes})");
        }
        let check = |name: &str, values: &[f32]| check_per_class(name, values, num_classes);
        match self {
            SegmentationLoss::WeightedCrossEntropy { class_weights } => check("class_weights", class_weights),
            SegmentationLoss::Iou => Ok(()),
            SegmentationLoss::MeanIou { class_weights } => {
                check("class_weights", class_weights)?;
                if class_weights.iter().sum::<f32>() <= 0.0 {
                    bail!("class_weights must not all be zero");
                }
                Ok(())
            }
            SegmentationLoss::Focal { class_weights, gamma } => {
                check("class_weights", class_weights)?;
                check("gamma", gamma)
            }
        }
    }

    /// Loss of `y_pred` against `y_true`; fails if the class weights do
    /// not match the number of predicted classes.
    pub fn forward<B: Backend>(&self, y_true: Tensor<B, 4>, y_pred: Tensor<B, 4>) -> Result<Tensor<B, 1>> {
        match self {
            SegmentationLoss::WeightedCrossEntropy { class_weights } => {
                weighted_cross_entropy(y_true, y_pred, class_weights, false)
            }
            SegmentationLoss::Iou => Ok(iou_loss(y_true, y_pred)),
            SegmentationLoss::MeanIou { class_weights } => mean_iou_loss(y_true, y_pred, class_weights),
            SegmentationLoss::Focal { class_weights, gamma } => {
                focal_loss(y_true, y_pred, class_weights, gamma)
            }
        }
    }
}

impl fmt::Display for SegmentationLoss {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SegmentationLoss::WeightedCrossEntropy { class_weights } => {
                write!(f, "multiclass_weighted_cross_entropy(class_weights={class_weights:?})")
            }
            SegmentationLoss::Iou => f.write_str("IoU_loss"),
            SegmentationLoss::MeanIou { class_weights } => {
                write!(f, "mean_IoU_loss(class_weights={class_weights:?})")
            }
            SegmentationLoss::Focal { class_weights, gamma } => {
                write!(f, "multiclass_focal_loss(class_weights={class_weights:?}, gamma={gamma:?})")
            }
        }
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TB = NdArray<f32>;

    /// Build a [1, 2, 1, n] tensor from per-pixel foreground probabilities.
    fn two_class(fg: &[f32]) -> Tensor<TB, 4> {
        let n = fg.len();
        let mut data: Vec<f32> = fg.iter().map(|p| 1.0 - p).collect();
        data.extend_from_slice(fg);
        Tensor::from_data(TensorData::new(data, [1, 2, 1, n]), &<TB as Backend>::Device::default())
    }

    fn scalar(t: Tensor<TB, 1>) -> f32 {
        t.into_scalar()
    }

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-4
    }

    #[test]
    fn test_wce_matches_hand_computation() {
        let y_true = two_class(&[1.0, 0.0]);
        let y_pred = two_class(&[0.8, 0.4]);
        let loss   = scalar(weighted_cross_entropy(y_true, y_pred, &[0.1, 0.9], false).unwrap());

        // pixel 0: fg, p=0.8, w=0.9 ; pixel 1: bg, p=0.6, w=0.1 ; mean over 4 elements
        let expected = -((0.8f32.ln() * 0.9) + (0.6f32.ln() * 0.1)) / 4.0;
        assert!(close(loss, expected), "{loss} vs {expected}");
    }

    #[test]
    fn test_wce_is_finite_for_confident_mistakes() {
        let loss = scalar(weighted_cross_entropy(
            two_class(&[1.0]),
            two_class(&[0.0]),
            &[1.0, 1.0],
            false,
        ).unwrap());
        assert!(loss.is_finite());
        assert!(loss > 1.0);
    }

    #[test]
    fn test_wce_from_logits_applies_softmax() {
        let logits = Tensor::<TB, 4>::from_data(
            TensorData::new(vec![0.0f32, 0.0], [1, 2, 1, 1]),
            &<TB as Backend>::Device::default(),
        );
        let loss = scalar(weighted_cross_entropy(two_class(&[1.0]), logits, &[1.0, 1.0], true).unwrap());
        // softmax(0,0) = 0.5 → −ln(0.5) / 2 elements
        assert!(close(loss, 0.5f32.ln().abs() / 2.0));
    }

    #[test]
    fn test_iou_loss_is_zero_for_perfect_overlap() {
        let loss = scalar(iou_loss(two_class(&[1.0, 0.0, 1.0]), two_class(&[1.0, 0.0, 1.0])));
        assert!(close(loss, 0.0));
    }

    #[test]
    fn test_iou_loss_is_one_for_disjoint_masks() {
        let loss = scalar(iou_loss(two_class(&[1.0, 0.0]), two_class(&[0.0, 1.0])));
        assert!(close(loss, 1.0));
    }

    #[test]
    fn test_iou_loss_partial_overlap() {
        // I = 1, union = 2 + 1 - 1 = 2 → IoU 0.5
        let loss = scalar(iou_loss(two_class(&[1.0, 1.0]), two_class(&[1.0, 0.0])));
        assert!(close(loss, 0.5));
    }

    #[test]
    fn test_iou_score_thresholds_intersection_only() {
        let score = scalar(iou_score(two_class(&[1.0, 1.0, 0.0]), two_class(&[0.9, 0.4, 0.2])));
        // mask = [1, 0, 0] → I = 1; Σ(t + p) = 2 + 1.5 → 1 / 2.5
        assert!(close(score, 0.4));
    }

    #[test]
    fn test_iou_score_empty_masks_is_one() {
        let score = scalar(iou_score(two_class(&[0.0, 0.0]), two_class(&[0.0, 0.0])));
        assert!(close(score, 1.0));
    }

    #[test]
    fn test_iou_score_penalises_uncertain_background() {
        // nothing to find, but the network is not fully sure of it
        let score = scalar(iou_score(two_class(&[0.0, 0.0]), two_class(&[0.1, 0.2])));
        assert!(score < 1e-6);
    }

    #[test]
    fn test_mean_iou_loss_weights_classes() {
        let y_true = two_class(&[1.0, 0.0]);
        let y_pred = two_class(&[1.0, 1.0]);
        // fg IoU = 1/2, bg IoU = 0/1 = 0
        let fg_only = scalar(mean_iou_loss(y_true.clone(), y_pred.clone(), &[0.0, 1.0]).unwrap());
        let even    = scalar(mean_iou_loss(y_true, y_pred, &[0.5, 0.5]).unwrap());
        assert!(close(fg_only, 0.5));
        assert!(close(even, 0.75));
    }

    #[test]
    fn test_focal_with_zero_gamma_equals_wce() {
        let y_true = two_class(&[1.0, 0.0, 1.0]);
        let y_pred = two_class(&[0.7, 0.2, 0.4]);
        let focal  = scalar(focal_loss(y_true.clone(), y_pred.clone(), &[0.3, 0.7], &[0.0, 0.0]).unwrap());
        let wce    = scalar(weighted_cross_entropy(y_true, y_pred, &[0.3, 0.7], false).unwrap());
        assert!(close(focal, wce));
    }

    #[test]
    fn test_focal_down_weights_easy_pixels() {
        let y_true = two_class(&[1.0]);
        let y_pred = two_class(&[0.9]);
        let plain  = scalar(focal_loss(y_true.clone(), y_pred.clone(), &[1.0, 1.0], &[0.0, 0.0]).unwrap());
        let focal  = scalar(focal_loss(y_true, y_pred, &[1.0, 1.0], &[2.0, 2.0]).unwrap());
        assert!(focal < plain * 0.05);
    }

    #[test]
    fn test_pixel_accuracy() {
        let acc = scalar(pixel_accuracy(two_class(&[1.0, 0.0, 1.0, 0.0]), two_class(&[0.8, 0.3, 0.2, 0.9])));
        assert!(close(acc, 0.5));
    }

    #[test]
    fn test_weight_count_mismatch_is_an_error() {
        let y_true = two_class(&[1.0, 0.0]);
        let y_pred = two_class(&[0.6, 0.3]);
        assert!(weighted_cross_entropy(y_true.clone(), y_pred.clone(), &[1.0], false).is_err());
        assert!(mean_iou_loss(y_true.clone(), y_pred.clone(), &[1.0, 1.0, 1.0]).is_err());
        assert!(focal_loss(y_true.clone(), y_pred.clone(), &[1.0, 1.0], &[2.0]).is_err());

        let hand_built = SegmentationLoss::WeightedCrossEntropy { class_weights: vec![1.0] };
        let err = hand_built.forward(y_true, y_pred).unwrap_err();
        assert!(err.to_string().contains("number of classes"));
    }

    #[test]
    fn test_from_kind_rejects_wrong_weight_count() {
        let err = SegmentationLoss::from_kind(LossKind::WeightedCrossEntropy, &[1.0], 2.0, 2).unwrap_err();
        assert!(err.to_string().contains("number of classes"));
    }

    #[test]
    fn test_categorical_uses_unit_weights() {
        let loss = SegmentationLoss::from_kind(LossKind::CategoricalCrossEntropy, &[0.1, 0.9], 2.0, 2).unwrap();
        assert_eq!(loss, SegmentationLoss::WeightedCrossEntropy { class_weights: vec![1.0, 1.0] });
    }

    #[test]
    fn test_display_names_the_loss() {
        let loss = SegmentationLoss::from_kind(LossKind::WeightedCrossEntropy, &[0.1, 0.9], 2.0, 2).unwrap();
        assert_eq!(loss.to_string(), "multiclass_weighted_cross_entropy(class_weights=[0.1, 0.9])");
    }
}
