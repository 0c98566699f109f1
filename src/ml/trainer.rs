// ============================================================
// Layer 5 — Training Loop
// ============================================================
// Train + validation loop for one fold using Burn's DataLoader
// and Adam.
//
// Per epoch:
//   1. Training pass    — loss, backward, Adam step per batch;
//                         loss / IoU / accuracy averaged
//   2. Validation pass  — model.valid() on the inner backend
//                         (no autodiff graph, dropout off)
//   3. history.csv row
//   4. Best val_IoU     → unet_best checkpoint
//   5. val_loss plateau → learning rate × factor
//   6. val_IoU stalled  → stop early
//
// After the last epoch the final weights are saved and the
// final (not the best) model is evaluated on the Test split.
//
// Key Burn 0.20 insight:
//   - Training uses B: AutodiffBackend for gradients
//   - model.valid() returns the model on B::InnerBackend
//   - Validation and test loaders must use B::InnerBackend too
//   - Metrics on training batches are taken from .inner()
//     tensors so they never join the autodiff graph
//
// Reference: Burn Book §5, Kingma & Ba (2015) Adam

use anyhow::Result;
use burn::{
    backend::{Autodiff, NdArray, Wgpu},
    data::dataloader::DataLoaderBuilder,
    module::AutodiffModule,
    optim::{AdamConfig, GradientsParams, Optimizer},
    prelude::*,
    tensor::backend::AutodiffBackend,
};

use crate::application::train_use_case::TrainConfig;
use crate::data::{
    batcher::{SegmentationBatch, SegmentationBatcher},
    dataset::SegmentationDataset,
};
use crate::infra::{
    checkpoint::{BestEpoch, CheckpointManager},
    metrics::{EpochMetrics, EvalStats, MetricAccumulator, MetricsLogger},
};
use crate::ml::{
    losses::{iou_score, pixel_accuracy, SegmentationLoss},
    model::UNet,
    schedule::{EarlyStopping, Mode, Monitor, ReduceLrOnPlateau},
    ComputeBackend,
};

/// The three role datasets of one fold.
pub struct FoldData {
    pub train:      SegmentationDataset,
    pub validation: SegmentationDataset,
    pub test:       SegmentationDataset,
}

/// What one fold's training produced.
#[derive(Debug, Clone)]
pub struct FoldOutcome {
    pub history: Vec<EpochMetrics>,
    pub test:    EvalStats,
    pub best:    Option<BestEpoch>,
}

impl FoldOutcome {
    pub fn epochs_run(&self) -> usize {
        self.history.len()
    }

    pub fn last_epoch(&self) -> Option<&EpochMetrics> {
        self.history.last()
    }
}

/// Pick the backend from the config and train one fold on it.
pub fn run_training(
    cfg:         &TrainConfig,
    fold:        usize,
    data:        FoldData,
    checkpoints: &CheckpointManager,
    logger:      &MetricsLogger,
) -> Result<FoldOutcome> {
    match cfg.backend {
        ComputeBackend::Wgpu => {
            let device = burn::backend::wgpu::WgpuDevice::default();
            tracing::info!("Using WGPU device: {:?}", device);
            train_fold::<Autodiff<Wgpu>>(cfg, fold, data, checkpoints, logger, device)
        }
        ComputeBackend::NdArray => {
            let device = burn::backend::ndarray::NdArrayDevice::Cpu;
            tracing::info!("Using NdArray device: {:?}", device);
            train_fold::<Autodiff<NdArray>>(cfg, fold, data, checkpoints, logger, device)
        }
    }
}

pub fn train_fold<B: AutodiffBackend>(
    cfg:         &TrainConfig,
    fold:        usize,
    data:        FoldData,
    checkpoints: &CheckpointManager,
    logger:      &MetricsLogger,
    device:      B::Device,
) -> Result<FoldOutcome> {
    let loss_fn = cfg.loss_function()?;

    // ── Build model ───────────────────────────────────────────────────────────
    // A fresh model per fold; nothing carries over from the previous one.
    let model_cfg = cfg.model_config();
    let mut model: UNet<B> = model_cfg.init(&device);
    tracing::info!(
        "Fold {fold}: U-Net depth={}, base_filters={}, loss={loss_fn}",
        model_cfg.depth,
        model_cfg.base_filters,
    );

    // ── Adam optimiser ────────────────────────────────────────────────────────
    // m = β1*m + (1-β1)*g        (mean)
    // v = β2*v + (1-β2)*g²       (variance)
    // θ = θ - lr * m / (√v + ε)  (update)
    let mut optim = AdamConfig::new().with_epsilon(1e-7).init();
    let mut lr    = cfg.learning_rate;

    // ── Data loaders ──────────────────────────────────────────────────────────
    let batcher = SegmentationBatcher::new(cfg.image_size, cfg.num_classes);

    let train_loader = DataLoaderBuilder::<B, _, _>::new(batcher.clone())
        .batch_size(cfg.batch_size)
        .shuffle(cfg.seed)
        .num_workers(1)
        .set_device(device.clone())
        .build(data.train);

    let val_loader = DataLoaderBuilder::<B::InnerBackend, _, _>::new(batcher.clone())
        .batch_size(cfg.batch_size)
        .num_workers(1)
        .set_device(device.clone())
        .build(data.validation);

    let test_loader = if data.test.is_empty() {
        tracing::warn!("Fold {fold}: empty Test split, test statistics will be NaN");
        None
    } else {
        Some(
            DataLoaderBuilder::<B::InnerBackend, _, _>::new(batcher)
                .batch_size(cfg.batch_size)
                .num_workers(1)
                .set_device(device.clone())
                .build(data.test),
        )
    };

    // ── Callbacks ─────────────────────────────────────────────────────────────
    let mut best_iou   = Monitor::new(Mode::Max, 0.0);
    let mut early_stop = EarlyStopping::new(Mode::Max, cfg.early_stopping_patience, 0.0);
    let mut plateau    = ReduceLrOnPlateau::new(Mode::Min, cfg.lr_factor, cfg.lr_patience, cfg.lr_min_delta)
        .with_cooldown(cfg.lr_cooldown)
        .with_min_lr(cfg.min_lr);
    let mut best       = None;
    let mut history    = Vec::new();

    // ── Epoch loop ────────────────────────────────────────────────────────────
    for epoch in 1..=cfg.num_epochs {

        // ── Training phase ────────────────────────────────────────────────────
        let mut train_acc = MetricAccumulator::new();

        for batch in train_loader.iter() {
            let samples = batch.images.dims()[0];
            let (loss, probs) = model.forward_loss(batch.images, batch.targets.clone(), &loss_fn)?;

            let targets = batch.targets.inner();
            let probs   = probs.inner();
            train_acc.add(
                samples,
                scalar(loss.clone().inner()),
                scalar(iou_score(targets.clone(), probs.clone())),
                scalar(pixel_accuracy(targets, probs)),
            );

            // Backward pass + Adam update
            let grads = loss.backward();
            let grads = GradientsParams::from_grads(grads, &model);
            model = optim.step(lr, model, grads);
        }
        tracing::debug!("Epoch {epoch}: {} training samples", train_acc.samples());
        let train = train_acc.finish();

        // ── Validation phase ──────────────────────────────────────────────────
        let validation = evaluate(&model.valid(), val_loader.iter(), &loss_fn)?;

        println!(
            "Fold {} | Epoch {:>3}/{} | loss={:.4} IoU={:.4} acc={:.4} | val_loss={:.4} val_IoU={:.4} val_acc={:.4} | lr={:e}",
            fold, epoch, cfg.num_epochs,
            train.loss, train.iou, train.accuracy,
            validation.loss, validation.iou, validation.accuracy,
            lr,
        );

        let metrics = EpochMetrics::new(epoch, train, validation, lr);
        logger.log(&metrics)?;
        history.push(metrics);

        if best_iou.update(validation.iou) {
            let record = BestEpoch { epoch, val_iou: validation.iou };
            checkpoints.save_best(&model, record)?;
            best = Some(record);
        }

        let next_lr = plateau.step(validation.loss, lr);
        if next_lr < lr {
            tracing::info!("Epoch {epoch}: val_loss plateaued, learning rate {lr:e} -> {next_lr:e}");
            lr = next_lr;
        }

        early_stop.update(validation.iou);
        if early_stop.should_stop() {
            tracing::info!(
                "Epoch {epoch}: val_IoU has not improved for {} epochs (best {:.4}), stopping",
                early_stop.epochs_without_improvement(),
                early_stop.best().unwrap_or(f64::NAN),
            );
            break;
        }
    }

    checkpoints.save_final(&model)?;

    // ── Test phase ────────────────────────────────────────────────────────────
    let test = match &test_loader {
        Some(loader) => evaluate(&model.valid(), loader.iter(), &loss_fn)?,
        None         => EvalStats::nan(),
    };
    tracing::info!(
        "Fold {fold} test: loss={:.4}, IoU={:.4}, accuracy={:.4}",
        test.loss, test.iou, test.accuracy,
    );

    Ok(FoldOutcome { history, test, best })
}

/// Mean loss, IoU and accuracy of `model` over `batches`.
/// An empty iterator gives NaN for every statistic.
pub fn evaluate<B: Backend>(
    model:   &UNet<B>,
    batches: impl Iterator<Item = SegmentationBatch<B>>,
    loss_fn: &SegmentationLoss,
) -> Result<EvalStats> {
    let mut acc = MetricAccumulator::new();
    for batch in batches {
        let samples = batch.images.dims()[0];
        let (loss, probs) = model.forward_loss(batch.images, batch.targets.clone(), loss_fn)?;
        acc.add(
            samples,
            scalar(loss),
            scalar(iou_score(batch.targets.clone(), probs.clone())),
            scalar(pixel_accuracy(batch.targets, probs)),
        );
    }
    Ok(acc.finish())
}

fn scalar<B: Backend>(t: Tensor<B, 1>) -> f64 {
    t.into_scalar().elem::<f64>()
}
