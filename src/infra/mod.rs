// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Everything one fold leaves on disk:
//
//   checkpoint.rs — Model weights and run configuration
//                   Uses Burn's CompactRecorder for the best
//                   and final U-Net weights, and JSON for the
//                   TrainConfig so prediction can rebuild the
//                   same architecture.
//
//   metrics.rs    — Per-epoch metric history
//                   Loss, IoU and accuracy for training and
//                   validation plus the learning rate, one
//                   CSV row per epoch.
//
//   report.rs     — trainingInfo.txt
//                   Run parameters with the final training,
//                   validation and test statistics.
//
// Reference: Rust Book §7 (Modules)
//            Burn Book §5 (Checkpointing)

/// Model checkpoint saving and loading
pub mod checkpoint;

/// Training metrics CSV logger
pub mod metrics;

/// Per-fold training summary
pub mod report;
