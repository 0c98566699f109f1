// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// This layer orchestrates all the other layers to accomplish
// one goal per command: build folds, train them, or segment
// new frames with a trained fold.
//
// Rules for this layer:
//   - No ML math or model code here
//   - No argument parsing here (that's Layer 1)
//   - Only workflow coordination
//
// Reference: Clean Architecture pattern
//            Rust Book §7 (Module System)

// The k-fold training workflow
pub mod train_use_case;

// Mask prediction with a trained fold
pub mod predict_use_case;

// Building a k-fold manifest from a flat CSV
pub mod folds_use_case;
