// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// Everything from the manifest CSV to GPU-ready batches.
//
//   manifest.csv
//       │
//       ▼
//   Manifest             → rows per fold / role, disjointness check
//       │
//       ▼
//   FileImageSource      → decodes frames and masks
//       │
//       ▼
//   Preprocessor         → resize, scale to [0,1], one-hot masks
//       │
//       ▼
//   SegmentationDataset  → implements Burn's Dataset trait
//       │
//       ▼
//   SegmentationBatcher  → stacks samples into NCHW tensors
//       │
//       ▼
//   DataLoader           → feeds batches to the training loop
//
// `folds` sits to the side: it writes manifests rather than
// reading them.
//
// Reference: Burn Book §4 (Datasets and Dataloaders)

/// Loads images from disk using the image crate
pub mod loader;

/// Reads the k-fold manifest CSV
pub mod manifest;

/// Generates k-fold manifests from a flat image list
pub mod folds;

/// Resizes, normalises and one-hot encodes frames and masks
pub mod preprocessor;

/// Implements Burn's Dataset trait for segmentation samples
pub mod dataset;

/// Implements Burn's Batcher trait to create tensor batches
pub mod batcher;
