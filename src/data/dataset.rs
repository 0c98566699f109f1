use anyhow::{Context, Result};
use burn::data::dataset::Dataset;
use rayon::prelude::*;

use crate::data::{manifest::Manifest, preprocessor::Preprocessor};
use crate::domain::traits::ImageSource;

/// One preprocessed frame and its one-hot target.
/// `image` is [H*W], `target` is [C*H*W] channel-major.
#[derive(Debug, Clone)]
pub struct SegmentationItem {
    pub image:  Vec<f32>,
    pub target: Vec<f32>,
}

impl SegmentationItem {
    /// Fraction of pixels labelled with class 1 (the structure being segmented)
    pub fn foreground_fraction(&self) -> f32 {
        let pixels = self.image.len();
        if pixels == 0 || self.target.len() < 2 * pixels {
            return 0.0;
        }
        self.target[pixels..2 * pixels].iter().sum::<f32>() / pixels as f32
    }
}

/// All samples of one fold role, held in memory.
pub struct SegmentationDataset {
    items: Vec<SegmentationItem>,
}

impl SegmentationDataset {
    pub fn new(items: Vec<SegmentationItem>) -> Self { Self { items } }

    /// Load and preprocess every manifest row in `indexes`.
    /// Files are decoded in parallel; the first failure aborts the load.
    pub fn load<S: ImageSource + Sync>(
        manifest:     &Manifest,
        indexes:      &[usize],
        source:       &S,
        preprocessor: &Preprocessor,
        num_classes:  usize,
    ) -> Result<Self> {
        let items = indexes
            .par_iter()
            .map(|&index| {
                let row = manifest
                    .row(index)
                    .with_context(|| format!("manifest has no row {index}"))?;

                let image = source.load_gray(&row.image)?;
                let mask  = source.load_gray(&row.mask)?;

                Ok(SegmentationItem {
                    image:  preprocessor.process_ultrasound(&image),
                    target: preprocessor.process_target(&mask, num_classes),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { items })
    }

    pub fn sample_count(&self) -> usize { self.items.len() }

    pub fn is_empty(&self) -> bool { self.items.is_empty() }

    /// Mean foreground fraction over the whole set, useful for picking class weights
    pub fn foreground_fraction(&self) -> f32 {
        if self.items.is_empty() {
            return 0.0;
        }
        self.items.iter().map(|i| i.foreground_fraction()).sum::<f32>() / self.items.len() as f32
    }
}

impl Dataset<SegmentationItem> for SegmentationDataset {
    fn get(&self, index: usize) -> Option<SegmentationItem> {
        self.items.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}
