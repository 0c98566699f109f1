// ============================================================
// Layer 2 — FoldsUseCase
// ============================================================
// Turns a flat image/mask CSV into the long-form k-fold
// manifest that `train` reads, then re-reads the result to
// check every fold is disjoint before anyone trains on it.

use anyhow::Result;
use std::path::PathBuf;

use crate::data::{
    folds::write_fold_manifest,
    manifest::{Manifest, ManifestColumns},
};

pub struct FoldsUseCase {
    input:   PathBuf,
    output:  PathBuf,
    k:       usize,
    seed:    u64,
    columns: ManifestColumns,
}

impl FoldsUseCase {
    pub fn new(
        input:   impl Into<PathBuf>,
        output:  impl Into<PathBuf>,
        k:       usize,
        seed:    u64,
        columns: ManifestColumns,
    ) -> Self {
        Self { input: input.into(), output: output.into(), k, seed, columns }
    }

    /// Returns the number of manifest rows written.
    pub fn execute(&self) -> Result<usize> {
        let written  = write_fold_manifest(&self.input, &self.output, self.k, self.seed)?;
        let manifest = Manifest::from_csv(&self.output, &self.columns)?;
        for fold in 0..manifest.num_folds()? {
            manifest.validate_disjoint(fold)?;
        }
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_writes_checked_manifest() {
        let dir   = tempfile::tempdir().unwrap();
        let input = dir.path().join("flat.csv");
        let mut csv = String::from("FileName,Segmentation_Left_Calyx_LG-segmentation\n");
        for i in 0..6 {
            csv.push_str(&format!("{i}.png,{i}_seg.png\n"));
        }
        fs::write(&input, csv).unwrap();

        let output  = dir.path().join("folds.csv");
        let written = FoldsUseCase::new(&input, &output, 3, 7, ManifestColumns::default())
            .execute()
            .unwrap();
        assert_eq!(written, 18);
        assert!(output.exists());
    }

    #[test]
    fn test_too_few_folds_is_an_error() {
        let dir   = tempfile::tempdir().unwrap();
        let input = dir.path().join("flat.csv");
        fs::write(&input, "FileName,Segmentation_Left_Calyx_LG-segmentation\na.png,b.png\n").unwrap();
        let uc = FoldsUseCase::new(&input, dir.path().join("out.csv"), 2, 0, ManifestColumns::default());
        assert!(uc.execute().is_err());
    }
}
