// ============================================================
// Layer 3 — Split Roles
// ============================================================
// Each manifest row plays exactly one role inside its fold:
//
//   Train       → used to update the weights
//   Validation  → monitored for early stopping, checkpointing
//                 and learning-rate reduction
//   Test        → evaluated once, after training finishes
//
// Within one fold an image must never appear in two roles,
// otherwise the validation / test numbers are meaningless.

use std::{fmt, str::FromStr};

use anyhow::bail;
use serde::{Deserialize, Serialize};

/// The role a manifest row plays in one cross-validation fold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SplitSet {
    Train,
    Validation,
    Test,
}

impl SplitSet {
    pub const ALL: [SplitSet; 3] = [SplitSet::Train, SplitSet::Validation, SplitSet::Test];

    /// The spelling used in manifest files
    pub fn as_str(&self) -> &'static str {
        match self {
            SplitSet::Train      => "Train",
            SplitSet::Validation => "Validation",
            SplitSet::Test       => "Test",
        }
    }
}

impl fmt::Display for SplitSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Case-insensitive; "Val" is accepted as a short form of "Validation".
impl FromStr for SplitSet {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "train"             => Ok(SplitSet::Train),
            "validation" | "val" => Ok(SplitSet::Validation),
            "test"              => Ok(SplitSet::Test),
            other               => bail!("unknown split set '{other}' (expected Train, Validation or Test)"),
        }
    }
}

/// Manifest row indices for every role of a single fold.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FoldSplit {
    pub fold:       usize,
    pub train:      Vec<usize>,
    pub validation: Vec<usize>,
    pub test:       Vec<usize>,
}

impl FoldSplit {
    pub fn new(fold: usize) -> Self {
        Self { fold, ..Default::default() }
    }

    pub fn indexes(&self, set: SplitSet) -> &[usize] {
        match set {
            SplitSet::Train      => &self.train,
            SplitSet::Validation => &self.validation,
            SplitSet::Test       => &self.test,
        }
    }

    pub fn indexes_mut(&mut self, set: SplitSet) -> &mut Vec<usize> {
        match set {
            SplitSet::Train      => &mut self.train,
            SplitSet::Validation => &mut self.validation,
            SplitSet::Test       => &mut self.test,
        }
    }

    pub fn total(&self) -> usize {
        self.train.len() + self.validation.len() + self.test.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!("train".parse::<SplitSet>().unwrap(), SplitSet::Train);
        assert_eq!(" Validation ".parse::<SplitSet>().unwrap(), SplitSet::Validation);
        assert_eq!("VAL".parse::<SplitSet>().unwrap(), SplitSet::Validation);
        assert_eq!("Test".parse::<SplitSet>().unwrap(), SplitSet::Test);
    }

    #[test]
    fn test_unknown_set_is_rejected() {
        assert!("holdout".parse::<SplitSet>().is_err());
    }

    #[test]
    fn test_display_round_trips_manifest_spelling() {
        for set in SplitSet::ALL {
            assert_eq!(set.to_string().parse::<SplitSet>().unwrap(), set);
        }
    }

    #[test]
    fn test_fold_split_total() {
        let mut split = FoldSplit::new(2);
        split.indexes_mut(SplitSet::Train).extend([0, 1, 2]);
        split.indexes_mut(SplitSet::Test).push(3);
        assert_eq!(split.total(), 4);
        assert_eq!(split.indexes(SplitSet::Validation), &[] as &[usize]);
    }
}
