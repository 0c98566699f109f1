// ============================================================
// Layer 4 — Cross-Validation Fold Assignment
// ============================================================
// Builds a k-fold manifest from a flat list of image/mask rows.
//
// Every row is shuffled into one of k groups. For fold f:
//
//   group f            → Test
//   group (f + 1) % k  → Validation
//   all other groups   → Train
//
// Example with k = 4:
//   fold 0: test = g0, val = g1, train = g2 g3
//   fold 1: test = g1, val = g2, train = g3 g0
//   fold 2: test = g2, val = g3, train = g0 g1
//   fold 3: test = g3, val = g0, train = g1 g2
//
// So every row is tested exactly once, and within a fold the
// three roles are disjoint by construction.
//
// The output is "long form": each input row is written once per
// fold with its Fold and Set columns, which is exactly the
// layout the training manifest reader expects.
//
// Uses a seeded StdRng so the same seed always produces the
// same assignment.
//
// Reference: Rust Book §8 (Vectors)
//            rand crate documentation

use anyhow::{bail, Context, Result};
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use std::path::Path;

use crate::data::manifest::{FOLD_COLUMN, SET_COLUMN};
use crate::domain::split::SplitSet;

/// Randomly assign `n_items` items to `k` groups.
///
/// Returns the group index of each item. Group sizes differ by at
/// most one.
pub fn assign_folds(n_items: usize, k: usize, seed: u64) -> Vec<usize> {
    let mut order: Vec<usize> = (0..n_items).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    order.shuffle(&mut rng);

    let mut groups = vec![0usize; n_items];
    for (position, &item) in order.iter().enumerate() {
        groups[item] = position % k;
    }
    groups
}

/// The role an item in `group` plays during `fold` of a `k`-fold run.
pub fn fold_role(group: usize, fold: usize, k: usize) -> SplitSet {
    if group == fold {
        SplitSet::Test
    } else if group == (fold + 1) % k {
        SplitSet::Validation
    } else {
        SplitSet::Train
    }
}

/// Expand a flat CSV of image/mask rows into a k-fold training manifest.
///
/// Existing `Fold` / `Set` columns in the input are replaced.
/// Returns the number of data rows written.
pub fn write_fold_manifest(
    input:  &Path,
    output: &Path,
    k:      usize,
    seed:   u64,
) -> Result<usize> {
    if k < 3 {
        bail!("need at least 3 folds to keep train, validation and test disjoint (got {k})");
    }

    let mut reader = csv::Reader::from_path(input)
        .with_context(|| format!("Cannot open '{}'", input.display()))?;
    let headers = reader.headers()?.clone();

    // Columns carried over unchanged
    let keep: Vec<usize> = headers
        .iter()
        .enumerate()
        .filter(|(_, h)| *h != FOLD_COLUMN && *h != SET_COLUMN)
        .map(|(i, _)| i)
        .collect();

    let records: Vec<csv::StringRecord> = reader
        .records()
        .collect::<std::result::Result<_, _>>()
        .with_context(|| format!("Malformed CSV '{}'", input.display()))?;

    if records.len() < k {
        tracing::warn!(
            "Only {} rows for {} folds, some folds will have empty splits",
            records.len(),
            k
        );
    }

    let groups = assign_folds(records.len(), k, seed);

    let mut writer = csv::Writer::from_path(output)
        .with_context(|| format!("Cannot create '{}'", output.display()))?;

    let mut header_out = vec![FOLD_COLUMN, SET_COLUMN];
    header_out.extend(keep.iter().map(|&i| &headers[i]));
    writer.write_record(&header_out)?;

    let mut written = 0usize;
    for fold in 0..k {
        for (record, &group) in records.iter().zip(&groups) {
            let fold_str = fold.to_string();
            let mut out  = vec![fold_str.as_str(), fold_role(group, fold, k).as_str()];
            out.extend(keep.iter().map(|&i| record.get(i).unwrap_or("")));
            writer.write_record(&out)?;
            written += 1;
        }
    }
    writer.flush()?;

    tracing::info!(
        "Wrote {} manifest rows ({} images x {} folds) to '{}'",
        written,
        records.len(),
        k,
        output.display()
    );
    Ok(written)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::manifest::{Manifest, ManifestColumns};

    #[test]
    fn test_group_sizes_are_balanced() {
        let groups = assign_folds(10, 3, 7);
        let mut counts = [0usize; 3];
        for g in groups {
            counts[g] += 1;
        }
        assert_eq!(counts.iter().sum::<usize>(), 10);
        assert!(counts.iter().max().unwrap() - counts.iter().min().unwrap() <= 1);
    }

    #[test]
    fn test_assignment_is_deterministic_for_a_seed() {
        assert_eq!(assign_folds(20, 5, 42), assign_folds(20, 5, 42));
    }

    #[test]
    fn test_every_group_is_tested_exactly_once() {
        let k = 5;
        for group in 0..k {
            let tested = (0..k)
                .filter(|&fold| fold_role(group, fold, k) == SplitSet::Test)
                .count();
            assert_eq!(tested, 1);
        }
    }

    #[test]
    fn test_validation_group_follows_test_group() {
        assert_eq!(fold_role(1, 0, 4), SplitSet::Validation);
        assert_eq!(fold_role(0, 3, 4), SplitSet::Validation);
        assert_eq!(fold_role(2, 0, 4), SplitSet::Train);
    }

    #[test]
    fn test_written_manifest_reads_back_disjoint() {
        let dir    = tempfile::tempdir().unwrap();
        let input  = dir.path().join("flat.csv");
        let output = dir.path().join("folds.csv");

        let mut flat = String::from("FileName,Segmentation_Left_Calyx_LG-segmentation\n");
        for i in 0..9 {
            flat.push_str(&format!("{i}.png,{i}_seg.png\n"));
        }
        std::fs::write(&input, flat).unwrap();

        let written = write_fold_manifest(&input, &output, 3, 1).unwrap();
        assert_eq!(written, 27);

        let manifest = Manifest::from_csv(&output, &ManifestColumns::default()).unwrap();
        assert_eq!(manifest.num_folds().unwrap(), 3);
        for fold in 0..3 {
            let split = manifest.split(fold).unwrap();
            assert_eq!(split.total(), 9);
            assert_eq!(split.test.len(), 3);
            assert_eq!(split.validation.len(), 3);
        }
    }

    #[test]
    fn test_too_few_folds_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = write_fold_manifest(
            &dir.path().join("in.csv"),
            &dir.path().join("out.csv"),
            2,
            0,
        )
        .unwrap_err();
        assert!(err.to_string().contains("at least 3"));
    }
}
