// ============================================================
// Layer 4 — Training Manifest
// ============================================================
// Reads the CSV file that describes the whole cross-validation
// experiment. Every data row names:
//
//   Fold      → which fold the row belongs to (0, 1, 2, ...)
//   Set       → its role in that fold: Train / Validation / Test
//   FileName  → the ultrasound frame
//   <label>   → the segmentation mask for the frame
//   Folder    → (optional) directory both files live in
//
// Example:
//   Fold,Set,Folder,FileName,Segmentation_Left_Calyx_LG-segmentation
//   0,Train,patient01,0001_us.png,0001_seg.png
//   0,Test,patient02,0007_us.png,0007_seg.png
//
// Relative paths are resolved against the directory holding the
// manifest, so a dataset folder can be moved as a unit.
//
// Rows whose mask cell is empty are frames nobody segmented;
// they are skipped with a warning because they have no target.
//
// The number of folds is max(Fold) + 1.
//
// Reference: csv crate documentation
//            Rust Book §9 (Error Handling)

use anyhow::{bail, Context, Result};
use std::{
    collections::HashMap,
    fs::File,
    io::Read,
    path::{Path, PathBuf},
};

use crate::domain::{
    manifest_row::ManifestRow,
    split::{FoldSplit, SplitSet},
};

pub const FOLD_COLUMN:   &str = "Fold";
pub const SET_COLUMN:    &str = "Set";
pub const FOLDER_COLUMN: &str = "Folder";

/// Which manifest columns hold the image and mask references.
#[derive(Debug, Clone)]
pub struct ManifestColumns {
    pub image: String,
    pub mask:  String,
}

impl Default for ManifestColumns {
    fn default() -> Self {
        Self {
            image: "FileName".to_string(),
            mask:  "Segmentation_Left_Calyx_LG-segmentation".to_string(),
        }
    }
}

/// The parsed manifest. Rows are kept in file order.
#[derive(Debug, Clone)]
pub struct Manifest {
    rows:    Vec<ManifestRow>,
    skipped: usize,
}

impl Manifest {
    /// Read a manifest CSV from disk.
    pub fn from_csv(path: impl AsRef<Path>, columns: &ManifestColumns) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("Cannot open manifest '{}'", path.display()))?;

        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        let manifest = Self::from_reader(file, base_dir, columns)
            .with_context(|| format!("Invalid manifest '{}'", path.display()))?;

        tracing::info!(
            "Manifest '{}': {} rows, {} skipped without mask",
            path.display(),
            manifest.rows.len(),
            manifest.skipped,
        );
        Ok(manifest)
    }

    /// Parse a manifest from any reader. Relative paths are joined onto `base_dir`.
    pub fn from_reader<R: Read>(
        reader:   R,
        base_dir: &Path,
        columns:  &ManifestColumns,
    ) -> Result<Self> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = csv_reader.headers()?.clone();
        let find = |name: &str| headers.iter().position(|h| h == name);

        let fold_idx  = find(FOLD_COLUMN).with_context(|| missing(FOLD_COLUMN))?;
        let set_idx   = find(SET_COLUMN).with_context(|| missing(SET_COLUMN))?;
        let image_idx = find(columns.image.as_str()).with_context(|| missing(&columns.image))?;
        let mask_idx  = find(columns.mask.as_str()).with_context(|| missing(&columns.mask))?;
        let folder_idx = find(FOLDER_COLUMN);

        let mut rows    = Vec::new();
        let mut skipped = 0usize;

        for (row, record) in csv_reader.records().enumerate() {
            let record = record.with_context(|| format!("Malformed CSV at data row {row}"))?;
            let field  = |idx: usize| record.get(idx).unwrap_or("");

            let mask_name = field(mask_idx);
            if mask_name.is_empty() {
                tracing::warn!("Row {row}: no '{}' entry, skipping", columns.mask);
                skipped += 1;
                continue;
            }

            let image_name = field(image_idx);
            if image_name.is_empty() {
                bail!("Row {row}: empty '{}' entry", columns.image);
            }

            let fold = parse_fold(field(fold_idx))
                .with_context(|| format!("Row {row}: invalid {FOLD_COLUMN}"))?;
            let set: SplitSet = field(set_idx)
                .parse()
                .with_context(|| format!("Row {row}: invalid {SET_COLUMN}"))?;

            let folder = folder_idx.map(field).unwrap_or("");
            rows.push(ManifestRow {
                row,
                fold,
                set,
                image: resolve(base_dir, folder, image_name),
                mask:  resolve(base_dir, folder, mask_name),
            });
        }

        Ok(Self { rows, skipped })
    }

    pub fn rows(&self) -> &[ManifestRow] {
        &self.rows
    }

    /// Number of rows dropped because they had no mask
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Look up a row by its CSV data-row number
    pub fn row(&self, row: usize) -> Option<&ManifestRow> {
        self.rows
            .binary_search_by_key(&row, |r| r.row)
            .ok()
            .map(|i| &self.rows[i])
    }

    /// Number of folds in the experiment: max(Fold) + 1
    pub fn num_folds(&self) -> Result<usize> {
        match self.rows.iter().map(|r| r.fold).max() {
            Some(max) => Ok(max + 1),
            None      => bail!("manifest contains no usable rows"),
        }
    }

    /// Row numbers of every entry with the given fold and role, in file order.
    pub fn indexes(&self, fold: usize, set: SplitSet) -> Vec<usize> {
        self.rows
            .iter()
            .filter(|r| r.fold == fold && r.set == set)
            .map(|r| r.row)
            .collect()
    }

    /// Collect all three roles of a fold through `indexes`, rejecting
    /// any image that is assigned to more than one role.
    pub fn split(&self, fold: usize) -> Result<FoldSplit> {
        let mut split = FoldSplit::new(fold);
        let mut seen: HashMap<&Path, SplitSet> = HashMap::new();

        for set in SplitSet::ALL {
            let indexes = self.indexes(fold, set);
            for r in indexes.iter().filter_map(|&i| self.row(i)) {
                match seen.insert(r.image.as_path(), set) {
                    Some(previous) if previous != set => bail!(
                        "fold {fold}: image '{}' is assigned to both {previous} and {set}",
                        r.image.display(),
                    ),
                    _ => {}
                }
            }
            *split.indexes_mut(set) = indexes;
        }

        tracing::debug!(
            "Fold {fold}: {} rows ({} train, {} validation, {} test)",
            split.total(),
            split.train.len(),
            split.validation.len(),
            split.test.len(),
        );
        Ok(split)
    }

    /// Fail if any image of `fold` is assigned to more than one role.
    pub fn validate_disjoint(&self, fold: usize) -> Result<()> {
        self.split(fold).map(|_| ())
    }
}

fn missing(column: &str) -> String {
    format!("manifest has no '{column}' column")
}

/// Folds are integers, but spreadsheets like to write them as "1.0".
fn parse_fold(raw: &str) -> Result<usize> {
    if let Ok(v) = raw.parse::<usize>() {
        return Ok(v);
    }
    let v: f64 = raw
        .parse()
        .with_context(|| format!("'{raw}' is not a number"))?;
    if v < 0.0 || v.fract() != 0.0 {
        bail!("'{raw}' is not a non-negative integer");
    }
    Ok(v as usize)
}

fn resolve(base_dir: &Path, folder: &str, name: &str) -> PathBuf {
    let path = Path::new(folder).join(name);
    if path.is_absolute() {
        path
    } else {
        base_dir.join(path)
    }
}
