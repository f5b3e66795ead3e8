//! Train/validation/test partitioning and NumPy-compatible persistence.
//!
//! The balanced table is shuffled with a full uniform permutation (seedable
//! for reproducibility), then cut into three contiguous, disjoint,
//! exhaustive slices by rounded fractions. Each split is emitted as a
//! features matrix plus a target vector, with the target taken from the
//! last column and row order preserved within the split.
//!
//! Splits persist as `{split}_inputs.npy` / `{split}_targets.npy` plus a
//! `metadata.json`, consumable by the training step independent of
//! process restarts.

use crate::cleaner::CleanedTable;
use crate::error::{PipelineError, Result};
use ndarray::{Array1, Array2};
use ndarray_npy::{ReadNpyExt, WriteNpyExt};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

/// File-name stems for the three splits.
pub const SPLIT_NAMES: [&str; 3] = ["train", "validation", "test"];

/// One split's data: features matrix and target vector.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitBundle {
    /// `[n_rows, n_features]` feature matrix
    pub inputs: Array2<f64>,
    /// `[n_rows]` target vector
    pub targets: Array1<f64>,
}

impl SplitBundle {
    /// Number of rows in the split.
    pub fn n_rows(&self) -> usize {
        self.inputs.nrows()
    }

    /// Number of feature columns.
    pub fn n_features(&self) -> usize {
        self.inputs.ncols()
    }
}

/// The three partitioned splits.
#[derive(Debug, Clone)]
pub struct DatasetSplits {
    /// Training split
    pub train: SplitBundle,
    /// Validation split
    pub validation: SplitBundle,
    /// Held-out test split
    pub test: SplitBundle,
}

/// Deterministic (under a fixed seed) dataset partitioner.
#[derive(Debug, Clone, Copy)]
pub struct DatasetPartitioner {
    train_fraction: f64,
    validation_fraction: f64,
    seed: Option<u64>,
}

impl DatasetPartitioner {
    /// Create a partitioner.
    ///
    /// Fails with a configuration error when the fractions exceed 1.0.
    pub fn new(train_fraction: f64, validation_fraction: f64, seed: Option<u64>) -> Result<Self> {
        for (name, value) in [
            ("train_fraction", train_fraction),
            ("validation_fraction", validation_fraction),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(PipelineError::Configuration(format!(
                    "{name} must be in [0, 1], got {value}"
                )));
            }
        }
        if train_fraction + validation_fraction > 1.0 {
            return Err(PipelineError::Configuration(format!(
                "train_fraction + validation_fraction must not exceed 1.0, got {}",
                train_fraction + validation_fraction
            )));
        }
        Ok(Self {
            train_fraction,
            validation_fraction,
            seed,
        })
    }

    /// Shuffle and split the table into train/validation/test.
    pub fn partition(&self, table: &CleanedTable) -> Result<DatasetSplits> {
        let n = table.n_rows();
        let mut order: Vec<usize> = (0..n).collect();
        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        order.shuffle(&mut rng);

        let train_rows = (n as f64 * self.train_fraction).round() as usize;
        let validation_end =
            (n as f64 * (self.train_fraction + self.validation_fraction)).round() as usize;
        let train_rows = train_rows.min(n);
        let validation_end = validation_end.clamp(train_rows, n);

        let train = bundle(table, &order[..train_rows])?;
        let validation = bundle(table, &order[train_rows..validation_end])?;
        let test = bundle(table, &order[validation_end..])?;

        log::info!(
            "Partitioned {} rows: {} train / {} validation / {} test",
            n,
            train.n_rows(),
            validation.n_rows(),
            test.n_rows()
        );

        Ok(DatasetSplits {
            train,
            validation,
            test,
        })
    }
}

/// Build a `(features, target)` bundle from selected rows, target last.
fn bundle(table: &CleanedTable, rows: &[usize]) -> Result<SplitBundle> {
    let n_features = table.n_columns().saturating_sub(1);
    let mut flat = Vec::with_capacity(rows.len() * n_features);
    let mut targets = Vec::with_capacity(rows.len());

    for &row in rows {
        let values = &table.rows[row];
        flat.extend_from_slice(&values[..n_features]);
        targets.push(values[n_features]);
    }

    let inputs = Array2::from_shape_vec((rows.len(), n_features), flat)
        .map_err(|e| PipelineError::Artifact(format!("Failed to shape split: {e}")))?;
    Ok(SplitBundle {
        inputs,
        targets: Array1::from_vec(targets),
    })
}

/// Split-bundle metadata persisted next to the arrays.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SplitMetadata {
    /// Feature columns per split
    pub n_features: usize,
    /// Training rows
    pub train_rows: usize,
    /// Validation rows
    pub validation_rows: usize,
    /// Test rows
    pub test_rows: usize,
    /// Export timestamp, RFC 3339
    pub export_timestamp: String,
}

/// Writes and reads split bundles in an output directory.
#[derive(Debug, Clone)]
pub struct SplitStore {
    output_dir: PathBuf,
}

impl SplitStore {
    /// Create a store rooted at `output_dir` (created on export).
    pub fn new<P: AsRef<Path>>(output_dir: P) -> Self {
        Self {
            output_dir: output_dir.as_ref().to_path_buf(),
        }
    }

    /// Persist all three splits plus metadata.
    pub fn export(&self, splits: &DatasetSplits) -> Result<()> {
        fs::create_dir_all(&self.output_dir)?;

        let bundles = [&splits.train, &splits.validation, &splits.test];
        for (name, split) in SPLIT_NAMES.iter().zip(bundles) {
            self.write_bundle(name, split)?;
        }

        let metadata = SplitMetadata {
            n_features: splits.train.n_features(),
            train_rows: splits.train.n_rows(),
            validation_rows: splits.validation.n_rows(),
            test_rows: splits.test.n_rows(),
            export_timestamp: chrono::Utc::now().to_rfc3339(),
        };
        let file = File::create(self.output_dir.join("metadata.json"))?;
        serde_json::to_writer_pretty(file, &metadata)
            .map_err(|e| PipelineError::Artifact(format!("Failed to write metadata: {e}")))?;

        Ok(())
    }

    /// Load one split by name ("train", "validation", or "test").
    pub fn load(&self, name: &str) -> Result<SplitBundle> {
        let inputs_path = self.output_dir.join(format!("{name}_inputs.npy"));
        let targets_path = self.output_dir.join(format!("{name}_targets.npy"));

        let inputs = Array2::read_npy(File::open(&inputs_path)?).map_err(|e| {
            PipelineError::Artifact(format!("Failed to read {}: {e}", inputs_path.display()))
        })?;
        let targets = Array1::read_npy(File::open(&targets_path)?).map_err(|e| {
            PipelineError::Artifact(format!("Failed to read {}: {e}", targets_path.display()))
        })?;

        Ok(SplitBundle { inputs, targets })
    }

    /// Load the persisted metadata.
    pub fn metadata(&self) -> Result<SplitMetadata> {
        let file = File::open(self.output_dir.join("metadata.json"))?;
        serde_json::from_reader(file)
            .map_err(|e| PipelineError::Artifact(format!("Failed to read metadata: {e}")))
    }

    fn write_bundle(&self, name: &str, split: &SplitBundle) -> Result<()> {
        let inputs_path = self.output_dir.join(format!("{name}_inputs.npy"));
        let mut file = File::create(&inputs_path)?;
        split.inputs.write_npy(&mut file).map_err(|e| {
            PipelineError::Artifact(format!("Failed to write {}: {e}", inputs_path.display()))
        })?;

        let targets_path = self.output_dir.join(format!("{name}_targets.npy"));
        let mut file = File::create(&targets_path)?;
        split.targets.write_npy(&mut file).map_err(|e| {
            PipelineError::Artifact(format!("Failed to write {}: {e}", targets_path.display()))
        })?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(n: usize, features: usize) -> CleanedTable {
        let mut columns: Vec<String> = (0..features).map(|i| format!("F{i}")).collect();
        columns.push("Targets".to_string());
        let rows = (0..n)
            .map(|r| {
                let mut row: Vec<f64> = (0..features).map(|c| (r * features + c) as f64).collect();
                row.push(r as f64 / n as f64);
                row
            })
            .collect();
        CleanedTable { columns, rows }
    }

    #[test]
    fn splits_are_exhaustive_and_disjoint() {
        let table = table(97, 4);
        let splits = DatasetPartitioner::new(0.7, 0.2, Some(7))
            .unwrap()
            .partition(&table)
            .unwrap();

        let total = splits.train.n_rows() + splits.validation.n_rows() + splits.test.n_rows();
        assert_eq!(total, 97);

        // First feature values are unique per row, so overlaps would show
        // up as duplicate values across splits.
        let mut seen: Vec<i64> = Vec::new();
        for split in [&splits.train, &splits.validation, &splits.test] {
            for row in 0..split.n_rows() {
                seen.push(split.inputs[[row, 0]] as i64);
            }
        }
        seen.sort_unstable();
        seen.dedup();
        assert_eq!(seen.len(), 97);
    }

    #[test]
    fn fixed_seed_is_deterministic() {
        let table = table(50, 3);
        let partitioner = DatasetPartitioner::new(0.8, 0.1, Some(1234)).unwrap();

        let first = partitioner.partition(&table).unwrap();
        let second = partitioner.partition(&table).unwrap();

        assert_eq!(first.train, second.train);
        assert_eq!(first.validation, second.validation);
        assert_eq!(first.test, second.test);
    }

    #[test]
    fn fractions_round_to_documented_sizes() {
        let table = table(200, 2);
        let splits = DatasetPartitioner::new(0.85, 0.10, Some(0))
            .unwrap()
            .partition(&table)
            .unwrap();

        assert_eq!(splits.train.n_rows(), 170);
        assert_eq!(splits.validation.n_rows(), 20);
        assert_eq!(splits.test.n_rows(), 10);
    }

    #[test]
    fn oversized_fractions_are_rejected() {
        assert!(matches!(
            DatasetPartitioner::new(0.9, 0.2, None),
            Err(PipelineError::Configuration(_))
        ));
    }

    #[test]
    fn export_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let table = table(40, 5);
        let splits = DatasetPartitioner::new(0.75, 0.15, Some(9))
            .unwrap()
            .partition(&table)
            .unwrap();

        let store = SplitStore::new(dir.path());
        store.export(&splits).unwrap();

        let train = store.load("train").unwrap();
        assert_eq!(train, splits.train);

        let metadata = store.metadata().unwrap();
        assert_eq!(metadata.n_features, 5);
        assert_eq!(metadata.train_rows, splits.train.n_rows());
    }
}
