//! End-to-end orchestration of the estimation pipeline.
//!
//! Connects the stage components in a fixed data flow:
//!
//! ```text
//! raw CSV → county enrichment → FeatureCleaner → TableValidator
//!                                      ↓
//!                            DistributionBalancer
//!                                      ↓
//!                            DatasetPartitioner → SplitStore (.npy)
//! ```
//!
//! The pipeline is a single-threaded batch process; the only internal
//! parallelism is the geocoding fan-out, which is a collaborator-side
//! optimization that reassembles results in row order before cleaning.
//! Training is driven separately by [`crate::trainer::TrainingController`]
//! against the persisted splits.
//!
//! # Example
//!
//! ```ignore
//! use closing_price_estimator::prelude::*;
//!
//! let pipeline = PipelineBuilder::new()
//!     .outlier_threshold(0.1)
//!     .bucket_count(5)
//!     .shuffle_seed(42)
//!     .build()?;
//!
//! let records = pipeline.load_or_enrich(&raw_csv, &enriched_csv, &resolver)?;
//! let summary = pipeline.run(&records, &output_dir)?;
//! println!("{} training rows", summary.train_rows);
//! ```

use crate::balancer::{BucketSummary, DistributionBalancer};
use crate::cleaner::FeatureCleaner;
use crate::config::{FeatureSelection, PipelineConfig};
use crate::error::{PipelineError, Result};
use crate::geocode::{enrich_records, CountyResolver};
use crate::partition::{DatasetPartitioner, DatasetSplits, SplitStore};
use crate::record::{self, ListingRecord};
use crate::scaler::ScalerState;
use crate::validation::TableValidator;
use std::path::Path;

/// File name of the persisted scaler inside the pipeline output directory.
pub const SCALER_FILE: &str = "scaler.json";
/// File name of the active-listings side output.
pub const ACTIVE_LISTINGS_FILE: &str = "active_listings.csv";

/// Region suffix appended to addresses before geocoding.
pub const DEFAULT_REGION_SUFFIX: &str = ", MD";

/// Stage-by-stage row accounting for one pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineSummary {
    /// Raw records fed in
    pub raw_rows: usize,
    /// Closed-sale rows entering cleaning
    pub closed_rows: usize,
    /// Non-closed rows routed to the side output
    pub active_rows: usize,
    /// Rows discarded by the outlier trim
    pub trimmed_rows: usize,
    /// Rows in the cleaned table
    pub cleaned_rows: usize,
    /// Feature columns (target excluded)
    pub feature_columns: usize,
    /// Rows in the balanced table
    pub balanced_rows: usize,
    /// Per-bucket counts from the balancer
    pub buckets: Vec<BucketSummary>,
    /// The balancer's per-bucket cap
    pub bucket_limit: usize,
    /// Training split size
    pub train_rows: usize,
    /// Validation split size
    pub validation_rows: usize,
    /// Test split size
    pub test_rows: usize,
}

/// The assembled pipeline.
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    /// Create a pipeline from a validated configuration.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// The configuration this pipeline runs with.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Load the enriched table if present, otherwise geocode and persist it.
    ///
    /// Geocoding is the dominant latency cost, so the with-counties table
    /// is written once and reused across runs.
    pub fn load_or_enrich(
        &self,
        raw_csv: &Path,
        enriched_csv: &Path,
        resolver: &dyn CountyResolver,
    ) -> Result<Vec<ListingRecord>> {
        if enriched_csv.exists() {
            log::info!("Reusing enriched table at {}", enriched_csv.display());
            return record::read_enriched_csv(enriched_csv);
        }

        let raw = record::read_raw_csv(raw_csv)?;
        let enriched = enrich_records(&raw, resolver, DEFAULT_REGION_SUFFIX);
        record::write_enriched_csv(enriched_csv, &enriched)?;
        Ok(enriched)
    }

    /// Run clean → validate → balance → partition → persist.
    ///
    /// Writes the split bundles, the fitted scaler, and the
    /// active-listings side output under `output_dir`, and returns the
    /// stage accounting.
    pub fn run(&self, records: &[ListingRecord], output_dir: &Path) -> Result<PipelineSummary> {
        std::fs::create_dir_all(output_dir)?;

        let cleaner = FeatureCleaner::new(
            self.config.features,
            self.config.outlier_threshold,
            self.config.reference_year,
        )?;
        let cleaned = cleaner.clean(records)?;

        let validation = TableValidator.validate(&cleaned.table);
        if let Some(error) = validation.first_error() {
            return Err(PipelineError::DataFormat {
                field: "cleaned table".to_string(),
                value: error.to_string(),
            });
        }

        let balanced = DistributionBalancer::new(self.config.bucket_count)?
            .balance(&cleaned.table)?;

        let splits = DatasetPartitioner::new(
            self.config.train_fraction,
            self.config.validation_fraction,
            self.config.shuffle_seed,
        )?
        .partition(&balanced.table)?;

        // Persist nothing until every stage has succeeded: the scaler on
        // disk must always pair with the splits on disk, and a failed run
        // must leave the previous run's artifacts intact.
        SplitStore::new(output_dir).export(&splits)?;
        cleaned.scaler.save(output_dir.join(SCALER_FILE))?;
        record::write_active_listings(
            output_dir.join(ACTIVE_LISTINGS_FILE),
            &cleaned.active_listings,
        )?;

        Ok(PipelineSummary {
            raw_rows: records.len(),
            closed_rows: cleaned.table.n_rows() + cleaned.trimmed_rows,
            active_rows: cleaned.active_listings.len(),
            trimmed_rows: cleaned.trimmed_rows,
            cleaned_rows: cleaned.table.n_rows(),
            feature_columns: cleaned.table.n_columns().saturating_sub(1),
            balanced_rows: balanced.table.n_rows(),
            buckets: balanced.buckets,
            bucket_limit: balanced.limit,
            train_rows: splits.train.n_rows(),
            validation_rows: splits.validation.n_rows(),
            test_rows: splits.test.n_rows(),
        })
    }

    /// Reload previously persisted splits from `output_dir`.
    pub fn load_splits(&self, output_dir: &Path) -> Result<DatasetSplits> {
        let store = SplitStore::new(output_dir);
        Ok(DatasetSplits {
            train: store.load("train")?,
            validation: store.load("validation")?,
            test: store.load("test")?,
        })
    }

    /// Reload the persisted scaler from `output_dir`.
    pub fn load_scaler(&self, output_dir: &Path) -> Result<ScalerState> {
        ScalerState::load(output_dir.join(SCALER_FILE))
    }
}

/// Builder for [`Pipeline`] (recommended entry point).
#[derive(Debug, Clone, Default)]
pub struct PipelineBuilder {
    config: PipelineConfig,
}

impl PipelineBuilder {
    /// Start from the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing configuration.
    pub fn from_config(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Set the one-hot feature families.
    pub fn features(mut self, selection: FeatureSelection) -> Self {
        self.config.features = selection;
        self
    }

    /// Set the two-sided outlier trim quantile.
    pub fn outlier_threshold(mut self, threshold: f64) -> Self {
        self.config.outlier_threshold = threshold;
        self
    }

    /// Set the balancer bucket count.
    pub fn bucket_count(mut self, count: usize) -> Self {
        self.config.bucket_count = count;
        self
    }

    /// Set the split fractions.
    pub fn fractions(mut self, train: f64, validation: f64) -> Self {
        self.config.train_fraction = train;
        self.config.validation_fraction = validation;
        self
    }

    /// Fix the pre-split shuffle seed.
    pub fn shuffle_seed(mut self, seed: u64) -> Self {
        self.config.shuffle_seed = Some(seed);
        self
    }

    /// Anchor the home-age derivation to a specific year.
    pub fn reference_year(mut self, year: i32) -> Self {
        self.config.reference_year = Some(year);
        self
    }

    /// Validate and assemble the pipeline.
    pub fn build(self) -> Result<Pipeline> {
        Pipeline::new(self.config)
    }
}
