//! Closing-Price Estimator
//!
//! Batch pipeline that estimates a home's closing sale price from listing
//! attributes: raw records are enriched with county data, cleaned into a
//! numeric feature table, balanced across target-value buckets, split
//! into reproducible train/validation/test bundles, and fed to a small
//! regression network with early stopping and best-model promotion.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                    Closing-Price Estimator                     │
//! ├────────────────────────────────────────────────────────────────┤
//! │  record/     - Raw listing rows, fixed CSV schema contract     │
//! │  geocode/    - County enrichment behind a resolver trait       │
//! │  cleaner/    - Encoding, outlier trim, min-max scaling         │
//! │  balancer/   - Target-bucket distribution balancing            │
//! │  partition/  - Seedable shuffle + splits, .npy persistence     │
//! │  model/      - Thin configurable MLP                           │
//! │  trainer/    - Early stopping, best-model promotion            │
//! │  pipeline/   - End-to-end orchestration                        │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use closing_price_estimator::prelude::*;
//!
//! let pipeline = PipelineBuilder::new()
//!     .outlier_threshold(0.1)
//!     .shuffle_seed(42)
//!     .build()?;
//!
//! let records = pipeline.load_or_enrich(&raw_csv, &enriched_csv, &resolver)?;
//! let summary = pipeline.run(&records, &out_dir)?;
//!
//! let splits = pipeline.load_splits(&out_dir)?;
//! let scaler = pipeline.load_scaler(&out_dir)?;
//!
//! let mut controller = TrainingController::new(&artifact_dir);
//! let result = controller.train(
//!     &splits.train,
//!     &splits.validation,
//!     &scaler,
//!     &TrainingConfig::default(),
//! )?;
//! let report = evaluate(&result.model, &splits.test);
//! ```

pub mod balancer;
pub mod cleaner;
pub mod config;
pub mod error;
pub mod geocode;
pub mod model;
pub mod partition;
pub mod pipeline;
pub mod record;
pub mod scaler;
pub mod trainer;
pub mod validation;

// Re-exports - Errors
pub use error::{PipelineError, Result};

// Re-exports - Config
pub use config::{FeatureSelection, PipelineConfig, TrainingConfig};

// Re-exports - Data
pub use cleaner::{CleanOutput, CleanedTable, FeatureCleaner, Season};
pub use geocode::{enrich_records, CountyResolver, CountyTable};
pub use record::ListingRecord;
pub use scaler::{ColumnScaler, ScalerState};

// Re-exports - Stages
pub use balancer::{BalanceOutput, BucketSummary, DistributionBalancer};
pub use partition::{DatasetPartitioner, DatasetSplits, SplitBundle, SplitStore};
pub use pipeline::{Pipeline, PipelineBuilder, PipelineSummary};

// Re-exports - Training
pub use model::{Activation, LayerSpec, Mlp};
pub use trainer::{evaluate, EvaluationReport, TrainingController, TrainingResult};

/// Convenience imports for pipeline consumers.
pub mod prelude {
    pub use crate::balancer::DistributionBalancer;
    pub use crate::cleaner::{CleanedTable, FeatureCleaner};
    pub use crate::config::{FeatureSelection, PipelineConfig, TrainingConfig};
    pub use crate::error::{PipelineError, Result};
    pub use crate::geocode::{CountyResolver, CountyTable};
    pub use crate::model::{Activation, LayerSpec, Mlp};
    pub use crate::partition::{DatasetPartitioner, SplitBundle, SplitStore};
    pub use crate::pipeline::{Pipeline, PipelineBuilder, PipelineSummary};
    pub use crate::record::ListingRecord;
    pub use crate::scaler::ScalerState;
    pub use crate::trainer::{evaluate, TrainingController};
}
