//! Min-max scaling with persistable fitted state.
//!
//! Every numeric column of the cleaned table is independently rescaled to
//! [0, 1] using statistics computed over the cleaned (pre-balance)
//! population. The fitted parameters are a derived artifact: inference on
//! any new row requires the exact scaler that produced the training data,
//! so [`ScalerState`] is persisted alongside the model and never
//! recomputed per split.

use crate::error::{PipelineError, Result};
use std::fs::File;
use std::path::Path;

/// Fitted min-max parameters for one column.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ColumnScaler {
    /// Observed minimum
    pub min: f64,
    /// Observed maximum
    pub max: f64,
}

impl ColumnScaler {
    /// Fit over a population of values.
    ///
    /// An empty or constant population yields a degenerate scaler that
    /// maps every value to 0.
    pub fn fit(values: &[f64]) -> Self {
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for &v in values {
            if v < min {
                min = v;
            }
            if v > max {
                max = v;
            }
        }
        if !min.is_finite() || !max.is_finite() {
            return Self { min: 0.0, max: 0.0 };
        }
        Self { min, max }
    }

    /// Scale a value into [0, 1].
    pub fn transform(&self, value: f64) -> f64 {
        if self.max > self.min {
            (value - self.min) / (self.max - self.min)
        } else {
            0.0
        }
    }

    /// Map a scaled value back to the original range.
    pub fn inverse(&self, scaled: f64) -> f64 {
        if self.max > self.min {
            scaled * (self.max - self.min) + self.min
        } else {
            self.min
        }
    }
}

/// Fitted scalers for every numeric column, in column order.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ScalerState {
    columns: Vec<(String, ColumnScaler)>,
}

impl ScalerState {
    /// Create an empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a fitted scaler for a column.
    pub fn push(&mut self, column: impl Into<String>, scaler: ColumnScaler) {
        self.columns.push((column.into(), scaler));
    }

    /// Look up the scaler for a column by name.
    pub fn get(&self, column: &str) -> Option<&ColumnScaler> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, s)| s)
    }

    /// Fitted columns in order.
    pub fn columns(&self) -> impl Iterator<Item = (&str, &ColumnScaler)> {
        self.columns.iter().map(|(name, s)| (name.as_str(), s))
    }

    /// Number of fitted columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Whether no columns have been fitted.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Persist the fitted parameters as JSON.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        serde_json::to_writer_pretty(file, self)
            .map_err(|e| PipelineError::Artifact(format!("Failed to write scaler: {e}")))
    }

    /// Load previously persisted parameters.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        serde_json::from_reader(file)
            .map_err(|e| PipelineError::Artifact(format!("Failed to read scaler: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transform_maps_bounds_to_unit_interval() {
        let scaler = ColumnScaler::fit(&[10.0, 20.0, 30.0]);
        assert_eq!(scaler.transform(10.0), 0.0);
        assert_eq!(scaler.transform(30.0), 1.0);
        assert!((scaler.transform(20.0) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn inverse_round_trips_within_tolerance() {
        let values = [3.5, 7.25, 100.0, -4.0, 0.0];
        let scaler = ColumnScaler::fit(&values);
        for &v in &values {
            let back = scaler.inverse(scaler.transform(v));
            assert!((back - v).abs() < 1e-9, "round trip failed for {v}");
        }
    }

    #[test]
    fn constant_column_scales_to_zero() {
        let scaler = ColumnScaler::fit(&[5.0, 5.0, 5.0]);
        assert_eq!(scaler.transform(5.0), 0.0);
        assert_eq!(scaler.inverse(0.0), 5.0);
    }

    #[test]
    fn state_persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scaler.json");

        let mut state = ScalerState::new();
        state.push("Home Age", ColumnScaler::fit(&[0.0, 55.0]));
        state.push("Targets", ColumnScaler::fit(&[150_000.0, 900_000.0]));
        state.save(&path).unwrap();

        let loaded = ScalerState::load(&path).unwrap();
        assert_eq!(loaded, state);
        assert!(loaded.get("Targets").is_some());
        assert!(loaded.get("Beds").is_none());
    }
}
