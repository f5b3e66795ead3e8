//! Data-quality checks between cleaning and balancing.
//!
//! Catches problems before they propagate into the balanced table and the
//! persisted splits: ragged rows, non-finite values, and scaled features
//! escaping the [0, 1] interval. Errors abort the run (the cleaning stage
//! is fail-fast by design); warnings are logged and the run continues.

use crate::cleaner::CleanedTable;
use std::fmt;

/// Outcome of a single check.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationLevel {
    /// Data is valid
    Valid,
    /// Minor issue, run continues
    Warning(String),
    /// Serious issue, run aborts
    Error(String),
}

impl ValidationLevel {
    /// Whether this result indicates valid data.
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationLevel::Valid)
    }

    /// Whether this result is an error.
    pub fn is_error(&self) -> bool {
        matches!(self, ValidationLevel::Error(_))
    }
}

impl fmt::Display for ValidationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationLevel::Valid => write!(f, "Valid"),
            ValidationLevel::Warning(msg) => write!(f, "Warning: {msg}"),
            ValidationLevel::Error(msg) => write!(f, "Error: {msg}"),
        }
    }
}

/// Aggregated results across all checks.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    results: Vec<(String, ValidationLevel)>,
}

impl ValidationResult {
    /// Create an empty result.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one check's outcome.
    pub fn add(&mut self, check: &str, level: ValidationLevel) {
        self.results.push((check.to_string(), level));
    }

    /// Whether every check passed.
    pub fn is_valid(&self) -> bool {
        self.results.iter().all(|(_, level)| level.is_valid())
    }

    /// First error message, if any check failed hard.
    pub fn first_error(&self) -> Option<&str> {
        self.results.iter().find_map(|(_, level)| match level {
            ValidationLevel::Error(msg) => Some(msg.as_str()),
            _ => None,
        })
    }

    /// All recorded check outcomes.
    pub fn entries(&self) -> &[(String, ValidationLevel)] {
        &self.results
    }
}

/// Validator for cleaned feature tables.
#[derive(Debug, Clone, Copy, Default)]
pub struct TableValidator;

impl TableValidator {
    /// Run all checks on a cleaned table.
    pub fn validate(&self, table: &CleanedTable) -> ValidationResult {
        let mut result = ValidationResult::new();

        let width = table.n_columns();
        let ragged = table.rows.iter().position(|row| row.len() != width);
        result.add(
            "row_width",
            match ragged {
                Some(row) => ValidationLevel::Error(format!(
                    "row {row} has {} values, expected {width}",
                    table.rows[row].len()
                )),
                None => ValidationLevel::Valid,
            },
        );

        let mut non_finite = None;
        let mut out_of_range = None;
        for (r, row) in table.rows.iter().enumerate() {
            for (c, &value) in row.iter().enumerate() {
                if !value.is_finite() {
                    non_finite.get_or_insert((r, c));
                } else if !(0.0..=1.0).contains(&value) {
                    out_of_range.get_or_insert((r, c, value));
                }
            }
        }

        result.add(
            "finite_values",
            match non_finite {
                Some((r, c)) => ValidationLevel::Error(format!(
                    "non-finite value at row {r}, column '{}'",
                    table.columns.get(c).map(String::as_str).unwrap_or("?")
                )),
                None => ValidationLevel::Valid,
            },
        );

        // Every cleaned column is scaled or an indicator, so anything
        // outside [0, 1] means the scaler state and table disagree.
        result.add(
            "unit_interval",
            match out_of_range {
                Some((r, c, value)) => ValidationLevel::Error(format!(
                    "value {value} at row {r}, column '{}' escapes [0, 1]",
                    table.columns.get(c).map(String::as_str).unwrap_or("?")
                )),
                None => ValidationLevel::Valid,
            },
        );

        if table.rows.is_empty() {
            result.add(
                "population",
                ValidationLevel::Warning("cleaned table is empty".to_string()),
            );
        }

        for (check, level) in result.entries() {
            match level {
                ValidationLevel::Warning(msg) => log::warn!("{check}: {msg}"),
                ValidationLevel::Error(msg) => log::error!("{check}: {msg}"),
                ValidationLevel::Valid => {}
            }
        }
        result
    }
}
