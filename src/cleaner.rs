//! Raw-record cleaning and feature encoding.
//!
//! Turns raw listing records into a fully numeric, encoded feature table
//! with the target in the last column. The steps run in a fixed order;
//! each is a design rule of the pipeline, not an implementation detail:
//!
//! 1. Keep closed sales only; other statuses are routed to an
//!    active-listings side output.
//! 2. Missing numeric values default to 0 (keeps rows at the cost of
//!    zero-valued outliers, which the trim in step 7 partially absorbs).
//! 3. Style collapses to its primary category.
//! 4. Year built becomes home age, 0 when the year is unknown.
//! 5. Basement maps to {0, 1}; anything unrecognized is a mapping error.
//! 6. Currency fields are normalized and parsed; parse failure is fatal.
//! 7. Symmetric two-sided outlier trim on `close + concessions - list`.
//! 8. Target = close price; list price, delta, and concessions are
//!    dropped so they cannot leak into the feature set.
//! 9. Close date becomes one of four seasons.
//! 10. Numeric columns (including the target) are min-max scaled; the
//!     fitted scaler is retained as [`ScalerState`].
//! 11. County/style/season are one-hot encoded, each family omittable.
//! 12. The target column moves to the last position.
//!
//! Schema and parse failures abort the run: a partially cleaned table
//! would corrupt the scaling statistics. Unresolved counties become an
//! empty-label category instead of failing the batch.

use crate::config::FeatureSelection;
use crate::error::{PipelineError, Result};
use crate::record::{self, ListingRecord};
use crate::scaler::{ColumnScaler, ScalerState};
use chrono::{Datelike, NaiveDate};
use std::collections::BTreeSet;

/// Cleaned-schema column names for the scaled numeric features.
pub const NUMERIC_COLUMNS: &[&str] = &[
    "Home Age",
    "Lot Size SqFt",
    "Beds",
    "Bathrooms Full",
    "Bathrooms Half",
    "Levels/Stories",
    "Fireplaces Total",
];

/// Basement indicator column ({0, 1}, not min-max scaled).
pub const BASEMENT_COLUMN: &str = "Basement YN";

/// Target column name; always last in the cleaned schema.
pub const TARGET_COLUMN: &str = "Targets";

/// Sale season derived from the close month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Season {
    /// December through February
    Winter,
    /// March through May
    Spring,
    /// June through August
    Summer,
    /// September through November
    Fall,
}

impl Season {
    /// Map a calendar month (1-12) to its season.
    pub fn from_month(month: u32) -> Self {
        match month {
            12 | 1 | 2 => Season::Winter,
            3 | 4 | 5 => Season::Spring,
            6 | 7 | 8 => Season::Summer,
            // September through November; the catch-all is deliberate
            _ => Season::Fall,
        }
    }

    /// Label used for the one-hot column name.
    pub fn label(&self) -> &'static str {
        match self {
            Season::Winter => "Winter",
            Season::Spring => "Spring",
            Season::Summer => "Summer",
            Season::Fall => "Fall",
        }
    }
}

/// Fully numeric feature table; target is the last column.
#[derive(Debug, Clone, PartialEq)]
pub struct CleanedTable {
    /// Column names, target last
    pub columns: Vec<String>,
    /// Row-major data; every row has `columns.len()` values
    pub rows: Vec<Vec<f64>>,
}

impl CleanedTable {
    /// Number of rows.
    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    /// Number of columns, target included.
    pub fn n_columns(&self) -> usize {
        self.columns.len()
    }

    /// Index of the target column (always the last).
    pub fn target_index(&self) -> usize {
        self.columns.len() - 1
    }

    /// Target values in row order.
    pub fn targets(&self) -> Vec<f64> {
        let t = self.target_index();
        self.rows.iter().map(|row| row[t]).collect()
    }
}

/// Result of one cleaning pass.
#[derive(Debug, Clone)]
pub struct CleanOutput {
    /// Encoded feature table, target last
    pub table: CleanedTable,
    /// Fitted min-max parameters for the numeric columns
    pub scaler: ScalerState,
    /// Non-closed records routed out of training
    pub active_listings: Vec<ListingRecord>,
    /// Closed rows discarded by the outlier trim
    pub trimmed_rows: usize,
}

/// Intermediate parsed row, pre-scaling and pre-encoding.
struct ParsedRow {
    home_age: f64,
    county: String,
    style: String,
    lot_size: f64,
    beds: f64,
    baths_full: f64,
    baths_half: f64,
    levels: f64,
    fireplaces: f64,
    basement: f64,
    season: Season,
    list_price: f64,
    close_price: f64,
    concessions: f64,
}

impl ParsedRow {
    fn delta(&self) -> f64 {
        self.close_price + self.concessions - self.list_price
    }
}

/// Cleaning-stage component.
#[derive(Debug, Clone)]
pub struct FeatureCleaner {
    selection: FeatureSelection,
    outlier_threshold: f64,
    reference_year: i32,
}

impl FeatureCleaner {
    /// Create a cleaner.
    ///
    /// `reference_year` anchors the home-age derivation; `None` uses the
    /// current calendar year.
    pub fn new(
        selection: FeatureSelection,
        outlier_threshold: f64,
        reference_year: Option<i32>,
    ) -> Result<Self> {
        if !(outlier_threshold > 0.0 && outlier_threshold < 0.5) {
            return Err(PipelineError::Configuration(format!(
                "outlier_threshold must be in (0, 0.5), got {outlier_threshold}"
            )));
        }
        Ok(Self {
            selection,
            outlier_threshold,
            reference_year: reference_year.unwrap_or_else(|| chrono::Local::now().year()),
        })
    }

    /// Run the full cleaning pass over raw records.
    pub fn clean(&self, records: &[ListingRecord]) -> Result<CleanOutput> {
        // Step 1: realized sales only; everything else is a side output.
        let (closed, active): (Vec<_>, Vec<_>) =
            records.iter().cloned().partition(|r| r.is_closed());

        let mut parsed = Vec::with_capacity(closed.len());
        for record in &closed {
            parsed.push(self.parse_record(record)?);
        }

        // Step 7: symmetric trim on the list-to-close delta.
        let before = parsed.len();
        let retained = trim_outliers(parsed, self.outlier_threshold);
        let trimmed_rows = before - retained.len();

        // Step 10: fit scalers over the cleaned (pre-balance) population.
        let mut scaler = ScalerState::new();
        let mut numeric_scalers = Vec::with_capacity(NUMERIC_COLUMNS.len());
        for &column in NUMERIC_COLUMNS {
            let values: Vec<f64> = retained.iter().map(|r| numeric_value(r, column)).collect();
            let fitted = ColumnScaler::fit(&values);
            scaler.push(column, fitted);
            numeric_scalers.push(fitted);
        }
        let targets: Vec<f64> = retained.iter().map(|r| r.close_price).collect();
        let target_scaler = ColumnScaler::fit(&targets);
        scaler.push(TARGET_COLUMN, target_scaler);

        // Step 11: deterministic one-hot vocabularies per included family.
        let counties: BTreeSet<String> = retained.iter().map(|r| r.county.clone()).collect();
        let styles: BTreeSet<String> = retained.iter().map(|r| r.style.clone()).collect();
        let seasons: BTreeSet<Season> = retained.iter().map(|r| r.season).collect();

        let mut columns: Vec<String> = NUMERIC_COLUMNS.iter().map(|c| c.to_string()).collect();
        columns.push(BASEMENT_COLUMN.to_string());
        if self.selection.include_county {
            columns.extend(counties.iter().map(|c| format!("County_{c}")));
        }
        if self.selection.include_style {
            columns.extend(styles.iter().map(|s| format!("Style_{s}")));
        }
        if self.selection.include_season {
            columns.extend(seasons.iter().map(|s| format!("Close Season_{}", s.label())));
        }
        // Step 12: target last.
        columns.push(TARGET_COLUMN.to_string());

        let mut rows = Vec::with_capacity(retained.len());
        for row in &retained {
            let mut out = Vec::with_capacity(columns.len());
            for (&column, s) in NUMERIC_COLUMNS.iter().zip(&numeric_scalers) {
                out.push(s.transform(numeric_value(row, column)));
            }
            out.push(row.basement);
            if self.selection.include_county {
                for county in &counties {
                    out.push(if row.county == *county { 1.0 } else { 0.0 });
                }
            }
            if self.selection.include_style {
                for style in &styles {
                    out.push(if row.style == *style { 1.0 } else { 0.0 });
                }
            }
            if self.selection.include_season {
                for season in &seasons {
                    out.push(if row.season == *season { 1.0 } else { 0.0 });
                }
            }
            out.push(target_scaler.transform(row.close_price));
            rows.push(out);
        }

        log::info!(
            "Cleaned {} closed rows into {} features ({} trimmed, {} active routed out)",
            retained.len(),
            columns.len() - 1,
            trimmed_rows,
            active.len()
        );

        Ok(CleanOutput {
            table: CleanedTable { columns, rows },
            scaler,
            active_listings: active,
            trimmed_rows,
        })
    }

    /// Steps 2-6 and 9 for a single record.
    fn parse_record(&self, record: &ListingRecord) -> Result<ParsedRow> {
        let year_built = parse_count(record::COL_YEAR_BUILT, &record.year_built)?;
        // Step 4: a zero year means unknown, which clamps age to 0.
        let home_age = if year_built == 0.0 {
            0.0
        } else {
            f64::from(self.reference_year) - year_built
        };

        Ok(ParsedRow {
            home_age,
            county: record.county.clone().unwrap_or_default(),
            style: primary_style(&record.style),
            lot_size: parse_count(record::COL_LOT_SIZE, &record.lot_size)?,
            beds: parse_count(record::COL_BEDS, &record.beds)?,
            baths_full: parse_count(record::COL_BATHS_FULL, &record.baths_full)?,
            baths_half: parse_count(record::COL_BATHS_HALF, &record.baths_half)?,
            levels: parse_count(record::COL_LEVELS, &record.levels)?,
            fireplaces: parse_count(record::COL_FIREPLACES, &record.fireplaces)?,
            basement: parse_basement(&record.basement)?,
            season: parse_season(&record.close_date)?,
            list_price: parse_currency(record::COL_LIST_PRICE, &record.list_price)?,
            close_price: parse_currency(record::COL_CLOSE_PRICE, &record.close_price)?,
            concessions: parse_currency(record::COL_CONCESSIONS, &record.concessions)?,
        })
    }
}

fn numeric_value(row: &ParsedRow, column: &str) -> f64 {
    match column {
        "Home Age" => row.home_age,
        "Lot Size SqFt" => row.lot_size,
        "Beds" => row.beds,
        "Bathrooms Full" => row.baths_full,
        "Bathrooms Half" => row.baths_half,
        "Levels/Stories" => row.levels,
        "Fireplaces Total" => row.fireplaces,
        other => unreachable!("unknown numeric column '{other}'"),
    }
}

/// Step 3: "Colonial/Split Level, Other" -> "Colonial".
fn primary_style(raw: &str) -> String {
    raw.split(',')
        .next()
        .unwrap_or("")
        .split('/')
        .next()
        .unwrap_or("")
        .trim()
        .to_string()
}

/// Step 2 defaulting plus numeric parse: empty cell -> 0.
fn parse_count(field: &str, raw: &str) -> Result<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(0.0);
    }
    finite(trimmed.parse::<f64>().ok()).ok_or_else(|| PipelineError::DataFormat {
        field: field.to_string(),
        value: raw.to_string(),
    })
}

/// Step 6: strip whitespace, currency symbols, thousands separators.
fn parse_currency(field: &str, raw: &str) -> Result<f64> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| *c != '$' && *c != ',')
        .collect();
    let normalized = if cleaned.is_empty() { "0" } else { &cleaned };
    finite(normalized.parse::<f64>().ok()).ok_or_else(|| PipelineError::DataFormat {
        field: field.to_string(),
        value: raw.to_string(),
    })
}

// "NaN" and "inf" are valid f64 literals but garbage as cell values; a
// non-finite number must fail the parse, not flow into the scaler fit.
fn finite(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}

/// Step 5: {Yes, No} -> {1, 0}; missing defaults to 0.
fn parse_basement(raw: &str) -> Result<f64> {
    match raw.trim() {
        "Yes" => Ok(1.0),
        "No" => Ok(0.0),
        "" | "0" => Ok(0.0),
        other => Err(PipelineError::Mapping {
            field: record::COL_BASEMENT.to_string(),
            value: other.to_string(),
        }),
    }
}

/// Step 9: close date -> season.
fn parse_season(raw: &str) -> Result<Season> {
    let date = NaiveDate::parse_from_str(raw.trim(), "%m/%d/%Y").map_err(|_| {
        PipelineError::DataFormat {
            field: record::COL_CLOSE_DATE.to_string(),
            value: raw.to_string(),
        }
    })?;
    Ok(Season::from_month(date.month()))
}

/// Nearest-rank quantile over a sorted slice.
fn nearest_rank_quantile(sorted: &[f64], q: f64) -> f64 {
    debug_assert!(!sorted.is_empty());
    let idx = ((sorted.len() - 1) as f64 * q).round() as usize;
    sorted[idx]
}

/// Step 7: retain rows strictly inside the quantile band of the delta.
///
/// Both quantiles are computed over the same population; boundary rows
/// (exactly at a quantile value) are removed by the strict inequalities.
fn trim_outliers(rows: Vec<ParsedRow>, threshold: f64) -> Vec<ParsedRow> {
    if rows.is_empty() {
        return rows;
    }
    let mut deltas: Vec<f64> = rows.iter().map(ParsedRow::delta).collect();
    deltas.sort_by(|a, b| a.total_cmp(b));

    let bot = nearest_rank_quantile(&deltas, threshold);
    let top = nearest_rank_quantile(&deltas, 1.0 - threshold);

    rows.into_iter()
        .filter(|row| {
            let d = row.delta();
            d > bot && d < top
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primary_style_takes_first_segment_twice() {
        assert_eq!(primary_style("Colonial/Split Level, Other"), "Colonial");
        assert_eq!(primary_style("Rancher"), "Rancher");
        assert_eq!(primary_style(""), "");
        assert_eq!(primary_style("Cape Cod, Colonial"), "Cape Cod");
    }

    #[test]
    fn currency_parsing_normalizes_symbols() {
        assert_eq!(parse_currency("List Price", " $300,000 ").unwrap(), 300000.0);
        assert_eq!(parse_currency("List Price", "").unwrap(), 0.0);
        assert_eq!(parse_currency("List Price", "$0").unwrap(), 0.0);
        assert!(parse_currency("List Price", "N/A").is_err());
    }

    #[test]
    fn count_parsing_defaults_empty_to_zero() {
        assert_eq!(parse_count("Beds", "").unwrap(), 0.0);
        assert_eq!(parse_count("Beds", " 3 ").unwrap(), 3.0);
        assert!(parse_count("Beds", "three").is_err());
    }

    #[test]
    fn non_finite_literals_fail_the_parse() {
        // "NaN" and "inf" satisfy f64::from_str but are not values.
        for raw in ["NaN", "nan", "inf", "-inf", "infinity"] {
            assert!(
                matches!(
                    parse_count("Lot Size SqFt", raw),
                    Err(PipelineError::DataFormat { .. })
                ),
                "count '{raw}' should not parse"
            );
            assert!(
                matches!(
                    parse_currency("Close Price", raw),
                    Err(PipelineError::DataFormat { .. })
                ),
                "currency '{raw}' should not parse"
            );
        }
    }

    #[test]
    fn basement_mapping_is_total() {
        assert_eq!(parse_basement("Yes").unwrap(), 1.0);
        assert_eq!(parse_basement("No").unwrap(), 0.0);
        assert_eq!(parse_basement("").unwrap(), 0.0);
        assert!(matches!(
            parse_basement("Maybe"),
            Err(PipelineError::Mapping { .. })
        ));
    }

    #[test]
    fn seasons_follow_calendar_months() {
        assert_eq!(Season::from_month(12), Season::Winter);
        assert_eq!(Season::from_month(1), Season::Winter);
        assert_eq!(Season::from_month(2), Season::Winter);
        assert_eq!(Season::from_month(3), Season::Spring);
        assert_eq!(Season::from_month(5), Season::Spring);
        assert_eq!(Season::from_month(6), Season::Summer);
        assert_eq!(Season::from_month(8), Season::Summer);
        assert_eq!(Season::from_month(9), Season::Fall);
        assert_eq!(Season::from_month(11), Season::Fall);
    }

    #[test]
    fn unparseable_close_date_is_data_format_error() {
        assert!(matches!(
            parse_season("2024-06-15"),
            Err(PipelineError::DataFormat { .. })
        ));
        assert_eq!(parse_season("06/15/2024").unwrap(), Season::Summer);
    }

    #[test]
    fn nearest_rank_quantile_matches_known_values() {
        let sorted: Vec<f64> = (0..=100).map(f64::from).collect();
        assert_eq!(nearest_rank_quantile(&sorted, 0.0), 0.0);
        assert_eq!(nearest_rank_quantile(&sorted, 0.1), 10.0);
        assert_eq!(nearest_rank_quantile(&sorted, 0.9), 90.0);
        assert_eq!(nearest_rank_quantile(&sorted, 1.0), 100.0);
    }
}
