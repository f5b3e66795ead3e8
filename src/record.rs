//! Raw listing records and the fixed source-schema CSV contract.
//!
//! The input is a tabular export with a fixed set of expected columns. The
//! exact header names are a contract with the source system, not something
//! configurable; a missing required column is a schema failure for the whole
//! file. Header cells are trimmed on read because the source export carries
//! a trailing space on the concessions column.
//!
//! Three CSV surfaces live here:
//!
//! - the raw export (no county column),
//! - the enriched with-counties table persisted after geocoding so lookups
//!   are not repeated across runs,
//! - the active-listings side output (non-closed rows routed out of
//!   training).

use crate::error::{PipelineError, Result};
use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

/// Full street address
pub const COL_ADDRESS: &str = "Full Street Address";
/// Listing status
pub const COL_STATUS: &str = "Status";
/// Free-text style, possibly compound
pub const COL_STYLE: &str = "Style";
/// Construction year, 0 when unknown
pub const COL_YEAR_BUILT: &str = "Year Built";
/// Bedroom count
pub const COL_BEDS: &str = "Beds";
/// Full bathroom count
pub const COL_BATHS_FULL: &str = "Bathrooms Full";
/// Half bathroom count
pub const COL_BATHS_HALF: &str = "Bathrooms Half";
/// Story count
pub const COL_LEVELS: &str = "Levels/Stories";
/// Fireplace count
pub const COL_FIREPLACES: &str = "Fireplaces Total";
/// Lot size in square feet
pub const COL_LOT_SIZE: &str = "Lot Size SqFt";
/// Basement yes/no flag
pub const COL_BASEMENT: &str = "Basement YN";
/// Sale close date, `%m/%d/%Y`
pub const COL_CLOSE_DATE: &str = "Close Date";
/// Listing price, currency-formatted
pub const COL_LIST_PRICE: &str = "List Price";
/// Closing price, currency-formatted
pub const COL_CLOSE_PRICE: &str = "Close Price";
/// Buyer concessions, currency-formatted
pub const COL_CONCESSIONS: &str = "Concessions Amt";
/// County attached by geocoding (enriched table only)
pub const COL_COUNTY: &str = "County";

/// Status value marking a completed sale.
pub const STATUS_CLOSED: &str = "Closed";

const RAW_COLUMNS: &[&str] = &[
    COL_ADDRESS,
    COL_STATUS,
    COL_STYLE,
    COL_YEAR_BUILT,
    COL_BEDS,
    COL_BATHS_FULL,
    COL_BATHS_HALF,
    COL_LEVELS,
    COL_FIREPLACES,
    COL_LOT_SIZE,
    COL_BASEMENT,
    COL_CLOSE_DATE,
    COL_LIST_PRICE,
    COL_CLOSE_PRICE,
    COL_CONCESSIONS,
];

/// One raw listing row.
///
/// Fields are kept as the raw strings from the export; all parsing and
/// defaulting is the cleaner's responsibility. Records are immutable once
/// loaded, apart from county attachment during enrichment.
#[derive(Debug, Clone, PartialEq)]
pub struct ListingRecord {
    /// Full street address
    pub address: String,
    /// Listing status ("Closed", "Active", ...)
    pub status: String,
    /// Free-text style, possibly compound ("Colonial/Split Level, Other")
    pub style: String,
    /// Raw year-built cell
    pub year_built: String,
    /// Raw bed count cell
    pub beds: String,
    /// Raw full-bath count cell
    pub baths_full: String,
    /// Raw half-bath count cell
    pub baths_half: String,
    /// Raw levels cell
    pub levels: String,
    /// Raw fireplace count cell
    pub fireplaces: String,
    /// Raw lot size cell
    pub lot_size: String,
    /// Raw basement flag cell ("Yes"/"No")
    pub basement: String,
    /// Raw close date cell
    pub close_date: String,
    /// Raw list price cell
    pub list_price: String,
    /// Raw close price cell
    pub close_price: String,
    /// Raw concessions cell
    pub concessions: String,
    /// County resolved by geocoding; `None` until enrichment, and for
    /// addresses the collaborator could not resolve
    pub county: Option<String>,
}

impl ListingRecord {
    /// Whether this listing represents a completed sale.
    pub fn is_closed(&self) -> bool {
        self.status == STATUS_CLOSED
    }
}

/// Map of trimmed header name to column index.
fn header_index(headers: &csv::StringRecord, required: &[&str]) -> Result<HashMap<String, usize>> {
    let mut index = HashMap::new();
    for (i, cell) in headers.iter().enumerate() {
        index.insert(cell.trim().to_string(), i);
    }
    for col in required {
        if !index.contains_key(*col) {
            return Err(PipelineError::Schema {
                column: (*col).to_string(),
            });
        }
    }
    Ok(index)
}

fn field(
    record: &csv::StringRecord,
    index: &HashMap<String, usize>,
    column: &str,
) -> Result<String> {
    let i = *index.get(column).ok_or_else(|| PipelineError::Schema {
        column: column.to_string(),
    })?;
    // A short row is a structural failure, not a missing value.
    let value = record.get(i).ok_or_else(|| PipelineError::Schema {
        column: column.to_string(),
    })?;
    Ok(value.to_string())
}

fn record_from_row(
    row: &csv::StringRecord,
    index: &HashMap<String, usize>,
    with_county: bool,
) -> Result<ListingRecord> {
    let county = if with_county {
        let value = field(row, index, COL_COUNTY)?;
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    } else {
        None
    };

    Ok(ListingRecord {
        address: field(row, index, COL_ADDRESS)?,
        status: field(row, index, COL_STATUS)?,
        style: field(row, index, COL_STYLE)?,
        year_built: field(row, index, COL_YEAR_BUILT)?,
        beds: field(row, index, COL_BEDS)?,
        baths_full: field(row, index, COL_BATHS_FULL)?,
        baths_half: field(row, index, COL_BATHS_HALF)?,
        levels: field(row, index, COL_LEVELS)?,
        fireplaces: field(row, index, COL_FIREPLACES)?,
        lot_size: field(row, index, COL_LOT_SIZE)?,
        basement: field(row, index, COL_BASEMENT)?,
        close_date: field(row, index, COL_CLOSE_DATE)?,
        list_price: field(row, index, COL_LIST_PRICE)?,
        close_price: field(row, index, COL_CLOSE_PRICE)?,
        concessions: field(row, index, COL_CONCESSIONS)?,
        county,
    })
}

fn read_csv<P: AsRef<Path>>(path: P, with_county: bool) -> Result<Vec<ListingRecord>> {
    let file = File::open(path)?;
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(file);

    let mut required: Vec<&str> = RAW_COLUMNS.to_vec();
    if with_county {
        required.push(COL_COUNTY);
    }
    let index = header_index(reader.headers()?, &required)?;

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row?;
        records.push(record_from_row(&row, &index, with_county)?);
    }
    Ok(records)
}

/// Read the raw source export (no county column).
pub fn read_raw_csv<P: AsRef<Path>>(path: P) -> Result<Vec<ListingRecord>> {
    read_csv(path, false)
}

/// Read a previously enriched with-counties table.
pub fn read_enriched_csv<P: AsRef<Path>>(path: P) -> Result<Vec<ListingRecord>> {
    read_csv(path, true)
}

fn write_csv<P: AsRef<Path>>(
    path: P,
    records: &[ListingRecord],
    with_county: bool,
) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = csv::Writer::from_writer(file);

    let mut headers: Vec<&str> = RAW_COLUMNS.to_vec();
    if with_county {
        headers.push(COL_COUNTY);
    }
    writer.write_record(&headers)?;

    for r in records {
        let mut row: Vec<&str> = vec![
            &r.address,
            &r.status,
            &r.style,
            &r.year_built,
            &r.beds,
            &r.baths_full,
            &r.baths_half,
            &r.levels,
            &r.fireplaces,
            &r.lot_size,
            &r.basement,
            &r.close_date,
            &r.list_price,
            &r.close_price,
            &r.concessions,
        ];
        if with_county {
            row.push(r.county.as_deref().unwrap_or(""));
        }
        writer.write_record(&row)?;
    }
    writer.flush()?;
    Ok(())
}

/// Persist the with-counties table so geocoding is not repeated.
pub fn write_enriched_csv<P: AsRef<Path>>(path: P, records: &[ListingRecord]) -> Result<()> {
    write_csv(path, records, true)
}

/// Persist non-closed rows routed out of training.
pub fn write_active_listings<P: AsRef<Path>>(path: P, records: &[ListingRecord]) -> Result<()> {
    write_csv(path, records, false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sample_record() -> ListingRecord {
        ListingRecord {
            address: "12 Oak Ln".to_string(),
            status: "Closed".to_string(),
            style: "Colonial/Split Level, Other".to_string(),
            year_built: "1990".to_string(),
            beds: "3".to_string(),
            baths_full: "2".to_string(),
            baths_half: "1".to_string(),
            levels: "2".to_string(),
            fireplaces: "1".to_string(),
            lot_size: "8000".to_string(),
            basement: "Yes".to_string(),
            close_date: "06/15/2024".to_string(),
            list_price: "$300,000".to_string(),
            close_price: "$295,000".to_string(),
            concessions: "$5,000".to_string(),
            county: Some("Howard".to_string()),
        }
    }

    #[test]
    fn enriched_round_trip_preserves_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("enriched.csv");

        let records = vec![sample_record()];
        write_enriched_csv(&path, &records).unwrap();
        let loaded = read_enriched_csv(&path).unwrap();

        assert_eq!(loaded, records);
    }

    #[test]
    fn trailing_space_headers_are_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raw.csv");

        let mut file = File::create(&path).unwrap();
        writeln!(
            file,
            "Full Street Address,Status,Style,Year Built,Beds,Bathrooms Full,\
             Bathrooms Half,Levels/Stories,Fireplaces Total,Lot Size SqFt,\
             Basement YN,Close Date,List Price,Close Price,Concessions Amt "
        )
        .unwrap();
        writeln!(
            file,
            "1 Main St,Closed,Rancher,1970,3,1,0,1,0,6000,No,01/02/2024,\
             \"$200,000\",\"$198,000\",$0"
        )
        .unwrap();

        let records = read_raw_csv(&path).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].concessions, "$0");
        assert!(records[0].county.is_none());
    }

    #[test]
    fn missing_required_column_is_schema_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.csv");

        let mut file = File::create(&path).unwrap();
        writeln!(file, "Full Street Address,Status").unwrap();
        writeln!(file, "1 Main St,Closed").unwrap();

        match read_raw_csv(&path) {
            Err(crate::error::PipelineError::Schema { .. }) => {}
            other => panic!("expected schema error, got {other:?}"),
        }
    }
}
