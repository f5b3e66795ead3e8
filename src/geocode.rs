//! County enrichment via a geocoding collaborator.
//!
//! The core only needs one thing from geocoding: given a full address
//! string, a county name or nothing. Everything else (HTTP sessions,
//! rate limits, caching proxies) lives behind the [`CountyResolver`]
//! trait. Lookups are independent per address, so the default batched
//! entry point fans out across a Rayon pool and reassembles results in
//! input order before the cleaner ever sees them.
//!
//! Failure policy: a lookup that errors degrades that one row to a null
//! county. A batch is never aborted by the collaborator.

use crate::error::Result;
use crate::record::ListingRecord;
use rayon::prelude::*;

/// Collaborator that maps a full address to a county name.
pub trait CountyResolver: Send + Sync {
    /// Resolve one address.
    ///
    /// `Ok(None)` means the collaborator answered but found no county.
    /// `Err(GeocodingUnavailable)` means the collaborator itself failed;
    /// batch callers treat that the same as no county.
    fn resolve(&self, address: &str) -> Result<Option<String>>;

    /// Resolve a batch of addresses, preserving input order.
    ///
    /// Lookups run in parallel; per-address failures are logged and
    /// degraded to `None`.
    fn resolve_batch(&self, addresses: &[String]) -> Vec<Option<String>> {
        addresses
            .par_iter()
            .map(|address| match self.resolve(address) {
                Ok(county) => county,
                Err(e) => {
                    log::warn!("County lookup failed for '{address}': {e}");
                    None
                }
            })
            .collect()
    }
}

/// Table-backed resolver.
///
/// Serves lookups from an in-memory address-to-county map. Used for tests
/// and for re-running the pipeline against a previously captured lookup
/// table without touching the network.
#[derive(Debug, Default, Clone)]
pub struct CountyTable {
    entries: std::collections::HashMap<String, String>,
}

impl CountyTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one address-to-county entry.
    pub fn insert(&mut self, address: impl Into<String>, county: impl Into<String>) {
        self.entries.insert(address.into(), county.into());
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl CountyResolver for CountyTable {
    fn resolve(&self, address: &str) -> Result<Option<String>> {
        Ok(self.entries.get(address).cloned())
    }
}

/// Attach counties to raw records using the given resolver.
///
/// `region_suffix` is appended to each address before lookup (the source
/// export omits the state, e.g. `", MD"`). Record order is preserved;
/// unresolved addresses get `county: None`.
pub fn enrich_records(
    records: &[ListingRecord],
    resolver: &dyn CountyResolver,
    region_suffix: &str,
) -> Vec<ListingRecord> {
    let addresses: Vec<String> = records
        .iter()
        .map(|r| format!("{}{}", r.address, region_suffix))
        .collect();

    let counties = resolver.resolve_batch(&addresses);
    let resolved = counties.iter().filter(|c| c.is_some()).count();
    log::info!(
        "County enrichment: {}/{} addresses resolved",
        resolved,
        records.len()
    );

    records
        .iter()
        .zip(counties)
        .map(|(record, county)| {
            let mut enriched = record.clone();
            enriched.county = county;
            enriched
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;

    struct FlakyResolver;

    impl CountyResolver for FlakyResolver {
        fn resolve(&self, address: &str) -> Result<Option<String>> {
            if address.starts_with("1 ") {
                Err(PipelineError::GeocodingUnavailable(
                    "connection refused".to_string(),
                ))
            } else {
                Ok(Some("Howard".to_string()))
            }
        }
    }

    fn record_at(address: &str) -> ListingRecord {
        ListingRecord {
            address: address.to_string(),
            status: "Closed".to_string(),
            style: String::new(),
            year_built: String::new(),
            beds: String::new(),
            baths_full: String::new(),
            baths_half: String::new(),
            levels: String::new(),
            fireplaces: String::new(),
            lot_size: String::new(),
            basement: String::new(),
            close_date: String::new(),
            list_price: String::new(),
            close_price: String::new(),
            concessions: String::new(),
            county: None,
        }
    }

    #[test]
    fn failed_lookups_degrade_to_null_county() {
        let records = vec![record_at("1 Main St"), record_at("2 Main St")];
        let enriched = enrich_records(&records, &FlakyResolver, ", MD");

        assert_eq!(enriched.len(), 2);
        assert_eq!(enriched[0].county, None);
        assert_eq!(enriched[1].county, Some("Howard".to_string()));
    }

    #[test]
    fn batch_results_preserve_input_order() {
        let mut table = CountyTable::new();
        for i in 0..50 {
            table.insert(format!("{i} Elm St, MD"), format!("County{i}"));
        }

        let addresses: Vec<String> = (0..50).map(|i| format!("{i} Elm St, MD")).collect();
        let counties = table.resolve_batch(&addresses);

        for (i, county) in counties.iter().enumerate() {
            assert_eq!(county.as_deref(), Some(format!("County{i}").as_str()));
        }
    }

    #[test]
    fn region_suffix_is_applied_before_lookup() {
        let mut table = CountyTable::new();
        table.insert("9 Pine Ct, MD", "Carroll");

        let enriched = enrich_records(&[record_at("9 Pine Ct")], &table, ", MD");
        assert_eq!(enriched[0].county, Some("Carroll".to_string()));
    }
}
