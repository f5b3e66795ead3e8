//! Target-distribution balancing across fixed-width buckets.
//!
//! The target range is partitioned into `bucket_count` contiguous
//! intervals of width `1 / bucket_count`, with the first boundary placed
//! one step above the minimum observed target. Each row belongs to
//! exactly one half-open interval `(prev, boundary]`; the minimum target
//! itself is assigned to the first bucket.
//!
//! The per-bucket cap (`limit`) equals the count of the *largest* bucket.
//! This is deliberate, preserved behavior: the cap is a no-op for the
//! majority bucket and passes every row through elsewhere, so the
//! balancer truncates but does not equalize. Switching to a
//! cap-by-minimum policy would change the training distribution and is a
//! product decision, not a code fix.

use crate::cleaner::CleanedTable;
use crate::error::{PipelineError, Result};

/// Per-bucket summary for reporting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BucketSummary {
    /// Inclusive upper boundary of the bucket interval
    pub upper: f64,
    /// Rows whose target fell in the interval
    pub count: usize,
    /// Rows actually emitted after the cap and the non-finite drop
    pub kept: usize,
}

/// Result of a balancing pass.
#[derive(Debug, Clone)]
pub struct BalanceOutput {
    /// Re-sampled table; row order still follows bucket order and must be
    /// shuffled before splitting
    pub table: CleanedTable,
    /// Per-bucket counts in ascending boundary order
    pub buckets: Vec<BucketSummary>,
    /// The cap applied to every bucket (largest bucket's count)
    pub limit: usize,
}

/// Distribution balancer over target-value buckets.
#[derive(Debug, Clone, Copy)]
pub struct DistributionBalancer {
    bucket_count: usize,
}

impl DistributionBalancer {
    /// Create a balancer with the given bucket count.
    pub fn new(bucket_count: usize) -> Result<Self> {
        if bucket_count == 0 {
            return Err(PipelineError::Configuration(
                "bucket_count must be positive".to_string(),
            ));
        }
        Ok(Self { bucket_count })
    }

    /// Re-sample the cleaned table so the target range is evenly bucketed.
    pub fn balance(&self, table: &CleanedTable) -> Result<BalanceOutput> {
        if table.rows.is_empty() {
            return Ok(BalanceOutput {
                table: CleanedTable {
                    columns: table.columns.clone(),
                    rows: Vec::new(),
                },
                buckets: Vec::new(),
                limit: 0,
            });
        }

        let targets = table.targets();
        let min = targets.iter().copied().fold(f64::INFINITY, f64::min);

        let step = 1.0 / self.bucket_count as f64;
        let boundaries: Vec<f64> = (1..=self.bucket_count)
            .map(|i| min + step * i as f64)
            .collect();

        // Assign each row to the first interval whose boundary covers it.
        // The final bucket also absorbs any float residue at the maximum.
        let assignment: Vec<usize> = targets
            .iter()
            .map(|&t| {
                boundaries
                    .iter()
                    .position(|&b| t <= b)
                    .unwrap_or(self.bucket_count - 1)
            })
            .collect();

        let mut member_rows: Vec<Vec<usize>> = vec![Vec::new(); self.bucket_count];
        for (row, &bucket) in assignment.iter().enumerate() {
            member_rows[bucket].push(row);
        }

        // Cap = the largest bucket's count, applied uniformly.
        let limit = member_rows.iter().map(Vec::len).max().unwrap_or(0);

        let mut buckets = Vec::with_capacity(self.bucket_count);
        let mut rows = Vec::new();
        for (members, &upper) in member_rows.iter().zip(&boundaries) {
            let take = members.len().min(limit);
            // First `limit` rows in table order; no random sampling here.
            let mut kept = 0;
            for &row in &members[..take] {
                let candidate = &table.rows[row];
                // dropna analog: discard rows carrying non-finite values.
                if candidate.iter().all(|v| v.is_finite()) {
                    rows.push(candidate.clone());
                    kept += 1;
                }
            }
            buckets.push(BucketSummary {
                upper,
                count: members.len(),
                kept,
            });
        }

        log::info!(
            "Balanced {} rows into {} buckets (limit {})",
            rows.len(),
            self.bucket_count,
            limit
        );

        Ok(BalanceOutput {
            table: CleanedTable {
                columns: table.columns.clone(),
                rows,
            },
            buckets,
            limit,
        })
    }
}
