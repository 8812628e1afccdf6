//! Ratio sanity gate
//!
//! A statement whose ratios fall outside logical bounds is corrupt, not
//! sparse. The gate aborts the run before any rule engine executes.

use finrisk_common::records::RatioRecord;
use finrisk_common::{Error, Result};
use tracing::error;

fn out_of_bounds(value: Option<f64>, lower: f64, upper: f64) -> bool {
    matches!(value, Some(v) if !(lower..=upper).contains(&v))
}

/// Check one ratio record against the logical bounds
///
/// - operating and gross margin must lie in [-1, 1]
/// - current ratio, if present, must be non-negative
pub fn check_record(record: &RatioRecord) -> Result<()> {
    let metrics = &record.metrics;

    let reason = if out_of_bounds(metrics.operating_margin, -1.0, 1.0) {
        Some("Operating margin outside logical bounds.")
    } else if out_of_bounds(metrics.gross_margin, -1.0, 1.0) {
        Some("Gross margin outside logical bounds.")
    } else if matches!(metrics.current_ratio, Some(v) if v < 0.0) {
        Some("Current ratio cannot be negative.")
    } else {
        None
    };

    match reason {
        Some(reason) => {
            error!(
                company = %record.company,
                year = record.year,
                reason,
                "Ratio sanity gate failed"
            );
            Err(Error::DataIntegrity {
                company: record.company.clone(),
                year: record.year,
                reason: reason.to_string(),
            })
        }
        None => Ok(()),
    }
}

/// Check every record; the first violation aborts
pub fn check_all(records: &[RatioRecord]) -> Result<()> {
    records.iter().try_for_each(check_record)
}
