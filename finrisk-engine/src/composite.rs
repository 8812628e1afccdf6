//! Composite risk engine
//!
//! Joins rule engine output on the Company-Year key and produces one
//! normalized 0-100 score per key. Keys are the union across engines that
//! ran; an engine that did not report a key adds no weight for it, so a
//! reduced profile still yields a correctly normalized score.

use finrisk_common::config::AnalysisSettings;
use finrisk_common::records::CompositeRiskRecord;
use finrisk_common::{CompanyYear, EngineKind, EngineRecord};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Severity score at or above which a record's explanation becomes a driver
pub const DRIVER_THRESHOLD: f64 = 50.0;

#[derive(Default)]
struct KeyAccumulator {
    weighted_sum: f64,
    total_weight: f64,
    breakdown: BTreeMap<String, f64>,
    drivers: Vec<String>,
}

pub struct CompositeRiskEngine {
    settings: AnalysisSettings,
}

fn round_one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

impl CompositeRiskEngine {
    pub fn new(settings: AnalysisSettings) -> Self {
        Self { settings }
    }

    /// Aggregate validated rule engine output
    ///
    /// `outputs` pairs each engine that ran with its records. Output is
    /// ordered by (Company, Year).
    pub fn aggregate(&self, outputs: &[(EngineKind, &[EngineRecord])]) -> Vec<CompositeRiskRecord> {
        let mut keys: BTreeMap<CompanyYear, KeyAccumulator> = BTreeMap::new();

        for (kind, records) in outputs {
            let weight = self.settings.weight_for(*kind);

            for record in records.iter() {
                let severity_score = record.severity.score();
                let weighted = severity_score * weight;

                let acc = keys
                    .entry(CompanyYear::new(record.company.clone(), record.year))
                    .or_default();
                acc.weighted_sum += weighted;
                acc.total_weight += weight;
                *acc.breakdown.entry(kind.as_str().to_string()).or_insert(0.0) += weighted;
                if severity_score >= DRIVER_THRESHOLD {
                    acc.drivers.push(record.explanation.clone());
                }
            }
        }

        let bands = &self.settings.risk_bands;
        let results: Vec<CompositeRiskRecord> = keys
            .into_iter()
            .map(|(key, acc)| {
                let score = if acc.total_weight > 0.0 {
                    round_one_decimal(acc.weighted_sum / acc.total_weight)
                } else {
                    0.0
                };
                let band = bands.band_for(score);

                debug!(
                    company = %key.company,
                    year = key.year,
                    score,
                    ?band,
                    engines = acc.breakdown.len(),
                    "Composite risk scored"
                );

                CompositeRiskRecord {
                    engine: EngineKind::CompositeRisk,
                    company: key.company,
                    year: key.year,
                    score,
                    band,
                    breakdown: acc.breakdown,
                    drivers: acc.drivers,
                }
            })
            .collect();

        info!(
            engines = outputs.len(),
            keys = results.len(),
            "Composite risk aggregation complete"
        );
        results
    }
}
