//! Anomaly engine
//!
//! Year-over-year percent change per ratio per company, plus structural
//! combinations that are unusual within a single year. Every year gets a
//! record; the first observed year has no prior and is reported as `info`.

use super::{
    build_record, classify, group_by_company, render_explanation, EngineInput, FlagEval, FlagSet,
    RuleEngine, SeverityScale,
};
use finrisk_common::config::AnomalyThresholds;
use finrisk_common::records::{AnomalyExtension, EngineExtension, RatioRecord};
use finrisk_common::{EngineKind, EngineRecord, Severity};
use std::collections::BTreeMap;
use tracing::debug;

/// Ratios held to the margin/return change limit
const MARGIN_RATIOS: [&str; 4] = ["operating_margin", "net_margin", "roa", "roe"];

/// Ratios held to the leverage/turnover change limit
const STRUCTURE_RATIOS: [&str; 2] = ["debt_equity", "asset_turnover"];

const FLAG_NAMES: [&str; 4] = [
    "sharp_ratio_movement",
    "liquidity_vs_profitability",
    "activity_without_returns",
    "leverage_pressure",
];

const SCALE: SeverityScale = &[
    (3, Severity::Action),
    (2, Severity::High),
    (1, Severity::Watch),
];

pub struct AnomalyEngine {
    thresholds: AnomalyThresholds,
}

/// Percent change against the absolute prior value
///
/// `None` when either value is null or the prior is zero.
pub fn percent_change(current: Option<f64>, previous: Option<f64>) -> Option<f64> {
    match (current, previous) {
        (Some(c), Some(p)) if p != 0.0 => Some((c - p) / p.abs()),
        _ => None,
    }
}

fn metric_names() -> impl Iterator<Item = &'static str> {
    MARGIN_RATIOS.into_iter().chain(STRUCTURE_RATIOS)
}

impl AnomalyEngine {
    pub fn new(thresholds: AnomalyThresholds) -> Self {
        Self { thresholds }
    }

    fn limit_for(&self, ratio: &str) -> f64 {
        if STRUCTURE_RATIOS.contains(&ratio) {
            self.thresholds.structure_change_max
        } else {
            self.thresholds.margin_change_max
        }
    }

    fn first_year(&self, record: &RatioRecord) -> EngineRecord {
        let metrics = metric_names().map(|n| (format!("{n}_yoy"), None)).collect();
        EngineRecord {
            engine: EngineKind::Anomaly,
            company: record.company.clone(),
            year: record.year,
            metrics,
            flags: FLAG_NAMES.iter().map(|n| (n.to_string(), false)).collect(),
            severity: Severity::Info,
            explanation: "Insufficient historical data for anomaly detection.".to_string(),
            data_incomplete: Vec::new(),
            extension: Some(EngineExtension::Anomaly(AnomalyExtension {
                previous_year: None,
                anomalies: Vec::new(),
            })),
        }
    }

    fn compare(&self, current: &RatioRecord, previous: &RatioRecord) -> EngineRecord {
        let t = &self.thresholds;

        let yoy: BTreeMap<&str, Option<f64>> = metric_names()
            .map(|name| {
                let change = percent_change(current.metrics.get(name), previous.metrics.get(name));
                (name, change)
            })
            .collect();
        let change = |name: &str| yoy.get(name).copied().flatten();

        let mut anomalies = Vec::new();
        let mut movements = Vec::new();
        for name in metric_names() {
            let eval = FlagEval::at_least(change(name).map(f64::abs), self.limit_for(name));
            if let (FlagEval::Triggered, Some(pct)) = (eval, change(name)) {
                anomalies.push(format!(
                    "{name} moved {:+.1}% year over year.",
                    pct * 100.0
                ));
            }
            movements.push(eval);
        }

        let r = &current.metrics;
        let prior = &previous.metrics;
        let difference = |now: Option<f64>, before: Option<f64>| now.zip(before).map(|(n, b)| n - b);

        let mut flags = FlagSet::new();
        flags
            .set("sharp_ratio_movement", FlagEval::any(movements))
            .set(
                "liquidity_vs_profitability",
                FlagEval::all([
                    FlagEval::above(r.current_ratio, t.liquidity_high),
                    FlagEval::below(r.net_margin, 0.0),
                ]),
            )
            .set(
                "activity_without_returns",
                FlagEval::all([
                    FlagEval::above(difference(r.asset_turnover, prior.asset_turnover), 0.0),
                    FlagEval::below(r.roa, 0.0),
                ]),
            )
            .set(
                "leverage_pressure",
                FlagEval::all([
                    FlagEval::above(difference(r.debt_equity, prior.debt_equity), 0.0),
                    FlagEval::below(r.interest_coverage, t.coverage_floor),
                ]),
            );

        let structural: Vec<&str> = [
            (
                "liquidity_vs_profitability",
                "Strong liquidity coexists with negative profitability.",
            ),
            (
                "activity_without_returns",
                "Asset activity is rising while returns are negative.",
            ),
            (
                "leverage_pressure",
                "Leverage is rising while interest coverage sits below the floor.",
            ),
        ]
        .into_iter()
        .filter(|(flag, _)| flags.is_triggered(flag))
        .map(|(_, sentence)| sentence)
        .collect();

        let severity = classify(anomalies.len() + structural.len(), SCALE);

        let mut sentences = Vec::new();
        if flags.is_triggered("sharp_ratio_movement") {
            sentences.push("Unusual year-over-year ratio movements detected.");
        }
        sentences.extend(structural.iter().copied());
        let explanation = render_explanation(
            &sentences,
            "Efficiency and profitability ratios appear stable.",
            &flags.incomplete(),
        );

        let metrics = yoy
            .iter()
            .map(|(name, value)| (format!("{name}_yoy"), *value))
            .collect();

        debug!(
            company = %current.company,
            year = current.year,
            previous_year = previous.year,
            anomalies = anomalies.len(),
            %severity,
            "Anomaly evaluated"
        );

        build_record(
            EngineKind::Anomaly,
            &current.company,
            current.year,
            metrics,
            &flags,
            severity,
            explanation,
            Some(EngineExtension::Anomaly(AnomalyExtension {
                previous_year: Some(previous.year),
                anomalies,
            })),
        )
    }
}

impl RuleEngine for AnomalyEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Anomaly
    }

    fn evaluate(&self, input: &EngineInput) -> Vec<EngineRecord> {
        let mut records = Vec::new();

        for history in group_by_company(&input.ratios).into_values() {
            let mut previous: Option<&RatioRecord> = None;
            for current in history {
                let record = match previous {
                    Some(prior) => self.compare(current, prior),
                    None => self.first_year(current),
                };
                records.push(record);
                previous = Some(current);
            }
        }

        records
    }
}
