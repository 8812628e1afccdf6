//! Trend engine
//!
//! Compares each company's most recent year against its latest prior observed
//! year. Companies with a single observed year are skipped; that is sparse
//! data, not an error.

use super::{
    build_record, classify, group_by_company, render_explanation, EngineInput, FlagEval, FlagSet,
    RuleEngine, SeverityScale,
};
use finrisk_common::config::TrendThresholds;
use finrisk_common::records::{Direction, EngineExtension, TrendExtension, TrendPoint};
use finrisk_common::{EngineKind, EngineRecord, Severity};
use std::collections::BTreeMap;
use tracing::debug;

/// Ratios tracked across years
pub const TRACKED_RATIOS: [&str; 7] = [
    "current_ratio",
    "gross_margin",
    "net_margin",
    "debt_equity",
    "asset_turnover",
    "roa",
    "roe",
];

const SCALE: SeverityScale = &[(3, Severity::Action), (1, Severity::Watch)];

pub struct TrendEngine {
    thresholds: TrendThresholds,
}

impl TrendEngine {
    pub fn new(thresholds: TrendThresholds) -> Self {
        Self { thresholds }
    }
}

fn trend_point(value: Option<f64>, previous: Option<f64>) -> Option<TrendPoint> {
    let (value, previous) = (value?, previous?);
    let direction = if value > previous {
        Direction::Up
    } else if value < previous {
        Direction::Down
    } else {
        Direction::Flat
    };
    Some(TrendPoint {
        value,
        previous,
        change: value - previous,
        direction,
    })
}

impl RuleEngine for TrendEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Trend
    }

    fn evaluate(&self, input: &EngineInput) -> Vec<EngineRecord> {
        let t = &self.thresholds;
        let mut records = Vec::new();

        for (company, history) in group_by_company(&input.ratios) {
            let (latest, previous) = match history.as_slice() {
                [.., previous, latest] => (*latest, *previous),
                _ => {
                    debug!(company, "Trend skipped: single observed year");
                    continue;
                }
            };

            let trends: BTreeMap<String, Option<TrendPoint>> = TRACKED_RATIOS
                .iter()
                .map(|name| {
                    let point = trend_point(latest.metrics.get(name), previous.metrics.get(name));
                    (name.to_string(), point)
                })
                .collect();

            let change = |name: &str| trends.get(name).copied().flatten().map(|p| p.change);

            let mut flags = FlagSet::new();
            flags
                .set(
                    "liquidity_decline",
                    FlagEval::below(change("current_ratio"), -t.liquidity_decline_max),
                )
                .set(
                    "margin_compression",
                    FlagEval::any([
                        FlagEval::below(change("gross_margin"), -t.margin_decline_max),
                        FlagEval::below(change("net_margin"), -t.margin_decline_max),
                    ]),
                )
                .set(
                    "leverage_increase",
                    FlagEval::above(change("debt_equity"), t.leverage_increase_max),
                )
                .set(
                    "return_erosion",
                    FlagEval::any([
                        FlagEval::below(change("roa"), -t.return_decline_max),
                        FlagEval::below(change("roe"), -t.return_decline_max),
                    ]),
                )
                .set(
                    "efficiency_decline",
                    FlagEval::below(change("asset_turnover"), -t.turnover_decline_max),
                );

            let sentences: Vec<&str> = [
                ("liquidity_decline", "Liquidity has weakened since the prior year."),
                ("margin_compression", "Margins are compressing."),
                ("leverage_increase", "Leverage is rising."),
                ("return_erosion", "Returns on assets or equity are eroding."),
                ("efficiency_decline", "Asset efficiency is declining."),
            ]
            .into_iter()
            .filter(|(flag, _)| flags.is_triggered(flag))
            .map(|(_, sentence)| sentence)
            .collect();

            let severity = classify(flags.triggered_count(), SCALE);
            let explanation =
                render_explanation(&sentences, "Ratio trends are stable.", &flags.incomplete());

            let metrics: BTreeMap<String, Option<f64>> = TRACKED_RATIOS
                .iter()
                .map(|name| (format!("{name}_change"), change(name)))
                .collect();

            debug!(
                company,
                year = latest.year,
                previous_year = previous.year,
                %severity,
                "Trend evaluated"
            );

            records.push(build_record(
                EngineKind::Trend,
                company,
                latest.year,
                metrics,
                &flags,
                severity,
                explanation,
                Some(EngineExtension::Trend(TrendExtension {
                    years_observed: history.len(),
                    previous_year: previous.year,
                    trends,
                })),
            ));
        }

        records
    }
}
