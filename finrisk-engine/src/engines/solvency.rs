//! Solvency engine
//!
//! Point-in-time leverage, coverage and return checks for every Company-Year.

use super::{build_record, classify, render_explanation, EngineInput, FlagEval, FlagSet, RuleEngine, SeverityScale};
use finrisk_common::config::SolvencyThresholds;
use finrisk_common::{EngineKind, EngineRecord, Severity};
use std::collections::BTreeMap;
use tracing::debug;

const SCALE: SeverityScale = &[(2, Severity::Action), (1, Severity::Watch)];

pub struct SolvencyEngine {
    thresholds: SolvencyThresholds,
}

impl SolvencyEngine {
    pub fn new(thresholds: SolvencyThresholds) -> Self {
        Self { thresholds }
    }
}

impl RuleEngine for SolvencyEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Solvency
    }

    fn evaluate(&self, input: &EngineInput) -> Vec<EngineRecord> {
        let t = &self.thresholds;

        input
            .ratios
            .iter()
            .map(|record| {
                let r = &record.metrics;

                let mut flags = FlagSet::new();
                flags
                    .set("leverage_risk", FlagEval::above(r.debt_equity, t.debt_equity_max))
                    .set(
                        "coverage_risk",
                        FlagEval::below(r.interest_coverage, t.interest_coverage_min),
                    )
                    .set(
                        "return_risk",
                        FlagEval::any([
                            FlagEval::below(r.roa, t.roa_min),
                            FlagEval::below(r.roe, t.roe_min),
                        ]),
                    );

                let mut sentences = Vec::new();
                if flags.is_triggered("leverage_risk") {
                    sentences.push("Debt levels are high.");
                }
                if flags.is_triggered("coverage_risk") {
                    sentences.push("Interest coverage is weak.");
                }
                if flags.is_triggered("return_risk") {
                    sentences.push("Returns on assets or equity are below expectations.");
                }

                let severity = classify(flags.triggered_count(), SCALE);
                let incomplete = flags.incomplete();
                let explanation =
                    render_explanation(&sentences, "Solvency indicators are healthy.", &incomplete);

                let metrics: BTreeMap<String, Option<f64>> = [
                    ("debt_equity", r.debt_equity),
                    ("interest_coverage", r.interest_coverage),
                    ("roa", r.roa),
                    ("roe", r.roe),
                ]
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect();

                debug!(
                    company = %record.company,
                    year = record.year,
                    %severity,
                    ?incomplete,
                    "Solvency evaluated"
                );

                build_record(
                    EngineKind::Solvency,
                    &record.company,
                    record.year,
                    metrics,
                    &flags,
                    severity,
                    explanation,
                    None,
                )
            })
            .collect()
    }
}
