//! Cash flow engine
//!
//! Reads normalized statement lines directly rather than derived ratios, so
//! it stays independent of the ratio engine's aggregation choices.

use super::{build_record, classify, render_explanation, EngineInput, FlagEval, FlagSet, RuleEngine, SeverityScale};
use crate::ratio::{group_statements, safe_ratio};
use finrisk_common::config::CashFlowThresholds;
use finrisk_common::records::{CashFlowExtension, CashFlowPattern, EngineExtension};
use finrisk_common::{Category, EngineKind, EngineRecord, Severity};
use std::collections::BTreeMap;
use tracing::debug;

const SCALE: SeverityScale = &[(2, Severity::Action), (1, Severity::Watch)];

pub struct CashFlowEngine {
    thresholds: CashFlowThresholds,
}

impl CashFlowEngine {
    pub fn new(thresholds: CashFlowThresholds) -> Self {
        Self { thresholds }
    }
}

impl RuleEngine for CashFlowEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::CashFlow
    }

    fn evaluate(&self, input: &EngineInput) -> Vec<EngineRecord> {
        let t = &self.thresholds;
        let mut records = Vec::new();

        for (key, statement) in group_statements(&input.lines) {
            let current_assets = statement.amount(&Category::Assets, "Current Assets");
            let current_liabilities = statement.amount(&Category::Liabilities, "Current Liabilities");
            let revenue = statement.amount(&Category::Revenue, "Revenue");
            let cogs = statement.amount(&Category::Expenses, "COGS");
            let opex = statement.amount(&Category::Expenses, "Operating Expenses");
            let finance_costs = statement.amount(&Category::Expenses, "Finance Costs");
            let tax = statement.tax();

            let working_capital = match (current_assets, current_liabilities) {
                (Some(ca), Some(cl)) => Some(ca - cl),
                _ => None,
            };
            let liquidity_ratio = safe_ratio(current_assets, current_liabilities);
            let operating_cash_proxy = match (revenue, cogs, opex, tax) {
                (Some(r), Some(c), Some(o), Some(tx)) => Some(r - c - o - tx),
                _ => None,
            };
            let financing_burden = safe_ratio(finance_costs, revenue);

            let mut flags = FlagSet::new();
            flags
                .set("negative_working_capital", FlagEval::below(working_capital, 0.0))
                .set("liquidity_shortfall", FlagEval::below(liquidity_ratio, t.liquidity_min))
                .set("operating_cash_deficit", FlagEval::below(operating_cash_proxy, 0.0))
                .set(
                    "financing_strain",
                    FlagEval::above(financing_burden, t.financing_burden_max),
                );

            let pattern = if flags.is_triggered("operating_cash_deficit") {
                CashFlowPattern::Burning
            } else if flags.triggered_count() > 0 {
                CashFlowPattern::Strained
            } else {
                CashFlowPattern::Healthy
            };

            let sentences: Vec<&str> = [
                ("negative_working_capital", "Current liabilities exceed current assets."),
                ("liquidity_shortfall", "Short-term liquidity is below the required minimum."),
                ("operating_cash_deficit", "Operations are consuming cash."),
                ("financing_strain", "Finance costs weigh heavily on revenue."),
            ]
            .into_iter()
            .filter(|(flag, _)| flags.is_triggered(flag))
            .map(|(_, sentence)| sentence)
            .collect();

            let severity = classify(flags.triggered_count(), SCALE);
            let explanation =
                render_explanation(&sentences, "Cash flow position is healthy.", &flags.incomplete());

            let metrics: BTreeMap<String, Option<f64>> = [
                ("working_capital", working_capital),
                ("liquidity_ratio", liquidity_ratio),
                ("operating_cash_proxy", operating_cash_proxy),
                ("financing_burden", financing_burden),
            ]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();

            debug!(
                company = %key.company,
                year = key.year,
                ?pattern,
                %severity,
                "Cash flow evaluated"
            );

            records.push(build_record(
                EngineKind::CashFlow,
                &key.company,
                key.year,
                metrics,
                &flags,
                severity,
                explanation,
                Some(EngineExtension::CashFlow(CashFlowExtension { pattern })),
            ));
        }

        records
    }
}
