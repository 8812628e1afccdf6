//! Rule engines - independent, pure evaluators over ratio output
//!
//! Four engines run side by side: trend, cash flow, anomaly and solvency.
//! Each computes named boolean flags against configurable thresholds,
//! classifies severity by counting triggered flags, and renders an
//! explanation from one canned sentence per triggered flag.
//!
//! # Null handling
//! Every comparison is evaluated as a [`FlagEval`]. A null input never
//! triggers a flag and is never silently treated as passing: the flag is
//! reported `false` and its name lands in the record's `data_incomplete` list.

pub mod anomaly;
pub mod cash_flow;
pub mod solvency;
pub mod trend;

use finrisk_common::config::EngineThresholds;
use finrisk_common::records::{EngineExtension, RatioRecord};
use finrisk_common::{EngineKind, EngineRecord, NormalizedLine, Severity};
use std::collections::BTreeMap;
use std::sync::Arc;

pub use anomaly::AnomalyEngine;
pub use cash_flow::CashFlowEngine;
pub use solvency::SolvencyEngine;
pub use trend::TrendEngine;

/// Inputs shared by all rule engines for one run
///
/// Ratio records have already passed the sanity gate and schema validation.
#[derive(Debug, Clone, Default)]
pub struct EngineInput {
    pub ratios: Vec<RatioRecord>,
    pub lines: Vec<NormalizedLine>,
}

/// Rule engine trait - all four engines implement this
pub trait RuleEngine: Send + Sync {
    /// Engine identifier used for contracts, weights and output keys
    fn kind(&self) -> EngineKind;

    /// Evaluate the whole batch
    ///
    /// Must be pure: same input, same records. Keys with too little history
    /// are skipped or reported as `info`, never an error.
    fn evaluate(&self, input: &EngineInput) -> Vec<EngineRecord>;
}

/// Build the engine for a kind with thresholds from the merged config
///
/// Returns `None` for kinds that are not rule engines.
pub fn engine_for(kind: EngineKind, thresholds: &EngineThresholds) -> Option<Arc<dyn RuleEngine>> {
    match kind {
        EngineKind::Trend => Some(Arc::new(TrendEngine::new(thresholds.trend.clone()))),
        EngineKind::CashFlow => Some(Arc::new(CashFlowEngine::new(thresholds.cash_flow.clone()))),
        EngineKind::Anomaly => Some(Arc::new(AnomalyEngine::new(thresholds.anomaly.clone()))),
        EngineKind::Solvency => Some(Arc::new(SolvencyEngine::new(thresholds.solvency.clone()))),
        EngineKind::Ratio | EngineKind::CompositeRisk => None,
    }
}

// ============================================================================
// Null-safe flag evaluation
// ============================================================================

/// Outcome of a single threshold comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagEval {
    Triggered,
    Clear,
    /// An operand was null; the comparison could not be made
    Incomplete,
}

impl FlagEval {
    fn compare(value: Option<f64>, breach: impl Fn(f64) -> bool) -> Self {
        match value {
            Some(v) if breach(v) => FlagEval::Triggered,
            Some(_) => FlagEval::Clear,
            None => FlagEval::Incomplete,
        }
    }

    /// Triggered when `value < threshold`
    pub fn below(value: Option<f64>, threshold: f64) -> Self {
        Self::compare(value, |v| v < threshold)
    }

    /// Triggered when `value > threshold`
    pub fn above(value: Option<f64>, threshold: f64) -> Self {
        Self::compare(value, |v| v > threshold)
    }

    /// Triggered when `value >= threshold`
    pub fn at_least(value: Option<f64>, threshold: f64) -> Self {
        Self::compare(value, |v| v >= threshold)
    }

    /// Triggered when any part triggers; otherwise incomplete if any part is
    pub fn any(parts: impl IntoIterator<Item = FlagEval>) -> Self {
        let mut result = FlagEval::Clear;
        for part in parts {
            match part {
                FlagEval::Triggered => return FlagEval::Triggered,
                FlagEval::Incomplete => result = FlagEval::Incomplete,
                FlagEval::Clear => {}
            }
        }
        result
    }

    /// Clear when any part is clear; otherwise incomplete if any part is
    pub fn all(parts: impl IntoIterator<Item = FlagEval>) -> Self {
        let mut result = FlagEval::Triggered;
        for part in parts {
            match part {
                FlagEval::Clear => return FlagEval::Clear,
                FlagEval::Incomplete => result = FlagEval::Incomplete,
                FlagEval::Triggered => {}
            }
        }
        result
    }

    pub fn is_triggered(self) -> bool {
        self == FlagEval::Triggered
    }
}

/// Ordered set of named flag outcomes for one record
#[derive(Debug, Clone, Default)]
pub struct FlagSet {
    entries: Vec<(&'static str, FlagEval)>,
}

impl FlagSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: &'static str, eval: FlagEval) -> &mut Self {
        self.entries.push((name, eval));
        self
    }

    pub fn is_triggered(&self, name: &str) -> bool {
        self.entries
            .iter()
            .any(|(n, eval)| *n == name && eval.is_triggered())
    }

    pub fn triggered_count(&self) -> usize {
        self.entries.iter().filter(|(_, e)| e.is_triggered()).count()
    }

    /// Flag map as published on the record (`true` only when triggered)
    pub fn to_map(&self) -> BTreeMap<String, bool> {
        self.entries
            .iter()
            .map(|(name, eval)| (name.to_string(), eval.is_triggered()))
            .collect()
    }

    pub fn incomplete(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter(|(_, e)| *e == FlagEval::Incomplete)
            .map(|(name, _)| name.to_string())
            .collect()
    }
}

// ============================================================================
// Severity and explanation
// ============================================================================

/// Severity cut-points: `(minimum count, severity)` in descending order
pub type SeverityScale = &'static [(usize, Severity)];

/// Classify a triggered-flag count against an engine's cut-points
pub fn classify(count: usize, scale: SeverityScale) -> Severity {
    scale
        .iter()
        .find(|(min, _)| count >= *min)
        .map(|(_, severity)| *severity)
        .unwrap_or(Severity::Stable)
}

/// Join triggered sentences, or fall back to the stable sentence
///
/// Flags that could not be evaluated are named in a trailing sentence.
pub fn render_explanation(triggered: &[&str], stable: &str, incomplete: &[String]) -> String {
    let mut text = if triggered.is_empty() {
        stable.to_string()
    } else {
        triggered.join(" ")
    };

    if !incomplete.is_empty() {
        text.push_str(&format!(
            " Insufficient data to evaluate: {}.",
            incomplete.join(", ")
        ));
    }

    text
}

/// Assemble a record from evaluated flags
#[allow(clippy::too_many_arguments)]
pub(crate) fn build_record(
    engine: EngineKind,
    company: &str,
    year: i32,
    metrics: BTreeMap<String, Option<f64>>,
    flags: &FlagSet,
    severity: Severity,
    explanation: String,
    extension: Option<EngineExtension>,
) -> EngineRecord {
    EngineRecord {
        engine,
        company: company.to_string(),
        year,
        metrics,
        flags: flags.to_map(),
        severity,
        explanation,
        data_incomplete: flags.incomplete(),
        extension,
    }
}

/// Ratio records grouped per company, each group sorted by year
pub(crate) fn group_by_company(ratios: &[RatioRecord]) -> BTreeMap<&str, Vec<&RatioRecord>> {
    let mut groups: BTreeMap<&str, Vec<&RatioRecord>> = BTreeMap::new();
    for record in ratios {
        groups.entry(record.company.as_str()).or_default().push(record);
    }
    for group in groups.values_mut() {
        group.sort_by_key(|r| r.year);
    }
    groups
}
