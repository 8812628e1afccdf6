//! Engine records and the severity taxonomy
//!
//! Every rule engine emits [`EngineRecord`] rows with one common shape. Engine
//! specific detail lives in the single optional `extension` field, a tagged
//! variant per engine, so consumers keep type safety without open-shaped maps.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ============================================================================
// Engine identifiers
// ============================================================================

/// Engine identifier (serialized as the engine name used in contracts)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    Ratio,
    Trend,
    CashFlow,
    Anomaly,
    Solvency,
    CompositeRisk,
}

impl EngineKind {
    /// The four independent rule engines, in canonical run order
    pub const RULE_ENGINES: [EngineKind; 4] = [
        EngineKind::Trend,
        EngineKind::CashFlow,
        EngineKind::Anomaly,
        EngineKind::Solvency,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EngineKind::Ratio => "ratio",
            EngineKind::Trend => "trend",
            EngineKind::CashFlow => "cash_flow",
            EngineKind::Anomaly => "anomaly",
            EngineKind::Solvency => "solvency",
            EngineKind::CompositeRisk => "composite_risk",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "ratio" => Some(EngineKind::Ratio),
            "trend" => Some(EngineKind::Trend),
            "cash_flow" => Some(EngineKind::CashFlow),
            "anomaly" => Some(EngineKind::Anomaly),
            "solvency" => Some(EngineKind::Solvency),
            "composite_risk" => Some(EngineKind::CompositeRisk),
            _ => None,
        }
    }

    /// Built-in composite weight, used when client config omits the engine
    pub fn default_weight(self) -> f64 {
        match self {
            EngineKind::Trend
            | EngineKind::CashFlow
            | EngineKind::Anomaly
            | EngineKind::Solvency => 0.25,
            EngineKind::Ratio | EngineKind::CompositeRisk => 0.0,
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Severity taxonomy
// ============================================================================

/// Ordinal severity with a fixed numeric weight table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Stable,
    Normal,
    Info,
    Low,
    Watch,
    Medium,
    High,
    Action,
}

impl Severity {
    /// Numeric weight used by composite aggregation (0-100 scale)
    pub fn score(self) -> f64 {
        match self {
            Severity::Stable | Severity::Normal | Severity::Info => 0.0,
            Severity::Low => 10.0,
            Severity::Watch | Severity::Medium => 30.0,
            Severity::High => 70.0,
            Severity::Action => 90.0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Stable => "stable",
            Severity::Normal => "normal",
            Severity::Info => "info",
            Severity::Low => "low",
            Severity::Watch => "watch",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Action => "action",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Ratio output
// ============================================================================

/// Canonical ratio set for one Company-Year
///
/// `None` means insufficient source data, never zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Ratios {
    pub current_ratio: Option<f64>,
    pub quick_ratio: Option<f64>,
    pub gross_margin: Option<f64>,
    pub operating_margin: Option<f64>,
    pub net_margin: Option<f64>,
    pub debt_equity: Option<f64>,
    pub interest_coverage: Option<f64>,
    pub asset_turnover: Option<f64>,
    pub roa: Option<f64>,
    pub roe: Option<f64>,
}

impl Ratios {
    pub const NAMES: [&'static str; 10] = [
        "current_ratio",
        "quick_ratio",
        "gross_margin",
        "operating_margin",
        "net_margin",
        "debt_equity",
        "interest_coverage",
        "asset_turnover",
        "roa",
        "roe",
    ];

    /// Look up a ratio by canonical name (unknown names yield `None`)
    pub fn get(&self, name: &str) -> Option<f64> {
        match name {
            "current_ratio" => self.current_ratio,
            "quick_ratio" => self.quick_ratio,
            "gross_margin" => self.gross_margin,
            "operating_margin" => self.operating_margin,
            "net_margin" => self.net_margin,
            "debt_equity" => self.debt_equity,
            "interest_coverage" => self.interest_coverage,
            "asset_turnover" => self.asset_turnover,
            "roa" => self.roa,
            "roe" => self.roe,
            _ => None,
        }
    }

    pub fn to_map(&self) -> BTreeMap<String, Option<f64>> {
        Self::NAMES
            .iter()
            .map(|name| (name.to_string(), self.get(name)))
            .collect()
    }
}

/// Intermediate aggregates the ratios were derived from
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DerivedAmounts {
    pub total_assets: Option<f64>,
    pub total_liabilities: Option<f64>,
    pub operating_profit: Option<f64>,
    pub net_income: Option<f64>,
}

/// RatioEngine output row (one per Company-Year)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatioRecord {
    pub engine: EngineKind,
    #[serde(rename = "Company")]
    pub company: String,
    #[serde(rename = "Year")]
    pub year: i32,
    pub metrics: Ratios,
    pub derived: DerivedAmounts,
}

// ============================================================================
// Rule engine output
// ============================================================================

/// Standardized rule engine output row
///
/// Uniquely keyed by (engine, Company, Year); created once per run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineRecord {
    pub engine: EngineKind,
    #[serde(rename = "Company")]
    pub company: String,
    #[serde(rename = "Year")]
    pub year: i32,
    pub metrics: BTreeMap<String, Option<f64>>,
    pub flags: BTreeMap<String, bool>,
    pub severity: Severity,
    pub explanation: String,
    /// Flags that could not be evaluated because an input metric was null
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub data_incomplete: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension: Option<EngineExtension>,
}

/// Engine-specific payload attached to an [`EngineRecord`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EngineExtension {
    Trend(TrendExtension),
    CashFlow(CashFlowExtension),
    Anomaly(AnomalyExtension),
}

/// Direction of a year-over-year ratio move
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
    Flat,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrendPoint {
    pub value: f64,
    pub previous: f64,
    pub change: f64,
    pub direction: Direction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendExtension {
    pub years_observed: usize,
    pub previous_year: i32,
    /// Per-ratio movement; `None` when either year lacks the ratio
    pub trends: BTreeMap<String, Option<TrendPoint>>,
}

/// Overall cash flow health classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CashFlowPattern {
    Healthy,
    Strained,
    Burning,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CashFlowExtension {
    pub pattern: CashFlowPattern,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyExtension {
    pub previous_year: Option<i32>,
    pub anomalies: Vec<String>,
}

// ============================================================================
// Composite output
// ============================================================================

/// Final composite risk classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskBand {
    Low,
    Medium,
    High,
}

/// One aggregated risk record per Company-Year
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeRiskRecord {
    pub engine: EngineKind,
    #[serde(rename = "Company")]
    pub company: String,
    #[serde(rename = "Year")]
    pub year: i32,
    /// Normalized score on a 0-100 scale, rounded to one decimal
    pub score: f64,
    pub band: RiskBand,
    /// Weighted score contributed by each reporting engine
    pub breakdown: BTreeMap<String, f64>,
    pub drivers: Vec<String>,
}

/// Non-fatal notice that a source line was absent for a key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingDataWarning {
    pub company: String,
    pub year: i32,
    pub item: &'static str,
}

impl fmt::Display for MissingDataWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: missing source line {}", self.company, self.year, self.item)
    }
}
