//! Schema contracts
//!
//! One canonical, versioned output shape per engine name. The registry is
//! fixed at compile time and [`validator`] is its only enforcement point.

pub mod validator;

pub use validator::{validate_records, validate_rows};

/// Top-level keys every rule engine record carries
const RULE_ENGINE_KEYS: &[&str] = &[
    "engine",
    "Company",
    "Year",
    "metrics",
    "flags",
    "severity",
    "explanation",
];

/// Declared output shape for one engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchemaContract {
    pub engine: &'static str,
    pub version: u32,
    pub required_keys: &'static [&'static str],
    /// Full key set of the nested `metrics` map, when declared
    pub metrics: Option<&'static [&'static str]>,
    /// Full key set of the nested `flags` map, when declared
    pub flags: Option<&'static [&'static str]>,
}

pub static CONTRACTS: &[SchemaContract] = &[
    SchemaContract {
        engine: "ratio",
        version: 1,
        required_keys: &["engine", "Company", "Year", "metrics", "derived"],
        metrics: Some(&[
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
        ]),
        flags: None,
    },
    SchemaContract {
        engine: "trend",
        version: 1,
        required_keys: RULE_ENGINE_KEYS,
        metrics: Some(&[
            "current_ratio_change",
            "gross_margin_change",
            "net_margin_change",
            "debt_equity_change",
            "asset_turnover_change",
            "roa_change",
            "roe_change",
        ]),
        flags: Some(&[
            "liquidity_decline",
            "margin_compression",
            "leverage_increase",
            "return_erosion",
            "efficiency_decline",
        ]),
    },
    SchemaContract {
        engine: "cash_flow",
        version: 1,
        required_keys: RULE_ENGINE_KEYS,
        metrics: Some(&[
            "working_capital",
            "liquidity_ratio",
            "operating_cash_proxy",
            "financing_burden",
        ]),
        flags: Some(&[
            "negative_working_capital",
            "liquidity_shortfall",
            "operating_cash_deficit",
            "financing_strain",
        ]),
    },
    SchemaContract {
        engine: "anomaly",
        version: 1,
        required_keys: RULE_ENGINE_KEYS,
        metrics: Some(&[
            "operating_margin_yoy",
            "net_margin_yoy",
            "roa_yoy",
            "roe_yoy",
            "debt_equity_yoy",
            "asset_turnover_yoy",
        ]),
        flags: Some(&[
            "sharp_ratio_movement",
            "liquidity_vs_profitability",
            "activity_without_returns",
            "leverage_pressure",
        ]),
    },
    SchemaContract {
        engine: "solvency",
        version: 1,
        required_keys: RULE_ENGINE_KEYS,
        metrics: Some(&["debt_equity", "interest_coverage", "roa", "roe"]),
        flags: Some(&["leverage_risk", "coverage_risk", "return_risk"]),
    },
    SchemaContract {
        engine: "composite_risk",
        version: 1,
        required_keys: &[
            "engine",
            "Company",
            "Year",
            "score",
            "band",
            "breakdown",
            "drivers",
        ],
        metrics: None,
        flags: None,
    },
];

/// Look up the contract registered for an engine name
pub fn contract_for(engine: &str) -> Option<&'static SchemaContract> {
    CONTRACTS.iter().find(|c| c.engine == engine)
}
