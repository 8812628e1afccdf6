//! Analysis profile registry
//!
//! A profile names the rule engines to run (in order), whether the composite
//! aggregator runs, and which ratios are handed to the narrative stage.

use finrisk_common::{EngineKind, Error, Result};
use std::collections::BTreeMap;

/// Ratios passed to the narrative stage for a profile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricScope {
    All,
    Only(&'static [&'static str]),
}

impl MetricScope {
    pub fn includes(&self, ratio: &str) -> bool {
        match self {
            MetricScope::All => true,
            MetricScope::Only(names) => names.contains(&ratio),
        }
    }

    /// Filter a ratio map down to the scoped names
    pub fn apply(&self, ratios: BTreeMap<String, Option<f64>>) -> BTreeMap<String, Option<f64>> {
        ratios
            .into_iter()
            .filter(|(name, _)| self.includes(name))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalysisProfile {
    pub name: &'static str,
    /// Rule engines in run order
    pub engines: &'static [EngineKind],
    pub composite: bool,
    pub metric_scope: MetricScope,
}

impl AnalysisProfile {
    pub fn runs(&self, engine: EngineKind) -> bool {
        self.engines.contains(&engine)
    }
}

pub const DEFAULT_PROFILE: &str = "full_diagnostic";

pub static PROFILES: &[AnalysisProfile] = &[
    AnalysisProfile {
        name: "full_diagnostic",
        engines: &[
            EngineKind::Trend,
            EngineKind::CashFlow,
            EngineKind::Anomaly,
            EngineKind::Solvency,
        ],
        composite: true,
        metric_scope: MetricScope::All,
    },
    AnalysisProfile {
        name: "solvency_focus",
        engines: &[EngineKind::Solvency],
        composite: true,
        metric_scope: MetricScope::Only(&["debt_equity", "interest_coverage"]),
    },
    AnalysisProfile {
        name: "liquidity_focus",
        engines: &[EngineKind::Trend, EngineKind::CashFlow],
        composite: true,
        metric_scope: MetricScope::Only(&["current_ratio", "quick_ratio"]),
    },
    AnalysisProfile {
        name: "performance_focus",
        engines: &[EngineKind::Trend],
        composite: false,
        metric_scope: MetricScope::Only(&["operating_margin", "net_margin", "asset_turnover"]),
    },
    AnalysisProfile {
        name: "risk_scan",
        engines: &[EngineKind::Solvency, EngineKind::Anomaly],
        composite: true,
        metric_scope: MetricScope::All,
    },
    AnalysisProfile {
        name: "going_concern_screen",
        engines: &[EngineKind::Trend, EngineKind::Solvency],
        composite: true,
        metric_scope: MetricScope::Only(&[
            "current_ratio",
            "debt_equity",
            "interest_coverage",
            "net_margin",
        ]),
    },
];

/// Look up a profile by name
///
/// # Errors
/// `Error::Configuration` for an unrecognized name.
pub fn profile(name: &str) -> Result<&'static AnalysisProfile> {
    PROFILES.iter().find(|p| p.name == name).ok_or_else(|| {
        let known: Vec<&str> = PROFILES.iter().map(|p| p.name).collect();
        Error::Configuration(format!(
            "unknown analysis profile '{}' (known: {})",
            name,
            known.join(", ")
        ))
    })
}
