//! Client configuration: built-in defaults, deep merge and override loading
//!
//! Defaults are declared once as typed structs. Resolution serializes them to
//! a JSON tree, deep-merges the client override tree on top, and deserializes
//! the result back into one immutable [`ClientConfig`].

use crate::records::{EngineKind, RiskBand};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

// ============================================================================
// Deep merge
// ============================================================================

/// Recursively merge `overrides` onto `defaults`
///
/// For each key in the override: when both sides hold mappings they merge
/// recursively, otherwise the override value replaces the default wholesale.
/// Arrays are never concatenated.
pub fn deep_merge(defaults: &Value, overrides: &Value) -> Value {
    match (defaults, overrides) {
        (Value::Object(base), Value::Object(over)) => {
            let mut merged = base.clone();
            for (key, value) in over {
                let next = match base.get(key) {
                    Some(existing) if existing.is_object() && value.is_object() => {
                        deep_merge(existing, value)
                    }
                    _ => value.clone(),
                };
                merged.insert(key.clone(), next);
            }
            Value::Object(merged)
        }
        _ => overrides.clone(),
    }
}

// ============================================================================
// Typed configuration
// ============================================================================

/// Merged client configuration consumed by the pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub client_name: String,
    pub analysis: AnalysisSettings,
    pub thresholds: EngineThresholds,
    pub narrative: NarrativeSettings,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            client_name: "DEFAULT".to_string(),
            analysis: AnalysisSettings::default(),
            thresholds: EngineThresholds::default(),
            narrative: NarrativeSettings::default(),
        }
    }
}

/// Composite aggregation settings (`analysis.*`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisSettings {
    /// Engine name -> non-negative weight (need not sum to 1)
    pub risk_weights: BTreeMap<String, f64>,
    pub risk_bands: RiskBands,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        let risk_weights = EngineKind::RULE_ENGINES
            .iter()
            .map(|kind| (kind.as_str().to_string(), kind.default_weight()))
            .collect();
        Self {
            risk_weights,
            risk_bands: RiskBands::default(),
        }
    }
}

impl AnalysisSettings {
    /// Configured weight for an engine, falling back to the built-in default
    pub fn weight_for(&self, engine: EngineKind) -> f64 {
        self.risk_weights
            .get(engine.as_str())
            .copied()
            .unwrap_or_else(|| engine.default_weight())
    }
}

/// Ascending band cut-points on the 0-100 composite scale
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RiskBands {
    pub low: f64,
    pub medium: f64,
    pub high: f64,
}

impl Default for RiskBands {
    fn default() -> Self {
        Self {
            low: 0.0,
            medium: 40.0,
            high: 70.0,
        }
    }
}

impl RiskBands {
    pub fn band_for(&self, score: f64) -> RiskBand {
        if score >= self.high {
            RiskBand::High
        } else if score >= self.medium {
            RiskBand::Medium
        } else {
            RiskBand::Low
        }
    }
}

/// Per-engine threshold overrides (`thresholds.<engine>.*`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineThresholds {
    pub trend: TrendThresholds,
    pub cash_flow: CashFlowThresholds,
    pub anomaly: AnomalyThresholds,
    pub solvency: SolvencyThresholds,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrendThresholds {
    /// Largest tolerated fall in current ratio between observed years
    pub liquidity_decline_max: f64,
    /// Largest tolerated fall in gross or net margin
    pub margin_decline_max: f64,
    /// Largest tolerated rise in debt/equity
    pub leverage_increase_max: f64,
    /// Largest tolerated fall in ROA or ROE
    pub return_decline_max: f64,
    /// Largest tolerated fall in asset turnover
    pub turnover_decline_max: f64,
}

impl Default for TrendThresholds {
    fn default() -> Self {
        Self {
            liquidity_decline_max: 0.2,
            margin_decline_max: 0.05,
            leverage_increase_max: 0.25,
            return_decline_max: 0.05,
            turnover_decline_max: 0.1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CashFlowThresholds {
    pub liquidity_min: f64,
    /// Finance costs as a share of revenue
    pub financing_burden_max: f64,
}

impl Default for CashFlowThresholds {
    fn default() -> Self {
        Self {
            liquidity_min: 1.2,
            financing_burden_max: 0.1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnomalyThresholds {
    /// Percent-change limit for margin and return ratios
    pub margin_change_max: f64,
    /// Percent-change limit for leverage and turnover ratios
    pub structure_change_max: f64,
    pub liquidity_high: f64,
    pub coverage_floor: f64,
}

impl Default for AnomalyThresholds {
    fn default() -> Self {
        Self {
            margin_change_max: 0.30,
            structure_change_max: 0.25,
            liquidity_high: 2.0,
            coverage_floor: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SolvencyThresholds {
    pub debt_equity_max: f64,
    pub interest_coverage_min: f64,
    pub roa_min: f64,
    pub roe_min: f64,
}

impl Default for SolvencyThresholds {
    fn default() -> Self {
        Self {
            debt_equity_max: 1.5,
            interest_coverage_min: 1.5,
            roa_min: 0.05,
            roe_min: 0.10,
        }
    }
}

/// Narrative collaborator call settings (`narrative.*`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NarrativeSettings {
    pub endpoint: Option<String>,
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub concurrency: usize,
    pub requests_per_second: u32,
}

impl Default for NarrativeSettings {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_ms: 30_000,
            max_retries: 2,
            initial_backoff_ms: 250,
            concurrency: 4,
            requests_per_second: 2,
        }
    }
}

// ============================================================================
// Resolution
// ============================================================================

impl ClientConfig {
    /// Built-in defaults as a JSON tree
    pub fn defaults_value() -> Value {
        // Plain structs of numbers and strings always serialize
        serde_json::to_value(ClientConfig::default()).unwrap_or(Value::Null)
    }

    /// Deep-merge an override tree onto the defaults and validate the result
    ///
    /// # Errors
    /// `Error::Configuration` if the override root is not a mapping, a value
    /// has the wrong shape, or a validated setting is out of range.
    pub fn resolve(overrides: &Value) -> Result<Self> {
        if !overrides.is_object() {
            return Err(Error::Configuration(format!(
                "client override must be a mapping, got {}",
                value_kind(overrides)
            )));
        }

        let merged = deep_merge(&Self::defaults_value(), overrides);
        let config: ClientConfig = serde_json::from_value(merged)
            .map_err(|e| Error::Configuration(format!("malformed override: {}", e)))?;
        config.validate()?;

        debug!(client = %config.client_name, "Client configuration resolved");
        Ok(config)
    }

    /// Load a TOML override file and resolve it against the defaults
    pub fn load(path: &Path) -> Result<Self> {
        let overrides = load_overrides(path)?;
        let config = Self::resolve(&overrides)?;
        info!(
            path = %path.display(),
            client = %config.client_name,
            "Loaded client configuration overrides"
        );
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        for (engine, weight) in &self.analysis.risk_weights {
            if !weight.is_finite() || *weight < 0.0 {
                return Err(Error::Configuration(format!(
                    "analysis.risk_weights.{} must be a non-negative number, got {}",
                    engine, weight
                )));
            }
        }

        let bands = &self.analysis.risk_bands;
        let cut_points = [("low", bands.low), ("medium", bands.medium), ("high", bands.high)];
        for (name, value) in cut_points {
            if !value.is_finite() || !(0.0..=100.0).contains(&value) {
                return Err(Error::Configuration(format!(
                    "analysis.risk_bands.{} must lie in [0, 100], got {}",
                    name, value
                )));
            }
        }
        if !(bands.low <= bands.medium && bands.medium <= bands.high) {
            return Err(Error::Configuration(format!(
                "analysis.risk_bands must be ascending (low {} <= medium {} <= high {})",
                bands.low, bands.medium, bands.high
            )));
        }

        if self.narrative.concurrency == 0 {
            return Err(Error::Configuration(
                "narrative.concurrency must be at least 1".to_string(),
            ));
        }
        if self.narrative.requests_per_second == 0 {
            return Err(Error::Configuration(
                "narrative.requests_per_second must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

/// Read a TOML override file into a JSON tree
pub fn load_overrides(path: &Path) -> Result<Value> {
    let content = std::fs::read_to_string(path)?;
    let table: toml::Table = toml::from_str(&content)?;
    Ok(serde_json::to_value(table)?)
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "a mapping",
    }
}
