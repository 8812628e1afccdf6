//! External context and temporal mode resolution for narrative records

use finrisk_common::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

/// Whether a record describes the current period or a historical one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemporalMode {
    RealTime,
    Retrospective,
}

impl TemporalMode {
    pub fn resolve(year: i32, current_year: i32) -> Self {
        if year == current_year {
            TemporalMode::RealTime
        } else {
            TemporalMode::Retrospective
        }
    }
}

/// Context attached to one specific Company-Year
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextEntry {
    pub company: String,
    pub year: i32,
    pub context: Value,
}

/// Caller-supplied context for the narrative stage
///
/// Resolution priority per key: Company-Year entry, then Year, then global.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExternalContext {
    pub global: Option<Value>,
    /// Keyed by the year rendered as a string, as it appears in JSON
    pub years: BTreeMap<String, Value>,
    pub entries: Vec<ContextEntry>,
}

impl ExternalContext {
    /// Parse a context document from JSON
    pub fn from_json(content: &str) -> Result<Self> {
        let context: ExternalContext = serde_json::from_str(content)?;
        if let Some(bad) = context.years.keys().find(|y| y.parse::<i32>().is_err()) {
            return Err(Error::Configuration(format!(
                "context year key '{}' is not an integer",
                bad
            )));
        }
        Ok(context)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Most specific context for a key, or `Value::Null` when none applies
    pub fn resolve(&self, company: &str, year: i32) -> Value {
        if let Some(entry) = self
            .entries
            .iter()
            .find(|e| e.company == company && e.year == year)
        {
            return entry.context.clone();
        }
        if let Some(value) = self.years.get(&year.to_string()) {
            return value.clone();
        }
        self.global.clone().unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context() -> ExternalContext {
        ExternalContext::from_json(
            r#"{
                "global": {"macro": "stable rates"},
                "years": {"2022": {"macro": "rate hikes"}},
                "entries": [
                    {"company": "Acme", "year": 2022, "context": {"event": "plant fire"}}
                ]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_company_year_entry_wins() {
        assert_eq!(context().resolve("Acme", 2022), json!({"event": "plant fire"}));
    }

    #[test]
    fn test_year_context_beats_global() {
        assert_eq!(context().resolve("Beta", 2022), json!({"macro": "rate hikes"}));
    }

    #[test]
    fn test_global_fallback() {
        assert_eq!(context().resolve("Acme", 2023), json!({"macro": "stable rates"}));
    }

    #[test]
    fn test_empty_context_resolves_to_null() {
        assert_eq!(ExternalContext::default().resolve("Acme", 2023), Value::Null);
    }

    #[test]
    fn test_non_integer_year_key_is_rejected() {
        let err = ExternalContext::from_json(r#"{"years": {"last": {}}}"#).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("context.json");
        std::fs::write(&path, r#"{"years": {"2024": "election year"}}"#).unwrap();

        let context = ExternalContext::load(&path).unwrap();
        assert_eq!(context.resolve("Acme", 2024), json!("election year"));
        assert!(ExternalContext::load(&dir.path().join("absent.json")).is_err());
    }

    #[test]
    fn test_temporal_mode() {
        assert_eq!(TemporalMode::resolve(2026, 2026), TemporalMode::RealTime);
        assert_eq!(TemporalMode::resolve(2023, 2026), TemporalMode::Retrospective);
        assert_eq!(
            serde_json::to_value(TemporalMode::RealTime).unwrap(),
            json!("real_time")
        );
    }
}
