//! Schema validator
//!
//! Checks serialized engine output against its registered contract. Runs on
//! the JSON form so it sees exactly what downstream consumers receive.

use super::{contract_for, SchemaContract};
use finrisk_common::{ContractSection, Error, Result};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error};

/// Keys from `required` absent in `value`, sorted
///
/// A non-object value is missing every key.
fn missing_keys(value: Option<&Value>, required: &[&str]) -> Vec<String> {
    let object = value.and_then(Value::as_object);
    let mut missing: Vec<String> = required
        .iter()
        .filter(|key| !object.is_some_and(|o| o.contains_key(**key)))
        .map(|key| key.to_string())
        .collect();
    missing.sort();
    missing
}

fn check_row(contract: &SchemaContract, row: &Value) -> Option<(ContractSection, Vec<String>)> {
    let missing = missing_keys(Some(row), contract.required_keys);
    if !missing.is_empty() {
        return Some((ContractSection::TopLevel, missing));
    }

    if let Some(metrics) = contract.metrics {
        let missing = missing_keys(row.get("metrics"), metrics);
        if !missing.is_empty() {
            return Some((ContractSection::Metrics, missing));
        }
    }

    if let Some(flags) = contract.flags {
        let missing = missing_keys(row.get("flags"), flags);
        if !missing.is_empty() {
            return Some((ContractSection::Flags, missing));
        }
    }

    None
}

/// Validate already-serialized rows for an engine
///
/// The first violation is fatal. An empty list always passes.
pub fn validate_rows(engine: &str, rows: &[Value]) -> Result<()> {
    let contract =
        contract_for(engine).ok_or_else(|| Error::UnknownContract(engine.to_string()))?;

    for (row, value) in rows.iter().enumerate() {
        if let Some((section, missing)) = check_row(contract, value) {
            error!(
                engine,
                row,
                %section,
                missing = ?missing,
                "Schema contract violated"
            );
            return Err(Error::Validation {
                engine: engine.to_string(),
                row,
                section,
                missing,
            });
        }
    }

    debug!(engine, rows = rows.len(), version = contract.version, "Schema contract satisfied");
    Ok(())
}

/// Serialize typed records and validate them against the engine's contract
pub fn validate_records<T: Serialize>(engine: &str, records: &[T]) -> Result<()> {
    let rows = records
        .iter()
        .map(serde_json::to_value)
        .collect::<std::result::Result<Vec<Value>, _>>()?;
    validate_rows(engine, &rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn solvency_row() -> Value {
        json!({
            "engine": "solvency",
            "Company": "Acme",
            "Year": 2023,
            "metrics": {"debt_equity": 0.6, "interest_coverage": null, "roa": null, "roe": null},
            "flags": {"leverage_risk": false, "coverage_risk": false, "return_risk": false},
            "severity": "stable",
            "explanation": "Solvency indicators are healthy."
        })
    }

    #[test]
    fn test_empty_list_passes_for_every_engine() {
        for contract in crate::contracts::CONTRACTS {
            assert!(validate_rows(contract.engine, &[]).is_ok());
        }
    }

    #[test]
    fn test_valid_row_passes() {
        assert!(validate_rows("solvency", &[solvency_row()]).is_ok());
    }

    #[test]
    fn test_unknown_engine_is_rejected() {
        let err = validate_rows("liquidity", &[]).unwrap_err();
        assert!(matches!(err, Error::UnknownContract(name) if name == "liquidity"));
    }

    #[test]
    fn test_missing_top_level_keys_are_reported_sorted() {
        let mut row = solvency_row();
        let obj = row.as_object_mut().unwrap();
        obj.remove("severity");
        obj.remove("explanation");

        let err = validate_rows("solvency", &[solvency_row(), row]).unwrap_err();
        match err {
            Error::Validation {
                engine,
                row,
                section,
                missing,
            } => {
                assert_eq!(engine, "solvency");
                assert_eq!(row, 1);
                assert_eq!(section, ContractSection::TopLevel);
                assert_eq!(missing, vec!["explanation", "severity"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_metric_key_is_reported() {
        let mut row = solvency_row();
        row["metrics"].as_object_mut().unwrap().remove("roe");
        let err = validate_rows("solvency", &[row]).unwrap_err();
        assert_eq!(err.to_string(), "solvency output row 0 missing metrics: roe");
    }

    #[test]
    fn test_missing_flag_key_is_reported() {
        let mut row = solvency_row();
        row["flags"] = json!({"leverage_risk": true});
        let err = validate_rows("solvency", &[row]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "solvency output row 0 missing flags: coverage_risk, return_risk"
        );
    }

    #[test]
    fn test_null_metric_value_still_satisfies_contract() {
        let row = solvency_row();
        assert!(row["metrics"]["interest_coverage"].is_null());
        assert!(validate_rows("solvency", &[row]).is_ok());
    }

    #[test]
    fn test_non_object_row_is_missing_everything() {
        let err = validate_rows("composite_risk", &[json!(42)]).unwrap_err();
        match err {
            Error::Validation { missing, .. } => assert_eq!(missing.len(), 7),
            other => panic!("unexpected error: {other}"),
        }
    }
}
