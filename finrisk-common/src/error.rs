//! Common error types for the financial risk pipeline

use std::fmt;
use thiserror::Error;

/// Common result type for pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Part of a record a schema contract checks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractSection {
    TopLevel,
    Metrics,
    Flags,
}

impl fmt::Display for ContractSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContractSection::TopLevel => write!(f, "required keys"),
            ContractSection::Metrics => write!(f, "metrics"),
            ContractSection::Flags => write!(f, "flags"),
        }
    }
}

/// Error types shared by every pipeline stage
///
/// All variants are fatal for the deterministic pipeline. Sparse but valid
/// data never produces an `Error`; it surfaces as null metrics instead.
#[derive(Error, Debug)]
pub enum Error {
    /// Engine output violated its schema contract
    #[error("{engine} output row {row} missing {section}: {}", missing.join(", "))]
    Validation {
        engine: String,
        row: usize,
        section: ContractSection,
        missing: Vec<String>,
    },

    /// Ratio sanity bound violated for a statement
    #[error("{company} {year}: {reason}")]
    DataIntegrity {
        company: String,
        year: i32,
        reason: String,
    },

    /// Unknown profile, malformed override or invalid setting
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// No schema contract registered for an engine name
    #[error("Unknown engine contract: {0}")]
    UnknownContract(String),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML override could not be parsed
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Internal error (e.g. a worker task panicked)
    #[error("Internal error: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_message_names_engine_row_and_keys() {
        let err = Error::Validation {
            engine: "solvency".to_string(),
            row: 3,
            section: ContractSection::Flags,
            missing: vec!["coverage_risk".to_string(), "leverage_risk".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "solvency output row 3 missing flags: coverage_risk, leverage_risk"
        );
    }

    #[test]
    fn test_data_integrity_message() {
        let err = Error::DataIntegrity {
            company: "Acme".to_string(),
            year: 2023,
            reason: "Current ratio cannot be negative.".to_string(),
        };
        assert_eq!(err.to_string(), "Acme 2023: Current ratio cannot be negative.");
    }
}
