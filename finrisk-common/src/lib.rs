//! # finrisk common library
//!
//! Shared code for the financial risk pipeline crates:
//! - Error taxonomy (validation, data integrity, configuration)
//! - Statement line and engine record data model
//! - Severity taxonomy and engine identifiers
//! - Client configuration defaults, deep merge and override loading

pub mod config;
pub mod error;
pub mod model;
pub mod records;

pub use error::{ContractSection, Error, Result};
pub use model::{Category, CompanyYear, NormalizedLine, StatementLine, TaxTag};
pub use records::{EngineKind, EngineRecord, RiskBand, Severity};
