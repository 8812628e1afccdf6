//! Narrative stage
//!
//! Fans structured per-key records out to an external interpreter and
//! collects one result per record. The deterministic pipeline never waits on
//! this stage for its own output, and a failed call only affects its record.
//!
//! Calls run with bounded concurrency (`buffered`, so result order matches
//! input order), pass through a shared rate limiter, carry a per-call
//! timeout, and retry transient failures with exponential backoff.

pub mod http_client;

pub use http_client::HttpInterpreter;

use crate::context::TemporalMode;
use async_trait::async_trait;
use finrisk_common::config::NarrativeSettings;
use finrisk_common::{Error, Result};
use futures::stream::{self, StreamExt};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Longest wait between two attempts of the same call
pub const MAX_BACKOFF: Duration = Duration::from_secs(5);

// ============================================================================
// Boundary types
// ============================================================================

/// Structured input for one Company-Year
///
/// Engine payloads are the engine record minus its identifying keys, or an
/// empty object when the engine produced nothing for this key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrativeRecord {
    #[serde(rename = "Company")]
    pub company: String,
    #[serde(rename = "Year")]
    pub year: i32,
    pub analysis_profile: String,
    pub temporal_mode: TemporalMode,
    pub context: Value,
    pub ratios: BTreeMap<String, Option<f64>>,
    pub trend: Value,
    pub cash_flow: Value,
    pub anomaly: Value,
    pub solvency: Value,
    pub composite_risk: Value,
}

/// Interpreter output for one record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrativeResult {
    #[serde(rename = "Company")]
    pub company: String,
    #[serde(rename = "Year")]
    pub year: i32,
    pub analysis_profile: String,
    pub temporal_mode: TemporalMode,
    pub interpretation: Option<String>,
    pub error: Option<String>,
}

/// Failure of a single interpreter call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NarrativeError {
    #[error("narrative call timed out after {0} ms")]
    Timeout(u64),

    #[error("narrative service is throttling requests")]
    Throttled,

    #[error("narrative transport error: {0}")]
    Transport(String),

    #[error("narrative service error (HTTP {0})")]
    Server(u16),

    #[error("narrative request rejected (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("malformed narrative response: {0}")]
    Malformed(String),
}

impl NarrativeError {
    /// Transient failures worth another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            NarrativeError::Timeout(_)
                | NarrativeError::Throttled
                | NarrativeError::Transport(_)
                | NarrativeError::Server(_)
        )
    }
}

/// External narrative collaborator
#[async_trait]
pub trait NarrativeInterpreter: Send + Sync {
    /// Interpreter name for logging
    fn name(&self) -> &'static str;

    /// Produce interpretation text for one record
    async fn interpret(&self, record: &NarrativeRecord) -> std::result::Result<String, NarrativeError>;
}

/// Offline interpreter returning fixed text
pub struct StaticInterpreter {
    text: String,
}

impl StaticInterpreter {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

#[async_trait]
impl NarrativeInterpreter for StaticInterpreter {
    fn name(&self) -> &'static str {
        "static"
    }

    async fn interpret(&self, _record: &NarrativeRecord) -> std::result::Result<String, NarrativeError> {
        Ok(self.text.clone())
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Drop control characters other than newline and tab, then trim
pub fn sanitize_text(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect::<String>()
        .trim()
        .to_string()
}

/// Backoff before retry number `retry` (0-based): doubles each time, capped
pub fn backoff_delay(initial_ms: u64, retry: u32) -> Duration {
    let factor = 2u64.saturating_pow(retry);
    Duration::from_millis(initial_ms.saturating_mul(factor)).min(MAX_BACKOFF)
}

// ============================================================================
// Stage
// ============================================================================

pub struct NarrativeStage {
    interpreter: Arc<dyn NarrativeInterpreter>,
    settings: NarrativeSettings,
    rate_limiter: DefaultDirectRateLimiter,
}

impl NarrativeStage {
    /// # Errors
    /// `Error::Configuration` if concurrency or requests-per-second is zero.
    pub fn new(interpreter: Arc<dyn NarrativeInterpreter>, settings: &NarrativeSettings) -> Result<Self> {
        let per_second = NonZeroU32::new(settings.requests_per_second).ok_or_else(|| {
            Error::Configuration("narrative.requests_per_second must be at least 1".to_string())
        })?;
        if settings.concurrency == 0 {
            return Err(Error::Configuration(
                "narrative.concurrency must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            interpreter,
            settings: settings.clone(),
            rate_limiter: RateLimiter::direct(Quota::per_second(per_second)),
        })
    }

    /// Interpret every record; results come back in input order
    pub async fn interpret_all(&self, records: Vec<NarrativeRecord>) -> Vec<NarrativeResult> {
        if records.is_empty() {
            return Vec::new();
        }

        info!(
            interpreter = self.interpreter.name(),
            records = records.len(),
            concurrency = self.settings.concurrency,
            "Starting narrative stage"
        );

        let results: Vec<NarrativeResult> = stream::iter(records)
            .map(|record| self.interpret_one(record))
            .buffered(self.settings.concurrency)
            .collect()
            .await;

        let failed = results.iter().filter(|r| r.error.is_some()).count();
        info!(
            succeeded = results.len() - failed,
            failed,
            "Narrative stage complete"
        );
        results
    }

    async fn interpret_one(&self, record: NarrativeRecord) -> NarrativeResult {
        let outcome = self.call_with_retry(&record).await;

        let (interpretation, error) = match outcome {
            Ok(text) => (Some(text), None),
            Err(e) => {
                warn!(
                    company = %record.company,
                    year = record.year,
                    error = %e,
                    "Narrative interpretation failed"
                );
                (None, Some(e.to_string()))
            }
        };

        NarrativeResult {
            company: record.company,
            year: record.year,
            analysis_profile: record.analysis_profile,
            temporal_mode: record.temporal_mode,
            interpretation,
            error,
        }
    }

    async fn call_with_retry(&self, record: &NarrativeRecord) -> std::result::Result<String, NarrativeError> {
        let timeout = Duration::from_millis(self.settings.timeout_ms);
        let mut retry = 0u32;

        loop {
            self.rate_limiter.until_ready().await;

            let attempt = match tokio::time::timeout(timeout, self.interpreter.interpret(record)).await {
                Ok(result) => result,
                Err(_) => Err(NarrativeError::Timeout(self.settings.timeout_ms)),
            };

            let error = match attempt {
                Ok(text) => {
                    let text = sanitize_text(&text);
                    if text.is_empty() {
                        return Err(NarrativeError::Malformed("empty interpretation".to_string()));
                    }
                    debug!(
                        company = %record.company,
                        year = record.year,
                        retries = retry,
                        "Narrative interpretation received"
                    );
                    return Ok(text);
                }
                Err(e) => e,
            };

            if !error.is_retryable() || retry >= self.settings.max_retries {
                return Err(error);
            }

            let delay = backoff_delay(self.settings.initial_backoff_ms, retry);
            warn!(
                company = %record.company,
                year = record.year,
                retry = retry + 1,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Retrying narrative call"
            );
            tokio::time::sleep(delay).await;
            retry += 1;
        }
    }
}
