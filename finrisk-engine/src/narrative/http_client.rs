//! HTTP narrative interpreter
//!
//! POSTs each record as JSON to a configured endpoint and expects
//! `{"interpretation": "..."}` back. Retry, rate limiting and the per-call
//! timeout live in [`super::NarrativeStage`]; this client only maps HTTP
//! outcomes onto [`NarrativeError`].

use super::{NarrativeError, NarrativeInterpreter, NarrativeRecord};
use async_trait::async_trait;
use finrisk_common::{Error, Result};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;

/// Longest time to establish a connection
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
struct InterpretationResponse {
    interpretation: String,
}

pub struct HttpInterpreter {
    /// HTTP client with configured timeouts
    client: Client,
    endpoint: String,
    /// Sent as a bearer token when present
    api_key: Option<String>,
    timeout_ms: u64,
}

impl HttpInterpreter {
    /// Build a client for `endpoint`
    ///
    /// # Errors
    /// `Error::Configuration` if the endpoint is empty or the HTTP client
    /// cannot be built.
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let endpoint = endpoint.into();
        if endpoint.trim().is_empty() {
            return Err(Error::Configuration(
                "narrative endpoint must not be empty".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(CONNECT_TIMEOUT.min(timeout))
            .build()
            .map_err(|e| Error::Configuration(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint,
            api_key,
            timeout_ms: timeout.as_millis() as u64,
        })
    }
}

/// Map a non-success HTTP status to a narrative error
///
/// Returns `None` for 2xx.
pub fn classify_status(status: StatusCode, body: &str) -> Option<NarrativeError> {
    if status.is_success() {
        None
    } else if status == StatusCode::TOO_MANY_REQUESTS {
        Some(NarrativeError::Throttled)
    } else if status.is_server_error() {
        Some(NarrativeError::Server(status.as_u16()))
    } else {
        let mut message: String = body.chars().take(200).collect();
        if message.is_empty() {
            message = status.canonical_reason().unwrap_or("unknown").to_string();
        }
        Some(NarrativeError::Rejected {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl NarrativeInterpreter for HttpInterpreter {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn interpret(&self, record: &NarrativeRecord) -> std::result::Result<String, NarrativeError> {
        let mut request = self.client.post(&self.endpoint).json(record);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        tracing::debug!(
            endpoint = %self.endpoint,
            company = %record.company,
            year = record.year,
            "Requesting narrative interpretation"
        );

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                NarrativeError::Timeout(self.timeout_ms)
            } else {
                NarrativeError::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body)
                .unwrap_or_else(|| NarrativeError::Malformed(format!("unexpected status {}", status))));
        }

        let parsed: InterpretationResponse = response
            .json()
            .await
            .map_err(|e| NarrativeError::Malformed(e.to_string()))?;
        Ok(parsed.interpretation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_is_not_an_error() {
        assert_eq!(classify_status(StatusCode::OK, ""), None);
        assert_eq!(classify_status(StatusCode::CREATED, ""), None);
    }

    #[test]
    fn test_429_is_throttled() {
        assert_eq!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, "slow down"),
            Some(NarrativeError::Throttled)
        );
    }

    #[test]
    fn test_5xx_is_server_error() {
        assert_eq!(
            classify_status(StatusCode::BAD_GATEWAY, ""),
            Some(NarrativeError::Server(502))
        );
    }

    #[test]
    fn test_other_4xx_is_rejected_with_body() {
        match classify_status(StatusCode::UNAUTHORIZED, "invalid key") {
            Some(NarrativeError::Rejected { status, message }) => {
                assert_eq!(status, 401);
                assert_eq!(message, "invalid key");
            }
            other => panic!("unexpected classification: {other:?}"),
        }
    }

    #[test]
    fn test_rejected_without_body_uses_reason_phrase() {
        match classify_status(StatusCode::NOT_FOUND, "") {
            Some(NarrativeError::Rejected { message, .. }) => assert_eq!(message, "Not Found"),
            other => panic!("unexpected classification: {other:?}"),
        }
    }

    #[test]
    fn test_empty_endpoint_is_configuration_error() {
        let result = HttpInterpreter::new("  ", None, Duration::from_secs(1));
        assert!(matches!(result, Err(Error::Configuration(_))));
    }
}
