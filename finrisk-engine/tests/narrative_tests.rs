//! Narrative stage tests
//!
//! Mock interpreters exercise failure isolation, timeouts, retries and
//! ordering without any network access.

use async_trait::async_trait;
use finrisk_common::config::{ClientConfig, NarrativeSettings};
use finrisk_common::StatementLine;
use finrisk_engine::narrative::{
    NarrativeError, NarrativeInterpreter, NarrativeRecord, NarrativeStage, StaticInterpreter,
};
use finrisk_engine::{ExternalContext, Pipeline, TemporalMode};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn settings() -> NarrativeSettings {
    NarrativeSettings {
        endpoint: None,
        timeout_ms: 100,
        max_retries: 2,
        initial_backoff_ms: 1,
        concurrency: 4,
        requests_per_second: 1000,
    }
}

fn record(company: &str, year: i32) -> NarrativeRecord {
    NarrativeRecord {
        company: company.to_string(),
        year,
        analysis_profile: "full_diagnostic".to_string(),
        temporal_mode: TemporalMode::Retrospective,
        context: Value::Null,
        ratios: BTreeMap::new(),
        trend: json!({}),
        cash_flow: json!({}),
        anomaly: json!({}),
        solvency: json!({}),
        composite_risk: json!({}),
    }
}

/// Rejects one company, answers the rest
struct SelectiveInterpreter {
    reject: &'static str,
}

#[async_trait]
impl NarrativeInterpreter for SelectiveInterpreter {
    fn name(&self) -> &'static str {
        "selective"
    }

    async fn interpret(&self, record: &NarrativeRecord) -> Result<String, NarrativeError> {
        if record.company == self.reject {
            Err(NarrativeError::Rejected {
                status: 400,
                message: "bad record".to_string(),
            })
        } else {
            Ok(format!("{} {} looks fine.", record.company, record.year))
        }
    }
}

/// Never answers within the timeout
struct SlowInterpreter {
    calls: AtomicUsize,
}

#[async_trait]
impl NarrativeInterpreter for SlowInterpreter {
    fn name(&self) -> &'static str {
        "slow"
    }

    async fn interpret(&self, _record: &NarrativeRecord) -> Result<String, NarrativeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok("too late".to_string())
    }
}

/// Throttles the first `failures` calls, then answers
struct FlakyInterpreter {
    failures: usize,
    calls: AtomicUsize,
}

#[async_trait]
impl NarrativeInterpreter for FlakyInterpreter {
    fn name(&self) -> &'static str {
        "flaky"
    }

    async fn interpret(&self, _record: &NarrativeRecord) -> Result<String, NarrativeError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            Err(NarrativeError::Throttled)
        } else {
            Ok("Recovered \u{0000}interpretation".to_string())
        }
    }
}

/// Returns a malformed response every time
struct MalformedInterpreter {
    calls: AtomicUsize,
}

#[async_trait]
impl NarrativeInterpreter for MalformedInterpreter {
    fn name(&self) -> &'static str {
        "malformed"
    }

    async fn interpret(&self, _record: &NarrativeRecord) -> Result<String, NarrativeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(NarrativeError::Malformed("missing interpretation".to_string()))
    }
}

#[tokio::test]
async fn test_failure_is_isolated_and_order_preserved() {
    let stage = NarrativeStage::new(
        Arc::new(SelectiveInterpreter { reject: "Beta" }),
        &settings(),
    )
    .unwrap();

    let results = stage
        .interpret_all(vec![record("Acme", 2022), record("Beta", 2022), record("Gamma", 2022)])
        .await;

    let companies: Vec<&str> = results.iter().map(|r| r.company.as_str()).collect();
    assert_eq!(companies, vec!["Acme", "Beta", "Gamma"]);

    assert_eq!(results[0].interpretation.as_deref(), Some("Acme 2022 looks fine."));
    assert!(results[0].error.is_none());
    assert!(results[1].interpretation.is_none());
    assert!(results[1].error.as_deref().unwrap().contains("HTTP 400"));
    assert!(results[2].interpretation.is_some());
}

#[tokio::test]
async fn test_timeout_is_retried_then_reported() {
    let interpreter = Arc::new(SlowInterpreter {
        calls: AtomicUsize::new(0),
    });
    let mut settings = settings();
    settings.timeout_ms = 20;
    settings.max_retries = 1;
    let stage = NarrativeStage::new(interpreter.clone(), &settings).unwrap();

    let results = stage.interpret_all(vec![record("Acme", 2023)]).await;

    assert_eq!(interpreter.calls.load(Ordering::SeqCst), 2);
    assert!(results[0].interpretation.is_none());
    assert!(results[0].error.as_deref().unwrap().contains("timed out after 20 ms"));
}

#[tokio::test]
async fn test_throttling_recovers_within_retry_budget() {
    let interpreter = Arc::new(FlakyInterpreter {
        failures: 2,
        calls: AtomicUsize::new(0),
    });
    let stage = NarrativeStage::new(interpreter.clone(), &settings()).unwrap();

    let results = stage.interpret_all(vec![record("Acme", 2023)]).await;

    assert_eq!(interpreter.calls.load(Ordering::SeqCst), 3);
    assert_eq!(
        results[0].interpretation.as_deref(),
        Some("Recovered interpretation")
    );
    assert!(results[0].error.is_none());
}

#[tokio::test]
async fn test_throttling_beyond_retry_budget_fails() {
    let interpreter = Arc::new(FlakyInterpreter {
        failures: 10,
        calls: AtomicUsize::new(0),
    });
    let stage = NarrativeStage::new(interpreter.clone(), &settings()).unwrap();

    let results = stage.interpret_all(vec![record("Acme", 2023)]).await;

    assert_eq!(interpreter.calls.load(Ordering::SeqCst), 3);
    assert!(results[0].error.as_deref().unwrap().contains("throttling"));
}

#[tokio::test]
async fn test_malformed_response_is_not_retried() {
    let interpreter = Arc::new(MalformedInterpreter {
        calls: AtomicUsize::new(0),
    });
    let stage = NarrativeStage::new(interpreter.clone(), &settings()).unwrap();

    let results = stage.interpret_all(vec![record("Acme", 2023)]).await;

    assert_eq!(interpreter.calls.load(Ordering::SeqCst), 1);
    assert!(results[0].error.as_deref().unwrap().contains("malformed"));
}

#[tokio::test]
async fn test_pipeline_run_attaches_interpretations_per_key() {
    let lines = vec![
        StatementLine::new("Acme", 2023, "Assets", "Current Assets", "200"),
        StatementLine::new("Acme", 2023, "Liabilities", "Current Liabilities", "100"),
        StatementLine::new("Acme", 2023, "Equity", "Equity", "500"),
        StatementLine::new("Beta", 2024, "Assets", "Current Assets", "50"),
        StatementLine::new("Beta", 2024, "Liabilities", "Current Liabilities", "100"),
    ];
    let context = ExternalContext::from_json(r#"{"global": {"note": "baseline"}}"#).unwrap();
    let pipeline = Pipeline::new(Arc::new(ClientConfig::default()), "liquidity_focus")
        .unwrap()
        .with_current_year(2024);
    let stage = NarrativeStage::new(Arc::new(StaticInterpreter::new("Summary.")), &settings()).unwrap();

    let output = pipeline.run(&lines, &context, Some(&stage)).await.unwrap();

    assert_eq!(output.ai_interpretation.len(), 2);
    let acme = &output.ai_interpretation[0];
    assert_eq!(acme.company, "Acme");
    assert_eq!(acme.temporal_mode, TemporalMode::Retrospective);
    assert_eq!(acme.analysis_profile, "liquidity_focus");
    assert_eq!(acme.interpretation.as_deref(), Some("Summary."));
    assert_eq!(output.ai_interpretation[1].temporal_mode, TemporalMode::RealTime);

    let value = serde_json::to_value(&output.ai_interpretation[0]).unwrap();
    assert_eq!(value["Company"], json!("Acme"));
    assert_eq!(value["temporal_mode"], json!("retrospective"));
    assert_eq!(value["error"], json!(null));
}

#[tokio::test]
async fn test_failing_narrative_keeps_deterministic_output() {
    let lines = vec![
        StatementLine::new("Beta", 2023, "Assets", "Current Assets", "50"),
        StatementLine::new("Beta", 2023, "Liabilities", "Current Liabilities", "100"),
    ];
    let pipeline = Pipeline::new(Arc::new(ClientConfig::default()), "liquidity_focus").unwrap();
    let stage = NarrativeStage::new(
        Arc::new(SelectiveInterpreter { reject: "Beta" }),
        &settings(),
    )
    .unwrap();

    let output = pipeline
        .run(&lines, &ExternalContext::default(), Some(&stage))
        .await
        .unwrap();

    assert_eq!(output.cash_flow.len(), 1);
    assert_eq!(output.composite_risk.len(), 1);
    assert_eq!(output.ai_interpretation.len(), 1);
    assert!(output.ai_interpretation[0].error.is_some());
}

#[tokio::test]
async fn test_without_stage_interpretations_are_empty() {
    let lines = vec![StatementLine::new("Acme", 2023, "Equity", "Equity", "500")];
    let pipeline = Pipeline::new(Arc::new(ClientConfig::default()), "full_diagnostic").unwrap();
    let output = pipeline
        .run(&lines, &ExternalContext::default(), None)
        .await
        .unwrap();
    assert!(output.ai_interpretation.is_empty());
    assert_eq!(output.ratios.len(), 1);
}
