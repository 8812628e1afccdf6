//! End-to-end pipeline tests
//!
//! Statement lines in, analysis output out, across profiles.

use finrisk_common::config::ClientConfig;
use finrisk_common::{Error, RiskBand, Severity, StatementLine};
use finrisk_engine::Pipeline;
use serde_json::json;
use std::sync::Arc;

fn pipeline(profile: &str) -> Pipeline {
    Pipeline::new(Arc::new(ClientConfig::default()), profile)
        .unwrap()
        .with_current_year(2024)
}

/// Acme 2023: no operating expense, finance cost or tax lines
fn acme_2023() -> Vec<StatementLine> {
    vec![
        StatementLine::new("Acme", 2023, "Assets", "Current Assets", "200"),
        StatementLine::new("Acme", 2023, "Liabilities", "Current Liabilities", "100"),
        StatementLine::new("Acme", 2023, "Liabilities", "Non-Current Liabilities", "200"),
        StatementLine::new("Acme", 2023, "Revenue", "Revenue", "1,000"),
        StatementLine::new("Acme", 2023, "Expenses", "COGS", "(600)"),
        StatementLine::new("Acme", 2023, "Equity", "Equity", "500"),
    ]
}

fn leveraged(company: &str, year: i32) -> Vec<StatementLine> {
    vec![
        StatementLine::new(company, year, "Assets", "Current Assets", "300"),
        StatementLine::new(company, year, "Assets", "Non-Current Assets", "1,700"),
        StatementLine::new(company, year, "Liabilities", "Current Liabilities", "400"),
        StatementLine::new(company, year, "Liabilities", "Non-Current Liabilities", "1,100"),
        StatementLine::new(company, year, "Revenue", "Revenue", "1,000"),
        StatementLine::new(company, year, "Expenses", "COGS", "700"),
        StatementLine::new(company, year, "Expenses", "Operating Expenses", "250"),
        StatementLine::new(company, year, "Expenses", "Finance Costs", "60"),
        StatementLine::new(company, year, "Tax", "Income Tax", "0"),
        StatementLine::new(company, year, "Equity", "Equity", "500"),
    ]
}

#[tokio::test]
async fn test_acme_end_to_end_ratios_and_null_coverage() {
    let output = pipeline("full_diagnostic").analyze(&acme_2023()).await.unwrap();

    assert_eq!(output.ratios.len(), 1);
    let ratios = &output.ratios[0].metrics;
    assert_eq!(ratios.current_ratio, Some(2.0));
    assert_eq!(ratios.gross_margin, Some(0.4));
    assert_eq!(ratios.debt_equity, Some(0.6));
    assert_eq!(ratios.interest_coverage, None);

    // Null coverage is neither a crash nor a silent pass
    let solvency = &output.solvency[0];
    assert_eq!(solvency.severity, Severity::Stable);
    assert_eq!(solvency.flags["coverage_risk"], false);
    assert!(solvency.data_incomplete.contains(&"coverage_risk".to_string()));
    assert!(!solvency.flags["leverage_risk"]);

    // Single year: no trend record, anomaly reports info
    assert!(output.trend.is_empty());
    assert_eq!(output.anomaly[0].severity, Severity::Info);

    assert_eq!(output.composite_risk.len(), 1);
    assert_eq!(output.composite_risk[0].score, 0.0);
    assert_eq!(output.composite_risk[0].band, RiskBand::Low);

    assert!(output
        .warnings
        .iter()
        .any(|w| w.item == "Expenses/Finance Costs"));
}

#[tokio::test]
async fn test_serialized_record_uses_published_names() {
    let output = pipeline("solvency_focus").analyze(&acme_2023()).await.unwrap();
    let value = serde_json::to_value(&output).unwrap();

    assert_eq!(value["profile_used"], json!("solvency_focus"));
    assert_eq!(value["solvency"][0]["engine"], json!("solvency"));
    assert_eq!(value["solvency"][0]["Company"], json!("Acme"));
    assert_eq!(value["solvency"][0]["Year"], json!(2023));
    assert_eq!(value["solvency"][0]["metrics"]["interest_coverage"], json!(null));
    assert_eq!(value["composite_risk"][0]["band"], json!("low"));
    assert_eq!(value["trend"], json!([]));
}

#[tokio::test]
async fn test_unknown_profile_is_fatal() {
    let result = Pipeline::new(Arc::new(ClientConfig::default()), "quick_look");
    assert!(matches!(result, Err(Error::Configuration(_))));
}

#[tokio::test]
async fn test_sanity_violation_aborts_before_rule_engines() {
    let mut lines = acme_2023();
    lines.extend(vec![
        StatementLine::new("Broken", 2023, "Revenue", "Revenue", "100"),
        StatementLine::new("Broken", 2023, "Expenses", "COGS", "150"),
        StatementLine::new("Broken", 2023, "Expenses", "Operating Expenses", "100"),
    ]);

    let err = pipeline("full_diagnostic").analyze(&lines).await.unwrap_err();
    match err {
        Error::DataIntegrity {
            company,
            year,
            reason,
        } => {
            assert_eq!(company, "Broken");
            assert_eq!(year, 2023);
            assert!(reason.contains("Operating margin"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_negative_current_ratio_aborts() {
    let lines = vec![
        StatementLine::new("Acme", 2023, "Assets", "Current Assets", "(50)"),
        StatementLine::new("Acme", 2023, "Liabilities", "Current Liabilities", "100"),
    ];
    let err = pipeline("solvency_focus").analyze(&lines).await.unwrap_err();
    assert!(matches!(err, Error::DataIntegrity { .. }));
}

#[tokio::test]
async fn test_reduced_profile_normalizes_single_engine_score() {
    let output = pipeline("solvency_focus")
        .analyze(&leveraged("Leveraged", 2023))
        .await
        .unwrap();

    // debt/equity 3.0, coverage 50/60, returns negative: all three flags
    let solvency = &output.solvency[0];
    assert_eq!(solvency.severity, Severity::Action);
    assert!(solvency.flags.values().all(|f| *f));

    let composite = &output.composite_risk[0];
    assert_eq!(composite.score, 90.0);
    assert_eq!(composite.band, RiskBand::High);
    assert_eq!(composite.breakdown.len(), 1);
    assert_eq!(composite.drivers, vec![solvency.explanation.clone()]);
    assert!(output.cash_flow.is_empty());
    assert!(output.anomaly.is_empty());
}

#[tokio::test]
async fn test_custom_weights_flow_into_composite() {
    let overrides = json!({
        "analysis": {
            "risk_weights": {"solvency": 3.0, "cash_flow": 1.0},
            "risk_bands": {"medium": 30.0, "high": 60.0}
        }
    });
    let config = ClientConfig::resolve(&overrides).unwrap();
    let pipeline = Pipeline::new(Arc::new(config), "full_diagnostic").unwrap();

    let output = pipeline.analyze(&leveraged("Leveraged", 2023)).await.unwrap();
    let composite = &output.composite_risk[0];

    let solvency = output.solvency[0].severity.score() * 3.0;
    let cash_flow = output.cash_flow[0].severity.score() * 1.0;
    let anomaly = output.anomaly[0].severity.score() * 0.25;
    let expected = ((solvency + cash_flow + anomaly) / 4.25 * 10.0).round() / 10.0;
    assert_eq!(composite.score, expected);
    assert_eq!(composite.breakdown["solvency"], 270.0);
}

#[tokio::test]
async fn test_multi_company_multi_year_keys_are_joined() {
    let mut lines = leveraged("Leveraged", 2022);
    lines.extend(leveraged("Leveraged", 2023));
    lines.extend(acme_2023());

    let output = pipeline("going_concern_screen").analyze(&lines).await.unwrap();
    assert_eq!(output.ratios.len(), 3);
    assert_eq!(output.trend.len(), 1);
    assert_eq!(output.trend[0].company, "Leveraged");
    assert_eq!(output.solvency.len(), 3);
    // Union of keys: every ratio key gets a composite record
    assert_eq!(output.composite_risk.len(), 3);
    let keys: Vec<(&str, i32)> = output
        .composite_risk
        .iter()
        .map(|r| (r.company.as_str(), r.year))
        .collect();
    assert_eq!(keys, vec![("Acme", 2023), ("Leveraged", 2022), ("Leveraged", 2023)]);
}

#[tokio::test]
async fn test_empty_input_yields_empty_output() {
    let output = pipeline("full_diagnostic").analyze(&[]).await.unwrap();
    assert!(output.ratios.is_empty());
    assert!(output.composite_risk.is_empty());
    assert_eq!(output.profile_used, "full_diagnostic");
}
