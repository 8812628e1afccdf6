//! Pipeline orchestrator
//!
//! Drives one stateless analysis run:
//!
//! 1. Normalize statement lines
//! 2. Derive ratios, apply the sanity gate, validate the ratio contract
//! 3. Run the profile's rule engines in parallel, join, validate each in profile order
//! 4. Aggregate composite risk (when the profile asks for it) and validate it
//! 5. Optionally hand per-key records to the narrative stage
//!
//! Any fatal error aborts the deterministic stages immediately. Narrative
//! failures never do; they are recorded per result.

use crate::composite::CompositeRiskEngine;
use crate::context::{ExternalContext, TemporalMode};
use crate::contracts::validate_records;
use crate::engines::{engine_for, EngineInput, RuleEngine};
use crate::narrative::{NarrativeRecord, NarrativeResult, NarrativeStage};
use crate::normalizer::normalize;
use crate::profiles::{profile, AnalysisProfile};
use crate::ratio::{compute_ratios, sanity};
use chrono::Datelike;
use finrisk_common::config::ClientConfig;
use finrisk_common::records::{CompositeRiskRecord, MissingDataWarning, RatioRecord};
use finrisk_common::{EngineKind, EngineRecord, Error, Result, StatementLine};
use futures::future::join_all;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

/// Complete result of one analysis run
///
/// Serializes to exactly the published output keys.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AnalysisOutput {
    pub profile_used: String,
    pub ratios: Vec<RatioRecord>,
    pub trend: Vec<EngineRecord>,
    pub cash_flow: Vec<EngineRecord>,
    pub anomaly: Vec<EngineRecord>,
    pub solvency: Vec<EngineRecord>,
    pub composite_risk: Vec<CompositeRiskRecord>,
    pub ai_interpretation: Vec<NarrativeResult>,
    /// Absent source lines seen by the ratio engine
    #[serde(skip)]
    pub warnings: Vec<MissingDataWarning>,
}

impl AnalysisOutput {
    /// Records produced by a rule engine (empty when it did not run)
    pub fn records(&self, kind: EngineKind) -> &[EngineRecord] {
        match kind {
            EngineKind::Trend => &self.trend,
            EngineKind::CashFlow => &self.cash_flow,
            EngineKind::Anomaly => &self.anomaly,
            EngineKind::Solvency => &self.solvency,
            EngineKind::Ratio | EngineKind::CompositeRisk => &[],
        }
    }

    fn set_records(&mut self, kind: EngineKind, records: Vec<EngineRecord>) {
        match kind {
            EngineKind::Trend => self.trend = records,
            EngineKind::CashFlow => self.cash_flow = records,
            EngineKind::Anomaly => self.anomaly = records,
            EngineKind::Solvency => self.solvency = records,
            EngineKind::Ratio | EngineKind::CompositeRisk => {}
        }
    }
}

/// Records addressable by Company-Year
trait Keyed {
    fn key(&self) -> (&str, i32);
}

impl Keyed for EngineRecord {
    fn key(&self) -> (&str, i32) {
        (&self.company, self.year)
    }
}

impl Keyed for CompositeRiskRecord {
    fn key(&self) -> (&str, i32) {
        (&self.company, self.year)
    }
}

fn index<T: Keyed>(records: &[T]) -> BTreeMap<(&str, i32), &T> {
    records.iter().map(|r| (r.key(), r)).collect()
}

/// Serialized record minus its identifying keys, or `{}` when absent
fn payload<T: Serialize>(record: Option<&T>) -> Result<Value> {
    let Some(record) = record else {
        return Ok(Value::Object(Map::new()));
    };
    let mut value = serde_json::to_value(record)?;
    if let Some(object) = value.as_object_mut() {
        for key in ["engine", "Company", "Year"] {
            object.remove(key);
        }
    }
    Ok(value)
}

/// Analysis pipeline bound to one merged configuration and one profile
pub struct Pipeline {
    config: Arc<ClientConfig>,
    profile: &'static AnalysisProfile,
    current_year: i32,
}

impl Pipeline {
    /// # Errors
    /// `Error::Configuration` for an unknown profile name.
    pub fn new(config: Arc<ClientConfig>, profile_name: &str) -> Result<Self> {
        let profile = profile(profile_name)?;
        Ok(Self {
            config,
            profile,
            current_year: chrono::Local::now().year(),
        })
    }

    /// Override the calendar year used for temporal mode
    pub fn with_current_year(mut self, year: i32) -> Self {
        self.current_year = year;
        self
    }

    pub fn profile(&self) -> &'static AnalysisProfile {
        self.profile
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Run the deterministic stages only
    pub async fn analyze(&self, lines: &[StatementLine]) -> Result<AnalysisOutput> {
        let span = info_span!("analysis_run", run_id = %Uuid::new_v4(), profile = self.profile.name);
        self.analyze_inner(lines).instrument(span).await
    }

    /// Run the deterministic stages, then the narrative stage if one is given
    ///
    /// Narrative failures are isolated per result; the deterministic output
    /// is always returned.
    pub async fn run(
        &self,
        lines: &[StatementLine],
        context: &ExternalContext,
        narrative: Option<&NarrativeStage>,
    ) -> Result<AnalysisOutput> {
        let span = info_span!("analysis_run", run_id = %Uuid::new_v4(), profile = self.profile.name);
        async {
            let mut output = self.analyze_inner(lines).await?;
            if let Some(stage) = narrative {
                let records = self.narrative_records(&output, context)?;
                output.ai_interpretation = stage.interpret_all(records).await;
            }
            Ok::<_, Error>(output)
        }
        .instrument(span)
        .await
    }

    async fn analyze_inner(&self, lines: &[StatementLine]) -> Result<AnalysisOutput> {
        let start = Instant::now();
        info!(lines = lines.len(), client = %self.config.client_name, "Starting analysis run");

        let normalized = normalize(lines);

        let ratio_run = compute_ratios(&normalized);
        sanity::check_all(&ratio_run.records)?;
        validate_records(EngineKind::Ratio.as_str(), &ratio_run.records)?;
        info!(
            keys = ratio_run.records.len(),
            missing_lines = ratio_run.warnings.len(),
            "Ratio stage complete"
        );

        let input = Arc::new(EngineInput {
            ratios: ratio_run.records.clone(),
            lines: normalized,
        });
        let outputs = self.run_rule_engines(input).await?;

        let mut output = AnalysisOutput {
            profile_used: self.profile.name.to_string(),
            ratios: ratio_run.records,
            warnings: ratio_run.warnings,
            ..AnalysisOutput::default()
        };

        if self.profile.composite {
            let slices: Vec<(EngineKind, &[EngineRecord])> = outputs
                .iter()
                .map(|(kind, records)| (*kind, records.as_slice()))
                .collect();
            let composite =
                CompositeRiskEngine::new(self.config.analysis.clone()).aggregate(&slices);
            validate_records(EngineKind::CompositeRisk.as_str(), &composite)?;
            output.composite_risk = composite;
        }

        for (kind, records) in outputs {
            output.set_records(kind, records);
        }

        info!(
            elapsed_ms = start.elapsed().as_millis() as u64,
            composite_keys = output.composite_risk.len(),
            "Analysis run complete"
        );
        Ok(output)
    }

    /// Run the profile's rule engines on the blocking pool and validate
    /// each output in profile order
    async fn run_rule_engines(
        &self,
        input: Arc<EngineInput>,
    ) -> Result<Vec<(EngineKind, Vec<EngineRecord>)>> {
        let engines: Vec<Arc<dyn RuleEngine>> = self
            .profile
            .engines
            .iter()
            .filter_map(|kind| engine_for(*kind, &self.config.thresholds))
            .collect();

        let tasks = engines.into_iter().map(|engine| {
            let input = Arc::clone(&input);
            tokio::task::spawn_blocking(move || (engine.kind(), engine.evaluate(&input)))
        });

        let mut outputs = Vec::with_capacity(self.profile.engines.len());
        for joined in join_all(tasks).await {
            let (kind, records) =
                joined.map_err(|e| Error::Internal(format!("rule engine task failed: {}", e)))?;
            outputs.push((kind, records));
        }

        for (kind, records) in &outputs {
            validate_records(kind.as_str(), records)?;
            info!(engine = %kind, records = records.len(), "Rule engine complete");
        }

        Ok(outputs)
    }

    /// Assemble one narrative record per ratio key
    pub fn narrative_records(
        &self,
        output: &AnalysisOutput,
        context: &ExternalContext,
    ) -> Result<Vec<NarrativeRecord>> {
        let trend = index(&output.trend);
        let cash_flow = index(&output.cash_flow);
        let anomaly = index(&output.anomaly);
        let solvency = index(&output.solvency);
        let composite = index(&output.composite_risk);

        output
            .ratios
            .iter()
            .map(|ratio| -> Result<NarrativeRecord> {
                let key = (ratio.company.as_str(), ratio.year);
                Ok(NarrativeRecord {
                    company: ratio.company.clone(),
                    year: ratio.year,
                    analysis_profile: self.profile.name.to_string(),
                    temporal_mode: TemporalMode::resolve(ratio.year, self.current_year),
                    context: context.resolve(&ratio.company, ratio.year),
                    ratios: self.profile.metric_scope.apply(ratio.metrics.to_map()),
                    trend: payload(trend.get(&key).copied())?,
                    cash_flow: payload(cash_flow.get(&key).copied())?,
                    anomaly: payload(anomaly.get(&key).copied())?,
                    solvency: payload(solvency.get(&key).copied())?,
                    composite_risk: payload(composite.get(&key).copied())?,
                })
            })
            .collect()
    }
}
