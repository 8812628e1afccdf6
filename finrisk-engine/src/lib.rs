//! finrisk-engine library interface
//!
//! Statement normalization, ratio derivation, rule engines, schema contracts,
//! composite risk aggregation and the narrative hand-off, driven by
//! [`orchestrator::Pipeline`].

pub mod composite;
pub mod context;
pub mod contracts;
pub mod engines;
pub mod narrative;
pub mod normalizer;
pub mod orchestrator;
pub mod profiles;
pub mod ratio;

pub use composite::CompositeRiskEngine;
pub use context::{ExternalContext, TemporalMode};
pub use narrative::{NarrativeInterpreter, NarrativeStage, StaticInterpreter};
pub use orchestrator::{AnalysisOutput, Pipeline};
pub use profiles::{profile, AnalysisProfile, MetricScope};
