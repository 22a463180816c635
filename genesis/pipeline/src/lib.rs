#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! Directive-evaluation pipeline: belief flagging, value-weighted scoring,
//! external justification, informational reports, and governance gating.

/// Confidence inference and belief flagging.
pub mod belief;
/// Pipeline configuration and presets.
pub mod config;
/// Caller-facing acknowledgements.
pub mod dialogue;
/// Validated directive text.
pub mod directive;
/// Error taxonomy and data-quality warnings.
pub mod error;
/// Veto flag and decision log.
pub mod governance;
/// External justification with timeout and validation.
pub mod justifier;
/// Stage orchestration.
pub mod pipeline;
/// Value-weighted scoring.
pub mod policy;
/// Planner and simulator reports.
pub mod reports;
/// Log and event fan-out.
pub mod telemetry;

pub use belief::{
    BeliefStore, BeliefThreshold, BeliefUpdate, ConfidenceModel, FixedConfidence, FlaggedBelief,
};
pub use config::{PipelineConfig, ThresholdPolarity};
pub use directive::Directive;
pub use error::{DataQualityWarning, ExternalServiceError, PipelineError, Stage};
pub use governance::{DecisionStatus, GovernanceDecision, GovernanceGate};
pub use justifier::{
    ExternalAnalysis, ExternalAnalyst, JustificationResult, Justifier, ScriptedAnalyst,
};
pub use pipeline::{DirectivePipeline, DirectivePipelineBuilder, DirectiveResult};
pub use policy::{ConstantImpact, EvaluationResult, ImpactModel, PolicyEvaluator, ValueWeights};
pub use reports::{Planner, ReportEntry, ReportGenerator, ReportSet, Simulator};
pub use telemetry::{PipelineTelemetry, PipelineTelemetryBuilder};
