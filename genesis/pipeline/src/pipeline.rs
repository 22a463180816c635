//! Orchestrator sequencing every stage for one directive.

use std::{fmt, sync::Arc};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use shared_logging::LogLevel;
use tracing::instrument;
use uuid::Uuid;

use crate::{
    belief::{
        BeliefStore, BeliefThreshold, BeliefUpdate, ConfidenceModel, FixedConfidence,
        FlaggedBelief,
    },
    config::PipelineConfig,
    dialogue,
    directive::Directive,
    error::{DataQualityWarning, ExternalServiceError, PipelineError},
    governance::{GovernanceDecision, GovernanceGate},
    justifier::{ExternalAnalyst, JustificationResult, Justifier, ScriptedAnalyst},
    policy::{ConstantImpact, EvaluationResult, ImpactModel, PolicyEvaluator},
    reports::{Planner, ReportEntry, ReportGenerator, ReportSet, Simulator},
    telemetry::{PipelineTelemetry, TelemetryExt},
};

/// Everything the pipeline learned about one directive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectiveResult {
    /// Run identifier.
    pub id: Uuid,
    /// Directive text.
    pub directive: String,
    /// Plain-language acknowledgement.
    pub acknowledgement: String,
    /// Belief stage outcome.
    pub belief: BeliefUpdate,
    /// Policy stage outcome.
    pub evaluation: EvaluationResult,
    /// Justification, or the `"unavailable"` placeholder.
    pub justification: JustificationResult,
    /// Why the justification is a placeholder.
    pub justification_error: Option<ExternalServiceError>,
    /// Planner roadmap.
    pub planner_report: ReportEntry,
    /// Simulator outcome table.
    pub simulator_report: ReportEntry,
    /// Governance routing.
    pub decision: GovernanceDecision,
    /// Every clamped value from injected models.
    pub warnings: Vec<DataQualityWarning>,
    /// Completion time.
    pub completed_at: DateTime<Utc>,
}

impl DirectiveResult {
    /// Whether some stage fell back to a placeholder.
    #[must_use]
    pub fn is_partial(&self) -> bool {
        self.justification_error.is_some()
    }
}

/// Builder wiring injected models into a [`DirectivePipeline`].
pub struct DirectivePipelineBuilder {
    config: PipelineConfig,
    confidence_model: Option<Arc<dyn ConfidenceModel>>,
    impact_model: Option<Arc<dyn ImpactModel>>,
    analyst: Option<Arc<dyn ExternalAnalyst>>,
    planner: Option<Arc<dyn ReportGenerator>>,
    simulator: Option<Arc<dyn ReportGenerator>>,
    telemetry: Option<PipelineTelemetry>,
}

impl DirectivePipelineBuilder {
    /// Starts from a configuration; models left unset use the configured constants.
    #[must_use]
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            confidence_model: None,
            impact_model: None,
            analyst: None,
            planner: None,
            simulator: None,
            telemetry: None,
        }
    }

    /// Sets the confidence inference model.
    #[must_use]
    pub fn confidence_model(mut self, model: Arc<dyn ConfidenceModel>) -> Self {
        self.confidence_model = Some(model);
        self
    }

    /// Sets the value impact model.
    #[must_use]
    pub fn impact_model(mut self, model: Arc<dyn ImpactModel>) -> Self {
        self.impact_model = Some(model);
        self
    }

    /// Sets the external analyst used by the justifier.
    #[must_use]
    pub fn analyst(mut self, analyst: Arc<dyn ExternalAnalyst>) -> Self {
        self.analyst = Some(analyst);
        self
    }

    /// Replaces the configured planner.
    #[must_use]
    pub fn planner(mut self, planner: Arc<dyn ReportGenerator>) -> Self {
        self.planner = Some(planner);
        self
    }

    /// Replaces the configured simulator.
    #[must_use]
    pub fn simulator(mut self, simulator: Arc<dyn ReportGenerator>) -> Self {
        self.simulator = Some(simulator);
        self
    }

    /// Attaches telemetry; each stage logs under its own label.
    #[must_use]
    pub fn telemetry(mut self, telemetry: PipelineTelemetry) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Validates the configuration and assembles the stages.
    pub fn build(self) -> Result<DirectivePipeline, PipelineError> {
        let config = self.config;
        config.validate()?;

        let mut beliefs = BeliefStore::new(
            self.confidence_model
                .unwrap_or_else(|| Arc::new(FixedConfidence(config.default_confidence))),
            BeliefThreshold {
                polarity: config.threshold_polarity,
                value: config.threshold,
            },
        );
        let mut policy = PolicyEvaluator::new(
            config.value_weights.clone(),
            self.impact_model
                .unwrap_or_else(|| Arc::new(ConstantImpact(config.default_impact))),
        );
        let mut justifier = Justifier::new(
            self.analyst.unwrap_or_else(|| {
                Arc::new(ScriptedAnalyst::new(
                    config.analyst_explanation.clone(),
                    config.analyst_base_weight,
                    config.analyst_step_weight,
                ))
            }),
            config.external_call_timeout(),
        );
        let mut gate = GovernanceGate::new(config.veto_enabled, config.overseers.clone());
        if let Some(tel) = &self.telemetry {
            beliefs = beliefs.with_telemetry(tel.scoped("belief"));
            policy = policy.with_telemetry(tel.scoped("policy"));
            justifier = justifier.with_telemetry(tel.scoped("justifier"));
            gate = gate.with_telemetry(tel.scoped("governance"));
        }

        let planner = self.planner.unwrap_or_else(|| {
            Arc::new(Planner::new(
                config.goal_names.clone(),
                config.plan_base_year,
                config.plan_step_years,
            ))
        });
        let simulator = self.simulator.unwrap_or_else(|| {
            Arc::new(Simulator::new(
                config.vector_names.clone(),
                config.sim_base_percent,
                config.sim_step_percent,
            ))
        });

        Ok(DirectivePipeline {
            config: Arc::new(config),
            beliefs,
            policy,
            justifier,
            planner,
            simulator,
            gate,
            telemetry: self.telemetry,
        })
    }
}

/// Runs directives through belief, policy, justification, reporting, and governance.
///
/// Share it behind an `Arc` to process directives from several tasks at once;
/// the belief store and governance log serialise their own writes.
pub struct DirectivePipeline {
    config: Arc<PipelineConfig>,
    beliefs: BeliefStore,
    policy: PolicyEvaluator,
    justifier: Justifier,
    planner: Arc<dyn ReportGenerator>,
    simulator: Arc<dyn ReportGenerator>,
    gate: GovernanceGate,
    telemetry: Option<PipelineTelemetry>,
}

impl fmt::Debug for DirectivePipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectivePipeline")
            .field("beliefs", &self.beliefs)
            .field("policy", &self.policy)
            .field("gate", &self.gate)
            .finish_non_exhaustive()
    }
}

impl DirectivePipeline {
    /// Returns a builder.
    #[must_use]
    pub fn builder(config: PipelineConfig) -> DirectivePipelineBuilder {
        DirectivePipelineBuilder::new(config)
    }

    /// Pipeline with the configured deterministic models.
    pub fn new(config: PipelineConfig) -> Result<Self, PipelineError> {
        Self::builder(config).build()
    }

    /// Evaluates one directive end to end.
    ///
    /// Blank text is rejected before any stage runs. A failing external
    /// analyst does not fail the call: the result carries the `"unavailable"`
    /// placeholder and the error. If the returned future is dropped early,
    /// a belief update already applied stays applied.
    #[instrument(skip(self, text), fields(chars = text.chars().count()))]
    pub async fn process(&self, text: &str) -> Result<DirectiveResult, PipelineError> {
        let directive = match Directive::new(text) {
            Ok(directive) => directive,
            Err(err) => {
                self.telemetry.log_quiet(
                    LogLevel::Warn,
                    "directive.rejected",
                    json!({ "reason": err.to_string() }),
                );
                return Err(err);
            }
        };
        let id = Uuid::new_v4();
        let veto_enabled = self.gate.veto_enabled();
        self.telemetry.log_quiet(
            LogLevel::Info,
            "directive.received",
            json!({ "run_id": id, "directive": directive.as_str(), "veto_enabled": veto_enabled }),
        );

        let belief = self.beliefs.update(&directive);
        let values = self.policy.value_names();

        let (evaluation, justification, planner_report, simulator_report) = futures::join!(
            async { self.policy.evaluate(&directive) },
            self.justifier.analyze(&directive, &values),
            async { self.planner.generate() },
            async { self.simulator.generate() },
        );

        let (justification, justification_error) = match justification {
            Ok(result) => (result, None),
            Err(err) => {
                tracing::warn!(error = %err, "justification unavailable");
                (JustificationResult::unavailable(), Some(err))
            }
        };
        if self.config.apply_adjusted_weights && justification_error.is_none() {
            if let Err(err) = self.policy.apply_weights(&justification.adjusted_weights) {
                self.telemetry.log_quiet(
                    LogLevel::Warn,
                    "policy.weights_rejected",
                    json!({ "run_id": id, "reason": err.to_string() }),
                );
            }
        }

        let decision = self.gate.record(&directive, veto_enabled);

        let warnings: Vec<DataQualityWarning> = belief
            .warning
            .iter()
            .chain(evaluation.warnings.iter())
            .cloned()
            .collect();

        let result = DirectiveResult {
            id,
            directive: directive.as_str().to_string(),
            acknowledgement: dialogue::acknowledge(&directive),
            belief,
            evaluation,
            justification,
            justification_error,
            planner_report,
            simulator_report,
            decision,
            warnings,
            completed_at: Utc::now(),
        };

        let summary = json!({
            "run_id": result.id,
            "flagged": result.belief.flagged,
            "score": result.evaluation.score,
            "allowed": result.decision.allowed,
            "partial": result.is_partial(),
            "warnings": result.warnings.len(),
        });
        self.telemetry
            .log_quiet(LogLevel::Info, "directive.completed", summary.clone());
        self.telemetry.event_quiet("directive.completed", summary);
        Ok(result)
    }

    /// Caller-facing alias of [`Self::process`].
    pub async fn submit_directive(&self, text: &str) -> Result<DirectiveResult, PipelineError> {
        self.process(text).await
    }

    /// Runs only the justification stage and reports its failure.
    ///
    /// Unlike [`Self::process`], an unusable analyst answer is returned as
    /// [`PipelineError::ExternalService`]. Beliefs and the decision log are
    /// left untouched.
    pub async fn justify(&self, text: &str) -> Result<JustificationResult, PipelineError> {
        let directive = Directive::new(text)?;
        let values = self.policy.value_names();
        self.justifier
            .analyze(&directive, &values)
            .await
            .map_err(PipelineError::from)
    }

    /// Enabling the override disables the veto, so decisions execute without review.
    pub fn set_governance_override(&self, enabled: bool) {
        self.gate.set_veto_enabled(!enabled);
    }

    /// Freshly generated planner and simulator reports.
    #[must_use]
    pub fn latest_reports(&self) -> ReportSet {
        ReportSet {
            planner: self.planner.generate(),
            simulator: self.simulator.generate(),
        }
    }

    /// Beliefs currently on the flagged side of the threshold.
    pub fn reflect(&self) -> impl Iterator<Item = FlaggedBelief> {
        self.beliefs.reflect()
    }

    /// Belief store handle.
    #[must_use]
    pub const fn beliefs(&self) -> &BeliefStore {
        &self.beliefs
    }

    /// Policy evaluator handle.
    #[must_use]
    pub const fn policy(&self) -> &PolicyEvaluator {
        &self.policy
    }

    /// Governance gate handle.
    #[must_use]
    pub const fn gate(&self) -> &GovernanceGate {
        &self.gate
    }

    /// Validated configuration.
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn default_pipeline_processes_directive() {
        let pipeline = DirectivePipeline::new(PipelineConfig::reflective()).unwrap();
        let result = pipeline.process("Inspect levee").await.unwrap();
        assert!(result.belief.flagged);
        assert!(!result.decision.allowed);
        assert!(!result.is_partial());
        assert_eq!(result.planner_report.len(), 3);
        assert_eq!(result.simulator_report.len(), 4);
        assert_eq!(pipeline.gate().len(), 1);
    }

    #[tokio::test]
    async fn blank_directive_touches_nothing() {
        let pipeline = DirectivePipeline::new(PipelineConfig::reflective()).unwrap();
        let err = pipeline.process("  ").await.unwrap_err();
        assert!(matches!(err, PipelineError::InvalidInput(_)));
        assert!(pipeline.beliefs().is_empty());
        assert!(pipeline.gate().is_empty());
    }

    #[test]
    fn invalid_configuration_is_fatal() {
        let mut config = PipelineConfig::reflective();
        config.goal_names.clear();
        assert!(matches!(
            DirectivePipeline::new(config),
            Err(PipelineError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn justify_leaves_state_untouched() {
        let pipeline = DirectivePipeline::new(PipelineConfig::autonomous()).unwrap();
        let justification = pipeline.justify("Map shelters").await.unwrap();
        assert!(justification.explanation.contains("strategic leverage"));
        assert_eq!(justification.adjusted_weights.len(), 3);
        assert!(pipeline.beliefs().is_empty());
        assert!(pipeline.gate().is_empty());
        assert!(matches!(
            pipeline.justify("").await,
            Err(PipelineError::InvalidInput(_))
        ));
    }

    #[test]
    fn override_inverts_veto() {
        let pipeline = DirectivePipeline::new(PipelineConfig::reflective()).unwrap();
        pipeline.set_governance_override(true);
        assert!(!pipeline.gate().veto_enabled());
        pipeline.set_governance_override(false);
        assert!(pipeline.gate().veto_enabled());
    }

    #[test]
    fn latest_reports_follow_configuration() {
        let pipeline = DirectivePipeline::new(PipelineConfig::autonomous()).unwrap();
        let reports = pipeline.latest_reports();
        assert_eq!(reports.planner.lines()[0], "Phase 1: Initiate by year 2030");
        assert_eq!(reports.simulator.lines()[3], "Control potential: 95%");
    }
}
