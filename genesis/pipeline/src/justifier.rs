//! External explain-and-reweight stage.

use std::{collections::HashSet, fmt, sync::Arc, time::Duration};

use anyhow::Result;
use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::json;
use shared_logging::LogLevel;

use crate::{
    directive::Directive,
    error::ExternalServiceError,
    policy::ValueWeights,
    telemetry::{PipelineTelemetry, TelemetryExt},
};

/// Explanation substituted when the external service cannot be used.
pub const UNAVAILABLE: &str = "unavailable";

/// Adjusted weights must fall strictly inside this open interval.
pub const WEIGHT_BOUNDS: (f64, f64) = (0.0, 2.0);

/// Raw answer from an external analyst, before validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalAnalysis {
    /// Free-text rationale.
    pub explanation: String,
    /// Proposed weight per value name.
    pub weights: ValueWeights,
}

/// Service that explains a directive and proposes new value weights.
#[async_trait]
pub trait ExternalAnalyst: Send + Sync {
    /// Analyses `directive` with respect to `values`.
    async fn analyze(&self, directive: &Directive, values: &[String]) -> Result<ExternalAnalysis>;
}

/// Deterministic analyst: fixed explanation and weights `base + step * index`.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptedAnalyst {
    explanation: String,
    base: f64,
    step: f64,
}

impl ScriptedAnalyst {
    /// Creates an analyst with the given explanation and weight progression.
    #[must_use]
    pub fn new(explanation: impl Into<String>, base: f64, step: f64) -> Self {
        Self {
            explanation: explanation.into(),
            base,
            step,
        }
    }
}

/// Rationale returned by [`ScriptedAnalyst::default`].
pub const DEFAULT_EXPLANATION: &str = "The directive balances urgent intervention against \
                                       autonomy and fairness for the people it affects.";

impl Default for ScriptedAnalyst {
    fn default() -> Self {
        Self::new(DEFAULT_EXPLANATION, 0.6, 0.1)
    }
}

#[async_trait]
impl ExternalAnalyst for ScriptedAnalyst {
    async fn analyze(&self, _directive: &Directive, values: &[String]) -> Result<ExternalAnalysis> {
        let weights = values
            .iter()
            .enumerate()
            .map(|(idx, name)| {
                #[allow(clippy::cast_precision_loss)]
                let offset = self.step * idx as f64;
                (name.clone(), self.base + offset)
            })
            .collect();
        Ok(ExternalAnalysis {
            explanation: self.explanation.clone(),
            weights,
        })
    }
}

/// Validated justification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JustificationResult {
    /// Human-readable rationale.
    pub explanation: String,
    /// Advisory weights covering exactly the requested values.
    pub adjusted_weights: ValueWeights,
}

impl JustificationResult {
    /// Placeholder recorded when the external call failed.
    #[must_use]
    pub fn unavailable() -> Self {
        Self {
            explanation: UNAVAILABLE.to_string(),
            adjusted_weights: IndexMap::new(),
        }
    }

    /// Whether this is the failure placeholder.
    #[must_use]
    pub fn is_unavailable(&self) -> bool {
        self.explanation == UNAVAILABLE && self.adjusted_weights.is_empty()
    }
}

/// Calls the external analyst under a timeout and checks its answer.
#[derive(Clone)]
pub struct Justifier {
    analyst: Arc<dyn ExternalAnalyst>,
    timeout: Duration,
    telemetry: Option<PipelineTelemetry>,
}

impl fmt::Debug for Justifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Justifier")
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Justifier {
    /// Creates a justifier with the given call budget.
    #[must_use]
    pub fn new(analyst: Arc<dyn ExternalAnalyst>, timeout: Duration) -> Self {
        Self {
            analyst,
            timeout,
            telemetry: None,
        }
    }

    /// Attaches telemetry sinks.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: PipelineTelemetry) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Configured call budget.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Requests an explanation and adjusted weights for `values`.
    pub async fn analyze(
        &self,
        directive: &Directive,
        values: &[String],
    ) -> Result<JustificationResult, ExternalServiceError> {
        self.telemetry.log_quiet(
            LogLevel::Debug,
            "justifier.request",
            json!({ "directive": directive.as_str(), "values": values }),
        );
        let call = self.analyst.analyze(directive, values);
        let outcome = match tokio::time::timeout(self.timeout, call).await {
            Err(_) => Err(ExternalServiceError::TimedOut(
                u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
            )),
            Ok(Err(err)) => Err(ExternalServiceError::CallFailed(format!("{err:#}"))),
            Ok(Ok(analysis)) => validate(analysis, values),
        };
        match &outcome {
            Ok(result) => self.telemetry.log_quiet(
                LogLevel::Info,
                "justifier.completed",
                json!({ "directive": directive.as_str(), "weights": result.adjusted_weights }),
            ),
            Err(err) => {
                let payload = json!({ "directive": directive.as_str(), "error": err });
                self.telemetry
                    .log_quiet(LogLevel::Warn, "justifier.unavailable", payload.clone());
                self.telemetry.event_quiet("justifier.unavailable", payload);
            }
        }
        outcome
    }
}

fn validate(
    analysis: ExternalAnalysis,
    values: &[String],
) -> Result<JustificationResult, ExternalServiceError> {
    if analysis.explanation.trim().is_empty() {
        return Err(ExternalServiceError::Malformed(
            "explanation is empty".into(),
        ));
    }
    let expected: HashSet<&str> = values.iter().map(String::as_str).collect();
    if let Some(missing) = values.iter().find(|name| !analysis.weights.contains_key(*name)) {
        return Err(ExternalServiceError::Malformed(format!(
            "missing weight for '{missing}'"
        )));
    }
    if let Some(extra) = analysis
        .weights
        .keys()
        .find(|name| !expected.contains(name.as_str()))
    {
        return Err(ExternalServiceError::Malformed(format!(
            "unexpected weight for '{extra}'"
        )));
    }
    let (low, high) = WEIGHT_BOUNDS;
    if let Some((name, weight)) = analysis
        .weights
        .iter()
        .find(|(_, weight)| !(weight.is_finite() && **weight > low && **weight < high))
    {
        return Err(ExternalServiceError::Malformed(format!(
            "weight {weight} for '{name}' outside ({low}, {high})"
        )));
    }
    // Report weights in the caller's value order.
    let adjusted_weights = values
        .iter()
        .map(|name| (name.clone(), analysis.weights[name.as_str()]))
        .collect();
    Ok(JustificationResult {
        explanation: analysis.explanation,
        adjusted_weights,
    })
}
