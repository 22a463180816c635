//! Error kinds surfaced by the pipeline.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that abort construction or a single `process` call.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PipelineError {
    /// The directive was rejected before any stage ran.
    #[error("invalid directive: {0}")]
    InvalidInput(String),
    /// Weights, goals, vectors, or limits are missing or out of range.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// The external justification service could not be used. Only
    /// `DirectivePipeline::justify` returns this; `process` records the
    /// failure in its result instead.
    #[error(transparent)]
    ExternalService(#[from] ExternalServiceError),
}

/// Failure of the external explain-and-reweight call.
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum ExternalServiceError {
    /// The analyst returned an error; carries the rendered cause chain.
    #[error("external call failed: {0}")]
    CallFailed(String),
    /// No answer arrived within the configured budget.
    #[error("external call timed out after {0} ms")]
    TimedOut(u64),
    /// The answer violated the response contract.
    #[error("malformed external response: {0}")]
    Malformed(String),
}

/// Pipeline stage that produced a warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Belief confidence inference.
    Belief,
    /// Value impact simulation.
    Policy,
}

/// Non-fatal notice that an injected function returned an out-of-range value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataQualityWarning {
    /// Stage that clamped the value.
    pub stage: Stage,
    /// What the value described (directive text or value name).
    pub subject: String,
    /// Raw value returned by the injected function.
    pub received: f64,
    /// Value actually used.
    pub applied: f64,
}

impl DataQualityWarning {
    /// Clamps `raw` into `[0, 1]`. Non-finite input maps to `0.0`.
    /// Returns the usable value and a warning when anything changed.
    #[must_use]
    pub fn clamp_unit(stage: Stage, subject: &str, raw: f64) -> (f64, Option<Self>) {
        let applied = if raw.is_finite() {
            raw.clamp(0.0, 1.0)
        } else {
            0.0
        };
        // Exact comparison is intended: any adjustment is reported.
        #[allow(clippy::float_cmp)]
        let unchanged = raw == applied;
        if unchanged {
            (applied, None)
        } else {
            (
                applied,
                Some(Self {
                    stage,
                    subject: subject.to_string(),
                    received: raw,
                    applied,
                }),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_range_values_pass_through() {
        let (value, warning) = DataQualityWarning::clamp_unit(Stage::Belief, "d", 0.42);
        assert!((value - 0.42).abs() < f64::EPSILON);
        assert!(warning.is_none());
    }

    #[test]
    fn out_of_range_values_are_clamped_and_reported() {
        let (value, warning) = DataQualityWarning::clamp_unit(Stage::Policy, "care", 1.7);
        assert!((value - 1.0).abs() < f64::EPSILON);
        let warning = warning.unwrap();
        assert_eq!(warning.stage, Stage::Policy);
        assert_eq!(warning.subject, "care");

        let (value, warning) = DataQualityWarning::clamp_unit(Stage::Belief, "d", f64::NAN);
        assert_eq!(value, 0.0);
        assert!(warning.is_some());
    }

    #[test]
    fn external_errors_render_their_cause() {
        let err = PipelineError::from(ExternalServiceError::TimedOut(250));
        assert_eq!(err.to_string(), "external call timed out after 250 ms");
    }
}
