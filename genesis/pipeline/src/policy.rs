//! Value-weighted scoring of directives.

use std::{fmt, sync::Arc};

use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::json;
use shared_logging::LogLevel;

use crate::{
    directive::Directive,
    error::{DataQualityWarning, PipelineError, Stage},
    telemetry::{PipelineTelemetry, TelemetryExt},
};

/// Value name -> weight, kept in configuration order.
pub type ValueWeights = IndexMap<String, f64>;

/// Estimates how strongly a directive serves one value. Expected range `[0, 1]`.
pub trait ImpactModel: Send + Sync {
    /// Returns the raw impact of `directive` on `value`.
    fn simulate_impact(&self, directive: &Directive, value: &str) -> f64;
}

impl<F> ImpactModel for F
where
    F: Fn(&Directive, &str) -> f64 + Send + Sync,
{
    fn simulate_impact(&self, directive: &Directive, value: &str) -> f64 {
        self(directive, value)
    }
}

/// Model assigning the same impact to every value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConstantImpact(pub f64);

impl Default for ConstantImpact {
    fn default() -> Self {
        Self(0.5)
    }
}

impl ImpactModel for ConstantImpact {
    fn simulate_impact(&self, _directive: &Directive, _value: &str) -> f64 {
        self.0
    }
}

/// Score and its per-value breakdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    /// Sum of `weight * impact` over all values, in configuration order.
    pub score: f64,
    /// Each value's `weight * impact` term.
    pub contributions: IndexMap<String, f64>,
    /// Impacts that had to be clamped.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<DataQualityWarning>,
}

/// Scores directives against a fixed set of weighted values.
#[derive(Clone)]
pub struct PolicyEvaluator {
    weights: Arc<RwLock<ValueWeights>>,
    model: Arc<dyn ImpactModel>,
    telemetry: Option<PipelineTelemetry>,
}

impl fmt::Debug for PolicyEvaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolicyEvaluator")
            .field("weights", &*self.weights.read())
            .finish()
    }
}

impl PolicyEvaluator {
    /// Creates an evaluator over the given weights.
    #[must_use]
    pub fn new(weights: ValueWeights, model: Arc<dyn ImpactModel>) -> Self {
        Self {
            weights: Arc::new(RwLock::new(weights)),
            model,
            telemetry: None,
        }
    }

    /// Attaches telemetry sinks.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: PipelineTelemetry) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Scores a directive against a snapshot of the current weights.
    pub fn evaluate(&self, directive: &Directive) -> EvaluationResult {
        let weights = self.weights();
        let mut score = 0.0;
        let mut contributions = IndexMap::with_capacity(weights.len());
        let mut warnings = Vec::new();
        for (value, weight) in &weights {
            let raw = self.model.simulate_impact(directive, value);
            let (impact, warning) = DataQualityWarning::clamp_unit(Stage::Policy, value, raw);
            if let Some(warning) = warning {
                self.telemetry.log_quiet(
                    LogLevel::Warn,
                    "policy.impact_clamped",
                    json!({
                        "value": value,
                        "received": warning.received,
                        "applied": warning.applied,
                    }),
                );
                warnings.push(warning);
            }
            let term = weight * impact;
            score += term;
            contributions.insert(value.clone(), term);
        }
        self.telemetry.log_quiet(
            LogLevel::Info,
            "policy.evaluated",
            json!({
                "directive": directive.as_str(),
                "score": score,
                "values": contributions.len(),
            }),
        );
        EvaluationResult {
            score,
            contributions,
            warnings,
        }
    }

    /// Copy of the current weights.
    #[must_use]
    pub fn weights(&self) -> ValueWeights {
        self.weights.read().clone()
    }

    /// Value names in configuration order.
    #[must_use]
    pub fn value_names(&self) -> Vec<String> {
        self.weights.read().keys().cloned().collect()
    }

    /// Overwrites weights of known values. The value set itself never changes.
    pub fn apply_weights(&self, adjusted: &ValueWeights) -> Result<(), PipelineError> {
        let mut weights = self.weights.write();
        for (name, weight) in adjusted {
            if !weights.contains_key(name) {
                return Err(PipelineError::Configuration(format!(
                    "cannot reweight unknown value '{name}'"
                )));
            }
            if !weight.is_finite() || *weight < 0.0 {
                return Err(PipelineError::Configuration(format!(
                    "weight for '{name}' must be a finite non-negative number, got {weight}"
                )));
            }
        }
        for (name, weight) in adjusted {
            weights.insert(name.clone(), *weight);
        }
        drop(weights);
        self.telemetry.log_quiet(
            LogLevel::Info,
            "policy.weights_applied",
            json!({ "weights": adjusted }),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn reflective_weights() -> ValueWeights {
        IndexMap::from([
            ("care".to_string(), 0.9),
            ("justice".to_string(), 0.9),
            ("freedom".to_string(), 0.8),
        ])
    }

    fn directive() -> Directive {
        Directive::new("Deploy medical nanobots in flood zone").unwrap()
    }

    #[test]
    fn constant_impact_scores_weighted_sum() {
        let evaluator =
            PolicyEvaluator::new(reflective_weights(), Arc::new(ConstantImpact::default()));
        let result = evaluator.evaluate(&directive());
        assert!((result.score - 1.3).abs() < 1e-12);
        assert_eq!(
            result.contributions.keys().collect::<Vec<_>>(),
            vec!["care", "justice", "freedom"]
        );
        assert!((result.contributions["freedom"] - 0.4).abs() < 1e-12);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn evaluation_does_not_touch_weights() {
        let evaluator =
            PolicyEvaluator::new(reflective_weights(), Arc::new(ConstantImpact(0.75)));
        evaluator.evaluate(&directive());
        assert_eq!(evaluator.weights(), reflective_weights());
    }

    #[test]
    fn clamps_out_of_range_impacts() {
        let model = |_: &Directive, value: &str| if value == "care" { 3.0 } else { -1.0 };
        let evaluator = PolicyEvaluator::new(reflective_weights(), Arc::new(model));
        let result = evaluator.evaluate(&directive());
        assert_eq!(result.warnings.len(), 3);
        assert!((result.score - 0.9).abs() < 1e-12);
    }

    #[test]
    fn apply_weights_rejects_unknown_values() {
        let evaluator =
            PolicyEvaluator::new(reflective_weights(), Arc::new(ConstantImpact::default()));
        let unknown = IndexMap::from([("speed".to_string(), 1.0)]);
        assert!(evaluator.apply_weights(&unknown).is_err());
        assert_eq!(evaluator.weights(), reflective_weights());

        let adjusted = IndexMap::from([("care".to_string(), 0.6)]);
        evaluator.apply_weights(&adjusted).unwrap();
        assert!((evaluator.weights()["care"] - 0.6).abs() < f64::EPSILON);
        assert_eq!(evaluator.value_names(), vec!["care", "justice", "freedom"]);
    }

    fn table() -> impl Strategy<Value = Vec<(f64, f64)>> {
        proptest::collection::vec((0.0f64..5.0, 0.0f64..=1.0), 1..12)
    }

    proptest! {
        #[test]
        fn score_is_exact_weighted_sum(rows in table()) {
            let weights: ValueWeights = rows
                .iter()
                .enumerate()
                .map(|(idx, (weight, _))| (format!("value-{idx}"), *weight))
                .collect();
            let impacts: IndexMap<String, f64> = rows
                .iter()
                .enumerate()
                .map(|(idx, (_, impact))| (format!("value-{idx}"), *impact))
                .collect();
            let lookup = impacts.clone();
            let model = move |_: &Directive, value: &str| lookup[value];
            let evaluator = PolicyEvaluator::new(weights.clone(), Arc::new(model));

            let result = evaluator.evaluate(&directive());

            let mut expected = 0.0;
            for (name, weight) in &weights {
                expected += weight * impacts[name];
            }
            prop_assert_eq!(result.score.to_bits(), expected.to_bits());
            prop_assert!(result.warnings.is_empty());
        }

        #[test]
        fn clamped_impacts_stay_in_unit_range(raw in proptest::num::f64::ANY) {
            let evaluator = PolicyEvaluator::new(
                IndexMap::from([("care".to_string(), 1.0)]),
                Arc::new(ConstantImpact(raw)),
            );
            let result = evaluator.evaluate(&directive());
            prop_assert!((0.0..=1.0).contains(&result.score));
        }
    }
}
