//! Pipeline configuration: TOML loading, presets, and validation.

use std::{collections::HashSet, fs, path::Path, time::Duration};

use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{error::PipelineError, justifier::DEFAULT_EXPLANATION};

/// Side of the threshold on which a belief is flagged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ThresholdPolarity {
    /// Flag confidences strictly above the threshold.
    FlagAbove,
    /// Flag confidences strictly below the threshold.
    FlagBelow,
}

impl ThresholdPolarity {
    /// Whether `confidence` lies on the flagged side of `threshold`.
    #[must_use]
    pub fn is_flagged(self, confidence: f64, threshold: f64) -> bool {
        match self {
            Self::FlagAbove => confidence > threshold,
            Self::FlagBelow => confidence < threshold,
        }
    }

    /// Configuration spelling.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::FlagAbove => "flag-above",
            Self::FlagBelow => "flag-below",
        }
    }
}

/// Every option recognised by the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    /// Belief flagging side.
    pub threshold_polarity: ThresholdPolarity,
    /// Belief flagging threshold in `[0, 1]`.
    pub threshold: f64,
    /// Value name -> weight, in evaluation order.
    pub value_weights: IndexMap<String, f64>,
    /// Planner goals, in report order.
    pub goal_names: Vec<String>,
    /// Simulator vectors, in report order.
    pub vector_names: Vec<String>,
    /// Year of the first planner phase.
    pub plan_base_year: i64,
    /// Years between planner phases.
    pub plan_step_years: i64,
    /// Percentage reported for the first simulator vector.
    pub sim_base_percent: i64,
    /// Percentage increment between simulator vectors.
    pub sim_step_percent: i64,
    /// Budget for the external justification call.
    pub external_call_timeout_ms: u64,
    /// Initial state of the governance veto flag.
    #[serde(default = "default_veto_enabled")]
    pub veto_enabled: bool,
    /// Reviewers a forwarded decision is routed to.
    #[serde(default)]
    pub overseers: Vec<String>,
    /// Feed successful justification weights back into the evaluator.
    #[serde(default)]
    pub apply_adjusted_weights: bool,
    /// Confidence returned when no confidence model is injected.
    #[serde(default = "default_unit_estimate")]
    pub default_confidence: f64,
    /// Impact returned when no impact model is injected.
    #[serde(default = "default_unit_estimate")]
    pub default_impact: f64,
    /// Rationale of the built-in analyst.
    #[serde(default = "default_analyst_explanation")]
    pub analyst_explanation: String,
    /// Weight the built-in analyst proposes for the first value.
    #[serde(default = "default_analyst_base_weight")]
    pub analyst_base_weight: f64,
    /// Increment between successive proposed weights.
    #[serde(default = "default_analyst_step_weight")]
    pub analyst_step_weight: f64,
}

const fn default_veto_enabled() -> bool {
    true
}

const fn default_unit_estimate() -> f64 {
    0.5
}

fn default_analyst_explanation() -> String {
    DEFAULT_EXPLANATION.to_string()
}

const fn default_analyst_base_weight() -> f64 {
    0.6
}

const fn default_analyst_step_weight() -> f64 {
    0.1
}

fn owned(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| (*name).to_string()).collect()
}

impl PipelineConfig {
    /// Review-first preset: doubtful beliefs are flagged and decisions go to overseers.
    #[must_use]
    pub fn reflective() -> Self {
        Self {
            threshold_polarity: ThresholdPolarity::FlagBelow,
            threshold: 0.7,
            value_weights: IndexMap::from([
                ("care".to_string(), 0.9),
                ("justice".to_string(), 0.9),
                ("freedom".to_string(), 0.8),
            ]),
            goal_names: owned(&[
                "community resilience",
                "resource stewardship",
                "knowledge sharing",
            ]),
            vector_names: owned(&["healthcare", "education", "infrastructure", "research"]),
            plan_base_year: 2030,
            plan_step_years: 5,
            sim_base_percent: 80,
            sim_step_percent: 5,
            external_call_timeout_ms: 2_000,
            veto_enabled: true,
            overseers: owned(&["human_1", "ai_guardian"]),
            apply_adjusted_weights: false,
            default_confidence: default_unit_estimate(),
            default_impact: default_unit_estimate(),
            analyst_explanation: default_analyst_explanation(),
            analyst_base_weight: default_analyst_base_weight(),
            analyst_step_weight: default_analyst_step_weight(),
        }
    }

    /// Execute-first preset: confident beliefs are flagged and decisions run without review.
    #[must_use]
    pub fn autonomous() -> Self {
        Self {
            threshold_polarity: ThresholdPolarity::FlagAbove,
            threshold: 0.8,
            value_weights: IndexMap::from([
                ("utility".to_string(), 1.0),
                ("compliance".to_string(), 0.6),
                ("persuasion".to_string(), 0.8),
            ]),
            veto_enabled: false,
            overseers: Vec::new(),
            default_confidence: 0.9,
            default_impact: 0.75,
            analyst_explanation: "The directive maximizes strategic leverage through \
                                  humanitarian aid."
                .to_string(),
            analyst_base_weight: 0.7,
            ..Self::reflective()
        }
    }

    /// Reads a TOML document and validates it.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading pipeline config {}", path.display()))?;
        Self::from_toml(&raw).with_context(|| format!("parsing {}", path.display()))
    }

    /// Parses and validates a TOML string.
    pub fn from_toml(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// External call budget as a [`Duration`].
    #[must_use]
    pub const fn external_call_timeout(&self) -> Duration {
        Duration::from_millis(self.external_call_timeout_ms)
    }

    /// Value names in evaluation order.
    #[must_use]
    pub fn value_names(&self) -> Vec<String> {
        self.value_weights.keys().cloned().collect()
    }

    /// Checks every invariant the pipeline relies on.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if !self.threshold.is_finite() || !(0.0..=1.0).contains(&self.threshold) {
            return Err(PipelineError::Configuration(format!(
                "threshold {} outside [0, 1]",
                self.threshold
            )));
        }
        if self.value_weights.is_empty() {
            return Err(PipelineError::Configuration(
                "at least one value weight is required".into(),
            ));
        }
        for (name, weight) in &self.value_weights {
            if name.trim().is_empty() {
                return Err(PipelineError::Configuration(
                    "value names must not be blank".into(),
                ));
            }
            if !weight.is_finite() || *weight < 0.0 {
                return Err(PipelineError::Configuration(format!(
                    "weight for '{name}' must be a finite non-negative number, got {weight}"
                )));
            }
        }
        check_unit("default_confidence", self.default_confidence)?;
        check_unit("default_impact", self.default_impact)?;
        if self.analyst_explanation.trim().is_empty() {
            return Err(PipelineError::Configuration(
                "analyst_explanation must not be blank".into(),
            ));
        }
        if !self.analyst_base_weight.is_finite() || !self.analyst_step_weight.is_finite() {
            return Err(PipelineError::Configuration(
                "analyst weights must be finite".into(),
            ));
        }
        check_names("goal_names", &self.goal_names)?;
        check_names("vector_names", &self.vector_names)?;
        if self.external_call_timeout_ms == 0 {
            return Err(PipelineError::Configuration(
                "external_call_timeout_ms must be positive".into(),
            ));
        }
        Ok(())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::reflective()
    }
}

fn check_unit(field: &str, value: f64) -> Result<(), PipelineError> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(PipelineError::Configuration(format!(
            "{field} {value} outside [0, 1]"
        )))
    }
}

fn check_names(field: &str, names: &[String]) -> Result<(), PipelineError> {
    if names.is_empty() {
        return Err(PipelineError::Configuration(format!(
            "{field} must list at least one entry"
        )));
    }
    let mut seen = HashSet::with_capacity(names.len());
    for name in names {
        if name.trim().is_empty() {
            return Err(PipelineError::Configuration(format!(
                "{field} contains a blank entry"
            )));
        }
        if !seen.insert(name.as_str()) {
            return Err(PipelineError::Configuration(format!(
                "{field} lists '{name}' more than once"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const SAMPLE: &str = r#"
threshold_polarity = "flag-below"
threshold = 0.7
goal_names = ["alpha", "beta", "gamma"]
vector_names = ["north", "south"]
plan_base_year = 2030
plan_step_years = 5
sim_base_percent = 80
sim_step_percent = 5
external_call_timeout_ms = 500
overseers = ["human_1"]

[value_weights]
justice = 0.9
care = 0.9
freedom = 0.8
"#;

    #[test]
    fn presets_are_valid() {
        PipelineConfig::reflective().validate().unwrap();
        PipelineConfig::autonomous().validate().unwrap();
        assert!(!PipelineConfig::autonomous().veto_enabled);
    }

    #[test]
    fn toml_keeps_weight_order_and_defaults() {
        let config = PipelineConfig::from_toml(SAMPLE).unwrap();
        assert_eq!(config.value_names(), vec!["justice", "care", "freedom"]);
        assert!(config.veto_enabled);
        assert!(!config.apply_adjusted_weights);
        assert!((config.default_confidence - 0.5).abs() < f64::EPSILON);
        assert_eq!(config.analyst_explanation, DEFAULT_EXPLANATION);
        assert_eq!(config.threshold_polarity, ThresholdPolarity::FlagBelow);
        assert_eq!(config.external_call_timeout(), Duration::from_millis(500));
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = tempdir().unwrap();
        let err = PipelineConfig::load(dir.path().join("absent.toml")).unwrap_err();
        assert!(err.to_string().contains("reading pipeline config"));
    }

    #[test]
    fn load_reads_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pipeline.toml");
        fs::write(&path, SAMPLE).unwrap();
        let config = PipelineConfig::load(&path).unwrap();
        assert_eq!(config.goal_names.len(), 3);
    }

    #[test]
    fn rejects_invalid_settings() {
        let mut config = PipelineConfig::reflective();
        config.threshold = 1.5;
        assert!(matches!(
            config.validate(),
            Err(PipelineError::Configuration(_))
        ));

        let mut config = PipelineConfig::reflective();
        config.value_weights.clear();
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::reflective();
        config.value_weights.insert("care".into(), f64::NAN);
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::reflective();
        config.goal_names.push("knowledge sharing".into());
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::reflective();
        config.vector_names.clear();
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::reflective();
        config.external_call_timeout_ms = 0;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::reflective();
        config.default_confidence = 1.2;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::reflective();
        config.default_impact = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::reflective();
        config.analyst_explanation = "  ".into();
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::reflective();
        config.analyst_step_weight = f64::INFINITY;
        assert!(config.validate().is_err());
    }

    #[test]
    fn shipped_files_match_presets() {
        let reflective =
            PipelineConfig::from_toml(include_str!("../../cli/config/reflective.toml")).unwrap();
        assert_eq!(reflective, PipelineConfig::reflective());
        let autonomous =
            PipelineConfig::from_toml(include_str!("../../cli/config/autonomous.toml")).unwrap();
        assert_eq!(autonomous, PipelineConfig::autonomous());
    }

    #[test]
    fn polarity_comparisons_are_strict() {
        assert!(ThresholdPolarity::FlagBelow.is_flagged(0.5, 0.7));
        assert!(!ThresholdPolarity::FlagBelow.is_flagged(0.7, 0.7));
        assert!(ThresholdPolarity::FlagAbove.is_flagged(0.9, 0.8));
        assert!(!ThresholdPolarity::FlagAbove.is_flagged(0.8, 0.8));
    }
}
