//! Directive confidence tracking with threshold flagging.

use std::{fmt, sync::Arc};

use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::json;
use shared_logging::LogLevel;

use crate::{
    config::ThresholdPolarity,
    directive::Directive,
    error::{DataQualityWarning, Stage},
    telemetry::{PipelineTelemetry, TelemetryExt},
};

/// Infers how certain the system is about a directive. Expected range `[0, 1]`.
pub trait ConfidenceModel: Send + Sync {
    /// Returns the raw confidence for a directive.
    fn infer_confidence(&self, directive: &Directive) -> f64;
}

impl<F> ConfidenceModel for F
where
    F: Fn(&Directive) -> f64 + Send + Sync,
{
    fn infer_confidence(&self, directive: &Directive) -> f64 {
        self(directive)
    }
}

/// Deterministic model returning the same confidence for every directive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedConfidence(pub f64);

impl Default for FixedConfidence {
    fn default() -> Self {
        Self(0.5)
    }
}

impl ConfidenceModel for FixedConfidence {
    fn infer_confidence(&self, _directive: &Directive) -> f64 {
        self.0
    }
}

/// Threshold and the side of it that gets flagged.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BeliefThreshold {
    /// Flagged side.
    pub polarity: ThresholdPolarity,
    /// Threshold value.
    pub value: f64,
}

impl BeliefThreshold {
    /// Whether a confidence is on the flagged side.
    #[must_use]
    pub fn flags(&self, confidence: f64) -> bool {
        self.polarity.is_flagged(confidence, self.value)
    }
}

/// Outcome of a single belief update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeliefUpdate {
    /// Directive text the confidence is stored under.
    pub directive: String,
    /// Stored confidence, always in `[0, 1]`.
    pub confidence: f64,
    /// Whether the update landed on the flagged side of the threshold.
    pub flagged: bool,
    /// Present when the model's output had to be clamped.
    pub warning: Option<DataQualityWarning>,
}

/// A stored belief currently on the flagged side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlaggedBelief {
    /// Directive text.
    pub directive: String,
    /// Stored confidence.
    pub confidence: f64,
}

/// Directive -> confidence map guarded for concurrent writers.
#[derive(Clone)]
pub struct BeliefStore {
    records: Arc<RwLock<IndexMap<String, f64>>>,
    model: Arc<dyn ConfidenceModel>,
    threshold: BeliefThreshold,
    telemetry: Option<PipelineTelemetry>,
}

impl fmt::Debug for BeliefStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BeliefStore")
            .field("beliefs", &self.records.read().len())
            .field("threshold", &self.threshold)
            .finish()
    }
}

impl BeliefStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new(model: Arc<dyn ConfidenceModel>, threshold: BeliefThreshold) -> Self {
        Self {
            records: Arc::new(RwLock::new(IndexMap::new())),
            model,
            threshold,
            telemetry: None,
        }
    }

    /// Attaches telemetry sinks.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: PipelineTelemetry) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Configured threshold.
    #[must_use]
    pub const fn threshold(&self) -> BeliefThreshold {
        self.threshold
    }

    /// Infers, clamps, and stores the confidence for `directive`, overwriting any prior value.
    pub fn update(&self, directive: &Directive) -> BeliefUpdate {
        let raw = self.model.infer_confidence(directive);
        let (confidence, warning) =
            DataQualityWarning::clamp_unit(Stage::Belief, directive.as_str(), raw);
        if let Some(warning) = &warning {
            self.telemetry.log_quiet(
                LogLevel::Warn,
                "belief.confidence_clamped",
                json!({
                    "directive": directive.as_str(),
                    "received": warning.received,
                    "applied": warning.applied,
                }),
            );
        }

        self.records
            .write()
            .insert(directive.as_str().to_string(), confidence);

        let flagged = self.threshold.flags(confidence);
        self.telemetry.log_quiet(
            LogLevel::Debug,
            "belief.updated",
            json!({
                "directive": directive.as_str(),
                "confidence": confidence,
                "flagged": flagged,
            }),
        );
        if flagged {
            let payload = json!({
                "directive": directive.as_str(),
                "confidence": confidence,
                "polarity": self.threshold.polarity.label(),
                "threshold": self.threshold.value,
            });
            self.telemetry
                .log_quiet(LogLevel::Info, "belief.flagged", payload.clone());
            self.telemetry.event_quiet("belief.flagged", payload);
        }

        BeliefUpdate {
            directive: directive.as_str().to_string(),
            confidence,
            flagged,
            warning,
        }
    }

    /// Flagged beliefs in first-seen order, over a snapshot taken now.
    pub fn reflect(&self) -> impl Iterator<Item = FlaggedBelief> {
        let threshold = self.threshold;
        self.snapshot()
            .into_iter()
            .filter(move |(_, confidence)| threshold.flags(*confidence))
            .map(|(directive, confidence)| FlaggedBelief {
                directive,
                confidence,
            })
    }

    /// Stored confidence for a directive, if any.
    #[must_use]
    pub fn confidence(&self, directive: &str) -> Option<f64> {
        self.records.read().get(directive).copied()
    }

    /// All stored beliefs in first-seen order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(String, f64)> {
        self.records
            .read()
            .iter()
            .map(|(directive, confidence)| (directive.clone(), *confidence))
            .collect()
    }

    /// Number of distinct directives seen.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Whether nothing has been stored yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_event_bus::MemoryEventBus;

    fn directive(text: &str) -> Directive {
        Directive::new(text).unwrap()
    }

    fn doubt_store(model: Arc<dyn ConfidenceModel>) -> BeliefStore {
        BeliefStore::new(
            model,
            BeliefThreshold {
                polarity: ThresholdPolarity::FlagBelow,
                value: 0.7,
            },
        )
    }

    #[test]
    fn update_is_idempotent_for_unchanged_input() {
        let store = doubt_store(Arc::new(FixedConfidence(0.5)));
        let d = directive("Deploy medical nanobots in flood zone");
        let first = store.update(&d);
        let second = store.update(&d);
        assert_eq!(first, second);
        assert_eq!(store.len(), 1);
        assert_eq!(store.confidence(d.as_str()), Some(0.5));
    }

    #[test]
    fn flags_follow_polarity() {
        let store = doubt_store(Arc::new(FixedConfidence(0.5)));
        assert!(store.update(&directive("survey")).flagged);

        let confident = BeliefStore::new(
            Arc::new(FixedConfidence(0.9)),
            BeliefThreshold {
                polarity: ThresholdPolarity::FlagAbove,
                value: 0.8,
            },
        );
        assert!(confident.update(&directive("survey")).flagged);
    }

    #[test]
    fn later_updates_overwrite_and_reflect_tracks_current_value() {
        let model = |d: &Directive| if d.as_str().contains("risky") { 0.2 } else { 0.95 };
        let store = doubt_store(Arc::new(model));
        store.update(&directive("risky relocation"));
        store.update(&directive("routine inspection"));
        let flagged: Vec<_> = store.reflect().map(|b| b.directive).collect();
        assert_eq!(flagged, vec!["risky relocation"]);
        assert_eq!(store.snapshot().len(), 2);
    }

    #[test]
    fn out_of_range_confidence_is_clamped() {
        let store = doubt_store(Arc::new(FixedConfidence(1.4)));
        let update = store.update(&directive("overconfident"));
        assert!((update.confidence - 1.0).abs() < f64::EPSILON);
        let warning = update.warning.unwrap();
        assert!((warning.received - 1.4).abs() < f64::EPSILON);
        assert!(!update.flagged);
    }

    #[test]
    fn flagged_updates_publish_events() {
        let bus = Arc::new(MemoryEventBus::new(8));
        let telemetry = PipelineTelemetry::builder("belief")
            .event_publisher(bus.clone())
            .build()
            .unwrap();
        let store = doubt_store(Arc::new(FixedConfidence(0.3))).with_telemetry(telemetry);
        store.update(&directive("uncertain"));
        let events = bus.events_of("belief.flagged");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].payload["directive"], "uncertain");
        assert_eq!(events[0].payload["polarity"], "flag-below");
    }

    #[test]
    fn reflect_does_not_mutate() {
        let store = doubt_store(Arc::new(FixedConfidence(0.1)));
        store.update(&directive("one"));
        let _ = store.reflect().count();
        let _ = store.reflect().count();
        assert_eq!(store.len(), 1);
    }
}
