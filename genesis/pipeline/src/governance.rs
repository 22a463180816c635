//! Veto flag and append-only decision log.

use std::{fmt, sync::Arc};

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::json;
use shared_logging::LogLevel;
use uuid::Uuid;

use crate::{
    directive::Directive,
    telemetry::{PipelineTelemetry, TelemetryExt},
};

/// What happened to a submitted directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionStatus {
    /// Veto enabled: sent to overseers, not executed autonomously.
    ForwardedForReview,
    /// Veto disabled: executed without review.
    ExecutedAutonomously,
}

impl fmt::Display for DecisionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ForwardedForReview => write!(f, "forwarded for review"),
            Self::ExecutedAutonomously => write!(f, "executed autonomously"),
        }
    }
}

/// Entry in the governance log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GovernanceDecision {
    /// Decision identifier.
    pub id: Uuid,
    /// Directive text.
    pub directive: String,
    /// `true` only when executed autonomously.
    pub allowed: bool,
    /// Routing outcome.
    pub status: DecisionStatus,
    /// Overseers the decision was forwarded to; empty when executed.
    pub reviewers: Vec<String>,
    /// Recording time.
    pub timestamp: DateTime<Utc>,
}

/// Cloneable handle to the veto flag and decision log.
#[derive(Clone)]
pub struct GovernanceGate {
    veto_enabled: Arc<RwLock<bool>>,
    log: Arc<Mutex<Vec<GovernanceDecision>>>,
    overseers: Arc<[String]>,
    telemetry: Option<PipelineTelemetry>,
}

impl fmt::Debug for GovernanceGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GovernanceGate")
            .field("veto_enabled", &*self.veto_enabled.read())
            .field("decisions", &self.log.lock().len())
            .field("overseers", &self.overseers)
            .finish()
    }
}

impl GovernanceGate {
    /// Creates a gate with the given initial veto state.
    #[must_use]
    pub fn new(veto_enabled: bool, overseers: Vec<String>) -> Self {
        Self {
            veto_enabled: Arc::new(RwLock::new(veto_enabled)),
            log: Arc::new(Mutex::new(Vec::new())),
            overseers: overseers.into(),
            telemetry: None,
        }
    }

    /// Attaches telemetry sinks.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: PipelineTelemetry) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Administrative switch for the veto flag.
    pub fn set_veto_enabled(&self, enabled: bool) {
        let previous = std::mem::replace(&mut *self.veto_enabled.write(), enabled);
        if previous != enabled {
            let payload = json!({ "veto_enabled": enabled });
            self.telemetry
                .log_quiet(LogLevel::Info, "governance.veto_changed", payload.clone());
            self.telemetry.event_quiet("governance.veto_changed", payload);
        }
    }

    /// Current veto flag.
    #[must_use]
    pub fn veto_enabled(&self) -> bool {
        *self.veto_enabled.read()
    }

    /// Records a decision for `directive` under the current veto flag.
    pub fn submit(&self, directive: &Directive) -> GovernanceDecision {
        self.record(directive, self.veto_enabled())
    }

    /// Records a decision under a flag value read earlier by the caller.
    pub(crate) fn record(&self, directive: &Directive, veto_enabled: bool) -> GovernanceDecision {
        let (status, reviewers) = if veto_enabled {
            (DecisionStatus::ForwardedForReview, self.overseers.to_vec())
        } else {
            (DecisionStatus::ExecutedAutonomously, Vec::new())
        };
        let decision = GovernanceDecision {
            id: Uuid::new_v4(),
            directive: directive.as_str().to_string(),
            allowed: !veto_enabled,
            status,
            reviewers,
            timestamp: Utc::now(),
        };
        self.log.lock().push(decision.clone());

        let event_type = match status {
            DecisionStatus::ForwardedForReview => "governance.forwarded",
            DecisionStatus::ExecutedAutonomously => "governance.executed",
        };
        let payload = json!({
            "decision_id": decision.id,
            "directive": decision.directive,
            "allowed": decision.allowed,
            "reviewers": decision.reviewers,
        });
        self.telemetry
            .log_quiet(LogLevel::Info, event_type, payload.clone());
        self.telemetry.event_quiet(event_type, payload);
        decision
    }

    /// Copy of the decision log, oldest first.
    #[must_use]
    pub fn decisions(&self) -> Vec<GovernanceDecision> {
        self.log.lock().clone()
    }

    /// Number of recorded decisions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.log.lock().len()
    }

    /// Whether no decision has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.log.lock().is_empty()
    }

    /// Configured overseers.
    #[must_use]
    pub fn overseers(&self) -> &[String] {
        &self.overseers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_event_bus::MemoryEventBus;

    fn directive(text: &str) -> Directive {
        Directive::new(text).unwrap()
    }

    #[test]
    fn veto_forwards_and_disabled_executes() {
        let gate = GovernanceGate::new(true, vec!["human_1".into(), "ai_guardian".into()]);
        let forwarded = gate.submit(&directive("relocate shelter"));
        assert!(!forwarded.allowed);
        assert_eq!(forwarded.status, DecisionStatus::ForwardedForReview);
        assert_eq!(forwarded.reviewers, vec!["human_1", "ai_guardian"]);

        gate.set_veto_enabled(false);
        let executed = gate.submit(&directive("relocate shelter"));
        assert!(executed.allowed);
        assert_eq!(executed.status, DecisionStatus::ExecutedAutonomously);
        assert!(executed.reviewers.is_empty());
    }

    #[test]
    fn flag_changes_are_visible_through_clones() {
        let gate = GovernanceGate::new(false, Vec::new());
        let handle = gate.clone();
        handle.set_veto_enabled(true);
        assert!(gate.veto_enabled());
        assert!(!gate.submit(&directive("audit")).allowed);
        assert_eq!(handle.len(), 1);
    }

    #[test]
    fn log_is_append_only_in_order() {
        let gate = GovernanceGate::new(true, Vec::new());
        gate.submit(&directive("first"));
        gate.set_veto_enabled(false);
        gate.submit(&directive("second"));
        let log = gate.decisions();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].directive, "first");
        assert_eq!(log[1].directive, "second");
        assert!(log[0].timestamp <= log[1].timestamp);
    }

    #[test]
    fn emits_routing_and_toggle_events() {
        let bus = std::sync::Arc::new(MemoryEventBus::new(8));
        let telemetry = PipelineTelemetry::builder("governance")
            .event_publisher(bus.clone())
            .build()
            .unwrap();
        let gate = GovernanceGate::new(true, Vec::new()).with_telemetry(telemetry);
        gate.submit(&directive("review me"));
        gate.set_veto_enabled(true);
        gate.set_veto_enabled(false);
        gate.submit(&directive("run me"));
        assert_eq!(bus.events_of("governance.forwarded").len(), 1);
        assert_eq!(bus.events_of("governance.executed").len(), 1);
        assert_eq!(bus.events_of("governance.veto_changed").len(), 1);
    }
}
