//! Informational report generators. Their output never influences gating.

/// Phase roadmap generator.
pub mod planner;
/// Outcome table generator.
pub mod simulator;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

pub use planner::Planner;
pub use simulator::Simulator;

/// Ordered name -> description table produced by one generator call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportEntry {
    /// Generator label.
    pub generator: String,
    /// Entries in configured order.
    pub entries: IndexMap<String, String>,
    /// Generation time.
    pub generated_at: DateTime<Utc>,
}

impl ReportEntry {
    /// Builds an entry from ordered `(name, text)` pairs.
    pub fn from_pairs(
        generator: impl Into<String>,
        pairs: impl IntoIterator<Item = (String, String)>,
    ) -> Self {
        Self {
            generator: generator.into(),
            entries: pairs.into_iter().collect(),
            generated_at: Utc::now(),
        }
    }

    /// Descriptions in order, without names.
    #[must_use]
    pub fn lines(&self) -> Vec<&str> {
        self.entries.values().map(String::as_str).collect()
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the report has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Stateless producer of a [`ReportEntry`] from static configuration.
pub trait ReportGenerator: Send + Sync {
    /// Generator label.
    fn name(&self) -> &str;

    /// Computes a fresh report.
    fn generate(&self) -> ReportEntry;
}

/// Planner and simulator output captured together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSet {
    /// Phase roadmap.
    pub planner: ReportEntry,
    /// Outcome table.
    pub simulator: ReportEntry,
}

/// `base + index * step` for a zero-based position.
pub(crate) fn progression(base: i64, step: i64, index: usize) -> i64 {
    let index = i64::try_from(index).unwrap_or(i64::MAX);
    base.saturating_add(index.saturating_mul(step))
}
