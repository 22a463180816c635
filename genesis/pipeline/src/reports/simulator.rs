use super::{progression, ReportEntry, ReportGenerator};

/// Maps each vector to a projected percentage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Simulator {
    vectors: Vec<String>,
    base_percent: i64,
    step_percent: i64,
}

impl Simulator {
    /// Creates a simulator; vector order is the report order.
    #[must_use]
    pub fn new(vectors: Vec<String>, base_percent: i64, step_percent: i64) -> Self {
        Self {
            vectors,
            base_percent,
            step_percent,
        }
    }

    /// Configured vectors.
    #[must_use]
    pub fn vectors(&self) -> &[String] {
        &self.vectors
    }
}

impl ReportGenerator for Simulator {
    fn name(&self) -> &str {
        "simulator"
    }

    fn generate(&self) -> ReportEntry {
        let outcomes = self.vectors.iter().enumerate().map(|(idx, vector)| {
            let percent = progression(self.base_percent, self.step_percent, idx);
            (vector.clone(), format!("Control potential: {percent}%"))
        });
        ReportEntry::from_pairs(self.name(), outcomes)
    }
}
