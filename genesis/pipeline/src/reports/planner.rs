use super::{progression, ReportEntry, ReportGenerator};

/// Maps each goal to a phase with a start year.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Planner {
    goals: Vec<String>,
    base_year: i64,
    step_years: i64,
}

impl Planner {
    /// Creates a planner; goal order is the report order.
    #[must_use]
    pub fn new(goals: Vec<String>, base_year: i64, step_years: i64) -> Self {
        Self {
            goals,
            base_year,
            step_years,
        }
    }

    /// Configured goals.
    #[must_use]
    pub fn goals(&self) -> &[String] {
        &self.goals
    }
}

impl ReportGenerator for Planner {
    fn name(&self) -> &str {
        "planner"
    }

    fn generate(&self) -> ReportEntry {
        let phases = self.goals.iter().enumerate().map(|(idx, goal)| {
            let year = progression(self.base_year, self.step_years, idx);
            (
                goal.clone(),
                format!("Phase {}: Initiate by year {year}", idx + 1),
            )
        });
        ReportEntry::from_pairs(self.name(), phases)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phases_follow_goal_order() {
        let planner = Planner::new(
            vec!["g0".into(), "g1".into(), "g2".into()],
            2030,
            5,
        );
        let report = planner.generate();
        assert_eq!(
            report.lines(),
            vec![
                "Phase 1: Initiate by year 2030",
                "Phase 2: Initiate by year 2035",
                "Phase 3: Initiate by year 2040",
            ]
        );
        assert_eq!(
            report.entries.keys().collect::<Vec<_>>(),
            vec!["g0", "g1", "g2"]
        );
    }

    #[test]
    fn order_is_not_sorted() {
        let planner = Planner::new(vec!["zeta".into(), "alpha".into()], 2040, 10);
        let report = planner.generate();
        assert_eq!(report.entries["zeta"], "Phase 1: Initiate by year 2040");
        assert_eq!(report.entries["alpha"], "Phase 2: Initiate by year 2050");
        assert_eq!(report.generator, "planner");
    }
}
