//! Witness schedules and infeasibility reports

use crate::error::Violation;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One leaf action placed on the timeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledAction {
    pub name: String,
    pub start: i64,
    pub end: i64,
    pub cost: u64,
}

impl ScheduledAction {
    pub fn new(name: impl Into<String>, start: i64, end: i64, cost: u64) -> Self {
        Self {
            name: name.into(),
            start,
            end,
            cost,
        }
    }

    pub fn duration(&self) -> u64 {
        self.end.abs_diff(self.start)
    }

    /// Whether two actions share more than an endpoint
    pub fn overlaps(&self, other: &ScheduledAction) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// Selected leaves of a feasible attack, ordered by start time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    /// Trace-length bound the schedule was found at
    pub bound: usize,
    pub actions: Vec<ScheduledAction>,
}

impl Schedule {
    pub fn new(bound: usize, mut actions: Vec<ScheduledAction>) -> Self {
        actions.sort_by(|a, b| (a.start, a.end, &a.name).cmp(&(b.start, b.end, &b.name)));
        Self { bound, actions }
    }

    /// Sum of action costs, saturating at `u64::MAX`
    pub fn total_cost(&self) -> u64 {
        self.actions.iter().fold(0, |total, action| total.saturating_add(action.cost))
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Earliest start and latest end
    pub fn span(&self) -> Option<(i64, i64)> {
        let start = self.actions.iter().map(|a| a.start).min()?;
        let end = self.actions.iter().map(|a| a.end).max()?;
        Some((start, end))
    }

    pub fn names(&self) -> Vec<&str> {
        self.actions.iter().map(|a| a.name.as_str()).collect()
    }

    pub fn find(&self, name: &str) -> Option<&ScheduledAction> {
        self.actions.iter().find(|a| a.name == name)
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries: Vec<String> = self
            .actions
            .iter()
            .map(|a| format!("{}[{}, {}]", a.name, a.start, a.end))
            .collect();
        write!(f, "{} (cost {})", entries.join(" → "), self.total_cost())
    }
}

/// Why no schedule was produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Infeasible {
    /// Rejected by interval propagation before any solving
    Violations(Vec<Violation>),
    /// Every bound up to `max_bound` was unsatisfiable
    NoSchedule { max_bound: usize },
}

impl fmt::Display for Infeasible {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Infeasible::Violations(violations) => {
                write!(f, "{} propagation violation(s)", violations.len())
            }
            Infeasible::NoSchedule { max_bound } => {
                write!(f, "no schedule with at most {} events", max_bound)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schedule_is_sorted_by_start() {
        let schedule = Schedule::new(
            2,
            vec![
                ScheduledAction::new("B", 3, 6, 4),
                ScheduledAction::new("A", 0, 3, 1),
            ],
        );
        assert_eq!(schedule.names(), vec!["A", "B"]);
        assert_eq!(schedule.total_cost(), 5);
        assert_eq!(schedule.span(), Some((0, 6)));
        assert_eq!(schedule.to_string(), "A[0, 3] → B[3, 6] (cost 5)");
    }

    #[test]
    fn test_overlap() {
        let a = ScheduledAction::new("A", 0, 3, 0);
        assert!(!a.overlaps(&ScheduledAction::new("B", 3, 5, 0)));
        assert!(a.overlaps(&ScheduledAction::new("C", 2, 5, 0)));
        assert_eq!(a.duration(), 3);
    }

    #[test]
    fn test_empty_schedule() {
        let schedule = Schedule::new(0, vec![]);
        assert!(schedule.is_empty());
        assert_eq!(schedule.span(), None);
        assert_eq!(schedule.total_cost(), 0);
    }
}
