//! Independent check of a schedule against the tree semantics

use super::schedule::{Schedule, ScheduledAction};
use crate::attack_tree::{propagate, AttackTree, Interval, Operator};
use crate::error::EngineError;
use std::collections::{BTreeMap, HashSet};

/// Result of validating a schedule
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub problems: Vec<String>,
    pub error_message: Option<String>,
}

impl ValidationResult {
    fn from_problems(problems: Vec<String>) -> Self {
        let error_message = if problems.is_empty() {
            None
        } else {
            Some(problems.join("; "))
        };
        Self {
            is_valid: problems.is_empty(),
            problems,
            error_message,
        }
    }
}

/// Re-checks solver witnesses without going through the encoding
#[derive(Debug, Clone, Default)]
pub struct ScheduleValidator;

impl ScheduleValidator {
    pub fn new() -> Self {
        Self
    }

    /// Collect every way `schedule` fails to be a valid attack on `tree`
    pub fn validate(&self, tree: &AttackTree, schedule: &Schedule) -> ValidationResult {
        let propagated = match propagate(tree) {
            Ok(tree) => tree,
            Err(violations) => {
                return ValidationResult::from_problems(
                    violations.iter().map(ToString::to_string).collect(),
                )
            }
        };

        let mut problems = Vec::new();
        let mut actions: BTreeMap<&str, &ScheduledAction> = BTreeMap::new();

        for action in &schedule.actions {
            let Some(leaf) = propagated.find_leaf(&action.name) else {
                problems.push(format!("action '{}' is not a leaf of the tree", action.name));
                continue;
            };
            if actions.insert(action.name.as_str(), action).is_some() {
                problems.push(format!("leaf '{}' is scheduled more than once", action.name));
                continue;
            }
            if action.end < action.start || action.duration() != leaf.duration() {
                problems.push(format!(
                    "leaf '{}' runs for [{}, {}] but its duration is {}",
                    action.name,
                    action.start,
                    action.end,
                    leaf.duration()
                ));
            }
            if action.cost != leaf.cost() {
                problems.push(format!(
                    "leaf '{}' is reported with cost {} instead of {}",
                    action.name,
                    action.cost,
                    leaf.cost()
                ));
            }
            let window = leaf.window().copied().unwrap_or(Interval::AMBIENT);
            if !window.admits(action.start, action.end) {
                problems.push(format!(
                    "leaf '{}' runs for [{}, {}] outside its window {}",
                    action.name, action.start, action.end, window
                ));
            }
        }

        for (index, first) in schedule.actions.iter().enumerate() {
            for second in &schedule.actions[index + 1..] {
                if first.overlaps(second) {
                    problems.push(format!("'{}' overlaps '{}'", first.name, second.name));
                }
            }
        }

        if !achieved(&propagated, &actions) {
            problems.push(format!("the goal '{}' is not achieved", propagated.name()));
        } else {
            let mut required = HashSet::new();
            collect_active(&propagated, &actions, &mut required, &mut problems);
            for name in actions.keys() {
                if !required.contains(*name) {
                    problems.push(format!("leaf '{name}' does not contribute to the goal"));
                }
            }
        }

        if schedule.len() > schedule.bound {
            problems.push(format!(
                "{} actions exceed the bound {}",
                schedule.len(),
                schedule.bound
            ));
        }

        ValidationResult::from_problems(problems)
    }

    /// `validate`, turning any problem into `InvalidWitness`
    pub fn ensure_valid(&self, tree: &AttackTree, schedule: &Schedule) -> Result<(), EngineError> {
        let result = self.validate(tree, schedule);
        match result.error_message {
            None => Ok(()),
            Some(message) => Err(EngineError::InvalidWitness(message)),
        }
    }
}

/// Whether the scheduled leaves make `tree` true, reading OR as exclusive
fn achieved(tree: &AttackTree, actions: &BTreeMap<&str, &ScheduledAction>) -> bool {
    match tree {
        AttackTree::Leaf(leaf) => actions.contains_key(leaf.name()),
        AttackTree::Gate(gate) => {
            let (left, right) = (achieved(&gate.left, actions), achieved(&gate.right, actions));
            match gate.node.operator() {
                Operator::And | Operator::Sequence => left && right,
                Operator::Or => left != right,
            }
        }
    }
}

/// Walk the achieved branches, recording contributing leaves and SEQ order problems
fn collect_active<'t>(
    tree: &'t AttackTree,
    actions: &BTreeMap<&str, &ScheduledAction>,
    required: &mut HashSet<&'t str>,
    problems: &mut Vec<String>,
) {
    match tree {
        AttackTree::Leaf(leaf) => {
            required.insert(leaf.name());
        }
        AttackTree::Gate(gate) => match gate.node.operator() {
            Operator::Or => {
                if achieved(&gate.left, actions) {
                    collect_active(&gate.left, actions, required, problems);
                } else {
                    collect_active(&gate.right, actions, required, problems);
                }
            }
            operator => {
                collect_active(&gate.left, actions, required, problems);
                collect_active(&gate.right, actions, required, problems);
                if operator == Operator::Sequence {
                    let finish = latest_end(&gate.left, actions);
                    let begin = earliest_start(&gate.right, actions);
                    if let (Some(finish), Some(begin)) = (finish, begin) {
                        if finish > begin {
                            problems.push(format!(
                                "SEQ node '{}' has its right branch starting at {} before its left branch ends at {}",
                                gate.node.name(),
                                begin,
                                finish
                            ));
                        }
                    }
                }
            }
        },
    }
}

fn latest_end(tree: &AttackTree, actions: &BTreeMap<&str, &ScheduledAction>) -> Option<i64> {
    tree.leaves()
        .filter_map(|leaf| actions.get(leaf.name()))
        .map(|action| action.end)
        .max()
}

fn earliest_start(tree: &AttackTree, actions: &BTreeMap<&str, &ScheduledAction>) -> Option<i64> {
    tree.leaves()
        .filter_map(|leaf| actions.get(leaf.name()))
        .map(|action| action.start)
        .min()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attack_tree::{paper_example, sequential_example};

    fn action(name: &str, start: i64, end: i64, cost: u64) -> ScheduledAction {
        ScheduledAction::new(name, start, end, cost)
    }

    #[test]
    fn test_valid_schedules() {
        let tree = paper_example().unwrap();
        let validator = ScheduleValidator::new();

        let single = Schedule::new(1, vec![action("ASVVI", 3, 5, 25)]);
        assert!(validator.validate(&tree, &single).is_valid);

        let pair = Schedule::new(2, vec![action("OID", 5, 7, 14), action("IRID", 7, 9, 10)]);
        let result = validator.validate(&tree, &pair);
        assert!(result.is_valid, "{:?}", result.problems);
        assert!(validator.ensure_valid(&tree, &pair).is_ok());
    }

    #[test]
    fn test_exclusive_or() {
        let tree = paper_example().unwrap();
        let both = Schedule::new(
            3,
            vec![action("ASVVI", 3, 5, 25), action("OID", 5, 7, 14), action("IRID", 7, 9, 10)],
        );
        let result = ScheduleValidator::new().validate(&tree, &both);
        assert!(!result.is_valid);
        assert!(result.problems.iter().any(|p| p.contains("not achieved")));
    }

    #[test]
    fn test_detects_window_overlap_and_bound() {
        let tree = paper_example().unwrap();
        let schedule = Schedule::new(1, vec![action("OID", 4, 6, 14), action("IRID", 5, 7, 10)]);
        let result = ScheduleValidator::new().validate(&tree, &schedule);

        assert!(!result.is_valid);
        assert!(result.problems.iter().any(|p| p.contains("outside its window")));
        assert!(result.problems.iter().any(|p| p.contains("overlaps")));
        assert!(result.problems.iter().any(|p| p.contains("exceed the bound")));
        assert!(matches!(
            ScheduleValidator::new().ensure_valid(&tree, &schedule),
            Err(EngineError::InvalidWitness(_))
        ));
    }

    #[test]
    fn test_detects_bad_duration_cost_and_unknown_leaf() {
        let tree = paper_example().unwrap();
        let schedule = Schedule::new(2, vec![action("ASVVI", 3, 6, 20), action("ghost", 8, 9, 0)]);
        let problems = ScheduleValidator::new().validate(&tree, &schedule).problems;

        assert!(problems.iter().any(|p| p.contains("duration is 2")));
        assert!(problems.iter().any(|p| p.contains("cost 20 instead of 25")));
        assert!(problems.iter().any(|p| p.contains("'ghost' is not a leaf")));
    }

    #[test]
    fn test_sequence_order() {
        let tree = sequential_example().unwrap();
        let validator = ScheduleValidator::new();

        let ordered = Schedule::new(
            3,
            vec![action("SDC", 0, 1, 1), action("OID", 5, 7, 1), action("IRID", 7, 10, 10)],
        );
        assert!(validator.validate(&tree, &ordered).is_valid);

        let reversed = Schedule::new(
            3,
            vec![action("SDC", 0, 1, 1), action("IRID", 5, 8, 10), action("OID", 8, 10, 1)],
        );
        let result = validator.validate(&tree, &reversed);
        assert!(!result.is_valid);
        assert!(result.problems.iter().any(|p| p.contains("SEQ node 'IVRD'")));
    }

    #[test]
    fn test_infeasible_tree_is_reported() {
        let tree = AttackTree::node(
            Operator::And,
            Interval::new(0, 2).unwrap(),
            "root",
            AttackTree::leaf(crate::attack_tree::Leaf::new("A", 3, 0).unwrap()),
            AttackTree::leaf(crate::attack_tree::Leaf::new("B", 1, 0).unwrap()),
        )
        .unwrap();
        let result = ScheduleValidator::new().validate(&tree, &Schedule::new(2, vec![]));
        assert!(!result.is_valid);
        assert!(result.error_message.unwrap().contains("'A'"));
    }
}
