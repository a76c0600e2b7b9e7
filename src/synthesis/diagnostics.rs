//! Explaining why a tree has no schedule at a given bound

use super::bounded::SynthesisOptions;
use super::encoder::{encode, ConstraintTag};
use super::schedule::Schedule;
use super::validator::ScheduleValidator;
use crate::attack_tree::{propagate, AttackTree};
use crate::error::{EngineError, Violation};
use crate::sat::{CheckResult, ConstraintService};
use std::collections::BTreeSet;
use tracing::{debug, info};

/// Outcome of a diagnostics run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnosis {
    /// Propagation already rejects the tree
    Violations(Vec<Violation>),
    /// Minimal set of tagged constraints that cannot hold together
    Conflict(BTreeSet<ConstraintTag>),
    /// The tree has a schedule at this bound
    Feasible(Schedule),
    Unknown(String),
}

impl Diagnosis {
    pub fn is_conflict(&self) -> bool {
        matches!(self, Diagnosis::Conflict(_))
    }

    /// One human-readable line per reason
    pub fn explanations(&self) -> Vec<String> {
        match self {
            Diagnosis::Violations(violations) => violations.iter().map(ToString::to_string).collect(),
            Diagnosis::Conflict(tags) => tags.iter().map(ToString::to_string).collect(),
            Diagnosis::Feasible(schedule) => vec![format!("feasible: {schedule}")],
            Diagnosis::Unknown(reason) => vec![format!("solver gave up: {reason}")],
        }
    }
}

/// Explain infeasibility at `bound` with default options
pub fn explain_infeasibility(tree: &AttackTree, bound: usize) -> Result<Diagnosis, EngineError> {
    explain_infeasibility_with(tree, bound, &SynthesisOptions::default())
}

pub fn explain_infeasibility_with(
    tree: &AttackTree,
    bound: usize,
    options: &SynthesisOptions,
) -> Result<Diagnosis, EngineError> {
    let propagated = match propagate(tree) {
        Ok(propagated) => propagated,
        Err(violations) => return Ok(Diagnosis::Violations(violations)),
    };

    let mut service = options.service(None);
    let encoding = encode(&propagated, bound, &mut service)?;

    match service.check()? {
        CheckResult::Satisfiable(model) => {
            let schedule = encoding.extract_schedule(&model)?;
            ScheduleValidator::new().ensure_valid(&propagated, &schedule)?;
            debug!(bound, "tree is feasible at this bound");
            Ok(Diagnosis::Feasible(schedule))
        }
        CheckResult::Unsatisfiable(core) => {
            let mut conflict = BTreeSet::new();
            for id in core.unwrap_or_default() {
                let tag = encoding
                    .tag(id)
                    .ok_or_else(|| EngineError::InvalidWitness(format!("core names unknown tag #{}", id.0)))?;
                conflict.insert(tag.clone());
            }
            info!(bound, core_size = conflict.len(), "unsatisfiable core extracted");
            Ok(Diagnosis::Conflict(conflict))
        }
        CheckResult::Unknown { reason, .. } => Ok(Diagnosis::Unknown(reason)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attack_tree::{paper_example, Interval, Leaf, Operator};

    fn leaf(name: &str, duration: u64, cost: u64) -> AttackTree {
        AttackTree::leaf(Leaf::new(name, duration, cost).unwrap())
    }

    fn conflict(diagnosis: Diagnosis) -> BTreeSet<ConstraintTag> {
        match diagnosis {
            Diagnosis::Conflict(tags) => tags,
            other => panic!("expected a conflict, got {other:?}"),
        }
    }

    #[test]
    fn test_single_leaf_at_bound_zero() {
        let tree = AttackTree::leaf(Leaf::new("L", 5, 10).unwrap().with_window(Interval::new(0, 10).unwrap()));
        let core = conflict(explain_infeasibility(&tree, 0).unwrap());

        assert_eq!(core.len(), 2);
        assert!(core.contains(&ConstraintTag::Root { goal: "L".to_string() }));
        assert!(core
            .iter()
            .any(|tag| matches!(tag, ConstraintTag::LeafWindow { leaf, .. } if leaf == "L")));
    }

    #[test]
    fn test_and_without_room() {
        let tree = AttackTree::node(
            Operator::And,
            Interval::new(0, 5).unwrap(),
            "root",
            leaf("A", 5, 1),
            leaf("B", 5, 1),
        )
        .unwrap();
        let core = conflict(explain_infeasibility(&tree, 2).unwrap());

        assert_eq!(core.len(), 5);
        assert!(core.contains(&ConstraintTag::Root { goal: "root".to_string() }));
        assert!(core.contains(&ConstraintTag::Operator {
            node: "root".to_string(),
            operator: Operator::And,
        }));
        assert!(core.iter().any(|tag| matches!(
            tag,
            ConstraintTag::Disjoint { .. } | ConstraintTag::Trace { .. }
        )));
        let windows = core
            .iter()
            .filter(|tag| matches!(tag, ConstraintTag::LeafWindow { .. }))
            .count();
        assert_eq!(windows, 2);
    }

    #[test]
    fn test_feasible_bound() {
        match explain_infeasibility(&paper_example().unwrap(), 1).unwrap() {
            Diagnosis::Feasible(schedule) => assert_eq!(schedule.names(), vec!["ASVVI"]),
            other => panic!("expected a schedule, got {other:?}"),
        }
    }

    #[test]
    fn test_propagation_violations() {
        let tree = AttackTree::node(
            Operator::And,
            Interval::new(0, 2).unwrap(),
            "root",
            leaf("A", 3, 1),
            leaf("B", 1, 1),
        )
        .unwrap();
        let diagnosis = explain_infeasibility(&tree, 2).unwrap();
        assert!(matches!(diagnosis, Diagnosis::Violations(_)));
        assert!(diagnosis.explanations()[0].contains("'A'"));
    }

    #[test]
    fn test_explanations_are_readable() {
        let tree = AttackTree::leaf(Leaf::new("L", 5, 10).unwrap().with_window(Interval::new(0, 10).unwrap()));
        let diagnosis = explain_infeasibility(&tree, 0).unwrap();
        assert!(diagnosis.is_conflict());
        let lines = diagnosis.explanations();
        assert!(lines.iter().any(|line| line == "the goal 'L' must be achieved"));
        assert!(lines.iter().any(|line| line.contains("leaf 'L' must run inside [0, 10]")));
    }

    #[test]
    fn test_timeout_is_unknown_not_conflict() {
        let window = Interval::new(0, 400).unwrap();
        let mut tree = leaf("L0", 10, 1);
        for index in 1..8 {
            tree = AttackTree::node(Operator::And, window, format!("N{index}"), tree, leaf(&format!("L{index}"), 10, 1))
                .unwrap();
        }
        let options = SynthesisOptions {
            timeout: Some(std::time::Duration::from_nanos(1)),
            ..SynthesisOptions::default()
        };

        let diagnosis = explain_infeasibility_with(&tree, 3, &options).unwrap();
        match &diagnosis {
            Diagnosis::Unknown(reason) => assert!(reason.contains("timed out"), "{reason}"),
            other => panic!("expected an unknown diagnosis, got {other:?}"),
        }
        assert!(!diagnosis.is_conflict());
        assert!(diagnosis.explanations()[0].starts_with("solver gave up: "));
    }
}
