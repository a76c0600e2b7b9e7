//! Attack tree structure

use super::{Interval, Leaf, Operator, OperatorNode};
use crate::error::ConstructionError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Window a top-level leaf lives in when it carries none of its own
pub const AMBIENT_WINDOW: Interval = Interval::AMBIENT;

/// A binary attack tree: either an atomic action or an operator over two subtrees
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AttackTree {
    Leaf(Leaf),
    Gate(Box<Gate>),
}

/// Internal node of an attack tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gate {
    pub node: OperatorNode,
    pub left: AttackTree,
    pub right: AttackTree,
}

impl AttackTree {
    pub fn leaf(leaf: Leaf) -> Self {
        AttackTree::Leaf(leaf)
    }

    /// Combine two subtrees under an operator node
    pub fn gate(node: OperatorNode, left: AttackTree, right: AttackTree) -> Result<Self, ConstructionError> {
        let mut seen: HashSet<&str> = left.leaves().map(Leaf::name).collect();
        for leaf in right.leaves() {
            if !seen.insert(leaf.name()) {
                return Err(ConstructionError::DuplicateLeafName(leaf.name().to_string()));
            }
        }
        Ok(AttackTree::Gate(Box::new(Gate { node, left, right })))
    }

    /// Shorthand for `gate` with a freshly built operator node
    pub fn node(
        operator: Operator,
        interval: Interval,
        name: impl Into<String>,
        left: AttackTree,
        right: AttackTree,
    ) -> Result<Self, ConstructionError> {
        Self::gate(OperatorNode::new(operator, interval, name)?, left, right)
    }

    /// Re-check invariants that serde does not enforce (unique leaf names)
    pub fn validate(&self) -> Result<(), ConstructionError> {
        let mut seen = HashSet::new();
        for leaf in self.leaves() {
            if !seen.insert(leaf.name()) {
                return Err(ConstructionError::DuplicateLeafName(leaf.name().to_string()));
            }
        }
        Ok(())
    }

    /// Name of the root element
    pub fn name(&self) -> &str {
        match self {
            AttackTree::Leaf(leaf) => leaf.name(),
            AttackTree::Gate(gate) => gate.node.name(),
        }
    }

    /// Window of the root: the gate interval, the leaf's own window, or the ambient window
    pub fn window(&self) -> Interval {
        match self {
            AttackTree::Leaf(leaf) => leaf.window().copied().unwrap_or(AMBIENT_WINDOW),
            AttackTree::Gate(gate) => *gate.node.interval(),
        }
    }

    /// Leaves from left to right
    pub fn leaves(&self) -> Leaves<'_> {
        Leaves { stack: vec![self] }
    }

    pub fn leaf_count(&self) -> usize {
        self.leaves().count()
    }

    /// Find a leaf by name
    pub fn find_leaf(&self, name: &str) -> Option<&Leaf> {
        self.leaves().find(|leaf| leaf.name() == name)
    }

    pub fn depth(&self) -> usize {
        match self {
            AttackTree::Leaf(_) => 1,
            AttackTree::Gate(gate) => 1 + gate.left.depth().max(gate.right.depth()),
        }
    }

    /// Every interval mentioned in the tree, gate intervals and leaf windows alike
    pub fn intervals(&self) -> Vec<Interval> {
        let mut intervals = Vec::new();
        self.collect_intervals(&mut intervals);
        intervals
    }

    fn collect_intervals(&self, out: &mut Vec<Interval>) {
        match self {
            AttackTree::Leaf(leaf) => out.push(leaf.window().copied().unwrap_or(AMBIENT_WINDOW)),
            AttackTree::Gate(gate) => {
                out.push(*gate.node.interval());
                gate.left.collect_intervals(out);
                gate.right.collect_intervals(out);
            }
        }
    }

    /// Sum of all leaf durations, `None` when it overflows
    pub fn total_duration(&self) -> Option<u64> {
        self.leaves().try_fold(0u64, |total, leaf| total.checked_add(leaf.duration()))
    }
}

/// Depth-first iterator over the leaves of a tree
#[derive(Clone)]
pub struct Leaves<'a> {
    stack: Vec<&'a AttackTree>,
}

impl<'a> Iterator for Leaves<'a> {
    type Item = &'a Leaf;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(tree) = self.stack.pop() {
            match tree {
                AttackTree::Leaf(leaf) => return Some(leaf),
                AttackTree::Gate(gate) => {
                    self.stack.push(&gate.right);
                    self.stack.push(&gate.left);
                }
            }
        }
        None
    }
}

impl fmt::Display for AttackTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttackTree::Leaf(leaf) => write!(f, "{}", leaf.name()),
            AttackTree::Gate(gate) => write!(
                f,
                "({} {} {}){}",
                gate.left,
                gate.node.operator(),
                gate.right,
                gate.node.interval()
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(name: &str, duration: u64, cost: u64) -> AttackTree {
        AttackTree::leaf(Leaf::new(name, duration, cost).unwrap())
    }

    fn sample() -> AttackTree {
        let inner = AttackTree::node(
            Operator::And,
            Interval::new(5, 16).unwrap(),
            "IVRD",
            leaf("OID", 2, 14),
            leaf("IRID", 2, 10),
        )
        .unwrap();
        AttackTree::node(
            Operator::Or,
            Interval::new(3, 12).unwrap(),
            "IC",
            leaf("ASVVI", 2, 25),
            inner,
        )
        .unwrap()
    }

    #[test]
    fn test_leaf_order_and_count() {
        let tree = sample();
        let names: Vec<_> = tree.leaves().map(Leaf::name).collect();
        assert_eq!(names, vec!["ASVVI", "OID", "IRID"]);
        assert_eq!(tree.leaf_count(), 3);
        assert_eq!(tree.depth(), 3);
        assert_eq!(tree.total_duration(), Some(6));
        assert_eq!(tree.name(), "IC");
    }

    #[test]
    fn test_duplicate_leaf_names_rejected() {
        let result = AttackTree::node(
            Operator::And,
            Interval::new(0, 10).unwrap(),
            "dup",
            leaf("A", 1, 1),
            leaf("A", 2, 2),
        );
        assert_eq!(
            result,
            Err(ConstructionError::DuplicateLeafName("A".to_string()))
        );
    }

    #[test]
    fn test_root_window() {
        assert_eq!(sample().window(), Interval::new(3, 12).unwrap());
        assert_eq!(leaf("L", 1, 1).window(), AMBIENT_WINDOW);
    }

    #[test]
    fn test_tree_serialization() {
        let tree = sample();
        let yaml = serde_yaml::to_string(&tree).unwrap();
        assert!(yaml.contains("kind: gate"));
        let back: AttackTree = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back, tree);
    }

    #[test]
    fn test_display() {
        assert_eq!(
            sample().to_string(),
            "(ASVVI OR (OID AND IRID)[5, 16])[3, 12]"
        );
    }
}
