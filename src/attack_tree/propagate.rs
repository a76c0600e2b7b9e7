//! Top-down tightening of time windows

use super::{AttackTree, Gate, Interval, Leaf};
use crate::error::Violation;
use tracing::debug;

/// Propagate every gate interval down the tree.
///
/// Each child window is intersected with its parent's; leaves receive the
/// window they are ultimately bound by. All violations are collected before
/// returning, and a tree is only produced when there are none.
pub fn propagate(tree: &AttackTree) -> Result<AttackTree, Vec<Violation>> {
    let mut violations = Vec::new();

    let propagated = match tree {
        AttackTree::Leaf(leaf) => {
            let window = tree.window();
            check_leaf_fits(leaf, &window, leaf.name(), &mut violations);
            AttackTree::Leaf(leaf.clone().with_window(window))
        }
        AttackTree::Gate(gate) => AttackTree::Gate(Box::new(propagate_gate(gate, &mut violations))),
    };

    if violations.is_empty() {
        Ok(propagated)
    } else {
        debug!(count = violations.len(), root = tree.name(), "propagation rejected tree");
        Err(violations)
    }
}

/// Whether every child window of the tree is already contained in its parent's
pub fn is_propagated(tree: &AttackTree) -> bool {
    fn check(tree: &AttackTree, ambient: &Interval) -> bool {
        match tree {
            AttackTree::Leaf(leaf) => leaf
                .window()
                .map_or(false, |window| ambient.contains(window) && window.fits(leaf.duration())),
            AttackTree::Gate(gate) => {
                let interval = gate.node.interval();
                ambient.contains(interval) && check(&gate.left, interval) && check(&gate.right, interval)
            }
        }
    }
    check(tree, &tree.window())
}

fn propagate_gate(gate: &Gate, violations: &mut Vec<Violation>) -> Gate {
    let interval = *gate.node.interval();
    Gate {
        node: gate.node.clone(),
        left: propagate_child(&gate.left, gate, &interval, violations),
        right: propagate_child(&gate.right, gate, &interval, violations),
    }
}

fn propagate_child(
    child: &AttackTree,
    parent: &Gate,
    bound: &Interval,
    violations: &mut Vec<Violation>,
) -> AttackTree {
    match child {
        AttackTree::Leaf(leaf) => {
            let own = leaf.window().copied().unwrap_or(*bound);
            match bound.intersect(&own) {
                Some(window) => {
                    check_leaf_fits(leaf, &window, parent.node.name(), violations);
                    AttackTree::Leaf(leaf.clone().with_window(window))
                }
                None => {
                    violations.push(disjoint(leaf.name(), parent, bound));
                    child.clone()
                }
            }
        }
        AttackTree::Gate(sub) => match bound.intersect(sub.node.interval()) {
            Some(tightened) => {
                let tightened_gate = Gate {
                    node: sub.node.with_interval(tightened),
                    left: sub.left.clone(),
                    right: sub.right.clone(),
                };
                AttackTree::Gate(Box::new(propagate_gate(&tightened_gate, violations)))
            }
            None => {
                violations.push(disjoint(sub.node.name(), parent, bound));
                child.clone()
            }
        },
    }
}

fn check_leaf_fits(leaf: &Leaf, window: &Interval, node: &str, violations: &mut Vec<Violation>) {
    if !window.fits(leaf.duration()) {
        violations.push(Violation::DurationExceedsWindow {
            leaf: leaf.name().to_string(),
            node: node.to_string(),
            duration: leaf.duration(),
            window: window.to_string(),
        });
    }
}

fn disjoint(child: &str, parent: &Gate, bound: &Interval) -> Violation {
    Violation::DisjointIntervals {
        child: child.to_string(),
        parent: parent.node.name().to_string(),
        parent_interval: bound.to_string(),
    }
}
