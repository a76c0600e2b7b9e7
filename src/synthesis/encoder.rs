//! Formula builder: translates an attack tree into constraints over a `ConstraintService`

use super::schedule::{Schedule, ScheduledAction};
use crate::attack_tree::{AttackTree, Interval, Leaf, Operator};
use crate::error::EngineError;
use crate::sat::{
    BoolTerm, BoolVar, ConstraintService, EventDomains, LinearObjective, Model, SymbolicEvent, TagId,
};
use itertools::Itertools;
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

/// Origin of a tagged constraint, reported back in unsatisfiable cores
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ConstraintTag {
    /// A selected leaf runs inside its window with its duration and cost
    LeafWindow { leaf: String, node: String, window: String },
    /// Two leaves under an AND node do not overlap
    Disjoint { left: String, right: String, node: String },
    /// A leaf of the left subtree of a SEQ node finishes before one of the right starts
    Ordering { before: String, after: String, node: String },
    /// Activity of a node follows its operator
    Operator { node: String, operator: Operator },
    /// Two selected leaves take distinct, time-ordered trace positions
    Trace { first: String, second: String },
    /// The root goal is achieved
    Root { goal: String },
}

impl fmt::Display for ConstraintTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstraintTag::LeafWindow { leaf, node, window } => {
                write!(f, "leaf '{leaf}' must run inside {window}, the window of '{node}'")
            }
            ConstraintTag::Disjoint { left, right, node } => write!(
                f,
                "leaf '{left}' and leaf '{right}' cannot both be scheduled disjointly within node '{node}'"
            ),
            ConstraintTag::Ordering { before, after, node } => write!(
                f,
                "leaf '{before}' must finish before leaf '{after}' starts (SEQ node '{node}')"
            ),
            ConstraintTag::Operator { node, operator } => match operator {
                Operator::Or => write!(f, "node '{node}' (OR) needs exactly one of its children"),
                Operator::And | Operator::Sequence => {
                    write!(f, "node '{node}' ({operator}) needs both of its children")
                }
            },
            ConstraintTag::Trace { first, second } => write!(
                f,
                "leaf '{first}' and leaf '{second}' must occupy separate trace positions"
            ),
            ConstraintTag::Root { goal } => write!(f, "the goal '{goal}' must be achieved"),
        }
    }
}

/// Symbols introduced for one leaf
#[derive(Debug, Clone)]
pub struct LeafEncoding {
    pub event: SymbolicEvent,
    pub selector: BoolVar,
    pub window: Interval,
    pub duration: u64,
    pub cost: u64,
}

/// Everything produced by one `encode` call
#[derive(Debug, Clone)]
pub struct Encoding {
    /// Term that holds exactly when the root goal is achieved
    pub root: BoolTerm,
    pub leaves: BTreeMap<String, LeafEncoding>,
    pub tags: BTreeMap<TagId, ConstraintTag>,
    /// `Σ sel(L) · cost(L)`
    pub objective: LinearObjective,
    pub bound: usize,
    /// Range of every start and end time
    pub horizon: (i64, i64),
}

impl Encoding {
    pub fn tag(&self, id: TagId) -> Option<&ConstraintTag> {
        self.tags.get(&id)
    }

    /// Read the selected leaves out of a model
    pub fn extract_schedule(&self, model: &Model) -> Result<Schedule, EngineError> {
        let mut actions = Vec::new();
        for (name, leaf) in &self.leaves {
            if !model.bool_value(leaf.selector)? {
                continue;
            }
            let start = model.int_value(leaf.event.start)?;
            let end = model.int_value(leaf.event.end)?;
            if start > end {
                continue;
            }
            let id = model.symbol_value(leaf.event.id)?;
            if id != name {
                return Err(EngineError::InvalidWitness(format!(
                    "event of leaf '{name}' carries the id '{id}'"
                )));
            }
            let cost = model.int_value(leaf.event.cost)?;
            actions.push(ScheduledAction::new(name.clone(), start, end, cost.max(0) as u64));
        }
        Ok(Schedule::new(self.bound, actions))
    }
}

/// `[min tmin, max finite endpoint + Σ durations]`; any schedule can be shifted left into it
pub fn time_horizon(tree: &AttackTree) -> Result<(i64, i64), EngineError> {
    let intervals = tree.intervals();
    let lo = intervals.iter().map(Interval::tmin).min().unwrap_or(0);
    let latest = intervals
        .iter()
        .flat_map(|interval| [Some(interval.tmin()), interval.tmax()])
        .flatten()
        .max()
        .unwrap_or(lo);
    let overflow = || EngineError::HorizonOverflow(tree.name().to_string());
    let slack = tree
        .total_duration()
        .and_then(|total| i64::try_from(total).ok())
        .ok_or_else(overflow)?;
    let hi = latest.checked_add(slack).ok_or_else(overflow)?;
    Ok((lo, hi))
}

/// Encode `tree` with at most `bound` scheduled events and assert its root
pub fn encode<S>(tree: &AttackTree, bound: usize, service: &mut S) -> Result<Encoding, EngineError>
where
    S: ConstraintService + ?Sized,
{
    let mut builder = FormulaBuilder::new(tree, bound, service)?;
    let root = builder.encode_subtree(tree, tree.window(), tree.name())?;
    builder.add_trace_constraints()?;

    let root_tag = builder.service.assert_tagged(&root)?;
    builder.tags.insert(
        root_tag,
        ConstraintTag::Root {
            goal: tree.name().to_string(),
        },
    );

    debug!(
        bound,
        leaves = builder.leaves.len(),
        tags = builder.tags.len(),
        "encoded attack tree"
    );

    Ok(Encoding {
        root,
        leaves: builder.leaves,
        tags: builder.tags,
        objective: builder.objective,
        bound,
        horizon: builder.horizon,
    })
}

/// Recursive translator threading a single service handle
pub struct FormulaBuilder<'a, S: ConstraintService + ?Sized> {
    service: &'a mut S,
    bound: usize,
    horizon: (i64, i64),
    ids: Vec<String>,
    leaves: BTreeMap<String, LeafEncoding>,
    tags: BTreeMap<TagId, ConstraintTag>,
    objective: LinearObjective,
}

impl<'a, S: ConstraintService + ?Sized> FormulaBuilder<'a, S> {
    pub fn new(tree: &AttackTree, bound: usize, service: &'a mut S) -> Result<Self, EngineError> {
        Ok(Self {
            service,
            bound,
            horizon: time_horizon(tree)?,
            ids: tree.leaves().map(|leaf| leaf.name().to_string()).collect(),
            leaves: BTreeMap::new(),
            tags: BTreeMap::new(),
            objective: LinearObjective::new(),
        })
    }

    /// Encode a subtree living inside `ambient`; returns the term for "this subtree is achieved"
    pub fn encode_subtree(
        &mut self,
        tree: &AttackTree,
        ambient: Interval,
        parent: &str,
    ) -> Result<BoolTerm, EngineError> {
        match tree {
            AttackTree::Leaf(leaf) => self.encode_leaf(leaf, ambient, parent),
            AttackTree::Gate(gate) => {
                let name = gate.node.name();
                let window = gate
                    .node
                    .interval()
                    .intersect(&ambient)
                    .ok_or_else(|| EngineError::EmptyWindow(name.to_string()))?;

                let left = self.encode_subtree(&gate.left, window, name)?;
                let right = self.encode_subtree(&gate.right, window, name)?;
                let operator = gate.node.operator();

                let active = self.service.declare_bool(&format!("{name}.active"));
                let combined = match operator {
                    Operator::And | Operator::Sequence => BoolTerm::and([left.clone(), right.clone()]),
                    Operator::Or => BoolTerm::xor(left.clone(), right.clone()),
                };
                let semantics = BoolTerm::and([
                    BoolTerm::implies(active.into(), combined),
                    BoolTerm::implies(BoolTerm::or([left, right]), active.into()),
                ]);
                self.tagged(
                    &semantics,
                    ConstraintTag::Operator {
                        node: name.to_string(),
                        operator,
                    },
                )?;

                match operator {
                    Operator::And => self.add_pairwise(gate.left.leaves(), gate.right.leaves(), name, true)?,
                    Operator::Sequence => {
                        self.add_pairwise(gate.left.leaves(), gate.right.leaves(), name, false)?
                    }
                    Operator::Or => {}
                }

                Ok(active.into())
            }
        }
    }

    fn encode_leaf(&mut self, leaf: &Leaf, ambient: Interval, parent: &str) -> Result<BoolTerm, EngineError> {
        let name = leaf.name();
        let window = match leaf.window() {
            Some(own) => own.intersect(&ambient),
            None => Some(ambient),
        }
        .ok_or_else(|| EngineError::EmptyWindow(name.to_string()))?;

        let signed = |field: &'static str, value: u64| {
            i64::try_from(value).map_err(|_| EngineError::ValueOverflow {
                leaf: name.to_string(),
                field,
                value,
            })
        };
        let cost = signed("cost", leaf.cost())?;
        let duration = signed("duration", leaf.duration())?;
        let domains = EventDomains {
            time: self.horizon,
            ids: self.ids.clone(),
            // the cost of an unselected event is irrelevant
            cost: (cost, cost),
            positions: (0, self.bound.max(1) as i64 - 1),
        };

        let selector = self.service.declare_bool(&format!("{name}.selected"));
        let event = self.service.declare_event(name, &domains)?;

        let mut placement = vec![
            BoolTerm::ge(event.start, window.tmin()),
            BoolTerm::eq(event.end, event.start + duration),
            BoolTerm::eq(event.cost, cost),
            BoolTerm::symbol_is(event.id, name),
            BoolTerm::ge(event.position, 0_i64),
            BoolTerm::le(event.position, self.bound as i64 - 1),
        ];
        if let Some(tmax) = window.tmax() {
            placement.push(BoolTerm::le(event.end, tmax));
        }

        self.tagged(
            &BoolTerm::implies(selector.into(), BoolTerm::and(placement)),
            ConstraintTag::LeafWindow {
                leaf: name.to_string(),
                node: parent.to_string(),
                window: window.to_string(),
            },
        )?;
        self.objective.add(selector, leaf.cost());

        self.leaves.insert(
            name.to_string(),
            LeafEncoding {
                event,
                selector,
                window,
                duration: leaf.duration(),
                cost: leaf.cost(),
            },
        );

        Ok(selector.into())
    }

    /// Disjointness (AND) or left-before-right ordering (SEQ) between two leaf sets
    fn add_pairwise<'t>(
        &mut self,
        left: impl Iterator<Item = &'t Leaf>,
        right: impl Iterator<Item = &'t Leaf> + Clone,
        node: &str,
        disjoint: bool,
    ) -> Result<(), EngineError> {
        for (first, second) in left.cartesian_product(right) {
            let (a, b) = (self.leaf(first.name())?, self.leaf(second.name())?);
            let both = BoolTerm::and([a.selector.into(), b.selector.into()]);
            let (constraint, tag) = if disjoint {
                (
                    BoolTerm::or([
                        BoolTerm::le(a.event.end, b.event.start),
                        BoolTerm::le(b.event.end, a.event.start),
                    ]),
                    ConstraintTag::Disjoint {
                        left: first.name().to_string(),
                        right: second.name().to_string(),
                        node: node.to_string(),
                    },
                )
            } else {
                (
                    BoolTerm::le(a.event.end, b.event.start),
                    ConstraintTag::Ordering {
                        before: first.name().to_string(),
                        after: second.name().to_string(),
                        node: node.to_string(),
                    },
                )
            };
            self.tagged(&BoolTerm::implies(both, constraint), tag)?;
        }
        Ok(())
    }

    /// Selected events form a trace: distinct positions agreeing with time order
    fn add_trace_constraints(&mut self) -> Result<(), EngineError> {
        let names: Vec<String> = self.leaves.keys().cloned().collect();
        for (first, second) in names.iter().tuple_combinations() {
            let (a, b) = (self.leaf(first)?, self.leaf(second)?);
            let (ea, eb) = (a.event, b.event);
            let constraint = BoolTerm::implies(
                BoolTerm::and([a.selector.into(), b.selector.into()]),
                BoolTerm::or([
                    BoolTerm::and([BoolTerm::lt(ea.position, eb.position), BoolTerm::le(ea.end, eb.start)]),
                    BoolTerm::and([BoolTerm::lt(eb.position, ea.position), BoolTerm::le(eb.end, ea.start)]),
                ]),
            );
            self.tagged(
                &constraint,
                ConstraintTag::Trace {
                    first: first.clone(),
                    second: second.clone(),
                },
            )?;
        }
        Ok(())
    }

    fn leaf(&self, name: &str) -> Result<LeafEncoding, EngineError> {
        self.leaves
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::MissingValue(name.to_string()))
    }

    fn tagged(&mut self, term: &BoolTerm, tag: ConstraintTag) -> Result<TagId, EngineError> {
        let id = self.service.assert_tagged(term)?;
        self.tags.insert(id, tag);
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attack_tree::{paper_example, propagate};
    use crate::sat::{CadicalService, CheckResult};

    fn leaf(name: &str, duration: u64, cost: u64) -> AttackTree {
        AttackTree::leaf(Leaf::new(name, duration, cost).unwrap())
    }

    fn iv(tmin: i64, tmax: i64) -> Interval {
        Interval::new(tmin, tmax).unwrap()
    }

    #[test]
    fn test_horizon() {
        let tree = AttackTree::node(Operator::And, iv(10, 200), "SI", leaf("SDC", 160, 1), leaf("X", 6, 1)).unwrap();
        assert_eq!(time_horizon(&tree).unwrap(), (0, 366));

        let propagated = propagate(&tree).unwrap();
        assert_eq!(time_horizon(&propagated).unwrap(), (10, 366));

        let single = AttackTree::leaf(Leaf::new("L", 5, 10).unwrap().with_window(iv(0, 10)));
        assert_eq!(time_horizon(&single).unwrap(), (0, 15));
    }

    #[test]
    fn test_horizon_overflow_is_reported() {
        let endless = Interval::unbounded(0);
        let tree = AttackTree::node(Operator::Sequence, endless, "root", leaf("A", u64::MAX, 0), leaf("B", 1, 0))
            .unwrap();
        assert_eq!(time_horizon(&tree), Err(EngineError::HorizonOverflow("root".to_string())));

        // Each duration fits, their sum does not
        let half = i64::MAX as u64 / 2 + 1;
        let tree = AttackTree::node(Operator::And, endless, "root", leaf("A", half, 0), leaf("B", half, 0)).unwrap();
        let mut service = CadicalService::new();
        assert!(matches!(encode(&tree, 2, &mut service), Err(EngineError::HorizonOverflow(_))));

        let late = AttackTree::leaf(Leaf::new("L", 10, 0).unwrap().with_window(iv(i64::MAX - 5, i64::MAX)));
        assert!(time_horizon(&late).is_err());
    }

    #[test]
    fn test_oversized_cost_is_reported() {
        let tree = AttackTree::leaf(Leaf::new("L", 1, u64::MAX).unwrap());
        let mut service = CadicalService::new();
        assert_eq!(
            encode(&tree, 1, &mut service).unwrap_err(),
            EngineError::ValueOverflow {
                leaf: "L".to_string(),
                field: "cost",
                value: u64::MAX,
            }
        );
    }

    #[test]
    fn test_encoding_tags() {
        let tree = propagate(&paper_example().unwrap()).unwrap();
        let mut service = CadicalService::new();
        let encoding = encode(&tree, 2, &mut service).unwrap();

        assert_eq!(encoding.leaves.len(), 3);
        let count = |pred: fn(&ConstraintTag) -> bool| encoding.tags.values().filter(|t| pred(t)).count();
        assert_eq!(count(|t| matches!(t, ConstraintTag::LeafWindow { .. })), 3);
        assert_eq!(count(|t| matches!(t, ConstraintTag::Operator { .. })), 2);
        assert_eq!(count(|t| matches!(t, ConstraintTag::Disjoint { .. })), 1);
        assert_eq!(count(|t| matches!(t, ConstraintTag::Trace { .. })), 3);
        assert_eq!(count(|t| matches!(t, ConstraintTag::Root { .. })), 1);

        assert!(encoding.tags.values().any(|t| t
            == &ConstraintTag::Disjoint {
                left: "OID".to_string(),
                right: "IRID".to_string(),
                node: "IVRD".to_string(),
            }));
    }

    #[test]
    fn test_or_selects_exactly_one_branch() {
        let tree = propagate(&paper_example().unwrap()).unwrap();
        let mut service = CadicalService::new();
        let encoding = encode(&tree, 3, &mut service).unwrap();

        let CheckResult::Satisfiable(model) = service.check().unwrap() else {
            panic!("paper example is feasible");
        };
        let schedule = encoding.extract_schedule(&model).unwrap();
        let names = schedule.names();
        assert!(names == vec!["ASVVI"] || (names.len() == 2 && !names.contains(&"ASVVI")));
        assert!(model.eval(&encoding.root).unwrap());
    }

    #[test]
    fn test_sequence_orders_children() {
        let tree = AttackTree::node(Operator::Sequence, iv(0, 6), "S", leaf("A", 3, 0), leaf("B", 3, 0)).unwrap();
        let mut service = CadicalService::new();
        let encoding = encode(&tree, 2, &mut service).unwrap();

        let CheckResult::Satisfiable(model) = service.check().unwrap() else {
            panic!("sequence fits exactly");
        };
        let schedule = encoding.extract_schedule(&model).unwrap();
        assert_eq!(
            schedule.actions,
            vec![ScheduledAction::new("A", 0, 3, 0), ScheduledAction::new("B", 3, 6, 0)]
        );
    }

    #[test]
    fn test_bound_zero_is_unsatisfiable() {
        let tree = AttackTree::leaf(Leaf::new("L", 5, 10).unwrap().with_window(iv(0, 10)));
        let mut service = CadicalService::new();
        encode(&tree, 0, &mut service).unwrap();
        assert!(matches!(service.check().unwrap(), CheckResult::Unsatisfiable(Some(_))));
    }

    #[test]
    fn test_empty_leaf_window_rejected() {
        let stranded = Leaf::new("A", 1, 0).unwrap().with_window(iv(50, 60));
        let tree = AttackTree::node(
            Operator::And,
            iv(0, 10),
            "root",
            AttackTree::leaf(stranded),
            leaf("B", 1, 0),
        )
        .unwrap();
        let mut service = CadicalService::new();
        assert_eq!(
            encode(&tree, 2, &mut service).unwrap_err(),
            EngineError::EmptyWindow("A".to_string())
        );
    }

    #[test]
    fn test_tag_display() {
        let tag = ConstraintTag::Disjoint {
            left: "A".to_string(),
            right: "B".to_string(),
            node: "X".to_string(),
        };
        assert_eq!(
            tag.to_string(),
            "leaf 'A' and leaf 'B' cannot both be scheduled disjointly within node 'X'"
        );
        let or = ConstraintTag::Operator {
            node: "IC".to_string(),
            operator: Operator::Or,
        };
        assert!(or.to_string().contains("exactly one"));
    }
}
