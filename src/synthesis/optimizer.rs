//! Cost-optimal synthesis over every bound

use super::bounded::SynthesisOptions;
use super::encoder::encode;
use super::schedule::{Infeasible, Schedule};
use super::validator::ScheduleValidator;
use crate::attack_tree::{propagate, AttackTree};
use crate::error::EngineError;
use crate::sat::{CheckResult, ConstraintService};
use rayon::prelude::*;
use std::ops::RangeInclusive;
use tracing::{debug, info, warn};

/// Outcome of cost optimization
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptimizationOutcome {
    Optimal { schedule: Schedule, total_cost: u64 },
    Infeasible(Infeasible),
    /// Some bound ended without an answer; `best` is the cheapest schedule seen anyway
    SolverUnknown {
        bound: usize,
        reason: String,
        best: Option<Schedule>,
    },
}

/// Per-bound optimum
#[derive(Debug, Clone, PartialEq, Eq)]
enum BoundOptimum {
    Minimal(Schedule),
    Unsatisfiable,
    Unknown { reason: String, best: Option<Schedule> },
}

pub struct CostOptimizer {
    options: SynthesisOptions,
    validator: ScheduleValidator,
}

impl CostOptimizer {
    pub fn new(options: SynthesisOptions) -> Self {
        Self {
            options,
            validator: ScheduleValidator::new(),
        }
    }

    /// Cheapest schedule over bounds `0..=leaf count`, capped by `max_bound`
    pub fn optimize(&self, tree: &AttackTree) -> Result<OptimizationOutcome, EngineError> {
        let limit = self.options.bound_limit(tree);
        self.optimize_within(tree, 0..=limit)
    }

    /// Cheapest schedule over an explicit range of bounds
    pub fn optimize_within(
        &self,
        tree: &AttackTree,
        bounds: RangeInclusive<usize>,
    ) -> Result<OptimizationOutcome, EngineError> {
        let propagated = match propagate(tree) {
            Ok(propagated) => propagated,
            Err(violations) => {
                warn!(count = violations.len(), "tree rejected by propagation");
                return Ok(OptimizationOutcome::Infeasible(Infeasible::Violations(violations)));
            }
        };

        let max_bound = *bounds.end();
        info!(
            goal = propagated.name(),
            first = *bounds.start(),
            last = max_bound,
            parallel = self.options.parallel,
            "starting cost optimization"
        );

        let bound_list: Vec<usize> = bounds.collect();
        let results: Vec<Result<BoundOptimum, EngineError>> = if self.options.parallel {
            bound_list
                .par_iter()
                .map(|&bound| self.optimize_bound(&propagated, bound))
                .collect()
        } else {
            bound_list
                .iter()
                .map(|&bound| self.optimize_bound(&propagated, bound))
                .collect()
        };

        combine(bound_list.into_iter().zip(results), max_bound)
    }

    fn optimize_bound(&self, tree: &AttackTree, bound: usize) -> Result<BoundOptimum, EngineError> {
        let mut service = self.options.service(None);
        let encoding = encode(tree, bound, &mut service)?;
        service.minimize(encoding.objective.clone());

        let outcome = match service.check()? {
            CheckResult::Satisfiable(model) => {
                let schedule = encoding.extract_schedule(&model)?;
                self.validator.ensure_valid(tree, &schedule)?;
                debug!(bound, cost = schedule.total_cost(), "bound minimized");
                BoundOptimum::Minimal(schedule)
            }
            CheckResult::Unsatisfiable(_) => {
                debug!(bound, "bound unsatisfiable");
                BoundOptimum::Unsatisfiable
            }
            CheckResult::Unknown { reason, best } => {
                let best = match best {
                    Some(model) => {
                        let schedule = encoding.extract_schedule(&model)?;
                        self.validator.ensure_valid(tree, &schedule)?;
                        Some(schedule)
                    }
                    None => None,
                };
                BoundOptimum::Unknown { reason, best }
            }
        };
        Ok(outcome)
    }
}

/// Fold per-bound optima in bound order; only a strictly cheaper schedule replaces the incumbent
fn combine(
    optima: impl IntoIterator<Item = (usize, Result<BoundOptimum, EngineError>)>,
    max_bound: usize,
) -> Result<OptimizationOutcome, EngineError> {
    let mut best: Option<Schedule> = None;
    let mut unknown: Option<(usize, String)> = None;
    for (bound, result) in optima {
        let candidate = match result? {
            BoundOptimum::Minimal(schedule) => Some(schedule),
            BoundOptimum::Unsatisfiable => None,
            BoundOptimum::Unknown { reason, best: partial } => {
                warn!(bound, %reason, "solver gave up while minimizing");
                unknown.get_or_insert((bound, reason));
                partial
            }
        };
        if let Some(schedule) = candidate {
            let improves = best
                .as_ref()
                .map_or(true, |current| schedule.total_cost() < current.total_cost());
            if improves {
                best = Some(schedule);
            }
        }
    }

    Ok(match (unknown, best) {
        (Some((bound, reason)), best) => OptimizationOutcome::SolverUnknown { bound, reason, best },
        (None, Some(schedule)) => {
            let total_cost = schedule.total_cost();
            info!(bound = schedule.bound, total_cost, "optimal schedule found");
            OptimizationOutcome::Optimal { schedule, total_cost }
        }
        (None, None) => OptimizationOutcome::Infeasible(Infeasible::NoSchedule { max_bound }),
    })
}

impl Default for CostOptimizer {
    fn default() -> Self {
        Self::new(SynthesisOptions::default())
    }
}

/// Cheapest schedule with default options
pub fn optimize_cost(tree: &AttackTree) -> Result<OptimizationOutcome, EngineError> {
    CostOptimizer::default().optimize(tree)
}

/// Cheapest schedule among the given bounds, with default options
pub fn optimize_cost_within(
    tree: &AttackTree,
    bounds: RangeInclusive<usize>,
) -> Result<OptimizationOutcome, EngineError> {
    CostOptimizer::default().optimize_within(tree, bounds)
}
