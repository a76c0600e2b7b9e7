//! Bounded synthesis: find a schedule with the fewest events

use super::encoder::encode;
use super::schedule::{Infeasible, Schedule};
use super::validator::ScheduleValidator;
use crate::attack_tree::{propagate, AttackTree};
use crate::error::EngineError;
use crate::sat::{
    CadicalService, CancelSignal, CheckResult, ConstraintService, ConstraintStatistics, ServiceOptions, SolverOptions,
    VariableStatistics,
};
use rayon::prelude::*;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Knobs shared by synthesis, optimization and diagnostics
#[derive(Debug, Clone)]
pub struct SynthesisOptions {
    /// Time limit for each solver call
    pub timeout: Option<Duration>,
    /// Largest bound to try; defaults to the number of leaves
    pub max_bound: Option<usize>,
    /// Solve all bounds concurrently
    pub parallel: bool,
    /// Shrink unsatisfiable cores by deletion
    pub minimize_cores: bool,
}

impl Default for SynthesisOptions {
    fn default() -> Self {
        Self {
            timeout: None,
            max_bound: None,
            parallel: false,
            minimize_cores: true,
        }
    }
}

impl SynthesisOptions {
    /// Bounds `0..=k` to explore for `tree`
    pub fn bound_limit(&self, tree: &AttackTree) -> usize {
        let leaves = tree.leaf_count();
        self.max_bound.map_or(leaves, |max| max.min(leaves))
    }

    pub(crate) fn service(&self, cancel: Option<(CancelSignal, usize)>) -> CadicalService {
        CadicalService::with_options(ServiceOptions {
            solver: SolverOptions {
                timeout: self.timeout,
                cancel,
            },
            minimize_cores: self.minimize_cores,
        })
    }
}

/// Answer for a single bound
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoundResult {
    Satisfiable(Schedule),
    Unsatisfiable,
    Unknown(String),
}

/// Outcome of a synthesis run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SynthesisOutcome {
    Found(Schedule),
    Infeasible(Infeasible),
    /// The solver gave up at `bound` before any smaller bound succeeded
    SolverUnknown { bound: usize, reason: String },
}

/// Size of the formula built for one bound
#[derive(Debug, Clone)]
pub struct EncodingStatistics {
    pub bound: usize,
    pub tags: usize,
    pub variables: VariableStatistics,
    pub constraints: ConstraintStatistics,
}

impl fmt::Display for EncodingStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Encoding at bound {} ({} tagged constraints)", self.bound, self.tags)?;
        write!(f, "{}{}", self.variables, self.constraints)
    }
}

pub struct BoundedSynthesizer {
    options: SynthesisOptions,
    validator: ScheduleValidator,
}

impl BoundedSynthesizer {
    pub fn new(options: SynthesisOptions) -> Self {
        Self {
            options,
            validator: ScheduleValidator::new(),
        }
    }

    pub fn options(&self) -> &SynthesisOptions {
        &self.options
    }

    /// Find a schedule at the smallest satisfiable bound
    pub fn synthesize(&self, tree: &AttackTree) -> Result<SynthesisOutcome, EngineError> {
        let propagated = match propagate(tree) {
            Ok(propagated) => propagated,
            Err(violations) => {
                warn!(count = violations.len(), "tree rejected by propagation");
                return Ok(SynthesisOutcome::Infeasible(Infeasible::Violations(violations)));
            }
        };

        let max_bound = self.options.bound_limit(&propagated);
        info!(
            goal = propagated.name(),
            leaves = propagated.leaf_count(),
            max_bound,
            parallel = self.options.parallel,
            "starting bounded synthesis"
        );

        if self.options.parallel {
            self.synthesize_parallel(&propagated, max_bound)
        } else {
            self.synthesize_sequential(&propagated, max_bound)
        }
    }

    fn synthesize_sequential(&self, tree: &AttackTree, max_bound: usize) -> Result<SynthesisOutcome, EngineError> {
        for bound in 0..=max_bound {
            match self.solve_bound(tree, bound, None)? {
                BoundResult::Satisfiable(schedule) => {
                    info!(bound, cost = schedule.total_cost(), "schedule found");
                    return Ok(SynthesisOutcome::Found(schedule));
                }
                BoundResult::Unsatisfiable => debug!(bound, "bound unsatisfiable"),
                BoundResult::Unknown(reason) => {
                    warn!(bound, %reason, "solver gave up");
                    return Ok(SynthesisOutcome::SolverUnknown { bound, reason });
                }
            }
        }
        Ok(SynthesisOutcome::Infeasible(Infeasible::NoSchedule { max_bound }))
    }

    /// All bounds at once; larger bounds stop as soon as a smaller one is satisfiable
    fn synthesize_parallel(&self, tree: &AttackTree, max_bound: usize) -> Result<SynthesisOutcome, EngineError> {
        let signal = CancelSignal::new();
        let results: Vec<Result<BoundResult, EngineError>> = (0..=max_bound)
            .into_par_iter()
            .map(|bound| {
                let result = self.solve_bound(tree, bound, Some(signal.clone()));
                if let Ok(BoundResult::Satisfiable(_)) = &result {
                    signal.report_satisfiable(bound);
                }
                result
            })
            .collect();

        for (bound, result) in results.into_iter().enumerate() {
            match result? {
                BoundResult::Satisfiable(schedule) => {
                    info!(bound, cost = schedule.total_cost(), "schedule found");
                    return Ok(SynthesisOutcome::Found(schedule));
                }
                BoundResult::Unsatisfiable => {}
                BoundResult::Unknown(reason) => {
                    warn!(bound, %reason, "solver gave up");
                    return Ok(SynthesisOutcome::SolverUnknown { bound, reason });
                }
            }
        }
        Ok(SynthesisOutcome::Infeasible(Infeasible::NoSchedule { max_bound }))
    }

    /// Encode `tree` at `bound` in a fresh service and check it
    pub fn solve_bound(
        &self,
        tree: &AttackTree,
        bound: usize,
        cancel: Option<CancelSignal>,
    ) -> Result<BoundResult, EngineError> {
        let mut service = self.options.service(cancel.map(|signal| (signal, bound)));
        let encoding = encode(tree, bound, &mut service)?;

        match service.check()? {
            CheckResult::Satisfiable(model) => {
                let schedule = encoding.extract_schedule(&model)?;
                self.validator.ensure_valid(tree, &schedule)?;
                Ok(BoundResult::Satisfiable(schedule))
            }
            CheckResult::Unsatisfiable(_) => Ok(BoundResult::Unsatisfiable),
            CheckResult::Unknown { reason, .. } => Ok(BoundResult::Unknown(reason)),
        }
    }
}

impl BoundedSynthesizer {
    /// Build the formula for `bound` without solving it
    pub fn encoding_statistics(&self, tree: &AttackTree, bound: usize) -> Result<EncodingStatistics, EngineError> {
        let propagated = propagate(tree).map_err(EngineError::Rejected)?;
        let mut service = self.options.service(None);
        let encoding = encode(&propagated, bound, &mut service)?;
        Ok(EncodingStatistics {
            bound,
            tags: encoding.tags.len(),
            variables: service.variable_statistics(),
            constraints: service.constraint_statistics(),
        })
    }
}

impl Default for BoundedSynthesizer {
    fn default() -> Self {
        Self::new(SynthesisOptions::default())
    }
}

/// Find a minimal-length schedule with default options
pub fn synthesize(tree: &AttackTree) -> Result<SynthesisOutcome, EngineError> {
    BoundedSynthesizer::default().synthesize(tree)
}
