//! Timed Attack Tree Engine
//!
//! This library propagates time windows through attack trees and synthesizes
//! timed attack schedules with a SAT backend: the shortest schedule, the
//! cheapest schedule, or a minimal explanation of why none exists.

pub mod error;
pub mod attack_tree;
pub mod sat;
pub mod synthesis;
pub mod config;
pub mod utils;

pub use attack_tree::{propagate, AttackTree, Interval, Leaf, Operator, OperatorNode};
pub use config::Settings;
pub use error::{ConstructionError, EngineError, SolverError, Violation};
pub use synthesis::{
    explain_infeasibility, optimize_cost, optimize_cost_within, synthesize, Diagnosis, Infeasible,
    OptimizationOutcome, Schedule, ScheduledAction, SynthesisOptions, SynthesisOutcome,
};
