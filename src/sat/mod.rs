//! SAT-backed constraint service

pub mod terms;
pub mod variables;
pub mod constraints;
pub mod solver;
pub mod service;

pub use terms::{
    BoolTerm, BoolVar, CheckResult, EventDomains, IntTerm, IntVar, LinearObjective, Model, SymbolVar,
    SymbolicEvent, TagId,
};
pub use variables::{VariableManager, VariableStatistics};
pub use constraints::{Clause, ConstraintGenerator, ConstraintStatistics};
pub use solver::{CancelSignal, SatSolver, SolveStatus, SolverOptions, SolverStatistics};
pub use service::{CadicalService, ConstraintService, ServiceOptions};
