//! Schedule synthesis over the constraint service

pub mod schedule;
pub mod encoder;
pub mod validator;
pub mod bounded;
pub mod optimizer;
pub mod diagnostics;

pub use schedule::{Infeasible, Schedule, ScheduledAction};
pub use encoder::{encode, ConstraintTag, Encoding, FormulaBuilder, LeafEncoding};
pub use validator::{ScheduleValidator, ValidationResult};
pub use bounded::{
    synthesize, BoundResult, BoundedSynthesizer, EncodingStatistics, SynthesisOptions, SynthesisOutcome,
};
pub use optimizer::{optimize_cost, optimize_cost_within, CostOptimizer, OptimizationOutcome};
pub use diagnostics::{explain_infeasibility, explain_infeasibility_with, Diagnosis};
