//! Error types for tree construction, propagation and solving

use thiserror::Error;

/// Errors raised while building data-model values
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConstructionError {
    #[error("invalid interval [{tmin}, {tmax}]: {reason}")]
    InvalidInterval {
        tmin: String,
        tmax: String,
        reason: String,
    },

    #[error("invalid operator '{0}': expected AND, OR or SEQUENCE")]
    InvalidOperator(String),

    #[error("invalid leaf name '{0}': names must be non-empty")]
    InvalidLeafName(String),

    #[error("invalid node name '{0}': names must be non-empty")]
    InvalidNodeName(String),

    #[error("leaf '{name}' has invalid duration {duration}: durations must be positive")]
    InvalidDuration { name: String, duration: u64 },

    #[error("leaf name '{0}' appears more than once in the tree")]
    DuplicateLeafName(String),
}

/// Structural infeasibility found by interval propagation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Violation {
    #[error("leaf '{leaf}' (duration {duration}) does not fit the window {window} of node '{node}'")]
    DurationExceedsWindow {
        leaf: String,
        node: String,
        duration: u64,
        window: String,
    },

    #[error("the interval of '{child}' does not intersect the interval {parent_interval} of its parent '{parent}'")]
    DisjointIntervals {
        child: String,
        parent: String,
        parent_interval: String,
    },
}

impl Violation {
    /// Name of the tree element the violation is about
    pub fn subject(&self) -> &str {
        match self {
            Violation::DurationExceedsWindow { leaf, .. } => leaf,
            Violation::DisjointIntervals { child, .. } => child,
        }
    }
}

/// Misuse of the constraint-service interface
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SolverError {
    #[error("integer '{name}' has an empty domain [{lo}, {hi}]")]
    EmptyDomain { name: String, lo: i64, hi: i64 },

    #[error("symbol '{0}' has an empty domain")]
    EmptySymbolDomain(String),

    #[error("'{value}' is not in the domain of symbol '{symbol}'")]
    UnknownSymbolValue { symbol: String, value: String },

    #[error("unknown {kind} variable #{index}")]
    UnknownVariable { kind: &'static str, index: usize },

    #[error("cannot add an empty clause")]
    EmptyClause,

    #[error("objective bound overflow while tightening to {0}")]
    ObjectiveOverflow(u64),
}

/// Fatal failures of the synthesis engine
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error(transparent)]
    Solver(#[from] SolverError),

    #[error("'{0}' has an empty effective window and cannot be encoded")]
    EmptyWindow(String),

    #[error("solver returned a witness that violates the tree semantics: {0}")]
    InvalidWitness(String),

    #[error("model is missing a value for leaf '{0}'")]
    MissingValue(String),

    #[error("the time horizon of '{0}' exceeds the range of 64-bit time values")]
    HorizonOverflow(String),

    #[error("{field} {value} of leaf '{leaf}' exceeds the range of 64-bit values")]
    ValueOverflow {
        leaf: String,
        field: &'static str,
        value: u64,
    },

    #[error("tree rejected by window propagation ({} violation(s))", .0.len())]
    Rejected(Vec<Violation>),
}
