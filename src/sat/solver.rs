//! SAT solver integration using CaDiCaL

use super::constraints::Clause;
use crate::error::SolverError;
use cadical::{Callbacks, Solver};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Smallest bound known to be satisfiable, shared between concurrent searches
#[derive(Debug, Clone)]
pub struct CancelSignal {
    best: Arc<AtomicUsize>,
}

impl CancelSignal {
    pub fn new() -> Self {
        Self {
            best: Arc::new(AtomicUsize::new(usize::MAX)),
        }
    }

    pub fn report_satisfiable(&self, bound: usize) {
        self.best.fetch_min(bound, Ordering::SeqCst);
    }

    pub fn best(&self) -> Option<usize> {
        match self.best.load(Ordering::SeqCst) {
            usize::MAX => None,
            bound => Some(bound),
        }
    }

    /// Whether a search at `bound` can no longer be the answer
    pub fn cancels(&self, bound: usize) -> bool {
        self.best.load(Ordering::SeqCst) < bound
    }
}

impl Default for CancelSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Terminate callback handed to CaDiCaL
struct Interrupt {
    started: Instant,
    timeout: Option<Duration>,
    cancel: Option<(CancelSignal, usize)>,
}

impl Callbacks for Interrupt {
    fn started(&mut self) {
        self.started = Instant::now();
    }

    fn terminate(&mut self) -> bool {
        if let Some(timeout) = self.timeout {
            if self.started.elapsed() >= timeout {
                return true;
            }
        }
        match &self.cancel {
            Some((signal, bound)) => signal.cancels(*bound),
            None => false,
        }
    }
}

/// Outcome of one call into the solver
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SolveStatus {
    Satisfiable,
    Unsatisfiable,
    Unknown(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverResultType {
    Satisfiable,
    Unsatisfiable,
    Timeout,
    Cancelled,
    NotSolved,
}

/// SAT solver wrapper for CaDiCaL
pub struct SatSolver {
    solver: Solver<Interrupt>,
    variable_count: usize,
    clause_count: usize,
    options: SolverOptions,
    solve_time: Duration,
    last_result: SolverResultType,
}

/// Statistics about the solving process
#[derive(Debug, Clone)]
pub struct SolverStatistics {
    pub variable_count: usize,
    pub clause_count: usize,
    pub solve_time: Duration,
    pub result: SolverResultType,
}

/// Configuration options for the SAT solver
#[derive(Debug, Clone, Default)]
pub struct SolverOptions {
    /// Per-call time limit
    pub timeout: Option<Duration>,
    /// Stop once a smaller bound than this one is known satisfiable
    pub cancel: Option<(CancelSignal, usize)>,
}

impl SatSolver {
    /// Create a new SAT solver instance
    pub fn new() -> Self {
        Self::with_options(SolverOptions::default())
    }

    pub fn with_options(options: SolverOptions) -> Self {
        let mut solver: Solver<Interrupt> = Solver::new();
        if options.timeout.is_some() || options.cancel.is_some() {
            solver.set_callbacks(Some(Interrupt {
                started: Instant::now(),
                timeout: options.timeout,
                cancel: options.cancel.clone(),
            }));
        }

        Self {
            solver,
            variable_count: 0,
            clause_count: 0,
            options,
            solve_time: Duration::ZERO,
            last_result: SolverResultType::NotSolved,
        }
    }

    /// Add clauses to the solver
    pub fn add_clauses(&mut self, clauses: &[Clause]) -> Result<(), SolverError> {
        for clause in clauses {
            self.add_clause(clause)?;
        }
        Ok(())
    }

    /// Add a single clause to the solver
    pub fn add_clause(&mut self, clause: &Clause) -> Result<(), SolverError> {
        if clause.is_empty() {
            return Err(SolverError::EmptyClause);
        }

        for &literal in &clause.literals {
            let var = literal.unsigned_abs() as usize;
            if var > self.variable_count {
                self.variable_count = var;
            }
        }

        self.solver.add_clause(clause.literals.iter().copied());

        self.clause_count += 1;
        Ok(())
    }

    /// Solve under temporary assumptions
    pub fn solve(&mut self, assumptions: &[i32]) -> SolveStatus {
        let start_time = Instant::now();
        let result = self.solver.solve_with(assumptions.iter().copied());
        self.solve_time = start_time.elapsed();

        match result {
            Some(true) => {
                self.last_result = SolverResultType::Satisfiable;
                SolveStatus::Satisfiable
            }
            Some(false) => {
                self.last_result = SolverResultType::Unsatisfiable;
                SolveStatus::Unsatisfiable
            }
            None => {
                let (result, reason) = self.interruption_reason();
                self.last_result = result;
                SolveStatus::Unknown(reason)
            }
        }
    }

    fn interruption_reason(&self) -> (SolverResultType, String) {
        if let Some((signal, bound)) = &self.options.cancel {
            if signal.cancels(*bound) {
                return (
                    SolverResultType::Cancelled,
                    format!("cancelled: bound {} is already satisfiable", signal.best().unwrap_or(0)),
                );
            }
        }
        match self.options.timeout {
            Some(timeout) if self.solve_time >= timeout => (
                SolverResultType::Timeout,
                format!("timed out after {:.3}s", timeout.as_secs_f64()),
            ),
            _ => (SolverResultType::Timeout, "solver stopped without an answer".to_string()),
        }
    }

    /// Value of a literal in the last model; unassigned reads as false
    pub fn value(&self, literal: i32) -> bool {
        if literal.unsigned_abs() as usize > self.variable_count {
            return false;
        }
        self.solver.value(literal).unwrap_or(false)
    }

    /// Whether an assumption took part in the last refutation
    pub fn failed(&self, literal: i32) -> bool {
        self.solver.failed(literal)
    }

    /// Get solver statistics
    pub fn statistics(&self) -> SolverStatistics {
        SolverStatistics {
            variable_count: self.variable_count,
            clause_count: self.clause_count,
            solve_time: self.solve_time,
            result: self.last_result,
        }
    }

    /// Get the number of variables
    pub fn variable_count(&self) -> usize {
        self.variable_count
    }

    /// Get the number of clauses
    pub fn clause_count(&self) -> usize {
        self.clause_count
    }
}

impl Default for SatSolver {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SolverStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "SAT Solver Statistics:")?;
        writeln!(f, "  Variables: {}", self.variable_count)?;
        writeln!(f, "  Clauses: {}", self.clause_count)?;
        writeln!(f, "  Solve time: {:.3}s", self.solve_time.as_secs_f64())?;
        writeln!(f, "  Result: {:?}", self.result)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_solver_creation() {
        let solver = SatSolver::new();
        assert_eq!(solver.variable_count(), 0);
        assert_eq!(solver.clause_count(), 0);
        assert_eq!(solver.statistics().result, SolverResultType::NotSolved);
    }

    #[test]
    fn test_simple_satisfiable() {
        let mut solver = SatSolver::new();

        // x1 ∨ x2, ¬x1 ∨ x2
        solver.add_clause(&Clause::new(vec![1, 2])).unwrap();
        solver.add_clause(&Clause::new(vec![-1, 2])).unwrap();

        assert_eq!(solver.solve(&[]), SolveStatus::Satisfiable);
        // x2 should be true to satisfy both clauses
        assert!(solver.value(2));
        assert_eq!(solver.statistics().result, SolverResultType::Satisfiable);
    }

    #[test]
    fn test_unsatisfiable() {
        let mut solver = SatSolver::new();
        solver.add_clauses(&[Clause::unit(1), Clause::unit(-1)]).unwrap();
        assert_eq!(solver.solve(&[]), SolveStatus::Unsatisfiable);
    }

    #[test]
    fn test_assumptions_and_failed_literals() {
        let mut solver = SatSolver::new();
        // a1 → x, a2 → ¬x, a3 → y
        solver
            .add_clauses(&[
                Clause::binary(-1, 4),
                Clause::binary(-2, -4),
                Clause::binary(-3, 5),
            ])
            .unwrap();

        assert_eq!(solver.solve(&[1, 3]), SolveStatus::Satisfiable);
        assert_eq!(solver.solve(&[1, 2, 3]), SolveStatus::Unsatisfiable);
        assert!(solver.failed(1));
        assert!(solver.failed(2));
        assert!(!solver.failed(3));

        // Assumptions do not persist
        assert_eq!(solver.solve(&[2]), SolveStatus::Satisfiable);
    }

    #[test]
    fn test_empty_clause_error() {
        let mut solver = SatSolver::new();
        assert_eq!(
            solver.add_clause(&Clause::new(vec![])),
            Err(SolverError::EmptyClause)
        );
    }

    #[test]
    fn test_variable_count_tracking() {
        let mut solver = SatSolver::new();

        solver.add_clause(&Clause::new(vec![1, -5, 3])).unwrap();
        assert_eq!(solver.variable_count(), 5); // Highest variable is 5

        solver.add_clause(&Clause::new(vec![2, -7])).unwrap();
        assert_eq!(solver.variable_count(), 7); // Now highest is 7
    }

    #[test]
    fn test_cancel_signal() {
        let signal = CancelSignal::new();
        assert_eq!(signal.best(), None);
        assert!(!signal.cancels(0));

        signal.report_satisfiable(3);
        signal.report_satisfiable(5);
        assert_eq!(signal.best(), Some(3));
        assert!(signal.cancels(4));
        assert!(!signal.cancels(3));
    }

    #[test]
    fn test_solver_with_options() {
        let options = SolverOptions {
            timeout: Some(Duration::from_secs(10)),
            cancel: Some((CancelSignal::new(), 2)),
        };
        let mut solver = SatSolver::with_options(options);
        solver.add_clause(&Clause::unit(1)).unwrap();
        assert_eq!(solver.solve(&[]), SolveStatus::Satisfiable);
    }
}
