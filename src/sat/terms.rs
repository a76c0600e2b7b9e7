//! Symbolic terms exchanged with a constraint service

use crate::error::SolverError;
use std::ops::Add;

/// Handle to a declared boolean
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BoolVar(pub(crate) usize);

/// Handle to a declared bounded integer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IntVar(pub(crate) usize);

/// Handle to a declared value over a finite set of names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolVar(pub(crate) usize);

/// Identifier handed out for every tagged assertion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TagId(pub usize);

/// `var + offset`, or the constant `offset` when there is no variable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntTerm {
    pub var: Option<IntVar>,
    pub offset: i64,
}

impl IntTerm {
    pub fn constant(value: i64) -> Self {
        Self { var: None, offset: value }
    }
}

impl From<IntVar> for IntTerm {
    fn from(var: IntVar) -> Self {
        Self { var: Some(var), offset: 0 }
    }
}

impl From<i64> for IntTerm {
    fn from(value: i64) -> Self {
        Self::constant(value)
    }
}

impl Add<i64> for IntTerm {
    type Output = IntTerm;

    fn add(self, delta: i64) -> IntTerm {
        IntTerm {
            var: self.var,
            offset: self.offset + delta,
        }
    }
}

impl Add<i64> for IntVar {
    type Output = IntTerm;

    fn add(self, delta: i64) -> IntTerm {
        IntTerm::from(self) + delta
    }
}

/// Boolean formula over declared variables and integer comparisons
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoolTerm {
    Const(bool),
    Var(BoolVar),
    Not(Box<BoolTerm>),
    And(Vec<BoolTerm>),
    Or(Vec<BoolTerm>),
    Implies(Box<BoolTerm>, Box<BoolTerm>),
    Xor(Box<BoolTerm>, Box<BoolTerm>),
    /// `lhs ≤ rhs`
    Le(IntTerm, IntTerm),
    /// The symbol takes the named value
    SymbolIs(SymbolVar, String),
}

impl BoolTerm {
    pub fn var(var: BoolVar) -> Self {
        BoolTerm::Var(var)
    }

    pub fn and(terms: impl IntoIterator<Item = BoolTerm>) -> Self {
        BoolTerm::And(terms.into_iter().collect())
    }

    pub fn or(terms: impl IntoIterator<Item = BoolTerm>) -> Self {
        BoolTerm::Or(terms.into_iter().collect())
    }

    pub fn not(term: BoolTerm) -> Self {
        BoolTerm::Not(Box::new(term))
    }

    pub fn implies(premise: BoolTerm, conclusion: BoolTerm) -> Self {
        BoolTerm::Implies(Box::new(premise), Box::new(conclusion))
    }

    pub fn xor(left: BoolTerm, right: BoolTerm) -> Self {
        BoolTerm::Xor(Box::new(left), Box::new(right))
    }

    pub fn le(lhs: impl Into<IntTerm>, rhs: impl Into<IntTerm>) -> Self {
        BoolTerm::Le(lhs.into(), rhs.into())
    }

    pub fn ge(lhs: impl Into<IntTerm>, rhs: impl Into<IntTerm>) -> Self {
        Self::le(rhs, lhs)
    }

    /// `lhs < rhs`, i.e. `lhs + 1 ≤ rhs`
    pub fn lt(lhs: impl Into<IntTerm>, rhs: impl Into<IntTerm>) -> Self {
        let lhs: IntTerm = lhs.into();
        BoolTerm::Le(lhs + 1, rhs.into())
    }

    pub fn eq(lhs: impl Into<IntTerm>, rhs: impl Into<IntTerm>) -> Self {
        let (lhs, rhs) = (lhs.into(), rhs.into());
        BoolTerm::And(vec![BoolTerm::Le(lhs, rhs), BoolTerm::Le(rhs, lhs)])
    }

    pub fn symbol_is(symbol: SymbolVar, value: impl Into<String>) -> Self {
        BoolTerm::SymbolIs(symbol, value.into())
    }
}

impl From<BoolVar> for BoolTerm {
    fn from(var: BoolVar) -> Self {
        BoolTerm::Var(var)
    }
}

/// Product of the values describing one scheduled action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SymbolicEvent {
    pub start: IntVar,
    pub end: IntVar,
    pub id: SymbolVar,
    pub cost: IntVar,
    pub position: IntVar,
}

/// Domains used when declaring a [`SymbolicEvent`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventDomains {
    pub time: (i64, i64),
    pub ids: Vec<String>,
    pub cost: (i64, i64),
    pub positions: (i64, i64),
}

/// `Σ weight · [var]` over booleans
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinearObjective {
    terms: Vec<(BoolVar, u64)>,
}

impl LinearObjective {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, var: BoolVar, weight: u64) {
        if weight > 0 {
            self.terms.push((var, weight));
        }
    }

    pub fn terms(&self) -> &[(BoolVar, u64)] {
        &self.terms
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Value of the objective under a model
    pub fn evaluate(&self, model: &Model) -> Result<u64, SolverError> {
        let mut total: u64 = 0;
        for &(var, weight) in &self.terms {
            if model.bool_value(var)? {
                total = total
                    .checked_add(weight)
                    .ok_or(SolverError::ObjectiveOverflow(total))?;
            }
        }
        Ok(total)
    }
}

/// Snapshot of a satisfying assignment
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Model {
    pub(crate) bools: Vec<bool>,
    pub(crate) ints: Vec<i64>,
    pub(crate) symbols: Vec<String>,
}

impl Model {
    pub fn bool_value(&self, var: BoolVar) -> Result<bool, SolverError> {
        self.bools
            .get(var.0)
            .copied()
            .ok_or(SolverError::UnknownVariable { kind: "bool", index: var.0 })
    }

    pub fn int_value(&self, var: IntVar) -> Result<i64, SolverError> {
        self.ints
            .get(var.0)
            .copied()
            .ok_or(SolverError::UnknownVariable { kind: "int", index: var.0 })
    }

    pub fn symbol_value(&self, var: SymbolVar) -> Result<&str, SolverError> {
        self.symbols
            .get(var.0)
            .map(String::as_str)
            .ok_or(SolverError::UnknownVariable { kind: "symbol", index: var.0 })
    }

    pub fn eval_int(&self, term: IntTerm) -> Result<i64, SolverError> {
        match term.var {
            Some(var) => Ok(self.int_value(var)? + term.offset),
            None => Ok(term.offset),
        }
    }

    /// Evaluate a formula under this assignment
    pub fn eval(&self, term: &BoolTerm) -> Result<bool, SolverError> {
        Ok(match term {
            BoolTerm::Const(value) => *value,
            BoolTerm::Var(var) => self.bool_value(*var)?,
            BoolTerm::Not(inner) => !self.eval(inner)?,
            BoolTerm::And(terms) => {
                for term in terms {
                    if !self.eval(term)? {
                        return Ok(false);
                    }
                }
                true
            }
            BoolTerm::Or(terms) => {
                for term in terms {
                    if self.eval(term)? {
                        return Ok(true);
                    }
                }
                false
            }
            BoolTerm::Implies(premise, conclusion) => !self.eval(premise)? || self.eval(conclusion)?,
            BoolTerm::Xor(left, right) => self.eval(left)? != self.eval(right)?,
            BoolTerm::Le(lhs, rhs) => self.eval_int(*lhs)? <= self.eval_int(*rhs)?,
            BoolTerm::SymbolIs(symbol, value) => self.symbol_value(*symbol)? == value.as_str(),
        })
    }
}

/// Answer of a satisfiability check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckResult {
    Satisfiable(Model),
    /// Carries a minimal set of conflicting tags when tagged assertions were made
    Unsatisfiable(Option<Vec<TagId>>),
    /// The solver gave up; `best` is the last model seen while minimizing
    Unknown { reason: String, best: Option<Model> },
}

impl CheckResult {
    pub fn is_satisfiable(&self) -> bool {
        matches!(self, CheckResult::Satisfiable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> Model {
        Model {
            bools: vec![true, false],
            ints: vec![3, 7],
            symbols: vec!["A".to_string()],
        }
    }

    #[test]
    fn test_term_helpers() {
        let x = IntVar(0);
        assert_eq!(BoolTerm::lt(x, 5_i64), BoolTerm::Le(x + 1, IntTerm::constant(5)));
        assert_eq!(BoolTerm::ge(x, 2_i64), BoolTerm::Le(IntTerm::constant(2), IntTerm::from(x)));
        assert_eq!((x + 2 + 3).offset, 5);
    }

    #[test]
    fn test_model_evaluation() {
        let model = model();
        let (a, b) = (BoolVar(0), BoolVar(1));
        let (x, y) = (IntVar(0), IntVar(1));

        assert!(model.eval(&BoolTerm::xor(a.into(), b.into())).unwrap());
        assert!(!model.eval(&BoolTerm::implies(a.into(), b.into())).unwrap());
        assert!(model.eval(&BoolTerm::le(x + 4, y)).unwrap());
        assert!(!model.eval(&BoolTerm::lt(x + 4, y)).unwrap());
        assert!(model.eval(&BoolTerm::eq(x + 4, y)).unwrap());
        assert!(model.eval(&BoolTerm::symbol_is(SymbolVar(0), "A")).unwrap());
        assert_eq!(
            model.int_value(IntVar(9)),
            Err(SolverError::UnknownVariable { kind: "int", index: 9 })
        );
    }

    #[test]
    fn test_objective() {
        let mut objective = LinearObjective::new();
        objective.add(BoolVar(0), 10);
        objective.add(BoolVar(1), 4);
        objective.add(BoolVar(1), 0);
        assert_eq!(objective.terms().len(), 2);
        assert_eq!(objective.evaluate(&model()).unwrap(), 10);
    }
}
