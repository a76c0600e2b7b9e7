//! Constraint-service interface and its CaDiCaL-backed implementation

use super::constraints::{ConstraintGenerator, ConstraintStatistics};
use super::solver::{SatSolver, SolveStatus, SolverOptions, SolverStatistics};
use super::terms::{
    BoolTerm, BoolVar, CheckResult, EventDomains, IntVar, LinearObjective, Model, SymbolVar, SymbolicEvent, TagId,
};
use super::variables::VariableStatistics;
use crate::error::SolverError;
use tracing::{debug, trace};

/// Capabilities the synthesis engine needs from a solving backend
pub trait ConstraintService {
    fn declare_bool(&mut self, name: &str) -> BoolVar;

    /// Integer over the inclusive range `[lo, hi]`
    fn declare_int(&mut self, name: &str, lo: i64, hi: i64) -> Result<IntVar, SolverError>;

    /// Value drawn from a finite set of names
    fn declare_symbol(&mut self, name: &str, domain: &[String]) -> Result<SymbolVar, SolverError>;

    fn declare_event(&mut self, name: &str, domains: &EventDomains) -> Result<SymbolicEvent, SolverError> {
        let (lo, hi) = domains.time;
        let (cost_lo, cost_hi) = domains.cost;
        let (first, last) = domains.positions;
        Ok(SymbolicEvent {
            start: self.declare_int(&format!("{name}.start"), lo, hi)?,
            end: self.declare_int(&format!("{name}.end"), lo, hi)?,
            id: self.declare_symbol(&format!("{name}.id"), &domains.ids)?,
            cost: self.declare_int(&format!("{name}.cost"), cost_lo, cost_hi)?,
            position: self.declare_int(&format!("{name}.position"), first, last)?,
        })
    }

    fn assert(&mut self, term: &BoolTerm) -> Result<(), SolverError>;

    /// Assert a constraint that can later appear in an unsatisfiable core
    fn assert_tagged(&mut self, term: &BoolTerm) -> Result<TagId, SolverError>;

    fn minimize(&mut self, objective: LinearObjective);

    fn check(&mut self) -> Result<CheckResult, SolverError>;
}

/// Options for [`CadicalService`]
#[derive(Debug, Clone)]
pub struct ServiceOptions {
    pub solver: SolverOptions,
    /// Shrink failed-assumption cores by deletion
    pub minimize_cores: bool,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            solver: SolverOptions::default(),
            minimize_cores: true,
        }
    }
}

/// [`ConstraintService`] on top of CaDiCaL
pub struct CadicalService {
    generator: ConstraintGenerator,
    solver: SatSolver,
    /// Activation literal of every tag, indexed by `TagId`
    activations: Vec<i32>,
    objective: Option<LinearObjective>,
    minimize_cores: bool,
}

impl CadicalService {
    pub fn new() -> Self {
        Self::with_options(ServiceOptions::default())
    }

    pub fn with_options(options: ServiceOptions) -> Self {
        let generator = ConstraintGenerator::new();
        let mut solver = SatSolver::with_options(options.solver);
        for clause in generator.constant_clauses() {
            // Unit clauses are never empty
            let _ = solver.add_clause(&clause);
        }

        Self {
            generator,
            solver,
            activations: Vec::new(),
            objective: None,
            minimize_cores: options.minimize_cores,
        }
    }

    pub fn solver_statistics(&self) -> SolverStatistics {
        self.solver.statistics()
    }

    pub fn variable_statistics(&mut self) -> VariableStatistics {
        self.generator.variable_manager().statistics()
    }

    pub fn constraint_statistics(&self) -> ConstraintStatistics {
        self.generator.statistics()
    }

    fn extract_model(&mut self) -> Result<Model, SolverError> {
        let manager = self.generator.variable_manager();
        let (bool_count, int_count) = (manager.bool_count(), manager.int_count());

        let mut bools = Vec::with_capacity(bool_count);
        for index in 0..bool_count {
            let literal = self.generator.bool_literal(BoolVar(index))?;
            bools.push(self.solver.value(literal));
        }

        let mut ints = Vec::with_capacity(int_count);
        for index in 0..int_count {
            let (lo, literals) = self.generator.int_literals(IntVar(index))?;
            let offset = literals
                .iter()
                .enumerate()
                .filter(|&(_, &literal)| self.solver.value(literal))
                .fold(0i128, |acc, (bit, _)| acc | 1 << bit);
            let value = i64::try_from(i128::from(lo) + offset)
                .map_err(|_| SolverError::UnknownVariable { kind: "int", index })?;
            ints.push(value);
        }

        let mut symbols = Vec::new();
        let mut index = 0;
        while let Ok((backing, domain)) = self.generator.symbol(SymbolVar(index)) {
            let position = ints[backing.0];
            let value = domain
                .get(position as usize)
                .cloned()
                .ok_or(SolverError::UnknownVariable { kind: "symbol", index })?;
            symbols.push(value);
            index += 1;
        }

        Ok(Model { bools, ints, symbols })
    }

    fn core(&mut self, assumptions: &[i32]) -> Option<Vec<TagId>> {
        if assumptions.is_empty() {
            return None;
        }

        let mut core: Vec<i32> = assumptions
            .iter()
            .copied()
            .filter(|&literal| self.solver.failed(literal))
            .collect();

        if self.minimize_cores {
            let mut index = 0;
            while index < core.len() {
                let mut candidate = core.clone();
                candidate.remove(index);
                match self.solver.solve(&candidate) {
                    SolveStatus::Unsatisfiable => core = candidate,
                    _ => index += 1,
                }
            }
        }

        let mut tags: Vec<TagId> = core
            .iter()
            .filter_map(|literal| self.activations.iter().position(|a| a == literal))
            .map(TagId)
            .collect();
        tags.sort();
        debug!(core_size = tags.len(), "extracted unsatisfiable core");
        Some(tags)
    }

    /// Tighten `objective < best` until the solver refutes it
    fn descend(&mut self, objective: &LinearObjective, mut best: Model) -> Result<CheckResult, SolverError> {
        let mut terms = Vec::with_capacity(objective.terms().len());
        for &(var, weight) in objective.terms() {
            terms.push((self.generator.bool_literal(var)?, weight));
        }

        loop {
            let cost = objective.evaluate(&best)?;
            debug!(cost, "found model");
            if cost == 0 {
                return Ok(CheckResult::Satisfiable(best));
            }

            let clauses = self.generator.at_most(&terms, cost - 1);
            self.solver.add_clauses(&clauses)?;

            match self.solver.solve(&self.activations.clone()) {
                SolveStatus::Satisfiable => best = self.extract_model()?,
                SolveStatus::Unsatisfiable => return Ok(CheckResult::Satisfiable(best)),
                SolveStatus::Unknown(reason) => {
                    return Ok(CheckResult::Unknown {
                        reason,
                        best: Some(best),
                    })
                }
            }
        }
    }
}

impl Default for CadicalService {
    fn default() -> Self {
        Self::new()
    }
}

impl ConstraintService for CadicalService {
    fn declare_bool(&mut self, name: &str) -> BoolVar {
        let var = self.generator.variable_manager().declare_bool();
        trace!(name, index = var.0, "declared boolean");
        var
    }

    fn declare_int(&mut self, name: &str, lo: i64, hi: i64) -> Result<IntVar, SolverError> {
        let (var, clauses) = self.generator.declare_int(name, lo, hi)?;
        self.solver.add_clauses(&clauses)?;
        trace!(name, lo, hi, "declared integer");
        Ok(var)
    }

    fn declare_symbol(&mut self, name: &str, domain: &[String]) -> Result<SymbolVar, SolverError> {
        let (var, clauses) = self.generator.declare_symbol(name, domain)?;
        self.solver.add_clauses(&clauses)?;
        Ok(var)
    }

    fn assert(&mut self, term: &BoolTerm) -> Result<(), SolverError> {
        let clauses = self.generator.encode(term, None)?;
        self.solver.add_clauses(&clauses)
    }

    fn assert_tagged(&mut self, term: &BoolTerm) -> Result<TagId, SolverError> {
        let tag = TagId(self.activations.len());
        let activation = self.generator.activation_literal(tag)?;
        let clauses = self.generator.encode(term, Some(activation))?;
        self.solver.add_clauses(&clauses)?;
        self.activations.push(activation);
        Ok(tag)
    }

    fn minimize(&mut self, objective: LinearObjective) {
        self.objective = Some(objective);
    }

    fn check(&mut self) -> Result<CheckResult, SolverError> {
        let assumptions = self.activations.clone();
        let status = self.solver.solve(&assumptions);
        debug!(
            variables = self.solver.variable_count(),
            clauses = self.solver.clause_count(),
            ?status,
            "solver check"
        );

        match status {
            SolveStatus::Satisfiable => {
                let model = self.extract_model()?;
                match self.objective.take() {
                    Some(objective) => {
                        let result = self.descend(&objective, model);
                        self.objective = Some(objective);
                        result
                    }
                    None => Ok(CheckResult::Satisfiable(model)),
                }
            }
            SolveStatus::Unsatisfiable => Ok(CheckResult::Unsatisfiable(self.core(&assumptions))),
            SolveStatus::Unknown(reason) => Ok(CheckResult::Unknown { reason, best: None }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sat::solver::CancelSignal;
    use crate::sat::terms::IntTerm;

    fn model_of(result: CheckResult) -> Model {
        match result {
            CheckResult::Satisfiable(model) => model,
            other => panic!("expected a model, got {other:?}"),
        }
    }

    #[test]
    fn test_integer_constraints() {
        let mut service = CadicalService::new();
        let x = service.declare_int("x", 0, 10).unwrap();
        let y = service.declare_int("y", -5, 10).unwrap();

        let constraints = [
            BoolTerm::ge(x, 3_i64),
            BoolTerm::le(x + 2, y),
            BoolTerm::le(y, 6_i64),
            BoolTerm::not(BoolTerm::eq(y, 5_i64)),
        ];
        for constraint in &constraints {
            service.assert(constraint).unwrap();
        }

        let model = model_of(service.check().unwrap());
        for constraint in &constraints {
            assert!(model.eval(constraint).unwrap(), "{constraint:?} violated");
        }
        let (xv, yv) = (model.int_value(x).unwrap(), model.int_value(y).unwrap());
        assert!((3..=4).contains(&xv));
        assert_eq!(yv, 6);
    }

    #[test]
    fn test_boolean_combinators() {
        let mut service = CadicalService::new();
        let a = service.declare_bool("a");
        let b = service.declare_bool("b");
        let c = service.declare_bool("c");

        service.assert(&BoolTerm::xor(a.into(), b.into())).unwrap();
        service.assert(&BoolTerm::implies(a.into(), c.into())).unwrap();
        service.assert(&BoolTerm::not(c.into())).unwrap();

        let model = model_of(service.check().unwrap());
        assert!(!model.bool_value(a).unwrap());
        assert!(model.bool_value(b).unwrap());
        assert!(!model.bool_value(c).unwrap());
    }

    #[test]
    fn test_symbols_and_events() {
        let mut service = CadicalService::new();
        let ids = vec!["A".to_string(), "B".to_string(), "C".to_string()];
        let domains = EventDomains {
            time: (0, 20),
            ids: ids.clone(),
            cost: (7, 7),
            positions: (0, 2),
        };
        let event = service.declare_event("B", &domains).unwrap();

        service.assert(&BoolTerm::symbol_is(event.id, "B")).unwrap();
        service.assert(&BoolTerm::eq(event.end, event.start + 4)).unwrap();
        service.assert(&BoolTerm::ge(event.start, 10_i64)).unwrap();

        let model = model_of(service.check().unwrap());
        assert_eq!(model.symbol_value(event.id).unwrap(), "B");
        assert_eq!(model.int_value(event.cost).unwrap(), 7);
        let start = model.int_value(event.start).unwrap();
        assert_eq!(model.eval_int(IntTerm::from(event.end)).unwrap(), start + 4);
        assert!(start >= 10 && start <= 16);

        assert!(service.declare_symbol("none", &[]).is_err());
        assert!(service.declare_int("empty", 4, 3).is_err());
    }

    #[test]
    fn test_unsat_core_is_minimal() {
        let mut service = CadicalService::new();
        let x = service.declare_int("x", 0, 10).unwrap();
        let y = service.declare_int("y", 0, 10).unwrap();

        let low = service.assert_tagged(&BoolTerm::ge(x, 5_i64)).unwrap();
        let unrelated = service.assert_tagged(&BoolTerm::ge(y, 1_i64)).unwrap();
        let high = service.assert_tagged(&BoolTerm::le(x, 2_i64)).unwrap();
        let redundant = service.assert_tagged(&BoolTerm::le(x, 3_i64)).unwrap();

        match service.check().unwrap() {
            CheckResult::Unsatisfiable(Some(core)) => {
                assert!(core.contains(&low));
                assert!(!core.contains(&unrelated));
                // Either upper bound alone conflicts with x ≥ 5
                assert_eq!(core.len(), 2);
                assert!(core.contains(&high) || core.contains(&redundant));
            }
            other => panic!("expected a core, got {other:?}"),
        }
    }

    #[test]
    fn test_untagged_unsat_has_no_core() {
        let mut service = CadicalService::new();
        let a = service.declare_bool("a");
        service.assert(&a.into()).unwrap();
        service.assert(&BoolTerm::not(a.into())).unwrap();
        assert_eq!(service.check().unwrap(), CheckResult::Unsatisfiable(None));
    }

    #[test]
    fn test_minimize_weighted_selection() {
        let mut service = CadicalService::new();
        let a = service.declare_bool("a");
        let b = service.declare_bool("b");
        let c = service.declare_bool("c");

        // Cover {a, b} and {b, c}: b alone (3) beats a + c (9)
        service.assert(&BoolTerm::or([a.into(), b.into()])).unwrap();
        service.assert(&BoolTerm::or([b.into(), c.into()])).unwrap();

        let mut objective = LinearObjective::new();
        objective.add(a, 5);
        objective.add(b, 3);
        objective.add(c, 4);
        service.minimize(objective.clone());

        let model = model_of(service.check().unwrap());
        assert_eq!(objective.evaluate(&model).unwrap(), 3);
        assert!(model.bool_value(b).unwrap());
    }

    #[test]
    fn test_wide_integers_solve_directly() {
        let mut service = CadicalService::new();
        let x = service.declare_int("x", 0, 4_000_000_000_000).unwrap();
        let y = service.declare_int("y", 0, 4_000_000_000_000).unwrap();

        service.assert(&BoolTerm::ge(x, 1_000_000_000_000_i64)).unwrap();
        service.assert(&BoolTerm::eq(y, x + 2_999_999_999_999)).unwrap();
        service.assert(&BoolTerm::le(y, 3_999_999_999_999_i64)).unwrap();

        let model = model_of(service.check().unwrap());
        assert_eq!(model.int_value(x).unwrap(), 1_000_000_000_000);
        assert_eq!(model.int_value(y).unwrap(), 3_999_999_999_999);
        assert!(service.variable_statistics().total_variables < 2_000);
    }

    #[test]
    fn test_minimize_large_weights() {
        let mut service = CadicalService::new();
        let a = service.declare_bool("a");
        let b = service.declare_bool("b");
        let c = service.declare_bool("c");

        // Either c alone or both a and b
        service.assert(&BoolTerm::or([c.into(), BoolTerm::and([a.into(), b.into()])])).unwrap();

        let mut objective = LinearObjective::new();
        objective.add(a, 1_000_000_000);
        objective.add(b, 1_000_000_000);
        objective.add(c, 3_000_000_000);
        service.minimize(objective.clone());

        let model = model_of(service.check().unwrap());
        assert_eq!(objective.evaluate(&model).unwrap(), 2_000_000_000);
        assert!(!model.bool_value(c).unwrap());
    }

    #[test]
    fn test_interrupted_descent_keeps_best_model() {
        let signal = CancelSignal::new();
        let mut service = CadicalService::with_options(ServiceOptions {
            solver: SolverOptions {
                timeout: None,
                cancel: Some((signal.clone(), 1)),
            },
            minimize_cores: true,
        });
        let vars: Vec<BoolVar> = ["a", "b", "c", "d"].iter().map(|name| service.declare_bool(name)).collect();
        service.assert_tagged(&BoolTerm::or([vars[0].into(), vars[1].into()])).unwrap();
        service.assert_tagged(&BoolTerm::or([vars[2].into(), vars[3].into()])).unwrap();

        let first = model_of(service.check().unwrap());
        let mut objective = LinearObjective::new();
        for &var in &vars {
            objective.add(var, 1);
        }

        // A smaller bound succeeds elsewhere; the tightened check stops at once
        signal.report_satisfiable(0);
        match service.descend(&objective, first.clone()).unwrap() {
            CheckResult::Unknown { reason, best } => {
                assert!(reason.starts_with("cancelled"));
                assert_eq!(best, Some(first));
            }
            other => panic!("expected an interrupted descent, got {other:?}"),
        }
    }

    #[test]
    fn test_minimize_zero_cost() {
        let mut service = CadicalService::new();
        let a = service.declare_bool("a");
        let mut objective = LinearObjective::new();
        objective.add(a, 10);
        service.minimize(objective);

        let model = model_of(service.check().unwrap());
        assert!(!model.bool_value(a).unwrap());
    }
}
