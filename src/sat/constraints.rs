//! Clause generation: binary integers, NNF and one-sided Tseitin definitions

use super::terms::{BoolTerm, BoolVar, IntVar, SymbolVar, TagId};
use super::variables::{bits_for, domain_width, VariableManager, VariableType};
use crate::error::SolverError;

/// Represents a SAT clause (disjunction of literals)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clause {
    pub literals: Vec<i32>, // Positive for variable, negative for negation
}

impl Clause {
    /// Create a new clause from literals
    pub fn new(literals: Vec<i32>) -> Self {
        Self { literals }
    }

    /// Create a unit clause (single literal)
    pub fn unit(literal: i32) -> Self {
        Self { literals: vec![literal] }
    }

    /// Create a binary clause (two literals)
    pub fn binary(lit1: i32, lit2: i32) -> Self {
        Self { literals: vec![lit1, lit2] }
    }

    /// Check if clause is empty (unsatisfiable)
    pub fn is_empty(&self) -> bool {
        self.literals.is_empty()
    }

    /// Check if clause is unit
    pub fn is_unit(&self) -> bool {
        self.literals.len() == 1
    }
}

/// A literal that may already be decided by the domain of its integer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Literal {
    True,
    False,
    Var(i32),
}

impl Literal {
    fn from_bool(value: bool) -> Self {
        if value {
            Literal::True
        } else {
            Literal::False
        }
    }

    fn negate(self) -> Self {
        match self {
            Literal::True => Literal::False,
            Literal::False => Literal::True,
            Literal::Var(lit) => Literal::Var(-lit),
        }
    }

    fn constant(self) -> Option<bool> {
        match self {
            Literal::True => Some(true),
            Literal::False => Some(false),
            Literal::Var(_) => None,
        }
    }
}

/// Unsigned number as literals, least significant bit first
type Bits = Vec<Literal>;

fn bit_of(value: u128, index: usize) -> bool {
    index < 128 && (value >> index) & 1 == 1
}

fn constant_bits(value: u128) -> Bits {
    (0..bits_for(value)).map(|index| Literal::from_bool(bit_of(value, index))).collect()
}

/// Bit `index` of `bits`, zero past its width
fn digit(bits: &[Literal], index: usize) -> Literal {
    bits.get(index).copied().unwrap_or(Literal::False)
}

/// Negation normal form; negation only appears on boolean literals
#[derive(Debug, Clone, PartialEq, Eq)]
enum Nnf {
    Const(bool),
    Lit(i32),
    /// `x - y ≤ c`, a missing side standing for zero
    Diff { x: Option<IntVar>, y: Option<IntVar>, c: i128 },
    And(Vec<Nnf>),
    Or(Vec<Nnf>),
}

impl Nnf {
    fn and(children: Vec<Nnf>) -> Nnf {
        let mut flat = Vec::with_capacity(children.len());
        for child in children {
            match child {
                Nnf::Const(true) => {}
                Nnf::Const(false) => return Nnf::Const(false),
                Nnf::And(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        match flat.len() {
            0 => Nnf::Const(true),
            1 => flat.pop().unwrap_or(Nnf::Const(true)),
            _ => Nnf::And(flat),
        }
    }

    fn or(children: Vec<Nnf>) -> Nnf {
        let mut flat = Vec::with_capacity(children.len());
        for child in children {
            match child {
                Nnf::Const(false) => {}
                Nnf::Const(true) => return Nnf::Const(true),
                Nnf::Or(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        match flat.len() {
            0 => Nnf::Const(false),
            1 => flat.pop().unwrap_or(Nnf::Const(false)),
            _ => Nnf::Or(flat),
        }
    }
}

/// Translates terms into clauses over a shared variable manager
pub struct ConstraintGenerator {
    variable_manager: VariableManager,
    /// Backing integer and value names of every symbol
    symbols: Vec<(IntVar, Vec<String>)>,
    true_literal: i32,
    clause_count: usize,
}

impl ConstraintGenerator {
    pub fn new() -> Self {
        let mut variable_manager = VariableManager::new();
        let true_literal = variable_manager.constant_variable();
        Self {
            variable_manager,
            symbols: Vec::new(),
            true_literal,
            clause_count: 0,
        }
    }

    /// Unit clause pinning the constant literal
    pub fn constant_clauses(&self) -> Vec<Clause> {
        vec![Clause::unit(self.true_literal)]
    }

    /// Declare an integer over `[lo, hi]` as `lo + Σ 2^i·bit_i`, capped at `hi`
    pub fn declare_int(&mut self, name: &str, lo: i64, hi: i64) -> Result<(IntVar, Vec<Clause>), SolverError> {
        if lo > hi {
            return Err(SolverError::EmptyDomain {
                name: name.to_string(),
                lo,
                hi,
            });
        }

        let var = self.variable_manager.declare_int(lo, hi);
        let bits = self.bits(var)?;
        let mut clauses = Vec::new();
        self.push_at_most(&bits, domain_width(lo, hi), &[], &mut clauses);

        self.clause_count += clauses.len();
        Ok((var, clauses))
    }

    /// Declare a symbol, backed by an integer indexing its domain
    pub fn declare_symbol(
        &mut self,
        name: &str,
        domain: &[String],
    ) -> Result<(SymbolVar, Vec<Clause>), SolverError> {
        if domain.is_empty() {
            return Err(SolverError::EmptySymbolDomain(name.to_string()));
        }
        let (index, clauses) = self.declare_int(name, 0, domain.len() as i64 - 1)?;
        self.symbols.push((index, domain.to_vec()));
        Ok((SymbolVar(self.symbols.len() - 1), clauses))
    }

    pub fn symbol(&self, symbol: SymbolVar) -> Result<&(IntVar, Vec<String>), SolverError> {
        self.symbols
            .get(symbol.0)
            .ok_or(SolverError::UnknownVariable { kind: "symbol", index: symbol.0 })
    }

    /// Clauses for `guard ⟹ term`, or for `term` alone without a guard
    pub fn encode(&mut self, term: &BoolTerm, guard: Option<i32>) -> Result<Vec<Clause>, SolverError> {
        let nnf = self.normalize(term, true)?;
        let prefix: Vec<i32> = guard.map(|g| vec![-g]).unwrap_or_default();
        let mut clauses = Vec::new();
        self.emit(&nnf, &prefix, &mut clauses)?;
        self.clause_count += clauses.len();
        Ok(clauses)
    }

    /// Clauses enforcing `Σ weight · lit ≤ bound` through a binary adder tree
    pub fn at_most(&mut self, terms: &[(i32, u64)], bound: u64) -> Vec<Clause> {
        let mut clauses = Vec::new();
        let mut operands: Vec<Bits> = Vec::new();

        for &(literal, weight) in terms {
            if weight == 0 {
                continue;
            }
            if weight > bound {
                clauses.push(Clause::unit(-literal));
                continue;
            }
            // weight · lit has the bits of weight, each gated by lit
            let scaled = (0..bits_for(u128::from(weight)))
                .map(|index| {
                    if bit_of(u128::from(weight), index) {
                        Literal::Var(literal)
                    } else {
                        Literal::False
                    }
                })
                .collect();
            operands.push(scaled);
        }

        while operands.len() > 1 {
            let mut pending = operands.into_iter();
            let mut summed = Vec::new();
            while let Some(first) = pending.next() {
                match pending.next() {
                    Some(second) => summed.push(self.add(&first, &second, &mut clauses)),
                    None => summed.push(first),
                }
            }
            operands = summed;
        }

        if let Some(total) = operands.pop() {
            self.push_at_most(&total, u128::from(bound), &[], &mut clauses);
        }

        self.clause_count += clauses.len();
        clauses
    }

    /// Literal of a declared boolean
    pub fn bool_literal(&mut self, var: BoolVar) -> Result<i32, SolverError> {
        self.variable_manager.bool_variable(var)
    }

    pub fn activation_literal(&mut self, tag: TagId) -> Result<i32, SolverError> {
        self.variable_manager.activation_variable(tag)
    }

    /// Bit literals of `var - lo`, least significant first, together with `lo`
    pub fn int_literals(&self, var: IntVar) -> Result<(i64, Vec<i32>), SolverError> {
        let (lo, _) = self.variable_manager.domain(var)?;
        let mut literals = Vec::new();
        for index in 0..self.variable_manager.bit_width(var)? {
            let literal = self
                .variable_manager
                .lookup(&VariableType::Bit { var, index })
                .ok_or(SolverError::UnknownVariable { kind: "integer bit", index: var.0 })?;
            literals.push(literal);
        }
        Ok((lo, literals))
    }

    pub fn variable_manager(&mut self) -> &mut VariableManager {
        &mut self.variable_manager
    }

    pub fn statistics(&self) -> ConstraintStatistics {
        ConstraintStatistics {
            total_variables: self.variable_manager.variable_count(),
            total_clauses: self.clause_count,
            symbols: self.symbols.len(),
        }
    }

    fn normalize(&mut self, term: &BoolTerm, positive: bool) -> Result<Nnf, SolverError> {
        Ok(match term {
            BoolTerm::Const(value) => Nnf::Const(*value == positive),
            BoolTerm::Var(var) => {
                let literal = self.variable_manager.bool_variable(*var)?;
                Nnf::Lit(if positive { literal } else { -literal })
            }
            BoolTerm::Not(inner) => self.normalize(inner, !positive)?,
            BoolTerm::And(terms) | BoolTerm::Or(terms) => {
                let children = terms
                    .iter()
                    .map(|t| self.normalize(t, positive))
                    .collect::<Result<Vec<_>, _>>()?;
                let conjunctive = matches!(term, BoolTerm::And(_)) == positive;
                if conjunctive {
                    Nnf::and(children)
                } else {
                    Nnf::or(children)
                }
            }
            BoolTerm::Implies(premise, conclusion) => {
                if positive {
                    Nnf::or(vec![self.normalize(premise, false)?, self.normalize(conclusion, true)?])
                } else {
                    Nnf::and(vec![self.normalize(premise, true)?, self.normalize(conclusion, false)?])
                }
            }
            BoolTerm::Xor(left, right) => {
                let (l_pos, l_neg) = (self.normalize(left, true)?, self.normalize(left, false)?);
                let (r_pos, r_neg) = (self.normalize(right, true)?, self.normalize(right, false)?);
                if positive {
                    Nnf::and(vec![Nnf::or(vec![l_pos, r_pos]), Nnf::or(vec![l_neg, r_neg])])
                } else {
                    Nnf::and(vec![Nnf::or(vec![l_neg, r_pos]), Nnf::or(vec![l_pos, r_neg])])
                }
            }
            BoolTerm::Le(lhs, rhs) => {
                // lhs.var - rhs.var ≤ rhs.offset - lhs.offset
                let c = i128::from(rhs.offset) - i128::from(lhs.offset);
                if lhs.var == rhs.var {
                    Nnf::Const((0 <= c) == positive)
                } else if positive {
                    Nnf::Diff { x: lhs.var, y: rhs.var, c }
                } else {
                    Nnf::Diff { x: rhs.var, y: lhs.var, c: -c - 1 }
                }
            }
            BoolTerm::SymbolIs(symbol, value) => {
                let (index, domain) = self.symbol(*symbol)?;
                let position = domain.iter().position(|name| name == value).ok_or_else(|| {
                    SolverError::UnknownSymbolValue {
                        symbol: format!("symbol#{}", symbol.0),
                        value: value.clone(),
                    }
                })?;
                let index = *index;
                self.normalize(&BoolTerm::eq(index, position as i64), positive)?
            }
        })
    }

    /// Add `prefix ∨ nnf` to `out`
    fn emit(&mut self, nnf: &Nnf, prefix: &[i32], out: &mut Vec<Clause>) -> Result<(), SolverError> {
        match nnf {
            Nnf::Const(true) => {}
            Nnf::Const(false) => self.push_clause(prefix, &[], out),
            Nnf::Lit(literal) => self.push_clause(prefix, &[Literal::Var(*literal)], out),
            Nnf::And(children) => {
                for child in children {
                    self.emit(child, prefix, out)?;
                }
            }
            Nnf::Or(children) => {
                let mut literals = Vec::with_capacity(children.len());
                for child in children {
                    let literal = match child {
                        Nnf::Lit(literal) => Literal::Var(*literal),
                        Nnf::Diff { x, y, c } => self.difference(*x, *y, *c, out)?,
                        other => {
                            let definition = self.variable_manager.fresh_auxiliary();
                            self.emit(other, &[-definition], out)?;
                            Literal::Var(definition)
                        }
                    };
                    literals.push(literal);
                }
                self.push_clause(prefix, &literals, out);
            }
            Nnf::Diff { x, y, c } => self.emit_difference(*x, *y, *c, prefix, out)?,
        }
        Ok(())
    }

    /// `prefix ∨ x - y ≤ c`; bounds against constants need no definitions
    fn emit_difference(
        &mut self,
        x: Option<IntVar>,
        y: Option<IntVar>,
        c: i128,
        prefix: &[i32],
        out: &mut Vec<Clause>,
    ) -> Result<(), SolverError> {
        if let Some(decided) = self.decided(x, y, c)? {
            if !decided {
                self.push_clause(prefix, &[], out);
            }
            return Ok(());
        }

        match (x, y) {
            // x - lo ≤ c - lo
            (Some(x), None) => {
                let (lo, _) = self.variable_manager.domain(x)?;
                let bits = self.bits(x)?;
                self.push_at_most(&bits, (c - i128::from(lo)) as u128, prefix, out);
            }
            // y - lo ≥ -c - lo
            (None, Some(y)) => {
                let (lo, _) = self.variable_manager.domain(y)?;
                let bits = self.bits(y)?;
                self.push_at_least(&bits, (-c - i128::from(lo)) as u128, prefix, out);
            }
            _ => {
                let literal = self.difference(x, y, c, out)?;
                self.push_clause(prefix, &[literal], out);
            }
        }
        Ok(())
    }

    /// Literal implying `x - y ≤ c`, with its definition added to `out`
    fn difference(
        &mut self,
        x: Option<IntVar>,
        y: Option<IntVar>,
        c: i128,
        out: &mut Vec<Clause>,
    ) -> Result<Literal, SolverError> {
        if let Some(decided) = self.decided(x, y, c)? {
            return Ok(Literal::from_bool(decided));
        }

        let (lhs, rhs) = match (x, y) {
            (Some(x), None) => {
                let (lo, _) = self.variable_manager.domain(x)?;
                (self.bits(x)?, constant_bits((c - i128::from(lo)) as u128))
            }
            (None, Some(y)) => {
                let (lo, _) = self.variable_manager.domain(y)?;
                (constant_bits((-c - i128::from(lo)) as u128), self.bits(y)?)
            }
            (Some(x), Some(y)) => {
                // X + x.lo - Y - y.lo ≤ c, i.e. X ≤ Y + k
                let ((x_lo, _), (y_lo, _)) = (self.variable_manager.domain(x)?, self.variable_manager.domain(y)?);
                let k = c + i128::from(y_lo) - i128::from(x_lo);
                let (xs, ys) = (self.bits(x)?, self.bits(y)?);
                if k >= 0 {
                    let shifted = self.add(&ys, &constant_bits(k as u128), out);
                    (xs, shifted)
                } else {
                    let shifted = self.add(&xs, &constant_bits(k.unsigned_abs()), out);
                    (shifted, ys)
                }
            }
            (None, None) => return Ok(Literal::from_bool(0 <= c)),
        };
        Ok(self.less_equal(&lhs, &rhs, out))
    }

    /// Truth of `x - y ≤ c` when the domains alone settle it
    fn decided(&self, x: Option<IntVar>, y: Option<IntVar>, c: i128) -> Result<Option<bool>, SolverError> {
        let range = |var: Option<IntVar>| -> Result<(i128, i128), SolverError> {
            match var {
                Some(var) => {
                    let (lo, hi) = self.variable_manager.domain(var)?;
                    Ok((i128::from(lo), i128::from(hi)))
                }
                None => Ok((0, 0)),
            }
        };
        let ((x_lo, x_hi), (y_lo, y_hi)) = (range(x)?, range(y)?);
        Ok(if x_hi - y_lo <= c {
            Some(true)
        } else if x_lo - y_hi > c {
            Some(false)
        } else {
            None
        })
    }

    /// Bit literals of `var - lo`
    fn bits(&mut self, var: IntVar) -> Result<Bits, SolverError> {
        let width = self.variable_manager.bit_width(var)?;
        let mut bits = Vec::with_capacity(width);
        for index in 0..width {
            let literal = self.variable_manager.get_variable(VariableType::Bit { var, index })?;
            bits.push(Literal::Var(literal));
        }
        Ok(bits)
    }

    /// `prefix ∨ bits ≤ bound`: wherever `bound` has a zero, that bit is off
    /// unless some higher one-bit of `bound` is off in `bits`
    fn push_at_most(&self, bits: &[Literal], bound: u128, prefix: &[i32], out: &mut Vec<Clause>) {
        if bits.len() < 128 && bound >> bits.len() != 0 {
            return;
        }
        for index in (0..bits.len()).filter(|&index| !bit_of(bound, index)) {
            let mut literals = vec![bits[index].negate()];
            literals.extend(
                (index + 1..bits.len())
                    .filter(|&higher| bit_of(bound, higher))
                    .map(|higher| bits[higher].negate()),
            );
            self.push_clause(prefix, &literals, out);
        }
    }

    /// `prefix ∨ bits ≥ bound`, as `!bits ≤ !bound` over the same width
    fn push_at_least(&self, bits: &[Literal], bound: u128, prefix: &[i32], out: &mut Vec<Clause>) {
        if bits.len() < 128 && bound >> bits.len() != 0 {
            self.push_clause(prefix, &[], out);
            return;
        }
        let flipped: Bits = bits.iter().map(|bit| bit.negate()).collect();
        let complement = (0..bits.len())
            .filter(|&index| !bit_of(bound, index))
            .fold(0u128, |acc, index| acc | 1 << index);
        self.push_at_most(&flipped, complement, prefix, out);
    }

    /// Literal implying `lhs ≤ rhs`, compared from the least significant bit up
    fn less_equal(&mut self, lhs: &[Literal], rhs: &[Literal], out: &mut Vec<Clause>) -> Literal {
        // lower: the bits below `index` of lhs are at most those of rhs
        let mut lower = Literal::True;
        for index in 0..lhs.len().max(rhs.len()) {
            let (a, b) = (digit(lhs, index), digit(rhs, index));
            if let (Some(a), Some(b), Some(l)) = (a.constant(), b.constant(), lower.constant()) {
                lower = Literal::from_bool((!a || b) && (b || l) && (!a || l));
                continue;
            }

            let rows = [[a.negate(), b], [b, lower], [a.negate(), lower]];
            let holds = Literal::Var(self.variable_manager.fresh_auxiliary());
            for row in rows {
                self.push_clause(&[], &[holds.negate(), row[0], row[1]], out);
            }
            lower = holds;
        }
        lower
    }

    /// Ripple-carry sum, one bit wider than the wider operand
    fn add(&mut self, lhs: &[Literal], rhs: &[Literal], out: &mut Vec<Clause>) -> Bits {
        let width = lhs.len().max(rhs.len());
        let mut sum = Vec::with_capacity(width + 1);
        let mut carry = Literal::False;
        for index in 0..width {
            let (bit, next) = self.full_adder(digit(lhs, index), digit(rhs, index), carry, out);
            sum.push(bit);
            carry = next;
        }
        sum.push(carry);
        sum
    }

    /// Sum and carry of three bits, folding constant inputs
    fn full_adder(&mut self, a: Literal, b: Literal, c: Literal, out: &mut Vec<Clause>) -> (Literal, Literal) {
        let inputs = [a, b, c];
        let ones = inputs.iter().filter(|&&input| input == Literal::True).count();
        let free: Vec<Literal> = inputs
            .into_iter()
            .filter(|input| matches!(input, Literal::Var(_)))
            .collect();

        match (free.as_slice(), ones) {
            ([], ones) => (Literal::from_bool(ones % 2 == 1), Literal::from_bool(ones >= 2)),
            (&[v], 0) => (v, Literal::False),
            (&[v], 1) => (v.negate(), v),
            (&[v], _) => (v, Literal::True),
            (&[u, v], 0) => (
                self.define(&[u, v], |row| row[0] != row[1], out),
                self.define(&[u, v], |row| row[0] && row[1], out),
            ),
            (&[u, v], _) => (
                self.define(&[u, v], |row| row[0] == row[1], out),
                self.define(&[u, v], |row| row[0] || row[1], out),
            ),
            _ => (
                self.define(&inputs, |row| row.iter().filter(|&&on| on).count() % 2 == 1, out),
                self.define(&inputs, |row| row.iter().filter(|&&on| on).count() >= 2, out),
            ),
        }
    }

    /// Fresh literal equivalent to `function(inputs)`, one clause per input row
    fn define(&mut self, inputs: &[Literal], function: impl Fn(&[bool]) -> bool, out: &mut Vec<Clause>) -> Literal {
        let output = Literal::Var(self.variable_manager.fresh_auxiliary());
        for mask in 0..1usize << inputs.len() {
            let row: Vec<bool> = (0..inputs.len()).map(|index| mask >> index & 1 == 1).collect();
            // inputs differ from this row, or the output takes the function's value
            let mut literals: Vec<Literal> = inputs
                .iter()
                .zip(&row)
                .map(|(&input, &on)| if on { input.negate() } else { input })
                .collect();
            literals.push(if function(&row) { output } else { output.negate() });
            self.push_clause(&[], &literals, out);
        }
        output
    }

    fn push_clause(&self, prefix: &[i32], literals: &[Literal], out: &mut Vec<Clause>) {
        let mut clause = prefix.to_vec();
        for literal in literals {
            match literal {
                Literal::True => return,
                Literal::False => {}
                Literal::Var(lit) => clause.push(*lit),
            }
        }
        if clause.is_empty() {
            clause.push(-self.true_literal);
        }
        out.push(Clause::new(clause));
    }
}

impl Default for ConstraintGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Statistics about constraint generation
#[derive(Debug, Clone)]
pub struct ConstraintStatistics {
    pub total_variables: usize,
    pub total_clauses: usize,
    pub symbols: usize,
}

impl std::fmt::Display for ConstraintStatistics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Constraint Generation Statistics:")?;
        writeln!(f, "  Total variables: {}", self.total_variables)?;
        writeln!(f, "  Total clauses: {}", self.total_clauses)?;
        writeln!(f, "  Symbols: {}", self.symbols)?;
        Ok(())
    }
}
