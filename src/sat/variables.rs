//! Variable management for the SAT encoding

use super::terms::{BoolVar, IntVar, TagId};
use crate::error::SolverError;
use std::collections::HashMap;

/// Kinds of SAT variables used by the encoding
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VariableType {
    /// Forced true by a unit clause
    Constant,
    /// Declared boolean
    Bool(BoolVar),
    /// Bit `index` of `var - lo`, least significant first
    Bit { var: IntVar, index: usize },
    /// Guards the clauses of one tagged assertion
    Activation(TagId),
    /// Tseitin and partial-sum definitions
    Auxiliary(usize),
}

/// Maps variable types to DIMACS ids
#[derive(Debug)]
pub struct VariableManager {
    /// Map from variable type to SAT variable ID (positive integer)
    variable_map: HashMap<VariableType, i32>,
    next_id: i32,
    bool_count: usize,
    /// Inclusive domain of every declared integer
    domains: Vec<(i64, i64)>,
    auxiliary_count: usize,
}

impl VariableManager {
    pub fn new() -> Self {
        Self {
            variable_map: HashMap::new(),
            next_id: 1, // SAT variables start from 1
            bool_count: 0,
            domains: Vec::new(),
            auxiliary_count: 0,
        }
    }

    /// Reserve a new boolean handle
    pub fn declare_bool(&mut self) -> BoolVar {
        self.bool_count += 1;
        BoolVar(self.bool_count - 1)
    }

    /// Reserve a new integer handle over `[lo, hi]`
    pub fn declare_int(&mut self, lo: i64, hi: i64) -> IntVar {
        self.domains.push((lo, hi));
        IntVar(self.domains.len() - 1)
    }

    pub fn bool_count(&self) -> usize {
        self.bool_count
    }

    pub fn int_count(&self) -> usize {
        self.domains.len()
    }

    /// Domain of a declared integer
    pub fn domain(&self, var: IntVar) -> Result<(i64, i64), SolverError> {
        self.domains
            .get(var.0)
            .copied()
            .ok_or(SolverError::UnknownVariable { kind: "int", index: var.0 })
    }

    /// Number of bits holding `var - lo`
    pub fn bit_width(&self, var: IntVar) -> Result<usize, SolverError> {
        let (lo, hi) = self.domain(var)?;
        Ok(bits_for(domain_width(lo, hi)))
    }

    /// Get or create a variable ID for the given variable type
    pub fn get_variable(&mut self, var_type: VariableType) -> Result<i32, SolverError> {
        if let Some(&id) = self.variable_map.get(&var_type) {
            return Ok(id);
        }

        self.validate_variable(&var_type)?;

        let id = self.next_id;
        self.next_id += 1;
        self.variable_map.insert(var_type, id);
        Ok(id)
    }

    /// Look a variable up without creating it
    pub fn lookup(&self, var_type: &VariableType) -> Option<i32> {
        self.variable_map.get(var_type).copied()
    }

    pub fn bool_variable(&mut self, var: BoolVar) -> Result<i32, SolverError> {
        self.get_variable(VariableType::Bool(var))
    }

    pub fn activation_variable(&mut self, tag: TagId) -> Result<i32, SolverError> {
        self.get_variable(VariableType::Activation(tag))
    }

    /// The variable pinned to true
    pub fn constant_variable(&mut self) -> i32 {
        if let Some(&id) = self.variable_map.get(&VariableType::Constant) {
            return id;
        }
        let id = self.next_id;
        self.next_id += 1;
        self.variable_map.insert(VariableType::Constant, id);
        id
    }

    /// A fresh definition variable, never shared
    pub fn fresh_auxiliary(&mut self) -> i32 {
        let id = self.next_id;
        self.next_id += 1;
        self.variable_map.insert(VariableType::Auxiliary(self.auxiliary_count), id);
        self.auxiliary_count += 1;
        id
    }

    /// Get the total number of variables created
    pub fn variable_count(&self) -> usize {
        (self.next_id - 1) as usize
    }

    fn validate_variable(&self, var_type: &VariableType) -> Result<(), SolverError> {
        match var_type {
            VariableType::Bool(var) if var.0 >= self.bool_count => {
                Err(SolverError::UnknownVariable { kind: "bool", index: var.0 })
            }
            VariableType::Bit { var, index } => {
                if *index >= self.bit_width(*var)? {
                    let (lo, hi) = self.domain(*var)?;
                    return Err(SolverError::EmptyDomain {
                        name: format!("int#{} bit {}", var.0, index),
                        lo,
                        hi,
                    });
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Get statistics about variable usage
    pub fn statistics(&self) -> VariableStatistics {
        let mut stats = VariableStatistics {
            total_variables: self.variable_count(),
            ..VariableStatistics::default()
        };

        for var_type in self.variable_map.keys() {
            match var_type {
                VariableType::Constant => {}
                VariableType::Bool(_) => stats.bool_variables += 1,
                VariableType::Bit { .. } => stats.bit_variables += 1,
                VariableType::Activation(_) => stats.activation_variables += 1,
                VariableType::Auxiliary(_) => stats.auxiliary_variables += 1,
            }
        }

        stats
    }
}

/// `hi - lo` without overflow
pub fn domain_width(lo: i64, hi: i64) -> u128 {
    (i128::from(hi) - i128::from(lo)).max(0) as u128
}

/// Bits needed to count from zero up to `value`
pub fn bits_for(value: u128) -> usize {
    (u128::BITS - value.leading_zeros()) as usize
}

impl Default for VariableManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Statistics about variable usage
#[derive(Debug, Clone, Default)]
pub struct VariableStatistics {
    pub total_variables: usize,
    pub bool_variables: usize,
    pub bit_variables: usize,
    pub activation_variables: usize,
    pub auxiliary_variables: usize,
}

impl std::fmt::Display for VariableStatistics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Variable Statistics:")?;
        writeln!(f, "  Total variables: {}", self.total_variables)?;
        writeln!(f, "  Boolean variables: {}", self.bool_variables)?;
        writeln!(f, "  Integer bits: {}", self.bit_variables)?;
        writeln!(f, "  Activation literals: {}", self.activation_variables)?;
        writeln!(f, "  Auxiliary variables: {}", self.auxiliary_variables)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variable_creation() {
        let mut vm = VariableManager::new();
        let a = vm.declare_bool();
        let b = vm.declare_bool();

        let var1 = vm.bool_variable(a).unwrap();
        let var2 = vm.bool_variable(b).unwrap();
        assert_eq!(var1, 1);
        assert_eq!(var2, 2);

        // Same handle, same ID
        assert_eq!(vm.bool_variable(a).unwrap(), var1);
        assert_eq!(vm.lookup(&VariableType::Bool(b)), Some(2));
    }

    #[test]
    fn test_variable_bounds() {
        let mut vm = VariableManager::new();
        let x = vm.declare_int(0, 3);
        assert_eq!(vm.bit_width(x).unwrap(), 2);

        assert!(vm.get_variable(VariableType::Bit { var: x, index: 0 }).is_ok());
        assert!(vm.get_variable(VariableType::Bit { var: x, index: 1 }).is_ok());

        // Beyond the width of the domain
        assert!(vm.get_variable(VariableType::Bit { var: x, index: 2 }).is_err());
        assert!(vm.bool_variable(BoolVar(5)).is_err());
        assert!(vm.domain(IntVar(1)).is_err());
    }

    #[test]
    fn test_bit_widths() {
        assert_eq!(bits_for(0), 0);
        assert_eq!(bits_for(1), 1);
        assert_eq!(bits_for(4), 3);
        assert_eq!(domain_width(-5, 10), 15);
        assert_eq!(bits_for(domain_width(i64::MIN, i64::MAX)), 64);

        let mut vm = VariableManager::new();
        let fixed = vm.declare_int(7, 7);
        let wide = vm.declare_int(0, 1_000_000);
        assert_eq!(vm.bit_width(fixed).unwrap(), 0);
        assert_eq!(vm.bit_width(wide).unwrap(), 20);
    }

    #[test]
    fn test_statistics() {
        let mut vm = VariableManager::new();
        let a = vm.declare_bool();
        let x = vm.declare_int(0, 2);

        assert_eq!(vm.constant_variable(), vm.constant_variable());
        vm.bool_variable(a).unwrap();
        vm.get_variable(VariableType::Bit { var: x, index: 0 }).unwrap();
        vm.get_variable(VariableType::Bit { var: x, index: 1 }).unwrap();
        vm.activation_variable(TagId(0)).unwrap();
        let aux1 = vm.fresh_auxiliary();
        let aux2 = vm.fresh_auxiliary();
        assert_ne!(aux1, aux2);

        let stats = vm.statistics();
        assert_eq!(stats.total_variables, 7);
        assert_eq!(stats.bool_variables, 1);
        assert_eq!(stats.bit_variables, 2);
        assert_eq!(stats.activation_variables, 1);
        assert_eq!(stats.auxiliary_variables, 2);
    }
}
