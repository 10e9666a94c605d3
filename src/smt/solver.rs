use std::collections::HashMap;
use std::time::Duration;

use num::rational::BigRational;

use crate::smt::sorts::SmtSort;
use crate::smt::terms::SmtTerm;

/// Result of a satisfiability check.
#[derive(Debug, Clone, PartialEq)]
pub enum SatResult {
    Sat,
    Unsat,
    Unknown(String),
}

/// A model (variable assignments) extracted from a SAT result.
#[derive(Debug, Clone, Default)]
pub struct Model {
    pub values: HashMap<String, ModelValue>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ModelValue {
    Int(i64),
    Real(BigRational),
    Bool(bool),
}

impl Model {
    pub fn get_int(&self, name: &str) -> Option<i64> {
        match self.values.get(name) {
            Some(ModelValue::Int(n)) => Some(*n),
            _ => None,
        }
    }

    pub fn get_real(&self, name: &str) -> Option<&BigRational> {
        match self.values.get(name) {
            Some(ModelValue::Real(r)) => Some(r),
            _ => None,
        }
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        match self.values.get(name) {
            Some(ModelValue::Bool(b)) => Some(*b),
            _ => None,
        }
    }
}

/// Abstract SMT solver interface.
pub trait SmtSolver {
    type Error: std::error::Error;

    /// Declare a new variable.
    fn declare_var(&mut self, name: &str, sort: &SmtSort) -> Result<(), Self::Error>;

    /// Assert a constraint.
    fn assert(&mut self, term: &SmtTerm) -> Result<(), Self::Error>;

    /// Check satisfiability.
    fn check_sat(&mut self) -> Result<SatResult, Self::Error>;

    /// Check satisfiability and extract a model if SAT.
    fn check_sat_with_model(
        &mut self,
        var_names: &[(&str, &SmtSort)],
    ) -> Result<(SatResult, Option<Model>), Self::Error>;
}

/// Factory for fresh, independent solver sessions.
pub trait SolverBackend {
    type Solver: SmtSolver;

    /// Create a solver with no declarations or assertions.
    fn create(&self, timeout: Option<Duration>) -> Self::Solver;

    /// Human-readable backend name and version for proof certificates.
    fn version(&self) -> String;
}
