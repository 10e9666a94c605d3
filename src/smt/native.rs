//! Built-in decision procedure for ground quantifier-free formulas.
//!
//! Equalities of the form `var == ground-term` are propagated to a fixpoint;
//! any boolean variables left unbound are enumerated (up to
//! [`MAX_ENUMERATED_BOOLS`]) and every assertion is evaluated with exact
//! rational arithmetic. An unbound numeric variable leaves the problem
//! outside the fragment and the check answers `Unknown`.

use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

use num::rational::BigRational;
use num::BigInt;
use thiserror::Error;

use crate::smt::solver::{Model, ModelValue, SatResult, SmtSolver, SolverBackend};
use crate::smt::sorts::SmtSort;
use crate::smt::terms::SmtTerm;
use crate::smt::rational_to_i64;

/// Upper bound on unbound boolean variables searched exhaustively.
pub const MAX_ENUMERATED_BOOLS: usize = 16;

#[derive(Debug, Error, PartialEq)]
pub enum NativeError {
    #[error("Unknown variable: {0}")]
    UnknownVariable(String),
    #[error("Sort mismatch: {0}")]
    SortMismatch(String),
    #[error("Variable {0} declared twice with different sorts")]
    Redeclared(String),
}

#[derive(Debug, Clone, PartialEq)]
enum Value {
    Bool(bool),
    Num(BigRational),
}

impl Value {
    fn into_bool(self) -> Result<bool, NativeError> {
        match self {
            Value::Bool(b) => Ok(b),
            Value::Num(_) => Err(NativeError::SortMismatch("expected Bool, got number".into())),
        }
    }

    fn into_num(self) -> Result<BigRational, NativeError> {
        match self {
            Value::Num(n) => Ok(n),
            Value::Bool(_) => Err(NativeError::SortMismatch("expected number, got Bool".into())),
        }
    }
}

enum EvalError {
    Unbound,
    Failed(NativeError),
}

impl From<NativeError> for EvalError {
    fn from(e: NativeError) -> Self {
        EvalError::Failed(e)
    }
}

type Assignment = HashMap<String, Value>;

/// Solver session over the native decision procedure.
#[derive(Debug, Clone, Default)]
pub struct NativeSolver {
    sorts: BTreeMap<String, SmtSort>,
    assertions: Vec<SmtTerm>,
    timeout: Option<Duration>,
    last_model: Option<Assignment>,
}

impl NativeSolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            ..Self::default()
        }
    }

    fn eval(&self, term: &SmtTerm, env: &Assignment) -> Result<Value, EvalError> {
        match term {
            SmtTerm::Var(name) => {
                if !self.sorts.contains_key(name) {
                    return Err(NativeError::UnknownVariable(name.clone()).into());
                }
                env.get(name).cloned().ok_or(EvalError::Unbound)
            }
            SmtTerm::IntLit(n) => Ok(Value::Num(BigRational::from_integer(BigInt::from(*n)))),
            SmtTerm::RealLit(r) => Ok(Value::Num(r.clone())),
            SmtTerm::BoolLit(b) => Ok(Value::Bool(*b)),
            SmtTerm::Add(terms) => {
                let mut acc = BigRational::from_integer(BigInt::from(0));
                for t in terms {
                    acc += self.eval(t, env)?.into_num()?;
                }
                Ok(Value::Num(acc))
            }
            SmtTerm::Mul(terms) => {
                let mut acc = BigRational::from_integer(BigInt::from(1));
                for t in terms {
                    acc *= self.eval(t, env)?.into_num()?;
                }
                Ok(Value::Num(acc))
            }
            SmtTerm::ToReal(inner) => Ok(Value::Num(self.eval(inner, env)?.into_num()?)),
            SmtTerm::Eq(l, r) => {
                let (l, r) = (self.eval(l, env)?, self.eval(r, env)?);
                match (l, r) {
                    (Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(a == b)),
                    (Value::Num(a), Value::Num(b)) => Ok(Value::Bool(a == b)),
                    _ => Err(NativeError::SortMismatch("Eq over Bool and number".into()).into()),
                }
            }
            SmtTerm::Lt(l, r) => self.compare(l, r, env, |a, b| a < b),
            SmtTerm::Le(l, r) => self.compare(l, r, env, |a, b| a <= b),
            SmtTerm::Gt(l, r) => self.compare(l, r, env, |a, b| a > b),
            SmtTerm::Ge(l, r) => self.compare(l, r, env, |a, b| a >= b),
            SmtTerm::And(terms) => {
                let mut all = true;
                for t in terms {
                    all &= self.eval(t, env)?.into_bool()?;
                }
                Ok(Value::Bool(all))
            }
            SmtTerm::Or(terms) => {
                let mut any = false;
                for t in terms {
                    any |= self.eval(t, env)?.into_bool()?;
                }
                Ok(Value::Bool(any))
            }
            SmtTerm::Not(inner) => Ok(Value::Bool(!self.eval(inner, env)?.into_bool()?)),
            SmtTerm::Implies(l, r) => {
                let antecedent = self.eval(l, env)?.into_bool()?;
                let consequent = self.eval(r, env)?.into_bool()?;
                Ok(Value::Bool(!antecedent || consequent))
            }
            SmtTerm::Ite(c, t, e) => {
                if self.eval(c, env)?.into_bool()? {
                    self.eval(t, env)
                } else {
                    self.eval(e, env)
                }
            }
        }
    }

    fn compare(
        &self,
        l: &SmtTerm,
        r: &SmtTerm,
        env: &Assignment,
        op: fn(&BigRational, &BigRational) -> bool,
    ) -> Result<Value, EvalError> {
        let l = self.eval(l, env)?.into_num()?;
        let r = self.eval(r, env)?.into_num()?;
        Ok(Value::Bool(op(&l, &r)))
    }

    /// Try to read `term` as a binding `var := value`.
    fn binding_of(&self, term: &SmtTerm, env: &Assignment) -> Result<Option<(String, Value)>, NativeError> {
        let (name, value) = match term {
            SmtTerm::Var(name) => (name, Value::Bool(true)),
            SmtTerm::Not(inner) => match inner.as_ref() {
                SmtTerm::Var(name) => (name, Value::Bool(false)),
                _ => return Ok(None),
            },
            SmtTerm::Eq(l, r) => {
                let (name, other) = match (l.as_ref(), r.as_ref()) {
                    (SmtTerm::Var(name), other) if !env.contains_key(name) => (name, other),
                    (other, SmtTerm::Var(name)) if !env.contains_key(name) => (name, other),
                    _ => return Ok(None),
                };
                match self.eval(other, env) {
                    Ok(value) => (name, value),
                    Err(EvalError::Unbound) => return Ok(None),
                    Err(EvalError::Failed(e)) => return Err(e),
                }
            }
            _ => return Ok(None),
        };
        if env.contains_key(name) {
            return Ok(None);
        }
        Ok(Some((name.clone(), value)))
    }

    /// Propagate equalities; `None` means a binding contradicts its sort.
    fn propagate(&self) -> Result<Option<Assignment>, NativeError> {
        let mut env = Assignment::new();
        loop {
            let mut changed = false;
            for assertion in &self.assertions {
                if let Some((name, value)) = self.binding_of(assertion, &env)? {
                    let sort = self
                        .sorts
                        .get(&name)
                        .ok_or_else(|| NativeError::UnknownVariable(name.clone()))?;
                    let fits = match (&value, sort) {
                        (Value::Bool(_), SmtSort::Bool) => true,
                        (Value::Num(n), SmtSort::Int) => {
                            if !n.is_integer() {
                                return Ok(None);
                            }
                            true
                        }
                        (Value::Num(_), SmtSort::Real) => true,
                        _ => false,
                    };
                    if !fits {
                        return Err(NativeError::SortMismatch(format!(
                            "value bound to {name} does not match sort {sort}"
                        )));
                    }
                    env.insert(name, value);
                    changed = true;
                }
            }
            if !changed {
                return Ok(Some(env));
            }
        }
    }

    fn holds(&self, env: &Assignment) -> Result<Option<bool>, NativeError> {
        for assertion in &self.assertions {
            match self.eval(assertion, env) {
                Ok(value) => {
                    if !value.into_bool()? {
                        return Ok(Some(false));
                    }
                }
                Err(EvalError::Unbound) => return Ok(None),
                Err(EvalError::Failed(e)) => return Err(e),
            }
        }
        Ok(Some(true))
    }

    fn solve(&mut self) -> Result<SatResult, NativeError> {
        self.last_model = None;
        let deadline = self.timeout.map(|t| Instant::now() + t);
        let Some(mut env) = self.propagate()? else {
            return Ok(SatResult::Unsat);
        };

        let unbound: Vec<(String, SmtSort)> = self
            .sorts
            .iter()
            .filter(|(name, _)| !env.contains_key(*name))
            .map(|(name, sort)| (name.clone(), *sort))
            .collect();
        if let Some((name, _)) = unbound.iter().find(|(_, sort)| sort.is_numeric()) {
            return Ok(SatResult::Unknown(format!(
                "incomplete: numeric variable '{name}' is not bound to a ground value"
            )));
        }
        if unbound.len() > MAX_ENUMERATED_BOOLS {
            return Ok(SatResult::Unknown(format!(
                "incomplete: {} unbound boolean variables exceed the search limit of {}",
                unbound.len(),
                MAX_ENUMERATED_BOOLS
            )));
        }

        for bits in 0u64..(1u64 << unbound.len()) {
            if deadline.is_some_and(|d| Instant::now() >= d) {
                return Ok(SatResult::Unknown("timeout".to_string()));
            }
            for (i, (name, _)) in unbound.iter().enumerate() {
                env.insert(name.clone(), Value::Bool(bits & (1 << i) != 0));
            }
            match self.holds(&env)? {
                Some(true) => {
                    self.last_model = Some(env);
                    return Ok(SatResult::Sat);
                }
                Some(false) => continue,
                None => return Ok(SatResult::Unknown("incomplete: unbound variable".into())),
            }
        }
        Ok(SatResult::Unsat)
    }
}

impl SmtSolver for NativeSolver {
    type Error = NativeError;

    fn declare_var(&mut self, name: &str, sort: &SmtSort) -> Result<(), NativeError> {
        match self.sorts.get(name) {
            Some(existing) if existing != sort => Err(NativeError::Redeclared(name.to_string())),
            _ => {
                self.sorts.insert(name.to_string(), *sort);
                Ok(())
            }
        }
    }

    fn assert(&mut self, term: &SmtTerm) -> Result<(), NativeError> {
        for name in term.free_vars() {
            if !self.sorts.contains_key(&name) {
                return Err(NativeError::UnknownVariable(name));
            }
        }
        self.assertions.push(term.clone());
        Ok(())
    }

    fn check_sat(&mut self) -> Result<SatResult, NativeError> {
        self.solve()
    }

    fn check_sat_with_model(
        &mut self,
        var_names: &[(&str, &SmtSort)],
    ) -> Result<(SatResult, Option<Model>), NativeError> {
        let result = self.solve()?;
        if result != SatResult::Sat {
            return Ok((result, None));
        }
        let Some(env) = &self.last_model else {
            return Ok((SatResult::Unknown("SAT but no model available".into()), None));
        };
        let mut values = HashMap::new();
        for &(name, sort) in var_names {
            let Some(value) = env.get(name) else {
                continue;
            };
            let projected = match (value, sort) {
                (Value::Bool(b), SmtSort::Bool) => ModelValue::Bool(*b),
                (Value::Num(n), SmtSort::Int) => match rational_to_i64(n) {
                    Some(i) => ModelValue::Int(i),
                    None => continue,
                },
                (Value::Num(n), SmtSort::Real) => ModelValue::Real(n.clone()),
                _ => {
                    return Err(NativeError::SortMismatch(format!(
                        "model value for {name} does not match sort {sort}"
                    )))
                }
            };
            values.insert(name.to_string(), projected);
        }
        Ok((SatResult::Sat, Some(Model { values })))
    }
}

/// Backend handing out [`NativeSolver`] sessions.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeBackend;

impl SolverBackend for NativeBackend {
    type Solver = NativeSolver;

    fn create(&self, timeout: Option<Duration>) -> NativeSolver {
        match timeout {
            Some(t) => NativeSolver::with_timeout(t),
            None => NativeSolver::new(),
        }
    }

    fn version(&self) -> String {
        format!("aare-native {}", env!("CARGO_PKG_VERSION"))
    }
}
