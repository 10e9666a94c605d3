use std::collections::HashMap;
use std::time::Duration;

use num::rational::BigRational;
use num::BigInt;
use thiserror::Error;
use z3::SatResult as Z3SatResult;

use crate::smt::solver::{Model, ModelValue, SatResult, SmtSolver, SolverBackend};
use crate::smt::sorts::SmtSort;
use crate::smt::terms::SmtTerm;

#[derive(Debug, Error)]
pub enum Z3Error {
    #[error("Z3 error: {0}")]
    Internal(String),
    #[error("Unknown variable: {0}")]
    UnknownVariable(String),
    #[error("Sort mismatch: {0}")]
    SortMismatch(String),
}

pub struct Z3Solver {
    solver: z3::Solver,
    int_vars: HashMap<String, z3::ast::Int>,
    real_vars: HashMap<String, z3::ast::Real>,
    bool_vars: HashMap<String, z3::ast::Bool>,
    _params: Option<z3::Params>,
}

impl Z3Solver {
    pub fn new() -> Self {
        Self {
            solver: z3::Solver::new(),
            int_vars: HashMap::new(),
            real_vars: HashMap::new(),
            bool_vars: HashMap::new(),
            _params: None,
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        let timeout_ms = u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX);
        if timeout_ms == 0 {
            return Self::new();
        }
        let solver = z3::Solver::new();
        let mut params = z3::Params::new();
        params.set_u32("timeout", timeout_ms);
        solver.set_params(&params);
        Self {
            solver,
            int_vars: HashMap::new(),
            real_vars: HashMap::new(),
            bool_vars: HashMap::new(),
            _params: Some(params),
        }
    }

    fn real_lit(r: &BigRational) -> Result<z3::ast::Real, Z3Error> {
        z3::ast::Real::from_real_str(&r.numer().to_string(), &r.denom().to_string())
            .ok_or_else(|| Z3Error::Internal(format!("cannot encode rational {r}")))
    }

    fn translate_term(&self, term: &SmtTerm) -> Result<Z3Term, Z3Error> {
        match term {
            SmtTerm::Var(name) => {
                if let Some(v) = self.int_vars.get(name) {
                    Ok(Z3Term::Int(v.clone()))
                } else if let Some(v) = self.real_vars.get(name) {
                    Ok(Z3Term::Real(v.clone()))
                } else if let Some(v) = self.bool_vars.get(name) {
                    Ok(Z3Term::Bool(v.clone()))
                } else {
                    Err(Z3Error::UnknownVariable(name.clone()))
                }
            }
            SmtTerm::IntLit(n) => Ok(Z3Term::Int(z3::ast::Int::from_i64(*n))),
            SmtTerm::RealLit(r) => Ok(Z3Term::Real(Self::real_lit(r)?)),
            SmtTerm::BoolLit(b) => Ok(Z3Term::Bool(z3::ast::Bool::from_bool(*b))),
            SmtTerm::ToReal(inner) => {
                let i = self.translate_term(inner)?.into_int()?;
                Ok(Z3Term::Real(z3::ast::Real::from_int(&i)))
            }
            SmtTerm::Add(terms) => self.fold_arith(terms, |l, r| l.add(r)),
            SmtTerm::Mul(terms) => self.fold_arith(terms, |l, r| l.mul(r)),
            SmtTerm::Eq(lhs, rhs) => {
                let l = self.translate_term(lhs)?;
                let r = self.translate_term(rhs)?;
                match (l, r) {
                    (Z3Term::Int(li), Z3Term::Int(ri)) => Ok(Z3Term::Bool(li.eq(&ri))),
                    (Z3Term::Real(lr), Z3Term::Real(rr)) => Ok(Z3Term::Bool(lr.eq(&rr))),
                    (Z3Term::Bool(lb), Z3Term::Bool(rb)) => Ok(Z3Term::Bool(lb.eq(&rb))),
                    _ => Err(Z3Error::SortMismatch("Eq".into())),
                }
            }
            SmtTerm::Lt(lhs, rhs) => self.compare(lhs, rhs, Cmp::Lt),
            SmtTerm::Le(lhs, rhs) => self.compare(lhs, rhs, Cmp::Le),
            SmtTerm::Gt(lhs, rhs) => self.compare(lhs, rhs, Cmp::Gt),
            SmtTerm::Ge(lhs, rhs) => self.compare(lhs, rhs, Cmp::Ge),
            SmtTerm::And(terms) => {
                let bools = self.translate_bools(terms)?;
                let refs: Vec<&z3::ast::Bool> = bools.iter().collect();
                Ok(Z3Term::Bool(z3::ast::Bool::and(&refs)))
            }
            SmtTerm::Or(terms) => {
                let bools = self.translate_bools(terms)?;
                let refs: Vec<&z3::ast::Bool> = bools.iter().collect();
                Ok(Z3Term::Bool(z3::ast::Bool::or(&refs)))
            }
            SmtTerm::Not(inner) => {
                let b = self.translate_term(inner)?.into_bool()?;
                Ok(Z3Term::Bool(b.not()))
            }
            SmtTerm::Implies(lhs, rhs) => {
                let l = self.translate_term(lhs)?.into_bool()?;
                let r = self.translate_term(rhs)?.into_bool()?;
                Ok(Z3Term::Bool(l.implies(&r)))
            }
            SmtTerm::Ite(cond, then, els) => {
                let c = self.translate_term(cond)?.into_bool()?;
                let t = self.translate_term(then)?;
                let e = self.translate_term(els)?;
                match (t, e) {
                    (Z3Term::Int(ti), Z3Term::Int(ei)) => Ok(Z3Term::Int(c.ite(&ti, &ei))),
                    (Z3Term::Real(tr), Z3Term::Real(er)) => Ok(Z3Term::Real(c.ite(&tr, &er))),
                    (Z3Term::Bool(tb), Z3Term::Bool(eb)) => Ok(Z3Term::Bool(c.ite(&tb, &eb))),
                    _ => Err(Z3Error::SortMismatch("ITE".into())),
                }
            }
        }
    }

    fn translate_bools(&self, terms: &[SmtTerm]) -> Result<Vec<z3::ast::Bool>, Z3Error> {
        terms
            .iter()
            .map(|t| self.translate_term(t).and_then(|z| z.into_bool()))
            .collect()
    }

    fn fold_arith(
        &self,
        terms: &[SmtTerm],
        op: fn(Arith, Arith) -> Result<Arith, Z3Error>,
    ) -> Result<Z3Term, Z3Error> {
        let mut acc: Option<Arith> = None;
        for t in terms {
            let next = self.translate_term(t)?.into_arith()?;
            acc = Some(match acc {
                None => next,
                Some(prev) => op(prev, next)?,
            });
        }
        acc.map(Arith::into_term)
            .ok_or_else(|| Z3Error::Internal("empty arithmetic node".into()))
    }

    fn compare(&self, lhs: &SmtTerm, rhs: &SmtTerm, cmp: Cmp) -> Result<Z3Term, Z3Error> {
        let l = self.translate_term(lhs)?.into_arith()?;
        let r = self.translate_term(rhs)?.into_arith()?;
        let b = match (l, r) {
            (Arith::Int(l), Arith::Int(r)) => match cmp {
                Cmp::Lt => l.lt(&r),
                Cmp::Le => l.le(&r),
                Cmp::Gt => l.gt(&r),
                Cmp::Ge => l.ge(&r),
            },
            (Arith::Real(l), Arith::Real(r)) => match cmp {
                Cmp::Lt => l.lt(&r),
                Cmp::Le => l.le(&r),
                Cmp::Gt => l.gt(&r),
                Cmp::Ge => l.ge(&r),
            },
            _ => return Err(Z3Error::SortMismatch("comparison over Int and Real".into())),
        };
        Ok(Z3Term::Bool(b))
    }
}

enum Cmp {
    Lt,
    Le,
    Gt,
    Ge,
}

enum Arith {
    Int(z3::ast::Int),
    Real(z3::ast::Real),
}

impl Arith {
    fn add(self, other: Arith) -> Result<Arith, Z3Error> {
        match (self, other) {
            (Arith::Int(l), Arith::Int(r)) => Ok(Arith::Int(&l + &r)),
            (Arith::Real(l), Arith::Real(r)) => Ok(Arith::Real(&l + &r)),
            _ => Err(Z3Error::SortMismatch("Add over Int and Real".into())),
        }
    }

    fn mul(self, other: Arith) -> Result<Arith, Z3Error> {
        match (self, other) {
            (Arith::Int(l), Arith::Int(r)) => Ok(Arith::Int(&l * &r)),
            (Arith::Real(l), Arith::Real(r)) => Ok(Arith::Real(&l * &r)),
            _ => Err(Z3Error::SortMismatch("Mul over Int and Real".into())),
        }
    }

    fn into_term(self) -> Z3Term {
        match self {
            Arith::Int(i) => Z3Term::Int(i),
            Arith::Real(r) => Z3Term::Real(r),
        }
    }
}

enum Z3Term {
    Int(z3::ast::Int),
    Real(z3::ast::Real),
    Bool(z3::ast::Bool),
}

impl Z3Term {
    fn into_int(self) -> Result<z3::ast::Int, Z3Error> {
        match self {
            Z3Term::Int(i) => Ok(i),
            _ => Err(Z3Error::SortMismatch("expected Int".into())),
        }
    }

    fn into_bool(self) -> Result<z3::ast::Bool, Z3Error> {
        match self {
            Z3Term::Bool(b) => Ok(b),
            _ => Err(Z3Error::SortMismatch("expected Bool".into())),
        }
    }

    fn into_arith(self) -> Result<Arith, Z3Error> {
        match self {
            Z3Term::Int(i) => Ok(Arith::Int(i)),
            Z3Term::Real(r) => Ok(Arith::Real(r)),
            Z3Term::Bool(_) => Err(Z3Error::SortMismatch("expected number, got Bool".into())),
        }
    }
}

impl Default for Z3Solver {
    fn default() -> Self {
        Self::new()
    }
}

impl SmtSolver for Z3Solver {
    type Error = Z3Error;

    fn declare_var(&mut self, name: &str, sort: &SmtSort) -> Result<(), Z3Error> {
        match sort {
            SmtSort::Int => {
                self.int_vars
                    .insert(name.to_string(), z3::ast::Int::new_const(name));
            }
            SmtSort::Real => {
                self.real_vars
                    .insert(name.to_string(), z3::ast::Real::new_const(name));
            }
            SmtSort::Bool => {
                self.bool_vars
                    .insert(name.to_string(), z3::ast::Bool::new_const(name));
            }
        }
        Ok(())
    }

    fn assert(&mut self, term: &SmtTerm) -> Result<(), Z3Error> {
        let z3_term = self.translate_term(term)?.into_bool()?;
        self.solver.assert(&z3_term);
        Ok(())
    }

    fn check_sat(&mut self) -> Result<SatResult, Z3Error> {
        match self.solver.check() {
            Z3SatResult::Sat => Ok(SatResult::Sat),
            Z3SatResult::Unsat => Ok(SatResult::Unsat),
            Z3SatResult::Unknown => Ok(SatResult::Unknown(
                self.solver
                    .get_reason_unknown()
                    .unwrap_or_else(|| "Z3 returned unknown".into()),
            )),
        }
    }

    fn check_sat_with_model(
        &mut self,
        var_names: &[(&str, &SmtSort)],
    ) -> Result<(SatResult, Option<Model>), Z3Error> {
        let result = self.check_sat()?;
        if result != SatResult::Sat {
            return Ok((result, None));
        }
        let z3_model = self
            .solver
            .get_model()
            .ok_or_else(|| Z3Error::Internal("SAT but no model available".into()))?;
        let mut values = HashMap::new();

        for &(name, sort) in var_names {
            match sort {
                SmtSort::Int => {
                    if let Some(v) = self.int_vars.get(name) {
                        if let Some(n) = z3_model.eval(v, true).and_then(|val| val.as_i64()) {
                            values.insert(name.to_string(), ModelValue::Int(n));
                        }
                    }
                }
                SmtSort::Real => {
                    if let Some(v) = self.real_vars.get(name) {
                        if let Some((n, d)) = z3_model.eval(v, true).and_then(|val| val.as_real()) {
                            let r = BigRational::new(BigInt::from(n), BigInt::from(d));
                            values.insert(name.to_string(), ModelValue::Real(r));
                        }
                    }
                }
                SmtSort::Bool => {
                    if let Some(v) = self.bool_vars.get(name) {
                        if let Some(b) = z3_model.eval(v, true).and_then(|val| val.as_bool()) {
                            values.insert(name.to_string(), ModelValue::Bool(b));
                        }
                    }
                }
            }
        }

        Ok((SatResult::Sat, Some(Model { values })))
    }
}

/// Backend handing out [`Z3Solver`] sessions.
#[derive(Debug, Clone, Copy, Default)]
pub struct Z3Backend;

impl SolverBackend for Z3Backend {
    type Solver = Z3Solver;

    fn create(&self, timeout: Option<Duration>) -> Z3Solver {
        match timeout {
            Some(t) => Z3Solver::with_timeout(t),
            None => Z3Solver::new(),
        }
    }

    fn version(&self) -> String {
        z3::full_version().to_string()
    }
}
