//! Formula trees and their compilation to solver terms.
//!
//! A rule formula is written as nested single-key JSON objects:
//!
//! ```json
//! {"or": [{"<=": ["dti", 43]}, {">=": ["compensating_factors", 2]}]}
//! ```
//!
//! [`Formula::parse`] turns such a document into the closed [`Formula`] tree
//! and [`compile`] lowers it to an [`SmtTerm`] against a constraint's
//! [`SymbolTable`]. Compilation is pure: it touches no solver state.

use crate::error::{AareError, AareResult};
use crate::smt::{rational_from_decimal_str, SmtSort, SmtTerm};
use crate::symbols::SymbolTable;
use num::rational::BigRational;
use serde_json::Value;

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CmpOp {
    Le,
    Lt,
    Ge,
    Gt,
    Eq,
}

impl CmpOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Le => "<=",
            Self::Lt => "<",
            Self::Ge => ">=",
            Self::Gt => ">",
            Self::Eq => "==",
        }
    }
}

/// Arithmetic operators over an ordered operand list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArithOp {
    Add,
    Mul,
    Min,
    Max,
}

impl ArithOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Mul => "*",
            Self::Min => "min",
            Self::Max => "max",
        }
    }
}

/// Constant leaf of a formula.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Bool(bool),
    Int(i64),
    Real(BigRational),
}

/// Declarative rule expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Formula {
    Compare(CmpOp, Box<Formula>, Box<Formula>),
    And(Vec<Formula>),
    Or(Vec<Formula>),
    Not(Box<Formula>),
    Implies(Box<Formula>, Box<Formula>),
    Ite(Box<Formula>, Box<Formula>, Box<Formula>),
    Arith(ArithOp, Vec<Formula>),
    Lit(Literal),
    Var(String),
}

/// A compiled term together with its sort.
#[derive(Debug, Clone, PartialEq)]
pub struct Compiled {
    pub term: SmtTerm,
    pub sort: SmtSort,
}

impl Compiled {
    fn new(term: SmtTerm, sort: SmtSort) -> Self {
        Self { term, sort }
    }

    /// Term lifted to `target`; only Int to Real ever changes anything.
    fn coerce(self, target: SmtSort) -> SmtTerm {
        if self.sort == SmtSort::Int && target == SmtSort::Real {
            self.term.to_real()
        } else {
            self.term
        }
    }
}

fn malformed(operator: &str, message: impl Into<String>) -> AareError {
    AareError::MalformedFormula {
        operator: operator.to_string(),
        message: message.into(),
    }
}

fn mismatch(context: impl Into<String>, expected: &str, found: SmtSort) -> AareError {
    AareError::KindMismatch {
        context: context.into(),
        expected: expected.to_string(),
        found: found.to_string(),
    }
}

impl Formula {
    pub fn var(name: impl Into<String>) -> Self {
        Formula::Var(name.into())
    }

    pub fn int(n: i64) -> Self {
        Formula::Lit(Literal::Int(n))
    }

    pub fn bool(b: bool) -> Self {
        Formula::Lit(Literal::Bool(b))
    }

    pub fn compare(op: CmpOp, lhs: Formula, rhs: Formula) -> Self {
        Formula::Compare(op, Box::new(lhs), Box::new(rhs))
    }

    pub fn negate(inner: Formula) -> Self {
        Formula::Not(Box::new(inner))
    }

    pub fn implies(antecedent: Formula, consequent: Formula) -> Self {
        Formula::Implies(Box::new(antecedent), Box::new(consequent))
    }

    pub fn ite(cond: Formula, then: Formula, els: Formula) -> Self {
        Formula::Ite(Box::new(cond), Box::new(then), Box::new(els))
    }

    /// Parse a declarative formula document.
    pub fn parse(value: &Value) -> AareResult<Formula> {
        match value {
            Value::Object(map) => {
                let mut keys = map.keys();
                let (operator, args) = match (keys.next(), keys.next()) {
                    (None, _) => return Err(malformed("{}", "formula node has no operator")),
                    (Some(key), None) => (key.as_str(), &map[key]),
                    (Some(_), Some(_)) => {
                        let mut operators: Vec<String> = map.keys().cloned().collect();
                        operators.sort();
                        return Err(AareError::AmbiguousOperator { operators });
                    }
                };
                Self::parse_node(operator, args)
            }
            Value::Bool(b) => Ok(Formula::bool(*b)),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(Formula::int(i))
                } else {
                    rational_from_decimal_str(&n.to_string())
                        .map(|r| Formula::Lit(Literal::Real(r)))
                        .ok_or_else(|| malformed("literal", format!("unrepresentable number {n}")))
                }
            }
            Value::String(name) => Ok(Formula::Var(name.clone())),
            Value::Null => Err(malformed("literal", "null operand")),
            Value::Array(_) => Err(malformed("literal", "bare list where an operand was expected")),
        }
    }

    fn parse_node(operator: &str, args: &Value) -> AareResult<Formula> {
        let cmp = match operator {
            "<=" => Some(CmpOp::Le),
            "<" => Some(CmpOp::Lt),
            ">=" => Some(CmpOp::Ge),
            ">" => Some(CmpOp::Gt),
            "==" => Some(CmpOp::Eq),
            _ => None,
        };
        if let Some(op) = cmp {
            let [lhs, rhs] = Self::fixed_args::<2>(operator, args)?;
            return Ok(Formula::compare(op, lhs, rhs));
        }
        let arith = match operator {
            "+" => Some(ArithOp::Add),
            "*" => Some(ArithOp::Mul),
            "min" => Some(ArithOp::Min),
            "max" => Some(ArithOp::Max),
            _ => None,
        };
        if let Some(op) = arith {
            let operands = Self::list_args(operator, args)?;
            if operands.is_empty() {
                return Err(malformed(operator, "needs at least one operand"));
            }
            return Ok(Formula::Arith(op, operands));
        }
        match operator {
            "and" => Ok(Formula::And(Self::list_args(operator, args)?)),
            "or" => Ok(Formula::Or(Self::list_args(operator, args)?)),
            "not" => {
                let inner = match args {
                    Value::Array(_) => {
                        let [inner] = Self::fixed_args::<1>(operator, args)?;
                        inner
                    }
                    other => Self::parse(other)?,
                };
                Ok(Formula::negate(inner))
            }
            "implies" => {
                let [antecedent, consequent] = Self::fixed_args::<2>(operator, args)?;
                Ok(Formula::implies(antecedent, consequent))
            }
            "ite" => {
                let [cond, then, els] = Self::fixed_args::<3>(operator, args)?;
                Ok(Formula::ite(cond, then, els))
            }
            other => Err(AareError::UnsupportedOperator {
                operator: other.to_string(),
            }),
        }
    }

    fn list_args(operator: &str, args: &Value) -> AareResult<Vec<Formula>> {
        match args {
            Value::Array(items) => items.iter().map(Self::parse).collect(),
            _ => Err(malformed(operator, "operands must be a list")),
        }
    }

    fn fixed_args<const N: usize>(operator: &str, args: &Value) -> AareResult<[Formula; N]> {
        let operands = Self::list_args(operator, args)?;
        let found = operands.len();
        operands
            .try_into()
            .map_err(|_| malformed(operator, format!("expected {N} operands, found {found}")))
    }

    /// Compile to a boolean term.
    pub fn compile(&self, table: &SymbolTable) -> AareResult<SmtTerm> {
        let compiled = self.compile_expr(table)?;
        if compiled.sort != SmtSort::Bool {
            return Err(mismatch("rule formula", "Bool", compiled.sort));
        }
        Ok(compiled.term)
    }

    /// Compile to a term of any sort.
    pub fn compile_expr(&self, table: &SymbolTable) -> AareResult<Compiled> {
        match self {
            Formula::Var(name) => {
                let sort: SmtSort = table.resolve(name)?.into();
                Ok(Compiled::new(SmtTerm::var(name.clone()), sort))
            }
            Formula::Lit(Literal::Bool(b)) => Ok(Compiled::new(SmtTerm::bool(*b), SmtSort::Bool)),
            Formula::Lit(Literal::Int(n)) => Ok(Compiled::new(SmtTerm::int(*n), SmtSort::Int)),
            Formula::Lit(Literal::Real(r)) => {
                Ok(Compiled::new(SmtTerm::real(r.clone()), SmtSort::Real))
            }
            Formula::Compare(op, lhs, rhs) => compile_compare(*op, lhs, rhs, table),
            Formula::And(items) => Ok(Compiled::new(
                SmtTerm::and(compile_bools("and", items, table)?),
                SmtSort::Bool,
            )),
            Formula::Or(items) => Ok(Compiled::new(
                SmtTerm::or(compile_bools("or", items, table)?),
                SmtSort::Bool,
            )),
            Formula::Not(inner) => Ok(Compiled::new(
                compile_bool("not", inner, table)?.not(),
                SmtSort::Bool,
            )),
            Formula::Implies(antecedent, consequent) => Ok(Compiled::new(
                compile_bool("implies", antecedent, table)?
                    .implies(compile_bool("implies", consequent, table)?),
                SmtSort::Bool,
            )),
            Formula::Ite(cond, then, els) => {
                let cond = compile_bool("ite condition", cond, table)?;
                let then = then.compile_expr(table)?;
                let els = els.compile_expr(table)?;
                let sort = unify("ite branches", then.sort, els.sort)?;
                Ok(Compiled::new(
                    SmtTerm::ite(cond, then.coerce(sort), els.coerce(sort)),
                    sort,
                ))
            }
            Formula::Arith(op, operands) => compile_arith(*op, operands, table),
        }
    }
}

fn compile_bool(context: &str, formula: &Formula, table: &SymbolTable) -> AareResult<SmtTerm> {
    let compiled = formula.compile_expr(table)?;
    if compiled.sort != SmtSort::Bool {
        return Err(mismatch(context, "Bool", compiled.sort));
    }
    Ok(compiled.term)
}

fn compile_bools(context: &str, items: &[Formula], table: &SymbolTable) -> AareResult<Vec<SmtTerm>> {
    items
        .iter()
        .map(|item| compile_bool(context, item, table))
        .collect()
}

fn compile_numeric(context: &str, formula: &Formula, table: &SymbolTable) -> AareResult<Compiled> {
    let compiled = formula.compile_expr(table)?;
    if !compiled.sort.is_numeric() {
        return Err(mismatch(context, "Int or Real", compiled.sort));
    }
    Ok(compiled)
}

/// Common sort of two operands: equal sorts, or the wider numeric sort.
fn unify(context: &str, a: SmtSort, b: SmtSort) -> AareResult<SmtSort> {
    if a == b {
        Ok(a)
    } else if a.is_numeric() && b.is_numeric() {
        Ok(a.widen(b))
    } else {
        Err(AareError::KindMismatch {
            context: context.to_string(),
            expected: a.to_string(),
            found: b.to_string(),
        })
    }
}

fn compile_compare(
    op: CmpOp,
    lhs: &Formula,
    rhs: &Formula,
    table: &SymbolTable,
) -> AareResult<Compiled> {
    let context = format!("'{}' comparison", op.as_str());
    let lhs = lhs.compile_expr(table)?;
    let rhs = rhs.compile_expr(table)?;
    let sort = unify(&context, lhs.sort, rhs.sort)?;
    if sort == SmtSort::Bool && op != CmpOp::Eq {
        return Err(mismatch(context, "Int or Real", SmtSort::Bool));
    }
    let (l, r) = (lhs.coerce(sort), rhs.coerce(sort));
    let term = match op {
        CmpOp::Le => l.le(r),
        CmpOp::Lt => l.lt(r),
        CmpOp::Ge => l.ge(r),
        CmpOp::Gt => l.gt(r),
        CmpOp::Eq => l.eq(r),
    };
    Ok(Compiled::new(term, SmtSort::Bool))
}

fn compile_arith(op: ArithOp, operands: &[Formula], table: &SymbolTable) -> AareResult<Compiled> {
    let compiled = operands
        .iter()
        .map(|operand| compile_numeric(op.as_str(), operand, table))
        .collect::<AareResult<Vec<_>>>()?;
    let sort = compiled
        .iter()
        .fold(SmtSort::Int, |acc, c| acc.widen(c.sort));
    let mut terms = compiled.into_iter().map(|c| c.coerce(sort));
    let term = match op {
        ArithOp::Add => SmtTerm::Add(terms.collect()),
        ArithOp::Mul => SmtTerm::Mul(terms.collect()),
        ArithOp::Min | ArithOp::Max => {
            let first = terms
                .next()
                .ok_or_else(|| malformed(op.as_str(), "needs at least one operand"))?;
            terms.fold(first, |acc, next| {
                let pick_acc = if op == ArithOp::Min {
                    acc.clone().le(next.clone())
                } else {
                    acc.clone().ge(next.clone())
                };
                SmtTerm::ite(pick_acc, acc, next)
            })
        }
    };
    Ok(Compiled::new(term, sort))
}

/// Compile an optional raw formula document; a missing formula is `true`.
pub fn compile(raw: Option<&Value>, table: &SymbolTable) -> AareResult<SmtTerm> {
    match raw {
        None | Some(Value::Null) => Ok(SmtTerm::bool(true)),
        Some(value) => Formula::parse(value)?.compile(table),
    }
}
