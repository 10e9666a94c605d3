//! Per-constraint typed symbol table.

use crate::error::{AareError, AareResult};
use crate::types::{VarKind, Variable};
use std::collections::HashMap;

/// Maps each declared variable name to its kind, keeping declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SymbolTable {
    order: Vec<String>,
    kinds: HashMap<String, VarKind>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from a constraint's variable declarations.
    pub fn from_variables(variables: &[Variable]) -> AareResult<Self> {
        let mut table = Self::new();
        for var in variables {
            table.declare(&var.name, var.kind)?;
        }
        Ok(table)
    }

    /// Declare a variable; redeclaring a name is an error.
    pub fn declare(&mut self, name: &str, kind: VarKind) -> AareResult<()> {
        if self.kinds.contains_key(name) {
            return Err(AareError::Validation {
                field: name.to_string(),
                message: "variable declared more than once".to_string(),
            });
        }
        self.order.push(name.to_string());
        self.kinds.insert(name.to_string(), kind);
        Ok(())
    }

    pub fn kind_of(&self, name: &str) -> Option<VarKind> {
        self.kinds.get(name).copied()
    }

    /// Kind of `name`, or `UnknownVariable` when it was never declared.
    pub fn resolve(&self, name: &str) -> AareResult<VarKind> {
        self.kind_of(name).ok_or_else(|| AareError::UnknownVariable {
            name: name.to_string(),
        })
    }

    /// Declared variables in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, VarKind)> + '_ {
        self.order
            .iter()
            .map(move |name| (name.as_str(), self.kinds[name]))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_declared_names() {
        let table = SymbolTable::from_variables(&[
            Variable::new("dti", VarKind::Real),
            Variable::new("compensating_factors", VarKind::Int),
        ])
        .expect("table");
        assert_eq!(table.resolve("dti"), Ok(VarKind::Real));
        assert_eq!(table.len(), 2);
        let names: Vec<&str> = table.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["dti", "compensating_factors"]);
    }

    #[test]
    fn unknown_name_is_an_error() {
        let table = SymbolTable::new();
        assert_eq!(
            table.resolve("ghost"),
            Err(AareError::UnknownVariable {
                name: "ghost".to_string()
            })
        );
        assert!(table.is_empty());
    }

    #[test]
    fn duplicate_declaration_rejected() {
        let mut table = SymbolTable::new();
        table.declare("x", VarKind::Bool).expect("first");
        assert!(table.declare("x", VarKind::Int).is_err());
    }
}
