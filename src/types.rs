//! Core data types for aare.

use crate::error::{AareError, AareResult};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashSet};

/// Proof fragment result for a constraint the facts can violate.
pub const RESULT_SAT: &str = "SAT (violation found)";
/// Proof fragment result for a constraint that holds under the facts.
pub const RESULT_UNSAT: &str = "UNSAT (constraint satisfied)";
/// Proof fragment result for a constraint that could not be evaluated.
pub const RESULT_ERROR: &str = "ERROR (evaluation failed)";

/// Declared kind of a constraint variable.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(from = "String", into = "String")]
pub enum VarKind {
    Bool,
    Int,
    Real,
}

impl VarKind {
    /// Canonical string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Real => "real",
        }
    }
}

// Unrecognised kinds are treated as real-valued.
impl From<String> for VarKind {
    fn from(s: String) -> Self {
        match s.trim().to_lowercase().as_str() {
            "bool" | "boolean" => Self::Bool,
            "int" | "integer" => Self::Int,
            _ => Self::Real,
        }
    }
}

impl From<VarKind> for String {
    fn from(kind: VarKind) -> Self {
        kind.as_str().to_string()
    }
}

impl std::fmt::Display for VarKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Typed variable declaration of a constraint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Variable {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: VarKind,
}

impl Variable {
    pub fn new(name: impl Into<String>, kind: VarKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

fn default_category() -> String {
    "General".to_string()
}

fn default_error_message() -> String {
    "Constraint violated".to_string()
}

/// One compliance rule of an ontology.
///
/// `formula` is kept as the raw declarative tree so that a malformed rule
/// fails only its own check instead of the whole ontology load.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Constraint {
    pub id: String,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub formula_readable: String,
    #[serde(default)]
    pub formula: Option<serde_json::Value>,
    #[serde(default)]
    pub variables: Vec<Variable>,
    #[serde(default = "default_error_message")]
    pub error_message: String,
    #[serde(default)]
    pub citation: String,
}

impl Constraint {
    pub fn new(
        id: impl Into<String>,
        formula: Option<serde_json::Value>,
        variables: Vec<Variable>,
    ) -> Self {
        Self {
            id: id.into(),
            category: default_category(),
            description: String::new(),
            formula_readable: String::new(),
            formula,
            variables,
            error_message: default_error_message(),
            citation: String::new(),
        }
    }

    pub fn validate(&self) -> AareResult<()> {
        if self.id.is_empty() {
            return Err(AareError::Validation {
                field: "id".to_string(),
                message: "Constraint must have a non-empty ID".to_string(),
            });
        }
        let mut seen = HashSet::new();
        for var in &self.variables {
            if !seen.insert(var.name.as_str()) {
                return Err(AareError::Validation {
                    field: format!("{}.variables", self.id),
                    message: format!("variable '{}' declared more than once", var.name),
                });
            }
        }
        Ok(())
    }
}

/// How an extractor turns text into a typed value.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ExtractorKind {
    Boolean,
    Int,
    Float,
    Percentage,
    Money,
    String,
    #[serde(other)]
    Unsupported,
}

fn default_check_negation() -> bool {
    true
}

/// Extraction rule for one fact field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExtractorSpec {
    #[serde(rename = "type")]
    pub kind: ExtractorKind,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub negation_words: Vec<String>,
    #[serde(default = "default_check_negation")]
    pub check_negation: bool,
}

impl ExtractorSpec {
    pub fn pattern(kind: ExtractorKind, pattern: impl Into<String>) -> Self {
        Self {
            kind,
            pattern: Some(pattern.into()),
            keywords: Vec::new(),
            negation_words: Vec::new(),
            check_negation: true,
        }
    }

    pub fn keywords(keywords: &[&str]) -> Self {
        Self {
            kind: ExtractorKind::Boolean,
            pattern: None,
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            negation_words: Vec::new(),
            check_negation: true,
        }
    }

    pub fn with_negation(mut self, words: &[&str]) -> Self {
        self.negation_words = words.iter().map(|w| w.to_string()).collect();
        self
    }
}

/// Named, versioned set of constraints plus the extractors feeding them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Ontology {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub description: String,
    pub constraints: Vec<Constraint>,
    pub extractors: BTreeMap<String, ExtractorSpec>,
}

impl Ontology {
    /// Top-level fields every ontology document must carry.
    pub const REQUIRED_FIELDS: [&'static str; 4] = ["name", "version", "constraints", "extractors"];

    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        constraints: Vec<Constraint>,
        extractors: BTreeMap<String, ExtractorSpec>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            description: String::new(),
            constraints,
            extractors,
        }
    }

    /// Check required fields on a raw document, then deserialize and validate it.
    pub fn from_value(value: serde_json::Value) -> AareResult<Self> {
        let object = value.as_object().ok_or_else(|| AareError::Validation {
            field: "ontology".to_string(),
            message: "ontology document must be a JSON object".to_string(),
        })?;
        for field in Self::REQUIRED_FIELDS {
            if !object.contains_key(field) {
                return Err(AareError::OntologyInvalid {
                    field: field.to_string(),
                });
            }
        }
        let ontology: Ontology = serde_json::from_value(value)?;
        ontology.validate()?;
        Ok(ontology)
    }

    pub fn validate(&self) -> AareResult<()> {
        if self.name.is_empty() {
            return Err(AareError::Validation {
                field: "name".to_string(),
                message: "Ontology must have a non-empty name".to_string(),
            });
        }
        let mut ids = HashSet::new();
        for constraint in &self.constraints {
            constraint.validate()?;
            if !ids.insert(constraint.id.as_str()) {
                return Err(AareError::Validation {
                    field: "constraints".to_string(),
                    message: format!("duplicate constraint id '{}'", constraint.id),
                });
            }
        }
        Ok(())
    }

    pub fn summary(&self) -> OntologySummary {
        OntologySummary {
            name: self.name.clone(),
            version: self.version.clone(),
            constraints_checked: self.constraints.len(),
        }
    }
}

/// Name, version and size of the ontology a verification ran against.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OntologySummary {
    pub name: String,
    pub version: String,
    pub constraints_checked: usize,
}

/// Concrete typed value of a fact or countermodel entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum FactValue {
    Bool(bool),
    Int(i64),
    Real(f64),
    Text(String),
}

impl FactValue {
    /// Numeric view of the value; integers widen to f64.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(n) => Some(*n as f64),
            Self::Real(x) => Some(*x),
            _ => None,
        }
    }

    /// Truthiness used by derived-field rules: only `Bool(true)` counts.
    pub fn is_true(&self) -> bool {
        matches!(self, Self::Bool(true))
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Real(_) => "real",
            Self::Text(_) => "text",
        }
    }
}

impl From<bool> for FactValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for FactValue {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<f64> for FactValue {
    fn from(x: f64) -> Self {
        Self::Real(x)
    }
}

impl From<&str> for FactValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

/// Typed facts known about a text; partial by default.
pub type FactSet = BTreeMap<String, FactValue>;

/// Evidence that a constraint can be violated by the known facts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ViolationRecord {
    pub constraint_id: String,
    pub category: String,
    pub description: String,
    pub error_message: String,
    pub formula: String,
    pub citation: String,
    pub countermodel: BTreeMap<String, FactValue>,
}

impl ViolationRecord {
    pub fn new(constraint: &Constraint, countermodel: BTreeMap<String, FactValue>) -> Self {
        Self {
            constraint_id: constraint.id.clone(),
            category: constraint.category.clone(),
            description: constraint.description.clone(),
            error_message: constraint.error_message.clone(),
            formula: constraint.formula_readable.clone(),
            citation: constraint.citation.clone(),
            countermodel,
        }
    }
}

/// Per-constraint entry of the proof certificate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProofFragment {
    pub result: String,
    pub constraint_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<BTreeMap<String, FactValue>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProofFragment {
    pub fn violated(constraint_id: &str, model: BTreeMap<String, FactValue>) -> Self {
        Self {
            result: RESULT_SAT.to_string(),
            constraint_id: constraint_id.to_string(),
            model: Some(model),
            error: None,
        }
    }

    pub fn satisfied(constraint_id: &str) -> Self {
        Self {
            result: RESULT_UNSAT.to_string(),
            constraint_id: constraint_id.to_string(),
            model: None,
            error: None,
        }
    }

    pub fn failed(constraint_id: &str, error: &AareError) -> Self {
        Self {
            result: RESULT_ERROR.to_string(),
            constraint_id: constraint_id.to_string(),
            model: None,
            error: Some(format!("{}: {}", error.kind(), error)),
        }
    }

    pub fn is_violation(&self) -> bool {
        self.result == RESULT_SAT
    }
}

/// Ordered bundle of per-constraint results returned as verification evidence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProofCertificate {
    pub method: String,
    pub version: String,
    pub results: Vec<ProofFragment>,
    pub timestamp: f64,
    pub digest: String,
}

impl ProofCertificate {
    pub const METHOD: &'static str = "SMT solver";

    pub fn new(version: impl Into<String>, results: Vec<ProofFragment>, timestamp: f64) -> Self {
        let digest = Self::compute_digest(&results);
        Self {
            method: Self::METHOD.to_string(),
            version: version.into(),
            results,
            timestamp,
            digest,
        }
    }

    /// Content hash of the results; independent of the timestamp.
    pub fn compute_digest(results: &[ProofFragment]) -> String {
        let value = serde_json::to_value(results).unwrap_or(serde_json::Value::Null);
        compute_content_hash(&value)
    }

    /// Recompute the digest and compare it to the stored one.
    pub fn is_intact(&self) -> bool {
        Self::compute_digest(&self.results) == self.digest
    }
}

/// A constraint that could not be evaluated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConstraintFailure {
    pub constraint_id: String,
    pub kind: String,
    pub message: String,
}

impl ConstraintFailure {
    pub fn new(constraint_id: &str, error: &AareError) -> Self {
        Self {
            constraint_id: constraint_id.to_string(),
            kind: error.kind().to_string(),
            message: error.to_string(),
        }
    }
}

/// A declared variable with no fact, bound to its conservative default.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MissingFact {
    pub constraint_id: String,
    pub variable: String,
    pub assumed: FactValue,
}

/// Outcome of checking every constraint of an ontology.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VerificationReport {
    pub verified: bool,
    pub violations: Vec<ViolationRecord>,
    pub proof: ProofCertificate,
    #[serde(default)]
    pub failures: Vec<ConstraintFailure>,
    #[serde(default)]
    pub missing_facts: Vec<MissingFact>,
    pub execution_time_ms: u64,
}

impl VerificationReport {
    pub fn violation_ids(&self) -> Vec<&str> {
        self.violations
            .iter()
            .map(|v| v.constraint_id.as_str())
            .collect()
    }

    pub fn failed_ids(&self) -> Vec<&str> {
        self.failures
            .iter()
            .map(|f| f.constraint_id.as_str())
            .collect()
    }
}

/// Compute a deterministic content-addressable hash for a JSON value.
pub fn compute_content_hash(obj: &serde_json::Value) -> String {
    let serialized = canonical_json(obj);
    let mut hasher = Sha256::new();
    hasher.update(serialized.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Produce canonical JSON with deterministic key ordering.
fn canonical_json(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Object(map) => {
            let mut keys: Vec<_> = map.keys().collect();
            keys.sort();
            let pairs: Vec<String> = keys
                .into_iter()
                .map(|k| {
                    format!(
                        "{}:{}",
                        serde_json::to_string(k).unwrap_or_default(),
                        canonical_json(&map[k])
                    )
                })
                .collect();
            format!("{{{}}}", pairs.join(","))
        }
        serde_json::Value::Array(arr) => {
            let items: Vec<String> = arr.iter().map(canonical_json).collect();
            format!("[{}]", items.join(","))
        }
        _ => serde_json::to_string(value).unwrap_or_else(|_| "null".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn var_kind_parses_aliases() {
        let vars: Vec<Variable> = serde_json::from_value(json!([
            {"name": "a", "type": "bool"},
            {"name": "b", "type": "int"},
            {"name": "c", "type": "float"},
            {"name": "d", "type": "decimal"}
        ]))
        .expect("variables");
        let kinds: Vec<VarKind> = vars.iter().map(|v| v.kind).collect();
        assert_eq!(kinds, vec![VarKind::Bool, VarKind::Int, VarKind::Real, VarKind::Real]);
    }

    #[test]
    fn constraint_defaults_fill_metadata() {
        let c: Constraint = serde_json::from_value(json!({"id": "X"})).expect("constraint");
        assert_eq!(c.category, "General");
        assert_eq!(c.error_message, "Constraint violated");
        assert!(c.formula.is_none());
    }

    #[test]
    fn from_value_reports_missing_field() {
        let err = Ontology::from_value(json!({"name": "x", "version": "1", "constraints": []}))
            .unwrap_err();
        assert_eq!(
            err,
            AareError::OntologyInvalid {
                field: "extractors".to_string()
            }
        );
    }

    #[test]
    fn duplicate_constraint_ids_rejected() {
        let c = Constraint::new("DUP", None, vec![]);
        let ontology = Ontology::new("o", "1", vec![c.clone(), c], BTreeMap::new());
        assert!(matches!(ontology.validate(), Err(AareError::Validation { .. })));
    }

    #[test]
    fn duplicate_variable_declarations_rejected() {
        let c = Constraint::new(
            "C",
            None,
            vec![Variable::new("x", VarKind::Int), Variable::new("x", VarKind::Real)],
        );
        assert!(c.validate().is_err());
    }

    #[test]
    fn fact_values_deserialize_untagged() {
        let facts: FactSet =
            serde_json::from_value(json!({"a": true, "b": 720, "c": 35.0, "d": "x"}))
                .expect("facts");
        assert_eq!(facts["a"], FactValue::Bool(true));
        assert_eq!(facts["b"], FactValue::Int(720));
        assert_eq!(facts["c"], FactValue::Real(35.0));
        assert_eq!(facts["d"], FactValue::Text("x".to_string()));
    }

    #[test]
    fn certificate_digest_ignores_timestamp() {
        let results = vec![ProofFragment::satisfied("A")];
        let first = ProofCertificate::new("v", results.clone(), 1.0);
        let second = ProofCertificate::new("v", results, 2.0);
        assert_eq!(first.digest, second.digest);
        assert!(first.is_intact());
    }

    #[test]
    fn hash_is_key_order_independent() {
        assert_eq!(
            compute_content_hash(&json!({"a": 1, "b": 2})),
            compute_content_hash(&json!({"b": 2, "a": 1}))
        );
    }
}
