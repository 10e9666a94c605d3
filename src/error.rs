//! Error types for aare.

use thiserror::Error;

/// Unified error type for all aare operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AareError {
    /// Formula references a name absent from the constraint's declarations
    #[error("unknown variable '{name}'")]
    UnknownVariable { name: String },
    /// Formula node carries more than one operator key
    #[error("ambiguous operator: formula node has multiple operators {operators:?}")]
    AmbiguousOperator { operators: Vec<String> },
    /// Operator outside the supported set
    #[error("unsupported operator '{operator}'")]
    UnsupportedOperator { operator: String },
    /// Operator applied to the wrong shape or number of operands
    #[error("malformed '{operator}' node: {message}")]
    MalformedFormula { operator: String, message: String },
    /// Operand or fact kind does not fit where it is used
    #[error("kind mismatch in {context}: expected {expected}, found {found}")]
    KindMismatch {
        context: String,
        expected: String,
        found: String,
    },
    /// Backend could not decide within the configured bound
    #[error("solver timed out on '{constraint_id}' after {limit_ms}ms")]
    SolverTimeout { constraint_id: String, limit_ms: u64 },
    /// Backend failure or undecided result
    #[error("solver error on '{constraint_id}': {message}")]
    SolverInternal {
        constraint_id: String,
        message: String,
    },
    /// Ontology document is missing a required top-level field
    #[error("invalid ontology: missing {field}")]
    OntologyInvalid { field: String },
    /// Ontology source has no document with this name
    #[error("ontology '{name}' not found")]
    OntologyNotFound { name: String },
    /// Validation error with field context
    #[error("validation error on '{field}': {message}")]
    Validation { field: String, message: String },
    /// Resource limit exceeded
    #[error("{resource} limit exceeded: {actual} > {limit}")]
    ResourceLimit {
        resource: String,
        limit: usize,
        actual: usize,
    },
    /// Serialization error
    #[error("serialization error: {message}")]
    Serialization { message: String },
    /// Filesystem error while reading an ontology source
    #[error("io error: {message}")]
    Io { message: String },
    /// Caller abandoned the session between constraints
    #[error("verification cancelled after {completed} of {total} constraints")]
    Cancelled { completed: usize, total: usize },
    /// Lock acquisition failed (thread safety)
    #[error("lock poisoned for resource: {resource}")]
    LockPoisoned { resource: String },
}

impl AareError {
    /// Stable snake_case name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnknownVariable { .. } => "unknown_variable",
            Self::AmbiguousOperator { .. } => "ambiguous_operator",
            Self::UnsupportedOperator { .. } => "unsupported_operator",
            Self::MalformedFormula { .. } => "malformed_formula",
            Self::KindMismatch { .. } => "kind_mismatch",
            Self::SolverTimeout { .. } => "solver_timeout",
            Self::SolverInternal { .. } => "solver_internal_error",
            Self::OntologyInvalid { .. } => "ontology_invalid",
            Self::OntologyNotFound { .. } => "ontology_not_found",
            Self::Validation { .. } => "validation",
            Self::ResourceLimit { .. } => "resource_limit",
            Self::Serialization { .. } => "serialization",
            Self::Io { .. } => "io",
            Self::Cancelled { .. } => "cancelled",
            Self::LockPoisoned { .. } => "lock_poisoned",
        }
    }

    /// Whether the error stems from the formula itself rather than the solver.
    pub fn is_compile_error(&self) -> bool {
        matches!(
            self,
            Self::UnknownVariable { .. }
                | Self::AmbiguousOperator { .. }
                | Self::UnsupportedOperator { .. }
                | Self::MalformedFormula { .. }
                | Self::KindMismatch { .. }
        )
    }
}

/// Result type alias for aare operations.
pub type AareResult<T> = Result<T, AareError>;

impl From<serde_json::Error> for AareError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization {
            message: e.to_string(),
        }
    }
}

impl From<std::io::Error> for AareError {
    fn from(e: std::io::Error) -> Self {
        Self::Io {
            message: e.to_string(),
        }
    }
}

impl<T> From<std::sync::PoisonError<T>> for AareError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        Self::LockPoisoned {
            resource: "mutex".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_carries_context() {
        let err = AareError::UnknownVariable {
            name: "dti".to_string(),
        };
        assert_eq!(err.to_string(), "unknown variable 'dti'");
        assert_eq!(err.kind(), "unknown_variable");
        assert!(err.is_compile_error());
    }

    #[test]
    fn solver_errors_are_not_compile_errors() {
        let err = AareError::SolverTimeout {
            constraint_id: "ATR_QM_DTI".to_string(),
            limit_ms: 5000,
        };
        assert!(!err.is_compile_error());
        assert!(err.to_string().contains("5000ms"));
    }

    #[test]
    fn serde_errors_convert() {
        let parse: Result<serde_json::Value, _> = serde_json::from_str("{not json");
        let err: AareError = parse.unwrap_err().into();
        assert_eq!(err.kind(), "serialization");
    }
}
