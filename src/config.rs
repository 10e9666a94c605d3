//! Runtime configuration for the verifier and the ontology loader.

use crate::error::AareResult;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Limits applied to each verification session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifierConfig {
    /// Per-constraint solver budget in milliseconds.
    pub solver_timeout_ms: u64,
    /// Decimal digits kept for real values in countermodels.
    pub real_precision: u32,
    pub max_constraints: usize,
    pub report_missing_facts: bool,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            solver_timeout_ms: 5000,
            real_precision: 6,
            max_constraints: 1000,
            report_missing_facts: true,
        }
    }
}

impl VerifierConfig {
    pub fn from_json_str(raw: &str) -> AareResult<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn solver_timeout(&self) -> Duration {
        Duration::from_millis(self.solver_timeout_ms)
    }
}

/// Cache and fallback settings for [`crate::loader::OntologyLoader`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Maximum cached ontologies before the least recently used is evicted.
    pub capacity: usize,
    /// Entry lifetime; `None` keeps entries until evicted or invalidated.
    pub ttl_secs: Option<u64>,
    pub default_ontology_name: String,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            capacity: 10,
            ttl_secs: Some(3600),
            default_ontology_name: "mortgage-compliance-v1".to_string(),
        }
    }
}

impl LoaderConfig {
    pub fn from_json_str(raw: &str) -> AareResult<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.ttl_secs.map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config = VerifierConfig::from_json_str(r#"{"solver_timeout_ms": 250}"#).expect("config");
        assert_eq!(config.solver_timeout(), Duration::from_millis(250));
        assert_eq!(config.real_precision, 6);
        assert_eq!(config.max_constraints, 1000);
        assert!(config.report_missing_facts);
    }

    #[test]
    fn loader_ttl_can_be_disabled() {
        let config = LoaderConfig::from_json_str(r#"{"ttl_secs": null, "capacity": 2}"#).expect("config");
        assert_eq!(config.ttl(), None);
        assert_eq!(config.capacity, 2);
        assert_eq!(config.default_ontology_name, "mortgage-compliance-v1");
        assert_eq!(LoaderConfig::default().ttl(), Some(Duration::from_secs(3600)));
    }

    #[test]
    fn malformed_json_is_a_serialization_error() {
        let err = VerifierConfig::from_json_str("{").expect_err("invalid");
        assert_eq!(err.kind(), "serialization");
    }
}
