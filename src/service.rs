//! Text-in, report-out compliance verification.

use crate::config::{LoaderConfig, VerifierConfig};
use crate::error::{AareError, AareResult};
use crate::extract::FactExtractor;
use crate::loader::{OntologyLoader, OntologySource};
use crate::smt::{NativeBackend, SolverBackend};
use crate::types::{
    compute_content_hash, ConstraintFailure, FactSet, MissingFact, OntologySummary,
    ProofCertificate, ViolationRecord,
};
use crate::verifier::{CancelFlag, ConstraintVerifier};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Result of verifying one text against one ontology.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VerifyResponse {
    pub verification_id: String,
    pub verified: bool,
    pub violations: Vec<ViolationRecord>,
    pub parsed_data: FactSet,
    pub ontology: OntologySummary,
    pub proof: ProofCertificate,
    pub failures: Vec<ConstraintFailure>,
    pub missing_facts: Vec<MissingFact>,
    pub execution_time_ms: u64,
}

/// Loads an ontology, extracts facts from text and verifies them.
#[derive(Debug)]
pub struct ComplianceService<S: OntologySource, B: SolverBackend = NativeBackend> {
    loader: OntologyLoader<S>,
    verifier: ConstraintVerifier<B>,
}

impl<S: OntologySource> ComplianceService<S> {
    pub fn new(source: S) -> Self {
        Self::with_config(source, LoaderConfig::default(), VerifierConfig::default())
    }

    pub fn with_config(source: S, loader: LoaderConfig, verifier: VerifierConfig) -> Self {
        Self::from_parts(
            OntologyLoader::with_config(source, loader),
            ConstraintVerifier::with_config(verifier),
        )
    }
}

impl<S: OntologySource, B: SolverBackend> ComplianceService<S, B> {
    pub fn from_parts(loader: OntologyLoader<S>, verifier: ConstraintVerifier<B>) -> Self {
        Self { loader, verifier }
    }

    pub fn loader(&self) -> &OntologyLoader<S> {
        &self.loader
    }

    pub fn verifier(&self) -> &ConstraintVerifier<B> {
        &self.verifier
    }

    /// Verify `text` against the configured default ontology.
    pub fn verify_default(&self, text: &str) -> AareResult<VerifyResponse> {
        let name = self.loader.config().default_ontology_name.clone();
        self.verify(text, &name)
    }

    pub fn verify(&self, text: &str, ontology_name: &str) -> AareResult<VerifyResponse> {
        self.verify_with_cancel(text, ontology_name, &CancelFlag::new())
    }

    pub fn verify_with_cancel(
        &self,
        text: &str,
        ontology_name: &str,
        cancel: &CancelFlag,
    ) -> AareResult<VerifyResponse> {
        if text.trim().is_empty() {
            return Err(AareError::Validation {
                field: "text".to_string(),
                message: "text must not be empty".to_string(),
            });
        }

        let ontology = self.loader.load(ontology_name)?;
        let facts = FactExtractor::for_ontology(&ontology).extract(text);
        let report = self.verifier.verify_with_cancel(&facts, &ontology, cancel)?;

        let identity = serde_json::json!({
            "text": text,
            "ontology": {"name": ontology.name, "version": ontology.version},
            "facts": serde_json::to_value(&facts)?,
            "proof_digest": report.proof.digest,
        });
        let verification_id = compute_content_hash(&identity);

        info!(
            verification_id = %verification_id,
            ontology = %ontology.name,
            verified = report.verified,
            "text verified"
        );

        Ok(VerifyResponse {
            verification_id,
            verified: report.verified,
            violations: report.violations,
            parsed_data: facts,
            ontology: ontology.summary(),
            proof: report.proof,
            failures: report.failures,
            missing_facts: report.missing_facts,
            execution_time_ms: report.execution_time_ms,
        })
    }
}
