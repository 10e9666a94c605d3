//! aare - Formal compliance verification kernel
//!
//! Extracts typed facts from text, compiles ontology rules to SMT terms, and
//! checks each rule for a countermodel.

pub mod config;
pub mod error;
pub mod extract;
pub mod formula;
pub mod loader;
pub mod service;
pub mod smt;
pub mod symbols;
pub mod types;
pub mod verifier;

pub use config::{LoaderConfig, VerifierConfig};
pub use error::{AareError, AareResult};
pub use extract::FactExtractor;
pub use formula::Formula;
pub use loader::{default_ontology, DirectorySource, InMemorySource, OntologyLoader, OntologySource};
pub use service::{ComplianceService, VerifyResponse};
pub use symbols::SymbolTable;
pub use types::{
    compute_content_hash, Constraint, ConstraintFailure, ExtractorKind, ExtractorSpec, FactSet,
    FactValue, MissingFact, Ontology, OntologySummary, ProofCertificate, ProofFragment, VarKind,
    Variable, VerificationReport, ViolationRecord,
};
pub use verifier::{CancelFlag, ConstraintCheck, ConstraintVerifier};
