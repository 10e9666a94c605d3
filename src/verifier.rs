//! Constraint verification against a fact set.
//!
//! Every constraint is checked in its own solver session: declared variables
//! are bound to their facts (or to a default that cannot cause a violation),
//! the negated formula is asserted, and a satisfying assignment is reported
//! as a countermodel. A constraint that cannot be evaluated is recorded as a
//! failure and never counted as satisfied.

use crate::config::VerifierConfig;
use crate::error::{AareError, AareResult};
use crate::formula;
use crate::smt::{
    rational_from_f64, rational_to_f64, Model, NativeBackend, SatResult, SmtSolver, SmtSort,
    SmtTerm, SolverBackend,
};
use crate::symbols::SymbolTable;
use crate::types::{
    Constraint, ConstraintFailure, FactSet, FactValue, MissingFact, Ontology, ProofCertificate,
    ProofFragment, VarKind, VerificationReport, ViolationRecord,
};
use num::rational::BigRational;
use num::BigInt;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

/// Cooperative cancellation shared between a caller and a running session.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Outcome of checking a single constraint.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstraintCheck {
    pub violation: Option<ViolationRecord>,
    pub proof: ProofFragment,
    /// Variables bound to a default because no fact was known.
    pub missing: Vec<MissingFact>,
}

impl ConstraintCheck {
    pub fn is_violated(&self) -> bool {
        self.violation.is_some()
    }
}

/// Checks constraints with a fresh solver from `B` for each one.
#[derive(Debug, Clone)]
pub struct ConstraintVerifier<B: SolverBackend = NativeBackend> {
    backend: B,
    config: VerifierConfig,
}

impl ConstraintVerifier<NativeBackend> {
    /// Create a verifier on the built-in backend with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a verifier on the built-in backend with custom configuration.
    pub fn with_config(config: VerifierConfig) -> Self {
        Self::with_backend(NativeBackend, config)
    }
}

impl Default for ConstraintVerifier<NativeBackend> {
    fn default() -> Self {
        Self::with_backend(NativeBackend, VerifierConfig::default())
    }
}

impl<B: SolverBackend> ConstraintVerifier<B> {
    pub fn with_backend(backend: B, config: VerifierConfig) -> Self {
        Self { backend, config }
    }

    pub fn config(&self) -> &VerifierConfig {
        &self.config
    }

    /// Backend name and version recorded in proof certificates.
    pub fn backend_version(&self) -> String {
        self.backend.version()
    }

    /// Check one constraint against `facts`.
    pub fn check(&self, facts: &FactSet, constraint: &Constraint) -> AareResult<ConstraintCheck> {
        let id = constraint.id.as_str();
        let table = SymbolTable::from_variables(&constraint.variables)?;
        let compiled = formula::compile(constraint.formula.as_ref(), &table)?;

        let internal = |e: <B::Solver as SmtSolver>::Error| AareError::SolverInternal {
            constraint_id: id.to_string(),
            message: e.to_string(),
        };

        let mut solver = self.backend.create(Some(self.config.solver_timeout()));
        let mut declared: Vec<(String, SmtSort)> = Vec::with_capacity(table.len());
        let mut missing = Vec::new();

        for (name, kind) in table.iter() {
            let sort = SmtSort::from(kind);
            solver.declare_var(name, &sort).map_err(internal)?;
            let value = match facts.get(name) {
                Some(fact) => bind_fact(name, kind, fact)?,
                None => {
                    let assumed = default_fact(kind);
                    if self.config.report_missing_facts {
                        missing.push(MissingFact {
                            constraint_id: id.to_string(),
                            variable: name.to_string(),
                            assumed: assumed.clone(),
                        });
                    }
                    bind_fact(name, kind, &assumed)?
                }
            };
            solver.assert(&SmtTerm::var(name).eq(value)).map_err(internal)?;
            declared.push((name.to_string(), sort));
        }

        solver.assert(&compiled.not()).map_err(internal)?;

        let vars: Vec<(&str, &SmtSort)> = declared.iter().map(|(n, s)| (n.as_str(), s)).collect();
        let (result, model) = solver.check_sat_with_model(&vars).map_err(internal)?;

        match result {
            SatResult::Sat => {
                let model = model.ok_or_else(|| AareError::SolverInternal {
                    constraint_id: id.to_string(),
                    message: "satisfiable but no model returned".to_string(),
                })?;
                let countermodel = self.project_model(&model, &table);
                debug!(constraint = id, ?countermodel, "constraint violated");
                Ok(ConstraintCheck {
                    violation: Some(ViolationRecord::new(constraint, countermodel.clone())),
                    proof: ProofFragment::violated(id, countermodel),
                    missing,
                })
            }
            SatResult::Unsat => {
                debug!(constraint = id, "constraint satisfied");
                Ok(ConstraintCheck {
                    violation: None,
                    proof: ProofFragment::satisfied(id),
                    missing,
                })
            }
            SatResult::Unknown(reason) => Err(self.undecided(id, &reason)),
        }
    }

    /// Check every constraint of `ontology` in declaration order.
    pub fn verify(&self, facts: &FactSet, ontology: &Ontology) -> AareResult<VerificationReport> {
        self.verify_with_cancel(facts, ontology, &CancelFlag::new())
    }

    /// As [`Self::verify`], stopping with `Cancelled` once `cancel` is tripped.
    pub fn verify_with_cancel(
        &self,
        facts: &FactSet,
        ontology: &Ontology,
        cancel: &CancelFlag,
    ) -> AareResult<VerificationReport> {
        let total = ontology.constraints.len();
        if total > self.config.max_constraints {
            return Err(AareError::ResourceLimit {
                resource: "constraints".to_string(),
                limit: self.config.max_constraints,
                actual: total,
            });
        }

        let start = Instant::now();
        let mut violations = Vec::new();
        let mut results = Vec::with_capacity(total);
        let mut failures = Vec::new();
        let mut missing_facts = Vec::new();

        for (index, constraint) in ontology.constraints.iter().enumerate() {
            match self.check(facts, constraint) {
                Ok(check) => {
                    violations.extend(check.violation);
                    results.push(check.proof);
                    missing_facts.extend(check.missing);
                }
                Err(e) => {
                    warn!(constraint = %constraint.id, error = %e, "constraint could not be evaluated");
                    failures.push(ConstraintFailure::new(&constraint.id, &e));
                    results.push(ProofFragment::failed(&constraint.id, &e));
                }
            }

            let completed = index + 1;
            if completed < total && cancel.is_cancelled() {
                info!(ontology = %ontology.name, completed, total, "verification cancelled");
                return Err(AareError::Cancelled { completed, total });
            }
        }

        let execution_time_ms = start.elapsed().as_millis() as u64;
        let verified = violations.is_empty() && failures.is_empty();
        info!(
            ontology = %ontology.name,
            constraints = total,
            violations = violations.len(),
            failures = failures.len(),
            execution_time_ms,
            "verification complete"
        );

        Ok(VerificationReport {
            verified,
            violations,
            proof: ProofCertificate::new(self.backend.version(), results, current_time_secs()),
            failures,
            missing_facts,
            execution_time_ms,
        })
    }

    fn project_model(&self, model: &Model, table: &SymbolTable) -> BTreeMap<String, FactValue> {
        let mut countermodel = BTreeMap::new();
        for (name, kind) in table.iter() {
            let value = match kind {
                VarKind::Bool => model.get_bool(name).map(FactValue::Bool),
                VarKind::Int => model.get_int(name).map(FactValue::Int),
                VarKind::Real => model
                    .get_real(name)
                    .map(|r| FactValue::Real(rational_to_f64(r, self.config.real_precision))),
            };
            if let Some(value) = value {
                countermodel.insert(name.to_string(), value);
            }
        }
        countermodel
    }

    fn undecided(&self, constraint_id: &str, reason: &str) -> AareError {
        let lowered = reason.to_lowercase();
        if lowered.contains("timeout") || lowered.contains("canceled") {
            AareError::SolverTimeout {
                constraint_id: constraint_id.to_string(),
                limit_ms: self.config.solver_timeout_ms,
            }
        } else {
            AareError::SolverInternal {
                constraint_id: constraint_id.to_string(),
                message: format!("undecided: {reason}"),
            }
        }
    }
}

/// Value a variable of `kind` takes when no fact is known.
pub fn default_fact(kind: VarKind) -> FactValue {
    match kind {
        VarKind::Bool => FactValue::Bool(false),
        VarKind::Int => FactValue::Int(0),
        VarKind::Real => FactValue::Real(0.0),
    }
}

/// Ground term for `fact` as a value of a variable declared with `kind`.
fn bind_fact(name: &str, kind: VarKind, fact: &FactValue) -> AareResult<SmtTerm> {
    let term = match (kind, fact) {
        (VarKind::Bool, FactValue::Bool(b)) => Some(SmtTerm::bool(*b)),
        (VarKind::Int, FactValue::Int(n)) => Some(SmtTerm::int(*n)),
        (VarKind::Int, FactValue::Real(x)) if x.fract() == 0.0 && x.abs() < i64::MAX as f64 => {
            Some(SmtTerm::int(*x as i64))
        }
        (VarKind::Real, FactValue::Int(n)) => {
            Some(SmtTerm::real(BigRational::from_integer(BigInt::from(*n))))
        }
        (VarKind::Real, FactValue::Real(x)) => rational_from_f64(*x).map(SmtTerm::real),
        _ => None,
    };
    term.ok_or_else(|| AareError::KindMismatch {
        context: format!("fact '{name}'"),
        expected: kind.as_str().to_string(),
        found: fact.kind_name().to_string(),
    })
}

fn current_time_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::smt::ModelValue;
    use crate::types::{Variable, RESULT_ERROR, RESULT_SAT, RESULT_UNSAT};
    use serde_json::json;
    use std::time::Duration;

    fn dti_rule() -> Constraint {
        Constraint::new(
            "ATR_QM_DTI",
            Some(json!({"or": [{"<=": ["dti", 43]}, {">=": ["compensating_factors", 2]}]})),
            vec![
                Variable::new("dti", VarKind::Real),
                Variable::new("compensating_factors", VarKind::Int),
            ],
        )
    }

    fn guarantee_rule() -> Constraint {
        Constraint::new(
            "UDAAP_NO_GUARANTEES",
            Some(json!({"not": {"and": [{"==": ["has_guarantee", true]}, {"==": ["has_approval", true]}]}})),
            vec![
                Variable::new("has_guarantee", VarKind::Bool),
                Variable::new("has_approval", VarKind::Bool),
            ],
        )
    }

    fn facts(entries: &[(&str, FactValue)]) -> FactSet {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn ontology(constraints: Vec<Constraint>) -> Ontology {
        Ontology::new("test", "1.0.0", constraints, BTreeMap::new())
    }

    /// Backend whose solver always answers with a fixed result.
    #[derive(Debug, Clone)]
    struct FixedBackend(SatResult);

    struct FixedSolver(SatResult);

    impl SmtSolver for FixedSolver {
        type Error = std::fmt::Error;

        fn declare_var(&mut self, _: &str, _: &SmtSort) -> Result<(), Self::Error> {
            Ok(())
        }

        fn assert(&mut self, _: &SmtTerm) -> Result<(), Self::Error> {
            Ok(())
        }

        fn check_sat(&mut self) -> Result<SatResult, Self::Error> {
            Ok(self.0.clone())
        }

        fn check_sat_with_model(
            &mut self,
            _: &[(&str, &SmtSort)],
        ) -> Result<(SatResult, Option<Model>), Self::Error> {
            Ok((self.0.clone(), None))
        }
    }

    impl SolverBackend for FixedBackend {
        type Solver = FixedSolver;

        fn create(&self, _: Option<Duration>) -> FixedSolver {
            FixedSolver(self.0.clone())
        }

        fn version(&self) -> String {
            "fixed".to_string()
        }
    }

    #[test]
    fn dti_rule_passes_with_compensating_factors() {
        let verifier = ConstraintVerifier::new();
        let check = verifier
            .check(&facts(&[("dti", 50.0.into()), ("compensating_factors", FactValue::Int(2))]), &dti_rule())
            .expect("check");
        assert!(!check.is_violated());
        assert_eq!(check.proof.result, RESULT_UNSAT);
    }

    #[test]
    fn dti_rule_violates_without_compensating_factors() {
        let verifier = ConstraintVerifier::new();
        let check = verifier
            .check(&facts(&[("dti", 50.0.into()), ("compensating_factors", FactValue::Int(0))]), &dti_rule())
            .expect("check");
        let violation = check.violation.expect("violation");
        assert_eq!(violation.countermodel["dti"], FactValue::Real(50.0));
        assert_eq!(violation.countermodel["compensating_factors"], FactValue::Int(0));
        assert_eq!(check.proof.result, RESULT_SAT);
        assert_eq!(check.proof.model.as_ref(), Some(&violation.countermodel));
    }

    #[test]
    fn dti_rule_passes_under_threshold() {
        let verifier = ConstraintVerifier::new();
        let check = verifier
            .check(&facts(&[("dti", 40.0.into()), ("compensating_factors", FactValue::Int(0))]), &dti_rule())
            .expect("check");
        assert!(!check.is_violated());
    }

    #[test]
    fn missing_facts_take_safe_defaults() {
        let verifier = ConstraintVerifier::new();
        let check = verifier.check(&FactSet::new(), &dti_rule()).expect("check");
        assert!(!check.is_violated());
        let assumed: Vec<(&str, &FactValue)> = check
            .missing
            .iter()
            .map(|m| (m.variable.as_str(), &m.assumed))
            .collect();
        assert_eq!(
            assumed,
            vec![("dti", &FactValue::Real(0.0)), ("compensating_factors", &FactValue::Int(0))]
        );
    }

    #[test]
    fn missing_fact_reporting_can_be_disabled() {
        let config = VerifierConfig {
            report_missing_facts: false,
            ..VerifierConfig::default()
        };
        let check = ConstraintVerifier::with_config(config)
            .check(&FactSet::new(), &dti_rule())
            .expect("check");
        assert!(check.missing.is_empty());
    }

    #[test]
    fn countermodel_reals_are_rounded() {
        let verifier = ConstraintVerifier::new();
        let check = verifier
            .check(&facts(&[("dti", 43.1234567.into())]), &dti_rule())
            .expect("check");
        let violation = check.violation.expect("violation");
        assert_eq!(violation.countermodel["dti"], FactValue::Real(43.123457));
    }

    #[test]
    fn numeric_facts_widen_and_narrow() {
        let verifier = ConstraintVerifier::new();
        let widened = facts(&[("dti", FactValue::Int(50)), ("compensating_factors", 3.0.into())]);
        assert!(!verifier.check(&widened, &dti_rule()).expect("check").is_violated());

        let fractional = facts(&[("compensating_factors", 2.5.into())]);
        let err = verifier.check(&fractional, &dti_rule()).expect_err("kind mismatch");
        assert_eq!(err.kind(), "kind_mismatch");
    }

    #[test]
    fn text_fact_for_numeric_variable_is_rejected() {
        let err = ConstraintVerifier::new()
            .check(&facts(&[("dti", "high".into())]), &dti_rule())
            .expect_err("kind mismatch");
        assert!(matches!(err, AareError::KindMismatch { ref found, .. } if found == "text"));
    }

    #[test]
    fn guarantee_rule_needs_both_flags() {
        let verifier = ConstraintVerifier::new();
        let both = facts(&[("has_guarantee", true.into()), ("has_approval", true.into())]);
        assert!(verifier.check(&both, &guarantee_rule()).expect("check").is_violated());
        let one = facts(&[("has_guarantee", true.into()), ("has_approval", false.into())]);
        assert!(!verifier.check(&one, &guarantee_rule()).expect("check").is_violated());
    }

    #[test]
    fn null_formula_always_passes() {
        let mut rule = dti_rule();
        rule.formula = None;
        let check = ConstraintVerifier::new()
            .check(&facts(&[("dti", 99.0.into())]), &rule)
            .expect("check");
        assert!(!check.is_violated());
    }

    #[test]
    fn unknown_results_never_pass() {
        let config = VerifierConfig {
            solver_timeout_ms: 42,
            ..VerifierConfig::default()
        };
        let timeout = ConstraintVerifier::with_backend(
            FixedBackend(SatResult::Unknown("timeout".to_string())),
            config.clone(),
        );
        assert_eq!(
            timeout.check(&FactSet::new(), &dti_rule()),
            Err(AareError::SolverTimeout {
                constraint_id: "ATR_QM_DTI".to_string(),
                limit_ms: 42
            })
        );

        let incomplete = ConstraintVerifier::with_backend(
            FixedBackend(SatResult::Unknown("incomplete".to_string())),
            config,
        );
        let err = incomplete.check(&FactSet::new(), &dti_rule()).expect_err("internal");
        assert_eq!(err.kind(), "solver_internal_error");
    }

    #[test]
    fn sat_without_model_is_an_internal_error() {
        let verifier = ConstraintVerifier::with_backend(FixedBackend(SatResult::Sat), VerifierConfig::default());
        let err = verifier.check(&FactSet::new(), &dti_rule()).expect_err("no model");
        assert!(matches!(err, AareError::SolverInternal { .. }));
    }

    #[test]
    fn session_isolates_failing_constraints() {
        let broken = Constraint::new(
            "BROKEN",
            Some(json!({"<=": ["ghost", 1]})),
            vec![Variable::new("dti", VarKind::Real)],
        );
        let report = ConstraintVerifier::new()
            .verify(
                &facts(&[("has_guarantee", true.into()), ("has_approval", true.into())]),
                &ontology(vec![dti_rule(), broken, guarantee_rule()]),
            )
            .expect("report");

        assert!(!report.verified);
        assert_eq!(report.violation_ids(), vec!["UDAAP_NO_GUARANTEES"]);
        assert_eq!(report.failed_ids(), vec!["BROKEN"]);
        assert_eq!(report.failures[0].kind, "unknown_variable");
        let outcomes: Vec<&str> = report.proof.results.iter().map(|r| r.result.as_str()).collect();
        assert_eq!(outcomes, vec![RESULT_UNSAT, RESULT_ERROR, RESULT_SAT]);
    }

    #[test]
    fn failures_alone_block_verification() {
        let broken = Constraint::new("BROKEN", Some(json!({"/": [1, 2]})), vec![]);
        let report = ConstraintVerifier::new()
            .verify(&FactSet::new(), &ontology(vec![broken]))
            .expect("report");
        assert!(report.violations.is_empty());
        assert!(!report.verified);
    }

    #[test]
    fn violations_follow_declaration_order() {
        let all = facts(&[
            ("dti", 60.0.into()),
            ("has_guarantee", true.into()),
            ("has_approval", true.into()),
        ]);
        let verifier = ConstraintVerifier::new();
        let forward = verifier
            .verify(&all, &ontology(vec![guarantee_rule(), dti_rule()]))
            .expect("report");
        assert_eq!(forward.violation_ids(), vec!["UDAAP_NO_GUARANTEES", "ATR_QM_DTI"]);
        let reverse = verifier
            .verify(&all, &ontology(vec![dti_rule(), guarantee_rule()]))
            .expect("report");
        assert_eq!(reverse.violation_ids(), vec!["ATR_QM_DTI", "UDAAP_NO_GUARANTEES"]);
    }

    #[test]
    fn certificate_covers_every_constraint() {
        let verifier = ConstraintVerifier::new();
        let report = verifier
            .verify(&FactSet::new(), &ontology(vec![dti_rule(), guarantee_rule()]))
            .expect("report");
        assert!(report.verified);
        assert_eq!(report.proof.method, ProofCertificate::METHOD);
        assert_eq!(report.proof.version, verifier.backend_version());
        assert_eq!(report.proof.results.len(), 2);
        assert!(report.proof.is_intact());
        assert!(report.proof.timestamp > 0.0);
        assert_eq!(report.missing_facts.len(), 4);
    }

    #[test]
    fn constraint_limit_enforced() {
        let config = VerifierConfig {
            max_constraints: 1,
            ..VerifierConfig::default()
        };
        let err = ConstraintVerifier::with_config(config)
            .verify(&FactSet::new(), &ontology(vec![dti_rule(), guarantee_rule()]))
            .expect_err("limit");
        assert_eq!(
            err,
            AareError::ResourceLimit {
                resource: "constraints".to_string(),
                limit: 1,
                actual: 2
            }
        );
    }

    #[test]
    fn cancellation_stops_between_constraints() {
        let cancel = CancelFlag::new();
        cancel.cancel();
        let err = ConstraintVerifier::new()
            .verify_with_cancel(
                &FactSet::new(),
                &ontology(vec![dti_rule(), guarantee_rule()]),
                &cancel,
            )
            .expect_err("cancelled");
        assert_eq!(err, AareError::Cancelled { completed: 1, total: 2 });
    }

    #[test]
    fn empty_ontology_is_verified() {
        let report = ConstraintVerifier::new()
            .verify(&FactSet::new(), &ontology(vec![]))
            .expect("report");
        assert!(report.verified);
        assert!(report.proof.results.is_empty());
    }

    #[test]
    fn projection_skips_values_missing_from_model() {
        let verifier = ConstraintVerifier::new();
        let table = SymbolTable::from_variables(&dti_rule().variables).expect("table");
        let mut model = Model::default();
        model.values.insert("compensating_factors".to_string(), ModelValue::Int(1));
        let projected = verifier.project_model(&model, &table);
        assert_eq!(projected.len(), 1);
        assert_eq!(projected["compensating_factors"], FactValue::Int(1));
    }
}
