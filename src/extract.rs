//! Fact extraction from free text.
//!
//! Each ontology extractor produces at most one typed fact from a case-folded
//! copy of the text. Fields whose pattern is missing or does not match are
//! left out; defaulting absent facts is the verifier's job. Derived fields
//! are computed afterwards by [`derive_fields`].

use crate::types::{ExtractorKind, ExtractorSpec, FactSet, FactValue, Ontology};
use regex::{Captures, Regex};
use tracing::{debug, warn};

/// Characters inspected before a keyword when looking for a negation word.
pub const NEGATION_WINDOW_CHARS: usize = 15;

/// Boolean PHI-indicator fields counted into `phi_count`.
pub const PHI_FIELDS: [&str; 16] = [
    "has_patient_name",
    "has_dob",
    "has_street_address",
    "has_phone_number",
    "has_ssn",
    "has_mrn",
    "has_email",
    "has_full_zip",
    "has_city",
    "has_device_id",
    "has_ip_address",
    "has_biometric",
    "has_photo_reference",
    "has_vehicle_id",
    "has_account_number",
    "has_license_number",
];

/// Audit flags the surrounding system is assumed to uphold.
pub const AUDIT_FLAGS: [&str; 7] = [
    "verification_complete",
    "has_proof",
    "has_rule_citation",
    "has_retention_policy",
    "audit_immutable",
    "has_chain_of_custody",
    "session_valid",
];

pub const MINIMUM_NECESSARY_THRESHOLD: i64 = 3;

/// Money magnitude letters, searched in this order anywhere in the matched text.
/// The first letter found wins, so "$200 mortgage" scales by a million.
const MONEY_SUFFIXES: [(char, f64); 3] = [
    ('k', 1_000.0),
    ('m', 1_000_000.0),
    ('b', 1_000_000_000.0),
];

#[derive(Debug, Clone)]
struct FieldExtractor {
    field: String,
    spec: ExtractorSpec,
    regex: Option<Regex>,
}

/// Extractors of one ontology with their patterns compiled once.
#[derive(Debug, Clone, Default)]
pub struct FactExtractor {
    fields: Vec<FieldExtractor>,
}

impl FactExtractor {
    /// Compile every extractor of `ontology`; invalid patterns are logged and skipped.
    pub fn for_ontology(ontology: &Ontology) -> Self {
        let fields = ontology
            .extractors
            .iter()
            .map(|(field, spec)| {
                let regex = spec.pattern.as_deref().and_then(|pattern| {
                    Regex::new(pattern)
                        .map_err(|e| warn!(field = %field, error = %e, "invalid extractor pattern"))
                        .ok()
                });
                FieldExtractor {
                    field: field.clone(),
                    spec: spec.clone(),
                    regex,
                }
            })
            .collect();
        Self { fields }
    }

    /// Extract primary facts, then add the derived fields.
    pub fn extract(&self, text: &str) -> FactSet {
        let lowered = text.to_lowercase();
        let mut facts = FactSet::new();
        for extractor in &self.fields {
            if let Some(value) = extractor.extract(&lowered) {
                debug!(field = %extractor.field, ?value, "extracted fact");
                facts.insert(extractor.field.clone(), value);
            }
        }
        derive_fields(&mut facts, &lowered);
        facts
    }
}

impl FieldExtractor {
    fn extract(&self, lowered: &str) -> Option<FactValue> {
        match self.spec.kind {
            ExtractorKind::Boolean => Some(FactValue::Bool(self.keyword_present(lowered))),
            ExtractorKind::Int => {
                let caps = self.regex.as_ref()?.captures(lowered)?;
                primary_group(&caps)
                    .replace(',', "")
                    .parse::<i64>()
                    .ok()
                    .map(FactValue::Int)
            }
            ExtractorKind::Float | ExtractorKind::Percentage => {
                let caps = self.regex.as_ref()?.captures(lowered)?;
                primary_group(&caps)
                    .replace(',', "")
                    .parse::<f64>()
                    .ok()
                    .map(FactValue::Real)
            }
            ExtractorKind::Money => {
                let caps = self.regex.as_ref()?.captures(lowered)?;
                parse_money(&caps).map(FactValue::Real)
            }
            ExtractorKind::String => {
                let caps = self.regex.as_ref()?.captures(lowered)?;
                Some(FactValue::Text(primary_group(&caps).to_string()))
            }
            ExtractorKind::Unsupported => None,
        }
    }

    /// True on the first keyword occurrence not preceded by a negation word.
    fn keyword_present(&self, lowered: &str) -> bool {
        let check_negation = self.spec.check_negation && !self.spec.negation_words.is_empty();
        for keyword in &self.spec.keywords {
            let keyword = keyword.to_lowercase();
            if keyword.is_empty() {
                continue;
            }
            let Some(pos) = lowered.find(&keyword) else {
                continue;
            };
            if check_negation {
                let window = negation_window(lowered, pos, keyword.len());
                let negated = self
                    .spec
                    .negation_words
                    .iter()
                    .any(|neg| !neg.is_empty() && window.contains(neg.to_lowercase().as_str()));
                if negated {
                    continue;
                }
            }
            return true;
        }
        false
    }
}

/// The keyword span plus up to [`NEGATION_WINDOW_CHARS`] characters before it.
fn negation_window(text: &str, pos: usize, keyword_len: usize) -> &str {
    let start = text[..pos]
        .char_indices()
        .rev()
        .nth(NEGATION_WINDOW_CHARS - 1)
        .map(|(i, _)| i)
        .unwrap_or(0);
    &text[start..pos + keyword_len]
}

/// First capture group when the pattern has one, otherwise the whole match.
fn primary_group<'t>(caps: &Captures<'t>) -> &'t str {
    caps.get(1)
        .or_else(|| caps.get(0))
        .map(|m| m.as_str())
        .unwrap_or("")
}

fn parse_money(caps: &Captures<'_>) -> Option<f64> {
    let whole = caps.get(0)?;
    let number = caps.get(1).unwrap_or(whole);
    let base: f64 = number.as_str().replace(',', "").parse().ok()?;
    let matched = whole.as_str();
    let multiplier = MONEY_SUFFIXES
        .iter()
        .find(|(letter, _)| matched.contains(*letter))
        .map(|(_, m)| *m)
        .unwrap_or(1.0);
    Some(base * multiplier)
}

/// Add cross-field derived facts and the fixed audit assumptions.
pub fn derive_fields(facts: &mut FactSet, lowered: &str) {
    let fees = facts.get("fees").and_then(FactValue::as_f64);
    let loan = facts.get("loan_amount").and_then(FactValue::as_f64);
    if let (Some(fees), Some(loan)) = (fees, loan) {
        if loan > 0.0 {
            facts.insert("fee_percentage".to_string(), FactValue::Real(fees / loan * 100.0));
        }
    }

    let compensating = if lowered.contains("compensating") {
        if lowered.contains("two") || lowered.contains("multiple") {
            2
        } else {
            1
        }
    } else {
        0
    };
    facts.insert("compensating_factors".to_string(), FactValue::Int(compensating));

    let flag = |facts: &FactSet, name: &str| facts.get(name).is_some_and(FactValue::is_true);
    let phi_count = PHI_FIELDS.iter().filter(|f| flag(facts, **f)).count() as i64;
    let mut risk_score = phi_count * 2;
    if flag(facts, "has_sensitive_diagnosis") {
        risk_score += 3;
    }
    if flag(facts, "has_treatment_details") && !flag(facts, "is_deidentified") {
        risk_score += 2;
    }
    facts.insert("phi_count".to_string(), FactValue::Int(phi_count));
    facts.insert("has_phi".to_string(), FactValue::Bool(phi_count > 0));
    facts.insert("risk_score".to_string(), FactValue::Int(risk_score));

    facts.insert(
        "minimum_necessary_threshold".to_string(),
        FactValue::Int(MINIMUM_NECESSARY_THRESHOLD),
    );
    for name in AUDIT_FLAGS {
        facts.insert(name.to_string(), FactValue::Bool(true));
    }
    facts.insert("violation_count".to_string(), FactValue::Int(0));
}

/// Extract facts from `text` with the extractors of `ontology`.
pub fn extract(text: &str, ontology: &Ontology) -> FactSet {
    FactExtractor::for_ontology(ontology).extract(text)
}
