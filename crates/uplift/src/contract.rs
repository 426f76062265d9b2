//! Contract-structure analysis.
//!
//! Glues entry detection, binding analysis, and pattern detection into one
//! description of the validator: its purpose, parameters, datum/redeemer
//! usage, and the semantic checks its body performs. This is the report the
//! host renders alongside the decompiled source.

use crate::{
    builtin::DefaultFunction,
    entry::{ScriptParameter, ScriptPurpose, UtilityBinding, ValidatorEntry, detect_validator_entry},
    patterns::{detect_constructor_match, detect_field_access, detect_tx_field},
    shape::{flatten_app, references_var, unwrap_force_delay},
    term::Term,
};

use indexmap::IndexMap;

/// Datum usage summary for spend validators.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct DatumInfo {
    pub is_used: bool,
    /// Field indices accessed positionally on the datum.
    pub fields: Vec<usize>,
}

/// Redeemer usage summary.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct RedeemerInfo {
    /// Constructor indices the body dispatches on.
    pub variants: Vec<u64>,
    /// A rendering hint for the match, when a dispatch was found.
    pub match_pattern: Option<String>,
}

/// The semantic family of one detected validation check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    Signature,
    Deadline,
    Value,
    Equality,
    Comparison,
    Other,
}

/// One detected validation check.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ValidationCheck {
    pub kind: CheckKind,
    pub description: String,
}

/// The analyzed shape of a validator.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ContractStructure {
    #[serde(rename = "type")]
    pub purpose: ScriptPurpose,
    /// Real runtime parameter names.
    pub params: Vec<String>,
    /// Deployment-time constants baked into the bytecode.
    pub script_params: Vec<ScriptParameter>,
    /// Parameters bound to primitive shortcuts (V3 context pattern).
    pub utility_bindings: IndexMap<String, UtilityBinding>,
    pub datum: DatumInfo,
    pub redeemer: RedeemerInfo,
    pub checks: Vec<ValidationCheck>,
    /// The handler body with its let-binding prefix peeled.
    pub raw_body: Term,
    /// The handler body including let-bindings.
    pub body_with_bindings: Term,
    /// The full input program.
    pub full_ast: Term,
    /// Names of module-level recursive functions; filled by the generator.
    pub hoisted_functions: Vec<String>,
    /// Original parameter name -> constant identifier, for script parameters
    /// consumed during unwrapping.
    #[serde(skip)]
    pub param_renames: Vec<(String, String)>,
}

/// Runs entry detection plus usage analysis over a whole program.
pub fn analyze_contract(term: &Term) -> ContractStructure {
    let entry = detect_validator_entry(term);
    let datum = analyze_datum(&entry);
    let redeemer = analyze_redeemer(&entry);
    let checks = detect_checks(&entry);
    let raw_body = peel_let_prefix(&entry.body).clone();
    tracing::debug!(
        purpose = ?entry.purpose,
        checks = checks.len(),
        datum_used = datum.is_used,
        "analyzed contract structure"
    );
    let ValidatorEntry {
        purpose,
        params,
        script_params,
        utility_bindings,
        param_renames,
        body,
    } = entry;
    ContractStructure {
        purpose,
        params,
        script_params,
        utility_bindings,
        datum,
        redeemer,
        checks,
        raw_body,
        body_with_bindings: body,
        full_ast: term.clone(),
        hoisted_functions: Vec::new(),
        param_renames,
    }
}

fn peel_let_prefix(term: &Term) -> &Term {
    let mut current = term;
    while let Term::Apply { function, .. } = current {
        let Term::Lam { body, .. } = unwrap_force_delay(function) else { break };
        current = body;
    }
    current
}

/// The parameter holding the datum, when the purpose has one.
fn datum_param(entry: &ValidatorEntry) -> Option<&str> {
    match entry.purpose {
        ScriptPurpose::Spend if !entry.params.is_empty() => Some(entry.params[0].as_str()),
        _ => None,
    }
}

/// The parameter holding the redeemer.
fn redeemer_param(entry: &ValidatorEntry) -> Option<&str> {
    match entry.purpose {
        ScriptPurpose::Spend if entry.params.len() >= 2 => Some(entry.params[1].as_str()),
        ScriptPurpose::Spend => None,
        _ => entry.params.first().map(String::as_str),
    }
}

fn analyze_datum(entry: &ValidatorEntry) -> DatumInfo {
    let Some(datum) = datum_param(entry) else {
        return DatumInfo::default();
    };
    let mut fields = Vec::new();
    collect_field_indices(&entry.body, datum, &mut fields);
    fields.sort_unstable();
    fields.dedup();
    DatumInfo {
        is_used: references_var(&entry.body, datum),
        fields,
    }
}

fn collect_field_indices(term: &Term, target: &str, fields: &mut Vec<usize>) {
    if let Some(access) = detect_field_access(term)
        && access.target.as_var() == Some(target)
    {
        fields.push(access.index);
    }
    match term {
        Term::Lam { param, body } => {
            if param != target {
                collect_field_indices(body, target, fields);
            }
        }
        Term::Apply { function, argument } => {
            collect_field_indices(function, target, fields);
            collect_field_indices(argument, target, fields);
        }
        Term::Force { inner } | Term::Delay { inner } => collect_field_indices(inner, target, fields),
        Term::Case { scrutinee, branches } => {
            collect_field_indices(scrutinee, target, fields);
            for branch in branches {
                collect_field_indices(branch, target, fields);
            }
        }
        Term::Constr { args, .. } => {
            for arg in args {
                collect_field_indices(arg, target, fields);
            }
        }
        _ => {}
    }
}

fn analyze_redeemer(entry: &ValidatorEntry) -> RedeemerInfo {
    let Some(redeemer) = redeemer_param(entry) else {
        return RedeemerInfo::default();
    };
    let mut info = RedeemerInfo::default();
    find_redeemer_match(&entry.body, redeemer, &mut info);
    info
}

fn find_redeemer_match(term: &Term, redeemer: &str, info: &mut RedeemerInfo) {
    if info.match_pattern.is_none()
        && let Some(m) = detect_constructor_match(term)
        && m.scrutinee.as_var() == Some(redeemer)
    {
        info.variants = m.arms.iter().map(|(index, _)| *index).collect();
        info.match_pattern = Some(format!("when {redeemer} is"));
        return;
    }
    match term {
        Term::Lam { param, body } => {
            if param != redeemer {
                find_redeemer_match(body, redeemer, info);
            }
        }
        Term::Apply { function, argument } => {
            find_redeemer_match(function, redeemer, info);
            find_redeemer_match(argument, redeemer, info);
        }
        Term::Force { inner } | Term::Delay { inner } => find_redeemer_match(inner, redeemer, info),
        Term::Case { scrutinee, branches } => {
            find_redeemer_match(scrutinee, redeemer, info);
            for branch in branches {
                find_redeemer_match(branch, redeemer, info);
            }
        }
        _ => {}
    }
}

/// Scans the body for builtins and field accesses with a known semantic
/// meaning and tags each as a [`ValidationCheck`].
fn detect_checks(entry: &ValidatorEntry) -> Vec<ValidationCheck> {
    let mut checks = Vec::new();
    let tx_param = entry.params.last().map(String::as_str).unwrap_or_default();
    scan_checks(&entry.body, tx_param, &mut checks);
    if checks.is_empty() && contains_if(&entry.body) {
        checks.push(ValidationCheck {
            kind: CheckKind::Other,
            description: "conditional validation logic".to_owned(),
        });
    }
    checks
}

fn push_unique(checks: &mut Vec<ValidationCheck>, kind: CheckKind, description: &str) {
    if !checks.iter().any(|c| c.kind == kind && c.description == description) {
        checks.push(ValidationCheck {
            kind,
            description: description.to_owned(),
        });
    }
}

fn scan_checks(term: &Term, tx_param: &str, checks: &mut Vec<ValidationCheck>) {
    match detect_tx_field(term, tx_param) {
        Some("extra_signatories") => push_unique(checks, CheckKind::Signature, "requires transaction signatory"),
        Some("validity_range") => push_unique(checks, CheckKind::Deadline, "constrains validity range"),
        Some("mint") => push_unique(checks, CheckKind::Value, "inspects minted value"),
        Some("outputs") | Some("inputs") => push_unique(checks, CheckKind::Value, "inspects transaction value flow"),
        _ => {}
    }
    let (head, _) = flatten_app(term);
    if let Term::Builtin { fun } = head {
        match fun {
            DefaultFunction::VerifyEd25519Signature
            | DefaultFunction::VerifyEcdsaSecp256k1Signature
            | DefaultFunction::VerifySchnorrSecp256k1Signature => {
                push_unique(checks, CheckKind::Signature, "verifies a cryptographic signature");
            }
            DefaultFunction::EqualsData | DefaultFunction::EqualsByteString | DefaultFunction::EqualsString => {
                push_unique(checks, CheckKind::Equality, "compares values for equality");
            }
            DefaultFunction::LessThanInteger
            | DefaultFunction::LessThanEqualsInteger
            | DefaultFunction::LessThanByteString
            | DefaultFunction::LessThanEqualsByteString => {
                push_unique(checks, CheckKind::Comparison, "ordering comparison");
            }
            _ => {}
        }
    }
    match term {
        Term::Lam { body, .. } => scan_checks(body, tx_param, checks),
        Term::Apply { function, argument } => {
            scan_checks(function, tx_param, checks);
            scan_checks(argument, tx_param, checks);
        }
        Term::Force { inner } | Term::Delay { inner } => scan_checks(inner, tx_param, checks),
        Term::Case { scrutinee, branches } => {
            scan_checks(scrutinee, tx_param, checks);
            for branch in branches {
                scan_checks(branch, tx_param, checks);
            }
        }
        Term::Constr { args, .. } => {
            for arg in args {
                scan_checks(arg, tx_param, checks);
            }
        }
        _ => {}
    }
}

fn contains_if(term: &Term) -> bool {
    let (head, _) = flatten_app(term);
    if matches!(head, Term::Builtin { fun: DefaultFunction::IfThenElse }) {
        return true;
    }
    match term {
        Term::Lam { body, .. } => contains_if(body),
        Term::Apply { function, argument } => contains_if(function) || contains_if(argument),
        Term::Force { inner } | Term::Delay { inner } => contains_if(inner),
        Term::Case { scrutinee, branches } => contains_if(scrutinee) || branches.iter().any(contains_if),
        Term::Constr { args, .. } => args.iter().any(contains_if),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn constr_check(scrutinee: Term, n: i64) -> Term {
        Term::builtin(DefaultFunction::EqualsInteger)
            .apply(
                Term::builtin(DefaultFunction::FstPair)
                    .force()
                    .force()
                    .apply(Term::builtin(DefaultFunction::UnConstrData).apply(scrutinee)),
            )
            .apply(Term::integer(n))
    }

    fn ite(cond: Term, then_branch: Term, else_branch: Term) -> Term {
        Term::builtin(DefaultFunction::IfThenElse)
            .force()
            .apply(cond)
            .apply(then_branch.delay())
            .apply(else_branch.delay())
            .force()
    }

    #[test]
    fn always_true_spend() {
        let term = Term::lam("d", Term::lam("r", Term::lam("c", Term::unit())));
        let contract = analyze_contract(&term);
        assert_eq!(contract.purpose, ScriptPurpose::Spend);
        assert!(!contract.datum.is_used);
        assert!(contract.checks.is_empty());
        assert_eq!(contract.raw_body, Term::unit());
    }

    #[test]
    fn redeemer_variants_from_match() {
        let body = ite(
            constr_check(Term::var("r"), 0),
            Term::unit(),
            ite(constr_check(Term::var("r"), 1), Term::unit(), Term::Error),
        );
        let term = Term::lam("d", Term::lam("r", Term::lam("c", body)));
        let contract = analyze_contract(&term);
        assert_eq!(contract.redeemer.variants, vec![0, 1]);
        assert_eq!(contract.redeemer.match_pattern.as_deref(), Some("when r is"));
    }

    #[test]
    fn datum_field_usage() {
        // headList(sndPair(unConstrData(datum_d)))
        let access = Term::builtin(DefaultFunction::HeadList).force().apply(
            Term::builtin(DefaultFunction::SndPair)
                .force()
                .force()
                .apply(Term::builtin(DefaultFunction::UnConstrData).apply(Term::var("datum_d"))),
        );
        let term = Term::lam("datum_d", Term::lam("r", Term::lam("c", access)));
        let contract = analyze_contract(&term);
        assert_eq!(contract.purpose, ScriptPurpose::Spend);
        assert!(contract.datum.is_used);
        assert_eq!(contract.datum.fields, vec![0]);
    }

    #[test]
    fn signature_check_from_builtin() {
        let body = Term::builtin(DefaultFunction::VerifyEd25519Signature)
            .apply(Term::var("k"))
            .apply(Term::var("m"))
            .apply(Term::var("s"));
        let term = Term::lam("r", Term::lam("c", body));
        let contract = analyze_contract(&term);
        assert!(contract.checks.iter().any(|c| c.kind == CheckKind::Signature));
    }

    #[test]
    fn fallback_other_check() {
        let body = ite(Term::var("r"), Term::unit(), Term::Error);
        let term = Term::lam("r", Term::lam("c", body));
        let contract = analyze_contract(&term);
        assert_eq!(contract.checks.len(), 1);
        assert_eq!(contract.checks[0].kind, CheckKind::Other);
    }
}
