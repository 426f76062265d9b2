//! Validator entry-shape detection.
//!
//! A compiled validator arrives in one of three outer shapes:
//!
//! * **Parameterised script** -- constants applied to the script body at
//!   deployment time. These are unwrapped into [`ScriptParameter`]s.
//! * **V3 context pattern** -- the outer lambda binds the script context and
//!   immediately cases on a `Constr 0` of utility shortcuts.
//! * **Simple lambda chain** -- the classic `datum -> redeemer -> context`
//!   prefix.
//!
//! Whatever remains after unwrapping becomes the body handed to the code
//! generator, with non-constant applied arguments re-wrapped as let-bindings
//! so they are never mistaken for deployment parameters.

use indexmap::IndexMap;

use crate::{
    builtin::DefaultFunction,
    patterns::detect_field_access,
    shape::{flatten_app, flatten_lambda_chain, unwrap_force_delay},
    term::{Constant, Term},
};

/// The purpose a validator handler runs under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptPurpose {
    Spend,
    Mint,
    Withdraw,
    Publish,
    Vote,
    Propose,
    #[default]
    Unknown,
}

impl ScriptPurpose {
    /// The handler keyword inside the validator block.
    pub fn handler_name(self) -> &'static str {
        match self {
            Self::Spend => "spend",
            Self::Mint => "mint",
            Self::Withdraw => "withdraw",
            Self::Publish => "publish",
            Self::Vote => "vote",
            Self::Propose => "propose",
            Self::Unknown => "else",
        }
    }

    /// The synthesized validator block name.
    pub fn validator_name(self) -> &'static str {
        match self {
            Self::Mint => "policy",
            _ => "script",
        }
    }

    /// The canonical handler parameter list: `(name, type)` pairs.
    pub fn canonical_params(self) -> &'static [(&'static str, &'static str)] {
        match self {
            Self::Spend => &[
                ("datum", "Option<Data>"),
                ("redeemer", "Data"),
                ("own_ref", "Data"),
                ("tx", "Data"),
            ],
            Self::Mint => &[("redeemer", "Data"), ("policy_id", "Data"), ("tx", "Data")],
            Self::Withdraw => &[("redeemer", "Data"), ("credential", "Data"), ("tx", "Data")],
            Self::Publish => &[("redeemer", "Data"), ("certificate", "Data"), ("tx", "Data")],
            Self::Vote => &[
                ("redeemer", "Data"),
                ("voter", "Data"),
                ("governance_action_id", "Data"),
                ("tx", "Data"),
            ],
            Self::Propose => &[("redeemer", "Data"), ("proposal", "Data"), ("tx", "Data")],
            Self::Unknown => &[("ctx", "Data")],
        }
    }
}

/// A constant baked into the bytecode at deployment time.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ScriptParameter {
    /// Synthesized lowercase name (`script_hash_0`, `policy_id_1`, `param_2`).
    pub name: String,
    /// The uppercase constant identifier emitted in the listing.
    pub const_name: String,
    pub value: Constant,
    /// Aiken literal rendering of the value.
    pub rendered: String,
}

/// A validator parameter bound to a primitive shortcut by the V3 context
/// pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UtilityBinding {
    /// The parameter is an alias of one builtin.
    Builtin(DefaultFunction),
    /// `fstPair . unConstrData`
    ConstrTag,
    /// `sndPair . unConstrData`
    ConstrFields,
}

/// The result of entry-shape detection.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatorEntry {
    pub purpose: ScriptPurpose,
    /// Real runtime parameter names, in source order.
    pub params: Vec<String>,
    /// Deployment-time constants, in application order.
    pub script_params: Vec<ScriptParameter>,
    /// Parameters bound to primitive shortcuts.
    pub utility_bindings: IndexMap<String, UtilityBinding>,
    /// Original parameter name -> constant identifier, for script parameters
    /// consumed by unwrapping.
    pub param_renames: Vec<(String, String)>,
    /// The handler body (let-bindings preserved).
    pub body: Term,
}

/// Detects the entry shape and extracts the validator's parameter lists.
pub fn detect_validator_entry(term: &Term) -> ValidatorEntry {
    let (script_params, param_renames, stripped) = unwrap_script_params(term);

    // helper bindings applied outside the validator lambdas move inside the
    // handler body as ordinary lets
    let (outer_lets, inner) = peel_outer_lets(&stripped);

    if let Some(mut entry) = detect_context_case(inner) {
        entry.script_params = script_params;
        entry.param_renames.extend(param_renames);
        entry.body = rewrap_lets(outer_lets, entry.body);
        tracing::debug!(purpose = ?entry.purpose, params = ?entry.params, "detected v3 context entry");
        return entry;
    }

    let (params, body) = flatten_lambda_chain(inner, 4);
    let params: Vec<String> = params.into_iter().map(str::to_owned).collect();
    let purpose = infer_purpose(&params, body);
    tracing::debug!(purpose = ?purpose, params = ?params, "detected lambda-chain entry");
    ValidatorEntry {
        purpose,
        params,
        script_params,
        utility_bindings: IndexMap::new(),
        param_renames,
        body: rewrap_lets(outer_lets, body.clone()),
    }
}

/// Peels `[(lam p inner) value]` wrappers off the front of the script. These
/// are helper bindings, not parameters; the caller re-wraps them around the
/// detected body with [`rewrap_lets`].
fn peel_outer_lets(term: &Term) -> (Vec<(String, Term)>, &Term) {
    let mut lets = Vec::new();
    let mut current = term;
    while let Term::Apply { function, argument } = current {
        let Term::Lam { param, body } = unwrap_force_delay(function) else { break };
        lets.push((param.clone(), (**argument).clone()));
        current = body;
    }
    (lets, current)
}

/// Re-wraps peeled lets (innermost-last order) around a body.
fn rewrap_lets(lets: Vec<(String, Term)>, body: Term) -> Term {
    let mut body = body;
    for (name, value) in lets.into_iter().rev() {
        body = Term::lam(name, body).apply(value);
    }
    body
}

/// Shape A: peels `[... [[body c1] c2] ...]` applications whose arguments are
/// constants, producing one [`ScriptParameter`] per argument.
///
/// Unwrapping stops at the first non-constant argument: helper bindings stay
/// as `[(lam p body) arg]` let-bindings for the generator.
fn unwrap_script_params(term: &Term) -> (Vec<ScriptParameter>, Vec<(String, String)>, Term) {
    let (head, args) = flatten_app(term);
    if args.is_empty() {
        return (Vec::new(), Vec::new(), term.clone());
    }
    let (lam_params, _) = flatten_lambda_chain(head, args.len());

    let mut script_params = Vec::new();
    let mut renames = Vec::new();
    let mut consumed = 0;
    for (i, arg) in args.iter().enumerate() {
        if i >= lam_params.len() {
            break;
        }
        let Term::Const { value } = unwrap_force_delay(arg) else { break };
        let (name, const_name) = synthesize_param_name(value, i);
        renames.push((lam_params[i].to_owned(), const_name.clone()));
        script_params.push(ScriptParameter {
            name,
            const_name,
            value: value.clone(),
            rendered: value.to_aiken(),
        });
        consumed += 1;
    }
    if consumed == 0 {
        return (Vec::new(), Vec::new(), term.clone());
    }

    // rebuild the remaining term: the lambda chain minus the consumed
    // parameters, re-applied to the remaining arguments
    let mut rest = head.clone();
    for _ in 0..consumed {
        match rest {
            Term::Lam { body, .. } => rest = *body,
            other => {
                rest = other;
                break;
            }
        }
    }
    for arg in &args[consumed..] {
        rest = rest.apply((*arg).clone());
    }
    (script_params, renames, rest)
}

/// Names a deployment constant after its shape: 28-byte hashes are script
/// hashes, 32-byte ones are policy ids.
fn synthesize_param_name(value: &Constant, index: usize) -> (String, String) {
    match value {
        Constant::ByteString(bytes) if bytes.len() == 28 => {
            (format!("script_hash_{index}"), format!("SCRIPT_HASH_{index}"))
        }
        Constant::ByteString(bytes) if bytes.len() == 32 => {
            (format!("policy_id_{index}"), format!("POLICY_ID_{index}"))
        }
        _ => (format!("param_{index}"), format!("PARAM_{index}")),
    }
}

/// Shape B: `lam ctx -> case (constr 0 u0 .. uk) [(lam a0 .. ak body)]`.
fn detect_context_case(term: &Term) -> Option<ValidatorEntry> {
    let Term::Lam { param: ctx, body } = term else { return None };
    let Term::Case { scrutinee, branches } = unwrap_force_delay(body) else {
        return None;
    };
    let Term::Constr { index: 0, args: utils } = unwrap_force_delay(scrutinee) else {
        return None;
    };
    let [branch] = branches.as_slice() else { return None };
    // the chain binds one parameter per constr field, then the real
    // runtime parameters
    let (chain_params, chain_body) = flatten_lambda_chain(branch, utils.len() + 4);
    if chain_params.len() < utils.len() {
        return None;
    }

    let mut utility_bindings = IndexMap::new();
    let mut lets: Vec<(String, Term)> = Vec::new();
    for (util, param) in utils.iter().zip(&chain_params) {
        match classify_utility(util) {
            Some(binding) => {
                utility_bindings.insert((*param).to_owned(), binding);
            }
            None => lets.push(((*param).to_owned(), util.clone())),
        }
    }

    // re-wrap non-utility fields as let-bindings around the body
    let mut body = chain_body.clone();
    for (name, value) in lets.into_iter().rev() {
        body = Term::lam(name, body).apply(value);
    }

    let leftover: Vec<String> = chain_params[utils.len()..].iter().map(|p| (*p).to_owned()).collect();
    let params = if leftover.is_empty() {
        vec![ctx.clone()]
    } else {
        leftover
    };
    let purpose = infer_purpose(&params, &body);
    Some(ValidatorEntry {
        purpose,
        params,
        script_params: Vec::new(),
        utility_bindings,
        param_renames: Vec::new(),
        body,
    })
}

/// Recognizes the shortcut a context-case field stands for.
fn classify_utility(util: &Term) -> Option<UtilityBinding> {
    match unwrap_force_delay(util) {
        Term::Builtin { fun } => Some(UtilityBinding::Builtin(*fun)),
        Term::Lam { param, body } => {
            let (head, args) = flatten_app(unwrap_force_delay(body));
            let Term::Builtin { fun } = head else { return None };
            if args.len() != 1 {
                return None;
            }
            let (inner_head, inner_args) = flatten_app(unwrap_force_delay(args[0]));
            let composed_on_param = matches!(inner_head, Term::Builtin { fun: DefaultFunction::UnConstrData })
                && inner_args.len() == 1
                && inner_args[0].as_var() == Some(param);
            match fun {
                DefaultFunction::FstPair if composed_on_param => Some(UtilityBinding::ConstrTag),
                DefaultFunction::SndPair if composed_on_param => Some(UtilityBinding::ConstrFields),
                _ if args[0].as_var() == Some(param) => Some(UtilityBinding::Builtin(*fun)),
                _ => None,
            }
        }
        _ => None,
    }
}

/// Infers the script purpose from parameter naming hints, first-parameter
/// usage, then the arity fallback table.
fn infer_purpose(params: &[String], body: &Term) -> ScriptPurpose {
    for param in params {
        let lower = param.to_lowercase();
        if lower.contains("datum") {
            return ScriptPurpose::Spend;
        }
        if lower.contains("policy") {
            return ScriptPurpose::Mint;
        }
        if lower.contains("credential") {
            return ScriptPurpose::Withdraw;
        }
        if lower.contains("cert") {
            return ScriptPurpose::Publish;
        }
        if lower.contains("voter") {
            return ScriptPurpose::Vote;
        }
        if lower.contains("proposal") {
            return ScriptPurpose::Propose;
        }
    }
    if let Some(first) = params.first()
        && first_param_is_destructured(body, first)
    {
        return ScriptPurpose::Spend;
    }
    match params.len() {
        0 => ScriptPurpose::Unknown,
        1 | 2 => ScriptPurpose::Mint,
        _ => ScriptPurpose::Spend,
    }
}

/// True when the body unwraps the first parameter with `unConstrData`
/// followed by `headList`/`sndPair` access, the signature of a datum.
fn first_param_is_destructured(term: &Term, param: &str) -> bool {
    if let Some(access) = detect_field_access(term)
        && access.target.as_var() == Some(param)
    {
        return true;
    }
    let (head, args) = flatten_app(term);
    if let Term::Builtin {
        fun: DefaultFunction::SndPair | DefaultFunction::HeadList,
    } = head
        && args.len() == 1
    {
        let (inner_head, inner_args) = flatten_app(unwrap_force_delay(args[0]));
        if matches!(inner_head, Term::Builtin { fun: DefaultFunction::UnConstrData })
            && inner_args.len() == 1
            && inner_args[0].as_var() == Some(param)
        {
            return true;
        }
    }
    match term {
        Term::Lam { param: p, body } => p != param && first_param_is_destructured(body, param),
        Term::Apply { function, argument } => {
            first_param_is_destructured(function, param) || first_param_is_destructured(argument, param)
        }
        Term::Force { inner } | Term::Delay { inner } => first_param_is_destructured(inner, param),
        Term::Case { scrutinee, branches } => {
            first_param_is_destructured(scrutinee, param)
                || branches.iter().any(|b| first_param_is_destructured(b, param))
        }
        Term::Constr { args, .. } => args.iter().any(|a| first_param_is_destructured(a, param)),
        _ => false,
    }
}
