//! Syntactic idiom detectors.
//!
//! Each detector inspects an application spine and either returns a
//! structured result or `None`. Nothing here evaluates terms or mutates the
//! AST; detection is purely structural, with `Force`/`Delay` wrappers peeled
//! wherever the compiled output interleaves them.

use crate::{
    builtin::DefaultFunction,
    shape::{flatten_app, unwrap_force_delay},
    term::Term,
};

/// The script-context transaction field table: index in the `Constr` field
/// list of the transaction record -> Aiken field name.
pub const TX_FIELDS: [&str; 16] = [
    "inputs",
    "reference_inputs",
    "outputs",
    "fee",
    "mint",
    "certificates",
    "withdrawals",
    "validity_range",
    "extra_signatories",
    "redeemers",
    "datums",
    "id",
    "votes",
    "proposal_procedures",
    "current_treasury_amount",
    "treasury_donation",
];

/// A recognized constructor-tag check:
/// `equalsInteger(fstPair(unConstrData(x)), n)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConstrCheck<'t> {
    pub scrutinee: &'t Term,
    pub index: u64,
}

/// Detects the single constructor-tag equality check.
///
/// The integer side must be an exact literal; `equalsInteger` is symmetric so
/// both operand orders are accepted.
pub fn detect_constr_check(term: &Term) -> Option<ConstrCheck<'_>> {
    let (head, args) = flatten_app(unwrap_force_delay(term));
    if !matches!(head, Term::Builtin { fun: DefaultFunction::EqualsInteger }) || args.len() != 2 {
        return None;
    }
    for (tag_side, lit_side) in [(args[0], args[1]), (args[1], args[0])] {
        if let Some(index) = tag_side_index(tag_side)
            && let Some(n) = lit_side.as_integer()
            && let Ok(index_value) = u64::try_from(n.clone())
        {
            return Some(ConstrCheck {
                scrutinee: index,
                index: index_value,
            });
        }
    }
    None
}

/// Matches `fstPair(unConstrData(x))` and returns `x`.
fn tag_side_index(term: &Term) -> Option<&Term> {
    let (head, args) = flatten_app(unwrap_force_delay(term));
    if !matches!(head, Term::Builtin { fun: DefaultFunction::FstPair }) || args.len() != 1 {
        return None;
    }
    let (inner_head, inner_args) = flatten_app(unwrap_force_delay(args[0]));
    if matches!(inner_head, Term::Builtin { fun: DefaultFunction::UnConstrData }) && inner_args.len() == 1 {
        Some(inner_args[0])
    } else {
        None
    }
}

/// A recognized positional field access:
/// `headList(tailList^k(sndPair(unConstrData(target))))`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldAccess<'t> {
    pub target: &'t Term,
    pub index: usize,
}

/// Detects positional field access into a `Constr`'s field list.
pub fn detect_field_access(term: &Term) -> Option<FieldAccess<'_>> {
    let (head, args) = flatten_app(unwrap_force_delay(term));
    if !matches!(head, Term::Builtin { fun: DefaultFunction::HeadList }) || args.len() != 1 {
        return None;
    }
    let mut index = 0usize;
    let mut current = unwrap_force_delay(args[0]);
    loop {
        let (inner_head, inner_args) = flatten_app(current);
        match inner_head {
            Term::Builtin {
                fun: DefaultFunction::TailList,
            } if inner_args.len() == 1 => {
                index += 1;
                current = unwrap_force_delay(inner_args[0]);
            }
            Term::Builtin { fun: DefaultFunction::SndPair } if inner_args.len() == 1 => {
                let (un_head, un_args) = flatten_app(unwrap_force_delay(inner_args[0]));
                if matches!(un_head, Term::Builtin { fun: DefaultFunction::UnConstrData }) && un_args.len() == 1 {
                    return Some(FieldAccess {
                        target: un_args[0],
                        index,
                    });
                }
                return None;
            }
            _ => return None,
        }
    }
}

/// Detects transaction-field access on the script-context parameter and
/// resolves it to the field name (`tx.inputs`, `tx.mint`, ...).
pub fn detect_tx_field(term: &Term, tx_param: &str) -> Option<&'static str> {
    let access = detect_field_access(term)?;
    if access.target.as_var() == Some(tx_param) {
        TX_FIELDS.get(access.index).copied()
    } else {
        None
    }
}

/// A recognized constructor-match chain over a shared scrutinee.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstructorMatch<'t> {
    pub scrutinee: &'t Term,
    /// Ordered `(constructor index, arm body)` pairs, in chain order.
    pub arms: Vec<(u64, &'t Term)>,
    /// The trailing else branch; `None` when the chain falls through to
    /// `Error` (the match is then exhaustive-by-abort and the default arm is
    /// elided).
    pub default: Option<&'t Term>,
}

/// Detects a chain of `ifThenElse(equalsInteger(fstPair(unConstrData(s)), n),
/// arm_n, rest)` steps sharing one scrutinee `s`.
///
/// Returns `None` for fewer than one arm, and for a single arm whose default
/// is a real branch (that shape reads better as a plain `if`).
pub fn detect_constructor_match(term: &Term) -> Option<ConstructorMatch<'_>> {
    let mut arms = Vec::new();
    let mut scrutinee: Option<&Term> = None;
    let mut current = unwrap_force_delay(term);
    loop {
        let step = if_then_else_parts(current);
        let Some((cond, then_branch, else_branch)) = step else { break };
        let Some(check) = detect_constr_check(cond) else { break };
        match scrutinee {
            None => scrutinee = Some(check.scrutinee),
            Some(s) if s == check.scrutinee => {}
            Some(_) => break,
        }
        arms.push((check.index, unwrap_force_delay(then_branch)));
        current = unwrap_force_delay(else_branch);
    }
    let scrutinee = scrutinee?;
    let default = match current {
        Term::Error => None,
        other => Some(other),
    };
    if arms.is_empty() || (arms.len() == 1 && default.is_some()) {
        return None;
    }
    Some(ConstructorMatch { scrutinee, arms, default })
}

/// Splits a (possibly forced) `ifThenElse` application into its three parts.
fn if_then_else_parts(term: &Term) -> Option<(&Term, &Term, &Term)> {
    let (head, args) = flatten_app(term);
    if matches!(head, Term::Builtin { fun: DefaultFunction::IfThenElse }) && args.len() == 3 {
        Some((args[0], args[1], args[2]))
    } else {
        None
    }
}

/// The connective of a boolean chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolChainKind {
    And,
    Or,
}

/// A recognized boolean chain: nested `ifThenElse` steps where one branch is
/// a constant `False` (AND) or `True` (OR).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BooleanChain<'t> {
    pub kind: BoolChainKind,
    pub operands: Vec<&'t Term>,
}

/// Detects AND/OR chains compiled as `ifThenElse` ladders.
///
/// The first step fixes the kind; AND and OR never mix within one chain.
/// `Delay` wrappers around branches are peeled. A step where both branches
/// are boolean constants is not a chain (it is a cast the post-processor
/// simplifies).
pub fn detect_boolean_chain(term: &Term) -> Option<BooleanChain<'_>> {
    let (cond, then_branch, else_branch) = if_then_else_parts(unwrap_force_delay(term))?;
    let then_branch = unwrap_force_delay(then_branch);
    let else_branch = unwrap_force_delay(else_branch);
    let kind = if else_branch.is_bool_const(false) && !then_branch.is_bool_const(true) {
        BoolChainKind::And
    } else if then_branch.is_bool_const(true) && !else_branch.is_bool_const(false) {
        BoolChainKind::Or
    } else {
        return None;
    };
    let mut operands = vec![cond];
    let continuation = match kind {
        BoolChainKind::And => then_branch,
        BoolChainKind::Or => else_branch,
    };
    extend_chain(continuation, kind, &mut operands);
    Some(BooleanChain { kind, operands })
}

fn extend_chain<'t>(term: &'t Term, kind: BoolChainKind, operands: &mut Vec<&'t Term>) {
    let term = unwrap_force_delay(term);
    if let Some((cond, then_branch, else_branch)) = if_then_else_parts(term) {
        let then_branch = unwrap_force_delay(then_branch);
        let else_branch = unwrap_force_delay(else_branch);
        let same_kind = match kind {
            BoolChainKind::And => else_branch.is_bool_const(false) && !then_branch.is_bool_const(true),
            BoolChainKind::Or => then_branch.is_bool_const(true) && !else_branch.is_bool_const(false),
        };
        if same_kind {
            operands.push(cond);
            let continuation = match kind {
                BoolChainKind::And => then_branch,
                BoolChainKind::Or => else_branch,
            };
            extend_chain(continuation, kind, operands);
            return;
        }
    }
    operands.push(term);
}
