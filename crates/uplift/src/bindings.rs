//! Let-binding classification.
//!
//! The UPLC pattern `[(lam x body) value]` is a let-binding `let x = value in
//! body`. For each such pair the analyzer decides how the generator should
//! treat references to `x`: inline the rendered value, rename it to a stable
//! semantic name, or keep it as an emitted `let`.

use ahash::AHashMap;

use crate::{
    builtin::DefaultFunction,
    patterns::{detect_constr_check, detect_field_access},
    shape::{flatten_app, has_self_call, unwrap_force_delay},
    stdlib,
    term::{Constant, Term},
};

/// How the generator treats references to a binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BindingCategory {
    /// References are replaced by a pre-rendered expression.
    Inline,
    /// References go through a stable semantic name or canonical rendering.
    Rename,
    /// The binding is emitted as a `let` and referenced by its own name.
    Keep,
}

/// The structural pattern recognized in a bound value.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BindingPattern {
    ConstantInt,
    ConstantBool,
    ConstantUnit,
    ConstantBytes,
    ConstantString,
    ConstantData,
    ConstantList,
    ConstantPair,
    /// `lam x -> x`
    Identity,
    /// `lam a b -> a(b)`
    Apply,
    /// `lam f g x -> f(g(x))`
    Compose,
    /// A bare builtin, or `lam x -> builtin(x)`.
    BuiltinWrapper(DefaultFunction),
    /// A builtin applied to fewer arguments than its arity; `bound` is the
    /// number of pre-applied arguments sitting in the value's spine.
    PartialBuiltin { fun: DefaultFunction, bound: usize },
    /// `lam x -> fstPair(unConstrData(x)) == n`
    IsConstrN(u64),
    /// `lam x -> if fstPair(unConstrData(x)) == n { .. } else { Error }`
    ExpectConstrN(u64),
    /// `lam x -> headList(tailList^k(sndPair(unConstrData(x))))`
    FieldAccessor(usize),
    /// `lam a b -> if a { b } else { False }`
    BooleanAnd,
    /// `lam a b -> if a { True } else { b }`
    BooleanOr,
    /// Recursion-like application of an unresolved head to a lambda.
    ListFold,
    /// The fixpoint maker `lam f -> (lam x -> f (x x)) (lam x -> f (x x))`.
    ZCombinator,
    Unknown,
}

/// The result of analyzing one `let name = value` pair.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ResolvedBinding {
    pub name: String,
    pub value: Term,
    pub category: BindingCategory,
    pub pattern: BindingPattern,
    /// A stable short name for `Rename` bindings (`is_constr_3`, `add`, `eq_0`).
    pub semantic_name: Option<String>,
    /// A pre-rendered Aiken expression for `Inline` bindings.
    pub inline_value: Option<String>,
}

/// Classifies a single let-bound value.
///
/// Each lambda pattern test matches on the exact structural shape; a partial
/// match falls through to the next test rather than misclassifying.
pub fn analyze_binding(name: &str, value: &Term) -> ResolvedBinding {
    let peeled = unwrap_force_delay(value);
    let mut binding = ResolvedBinding {
        name: name.to_owned(),
        value: value.clone(),
        category: BindingCategory::Keep,
        pattern: BindingPattern::Unknown,
        semantic_name: None,
        inline_value: None,
    };
    match peeled {
        Term::Const { value: constant } => {
            binding.category = BindingCategory::Inline;
            binding.pattern = constant_pattern(constant);
            binding.inline_value = Some(constant.to_aiken());
        }
        Term::Builtin { fun } => {
            binding.category = BindingCategory::Rename;
            binding.pattern = BindingPattern::BuiltinWrapper(*fun);
            binding.semantic_name = Some(stdlib::semantic_alias(*fun).to_owned());
        }
        Term::Lam { .. } => classify_lambda(peeled, &mut binding),
        Term::Apply { .. } => classify_application(peeled, &mut binding),
        _ => {}
    }
    binding
}

fn constant_pattern(constant: &Constant) -> BindingPattern {
    match constant {
        Constant::Integer(_) => BindingPattern::ConstantInt,
        Constant::Bool(_) => BindingPattern::ConstantBool,
        Constant::Unit => BindingPattern::ConstantUnit,
        Constant::ByteString(_) => BindingPattern::ConstantBytes,
        Constant::String(_) => BindingPattern::ConstantString,
        Constant::Data(_) => BindingPattern::ConstantData,
        Constant::List(_) => BindingPattern::ConstantList,
        Constant::Pair(..) => BindingPattern::ConstantPair,
    }
}

fn classify_lambda(term: &Term, binding: &mut ResolvedBinding) {
    let Term::Lam { param, body } = term else { return };
    let body_peeled = unwrap_force_delay(body);

    if is_z_combinator(param, body_peeled) {
        binding.pattern = BindingPattern::ZCombinator;
        return;
    }

    // lam x -> x
    if body_peeled.as_var() == Some(param) {
        binding.category = BindingCategory::Inline;
        binding.pattern = BindingPattern::Identity;
        binding.inline_value = Some(format!("fn({param}) {{ {param} }}"));
        return;
    }

    // lam x -> builtin(x)
    let (head, args) = flatten_app(body_peeled);
    if let Term::Builtin { fun } = head
        && args.len() == 1
        && args[0].as_var() == Some(param)
    {
        binding.category = BindingCategory::Rename;
        binding.pattern = BindingPattern::BuiltinWrapper(*fun);
        binding.semantic_name = Some(stdlib::semantic_alias(*fun).to_owned());
        return;
    }

    // lam x -> fstPair(unConstrData(x)) == n
    if let Some(check) = detect_constr_check(body_peeled)
        && check.scrutinee.as_var() == Some(param)
    {
        binding.category = BindingCategory::Rename;
        binding.pattern = BindingPattern::IsConstrN(check.index);
        binding.semantic_name = Some(format!("is_constr_{}", check.index));
        return;
    }

    // lam x -> if fstPair(unConstrData(x)) == n { .. } else { Error }
    if let Term::Apply { .. } | Term::Force { .. } = body_peeled {
        let (ite_head, ite_args) = flatten_app(body_peeled);
        if matches!(ite_head, Term::Builtin { fun: DefaultFunction::IfThenElse })
            && ite_args.len() == 3
            && matches!(unwrap_force_delay(ite_args[2]), Term::Error)
            && let Some(check) = detect_constr_check(ite_args[0])
            && check.scrutinee.as_var() == Some(param)
        {
            binding.category = BindingCategory::Rename;
            binding.pattern = BindingPattern::ExpectConstrN(check.index);
            binding.semantic_name = Some(format!("expect_constr_{}", check.index));
            return;
        }
    }

    // lam x -> headList(tailList^k(sndPair(unConstrData(x))))
    if let Some(access) = detect_field_access(body_peeled)
        && access.target.as_var() == Some(param)
    {
        binding.category = BindingCategory::Rename;
        binding.pattern = BindingPattern::FieldAccessor(access.index);
        binding.semantic_name = Some(format!("get_field_{}", access.index));
        return;
    }

    // two-parameter patterns
    if let Term::Lam { param: second, body: inner } = body_peeled {
        let inner_peeled = unwrap_force_delay(inner);
        let (inner_head, inner_args) = flatten_app(inner_peeled);

        // lam a b -> a(b)
        if inner_head.as_var() == Some(param)
            && inner_args.len() == 1
            && inner_args[0].as_var() == Some(second)
        {
            binding.category = BindingCategory::Inline;
            binding.pattern = BindingPattern::Apply;
            binding.inline_value = Some(format!("fn({param}, {second}) {{ {param}({second}) }}"));
            return;
        }

        // lam a b -> if a { b } else { False } / if a { True } else { b }
        if matches!(inner_head, Term::Builtin { fun: DefaultFunction::IfThenElse }) && inner_args.len() == 3 {
            let cond = unwrap_force_delay(inner_args[0]);
            let then_branch = unwrap_force_delay(inner_args[1]);
            let else_branch = unwrap_force_delay(inner_args[2]);
            if cond.as_var() == Some(param) {
                if then_branch.as_var() == Some(second) && else_branch.is_bool_const(false) {
                    binding.category = BindingCategory::Rename;
                    binding.pattern = BindingPattern::BooleanAnd;
                    binding.semantic_name = Some("and".to_owned());
                    return;
                }
                if then_branch.is_bool_const(true) && else_branch.as_var() == Some(second) {
                    binding.category = BindingCategory::Rename;
                    binding.pattern = BindingPattern::BooleanOr;
                    binding.semantic_name = Some("or".to_owned());
                    return;
                }
            }
        }

        // lam f g x -> f(g(x))
        if let Term::Lam { param: third, body: innermost } = inner_peeled {
            let (comp_head, comp_args) = flatten_app(unwrap_force_delay(innermost));
            if comp_head.as_var() == Some(param) && comp_args.len() == 1 {
                let (g_head, g_args) = flatten_app(unwrap_force_delay(comp_args[0]));
                if g_head.as_var() == Some(second)
                    && g_args.len() == 1
                    && g_args[0].as_var() == Some(third)
                {
                    binding.category = BindingCategory::Rename;
                    binding.pattern = BindingPattern::Compose;
                    binding.semantic_name = Some("compose".to_owned());
                    return;
                }
            }
        }
    }
}

fn classify_application(term: &Term, binding: &mut ResolvedBinding) {
    let (head, args) = flatten_app(term);
    match head {
        Term::Builtin { fun } if args.len() < fun.arity() => {
            binding.category = BindingCategory::Rename;
            binding.pattern = BindingPattern::PartialBuiltin {
                fun: *fun,
                bound: args.len(),
            };
            binding.semantic_name = specialized_partial_name(*fun, &args);
        }
        Term::Var { .. } if args.first().is_some_and(|a| matches!(unwrap_force_delay(a), Term::Lam { .. })) => {
            // recursion-like: an unresolved head applied to a lambda
            binding.pattern = BindingPattern::ListFold;
        }
        _ => {}
    }
}

/// Specialized short names for a builtin partially applied to a small integer
/// literal: `equalsInteger 0` -> `eq_0`, `addInteger 2` -> `add_2`,
/// `addInteger -1` -> `sub_1`.
fn specialized_partial_name(fun: DefaultFunction, args: &[&Term]) -> Option<String> {
    let first = args.first()?;
    let n = first.as_integer()?;
    match fun {
        DefaultFunction::EqualsInteger => Some(format!("eq_{n}")),
        DefaultFunction::AddInteger => {
            if n.sign() == num_bigint::Sign::Minus {
                Some(format!("sub_{}", n.magnitude()))
            } else {
                Some(format!("add_{n}"))
            }
        }
        _ => None,
    }
}

/// True for both the lazy and strict fixpoint-maker shapes:
/// `lam f -> (lam x -> f (x x)) (lam x -> f (x x))`.
fn is_z_combinator(param: &str, body: &Term) -> bool {
    let (head, args) = flatten_app(body);
    if args.len() != 1 {
        return false;
    }
    let head = unwrap_force_delay(head);
    let arg = unwrap_force_delay(args[0]);
    is_self_apply_arm(param, head) && is_self_apply_arm(param, arg)
}

/// `lam x -> ... f (x x) ...` where `f` is the combinator's parameter.
fn is_self_apply_arm(fun_param: &str, term: &Term) -> bool {
    if let Term::Lam { param, body } = term {
        has_self_call(body, param) || contains_self_apply(body, param, fun_param)
    } else {
        false
    }
}

fn contains_self_apply(term: &Term, x: &str, f: &str) -> bool {
    let (head, args) = flatten_app(term);
    if head.as_var() == Some(f)
        && args.iter().any(|a| {
            let (inner_head, inner_args) = flatten_app(unwrap_force_delay(a));
            inner_head.as_var() == Some(x) && inner_args.len() == 1 && inner_args[0].as_var() == Some(x)
        })
    {
        return true;
    }
    match term {
        Term::Lam { param, body } => param != x && param != f && contains_self_apply(body, x, f),
        Term::Apply { function, argument } => {
            contains_self_apply(function, x, f) || contains_self_apply(argument, x, f)
        }
        Term::Force { inner } | Term::Delay { inner } => contains_self_apply(inner, x, f),
        _ => false,
    }
}

/// A stack-structured name -> [`ResolvedBinding`] environment.
///
/// Pushed on entry to a lexical scope, popped on exit; lookups see the
/// nearest enclosing definition. The stack is owned per generation run and
/// never shared across call boundaries.
#[derive(Debug, Clone, Default)]
pub struct BindingEnv {
    scopes: Vec<AHashMap<String, ResolvedBinding>>,
}

impl BindingEnv {
    pub fn new() -> Self {
        Self {
            scopes: vec![AHashMap::new()],
        }
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(AHashMap::new());
    }

    pub fn pop_scope(&mut self) {
        // the root scope stays
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    pub fn insert(&mut self, binding: ResolvedBinding) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(binding.name.clone(), binding);
        }
    }

    pub fn lookup(&self, name: &str) -> Option<&ResolvedBinding> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn constr_check_lam(n: i64) -> Term {
        Term::lam(
            "x",
            Term::builtin(DefaultFunction::EqualsInteger)
                .apply(
                    Term::builtin(DefaultFunction::FstPair)
                        .force()
                        .force()
                        .apply(Term::builtin(DefaultFunction::UnConstrData).apply(Term::var("x"))),
                )
                .apply(Term::integer(n)),
        )
    }

    #[test]
    fn constants_inline() {
        let b = analyze_binding("n", &Term::integer(42));
        assert_eq!(b.category, BindingCategory::Inline);
        assert_eq!(b.pattern, BindingPattern::ConstantInt);
        assert_eq!(b.inline_value.as_deref(), Some("42"));

        let b = analyze_binding("u", &Term::unit().delay());
        assert_eq!(b.pattern, BindingPattern::ConstantUnit);
        assert_eq!(b.inline_value.as_deref(), Some("Void"));

        let b = analyze_binding("s", &Term::string("hello"));
        assert_eq!(b.category, BindingCategory::Inline);
        assert_eq!(b.pattern, BindingPattern::ConstantString);
    }

    #[test]
    fn bare_builtin_renames_to_alias() {
        let b = analyze_binding("f", &Term::builtin(DefaultFunction::AddInteger));
        assert_eq!(b.category, BindingCategory::Rename);
        assert_eq!(b.pattern, BindingPattern::BuiltinWrapper(DefaultFunction::AddInteger));
        assert_eq!(b.semantic_name.as_deref(), Some("add"));
    }

    #[test]
    fn identity_lambda_inlines() {
        let b = analyze_binding("id", &Term::lam("x", Term::var("x")));
        assert_eq!(b.category, BindingCategory::Inline);
        assert_eq!(b.pattern, BindingPattern::Identity);
    }

    #[test]
    fn builtin_wrapper_lambda() {
        let b = analyze_binding(
            "h",
            &Term::lam("x", Term::builtin(DefaultFunction::HeadList).force().apply(Term::var("x"))),
        );
        assert_eq!(b.category, BindingCategory::Rename);
        assert_eq!(b.pattern, BindingPattern::BuiltinWrapper(DefaultFunction::HeadList));
        assert_eq!(b.semantic_name.as_deref(), Some("head"));
    }

    #[test]
    fn is_constr_n() {
        let b = analyze_binding("p", &constr_check_lam(3));
        assert_eq!(b.category, BindingCategory::Rename);
        assert_eq!(b.pattern, BindingPattern::IsConstrN(3));
        assert_eq!(b.semantic_name.as_deref(), Some("is_constr_3"));
    }

    #[test]
    fn field_accessor() {
        let body = Term::builtin(DefaultFunction::HeadList).force().apply(
            Term::builtin(DefaultFunction::TailList).force().apply(
                Term::builtin(DefaultFunction::TailList).force().apply(
                    Term::builtin(DefaultFunction::SndPair)
                        .force()
                        .force()
                        .apply(Term::builtin(DefaultFunction::UnConstrData).apply(Term::var("x"))),
                ),
            ),
        );
        let b = analyze_binding("acc", &Term::lam("x", body));
        assert_eq!(b.pattern, BindingPattern::FieldAccessor(2));
        assert_eq!(b.semantic_name.as_deref(), Some("get_field_2"));
    }

    #[test]
    fn two_param_apply() {
        let b = analyze_binding("app", &Term::lam("a", Term::lam("b", Term::var("a").apply(Term::var("b")))));
        assert_eq!(b.category, BindingCategory::Inline);
        assert_eq!(b.pattern, BindingPattern::Apply);
    }

    #[test]
    fn boolean_connectives() {
        let and = Term::lam(
            "a",
            Term::lam(
                "b",
                Term::builtin(DefaultFunction::IfThenElse)
                    .force()
                    .apply(Term::var("a"))
                    .apply(Term::var("b"))
                    .apply(Term::bool(false)),
            ),
        );
        let b = analyze_binding("and", &and);
        assert_eq!(b.pattern, BindingPattern::BooleanAnd);
        assert_eq!(b.semantic_name.as_deref(), Some("and"));

        let or = Term::lam(
            "a",
            Term::lam(
                "b",
                Term::builtin(DefaultFunction::IfThenElse)
                    .force()
                    .apply(Term::var("a"))
                    .apply(Term::bool(true))
                    .apply(Term::var("b")),
            ),
        );
        let b = analyze_binding("or", &or);
        assert_eq!(b.pattern, BindingPattern::BooleanOr);
    }

    #[test]
    fn partial_builtin_specialized_names() {
        let eq0 = Term::builtin(DefaultFunction::EqualsInteger).apply(Term::integer(0));
        let b = analyze_binding("e", &eq0);
        assert_eq!(b.category, BindingCategory::Rename);
        assert_eq!(
            b.pattern,
            BindingPattern::PartialBuiltin {
                fun: DefaultFunction::EqualsInteger,
                bound: 1
            }
        );
        assert_eq!(b.semantic_name.as_deref(), Some("eq_0"));

        let add2 = Term::builtin(DefaultFunction::AddInteger).apply(Term::integer(2));
        assert_eq!(analyze_binding("a", &add2).semantic_name.as_deref(), Some("add_2"));

        let sub3 = Term::builtin(DefaultFunction::AddInteger).apply(Term::integer(-3));
        assert_eq!(analyze_binding("s", &sub3).semantic_name.as_deref(), Some("sub_3"));
    }

    #[test]
    fn z_combinator_shape() {
        // lam f -> (lam x -> f (x x)) (lam x -> f (x x))
        let arm = || {
            Term::lam(
                "x",
                Term::var("f").apply(Term::var("x").apply(Term::var("x"))),
            )
        };
        let z = Term::lam("f", arm().apply(arm()));
        let b = analyze_binding("z", &z);
        assert_eq!(b.pattern, BindingPattern::ZCombinator);
        assert_eq!(b.category, BindingCategory::Keep);
    }

    #[test]
    fn unknown_keeps() {
        let b = analyze_binding("k", &Term::var("y").apply(Term::var("z")));
        assert_eq!(b.category, BindingCategory::Keep);
        assert_eq!(b.pattern, BindingPattern::Unknown);
    }

    #[test]
    fn analysis_is_idempotent() {
        let value = constr_check_lam(1);
        let first = analyze_binding("p", &value);
        let second = analyze_binding("p", &first.value);
        assert_eq!(first, second);
    }

    #[test]
    fn env_lookup_sees_nearest_scope() {
        let mut env = BindingEnv::new();
        env.insert(analyze_binding("x", &Term::integer(1)));
        env.push_scope();
        env.insert(analyze_binding("x", &Term::integer(2)));
        assert_eq!(env.lookup("x").unwrap().inline_value.as_deref(), Some("2"));
        env.pop_scope();
        assert_eq!(env.lookup("x").unwrap().inline_value.as_deref(), Some("1"));
        assert!(env.lookup("missing").is_none());
    }
}
