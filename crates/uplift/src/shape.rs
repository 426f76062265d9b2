//! Pure structural helpers over [`Term`] trees.
//!
//! Everything here is total, panic-free, and linear in the size of the
//! subterm it inspects. These are the primitives every analysis pass and the
//! code generator build on: spine flattening, lambda-chain flattening, free
//! variable collection (with lexical shadowing), and the self-recursion
//! probes used by the hoisting machinery.

use ahash::AHashSet;
use smallvec::SmallVec;

use crate::{builtin::DefaultFunction, term::Term};

/// Default bound for [`flatten_lambda_chain`].
pub const MAX_LAMBDA_CHAIN: usize = 6;

/// Strips any outer `Force`/`Delay` layers.
pub fn unwrap_force_delay(term: &Term) -> &Term {
    let mut current = term;
    loop {
        match current {
            Term::Force { inner } | Term::Delay { inner } => current = inner,
            _ => return current,
        }
    }
}

/// Flattens an application spine.
///
/// For `[[[f a] b] c]` returns `(f, [a, b, c])`, with `Force` layers peeled
/// off the head. A non-application term flattens to itself with no arguments.
pub fn flatten_app(term: &Term) -> (&Term, SmallVec<[&Term; 4]>) {
    let mut args: SmallVec<[&Term; 4]> = SmallVec::new();
    let mut current = term;
    loop {
        match current {
            Term::Apply { function, argument } => {
                args.push(argument);
                current = function;
            }
            // forces interleave with applications when a builtin is
            // instantiated after partial application; a Delay in head
            // position is a suspension and stops the spine
            Term::Force { inner } => current = inner,
            _ => break,
        }
    }
    args.reverse();
    (current, args)
}

/// Flattens a chain of nested single-parameter lambdas, bounded by `max`.
///
/// For `(lam a (lam b (lam c body)))` with `max >= 3` returns
/// `(["a", "b", "c"], body)`.
pub fn flatten_lambda_chain(term: &Term, max: usize) -> (Vec<&str>, &Term) {
    let mut params = Vec::new();
    let mut current = term;
    while params.len() < max {
        match current {
            Term::Lam { param, body } => {
                params.push(param.as_str());
                current = body;
            }
            _ => break,
        }
    }
    (params, current)
}

/// Collects the free variables of `term`, respecting lexical shadowing.
///
/// Names in `bound` are treated as already bound by an enclosing scope.
pub fn collect_free_vars(term: &Term, bound: &AHashSet<String>) -> AHashSet<String> {
    let mut free = AHashSet::new();
    let mut scope: Vec<&str> = bound.iter().map(String::as_str).collect();
    collect_free_into(term, &mut scope, &mut free);
    free
}

fn collect_free_into<'t>(term: &'t Term, scope: &mut Vec<&'t str>, free: &mut AHashSet<String>) {
    match term {
        Term::Var { name } => {
            if !scope.iter().any(|bound| bound == name) {
                free.insert(name.clone());
            }
        }
        Term::Lam { param, body } => {
            scope.push(param);
            collect_free_into(body, scope, free);
            scope.pop();
        }
        Term::Apply { function, argument } => {
            collect_free_into(function, scope, free);
            collect_free_into(argument, scope, free);
        }
        Term::Force { inner } | Term::Delay { inner } => collect_free_into(inner, scope, free),
        Term::Constr { args, .. } => {
            for arg in args {
                collect_free_into(arg, scope, free);
            }
        }
        Term::Case { scrutinee, branches } => {
            collect_free_into(scrutinee, scope, free);
            for branch in branches {
                collect_free_into(branch, scope, free);
            }
        }
        Term::Builtin { .. } | Term::Const { .. } | Term::Error => {}
    }
}

/// True when `term` references `name` as a free variable, same shadowing rule
/// as [`collect_free_vars`].
pub fn references_var(term: &Term, name: &str) -> bool {
    match term {
        Term::Var { name: n } => n == name,
        Term::Lam { param, body } => param != name && references_var(body, name),
        Term::Apply { function, argument } => references_var(function, name) || references_var(argument, name),
        Term::Force { inner } | Term::Delay { inner } => references_var(inner, name),
        Term::Constr { args, .. } => args.iter().any(|arg| references_var(arg, name)),
        Term::Case { scrutinee, branches } => {
            references_var(scrutinee, name) || branches.iter().any(|branch| references_var(branch, name))
        }
        Term::Builtin { .. } | Term::Const { .. } | Term::Error => false,
    }
}

/// True when `term` contains the explicit self-application `self(self, ...)`,
/// i.e. an application whose head is `Var(self)` and whose first argument is
/// `Var(self)` again.
pub fn has_self_call(term: &Term, self_name: &str) -> bool {
    if let Term::Apply { .. } = term {
        let (head, args) = flatten_app(term);
        if head.as_var() == Some(self_name) && args.first().is_some_and(|a| a.as_var() == Some(self_name)) {
            return true;
        }
    }
    match term {
        Term::Lam { param, body } => param != self_name && has_self_call(body, self_name),
        Term::Apply { function, argument } => {
            has_self_call(function, self_name) || has_self_call(argument, self_name)
        }
        Term::Force { inner } | Term::Delay { inner } => has_self_call(inner, self_name),
        Term::Constr { args, .. } => args.iter().any(|arg| has_self_call(arg, self_name)),
        Term::Case { scrutinee, branches } => {
            has_self_call(scrutinee, self_name) || branches.iter().any(|branch| has_self_call(branch, self_name))
        }
        _ => false,
    }
}

/// If `term` (after peeling forces) is a builtin or an application headed by
/// one, returns that builtin.
pub fn get_builtin_head(term: &Term) -> Option<DefaultFunction> {
    let (head, _) = flatten_app(unwrap_force_delay(term));
    match head {
        Term::Builtin { fun } => Some(*fun),
        _ => None,
    }
}

/// True for the self-recursive shape `(lam self (lam _ body))` where `body`
/// calls `self(self, ...)`.
pub fn is_self_recursive_lambda(term: &Term) -> bool {
    let term = unwrap_force_delay(term);
    if let Term::Lam { param: self_name, body } = term
        && let Term::Lam { .. } = unwrap_force_delay(body)
    {
        return has_self_call(body, self_name);
    }
    false
}

/// True for a phantom type-instantiation lambda: a single-parameter lambda
/// whose body just applies a force-polymorphic builtin to that parameter.
///
/// These appear as leading arguments to force-polymorphic builtins in
/// compiled output and carry no meaning in surface syntax.
pub fn is_phantom_lambda(term: &Term) -> bool {
    let term = unwrap_force_delay(term);
    if let Term::Lam { param, body } = term {
        let (head, args) = flatten_app(unwrap_force_delay(body));
        if let Term::Builtin { fun } = head
            && fun.is_force_polymorphic()
            && args.len() == 1
            && args[0].as_var() == Some(param)
        {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::builtin::DefaultFunction;

    fn sample_spine() -> Term {
        Term::builtin(DefaultFunction::AddInteger)
            .force()
            .apply(Term::var("a"))
            .apply(Term::var("b"))
    }

    #[test]
    fn unwraps_nested_force_delay() {
        let term = Term::var("x").force().delay().force();
        assert_eq!(unwrap_force_delay(&term), &Term::var("x"));
    }

    #[test]
    fn flattens_application_spines() {
        let spine = sample_spine();
        let (head, args) = flatten_app(&spine);
        assert_eq!(head, &Term::builtin(DefaultFunction::AddInteger));
        assert_eq!(args.len(), 2);
        assert_eq!(args[0], &Term::var("a"));
        assert_eq!(args[1], &Term::var("b"));
    }

    #[test]
    fn flatten_app_on_non_application() {
        let term = Term::var("x");
        let (head, args) = flatten_app(&term);
        assert_eq!(head, &term);
        assert!(args.is_empty());
    }

    #[test]
    fn flatten_app_stops_at_delayed_head() {
        // [(delay f) a]: the suspension is not merged into the spine
        let delayed = Term::var("f").delay();
        let term = delayed.clone().apply(Term::var("a"));
        let (head, args) = flatten_app(&term);
        assert_eq!(head, &delayed);
        assert_eq!(args.len(), 1);
    }

    #[test]
    fn flattens_lambda_chains_bounded() {
        let term = Term::lam("a", Term::lam("b", Term::lam("c", Term::var("a"))));
        let (params, body) = flatten_lambda_chain(&term, MAX_LAMBDA_CHAIN);
        assert_eq!(params, vec!["a", "b", "c"]);
        assert_eq!(body, &Term::var("a"));

        let (params, _) = flatten_lambda_chain(&term, 2);
        assert_eq!(params, vec!["a", "b"]);
    }

    #[test]
    fn free_vars_respect_shadowing() {
        // (lam x [x y (lam y y)]) -- only y is free
        let term = Term::lam(
            "x",
            Term::var("x")
                .apply(Term::var("y"))
                .apply(Term::lam("y", Term::var("y"))),
        );
        let free = collect_free_vars(&term, &AHashSet::new());
        assert_eq!(free.len(), 1);
        assert!(free.contains("y"));
    }

    #[test]
    fn references_var_sees_through_shadowing() {
        let shadowed = Term::lam("x", Term::var("x"));
        assert!(!references_var(&shadowed, "x"));
        assert!(references_var(&Term::lam("y", Term::var("x")), "x"));
    }

    #[test]
    fn detects_self_calls() {
        // self(self, xs)
        let call = Term::var("self").apply(Term::var("self")).apply(Term::var("xs"));
        assert!(has_self_call(&call, "self"));
        assert!(!has_self_call(&call, "other"));
        // self(xs) alone is not a self call
        let plain = Term::var("self").apply(Term::var("xs"));
        assert!(!has_self_call(&plain, "self"));
    }

    #[test]
    fn self_recursive_lambda_shape() {
        let body = Term::var("self").apply(Term::var("self")).apply(Term::var("xs"));
        let rec = Term::lam("self", Term::lam("xs", body));
        assert!(is_self_recursive_lambda(&rec));

        let non_rec = Term::lam("self", Term::lam("xs", Term::var("xs")));
        assert!(!is_self_recursive_lambda(&non_rec));
    }

    #[test]
    fn builtin_head_through_forces() {
        assert_eq!(get_builtin_head(&sample_spine()), Some(DefaultFunction::AddInteger));
        assert_eq!(get_builtin_head(&Term::var("x")), None);
    }

    #[test]
    fn phantom_lambda_detection() {
        // (lam p [(force (force fstPair)) p])
        let phantom = Term::lam(
            "p",
            Term::builtin(DefaultFunction::FstPair).force().force().apply(Term::var("p")),
        );
        assert!(is_phantom_lambda(&phantom));

        // addInteger is not force-polymorphic
        let not_phantom = Term::lam("p", Term::builtin(DefaultFunction::AddInteger).apply(Term::var("p")));
        assert!(!is_phantom_lambda(&not_phantom));
    }
}
