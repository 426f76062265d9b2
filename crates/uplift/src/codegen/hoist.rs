//! Self-recursive function hoisting.
//!
//! UPLC encodes recursion by explicit self-passing (`f(f, ...)`) or through
//! fixpoint combinators. Both flatten to the same surface form: a
//! module-level `fn rec_{k}` whose parameter list is the captured free
//! variables followed by the real arguments. A hoist is refused (returning
//! `None`) when a free variable cannot be resolved at the hoist site; the
//! caller then falls back to inline emission with type annotations.

use ahash::AHashSet;

use crate::{
    bindings::BindingCategory,
    shape::{MAX_LAMBDA_CHAIN, collect_free_vars, flatten_lambda_chain, unwrap_force_delay},
    term::Term,
};

use super::{Ctx, Generator, indent_tail};

/// A hoisted self-recursive function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct HoistedFn {
    pub fn_name: String,
    /// Captured free variables, passed as leading arguments at every call.
    pub captured: Vec<String>,
    /// The number of real (non-captured) parameters.
    pub arity: usize,
}

impl HoistedFn {
    /// Renders a call, supplying the captured variables ahead of `args`.
    /// Under-saturated calls eta-expand so every emitted call carries exactly
    /// `captured.len() + arity` arguments.
    pub fn call_text(&self, args: &[String]) -> String {
        let mut all: Vec<String> = self.captured.clone();
        all.extend(args.iter().cloned());
        if args.len() >= self.arity {
            format!("{}({})", self.fn_name, all.join(", "))
        } else {
            let etas: Vec<String> = (0..self.arity - args.len()).map(|i| format!("_eta_{i}")).collect();
            all.extend(etas.iter().cloned());
            format!("fn({}) {{ {}({}) }}", etas.join(", "), self.fn_name, all.join(", "))
        }
    }
}

impl Generator {
    /// Attempts to hoist the self-recursive lambda `lam self -> lam a_1 ..
    /// a_k -> body` to a module-level function.
    ///
    /// `bound_name` is only used for diagnostics; registering the hoist
    /// under a let-binding name is the caller's decision. The inner self
    /// parameter is mapped for the duration of body generation and restored
    /// afterwards, so a failed or nested hoist never leaves the shared
    /// tables inconsistent.
    pub(crate) fn try_hoist(&mut self, bound_name: &str, lam: &Term, ctx: &Ctx) -> Option<HoistedFn> {
        let lam = unwrap_force_delay(lam);
        let Term::Lam { param: self_param, body: rest } = lam else {
            return None;
        };
        let (params, body) = flatten_lambda_chain(rest, MAX_LAMBDA_CHAIN);
        if params.is_empty() {
            return None;
        }
        let arity = params.len();

        let mut bound: AHashSet<String> = AHashSet::new();
        bound.insert(self_param.clone());
        for p in &params {
            bound.insert((*p).to_owned());
        }
        let free = collect_free_vars(body, &bound);

        let mut captured: Vec<String> = Vec::new();
        for var in &free {
            // utility bindings resolve through their module-level shortcut;
            // capturing them would introduce function-typed parameters
            if self.utility_bindings.contains_key(var) {
                continue;
            }
            // canonical parameters and script constants are globally visible
            if self.renames.contains_key(var) {
                continue;
            }
            if let Some(other) = self.shared.recursive.get(var) {
                // a captured hoisted function contributes its own captures
                captured.extend(other.captured.iter().cloned());
                continue;
            }
            if ctx.params.iter().any(|p| p == var) || ctx.emitted.contains(var) || ctx.pending_keep.contains(var) {
                captured.push(var.clone());
                continue;
            }
            if ctx.substitutions.contains_key(var) {
                continue;
            }
            if let Some(binding) = self.env.lookup(var) {
                match binding.category {
                    // inlineable bindings expand at their use sites
                    BindingCategory::Inline | BindingCategory::Rename => continue,
                    BindingCategory::Keep => {
                        captured.push(var.clone());
                        continue;
                    }
                }
            }
            tracing::debug!(binding = bound_name, free_var = %var, "hoist refused: unresolvable free variable");
            return None;
        }
        captured.sort_unstable();
        captured.dedup();

        let fn_name = format!("rec_{}", self.shared.hoist_counter);
        self.shared.hoist_counter += 1;
        let info = HoistedFn {
            fn_name: fn_name.clone(),
            captured: captured.clone(),
            arity,
        };

        // map the inner self parameter only while the body is generated
        let self_param = self_param.clone();
        let saved = self.shared.recursive.insert(self_param.clone(), info.clone());

        let mut inner = ctx.with_isolated_emitted();
        inner.params = captured.clone();
        inner.params.extend(params.iter().map(|p| (*p).to_owned()));
        let body = body.clone();
        let fn_params = inner.params.clone();
        let body_expr = self.expr(&body, &inner);

        match saved {
            Some(previous) => {
                self.shared.recursive.insert(self_param, previous);
            }
            None => {
                self.shared.recursive.remove(&self_param);
            }
        }

        let text = format!(
            "fn {fn_name}({}) -> Data {{\n  {}\n}}",
            fn_params.join(", "),
            indent_tail(&body_expr, 2)
        );
        tracing::debug!(binding = bound_name, function = %fn_name, captured = ?captured, "hoisted recursive function");
        self.shared.hoisted_texts.push(text);
        Some(info)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::builtin::DefaultFunction;

    fn generator() -> Generator {
        Generator::new(indexmap::IndexMap::new(), ahash::AHashMap::new(), None)
    }

    /// lam self -> lam xs ->
    ///   if nullList(xs) { 0 } else { addInteger(unIData(headList(xs)), self(self, tailList(xs))) }
    fn sum_fold() -> Term {
        let head = Term::builtin(DefaultFunction::UnIData)
            .apply(Term::builtin(DefaultFunction::HeadList).force().apply(Term::var("xs")));
        let recurse = Term::var("self")
            .apply(Term::var("self"))
            .apply(Term::builtin(DefaultFunction::TailList).force().apply(Term::var("xs")));
        let body = Term::builtin(DefaultFunction::IfThenElse)
            .force()
            .apply(Term::builtin(DefaultFunction::NullList).force().apply(Term::var("xs")))
            .apply(Term::integer(0).delay())
            .apply(Term::builtin(DefaultFunction::AddInteger).apply(head).apply(recurse).delay())
            .force();
        Term::lam("self", Term::lam("xs", body))
    }

    #[test]
    fn hoists_simple_fold() {
        let mut generator = generator();
        let ctx = Ctx::default();
        let hoisted = generator.try_hoist("fold", &sum_fold(), &ctx).unwrap();
        assert_eq!(hoisted.fn_name, "rec_0");
        assert_eq!(hoisted.arity, 1);
        assert!(hoisted.captured.is_empty());

        let text = &generator.shared.hoisted_texts[0];
        assert!(text.starts_with("fn rec_0(xs) -> Data {"), "text: {text}");
        assert!(text.contains("builtin.null_list(xs)"), "text: {text}");
        assert!(text.contains("rec_0(builtin.tail_list(xs))"), "text: {text}");
        assert!(text.contains("builtin.un_i_data(builtin.head_list(xs)) + "), "text: {text}");
    }

    #[test]
    fn captures_outer_parameters() {
        // lam self -> lam xs -> addInteger(outer, self(self, xs))
        let body = Term::builtin(DefaultFunction::AddInteger)
            .apply(Term::var("outer"))
            .apply(Term::var("self").apply(Term::var("self")).apply(Term::var("xs")));
        let lam = Term::lam("self", Term::lam("xs", body));
        let mut generator = generator();
        let mut ctx = Ctx::default();
        ctx.params.push("outer".to_owned());
        let hoisted = generator.try_hoist("f", &lam, &ctx).unwrap();
        assert_eq!(hoisted.captured, vec!["outer"]);
        let text = &generator.shared.hoisted_texts[0];
        assert!(text.starts_with("fn rec_0(outer, xs) -> Data {"), "text: {text}");
        assert!(text.contains("rec_0(outer, xs)"), "text: {text}");
    }

    #[test]
    fn refuses_unresolvable_free_variable() {
        let body = Term::builtin(DefaultFunction::AddInteger)
            .apply(Term::var("mystery"))
            .apply(Term::var("self").apply(Term::var("self")).apply(Term::var("xs")));
        let lam = Term::lam("self", Term::lam("xs", body));
        let mut generator = generator();
        assert!(generator.try_hoist("f", &lam, &Ctx::default()).is_none());
        // nothing was committed
        assert_eq!(generator.shared.hoist_counter, 0);
        assert!(generator.shared.hoisted_texts.is_empty());
        assert!(generator.shared.recursive.is_empty());
    }

    #[test]
    fn under_saturated_calls_eta_expand() {
        let hoisted = HoistedFn {
            fn_name: "rec_0".to_owned(),
            captured: vec!["cap".to_owned()],
            arity: 2,
        };
        assert_eq!(hoisted.call_text(&["a".to_owned(), "b".to_owned()]), "rec_0(cap, a, b)");
        assert_eq!(
            hoisted.call_text(&["a".to_owned()]),
            "fn(_eta_0) { rec_0(cap, a, _eta_0) }"
        );
    }

    #[test]
    fn shared_state_restores_after_hoist() {
        let mut generator = generator();
        let _ = generator.try_hoist("fold", &sum_fold(), &Ctx::default()).unwrap();
        // the inner self parameter mapping is gone after generation
        assert!(!generator.shared.recursive.contains_key("self"));
    }
}
