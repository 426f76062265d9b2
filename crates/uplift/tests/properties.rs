//! Cross-cutting output invariants.
//!
//! These run the full pipeline over a small fleet of representative terms
//! and assert the properties every decompilation must satisfy: determinism,
//! balanced delimiters, placeholder-freedom for well-formed inputs, and
//! import/constant bookkeeping.

use uplift::{Confidence, DefaultFunction, Term, decompile, verify};

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

/// A representative set of well-formed validators.
fn fleet() -> Vec<Term> {
    let always_true = Term::lam("d", Term::lam("r", Term::lam("c", Term::unit())));

    let match_validator = Term::lam(
        "d",
        Term::lam(
            "r",
            Term::lam(
                "c",
                ite(
                    constr_check(Term::var("r"), 0),
                    Term::integer(10),
                    ite(constr_check(Term::var("r"), 1), Term::integer(20), Term::Error),
                ),
            ),
        ),
    );

    let hashed = Term::lam(
        "r",
        Term::lam(
            "c",
            Term::builtin(DefaultFunction::EqualsByteString)
                .apply(Term::builtin(DefaultFunction::Sha2_256).apply(Term::var("r")))
                .apply(Term::bytes(vec![0x5a; 32])),
        ),
    );

    let with_let = Term::lam(
        "r",
        Term::lam(
            "c",
            Term::lam(
                "x",
                Term::builtin(DefaultFunction::EqualsInteger).apply(Term::var("x")).apply(Term::integer(7)),
            )
            .apply(Term::builtin(DefaultFunction::AddInteger).apply(Term::var("r")).apply(Term::integer(1))),
        ),
    );

    vec![always_true, match_validator, hashed, with_let]
}

#[test]
fn determinism_byte_identical_runs() {
    for term in fleet() {
        let first = decompile(&term);
        let second = decompile(&term);
        assert_eq!(first.source, second.source);
        assert_eq!(first.verification.constant_score, second.verification.constant_score);
    }
}

#[test]
fn balanced_delimiters() {
    for term in fleet() {
        let source = decompile(&term).source;
        for (open, close) in [('{', '}'), ('(', ')'), ('[', ']')] {
            let opens = source.matches(open).count();
            let closes = source.matches(close).count();
            assert_eq!(opens, closes, "unbalanced {open}{close} in:\n{source}");
        }
    }
}

#[test]
fn no_orphan_placeholders() {
    for term in fleet() {
        let source = decompile(&term).source;
        assert!(!source.contains("???"), "placeholder in:\n{source}");
    }
}

#[test]
fn import_sufficiency() {
    for term in fleet() {
        let source = decompile(&term).source;
        for (module, prefix) in [
            ("use aiken/builtin", "builtin."),
            ("use aiken/crypto", "crypto."),
            ("use aiken/list", "list."),
        ] {
            let imported = source.lines().any(|l| l.trim() == module);
            let used = source.contains(prefix);
            assert_eq!(imported, used, "import mismatch for {module} in:\n{source}");
        }
    }
}

#[test]
fn constant_extraction_stability() {
    // the same 32-byte constant used twice becomes one named constant
    // referenced twice
    let hash = vec![0xcd; 32];
    let term = Term::lam(
        "r",
        Term::lam(
            "c",
            Term::builtin(DefaultFunction::EqualsByteString)
                .apply(Term::bytes(hash.clone()))
                .apply(Term::bytes(hash)),
        ),
    );
    let source = decompile(&term).source;
    let hex = "cd".repeat(32);
    assert_eq!(source.matches(&hex).count(), 1, "source:\n{source}");
    assert_eq!(source.matches("POLICY_ID_0").count(), 3, "source:\n{source}");
}

#[test]
fn well_formed_outputs_verify_clean() {
    for term in fleet() {
        let result = decompile(&term);
        assert_eq!(result.verification.placeholder_score, 1.0, "source:\n{}", result.source);
        assert!(
            result.verification.constant_score >= 0.99,
            "constants missing from:\n{}",
            result.source
        );
    }
}

#[test]
fn verifier_monotonicity_on_missing_constants() {
    // same listing, one extra unmatched constant in the input: confidence
    // must not improve
    let base = Term::lam("r", Term::lam("c", Term::integer(42)));
    let richer = Term::lam(
        "r",
        Term::lam(
            "c",
            Term::var("ignored").apply(Term::integer(42)).apply(Term::integer(999)),
        ),
    );
    let listing = "validator script {\n  mint(redeemer, policy_id, tx) {\n    redeemer == 42\n  }\n}\n";
    let full = verify(&base, listing);
    let degraded = verify(&richer, listing);
    let rank = |c: Confidence| match c {
        Confidence::High => 2,
        Confidence::Medium => 1,
        Confidence::Low => 0,
    };
    assert!(degraded.constant_score < full.constant_score);
    assert!(rank(degraded.confidence) <= rank(full.confidence));
}

#[test]
fn hoisted_calls_are_saturated() {
    // let fold = rec in fold(fold, r): every rec_0 call supplies exactly
    // captured + arity arguments
    let head = Term::builtin(DefaultFunction::UnIData)
        .apply(Term::builtin(DefaultFunction::HeadList).force().apply(Term::var("xs")));
    let recurse = Term::var("self")
        .apply(Term::var("self"))
        .apply(Term::builtin(DefaultFunction::TailList).force().apply(Term::var("xs")));
    let fold = Term::lam(
        "self",
        Term::lam(
            "xs",
            ite(
                Term::builtin(DefaultFunction::NullList).force().apply(Term::var("xs")),
                Term::integer(0),
                Term::builtin(DefaultFunction::AddInteger).apply(head).apply(recurse),
            ),
        ),
    );
    let body = Term::lam(
        "fold",
        Term::var("fold").apply(Term::var("fold")).apply(Term::var("r")),
    )
    .apply(fold);
    let term = Term::lam("r", Term::lam("c", body));
    let source = decompile(&term).source;
    for (i, _) in source.match_indices("rec_0(") {
        let rest = &source[i + "rec_0(".len()..];
        let close = rest.find(')').expect("call closes");
        let args = &rest[..close];
        // arity 1, no captures: exactly one argument, never empty
        assert!(!args.trim().is_empty(), "unsaturated call in:\n{source}");
    }
}
