//! Decompilation verification.
//!
//! Scores a generated listing against ground-truth constants extracted from
//! the raw AST. The verifier never fails: it always produces the four
//! component scores, a confidence classification, and an issue list the
//! host can surface to the user.

use std::sync::LazyLock;

use ahash::AHashSet;
use num_bigint::BigInt;
use num_traits::Zero;
use regex::Regex;
use strum::IntoEnumIterator;

use crate::{
    builtin::DefaultFunction,
    stdlib,
    term::{Constant, PlutusData, Term},
};

/// Confidence classification for a decompilation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

/// The verifier's report.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Verification {
    /// Fraction of non-trivial source constants found in the output.
    pub constant_score: f64,
    /// 1 minus the ratio of undefined function calls.
    pub reference_score: f64,
    /// 1 minus the ratio of placeholder lines.
    pub placeholder_score: f64,
    /// Penalizes listings that are mostly raw builtin calls.
    pub abstraction_score: f64,
    pub confidence: Confidence,
    pub issues: Vec<String>,
}

/// Ground-truth constants pulled from the raw AST before generation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroundTruth {
    pub byte_strings: Vec<Vec<u8>>,
    pub integers: Vec<BigInt>,
    pub strings: Vec<String>,
}

/// Walks the AST collecting every constant, including those nested inside
/// `Data` values.
pub fn extract_ground_truth(term: &Term) -> GroundTruth {
    let mut truth = GroundTruth::default();
    collect_constants(term, &mut truth);
    truth.byte_strings.dedup();
    truth.integers.dedup();
    truth.strings.dedup();
    truth
}

fn collect_constants(term: &Term, truth: &mut GroundTruth) {
    match term {
        Term::Const { value } => collect_constant(value, truth),
        Term::Lam { body, .. } => collect_constants(body, truth),
        Term::Apply { function, argument } => {
            collect_constants(function, truth);
            collect_constants(argument, truth);
        }
        Term::Force { inner } | Term::Delay { inner } => collect_constants(inner, truth),
        Term::Case { scrutinee, branches } => {
            collect_constants(scrutinee, truth);
            for branch in branches {
                collect_constants(branch, truth);
            }
        }
        Term::Constr { args, .. } => {
            for arg in args {
                collect_constants(arg, truth);
            }
        }
        _ => {}
    }
}

fn collect_constant(value: &Constant, truth: &mut GroundTruth) {
    match value {
        Constant::Integer(n) => truth.integers.push(n.clone()),
        Constant::ByteString(bytes) => truth.byte_strings.push(bytes.clone()),
        Constant::String(s) => truth.strings.push(s.clone()),
        Constant::Data(data) => collect_data(data, truth),
        Constant::List(items) => {
            for item in items {
                collect_constant(item, truth);
            }
        }
        Constant::Pair(fst, snd) => {
            collect_constant(fst, truth);
            collect_constant(snd, truth);
        }
        Constant::Unit | Constant::Bool(_) => {}
    }
}

fn collect_data(data: &PlutusData, truth: &mut GroundTruth) {
    match data {
        PlutusData::BigInt(n) => truth.integers.push(n.clone()),
        PlutusData::BoundedBytes(bytes) => truth.byte_strings.push(bytes.clone()),
        PlutusData::Constr { fields, .. } => {
            for field in fields {
                collect_data(field, truth);
            }
        }
        PlutusData::List(items) => {
            for item in items {
                collect_data(item, truth);
            }
        }
        PlutusData::Map(pairs) => {
            for (key, value) in pairs {
                collect_data(key, truth);
                collect_data(value, truth);
            }
        }
    }
}

/// Verifies a generated listing against the raw AST it came from.
pub fn verify(term: &Term, source: &str) -> Verification {
    let truth = extract_ground_truth(term);
    let mut issues = Vec::new();

    let constant_score = score_constants(&truth, source, &mut issues);
    let reference_score = score_references(source, &mut issues);
    let placeholder_score = score_placeholders(source, &mut issues);
    let abstraction_score = score_abstraction(source);

    let confidence = classify(constant_score, reference_score, placeholder_score);
    tracing::debug!(
        constant = constant_score,
        reference = reference_score,
        placeholder = placeholder_score,
        abstraction = abstraction_score,
        ?confidence,
        "verified decompilation"
    );
    Verification {
        constant_score,
        reference_score,
        placeholder_score,
        abstraction_score,
        confidence,
        issues,
    }
}

const SCORE_EPSILON: f64 = 1e-9;

fn classify(constant: f64, reference: f64, placeholder: f64) -> Confidence {
    let perfect =
        |score: f64| (1.0 - score).abs() < SCORE_EPSILON;
    if perfect(constant) && perfect(reference) && perfect(placeholder) {
        Confidence::High
    } else if constant >= 0.6 && reference >= 0.8 {
        Confidence::Medium
    } else {
        Confidence::Low
    }
}

/// Non-trivial constants: bytestrings of >= 4 bytes, integers outside
/// {0, 1}, trace strings of >= 3 characters.
fn score_constants(truth: &GroundTruth, source: &str, issues: &mut Vec<String>) -> f64 {
    let mut total = 0usize;
    let mut found = 0usize;

    for bytes in &truth.byte_strings {
        if bytes.len() < 4 {
            continue;
        }
        total += 1;
        if byte_string_present(bytes, source) {
            found += 1;
        } else {
            issues.push(format!("constant #\"{}\" missing from output", hex::encode(bytes)));
        }
    }
    for n in &truth.integers {
        if n.is_zero() || *n == BigInt::from(1) {
            continue;
        }
        total += 1;
        if integer_present(n, source) {
            found += 1;
        } else {
            issues.push(format!("constant {n} missing from output"));
        }
    }
    for s in &truth.strings {
        if s.chars().count() < 3 {
            continue;
        }
        total += 1;
        if source.contains(&format!("\"{s}\"")) || source.contains(s.as_str()) {
            found += 1;
        } else {
            issues.push(format!("trace string {s:?} missing from output"));
        }
    }

    if total == 0 {
        1.0
    } else {
        found as f64 / total as f64
    }
}

/// Lenient matching: the raw hex, the `#"hex"` literal form, or the ASCII
/// decoding in quotes.
fn byte_string_present(bytes: &[u8], source: &str) -> bool {
    let hex = hex::encode(bytes);
    if source.contains(&hex) {
        return true;
    }
    if bytes.iter().all(|b| b.is_ascii_graphic() || *b == b' ')
        && let Ok(ascii) = std::str::from_utf8(bytes)
    {
        return source.contains(&format!("\"{ascii}\""));
    }
    false
}

/// Integers match on a word boundary or absorbed into a semantic name
/// (`is_constr_{n}`, `eq_{n}`, `get_field_{n}`, ...).
fn integer_present(n: &BigInt, source: &str) -> bool {
    let rendered = n.to_string();
    let boundary = Regex::new(&format!(r"\b{}\b", regex::escape(&rendered)));
    if let Ok(re) = boundary
        && re.is_match(source)
    {
        return true;
    }
    let magnitude = n.magnitude().to_string();
    ["is_constr_", "expect_constr_", "eq_", "get_field_", "add_", "sub_", "Action"]
        .iter()
        .any(|prefix| source.contains(&format!("{prefix}{magnitude}")))
}

static CALL_SITE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\.?)([A-Za-z_][A-Za-z0-9_]*)\s*\(").unwrap());
static DECLARED_FN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^\s*fn ([a-z_][A-Za-z0-9_]*)\(").unwrap());
static GENERATED_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([a-z]\d*|_?(?:[a-z0-9]+_)+\d+|p\d+)$").unwrap());

/// 1 minus the ratio of calls to names that are neither stdlib symbols,
/// keywords, type constructors, generated bindings, methods, nor functions
/// declared in the listing itself.
fn score_references(source: &str, issues: &mut Vec<String>) -> f64 {
    let known = known_symbols();
    let declared: AHashSet<String> = DECLARED_FN
        .captures_iter(source)
        .map(|caps| caps[1].to_owned())
        .collect();

    let mut total = 0usize;
    let mut undefined = 0usize;
    for caps in CALL_SITE.captures_iter(source) {
        let method = !caps[1].is_empty();
        let name = &caps[2];
        total += 1;
        let defined = method
            || known.contains(name)
            || declared.contains(name)
            || name.starts_with(char::is_uppercase)
            || GENERATED_NAME.is_match(name);
        if !defined {
            undefined += 1;
            issues.push(format!("call to undefined function `{name}`"));
        }
    }
    if total == 0 {
        1.0
    } else {
        1.0 - undefined as f64 / total as f64
    }
}

/// Keywords, stdlib symbols, and Plutus-builtin shortcuts.
fn known_symbols() -> AHashSet<&'static str> {
    let mut known: AHashSet<&'static str> = [
        "if", "when", "fn", "let", "trace", "expect", "fail", "todo", "and", "or", "not",
        "validator", "spend", "mint", "withdraw", "publish", "vote", "propose",
        "head", "tail", "at", "constr_tag", "constr_fields", "cond_check",
    ]
    .into_iter()
    .collect();
    for fun in DefaultFunction::iter() {
        known.insert(stdlib::lookup(fun).name);
        known.insert(stdlib::semantic_alias(fun));
    }
    known
}

const PLACEHOLDER_MARKS: [&str; 7] = ["???", "todo", "// TODO", "// FIXME", "panic(", "...", "// placeholder"];

fn score_placeholders(source: &str, issues: &mut Vec<String>) -> f64 {
    let mut total = 0usize;
    let mut flagged = 0usize;
    for line in source.lines() {
        if line.trim().is_empty() {
            continue;
        }
        total += 1;
        if PLACEHOLDER_MARKS.iter().any(|mark| line.contains(mark)) {
            flagged += 1;
            issues.push(format!("placeholder line: {}", line.trim()));
        }
    }
    if total == 0 {
        1.0
    } else {
        1.0 - flagged as f64 / total as f64
    }
}

/// 1 - min(1, builtin calls / (2 * total lines)).
fn score_abstraction(source: &str) -> f64 {
    let total_lines = source.lines().filter(|l| !l.trim().is_empty()).count();
    if total_lines == 0 {
        return 1.0;
    }
    let builtin_calls = source.matches("builtin.").count();
    1.0 - (builtin_calls as f64 / (2.0 * total_lines as f64)).min(1.0)
}
