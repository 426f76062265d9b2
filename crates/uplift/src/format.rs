//! Textual post-processing of the generated listing.
//!
//! These passes run on the rendered source string: duplicate-let removal,
//! boolean simplification, logical-chain collapsing, tail-chain and
//! pair-access sugar, long-constant extraction, and whitespace
//! normalization. Regexes are compiled once; a pass that matches nothing
//! leaves its input untouched.

use std::sync::LazyLock;

use ahash::AHashSet;
use regex::Regex;

/// Upper bound on fixed-point iterations of the logical-chain collapse.
const MAX_CHAIN_ROUNDS: usize = 10;

/// Runs every pass in order and returns the cleaned listing.
pub fn post_process(source: &str) -> String {
    let mut out = dedup_let_bindings(source);
    out = simplify_booleans(&out);
    out = collapse_logical_chains(&out);
    out = collapse_tail_chains(&out);
    out = sugar_pair_access(&out);
    out = extract_constants(&out);
    out = repair_malformed_ifs(&out);
    out = normalize_whitespace(&out);
    out = ensure_list_import(&out);
    tracing::trace!(bytes = out.len(), "post-processed listing");
    out
}

/// Drops a `let x = e` line when the identical line already appeared in the
/// listing. Re-bindings with a different right-hand side are shadowing and
/// stay.
fn dedup_let_bindings(source: &str) -> String {
    let mut seen: AHashSet<&str> = AHashSet::new();
    let mut out = Vec::new();
    for line in source.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("let ") {
            if seen.contains(trimmed) {
                continue;
            }
            seen.insert(trimmed);
        }
        out.push(line);
    }
    let mut joined = out.join("\n");
    if source.ends_with('\n') {
        joined.push('\n');
    }
    joined
}

static IF_TRUE_FALSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"if ([^\n{}]+?) \{ True \} else \{ False \}").unwrap());
static IF_FALSE_TRUE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"if ([^\n{}]+?) \{ False \} else \{ True \}").unwrap());
static DOUBLE_NOT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"!\(!\(([^()]+)\)\)").unwrap());
static NOT_EQUALS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"!\(([A-Za-z0-9_.\[\]]+) == ([^()]+)\)").unwrap());

/// `if X { True } else { False }` -> `X`, the negated form -> `!(X)`,
/// `!(!(X))` -> `X`, `!(X == Y)` -> `X != Y`.
fn simplify_booleans(source: &str) -> String {
    let out = IF_TRUE_FALSE.replace_all(source, "$1");
    let out = IF_FALSE_TRUE.replace_all(&out, "!($1)");
    let out = DOUBLE_NOT.replace_all(&out, "$1");
    let out = NOT_EQUALS.replace_all(&out, "$1 != $2");
    out.into_owned()
}

static IF_AND: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"if ([^\n{}]+?) \{ ([^\n{}]+?) \} else \{ False \}").unwrap());
static IF_OR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"if ([^\n{}]+?) \{ True \} else \{ ([^\n{}]+?) \}").unwrap());
static NESTED_AND: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(\(([^()]+ && [^()]+)\) && ([^()]+)\)").unwrap());
static NESTED_OR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(\(([^()]+ \|\| [^()]+)\) \|\| ([^()]+)\)").unwrap());
static NESTED_AND_RIGHT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(([^()]+) && \(([^()]+ && [^()]+)\)\)").unwrap());
static NESTED_OR_RIGHT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(([^()]+) \|\| \(([^()]+ \|\| [^()]+)\)\)").unwrap());

/// Collapses `if A { B } else { False }` into `(A && B)` (and the OR dual),
/// then flattens associative nesting. Iterated to a fixed point, bounded.
fn collapse_logical_chains(source: &str) -> String {
    let mut current = source.to_owned();
    for _ in 0..MAX_CHAIN_ROUNDS {
        let next = IF_AND.replace_all(&current, "($1 && $2)");
        let next = IF_OR.replace_all(&next, "($1 || $2)");
        let next = NESTED_AND.replace_all(&next, "($1 && $2)");
        let next = NESTED_OR.replace_all(&next, "($1 || $2)");
        let next = NESTED_AND_RIGHT.replace_all(&next, "($1 && $2)");
        let next = NESTED_OR_RIGHT.replace_all(&next, "($1 || $2)");
        let next = next.into_owned();
        if next == current {
            break;
        }
        current = next;
    }
    current
}

static TAIL_CHAIN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([A-Za-z_][A-Za-z0-9_]*(?:\.(?:1st|2nd|fields))?)((?:\.tail\(\)){3,})\.head\(\)").unwrap()
});

/// `x.tail().tail().tail().head()` (three or more tails) -> `list.at(x, 3)`.
/// Shorter chains are left for the pair-access sugar.
fn collapse_tail_chains(source: &str) -> String {
    TAIL_CHAIN
        .replace_all(source, |caps: &regex::Captures<'_>| {
            let base = &caps[1];
            let tails = caps[2].matches(".tail()").count();
            format!("list.at({base}, {tails})")
        })
        .into_owned()
}

static UNCONSTR_FST: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(unConstrData\(([A-Za-z_][A-Za-z0-9_]*)\)\)\.1st").unwrap());
static UNCONSTR_SND: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(unConstrData\(([A-Za-z_][A-Za-z0-9_]*)\)\)\.2nd").unwrap());
static FIELDS_AT_2: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([A-Za-z_][A-Za-z0-9_]*\.fields)\.tail\(\)\.tail\(\)\.head\(\)").unwrap()
});
static FIELDS_AT_1: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([A-Za-z_][A-Za-z0-9_]*\.fields)\.tail\(\)\.head\(\)").unwrap());
static FIELDS_AT_0: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([A-Za-z_][A-Za-z0-9_]*\.fields)\.head\(\)").unwrap());

/// Pair-access sugar: `(unConstrData(x)).1st` -> `x.tag`, `.2nd` ->
/// `x.fields`, and short `.fields` chains -> indexed access.
fn sugar_pair_access(source: &str) -> String {
    let out = UNCONSTR_FST.replace_all(source, "$1.tag");
    let out = UNCONSTR_SND.replace_all(&out, "$1.fields");
    let out = FIELDS_AT_2.replace_all(&out, "$1[2]");
    let out = FIELDS_AT_1.replace_all(&out, "$1[1]");
    let out = FIELDS_AT_0.replace_all(&out, "$1[0]");
    out.into_owned()
}

static HEX_LITERAL: LazyLock<Regex> = LazyLock::new(|| Regex::new("#\"([0-9a-fA-F]{32,})\"").unwrap());
static CONST_DECL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^const ([A-Z0-9_]+) = ").unwrap());

/// Replaces long hex literals by named constants declared after the `use`
/// block. 56 hex chars is a 28-byte script hash, 64 a 32-byte policy id.
fn extract_constants(source: &str) -> String {
    let existing: AHashSet<String> = CONST_DECL
        .captures_iter(source)
        .map(|caps| caps[1].to_owned())
        .collect();

    // literals already bound on a const line stay where they are
    let declared_literals: AHashSet<String> = source
        .lines()
        .filter(|line| line.trim_start().starts_with("const "))
        .flat_map(|line| HEX_LITERAL.captures_iter(line).map(|caps| caps[1].to_owned()))
        .collect();

    let mut order: Vec<String> = Vec::new();
    for caps in HEX_LITERAL.captures_iter(source) {
        let literal = caps[1].to_owned();
        if !declared_literals.contains(&literal) && !order.contains(&literal) {
            order.push(literal);
        }
    }
    if order.is_empty() {
        return source.to_owned();
    }

    let mut out = source.to_owned();
    let mut declarations = Vec::new();
    for literal in order {
        let prefix = match literal.len() {
            56 => "SCRIPT_HASH",
            64 => "POLICY_ID",
            _ => "CONST",
        };
        let mut index = 0;
        while existing.contains(&format!("{prefix}_{index}")) || declarations.iter().any(|(n, _): &(String, String)| n == &format!("{prefix}_{index}")) {
            index += 1;
        }
        let name = format!("{prefix}_{index}");
        out = out.replace(&format!("#\"{literal}\""), &name);
        declarations.push((name, literal));
    }

    let decl_block: String = declarations
        .iter()
        .map(|(name, literal)| format!("const {name} = #\"{literal}\"\n"))
        .collect();
    insert_after_use_block(&out, &decl_block)
}

/// Inserts a declaration block after the leading `use` imports (constants
/// always land after the imports, never ahead of them).
fn insert_after_use_block(source: &str, block: &str) -> String {
    let mut lines: Vec<&str> = source.lines().collect();
    let mut insert_at = 0;
    for (i, line) in lines.iter().enumerate() {
        if line.starts_with("use ") {
            insert_at = i + 1;
        } else if insert_at > 0 && !line.trim().is_empty() {
            break;
        }
    }
    let with_gap = if insert_at > 0 { format!("\n{block}") } else { format!("{block}\n") };
    let inserted: Vec<&str> = with_gap.lines().collect();
    let mut out_lines: Vec<String> = Vec::with_capacity(lines.len() + inserted.len());
    for (i, line) in lines.iter().enumerate() {
        if i == insert_at {
            out_lines.extend(inserted.iter().map(|l| (*l).to_owned()));
        }
        out_lines.push((*line).to_owned());
    }
    if insert_at >= lines.len() {
        out_lines.extend(inserted.iter().map(|l| (*l).to_owned()));
    }
    let mut joined = out_lines.join("\n");
    if source.ends_with('\n') {
        joined.push('\n');
    }
    joined
}

static MALFORMED_IF: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"if ([A-Za-z_][A-Za-z0-9_]*)\)").unwrap());

/// `if VAR)` is the syntactic artifact of truncated partial-application
/// emission; the variable itself is the expression.
fn repair_malformed_ifs(source: &str) -> String {
    MALFORMED_IF.replace_all(source, "$1").into_owned()
}

static SPACE_RUNS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\S)  +").unwrap());
static OPERATOR_SPACING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d) ?([+*/%-]) ?(\d)").unwrap());

/// Collapses interior space runs (indentation is untouched) and puts exactly
/// one space around arithmetic operators between digits.
fn normalize_whitespace(source: &str) -> String {
    let out = SPACE_RUNS.replace_all(source, "$1 ");
    // two passes: adjacent operator pairs share a digit boundary
    let out = OPERATOR_SPACING.replace_all(&out, "$1 $2 $3");
    let out = OPERATOR_SPACING.replace_all(&out, "$1 $2 $3");
    out.into_owned()
}

/// The tail-chain collapse introduces `list.at` calls; make sure the module
/// they live in is imported.
fn ensure_list_import(source: &str) -> String {
    if !source.contains("list.at(") || source.lines().any(|l| l.trim() == "use aiken/list") {
        return source.to_owned();
    }
    let mut use_lines: Vec<&str> = source.lines().take_while(|l| l.starts_with("use ")).collect();
    let rest: Vec<&str> = source.lines().skip(use_lines.len()).collect();
    use_lines.push("use aiken/list");
    use_lines.sort_unstable();
    let mut out = use_lines.join("\n");
    out.push('\n');
    if use_lines.len() == 1 && !rest.first().is_some_and(|l| l.trim().is_empty()) {
        out.push('\n');
    }
    out.push_str(&rest.join("\n"));
    if source.ends_with('\n') {
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn boolean_cast_simplifies() {
        assert_eq!(simplify_booleans("if x == 1 { True } else { False }"), "x == 1");
        assert_eq!(simplify_booleans("if done { False } else { True }"), "!(done)");
        assert_eq!(simplify_booleans("!(!(ok))"), "ok");
        assert_eq!(simplify_booleans("!(a == b)"), "a != b");
    }

    #[test]
    fn and_chain_collapses_to_fixed_point() {
        let source = "if a { if b { c } else { False } } else { False }";
        assert_eq!(collapse_logical_chains(source), "(a && b && c)");
    }

    #[test]
    fn or_chain_collapses() {
        let source = "if a { True } else { if b { True } else { c } }";
        assert_eq!(collapse_logical_chains(source), "(a || b || c)");
    }

    #[test]
    fn tail_chains_collapse_at_three() {
        assert_eq!(
            collapse_tail_chains("x.tail().tail().tail().head()"),
            "list.at(x, 3)"
        );
        assert_eq!(
            collapse_tail_chains("d.fields.tail().tail().tail().tail().head()"),
            "list.at(d.fields, 4)"
        );
        // two tails stay verbose for the pair-access sugar
        assert_eq!(
            collapse_tail_chains("x.tail().tail().head()"),
            "x.tail().tail().head()"
        );
    }

    #[test]
    fn pair_access_sugar() {
        assert_eq!(sugar_pair_access("(unConstrData(x)).1st"), "x.tag");
        assert_eq!(sugar_pair_access("(unConstrData(x)).2nd"), "x.fields");
        assert_eq!(sugar_pair_access("d.fields.head()"), "d.fields[0]");
        assert_eq!(sugar_pair_access("d.fields.tail().head()"), "d.fields[1]");
        assert_eq!(sugar_pair_access("d.fields.tail().tail().head()"), "d.fields[2]");
    }

    #[test]
    fn duplicate_lets_drop_but_shadowing_stays() {
        let source = "let x = 1\nlet x = 1\nlet x = 2\n";
        assert_eq!(dedup_let_bindings(source), "let x = 1\nlet x = 2\n");
    }

    #[test]
    fn long_hex_extracts_after_use_block() {
        let hex = "ab".repeat(28); // 56 hex chars
        let source = format!("use aiken/builtin\n\nvalidator script {{\n  spend() {{\n    #\"{hex}\" == x\n  }}\n}}\n");
        let out = extract_constants(&source);
        assert!(out.contains("const SCRIPT_HASH_0 = #\""), "out: {out}");
        assert!(out.contains("SCRIPT_HASH_0 == x"), "out: {out}");
        // declared after the imports
        let use_pos = out.find("use aiken/builtin").unwrap();
        let const_pos = out.find("const SCRIPT_HASH_0").unwrap();
        assert!(const_pos > use_pos);
    }

    #[test]
    fn repeated_literal_extracts_once() {
        let hex = "cd".repeat(32); // 64 hex chars -> policy id
        let source = format!("a = #\"{hex}\"\nb = #\"{hex}\"\n");
        let out = extract_constants(&source);
        assert_eq!(out.matches("const POLICY_ID_0 = ").count(), 1);
        assert_eq!(out.matches("POLICY_ID_0").count(), 3, "out: {out}");
    }

    #[test]
    fn existing_const_literal_is_untouched() {
        let hex = "ef".repeat(28);
        let source = format!("const SCRIPT_HASH_0 = #\"{hex}\"\n\nbody SCRIPT_HASH_0\n");
        assert_eq!(extract_constants(&source), source);
    }

    #[test]
    fn malformed_if_repair() {
        assert_eq!(repair_malformed_ifs("f(if cond)"), "f(cond)");
    }

    #[test]
    fn whitespace_normalization() {
        assert_eq!(normalize_whitespace("a  +   b"), "a + b");
        assert_eq!(normalize_whitespace("1+2"), "1 + 2");
        assert_eq!(normalize_whitespace("3 *4"), "3 * 4");
        // indentation survives
        assert_eq!(normalize_whitespace("    let x = 1"), "    let x = 1");
        // identifiers and module paths are untouched
        assert_eq!(normalize_whitespace("crypto.sha2_256(x)"), "crypto.sha2_256(x)");
    }

    #[test]
    fn list_import_added_when_needed() {
        let source = "use aiken/builtin\n\nlist.at(x, 3)\n";
        let out = ensure_list_import(source);
        assert!(out.starts_with("use aiken/builtin\nuse aiken/list\n"), "out: {out}");
        // idempotent
        assert_eq!(ensure_list_import(&out), out);
    }

    #[test]
    fn full_pipeline_is_deterministic() {
        let source = "use aiken/builtin\n\nif a { if b { True } else { False } } else { False }\n";
        let first = post_process(source);
        let second = post_process(&first);
        // a second run keeps the already-clean output stable
        assert_eq!(post_process(&second), second);
    }
}
