//! The JSON wire contract with the upstream flat decoder.

use uplift::{DefaultFunction, Term, decompile};

#[test]
fn parses_decoder_json_and_decompiles() {
    let json = r#"{
        "tag": "lam", "param": "r",
        "body": {
            "tag": "lam", "param": "c",
            "body": { "tag": "const", "value": { "kind": "unit" } }
        }
    }"#;
    let term = Term::from_json(json).expect("valid term");
    let result = decompile(&term);
    assert!(result.source.contains("validator policy {"));
    assert!(result.source.contains("True"));
}

#[test]
fn builtins_use_wire_names() {
    let json = r#"{
        "tag": "apply",
        "function": { "tag": "builtin", "fun": "unConstrData" },
        "argument": { "tag": "var", "name": "x" }
    }"#;
    let term = Term::from_json(json).expect("valid term");
    assert_eq!(
        term,
        Term::builtin(DefaultFunction::UnConstrData).apply(Term::var("x"))
    );
}

#[test]
fn integers_travel_as_decimal_strings() {
    let json = r#"{ "tag": "const", "value": { "kind": "integer", "value": "123456789012345678901234567890" } }"#;
    let term = Term::from_json(json).expect("valid term");
    let round_tripped = Term::from_json(&term.to_json()).expect("round trip");
    assert_eq!(term, round_tripped);
    assert!(term.to_json().contains("123456789012345678901234567890"));
}

#[test]
fn byte_strings_travel_as_hex() {
    let json = r#"{ "tag": "const", "value": { "kind": "byte_string", "value": "deadbeef" } }"#;
    let term = Term::from_json(json).expect("valid term");
    assert_eq!(term, Term::bytes(vec![0xde, 0xad, 0xbe, 0xef]));
}

#[test]
fn unknown_builtin_is_a_parse_error() {
    let json = r#"{ "tag": "builtin", "fun": "definitelyNotABuiltin" }"#;
    assert!(Term::from_json(json).is_err());
}

#[test]
fn full_round_trip_preserves_structure() {
    let term = Term::lam(
        "d",
        Term::lam(
            "r",
            Term::builtin(DefaultFunction::IfThenElse)
                .force()
                .apply(Term::var("r"))
                .apply(Term::unit().delay())
                .apply(Term::Error.delay())
                .force(),
        ),
    );
    let round_tripped = Term::from_json(&term.to_json()).expect("round trip");
    assert_eq!(term, round_tripped);
}
