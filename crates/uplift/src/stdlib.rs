//! The static UPLC builtin -> Aiken stdlib mapping.
//!
//! Every builtin resolves to a [`StdlibEntry`] describing how an applied call
//! renders in surface syntax: an inline operator template (`{0} + {1}`), a
//! method-style call, or a plain function call through a stdlib module
//! (`builtin.un_constr_data(x)`). The table also drives the `use` import
//! block: each entry's module is collected, deduplicated, and sorted.

use crate::builtin::DefaultFunction;

/// How one builtin maps into Aiken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StdlibEntry {
    /// Source module path to import, e.g. `aiken/builtin`. `None` for pure
    /// operator templates which need no import.
    pub module: Option<&'static str>,
    /// The Aiken-side symbol name.
    pub name: &'static str,
    /// Inline template with positional placeholders `{0}`, `{1}`, ...
    pub template: Option<&'static str>,
    /// When set, calls render as `first.name(rest...)`.
    pub method_style: bool,
    /// Value arity used for partial-application handling.
    pub arity: usize,
}

const BUILTIN_MODULE: &str = "aiken/builtin";
const CRYPTO_MODULE: &str = "aiken/crypto";

/// Constant-time lookup of the mapping record for a builtin.
pub fn lookup(fun: DefaultFunction) -> StdlibEntry {
    use DefaultFunction::*;
    let arity = fun.arity();
    let entry = |module: Option<&'static str>, name: &'static str, template: Option<&'static str>| StdlibEntry {
        module,
        name,
        template,
        method_style: false,
        arity,
    };
    match fun {
        // operators
        AddInteger => entry(None, "add_integer", Some("{0} + {1}")),
        SubtractInteger => entry(None, "subtract_integer", Some("{0} - {1}")),
        MultiplyInteger => entry(None, "multiply_integer", Some("{0} * {1}")),
        DivideInteger => entry(None, "divide_integer", Some("{0} / {1}")),
        ModInteger => entry(None, "mod_integer", Some("{0} % {1}")),
        EqualsInteger | EqualsByteString | EqualsString | EqualsData => entry(None, "equals", Some("{0} == {1}")),
        LessThanInteger => entry(None, "less_than_integer", Some("{0} < {1}")),
        LessThanEqualsInteger => entry(None, "less_than_equals_integer", Some("{0} <= {1}")),
        IfThenElse => entry(None, "if_then_else", Some("if {0} { {1} } else { {2} }")),
        Trace => entry(None, "trace", Some("trace {0}: {1}")),
        // integer helpers without operator syntax
        QuotientInteger => entry(Some(BUILTIN_MODULE), "quotient_integer", None),
        RemainderInteger => entry(Some(BUILTIN_MODULE), "remainder_integer", None),
        // bytearrays
        AppendByteString => entry(Some(BUILTIN_MODULE), "append_bytearray", None),
        ConsByteString => entry(Some(BUILTIN_MODULE), "cons_bytearray", None),
        SliceByteString => entry(Some(BUILTIN_MODULE), "slice_bytearray", None),
        LengthOfByteString => entry(Some(BUILTIN_MODULE), "length_of_bytearray", None),
        IndexByteString => entry(Some(BUILTIN_MODULE), "index_bytearray", None),
        LessThanByteString => entry(Some(BUILTIN_MODULE), "less_than_bytearray", None),
        LessThanEqualsByteString => entry(Some(BUILTIN_MODULE), "less_than_equals_bytearray", None),
        // strings
        AppendString => entry(Some(BUILTIN_MODULE), "append_string", None),
        EncodeUtf8 => entry(Some(BUILTIN_MODULE), "encode_utf8", None),
        DecodeUtf8 => entry(Some(BUILTIN_MODULE), "decode_utf8", None),
        // crypto
        Sha2_256 => entry(Some(CRYPTO_MODULE), "sha2_256", None),
        Sha3_256 => entry(Some(CRYPTO_MODULE), "sha3_256", None),
        Blake2b224 => entry(Some(CRYPTO_MODULE), "blake2b_224", None),
        Blake2b256 => entry(Some(CRYPTO_MODULE), "blake2b_256", None),
        Keccak256 => entry(Some(CRYPTO_MODULE), "keccak_256", None),
        Ripemd160 => entry(Some(CRYPTO_MODULE), "ripemd_160", None),
        VerifyEd25519Signature => entry(Some(CRYPTO_MODULE), "verify_ed25519_signature", None),
        VerifyEcdsaSecp256k1Signature => entry(Some(CRYPTO_MODULE), "verify_ecdsa_secp256k1_signature", None),
        VerifySchnorrSecp256k1Signature => entry(Some(CRYPTO_MODULE), "verify_schnorr_secp256k1_signature", None),
        // control
        ChooseUnit => entry(Some(BUILTIN_MODULE), "choose_unit", None),
        ChooseList => entry(Some(BUILTIN_MODULE), "choose_list", None),
        ChooseData => entry(Some(BUILTIN_MODULE), "choose_data", None),
        // pairs
        FstPair => entry(Some(BUILTIN_MODULE), "fst_pair", None),
        SndPair => entry(Some(BUILTIN_MODULE), "snd_pair", None),
        MkPairData => entry(Some(BUILTIN_MODULE), "mk_pair_data", None),
        // lists
        MkCons => entry(Some(BUILTIN_MODULE), "mk_cons", None),
        HeadList => entry(Some(BUILTIN_MODULE), "head_list", None),
        TailList => entry(Some(BUILTIN_MODULE), "tail_list", None),
        NullList => entry(Some(BUILTIN_MODULE), "null_list", None),
        MkNilData => entry(Some(BUILTIN_MODULE), "mk_nil_data", None),
        MkNilPairData => entry(Some(BUILTIN_MODULE), "mk_nil_pair_data", None),
        // data
        ConstrData => entry(Some(BUILTIN_MODULE), "constr_data", None),
        MapData => entry(Some(BUILTIN_MODULE), "map_data", None),
        ListData => entry(Some(BUILTIN_MODULE), "list_data", None),
        IData => entry(Some(BUILTIN_MODULE), "i_data", None),
        BData => entry(Some(BUILTIN_MODULE), "b_data", None),
        UnConstrData => entry(Some(BUILTIN_MODULE), "un_constr_data", None),
        UnMapData => entry(Some(BUILTIN_MODULE), "un_map_data", None),
        UnListData => entry(Some(BUILTIN_MODULE), "un_list_data", None),
        UnIData => entry(Some(BUILTIN_MODULE), "un_i_data", None),
        UnBData => entry(Some(BUILTIN_MODULE), "un_b_data", None),
        SerialiseData => entry(Some(BUILTIN_MODULE), "serialise_data", None),
        // BLS12-381
        Bls12_381G1Add => entry(Some(BUILTIN_MODULE), "bls12_381_g1_add", None),
        Bls12_381G1Neg => entry(Some(BUILTIN_MODULE), "bls12_381_g1_neg", None),
        Bls12_381G1ScalarMul => entry(Some(BUILTIN_MODULE), "bls12_381_g1_scalar_mul", None),
        Bls12_381G1Equal => entry(Some(BUILTIN_MODULE), "bls12_381_g1_equal", None),
        Bls12_381G1Compress => entry(Some(BUILTIN_MODULE), "bls12_381_g1_compress", None),
        Bls12_381G1Uncompress => entry(Some(BUILTIN_MODULE), "bls12_381_g1_uncompress", None),
        Bls12_381G1HashToGroup => entry(Some(BUILTIN_MODULE), "bls12_381_g1_hash_to_group", None),
        Bls12_381G2Add => entry(Some(BUILTIN_MODULE), "bls12_381_g2_add", None),
        Bls12_381G2Neg => entry(Some(BUILTIN_MODULE), "bls12_381_g2_neg", None),
        Bls12_381G2ScalarMul => entry(Some(BUILTIN_MODULE), "bls12_381_g2_scalar_mul", None),
        Bls12_381G2Equal => entry(Some(BUILTIN_MODULE), "bls12_381_g2_equal", None),
        Bls12_381G2Compress => entry(Some(BUILTIN_MODULE), "bls12_381_g2_compress", None),
        Bls12_381G2Uncompress => entry(Some(BUILTIN_MODULE), "bls12_381_g2_uncompress", None),
        Bls12_381G2HashToGroup => entry(Some(BUILTIN_MODULE), "bls12_381_g2_hash_to_group", None),
        Bls12_381MillerLoop => entry(Some(BUILTIN_MODULE), "bls12_381_miller_loop", None),
        Bls12_381MulMlResult => entry(Some(BUILTIN_MODULE), "bls12_381_mul_ml_result", None),
        Bls12_381FinalVerify => entry(Some(BUILTIN_MODULE), "bls12_381_final_verify", None),
        // bitwise / conversion
        IntegerToByteString => entry(Some(BUILTIN_MODULE), "integer_to_bytearray", None),
        ByteStringToInteger => entry(Some(BUILTIN_MODULE), "bytearray_to_integer", None),
        AndByteString => entry(Some(BUILTIN_MODULE), "and_bytearray", None),
        OrByteString => entry(Some(BUILTIN_MODULE), "or_bytearray", None),
        XorByteString => entry(Some(BUILTIN_MODULE), "xor_bytearray", None),
        ComplementByteString => entry(Some(BUILTIN_MODULE), "complement_bytearray", None),
        ReadBit => entry(Some(BUILTIN_MODULE), "read_bit", None),
        WriteBits => entry(Some(BUILTIN_MODULE), "write_bits", None),
        ReplicateByte => entry(Some(BUILTIN_MODULE), "replicate_byte", None),
        ShiftByteString => entry(Some(BUILTIN_MODULE), "shift_bytearray", None),
        RotateByteString => entry(Some(BUILTIN_MODULE), "rotate_bytearray", None),
        CountSetBits => entry(Some(BUILTIN_MODULE), "count_set_bits", None),
        FindFirstSetBit => entry(Some(BUILTIN_MODULE), "find_first_set_bit", None),
    }
}

/// A short semantic alias used when a builtin is bound to a name and the
/// binding is renamed rather than kept (`let f = addInteger` becomes `add`).
pub fn semantic_alias(fun: DefaultFunction) -> &'static str {
    use DefaultFunction::*;
    match fun {
        AddInteger => "add",
        SubtractInteger => "sub",
        MultiplyInteger => "mul",
        DivideInteger => "div",
        ModInteger => "modulo",
        QuotientInteger => "quot",
        RemainderInteger => "rem",
        EqualsInteger => "eq",
        EqualsByteString => "eq_bytes",
        EqualsString => "eq_string",
        EqualsData => "eq_data",
        LessThanInteger => "lt",
        LessThanEqualsInteger => "lte",
        HeadList => "head",
        TailList => "tail",
        NullList => "is_empty",
        FstPair => "first",
        SndPair => "second",
        UnConstrData => "un_constr",
        IfThenElse => "if_then_else",
        Trace => "trace",
        other => lookup(other).name,
    }
}

/// The sorted, deduplicated set of `use` module paths required by the given
/// builtins.
pub fn required_imports(used: impl IntoIterator<Item = DefaultFunction>) -> Vec<&'static str> {
    let mut modules: Vec<&'static str> = used.into_iter().filter_map(|fun| lookup(fun).module).collect();
    modules.sort_unstable();
    modules.dedup();
    modules
}

/// The call prefix for a module path: `aiken/builtin` -> `builtin`.
fn module_prefix(module: &str) -> &str {
    module.rsplit('/').next().unwrap_or(module)
}

/// Renders a fully or partially applied builtin call.
///
/// Honors the entry's template, method style, or default functional call.
/// When fewer arguments than placeholders/arity are supplied, the rendering
/// is wrapped in a lambda binding the missing positions, so the result is
/// always a complete expression.
pub fn render_call(fun: DefaultFunction, args: &[String]) -> String {
    let entry = lookup(fun);
    if let Some(template) = entry.template {
        return render_template(template, args);
    }
    let qualified = match entry.module {
        Some(module) => format!("{}.{}", module_prefix(module), entry.name),
        None => entry.name.to_owned(),
    };
    if entry.method_style && !args.is_empty() {
        let rest = args[1..].join(", ");
        return format!("{}.{}({rest})", args[0], entry.name);
    }
    if args.len() >= entry.arity {
        let (now, extra) = args.split_at(entry.arity);
        let mut call = format!("{qualified}({})", now.join(", "));
        // over-application: the saturated call returned a function
        for arg in extra {
            call = format!("{call}({arg})");
        }
        call
    } else {
        // under-application: bind the missing positions
        let missing: Vec<String> = (args.len()..entry.arity).map(|i| format!("p{i}")).collect();
        let all: Vec<String> = args.iter().cloned().chain(missing.iter().cloned()).collect();
        format!("fn({}) {{ {qualified}({}) }}", missing.join(", "), all.join(", "))
    }
}

/// Substitutes positional placeholders into a template, wrapping in a lambda
/// when the template references positions beyond the supplied arguments.
fn render_template(template: &str, args: &[String]) -> String {
    let needed = template_arity(template);
    if args.len() >= needed {
        return substitute(template, args);
    }
    let missing: Vec<String> = (args.len()..needed).map(|i| format!("p{i}")).collect();
    let all: Vec<String> = args.iter().cloned().chain(missing.iter().cloned()).collect();
    format!("fn({}) {{ {} }}", missing.join(", "), substitute(template, &all))
}

/// The number of distinct positional placeholders a template binds
/// (the highest `{i}` plus one).
pub fn template_arity(template: &str) -> usize {
    let mut max: Option<usize> = None;
    let bytes = template.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'{' {
            let mut j = i + 1;
            let mut digits = 0usize;
            let mut value = 0usize;
            while j < bytes.len() && bytes[j].is_ascii_digit() {
                value = value * 10 + usize::from(bytes[j] - b'0');
                digits += 1;
                j += 1;
            }
            if digits > 0 && j < bytes.len() && bytes[j] == b'}' {
                max = Some(max.map_or(value, |m| m.max(value)));
                i = j;
            }
        }
        i += 1;
    }
    max.map_or(0, |m| m + 1)
}

fn substitute(template: &str, args: &[String]) -> String {
    let mut out = String::with_capacity(template.len() + args.iter().map(String::len).sum::<usize>());
    let bytes = template.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'{' {
            let mut j = i + 1;
            let mut digits = 0usize;
            let mut value = 0usize;
            while j < bytes.len() && bytes[j].is_ascii_digit() {
                value = value * 10 + usize::from(bytes[j] - b'0');
                digits += 1;
                j += 1;
            }
            if digits > 0 && j < bytes.len() && bytes[j] == b'}' {
                out.push_str(args.get(value).map_or("???", String::as_str));
                i = j + 1;
                continue;
            }
        }
        out.push(bytes[i] as char);
        i += 1;
    }
    out
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::builtin::DefaultFunction;

    #[test]
    fn operator_templates() {
        let args = vec!["a".to_owned(), "b".to_owned()];
        assert_eq!(render_call(DefaultFunction::AddInteger, &args), "a + b");
        assert_eq!(render_call(DefaultFunction::EqualsInteger, &args), "a == b");
        assert_eq!(render_call(DefaultFunction::LessThanInteger, &args), "a < b");
    }

    #[test]
    fn if_then_else_template() {
        let args = vec!["c".to_owned(), "t".to_owned(), "e".to_owned()];
        assert_eq!(render_call(DefaultFunction::IfThenElse, &args), "if c { t } else { e }");
    }

    #[test]
    fn functional_calls_use_module_prefix() {
        let args = vec!["x".to_owned()];
        assert_eq!(render_call(DefaultFunction::UnConstrData, &args), "builtin.un_constr_data(x)");
        assert_eq!(render_call(DefaultFunction::Sha2_256, &args), "crypto.sha2_256(x)");
    }

    #[test]
    fn under_application_wraps_in_lambda() {
        let args = vec!["a".to_owned()];
        assert_eq!(render_call(DefaultFunction::AddInteger, &args), "fn(p1) { a + p1 }");
        assert_eq!(
            render_call(DefaultFunction::AppendByteString, &args),
            "fn(p1) { builtin.append_bytearray(a, p1) }"
        );
    }

    #[test]
    fn over_application_chains_calls() {
        let args = vec!["x".to_owned(), "y".to_owned()];
        assert_eq!(render_call(DefaultFunction::UnConstrData, &args), "builtin.un_constr_data(x)(y)");
    }

    #[test]
    fn imports_are_sorted_and_deduplicated() {
        let used = [
            DefaultFunction::Sha2_256,
            DefaultFunction::UnConstrData,
            DefaultFunction::HeadList,
            DefaultFunction::AddInteger,
        ];
        assert_eq!(required_imports(used), vec!["aiken/builtin", "aiken/crypto"]);
    }

    #[test]
    fn template_arity_counts_distinct_positions() {
        assert_eq!(template_arity("{0} + {1}"), 2);
        assert_eq!(template_arity("if {0} { {1} } else { {2} }"), 3);
        assert_eq!(template_arity("no placeholders"), 0);
        // a shared placeholder binds one argument
        assert_eq!(template_arity("{0} * {0}"), 1);
    }

    #[test]
    fn semantic_aliases() {
        assert_eq!(semantic_alias(DefaultFunction::AddInteger), "add");
        assert_eq!(semantic_alias(DefaultFunction::EqualsInteger), "eq");
        assert_eq!(semantic_alias(DefaultFunction::UnConstrData), "un_constr");
        assert_eq!(semantic_alias(DefaultFunction::SerialiseData), "serialise_data");
    }
}
