#![doc = include_str!("../../../README.md")]

mod bindings;
mod builtin;
mod codegen;
mod contract;
mod entry;
mod error;
mod format;
mod patterns;
mod shape;
mod stdlib;
mod term;
mod verify;

pub use crate::{
    bindings::{BindingCategory, BindingEnv, BindingPattern, ResolvedBinding, analyze_binding},
    builtin::DefaultFunction,
    codegen::{GeneratedCode, generate_validator},
    contract::{CheckKind, ContractStructure, DatumInfo, RedeemerInfo, ValidationCheck, analyze_contract},
    entry::{ScriptParameter, ScriptPurpose, UtilityBinding, ValidatorEntry, detect_validator_entry},
    error::DecompileError,
    format::post_process,
    patterns::{
        BoolChainKind, BooleanChain, ConstrCheck, ConstructorMatch, FieldAccess, TX_FIELDS, detect_boolean_chain,
        detect_constr_check, detect_constructor_match, detect_field_access, detect_tx_field,
    },
    term::{Constant, PlutusData, Term},
    verify::{Confidence, GroundTruth, Verification, extract_ground_truth, verify},
};

/// The result of one full decompilation run.
///
/// Everything here is owned by the caller; two runs on the same term share
/// no state and produce byte-identical output.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Decompilation {
    /// The analyzed contract shape.
    pub contract: ContractStructure,
    /// The structured emitter output.
    pub code: GeneratedCode,
    /// The post-processed Aiken listing.
    pub source: String,
    /// Verifier scores against the ground-truth constants.
    pub verification: Verification,
}

/// Decompiles a UPLC program into Aiken source, naming the validator after
/// its inferred purpose.
pub fn decompile(term: &Term) -> Decompilation {
    run_pipeline(term, None)
}

/// Decompiles a UPLC program with an explicit validator name.
pub fn decompile_with_name(term: &Term, validator_name: &str) -> Decompilation {
    run_pipeline(term, Some(validator_name))
}

fn run_pipeline(term: &Term, validator_name: Option<&str>) -> Decompilation {
    let span = tracing::debug_span!("decompile");
    let _guard = span.enter();

    let mut contract = analyze_contract(term);
    let code = generate_validator(&contract, validator_name);
    contract.hoisted_functions = code
        .hoisted_functions
        .iter()
        .filter_map(|text| {
            text.strip_prefix("fn ")
                .and_then(|rest| rest.split('(').next())
                .map(str::to_owned)
        })
        .collect();
    let source = post_process(&code.render());
    let verification = verify(term, &source);
    Decompilation {
        contract,
        code,
        source,
        verification,
    }
}
