//! The catalogue of UPLC builtin functions.
//!
//! Builtin names on the wire are the case-sensitive camelCase spellings used by
//! the Plutus machine (`addInteger`, `unConstrData`, ...). The crypto and
//! BLS12-381 families keep their underscore-heavy canonical names, so those
//! variants carry explicit `strum(serialize = ...)` overrides instead of
//! relying on the camelCase rename rule.

use strum::{Display, EnumIter, EnumString, IntoStaticStr};

/// A UPLC builtin function, one variant per primitive the Plutus machine provides.
///
/// Uses strum derives for `Display`, `FromStr`, and `&'static str` conversion so
/// the parser-facing JSON and all diagnostics share a single name table.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, IntoStaticStr, serde::Serialize, serde::Deserialize,
)]
#[strum(serialize_all = "camelCase")]
#[serde(try_from = "String", into = "String")]
pub enum DefaultFunction {
    // Integer arithmetic
    AddInteger,
    SubtractInteger,
    MultiplyInteger,
    DivideInteger,
    QuotientInteger,
    RemainderInteger,
    ModInteger,
    // Integer comparison
    EqualsInteger,
    LessThanInteger,
    LessThanEqualsInteger,
    // ByteString
    AppendByteString,
    ConsByteString,
    SliceByteString,
    LengthOfByteString,
    IndexByteString,
    EqualsByteString,
    LessThanByteString,
    LessThanEqualsByteString,
    // Cryptography
    #[strum(serialize = "sha2_256")]
    Sha2_256,
    #[strum(serialize = "sha3_256")]
    Sha3_256,
    #[strum(serialize = "blake2b_224")]
    Blake2b224,
    #[strum(serialize = "blake2b_256")]
    Blake2b256,
    #[strum(serialize = "keccak_256")]
    Keccak256,
    #[strum(serialize = "ripemd_160")]
    Ripemd160,
    VerifyEd25519Signature,
    VerifyEcdsaSecp256k1Signature,
    VerifySchnorrSecp256k1Signature,
    // String
    AppendString,
    EqualsString,
    EncodeUtf8,
    DecodeUtf8,
    // Control
    IfThenElse,
    ChooseUnit,
    Trace,
    // Pairs
    FstPair,
    SndPair,
    MkPairData,
    // Lists
    ChooseList,
    MkCons,
    HeadList,
    TailList,
    NullList,
    MkNilData,
    MkNilPairData,
    // Data
    ChooseData,
    ConstrData,
    MapData,
    ListData,
    IData,
    BData,
    UnConstrData,
    UnMapData,
    UnListData,
    UnIData,
    UnBData,
    EqualsData,
    SerialiseData,
    // BLS12-381
    #[strum(serialize = "bls12_381_G1_add")]
    Bls12_381G1Add,
    #[strum(serialize = "bls12_381_G1_neg")]
    Bls12_381G1Neg,
    #[strum(serialize = "bls12_381_G1_scalarMul")]
    Bls12_381G1ScalarMul,
    #[strum(serialize = "bls12_381_G1_equal")]
    Bls12_381G1Equal,
    #[strum(serialize = "bls12_381_G1_compress")]
    Bls12_381G1Compress,
    #[strum(serialize = "bls12_381_G1_uncompress")]
    Bls12_381G1Uncompress,
    #[strum(serialize = "bls12_381_G1_hashToGroup")]
    Bls12_381G1HashToGroup,
    #[strum(serialize = "bls12_381_G2_add")]
    Bls12_381G2Add,
    #[strum(serialize = "bls12_381_G2_neg")]
    Bls12_381G2Neg,
    #[strum(serialize = "bls12_381_G2_scalarMul")]
    Bls12_381G2ScalarMul,
    #[strum(serialize = "bls12_381_G2_equal")]
    Bls12_381G2Equal,
    #[strum(serialize = "bls12_381_G2_compress")]
    Bls12_381G2Compress,
    #[strum(serialize = "bls12_381_G2_uncompress")]
    Bls12_381G2Uncompress,
    #[strum(serialize = "bls12_381_G2_hashToGroup")]
    Bls12_381G2HashToGroup,
    #[strum(serialize = "bls12_381_millerLoop")]
    Bls12_381MillerLoop,
    #[strum(serialize = "bls12_381_mulMlResult")]
    Bls12_381MulMlResult,
    #[strum(serialize = "bls12_381_finalVerify")]
    Bls12_381FinalVerify,
    // Plutus V3 bitwise / conversion
    IntegerToByteString,
    ByteStringToInteger,
    AndByteString,
    OrByteString,
    XorByteString,
    ComplementByteString,
    ReadBit,
    WriteBits,
    ReplicateByte,
    ShiftByteString,
    RotateByteString,
    CountSetBits,
    FindFirstSetBit,
}

impl TryFrom<String> for DefaultFunction {
    type Error = strum::ParseError;

    fn try_from(name: String) -> Result<Self, strum::ParseError> {
        name.parse()
    }
}

impl From<DefaultFunction> for String {
    fn from(fun: DefaultFunction) -> Self {
        fun.to_string()
    }
}

impl DefaultFunction {
    /// The number of value arguments the builtin consumes when fully applied.
    ///
    /// Type-instantiation `Force` layers are not arguments; they are counted
    /// separately by [`DefaultFunction::force_count`].
    pub fn arity(self) -> usize {
        use DefaultFunction::*;
        match self {
            LengthOfByteString | EncodeUtf8 | DecodeUtf8 | Sha2_256 | Sha3_256 | Blake2b224 | Blake2b256
            | Keccak256 | Ripemd160 | FstPair | SndPair | HeadList | TailList | NullList | MkNilData
            | MkNilPairData | ConstrData | MapData | ListData | IData | BData | UnConstrData | UnMapData
            | UnListData | UnIData | UnBData | SerialiseData | Bls12_381G1Neg | Bls12_381G1Compress
            | Bls12_381G1Uncompress | Bls12_381G2Neg | Bls12_381G2Compress | Bls12_381G2Uncompress
            | ComplementByteString | CountSetBits | FindFirstSetBit => 1,
            AddInteger | SubtractInteger | MultiplyInteger | DivideInteger | QuotientInteger
            | RemainderInteger | ModInteger | EqualsInteger | LessThanInteger | LessThanEqualsInteger
            | AppendByteString | ConsByteString | IndexByteString | EqualsByteString | LessThanByteString
            | LessThanEqualsByteString | AppendString | EqualsString | ChooseUnit | Trace | MkPairData
            | MkCons | EqualsData | Bls12_381G1Add | Bls12_381G1ScalarMul | Bls12_381G1Equal
            | Bls12_381G1HashToGroup | Bls12_381G2Add | Bls12_381G2ScalarMul | Bls12_381G2Equal
            | Bls12_381G2HashToGroup | Bls12_381MillerLoop | Bls12_381MulMlResult | Bls12_381FinalVerify
            | ByteStringToInteger | ReadBit | ReplicateByte | ShiftByteString | RotateByteString => 2,
            SliceByteString | VerifyEd25519Signature | VerifyEcdsaSecp256k1Signature
            | VerifySchnorrSecp256k1Signature | IfThenElse | ChooseList | IntegerToByteString
            | AndByteString | OrByteString | XorByteString | WriteBits => 3,
            // the scrutinee plus one branch per Data constructor
            ChooseData => 6,
        }
    }

    /// How many outer `Force` layers a fully instantiated application of this
    /// builtin carries in compiled output.
    ///
    /// Builtins not in the force-polymorphic set return 0 and must never be
    /// wrapped. The decompiler uses this both to peel forces and to recognize
    /// phantom type-instantiation lambdas.
    pub fn force_count(self) -> usize {
        use DefaultFunction::*;
        match self {
            FstPair | SndPair | MkCons | ChooseList | ChooseData | IfThenElse | Trace | MkPairData => 2,
            HeadList | TailList | NullList | ChooseUnit | UnListData | UnConstrData | UnIData | IData
            | UnBData | BData | UnMapData | MapData | SerialiseData | EqualsData | MkNilData
            | MkNilPairData => 1,
            _ => 0,
        }
    }

    /// True when the builtin takes type-instantiation forces (and therefore may
    /// receive phantom lambdas as leading arguments in compiled output).
    pub fn is_force_polymorphic(self) -> bool {
        self.force_count() > 0
    }
}
