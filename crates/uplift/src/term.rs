//! The UPLC term AST and its literal rendering.
//!
//! The upstream flat-decoder (an external collaborator) hands the decompiler a
//! [`Term`] tree, usually via the JSON wire format the serde derives define
//! here. Terms are immutable once built: every analysis pass only reads them,
//! and all pass outputs are owned by the caller.

use std::fmt;

use num_bigint::BigInt;

use crate::{builtin::DefaultFunction, error::DecompileError};

/// A single UPLC term.
///
/// The variant set mirrors the untyped Plutus Core grammar. `Force` and
/// `Delay` are type-instantiation markers with no runtime value; the
/// decompiler peels them transparently wherever it matches on structure.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "tag", rename_all = "snake_case")]
pub enum Term {
    /// A named variable reference.
    Var { name: String },
    /// A single-parameter abstraction.
    Lam { param: String, body: Box<Term> },
    /// Application of a function to one argument.
    Apply { function: Box<Term>, argument: Box<Term> },
    /// Polymorphic-type instantiation. Runtime-transparent.
    Force { inner: Box<Term> },
    /// Suspension. Runtime-transparent for decompilation purposes.
    Delay { inner: Box<Term> },
    /// A primitive of the Plutus machine.
    Builtin { fun: DefaultFunction },
    /// A literal constant.
    Const { value: Constant },
    /// A constructor value with a tag and ordered fields.
    Constr { index: u64, args: Vec<Term> },
    /// Indexed dispatch on a constructor tag.
    Case { scrutinee: Box<Term>, branches: Vec<Term> },
    /// Unconditional abort.
    Error,
}

impl Term {
    /// Parses a term from the JSON wire format produced by the flat-decoder.
    pub fn from_json(json: &str) -> Result<Self, DecompileError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serializes the term back to the JSON wire format.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    pub fn var(name: impl Into<String>) -> Self {
        Self::Var { name: name.into() }
    }

    pub fn lam(param: impl Into<String>, body: Self) -> Self {
        Self::Lam {
            param: param.into(),
            body: Box::new(body),
        }
    }

    /// Builder-style application: `f.apply(x)` is `[f x]`.
    pub fn apply(self, argument: Self) -> Self {
        Self::Apply {
            function: Box::new(self),
            argument: Box::new(argument),
        }
    }

    pub fn force(self) -> Self {
        Self::Force { inner: Box::new(self) }
    }

    pub fn delay(self) -> Self {
        Self::Delay { inner: Box::new(self) }
    }

    pub fn builtin(fun: DefaultFunction) -> Self {
        Self::Builtin { fun }
    }

    pub fn integer(value: impl Into<BigInt>) -> Self {
        Self::Const {
            value: Constant::Integer(value.into()),
        }
    }

    pub fn bytes(value: impl Into<Vec<u8>>) -> Self {
        Self::Const {
            value: Constant::ByteString(value.into()),
        }
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::Const {
            value: Constant::String(value.into()),
        }
    }

    pub fn bool(value: bool) -> Self {
        Self::Const {
            value: Constant::Bool(value),
        }
    }

    pub fn unit() -> Self {
        Self::Const { value: Constant::Unit }
    }

    pub fn data(value: PlutusData) -> Self {
        Self::Const {
            value: Constant::Data(value),
        }
    }

    /// True when the term is the boolean constant `b`, looking through
    /// `Force`/`Delay` wrappers.
    pub fn is_bool_const(&self, b: bool) -> bool {
        matches!(crate::shape::unwrap_force_delay(self), Self::Const { value: Constant::Bool(v) } if *v == b)
    }

    /// True when the term is the unit constant, looking through wrappers.
    pub fn is_unit_const(&self) -> bool {
        matches!(crate::shape::unwrap_force_delay(self), Self::Const { value: Constant::Unit })
    }

    /// The integer payload if the term is an exact integer literal.
    pub fn as_integer(&self) -> Option<&BigInt> {
        match crate::shape::unwrap_force_delay(self) {
            Self::Const {
                value: Constant::Integer(n),
            } => Some(n),
            _ => None,
        }
    }

    /// The variable name if the term is a bare `Var`, looking through wrappers.
    pub fn as_var(&self) -> Option<&str> {
        match crate::shape::unwrap_force_delay(self) {
            Self::Var { name } => Some(name),
            _ => None,
        }
    }
}

/// A literal constant embedded in a term.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Constant {
    Unit,
    Bool(bool),
    #[serde(with = "bigint_decimal")]
    Integer(BigInt),
    #[serde(with = "hex_bytes")]
    ByteString(Vec<u8>),
    String(String),
    Data(PlutusData),
    List(Vec<Constant>),
    Pair(Box<Constant>, Box<Constant>),
}

impl Constant {
    /// Renders the constant as an Aiken literal.
    ///
    /// Integer -> decimal, boolean -> `True`/`False`, unit -> `Void`,
    /// bytestring -> `#"hex"`, string -> quoted, list -> `[..]`,
    /// pair -> `(fst, snd)`, data -> the recursive `builtin.constr_data` form.
    pub fn to_aiken(&self) -> String {
        match self {
            Self::Unit => "Void".to_owned(),
            Self::Bool(true) => "True".to_owned(),
            Self::Bool(false) => "False".to_owned(),
            Self::Integer(n) => n.to_string(),
            Self::ByteString(bytes) => format!("#\"{}\"", hex::encode(bytes)),
            Self::String(s) => format!("\"{}\"", escape_string(s)),
            Self::Data(data) => data.to_aiken(),
            Self::List(items) => {
                let rendered: Vec<String> = items.iter().map(Self::to_aiken).collect();
                format!("[{}]", rendered.join(", "))
            }
            Self::Pair(fst, snd) => format!("({}, {})", fst.to_aiken(), snd.to_aiken()),
        }
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_aiken())
    }
}

/// A nested Plutus `Data` value.
///
/// This is the universal on-chain data encoding: constructors with integer
/// tags, maps, lists, arbitrary-precision integers, and byte strings.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum PlutusData {
    Constr { tag: u64, fields: Vec<PlutusData> },
    Map(Vec<(PlutusData, PlutusData)>),
    List(Vec<PlutusData>),
    #[serde(with = "bigint_decimal")]
    BigInt(BigInt),
    #[serde(with = "hex_bytes")]
    BoundedBytes(Vec<u8>),
}

impl PlutusData {
    /// Pretty-prints the data value recursively in Aiken surface syntax.
    pub fn to_aiken(&self) -> String {
        match self {
            Self::Constr { tag, fields } => {
                let rendered: Vec<String> = fields.iter().map(Self::to_aiken).collect();
                format!("builtin.constr_data({tag}, [{}])", rendered.join(", "))
            }
            Self::Map(pairs) => {
                let rendered: Vec<String> = pairs
                    .iter()
                    .map(|(k, v)| format!("Pair({}, {})", k.to_aiken(), v.to_aiken()))
                    .collect();
                format!("builtin.map_data([{}])", rendered.join(", "))
            }
            Self::List(items) => {
                let rendered: Vec<String> = items.iter().map(Self::to_aiken).collect();
                format!("[{}]", rendered.join(", "))
            }
            Self::BigInt(n) => n.to_string(),
            Self::BoundedBytes(bytes) => format!("#\"{}\"", hex::encode(bytes)),
        }
    }
}

fn escape_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(c),
        }
    }
    out
}

/// Serde codec storing arbitrary-precision integers as decimal strings.
/// The default num-bigint encoding (sign plus base-2^32 digit vector) is not
/// a reasonable wire contract for the flat decoder.
mod bigint_decimal {
    use num_bigint::BigInt;
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(n: &BigInt, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&n.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<BigInt, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}

/// Serde codec storing byte strings as lowercase hex, matching the flat
/// decoder's JSON output.
mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(&s).map_err(D::Error::custom)
    }
}
