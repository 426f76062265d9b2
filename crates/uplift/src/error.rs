//! Error taxonomy for the API boundary.
//!
//! The decompiler itself is best-effort and total: malformed subtrees become
//! `???` placeholders and are surfaced through verifier scores rather than
//! errors. The only fallible surface is ingesting parser output.

/// An error raised while ingesting input, before the pipeline runs.
#[derive(Debug, thiserror::Error)]
pub enum DecompileError {
    /// The term JSON handed over by the flat-decoder did not deserialize.
    /// Parse errors are propagated to the caller unchanged.
    #[error("failed to parse term JSON: {0}")]
    Json(#[from] serde_json::Error),
}
