//! Error types shared by the agent and the collector server

use thiserror::Error;

/// Malformed metric input: unknown kind, empty name, missing or unparsable value
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Unknown metric kind: {0}")]
    UnknownKind(String),

    #[error("Metric name is empty")]
    EmptyName,

    #[error("Metric {id} of kind {kind} carries no value")]
    MissingValue { id: String, kind: String },

    #[error("Invalid value for {kind} metric: {value}")]
    InvalidValue { kind: String, value: String },
}

/// Payload protection errors
///
/// Signature problems are deliberately collapsed into a single variant so
/// callers cannot tell a malformed header from a wrong one.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Bad signature")]
    BadSignature,

    #[error("Decryption failed: {0}")]
    Decryption(String),

    #[error("Encryption failed: {0}")]
    Encryption(String),

    #[error("Key generation failed: {0}")]
    KeyGeneration(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Key file error: {0}")]
    Io(#[from] std::io::Error),
}

/// Gzip codec errors
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Compression failed: {0}")]
    Compress(std::io::Error),

    #[error("Malformed gzip stream: {0}")]
    Decompress(std::io::Error),

    #[error("Inflated body exceeds {0} bytes")]
    TooLarge(usize),
}
