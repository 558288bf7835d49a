//! Typed errors for the crypto core and the trigger/action engine.
//!
//! The crypto modules fail closed with [`CryptoError`]; the engine wraps
//! record-level problems in [`EngineError`] so one bad record can never
//! abort a poll pass. Collaborator failures stay `anyhow` errors and are
//! absorbed at the action boundary.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CryptoError {
    #[error("base58check checksum mismatch")]
    ChecksumMismatch,

    #[error("malformed base58 string: {0}")]
    Base58(String),

    #[error("unrecognized private key encoding")]
    UnknownPrivateKeyFormat,

    #[error("unrecognized public key encoding")]
    UnknownPublicKeyFormat,

    #[error("point is not on the secp256k1 curve")]
    NotOnCurve,

    #[error("scalar out of range [1, N-1]")]
    ScalarOutOfRange,

    #[error("malformed derivation path '{path}': {reason}")]
    BadDerivationPath { path: String, reason: String },

    #[error("hardened derivation requires a private parent key")]
    HardenedFromPublic,

    #[error("derived child key invalid at index {0}, retry with the next index")]
    InvalidChildKey(u32),

    #[error("malformed extended key: {0}")]
    BadExtendedKey(String),

    #[error("malformed address '{0}'")]
    BadAddress(String),

    #[error("malformed transaction bytes: {0}")]
    BadTransaction(String),

    #[error("malformed signature: {0}")]
    BadSignature(String),

    #[error("precondition violated: {0}")]
    Precondition(String),
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("unknown trigger id '{0}'")]
    UnknownTrigger(String),

    #[error("unknown action id '{0}'")]
    UnknownAction(String),

    #[error("bad record '{id}': {reason}")]
    BadRecord { id: String, reason: String },

    #[error("storage failure: {0}")]
    Storage(String),
}
