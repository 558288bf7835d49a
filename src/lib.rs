//! satwarden — rule-based custody of hot-wallet funds.
//!
//! Two tightly coupled subsystems:
//!
//! - a purely functional crypto engine: secp256k1 arithmetic, key
//!   codecs, BIP32 derivation, raw-transaction construction and
//!   deterministic ECDSA signing ([`crypto`], [`tx`]);
//! - a persisted trigger/action engine that decides when and with
//!   which keys that engine is invoked ([`engine`]).
//!
//! Chain data, key storage, broadcast, mail and webhooks are
//! collaborator traits ([`collab`]); the crate ships an Esplora-style
//! client for the chain-facing pair. Chain selection is an explicit
//! [`chain::ChainParams`] value threaded through every call — there is
//! no process-wide network switch.

pub mod chain;
pub mod collab;
pub mod crypto;
pub mod engine;
pub mod error;
pub mod logging;
pub mod tx;

pub use chain::{ChainParams, MAINNET, TESTNET};
pub use engine::{Collaborators, Engine};
pub use error::{CryptoError, EngineError};
