//! The stateless crypto engine.
//!
//! - **ec**: secp256k1 point arithmetic (Jacobian internally)
//! - **hashes**: digest and Base58Check helpers
//! - **keys**: private/public key codecs and addresses
//! - **ecdsa**: deterministic (RFC6979) signing and verification
//! - **hd**: BIP32 hierarchical-deterministic derivation
//! - **mnemonic**: BIP39 seed phrases

pub mod ec;
pub mod ecdsa;
pub mod hashes;
pub mod hd;
pub mod keys;
pub mod mnemonic;
