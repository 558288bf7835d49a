//! Raw-transaction construction and signing.
//!
//! - **script**: standard output script templates and address decoding
//! - **codec**: binary (de)serialization of raw transactions
//! - **signer**: precondition checks plus per-input deterministic signing

pub mod codec;
pub mod script;
pub mod signer;
