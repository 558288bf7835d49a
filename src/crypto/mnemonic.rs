//! BIP-39 seed phrases.
//!
//! Seeds reaching the HD layer usually start life as a mnemonic backup;
//! the phrase plus an optional passphrase reproduces the wallet.

use anyhow::Result;
use bip39::{Language, Mnemonic};
use rand::RngCore;
use zeroize::Zeroize;

/// Generate a new random 24-word BIP-39 mnemonic.
///
/// Entropy is securely zeroized after mnemonic generation.
pub fn generate_mnemonic() -> Result<Mnemonic> {
    let mut entropy = [0u8; 32]; // 256 bits for 24 words
    rand::thread_rng().fill_bytes(&mut entropy);
    let result = Mnemonic::from_entropy_in(Language::English, &entropy)
        .map_err(|e| anyhow::anyhow!("Failed to generate mnemonic: {}", e));
    entropy.zeroize();
    result
}

/// Generate a 12-word BIP-39 mnemonic (128 bits entropy).
pub fn generate_mnemonic_12() -> Result<Mnemonic> {
    let mut entropy = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut entropy);
    let result = Mnemonic::from_entropy_in(Language::English, &entropy)
        .map_err(|e| anyhow::anyhow!("Failed to generate mnemonic: {}", e));
    entropy.zeroize();
    result
}

/// Parse mnemonic from space-separated words.
pub fn parse_mnemonic(words: &str) -> Result<Mnemonic> {
    Mnemonic::parse_in(Language::English, words)
        .map_err(|e| anyhow::anyhow!("Invalid mnemonic: {}", e))
}

/// Validate mnemonic words (checksum and wordlist).
pub fn validate_mnemonic(words: &str) -> bool {
    Mnemonic::parse_in(Language::English, words).is_ok()
}

/// Convert mnemonic to 512-bit seed using BIP-39 PBKDF2.
///
/// The optional passphrase adds a second factor (the "25th word").
/// Different passphrases produce completely different seeds.
pub fn mnemonic_to_seed(mnemonic: &Mnemonic, passphrase: &str) -> [u8; 64] {
    mnemonic.to_seed(passphrase)
}
