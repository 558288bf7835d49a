//! Chain parameters threaded through every codec call.
//!
//! Version bytes select mainnet/testnet per call site instead of a
//! process-wide switch, so one process can serve both chains at once.

use crate::error::CryptoError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChainParams {
    pub name: &'static str,
    /// Version byte for legacy pay-to-pubkey-hash addresses.
    pub p2pkh_version: u8,
    /// Version byte for pay-to-script-hash addresses.
    pub p2sh_version: u8,
    /// Version byte for WIF private key strings.
    pub wif_version: u8,
    /// BIP32 extended private key version bytes (xprv / tprv).
    pub bip32_priv: [u8; 4],
    /// BIP32 extended public key version bytes (xpub / tpub).
    pub bip32_pub: [u8; 4],
    /// Human-readable part for segwit addresses.
    pub bech32_hrp: &'static str,
}

pub const MAINNET: ChainParams = ChainParams {
    name: "mainnet",
    p2pkh_version: 0x00,
    p2sh_version: 0x05,
    wif_version: 0x80,
    bip32_priv: [0x04, 0x88, 0xad, 0xe4],
    bip32_pub: [0x04, 0x88, 0xb2, 0x1e],
    bech32_hrp: "bc",
};

pub const TESTNET: ChainParams = ChainParams {
    name: "testnet",
    p2pkh_version: 0x6f,
    p2sh_version: 0xc4,
    wif_version: 0xef,
    bip32_priv: [0x04, 0x35, 0x83, 0x94],
    bip32_pub: [0x04, 0x35, 0x87, 0xcf],
    bech32_hrp: "tb",
};

impl ChainParams {
    pub fn from_name(name: &str) -> Result<ChainParams, CryptoError> {
        match name.to_lowercase().as_str() {
            "mainnet" | "main" | "bitcoin" => Ok(MAINNET),
            "testnet" | "test" | "testnet3" => Ok(TESTNET),
            other => Err(CryptoError::BadAddress(format!(
                "unknown chain '{other}', use mainnet or testnet"
            ))),
        }
    }
}
