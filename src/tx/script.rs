//! Standard script templates and destination-address decoding.

use crate::chain::ChainParams;
use crate::crypto::hashes::base58check_decode;
use crate::error::CryptoError;

pub const OP_0: u8 = 0x00;
pub const OP_PUSHDATA1: u8 = 0x4c;
pub const OP_RETURN: u8 = 0x6a;
pub const OP_DUP: u8 = 0x76;
pub const OP_EQUAL: u8 = 0x87;
pub const OP_EQUALVERIFY: u8 = 0x88;
pub const OP_HASH160: u8 = 0xa9;
pub const OP_CHECKSIG: u8 = 0xac;

/// Minimal direct/PUSHDATA1 push; covers every payload this crate emits.
pub fn push_data(script: &mut Vec<u8>, data: &[u8]) {
    if data.len() < 0x4c {
        script.push(data.len() as u8);
    } else {
        script.push(OP_PUSHDATA1);
        script.push(data.len() as u8);
    }
    script.extend_from_slice(data);
}

/// `OP_DUP OP_HASH160 <hash> OP_EQUALVERIFY OP_CHECKSIG`
pub fn p2pkh(pubkey_hash: &[u8; 20]) -> Vec<u8> {
    let mut script = Vec::with_capacity(25);
    script.push(OP_DUP);
    script.push(OP_HASH160);
    push_data(&mut script, pubkey_hash);
    script.push(OP_EQUALVERIFY);
    script.push(OP_CHECKSIG);
    script
}

/// `OP_HASH160 <hash> OP_EQUAL`
pub fn p2sh(script_hash: &[u8; 20]) -> Vec<u8> {
    let mut script = Vec::with_capacity(23);
    script.push(OP_HASH160);
    push_data(&mut script, script_hash);
    script.push(OP_EQUAL);
    script
}

/// Version-0 witness program: `OP_0 <program>`.
pub fn witness_v0(program: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if program.len() != 20 && program.len() != 32 {
        return Err(CryptoError::BadAddress(format!(
            "witness program must be 20 or 32 bytes, got {}",
            program.len()
        )));
    }
    let mut script = Vec::with_capacity(2 + program.len());
    script.push(OP_0);
    push_data(&mut script, program);
    Ok(script)
}

/// `OP_RETURN <message>`; size limits are enforced by the codec.
pub fn op_return(message: &[u8]) -> Vec<u8> {
    let mut script = Vec::with_capacity(2 + message.len());
    script.push(OP_RETURN);
    push_data(&mut script, message);
    script
}

pub fn is_op_return(script: &[u8]) -> bool {
    script.first() == Some(&OP_RETURN)
}

// ============================================================================
// Address Decoding
// ============================================================================

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DecodedAddress {
    P2pkh([u8; 20]),
    P2sh([u8; 20]),
    WitnessV0(Vec<u8>),
}

/// Classify a destination address for this chain; fails closed on
/// anything it cannot name.
pub fn decode_address(address: &str, params: &ChainParams) -> Result<DecodedAddress, CryptoError> {
    let lowered = address.to_lowercase();
    if lowered.starts_with(&format!("{}1", params.bech32_hrp)) {
        let (hrp, version, program) = bech32::segwit::decode(address)
            .map_err(|e| CryptoError::BadAddress(format!("{address}: {e}")))?;
        if hrp.as_str() != params.bech32_hrp {
            return Err(CryptoError::BadAddress(format!(
                "{address}: wrong hrp for chain '{}'",
                params.name
            )));
        }
        if version.to_u8() != 0 {
            return Err(CryptoError::BadAddress(format!(
                "{address}: unsupported witness version {}",
                version.to_u8()
            )));
        }
        if program.len() != 20 && program.len() != 32 {
            return Err(CryptoError::BadAddress(format!(
                "{address}: bad witness program length {}",
                program.len()
            )));
        }
        return Ok(DecodedAddress::WitnessV0(program));
    }

    let payload = base58check_decode(address)?;
    if payload.len() != 21 {
        return Err(CryptoError::BadAddress(format!(
            "{address}: expected 21 payload bytes, got {}",
            payload.len()
        )));
    }
    let mut hash = [0u8; 20];
    hash.copy_from_slice(&payload[1..]);
    if payload[0] == params.p2sh_version {
        Ok(DecodedAddress::P2sh(hash))
    } else if payload[0] == params.p2pkh_version {
        Ok(DecodedAddress::P2pkh(hash))
    } else {
        Err(CryptoError::BadAddress(format!(
            "{address}: unknown version byte 0x{:02x}",
            payload[0]
        )))
    }
}

/// Locking script for a destination address.
pub fn script_for_address(address: &str, params: &ChainParams) -> Result<Vec<u8>, CryptoError> {
    match decode_address(address, params)? {
        DecodedAddress::P2pkh(hash) => Ok(p2pkh(&hash)),
        DecodedAddress::P2sh(hash) => Ok(p2sh(&hash)),
        DecodedAddress::WitnessV0(program) => witness_v0(&program),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::MAINNET;

    #[test]
    fn test_p2pkh_template() {
        let script = p2pkh(&[0x11; 20]);
        assert_eq!(script.len(), 25);
        assert_eq!(script[0], OP_DUP);
        assert_eq!(script[1], OP_HASH160);
        assert_eq!(script[2], 20);
        assert_eq!(script[23], OP_EQUALVERIFY);
        assert_eq!(script[24], OP_CHECKSIG);
    }

    #[test]
    fn test_script_for_base58_addresses() {
        // Genesis-era P2PKH address.
        let p2pkh_script =
            script_for_address("1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa", &MAINNET).unwrap();
        assert_eq!(p2pkh_script[0], OP_DUP);

        // A well-known P2SH address (version byte 0x05).
        let p2sh_script =
            script_for_address("3P14159f73E4gFr7JterCCQh9QjiTjiZrG", &MAINNET).unwrap();
        assert_eq!(p2sh_script[0], OP_HASH160);
        assert_eq!(p2sh_script.len(), 23);
        assert_eq!(*p2sh_script.last().unwrap(), OP_EQUAL);
    }

    #[test]
    fn test_script_for_segwit_address() {
        let script =
            script_for_address("bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4", &MAINNET).unwrap();
        assert_eq!(script[0], OP_0);
        assert_eq!(script[1], 20);
        assert_eq!(script.len(), 22);
        assert_eq!(
            hex::encode(&script[2..]),
            "751e76e8199196d454941c45d1b3a323f1433bd6"
        );
    }

    #[test]
    fn test_address_decoding_fails_closed() {
        assert!(decode_address("not-an-address", &MAINNET).is_err());
        // Testnet address against mainnet params.
        assert!(decode_address("mipcBbFg9gMiCh81Kj8tqqdgoZub1ZJRfn", &MAINNET).is_err());
        // Wrong-chain segwit hrp.
        assert!(decode_address(
            "tb1qw508d6qejxtdg4y5r3zarvary0c5xw7kxpjzsx",
            &MAINNET
        )
        .is_err());
    }

    #[test]
    fn test_op_return_script_shape() {
        let script = op_return(b"hello");
        assert!(is_op_return(&script));
        assert_eq!(script, vec![OP_RETURN, 5, b'h', b'e', b'l', b'l', b'o']);
    }

    #[test]
    fn test_pushdata1_for_long_payloads() {
        let payload = [0xaa_u8; 80];
        let script = op_return(&payload);
        assert_eq!(script[1], OP_PUSHDATA1);
        assert_eq!(script[2], 80);
        assert_eq!(script.len(), 83);
    }
}
