//! Per-input transaction signing with up-front validation.
//!
//! Every precondition is checked before the first signature is
//! computed, so a rejected call performs no partial signing and
//! returns no transaction.

use crate::chain::ChainParams;
use crate::crypto::ecdsa;
use crate::crypto::hashes::sha256d;
use crate::crypto::keys::PrivateKey;
use crate::error::CryptoError;
use crate::tx::codec::{Output, RawTransaction, Utxo, MAX_OP_RETURN};
use crate::tx::script::{self, DecodedAddress};
use std::collections::HashMap;

/// The only sighash mode the engine emits.
pub const SIGHASH_ALL: u8 = 0x01;

// ============================================================================
// Sighash
// ============================================================================

/// Legacy signing form: every other input's script is blanked and the
/// signed input carries the locking script it spends; the 4-byte
/// sighash type is appended before double-SHA256.
pub fn signature_digest(
    tx: &RawTransaction,
    input_index: usize,
    script_pubkey: &[u8],
    sighash_type: u8,
) -> [u8; 32] {
    let mut form = tx.clone();
    for input in &mut form.inputs {
        input.script_sig.clear();
    }
    form.inputs[input_index].script_sig = script_pubkey.to_vec();
    let mut preimage = form.serialize();
    preimage.extend_from_slice(&(sighash_type as u32).to_le_bytes());
    sha256d(&preimage)
}

// ============================================================================
// make_custom_transaction
// ============================================================================

/// Build and sign a spend of the given inputs.
///
/// Preconditions, all enforced before any signing:
/// - `fee` equals `sum(inputs) − sum(outputs)` exactly;
/// - every input address has a private key in `keys`;
/// - every input has confirmations > 0;
/// - the optional OP_RETURN payload fits the 80-byte cap.
pub fn make_custom_transaction(
    keys: &HashMap<String, PrivateKey>,
    utxos: &[Utxo],
    outputs: &[Output],
    fee: u64,
    op_return: Option<&[u8]>,
    params: &ChainParams,
) -> Result<RawTransaction, CryptoError> {
    if utxos.is_empty() {
        return Err(CryptoError::Precondition(
            "transaction needs at least one input".to_string(),
        ));
    }
    if let Some(message) = op_return {
        if message.len() > MAX_OP_RETURN {
            return Err(CryptoError::Precondition(format!(
                "OP_RETURN payload is {} bytes, limit is {MAX_OP_RETURN}",
                message.len()
            )));
        }
    }

    let in_sum: u64 = utxos.iter().try_fold(0u64, |acc, u| {
        acc.checked_add(u.value).ok_or_else(|| {
            CryptoError::Precondition("input values overflow".to_string())
        })
    })?;
    let out_sum: u64 = outputs.iter().try_fold(0u64, |acc, o| {
        acc.checked_add(o.value).ok_or_else(|| {
            CryptoError::Precondition("output values overflow".to_string())
        })
    })?;
    if out_sum.checked_add(fee) != Some(in_sum) {
        return Err(CryptoError::Precondition(format!(
            "fee mismatch: inputs {in_sum} sat, outputs {out_sum} sat, fee {fee} sat"
        )));
    }

    // Resolve a signing key per input before touching anything else.
    let mut signing_keys = Vec::with_capacity(utxos.len());
    for utxo in utxos {
        if utxo.confirmations == 0 {
            return Err(CryptoError::Precondition(format!(
                "input {}:{} is unconfirmed",
                utxo.txid, utxo.vout
            )));
        }
        if !matches!(
            script::decode_address(&utxo.address, params)?,
            DecodedAddress::P2pkh(_)
        ) {
            return Err(CryptoError::Precondition(format!(
                "can only sign pay-to-pubkey-hash inputs, not {}",
                utxo.address
            )));
        }
        let key = keys.get(&utxo.address).ok_or_else(|| {
            CryptoError::Precondition(format!("no private key for input address {}", utxo.address))
        })?;
        let key = key_matching_address(key, &utxo.address, params).ok_or_else(|| {
            CryptoError::Precondition(format!(
                "private key does not control input address {}",
                utxo.address
            ))
        })?;
        signing_keys.push(key);
    }

    let mut tx = RawTransaction::build(utxos, outputs, params)?;
    if let Some(message) = op_return {
        tx.add_op_return(message)?;
    }

    for (index, (utxo, key)) in utxos.iter().zip(&signing_keys).enumerate() {
        let script_pubkey = script::script_for_address(&utxo.address, params)?;
        let digest = signature_digest(&tx, index, &script_pubkey, SIGHASH_ALL);
        let signature = ecdsa::sign_digest(&key.secret, &digest)?;

        let mut sig_bytes = signature.to_der();
        sig_bytes.push(SIGHASH_ALL);
        let pubkey_bytes = key.public_key().to_bytes();

        let mut script_sig = Vec::with_capacity(2 + sig_bytes.len() + pubkey_bytes.len());
        script::push_data(&mut script_sig, &sig_bytes);
        script::push_data(&mut script_sig, &pubkey_bytes);
        tx.inputs[index].script_sig = script_sig;
    }

    Ok(tx)
}

/// Match a stored key to the address it must spend, flipping the
/// compression flag if that is what the address was derived from.
fn key_matching_address(
    key: &PrivateKey,
    address: &str,
    params: &ChainParams,
) -> Option<PrivateKey> {
    if key.public_key().address(params) == address {
        return Some(key.clone());
    }
    let flipped = PrivateKey {
        secret: key.secret.clone(),
        compressed: !key.compressed,
    };
    if flipped.public_key().address(params) == address {
        return Some(flipped);
    }
    None
}

// ============================================================================
// Tests
// ============================================================================
