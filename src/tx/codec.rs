//! Binary raw-transaction codec.
//!
//! Canonical layout: `version:4LE ‖ varint(n_in) ‖ inputs ‖
//! varint(n_out) ‖ outputs ‖ locktime:4LE`; inputs carry the previous
//! txid byte-reversed. Scripts start empty at build time and are filled
//! in by the signer.

use crate::chain::ChainParams;
use crate::crypto::hashes::sha256d;
use crate::error::CryptoError;
use crate::tx::script;
use serde::{Deserialize, Serialize};

pub const DEFAULT_VERSION: u32 = 1;
pub const DEFAULT_SEQUENCE: u32 = 0xffff_ffff;
/// Standardness cap on OP_RETURN payloads.
pub const MAX_OP_RETURN: usize = 80;

// ============================================================================
// Domain Types
// ============================================================================

/// An unspent output as reported by the chain-data collaborator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utxo {
    pub address: String,
    /// Value in satoshis.
    pub value: u64,
    /// Display-order txid hex of the funding transaction.
    pub txid: String,
    pub vout: u32,
    pub confirmations: u32,
}

/// Where an output pays to: an address, or a literal script.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Destination {
    Address(String),
    Script(Vec<u8>),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Output {
    pub destination: Destination,
    pub value: u64,
}

impl Output {
    pub fn to_address(address: impl Into<String>, value: u64) -> Self {
        Self {
            destination: Destination::Address(address.into()),
            value,
        }
    }
}

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxIn {
    /// Previous txid in internal (reversed) byte order.
    pub prev_hash: [u8; 32],
    pub prev_index: u32,
    pub script_sig: Vec<u8>,
    pub sequence: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxOut {
    pub value: u64,
    pub script_pubkey: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawTransaction {
    pub version: u32,
    pub inputs: Vec<TxIn>,
    pub outputs: Vec<TxOut>,
    pub locktime: u32,
}

// ============================================================================
// Varints & Txids
// ============================================================================

pub fn write_varint(buf: &mut Vec<u8>, n: u64) {
    if n < 0xfd {
        buf.push(n as u8);
    } else if n <= 0xffff {
        buf.push(0xfd);
        buf.extend_from_slice(&(n as u16).to_le_bytes());
    } else if n <= 0xffff_ffff {
        buf.push(0xfe);
        buf.extend_from_slice(&(n as u32).to_le_bytes());
    } else {
        buf.push(0xff);
        buf.extend_from_slice(&n.to_le_bytes());
    }
}

/// Display-order txid hex → internal byte order.
pub fn txid_to_hash(txid: &str) -> Result<[u8; 32], CryptoError> {
    let mut bytes = hex::decode(txid)
        .map_err(|e| CryptoError::BadTransaction(format!("bad txid hex: {e}")))?;
    if bytes.len() != 32 {
        return Err(CryptoError::BadTransaction(format!(
            "txid must be 32 bytes, got {}",
            bytes.len()
        )));
    }
    bytes.reverse();
    let mut out = [0u8; 32];
    out.copy_from_slice(&bytes);
    Ok(out)
}

pub fn hash_to_txid(hash: &[u8; 32]) -> String {
    let mut bytes = *hash;
    bytes.reverse();
    hex::encode(bytes)
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], CryptoError> {
        if self.pos + n > self.bytes.len() {
            return Err(CryptoError::BadTransaction(format!(
                "truncated at byte {}",
                self.pos
            )));
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u32_le(&mut self) -> Result<u32, CryptoError> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().expect("sized")))
    }

    fn u64_le(&mut self) -> Result<u64, CryptoError> {
        Ok(u64::from_le_bytes(self.take(8)?.try_into().expect("sized")))
    }

    fn varint(&mut self) -> Result<u64, CryptoError> {
        let tag = self.take(1)?[0];
        Ok(match tag {
            0xfd => u16::from_le_bytes(self.take(2)?.try_into().expect("sized")) as u64,
            0xfe => u32::from_le_bytes(self.take(4)?.try_into().expect("sized")) as u64,
            0xff => u64::from_le_bytes(self.take(8)?.try_into().expect("sized")),
            n => n as u64,
        })
    }

    fn done(&self) -> bool {
        self.pos == self.bytes.len()
    }
}

// ============================================================================
// Build / Serialize / Deserialize
// ============================================================================

impl RawTransaction {
    /// Assemble an unsigned transaction: scripts on inputs stay empty.
    pub fn build(
        utxos: &[Utxo],
        outputs: &[Output],
        params: &ChainParams,
    ) -> Result<Self, CryptoError> {
        let mut inputs = Vec::with_capacity(utxos.len());
        for utxo in utxos {
            inputs.push(TxIn {
                prev_hash: txid_to_hash(&utxo.txid)?,
                prev_index: utxo.vout,
                script_sig: Vec::new(),
                sequence: DEFAULT_SEQUENCE,
            });
        }
        let mut outs = Vec::with_capacity(outputs.len());
        for output in outputs {
            let script_pubkey = match &output.destination {
                Destination::Address(addr) => script::script_for_address(addr, params)?,
                Destination::Script(script) => script.clone(),
            };
            outs.push(TxOut {
                value: output.value,
                script_pubkey,
            });
        }
        Ok(Self {
            version: DEFAULT_VERSION,
            inputs,
            outputs: outs,
            locktime: 0,
        })
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&self.version.to_le_bytes());
        write_varint(&mut buf, self.inputs.len() as u64);
        for input in &self.inputs {
            buf.extend_from_slice(&input.prev_hash);
            buf.extend_from_slice(&input.prev_index.to_le_bytes());
            write_varint(&mut buf, input.script_sig.len() as u64);
            buf.extend_from_slice(&input.script_sig);
            buf.extend_from_slice(&input.sequence.to_le_bytes());
        }
        write_varint(&mut buf, self.outputs.len() as u64);
        for output in &self.outputs {
            buf.extend_from_slice(&output.value.to_le_bytes());
            write_varint(&mut buf, output.script_pubkey.len() as u64);
            buf.extend_from_slice(&output.script_pubkey);
        }
        buf.extend_from_slice(&self.locktime.to_le_bytes());
        buf
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.serialize())
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self, CryptoError> {
        let mut r = Reader::new(bytes);
        let version = r.u32_le()?;

        let n_inputs = r.varint()?;
        let mut inputs = Vec::with_capacity(n_inputs.min(1024) as usize);
        for _ in 0..n_inputs {
            let mut prev_hash = [0u8; 32];
            prev_hash.copy_from_slice(r.take(32)?);
            let prev_index = r.u32_le()?;
            let script_len = r.varint()? as usize;
            let script_sig = r.take(script_len)?.to_vec();
            let sequence = r.u32_le()?;
            inputs.push(TxIn {
                prev_hash,
                prev_index,
                script_sig,
                sequence,
            });
        }

        let n_outputs = r.varint()?;
        let mut outputs = Vec::with_capacity(n_outputs.min(1024) as usize);
        for _ in 0..n_outputs {
            let value = r.u64_le()?;
            let script_len = r.varint()? as usize;
            let script_pubkey = r.take(script_len)?.to_vec();
            outputs.push(TxOut {
                value,
                script_pubkey,
            });
        }

        let locktime = r.u32_le()?;
        if !r.done() {
            return Err(CryptoError::BadTransaction(
                "trailing bytes after locktime".to_string(),
            ));
        }
        Ok(Self {
            version,
            inputs,
            outputs,
            locktime,
        })
    }

    pub fn from_hex(s: &str) -> Result<Self, CryptoError> {
        let bytes =
            hex::decode(s).map_err(|e| CryptoError::BadTransaction(format!("bad hex: {e}")))?;
        Self::deserialize(&bytes)
    }

    /// Display-order txid of the serialized transaction.
    pub fn txid(&self) -> String {
        hash_to_txid(&sha256d(&self.serialize()))
    }

    pub fn has_op_return(&self) -> bool {
        self.outputs
            .iter()
            .any(|o| script::is_op_return(&o.script_pubkey))
    }

    /// Append the single allowed zero-value OP_RETURN output.
    pub fn add_op_return(&mut self, message: &[u8]) -> Result<(), CryptoError> {
        if message.len() > MAX_OP_RETURN {
            return Err(CryptoError::Precondition(format!(
                "OP_RETURN payload is {} bytes, limit is {MAX_OP_RETURN}",
                message.len()
            )));
        }
        if self.has_op_return() {
            return Err(CryptoError::Precondition(
                "transaction already carries an OP_RETURN output".to_string(),
            ));
        }
        if self.outputs.iter().map(|o| o.value).sum::<u64>() == 0 {
            return Err(CryptoError::Precondition(
                "refusing OP_RETURN on a transaction whose outputs carry no value".to_string(),
            ));
        }
        self.outputs.push(TxOut {
            value: 0,
            script_pubkey: script::op_return(message),
        });
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::MAINNET;

    const FUNDING_TXID: &str = "4a5e1e4baab89f3a32518a88c31bc87f618f76673e2cc77ab2127b7afdeda33b";

    fn sample_utxo(value: u64) -> Utxo {
        Utxo {
            address: "1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa".to_string(),
            value,
            txid: FUNDING_TXID.to_string(),
            vout: 0,
            confirmations: 6,
        }
    }

    fn sample_tx() -> RawTransaction {
        RawTransaction::build(
            &[sample_utxo(50_000)],
            &[
                Output::to_address("1PMycacnJaSqwwJqjawXBErnLsZ7RkXUAs", 30_000),
                Output::to_address("3P14159f73E4gFr7JterCCQh9QjiTjiZrG", 19_000),
            ],
            &MAINNET,
        )
        .unwrap()
    }

    #[test]
    fn test_varint_boundaries() {
        for (n, expected) in [
            (0u64, vec![0x00]),
            (0xfc, vec![0xfc]),
            (0xfd, vec![0xfd, 0xfd, 0x00]),
            (0xffff, vec![0xfd, 0xff, 0xff]),
            (0x10000, vec![0xfe, 0x00, 0x00, 0x01, 0x00]),
        ] {
            let mut buf = Vec::new();
            write_varint(&mut buf, n);
            assert_eq!(buf, expected, "varint({n})");
        }
    }

    #[test]
    fn test_txid_byte_order() {
        let hash = txid_to_hash(FUNDING_TXID).unwrap();
        assert_eq!(hash_to_txid(&hash), FUNDING_TXID);
        // Reversal: first hash byte is the last txid byte pair.
        assert_eq!(hash[0], 0x3b);
    }

    #[test]
    fn test_build_leaves_scripts_empty() {
        let tx = sample_tx();
        assert!(tx.inputs.iter().all(|i| i.script_sig.is_empty()));
        assert_eq!(tx.outputs.len(), 2);
        assert_eq!(tx.outputs[0].value, 30_000);
    }

    #[test]
    fn test_serialize_layout() {
        let tx = sample_tx();
        let bytes = tx.serialize();
        assert_eq!(&bytes[0..4], &1u32.to_le_bytes());
        assert_eq!(bytes[4], 1); // input count
        // 4 version + 1 varint + 32 hash + 4 index + 1 empty script + 4 sequence
        assert_eq!(bytes[46], 2); // output count
        let len = bytes.len();
        assert_eq!(&bytes[len - 4..], &0u32.to_le_bytes()); // locktime
    }

    #[test]
    fn test_serialize_deserialize_roundtrip() {
        let mut tx = sample_tx();
        tx.add_op_return(b"invoice 42").unwrap();
        let decoded = RawTransaction::deserialize(&tx.serialize()).unwrap();
        assert_eq!(decoded, tx);
        assert_eq!(RawTransaction::from_hex(&tx.to_hex()).unwrap(), tx);
    }

    #[test]
    fn test_deserialize_rejects_truncation_and_garbage() {
        let bytes = sample_tx().serialize();
        assert!(RawTransaction::deserialize(&bytes[..bytes.len() - 1]).is_err());
        let mut extended = bytes.clone();
        extended.push(0x00);
        assert!(RawTransaction::deserialize(&extended).is_err());
    }

    #[test]
    fn test_op_return_limits() {
        let mut tx = sample_tx();
        assert!(tx.add_op_return(&[0u8; 81]).is_err());
        tx.add_op_return(&[0u8; 80]).unwrap();
        // Only one OP_RETURN per transaction.
        assert!(tx.add_op_return(b"again").is_err());
    }

    #[test]
    fn test_op_return_needs_valuable_outputs() {
        let mut tx = RawTransaction::build(
            &[sample_utxo(1_000)],
            &[Output::to_address("1PMycacnJaSqwwJqjawXBErnLsZ7RkXUAs", 0)],
            &MAINNET,
        )
        .unwrap();
        assert!(tx.add_op_return(b"data").is_err());
    }

    #[test]
    fn test_txid_stable_across_reserialization() {
        let tx = sample_tx();
        let txid = tx.txid();
        let reparsed = RawTransaction::from_hex(&tx.to_hex()).unwrap();
        assert_eq!(reparsed.txid(), txid);
    }
}
