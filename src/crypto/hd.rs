//! Hierarchical-deterministic key derivation.
//!
//! Seed → master extended key via HMAC-SHA512 keyed with "Bitcoin seed";
//! children via the hardened (`0x00 ‖ priv ‖ index`) or normal
//! (`serP(pub) ‖ index`) HMAC input. Re-deriving the same path from the
//! same seed is deterministic, byte for byte, which the BIP32 test
//! vectors pin down.

use crate::chain::ChainParams;
use crate::crypto::ec::{self, Point};
use crate::crypto::hashes::{base58check_decode, base58check_encode, hash160, hmac_sha512};
use crate::crypto::keys::PublicKey;
use crate::error::CryptoError;
use num_bigint::BigInt;
use num_traits::Zero;
use std::fmt;

/// Indices at or above this are hardened.
pub const HARDENED_OFFSET: u32 = 0x8000_0000;

// ============================================================================
// Derivation Paths
// ============================================================================

/// Parsed form of `m/44'/0'/0'/0/0`; `'` marks a hardened index.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DerivationPath(pub Vec<u32>);

impl DerivationPath {
    /// Strict parse; malformed input fails closed, never truncates.
    pub fn parse(path: &str) -> Result<Self, CryptoError> {
        let bad = |reason: &str| CryptoError::BadDerivationPath {
            path: path.to_string(),
            reason: reason.to_string(),
        };

        let mut parts = path.split('/');
        if parts.next() != Some("m") {
            return Err(bad("must start with 'm'"));
        }
        let mut indices = Vec::new();
        for part in parts {
            if part.is_empty() {
                return Err(bad("empty path segment"));
            }
            let (digits, hardened) = match part.strip_suffix('\'') {
                Some(rest) => (rest, true),
                None => (part, false),
            };
            if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
                return Err(bad("segment is not an index"));
            }
            let index: u32 = digits.parse().map_err(|_| bad("index out of range"))?;
            if index >= HARDENED_OFFSET {
                return Err(bad("index out of range"));
            }
            indices.push(if hardened { index + HARDENED_OFFSET } else { index });
        }
        Ok(Self(indices))
    }

    pub fn is_fully_normal(&self) -> bool {
        self.0.iter().all(|i| *i < HARDENED_OFFSET)
    }
}

impl fmt::Display for DerivationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "m")?;
        for index in &self.0 {
            if *index >= HARDENED_OFFSET {
                write!(f, "/{}'", index - HARDENED_OFFSET)?;
            } else {
                write!(f, "/{index}")?;
            }
        }
        Ok(())
    }
}

// ============================================================================
// Extended Keys
// ============================================================================

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum KeyMaterial {
    Private(BigInt),
    Public(Point),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtendedKey {
    pub version: [u8; 4],
    pub depth: u8,
    pub parent_fingerprint: [u8; 4],
    pub child_number: u32,
    pub chain_code: [u8; 32],
    pub key: KeyMaterial,
}

impl ExtendedKey {
    /// Master key from a seed: HMAC-SHA512("Bitcoin seed", seed),
    /// left half key, right half chain code.
    pub fn master(seed: &[u8], params: &ChainParams) -> Result<Self, CryptoError> {
        let digest = hmac_sha512(b"Bitcoin seed", seed);
        let key = ec::bytes_to_int(&digest[..32]);
        if key.is_zero() || key >= ec::curve().n {
            return Err(CryptoError::InvalidChildKey(0));
        }
        let mut chain_code = [0u8; 32];
        chain_code.copy_from_slice(&digest[32..]);
        Ok(Self {
            version: params.bip32_priv,
            depth: 0,
            parent_fingerprint: [0u8; 4],
            child_number: 0,
            chain_code,
            key: KeyMaterial::Private(key),
        })
    }

    pub fn is_private(&self) -> bool {
        matches!(self.key, KeyMaterial::Private(_))
    }

    pub fn public_point(&self) -> Point {
        match &self.key {
            KeyMaterial::Private(k) => ec::g_multiply(k),
            KeyMaterial::Public(p) => p.clone(),
        }
    }

    /// 33-byte compressed public key for this node.
    pub fn public_key_bytes(&self) -> [u8; 33] {
        let point = self.public_point();
        let mut out = [0u8; 33];
        out[0] = if point.y_is_even() { 0x02 } else { 0x03 };
        out[1..].copy_from_slice(&ec::int_to_bytes32(&point.x));
        out
    }

    pub fn identifier(&self) -> [u8; 20] {
        hash160(&self.public_key_bytes())
    }

    pub fn fingerprint(&self) -> [u8; 4] {
        let id = self.identifier();
        [id[0], id[1], id[2], id[3]]
    }

    /// Legacy P2PKH address of this node's public key.
    pub fn address(&self, params: &ChainParams) -> String {
        crate::crypto::keys::pubkey_to_address(&self.public_key_bytes(), params.p2pkh_version)
    }

    /// One BIP32 child step. Hardened indices need a private parent.
    pub fn derive_child(&self, index: u32, params: &ChainParams) -> Result<Self, CryptoError> {
        let hardened = index >= HARDENED_OFFSET;
        let mut data = Vec::with_capacity(37);
        match (&self.key, hardened) {
            (KeyMaterial::Public(_), true) => return Err(CryptoError::HardenedFromPublic),
            (KeyMaterial::Private(k), true) => {
                data.push(0x00);
                data.extend_from_slice(&ec::int_to_bytes32(k));
            }
            (_, false) => data.extend_from_slice(&self.public_key_bytes()),
        }
        data.extend_from_slice(&index.to_be_bytes());

        let digest = hmac_sha512(&self.chain_code, &data);
        let il = ec::bytes_to_int(&digest[..32]);
        if il >= ec::curve().n {
            return Err(CryptoError::InvalidChildKey(index));
        }
        let mut chain_code = [0u8; 32];
        chain_code.copy_from_slice(&digest[32..]);

        let key = match &self.key {
            KeyMaterial::Private(k) => {
                let child = ec::umod(&(&il + k), &ec::curve().n);
                if child.is_zero() {
                    return Err(CryptoError::InvalidChildKey(index));
                }
                KeyMaterial::Private(child)
            }
            KeyMaterial::Public(point) => {
                let child = ec::add(&ec::g_multiply(&il), point);
                if child.is_infinity() {
                    return Err(CryptoError::InvalidChildKey(index));
                }
                KeyMaterial::Public(child)
            }
        };

        Ok(Self {
            version: if self.is_private() {
                params.bip32_priv
            } else {
                params.bip32_pub
            },
            depth: self.depth.wrapping_add(1),
            parent_fingerprint: self.fingerprint(),
            child_number: index,
            chain_code,
            key,
        })
    }

    /// Fold `derive_child` over a parsed path.
    pub fn derive_path(
        &self,
        path: &DerivationPath,
        params: &ChainParams,
    ) -> Result<Self, CryptoError> {
        let mut node = self.clone();
        for index in &path.0 {
            node = node.derive_child(*index, params)?;
        }
        Ok(node)
    }

    /// Drop the private material, keeping depth, fingerprint and chain
    /// code untouched.
    pub fn neuter(&self, params: &ChainParams) -> Self {
        Self {
            version: params.bip32_pub,
            depth: self.depth,
            parent_fingerprint: self.parent_fingerprint,
            child_number: self.child_number,
            chain_code: self.chain_code,
            key: KeyMaterial::Public(self.public_point()),
        }
    }

    /// The public key object for this node (compressed).
    pub fn public_key(&self) -> Result<PublicKey, CryptoError> {
        PublicKey::from_point(self.public_point(), true)
    }

    /// Base58Check string (`xprv…`/`xpub…`/`tprv…`/`tpub…`).
    pub fn serialize(&self) -> String {
        let mut payload = Vec::with_capacity(78);
        payload.extend_from_slice(&self.version);
        payload.push(self.depth);
        payload.extend_from_slice(&self.parent_fingerprint);
        payload.extend_from_slice(&self.child_number.to_be_bytes());
        payload.extend_from_slice(&self.chain_code);
        match &self.key {
            KeyMaterial::Private(k) => {
                payload.push(0x00);
                payload.extend_from_slice(&ec::int_to_bytes32(k));
            }
            KeyMaterial::Public(_) => payload.extend_from_slice(&self.public_key_bytes()),
        }
        base58check_encode(&payload)
    }

    /// Parse and validate against the chain's version bytes; the
    /// checksum is validated by the Base58Check layer.
    pub fn parse(s: &str, params: &ChainParams) -> Result<Self, CryptoError> {
        let payload = base58check_decode(s)?;
        if payload.len() != 78 {
            return Err(CryptoError::BadExtendedKey(format!(
                "expected 78 payload bytes, got {}",
                payload.len()
            )));
        }
        let version: [u8; 4] = payload[0..4].try_into().expect("sized above");
        let depth = payload[4];
        let parent_fingerprint: [u8; 4] = payload[5..9].try_into().expect("sized above");
        let child_number = u32::from_be_bytes(payload[9..13].try_into().expect("sized above"));
        let mut chain_code = [0u8; 32];
        chain_code.copy_from_slice(&payload[13..45]);
        let key_bytes = &payload[45..78];

        let key = if version == params.bip32_priv {
            if key_bytes[0] != 0x00 {
                return Err(CryptoError::BadExtendedKey(
                    "private key material must start with 0x00".to_string(),
                ));
            }
            let k = ec::bytes_to_int(&key_bytes[1..]);
            if k.is_zero() || k >= ec::curve().n {
                return Err(CryptoError::ScalarOutOfRange);
            }
            KeyMaterial::Private(k)
        } else if version == params.bip32_pub {
            if key_bytes[0] != 0x02 && key_bytes[0] != 0x03 {
                return Err(CryptoError::BadExtendedKey(
                    "public key material must be a compressed point".to_string(),
                ));
            }
            let x = ec::bytes_to_int(&key_bytes[1..]);
            KeyMaterial::Public(ec::decompress(&x, key_bytes[0] == 0x03)?)
        } else {
            return Err(CryptoError::BadExtendedKey(format!(
                "version bytes {} do not match chain '{}'",
                hex::encode(version),
                params.name
            )));
        };

        Ok(Self {
            version,
            depth,
            parent_fingerprint,
            child_number,
            chain_code,
            key,
        })
    }
}

/// Seed + path string → extended key, the everyday entry point.
pub fn derive_path(
    seed: &[u8],
    path: &str,
    params: &ChainParams,
) -> Result<ExtendedKey, CryptoError> {
    let parsed = DerivationPath::parse(path)?;
    ExtendedKey::master(seed, params)?.derive_path(&parsed, params)
}

// ============================================================================
// Tests
// ============================================================================
