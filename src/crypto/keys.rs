//! Key encoding: raw/hex/WIF private keys, the public-key wire formats,
//! and address derivation.
//!
//! Format detection is by exact length and prefix only; anything
//! ambiguous or unknown is a typed format error, never a best-effort
//! guess.

use crate::chain::ChainParams;
use crate::crypto::ec::{self, Point};
use crate::crypto::hashes::{base58check_decode, base58check_encode, hash160};
use crate::error::CryptoError;
use bech32::Hrp;
use num_bigint::BigInt;
use num_traits::Zero;
use zeroize::Zeroize;

// ============================================================================
// Formats
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PrivKeyFormat {
    /// Raw 32 bytes.
    Bin,
    /// Raw 32 bytes plus the 0x01 compression flag.
    BinCompressed,
    /// 64 hex characters.
    Hex,
    /// 66 hex characters ending in `01`.
    HexCompressed,
    Wif,
    WifCompressed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PubKeyFormat {
    /// 65 bytes, `04 ‖ x ‖ y`.
    Bin,
    /// 33 bytes, `02|03 ‖ x`.
    BinCompressed,
    /// 64 bytes, `x ‖ y` with no prefix (electrum style).
    BinElectrum,
    Hex,
    HexCompressed,
    HexElectrum,
}

/// A key rendered in some format: raw bytes or printable text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EncodedKey {
    Bytes(Vec<u8>),
    Text(String),
}

// ============================================================================
// Private Keys
// ============================================================================

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PrivateKey {
    pub secret: BigInt,
    pub compressed: bool,
}

impl PrivateKey {
    /// Accepts a scalar in [1, N-1].
    pub fn from_scalar(secret: BigInt, compressed: bool) -> Result<Self, CryptoError> {
        if secret.is_zero() || secret >= ec::curve().n {
            return Err(CryptoError::ScalarOutOfRange);
        }
        Ok(Self { secret, compressed })
    }

    pub fn from_bytes32(bytes: &[u8; 32], compressed: bool) -> Result<Self, CryptoError> {
        Self::from_scalar(ec::bytes_to_int(bytes), compressed)
    }

    pub fn to_bytes32(&self) -> [u8; 32] {
        ec::int_to_bytes32(&self.secret)
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey {
            point: ec::g_multiply(&self.secret),
            compressed: self.compressed,
        }
    }

    pub fn encode(&self, format: PrivKeyFormat, params: &ChainParams) -> EncodedKey {
        let raw = self.to_bytes32();
        match format {
            PrivKeyFormat::Bin => EncodedKey::Bytes(raw.to_vec()),
            PrivKeyFormat::BinCompressed => {
                let mut v = raw.to_vec();
                v.push(0x01);
                EncodedKey::Bytes(v)
            }
            PrivKeyFormat::Hex => EncodedKey::Text(hex::encode(raw)),
            PrivKeyFormat::HexCompressed => {
                let mut s = hex::encode(raw);
                s.push_str("01");
                EncodedKey::Text(s)
            }
            PrivKeyFormat::Wif => {
                let mut payload = Vec::with_capacity(33);
                payload.push(params.wif_version);
                payload.extend_from_slice(&raw);
                let out = base58check_encode(&payload);
                payload.zeroize();
                EncodedKey::Text(out)
            }
            PrivKeyFormat::WifCompressed => {
                let mut payload = Vec::with_capacity(34);
                payload.push(params.wif_version);
                payload.extend_from_slice(&raw);
                payload.push(0x01);
                let out = base58check_encode(&payload);
                payload.zeroize();
                EncodedKey::Text(out)
            }
        }
    }

    /// Auto-detect a byte encoding: 32 raw, or 33 with the 0x01 flag.
    pub fn decode_bytes(bytes: &[u8]) -> Result<(Self, PrivKeyFormat), CryptoError> {
        match bytes.len() {
            32 => {
                let key = Self::from_scalar(ec::bytes_to_int(bytes), false)?;
                Ok((key, PrivKeyFormat::Bin))
            }
            33 if bytes[32] == 0x01 => {
                let key = Self::from_scalar(ec::bytes_to_int(&bytes[..32]), true)?;
                Ok((key, PrivKeyFormat::BinCompressed))
            }
            _ => Err(CryptoError::UnknownPrivateKeyFormat),
        }
    }

    /// Auto-detect a text encoding: 64/66-char hex or WIF.
    pub fn decode_text(s: &str, params: &ChainParams) -> Result<(Self, PrivKeyFormat), CryptoError> {
        let is_hex = s.len() % 2 == 0 && s.chars().all(|c| c.is_ascii_hexdigit());
        match s.len() {
            64 if is_hex => {
                let bytes = hex::decode(s).map_err(|_| CryptoError::UnknownPrivateKeyFormat)?;
                let key = Self::from_scalar(ec::bytes_to_int(&bytes), false)?;
                Ok((key, PrivKeyFormat::Hex))
            }
            66 if is_hex && s.ends_with("01") => {
                let bytes = hex::decode(s).map_err(|_| CryptoError::UnknownPrivateKeyFormat)?;
                let key = Self::from_scalar(ec::bytes_to_int(&bytes[..32]), true)?;
                Ok((key, PrivKeyFormat::HexCompressed))
            }
            _ => Self::decode_wif(s, params),
        }
    }

    pub fn decode_wif(s: &str, params: &ChainParams) -> Result<(Self, PrivKeyFormat), CryptoError> {
        let mut payload = base58check_decode(s)?;
        let result = match payload.as_slice() {
            [version, key @ ..] if *version == params.wif_version && key.len() == 32 => {
                Self::from_scalar(ec::bytes_to_int(key), false)
                    .map(|k| (k, PrivKeyFormat::Wif))
            }
            [version, key @ .., 0x01] if *version == params.wif_version && key.len() == 32 => {
                Self::from_scalar(ec::bytes_to_int(key), true)
                    .map(|k| (k, PrivKeyFormat::WifCompressed))
            }
            _ => Err(CryptoError::UnknownPrivateKeyFormat),
        };
        payload.zeroize();
        result
    }
}

// ============================================================================
// Public Keys
// ============================================================================

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublicKey {
    pub point: Point,
    pub compressed: bool,
}

impl PublicKey {
    pub fn from_point(point: Point, compressed: bool) -> Result<Self, CryptoError> {
        if point.is_infinity() || !ec::is_on_curve(&point) {
            return Err(CryptoError::NotOnCurve);
        }
        Ok(Self { point, compressed })
    }

    /// Wire bytes in this key's own compression.
    pub fn to_bytes(&self) -> Vec<u8> {
        if self.compressed {
            self.compressed_bytes().to_vec()
        } else {
            self.uncompressed_bytes().to_vec()
        }
    }

    pub fn compressed_bytes(&self) -> [u8; 33] {
        let mut out = [0u8; 33];
        out[0] = if self.point.y_is_even() { 0x02 } else { 0x03 };
        out[1..].copy_from_slice(&ec::int_to_bytes32(&self.point.x));
        out
    }

    pub fn uncompressed_bytes(&self) -> [u8; 65] {
        let mut out = [0u8; 65];
        out[0] = 0x04;
        out[1..33].copy_from_slice(&ec::int_to_bytes32(&self.point.x));
        out[33..].copy_from_slice(&ec::int_to_bytes32(&self.point.y));
        out
    }

    pub fn encode(&self, format: PubKeyFormat) -> EncodedKey {
        match format {
            PubKeyFormat::Bin => EncodedKey::Bytes(self.uncompressed_bytes().to_vec()),
            PubKeyFormat::BinCompressed => EncodedKey::Bytes(self.compressed_bytes().to_vec()),
            PubKeyFormat::BinElectrum => {
                EncodedKey::Bytes(self.uncompressed_bytes()[1..].to_vec())
            }
            PubKeyFormat::Hex => EncodedKey::Text(hex::encode(self.uncompressed_bytes())),
            PubKeyFormat::HexCompressed => EncodedKey::Text(hex::encode(self.compressed_bytes())),
            PubKeyFormat::HexElectrum => {
                EncodedKey::Text(hex::encode(&self.uncompressed_bytes()[1..]))
            }
        }
    }

    /// Auto-detect by exact length and prefix: 65 (`04`), 33 (`02|03`)
    /// or 64 (electrum, no prefix).
    pub fn decode_bytes(bytes: &[u8]) -> Result<(Self, PubKeyFormat), CryptoError> {
        match bytes.len() {
            65 if bytes[0] == 0x04 => {
                let x = ec::bytes_to_int(&bytes[1..33]);
                let y = ec::bytes_to_int(&bytes[33..]);
                let key = Self::from_point(Point::new(x, y), false)?;
                Ok((key, PubKeyFormat::Bin))
            }
            33 if bytes[0] == 0x02 || bytes[0] == 0x03 => {
                let x = ec::bytes_to_int(&bytes[1..]);
                let point = ec::decompress(&x, bytes[0] == 0x03)?;
                let key = Self::from_point(point, true)?;
                Ok((key, PubKeyFormat::BinCompressed))
            }
            64 => {
                let x = ec::bytes_to_int(&bytes[..32]);
                let y = ec::bytes_to_int(&bytes[32..]);
                let key = Self::from_point(Point::new(x, y), false)?;
                Ok((key, PubKeyFormat::BinElectrum))
            }
            _ => Err(CryptoError::UnknownPublicKeyFormat),
        }
    }

    pub fn decode_text(s: &str) -> Result<(Self, PubKeyFormat), CryptoError> {
        if !(s.len() % 2 == 0 && s.chars().all(|c| c.is_ascii_hexdigit())) {
            return Err(CryptoError::UnknownPublicKeyFormat);
        }
        let bytes = hex::decode(s).map_err(|_| CryptoError::UnknownPublicKeyFormat)?;
        let (key, format) = Self::decode_bytes(&bytes)?;
        let format = match format {
            PubKeyFormat::Bin => PubKeyFormat::Hex,
            PubKeyFormat::BinCompressed => PubKeyFormat::HexCompressed,
            PubKeyFormat::BinElectrum => PubKeyFormat::HexElectrum,
            other => other,
        };
        Ok((key, format))
    }

    /// Legacy Base58Check address for this key's own encoding.
    pub fn address(&self, params: &ChainParams) -> String {
        pubkey_to_address(&self.to_bytes(), params.p2pkh_version)
    }

    /// Native-segwit P2WPKH address; always over the compressed encoding.
    pub fn segwit_address(&self, params: &ChainParams) -> Result<String, CryptoError> {
        let program = hash160(&self.compressed_bytes());
        let hrp = Hrp::parse(params.bech32_hrp)
            .map_err(|e| CryptoError::BadAddress(e.to_string()))?;
        bech32::segwit::encode_v0(hrp, &program)
            .map_err(|e| CryptoError::BadAddress(e.to_string()))
    }
}

/// Base58Check(version ‖ hash160(pubkey)).
pub fn pubkey_to_address(pubkey: &[u8], version: u8) -> String {
    let mut payload = Vec::with_capacity(21);
    payload.push(version);
    payload.extend_from_slice(&hash160(pubkey));
    base58check_encode(&payload)
}

/// Compress an encoded public key; already-compressed input passes
/// through unchanged.
pub fn compress(pubkey: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if pubkey.len() == 33 && (pubkey[0] == 0x02 || pubkey[0] == 0x03) {
        return Ok(pubkey.to_vec());
    }
    let (key, _) = PublicKey::decode_bytes(pubkey)?;
    Ok(key.compressed_bytes().to_vec())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::MAINNET;

    // The classic wiki example key.
    const EXAMPLE_HEX: &str = "0c28fca386c7a227600b2fe50b7cae11ec86d3bf1fbe471be89827e19d72aa1d";
    const EXAMPLE_WIF: &str = "5HueCGU8rMjxEXxiPuD5BDku4MkFqeZyd4dZ1jvhTVqvbTLvyTJ";
    const EXAMPLE_WIF_COMPRESSED: &str = "KwdMAjGmerYanjeui5SHS7JkmpZvVipYvB2LJGU1ZxJwYvP98617";

    fn example_key(compressed: bool) -> PrivateKey {
        let bytes: [u8; 32] = hex::decode(EXAMPLE_HEX).unwrap().try_into().unwrap();
        PrivateKey::from_bytes32(&bytes, compressed).unwrap()
    }

    #[test]
    fn test_wif_encode_known_vector() {
        let key = example_key(false);
        assert_eq!(
            key.encode(PrivKeyFormat::Wif, &MAINNET),
            EncodedKey::Text(EXAMPLE_WIF.to_string())
        );
        let key = example_key(true);
        assert_eq!(
            key.encode(PrivKeyFormat::WifCompressed, &MAINNET),
            EncodedKey::Text(EXAMPLE_WIF_COMPRESSED.to_string())
        );
    }

    #[test]
    fn test_wif_decode_roundtrip() {
        let (key, format) = PrivateKey::decode_text(EXAMPLE_WIF, &MAINNET).unwrap();
        assert_eq!(format, PrivKeyFormat::Wif);
        assert!(!key.compressed);
        assert_eq!(hex::encode(key.to_bytes32()), EXAMPLE_HEX);

        let (key, format) = PrivateKey::decode_text(EXAMPLE_WIF_COMPRESSED, &MAINNET).unwrap();
        assert_eq!(format, PrivKeyFormat::WifCompressed);
        assert!(key.compressed);
        assert_eq!(hex::encode(key.to_bytes32()), EXAMPLE_HEX);
    }

    #[test]
    fn test_every_private_format_roundtrips() {
        for (format, compressed) in [
            (PrivKeyFormat::Bin, false),
            (PrivKeyFormat::BinCompressed, true),
            (PrivKeyFormat::Hex, false),
            (PrivKeyFormat::HexCompressed, true),
            (PrivKeyFormat::Wif, false),
            (PrivKeyFormat::WifCompressed, true),
        ] {
            let key = example_key(compressed);
            let (decoded, detected) = match key.encode(format, &MAINNET) {
                EncodedKey::Bytes(b) => PrivateKey::decode_bytes(&b).unwrap(),
                EncodedKey::Text(t) => PrivateKey::decode_text(&t, &MAINNET).unwrap(),
            };
            assert_eq!(detected, format);
            assert_eq!(decoded, key);
        }
    }

    #[test]
    fn test_wrong_network_wif_rejected() {
        assert!(PrivateKey::decode_text(EXAMPLE_WIF, &crate::chain::TESTNET).is_err());
    }

    #[test]
    fn test_unknown_format_fails_closed() {
        assert!(PrivateKey::decode_bytes(&[0u8; 31]).is_err());
        assert!(PrivateKey::decode_text("zz", &MAINNET).is_err());
    }

    #[test]
    fn test_zero_scalar_rejected() {
        assert!(PrivateKey::from_scalar(BigInt::zero(), true).is_err());
    }

    #[test]
    fn test_pubkey_formats_roundtrip() {
        let key = example_key(true).public_key();
        for format in [
            PubKeyFormat::Bin,
            PubKeyFormat::BinCompressed,
            PubKeyFormat::BinElectrum,
            PubKeyFormat::Hex,
            PubKeyFormat::HexCompressed,
            PubKeyFormat::HexElectrum,
        ] {
            let (decoded, detected) = match key.encode(format) {
                EncodedKey::Bytes(b) => PublicKey::decode_bytes(&b).unwrap(),
                EncodedKey::Text(t) => PublicKey::decode_text(&t).unwrap(),
            };
            assert_eq!(detected, format);
            assert_eq!(decoded.point, key.point);
        }
    }

    #[test]
    fn test_compress_is_idempotent() {
        let key = example_key(false).public_key();
        let once = compress(&key.uncompressed_bytes()).unwrap();
        let twice = compress(&once).unwrap();
        assert_eq!(once, twice);
        assert_eq!(once, key.compressed_bytes().to_vec());
    }

    #[test]
    fn test_known_address_vector() {
        // Wiki example: this compressed pubkey hashes to 1PMycacnJ...
        let pubkey =
            hex::decode("0250863ad64a87ae8a2fe83c1af1a8403cb53f53e486d8511dad8a04887e5b2352")
                .unwrap();
        assert_eq!(
            pubkey_to_address(&pubkey, MAINNET.p2pkh_version),
            "1PMycacnJaSqwwJqjawXBErnLsZ7RkXUAs"
        );
    }

    #[test]
    fn test_segwit_address_for_generator_key() {
        let key = PrivateKey::from_scalar(BigInt::from(1u8), true)
            .unwrap()
            .public_key();
        assert_eq!(
            key.segwit_address(&MAINNET).unwrap(),
            "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4"
        );
    }

    #[test]
    fn test_compression_changes_address_not_key() {
        let a = example_key(false);
        let b = example_key(true);
        assert_eq!(a.secret, b.secret);
        assert_ne!(a.public_key().address(&MAINNET), b.public_key().address(&MAINNET));
    }
}
