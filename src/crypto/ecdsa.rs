//! Deterministic ECDSA over secp256k1.
//!
//! Nonces come from the RFC6979 HMAC-SHA256 DRBG, so the same
//! (key, digest) pair always yields the same signature and randomness
//! is removed as an attack surface. Every produced signature is
//! normalized to low-S before leaving this module.

use crate::crypto::ec::{self, Point};
use crate::crypto::hashes::hmac_sha256;
use crate::error::CryptoError;
use num_bigint::BigInt;
use num_traits::{One, Zero};

// ============================================================================
// Signatures
// ============================================================================

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Signature {
    pub r: BigInt,
    pub s: BigInt,
}

impl Signature {
    /// `s` in the lower half of the order — the canonical,
    /// non-malleable form.
    pub fn is_low_s(&self) -> bool {
        self.s <= (&ec::curve().n >> 1)
    }

    pub fn normalize(mut self) -> Self {
        if !self.is_low_s() {
            self.s = &ec::curve().n - &self.s;
        }
        self
    }

    /// Minimal DER: SEQUENCE of two INTEGERs, zero-padded when the
    /// high bit is set.
    pub fn to_der(&self) -> Vec<u8> {
        fn der_int(v: &BigInt) -> Vec<u8> {
            let (_, mut bytes) = v.to_bytes_be();
            if bytes.is_empty() {
                bytes.push(0);
            }
            if bytes[0] & 0x80 != 0 {
                bytes.insert(0, 0);
            }
            bytes
        }
        let r = der_int(&self.r);
        let s = der_int(&self.s);
        let mut out = Vec::with_capacity(6 + r.len() + s.len());
        out.push(0x30);
        out.push((4 + r.len() + s.len()) as u8);
        out.push(0x02);
        out.push(r.len() as u8);
        out.extend_from_slice(&r);
        out.push(0x02);
        out.push(s.len() as u8);
        out.extend_from_slice(&s);
        out
    }

    pub fn from_der(bytes: &[u8]) -> Result<Self, CryptoError> {
        let bad = |reason: &str| CryptoError::BadSignature(reason.to_string());
        if bytes.len() < 8 || bytes[0] != 0x30 {
            return Err(bad("not a DER sequence"));
        }
        if bytes[1] as usize != bytes.len() - 2 {
            return Err(bad("sequence length mismatch"));
        }
        let mut cursor = 2usize;
        let mut read_int = |bytes: &[u8]| -> Result<BigInt, CryptoError> {
            if cursor + 2 > bytes.len() || bytes[cursor] != 0x02 {
                return Err(bad("expected DER integer"));
            }
            let len = bytes[cursor + 1] as usize;
            cursor += 2;
            if cursor + len > bytes.len() || len == 0 {
                return Err(bad("integer length out of bounds"));
            }
            let value = ec::bytes_to_int(&bytes[cursor..cursor + len]);
            cursor += len;
            Ok(value)
        };
        let r = read_int(bytes)?;
        let s = read_int(bytes)?;
        if cursor != bytes.len() {
            return Err(bad("trailing bytes"));
        }
        Ok(Self { r, s })
    }
}

// ============================================================================
// RFC6979 Nonce Derivation
// ============================================================================

/// HMAC-DRBG over SHA-256, seeded with the key and message digest.
pub fn deterministic_nonce(secret: &BigInt, digest: &[u8; 32]) -> BigInt {
    let n = &ec::curve().n;
    let x = ec::int_to_bytes32(secret);
    // bits2octets: reduce the digest mod n before seeding.
    let h = ec::int_to_bytes32(&ec::umod(&ec::bytes_to_int(digest), n));

    let mut v = [0x01u8; 32];
    let mut k = [0x00u8; 32];

    let mut seed = Vec::with_capacity(32 + 1 + 32 + 32);
    seed.extend_from_slice(&v);
    seed.push(0x00);
    seed.extend_from_slice(&x);
    seed.extend_from_slice(&h);
    k = hmac_sha256(&k, &seed);
    v = hmac_sha256(&k, &v);

    seed.clear();
    seed.extend_from_slice(&v);
    seed.push(0x01);
    seed.extend_from_slice(&x);
    seed.extend_from_slice(&h);
    k = hmac_sha256(&k, &seed);
    v = hmac_sha256(&k, &v);

    loop {
        v = hmac_sha256(&k, &v);
        let candidate = ec::bytes_to_int(&v);
        if candidate >= BigInt::one() && candidate < *n {
            return candidate;
        }
        let mut retry = Vec::with_capacity(33);
        retry.extend_from_slice(&v);
        retry.push(0x00);
        k = hmac_sha256(&k, &retry);
        v = hmac_sha256(&k, &v);
    }
}

// ============================================================================
// Sign / Verify
// ============================================================================

/// Sign a 32-byte digest; the result is always low-S.
pub fn sign_digest(secret: &BigInt, digest: &[u8; 32]) -> Result<Signature, CryptoError> {
    let n = &ec::curve().n;
    if secret.is_zero() || secret >= n {
        return Err(CryptoError::ScalarOutOfRange);
    }
    let z = ec::umod(&ec::bytes_to_int(digest), n);
    let k = deterministic_nonce(secret, digest);

    let r_point = ec::g_multiply(&k);
    let r = ec::umod(&r_point.x, n);
    if r.is_zero() {
        // Astronomically unlikely for a 256-bit curve.
        return Err(CryptoError::BadSignature("r is zero".to_string()));
    }
    let s = ec::umod(&(ec::mod_inverse(&k, n) * (&z + &r * secret)), n);
    if s.is_zero() {
        return Err(CryptoError::BadSignature("s is zero".to_string()));
    }
    Ok(Signature { r, s }.normalize())
}

pub fn verify_digest(public: &Point, digest: &[u8; 32], sig: &Signature) -> bool {
    let n = &ec::curve().n;
    if public.is_infinity() || !ec::is_on_curve(public) {
        return false;
    }
    if sig.r.is_zero() || sig.r >= *n || sig.s.is_zero() || sig.s >= *n {
        return false;
    }
    let z = ec::umod(&ec::bytes_to_int(digest), n);
    let w = ec::mod_inverse(&sig.s, n);
    let u1 = ec::umod(&(&z * &w), n);
    let u2 = ec::umod(&(&sig.r * &w), n);
    let x = ec::add(&ec::g_multiply(&u1), &ec::multiply(public, &u2));
    if x.is_infinity() {
        return false;
    }
    ec::umod(&x.x, n) == sig.r
}

// ============================================================================
// Tests
// ============================================================================
