//! secp256k1 point arithmetic.
//!
//! Public operations accept and return affine coordinates; accumulation
//! happens in Jacobian projective coordinates so each public call pays
//! for a single modular inversion. The identity is the affine pair
//! (0, 0). Everything here is deterministic: identical inputs produce
//! bit-identical outputs, which is what lets the derivation and signing
//! layers be checked against the published BIP32 vectors.

use crate::error::CryptoError;
use num_bigint::{BigInt, Sign};
use num_traits::{One, Signed, Zero};
use std::sync::OnceLock;

// ============================================================================
// Curve Parameters
// ============================================================================

/// Fixed secp256k1 parameters: y² = x³ + 7 over F_p.
pub struct Curve {
    /// Field prime, 2^256 - 2^32 - 977.
    pub p: BigInt,
    /// Group order.
    pub n: BigInt,
    /// Base point.
    pub gx: BigInt,
    pub gy: BigInt,
}

fn hex_int(s: &str) -> BigInt {
    BigInt::parse_bytes(s.as_bytes(), 16).expect("valid hex constant")
}

pub fn curve() -> &'static Curve {
    static CURVE: OnceLock<Curve> = OnceLock::new();
    CURVE.get_or_init(|| Curve {
        p: hex_int("fffffffffffffffffffffffffffffffffffffffffffffffffffffffefffffc2f"),
        n: hex_int("fffffffffffffffffffffffffffffffebaaedce6af48a03bbfd25e8cd0364141"),
        gx: hex_int("79be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798"),
        gy: hex_int("483ada7726a3c4655da4fbfc0e1108a8fd17b448a68554199c47d08ffb10d4b8"),
    })
}

/// Least non-negative residue of `a` mod `m`.
pub(crate) fn umod(a: &BigInt, m: &BigInt) -> BigInt {
    let r = a % m;
    if r.is_negative() {
        r + m
    } else {
        r
    }
}

// ============================================================================
// Points
// ============================================================================

/// Affine point; (0, 0) encodes the point at infinity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Point {
    pub x: BigInt,
    pub y: BigInt,
}

impl Point {
    pub fn new(x: BigInt, y: BigInt) -> Self {
        Self { x, y }
    }

    pub fn infinity() -> Self {
        Self {
            x: BigInt::zero(),
            y: BigInt::zero(),
        }
    }

    pub fn is_infinity(&self) -> bool {
        self.x.is_zero() && self.y.is_zero()
    }

    /// Parity of the y coordinate, used for compressed encodings.
    pub fn y_is_even(&self) -> bool {
        (&self.y % 2u32).is_zero()
    }
}

/// Generator as an owned affine point.
pub fn generator() -> Point {
    let c = curve();
    Point::new(c.gx.clone(), c.gy.clone())
}

pub fn is_on_curve(p: &Point) -> bool {
    if p.is_infinity() {
        return true;
    }
    let c = curve();
    let lhs = umod(&(&p.y * &p.y), &c.p);
    let rhs = umod(&(&p.x * &p.x * &p.x + 7u32), &c.p);
    lhs == rhs
}

// ============================================================================
// Modular Inverse
// ============================================================================

/// Extended-Euclid modular inverse; returns 0 for input 0.
pub fn mod_inverse(a: &BigInt, m: &BigInt) -> BigInt {
    if a.is_zero() {
        return BigInt::zero();
    }
    let mut lm = BigInt::one();
    let mut hm = BigInt::zero();
    let mut low = umod(a, m);
    let mut high = m.clone();
    while low > BigInt::one() {
        let r = &high / &low;
        let nm = &hm - &r * &lm;
        let nw = &high - &r * &low;
        hm = lm;
        lm = nm;
        high = low;
        low = nw;
    }
    umod(&lm, m)
}

// ============================================================================
// Jacobian Arithmetic
// ============================================================================

#[derive(Clone, Debug)]
struct Jacobian {
    x: BigInt,
    y: BigInt,
    z: BigInt,
}

impl Jacobian {
    fn infinity() -> Self {
        Self {
            x: BigInt::zero(),
            y: BigInt::zero(),
            z: BigInt::one(),
        }
    }

    fn is_infinity(&self) -> bool {
        self.y.is_zero()
    }
}

fn to_jacobian(p: &Point) -> Jacobian {
    Jacobian {
        x: p.x.clone(),
        y: p.y.clone(),
        z: BigInt::one(),
    }
}

/// The one inversion per public operation happens here.
fn from_jacobian(j: &Jacobian) -> Point {
    if j.is_infinity() || j.z.is_zero() {
        return Point::infinity();
    }
    let p = &curve().p;
    let zinv = mod_inverse(&j.z, p);
    let zinv2 = umod(&(&zinv * &zinv), p);
    let x = umod(&(&j.x * &zinv2), p);
    let y = umod(&(&j.y * &zinv2 * &zinv), p);
    Point::new(x, y)
}

fn jacobian_double(a: &Jacobian) -> Jacobian {
    if a.is_infinity() {
        return Jacobian::infinity();
    }
    let p = &curve().p;
    let ysq = umod(&(&a.y * &a.y), p);
    let s = umod(&(&a.x * &ysq * 4u32), p);
    // a = 0 for secp256k1, so M = 3x²
    let m = umod(&(&a.x * &a.x * 3u32), p);
    let nx = umod(&(&m * &m - &s * 2u32), p);
    let ny = umod(&(&m * (&s - &nx) - &ysq * &ysq * 8u32), p);
    let nz = umod(&(&a.y * &a.z * 2u32), p);
    Jacobian {
        x: nx,
        y: ny,
        z: nz,
    }
}

fn jacobian_add(a: &Jacobian, b: &Jacobian) -> Jacobian {
    if a.is_infinity() {
        return b.clone();
    }
    if b.is_infinity() {
        return a.clone();
    }
    let p = &curve().p;
    let az2 = umod(&(&a.z * &a.z), p);
    let bz2 = umod(&(&b.z * &b.z), p);
    let u1 = umod(&(&a.x * &bz2), p);
    let u2 = umod(&(&b.x * &az2), p);
    let s1 = umod(&(&a.y * &bz2 * &b.z), p);
    let s2 = umod(&(&b.y * &az2 * &a.z), p);
    if u1 == u2 {
        if s1 != s2 {
            return Jacobian::infinity();
        }
        return jacobian_double(a);
    }
    let h = umod(&(&u2 - &u1), p);
    let r = umod(&(&s2 - &s1), p);
    let h2 = umod(&(&h * &h), p);
    let h3 = umod(&(&h * &h2), p);
    let u1h2 = umod(&(&u1 * &h2), p);
    let nx = umod(&(&r * &r - &h3 - &u1h2 * 2u32), p);
    let ny = umod(&(&r * (&u1h2 - &nx) - &s1 * &h3), p);
    let nz = umod(&(&h * &a.z * &b.z), p);
    Jacobian {
        x: nx,
        y: ny,
        z: nz,
    }
}

/// Recursive double-and-add; scalars are reduced mod N first.
fn jacobian_multiply(a: &Jacobian, k: &BigInt) -> Jacobian {
    if a.is_infinity() || k.is_zero() {
        return Jacobian::infinity();
    }
    if k.is_one() {
        return a.clone();
    }
    let n = &curve().n;
    if k.sign() == Sign::Minus || k >= n {
        return jacobian_multiply(a, &umod(k, n));
    }
    let half = jacobian_multiply(a, &(k >> 1));
    let doubled = jacobian_double(&half);
    if (k % 2u32).is_zero() {
        doubled
    } else {
        jacobian_add(&doubled, a)
    }
}

// ============================================================================
// Public Operations
// ============================================================================

pub fn add(p: &Point, q: &Point) -> Point {
    from_jacobian(&jacobian_add(&to_jacobian(p), &to_jacobian(q)))
}

pub fn double(p: &Point) -> Point {
    from_jacobian(&jacobian_double(&to_jacobian(p)))
}

pub fn multiply(p: &Point, k: &BigInt) -> Point {
    from_jacobian(&jacobian_multiply(&to_jacobian(p), k))
}

/// k·G, the public point of a private scalar.
pub fn g_multiply(k: &BigInt) -> Point {
    multiply(&generator(), k)
}

pub fn negate(p: &Point) -> Point {
    if p.is_infinity() {
        return Point::infinity();
    }
    Point::new(p.x.clone(), umod(&(-&p.y), &curve().p))
}

/// Recover the full point from an x coordinate and y parity,
/// via y = (x³ + 7)^((p+1)/4) mod p.
pub fn decompress(x: &BigInt, y_is_odd: bool) -> Result<Point, CryptoError> {
    let c = curve();
    let rhs = umod(&(x * x * x + 7u32), &c.p);
    let exp = (&c.p + 1u32) >> 2;
    let mut y = rhs.modpow(&exp, &c.p);
    if umod(&(&y * &y), &c.p) != rhs {
        return Err(CryptoError::NotOnCurve);
    }
    let odd = !(&y % 2u32).is_zero();
    if odd != y_is_odd {
        y = umod(&(-&y), &c.p);
    }
    Ok(Point::new(x.clone(), y))
}

// ============================================================================
// Byte Helpers
// ============================================================================

/// Big-endian, left-padded to 32 bytes.
pub fn int_to_bytes32(v: &BigInt) -> [u8; 32] {
    let (_, bytes) = v.to_bytes_be();
    let mut out = [0u8; 32];
    if bytes.len() >= 32 {
        out.copy_from_slice(&bytes[bytes.len() - 32..]);
    } else {
        out[32 - bytes.len()..].copy_from_slice(&bytes);
    }
    out
}

pub fn bytes_to_int(bytes: &[u8]) -> BigInt {
    BigInt::from_bytes_be(Sign::Plus, bytes)
}

// ============================================================================
// Tests
// ============================================================================
