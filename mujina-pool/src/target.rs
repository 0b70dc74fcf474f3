//! 256-bit targets, compact "bits" encoding and difficulty conversions.
//!
//! A target is the threshold a block hash (interpreted as a big-endian 256-bit
//! integer) must not exceed. Daemons hand targets out either in full or as the
//! 4-byte compact form `[exponent, mantissa(3)]`, where
//!
//! ```text
//! target = mantissa * 256^(exponent - 3)
//! ```
//!
//! Difficulty is the ratio of the difficulty-1 target ([`DIFF1`]) to a given
//! target, so a smaller target means a larger difficulty.

use ruint::aliases::U256;
use thiserror::Error;

use crate::encoding::{self, EncodingError};

/// Errors from decoding targets.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TargetError {
    #[error("invalid bits: {0}")]
    InvalidBits(#[from] EncodingError),

    #[error("bits exponent {0} overflows 256 bits")]
    ExponentOverflow(u8),

    #[error("invalid target hex: {0}")]
    InvalidTarget(String),
}

/// The difficulty-1 target, `0x00000000ffff0000...0000`.
pub const DIFF1: U256 = U256::from_limbs([0, 0, 0, 0x0000_0000_ffff_0000]);

/// Decode a compact target from its 4 raw bytes (display order).
///
/// Exponents below 3 shift the mantissa right instead of left.
pub fn bignum_from_bits(bits: [u8; 4]) -> Result<U256, TargetError> {
    let exponent = bits[0];
    let mantissa = U256::from(u32::from_be_bytes([0, bits[1], bits[2], bits[3]]));

    if exponent < 3 {
        return Ok(mantissa >> (8 * (3 - exponent as usize)));
    }

    let shift = 8 * (exponent as usize - 3);
    if shift >= 256 {
        return Err(TargetError::ExponentOverflow(exponent));
    }
    // Reject any shift that would push mantissa bits out of the top
    if mantissa.bit_len() + shift > 256 {
        return Err(TargetError::ExponentOverflow(exponent));
    }
    Ok(mantissa << shift)
}

/// Decode a compact target given as the RPC's 8-character hex string.
pub fn bignum_from_bits_hex(bits: &str) -> Result<U256, TargetError> {
    bignum_from_bits(encoding::decode_hex_array::<4>(bits)?)
}

/// Parse a full target from RPC hex (big-endian, up to 64 characters).
pub fn target_from_hex(s: &str) -> Result<U256, TargetError> {
    U256::from_str_radix(s, 16).map_err(|e| TargetError::InvalidTarget(format!("{s:?}: {e}")))
}

/// Pack a target into compact form.
///
/// Takes the minimal big-endian representation, prepends a zero byte when the
/// top bit is set (the mantissa is signed), and keeps the length plus the
/// first three bytes. Precision beyond 24 bits is truncated.
pub fn compact_bits_from(target: U256) -> [u8; 4] {
    let be = target.to_be_bytes::<32>();
    let first = be.iter().position(|&b| b != 0).unwrap_or(32);
    let mut significant = Vec::with_capacity(33);
    if first < 32 && be[first] > 0x7f {
        significant.push(0);
    }
    significant.extend_from_slice(&be[first..]);

    let mut compact = [0u8; 4];
    compact[0] = significant.len() as u8;
    for (dst, src) in compact[1..].iter_mut().zip(&significant) {
        *dst = *src;
    }
    compact
}

/// All-ones 256-bit value shifted right by `shift` bits.
pub fn shift_max_256_right(shift: u32) -> U256 {
    if shift >= 256 {
        U256::ZERO
    } else {
        U256::MAX >> shift as usize
    }
}

/// Network-style truncated difficulty-1 target for a given leading-zero count.
///
/// The all-ones value shifted right by `shift` is passed through the compact
/// encoding, which keeps only its top 24 bits. With `shift == 32` this is
/// exactly [`DIFF1`].
pub fn truncated_diff(shift: u32) -> Result<U256, TargetError> {
    bignum_from_bits(compact_bits_from(shift_max_256_right(shift)))
}

/// Convert a 256-bit integer to the nearest `f64`.
pub fn u256_to_f64(value: U256) -> f64 {
    value
        .as_limbs()
        .iter()
        .rev()
        .fold(0.0, |acc, &limb| acc * 18_446_744_073_709_551_616.0 + limb as f64)
}

/// Difficulty of a target relative to [`DIFF1`].
///
/// A zero target has infinite difficulty.
pub fn difficulty_from_target(target: U256) -> f64 {
    u256_to_f64(DIFF1) / u256_to_f64(target)
}

/// Whether a header hash qualifies as a block: `target >= hash`, inclusive.
pub fn is_block_candidate(target: U256, hash: U256) -> bool {
    target >= hash
}

/// Round to a fixed number of decimal places.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
