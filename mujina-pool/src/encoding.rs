//! Binary encoding primitives for the Bitcoin wire format.
//!
//! Everything that goes into a coinbase transaction, block header or block is
//! built from the functions here: fixed-width integer packing, the
//! variable-length integer ("CompactSize"), BIP34 script numbers, and the
//! byte-order helpers needed to move between RPC display order and internal
//! order.

use bitcoin::hashes::{Hash, sha256d};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Errors from decoding wire-level values.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EncodingError {
    #[error("invalid hex: {0}")]
    InvalidHex(String),

    #[error("expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

pub fn pack_u16_le(n: u16) -> [u8; 2] {
    n.to_le_bytes()
}

pub fn pack_u32_le(n: u32) -> [u8; 4] {
    n.to_le_bytes()
}

pub fn pack_u32_be(n: u32) -> [u8; 4] {
    n.to_be_bytes()
}

pub fn pack_i32_le(n: i32) -> [u8; 4] {
    n.to_le_bytes()
}

pub fn pack_i32_be(n: i32) -> [u8; 4] {
    n.to_be_bytes()
}

/// Pack a 64-bit output value as two little-endian 32-bit halves.
///
/// Identical to `u64::to_le_bytes`; written in halves because that is how the
/// transaction output amount is laid out (low word first).
pub fn pack_u64_le(n: u64) -> [u8; 8] {
    let mut buf = [0u8; 8];
    buf[..4].copy_from_slice(&(n as u32).to_le_bytes());
    buf[4..].copy_from_slice(&((n >> 32) as u32).to_le_bytes());
    buf
}

/// Encode a variable-length integer.
///
/// Values below 0xfd take one byte; larger values are prefixed with 0xfd, 0xfe
/// or 0xff followed by a 2, 4 or 8 byte little-endian integer.
pub fn var_int(n: u64) -> Vec<u8> {
    if n < 0xfd {
        vec![n as u8]
    } else if n <= 0xffff {
        let mut buf = vec![0xfd];
        buf.extend_from_slice(&(n as u16).to_le_bytes());
        buf
    } else if n <= 0xffff_ffff {
        let mut buf = vec![0xfe];
        buf.extend_from_slice(&(n as u32).to_le_bytes());
        buf
    } else {
        let mut buf = vec![0xff];
        buf.extend_from_slice(&n.to_le_bytes());
        buf
    }
}

/// Length-prefixed string: `var_int(len) || utf8 bytes`.
pub fn var_string(s: &str) -> Vec<u8> {
    let bytes = s.as_bytes();
    let mut buf = var_int(bytes.len() as u64);
    buf.extend_from_slice(bytes);
    buf
}

/// Serialize a number for a script signature (BIP34).
///
/// Numbers 1 through 16 use the single-byte `OP_1`..`OP_16` opcodes. Anything
/// else is a length byte followed by the minimal little-endian encoding, with
/// an extra byte whenever the top bit would otherwise be set.
pub fn serialize_number(n: u64) -> Vec<u8> {
    if (1..=16).contains(&n) {
        return vec![0x50 + n as u8];
    }

    let mut value = n;
    let mut buf = vec![0u8];
    while value > 0x7f {
        buf.push((value & 0xff) as u8);
        value >>= 8;
    }
    buf.push(value as u8);
    buf[0] = (buf.len() - 1) as u8;
    buf
}

/// Serialize a string for a script signature (length prefix plus bytes).
pub fn serialize_string(s: &str) -> Vec<u8> {
    var_string(s)
}

/// Return a reversed copy of `bytes`.
pub fn reversed(bytes: &[u8]) -> Vec<u8> {
    bytes.iter().rev().copied().collect()
}

/// Reverse the order of the 4-byte words in a 32-byte hash.
///
/// Stratum sends the previous block hash with each 32-bit word byte-swapped
/// relative to RPC display order. The net effect of swapping the bytes within
/// each word and then reversing the whole buffer is to reverse the word order.
pub fn reverse_byte_order(hash: &[u8; 32]) -> [u8; 32] {
    let mut out = [0u8; 32];
    for (i, word) in hash.chunks_exact(4).enumerate() {
        out[28 - i * 4..32 - i * 4].copy_from_slice(word);
    }
    out
}

/// Decode a display-order hex hash into internal byte order.
///
/// Short input is zero-padded on the right before reversal, so an empty string
/// yields the null hash used as the coinbase's previous output.
pub fn uint256_from_hash_hex(hex_str: &str) -> Result<[u8; 32], EncodingError> {
    let bytes = decode_hex(hex_str)?;
    if bytes.len() > 32 {
        return Err(EncodingError::InvalidLength {
            expected: 32,
            actual: bytes.len(),
        });
    }
    let mut buf = [0u8; 32];
    buf[..bytes.len()].copy_from_slice(&bytes);
    buf.reverse();
    Ok(buf)
}

pub fn decode_hex(s: &str) -> Result<Vec<u8>, EncodingError> {
    hex::decode(s).map_err(|e| EncodingError::InvalidHex(format!("{s:?}: {e}")))
}

/// Decode hex that must be exactly `N` bytes long.
pub fn decode_hex_array<const N: usize>(s: &str) -> Result<[u8; N], EncodingError> {
    let bytes = decode_hex(s)?;
    let actual = bytes.len();
    bytes
        .try_into()
        .map_err(|_| EncodingError::InvalidLength {
            expected: N,
            actual,
        })
}

pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

pub fn sha256d(data: &[u8]) -> [u8; 32] {
    sha256d::Hash::hash(data).to_byte_array()
}
