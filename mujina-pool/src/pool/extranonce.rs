//! Extranonce and job identifier allocation.
//!
//! The coinbase reserves [`EXTRANONCE_PLACEHOLDER`] bytes for the extranonce.
//! The pool fills the first [`EXTRANONCE1_SIZE`] bytes per connection
//! (extranonce1) and leaves the remainder to the miner (extranonce2), so every
//! connection searches a disjoint coinbase space.

use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hasher};

use thiserror::Error;

/// Bytes reserved in the coinbase script for extranonce1 and extranonce2.
pub const EXTRANONCE_PLACEHOLDER: [u8; 8] = [0xf0, 0x00, 0x00, 0x0f, 0xf1, 0x11, 0x11, 0x1f];

/// Size of the pool-assigned extranonce1.
pub const EXTRANONCE1_SIZE: usize = 4;

/// Size of the miner-chosen extranonce2.
pub const EXTRANONCE2_SIZE: usize = EXTRANONCE_PLACEHOLDER.len() - EXTRANONCE1_SIZE;

/// Errors from parsing a submitted extranonce2.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Extranonce2Error {
    #[error("extranonce2 must be {expected} bytes, got {actual} hex characters")]
    WrongSize { expected: usize, actual: usize },

    #[error("extranonce2 is not valid hex: {0}")]
    InvalidHex(String),
}

/// A miner-submitted extranonce2 of fixed size.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Extranonce2 {
    bytes: Vec<u8>,
}

impl Extranonce2 {
    /// Parse a hex extranonce2, requiring exactly `size` bytes.
    ///
    /// The length is checked before decoding, so a short value is reported as
    /// a size error even if it is also malformed.
    pub fn from_hex(hex_str: &str, size: usize) -> Result<Self, Extranonce2Error> {
        if hex_str.len() != size * 2 {
            return Err(Extranonce2Error::WrongSize {
                expected: size,
                actual: hex_str.len(),
            });
        }
        let bytes =
            hex::decode(hex_str).map_err(|e| Extranonce2Error::InvalidHex(e.to_string()))?;
        Ok(Self { bytes })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

/// Allocates extranonce1 values for new connections.
///
/// The instance id occupies the top five bits of the counter, so pool
/// instances with different ids hand out disjoint ranges. The counter wraps
/// within 32 bits.
#[derive(Debug, Clone)]
pub struct ExtraNonceCounter {
    counter: u32,
}

impl ExtraNonceCounter {
    /// Start from a configured instance id, or a random one when `None`.
    pub fn new(instance_id: Option<u32>) -> Self {
        let instance_id = instance_id.unwrap_or_else(random_instance_id);
        Self {
            counter: instance_id << 27,
        }
    }

    /// Allocate the next extranonce1 as big-endian hex.
    pub fn next(&mut self) -> String {
        let value = self.counter;
        self.counter = self.counter.wrapping_add(1);
        hex::encode(value.to_be_bytes())
    }

    /// Extranonce1 size in bytes.
    pub fn size(&self) -> usize {
        EXTRANONCE1_SIZE
    }
}

// RandomState is seeded from OS randomness per process
fn random_instance_id() -> u32 {
    let mut hasher = RandomState::new().build_hasher();
    hasher.write_u8(0);
    hasher.finish() as u32
}

/// Issues job identifiers.
///
/// Ids are a counter rendered as lowercase hex. The counter skips every
/// multiple of 0xffff by restarting at 1, so ids stay short and never repeat
/// within a run of 0xfffe jobs.
#[derive(Debug, Clone, Default)]
pub struct JobCounter {
    counter: u32,
}

impl JobCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance and return the new id.
    pub fn next(&mut self) -> String {
        self.counter += 1;
        if self.counter % 0xffff == 0 {
            self.counter = 1;
        }
        self.current()
    }

    /// The most recently issued id ("0" before the first).
    pub fn current(&self) -> String {
        format!("{:x}", self.counter)
    }
}
