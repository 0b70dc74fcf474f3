//! Proof-of-work hash families.
//!
//! A coin's algorithm decides four things for share validation: the hash
//! applied to the 80-byte header, the hash used for the coinbase transaction
//! when folding it into the merkle root, the hash reported as the block's id,
//! and the multiplier that scales share difficulty to the family's hash output
//! range. The family is chosen once from configuration and carried as a
//! [`HashFamily`] value.
//!
//! | Algorithm | Header (PoW) hash  | Coinbase hash | Block hash              | Multiplier |
//! |-----------|--------------------|---------------|-------------------------|------------|
//! | `sha256`  | sha256d            | sha256d       | PoW hash                | 1          |
//! | `blake3`  | BLAKE3             | sha256 [^1]   | PoW hash                | 1          |
//! | `scrypt`  | scrypt N=1024 r=1 p=1 | sha256d    | sha256d (PoW hash on POS) | 65536    |
//!
//! [^1]: sha256d when the coin sets `normal_hashing`.

use std::sync::LazyLock;

use scrypt::Params;
use serde::Deserialize;
use strum::{Display, EnumString};

use crate::encoding::{self, reversed};
use crate::pool::coinbase::RewardType;

// N = 1024, r = 1, p = 1, 32-byte output
static SCRYPT_PARAMS: LazyLock<Params> =
    LazyLock::new(|| Params::new(10, 1, 1, 32).expect("scrypt parameters"));

/// Supported proof-of-work algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Algorithm {
    /// Double SHA-256, as used by Bitcoin.
    Sha256,

    /// BLAKE3 header hash with SHA-256 coinbase hashing.
    Blake3,

    /// Litecoin-style scrypt over the header.
    Scrypt,
}

impl Algorithm {
    /// Factor applied to share difficulty for this algorithm.
    pub fn share_multiplier(self) -> f64 {
        match self {
            Algorithm::Sha256 | Algorithm::Blake3 => 1.0,
            Algorithm::Scrypt => 65536.0,
        }
    }
}

/// How the coinbase transaction is hashed before climbing the merkle branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoinbaseHash {
    Single,
    Double,
}

/// Which hash identifies a solved block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockHash {
    /// The proof-of-work hash itself.
    Pow,

    /// Double SHA-256 of the header, whatever the proof-of-work hash.
    Sha256d,
}

/// Hash functions for one configured coin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashFamily {
    algorithm: Algorithm,
    coinbase: CoinbaseHash,
    block: BlockHash,
}

impl HashFamily {
    /// Select the hash functions for an algorithm.
    ///
    /// Non-SHA-256 families hash the coinbase with a single SHA-256 unless the
    /// coin opts into `normal_hashing`. Scrypt chains identify blocks by their
    /// sha256d hash, except proof-of-stake scrypt chains which use the PoW hash.
    pub fn new(algorithm: Algorithm, normal_hashing: bool, reward_type: RewardType) -> Self {
        let coinbase = match algorithm {
            Algorithm::Sha256 | Algorithm::Scrypt => CoinbaseHash::Double,
            Algorithm::Blake3 if normal_hashing => CoinbaseHash::Double,
            Algorithm::Blake3 => CoinbaseHash::Single,
        };
        let block = match (algorithm, reward_type) {
            (Algorithm::Scrypt, RewardType::Pow) => BlockHash::Sha256d,
            _ => BlockHash::Pow,
        };
        Self {
            algorithm,
            coinbase,
            block,
        }
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn share_multiplier(&self) -> f64 {
        self.algorithm.share_multiplier()
    }

    /// Proof-of-work hash of a serialized header, in internal byte order.
    ///
    /// `ntime` is the header timestamp; time-keyed families need it, the
    /// current ones ignore it.
    pub fn pow_hash(&self, header: &[u8], _ntime: u32) -> [u8; 32] {
        match self.algorithm {
            Algorithm::Sha256 => encoding::sha256d(header),
            Algorithm::Blake3 => *blake3::hash(header).as_bytes(),
            Algorithm::Scrypt => {
                let mut out = [0u8; 32];
                scrypt::scrypt(header, header, &SCRYPT_PARAMS, &mut out)
                    .expect("32-byte scrypt output");
                out
            }
        }
    }

    /// Hash of the coinbase transaction, in internal byte order.
    pub fn coinbase_hash(&self, coinbase: &[u8]) -> [u8; 32] {
        match self.coinbase {
            CoinbaseHash::Single => encoding::sha256(coinbase),
            CoinbaseHash::Double => encoding::sha256d(coinbase),
        }
    }

    /// Block hash as reported to the daemon and explorers (display order).
    pub fn block_hash(&self, header: &[u8], ntime: u32) -> Vec<u8> {
        match self.block {
            BlockHash::Pow => reversed(&self.pow_hash(header, ntime)),
            BlockHash::Sha256d => reversed(&encoding::sha256d(header)),
        }
    }
}
