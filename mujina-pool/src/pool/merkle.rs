//! Merkle branch computation for the coinbase slot.
//!
//! Every job shares one transaction set but each miner has a different
//! coinbase, so the pool precomputes the sibling hashes ("steps") along the
//! left edge of the tree. Folding a coinbase hash through the steps yields the
//! merkle root without touching the other transactions again.

use bitcoin::hash_types::TxMerkleNode;
use bitcoin::hashes::Hash;

use crate::encoding::sha256d;

/// Merkle steps for a transaction set with the coinbase in position zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleTree {
    steps: Vec<TxMerkleNode>,
}

impl MerkleTree {
    /// Build from the hashes of every non-coinbase transaction, in block order
    /// and internal byte order.
    ///
    /// Each round records the left-most sibling of the coinbase slot,
    /// duplicates the last hash if the level (coinbase included) is odd, then
    /// pairs everything after the sibling into the next level.
    pub fn new(hashes: Vec<[u8; 32]>) -> Self {
        let mut steps = Vec::new();
        // The level excluding the coinbase slot
        let mut level = hashes;

        while !level.is_empty() {
            steps.push(TxMerkleNode::from_byte_array(level[0]));

            if level.len() % 2 == 0 {
                let last = level[level.len() - 1];
                level.push(last);
            }

            level = level[1..]
                .chunks_exact(2)
                .map(|pair| merkle_join(&pair[0], &pair[1]))
                .collect();
        }

        Self { steps }
    }

    pub fn steps(&self) -> &[TxMerkleNode] {
        &self.steps
    }

    /// Steps as hex in internal byte order, the form sent to miners.
    pub fn branch_hex(&self) -> Vec<String> {
        self.steps
            .iter()
            .map(|step| hex::encode(step.as_byte_array()))
            .collect()
    }

    /// Fold a coinbase hash up through the steps to produce the merkle root.
    pub fn with_first(&self, coinbase_hash: [u8; 32]) -> [u8; 32] {
        self.steps
            .iter()
            .fold(coinbase_hash, |acc, step| merkle_join(&acc, step.as_byte_array()))
    }
}

fn merkle_join(left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
    let mut joined = [0u8; 64];
    joined[..32].copy_from_slice(left);
    joined[32..].copy_from_slice(right);
    sha256d(&joined)
}
