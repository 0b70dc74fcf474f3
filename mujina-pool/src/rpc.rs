//! Block template data as returned by a daemon's `getblocktemplate`.
//!
//! Only the fields the pool core reads are modelled; unknown fields are
//! ignored. Optional fields cover masternode chains, witness commitments and
//! payee-split chains.

use serde::Deserialize;

/// A daemon block template.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RpcBlockTemplate {
    pub height: u64,

    /// Previous block hash, display (RPC) order hex.
    #[serde(rename = "previousblockhash")]
    pub previous_block_hash: String,

    /// Compact target, 8 hex characters.
    pub bits: String,

    /// Full target hex; preferred over `bits` when present.
    #[serde(default)]
    pub target: Option<String>,

    #[serde(rename = "curtime")]
    pub cur_time: u32,

    pub version: i32,

    /// Total reward available to the coinbase, in the smallest unit.
    #[serde(rename = "coinbasevalue")]
    pub coinbase_value: u64,

    #[serde(default)]
    pub transactions: Vec<RpcTransaction>,

    #[serde(default)]
    pub masternode: Option<RpcMasternode>,

    #[serde(default)]
    pub superblock: Option<Vec<RpcPayee>>,

    #[serde(default)]
    pub masternode_payments: bool,

    #[serde(default)]
    pub votes: Vec<String>,

    #[serde(default)]
    pub payee: Option<String>,

    #[serde(default)]
    pub payee_amount: Option<u64>,

    #[serde(default)]
    pub default_witness_commitment: Option<String>,
}

/// A transaction in the template.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RpcTransaction {
    /// Raw serialized transaction, hex.
    pub data: String,

    #[serde(default)]
    pub txid: Option<String>,

    #[serde(default)]
    pub hash: Option<String>,
}

impl RpcTransaction {
    /// The id used for the merkle tree: `txid` when present, else `hash`.
    pub fn merkle_id(&self) -> Option<&str> {
        self.txid.as_deref().or(self.hash.as_deref())
    }
}

/// Masternode payment for the block.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RpcMasternode {
    #[serde(default)]
    pub payee: Option<String>,

    #[serde(default)]
    pub amount: u64,
}

/// A fixed payment to an address (superblock budget entries).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RpcPayee {
    pub payee: String,
    pub amount: u64,
}
