//! Daemon templates and pool settings shared by the pool tests.

use crate::address::NetworkParams;
use crate::pool::coinbase::{CoinbaseParams, RewardType};
use crate::pool::extranonce::EXTRANONCE_PLACEHOLDER;
use crate::rpc::{RpcBlockTemplate, RpcTransaction};

/// Height-100 template on the previous block below.
pub const HEIGHT: u64 = 100;

/// Previous block hash in RPC (display) order.
pub const PREV_HASH: &str = "00000000000000000003ecd827f336c6971f6f77a0b9fba362398dd867975645";

pub const CUR_TIME: u32 = 1_700_000_000;

/// Compact bits that accept almost any header hash.
pub const EASY_BITS: &str = "207fffff";

/// Compact bits at difficulty 1.
pub const DIFF1_BITS: &str = "1d00ffff";

/// P2PKH script paying 20 bytes of 0x11.
pub fn pool_script() -> Vec<u8> {
    let mut script = vec![0x76, 0xa9, 0x14];
    script.extend_from_slice(&[0x11; 20]);
    script.extend_from_slice(&[0x88, 0xac]);
    script
}

/// A template with no transactions.
pub fn rpc_template(bits: &str) -> RpcBlockTemplate {
    RpcBlockTemplate {
        height: HEIGHT,
        previous_block_hash: PREV_HASH.to_string(),
        bits: bits.to_string(),
        target: None,
        cur_time: CUR_TIME,
        version: 0x2000_0000,
        coinbase_value: 625_000_000,
        transactions: vec![],
        masternode: None,
        superblock: None,
        masternode_payments: false,
        votes: vec![],
        payee: None,
        payee_amount: None,
        default_witness_commitment: None,
    }
}

/// A legacy (non-witness) one-input one-output transaction, hex.
pub fn raw_transaction(tag: u8) -> String {
    let mut tx = vec![0x01, 0x00, 0x00, 0x00, 0x01];
    tx.extend_from_slice(&[tag; 32]);
    tx.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]);
    tx.extend_from_slice(&[0x00, 0xff, 0xff, 0xff, 0xff]);
    tx.push(0x01);
    tx.extend_from_slice(&1000u64.to_le_bytes());
    tx.extend_from_slice(&[0x01, 0x51]);
    tx.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]);
    hex::encode(tx)
}

/// A template transaction whose txid matches its data.
pub fn rpc_transaction(tag: u8) -> RpcTransaction {
    let data = raw_transaction(tag);
    let bytes = hex::decode(&data).expect("fixture hex");
    let mut txid = crate::encoding::sha256d(&bytes);
    txid.reverse();
    RpcTransaction {
        data,
        txid: Some(hex::encode(txid)),
        hash: None,
    }
}

/// Coinbase settings paying everything to [`pool_script`].
pub fn coinbase_params(pool_script: &[u8]) -> CoinbaseParams<'_> {
    CoinbaseParams {
        pool_script,
        extranonce_size: EXTRANONCE_PLACEHOLDER.len(),
        reward_type: RewardType::Pow,
        tx_messages: false,
        tx_comment: "",
        recipients: &[],
        network: None::<&NetworkParams>,
        coinbase_string: "/mujina/",
        timestamp: CUR_TIME as u64,
    }
}
