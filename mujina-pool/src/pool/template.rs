//! A single unit of work built from a daemon block template.
//!
//! A [`BlockTemplate`] is immutable once built, apart from the set of
//! submissions already seen against it. It owns everything needed to answer
//! three questions: what to send miners (`mining.notify` parameters), how to
//! rebuild a miner's header from a share, and how to assemble the full block
//! when a share meets the network target.

use std::collections::HashSet;
use std::sync::OnceLock;

use parking_lot::Mutex;
use ruint::aliases::U256;
use serde_json::{Value, json};
use thiserror::Error;

use crate::encoding::{
    EncodingError, decode_hex, decode_hex_array, pack_i32_be, pack_i32_le, pack_u32_be,
    pack_u32_le, reverse_byte_order, uint256_from_hash_hex, var_int,
};
use crate::pool::coinbase::{
    CoinbaseError, CoinbaseParams, GenerationTransaction, RewardType, create_generation,
};
use crate::pool::merkle::MerkleTree;
use crate::rpc::RpcBlockTemplate;
use crate::target::{self, TargetError};

/// Errors from building a template. A failed build leaves no trace.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TemplateError {
    #[error("generation transaction: {0}")]
    Coinbase(#[from] CoinbaseError),

    #[error("target: {0}")]
    Target(#[from] TargetError),

    #[error("template field: {0}")]
    Encoding(#[from] EncodingError),

    #[error("network target is zero")]
    ZeroTarget,

    #[error("transaction {0} has neither txid nor hash")]
    MissingTxid(usize),
}

/// `mining.notify` parameters for a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobParams {
    pub job_id: String,

    /// Previous block hash with its 4-byte words reversed, hex.
    pub prev_hash: String,
    pub coinb1: String,
    pub coinb2: String,
    pub merkle_branch: Vec<String>,

    /// Block version, big-endian hex.
    pub version: String,
    pub bits: String,

    /// Template time, big-endian hex.
    pub ntime: String,
    pub clean_jobs: bool,
}

impl JobParams {
    /// The positional array sent as `mining.notify` params.
    pub fn to_notify_params(&self) -> Value {
        json!([
            self.job_id,
            self.prev_hash,
            self.coinb1,
            self.coinb2,
            self.merkle_branch,
            self.version,
            self.bits,
            self.ntime,
            self.clean_jobs,
        ])
    }
}

/// One job: a daemon template plus the pool's coinbase for it.
#[derive(Debug)]
pub struct BlockTemplate {
    job_id: String,
    rpc: RpcBlockTemplate,
    target: U256,
    difficulty: f64,
    prev_hash_reversed: String,
    prev_hash: [u8; 32],
    bits: [u8; 4],
    transaction_data: Vec<u8>,
    vote_data: Vec<u8>,
    merkle_tree: MerkleTree,
    merkle_branch: Vec<String>,
    generation: GenerationTransaction,
    reward_type: RewardType,
    submits: Mutex<HashSet<Vec<u8>>>,
    job_params: OnceLock<JobParams>,
}

impl BlockTemplate {
    /// Build a job from a daemon template.
    ///
    /// The network target comes from the template's `target` field when
    /// present, else from its compact `bits`.
    pub fn new(
        job_id: String,
        rpc: RpcBlockTemplate,
        params: &CoinbaseParams<'_>,
    ) -> Result<Self, TemplateError> {
        let target = match &rpc.target {
            Some(target) => target::target_from_hex(target)?,
            None => target::bignum_from_bits_hex(&rpc.bits)?,
        };
        if target.is_zero() {
            return Err(TemplateError::ZeroTarget);
        }
        let difficulty = target::round_to(target::difficulty_from_target(target), 9);

        let display_prev_hash: [u8; 32] = decode_hex_array(&rpc.previous_block_hash)?;
        let prev_hash_reversed = hex::encode(reverse_byte_order(&display_prev_hash));
        let mut prev_hash = display_prev_hash;
        prev_hash.reverse();

        let mut bits: [u8; 4] = decode_hex_array(&rpc.bits)?;
        bits.reverse();

        let mut transaction_data = Vec::new();
        let mut tx_hashes = Vec::with_capacity(rpc.transactions.len());
        for (index, tx) in rpc.transactions.iter().enumerate() {
            transaction_data.extend_from_slice(&decode_hex(&tx.data)?);
            let id = tx.merkle_id().ok_or(TemplateError::MissingTxid(index))?;
            tx_hashes.push(uint256_from_hash_hex(id)?);
        }

        let vote_data = if rpc.masternode_payments {
            let mut data = var_int(rpc.votes.len() as u64);
            for vote in &rpc.votes {
                data.extend_from_slice(&decode_hex(vote)?);
            }
            data
        } else {
            Vec::new()
        };

        let merkle_tree = MerkleTree::new(tx_hashes);
        let merkle_branch = merkle_tree.branch_hex();
        let generation = create_generation(&rpc, params)?;

        Ok(Self {
            job_id,
            rpc,
            target,
            difficulty,
            prev_hash_reversed,
            prev_hash,
            bits,
            transaction_data,
            vote_data,
            merkle_tree,
            merkle_branch,
            generation,
            reward_type: params.reward_type,
            submits: Mutex::new(HashSet::new()),
            job_params: OnceLock::new(),
        })
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn rpc(&self) -> &RpcBlockTemplate {
        &self.rpc
    }

    pub fn height(&self) -> u64 {
        self.rpc.height
    }

    /// Network target.
    pub fn target(&self) -> U256 {
        self.target
    }

    /// Network difficulty, 9 decimals.
    pub fn difficulty(&self) -> f64 {
        self.difficulty
    }

    pub fn prev_hash_reversed(&self) -> &str {
        &self.prev_hash_reversed
    }

    pub fn merkle_tree(&self) -> &MerkleTree {
        &self.merkle_tree
    }

    pub fn merkle_branch(&self) -> &[String] {
        &self.merkle_branch
    }

    pub fn generation(&self) -> &GenerationTransaction {
        &self.generation
    }

    pub fn transaction_data(&self) -> &[u8] {
        &self.transaction_data
    }

    /// Full coinbase for a miner's extranonces.
    pub fn serialize_coinbase(&self, extranonce1: &[u8], extranonce2: &[u8]) -> Vec<u8> {
        let mut coinbase = Vec::with_capacity(
            self.generation.part1.len()
                + extranonce1.len()
                + extranonce2.len()
                + self.generation.part2.len(),
        );
        coinbase.extend_from_slice(&self.generation.part1);
        coinbase.extend_from_slice(extranonce1);
        coinbase.extend_from_slice(extranonce2);
        coinbase.extend_from_slice(&self.generation.part2);
        coinbase
    }

    /// The 80-byte header in wire order.
    ///
    /// `merkle_root` is in internal byte order. `ntime` and `nonce` are the
    /// values whose big-endian hex the miner submitted.
    pub fn serialize_header(&self, merkle_root: &[u8; 32], ntime: u32, nonce: u32) -> [u8; 80] {
        let mut header = [0u8; 80];
        header[0..4].copy_from_slice(&pack_i32_le(self.rpc.version));
        header[4..36].copy_from_slice(&self.prev_hash);
        header[36..68].copy_from_slice(merkle_root);
        header[68..72].copy_from_slice(&pack_u32_le(ntime));
        header[72..76].copy_from_slice(&self.bits);
        header[76..80].copy_from_slice(&pack_u32_le(nonce));
        header
    }

    /// The full block for `submitblock`.
    pub fn serialize_block(&self, header: &[u8; 80], coinbase: &[u8]) -> Vec<u8> {
        let mut block = Vec::with_capacity(
            header.len() + coinbase.len() + self.transaction_data.len() + self.vote_data.len() + 10,
        );
        block.extend_from_slice(header);
        block.extend_from_slice(&var_int(self.rpc.transactions.len() as u64 + 1));
        block.extend_from_slice(coinbase);
        block.extend_from_slice(&self.transaction_data);
        block.extend_from_slice(&self.vote_data);
        if self.reward_type == RewardType::Pos {
            // Signature placeholder, replaced by the daemon
            block.push(0);
        }
        block
    }

    /// Record a submission. Returns false if it was already seen.
    ///
    /// Keyed on decoded values, so the same header submitted with different
    /// hex spellings is still a duplicate.
    pub fn register_submit(
        &self,
        extranonce1: &[u8],
        extranonce2: &[u8],
        ntime: u32,
        nonce: u32,
    ) -> bool {
        let mut key = Vec::with_capacity(extranonce1.len() + extranonce2.len() + 9);
        key.push(extranonce1.len() as u8);
        key.extend_from_slice(extranonce1);
        key.extend_from_slice(extranonce2);
        key.extend_from_slice(&ntime.to_be_bytes());
        key.extend_from_slice(&nonce.to_be_bytes());
        self.submits.lock().insert(key)
    }

    /// `mining.notify` parameters, computed once.
    pub fn job_params(&self) -> &JobParams {
        self.job_params.get_or_init(|| JobParams {
            job_id: self.job_id.clone(),
            prev_hash: self.prev_hash_reversed.clone(),
            coinb1: hex::encode(&self.generation.part1),
            coinb2: hex::encode(&self.generation.part2),
            merkle_branch: self.merkle_branch.clone(),
            version: hex::encode(pack_i32_be(self.rpc.version)),
            bits: self.rpc.bits.clone(),
            ntime: hex::encode(pack_u32_be(self.rpc.cur_time)),
            clean_jobs: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding;
    use crate::pool::test_data::{
        self, CUR_TIME, DIFF1_BITS, EASY_BITS, HEIGHT, PREV_HASH, coinbase_params, pool_script,
        rpc_template, rpc_transaction,
    };
    use bitcoin::block::{Header, Version};
    use bitcoin::consensus;
    use bitcoin::hashes::Hash;
    use bitcoin::{Block, BlockHash, CompactTarget, TxMerkleNode};
    use std::str::FromStr;

    fn build(rpc: RpcBlockTemplate) -> BlockTemplate {
        let script = pool_script();
        BlockTemplate::new("1".into(), rpc, &coinbase_params(&script)).unwrap()
    }

    #[test]
    fn test_target_and_difficulty_from_bits() {
        let template = build(rpc_template(DIFF1_BITS));
        assert_eq!(template.target(), target::DIFF1);
        assert_eq!(template.difficulty(), 1.0);
    }

    #[test]
    fn test_explicit_target_wins_over_bits() {
        let mut rpc = rpc_template(DIFF1_BITS);
        rpc.target =
            Some("00000000ffff0000000000000000000000000000000000000000000000000000".into());
        rpc.bits = EASY_BITS.into();
        let template = build(rpc);
        assert_eq!(template.target(), target::DIFF1);
    }

    #[test]
    fn test_zero_target_rejected() {
        let mut rpc = rpc_template(DIFF1_BITS);
        rpc.target = Some("00".into());
        let script = pool_script();
        let result = BlockTemplate::new("1".into(), rpc, &coinbase_params(&script));
        assert!(matches!(result, Err(TemplateError::ZeroTarget)));
    }

    #[test]
    fn test_bad_previous_hash_rejected() {
        let mut rpc = rpc_template(DIFF1_BITS);
        rpc.previous_block_hash = "abcd".into();
        let script = pool_script();
        let result = BlockTemplate::new("1".into(), rpc, &coinbase_params(&script));
        assert!(matches!(result, Err(TemplateError::Encoding(_))));
    }

    #[test]
    fn test_missing_txid_rejected() {
        let mut rpc = rpc_template(DIFF1_BITS);
        let mut tx = rpc_transaction(1);
        tx.txid = None;
        rpc.transactions = vec![rpc_transaction(2), tx];
        let script = pool_script();
        let result = BlockTemplate::new("1".into(), rpc, &coinbase_params(&script));
        assert_eq!(result.unwrap_err(), TemplateError::MissingTxid(1));
    }

    #[test]
    fn test_hash_used_when_txid_absent() {
        let mut rpc = rpc_template(DIFF1_BITS);
        let mut tx = rpc_transaction(1);
        tx.hash = tx.txid.take();
        rpc.transactions = vec![tx.clone()];
        let template = build(rpc);

        let expected = uint256_from_hash_hex(tx.hash.as_deref().unwrap()).unwrap();
        assert_eq!(template.merkle_tree().steps()[0].to_byte_array(), expected);
    }

    #[test]
    fn test_job_params() {
        let mut rpc = rpc_template(DIFF1_BITS);
        rpc.transactions = vec![rpc_transaction(1)];
        let template = build(rpc);
        let params = template.job_params();

        assert_eq!(params.job_id, "1");
        assert_eq!(
            params.prev_hash,
            "6797564562398dd8a0b9fba3971f6f7727f336c60003ecd80000000000000000"
        );
        assert_eq!(params.coinb1, hex::encode(&template.generation().part1));
        assert_eq!(params.coinb2, hex::encode(&template.generation().part2));
        assert_eq!(params.merkle_branch.len(), 1);
        assert_eq!(params.version, "20000000");
        assert_eq!(params.bits, DIFF1_BITS);
        assert_eq!(params.ntime, format!("{CUR_TIME:08x}"));
        assert!(params.clean_jobs);

        // Memoized
        assert!(std::ptr::eq(params, template.job_params()));

        let notify = params.to_notify_params();
        assert_eq!(notify.as_array().unwrap().len(), 9);
        assert_eq!(notify[8], true);
    }

    #[test]
    fn test_header_matches_consensus_encoding() {
        let template = build(rpc_template(DIFF1_BITS));
        let merkle_root = [0x5a; 32];
        let header = template.serialize_header(&merkle_root, 0x6553_f100, 0x1234_5678);

        let expected = Header {
            version: Version::from_consensus(0x2000_0000),
            prev_blockhash: BlockHash::from_str(PREV_HASH).unwrap(),
            merkle_root: TxMerkleNode::from_byte_array(merkle_root),
            time: 0x6553_f100,
            bits: CompactTarget::from_consensus(0x1d00_ffff),
            nonce: 0x1234_5678,
        };
        assert_eq!(header.to_vec(), consensus::serialize(&expected));
        assert_eq!(
            hex::encode(encoding::reversed(&encoding::sha256d(&header))),
            expected.block_hash().to_string()
        );
    }

    #[test]
    fn test_block_deserializes_with_valid_merkle_root() {
        let mut rpc = rpc_template(EASY_BITS);
        rpc.transactions = vec![rpc_transaction(1), rpc_transaction(2), rpc_transaction(3)];
        let template = build(rpc);

        let coinbase = template.serialize_coinbase(&[0xaa; 4], &[0xbb; 4]);
        let root = template.merkle_tree().with_first(encoding::sha256d(&coinbase));
        let header = template.serialize_header(&root, CUR_TIME, 7);
        let raw = template.serialize_block(&header, &coinbase);

        let block: Block = consensus::deserialize(&raw).unwrap();
        assert_eq!(block.txdata.len(), 4);
        assert!(block.check_merkle_root());
        assert_eq!(block.bip34_block_height().unwrap(), HEIGHT);
    }

    #[test]
    fn test_block_appends_votes_and_pos_marker() {
        let mut rpc = rpc_template(EASY_BITS);
        rpc.masternode_payments = true;
        rpc.votes = vec!["abcd".into(), "ef".into()];
        let script = pool_script();
        let mut params = coinbase_params(&script);
        params.reward_type = RewardType::Pos;
        let template = BlockTemplate::new("2".into(), rpc, &params).unwrap();

        let coinbase = template.serialize_coinbase(&[0; 4], &[0; 4]);
        let header = [0u8; 80];
        let raw = template.serialize_block(&header, &coinbase);

        assert_eq!(raw[80], 1);
        assert!(raw.ends_with(&[0x02, 0xab, 0xcd, 0xef, 0x00]));
        assert_eq!(raw.len(), 80 + 1 + coinbase.len() + 4 + 1);
    }

    #[test]
    fn test_register_submit_detects_duplicates() {
        let template = build(test_data::rpc_template(DIFF1_BITS));
        let en1 = [0x08, 0, 0, 0];
        assert!(template.register_submit(&en1, &[0, 0, 0, 1], CUR_TIME, 0));
        assert!(!template.register_submit(&en1, &[0, 0, 0, 1], CUR_TIME, 0));
        assert!(template.register_submit(&en1, &[0, 0, 0, 2], CUR_TIME, 0));
        assert!(template.register_submit(&[0x08, 0, 0, 1], &[0, 0, 0, 1], CUR_TIME, 0));
        assert!(template.register_submit(&en1, &[0, 0, 0, 1], CUR_TIME + 1, 0));
        assert!(template.register_submit(&en1, &[0, 0, 0, 1], CUR_TIME, 1));
    }

    #[test]
    fn test_register_submit_keeps_extranonce_boundary() {
        let template = build(test_data::rpc_template(DIFF1_BITS));
        assert!(template.register_submit(&[1, 2, 3, 4], &[5, 6, 7, 8], CUR_TIME, 0));
        assert!(template.register_submit(&[1, 2, 3], &[4, 5, 6, 7, 8], CUR_TIME, 0));
    }

    #[test]
    fn test_coinbase_embeds_extranonces() {
        let template = build(rpc_template(DIFF1_BITS));
        let coinbase = template.serialize_coinbase(&[1, 2, 3, 4], &[5, 6, 7, 8]);
        let part1 = &template.generation().part1;
        assert_eq!(&coinbase[..part1.len()], part1.as_slice());
        assert_eq!(
            &coinbase[part1.len()..part1.len() + 8],
            &[1, 2, 3, 4, 5, 6, 7, 8]
        );
        assert!(coinbase.ends_with(&template.generation().part2));
    }
}
