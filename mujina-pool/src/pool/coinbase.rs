//! Generation (coinbase) transaction construction.
//!
//! The coinbase is built in two parts split around the extranonce, because
//! each miner's extranonce1 and extranonce2 are only known at submission time:
//!
//! ```text
//! part1: version [pos time] 01 <null prevout> ffffffff <script len>
//!        <height> <timestamp> <push extranonce len>
//! ----- extranonce1 || extranonce2 -----
//! part2: <coinbase string> 00000000 <outputs> 00000000 [comment]
//! ```
//!
//! Output amounts are carved out of the template's coinbase value. Whatever is
//! left after every other payee goes to the pool, so rounding dust always ends
//! up in the pool's output.

use serde::Deserialize;
use thiserror::Error;

use crate::address::{self, AddressError, NetworkParams};
use crate::encoding::{
    self, EncodingError, pack_u32_le, pack_u64_le, serialize_number, serialize_string, var_int,
};
use crate::rpc::RpcBlockTemplate;

/// Errors from building a generation transaction.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CoinbaseError {
    #[error("payee script: {0}")]
    Address(#[from] AddressError),

    #[error("witness commitment: {0}")]
    WitnessCommitment(#[from] EncodingError),

    #[error("payouts exceed the coinbase value ({needed} needed, {available} left)")]
    RewardUnderflow { needed: u64, available: u64 },
}

/// Whether the chain is proof-of-work or proof-of-stake.
///
/// Proof-of-stake chains carry a timestamp in every transaction and expect a
/// signature placeholder byte at the end of the block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum RewardType {
    #[default]
    #[serde(rename = "POW")]
    Pow,
    #[serde(rename = "POS")]
    Pos,
}

/// A configured share of the block reward.
#[derive(Debug, Clone, PartialEq)]
pub struct Recipient {
    /// Fraction of the reward, 0.0 to 1.0.
    pub fraction: f64,

    /// Output script paying the recipient.
    pub script: Vec<u8>,
}

/// One transaction output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOutput {
    pub value: u64,
    pub script: Vec<u8>,
}

impl TxOutput {
    fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&pack_u64_le(self.value));
        buf.extend_from_slice(&var_int(self.script.len() as u64));
        buf.extend_from_slice(&self.script);
    }
}

/// Everything the coinbase needs beyond the daemon template.
#[derive(Debug, Clone)]
pub struct CoinbaseParams<'a> {
    pub pool_script: &'a [u8],
    pub extranonce_size: usize,
    pub reward_type: RewardType,
    pub tx_messages: bool,
    pub tx_comment: &'a str,
    pub recipients: &'a [Recipient],
    pub network: Option<&'a NetworkParams>,
    pub coinbase_string: &'a str,

    /// Unix time written into the script signature.
    pub timestamp: u64,
}

/// The coinbase split around the extranonce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationTransaction {
    pub part1: Vec<u8>,
    pub part2: Vec<u8>,
    pub outputs: Vec<TxOutput>,
}

/// Build the generation transaction for a template.
pub fn create_generation(
    rpc: &RpcBlockTemplate,
    params: &CoinbaseParams<'_>,
) -> Result<GenerationTransaction, CoinbaseError> {
    let tx_version: u32 = if params.tx_messages { 2 } else { 1 };

    let mut script_sig1 = serialize_number(rpc.height);
    script_sig1.extend_from_slice(&serialize_number(params.timestamp));
    script_sig1.push(params.extranonce_size as u8);

    let script_sig2 = serialize_string(params.coinbase_string);
    let script_len = script_sig1.len() + params.extranonce_size + script_sig2.len();

    let mut part1 = Vec::new();
    part1.extend_from_slice(&pack_u32_le(tx_version));
    if params.reward_type == RewardType::Pos {
        part1.extend_from_slice(&pack_u32_le(rpc.cur_time));
    }
    part1.extend_from_slice(&var_int(1));
    part1.extend_from_slice(&[0u8; 32]);
    part1.extend_from_slice(&pack_u32_le(u32::MAX));
    part1.extend_from_slice(&var_int(script_len as u64));
    part1.extend_from_slice(&script_sig1);

    let outputs = generate_outputs(rpc, params)?;

    let mut part2 = script_sig2;
    part2.extend_from_slice(&pack_u32_le(0));
    part2.extend_from_slice(&var_int(outputs.len() as u64));
    for output in &outputs {
        output.encode_into(&mut part2);
    }
    part2.extend_from_slice(&pack_u32_le(0));
    if params.tx_messages {
        part2.extend_from_slice(&serialize_string(params.tx_comment));
    }

    Ok(GenerationTransaction {
        part1,
        part2,
        outputs,
    })
}

/// Split the coinbase value into outputs.
///
/// Order of the result: witness commitment (if any), pool, masternode or
/// superblock payees, legacy payee, then configured recipients. Recipients are
/// each paid their fraction of the reward left after masternode and payee
/// deductions; they do not reduce each other's base.
pub fn generate_outputs(
    rpc: &RpcBlockTemplate,
    params: &CoinbaseParams<'_>,
) -> Result<Vec<TxOutput>, CoinbaseError> {
    let mut payout = Payout {
        network: params.network,
        reward: rpc.coinbase_value,
        reward_to_pool: rpc.coinbase_value,
        outputs: Vec::new(),
    };

    if let (Some(masternode), Some(superblock)) = (&rpc.masternode, &rpc.superblock) {
        if let Some(payee) = &masternode.payee {
            payout.pay(payee, masternode.amount)?;
        } else {
            for entry in superblock {
                payout.pay(&entry.payee, entry.amount)?;
            }
        }
    }

    if let Some(payee) = &rpc.payee {
        let amount = rpc
            .payee_amount
            .unwrap_or_else(|| payout.reward.div_ceil(5));
        payout.pay(payee, amount)?;
    }

    let Payout {
        reward,
        mut reward_to_pool,
        mut outputs,
        ..
    } = payout;

    for recipient in params.recipients {
        let amount = (recipient.fraction * reward as f64).floor() as u64;
        reward_to_pool = checked_deduct(reward_to_pool, amount)?;
        outputs.push(TxOutput {
            value: amount,
            script: recipient.script.clone(),
        });
    }

    outputs.insert(
        0,
        TxOutput {
            value: reward_to_pool,
            script: params.pool_script.to_vec(),
        },
    );

    if let Some(commitment) = &rpc.default_witness_commitment {
        outputs.insert(
            0,
            TxOutput {
                value: 0,
                script: encoding::decode_hex(commitment)?,
            },
        );
    }

    Ok(outputs)
}

/// Running totals while daemon-mandated payees are carved out.
struct Payout<'a> {
    network: Option<&'a NetworkParams>,
    reward: u64,
    reward_to_pool: u64,
    outputs: Vec<TxOutput>,
}

impl Payout<'_> {
    fn pay(&mut self, payee: &str, amount: u64) -> Result<(), CoinbaseError> {
        self.reward = checked_deduct(self.reward, amount)?;
        self.reward_to_pool = checked_deduct(self.reward_to_pool, amount)?;
        self.outputs.push(TxOutput {
            value: amount,
            script: address::address_to_script(self.network, payee)?,
        });
        Ok(())
    }
}

fn checked_deduct(available: u64, needed: u64) -> Result<u64, CoinbaseError> {
    available
        .checked_sub(needed)
        .ok_or(CoinbaseError::RewardUnderflow { needed, available })
}
