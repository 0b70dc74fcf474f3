//! Job lifecycle and share validation.
//!
//! The [`JobManager`] owns the current job and the set of jobs miners may still
//! submit against. Template updates take `&mut self` and share validation
//! takes `&self`, so a caller that serializes them (a single task, or an
//! `RwLock`) sees every transition as atomic: a share is checked against
//! either the old job set or the new one, never a mix.
//!
//! Two transitions exist:
//!
//! - **New block**: the daemon reports a different previous block hash. The job
//!   set is replaced and miners must drop their work.
//! - **Refresh**: same block, new transaction set. The new job is added and
//!   older jobs for the block stay valid.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use ruint::aliases::U256;

use crate::address::NetworkParams;
use crate::algorithm::HashFamily;
use crate::encoding::{self, decode_hex};
use crate::pool::coinbase::{CoinbaseParams, Recipient, RewardType};
use crate::pool::extranonce::{
    EXTRANONCE_PLACEHOLDER, EXTRANONCE2_SIZE, ExtraNonceCounter, Extranonce2, JobCounter,
};
use crate::pool::share::{RejectedShare, ShareError, ShareOutcome, ShareRecord, ShareSubmission};
use crate::pool::template::{BlockTemplate, TemplateError};
use crate::rpc::RpcBlockTemplate;
use crate::target::{self, DIFF1};
use crate::tracing::prelude::*;

/// How far past the pool's clock a share's ntime may be, in seconds.
pub const MAX_NTIME_AHEAD: u64 = 7200;

/// Shares within this fraction of the assigned difficulty are accepted.
const DIFFICULTY_TOLERANCE: f64 = 0.99;

/// Settings the job manager builds every job with.
#[derive(Debug, Clone)]
pub struct JobManagerOptions {
    pub hash_family: HashFamily,
    pub pool_script: Vec<u8>,
    pub reward_type: RewardType,
    pub tx_messages: bool,
    pub tx_comment: String,
    pub recipients: Vec<Recipient>,
    pub network: Option<NetworkParams>,
    pub coinbase_string: String,

    /// Seed for extranonce1 allocation; random when `None`.
    pub instance_id: Option<u32>,

    /// Attach the header hash to non-block shares.
    pub emit_invalid_block_hashes: bool,
}

/// What a template update did.
#[derive(Debug, Clone)]
pub enum TemplateUpdate {
    /// A new block: all earlier jobs were retired.
    NewBlock(Arc<BlockTemplate>),

    /// Same block with a refreshed template; earlier jobs remain valid.
    Refreshed(Arc<BlockTemplate>),

    /// Nothing changed (same block, or a stale template).
    Unchanged,
}

impl TemplateUpdate {
    pub fn is_new_block(&self) -> bool {
        matches!(self, TemplateUpdate::NewBlock(_))
    }

    /// The job to broadcast, if any.
    pub fn job(&self) -> Option<&Arc<BlockTemplate>> {
        match self {
            TemplateUpdate::NewBlock(job) | TemplateUpdate::Refreshed(job) => Some(job),
            TemplateUpdate::Unchanged => None,
        }
    }
}

/// Current seconds since the Unix epoch.
pub fn unix_time() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

pub struct JobManager {
    options: JobManagerOptions,
    extranonce_counter: ExtraNonceCounter,
    job_counter: JobCounter,
    current_job: Option<Arc<BlockTemplate>>,
    valid_jobs: HashMap<String, Arc<BlockTemplate>>,
}

impl JobManager {
    pub fn new(options: JobManagerOptions) -> Self {
        let extranonce_counter = ExtraNonceCounter::new(options.instance_id);
        Self {
            options,
            extranonce_counter,
            job_counter: JobCounter::new(),
            current_job: None,
            valid_jobs: HashMap::new(),
        }
    }

    /// Allocate an extranonce1 for a new connection.
    pub fn next_extranonce1(&mut self) -> String {
        self.extranonce_counter.next()
    }

    /// Bytes of extranonce2 each miner must submit.
    pub fn extranonce2_size(&self) -> usize {
        EXTRANONCE2_SIZE
    }

    pub fn current_job(&self) -> Option<&Arc<BlockTemplate>> {
        self.current_job.as_ref()
    }

    pub fn valid_job(&self, job_id: &str) -> Option<&Arc<BlockTemplate>> {
        self.valid_jobs.get(job_id)
    }

    pub fn valid_job_count(&self) -> usize {
        self.valid_jobs.len()
    }

    /// Consider a freshly polled daemon template.
    ///
    /// A template is a new block when there is no current job or its previous
    /// block hash differs. A different previous hash at a lower height is a
    /// stale daemon view and is ignored. On error nothing changes.
    pub fn process_template(
        &mut self,
        rpc: RpcBlockTemplate,
        now: u64,
    ) -> Result<TemplateUpdate, TemplateError> {
        if let Some(current) = &self.current_job {
            let current = current.rpc();
            if current.previous_block_hash == rpc.previous_block_hash {
                return Ok(TemplateUpdate::Unchanged);
            }
            if rpc.height < current.height {
                debug!(
                    height = rpc.height,
                    current_height = current.height,
                    "Ignoring stale block template"
                );
                return Ok(TemplateUpdate::Unchanged);
            }
        }

        let job = self.build_job(rpc, now)?;
        info!(
            job_id = %job.job_id(),
            height = job.height(),
            prev_hash = %job.rpc().previous_block_hash,
            difficulty = job.difficulty(),
            transactions = job.rpc().transactions.len(),
            "New block"
        );

        self.valid_jobs.clear();
        self.valid_jobs.insert(job.job_id().to_string(), job.clone());
        self.current_job = Some(job.clone());
        Ok(TemplateUpdate::NewBlock(job))
    }

    /// Replace the current job with a refreshed template for the same block.
    ///
    /// Earlier jobs stay valid until the next new block.
    pub fn update_current_job(
        &mut self,
        rpc: RpcBlockTemplate,
        now: u64,
    ) -> Result<TemplateUpdate, TemplateError> {
        let job = self.build_job(rpc, now)?;
        info!(
            job_id = %job.job_id(),
            height = job.height(),
            valid_jobs = self.valid_jobs.len() + 1,
            "Refreshed job"
        );

        self.valid_jobs.insert(job.job_id().to_string(), job.clone());
        self.current_job = Some(job.clone());
        Ok(TemplateUpdate::Refreshed(job))
    }

    // The job counter only advances once the template is built
    fn build_job(
        &mut self,
        rpc: RpcBlockTemplate,
        now: u64,
    ) -> Result<Arc<BlockTemplate>, TemplateError> {
        let mut job_counter = self.job_counter.clone();
        let job_id = job_counter.next();

        let options = &self.options;
        let params = CoinbaseParams {
            pool_script: &options.pool_script,
            extranonce_size: EXTRANONCE_PLACEHOLDER.len(),
            reward_type: options.reward_type,
            tx_messages: options.tx_messages,
            tx_comment: &options.tx_comment,
            recipients: &options.recipients,
            network: options.network.as_ref(),
            coinbase_string: &options.coinbase_string,
            timestamp: now,
        };
        let height = rpc.height;
        let job = BlockTemplate::new(job_id, rpc, &params).inspect_err(|e| {
            warn!(height, error = %e, "Failed to build job from template");
        })?;

        self.job_counter = job_counter;
        Ok(Arc::new(job))
    }

    /// Validate a share against the valid job set.
    ///
    /// Checks run cheapest first; the duplicate check comes last before any
    /// hashing so replayed shares cost nothing. Every outcome, accepted or
    /// not, carries the record share accounting needs.
    pub fn process_share(&self, share: &ShareSubmission, now: u64) -> ShareOutcome {
        match self.validate_share(share, now) {
            Ok(outcome) => outcome,
            Err(error) => {
                debug!(
                    job_id = %share.job_id,
                    worker = %share.worker,
                    code = error.code(),
                    reason = %error,
                    "Share rejected"
                );
                ShareOutcome::Rejected(RejectedShare {
                    job: share.job_id.clone(),
                    ip: share.ip.clone(),
                    worker: share.worker.clone(),
                    difficulty: share.difficulty,
                    error,
                })
            }
        }
    }

    fn validate_share(
        &self,
        share: &ShareSubmission,
        now: u64,
    ) -> Result<ShareOutcome, ShareError> {
        let extranonce2 = Extranonce2::from_hex(&share.extranonce2, EXTRANONCE2_SIZE)
            .map_err(|_| ShareError::ExtraNonce2Size)?;

        let job = self
            .valid_jobs
            .get(&share.job_id)
            .ok_or(ShareError::JobNotFound)?;

        if share.ntime.len() != 8 {
            return Err(ShareError::NtimeSize);
        }
        let ntime = parse_hex_word(&share.ntime, "ntime")?;
        if ntime < job.rpc().cur_time || u64::from(ntime) > now + MAX_NTIME_AHEAD {
            return Err(ShareError::NtimeOutOfRange);
        }

        if share.nonce.len() != 8 {
            return Err(ShareError::NonceSize);
        }
        let nonce = parse_hex_word(&share.nonce, "nonce")?;
        let extranonce1 =
            decode_hex(&share.extranonce1).map_err(|_| ShareError::Malformed("extranonce1"))?;

        if !job.register_submit(&extranonce1, extranonce2.as_bytes(), ntime, nonce) {
            return Err(ShareError::Duplicate);
        }

        let family = &self.options.hash_family;
        let coinbase = job.serialize_coinbase(&extranonce1, extranonce2.as_bytes());
        let merkle_root = job.merkle_tree().with_first(family.coinbase_hash(&coinbase));
        let header = job.serialize_header(&merkle_root, ntime, nonce);
        let header_hash = U256::from_le_bytes(family.pow_hash(&header, ntime));

        let multiplier = family.share_multiplier();
        let share_diff =
            target::u256_to_f64(DIFF1) / target::u256_to_f64(header_hash) * multiplier;
        let block_diff = job.difficulty() * multiplier;

        let mut difficulty = share.difficulty;
        let mut block_hash = None;
        let mut block_hash_invalid = None;
        let mut block_hex = None;

        if target::is_block_candidate(job.target(), header_hash) {
            let hash = hex::encode(family.block_hash(&header, ntime));
            info!(
                job_id = %job.job_id(),
                height = job.height(),
                worker = %share.worker,
                block_hash = %hash,
                "Block candidate found"
            );
            block_hex = Some(hex::encode(job.serialize_block(&header, &coinbase)));
            block_hash = Some(hash);
        } else {
            if self.options.emit_invalid_block_hashes {
                block_hash_invalid = Some(hex::encode(encoding::reversed(&encoding::sha256d(
                    &header,
                ))));
            }

            if share_diff / difficulty < DIFFICULTY_TOLERANCE {
                match share.previous_difficulty {
                    Some(previous) if previous > 0.0 && share_diff >= previous => {
                        difficulty = previous;
                    }
                    _ => return Err(ShareError::LowDifficulty { share_diff }),
                }
            }
        }

        let record = ShareRecord {
            job: share.job_id.clone(),
            ip: share.ip.clone(),
            port: share.port,
            worker: share.worker.clone(),
            height: job.height(),
            block_reward: job.rpc().coinbase_value,
            difficulty,
            share_diff: target::round_to(share_diff, 8),
            block_diff,
            block_diff_actual: job.difficulty(),
            block_hash,
            block_hash_invalid,
            share_serialized: format!(
                "{}:{}:{}:{}",
                share.extranonce1, share.extranonce2, share.ntime, share.nonce
            ),
        };
        debug!(
            job_id = %record.job,
            worker = %record.worker,
            ip = %record.ip,
            difficulty = record.difficulty,
            share_diff = record.share_diff,
            "Share accepted"
        );

        Ok(ShareOutcome::Accepted { record, block_hex })
    }
}

// Eight hex digits only; `from_str_radix` alone also takes a sign.
fn parse_hex_word(value: &str, field: &'static str) -> Result<u32, ShareError> {
    if !value.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(ShareError::Malformed(field));
    }
    u32::from_str_radix(value, 16).map_err(|_| ShareError::Malformed(field))
}
