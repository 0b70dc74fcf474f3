//! Share submissions, validation outcomes and share records.

use serde::Serialize;
use thiserror::Error;

/// Why a share was rejected.
///
/// Each variant maps to a stable Stratum error code so the transport layer can
/// answer `mining.submit` without further interpretation.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ShareError {
    #[error("incorrect size of extranonce2")]
    ExtraNonce2Size,

    #[error("job not found")]
    JobNotFound,

    #[error("incorrect size of ntime")]
    NtimeSize,

    #[error("ntime out of range")]
    NtimeOutOfRange,

    #[error("incorrect size of nonce")]
    NonceSize,

    #[error("malformed {0}")]
    Malformed(&'static str),

    #[error("duplicate share")]
    Duplicate,

    #[error("low difficulty share of {share_diff}")]
    LowDifficulty { share_diff: f64 },
}

impl ShareError {
    /// Stratum error code.
    pub fn code(&self) -> u32 {
        match self {
            ShareError::ExtraNonce2Size
            | ShareError::NtimeSize
            | ShareError::NtimeOutOfRange
            | ShareError::NonceSize
            | ShareError::Malformed(_) => 20,
            ShareError::JobNotFound => 21,
            ShareError::Duplicate => 22,
            ShareError::LowDifficulty { .. } => 23,
        }
    }
}

/// A `mining.submit` from a connection, with the connection's context.
///
/// Hex fields are passed through as the miner sent them; validation checks
/// their lengths.
#[derive(Debug, Clone, PartialEq)]
pub struct ShareSubmission {
    pub job_id: String,

    /// Extranonce1 assigned to the connection, hex.
    pub extranonce1: String,

    /// Miner-chosen extranonce2, hex.
    pub extranonce2: String,

    /// Header time, 8 hex characters.
    pub ntime: String,

    /// Header nonce, 8 hex characters.
    pub nonce: String,

    /// Difficulty currently assigned to the connection.
    pub difficulty: f64,

    /// Difficulty assigned before the most recent retarget, if any.
    pub previous_difficulty: Option<f64>,

    pub ip: String,
    pub port: u16,
    pub worker: String,
}

/// An accepted share, handed to share accounting.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareRecord {
    pub job: String,
    pub ip: String,
    pub port: u16,
    pub worker: String,
    pub height: u64,
    pub block_reward: u64,

    /// Difficulty credited to the miner.
    pub difficulty: f64,

    /// Difficulty the submitted hash actually achieved, 8 decimals.
    pub share_diff: f64,

    /// Network difficulty scaled by the algorithm's share multiplier.
    pub block_diff: f64,

    /// Network difficulty of the template.
    pub block_diff_actual: f64,

    /// Hash of the block, when the share is a block candidate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_hash: Option<String>,

    /// Header hash of a non-block share, when diagnostics are enabled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_hash_invalid: Option<String>,

    /// `extranonce1:extranonce2:ntime:nonce`
    pub share_serialized: String,
}

/// A rejected share with the context needed to count it.
#[derive(Debug, Clone, PartialEq)]
pub struct RejectedShare {
    pub job: String,
    pub ip: String,
    pub worker: String,
    pub difficulty: f64,
    pub error: ShareError,
}

/// Result of validating a submission.
#[derive(Debug, Clone, PartialEq)]
pub enum ShareOutcome {
    Accepted {
        record: ShareRecord,

        /// Serialized block for `submitblock`, when the share solves a block.
        block_hex: Option<String>,
    },
    Rejected(RejectedShare),
}

impl ShareOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, ShareOutcome::Accepted { .. })
    }

    pub fn is_block(&self) -> bool {
        matches!(
            self,
            ShareOutcome::Accepted {
                block_hex: Some(_),
                ..
            }
        )
    }

    /// The rejection reason, if rejected.
    pub fn error(&self) -> Option<&ShareError> {
        match self {
            ShareOutcome::Rejected(rejected) => Some(&rejected.error),
            ShareOutcome::Accepted { .. } => None,
        }
    }
}
