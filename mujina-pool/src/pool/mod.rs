//! Pool protocol core: jobs, coinbase construction and share validation.

pub mod coinbase;
pub mod extranonce;
pub mod manager;
pub mod merkle;
pub mod share;
pub mod template;
pub mod vardiff;

#[cfg(test)]
pub(crate) mod test_data;

pub use manager::{JobManager, JobManagerOptions, TemplateUpdate};
pub use share::{ShareError, ShareOutcome, ShareRecord, ShareSubmission};
pub use template::{BlockTemplate, JobParams};
pub use vardiff::{VarDiff, VarDiffConfig, VarDiffState};
