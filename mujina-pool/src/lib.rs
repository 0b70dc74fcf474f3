//! Mining pool protocol core.
//!
//! Turns daemon block templates into Stratum jobs and validates the shares
//! miners submit against them. Networking, persistence and payouts live
//! outside this crate.

pub mod address;
pub mod algorithm;
pub mod config;
pub mod encoding;
pub mod pool;
pub mod rpc;
pub mod target;
pub mod tracing;
pub mod worker;
