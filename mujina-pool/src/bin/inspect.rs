//! Build a job from a pool configuration and a saved daemon template.
//!
//! Prints the `mining.notify` parameters, network target and difficulty, and
//! optionally validates one share against the job. No network access.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;
use serde_json::json;

use mujina_pool::config::PoolConfig;
use mujina_pool::pool::manager::unix_time;
use mujina_pool::pool::{JobManager, ShareOutcome, ShareSubmission};
use mujina_pool::rpc::RpcBlockTemplate;
use mujina_pool::tracing::init_journald_or_stdout;

/// Inspect the job a pool would build from a block template
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Pool configuration (JSON)
    #[arg(short, long)]
    config: PathBuf,

    /// Saved `getblocktemplate` result (JSON)
    template: PathBuf,

    /// Extranonce2 of a share to validate (hex)
    #[arg(long, requires = "nonce")]
    extranonce2: Option<String>,

    /// Nonce of a share to validate (8 hex characters)
    #[arg(long, requires = "extranonce2")]
    nonce: Option<String>,

    /// Share ntime (8 hex characters); defaults to the template's curtime
    #[arg(long)]
    ntime: Option<String>,

    /// Difficulty the share is credited at
    #[arg(long, default_value_t = 1.0)]
    difficulty: f64,
}

fn main() -> Result<()> {
    init_journald_or_stdout();
    let args = Args::parse();

    let config = PoolConfig::load(&args.config)?;
    let resolved = config
        .resolve()
        .with_context(|| format!("Invalid config {}", args.config.display()))?;

    let text = fs::read_to_string(&args.template)
        .with_context(|| format!("Failed to read template {}", args.template.display()))?;
    let rpc: RpcBlockTemplate = serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse template {}", args.template.display()))?;

    let mut manager = JobManager::new(resolved.job_manager);
    let now = unix_time();
    let update = manager.process_template(rpc, now)?;
    let Some(job) = update.job().cloned() else {
        bail!("Template produced no job");
    };

    let mut report = json!({
        "coin": config.coin.name,
        "height": job.height(),
        "target": hex::encode(job.target().to_be_bytes::<32>()),
        "difficulty": job.difficulty(),
        "params": job.job_params().to_notify_params(),
    });

    if let (Some(extranonce2), Some(nonce)) = (args.extranonce2, args.nonce) {
        let share = ShareSubmission {
            job_id: job.job_id().to_string(),
            extranonce1: manager.next_extranonce1(),
            extranonce2,
            ntime: args
                .ntime
                .unwrap_or_else(|| job.job_params().ntime.clone()),
            nonce,
            difficulty: args.difficulty,
            previous_difficulty: None,
            ip: "127.0.0.1".into(),
            port: 0,
            worker: "inspect".into(),
        };
        report["share"] = match manager.process_share(&share, now) {
            ShareOutcome::Accepted { record, block_hex } => json!({
                "accepted": true,
                "record": record,
                "block": block_hex,
            }),
            ShareOutcome::Rejected(rejected) => json!({
                "accepted": false,
                "code": rejected.error.code(),
                "reason": rejected.error.to_string(),
            }),
        };
    }

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
