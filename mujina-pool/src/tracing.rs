//! Logging for the pool.
//!
//! Library code emits events through `use crate::tracing::prelude::*` and never
//! installs a subscriber. Binaries call [`init_journald_or_stdout`] once at
//! startup.

#[cfg(target_os = "linux")]
use std::{env, io};

use time::OffsetDateTime;
use tracing_subscriber::{
    filter::{EnvFilter, LevelFilter},
    fmt::{format::Writer, time::FormatTime},
    prelude::*,
};

pub mod prelude {
    #[allow(unused_imports)]
    pub use tracing::{debug, error, info, trace, warn};
}

use prelude::*;

// JOURNAL_STREAM holds "device:inode" of the journal socket. It is inherited by
// children whose stderr may since have been redirected, so compare it with
// stderr itself.
#[cfg(target_os = "linux")]
fn stderr_is_journal_stream() -> bool {
    let Ok(journal_stream) = env::var("JOURNAL_STREAM") else {
        return false;
    };
    let Some((dev, ino)) = parse_journal_stream(&journal_stream) else {
        return false;
    };

    match rustix::fs::fstat(io::stderr()) {
        Ok(stat) => stat.st_dev as u64 == dev && stat.st_ino as u64 == ino,
        Err(_) => false,
    }
}

#[cfg(target_os = "linux")]
fn parse_journal_stream(value: &str) -> Option<(u64, u64)> {
    let (dev, ino) = value.split_once(':')?;
    Some((dev.parse().ok()?, ino.parse().ok()?))
}

/// Install a subscriber: journald when stderr is connected to the journal,
/// stdout otherwise.
pub fn init_journald_or_stdout() {
    #[cfg(target_os = "linux")]
    {
        if stderr_is_journal_stream() {
            if let Ok(layer) = tracing_journald::layer() {
                tracing_subscriber::registry().with(layer).init();
                return;
            }
            use_stdout();
            error!("Failed to initialize journald logging, using stdout.");
            return;
        }
    }

    use_stdout();
}

// Filter by RUST_LOG, defaulting to INFO rather than ERROR.
fn use_stdout() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .with_env_var("RUST_LOG")
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_timer(LocalTimer))
        .init();
}

// Local time to the nearest second.
struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
        let formatted = now
            .format(time::macros::format_description!("[hour]:[minute]:[second]"))
            .map_err(|_| std::fmt::Error)?;
        write!(w, "{formatted}")
    }
}
