//! Variable difficulty.
//!
//! Each connection's share rate is steered toward one share per
//! `target_time` seconds. Intervals between submissions go into a sliding
//! window; every `retarget_time` seconds the window average is compared with
//! the target band and the difficulty is scaled to bring the rate back inside
//! it.

use std::collections::VecDeque;

use serde::Deserialize;

use crate::target::round_to;
use crate::tracing::prelude::*;

/// VarDiff settings for one listening port.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct VarDiffConfig {
    pub min_diff: f64,
    pub max_diff: f64,

    /// Desired seconds between shares.
    pub target_time: f64,

    /// Seconds between difficulty reviews.
    pub retarget_time: f64,

    /// Allowed deviation from `target_time`, as a percentage.
    pub variance_percent: f64,

    /// Only ever halve or double the difficulty.
    #[serde(default)]
    pub x2_mode: bool,
}

impl Default for VarDiffConfig {
    fn default() -> Self {
        Self {
            min_diff: 8.0,
            max_diff: 512.0,
            target_time: 15.0,
            retarget_time: 90.0,
            variance_percent: 30.0,
            x2_mode: false,
        }
    }
}

/// Retargeting rules derived from a [`VarDiffConfig`].
#[derive(Debug, Clone)]
pub struct VarDiff {
    config: VarDiffConfig,
    window_size: usize,
    t_min: f64,
    t_max: f64,
}

/// Per-connection retarget state, owned by the connection.
#[derive(Debug, Clone, Default)]
pub struct VarDiffState {
    last_ts: f64,
    last_retarget: Option<f64>,
    intervals: VecDeque<f64>,
}

impl VarDiffState {
    pub fn new() -> Self {
        Self::default()
    }
}

impl VarDiff {
    pub fn new(config: VarDiffConfig) -> Self {
        let variance = config.target_time * config.variance_percent / 100.0;
        let window_size = (config.retarget_time / config.target_time * 4.0)
            .round()
            .max(1.0) as usize;
        Self {
            t_min: config.target_time - variance,
            t_max: config.target_time + variance,
            window_size,
            config,
        }
    }

    pub fn config(&self) -> &VarDiffConfig {
        &self.config
    }

    /// Number of intervals averaged per retarget.
    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Record a share submitted at `now` (seconds) by a connection currently at
    /// `difficulty`. Returns the new difficulty when a retarget is due.
    ///
    /// The first submission only starts the clock, placing the first review
    /// half a retarget period away.
    pub fn on_submit(&self, state: &mut VarDiffState, now: u64, difficulty: f64) -> Option<f64> {
        let ts = now as f64;

        let Some(last_retarget) = state.last_retarget else {
            state.last_retarget = Some(ts - self.config.retarget_time / 2.0);
            state.last_ts = ts;
            state.intervals = VecDeque::with_capacity(self.window_size);
            return None;
        };

        if state.intervals.len() == self.window_size {
            state.intervals.pop_front();
        }
        state.intervals.push_back(ts - state.last_ts);
        state.last_ts = ts;

        if ts - last_retarget < self.config.retarget_time {
            return None;
        }

        state.last_retarget = Some(ts);
        let avg = state.intervals.iter().sum::<f64>() / state.intervals.len() as f64;
        let mut ddiff = self.config.target_time / avg;

        if avg > self.t_max && difficulty > self.config.min_diff {
            if self.config.x2_mode {
                ddiff = 0.5;
            }
            if ddiff * difficulty < self.config.min_diff {
                ddiff = self.config.min_diff / difficulty;
            }
        } else if avg < self.t_min {
            if self.config.x2_mode {
                ddiff = 2.0;
            }
            if ddiff * difficulty > self.config.max_diff {
                ddiff = self.config.max_diff / difficulty;
            }
        } else {
            return None;
        }

        state.intervals.clear();
        let new_difficulty = round_to(difficulty * ddiff, 8);
        debug!(
            avg_interval = avg,
            old = difficulty,
            new = new_difficulty,
            "Retargeting difficulty"
        );
        Some(new_difficulty)
    }
}
