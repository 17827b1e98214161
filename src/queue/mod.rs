//! # Stage: Admission Queue
//!
//! ## Responsibility
//! Admit transcription jobs into a bounded FIFO, run them under a fixed-size
//! concurrency gate, and hold each job's outcome until the submitter collects
//! it. Report queue positions and wait-time estimates from the declared job
//! durations.
//!
//! ## Guarantees
//! - Bounded: at most `capacity` admitted jobs wait to begin execution; a
//!   rejected submission changes nothing
//! - Gated: at most `concurrency` jobs run their callback at any time
//! - Ordered: positions are handed out under one lock, strictly increasing
//!   for concurrent submitters
//! - Isolated: a failing or panicking job becomes that job's error outcome;
//!   the dispatch loop keeps running
//! - Bounded memory: outcomes nobody collects are purged after `outcome_ttl`
//!
//! ## NOT Responsible For
//! - Choosing a provider (that belongs to `routing`)
//! - Persisting jobs across restarts
//! - Priority scheduling (strict FIFO)

pub mod manager;

pub use manager::{JobCallback, QueueManager, QueueSnapshot};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::time::Duration;

// ── Default value functions ──────────────────────────────────────────────

/// Default admission bound: 50 waiting jobs.
fn default_capacity() -> usize {
    50
}

/// Default concurrency gate: 3 simultaneous jobs.
fn default_concurrency() -> usize {
    3
}

/// Default outcome retention: 600 seconds.
fn default_outcome_ttl_s() -> u64 {
    600
}

/// Default sweep interval for expired outcomes: 60 seconds.
fn default_purge_interval_s() -> u64 {
    60
}

/// Default await poll interval: 100ms.
fn default_poll_interval_ms() -> u64 {
    100
}

/// Default wait-estimate scale: 1.0 (real time).
fn default_rate_factor() -> f64 {
    1.0
}

// ── QueueConfig ──────────────────────────────────────────────────────────

/// Queue sizing and timing.
///
/// # Example
///
/// ```toml
/// [queue]
/// capacity = 20
/// concurrency = 2
/// outcome_ttl_s = 300
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct QueueConfig {
    /// Maximum admitted jobs that have not begun executing.
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    /// Maximum jobs executing at once. Fixed for the queue's lifetime.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Seconds an uncollected outcome is kept before being purged.
    #[serde(default = "default_outcome_ttl_s")]
    pub outcome_ttl_s: u64,
    /// Seconds between sweeps for expired outcomes.
    #[serde(default = "default_purge_interval_s")]
    pub purge_interval_s: u64,
    /// Milliseconds between outcome checks while awaiting.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Processing-speed factor applied to wait estimates
    /// (seconds of work per second of declared audio).
    #[serde(default = "default_rate_factor")]
    pub rate_factor: f64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            concurrency: default_concurrency(),
            outcome_ttl_s: default_outcome_ttl_s(),
            purge_interval_s: default_purge_interval_s(),
            poll_interval_ms: default_poll_interval_ms(),
            rate_factor: default_rate_factor(),
        }
    }
}

impl QueueConfig {
    /// Config with the given bounds and default timings.
    pub fn new(capacity: usize, concurrency: usize) -> Self {
        Self {
            capacity,
            concurrency,
            ..Self::default()
        }
    }

    /// Outcome retention as a [`Duration`].
    pub fn outcome_ttl(&self) -> Duration {
        Duration::from_secs(self.outcome_ttl_s)
    }

    /// Sweep interval as a [`Duration`].
    pub fn purge_interval(&self) -> Duration {
        Duration::from_secs(self.purge_interval_s)
    }

    /// Poll interval as a [`Duration`].
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Validate ranges, returning one `(field, value, reason)` per violation.
    pub(crate) fn violations(&self) -> Vec<(&'static str, String, &'static str)> {
        let mut out = Vec::new();
        if self.capacity == 0 {
            out.push(("queue.capacity", "0".to_string(), "must be at least 1"));
        }
        if self.concurrency == 0 {
            out.push(("queue.concurrency", "0".to_string(), "must be at least 1"));
        }
        if self.outcome_ttl_s == 0 {
            out.push(("queue.outcome_ttl_s", "0".to_string(), "must be at least 1 second"));
        }
        if self.purge_interval_s == 0 {
            out.push((
                "queue.purge_interval_s",
                "0".to_string(),
                "must be at least 1 second",
            ));
        }
        if self.poll_interval_ms == 0 {
            out.push(("queue.poll_interval_ms", "0".to_string(), "must be at least 1ms"));
        }
        if !self.rate_factor.is_finite() || self.rate_factor <= 0.0 {
            out.push((
                "queue.rate_factor",
                self.rate_factor.to_string(),
                "must be a finite value > 0",
            ));
        }
        out
    }
}

/// Estimated timing for one queued job, in seconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct WaitEstimate {
    /// Time until the job is expected to start.
    pub wait_secs: f64,
    /// Expected processing time of the job itself.
    pub processing_secs: f64,
}

impl WaitEstimate {
    /// Expected time until the job completes.
    pub fn total_secs(&self) -> f64 {
        self.wait_secs + self.processing_secs
    }
}
