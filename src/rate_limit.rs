//! Sliding-window rate limiting keyed by caller identifier.
//!
//! Every admitted request leaves a millisecond timestamp in its identifier's
//! record. A request is admitted when fewer than `max_requests` timestamps
//! remain inside the trailing `window_ms`. Stale timestamps are pruned on
//! access and by [`RateLimiter::sweep`], which also drops records that have
//! gone empty.

use dashmap::DashMap;
use std::collections::VecDeque;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, info};

use crate::metrics::{SWEPT_RECORDS, TRACKED_IDENTIFIERS};

// Probability that a single check also sweeps the registry
pub const DEFAULT_SWEEP_PROBABILITY: f64 = 0.01;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RateLimitError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

// clap parser for `--sweep-probability`; rejects NaN and anything outside 0..=1
pub fn parse_sweep_probability(raw: &str) -> Result<f64, RateLimitError> {
    let value = raw.trim().parse::<f64>().map_err(|e| {
        RateLimitError::InvalidArgument(format!("bad sweep probability {raw:?}: {e}"))
    })?;
    if !(0.0..=1.0).contains(&value) {
        return Err(RateLimitError::InvalidArgument(format!(
            "sweep probability must be within 0.0..=1.0, got {raw}"
        )));
    }
    Ok(value)
}

/// "At most `max_requests` admissions per rolling `window_ms` milliseconds."
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RatePolicy {
    pub max_requests: u32,
    pub window_ms: u64,
}

impl RatePolicy {
    pub fn new(max_requests: u32, window_ms: u64) -> Result<Self, RateLimitError> {
        let policy = Self {
            max_requests,
            window_ms,
        };
        policy.validate()?;
        Ok(policy)
    }

    pub fn validate(&self) -> Result<(), RateLimitError> {
        if self.max_requests < 1 {
            return Err(RateLimitError::InvalidArgument(
                "max_requests must be at least 1".to_string(),
            ));
        }
        if self.window_ms == 0 {
            return Err(RateLimitError::InvalidArgument(
                "window_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

// Parses "<max_requests>/<window_ms>", e.g. "5/60000"
impl FromStr for RatePolicy {
    type Err = RateLimitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (max, window) = s.split_once('/').ok_or_else(|| {
            RateLimitError::InvalidArgument(format!(
                "expected <max_requests>/<window_ms>, got {s:?}"
            ))
        })?;
        let max_requests = max.trim().parse::<u32>().map_err(|e| {
            RateLimitError::InvalidArgument(format!("bad max_requests {max:?}: {e}"))
        })?;
        let window_ms = window.trim().parse::<u64>().map_err(|e| {
            RateLimitError::InvalidArgument(format!("bad window_ms {window:?}: {e}"))
        })?;
        Self::new(max_requests, window_ms)
    }
}

impl std::fmt::Display for RatePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.max_requests, self.window_ms)
    }
}

/// Outcome of a single [`RateLimiter::check_and_record`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,
    pub limit: u32,
    /// Admissions still available inside the current window.
    pub remaining: u32,
    /// Whole seconds until the oldest retained admission leaves the window.
    /// Only set when `allowed` is false.
    pub retry_after_seconds: Option<u64>,
}

impl Decision {
    fn allowed(limit: u32, remaining: u32) -> Self {
        Self {
            allowed: true,
            limit,
            remaining,
            retry_after_seconds: None,
        }
    }

    fn limited(limit: u32, retry_after_seconds: u64) -> Self {
        Self {
            allowed: false,
            limit,
            remaining: 0,
            retry_after_seconds: Some(retry_after_seconds),
        }
    }
}

/// Source of "now" in milliseconds since the Unix epoch.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0)
    }
}

/// Clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self {
            now: AtomicU64::new(start_ms),
        }
    }

    pub fn set(&self, now_ms: u64) {
        self.now.store(now_ms, Ordering::SeqCst);
    }

    pub fn advance(&self, by_ms: u64) {
        self.now.fetch_add(by_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Default)]
struct WindowRecord {
    timestamps: VecDeque<u64>,
    // widest window any policy has applied to this record
    window_ms: u64,
}

impl WindowRecord {
    fn prune(&mut self, now: u64) {
        let window_ms = self.window_ms;
        self.timestamps
            .retain(|&t| now.saturating_sub(t) < window_ms);
    }

    // timestamps that count against a policy with `window_ms`
    fn in_window(&self, now: u64, window_ms: u64) -> impl Iterator<Item = u64> + '_ {
        self.timestamps
            .iter()
            .copied()
            .filter(move |&t| now.saturating_sub(t) < window_ms)
    }
}

/// Process-wide registry of per-identifier windows.
///
/// The registry shard is locked only to look up or insert a record. The
/// prune-then-append for one identifier runs under that record's own mutex,
/// so concurrent callers for different identifiers never wait on each other.
pub struct RateLimiter {
    records: DashMap<String, Arc<Mutex<WindowRecord>>>,
    clock: Arc<dyn Clock>,
    sweep_probability: f64,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock), DEFAULT_SWEEP_PROBABILITY)
    }

    pub fn with_clock(clock: Arc<dyn Clock>, sweep_probability: f64) -> Self {
        Self {
            records: DashMap::new(),
            clock,
            sweep_probability: if sweep_probability.is_finite() {
                sweep_probability.clamp(0.0, 1.0)
            } else {
                DEFAULT_SWEEP_PROBABILITY
            },
        }
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    /// Admit or reject a request from `identifier` under `policy`, at the
    /// limiter clock's current time.
    ///
    /// On admission the current timestamp is recorded. On rejection the
    /// record is only pruned. With probability `sweep_probability` the call
    /// also sweeps idle records out of the registry.
    pub fn check_and_record(
        &self,
        identifier: &str,
        policy: RatePolicy,
    ) -> Result<Decision, RateLimitError> {
        let now = self.clock.now_ms();
        let decision = self.check_and_record_at(identifier, policy, now)?;

        if self.sweep_probability > 0.0 && rand::random::<f64>() < self.sweep_probability {
            self.sweep(now);
        }

        Ok(decision)
    }

    /// Same as [`check_and_record`](Self::check_and_record) with an explicit
    /// timestamp, and without the opportunistic sweep.
    pub fn check_and_record_at(
        &self,
        identifier: &str,
        policy: RatePolicy,
        now: u64,
    ) -> Result<Decision, RateLimitError> {
        policy.validate()?;
        if identifier.is_empty() {
            return Err(RateLimitError::InvalidArgument(
                "identifier must not be empty".to_string(),
            ));
        }

        let record = self
            .records
            .entry(identifier.to_string())
            .or_default()
            .value()
            .clone();

        let mut window = record.lock().unwrap_or_else(PoisonError::into_inner);
        window.window_ms = window.window_ms.max(policy.window_ms);
        window.prune(now);

        let limit = policy.max_requests;
        let used = window.in_window(now, policy.window_ms).count();

        if used < limit as usize {
            window.timestamps.push_back(now);
            let remaining = limit.saturating_sub((used + 1) as u32);
            return Ok(Decision::allowed(limit, remaining));
        }

        let oldest = window.in_window(now, policy.window_ms).min().unwrap_or(now);
        let wait_ms = oldest.saturating_add(policy.window_ms).saturating_sub(now);
        let retry_after = wait_ms.div_ceil(1000);

        debug!(
            identifier = %identifier,
            limit = limit,
            retry_after_seconds = retry_after,
            "Request rate limited"
        );

        Ok(Decision::limited(limit, retry_after))
    }

    /// Drop every idle record whose window has no timestamps left at `now`.
    ///
    /// Records currently held by an in-flight check are skipped. Returns the
    /// number of records removed.
    pub fn sweep(&self, now: u64) -> usize {
        let before = self.records.len();

        self.records.retain(|_, record| {
            // another caller holds a clone and may be about to append
            if Arc::strong_count(record) > 1 {
                return true;
            }
            let mut window = record.lock().unwrap_or_else(PoisonError::into_inner);
            window.prune(now);
            !window.timestamps.is_empty()
        });

        let after = self.records.len();
        let removed = before.saturating_sub(after);

        TRACKED_IDENTIFIERS.set(after as f64);
        if removed > 0 {
            SWEPT_RECORDS.inc_by(removed as f64);
            debug!(
                removed_records = removed,
                remaining_records = after,
                "Rate limiter sweep completed"
            );
        }

        removed
    }

    // Number of identifiers currently tracked
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn reset(&self) {
        self.records.clear();
        TRACKED_IDENTIFIERS.set(0.0);
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

// Periodic sweep so idle identifiers don't pile up between requests
pub fn spawn_sweeper(limiter: Arc<RateLimiter>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(every);
        info!(interval = ?every, "Rate limiter sweeper started");

        loop {
            ticker.tick().await;
            let now = limiter.now_ms();
            limiter.sweep(now);
        }
    })
}
