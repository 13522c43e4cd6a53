//! Token bucket state machine for a single identifier.

use crate::error::{Result, TollgateError};

/// Result of evaluating a bucket against the current time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketState {
    /// Window active, tokens available
    Ok,
    /// Window active, tokens exhausted
    NoToken,
    /// Window expired; the next access refills
    ShouldReset,
}

/// Rate limit window of one identifier.
///
/// Buckets are plain data and carry no synchronization of their own. They are
/// only ever touched while the owning [`Limiter`](super::Limiter) holds its lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bucket {
    /// Unix timestamp (seconds) after which the window is expired
    reset_at: i64,
    /// Remaining operations in the current window
    tokens: u64,
}

impl Bucket {
    /// Create a bucket whose window ends `cycle_secs` after `now`.
    pub fn new(cycle_secs: u64, tokens: u64, now: i64) -> Result<Self> {
        if cycle_secs == 0 {
            return Err(TollgateError::InvalidConfig(
                "bucket reset cycle must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            reset_at: window_end(now, cycle_secs),
            tokens,
        })
    }

    /// Classify the bucket at `now`. Has no side effects.
    pub fn evaluate(&self, now: i64) -> BucketState {
        if self.reset_at <= now {
            BucketState::ShouldReset
        } else if self.tokens == 0 {
            BucketState::NoToken
        } else {
            BucketState::Ok
        }
    }

    /// Take one token. Only valid right after `evaluate` returned [`BucketState::Ok`].
    pub fn consume(&mut self) {
        debug_assert!(self.tokens > 0, "consume called on an empty bucket");
        self.tokens -= 1;
    }

    /// Start a new window at `now`, charging the refilling access one token.
    ///
    /// A refill amount of zero leaves the bucket at zero tokens rather than
    /// underflowing, so the rest of the window is denied.
    pub fn refill(&mut self, cycle_secs: u64, tokens: u64, now: i64) {
        self.reset_at = window_end(now, cycle_secs);
        self.tokens = tokens.saturating_sub(1);
    }

    /// Remaining tokens in the current window.
    pub fn tokens(&self) -> u64 {
        self.tokens
    }

    /// Timestamp at which the current window expires.
    pub fn reset_at(&self) -> i64 {
        self.reset_at
    }
}

fn window_end(now: i64, cycle_secs: u64) -> i64 {
    now.saturating_add(i64::try_from(cycle_secs).unwrap_or(i64::MAX))
}
