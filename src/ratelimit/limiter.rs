//! Core rate limiter implementation.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, trace};

use super::backend::AccessControl;
use super::bucket::{Bucket, BucketState};
use super::clock::{Clock, SystemClock};
use crate::error::{Result, TollgateError};

/// Settings applied to bucket creation and refill.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimiterSettings {
    /// Maximum number of distinct identifiers tracked at once
    pub capacity: usize,
    /// Window length in seconds
    pub reset_cycle: u64,
    /// Tokens granted per window
    pub reset_tokens: u64,
}

impl LimiterSettings {
    fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(TollgateError::InvalidConfig(
                "capacity must be greater than zero".to_string(),
            ));
        }
        if self.reset_cycle == 0 {
            return Err(TollgateError::InvalidConfig(
                "reset cycle must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Copy of a bucket's state at the time it was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketSnapshot {
    pub tokens: u64,
    pub reset_at: i64,
}

struct State {
    buckets: HashMap<String, Bucket>,
    settings: LimiterSettings,
}

/// Per-identifier rate limiter over a bounded set of token buckets.
///
/// A single lock guards both the buckets and the settings, so the capacity
/// check and the insertion of a new bucket happen atomically. Every method
/// takes the lock exclusively, including the getters.
pub struct Limiter {
    state: RwLock<State>,
    clock: Arc<dyn Clock>,
}

impl Limiter {
    /// Create a limiter using the system clock.
    pub fn new(capacity: usize, reset_cycle: u64, reset_tokens: u64) -> Result<Self> {
        Self::with_clock(capacity, reset_cycle, reset_tokens, Arc::new(SystemClock))
    }

    /// Create a limiter reading time from `clock`.
    pub fn with_clock(
        capacity: usize,
        reset_cycle: u64,
        reset_tokens: u64,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let settings = LimiterSettings {
            capacity,
            reset_cycle,
            reset_tokens,
        };
        settings.validate()?;

        Ok(Self {
            state: RwLock::new(State {
                buckets: HashMap::new(),
                settings,
            }),
            clock,
        })
    }

    /// Decide whether `id` may proceed.
    ///
    /// Returns `Ok(false)` when the identifier is throttled. The only error is
    /// [`TollgateError::CapacityExceeded`], raised when `id` is new and the
    /// limiter is already full.
    pub fn access(&self, id: &str) -> Result<bool> {
        let now = self.clock.now();
        let mut state = self.state.write();
        let settings = state.settings;

        let Some(bucket) = state.buckets.get_mut(id) else {
            if state.buckets.len() >= settings.capacity {
                return Err(TollgateError::CapacityExceeded {
                    capacity: settings.capacity,
                });
            }

            let bucket = Bucket::new(settings.reset_cycle, settings.reset_tokens, now)?;
            debug!(
                id = %id,
                tokens = bucket.tokens(),
                reset_at = bucket.reset_at(),
                "Creating new bucket"
            );
            state.buckets.insert(id.to_string(), bucket);
            return Ok(true);
        };

        let bucket_state = bucket.evaluate(now);
        trace!(id = %id, state = ?bucket_state, tokens = bucket.tokens(), "Evaluated bucket");

        match bucket_state {
            BucketState::NoToken => Ok(false),
            BucketState::Ok => {
                bucket.consume();
                Ok(true)
            }
            BucketState::ShouldReset => {
                bucket.refill(settings.reset_cycle, settings.reset_tokens, now);
                debug!(
                    id = %id,
                    tokens = bucket.tokens(),
                    reset_at = bucket.reset_at(),
                    "Refilled bucket"
                );
                Ok(true)
            }
        }
    }

    /// Number of identifiers currently tracked.
    pub fn size(&self) -> usize {
        self.state.write().buckets.len()
    }

    /// Maximum number of identifiers tracked at once.
    pub fn capacity(&self) -> usize {
        self.state.write().settings.capacity
    }

    /// Raise the capacity. Values not above the current capacity are ignored.
    pub fn set_capacity(&self, capacity: usize) {
        let mut state = self.state.write();
        if capacity > state.settings.capacity {
            state.settings.capacity = capacity;
        }
    }

    /// Window length in seconds used for new buckets and refills.
    pub fn reset_cycle(&self) -> u64 {
        self.state.write().settings.reset_cycle
    }

    /// Change the window length for future buckets and refills.
    pub fn set_reset_cycle(&self, reset_cycle: u64) -> Result<()> {
        if reset_cycle == 0 {
            return Err(TollgateError::InvalidConfig(
                "reset cycle must be greater than zero".to_string(),
            ));
        }
        self.state.write().settings.reset_cycle = reset_cycle;
        Ok(())
    }

    /// Tokens granted per window.
    pub fn reset_tokens(&self) -> u64 {
        self.state.write().settings.reset_tokens
    }

    /// Change the tokens granted to future buckets and refills.
    pub fn set_reset_tokens(&self, reset_tokens: u64) {
        self.state.write().settings.reset_tokens = reset_tokens;
    }

    /// Copy of the current settings.
    pub fn settings(&self) -> LimiterSettings {
        self.state.write().settings
    }

    /// State of the bucket tracking `id`, if any.
    pub fn snapshot(&self, id: &str) -> Option<BucketSnapshot> {
        let state = self.state.write();
        state.buckets.get(id).map(|b| BucketSnapshot {
            tokens: b.tokens(),
            reset_at: b.reset_at(),
        })
    }

    /// Drop every bucket whose window has expired. Returns how many were removed.
    pub fn sweep_expired(&self) -> usize {
        let now = self.clock.now();
        let mut state = self.state.write();
        let before = state.buckets.len();
        state
            .buckets
            .retain(|_, b| b.evaluate(now) != BucketState::ShouldReset);
        let removed = before - state.buckets.len();

        if removed > 0 {
            debug!(removed, remaining = state.buckets.len(), "Swept expired buckets");
        }
        removed
    }

    /// Drop all buckets.
    pub fn clear(&self) {
        self.state.write().buckets.clear();
    }
}

impl AccessControl for Limiter {
    fn access(&self, id: &str) -> Result<bool> {
        Limiter::access(self, id)
    }
}
