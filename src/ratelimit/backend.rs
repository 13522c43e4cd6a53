//! Admission control trait for abstracting the limiter from its callers.

use crate::error::Result;

/// Trait for admission control policies.
///
/// The download gate is written against this trait so it can be driven by the
/// in-memory [`Limiter`](super::Limiter) or by any other policy.
pub trait AccessControl: Send + Sync {
    /// Decide whether `id` may proceed. `Ok(false)` means throttled.
    fn access(&self, id: &str) -> Result<bool>;
}
