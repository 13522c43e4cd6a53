//! Periodic removal of expired buckets.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::info;

use super::limiter::Limiter;

/// Spawn a task that calls [`Limiter::sweep_expired`] every `interval`.
///
/// The task runs until it is aborted or the runtime shuts down.
pub fn spawn_sweeper(limiter: Arc<Limiter>, interval: Duration) -> JoinHandle<()> {
    info!(interval_secs = interval.as_secs(), "Starting expired bucket sweeper");

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;
            limiter.sweep_expired();
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::ManualClock;

    #[tokio::test]
    async fn test_sweeper_removes_expired_buckets() {
        let clock = Arc::new(ManualClock::new(0));
        let limiter = Arc::new(Limiter::with_clock(8, 10, 1, clock.clone()).unwrap());
        limiter.access("a").unwrap();
        limiter.access("b").unwrap();

        let handle = spawn_sweeper(limiter.clone(), Duration::from_millis(10));
        clock.advance(10);

        for _ in 0..100 {
            if limiter.size() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        handle.abort();

        assert_eq!(limiter.size(), 0);
    }
}
