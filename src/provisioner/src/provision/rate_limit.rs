//! Inter-arrival throttle for cloud API calls.

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Grants at most one token per configured interval. One instance is
/// shared across every cloud-call initiating step of a provisioner, so
/// tenant-wide quotas hold across concurrent cluster builds.
pub struct RateLimiter {
    interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(interval: Duration) -> Self {
        RateLimiter {
            interval,
            last: Mutex::new(None),
        }
    }

    /// Block until at least `interval` has passed since the previous
    /// grant. Holding the slot lock across the sleep is what serialises
    /// unbounded callers.
    pub async fn take(&self) {
        let mut last = self.last.lock().await;
        if let Some(previous) = *last {
            let next = previous + self.interval;
            if next > Instant::now() {
                tokio::time::sleep_until(next).await;
            }
        }
        *last = Some(Instant::now());
    }
}
