//! Minimum spacing between consecutive dispatches

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Hands out dispatch slots at least `interval` apart.
///
/// Each caller reserves the next free slot under the lock and sleeps outside it, so
/// waiting callers queue in reservation order without blocking one another.
#[derive(Debug)]
pub struct DispatchPacer {
    interval: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl DispatchPacer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_slot: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Wait until this caller's slot arrives
    pub async fn wait(&self) {
        if self.interval.is_zero() {
            return;
        }

        let slot = {
            let mut next = self.next_slot.lock().await;
            let now = Instant::now();
            let slot = match *next {
                Some(reserved) if reserved > now => reserved,
                _ => now,
            };
            *next = Some(slot + self.interval);
            slot
        };

        tokio::time::sleep_until(slot).await;
    }
}
