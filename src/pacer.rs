//! Global pacing of outbound range lookups.
//!
//! The remote service expects clients to stay under roughly one request per
//! second. The pacer serializes every caller through a shared schedule: each
//! `schedule` call reserves the next free slot synchronously, under the
//! lock, before the task yields to sleep. Reserving before yielding is what
//! keeps two suspended callers from both claiming the same slot.

use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

/// Maximum retries per range lookup after a throttling response.
pub const MAX_RETRIES: u32 = 3;

/// Base delay for exponential backoff (doubles each retry).
pub const RETRY_BASE_DELAY_MS: u64 = 100;

pub struct Pacer {
    min_interval: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl Pacer {
    pub fn new(min_interval: Duration) -> Self {
        Self { min_interval, next_slot: Mutex::new(None) }
    }

    /// Waits until it is this caller's turn to issue a request.
    ///
    /// Slots are handed out first-come first-served, spaced at least
    /// `min_interval` apart across all callers.
    pub async fn schedule(&self) {
        let now = Instant::now();
        let slot = {
            let mut next = match self.next_slot.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            let slot = match *next {
                Some(at) if at > now => at,
                _ => now,
            };
            *next = Some(slot + self.min_interval);
            slot
        };

        if slot > now {
            debug!(wait_ms = (slot - now).as_millis() as u64, "pacing outbound lookup");
            tokio::time::sleep_until(slot).await;
        }
    }

    /// Backoff delay before retry `attempt` (0-based), doubling each time.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        Duration::from_millis(RETRY_BASE_DELAY_MS * (1 << attempt.min(10)))
    }
}
