// SPDX-License-Identifier: GPL-3.0-or-later

use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{sleep_until, Duration, Instant};
use tracing::trace;

/// Spaces out catalog requests so a full sync stays below the host's anonymous quota.
///
/// Callers queue on the next free slot, so concurrent requests still leave one interval apart.
/// A host that answers with `Retry-After` can push the slot further out with [`RateLimiter::defer`].
#[derive(Debug, Clone)]
pub struct RateLimiter {
    interval: Duration,
    next_slot: Arc<Mutex<Instant>>,
}

impl RateLimiter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_slot: Arc::new(Mutex::new(Instant::now())),
        }
    }

    /// Wait for the next free slot and claim it.
    pub async fn acquire(&self) {
        let mut next_slot = self.next_slot.lock().await;
        let now = Instant::now();
        if *next_slot > now {
            trace!(target: "trash", wait = ?(*next_slot - now), "waiting for a catalog request slot");
            sleep_until(*next_slot).await;
        }
        *next_slot = Instant::now() + self.interval;
    }

    /// Hold every further request back for at least `delay`.
    pub async fn defer(&self, delay: Duration) {
        let mut next_slot = self.next_slot.lock().await;
        let resume = Instant::now() + delay;
        if resume > *next_slot {
            trace!(target: "trash", ?delay, "catalog host asked to back off");
            *next_slot = resume;
        }
    }
}
