//! Aggregate rate limiting shared by every producer worker.
//!
//! The limiter spaces permits evenly at `1 / rate` seconds, across all
//! callers combined. There is no burst allowance: the first `take` returns at
//! once and each following one waits for its slot, so `M` takes span at least
//! `(M - 1) / rate` seconds.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};

use crate::error::{Error, Result};

/// A blocking token limiter safe to share between tasks.
#[derive(Debug)]
pub struct RateLimiter {
    interval: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// Create a limiter allowing at most `per_second` operations per second.
    ///
    /// A zero, negative or non-finite rate is rejected here rather than at
    /// call time.
    pub fn new(per_second: f64) -> Result<Self> {
        Ok(Self {
            interval: interval_for(per_second)?,
            next_slot: Mutex::new(None),
        })
    }

    /// The spacing enforced between two permits
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Wait until a permit is available.
    ///
    /// The slot is claimed before sleeping, so dropping this future (e.g. on
    /// cancellation) forfeits the slot instead of handing it to the next
    /// caller early.
    pub async fn take(&self) {
        let slot = {
            let mut next_slot = self.next_slot.lock().await;
            let now = Instant::now();
            let slot = match *next_slot {
                Some(at) if at > now => at,
                _ => now,
            };
            // saturates at the far end of the clock instead of overflowing
            *next_slot = Some(slot.checked_add(self.interval).unwrap_or(slot));
            slot
        };

        if slot > Instant::now() {
            sleep_until(slot).await;
        }
    }
}

/// The spacing between permits for `per_second`, or a configuration error
/// when the rate is not positive or its interval cannot be scheduled.
pub(crate) fn interval_for(per_second: f64) -> Result<Duration> {
    if !per_second.is_finite() || per_second <= 0.0 {
        return Err(Error::configuration(format!(
            "rate limit must be a positive number of operations per second, got {}",
            per_second
        )));
    }

    let interval = Duration::try_from_secs_f64(1.0 / per_second)
        .ok()
        .filter(|interval| {
            let now = Instant::now();
            now.checked_add(*interval)
                .and_then(|slot| slot.checked_add(*interval))
                .is_some()
        })
        .ok_or_else(|| {
            Error::configuration(format!("rate limit {} is too small to schedule", per_second))
        })?;

    Ok(interval)
}
