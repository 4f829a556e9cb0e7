//! Per-client request limiting and telemetry de-duplication.
//!
//! Both structures are in-process only and reset on restart. Each instance owns
//! its own map behind its own lock; the lock is held only for a single
//! check-and-update and never across an `.await`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::error::AppError;

/// Windows are swept once the table grows past this many clients.
const LIMITER_SWEEP_THRESHOLD: usize = 10_000;

/// Deduper evicts old entries once it holds more than this many keys.
const DEDUP_EVICT_THRESHOLD: usize = 5_000;

/// Window within which a repeated telemetry event is suppressed.
pub const DEDUP_WINDOW: Duration = Duration::from_secs(2 * 60);

/// Entries older than this are dropped during eviction.
const DEDUP_RETENTION: Duration = Duration::from_secs(10 * 60);

/// Decides whether a client may perform one more request.
pub trait RateLimiter: Send + Sync {
    /// Consume one unit of `key`'s budget of `limit` per `window`.
    ///
    /// Returns `false` (without consuming) when the budget is exhausted.
    fn allow(&self, key: &str, limit: u32, window: Duration) -> bool;
}

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    resets_at: Instant,
}

/// Fixed-window counter per client key.
#[derive(Debug, Default)]
pub struct FixedWindowLimiter {
    windows: Mutex<HashMap<String, Window>>,
}

impl FixedWindowLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// [`RateLimiter::allow`] against an explicit clock reading.
    pub fn allow_at(&self, key: &str, limit: u32, window: Duration, now: Instant) -> bool {
        let mut windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);

        if windows.len() > LIMITER_SWEEP_THRESHOLD {
            windows.retain(|_, w| w.resets_at > now);
        }

        let entry = windows.entry(key.to_string()).or_insert(Window {
            count: 0,
            resets_at: now + window,
        });

        if now >= entry.resets_at {
            *entry = Window {
                count: 0,
                resets_at: now + window,
            };
        }

        if entry.count >= limit {
            return false;
        }

        entry.count += 1;
        true
    }
}

impl RateLimiter for FixedWindowLimiter {
    fn allow(&self, key: &str, limit: u32, window: Duration) -> bool {
        self.allow_at(key, limit, window, Instant::now())
    }
}

/// A limiter bound to its budget, as used by one group of endpoints.
#[derive(Clone)]
pub struct RateLimitPolicy {
    name: &'static str,
    limiter: Arc<dyn RateLimiter>,
    limit: u32,
    window: Duration,
}

impl RateLimitPolicy {
    pub fn new(
        name: &'static str,
        limiter: Arc<dyn RateLimiter>,
        limit: u32,
        window: Duration,
    ) -> Self {
        Self {
            name,
            limiter,
            limit,
            window,
        }
    }

    /// `limit` requests per minute with a fresh in-process table.
    pub fn per_minute(name: &'static str, limit: u32) -> Self {
        Self::new(
            name,
            Arc::new(FixedWindowLimiter::new()),
            limit,
            Duration::from_secs(60),
        )
    }

    /// # Errors
    ///
    /// `AppError::RateLimited` when the client's budget is exhausted.
    pub fn check(&self, client_id: &str) -> Result<(), AppError> {
        if self.limiter.allow(client_id, self.limit, self.window) {
            Ok(())
        } else {
            tracing::warn!(limiter = self.name, client_id, "rate limit exceeded");
            Err(AppError::RateLimited)
        }
    }
}

/// Suppresses repeats of the same event key within [`DEDUP_WINDOW`].
#[derive(Debug, Default)]
pub struct EventDeduper {
    seen: Mutex<HashMap<String, Instant>>,
}

impl EventDeduper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `key` at `now`. Returns `true` when it is a repeat to suppress.
    pub fn is_duplicate_at(&self, key: &str, now: Instant) -> bool {
        let mut seen = self.seen.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(last) = seen.get(key) {
            if now.duration_since(*last) < DEDUP_WINDOW {
                return true;
            }
        }

        seen.insert(key.to_string(), now);

        if seen.len() > DEDUP_EVICT_THRESHOLD {
            seen.retain(|_, last| now.duration_since(*last) <= DEDUP_RETENTION);
        }

        false
    }

    pub fn is_duplicate(&self, key: &str) -> bool {
        self.is_duplicate_at(key, Instant::now())
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.seen.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}
