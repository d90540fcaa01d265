//! Reply rate limiting.
//!
//! Token bucket in front of outgoing chat messages. A denied reply is dropped
//! by the caller; nothing here blocks or queues.

use parking_lot::Mutex;
use std::time::{Duration, Instant};

/// Configuration for reply rate limiting.
#[derive(Debug, Clone, Copy)]
pub struct ReplyLimitConfig {
    /// Time to earn back one token.
    pub refill_interval: Duration,
    /// Bucket capacity: replies that may go out back to back.
    pub burst: u32,
}

impl Default for ReplyLimitConfig {
    fn default() -> Self {
        Self {
            refill_interval: Duration::from_secs(2),
            burst: 1,
        }
    }
}

pub struct ReplyLimiter {
    config: ReplyLimitConfig,
    /// When the bucket is full again. A token is available at `now` iff
    /// `now + (burst - 1) * interval` has reached it.
    full_at: Mutex<Instant>,
}

impl ReplyLimiter {
    pub fn new(config: ReplyLimitConfig) -> Self {
        Self::new_at(config, Instant::now())
    }

    /// A limiter whose bucket starts full at `now`.
    pub fn new_at(config: ReplyLimitConfig, now: Instant) -> Self {
        Self {
            config,
            full_at: Mutex::new(now),
        }
    }

    pub fn allow(&self) -> bool {
        self.allow_at(Instant::now())
    }

    /// Takes a token if one is available at `now`.
    pub fn allow_at(&self, now: Instant) -> bool {
        let interval = self.config.refill_interval;
        let tolerance = interval * self.config.burst.max(1).saturating_sub(1);
        let mut full_at = self.full_at.lock();

        if now + tolerance < *full_at {
            return false;
        }
        *full_at = (*full_at).max(now) + interval;
        true
    }
}
