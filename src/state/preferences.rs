//! Pending bid preferences.
//!
//! When a donor bids before any of their money has reached the ledger, we hold
//! on to the choice for a few minutes so the late donation can still be
//! attributed. Entries are consumed on first read and never persisted.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::bidwar::Choice;

struct PendingPreference {
    choice: Choice,
    expires_at: Instant,
}

pub struct PreferenceCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, PendingPreference>>,
}

impl PreferenceCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Stores `choice` for `donor`, replacing anything remembered before.
    pub fn remember(&self, donor: &str, choice: Choice) {
        self.remember_at(donor, choice, Instant::now());
    }

    pub fn remember_at(&self, donor: &str, choice: Choice, now: Instant) {
        let entry = PendingPreference {
            choice,
            expires_at: now + self.ttl,
        };
        self.entries.lock().insert(donor.to_lowercase(), entry);
    }

    /// Removes and returns the donor's preference if it has not expired.
    /// Expired entries are removed as well.
    pub fn consume(&self, donor: &str) -> Option<Choice> {
        self.consume_at(donor, Instant::now())
    }

    pub fn consume_at(&self, donor: &str, now: Instant) -> Option<Choice> {
        let entry = self.entries.lock().remove(&donor.to_lowercase())?;
        (now < entry.expires_at).then_some(entry.choice)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
