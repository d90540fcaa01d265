//! Mass-gift deduplication.
//!
//! A community gift arrives as one announcement followed by one notice per
//! recipient. The announcement carries the full value, so the per-recipient
//! notices that follow within the burst window are dropped.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

pub struct GiftBurstTracker {
    window: Duration,
    last_burst: Mutex<HashMap<String, Instant>>,
}

impl GiftBurstTracker {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_burst: Mutex::new(HashMap::new()),
        }
    }

    pub fn mark_burst(&self, donor: &str) {
        self.mark_burst_at(donor, Instant::now());
    }

    pub fn mark_burst_at(&self, donor: &str, now: Instant) {
        self.last_burst.lock().insert(donor.to_lowercase(), now);
    }

    /// True while `donor` is inside the window after their last mass gift.
    pub fn should_suppress(&self, donor: &str) -> bool {
        self.should_suppress_at(donor, Instant::now())
    }

    pub fn should_suppress_at(&self, donor: &str, now: Instant) -> bool {
        let mut markers = self.last_burst.lock();
        let key = donor.to_lowercase();
        match markers.get(&key) {
            Some(marked) if now.saturating_duration_since(*marked) < self.window => true,
            Some(_) => {
                markers.remove(&key);
                false
            }
            None => false,
        }
    }
}
