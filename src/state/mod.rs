//! Short-lived in-memory state shared by the dispatch paths.

pub mod gift_burst;
pub mod preferences;

pub use gift_burst::GiftBurstTracker;
pub use preferences::PreferenceCache;
