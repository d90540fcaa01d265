//! Bid war bot library
//!
//! Attributes donations and subscriptions from a live chat audience to bid war
//! options, tallies them in an external spreadsheet ledger, and reports the
//! standings back to chat.

pub mod bidwar;
pub mod chat;
pub mod config;
pub mod dispatch;
pub mod ledger;
pub mod models;
pub mod sources;
pub mod state;

pub use bidwar::{Catalog, Choice, ChoiceSource, Tallier, TallyError, Totals};
pub use config::BotConfig;
pub use dispatch::Dispatcher;
pub use models::{CentsValue, DonationEvent, EventKind, SubTier};
