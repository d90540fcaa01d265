//! Bid war attribution and tally engine.
//!
//! - `catalog`: contests, options and their aliases
//! - `matcher`: free text to option resolution
//! - `tally`: ledger-backed attribution and totals
//! - `totals`: rank buckets and chat summaries

pub mod catalog;
pub mod matcher;
pub mod tally;
pub mod totals;

pub use catalog::{Alias, BidOption, Catalog, CatalogError, Contest, SummaryStyle};
pub use matcher::{Choice, ChoiceSource};
pub use tally::{Tallier, TallyError, UpdateStats};
pub use totals::{OptionRank, Total, Totals};
