//! Donation sources that feed events into the dispatcher.

pub mod tipfile;

pub use tipfile::{parse_tip_line, TipFileError, TipFileWatcher, TipLine};
