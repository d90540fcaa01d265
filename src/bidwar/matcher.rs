//! Alias Matcher
//!
//! Resolves free text to a bid war option: the earliest alias mention wins,
//! and a "random" directive picks uniformly among open options when nothing
//! was named explicitly.

use lazy_static::lazy_static;
use rand::Rng;
use regex::Regex;

use super::catalog::{BidOption, Catalog};

lazy_static! {
    static ref RANDOM_DIRECTIVE: Regex = Regex::new("(?i)random").unwrap();
}

/// Where the text we matched against came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChoiceSource {
    /// A chat message with money attached (bits).
    ChatMessage,
    /// A message attached to an external tip.
    DonationMessage,
    /// The chat message in a sub or resub notice.
    SubMessage,
    /// An explicit bid command.
    BidCommand,
}

impl ChoiceSource {
    fn tag(self) -> &'static str {
        match self {
            ChoiceSource::ChatMessage => "[chat]",
            ChoiceSource::DonationMessage => "[donation msg]",
            ChoiceSource::SubMessage => "[sub msg]",
            ChoiceSource::BidCommand => "[bid cmd]",
        }
    }

    /// Provenance string recorded next to an attribution.
    pub fn reason(self, message: &str) -> String {
        if message.is_empty() {
            return String::new();
        }
        format!("{} {}", self.tag(), message)
    }
}

/// The option a donor picked, and why we think so. A zero option means the
/// choice is unresolved; `reason` may still be set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Choice {
    pub option: BidOption,
    pub reason: String,
}

impl Choice {
    pub fn is_resolved(&self) -> bool {
        !self.option.is_zero()
    }
}

impl Catalog {
    pub fn resolve(&self, message: &str, source: ChoiceSource) -> Choice {
        self.resolve_with_rng(message, source, &mut rand::thread_rng())
    }

    /// Finds the option whose alias occurs leftmost in `message`. Equal
    /// offsets keep the first match in catalog order.
    pub fn resolve_with_rng<R: Rng>(
        &self,
        message: &str,
        source: ChoiceSource,
        rng: &mut R,
    ) -> Choice {
        if self.require_explicit_bid && source != ChoiceSource::BidCommand {
            return Choice::default();
        }

        let open = self.all_open_options();
        let mut best: Option<(usize, &BidOption)> = None;
        for option in open.iter().copied() {
            for alias in &option.aliases {
                if let Some(idx) = alias.find_in(message) {
                    if best.map_or(true, |(min, _)| idx < min) {
                        best = Some((idx, option));
                    }
                }
            }
        }

        let option = match best {
            Some((_, option)) => option.clone(),
            None if !open.is_empty() && RANDOM_DIRECTIVE.is_match(message) => {
                open[rng.gen_range(0..open.len())].clone()
            }
            None => BidOption::default(),
        };

        Choice {
            option,
            reason: source.reason(message),
        }
    }
}
