//! Rank & Summary Formatter
//!
//! Turns per-option totals into tie-aware rank buckets and renders the chat
//! summary for a contest's summary style. Pure: no I/O, no clock.

use crate::models::CentsValue;

use super::catalog::{BidOption, SummaryStyle};

const SHAME_EMOTE: &str = "usedShame";
const FIRST_PLACE_EMOTE: &str = "usedU";

/// Money contributed towards one option.
#[derive(Debug, Clone, PartialEq)]
pub struct Total {
    pub option: BidOption,
    pub value: CentsValue,
}

/// One rank bucket: every option in it has the same value.
#[derive(Debug, Clone, PartialEq)]
pub struct OptionRank {
    /// 1-based; one more than the number of options strictly ahead.
    pub rank: usize,
    pub options: Vec<BidOption>,
    pub value: CentsValue,
}

impl OptionRank {
    fn names(&self) -> String {
        self.options
            .iter()
            .map(|o| o.display_name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn contains(&self, option: &BidOption) -> bool {
        self.options.iter().any(|o| o.short_code == option.short_code)
    }
}

/// Totals for one contest, bound to how that contest is summarized.
#[derive(Debug, Clone, Default)]
pub struct Totals {
    totals: Vec<Total>,
    style: SummaryStyle,
    number_of_winners: usize,
}

impl Totals {
    pub fn new(totals: Vec<Total>, style: SummaryStyle, number_of_winners: usize) -> Self {
        Self {
            totals,
            style,
            number_of_winners,
        }
    }

    pub fn totals(&self) -> &[Total] {
        &self.totals
    }

    /// Human-readable summary. Mentions `subject` (the option the triggering
    /// event just touched) where the style allows; pass the zero option for
    /// a plain summary.
    pub fn describe(&self, subject: &BidOption) -> String {
        match self.style {
            SummaryStyle::All => self.describe_all(),
            SummaryStyle::LastPlace => self.describe_last_place(subject),
            SummaryStyle::FirstPlace => self.describe_first_place(subject),
            SummaryStyle::Winners if self.number_of_winners == 1 => {
                self.describe_first_place(subject)
            }
            SummaryStyle::Winners => self.describe_winners(subject),
        }
    }

    fn open_totals(&self) -> impl Iterator<Item = &Total> {
        self.totals.iter().filter(|t| !t.option.closed)
    }

    fn describe_all(&self) -> String {
        let max = self.open_totals().map(|t| t.value).max().unwrap_or_default();
        self.open_totals()
            .map(|t| {
                let mut s = format!("{}: {}", t.option.display_name, t.value);
                if t.value < max {
                    s.push_str(&format!(" (down by {})", max - t.value));
                }
                s
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Open options grouped by value, highest first. Sorting is stable, so
    /// tied options keep their stored order.
    pub fn compute_ranks(&self) -> Vec<OptionRank> {
        let mut open: Vec<&Total> = self.open_totals().collect();
        open.sort_by(|a, b| b.value.cmp(&a.value));

        let mut ranks: Vec<OptionRank> = Vec::new();
        for (idx, total) in open.into_iter().enumerate() {
            match ranks.last_mut() {
                Some(last) if last.value == total.value => last.options.push(total.option.clone()),
                _ => ranks.push(OptionRank {
                    rank: idx + 1,
                    options: vec![total.option.clone()],
                    value: total.value,
                }),
            }
        }
        ranks
    }

    /// The empty and single-option cases shared by the ranked styles.
    fn short_circuit(ranks: &[OptionRank]) -> Option<String> {
        match ranks {
            [] => Some(String::new()),
            [only] if only.options.len() == 1 => {
                Some(format!("{}: {}", only.options[0].display_name, only.value))
            }
            _ => None,
        }
    }

    fn subject_rank<'a>(ranks: &'a [OptionRank], subject: &BidOption) -> Option<&'a OptionRank> {
        if subject.is_zero() {
            return None;
        }
        ranks.iter().find(|r| r.contains(subject))
    }

    fn describe_last_place(&self, subject: &BidOption) -> String {
        let ranks = self.compute_ranks();
        if let Some(s) = Self::short_circuit(&ranks) {
            return s;
        }

        let last = &ranks[ranks.len() - 1];
        let diff = if ranks.len() > 1 {
            ranks[ranks.len() - 2].value - last.value
        } else {
            CentsValue::ZERO
        };
        let heading = if last.options.len() > 1 {
            "Tie for last place"
        } else {
            "Last place"
        };
        let desc = format!("{}: {} (down by {})", heading, last.names(), diff);

        let Some(subject_rank) = Self::subject_rank(&ranks, subject) else {
            return desc;
        };
        if subject_rank.rank == last.rank {
            if last.options.len() == 1 {
                return format!(
                    "{} is still in last place (down by {}) {}",
                    subject.display_name, diff, SHAME_EMOTE
                );
            }
            return desc;
        }
        format!(
            "{} is currently #{}. {}",
            subject.display_name, subject_rank.rank, desc
        )
    }

    fn describe_first_place(&self, subject: &BidOption) -> String {
        let ranks = self.compute_ranks();
        if let Some(s) = Self::short_circuit(&ranks) {
            return s;
        }

        let first = &ranks[0];
        let diff = match ranks.get(1) {
            Some(second) => first.value - second.value,
            None => CentsValue::ZERO,
        };
        let heading = if first.options.len() > 1 {
            "Tie for first place"
        } else {
            "First place"
        };
        let desc = format!("{}: {} (up by {})", heading, first.names(), diff);

        let Some(subject_rank) = Self::subject_rank(&ranks, subject) else {
            return desc;
        };
        if subject_rank.rank == first.rank {
            if first.options.len() == 1 {
                return format!(
                    "{} is in first place (up by {}) {}",
                    subject.display_name, diff, FIRST_PLACE_EMOTE
                );
            }
            return desc;
        }
        format!(
            "{} is currently #{}. {}",
            subject.display_name, subject_rank.rank, desc
        )
    }

    fn describe_winners(&self, subject: &BidOption) -> String {
        let ranks = self.compute_ranks();
        if let Some(s) = Self::short_circuit(&ranks) {
            return s;
        }

        // Whole buckets only: a tie straddling the cutoff is listed in full.
        let mut leaders: Vec<&str> = Vec::new();
        for rank in &ranks {
            leaders.extend(rank.options.iter().map(|o| o.display_name.as_str()));
            if leaders.len() >= self.number_of_winners {
                break;
            }
        }

        let desc = format!(
            "Current top {}: {}",
            self.number_of_winners,
            leaders.join(", ")
        );
        match Self::subject_rank(&ranks, subject) {
            Some(r) => format!("{} is currently #{}. {}", subject.display_name, r.rank, desc),
            None => desc,
        }
    }
}
