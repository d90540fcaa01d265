//! Event dispatch
//!
//! Glues the engine together for each inbound event: gift-burst filtering,
//! choice resolution (message first, then a pending `!bid` preference),
//! recording to the ledger, and the chat reply with the contest's standings.
//!
//! The synchronous half of every dispatch (filters and in-memory state) runs
//! on the caller; the ledger and chat I/O runs on a spawned task so a slow
//! ledger never stalls the event source.

use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::bidwar::{BidOption, Catalog, Choice, ChoiceSource, Tallier, TallyError};
use crate::chat::ChatReplier;
use crate::models::{CentsValue, DonationEvent, EventKind};
use crate::state::{GiftBurstTracker, PreferenceCache};

pub const BID_COMMAND: &str = "!bid";

/// True if `message` is a bid command. The prefix is case-insensitive.
pub fn is_bid_command(message: &str) -> bool {
    message
        .get(..BID_COMMAND.len())
        .map_or(false, |prefix| prefix.eq_ignore_ascii_case(BID_COMMAND))
}

pub struct Dispatcher {
    tallier: Arc<Tallier>,
    preferences: PreferenceCache,
    gift_bursts: GiftBurstTracker,
    replier: ChatReplier,
    minimum_donation: CentsValue,
}

impl Dispatcher {
    pub fn new(
        tallier: Arc<Tallier>,
        preferences: PreferenceCache,
        gift_bursts: GiftBurstTracker,
        replier: ChatReplier,
        minimum_donation: CentsValue,
    ) -> Self {
        Self {
            tallier,
            preferences,
            gift_bursts,
            replier,
            minimum_donation,
        }
    }

    fn catalog(&self) -> &Catalog {
        self.tallier.catalog()
    }

    pub fn preferences(&self) -> &PreferenceCache {
        &self.preferences
    }

    /// Filters and resolves `event` on the caller, then records it and
    /// replies on a spawned task. `None` if the event was dropped.
    pub fn dispatch_event(self: &Arc<Self>, event: DonationEvent) -> Option<JoinHandle<()>> {
        let choice = self.prepare(&event)?;
        let this = Arc::clone(self);
        Some(tokio::spawn(async move {
            if let Err(e) = this.settle(&event, &choice).await {
                error!(donor = %event.donor, error = %e, "failed to record donation");
            }
        }))
    }

    /// Awaitable form of [`dispatch_event`](Self::dispatch_event). Returns the
    /// choice the event was recorded with, or `None` if it was dropped.
    pub async fn process_event(&self, event: DonationEvent) -> Result<Option<Choice>, TallyError> {
        let Some(choice) = self.prepare(&event) else {
            return Ok(None);
        };
        self.settle(&event, &choice).await?;
        Ok(Some(choice))
    }

    /// Runs a chat message through the bid command handler if it is one.
    pub fn dispatch_chat_message(
        self: &Arc<Self>,
        channel: &str,
        donor: &str,
        message: &str,
    ) -> Option<JoinHandle<()>> {
        if !is_bid_command(message) {
            return None;
        }
        let this = Arc::clone(self);
        let (channel, donor, message) =
            (channel.to_string(), donor.to_string(), message.to_string());
        Some(tokio::spawn(async move {
            if let Err(e) = this.handle_bid_command(&channel, &donor, &message).await {
                error!(donor = %donor, error = %e, "failed to assign bid command");
            }
        }))
    }

    /// Assigns the donor's unassigned ledger rows to the option named in
    /// `message`. With nothing to assign, the choice is remembered for a
    /// later donation instead.
    pub async fn handle_bid_command(
        &self,
        channel: &str,
        donor: &str,
        message: &str,
    ) -> Result<(), TallyError> {
        let stats = self.tallier.assign(donor, message).await?;
        let option = &stats.choice.option;

        if !stats.choice.is_resolved() {
            let codes: Vec<&str> = self
                .catalog()
                .all_open_options()
                .into_iter()
                .map(|o| o.short_code.as_str())
                .collect();
            if !codes.is_empty() {
                self.replier
                    .say(
                        channel,
                        &format!("@{}: These are the options: {}", donor, codes.join(", ")),
                    )
                    .await;
            }
            return Ok(());
        }

        let prefix = if stats.total_value.is_positive() {
            format!("@{}: +{} for {} usedNice", donor, stats.total_value, option.display_name)
        } else {
            self.preferences.remember(donor, stats.choice.clone());
            debug!(donor, option = %option.short_code, "remembered bid preference");
            format!(
                "@{}: You had no points used7 but I'll remember your choice for a few minutes.",
                donor
            )
        };
        self.say_with_totals(channel, option, &prefix).await
    }

    /// Synchronous half: burst bookkeeping, suppression and resolution.
    fn prepare(&self, event: &DonationEvent) -> Option<Choice> {
        match event.kind {
            EventKind::CommunityGift => self.gift_bursts.mark_burst(&event.donor),
            EventKind::GiftSubscription if self.gift_bursts.should_suppress(&event.donor) => {
                debug!(donor = %event.donor, "ignoring gift sub inside a mass gift burst");
                return None;
            }
            _ => {}
        }

        info!(
            donor = %event.donor,
            value = %event.value(),
            kind = event.kind.as_str(),
            "new {}",
            event.description()
        );
        Some(self.choice_for(event))
    }

    fn choice_for(&self, event: &DonationEvent) -> Choice {
        if event.value() < self.minimum_donation {
            return Choice::default();
        }
        let source = match event.kind {
            EventKind::Bits => ChoiceSource::ChatMessage,
            EventKind::Tip => ChoiceSource::DonationMessage,
            _ => ChoiceSource::SubMessage,
        };
        let choice = self.catalog().resolve(&event.message, source);
        if choice.is_resolved() {
            return choice;
        }
        self.preferences.consume(&event.donor).unwrap_or_default()
    }

    /// I/O half: append to the ledger, then reply if the event was attributed.
    async fn settle(&self, event: &DonationEvent, choice: &Choice) -> Result<(), TallyError> {
        self.tallier.record(event, choice).await?;
        if !choice.is_resolved() {
            return Ok(());
        }

        let name = &choice.option.display_name;
        let prefix = match event.kind {
            EventKind::Tip => format!(
                "${} donation from {} put towards {}.",
                event.value(),
                event.donor,
                name
            ),
            EventKind::Bits => format!("@{}: I put your bits towards {}.", event.donor, name),
            _ => format!("@{}: I put your sub towards {}.", event.donor, name),
        };
        self.say_with_totals(&event.channel, &choice.option, &prefix).await
    }

    async fn say_with_totals(
        &self,
        channel: &str,
        option: &BidOption,
        prefix: &str,
    ) -> Result<(), TallyError> {
        let Some(contest) = self.catalog().find_contest(option) else {
            warn!(option = %option.short_code, "no open bid war for option");
            return Ok(());
        };
        let totals = self.tallier.totals_for_contest(contest).await?;
        let summary = totals.describe(option);
        let message = if prefix.is_empty() {
            summary
        } else {
            format!("{} {}", prefix, summary)
        };
        self.replier.say(channel, &message).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_bid_command() {
        assert!(is_bid_command("!bid moo"));
        assert!(is_bid_command("!BID moo"));
        assert!(is_bid_command("!Bid"));
        assert!(!is_bid_command("!bi"));
        assert!(!is_bid_command("hello !bid moo"));
        assert!(!is_bid_command("¡bid"));
    }
}
