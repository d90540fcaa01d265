//! Integration tests for the dispatch pipeline
//!
//! Drives events and bid commands through the dispatcher against the
//! in-memory ledger, and checks both what lands in the ledger and what the
//! bot says in chat.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

use bidwar_bot::bidwar::{Catalog, Tallier};
use bidwar_bot::chat::{ChatReplier, ChatSink, ReplyLimitConfig, ReplyLimiter};
use bidwar_bot::dispatch::Dispatcher;
use bidwar_bot::ledger::MemoryLedger;
use bidwar_bot::models::{CentsValue, DonationEvent, EventKind, SubTier};
use bidwar_bot::state::{GiftBurstTracker, PreferenceCache};

const CATALOG_JSON: &str = r#"{
    "contests": [
        {
            "name": "Mario Kart track",
            "options": [
                {"displayName": "Moo Moo Meadows", "shortCode": "Moo", "aliases": ["moo", "moomoo"]},
                {"displayName": "Neo Bowser City", "shortCode": "NBC", "aliases": ["neo", "nbc"]}
            ]
        },
        {
            "name": "Featuring Dante From The Devil May Cry Series",
            "summaryStyle": "LAST_PLACE",
            "options": [
                {"displayName": "Devil May Cry", "shortCode": "DMC1", "aliases": ["dmc", "dmc1"]},
                {"displayName": "Devil May Cry 2", "shortCode": "DMC2", "aliases": ["dmc2"]},
                {"displayName": "Devil May Cry 3", "shortCode": "DMC3", "aliases": ["dmc3"]}
            ]
        }
    ]
}"#;

#[derive(Default)]
struct RecordingSink {
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingSink {
    fn messages(&self) -> Vec<String> {
        self.sent.lock().iter().map(|(_, m)| m.clone()).collect()
    }
}

#[async_trait]
impl ChatSink for RecordingSink {
    async fn say(&self, channel: &str, message: &str) -> anyhow::Result<()> {
        self.sent.lock().push((channel.to_string(), message.to_string()));
        Ok(())
    }
}

struct Harness {
    ledger: Arc<MemoryLedger>,
    sink: Arc<RecordingSink>,
    dispatcher: Arc<Dispatcher>,
}

fn harness() -> Harness {
    let catalog = Arc::new(Catalog::parse(CATALOG_JSON).unwrap());
    let ledger = Arc::new(MemoryLedger::new(["Moo", "NBC", "DMC1", "DMC2", "DMC3"]));
    let tallier = Arc::new(Tallier::new(ledger.clone(), catalog, Duration::from_secs(5)));

    let sink = Arc::new(RecordingSink::default());
    let limiter = ReplyLimiter::new(ReplyLimitConfig {
        refill_interval: Duration::from_millis(1),
        burst: 100,
    });
    let replier = ChatReplier::new(sink.clone(), limiter, true);

    let dispatcher = Arc::new(Dispatcher::new(
        tallier,
        PreferenceCache::new(Duration::from_secs(180)),
        GiftBurstTracker::new(Duration::from_secs(5)),
        replier,
        CentsValue(100),
    ));
    Harness {
        ledger,
        sink,
        dispatcher,
    }
}

#[tokio::test]
async fn test_bits_with_alias_are_attributed_and_announced() {
    let h = harness();
    let event = DonationEvent::bits("Mizalie", "chan", 444).with_message("moo moo usedU");

    let choice = h.dispatcher.process_event(event).await.unwrap().unwrap();
    assert_eq!(choice.option.short_code, "Moo");

    let rows = h.ledger.rows();
    let row = rows.last().unwrap();
    assert_eq!(row.contributor(), "Mizalie");
    assert_eq!(row.choice(), "Moo");
    assert_eq!(row.reason(), "[chat] moo moo usedU");
    assert_eq!(row.cents(), CentsValue(444));

    assert_eq!(
        h.sink.messages(),
        vec!["@Mizalie: I put your bits towards Moo Moo Meadows. Moo Moo Meadows: 4.44, Neo Bowser City: 0.00 (down by 4.44)"]
    );
}

#[tokio::test]
async fn test_small_donation_is_recorded_but_silent() {
    let h = harness();
    let event = DonationEvent::bits("50cent", "chan", 50).with_message("neo bowser city please");

    let choice = h.dispatcher.process_event(event).await.unwrap().unwrap();
    assert!(!choice.is_resolved());
    assert_eq!(h.ledger.rows().last().unwrap().choice(), "");
    assert!(h.sink.messages().is_empty());
}

#[tokio::test]
async fn test_gift_subs_after_mass_gift_are_dropped() {
    let h = harness();
    let burst = DonationEvent::subscription(
        "usedpizza",
        "chan",
        EventKind::CommunityGift,
        SubTier::Tier1,
        3,
        1,
    );
    assert!(h.dispatcher.process_event(burst).await.unwrap().is_some());

    for _ in 0..3 {
        let single = DonationEvent::subscription(
            "UsedPizza",
            "chan",
            EventKind::GiftSubscription,
            SubTier::Tier1,
            1,
            1,
        );
        assert!(h.dispatcher.process_event(single).await.unwrap().is_none());
    }

    let other = DonationEvent::subscription(
        "aerionblue",
        "chan",
        EventKind::GiftSubscription,
        SubTier::Tier2,
        1,
        6,
    )
    .with_message("dmc2");
    let choice = h.dispatcher.process_event(other).await.unwrap().unwrap();
    assert_eq!(choice.option.short_code, "DMC2");

    // header + one mass gift + one unrelated gift sub
    let rows = h.ledger.rows();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[1].cents(), CentsValue(1800));
    assert_eq!(rows[2].cents(), CentsValue(7200));
    assert_eq!(
        h.sink.messages(),
        vec!["@aerionblue: I put your sub towards Devil May Cry 2. Devil May Cry 2 is currently #1. Tie for last place: Devil May Cry, Devil May Cry 3 (down by 72.00)"]
    );
}

#[tokio::test]
async fn test_bid_command_assigns_earlier_rows() {
    let h = harness();
    let small = DonationEvent::bits("50cent", "chan", 50).with_message("twilight princess");
    h.dispatcher.process_event(small).await.unwrap();
    let small = DonationEvent::bits("50cent", "chan", 75);
    h.dispatcher.process_event(small).await.unwrap();

    h.dispatcher
        .handle_bid_command("chan", "50CENT", "!bid nbc")
        .await
        .unwrap();

    let rows = h.ledger.rows();
    assert_eq!(rows[1].choice(), "NBC");
    assert_eq!(rows[1].reason(), "[bid cmd] !bid nbc");
    assert_eq!(rows[2].choice(), "NBC");
    assert_eq!(
        h.sink.messages(),
        vec!["@50CENT: +1.25 for Neo Bowser City usedNice Neo Bowser City: 1.25, Moo Moo Meadows: 0.00 (down by 1.25)"]
    );
}

#[tokio::test]
async fn test_bid_without_points_is_remembered_for_next_donation() {
    let h = harness();
    h.dispatcher
        .handle_bid_command("chan", "NutDealer", "!bid dmc3")
        .await
        .unwrap();
    assert_eq!(h.dispatcher.preferences().len(), 1);

    let tip = DonationEvent::tip("nutdealer", "chan", CentsValue(500)).with_message("good luck!");
    let choice = h.dispatcher.process_event(tip).await.unwrap().unwrap();
    assert_eq!(choice.option.short_code, "DMC3");
    assert!(h.dispatcher.preferences().is_empty());

    let rows = h.ledger.rows();
    assert_eq!(rows.last().unwrap().choice(), "DMC3");
    assert_eq!(rows.last().unwrap().reason(), "[bid cmd] !bid dmc3");

    assert_eq!(
        h.sink.messages(),
        vec![
            "@NutDealer: You had no points used7 but I'll remember your choice for a few minutes. Tie for last place: Devil May Cry, Devil May Cry 2, Devil May Cry 3 (down by 0.00)",
            "$5.00 donation from nutdealer put towards Devil May Cry 3. Devil May Cry 3 is currently #1. Tie for last place: Devil May Cry, Devil May Cry 2 (down by 5.00)",
        ]
    );
}

#[tokio::test]
async fn test_unknown_bid_lists_options() {
    let h = harness();
    h.dispatcher
        .handle_bid_command("chan", "aerionblue", "!bid wind waker please")
        .await
        .unwrap();

    assert_eq!(
        h.sink.messages(),
        vec!["@aerionblue: These are the options: Moo, NBC, DMC1, DMC2, DMC3"]
    );
    assert!(h.dispatcher.preferences().is_empty());
}

#[tokio::test]
async fn test_ledger_outage_fails_quietly() {
    let h = harness();
    h.ledger.set_unavailable(true);

    let event = DonationEvent::bits("Mizalie", "chan", 444).with_message("moo");
    assert!(h.dispatcher.process_event(event).await.is_err());
    assert!(h.dispatcher.handle_bid_command("chan", "Mizalie", "!bid moo").await.is_err());
    assert!(h.sink.messages().is_empty());
}

#[tokio::test]
async fn test_spawned_dispatch_paths() {
    let h = harness();

    let handle = h
        .dispatcher
        .dispatch_event(DonationEvent::bits("TWRoxas", "chan", 250).with_message("neo"))
        .unwrap();
    handle.await.unwrap();
    assert_eq!(h.ledger.rows().last().unwrap().choice(), "NBC");

    assert!(h.dispatcher.dispatch_chat_message("chan", "TWRoxas", "neo is great").is_none());

    let handle = h
        .dispatcher
        .dispatch_chat_message("chan", "TWRoxas", "!BID moo")
        .unwrap();
    handle.await.unwrap();

    assert_eq!(h.sink.messages().len(), 2);
    assert_eq!(h.sink.sent.lock()[1].0, "chan");
    assert!(h.sink.messages()[1].starts_with("@TWRoxas: You had no points used7"));
}
