use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Sub};

/// A monetary value in minor currency units (US cents). One point is one dollar.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CentsValue(pub i64);

impl CentsValue {
    pub const ZERO: CentsValue = CentsValue(0);

    pub fn cents(self) -> i64 {
        self.0
    }

    /// Points are the unit shown to chat: one point per dollar.
    pub fn points(self) -> f64 {
        self.0 as f64 / 100.0
    }

    pub fn is_positive(self) -> bool {
        self.0 > 0
    }
}

impl fmt::Display for CentsValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
    }
}

impl Add for CentsValue {
    type Output = CentsValue;

    fn add(self, rhs: CentsValue) -> CentsValue {
        CentsValue(self.0 + rhs.0)
    }
}

impl AddAssign for CentsValue {
    fn add_assign(&mut self, rhs: CentsValue) {
        self.0 += rhs.0;
    }
}

impl Sub for CentsValue {
    type Output = CentsValue;

    fn sub(self, rhs: CentsValue) -> CentsValue {
        CentsValue(self.0 - rhs.0)
    }
}

impl std::iter::Sum for CentsValue {
    fn sum<I: Iterator<Item = CentsValue>>(iter: I) -> Self {
        iter.fold(CentsValue::ZERO, |acc, v| acc + v)
    }
}

/// Subscription tier
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubTier {
    #[default]
    Unknown,
    Tier1,
    Tier2,
    Tier3,
    Prime,
}

impl SubTier {
    /// Monthly value of one subscription at this tier.
    pub fn monthly_cents(self) -> i64 {
        match self {
            SubTier::Prime => 500,
            SubTier::Tier1 => 600,
            SubTier::Tier2 => 1200,
            SubTier::Tier3 => 2500,
            SubTier::Unknown => 0,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SubTier::Tier1 => "Tier 1",
            SubTier::Tier2 => "Tier 2",
            SubTier::Tier3 => "Tier 3",
            SubTier::Prime => "Prime",
            SubTier::Unknown => "unknown",
        }
    }

    /// Parses the chat protocol's sub plan tag (`Prime`, `1000`, `2000`, `3000`).
    pub fn from_plan(plan: &str) -> Self {
        match plan {
            "Prime" => SubTier::Prime,
            "1000" => SubTier::Tier1,
            "2000" => SubTier::Tier2,
            "3000" => SubTier::Tier3,
            _ => SubTier::Unknown,
        }
    }
}

/// What kind of support an event carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A new subscription or a resub.
    Subscription,
    /// One gifted subscription for one recipient.
    GiftSubscription,
    /// A mass gift announcing N subscriptions at once.
    CommunityGift,
    Bits,
    /// A tip from an external donation platform.
    Tip,
}

impl EventKind {
    pub fn as_str(&self) -> &str {
        match self {
            EventKind::Subscription => "subscription",
            EventKind::GiftSubscription => "gift_subscription",
            EventKind::CommunityGift => "community_gift",
            EventKind::Bits => "bits",
            EventKind::Tip => "tip",
        }
    }
}

/// A normalized donation or subscription event, as emitted by a chat
/// transport or a donation poller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DonationEvent {
    /// Chat username of the user who gets credit for this donation.
    pub donor: String,
    pub channel: String,
    pub kind: EventKind,
    /// Equal to 1 for regular subs; more than 1 for mass gifts.
    pub sub_count: u32,
    pub sub_tier: SubTier,
    /// Months purchased at once (multi-month gifts). 1 for everything else.
    pub sub_months: u32,
    pub bits: u32,
    pub cash: CentsValue,
    pub message: String,
    pub received_at: DateTime<Utc>,
}

impl DonationEvent {
    fn base(donor: impl Into<String>, channel: impl Into<String>, kind: EventKind) -> Self {
        Self {
            donor: donor.into(),
            channel: channel.into(),
            kind,
            sub_count: 0,
            sub_tier: SubTier::Unknown,
            sub_months: 0,
            bits: 0,
            cash: CentsValue::ZERO,
            message: String::new(),
            received_at: Utc::now(),
        }
    }

    pub fn subscription(
        donor: impl Into<String>,
        channel: impl Into<String>,
        kind: EventKind,
        tier: SubTier,
        count: u32,
        months: u32,
    ) -> Self {
        Self {
            sub_count: count,
            sub_tier: tier,
            sub_months: months,
            ..Self::base(donor, channel, kind)
        }
    }

    pub fn bits(donor: impl Into<String>, channel: impl Into<String>, bits: u32) -> Self {
        Self {
            bits,
            ..Self::base(donor, channel, EventKind::Bits)
        }
    }

    pub fn tip(donor: impl Into<String>, channel: impl Into<String>, cash: CentsValue) -> Self {
        Self {
            cash,
            ..Self::base(donor, channel, EventKind::Tip)
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Value this event contributes to a bid war. One bit is one cent.
    pub fn value(&self) -> CentsValue {
        CentsValue(self.sub_value().cents() + self.bits as i64 + self.cash.cents())
    }

    pub fn sub_value(&self) -> CentsValue {
        CentsValue(self.sub_tier.monthly_cents() * self.sub_months as i64 * self.sub_count as i64)
    }

    /// Human-readable description, e.g. `"3x Tier 2 gift sub"` or `"$5.00 donation"`.
    pub fn description(&self) -> String {
        let mut parts = Vec::new();
        if self.cash.is_positive() {
            parts.push(format!("${} donation", self.cash));
        }
        if self.bits > 0 {
            parts.push(format!("{} bits", self.bits));
        }
        if self.sub_count > 0 {
            let mut sub_parts = Vec::new();
            if self.sub_count > 1 {
                sub_parts.push(format!("{}x", self.sub_count));
            }
            if self.sub_tier != SubTier::Tier1 {
                sub_parts.push(self.sub_tier.label().to_string());
            }
            match self.kind {
                EventKind::Subscription => sub_parts.push("sub".to_string()),
                EventKind::GiftSubscription | EventKind::CommunityGift => {
                    sub_parts.push("gift sub".to_string())
                }
                _ => {}
            }
            parts.push(sub_parts.join(" "));
        }
        parts.join(" + ")
    }
}
