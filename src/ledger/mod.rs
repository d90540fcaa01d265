//! Ledger boundary
//!
//! The external, row-oriented donation ledger (a spreadsheet). Cells arrive
//! loosely typed and are decoded into [`CellValue`] here, before anything
//! downstream looks at them.

pub mod memory;
pub mod sheets;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::CentsValue;

pub use memory::MemoryLedger;
pub use sheets::SheetsLedger;

/// Developer metadata key marking the column of bid war option keys.
pub const METADATA_BID_WAR_NAMES: &str = "bidWarNames";
/// Developer metadata key marking the column of bid war totals.
pub const METADATA_BID_WAR_TOTALS: &str = "bidWarTotals";

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("ledger returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("unexpected ledger response: {0}")]
    Decode(String),
}

/// A single decoded spreadsheet cell.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum CellValue {
    Number(f64),
    Text(String),
    #[default]
    Empty,
}

impl CellValue {
    pub fn text(s: impl Into<String>) -> Self {
        let s = s.into();
        if s.is_empty() {
            CellValue::Empty
        } else {
            CellValue::Text(s)
        }
    }

    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => CellValue::Empty,
            serde_json::Value::String(s) => CellValue::text(s.as_str()),
            serde_json::Value::Number(n) => n.as_f64().map_or(CellValue::Empty, CellValue::Number),
            serde_json::Value::Bool(b) => CellValue::Text(if *b { "TRUE" } else { "FALSE" }.into()),
            other => CellValue::Text(other.to_string()),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            CellValue::Text(s) => Some(s),
            CellValue::Empty => Some(""),
            CellValue::Number(_) => None,
        }
    }

    /// Decodes a monetary cell into cents. `None` for non-numeric text.
    pub fn to_cents(&self) -> Option<CentsValue> {
        match self {
            CellValue::Number(n) => Some(CentsValue((n * 100.0).round() as i64)),
            CellValue::Text(s) => parse_cents(s),
            CellValue::Empty => None,
        }
    }
}

impl<'de> Deserialize<'de> for CellValue {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(|v| CellValue::from_json(&v))
    }
}

/// Parses a decimal amount of points into cents, rounding half-up at the
/// third fractional digit. Exponent forms fall back to float rounding.
pub fn parse_cents(raw: &str) -> Option<CentsValue> {
    let s = raw.trim();
    let (negative, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };
    let (int_part, frac_part) = digits.split_once('.').unwrap_or((digits, ""));
    let all_digits = |p: &str| p.bytes().all(|b| b.is_ascii_digit());
    let plain = !(int_part.is_empty() && frac_part.is_empty());
    if !plain || !all_digits(int_part) || !all_digits(frac_part) {
        let f: f64 = s.parse().ok()?;
        return f.is_finite().then(|| CentsValue((f * 100.0).round() as i64));
    }

    let whole: i64 = if int_part.is_empty() { 0 } else { int_part.parse().ok()? };
    let frac = frac_part.as_bytes();
    let digit = |i: usize| frac.get(i).map_or(0, |b| (b - b'0') as i64);
    let mut cents = whole.checked_mul(100)?.checked_add(digit(0) * 10 + digit(1))?;
    if digit(2) >= 5 {
        cents = cents.checked_add(1)?;
    }
    Some(CentsValue(if negative { -cents } else { cents }))
}

/// A view over one ledger row: contributor, description, amount, choice, reason.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LedgerRow(pub Vec<CellValue>);

impl LedgerRow {
    pub const CONTRIBUTOR: usize = 0;
    pub const DESCRIPTION: usize = 1;
    pub const AMOUNT: usize = 2;
    pub const CHOICE: usize = 3;
    pub const REASON: usize = 4;

    fn column(&self, n: usize) -> &str {
        self.0.get(n).and_then(CellValue::as_text).unwrap_or("")
    }

    pub fn contributor(&self) -> &str {
        self.column(Self::CONTRIBUTOR)
    }

    pub fn choice(&self) -> &str {
        self.column(Self::CHOICE)
    }

    pub fn reason(&self) -> &str {
        self.column(Self::REASON)
    }

    /// Amount in cents; unreadable amounts count as zero.
    pub fn cents(&self) -> CentsValue {
        self.0
            .get(Self::AMOUNT)
            .and_then(CellValue::to_cents)
            .unwrap_or_default()
    }
}

/// The whole donation table as read from the ledger, header row included.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValueRange {
    pub range: String,
    pub major_dimension: String,
    pub rows: Vec<LedgerRow>,
}

/// A sparse write against a [`ValueRange`]. An empty row delta leaves the
/// row alone; a `None` cell is never overwritten.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetPatch {
    pub range: String,
    pub major_dimension: String,
    #[serde(rename = "values")]
    pub rows: Vec<Vec<Option<String>>>,
}

impl SheetPatch {
    /// Indexes of rows this patch actually touches.
    pub fn touched_rows(&self) -> impl Iterator<Item = usize> + '_ {
        self.rows
            .iter()
            .enumerate()
            .filter(|(_, r)| !r.is_empty())
            .map(|(i, _)| i)
    }
}

/// Parallel columns from the ledger's pre-computed summary view.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregateColumns {
    pub names: Vec<CellValue>,
    pub totals: Vec<CellValue>,
}

/// A new donation row to append to the ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct DonationRecord {
    pub contributor: String,
    pub description: String,
    pub value: CentsValue,
    pub choice: String,
    pub reason: String,
}

#[async_trait]
pub trait Ledger: Send + Sync {
    /// The full donation table, including its header row.
    async fn read_rows(&self) -> Result<ValueRange, LedgerError>;

    /// Applies a sparse patch; returns the number of rows updated.
    async fn write_rows(&self, patch: &SheetPatch) -> Result<usize, LedgerError>;

    /// Option keys and their totals from the summary view.
    async fn read_aggregates(&self) -> Result<AggregateColumns, LedgerError>;

    async fn append_row(&self, record: &DonationRecord) -> Result<(), LedgerError>;
}
