//! In-process ledger. Mirrors the spreadsheet's behavior closely enough for
//! tests and dry runs: a header row, sparse patches, and a summary view that
//! sums assigned rows per option key.

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{
    AggregateColumns, CellValue, DonationRecord, Ledger, LedgerError, LedgerRow, SheetPatch,
    ValueRange,
};
use crate::models::CentsValue;

const TABLE_RANGE: &str = "'Bid war tracker'!A:E";

struct MemoryState {
    rows: Vec<LedgerRow>,
    option_keys: Vec<String>,
    aggregate_override: Option<AggregateColumns>,
    unavailable: bool,
    writes: usize,
}

pub struct MemoryLedger {
    state: Mutex<MemoryState>,
}

impl MemoryLedger {
    /// An empty table with the standard header row. `option_keys` fixes the
    /// order of the summary view.
    pub fn new<I, S>(option_keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let header = ["Contributor", "What", "Points", "Choice", "Message"]
            .into_iter()
            .map(CellValue::text)
            .collect();
        Self {
            state: Mutex::new(MemoryState {
                rows: vec![LedgerRow(header)],
                option_keys: option_keys.into_iter().map(Into::into).collect(),
                aggregate_override: None,
                unavailable: false,
                writes: 0,
            }),
        }
    }

    pub fn push_row(&self, row: LedgerRow) {
        self.state.lock().rows.push(row);
    }

    pub fn rows(&self) -> Vec<LedgerRow> {
        self.state.lock().rows.clone()
    }

    /// Number of successful `write_rows` calls so far.
    pub fn write_count(&self) -> usize {
        self.state.lock().writes
    }

    /// Serve these columns from `read_aggregates` instead of computing them.
    pub fn set_aggregates(&self, columns: AggregateColumns) {
        self.state.lock().aggregate_override = Some(columns);
    }

    /// Fail every call, as a ledger outage would.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.lock().unavailable = unavailable;
    }

    fn check_available(state: &MemoryState) -> Result<(), LedgerError> {
        if state.unavailable {
            return Err(LedgerError::Status {
                status: 503,
                body: "ledger unavailable".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn read_rows(&self) -> Result<ValueRange, LedgerError> {
        let state = self.state.lock();
        Self::check_available(&state)?;
        Ok(ValueRange {
            range: TABLE_RANGE.to_string(),
            major_dimension: "ROWS".to_string(),
            rows: state.rows.clone(),
        })
    }

    async fn write_rows(&self, patch: &SheetPatch) -> Result<usize, LedgerError> {
        let mut state = self.state.lock();
        Self::check_available(&state)?;
        if patch.rows.len() > state.rows.len() {
            return Err(LedgerError::Decode(format!(
                "patch has {} rows but table has {}",
                patch.rows.len(),
                state.rows.len()
            )));
        }

        let mut updated = 0;
        for (idx, delta) in patch.rows.iter().enumerate() {
            if delta.is_empty() {
                continue;
            }
            let row = &mut state.rows[idx].0;
            for (col, cell) in delta.iter().enumerate() {
                let Some(value) = cell else { continue };
                if row.len() <= col {
                    row.resize(col + 1, CellValue::Empty);
                }
                row[col] = CellValue::text(value.as_str());
            }
            updated += 1;
        }
        state.writes += 1;
        Ok(updated)
    }

    async fn read_aggregates(&self) -> Result<AggregateColumns, LedgerError> {
        let state = self.state.lock();
        Self::check_available(&state)?;
        if let Some(columns) = &state.aggregate_override {
            return Ok(columns.clone());
        }

        let mut columns = AggregateColumns::default();
        for key in &state.option_keys {
            let total: CentsValue = state
                .rows
                .iter()
                .skip(1)
                .filter(|r| r.choice() == key)
                .map(LedgerRow::cents)
                .sum();
            columns.names.push(CellValue::text(key.as_str()));
            columns.totals.push(CellValue::text(total.to_string()));
        }
        Ok(columns)
    }

    async fn append_row(&self, record: &DonationRecord) -> Result<(), LedgerError> {
        let mut state = self.state.lock();
        Self::check_available(&state)?;
        state.rows.push(LedgerRow(vec![
            CellValue::text(record.contributor.as_str()),
            CellValue::text(record.description.as_str()),
            CellValue::text(record.value.to_string()),
            CellValue::text(record.choice.as_str()),
            CellValue::text(record.reason.as_str()),
        ]));
        Ok(())
    }
}
