//! Ledger Tally
//!
//! Attributes a donor's unassigned ledger rows to the option they bid on and
//! reads back per-option totals. Totals are never cached: every query goes to
//! the ledger.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info};

use super::catalog::{BidOption, Catalog, Contest};
use super::matcher::{Choice, ChoiceSource};
use super::totals::{Total, Totals};
use crate::ledger::{
    CellValue, DonationRecord, Ledger, LedgerError, LedgerRow, SheetPatch, ValueRange,
};
use crate::models::{CentsValue, DonationEvent};

#[derive(Debug, Error)]
pub enum TallyError {
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error("expected text in {column} cell, got {value:?}")]
    MalformedCell { column: &'static str, value: CellValue },
    #[error("invalid total for {key}: {value:?}")]
    MalformedTotal { key: String, value: String },
    #[error("ledger call timed out after {0:?}")]
    Timeout(Duration),
}

/// What an `assign` call changed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateStats {
    pub choice: Choice,
    /// Rows newly attributed to the choice.
    pub count: usize,
    pub total_value: CentsValue,
}

pub struct Tallier {
    ledger: Arc<dyn Ledger>,
    catalog: Arc<Catalog>,
    timeout: Duration,
    /// Held across the read-modify-write in `assign` so two bids in this
    /// process never patch from the same snapshot.
    assign_lock: tokio::sync::Mutex<()>,
}

impl Tallier {
    pub fn new(ledger: Arc<dyn Ledger>, catalog: Arc<Catalog>, timeout: Duration) -> Self {
        Self {
            ledger,
            catalog,
            timeout,
            assign_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    async fn call<T, F>(&self, fut: F) -> Result<T, TallyError>
    where
        F: Future<Output = Result<T, LedgerError>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result.map_err(TallyError::from),
            Err(_) => Err(TallyError::Timeout(self.timeout)),
        }
    }

    /// Current total for every catalog option present in the ledger's summary
    /// view, in ledger order. Unknown keys are skipped; a malformed cell
    /// fails the whole call.
    pub async fn get_totals(&self) -> Result<Vec<Total>, TallyError> {
        let columns = self.call(self.ledger.read_aggregates()).await?;

        let options: HashMap<&str, &BidOption> = self
            .catalog
            .contests
            .iter()
            .flat_map(|c| c.options.iter())
            .map(|o| (o.short_code.as_str(), o))
            .collect();

        let mut totals = Vec::new();
        for (name, total) in columns.names.iter().zip(columns.totals.iter()) {
            if total.is_empty() {
                continue;
            }
            let key = match name {
                CellValue::Text(s) => s.as_str(),
                other => {
                    return Err(TallyError::MalformedCell {
                        column: "option key",
                        value: other.clone(),
                    })
                }
            };
            let Some(option) = options.get(key) else {
                continue;
            };
            let value = total.to_cents().ok_or_else(|| TallyError::MalformedTotal {
                key: key.to_string(),
                value: match total {
                    CellValue::Text(s) => s.clone(),
                    other => format!("{:?}", other),
                },
            })?;
            totals.push(Total {
                option: (*option).clone(),
                value,
            });
        }
        Ok(totals)
    }

    /// Resolves the donor's bid command and attributes every one of their
    /// unassigned rows to it. An unresolved choice is a no-op, not an error.
    pub async fn assign(&self, donor: &str, message: &str) -> Result<UpdateStats, TallyError> {
        if donor.is_empty() {
            return Err(TallyError::InvalidInput("donor must not be empty"));
        }
        let choice = self.catalog.resolve(message, ChoiceSource::BidCommand);
        if !choice.is_resolved() {
            return Ok(UpdateStats::default());
        }

        let _guard = self.assign_lock.lock().await;
        let table = self.call(self.ledger.read_rows()).await?;
        let (patch, matched) = make_choice(&table, donor, &choice);

        if !matched.is_empty() {
            let updated = self.call(self.ledger.write_rows(&patch)).await?;
            info!(
                donor,
                option = %choice.option.short_code,
                rows = updated,
                "updated donor rows"
            );
        }

        Ok(UpdateStats {
            count: matched.len(),
            total_value: matched.iter().map(|r| r.cents()).sum(),
            choice,
        })
    }

    /// Totals for one contest, highest first. Equal values keep ledger order.
    pub async fn totals_for_contest(&self, contest: &Contest) -> Result<Totals, TallyError> {
        let mut totals: Vec<Total> = self
            .get_totals()
            .await?
            .into_iter()
            .filter(|t| contest.contains(&t.option))
            .collect();
        totals.sort_by(|a, b| b.value.cmp(&a.value));
        Ok(Totals::new(
            totals,
            contest.summary_style,
            contest.number_of_winners,
        ))
    }

    /// Appends a donation to the ledger with whatever choice it resolved to.
    pub async fn record(&self, event: &DonationEvent, choice: &Choice) -> Result<(), TallyError> {
        let record = DonationRecord {
            contributor: event.donor.clone(),
            description: event.description(),
            value: event.value(),
            choice: choice.option.short_code.clone(),
            reason: choice.reason.clone(),
        };
        self.call(self.ledger.append_row(&record)).await?;
        debug!(donor = %event.donor, option = %record.choice, "recorded donation");
        Ok(())
    }
}

/// Builds the sparse patch that attributes `donor`'s blank-choice rows to
/// `choice`, and returns those rows as they were before the patch. The
/// header row never matches.
pub(crate) fn make_choice(
    table: &ValueRange,
    donor: &str,
    choice: &Choice,
) -> (SheetPatch, Vec<LedgerRow>) {
    let mut matched = Vec::new();
    let rows = table
        .rows
        .iter()
        .enumerate()
        .map(|(idx, row)| {
            if idx > 0 && row.contributor().eq_ignore_ascii_case(donor) && row.choice().is_empty() {
                matched.push(row.clone());
                row_for_choice(choice)
            } else {
                Vec::new()
            }
        })
        .collect();

    let patch = SheetPatch {
        range: table.range.clone(),
        major_dimension: table.major_dimension.clone(),
        rows,
    };
    (patch, matched)
}

fn row_for_choice(choice: &Choice) -> Vec<Option<String>> {
    let mut row = vec![None; LedgerRow::REASON + 1];
    row[LedgerRow::CHOICE] = Some(choice.option.short_code.clone());
    row[LedgerRow::REASON] = Some(choice.reason.clone());
    row
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bidwar::catalog::tests::TEST_JSON;
    use crate::ledger::{AggregateColumns, MemoryLedger};
    use async_trait::async_trait;

    fn row(cells: &[CellValue]) -> LedgerRow {
        LedgerRow(cells.to_vec())
    }

    fn t(s: &str) -> CellValue {
        CellValue::text(s)
    }

    fn sample_table() -> ValueRange {
        ValueRange {
            range: "Tracker!A:E".into(),
            major_dimension: "ROWS".into(),
            rows: vec![
                row(&[t("Contributor"), t("What"), t("Points"), t("Choice"), t("Message")]),
                row(&[t("aerionblue"), t("resub"), t("5.00")]),
                row(&[t("AEWC20XX"), t("resub"), t("5.00")]),
                row(&[t("aerionblue"), t("200 bits"), CellValue::Number(2.0), t(""), t("")]),
                row(&[
                    t("aerionblue"),
                    t("donation"),
                    t("5.01"),
                    t("Leon"),
                    t("put this towards Leon"),
                ]),
            ],
        }
    }

    fn moo_choice() -> Choice {
        Choice {
            option: BidOption::new("Moo Moo Meadows", "Moo"),
            reason: "usedMoo".into(),
        }
    }

    fn moo_delta() -> Vec<Option<String>> {
        vec![None, None, None, Some("Moo".into()), Some("usedMoo".into())]
    }

    #[test]
    fn test_make_choice_updates_one_row() {
        let table = sample_table();
        let (patch, matched) = make_choice(&table, "AEWC20XX", &moo_choice());
        assert_eq!(patch.range, table.range);
        assert_eq!(patch.major_dimension, table.major_dimension);
        assert_eq!(patch.rows, vec![vec![], vec![], moo_delta(), vec![], vec![]]);
        assert_eq!(matched, vec![table.rows[2].clone()]);
    }

    #[test]
    fn test_make_choice_updates_all_blank_rows_for_donor() {
        let table = sample_table();
        let (patch, matched) = make_choice(&table, "AerionBlue", &moo_choice());
        assert_eq!(patch.rows, vec![vec![], moo_delta(), vec![], moo_delta(), vec![]]);
        assert_eq!(matched, vec![table.rows[1].clone(), table.rows[3].clone()]);
    }

    #[test]
    fn test_make_choice_skips_header_row() {
        let (patch, matched) = make_choice(&sample_table(), "Contributor", &moo_choice());
        assert!(patch.touched_rows().next().is_none());
        assert!(matched.is_empty());
    }

    fn tallier(ledger: Arc<MemoryLedger>) -> Tallier {
        let catalog = Arc::new(Catalog::parse(TEST_JSON).unwrap());
        Tallier::new(ledger, catalog, Duration::from_secs(5))
    }

    fn seeded_ledger() -> Arc<MemoryLedger> {
        let ledger = Arc::new(MemoryLedger::new(["Moo", "NBC", "DMC1", "DMC2", "DMC3"]));
        for r in sample_table().rows.into_iter().skip(1) {
            ledger.push_row(r);
        }
        ledger
    }

    #[tokio::test]
    async fn test_assign_rejects_empty_donor() {
        let err = tallier(seeded_ledger()).assign("", "!bid moo").await.unwrap_err();
        assert!(matches!(err, TallyError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_assign_unresolved_is_noop() {
        let ledger = seeded_ledger();
        let stats = tallier(ledger.clone()).assign("aerionblue", "!bid zelda").await.unwrap();
        assert_eq!(stats, UpdateStats::default());
        assert_eq!(ledger.write_count(), 0);
    }

    #[tokio::test]
    async fn test_assign_stamps_blank_rows_only() {
        let ledger = seeded_ledger();
        let stats = tallier(ledger.clone()).assign("AERIONBLUE", "!bid moo").await.unwrap();

        assert_eq!(stats.choice.option.short_code, "Moo");
        assert_eq!(stats.count, 2);
        assert_eq!(stats.total_value, CentsValue(700));

        let rows = ledger.rows();
        assert_eq!(rows[1].choice(), "Moo");
        assert_eq!(rows[1].reason(), "[bid cmd] !bid moo");
        assert_eq!(rows[2].choice(), "");
        assert_eq!(rows[3].choice(), "Moo");
        assert_eq!(rows[4].choice(), "Leon");
        assert_eq!(rows[4].reason(), "put this towards Leon");
    }

    #[tokio::test]
    async fn test_assign_twice_does_not_reassign() {
        let ledger = seeded_ledger();
        let tallier = tallier(ledger.clone());
        tallier.assign("aerionblue", "!bid moo").await.unwrap();
        let stats = tallier.assign("aerionblue", "!bid nbc").await.unwrap();

        assert_eq!(stats.choice.option.short_code, "NBC");
        assert_eq!(stats.count, 0);
        assert_eq!(stats.total_value, CentsValue::ZERO);
        assert_eq!(ledger.rows()[1].choice(), "Moo");
        assert_eq!(ledger.write_count(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_assigns_attribute_each_row_once() {
        let ledger = seeded_ledger();
        let tallier = Arc::new(tallier(ledger.clone()));
        let a = {
            let tallier = tallier.clone();
            tokio::spawn(async move { tallier.assign("aerionblue", "!bid moo").await })
        };
        let b = {
            let tallier = tallier.clone();
            tokio::spawn(async move { tallier.assign("aerionblue", "!bid nbc").await })
        };
        let a = a.await.unwrap().unwrap();
        let b = b.await.unwrap().unwrap();
        assert_eq!(a.count + b.count, 2);
        assert!(a.count == 0 || b.count == 0);
    }

    #[tokio::test]
    async fn test_get_totals_skips_unknown_keys() {
        let ledger = seeded_ledger();
        ledger.set_aggregates(AggregateColumns {
            names: vec![t("Moo"), t("Zelda"), t("NBC"), t("DMC1")],
            totals: vec![t("10.00"), t("3.00"), CellValue::Number(9.94), CellValue::Empty],
        });
        let totals = tallier(ledger).get_totals().await.unwrap();
        let got: Vec<(&str, i64)> = totals
            .iter()
            .map(|t| (t.option.short_code.as_str(), t.value.cents()))
            .collect();
        assert_eq!(got, vec![("Moo", 1000), ("NBC", 994)]);
    }

    #[tokio::test]
    async fn test_get_totals_fails_on_malformed_total() {
        let ledger = seeded_ledger();
        ledger.set_aggregates(AggregateColumns {
            names: vec![t("Moo"), t("NBC")],
            totals: vec![t("10.00"), t("lots")],
        });
        let err = tallier(ledger).get_totals().await.unwrap_err();
        assert!(matches!(err, TallyError::MalformedTotal { ref key, .. } if key == "NBC"));
    }

    #[tokio::test]
    async fn test_get_totals_fails_on_numeric_key() {
        let ledger = seeded_ledger();
        ledger.set_aggregates(AggregateColumns {
            names: vec![CellValue::Number(7.0)],
            totals: vec![t("1.00")],
        });
        let err = tallier(ledger).get_totals().await.unwrap_err();
        assert!(matches!(err, TallyError::MalformedCell { .. }));
    }

    #[tokio::test]
    async fn test_totals_for_contest_sorted_and_filtered() {
        let ledger = seeded_ledger();
        ledger.set_aggregates(AggregateColumns {
            names: vec![t("Moo"), t("DMC1"), t("NBC"), t("DMC2"), t("DMC3")],
            totals: vec![t("1.00"), t("50.00"), t("3.00"), t("5.00"), t("50.00")],
        });
        let tallier = tallier(ledger);
        let contest = tallier.catalog().contests[1].clone();
        let totals = tallier.totals_for_contest(&contest).await.unwrap();
        let codes: Vec<&str> = totals
            .totals()
            .iter()
            .map(|t| t.option.short_code.as_str())
            .collect();
        assert_eq!(codes, vec!["DMC1", "DMC3", "DMC2"]);
        assert_eq!(
            totals.describe(&BidOption::default()),
            "Devil May Cry: 50.00, Devil May Cry 3: 50.00, Devil May Cry 2: 5.00 (down by 45.00)"
        );
    }

    #[tokio::test]
    async fn test_ledger_failure_propagates() {
        let ledger = seeded_ledger();
        ledger.set_unavailable(true);
        let tallier = tallier(ledger);
        assert!(matches!(
            tallier.assign("aerionblue", "!bid moo").await,
            Err(TallyError::Ledger(_))
        ));
        assert!(matches!(tallier.get_totals().await, Err(TallyError::Ledger(_))));
    }

    /// Hangs on reads; everything else goes straight to the inner ledger.
    struct StalledReads(Arc<MemoryLedger>);

    #[async_trait]
    impl Ledger for StalledReads {
        async fn read_rows(&self) -> Result<ValueRange, LedgerError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            self.0.read_rows().await
        }

        async fn write_rows(&self, patch: &SheetPatch) -> Result<usize, LedgerError> {
            self.0.write_rows(patch).await
        }

        async fn read_aggregates(&self) -> Result<AggregateColumns, LedgerError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            self.0.read_aggregates().await
        }

        async fn append_row(&self, record: &DonationRecord) -> Result<(), LedgerError> {
            self.0.append_row(record).await
        }
    }

    #[tokio::test]
    async fn test_slow_ledger_times_out() {
        let inner = seeded_ledger();
        let catalog = Arc::new(Catalog::parse(TEST_JSON).unwrap());
        let timeout = Duration::from_millis(50);
        let tallier = Tallier::new(Arc::new(StalledReads(inner.clone())), catalog, timeout);

        let err = tokio::time::timeout(
            Duration::from_secs(5),
            tallier.assign("aerionblue", "!bid moo"),
        )
        .await
        .unwrap()
        .unwrap_err();
        assert!(matches!(err, TallyError::Timeout(d) if d == timeout));
        assert_eq!(inner.write_count(), 0);
        assert_eq!(inner.rows()[1].choice(), "");

        let err = tallier.get_totals().await.unwrap_err();
        assert!(matches!(err, TallyError::Timeout(_)));

        // the assign lock is released after a timeout
        let err = tokio::time::timeout(
            Duration::from_secs(5),
            tallier.assign("aerionblue", "!bid nbc"),
        )
        .await
        .unwrap()
        .unwrap_err();
        assert!(matches!(err, TallyError::Timeout(_)));
        assert_eq!(inner.write_count(), 0);
    }

    #[tokio::test]
    async fn test_record_appends_row() {
        let ledger = seeded_ledger();
        let tallier = tallier(ledger.clone());
        let event = DonationEvent::bits("usedpizza", "chan", 444).with_message("moo!");
        let choice = tallier.catalog().resolve(&event.message, ChoiceSource::ChatMessage);
        tallier.record(&event, &choice).await.unwrap();

        let rows = ledger.rows();
        let last = rows.last().unwrap();
        assert_eq!(last.contributor(), "usedpizza");
        assert_eq!(last.cents(), CentsValue(444));
        assert_eq!(last.choice(), "Moo");
        assert_eq!(last.reason(), "[chat] moo!");
    }
}
