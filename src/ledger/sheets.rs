//! Google Sheets Ledger Client
//!
//! Reads and patches the donation table through the Sheets v4 REST API.
//! Authentication is a bearer token obtained elsewhere.

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use super::{
    AggregateColumns, CellValue, DonationRecord, Ledger, LedgerError, LedgerRow, SheetPatch,
    ValueRange, METADATA_BID_WAR_NAMES, METADATA_BID_WAR_TOTALS,
};

const SHEETS_API_BASE: &str = "https://sheets.googleapis.com/v4/spreadsheets";

pub struct SheetsLedger {
    client: Client,
    base_url: String,
    spreadsheet_id: String,
    table_range: String,
    /// Serializes our own writes; the API itself gives no row locking.
    write_lock: tokio::sync::Mutex<()>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ValueRangeResponse {
    #[serde(default)]
    range: String,
    #[serde(default)]
    major_dimension: String,
    #[serde(default)]
    values: Vec<Vec<CellValue>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateResponse {
    #[serde(default)]
    updated_rows: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BatchGetByDataFilterResponse {
    #[serde(default)]
    value_ranges: Vec<MatchedValueRange>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MatchedValueRange {
    value_range: ValueRangeResponse,
    #[serde(default)]
    data_filters: Vec<DataFilter>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DataFilter {
    developer_metadata_lookup: MetadataLookup,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MetadataLookup {
    metadata_key: String,
}

impl SheetsLedger {
    pub fn new(
        access_token: &str,
        spreadsheet_id: impl Into<String>,
        sheet_name: &str,
        timeout: Duration,
    ) -> Result<Self, LedgerError> {
        let mut headers = reqwest::header::HeaderMap::new();
        let auth = format!("Bearer {}", access_token)
            .parse()
            .map_err(|_| LedgerError::Decode("access token is not a valid header".to_string()))?;
        headers.insert(reqwest::header::AUTHORIZATION, auth);

        let client = Client::builder()
            .timeout(timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            base_url: SHEETS_API_BASE.to_string(),
            spreadsheet_id: spreadsheet_id.into(),
            // TODO: escape single quotes in sheet names.
            table_range: format!("'{}'!A:E", sheet_name),
            write_lock: tokio::sync::Mutex::new(()),
        })
    }

    /// `{base}/{spreadsheet}/values/{range}{suffix}` with the range escaped
    /// as a single path segment.
    fn values_url(&self, range: &str, suffix: &str) -> Result<Url, LedgerError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| LedgerError::Decode(format!("bad base url: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| LedgerError::Decode("base url cannot have a path".to_string()))?
            .push(&self.spreadsheet_id)
            .push("values")
            .push(&format!("{}{}", range, suffix));
        Ok(url)
    }

    fn batch_url(&self) -> Result<Url, LedgerError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| LedgerError::Decode(format!("bad base url: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| LedgerError::Decode("base url cannot have a path".to_string()))?
            .push(&self.spreadsheet_id)
            .push("values:batchGetByDataFilter");
        Ok(url)
    }

    async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, LedgerError> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(LedgerError::Status {
                status: status.as_u16(),
                body,
            });
        }
        resp.json::<T>()
            .await
            .map_err(|e| LedgerError::Decode(e.to_string()))
    }
}

#[async_trait]
impl Ledger for SheetsLedger {
    async fn read_rows(&self) -> Result<ValueRange, LedgerError> {
        let url = self.values_url(&self.table_range, "")?;
        let resp = self
            .client
            .get(url)
            .query(&[
                ("majorDimension", "ROWS"),
                ("valueRenderOption", "UNFORMATTED_VALUE"),
            ])
            .send()
            .await?;
        let vr: ValueRangeResponse = Self::decode(resp).await?;
        debug!(range = %vr.range, rows = vr.values.len(), "read donation table");

        Ok(ValueRange {
            range: vr.range,
            major_dimension: vr.major_dimension,
            rows: vr.values.into_iter().map(LedgerRow).collect(),
        })
    }

    async fn write_rows(&self, patch: &SheetPatch) -> Result<usize, LedgerError> {
        let _guard = self.write_lock.lock().await;
        let url = self.values_url(&patch.range, "")?;
        let resp = self
            .client
            .put(url)
            .query(&[("valueInputOption", "RAW")])
            .json(patch)
            .send()
            .await?;
        let update: UpdateResponse = Self::decode(resp).await?;
        Ok(update.updated_rows)
    }

    async fn read_aggregates(&self) -> Result<AggregateColumns, LedgerError> {
        let body = json!({
            "dataFilters": [
                {"developerMetadataLookup": {"metadataKey": METADATA_BID_WAR_NAMES}},
                {"developerMetadataLookup": {"metadataKey": METADATA_BID_WAR_TOTALS}},
            ],
            "majorDimension": "COLUMNS",
        });
        let resp = self.client.post(self.batch_url()?).json(&body).send().await?;
        let batch: BatchGetByDataFilterResponse = Self::decode(resp).await?;

        let mut columns = AggregateColumns::default();
        for matched in batch.value_ranges {
            let first_column = matched.value_range.values.into_iter().next().unwrap_or_default();
            for filter in &matched.data_filters {
                match filter.developer_metadata_lookup.metadata_key.as_str() {
                    METADATA_BID_WAR_NAMES => columns.names = first_column.clone(),
                    METADATA_BID_WAR_TOTALS => columns.totals = first_column.clone(),
                    _ => {}
                }
            }
        }
        Ok(columns)
    }

    async fn append_row(&self, record: &DonationRecord) -> Result<(), LedgerError> {
        let _guard = self.write_lock.lock().await;
        let url = self.values_url(&self.table_range, ":append")?;
        let body = json!({
            "values": [[
                record.contributor,
                record.description,
                record.value.to_string(),
                record.choice,
                record.reason,
            ]]
        });
        // OVERWRITE keeps the formula cells next to the table intact;
        // INSERT_ROWS would leave them empty on the new row.
        let resp = self
            .client
            .post(url)
            .query(&[
                ("valueInputOption", "USER_ENTERED"),
                ("insertDataOption", "OVERWRITE"),
            ])
            .json(&body)
            .send()
            .await?;
        let _: serde_json::Value = Self::decode(resp).await?;
        Ok(())
    }
}
