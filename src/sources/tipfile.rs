//! Tip file donation source
//!
//! Reads external tips from a text file that another program appends to, one
//! donation per line:
//!
//! ```text
//! <unique id>;<amount in cents>;<username>;<message>
//! ```
//!
//! The username sits late in the line so a stray `;` in it can only cost us
//! the message, never the amount. The message itself may contain `;`.

use std::collections::HashSet;
use std::num::ParseIntError;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::models::{CentsValue, DonationEvent};

const LINE_DELIMITER: char = ';';
const OPEN_ATTEMPTS: u32 = 3;

#[derive(Debug, Error)]
pub enum TipFileError {
    #[error("error parsing donation amount {raw:?}: {source}")]
    Amount {
        raw: String,
        #[source]
        source: ParseIntError,
    },
    #[error("could not read tip file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// One line of the tip file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TipLine {
    pub id: String,
    pub cents: i64,
    pub username: String,
    pub message: String,
}

impl TipLine {
    pub fn into_event(self, channel: &str) -> DonationEvent {
        DonationEvent::tip(self.username, channel, CentsValue(self.cents))
            .with_message(self.message)
    }
}

/// Parses one line. Blank lines are `Ok(None)`; missing trailing fields are
/// empty.
pub fn parse_tip_line(line: &str) -> Result<Option<TipLine>, TipFileError> {
    if line.trim().is_empty() {
        return Ok(None);
    }
    let mut fields = line.splitn(4, LINE_DELIMITER);
    let mut next = || fields.next().unwrap_or("").to_string();
    let (id, raw_cents, username, message) = (next(), next(), next(), next());

    let cents = raw_cents
        .trim()
        .parse()
        .map_err(|source| TipFileError::Amount {
            raw: raw_cents.clone(),
            source,
        })?;
    Ok(Some(TipLine {
        id,
        cents,
        username,
        message,
    }))
}

/// Polls a tip file and reports lines it has not seen before.
pub struct TipFileWatcher {
    path: PathBuf,
    channel: String,
    poll_interval: Duration,
    retry_delay: Duration,
    processed: HashSet<String>,
    last_seen: Option<FileStamp>,
}

/// Size and mtime of the file at the last successful read.
type FileStamp = (u64, Option<SystemTime>);

impl TipFileWatcher {
    /// Lines already in the file count as processed; only tips appended
    /// after this call are reported.
    pub async fn new(
        path: impl Into<PathBuf>,
        channel: impl Into<String>,
        poll_interval: Duration,
    ) -> Result<Self, TipFileError> {
        Self::with_retry_delay(path, channel, poll_interval, Duration::from_secs(1)).await
    }

    pub async fn with_retry_delay(
        path: impl Into<PathBuf>,
        channel: impl Into<String>,
        poll_interval: Duration,
        retry_delay: Duration,
    ) -> Result<Self, TipFileError> {
        let mut watcher = Self {
            path: path.into(),
            channel: channel.into(),
            poll_interval,
            retry_delay,
            processed: HashSet::new(),
            last_seen: None,
        };
        watcher.read_new().await?;
        info!(
            "📄 read {} entries from {}",
            watcher.processed.len(),
            watcher.path.display()
        );
        Ok(watcher)
    }

    /// New tips since the last poll, oldest first. A failed read leaves the
    /// file marked unread so the next poll tries again.
    pub async fn poll_once(&mut self) -> Result<Vec<DonationEvent>, TipFileError> {
        let stamp = self.stamp().await;
        if stamp.is_some() && stamp == self.last_seen {
            return Ok(Vec::new());
        }
        let lines = self.read_new().await?;
        self.last_seen = stamp;
        Ok(lines
            .into_iter()
            .map(|line| line.into_event(&self.channel))
            .collect())
    }

    /// Polls forever on the configured interval, sending new tips to `tx`.
    /// Stops when the receiver is dropped.
    pub fn spawn(mut self, tx: mpsc::Sender<DonationEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.poll_interval);
            loop {
                ticker.tick().await;
                let events = match self.poll_once().await {
                    Ok(events) => events,
                    Err(e) => {
                        error!(error = %e, "error reading donation tip file");
                        continue;
                    }
                };
                for event in events {
                    if tx.send(event).await.is_err() {
                        debug!("tip receiver closed, stopping watcher");
                        return;
                    }
                }
            }
        })
    }

    /// Cheap check on size and mtime before re-reading the whole file.
    async fn stamp(&self) -> Option<FileStamp> {
        let meta = tokio::fs::metadata(&self.path).await.ok()?;
        Some((meta.len(), meta.modified().ok()))
    }

    /// Only newline-terminated lines are parsed. A trailing partial line is
    /// the writer mid-append and is picked up once it is finished.
    async fn read_new(&mut self) -> Result<Vec<TipLine>, TipFileError> {
        let contents = self.read_with_retry().await?;
        let complete = contents.rfind('\n').map_or("", |end| &contents[..=end]);
        let mut fresh = Vec::new();
        for line in complete.lines() {
            match parse_tip_line(line) {
                Ok(Some(entry)) => {
                    if self.processed.insert(entry.id.clone()) {
                        fresh.push(entry);
                    }
                }
                Ok(None) => {}
                Err(e) => warn!("error parsing tip line: {}", e),
            }
        }
        Ok(fresh)
    }

    /// The writer sometimes still holds the file open, so give it a few
    /// tries.
    async fn read_with_retry(&self) -> Result<String, TipFileError> {
        let mut attempt = 1;
        loop {
            match tokio::fs::read_to_string(&self.path).await {
                Ok(contents) => return Ok(contents),
                Err(source) if attempt >= OPEN_ATTEMPTS => {
                    return Err(TipFileError::Io {
                        path: self.path.clone(),
                        source,
                    })
                }
                Err(e) => {
                    debug!(attempt, error = %e, "tip file not readable yet");
                    attempt += 1;
                    tokio::time::sleep(self.retry_delay).await;
                }
            }
        }
    }
}
