//! Append-only CSV dataset of extracted events.
//!
//! The dataset is one header line followed by one line per event, columns in
//! [`COLUMNS`] order. The header is written when the file is created and
//! checked on every later append; a file with a different layout is refused
//! rather than migrated.
//!
//! # Field separators
//!
//! [`FieldPolicy::Quote`] (default) writes standard CSV: fields containing a
//! comma or quote are quoted and inner quotes doubled, so nothing is lost.
//! [`FieldPolicy::Strip`] deletes commas and double quotes instead, matching
//! datasets produced by older tooling while staying readable by a quote-aware
//! CSV parser. Either way, embedded line breaks become spaces so every
//! event occupies exactly one line.
//!
//! Each append serializes the whole batch in memory first and issues a single
//! write, so a record is never half-written by a failure in a later record.

use crate::error::StoreError;
use crate::models::{COLUMNS, EventRecord, convert_date};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncSeekExt, AsyncWriteExt, BufReader, SeekFrom};
use tracing::{debug, info, instrument, warn};

/// How field values containing the separator are written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldPolicy {
    #[default]
    Quote,
    Strip,
}

/// Result of one [`EventStore::append`] call.
#[derive(Debug, Default)]
pub struct AppendReport {
    pub written: usize,
    pub skipped: Vec<SkippedRecord>,
}

/// A record that could not be serialized and was left out of the append.
#[derive(Debug)]
pub struct SkippedRecord {
    /// Position of the record in the batch passed to `append`.
    pub index: usize,
    pub reason: String,
}

/// A stored row read back with its typed columns parsed leniently.
#[derive(Debug, Clone)]
pub struct StoredEvent {
    pub record: EventRecord,
    pub date: Option<NaiveDate>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
}

/// The CSV file events are appended to.
#[derive(Debug, Clone)]
pub struct EventStore {
    path: PathBuf,
    policy: FieldPolicy,
}

impl EventStore {
    /// Create a store for the CSV at `path`.
    ///
    /// Nothing is touched on disk until the first [`append`](Self::append)
    /// or [`load`](Self::load).
    ///
    /// # Arguments
    ///
    /// * `path` - Dataset file; its directory must already exist
    /// * `policy` - How separators inside field values are written
    pub fn new(path: impl Into<PathBuf>, policy: FieldPolicy) -> Self {
        Self {
            path: path.into(),
            policy,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The fixed header line, newline included.
    pub fn header_line() -> String {
        format!("{}\n", COLUMNS.join(","))
    }

    /// Append `records`, creating the file with its header if needed.
    #[instrument(level = "info", skip_all, fields(path = %self.path.display(), count = records.len()))]
    pub async fn append(&self, records: &[EventRecord]) -> Result<AppendReport, StoreError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| self.io(e))?;
        let len = file.metadata().await.map_err(|e| self.io(e))?.len();

        let mut out = Vec::new();
        if len == 0 {
            debug!("New dataset; writing header");
            out.extend_from_slice(Self::header_line().as_bytes());
        } else {
            self.check_header().await?;
            if !self.ends_with_newline().await? {
                debug!("Dataset lacks a final newline; terminating last line");
                out.push(b'\n');
            }
        }

        let mut report = AppendReport::default();
        for (index, record) in records.iter().enumerate() {
            match self.serialize(record) {
                Ok(line) => {
                    out.extend_from_slice(&line);
                    report.written += 1;
                }
                Err(e) => {
                    warn!(index, error = %e, "Skipping record that failed to serialize");
                    report.skipped.push(SkippedRecord {
                        index,
                        reason: e.to_string(),
                    });
                }
            }
        }

        if !out.is_empty() {
            file.write_all(&out).await.map_err(|e| self.io(e))?;
            file.flush().await.map_err(|e| self.io(e))?;
        }
        info!(written = report.written, skipped = report.skipped.len(), "Appended events");
        Ok(report)
    }

    /// Read every stored event back, tolerating malformed rows and values.
    ///
    /// A missing file reads as an empty dataset.
    #[instrument(level = "info", skip_all, fields(path = %self.path.display()))]
    pub async fn load(&self) -> Result<Vec<StoredEvent>, StoreError> {
        let bytes = match fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(self.io(e)),
        };

        let mut rdr = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(bytes.as_slice());
        let mut events = Vec::new();
        for (row, result) in rdr.records().enumerate() {
            let row_record = match result {
                Ok(r) => r,
                Err(e) => {
                    warn!(row, error = %e, "Skipping unreadable row");
                    continue;
                }
            };
            if row_record.len() != COLUMNS.len() {
                warn!(row, fields = row_record.len(), "Row has unexpected field count");
            }
            let field = |i: usize| row_record.get(i).unwrap_or("").to_string();
            let optional = |i: usize| Some(field(i)).filter(|s| !s.is_empty());
            let record = EventRecord {
                city: field(0),
                state: field(1),
                event: field(2),
                summary: field(3),
                article_url: field(4),
                source: field(5),
                date_of_event: field(6),
                event_picture_caption: optional(7),
                event_picture_link: optional(8),
                lat: field(9),
                lon: field(10),
            };
            let date = convert_date(&record.date_of_event)
                .ok()
                .and_then(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d").ok());
            let lat = record.lat.trim().parse().ok();
            let lon = record.lon.trim().parse().ok();
            events.push(StoredEvent {
                record,
                date,
                lat,
                lon,
            });
        }
        Ok(events)
    }

    async fn check_header(&self) -> Result<(), StoreError> {
        let file = fs::File::open(&self.path).await.map_err(|e| self.io(e))?;
        let mut first = String::new();
        BufReader::new(file)
            .read_line(&mut first)
            .await
            .map_err(|e| self.io(e))?;
        let found = first.trim_start_matches('\u{feff}').trim_end_matches(['\r', '\n']);
        if found != COLUMNS.join(",") {
            return Err(StoreError::HeaderMismatch {
                path: self.path.clone(),
                found: found.to_string(),
            });
        }
        Ok(())
    }

    async fn ends_with_newline(&self) -> Result<bool, StoreError> {
        let mut file = fs::File::open(&self.path).await.map_err(|e| self.io(e))?;
        file.seek(SeekFrom::End(-1)).await.map_err(|e| self.io(e))?;
        let mut last = [0u8; 1];
        file.read_exact(&mut last).await.map_err(|e| self.io(e))?;
        Ok(last[0] == b'\n')
    }

    /// One complete CSV line for `record`, trailing newline included.
    fn serialize(&self, record: &EventRecord) -> Result<Vec<u8>, StoreError> {
        let fields: Vec<String> = record
            .to_row()
            .iter()
            .map(|value| single_line(value))
            .collect();

        match self.policy {
            FieldPolicy::Strip => {
                let line = fields
                    .iter()
                    .map(|f| f.replace([',', '"'], ""))
                    .collect::<Vec<_>>()
                    .join(",");
                Ok(format!("{line}\n").into_bytes())
            }
            FieldPolicy::Quote => {
                let mut wtr = csv::WriterBuilder::new()
                    .has_headers(false)
                    .terminator(csv::Terminator::Any(b'\n'))
                    .from_writer(Vec::new());
                wtr.write_record(&fields)?;
                wtr.into_inner()
                    .map_err(|e| StoreError::Csv(csv::Error::from(e.into_error())))
            }
        }
    }

    fn io(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

fn single_line(value: &str) -> String {
    value.replace("\r\n", " ").replace(['\r', '\n'], " ")
}
