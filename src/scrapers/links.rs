//! Batch input: a CSV file of article links.
//!
//! The file needs a header row with a link column (`Link`, `URL`, `url` or
//! `link`). A publish-date column (`Published At`, `publishedAt`,
//! `published_at` or `date`) is optional; when present its value is reduced
//! to a calendar date and used as the fallback event date.

use crate::error::TrackerError;
use crate::models::{LinkEntry, publish_date};
use std::path::Path;
use tracing::{info, instrument, warn};

const LINK_COLUMNS: [&str; 4] = ["Link", "URL", "url", "link"];
const DATE_COLUMNS: [&str; 4] = ["Published At", "publishedAt", "published_at", "date"];

/// Read link rows from the CSV at `path`, skipping `skip` rows and keeping at most `limit`.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub fn read_links(path: &Path, skip: usize, limit: Option<usize>) -> Result<Vec<LinkEntry>, TrackerError> {
    let file = std::fs::File::open(path)
        .map_err(|e| TrackerError::Config(format!("cannot open link file {}: {e}", path.display())))?;
    let links = parse_links(file, skip, limit)?;
    info!(count = links.len(), "Loaded article links");
    Ok(links)
}

/// Parse link rows from any CSV reader.
pub fn parse_links<R: std::io::Read>(
    reader: R,
    skip: usize,
    limit: Option<usize>,
) -> Result<Vec<LinkEntry>, TrackerError> {
    let mut rdr = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
    let headers = rdr
        .headers()
        .map_err(|e| TrackerError::Config(format!("cannot read link file header: {e}")))?
        .clone();

    let find = |names: &[&str]| {
        headers
            .iter()
            .position(|h| names.contains(&h.trim()))
    };
    let link_col = find(&LINK_COLUMNS).ok_or_else(|| {
        TrackerError::Config(format!(
            "link file has no link column (expected one of {LINK_COLUMNS:?}, found {:?})",
            headers.iter().collect::<Vec<_>>()
        ))
    })?;
    let date_col = find(&DATE_COLUMNS);

    let mut links = Vec::new();
    for (row, result) in rdr.records().enumerate().skip(skip) {
        if limit.is_some_and(|limit| links.len() >= limit) {
            break;
        }
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                warn!(row, error = %e, "Skipping unreadable link row");
                continue;
            }
        };
        let url = record.get(link_col).unwrap_or("").trim();
        if url.is_empty() {
            warn!(row, "Skipping link row without a URL");
            continue;
        }
        let published = date_col
            .and_then(|col| record.get(col))
            .and_then(publish_date);
        links.push(LinkEntry {
            url: url.to_string(),
            published,
        });
    }
    Ok(links)
}
