//! Trace replay
//!
//! A trace is newline-delimited JSON, one record per line:
//!
//! ```json
//! {"at": "2024-01-15T14:00:00.000Z", "page": {"path": "/checkout"}, "signal": {"type": "load"}}
//! {"at": "2024-01-15T14:00:12.000Z", "page": {"path": "/thank-you"}}
//! ```
//!
//! `page` replaces the current snapshot. Timers due up to `at` fire before
//! the record's `signal` is handled. A record without a signal only moves
//! the clock.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::TrackerConfig;
use crate::delivery::{Dispatch, OutboxTransport};
use crate::engine::Tracker;
use crate::error::TrackerError;
use crate::page::PageSnapshot;
use crate::signal::Signal;

/// One line of a trace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceRecord {
    pub at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<PageSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signal: Option<Signal>,
}

/// Parse an NDJSON trace. Blank lines are skipped; timestamps must not go
/// backwards.
pub fn parse_trace(input: &str) -> Result<Vec<TraceRecord>, TrackerError> {
    let mut records: Vec<TraceRecord> = Vec::new();

    for (index, line) in input.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let record: TraceRecord = serde_json::from_str(trimmed)
            .map_err(|e| TrackerError::InvalidTrace(format!("line {}: {}", index + 1, e)))?;

        if let Some(previous) = records.last() {
            if record.at < previous.at {
                return Err(TrackerError::InvalidTrace(format!(
                    "line {}: timestamp goes backwards",
                    index + 1
                )));
            }
        }
        records.push(record);
    }

    Ok(records)
}

/// Drive a fresh tracker through `records` and return everything it queued
pub fn replay(config: TrackerConfig, records: &[TraceRecord]) -> Result<Vec<Dispatch>, TrackerError> {
    let outbox = OutboxTransport::new();
    let mut tracker = Tracker::new(config, Box::new(outbox.clone()))?;
    let mut page = PageSnapshot::default();

    for record in records {
        if let Some(snapshot) = &record.page {
            page = snapshot.clone();
        }
        tracker.advance(&page, record.at);
        if let Some(signal) = &record.signal {
            tracker.handle(signal.clone(), &page, record.at);
        }
    }

    Ok(outbox.drain())
}
