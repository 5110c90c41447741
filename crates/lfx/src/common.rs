// ai
//! 📦 Common data structures: the building blocks of lfx
//!
//! 🎬 COLD OPEN: INT. SOC: 3:47 AM
//!
//! A firewall somewhere has opinions about a port scan. It writes them down.
//! The aggregation store files them away. And then, quietly, a `LogEvent` is
//! born: one security event, a bag of fields, an id it didn't choose, and a
//! timestamp it may or may not remember.
//!
//! This module defines the humble structs that ferry those events from the
//! aggregation store to wherever they're going next: the broker, or a shiny
//! new day-partitioned index. They don't judge the payload. They don't
//! normalize it. They carry it. They are the postal workers of this codebase. 🦆

use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};
use serde_json::{Map, Value};

/// 🕰️ Where the event keeps its birthday. First match wins.
const TIMESTAMP_FIELDS: [&str; 2] = ["timestamp", "@timestamp"];

/// 🪪 Where the event keeps its name tag, in order of preference.
const ID_FIELDS: [&str; 2] = ["_id", "id"];

/// 🎯 One security event, exactly as the aggregation store handed it to us.
///
/// The `document` is the open bag of attributes (`source`, `level`, `src_ip`,
/// `rule_description`, nested analysis blocks, whatever the agent felt like sending).
/// We never mutate it. We relocate it, or we re-serialize it. That's the whole job.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEvent {
    /// 🪪 Store-assigned id. `None` when the store didn't give us one, which is rude but legal.
    pub id: Option<String>,
    /// 📦 The raw document. Read-only by convention, and by the honor system.
    pub document: Map<String, Value>,
}

impl LogEvent {
    /// 🏗️ Wrap a message document from the search API. The id is fished out of
    /// `_id` (or `id`) if the message carries one.
    pub fn from_message(document: Map<String, Value>) -> Self {
        let id = ID_FIELDS
            .iter()
            .find_map(|field| document.get(*field).and_then(Value::as_str))
            .map(str::to_owned);
        Self { id, document }
    }

    /// 🏗️ Wrap a scroll hit: the id comes from the hit envelope, not the source.
    pub fn from_hit(id: String, document: Map<String, Value>) -> Self {
        Self {
            id: Some(id),
            document,
        }
    }

    /// 🕰️ The event's own timestamp, if it has one we can read.
    ///
    /// `None` means "absent or unparseable". Callers decide what "now" means.
    /// This method never invents a time on the event's behalf.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        TIMESTAMP_FIELDS
            .iter()
            .find_map(|field| self.document.get(*field).and_then(parse_timestamp))
    }

    /// 📡 The wire payload: the document, JSON-serialized, as-is.
    pub fn to_payload(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(&self.document)
    }
}

/// 🔍 Reads a timestamp-ish JSON value into UTC.
///
/// Accepts:
/// - RFC 3339 (`2024-01-01T23:00:00.000Z`, with any offset)
/// - the classic log-store shape `2024-01-01 23:00:00.000` (assumed UTC)
/// - the same without the offset but with a `T`
/// - epoch milliseconds as a JSON number
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(raw) => {
            let raw = raw.trim();
            if let Ok(with_offset) = DateTime::parse_from_rfc3339(raw) {
                return Some(with_offset.with_timezone(&Utc));
            }
            // -- 🧭 no offset? then it's UTC. log stores don't do local time. (they shouldn't.)
            ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
                .map(|naive| naive.and_utc())
        }
        Value::Number(millis) => millis.as_i64().and_then(DateTime::from_timestamp_millis),
        _ => None,
    }
}

/// 📦 A `Batch`: an ordered, bounded pile of events.
///
/// Created fresh per fetch, dispatched once, then forgotten. Never persisted.
/// Like a shopping cart that returns itself. The dream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    pub events: Vec<LogEvent>,
}

impl Batch {
    pub fn new(events: Vec<LogEvent>) -> Self {
        Self { events }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, LogEvent> {
        self.events.iter()
    }
}

impl IntoIterator for Batch {
    type Item = LogEvent;
    type IntoIter = std::vec::IntoIter<LogEvent>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.into_iter()
    }
}

/// ⏱️ An absolute `[from, to]` time range, always UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl TimeWindow {
    /// 🔄 `[now - size, now]`: the trailing window every ingestion cycle asks for.
    pub fn trailing(now: DateTime<Utc>, size: TimeDelta) -> Self {
        Self {
            from: now - size,
            to: now,
        }
    }

    /// 📅 ISO-8601 with millis and a `Z`, the dialect both API generations speak.
    pub fn from_iso(&self) -> String {
        iso_millis(&self.from)
    }

    pub fn to_iso(&self) -> String {
        iso_millis(&self.to)
    }
}

fn iso_millis(instant: &DateTime<Utc>) -> String {
    instant.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}
