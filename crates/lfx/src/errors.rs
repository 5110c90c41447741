// ai
//! 💀 Errors: the taxonomy of things going sideways.
//!
//! 🧠 Knowledge graph:
//! - `FetchError`: anything between us and the aggregation store (search API, scroll, index checks).
//!   Transport failures, non-2xx statuses, bodies we couldn't decode. Never retried in here.
//! - `PublishError`: the broker didn't take the batch. The batch is dropped. Terminal.
//! - `BulkWriteError`: the bulk sink rejected all or part of a page. Terminal for that page.
//! - `ConnectError`: the broker was unreachable at startup. Fatal. The process goes home.
//!
//! "Protocol mismatch" is NOT in here on purpose: a 404 from the newer search API is
//! a tagged outcome (`GenerationOutcome::UnsupportedVersion`), not an error. Nobody pages
//! anyone because the server is old. 🦆
//!
//! Every variant carries `at`, the UTC moment it happened, because "when" is the first
//! question in every postmortem and the second question is "why didn't we log when".

use chrono::{DateTime, Utc};
use thiserror::Error;

/// 📡 The aggregation store let us down.
#[derive(Debug, Error)]
pub enum FetchError {
    /// 🔌 Never got an HTTP response. DNS, TCP, TLS, timeout. The usual suspects.
    #[error("💀 {operation}: transport failure at {at}: {source}")]
    Transport {
        operation: &'static str,
        at: DateTime<Utc>,
        #[source]
        source: reqwest::Error,
    },
    /// 📬 Got a response. It was not a happy one.
    #[error("💀 {operation}: HTTP {status} at {at}: {body}")]
    Status {
        operation: &'static str,
        status: u16,
        body: String,
        at: DateTime<Utc>,
    },
    /// 🧩 The response came back 2xx but the shape made no sense.
    #[error("💀 {operation}: could not decode response at {at}: {source}")]
    Decode {
        operation: &'static str,
        at: DateTime<Utc>,
        #[source]
        source: serde_json::Error,
    },
    /// 🔧 The caller asked for something this client was built without.
    #[error("💀 {operation}: not configured ({what} is missing)")]
    NotConfigured {
        operation: &'static str,
        what: &'static str,
    },
    /// 🧭 The configured base URL can't be glued into a request URL.
    #[error("💀 {operation}: invalid URL '{url}': {reason}")]
    InvalidUrl {
        operation: &'static str,
        url: String,
        reason: String,
    },
}

impl FetchError {
    pub(crate) fn transport(operation: &'static str, source: reqwest::Error) -> Self {
        Self::Transport {
            operation,
            at: Utc::now(),
            source,
        }
    }

    pub(crate) fn status(operation: &'static str, status: u16, body: String) -> Self {
        Self::Status {
            operation,
            status,
            body,
            at: Utc::now(),
        }
    }

    pub(crate) fn decode(operation: &'static str, source: serde_json::Error) -> Self {
        Self::Decode {
            operation,
            at: Utc::now(),
            source,
        }
    }

    /// 🔎 The HTTP status, when there was one.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// 📨 The broker said no. The batch is gone.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("💀 could not serialize event {id:?} for topic '{topic}' at {at}: {source}")]
    Serialize {
        topic: String,
        id: Option<String>,
        at: DateTime<Utc>,
        #[source]
        source: serde_json::Error,
    },
    /// ⚠️ Any failed message fails the whole batch. No partial-batch promises.
    #[error("💀 {failed}/{total} messages to topic '{topic}' failed at {at}; first failure: {first_failure}")]
    Delivery {
        topic: String,
        failed: usize,
        total: usize,
        first_failure: String,
        at: DateTime<Utc>,
    },
}

/// 🗑️ The bulk sink rejected (some of) a page.
#[derive(Debug, Error)]
pub enum BulkWriteError {
    #[error("💀 bulk request with {docs} docs never arrived at {at}: {source}")]
    Transport {
        docs: usize,
        at: DateTime<Utc>,
        #[source]
        source: reqwest::Error,
    },
    #[error("💀 bulk request with {docs} docs rejected with HTTP {status} at {at}: {body}")]
    Rejected {
        docs: usize,
        status: u16,
        body: String,
        at: DateTime<Utc>,
    },
    #[error("💀 bulk request accepted but {failed}/{total} items failed at {at}; first reason: {first_reason}")]
    PartialFailure {
        failed: usize,
        total: usize,
        first_reason: String,
        at: DateTime<Utc>,
    },
    #[error("💀 could not render bulk body for {docs} docs at {at}: {reason}")]
    Render {
        docs: usize,
        reason: String,
        at: DateTime<Utc>,
    },
}

impl BulkWriteError {
    /// 📊 How many docs of the page did NOT make it, as far as we know.
    pub fn failed_docs(&self) -> usize {
        match self {
            Self::Transport { docs, .. }
            | Self::Rejected { docs, .. }
            | Self::Render { docs, .. } => *docs,
            Self::PartialFailure { failed, .. } => *failed,
        }
    }
}

/// 🔌 Couldn't even say hello to the broker.
#[derive(Debug, Error)]
#[error("💀 could not connect to broker '{bootstrap_servers}' (topic '{topic}') at {at}: {reason}")]
pub struct ConnectError {
    pub bootstrap_servers: String,
    pub topic: String,
    pub reason: String,
    pub at: DateTime<Utc>,
}
