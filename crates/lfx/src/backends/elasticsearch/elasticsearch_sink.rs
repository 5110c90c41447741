use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, trace, warn};

use crate::backends::elasticsearch::{ClusterConfig, build_http_client};
use crate::backends::{BulkOp, BulkSink, BulkSummary};
use crate::errors::{BulkWriteError, FetchError};

/// 📡 The write side of the cluster backend: one page in, one `_bulk` request out.
///
/// Each op becomes an `index` action keyed on the original id, so replaying a page
/// overwrites instead of duplicating. `refresh=false` because nobody is searching the
/// new indices while the migration is still pouring water into them.
///
/// 🔄 This sink does not retry. Retries are the caller's problem. The caller has decided
/// they are nobody's problem. Good luck.
#[derive(Debug)]
pub struct ElasticsearchSink {
    client: reqwest::Client,
    config: ClusterConfig,
}

/// 📬 The bits of a `_bulk` response we care about.
#[derive(Debug, Deserialize)]
struct BulkResponse {
    #[serde(default)]
    errors: bool,
    #[serde(default)]
    items: Vec<HashMap<String, BulkItemStatus>>,
}

#[derive(Debug, Deserialize)]
struct BulkItemStatus {
    #[serde(default)]
    status: u16,
    #[serde(default)]
    error: Option<Value>,
}

impl BulkItemStatus {
    fn failed(&self) -> bool {
        self.error.is_some() || self.status >= 300
    }

    /// 🔎 The most human-readable reason the cluster offered, or the raw thing if it didn't.
    fn reason(&self) -> String {
        match &self.error {
            Some(err) => err
                .get("reason")
                .and_then(Value::as_str)
                .map(str::to_owned)
                .unwrap_or_else(|| err.to_string()),
            None => format!("HTTP {}", self.status),
        }
    }
}

#[async_trait]
impl BulkSink for ElasticsearchSink {
    async fn write(&mut self, ops: &[BulkOp]) -> Result<BulkSummary, BulkWriteError> {
        if ops.is_empty() {
            return Ok(BulkSummary::default());
        }
        let body = render_bulk_body(ops)?;
        debug!(
            docs = ops.len(),
            bytes = body.len(),
            "📡 sending a page to /_bulk, the payload has left the building"
        );
        self.submit_bulk_request(ops.len(), body).await
    }
}

impl ElasticsearchSink {
    /// 🚀 Stand up a sink. No ping here: whoever wires us up already said hello to the cluster.
    pub fn new(config: ClusterConfig) -> Result<Self, FetchError> {
        let client = build_http_client(Duration::from_secs(config.timeout_secs))?;
        Ok(Self { client, config })
    }

    async fn submit_bulk_request(
        &self,
        docs: usize,
        body: Vec<u8>,
    ) -> Result<BulkSummary, BulkWriteError> {
        let mut bulk_url = self
            .config
            .endpoint("bulk", "_bulk")
            .map_err(|e| BulkWriteError::Render {
                docs,
                reason: e.to_string(),
                at: Utc::now(),
            })?;
        bulk_url.query_pairs_mut().append_pair("refresh", "false");

        // ⚠️ application/x-ndjson, not application/json. The cluster is picky and it is right.
        let request = self
            .client
            .post(bulk_url)
            .header(CONTENT_TYPE, "application/x-ndjson")
            .body(body);
        let response = self
            .config
            .authorize(request)
            .send()
            .await
            .map_err(|source| BulkWriteError::Transport {
                docs,
                at: Utc::now(),
                source,
            })?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|source| BulkWriteError::Transport {
                docs,
                at: Utc::now(),
                source,
            })?;

        if !status.is_success() {
            return Err(BulkWriteError::Rejected {
                docs,
                status: status.as_u16(),
                body: String::from_utf8_lossy(&bytes).into_owned(),
                at: Utc::now(),
            });
        }

        inspect_bulk_response(docs, &bytes)
    }
}

/// 📝 NDJSON: an action line, then the source, then a newline, forever.
pub(crate) fn render_bulk_body(ops: &[BulkOp]) -> Result<Vec<u8>, BulkWriteError> {
    let render_failed = |e: serde_json::Error| BulkWriteError::Render {
        docs: ops.len(),
        reason: e.to_string(),
        at: Utc::now(),
    };
    let mut body = Vec::with_capacity(ops.len() * 256);
    for op in ops {
        let action = json!({ "index": { "_index": op.index, "_id": op.id } });
        serde_json::to_writer(&mut body, &action).map_err(render_failed)?;
        body.push(b'\n');
        serde_json::to_writer(&mut body, &op.source).map_err(render_failed)?;
        body.push(b'\n');
    }
    Ok(body)
}

/// 🔍 A 200 from `_bulk` is only half the story. The other half lives in `items`.
pub(crate) fn inspect_bulk_response(docs: usize, bytes: &[u8]) -> Result<BulkSummary, BulkWriteError> {
    let parsed: BulkResponse = match serde_json::from_slice(bytes) {
        Ok(parsed) => parsed,
        Err(e) => {
            // -- 🤷 2xx with a body we can't read. The status said yes, so we believe it.
            warn!(docs, error = %e, "⚠️ bulk response was 2xx but unreadable, counting the page as written");
            return Ok(BulkSummary { written: docs });
        }
    };

    if !parsed.errors {
        trace!(docs, "🚀 bulk page landed, no cap");
        return Ok(BulkSummary { written: docs });
    }

    let failures: Vec<&BulkItemStatus> = parsed
        .items
        .iter()
        .flat_map(|item| item.values())
        .filter(|status| status.failed())
        .collect();
    let first_reason = failures
        .first()
        .map(|status| status.reason())
        .unwrap_or_else(|| "errors=true but no failed item was reported".to_string());

    Err(BulkWriteError::PartialFailure {
        // -- errors=true with no visible failed item still counts as at least one casualty
        failed: failures.len().max(1),
        total: docs,
        first_reason,
        at: Utc::now(),
    })
}
