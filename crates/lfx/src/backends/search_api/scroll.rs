// ai
//! 📜 The scroll cursor: reading a legacy index front to back, one page at a time.
//!
//! 🧠 Knowledge graph:
//! - `index_exists(index)` → `HEAD /{index}`. 200 yes, 404 no, anything else is an error.
//! - `open_scroll(index, page_size, keep_alive)` → `POST /{index}/_search?scroll=..&size=..`
//!   sorted by `_doc` (cheapest order there is). Returns the `Cursor` plus the first page.
//! - `advance_scroll(&mut cursor)` → `POST /_search/scroll`. Empty page = exhausted.
//! - `close_scroll(cursor)` → `DELETE /_search/scroll`. Takes the cursor by value, so a
//!   closed cursor can't be advanced. The compiler is our bouncer. 🦆
//!
//! The cursor is server-side state with a lease. Whoever opens it owns it, and owns
//! closing it too. Nobody else gets a copy.

use reqwest::StatusCode;
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::{debug, trace};

use crate::backends::search_api::{SearchApiClient, read_json};
use crate::common::{Batch, LogEvent};
use crate::errors::FetchError;

/// 🧭 A live server-side scroll. Not `Clone`, on purpose: one cursor, one owner.
#[derive(Debug, PartialEq, Eq)]
pub struct Cursor {
    index: String,
    scroll_id: String,
    keep_alive: String,
    total_hits: u64,
    pages_served: u64,
}

impl Cursor {
    pub fn index(&self) -> &str {
        &self.index
    }

    pub fn scroll_id(&self) -> &str {
        &self.scroll_id
    }

    /// 📏 What the first page promised. 0 if the cluster didn't say.
    pub fn total_hits(&self) -> u64 {
        self.total_hits
    }

    /// 📄 Pages handed out so far, the opening page included.
    pub fn pages_served(&self) -> u64 {
        self.pages_served
    }
}

#[derive(Debug, Deserialize)]
struct ScrollResponse {
    #[serde(rename = "_scroll_id", default)]
    scroll_id: Option<String>,
    #[serde(default)]
    hits: HitsEnvelope,
}

#[derive(Debug, Default, Deserialize)]
struct HitsEnvelope {
    #[serde(default)]
    total: Option<HitsTotal>,
    #[serde(default)]
    hits: Vec<RawHit>,
}

/// 📏 Newer clusters say `{"value": n, "relation": "eq"}`, older ones just say `n`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum HitsTotal {
    Object { value: u64 },
    Bare(u64),
}

impl HitsTotal {
    fn value(&self) -> u64 {
        match self {
            HitsTotal::Object { value } | HitsTotal::Bare(value) => *value,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawHit {
    #[serde(rename = "_id", default)]
    id: Option<String>,
    #[serde(rename = "_source", default)]
    source: Map<String, Value>,
}

/// 📦 Every raw hit becomes an event, `_id` or not. An empty batch must mean an empty
/// page, so deciding what to do with nameless hits is the caller's job.
fn hits_to_batch(hits: Vec<RawHit>) -> Batch {
    Batch::new(
        hits.into_iter()
            .map(|hit| LogEvent {
                id: hit.id,
                document: hit.source,
            })
            .collect(),
    )
}

fn json_body(operation: &'static str, body: &Value) -> Result<Vec<u8>, FetchError> {
    serde_json::to_vec(body).map_err(|e| FetchError::decode(operation, e))
}

impl SearchApiClient {
    /// 🔎 Does the index exist? Absent is a perfectly fine answer.
    pub async fn index_exists(&self, index: &str) -> Result<bool, FetchError> {
        const OPERATION: &str = "index_exists";
        let cluster = self.cluster(OPERATION)?;
        let url = cluster.endpoint(OPERATION, index)?;
        let response = cluster
            .authorize(self.http().head(url))
            .send()
            .await
            .map_err(|e| FetchError::transport(OPERATION, e))?;
        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => Err(FetchError::status(
                OPERATION,
                status.as_u16(),
                format!("unexpected status while checking index '{}'", index),
            )),
        }
    }

    /// 🚪 Open a scroll over `index` and take the first page with us.
    pub async fn open_scroll(
        &self,
        index: &str,
        page_size: usize,
        keep_alive: &str,
    ) -> Result<(Cursor, Batch), FetchError> {
        const OPERATION: &str = "open_scroll";
        let cluster = self.cluster(OPERATION)?;
        let mut url = cluster.endpoint(OPERATION, &format!("{}/_search", index))?;
        url.query_pairs_mut()
            .append_pair("scroll", keep_alive)
            .append_pair("size", &page_size.to_string());
        let body = json_body(
            OPERATION,
            &json!({ "query": { "match_all": {} }, "sort": ["_doc"] }),
        )?;

        let response = cluster
            .authorize(self.http().post(url))
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| FetchError::transport(OPERATION, e))?;
        let parsed: ScrollResponse = read_json(OPERATION, response).await?;

        let Some(scroll_id) = parsed.scroll_id else {
            return Err(FetchError::status(
                OPERATION,
                200,
                format!("search on '{}' came back without a _scroll_id", index),
            ));
        };
        let total_hits = parsed.hits.total.as_ref().map(HitsTotal::value).unwrap_or(0);
        let batch = hits_to_batch(parsed.hits.hits);
        debug!(index, total_hits, first_page = batch.len(), "📜 scroll opened");

        let cursor = Cursor {
            index: index.to_string(),
            scroll_id,
            keep_alive: keep_alive.to_string(),
            total_hits,
            pages_served: 1,
        };
        Ok((cursor, batch))
    }

    /// ➡️ Next page. An empty batch means the cursor is exhausted.
    ///
    /// The cluster may hand back a fresh scroll id; the cursor keeps the latest one.
    pub async fn advance_scroll(&self, cursor: &mut Cursor) -> Result<Batch, FetchError> {
        const OPERATION: &str = "advance_scroll";
        let cluster = self.cluster(OPERATION)?;
        let url = cluster.endpoint(OPERATION, "_search/scroll")?;
        let body = json_body(
            OPERATION,
            &json!({ "scroll": cursor.keep_alive, "scroll_id": cursor.scroll_id }),
        )?;

        let response = cluster
            .authorize(self.http().post(url))
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| FetchError::transport(OPERATION, e))?;
        let parsed: ScrollResponse = read_json(OPERATION, response).await?;

        if let Some(fresh_id) = parsed.scroll_id {
            cursor.scroll_id = fresh_id;
        }
        cursor.pages_served += 1;
        let batch = hits_to_batch(parsed.hits.hits);
        trace!(index = %cursor.index, page = cursor.pages_served, docs = batch.len(), "📜 scroll advanced");
        Ok(batch)
    }

    /// 🧹 Release the server-side cursor. A 404 means it already expired, which is fine.
    pub async fn close_scroll(&self, cursor: Cursor) -> Result<(), FetchError> {
        const OPERATION: &str = "close_scroll";
        let cluster = self.cluster(OPERATION)?;
        let url = cluster.endpoint(OPERATION, "_search/scroll")?;
        let body = json_body(OPERATION, &json!({ "scroll_id": [cursor.scroll_id] }))?;

        let response = cluster
            .authorize(self.http().delete(url))
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| FetchError::transport(OPERATION, e))?;
        let status = response.status();
        if status.is_success() || status == StatusCode::NOT_FOUND {
            debug!(index = %cursor.index, pages = cursor.pages_served, "🧹 scroll closed");
            Ok(())
        } else {
            Err(FetchError::status(
                OPERATION,
                status.as_u16(),
                format!("could not clear scroll for '{}'", cursor.index),
            ))
        }
    }
}
