// ai
//! 🔍 The search API client: our window into the aggregation store.
//!
//! 🎬 *[the year is unknown. the server version is unknown. the endpoint is... negotiable.]*
//!
//! The store comes in two generations, and nobody tells us which one we're talking to:
//! - **Generation A** (`universal`): `GET /api/search/universal/absolute`, query-string params.
//! - **Generation B** (`views`): `POST /api/views/search/messages`, JSON body, CSRF-ish header.
//!
//! We always ask A first. A 404 from A is not an error, it's a hint: the result is
//! `GenerationOutcome::UnsupportedVersion` and we ask B. Anything else that goes wrong
//! (5xx, timeouts, garbage bodies) is a real `FetchError` and nobody retries it here.
//!
//! The same client also owns the cluster scroll (see `scroll`), because migration reads
//! from the same store, just from the back door.
//!
//! 🧠 Knowledge graph:
//! - `fetch_recent(window)` → A → (404?) → B → `Batch`
//! - `open_scroll` / `advance_scroll` / `close_scroll` / `index_exists` → cluster
//! - `ping_api` / `ping_cluster` → startup connectivity checks, fatal when they fail 🦆

use std::time::Duration;

use reqwest::Response;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::backends::elasticsearch::{ClusterConfig, build_http_client};
use crate::common::{Batch, TimeWindow};
use crate::errors::FetchError;

pub mod scroll;
pub mod universal;
pub mod views;

pub use scroll::Cursor;

/// 🔧 How to reach the search API and what to ask it.
#[derive(Debug, Deserialize, Clone)]
pub struct SearchApiConfig {
    /// 📡 Base URL, e.g. `http://graylog:9000`. The `/api/...` paths get glued on.
    pub url: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// 🌊 Restrict results to one stream. `None` = every stream the user can see.
    #[serde(default)]
    pub stream_id: Option<String>,
    /// 🔎 Query string. `*` means "everything, please".
    #[serde(default = "default_query")]
    pub query: String,
    /// 📋 Fields to ask for (Generation A only).
    #[serde(default = "default_fields")]
    pub fields: Vec<String>,
    /// 📏 Max messages per fetch. A window holding more than this loses the overflow:
    /// the server picks which ones (Generation A hands back the newest first).
    #[serde(default = "default_fetch_limit")]
    pub fetch_limit: usize,
    #[serde(default = "default_api_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_query() -> String {
    "*".to_string()
}

/// 📋 The columns a security analyst actually looks at.
fn default_fields() -> Vec<String> {
    [
        "timestamp",
        "source",
        "level",
        "message",
        "src_ip",
        "dest_ip",
        "protocol",
        "rule_level",
        "rule_description",
        "event_type",
        "agent_name",
        "manager_name",
    ]
    .iter()
    .map(|field| field.to_string())
    .collect()
}

fn default_fetch_limit() -> usize {
    100
}

fn default_api_timeout_secs() -> u64 {
    30
}

impl SearchApiConfig {
    /// 🔒 Basic auth if we have a username, nothing if we don't.
    pub(crate) fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.username {
            Some(ref username) => request.basic_auth(username, self.password.as_ref()),
            None => request,
        }
    }
}

/// 🏷️ Which API generation produced (or refused) a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiGeneration {
    Universal,
    Views,
}

/// 🎯 The tagged answer of one generation: either a batch, or "I don't exist on this server".
///
/// `UnsupportedVersion` is a fallback signal, never a failure. Only `fetch_recent` decides
/// what to do with it.
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationOutcome {
    Answered(Batch),
    UnsupportedVersion,
}

/// 🔍 One client, two doors: the search API and the cluster behind it.
#[derive(Debug, Clone)]
pub struct SearchApiClient {
    http: reqwest::Client,
    api: Option<SearchApiConfig>,
    cluster: Option<ClusterConfig>,
}

impl SearchApiClient {
    /// 🏗️ Build a client. Either side may be absent; operations on an absent side return
    /// `FetchError::NotConfigured` instead of panicking in someone's face.
    pub fn new(
        api: Option<SearchApiConfig>,
        cluster: Option<ClusterConfig>,
    ) -> Result<Self, FetchError> {
        // -- ⏱️ the longest configured timeout wins, both sides share one connection pool
        let timeout_secs = api
            .iter()
            .map(|a| a.timeout_secs)
            .chain(cluster.iter().map(|c| c.timeout_secs))
            .max()
            .unwrap_or_else(default_api_timeout_secs);
        let http = build_http_client(Duration::from_secs(timeout_secs))?;
        Ok(Self { http, api, cluster })
    }

    pub(crate) fn api(&self, operation: &'static str) -> Result<&SearchApiConfig, FetchError> {
        self.api.as_ref().ok_or(FetchError::NotConfigured {
            operation,
            what: "search_api",
        })
    }

    pub(crate) fn cluster(&self, operation: &'static str) -> Result<&ClusterConfig, FetchError> {
        self.cluster.as_ref().ok_or(FetchError::NotConfigured {
            operation,
            what: "cluster",
        })
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// 📡 Everything the store saw in `window`, from whichever generation answers.
    ///
    /// A 404 from Generation A falls through to Generation B. A 404 from B too means
    /// neither endpoint exists, which IS an error.
    ///
    /// A batch that comes back exactly `fetch_limit` long was probably truncated, and the
    /// server decided which events got cut. That gets a warning, every time.
    pub async fn fetch_recent(&self, window: &TimeWindow) -> Result<Batch, FetchError> {
        let api = self.api("fetch_recent")?;

        match universal::fetch(&self.http, api, window).await? {
            GenerationOutcome::Answered(batch) => {
                debug!(generation = ?ApiGeneration::Universal, events = batch.len(), "📡 search API answered");
                warn_if_saturated(api, window, &batch);
                return Ok(batch);
            }
            GenerationOutcome::UnsupportedVersion => {
                debug!("🔄 universal search is a 404 on this server, trying the views API");
            }
        }

        match views::fetch(&self.http, api, window).await? {
            GenerationOutcome::Answered(batch) => {
                debug!(generation = ?ApiGeneration::Views, events = batch.len(), "📡 search API answered");
                warn_if_saturated(api, window, &batch);
                Ok(batch)
            }
            GenerationOutcome::UnsupportedVersion => Err(FetchError::status(
                "fetch_recent",
                404,
                "neither the universal nor the views search endpoint exists on this server"
                    .to_string(),
            )),
        }
    }

    /// 👋 "Hello? Is this thing on?" Only a transport failure counts as "no".
    pub async fn ping_api(&self) -> Result<(), FetchError> {
        let api = self.api("ping_api")?;
        let url = crate::backends::elasticsearch::join_url("ping_api", &api.url, "api/")?;
        let response = api
            .authorize(self.http.get(url))
            .send()
            .await
            .map_err(|e| FetchError::transport("ping_api", e))?;
        let status = response.status();
        if status.is_success() {
            info!(url = %api.url, "✅ search API is home");
        } else {
            warn!(url = %api.url, status = status.as_u16(), "⚠️ search API answered the ping with a non-2xx, carrying on");
        }
        Ok(())
    }

    /// 👋 The cluster has to actually say yes. A 401 here would turn into thousands of failed pages later.
    pub async fn ping_cluster(&self) -> Result<(), FetchError> {
        let cluster = self.cluster("ping_cluster")?;
        let url = cluster.endpoint("ping_cluster", "")?;
        let response = cluster
            .authorize(self.http.get(url))
            .send()
            .await
            .map_err(|e| FetchError::transport("ping_cluster", e))?;
        let _: serde_json::Value = read_json("ping_cluster", response).await?;
        info!(url = %cluster.url, "✅ cluster is home");
        Ok(())
    }
}

/// 🪣 A full bucket means some events may have spilled. Returns whether it warned.
pub(crate) fn warn_if_saturated(api: &SearchApiConfig, window: &TimeWindow, batch: &Batch) -> bool {
    let saturated = api.fetch_limit > 0 && batch.len() >= api.fetch_limit;
    if saturated {
        warn!(
            fetch_limit = api.fetch_limit,
            from = %window.from_iso(),
            to = %window.to_iso(),
            "⚠️ the batch hit fetch_limit, events beyond it in this window were NOT fetched. \
             Raise search_api.fetch_limit or poll more often."
        );
    }
    saturated
}

/// 📬 Status check, then bytes, then JSON. Non-2xx becomes `FetchError::Status` with the body attached.
pub(crate) async fn read_json<T: DeserializeOwned>(
    operation: &'static str,
    response: Response,
) -> Result<T, FetchError> {
    let status = response.status();
    let bytes = response
        .bytes()
        .await
        .map_err(|e| FetchError::transport(operation, e))?;
    if !status.is_success() {
        return Err(FetchError::status(
            operation,
            status.as_u16(),
            String::from_utf8_lossy(&bytes).into_owned(),
        ));
    }
    serde_json::from_slice(&bytes).map_err(|e| FetchError::decode(operation, e))
}
