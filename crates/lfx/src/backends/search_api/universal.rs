//! 🅰️ Generation A: `GET /api/search/universal/absolute`.
//!
//! The old reliable. Query-string params, basic auth, and every message wrapped in an
//! envelope `{ "message": {...}, "index": "..." }` that we peel off.

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::trace;

use crate::backends::elasticsearch::join_url;
use crate::backends::search_api::{GenerationOutcome, SearchApiConfig, read_json};
use crate::common::{Batch, LogEvent, TimeWindow};
use crate::errors::FetchError;

const OPERATION: &str = "universal_search";
const PATH: &str = "api/search/universal/absolute";

#[derive(Debug, Deserialize)]
struct UniversalResponse {
    #[serde(default)]
    messages: Vec<UniversalMessage>,
}

#[derive(Debug, Deserialize)]
struct UniversalMessage {
    message: Map<String, Value>,
}

pub(crate) async fn fetch(
    http: &reqwest::Client,
    api: &SearchApiConfig,
    window: &TimeWindow,
) -> Result<GenerationOutcome, FetchError> {
    let mut url = join_url(OPERATION, &api.url, PATH)?;
    {
        let mut query = url.query_pairs_mut();
        query
            .append_pair("query", &api.query)
            .append_pair("from", &window.from_iso())
            .append_pair("to", &window.to_iso())
            .append_pair("limit", &api.fetch_limit.to_string());
        if !api.fields.is_empty() {
            query.append_pair("fields", &api.fields.join(","));
        }
        if let Some(ref stream_id) = api.stream_id {
            query.append_pair("filter", &format!("streams:{}", stream_id));
        }
    }
    trace!(%url, "🅰️ asking the universal search");

    let response = api
        .authorize(http.get(url))
        .header("Accept", "application/json")
        .send()
        .await
        .map_err(|e| FetchError::transport(OPERATION, e))?;

    if response.status() == reqwest::StatusCode::NOT_FOUND {
        return Ok(GenerationOutcome::UnsupportedVersion);
    }

    let parsed: UniversalResponse = read_json(OPERATION, response).await?;
    let events = parsed
        .messages
        .into_iter()
        .map(|envelope| LogEvent::from_message(envelope.message))
        .collect();
    Ok(GenerationOutcome::Answered(Batch::new(events)))
}
