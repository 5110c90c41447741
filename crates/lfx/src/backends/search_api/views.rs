//! 🅱️ Generation B: `POST /api/views/search/messages`.
//!
//! The newer door. JSON body in, flat messages out. It also insists on an
//! `X-Requested-By` header, otherwise it assumes we're a drive-by browser and says no.

use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::trace;

use crate::backends::elasticsearch::join_url;
use crate::backends::search_api::{GenerationOutcome, SearchApiConfig, read_json};
use crate::common::{Batch, LogEvent, TimeWindow};
use crate::errors::FetchError;

const OPERATION: &str = "views_search";
const PATH: &str = "api/views/search/messages";

#[derive(Debug, Deserialize)]
struct ViewsResponse {
    #[serde(default)]
    messages: Vec<Map<String, Value>>,
}

/// 📝 The request body. Streams only appear when we have one to filter on.
pub(crate) fn request_body(api: &SearchApiConfig, window: &TimeWindow) -> Value {
    let mut body = json!({
        "timerange": {
            "type": "absolute",
            "from": window.from_iso(),
            "to": window.to_iso(),
        },
        "query": {
            "type": "elasticsearch",
            "query_string": api.query,
        },
        "limit": api.fetch_limit,
    });
    if let (Some(stream_id), Some(obj)) = (api.stream_id.as_ref(), body.as_object_mut()) {
        obj.insert("streams".to_string(), json!([stream_id]));
    }
    body
}

pub(crate) async fn fetch(
    http: &reqwest::Client,
    api: &SearchApiConfig,
    window: &TimeWindow,
) -> Result<GenerationOutcome, FetchError> {
    let url = join_url(OPERATION, &api.url, PATH)?;
    let body = serde_json::to_vec(&request_body(api, window))
        .map_err(|e| FetchError::decode(OPERATION, e))?;
    trace!(%url, "🅱️ asking the views search");

    let response = api
        .authorize(http.post(url))
        .header(CONTENT_TYPE, "application/json")
        .header("Accept", "application/json")
        .header("X-Requested-By", "lfx")
        .body(body)
        .send()
        .await
        .map_err(|e| FetchError::transport(OPERATION, e))?;

    if response.status() == reqwest::StatusCode::NOT_FOUND {
        return Ok(GenerationOutcome::UnsupportedVersion);
    }

    let parsed: ViewsResponse = read_json(OPERATION, response).await?;
    let events = parsed
        .messages
        .into_iter()
        .map(LogEvent::from_message)
        .collect();
    Ok(GenerationOutcome::Answered(Batch::new(events)))
}
