//! # 📡 THE CLUSTER BACKEND
//!
//! 🎬 COLD OPEN: INT. SERVER ROOM: 3:47 AM
//!
//! Three years of firewall logs live in one enormous index. Nobody remembers who
//! created it. Nobody wants to delete it. Everybody wants it split into days.
//!
//! 🚀 This module knows how to talk to the cluster: where it lives, how to
//! authenticate, and how to build an HTTP client that won't wait forever.
//! The bulk writing lives next door in `elasticsearch_sink`. The scroll cursor
//! lives with the search API client, because reading and writing are different jobs
//! even when they hit the same cluster.
//!
//! ⚠️ The singularity will arrive before the legacy index finishes being
//! "temporarily" kept around. 🦆

use std::time::Duration;

use reqwest::{RequestBuilder, Url};
use serde::Deserialize;

use crate::errors::FetchError;

pub mod elasticsearch_sink;

pub use elasticsearch_sink::ElasticsearchSink;

/// 🔧 Where the cluster lives and how to get past its bouncer.
#[derive(Debug, Deserialize, Clone)]
pub struct ClusterConfig {
    /// 📡 Root URL of the cluster. `http://localhost:9200` and friends.
    pub url: String,
    /// 🔒 Username. The bouncer at the club. Except the club is a database.
    #[serde(default)]
    pub username: Option<String>,
    /// 🔒 Password. "password123" is not a password. It is a confession.
    #[serde(default)]
    pub password: Option<String>,
    /// 🔒 API key: the velvet rope variant of authentication. Wins over basic auth.
    #[serde(default)]
    pub api_key: Option<String>,
    /// ⏱️ Whole-request timeout. Bulk pages can be meaty, so be generous.
    #[serde(default = "default_cluster_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_cluster_timeout_secs() -> u64 {
    60
}

impl ClusterConfig {
    /// 🔒 Auth priority: API key wins over basic auth. This is not a democracy.
    pub(crate) fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        if let Some(ref api_key) = self.api_key {
            request.header("Authorization", format!("ApiKey {}", api_key))
        } else if let Some(ref username) = self.username {
            request.basic_auth(username, self.password.as_ref())
        } else {
            request
        }
    }

    /// 🧭 `{url}/{path}` with the slash hygiene you didn't know you needed.
    pub(crate) fn endpoint(&self, operation: &'static str, path: &str) -> Result<Url, FetchError> {
        join_url(operation, &self.url, path)
    }
}

/// 🧭 Glue a base URL and a path together without `//` or a missing `/`.
///
/// One slash of difference. Infinite suffering of difference.
pub(crate) fn join_url(operation: &'static str, base: &str, path: &str) -> Result<Url, FetchError> {
    let raw = format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    Url::parse(&raw).map_err(|e| FetchError::InvalidUrl {
        operation,
        url: raw,
        reason: e.to_string(),
    })
}

/// 🔧 Build a `reqwest::Client` with a 10s connect timeout and the given total timeout.
///
/// If the cluster can't handshake in 10 seconds, it's not having a good time and neither are we.
pub(crate) fn build_http_client(timeout: Duration) -> Result<reqwest::Client, FetchError> {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .timeout(timeout)
        .build()
        .map_err(|e| FetchError::transport("build_http_client", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cluster(url: &str) -> ClusterConfig {
        ClusterConfig {
            url: url.to_string(),
            username: None,
            password: None,
            api_key: None,
            timeout_secs: default_cluster_timeout_secs(),
        }
    }

    #[test]
    fn the_one_where_slashes_are_negotiated_peacefully() {
        let with_trailing = cluster("http://localhost:9200/");
        let without = cluster("http://localhost:9200");
        let a = with_trailing.endpoint("test", "/_bulk").expect("valid url");
        let b = without.endpoint("test", "_bulk").expect("valid url");
        assert_eq!(a.as_str(), "http://localhost:9200/_bulk");
        assert_eq!(a, b);
    }

    #[test]
    fn the_one_where_garbage_urls_get_a_typed_error() {
        let broken = cluster("not a url at all");
        let err = broken.endpoint("ping", "/").expect_err("garbage in, error out");
        assert!(matches!(err, FetchError::InvalidUrl { operation: "ping", .. }));
    }

    #[test]
    fn the_one_where_the_api_key_outranks_the_password() {
        let mut config = cluster("http://localhost:9200");
        config.username = Some("elastic".into());
        config.password = Some("changeme".into());
        config.api_key = Some("c2VjcmV0".into());

        let client = reqwest::Client::new();
        let request = config
            .authorize(client.get("http://localhost:9200/"))
            .build()
            .expect("request builds");
        let auth = request
            .headers()
            .get("Authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        assert_eq!(auth.as_deref(), Some("ApiKey c2VjcmV0"));
    }
}
