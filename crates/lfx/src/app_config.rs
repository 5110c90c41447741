//! 🔧 App Configuration: the sacred TOML-and-env-to-struct pipeline.
//!
//! 📡 "Config not found: We looked everywhere. Under the couch. Behind the fridge.
//! In the junk drawer. Nothing." (every developer at 3am) 🦆
//!
//! 🏗️ Powered by Figment. Env vars are `LFX_` prefixed and nest with a double
//! underscore: `LFX_BROKER__TOPIC=security-events` sets `broker.topic`.
//!
//! Every section is optional at parse time. `ingest` needs `search_api` + `broker`,
//! `migrate` needs `cluster`. Each mode checks for what it needs, so one config file
//! can serve both without inventing a fake broker for the migration box.

use std::path::Path;

use anyhow::Context;
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::Deserialize;
use tracing::info;

use crate::backends::{ClusterConfig, KafkaPublisherConfig, SearchApiConfig};
use crate::ingestion::IngestConfig;
use crate::migration::MigrationConfig;

/// 🏷️ Every env var we read starts with this.
pub const ENV_PREFIX: &str = "LFX_";

/// 📦 One struct to rule them all, one struct to find them,
/// one struct to bring them all, and in the Figment bind them.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    /// 🔍 The aggregation store's search API (ingestion reads from here).
    #[serde(default)]
    pub search_api: Option<SearchApiConfig>,
    /// 🗄️ The cluster behind it (migration scrolls and bulk-writes here).
    #[serde(default)]
    pub cluster: Option<ClusterConfig>,
    /// 📨 Where ingested batches go.
    #[serde(default)]
    pub broker: Option<KafkaPublisherConfig>,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub migration: MigrationConfig,
}

impl AppConfig {
    pub fn search_api(&self) -> anyhow::Result<&SearchApiConfig> {
        self.search_api
            .as_ref()
            .context("💀 No [search_api] section (or LFX_SEARCH_API__URL). Ingestion has nothing to poll.")
    }

    pub fn cluster(&self) -> anyhow::Result<&ClusterConfig> {
        self.cluster
            .as_ref()
            .context("💀 No [cluster] section (or LFX_CLUSTER__URL). Migration has nowhere to scroll from.")
    }

    pub fn broker(&self) -> anyhow::Result<&KafkaPublisherConfig> {
        self.broker.as_ref().context(
            "💀 No [broker] section (or LFX_BROKER__BOOTSTRAP_SERVERS + LFX_BROKER__TOPIC). Ingestion has nowhere to publish.",
        )
    }
}

/// 🚀 Load the config: env vars, plus a TOML file if one was given. TOML wins on conflicts.
///
/// 💀 Returns an error if the config is unparseable, with the file path in the message.
pub fn load_config(config_file_name: Option<&Path>) -> anyhow::Result<AppConfig> {
    info!(
        file = %config_file_name.map(|p| p.display().to_string()).unwrap_or_default(),
        "🔧 loading configuration"
    );

    let config = Figment::new().merge(Env::prefixed(ENV_PREFIX).split("__"));
    let config = match config_file_name {
        Some(file_name) => config.merge(Toml::file(file_name)),
        None => config,
    };

    let context_msg = match config_file_name {
        Some(path) => format!(
            "💀 Failed to parse configuration from file '{}' and environment variables ({}*). \
             The file exists in our hearts, but apparently not in valid TOML.",
            path.display(),
            ENV_PREFIX
        ),
        None => format!(
            "💀 Failed to parse configuration from environment variables ({}*). \
             No file was provided, this one's all on the environment. Classic.",
            ENV_PREFIX
        ),
    };

    config.extract().context(context_msg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_test_config(contents: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .expect("💀 the filesystem said 'new phone who dis'");
        file.write_all(contents.as_bytes())
            .expect("💀 could not write the test config");
        file
    }

    #[test]
    fn the_one_where_a_full_config_lands_in_every_section() {
        let file = write_test_config(
            r#"
            [search_api]
            url = "http://graylog:9000"
            username = "admin"
            password = "hunter2"
            stream_id = "000000000000000000000001"

            [cluster]
            url = "http://elasticsearch:9200"
            api_key = "c2VjcmV0"

            [broker]
            bootstrap_servers = "kafka:9092"
            topic = "security-events"

            [broker.properties]
            "security.protocol" = "SSL"

            [ingest]
            poll_interval_secs = 5
            window_secs = 30

            [migration]
            legacy_indices = ["graylog_0", "graylog_1"]
            page_size = 500
            "#,
        );

        let config = load_config(Some(file.path())).expect("💀 a valid config should parse");
        let api = config.search_api().expect("search api present");
        assert_eq!(api.url, "http://graylog:9000");
        assert_eq!(api.query, "*");
        assert_eq!(api.fetch_limit, 100);
        assert_eq!(api.stream_id.as_deref(), Some("000000000000000000000001"));

        assert_eq!(config.cluster().expect("cluster").api_key.as_deref(), Some("c2VjcmV0"));

        let broker = config.broker().expect("broker");
        assert_eq!(broker.topic, "security-events");
        assert_eq!(broker.client_id, "lfx");
        assert_eq!(broker.properties.get("security.protocol").map(String::as_str), Some("SSL"));

        assert_eq!(config.ingest.poll_interval_secs, 5);
        assert!(config.ingest.dedupe);
        assert_eq!(config.migration.legacy_indices, vec!["graylog_0", "graylog_1"]);
        assert_eq!(config.migration.page_size, 500);
        assert_eq!(config.migration.scroll_keep_alive, "1m");
        assert_eq!(config.migration.index_prefix, "logs");
    }

    #[test]
    fn the_one_where_a_migration_box_needs_no_broker() {
        let file = write_test_config(
            r#"
            [cluster]
            url = "http://elasticsearch:9200"
            "#,
        );
        let config = load_config(Some(file.path())).expect("💀 cluster-only config should parse");
        assert!(config.cluster().is_ok());
        assert!(config.broker().is_err());
        assert!(config.search_api().is_err());
        assert_eq!(config.ingest.poll_interval_secs, 10);
        assert_eq!(config.migration.page_size, 1_000);
    }

    #[test]
    fn the_one_where_broken_toml_names_the_file() {
        let file = write_test_config("[cluster\nurl = ");
        let err = load_config(Some(file.path())).expect_err("💀 broken TOML must not parse");
        assert!(format!("{err:#}").contains(&file.path().display().to_string()));
    }
}
