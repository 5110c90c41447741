//! 📨 The broker backend. Batches go in one side, a topic comes out the other.
//!
//! Config lives here, the producer lives in `kafka_publisher`. Same split as the
//! cluster backend, because symmetry is the only joy left at 3am. 🦆

use std::collections::BTreeMap;

use rdkafka::ClientConfig;
use serde::Deserialize;

pub mod kafka_publisher;

pub use kafka_publisher::KafkaPublisher;

/// 🔧 Where the broker lives and how patient to be with it.
#[derive(Debug, Deserialize, Clone)]
pub struct KafkaPublisherConfig {
    /// 📡 `host:port[,host:port...]`
    pub bootstrap_servers: String,
    /// 🏷️ Every batch lands on this one topic.
    pub topic: String,
    #[serde(default = "default_client_id")]
    pub client_id: String,
    /// ⏱️ How long librdkafka may keep trying to deliver one message before giving up.
    #[serde(default = "default_message_timeout_ms")]
    pub message_timeout_ms: u64,
    /// ⏱️ How long the startup metadata probe may take before we call the broker unreachable.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// 🧰 Raw librdkafka settings, applied last. TLS, SASL, whatever your ops team dreams up.
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

fn default_client_id() -> String {
    "lfx".to_string()
}

fn default_message_timeout_ms() -> u64 {
    5_000
}

fn default_connect_timeout_secs() -> u64 {
    10
}

impl KafkaPublisherConfig {
    /// 🏗️ Render the librdkafka client config.
    pub(crate) fn client_config(&self) -> ClientConfig {
        let mut client_config = ClientConfig::new();
        client_config
            .set("bootstrap.servers", &self.bootstrap_servers)
            .set("client.id", &self.client_id)
            .set("compression.type", "lz4")
            .set("message.timeout.ms", self.message_timeout_ms.to_string())
            .set("queue.buffering.max.messages", "100000")
            .set("queue.buffering.max.kbytes", "1048576")
            .set("batch.num.messages", "10000");
        // -- 🧰 user overrides win, they know their cluster better than we do
        for (key, value) in &self.properties {
            client_config.set(key, value);
        }
        client_config
    }
}
