// ai
//! 🛶 lfx: log ferry. Security events in, security events out.
//!
//! Two jobs, one crate:
//! - **ingest**: poll the aggregation store's search API on a cadence and publish
//!   every new event to a broker topic. Runs until cancelled.
//! - **migrate**: scroll legacy indices front to back and re-home every document into
//!   a daily index picked by its own timestamp. Runs to completion.
//!
//! 🧠 Knowledge graph:
//! - `run_ingest`: config → broker connect (fatal) → API ping (fatal) → `IngestionLoop::run`
//! - `run_migration`: config → cluster ping (fatal) → `ReindexMigrator::migrate_all`
//! - Startup failures are `anyhow` errors with context. Everything after startup is
//!   isolated per cycle / per page and shows up as logs and counters instead. 🦆

use std::time::Duration;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub mod app_config;
pub mod backends;
pub mod common;
pub mod errors;
pub mod index_namer;
pub mod ingestion;
pub mod migration;
mod progress;
pub mod scheduler;

use crate::app_config::AppConfig;
use crate::backends::{ElasticsearchSink, KafkaPublisher, PublisherBackend, SearchApiClient, SinkBackend};
use crate::ingestion::{IngestStats, IngestionLoop};
use crate::migration::{MigrationReport, ReindexMigrator};
use crate::scheduler::Scheduler;

/// 🔄 Poll → publish, forever (or until `shutdown` is cancelled).
///
/// 💀 Fails only at startup: missing config, unreachable broker, unreachable search API.
pub async fn run_ingest(app_config: AppConfig, shutdown: CancellationToken) -> anyhow::Result<IngestStats> {
    let api_config = app_config.search_api()?.clone();
    let broker_config = app_config.broker()?.clone();
    app_config
        .ingest
        .validate()
        .context("💀 The [ingest] section doesn't add up. Ingestion refuses to start.")?;

    // -- 🔌 broker first: ingesting into a void is worse than not ingesting at all
    let publisher = KafkaPublisher::connect(broker_config)
        .await
        .context("💀 The broker would not pick up. Ingestion refuses to start and silently drop every event.")?;

    let client = SearchApiClient::new(Some(api_config), None)
        .context("💀 Could not build the search API client.")?;
    client
        .ping_api()
        .await
        .context("💀 The search API is unreachable. Nothing to poll, nothing to ship.")?;

    let mut scheduler = Scheduler::with_cancellation(
        // -- ⏰ a zero period would make tokio's interval panic, one second is the floor
        Duration::from_secs(app_config.ingest.poll_interval_secs.max(1)),
        shutdown,
    );
    let mut ingestion = IngestionLoop::new(client, PublisherBackend::Kafka(publisher), &app_config.ingest);
    Ok(ingestion.run(&mut scheduler).await)
}

/// 🚚 Migrate every configured legacy index, sequentially.
///
/// 💀 Fails only at startup: missing config or an unreachable cluster. Per-index and
/// per-page trouble is in the report.
pub async fn run_migration(
    app_config: AppConfig,
    shutdown: CancellationToken,
) -> anyhow::Result<MigrationReport> {
    let cluster_config = app_config.cluster()?.clone();
    if app_config.migration.legacy_indices.is_empty() {
        warn!("🤷 no legacy indices configured (migration.legacy_indices), nothing to migrate");
        return Ok(MigrationReport::default());
    }

    let client = SearchApiClient::new(None, Some(cluster_config.clone()))
        .context("💀 Could not build the cluster client.")?;
    client
        .ping_cluster()
        .await
        .context("💀 The cluster is unreachable (or refused our credentials). Migration cannot start.")?;

    let sink = ElasticsearchSink::new(cluster_config).context("💀 Could not build the bulk sink.")?;
    info!(
        indices = app_config.migration.legacy_indices.len(),
        page_size = app_config.migration.page_size,
        "🚚 migration starting"
    );
    let mut migrator = ReindexMigrator::new(client, SinkBackend::Elasticsearch(sink), app_config.migration);
    Ok(migrator.migrate_all(&shutdown).await)
}
