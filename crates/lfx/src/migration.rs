// ai
//! 🚚 The migrator: moving three years of firewall logs into day-sized apartments.
//!
//! 🎬 COLD OPEN: INT. DATA CENTER: A VERY LONG NIGHT
//!
//! One enormous legacy index. Millions of events. Every one of them has a timestamp and
//! a dream: to live in `logs-YYYY-MM-DD` like a civilized document. The migrator scrolls
//! the legacy index page by page, stages every doc into the daily index its timestamp
//! picks, and bulk-writes the page before asking for the next one. No whole-index buffering.
//! Memory stays flat. The cluster stays mostly calm.
//!
//! 🧠 Knowledge graph:
//! - Per index: `Init → Scrolling → Draining → Closed`.
//! - Page boundary = error boundary. A failed bulk page is logged, counted as processed,
//!   and the scroll moves on. It is NOT written. That log line is a data-loss signal.
//! - A scroll failure ends the index early (we can't skip pages we never received), but the
//!   cursor is still closed. The cursor is ALWAYS closed. Leaking scroll contexts is rude.
//! - Writes key on the original `_id`, so a re-run overwrites instead of duplicating.
//!   No checkpoint file: a crash means starting over, and starting over is safe.
//! - Cancellation is checked between pages.
//!
//! 🦆 The duck has migrated south for the winter. Sequentially. One index at a time.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::backends::{BulkOp, BulkSink, Cursor, SearchApiClient, SinkBackend};
use crate::common::Batch;
use crate::errors::FetchError;
use crate::index_namer::{DEFAULT_INDEX_PREFIX, DateIndexNamer};
use crate::progress::ProgressMetrics;

/// 🔧 What to migrate and how big each bite is.
#[derive(Debug, Deserialize, Clone)]
pub struct MigrationConfig {
    /// 📜 Legacy index names, migrated in this order.
    #[serde(default)]
    pub legacy_indices: Vec<String>,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// ⏳ How long the cluster keeps the scroll context alive between pages.
    #[serde(default = "default_scroll_keep_alive")]
    pub scroll_keep_alive: String,
    #[serde(default = "default_index_prefix")]
    pub index_prefix: String,
    /// 📊 Draw the progress bar. Turn off for log-only environments.
    #[serde(default = "default_show_progress")]
    pub show_progress: bool,
}

fn default_page_size() -> usize {
    1_000
}

fn default_scroll_keep_alive() -> String {
    "1m".to_string()
}

fn default_index_prefix() -> String {
    DEFAULT_INDEX_PREFIX.to_string()
}

fn default_show_progress() -> bool {
    true
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            legacy_indices: Vec::new(),
            page_size: default_page_size(),
            scroll_keep_alive: default_scroll_keep_alive(),
            index_prefix: default_index_prefix(),
            show_progress: default_show_progress(),
        }
    }
}

/// 🚦 Lifecycle of one index's migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationState {
    Init,
    Scrolling,
    Draining,
    Closed,
}

/// 📊 Per-index counters. Only ever go up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MigrationProgress {
    /// 📏 What the cluster said the index holds.
    pub total_hits: u64,
    /// 📄 Docs pulled off the scroll and handed to the sink, failed pages included.
    pub processed: u64,
    /// ✅ Docs the sink confirmed.
    pub written: u64,
    /// 🪪 Hits without an `_id`. Processed, never written.
    pub skipped: u64,
    pub pages: u64,
    pub failed_pages: u64,
}

/// 🏁 How one index ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexOutcome {
    /// 🤷 Index wasn't there. Not an error, just nothing to do.
    Skipped,
    /// ✅ Scrolled to the end.
    Completed(MigrationProgress),
    /// 🛑 Stopped between pages because someone asked nicely.
    Cancelled(MigrationProgress),
    /// 💀 The scroll itself broke. Whatever got written stays written.
    Aborted {
        progress: MigrationProgress,
        reason: String,
    },
}

impl IndexOutcome {
    pub fn progress(&self) -> Option<&MigrationProgress> {
        match self {
            IndexOutcome::Skipped => None,
            IndexOutcome::Completed(progress) | IndexOutcome::Cancelled(progress) => Some(progress),
            IndexOutcome::Aborted { progress, .. } => Some(progress),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            IndexOutcome::Skipped => "skipped",
            IndexOutcome::Completed(_) => "completed",
            IndexOutcome::Cancelled(_) => "cancelled",
            IndexOutcome::Aborted { .. } => "aborted",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexReport {
    pub index: String,
    pub outcome: IndexOutcome,
}

/// 📋 The whole run, index by index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub indices: Vec<IndexReport>,
}

impl MigrationReport {
    /// 💀 True when any index's scroll broke mid-way.
    pub fn has_aborted(&self) -> bool {
        self.indices
            .iter()
            .any(|report| matches!(report.outcome, IndexOutcome::Aborted { .. }))
    }

    pub fn total_failed_pages(&self) -> u64 {
        self.totals().failed_pages
    }

    /// ➕ Every index's counters, summed. Skipped indices add nothing.
    pub fn totals(&self) -> MigrationProgress {
        self.indices
            .iter()
            .filter_map(|report| report.outcome.progress())
            .fold(MigrationProgress::default(), |acc, p| MigrationProgress {
                total_hits: acc.total_hits + p.total_hits,
                processed: acc.processed + p.processed,
                written: acc.written + p.written,
                skipped: acc.skipped + p.skipped,
                pages: acc.pages + p.pages,
                failed_pages: acc.failed_pages + p.failed_pages,
            })
    }
}

/// 🧭 How the drain loop ended, when it ended without a scroll error.
enum Drained {
    Exhausted,
    Cancelled,
}

/// 🚚 Scroll → stage → bulk write, one legacy index at a time.
#[derive(Debug)]
pub struct ReindexMigrator {
    client: SearchApiClient,
    sink: SinkBackend,
    namer: DateIndexNamer,
    config: MigrationConfig,
    state: MigrationState,
}

impl ReindexMigrator {
    pub fn new(client: SearchApiClient, sink: SinkBackend, config: MigrationConfig) -> Self {
        Self {
            client,
            sink,
            namer: DateIndexNamer::new(config.index_prefix.clone()),
            config,
            state: MigrationState::Init,
        }
    }

    pub fn state(&self) -> MigrationState {
        self.state
    }

    /// 🔁 Every configured index, in order. Stops early only on cancellation.
    pub async fn migrate_all(&mut self, cancel: &CancellationToken) -> MigrationReport {
        let indices = self.config.legacy_indices.clone();
        let mut report = MigrationReport::default();
        for index in indices {
            if cancel.is_cancelled() {
                warn!(index = %index, "🛑 cancelled before this index started");
                break;
            }
            let outcome = self.migrate_index(&index, cancel).await;
            report.indices.push(IndexReport { index, outcome });
        }
        report
    }

    /// 🚚 One index, start to finish (or to cancellation).
    pub async fn migrate_index(&mut self, index: &str, cancel: &CancellationToken) -> IndexOutcome {
        self.transition(index, MigrationState::Init);
        match self.client.index_exists(index).await {
            Ok(true) => {}
            Ok(false) => {
                warn!(index, "🤷 legacy index does not exist, skipping");
                self.transition(index, MigrationState::Closed);
                return IndexOutcome::Skipped;
            }
            Err(e) => {
                error!(index, operation = "index_exists", error = %e, "💀 could not check the index, skipping it");
                self.transition(index, MigrationState::Closed);
                return IndexOutcome::Aborted {
                    progress: MigrationProgress::default(),
                    reason: e.to_string(),
                };
            }
        }

        let opened = self
            .client
            .open_scroll(index, self.config.page_size, &self.config.scroll_keep_alive)
            .await;
        let (mut cursor, first_page) = match opened {
            Ok(opened) => opened,
            Err(e) => {
                error!(index, operation = "open_scroll", error = %e, "💀 could not open a scroll");
                self.transition(index, MigrationState::Closed);
                return IndexOutcome::Aborted {
                    progress: MigrationProgress::default(),
                    reason: e.to_string(),
                };
            }
        };
        self.transition(index, MigrationState::Scrolling);

        let mut progress = MigrationProgress {
            total_hits: cursor.total_hits(),
            ..MigrationProgress::default()
        };
        info!(index, total_hits = progress.total_hits, "🚚 migrating");
        let mut metrics =
            ProgressMetrics::new(index.to_string(), progress.total_hits, self.config.show_progress);

        let drained = self
            .drain(&mut cursor, first_page, &mut progress, &mut metrics, cancel)
            .await;

        // -- 🧹 the cursor gets closed on every path out of here
        if let Err(e) = self.client.close_scroll(cursor).await {
            warn!(index, operation = "close_scroll", error = %e, "⚠️ could not release the scroll, it will expire on its own");
        }
        self.transition(index, MigrationState::Closed);
        metrics.finish();

        match drained {
            Ok(Drained::Exhausted) => {
                if progress.processed != progress.total_hits {
                    warn!(index, processed = progress.processed, total_hits = progress.total_hits, "⚠️ the scroll ended but the counts disagree");
                }
                info!(
                    index,
                    processed = progress.processed,
                    written = progress.written,
                    skipped = progress.skipped,
                    failed_pages = progress.failed_pages,
                    "✅ index migrated"
                );
                IndexOutcome::Completed(progress)
            }
            Ok(Drained::Cancelled) => {
                warn!(index, processed = progress.processed, "🛑 migration cancelled between pages");
                IndexOutcome::Cancelled(progress)
            }
            Err(e) => {
                error!(index, operation = "advance_scroll", processed = progress.processed, error = %e, "💀 scroll broke, abandoning the rest of this index");
                IndexOutcome::Aborted {
                    progress,
                    reason: e.to_string(),
                }
            }
        }
    }

    /// ➡️ Flush the page in hand, then (unless cancelled) fetch the next. Empty page = done.
    async fn drain(
        &mut self,
        cursor: &mut Cursor,
        first_page: Batch,
        progress: &mut MigrationProgress,
        metrics: &mut ProgressMetrics,
        cancel: &CancellationToken,
    ) -> Result<Drained, FetchError> {
        let mut page = first_page;
        loop {
            if page.is_empty() {
                self.transition(cursor.index(), MigrationState::Draining);
                return Ok(Drained::Exhausted);
            }
            self.flush_page(cursor.index(), page, progress, metrics, Utc::now())
                .await;
            if cancel.is_cancelled() {
                return Ok(Drained::Cancelled);
            }
            page = self.client.advance_scroll(cursor).await?;
        }
    }

    /// 📦 Stage one page and hand it to the sink. Failures are logged, never raised.
    ///
    /// Every raw hit counts toward `processed`, staged or not, so `processed` keeps
    /// tracking `total_hits`.
    async fn flush_page(
        &mut self,
        index: &str,
        page: Batch,
        progress: &mut MigrationProgress,
        metrics: &mut ProgressMetrics,
        now: DateTime<Utc>,
    ) {
        let docs = page.len() as u64;
        let page_number = progress.pages + 1;
        let ops = self.stage(page, now);
        let skipped = docs - ops.len() as u64;
        if skipped > 0 {
            warn!(index, page = page_number, skipped, "⚠️ hits without an _id cannot be written idempotently, skipping them");
            progress.skipped += skipped;
        }

        let failed = if ops.is_empty() {
            false
        } else {
            self.write_page(index, page_number, &ops, progress).await
        };

        progress.processed += docs;
        progress.pages += 1;
        if failed {
            progress.failed_pages += 1;
        }
        metrics.record_page(docs, failed);
    }

    /// 📡 One bulk call. Returns `true` when the page (or part of it) did not land.
    async fn write_page(
        &mut self,
        index: &str,
        page_number: u64,
        ops: &[BulkOp],
        progress: &mut MigrationProgress,
    ) -> bool {
        let docs = ops.len();
        match self.sink.write(ops).await {
            Ok(summary) => {
                progress.written += summary.written as u64;
                debug!(index, page = page_number, docs, "📦 page written");
                false
            }
            Err(e) => {
                error!(
                    index,
                    page = page_number,
                    docs,
                    failed_docs = e.failed_docs(),
                    operation = "bulk_write",
                    error = %e,
                    "💀 bulk page failed, these docs were NOT written, moving on"
                );
                if let crate::errors::BulkWriteError::PartialFailure { failed, total, .. } = e {
                    progress.written += total.saturating_sub(failed) as u64;
                }
                true
            }
        }
    }

    /// 🏷️ Each event goes to the daily index its own timestamp picks. No timestamp? Then today.
    ///
    /// Events without an id are left out: without a key the write can't be idempotent.
    pub(crate) fn stage(&self, page: Batch, now: DateTime<Utc>) -> Vec<BulkOp> {
        page.into_iter()
            .filter_map(|event| {
                let target = self.namer.name_for(&event.timestamp().unwrap_or(now));
                event.id.map(|id| BulkOp {
                    index: target,
                    id,
                    source: event.document,
                })
            })
            .collect()
    }

    fn transition(&mut self, index: &str, next: MigrationState) {
        if self.state != next {
            debug!(index, from = ?self.state, to = ?next, "🚦 migration state change");
            self.state = next;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::InMemorySink;
    use crate::backends::search_api::test_support::cluster_config;
    use crate::common::LogEvent;
    use chrono::{TimeDelta, TimeZone};
    use serde_json::{Value, json};
    use std::collections::{BTreeMap, HashSet};
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const LEGACY: &str = "graylog_legacy";

    /// 🧪 2,500 docs, evenly spread from 2024-01-01T23:00Z to just before 2024-01-02T01:00Z.
    fn legacy_docs() -> Vec<Value> {
        let start = Utc
            .with_ymd_and_hms(2024, 1, 1, 23, 0, 0)
            .single()
            .expect("valid date");
        (0..2_500i64)
            .map(|i| {
                let at = start + TimeDelta::milliseconds(i * 2_880);
                json!({
                    "_id": format!("doc-{i}"),
                    "_source": {
                        "timestamp": at.format("%Y-%m-%d %H:%M:%S%.3f").to_string(),
                        "message": format!("event number {i}"),
                    }
                })
            })
            .collect()
    }

    fn page_body(scroll_id: &str, hits: &[Value]) -> Value {
        json!({
            "_scroll_id": scroll_id,
            "hits": { "total": { "value": 2_500, "relation": "eq" }, "hits": hits }
        })
    }

    /// 🧪 A cluster that serves the legacy index as pages of 1000/1000/500, then nothing.
    async fn legacy_cluster() -> MockServer {
        let server = MockServer::start().await;
        let docs = legacy_docs();

        Mock::given(method("HEAD"))
            .and(path(format!("/{LEGACY}")))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("HEAD"))
            .and(path("/ghost_index"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(format!("/{LEGACY}/_search")))
            .respond_with(ResponseTemplate::new(200).set_body_json(page_body("s1", &docs[0..1_000])))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/_search/scroll"))
            .and(body_partial_json(json!({"scroll_id": "s1"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(page_body("s2", &docs[1_000..2_000])))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/_search/scroll"))
            .and(body_partial_json(json!({"scroll_id": "s2"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(page_body("s3", &docs[2_000..])))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/_search/scroll"))
            .and(body_partial_json(json!({"scroll_id": "s3"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(page_body("s3", &[])))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/_search/scroll"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"succeeded": true})))
            .mount(&server)
            .await;
        server
    }

    fn migrator(server: &MockServer, sink: InMemorySink, indices: &[&str]) -> ReindexMigrator {
        let client = SearchApiClient::new(None, Some(cluster_config(&server.uri()))).expect("client");
        let config = MigrationConfig {
            legacy_indices: indices.iter().map(|i| i.to_string()).collect(),
            show_progress: false,
            ..MigrationConfig::default()
        };
        ReindexMigrator::new(client, SinkBackend::InMemory(sink), config)
    }

    async fn delete_calls(server: &MockServer) -> usize {
        server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|r| r.method.as_str() == "DELETE")
            .count()
    }

    #[tokio::test]
    async fn the_one_where_2500_docs_split_across_midnight() {
        let server = legacy_cluster().await;
        let sink = InMemorySink::new();
        let mut migrator = migrator(&server, sink.clone(), &[LEGACY]);

        let report = migrator.migrate_all(&CancellationToken::new()).await;
        assert_eq!(report.indices.len(), 1);
        let progress = match &report.indices[0].outcome {
            IndexOutcome::Completed(progress) => *progress,
            other => panic!("💀 expected Completed, got {other:?}"),
        };
        assert_eq!(progress.total_hits, 2_500);
        assert_eq!(progress.processed, progress.total_hits);
        assert_eq!(progress.written, 2_500);
        assert_eq!(progress.pages, 3);
        assert_eq!(migrator.state(), MigrationState::Closed);

        let page_sizes: Vec<usize> = sink.pages().await.iter().map(Vec::len).collect();
        assert_eq!(page_sizes, vec![1_000, 1_000, 500]);

        let mut per_index: BTreeMap<String, usize> = BTreeMap::new();
        for op in sink.ops().await {
            *per_index.entry(op.index).or_default() += 1;
        }
        assert_eq!(
            per_index.keys().cloned().collect::<Vec<_>>(),
            vec!["logs-2024-01-01".to_string(), "logs-2024-01-02".to_string()]
        );
        assert_eq!(per_index["logs-2024-01-01"], 1_250);
        assert_eq!(per_index["logs-2024-01-02"], 1_250);
        assert_eq!(delete_calls(&server).await, 1);
    }

    #[tokio::test]
    async fn the_one_where_every_id_is_staged_exactly_once() {
        let server = legacy_cluster().await;
        let sink = InMemorySink::new();
        let mut migrator = migrator(&server, sink.clone(), &[LEGACY]);
        migrator.migrate_all(&CancellationToken::new()).await;

        let ops = sink.ops().await;
        let unique: HashSet<&str> = ops.iter().map(|op| op.id.as_str()).collect();
        assert_eq!(ops.len(), 2_500);
        assert_eq!(unique.len(), 2_500);
        assert!(unique.contains("doc-0") && unique.contains("doc-2499"));
    }

    #[tokio::test]
    async fn the_one_where_page_two_faceplants_and_page_three_still_lands() {
        let server = legacy_cluster().await;
        let sink = InMemorySink::failing_on([2]);
        let mut migrator = migrator(&server, sink.clone(), &[LEGACY]);

        let report = migrator.migrate_all(&CancellationToken::new()).await;
        let progress = match &report.indices[0].outcome {
            IndexOutcome::Completed(progress) => *progress,
            other => panic!("💀 expected Completed, got {other:?}"),
        };
        assert_eq!(progress.processed, 2_500);
        assert_eq!(progress.written, 1_500);
        assert_eq!(progress.failed_pages, 1);
        assert_eq!(report.total_failed_pages(), 1);
        assert_eq!(sink.calls(), 3);

        let landed: Vec<usize> = sink.pages().await.iter().map(Vec::len).collect();
        assert_eq!(landed, vec![1_000, 500]);
    }

    #[tokio::test]
    async fn the_one_where_running_it_twice_changes_nothing() {
        let server = legacy_cluster().await;

        let first_sink = InMemorySink::new();
        migrator(&server, first_sink.clone(), &[LEGACY])
            .migrate_all(&CancellationToken::new())
            .await;
        let second_sink = InMemorySink::new();
        migrator(&server, second_sink.clone(), &[LEGACY])
            .migrate_all(&CancellationToken::new())
            .await;

        let as_set = |ops: Vec<BulkOp>| -> HashSet<(String, String)> {
            ops.into_iter().map(|op| (op.index, op.id)).collect()
        };
        let first = as_set(first_sink.ops().await);
        let second = as_set(second_sink.ops().await);
        assert_eq!(first.len(), 2_500);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn the_one_where_a_missing_index_is_skipped_not_fatal() {
        let server = legacy_cluster().await;
        let sink = InMemorySink::new();
        let mut migrator = migrator(&server, sink.clone(), &["ghost_index", LEGACY]);

        let report = migrator.migrate_all(&CancellationToken::new()).await;
        assert_eq!(report.indices.len(), 2);
        assert_eq!(report.indices[0].outcome, IndexOutcome::Skipped);
        assert_eq!(report.indices[1].outcome.label(), "completed");
        assert!(!report.has_aborted());
        assert_eq!(report.totals().processed, 2_500);
    }

    #[tokio::test]
    async fn the_one_where_cancel_stops_after_the_page_in_hand_and_still_closes() {
        let server = legacy_cluster().await;
        let sink = InMemorySink::new();
        let mut migrator = migrator(&server, sink.clone(), &[LEGACY]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = migrator.migrate_index(LEGACY, &cancel).await;
        match outcome {
            IndexOutcome::Cancelled(progress) => {
                assert_eq!(progress.pages, 1);
                assert_eq!(progress.processed, 1_000);
            }
            other => panic!("💀 expected Cancelled, got {other:?}"),
        }
        assert_eq!(delete_calls(&server).await, 1);
    }

    #[tokio::test]
    async fn the_one_where_the_scroll_breaks_and_the_cursor_is_still_released() {
        let server = MockServer::start().await;
        let docs = legacy_docs();
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(format!("/{LEGACY}/_search")))
            .respond_with(ResponseTemplate::new(200).set_body_json(page_body("s1", &docs[0..1_000])))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/_search/scroll"))
            .respond_with(ResponseTemplate::new(500).set_body_string("shard on fire"))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/_search/scroll"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let sink = InMemorySink::new();
        let mut migrator = migrator(&server, sink.clone(), &[LEGACY]);
        let report = migrator.migrate_all(&CancellationToken::new()).await;
        assert!(report.has_aborted());
        match &report.indices[0].outcome {
            IndexOutcome::Aborted { progress, reason } => {
                assert_eq!(progress.processed, 1_000);
                assert!(reason.contains("500"));
            }
            other => panic!("💀 expected Aborted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn the_one_where_a_page_of_nameless_hits_does_not_end_the_scroll() {
        let server = MockServer::start().await;
        let total = |hits: Vec<Value>| json!({"total": {"value": 2}, "hits": hits});
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(format!("/{LEGACY}/_search")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "_scroll_id": "s1",
                "hits": total(vec![json!({"_source": {"n": 1}})])
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/_search/scroll"))
            .and(body_partial_json(json!({"scroll_id": "s1"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "_scroll_id": "s2",
                "hits": total(vec![json!({"_id": "b", "_source": {"timestamp": "2024-01-01T10:00:00Z"}})])
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/_search/scroll"))
            .and(body_partial_json(json!({"scroll_id": "s2"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "_scroll_id": "s2",
                "hits": total(vec![])
            })))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/_search/scroll"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let sink = InMemorySink::new();
        let mut migrator = migrator(&server, sink.clone(), &[LEGACY]);
        let outcome = migrator.migrate_index(LEGACY, &CancellationToken::new()).await;
        match outcome {
            IndexOutcome::Completed(progress) => {
                assert_eq!(progress.processed, 2);
                assert_eq!(progress.processed, progress.total_hits);
                assert_eq!(progress.skipped, 1);
                assert_eq!(progress.written, 1);
                assert_eq!(progress.pages, 2);
            }
            other => panic!("💀 expected Completed, got {other:?}"),
        }

        // -- the nameless page never reached the sink, the real doc did
        assert_eq!(sink.calls(), 1);
        let ops = sink.ops().await;
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].id, "b");
        assert_eq!(ops[0].index, "logs-2024-01-01");
    }

    #[test]
    fn the_one_where_a_clockless_event_moves_in_today() {
        let server_free = SearchApiClient::new(None, None).expect("client");
        let migrator = ReindexMigrator::new(
            server_free,
            SinkBackend::InMemory(InMemorySink::new()),
            MigrationConfig::default(),
        );
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 8, 0, 0).single().expect("valid date");
        let mut document = serde_json::Map::new();
        document.insert("message".into(), json!("who knows when"));
        let ops = migrator.stage(Batch::new(vec![LogEvent::from_hit("x".into(), document)]), now);
        assert_eq!(ops[0].index, "logs-2025-06-01");
        assert_eq!(ops[0].id, "x");
    }

    #[test]
    fn the_one_where_staging_leaves_the_nameless_behind() {
        let migrator = ReindexMigrator::new(
            SearchApiClient::new(None, None).expect("client"),
            SinkBackend::InMemory(InMemorySink::new()),
            MigrationConfig::default(),
        );
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 8, 0, 0).single().expect("valid date");
        let nameless = LogEvent {
            id: None,
            document: serde_json::Map::new(),
        };
        let named = LogEvent::from_hit("y".into(), serde_json::Map::new());
        let ops = migrator.stage(Batch::new(vec![nameless, named]), now);
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].id, "y");
    }
}
