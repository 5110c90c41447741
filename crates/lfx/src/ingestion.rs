// ai
//! 🔄 The ingestion loop: fetch the last minute, ship it, nap, repeat.
//!
//! 🎬 COLD OPEN: INT. SOC: EVERY TEN SECONDS, FOREVER
//!
//! The scheduler taps its watch. The loop asks the search API what happened in the
//! trailing window. If anything happened, it goes onto the topic. If the search API
//! sneezes or the broker shrugs, we log it with the cycle number and try again next tick.
//! One bad cycle never takes the process down. That's the whole personality of this module.
//!
//! 🧠 Knowledge graph:
//! - State machine: `Idle → Fetching → Publishing → Idle`, once per tick.
//! - Ticks come from `Scheduler` (first one immediate, missed ones skipped, cancel between ticks).
//! - Dedupe: ids already published inside the seen-set TTL are skipped. Ids are remembered
//!   only AFTER a successful publish, so a dropped batch gets a second chance next cycle.
//! - Events without an id can't be deduped. They ship every time they show up.
//!
//! ⚠️ A dropped batch is a data-loss signal. The `error!` line says so. Read it. 🦆

use anyhow::ensure;
use chrono::{DateTime, TimeDelta, Utc};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::backends::{Publisher, PublisherBackend, SearchApiClient};
use crate::common::{Batch, TimeWindow};
use crate::errors::{FetchError, PublishError};
use crate::scheduler::Scheduler;

pub mod seen_set;

pub use seen_set::SeenSet;

/// 🔧 Cadence and memory of the ingestion loop.
#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    /// ⏰ Seconds between cycles.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// 🪟 Trailing window size. Wider than the poll interval so indexing lag doesn't eat events.
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
    /// 👀 Skip ids already published recently.
    #[serde(default = "default_dedupe")]
    pub dedupe: bool,
    /// 🧹 How long an id stays in the seen-set. Defaults to twice the window.
    #[serde(default)]
    pub dedupe_ttl_secs: Option<u64>,
}

/// 🪟 A month of trailing window is already absurd. Anything past it is a typo.
pub const MAX_WINDOW_SECS: u64 = 31 * 24 * 3600;

fn default_poll_interval_secs() -> u64 {
    10
}

fn default_window_secs() -> u64 {
    60
}

fn default_dedupe() -> bool {
    true
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            window_secs: default_window_secs(),
            dedupe: default_dedupe(),
            dedupe_ttl_secs: None,
        }
    }
}

impl IngestConfig {
    /// 🔍 Catch window sizes chrono can't represent before they reach a clock.
    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(
            self.window_secs <= MAX_WINDOW_SECS,
            "💀 ingest.window_secs = {} is more than a month ({} s). That's not a trailing window, that's an archive.",
            self.window_secs,
            MAX_WINDOW_SECS
        );
        if let Some(ttl) = self.dedupe_ttl_secs {
            ensure!(
                ttl <= 2 * MAX_WINDOW_SECS,
                "💀 ingest.dedupe_ttl_secs = {} is more than two months ({} s). The seen-set would outlive us all.",
                ttl,
                2 * MAX_WINDOW_SECS
            );
        }
        Ok(())
    }

    /// Clamped to `MAX_WINDOW_SECS`, so it never panics even on an unvalidated config.
    pub fn window(&self) -> TimeDelta {
        bounded_seconds(self.window_secs, MAX_WINDOW_SECS)
    }

    fn dedupe_ttl(&self) -> TimeDelta {
        let secs = self.dedupe_ttl_secs.unwrap_or(self.window_secs.saturating_mul(2));
        bounded_seconds(secs, 2 * MAX_WINDOW_SECS)
    }
}

fn bounded_seconds(secs: u64, max: u64) -> TimeDelta {
    i64::try_from(secs.min(max))
        .ok()
        .and_then(TimeDelta::try_seconds)
        .unwrap_or(TimeDelta::zero())
}

/// 🚦 Where the loop is right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Fetching,
    Publishing,
}

/// 💀 Why a cycle came up empty-handed. Logged, counted, never fatal.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Publish(#[from] PublishError),
}

/// ✅ What a cycle accomplished when nothing broke.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleOutcome {
    pub fetched: usize,
    pub published: usize,
    pub duplicates_skipped: usize,
}

/// 📊 Running totals across cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IngestStats {
    pub cycles: u64,
    pub fetch_failures: u64,
    pub publish_failures: u64,
    pub events_published: u64,
    pub duplicates_skipped: u64,
}

/// 🔄 SearchApiClient → Publisher, on a schedule.
#[derive(Debug)]
pub struct IngestionLoop {
    client: SearchApiClient,
    publisher: PublisherBackend,
    window: TimeDelta,
    seen: Option<SeenSet>,
    state: LoopState,
    stats: IngestStats,
}

impl IngestionLoop {
    pub fn new(client: SearchApiClient, publisher: PublisherBackend, config: &IngestConfig) -> Self {
        let seen = config.dedupe.then(|| SeenSet::new(config.dedupe_ttl()));
        Self {
            client,
            publisher,
            window: config.window(),
            seen,
            state: LoopState::Idle,
            stats: IngestStats::default(),
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn stats(&self) -> IngestStats {
        self.stats
    }

    /// 🔁 Run cycles until the scheduler says stop. Never returns early on a cycle error.
    pub async fn run(&mut self, scheduler: &mut Scheduler) -> IngestStats {
        info!(
            period_secs = scheduler.period().as_secs_f64(),
            window_secs = self.window.num_seconds(),
            dedupe = self.seen.is_some(),
            "🚀 ingestion loop starting"
        );
        while let Some(tick) = scheduler.next_tick().await {
            self.stats.cycles += 1;
            match self.run_cycle(Utc::now()).await {
                Ok(outcome) if outcome.published > 0 => info!(
                    cycle = tick,
                    fetched = outcome.fetched,
                    published = outcome.published,
                    duplicates_skipped = outcome.duplicates_skipped,
                    "📨 cycle shipped a batch"
                ),
                Ok(outcome) => debug!(
                    cycle = tick,
                    fetched = outcome.fetched,
                    duplicates_skipped = outcome.duplicates_skipped,
                    "😴 nothing new this cycle"
                ),
                Err(CycleError::Fetch(e)) => {
                    self.stats.fetch_failures += 1;
                    error!(cycle = tick, operation = "fetch_recent", error = %e, "💀 fetch failed, trying again next tick");
                }
                Err(CycleError::Publish(e)) => {
                    self.stats.publish_failures += 1;
                    error!(cycle = tick, operation = "publish", error = %e, "💀 batch DROPPED, this is data loss");
                }
            }
        }
        info!(
            cycles = self.stats.cycles,
            events_published = self.stats.events_published,
            fetch_failures = self.stats.fetch_failures,
            publish_failures = self.stats.publish_failures,
            "🛑 ingestion loop stopped"
        );
        self.stats
    }

    /// 🎯 One full `Idle → Fetching → Publishing → Idle` pass for the window ending at `now`.
    ///
    /// The state goes back to `Idle` no matter how the cycle ends.
    pub async fn run_cycle(&mut self, now: DateTime<Utc>) -> Result<CycleOutcome, CycleError> {
        let result = self.fetch_and_publish(now).await;
        self.transition(LoopState::Idle);
        result
    }

    async fn fetch_and_publish(&mut self, now: DateTime<Utc>) -> Result<CycleOutcome, CycleError> {
        self.transition(LoopState::Fetching);
        let window = TimeWindow::trailing(now, self.window);
        let fetched = self.client.fetch_recent(&window).await?;
        let fetched_count = fetched.len();

        let (fresh, duplicates_skipped) = self.drop_already_seen(fetched, now);
        self.stats.duplicates_skipped += duplicates_skipped as u64;
        if fresh.is_empty() {
            return Ok(CycleOutcome {
                fetched: fetched_count,
                published: 0,
                duplicates_skipped,
            });
        }

        self.transition(LoopState::Publishing);
        self.publisher.publish(&fresh).await?;

        self.remember(&fresh, now);
        self.stats.events_published += fresh.len() as u64;
        Ok(CycleOutcome {
            fetched: fetched_count,
            published: fresh.len(),
            duplicates_skipped,
        })
    }

    fn drop_already_seen(&mut self, batch: Batch, now: DateTime<Utc>) -> (Batch, usize) {
        let Some(seen) = self.seen.as_mut() else {
            return (batch, 0);
        };
        seen.evict_expired(now);
        let before = batch.len();
        let fresh: Vec<_> = batch
            .into_iter()
            .filter(|event| event.id.as_deref().is_none_or(|id| !seen.contains(id)))
            .collect();
        let skipped = before - fresh.len();
        if skipped > 0 {
            debug!(skipped, "👀 skipping events we already shipped");
        }
        (Batch::new(fresh), skipped)
    }

    fn remember(&mut self, batch: &Batch, now: DateTime<Utc>) {
        if let Some(seen) = self.seen.as_mut() {
            for id in batch.iter().filter_map(|event| event.id.as_deref()) {
                seen.insert(id, now);
            }
        }
    }

    fn transition(&mut self, next: LoopState) {
        if self.state != next {
            debug!(from = ?self.state, to = ?next, "🚦 ingestion state change");
            self.state = next;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::InMemoryPublisher;
    use crate::backends::search_api::test_support::api_config;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn messages(ids: &[&str]) -> serde_json::Value {
        let wrapped: Vec<_> = ids
            .iter()
            .map(|id| json!({"message": {"_id": id, "message": format!("event {id}")}}))
            .collect();
        json!({ "messages": wrapped })
    }

    fn ingestion_for(server: &MockServer, publisher: InMemoryPublisher, config: &IngestConfig) -> IngestionLoop {
        let client = SearchApiClient::new(Some(api_config(&server.uri())), None).expect("client");
        IngestionLoop::new(client, PublisherBackend::InMemory(publisher), config)
    }

    async fn wait_for_calls(publisher: &InMemoryPublisher, calls: usize) {
        tokio::time::timeout(Duration::from_secs(10), async {
            while publisher.calls() < calls {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("💀 the publisher never got called enough times");
    }

    #[test]
    fn the_one_where_an_absurd_window_is_refused_not_panicked_on() {
        let config = IngestConfig {
            window_secs: u64::MAX / 1000,
            ..IngestConfig::default()
        };
        let err = config.validate().expect_err("a window of ages must be refused");
        assert!(err.to_string().contains("window_secs"));
        // -- even unvalidated, the clock math stays on the ground
        assert_eq!(config.window(), TimeDelta::seconds(MAX_WINDOW_SECS as i64));
        let window = TimeWindow::trailing(Utc::now(), config.window());
        assert!(window.from < window.to);

        let ttl_config = IngestConfig {
            dedupe_ttl_secs: Some(u64::MAX),
            ..IngestConfig::default()
        };
        assert!(ttl_config.validate().is_err());
        assert!(IngestConfig::default().validate().is_ok());
    }

    #[tokio::test]
    async fn the_one_where_a_dropped_batch_does_not_stop_the_next_tick() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/search/universal/absolute"))
            .respond_with(ResponseTemplate::new(200).set_body_json(messages(&["a", "b"])))
            .mount(&server)
            .await;

        let publisher = InMemoryPublisher::failing_on([1]);
        let mut ingestion = ingestion_for(&server, publisher.clone(), &IngestConfig::default());
        let mut scheduler = Scheduler::new(Duration::from_millis(30));
        let stop = scheduler.cancellation_token();

        let handle = tokio::spawn(async move { ingestion.run(&mut scheduler).await });
        wait_for_calls(&publisher, 2).await;
        stop.cancel();
        let stats = handle.await.expect("💀 loop task panicked");

        assert_eq!(stats.publish_failures, 1);
        assert!(stats.cycles >= 2);
        // -- the failed batch wasn't remembered, so its events shipped on the retry cycle
        let published = publisher.published().await;
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].len(), 2);
        assert_eq!(stats.events_published, 2);
    }

    #[tokio::test]
    async fn the_one_where_stop_arrives_mid_cycle_and_the_cycle_finishes_anyway() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/search/universal/absolute"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(messages(&["slow-1"]))
                    .set_delay(Duration::from_millis(300)),
            )
            .mount(&server)
            .await;

        let publisher = InMemoryPublisher::new();
        let mut ingestion = ingestion_for(&server, publisher.clone(), &IngestConfig::default());
        let mut scheduler = Scheduler::new(Duration::from_secs(3600));
        let stop = scheduler.cancellation_token();
        let handle = tokio::spawn(async move { ingestion.run(&mut scheduler).await });

        // -- ⏳ the fetch is still waiting on the server when the stop comes in
        tokio::time::sleep(Duration::from_millis(100)).await;
        stop.cancel();
        let stats = handle.await.expect("💀 loop task panicked");

        assert_eq!(stats.cycles, 1);
        assert_eq!(stats.events_published, 1);
        assert_eq!(publisher.calls(), 1);
        assert_eq!(publisher.published().await[0].events[0].id.as_deref(), Some("slow-1"));
    }

    #[tokio::test]
    async fn the_one_where_a_slow_cycle_does_not_cause_a_stampede_of_ticks() {
        let server = MockServer::start().await;
        // -- 🐢 the first fetch eats more than three periods, the rest are instant
        Mock::given(method("GET"))
            .and(path("/api/search/universal/absolute"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(messages(&["a"]))
                    .set_delay(Duration::from_millis(1_000)),
            )
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/search/universal/absolute"))
            .respond_with(ResponseTemplate::new(200).set_body_json(messages(&["a"])))
            .mount(&server)
            .await;

        let publisher = InMemoryPublisher::new();
        let mut ingestion = ingestion_for(&server, publisher.clone(), &IngestConfig::default());
        let mut scheduler = Scheduler::new(Duration::from_millis(300));
        let stop = scheduler.cancellation_token();
        let handle = tokio::spawn(async move { ingestion.run(&mut scheduler).await });

        // -- ticks at 300/600/900 were missed. Skipped, one catch-up cycle at ~1000, next tick at 1200.
        //    Queued ticks would have fired three cycles back to back instead.
        tokio::time::sleep(Duration::from_millis(1_100)).await;
        stop.cancel();
        let stats = handle.await.expect("💀 loop task panicked");

        assert_eq!(stats.cycles, 2);
        assert_eq!(stats.fetch_failures, 0);
    }

    #[tokio::test]
    async fn the_one_where_the_old_endpoint_is_gone_and_nobody_notices() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/search/universal/absolute"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/views/search/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "messages": [{"_id": "v1", "message": "from the views API"}]
            })))
            .mount(&server)
            .await;

        let publisher = InMemoryPublisher::new();
        let mut ingestion = ingestion_for(&server, publisher.clone(), &IngestConfig::default());
        let outcome = ingestion.run_cycle(Utc::now()).await.expect("fallback is not an error");
        assert_eq!(outcome.published, 1);
        assert_eq!(ingestion.state(), LoopState::Idle);
        assert_eq!(publisher.published().await[0].events[0].id.as_deref(), Some("v1"));
    }

    #[tokio::test]
    async fn the_one_where_overlapping_windows_do_not_double_ship() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/search/universal/absolute"))
            .respond_with(ResponseTemplate::new(200).set_body_json(messages(&["a", "b"])))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/search/universal/absolute"))
            .respond_with(ResponseTemplate::new(200).set_body_json(messages(&["b", "c"])))
            .mount(&server)
            .await;

        let publisher = InMemoryPublisher::new();
        let mut ingestion = ingestion_for(&server, publisher.clone(), &IngestConfig::default());
        let now = Utc::now();
        let first = ingestion.run_cycle(now).await.expect("cycle 1");
        let second = ingestion
            .run_cycle(now + TimeDelta::seconds(10))
            .await
            .expect("cycle 2");

        assert_eq!(first.published, 2);
        assert_eq!(second.fetched, 2);
        assert_eq!(second.published, 1);
        assert_eq!(second.duplicates_skipped, 1);
        let shipped: Vec<_> = publisher
            .published()
            .await
            .iter()
            .flat_map(|b| b.events.iter().filter_map(|e| e.id.clone()))
            .collect();
        assert_eq!(shipped, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn the_one_where_dedupe_is_switched_off_and_repeats_ship_again() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/search/universal/absolute"))
            .respond_with(ResponseTemplate::new(200).set_body_json(messages(&["a"])))
            .mount(&server)
            .await;

        let config = IngestConfig {
            dedupe: false,
            ..IngestConfig::default()
        };
        let publisher = InMemoryPublisher::new();
        let mut ingestion = ingestion_for(&server, publisher.clone(), &config);
        let now = Utc::now();
        ingestion.run_cycle(now).await.expect("cycle 1");
        ingestion.run_cycle(now).await.expect("cycle 2");
        assert_eq!(publisher.published().await.len(), 2);
    }

    #[tokio::test]
    async fn the_one_where_a_quiet_minute_never_bothers_the_broker() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/search/universal/absolute"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"messages": []})))
            .mount(&server)
            .await;

        let publisher = InMemoryPublisher::new();
        let mut ingestion = ingestion_for(&server, publisher.clone(), &IngestConfig::default());
        let outcome = ingestion.run_cycle(Utc::now()).await.expect("quiet is fine");
        assert_eq!(outcome.fetched, 0);
        assert_eq!(publisher.calls(), 0);
    }

    #[tokio::test]
    async fn the_one_where_a_500_is_logged_and_counted_not_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/search/universal/absolute"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let publisher = InMemoryPublisher::new();
        let mut ingestion = ingestion_for(&server, publisher.clone(), &IngestConfig::default());
        let mut scheduler = Scheduler::new(Duration::from_millis(20));
        let stop = scheduler.cancellation_token();
        let handle = tokio::spawn(async move { ingestion.run(&mut scheduler).await });

        tokio::time::sleep(Duration::from_millis(120)).await;
        stop.cancel();
        let stats = handle.await.expect("💀 loop task panicked");
        assert!(stats.fetch_failures >= 2);
        assert_eq!(stats.fetch_failures, stats.cycles);
        assert_eq!(publisher.calls(), 0);
    }
}
