// ai
//! ⏰ Scheduler: the metronome of the ingestion loop.
//!
//! 🎬 *[a clock ticks. a cycle runs. the clock ticks again, but only if the cycle is done.]*
//!
//! 🧠 Knowledge graph:
//! - Owns the period and a `CancellationToken`. No ambient timers, no global handles.
//! - First tick fires immediately (tokio's `interval` does that for free).
//! - Ticks are serialized by construction: the caller awaits `next_tick()`, runs the cycle,
//!   then asks again. Ticks missed while a slow cycle was running are skipped, not queued.
//! - Cancelling the token stops the NEXT tick. A cycle already running finishes. No hard interrupts.
//!
//! 🦆 The duck keeps time. The duck does not overlap.

use std::time::Duration;

use tokio::time::{Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// ⏰ A fixed-cadence ticker with an off switch.
#[derive(Debug)]
pub struct Scheduler {
    period: Duration,
    cancellation: CancellationToken,
    interval: Option<Interval>,
    ticks: u64,
}

impl Scheduler {
    pub fn new(period: Duration) -> Self {
        Self::with_cancellation(period, CancellationToken::new())
    }

    /// 🔗 Share a token with someone else (ctrl-c handler, a test, a supervisor with trust issues).
    pub fn with_cancellation(period: Duration, cancellation: CancellationToken) -> Self {
        Self {
            period,
            cancellation,
            interval: None,
            ticks: 0,
        }
    }

    /// 🛑 A handle that can stop this scheduler from anywhere.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// 🔢 Ticks handed out so far (the immediate first one included).
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// ⏳ Waits for the next tick. `Some(n)` is the 1-based tick number; `None` means stop.
    ///
    /// The first call returns right away. Cancellation wins ties.
    pub async fn next_tick(&mut self) -> Option<u64> {
        if self.cancellation.is_cancelled() {
            return None;
        }

        // -- 🏗️ lazily built so the first tick is "now" relative to the first ask, not to `new()`
        let period = self.period;
        let interval = self.interval.get_or_insert_with(|| {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            interval
        });

        tokio::select! {
            biased;
            _ = self.cancellation.cancelled() => {
                debug!(ticks = self.ticks, "🛑 scheduler cancelled, no more ticks");
                None
            }
            _ = interval.tick() => {
                self.ticks += 1;
                Some(self.ticks)
            }
        }
    }
}
