//! # Previously, on lfx...
//!
//! 🎬 The broker was down. The cluster was "being upgraded". The test suite still
//! had to run. Someone had to be brave. Someone had to write backends so simple
//! they live entirely in RAM, gone the moment you blink.
//!
//! That someone was this module.
//!
//! `in_mem` provides an in-memory [`InMemoryPublisher`] and [`InMemorySink`].
//! Both hoard what they receive behind an `Arc<Mutex<...>>` so tests can inspect
//! what arrived after handing the backend off, and both can be told to fail on
//! specific calls, because the interesting tests are the ones where something breaks.
//!
//! ⚠️ This is NOT for production. If you're deploying this to prod, please also
//! deploy a therapist. 🦆

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

pub mod in_mem_publisher;
pub mod in_mem_sink;

pub use in_mem_publisher::InMemoryPublisher;
pub use in_mem_sink::InMemorySink;

/// 🎲 Counts calls and knows which (1-based) ones are doomed.
///
/// Clone shares the counter, so a test's copy sees the pipeline's calls.
#[derive(Debug, Default, Clone)]
pub(crate) struct FailurePlan {
    calls: Arc<AtomicUsize>,
    doomed: Arc<BTreeSet<usize>>,
}

impl FailurePlan {
    pub(crate) fn failing_on(calls: impl IntoIterator<Item = usize>) -> Self {
        Self {
            calls: Arc::new(AtomicUsize::new(0)),
            doomed: Arc::new(calls.into_iter().collect()),
        }
    }

    /// 🔢 Register one call. Returns its number and whether it should fail.
    pub(crate) fn next_call(&self) -> (usize, bool) {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        (call, self.doomed.contains(&call))
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}
