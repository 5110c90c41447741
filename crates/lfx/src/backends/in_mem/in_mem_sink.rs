use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use crate::backends::in_mem::FailurePlan;
use crate::backends::{BulkOp, BulkSink, BulkSummary};
use crate::errors::BulkWriteError;

/// 📦 A bulk sink that never forgets. Unlike my dad, who forgot my soccer game in 1998.
///
/// Each successful `write` stores its page of ops as one entry, so tests can count
/// pages, look for duplicates, and check which index every doc landed in.
#[derive(Debug, Default, Clone)]
pub struct InMemorySink {
    /// 🔒 One entry per accepted page.
    pub(crate) pages: Arc<tokio::sync::Mutex<Vec<Vec<BulkOp>>>>,
    plan: FailurePlan,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// 💀 Reject the given (1-based) write calls with an HTTP 503.
    pub fn failing_on(calls: impl IntoIterator<Item = usize>) -> Self {
        Self {
            pages: Arc::default(),
            plan: FailurePlan::failing_on(calls),
        }
    }

    /// 🔢 Write attempts so far, rejected ones included.
    pub fn calls(&self) -> usize {
        self.plan.calls()
    }

    /// 📦 Every op that landed, in arrival order.
    pub async fn ops(&self) -> Vec<BulkOp> {
        self.pages.lock().await.iter().flatten().cloned().collect()
    }

    pub async fn pages(&self) -> Vec<Vec<BulkOp>> {
        self.pages.lock().await.clone()
    }
}

#[async_trait]
impl BulkSink for InMemorySink {
    async fn write(&mut self, ops: &[BulkOp]) -> Result<BulkSummary, BulkWriteError> {
        let (call, doomed) = self.plan.next_call();
        if doomed {
            return Err(BulkWriteError::Rejected {
                docs: ops.len(),
                status: 503,
                body: format!("injected failure on write call {}", call),
                at: Utc::now(),
            });
        }
        self.pages.lock().await.push(ops.to_vec());
        Ok(BulkSummary { written: ops.len() })
    }
}
