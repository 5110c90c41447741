use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use crate::backends::Publisher;
use crate::backends::in_mem::FailurePlan;
use crate::common::Batch;
use crate::errors::PublishError;

/// 📨 A publisher that never forgets, unless it was told to fail.
///
/// Clone-able because tests need to peek inside after handing `self` off to the loop.
#[derive(Debug, Default, Clone)]
pub struct InMemoryPublisher {
    /// 🔒 The evidence locker. One entry per successfully published batch.
    pub(crate) published: Arc<tokio::sync::Mutex<Vec<Batch>>>,
    plan: FailurePlan,
}

impl InMemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// 💀 Fail the given (1-based) publish calls with a delivery error.
    pub fn failing_on(calls: impl IntoIterator<Item = usize>) -> Self {
        Self {
            published: Arc::default(),
            plan: FailurePlan::failing_on(calls),
        }
    }

    /// 🔢 Publish attempts so far, failed ones included.
    pub fn calls(&self) -> usize {
        self.plan.calls()
    }

    /// 📦 Snapshot of every batch that made it.
    pub async fn published(&self) -> Vec<Batch> {
        self.published.lock().await.clone()
    }
}

#[async_trait]
impl Publisher for InMemoryPublisher {
    async fn publish(&mut self, batch: &Batch) -> Result<(), PublishError> {
        let (call, doomed) = self.plan.next_call();
        if doomed {
            return Err(PublishError::Delivery {
                topic: "in-memory".to_string(),
                failed: batch.len(),
                total: batch.len(),
                first_failure: format!("injected failure on publish call {}", call),
                at: Utc::now(),
            });
        }
        // 🔒 The Mutex is load-bearing. Do not remove. I know it looks optional. It isn't.
        self.published.lock().await.push(batch.clone());
        Ok(())
    }
}
