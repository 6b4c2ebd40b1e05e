//! Registry of admission queues.
//!
//! Each queueing remedy gets one [`DelayedAdmissionQueue`] per strategy it
//! has been configured with. A changed quota or window size therefore starts
//! a fresh queue instead of mutating one that callers are waiting on.

use crate::application::metrics::Metrics;
use crate::application::ports::{Clock, Storage};
use crate::application::queue::{Admission, DelayedAdmissionQueue};
use crate::domain::priority::Priority;
use crate::domain::strategy::{QueueConfig, WindowStrategy};
use crate::error::ThrottleError;
use crate::infrastructure::storage::ShardedStorage;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Identity of one admission queue.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueueKey {
    pub remedy_name: String,
    pub strategy: WindowStrategy,
}

/// Pending count of one priority in one queue.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueCount {
    pub remedy_name: String,
    pub priority: Priority,
    pub count: i64,
}

/// Lazily created admission queues keyed by remedy and strategy.
///
/// All queues share the registry's clock and metrics.
pub struct QueueRegistry {
    clock: Arc<dyn Clock>,
    metrics: Metrics,
    queues: ShardedStorage<QueueKey, Arc<DelayedAdmissionQueue>>,
}

impl QueueRegistry {
    /// Create an empty registry.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_metrics(clock, Metrics::new())
    }

    /// Create an empty registry recording into `metrics`.
    pub fn with_metrics(clock: Arc<dyn Clock>, metrics: Metrics) -> Self {
        Self {
            clock,
            metrics,
            queues: ShardedStorage::new(),
        }
    }

    /// The queue for `remedy_name` and `strategy`, created on first use.
    ///
    /// Concurrent first calls may each build a queue, but only one is kept
    /// and returned to every caller. The others are dropped, which stops
    /// their window process.
    ///
    /// # Errors
    /// `NoRuntime` when a queue must be created outside a Tokio runtime.
    pub fn queue(
        &self,
        remedy_name: &str,
        strategy: WindowStrategy,
    ) -> Result<Arc<DelayedAdmissionQueue>, ThrottleError> {
        let key = QueueKey {
            remedy_name: remedy_name.to_string(),
            strategy,
        };
        if let Some(queue) = self.queues.get_cloned(&key) {
            return Ok(queue);
        }

        let created = Arc::new(DelayedAdmissionQueue::with_metrics(
            strategy,
            Arc::clone(&self.clock),
            self.metrics.clone(),
        )?);
        tracing::debug!(remedy = remedy_name, ?strategy, "initialized admission queue");
        Ok(self.queues.get_or_insert_with(key, || created))
    }

    /// Run one request through the remedy's queue.
    ///
    /// The priority comes from the request headers and the remedy's
    /// prioritization; TTL and queue size come from `config`.
    ///
    /// # Errors
    /// Invalid configuration, or `NoRuntime` on first use outside a runtime.
    pub async fn enqueue(
        &self,
        remedy_name: &str,
        config: &QueueConfig,
        request_id: &str,
        headers: &HashMap<String, String>,
    ) -> Result<Admission, ThrottleError> {
        let queue = self.queue(remedy_name, config.strategy()?)?;
        let priority = config.priority(headers);
        tracing::trace!(request_id, %priority, "extracted priority");

        let request = queue.new_request(request_id, priority);
        let admission = queue
            .enqueue(request, config.ttl(), config.queue_size)
            .await;
        tracing::trace!(request_id, remedy = remedy_name, ?admission, "queue decision");
        Ok(admission)
    }

    /// Pending counts of every queue, flattened for exporters.
    pub fn counts(&self) -> Vec<QueueCount> {
        self.queues
            .snapshot()
            .into_iter()
            .flat_map(|(key, queue)| {
                queue
                    .counts()
                    .into_iter()
                    .map(move |(priority, count)| QueueCount {
                        remedy_name: key.remedy_name.clone(),
                        priority,
                        count,
                    })
            })
            .collect()
    }

    /// Number of queues created so far.
    pub fn len(&self) -> usize {
        self.queues.len()
    }

    /// Whether no queue has been created yet.
    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }

    /// Metrics shared by every queue in the registry.
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }
}

impl fmt::Debug for QueueRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueRegistry")
            .field("queues", &self.len())
            .finish()
    }
}
