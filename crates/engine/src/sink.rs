//! Two-tier log sink.
//!
//! Every entry lands in a per-execution hot cache (LRU-bounded across
//! executions); only milestone entries cross the persistent boundary.

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;
use weft_core::ExecutionId;
use weft_execution::LogEntry;
use weft_storage::LogRepository;

use crate::error::EngineError;

/// Fans log entries out to the hot cache and, for milestones, the
/// persistent log repository.
pub struct LogSink {
    hot: Mutex<LruCache<ExecutionId, Vec<LogEntry>>>,
    repo: Arc<dyn LogRepository>,
}

impl LogSink {
    /// Create a sink over a log repository with a bounded hot cache.
    #[must_use]
    pub fn new(repo: Arc<dyn LogRepository>, hot_capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(hot_capacity.max(1)).expect("capacity is at least 1");
        Self {
            hot: Mutex::new(LruCache::new(capacity)),
            repo,
        }
    }

    /// Emit one entry.
    pub async fn emit(&self, entry: LogEntry) -> Result<(), EngineError> {
        tracing::debug!(
            execution = %entry.execution_id,
            event = ?entry.event,
            milestone = entry.milestone,
            "{}",
            entry.message
        );

        {
            let mut hot = self.hot.lock();
            if let Some(entries) = hot.get_mut(&entry.execution_id) {
                entries.push(entry.clone());
            } else {
                hot.put(entry.execution_id, vec![entry.clone()]);
            }
        }

        if entry.milestone {
            self.repo.append(entry).await?;
        }
        Ok(())
    }

    /// All hot entries for an execution (empty when evicted).
    #[must_use]
    pub fn hot_logs(&self, execution_id: ExecutionId) -> Vec<LogEntry> {
        self.hot
            .lock()
            .get(&execution_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Hot entries when cached, otherwise the persisted milestones.
    pub async fn logs(&self, execution_id: ExecutionId) -> Result<Vec<LogEntry>, EngineError> {
        let hot = self.hot_logs(execution_id);
        if hot.is_empty() {
            Ok(self.repo.for_execution(execution_id).await?)
        } else {
            Ok(hot)
        }
    }
}

impl std::fmt::Debug for LogSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogSink")
            .field("hot_executions", &self.hot.lock().len())
            .finish_non_exhaustive()
    }
}
