//! Timeout monitor — a background loop over pause records.
//!
//! Each cycle: emit one warning per record inside the warning window, and
//! apply the timeout action to records whose deadline passed. Deletion of
//! the pause record is the linearization point against external resumers,
//! so an expired record is acted on by exactly one party.

use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use weft_execution::{EventType, LogEntry};

use crate::engine::WorkflowEngine;
use crate::error::EngineError;

/// Background scanner applying warnings and timeout actions to pauses.
pub struct TimeoutMonitor {
    engine: Arc<WorkflowEngine>,
    shutdown: CancellationToken,
}

impl TimeoutMonitor {
    /// Create a monitor over an engine.
    #[must_use]
    pub fn new(engine: Arc<WorkflowEngine>) -> Self {
        Self {
            engine,
            shutdown: CancellationToken::new(),
        }
    }

    /// Token that stops the loop when cancelled.
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Spawn the scan loop on the current runtime.
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let interval = self.engine.config().monitor_interval;
            loop {
                tokio::select! {
                    () = self.shutdown.cancelled() => break,
                    () = tokio::time::sleep(interval) => {}
                }
                if let Err(err) = self.tick().await {
                    tracing::warn!(error = %err, "timeout monitor tick failed");
                }
            }
        })
    }

    /// One scan over all open pause records.
    pub async fn tick(&self) -> Result<(), EngineError> {
        let now = Utc::now();
        let warning_window = self.engine.config().warning_window;

        for record in self.engine.pauses().list().await? {
            if record.is_expired(now) {
                // Losing the CAS means an external resume got there first.
                let applied = self.engine.apply_timeout(&record).await?;
                if !applied {
                    tracing::debug!(
                        execution = %record.execution_id,
                        "pause resolved before the timeout could apply"
                    );
                }
                continue;
            }

            if record.warning_due(now, warning_window) {
                // The warned flag is CAS-guarded so the warning fires once
                // even with overlapping monitor cycles.
                let marked = self
                    .engine
                    .pauses()
                    .mark_warned(record.execution_id, record.version)
                    .await?;
                if marked {
                    let remaining = (record.deadline - now).num_seconds().max(0);
                    self.engine
                        .sink()
                        .emit(
                            LogEntry::new(
                                record.execution_id,
                                EventType::TimeoutWarning,
                                format!("⏳ Pause times out in {remaining}s"),
                            )
                            .with_node(record.node_id),
                        )
                        .await?;
                }
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for TimeoutMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimeoutMonitor").finish_non_exhaustive()
    }
}
