use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tracing::{info, warn};

use crate::types::{ExecutionResult, FiringInfo};

/// Receives the lifecycle notifications of every firing.
///
/// For each firing that reaches Running, `job_starting` is called once and
/// then `job_completed` is called once, success or failure. Sinks report
/// their own failures; nothing they do can fail the firing.
#[async_trait]
pub trait LogSink: Send + Sync {
    /// The firing is about to run its job body.
    async fn job_starting(&self, _firing: &FiringInfo) {}

    async fn job_completed(&self, result: &ExecutionResult);
}

/// Writes one structured `tracing` event per completed firing.
#[derive(Debug, Default)]
pub struct TracingSink;

#[async_trait]
impl LogSink for TracingSink {
    async fn job_completed(&self, result: &ExecutionResult) {
        if result.succeeded() {
            info!(
                job = %result.job,
                firing_id = %result.firing_id,
                trigger = result.trigger.kind(),
                elapsed_ms = result.elapsed_ms,
                "job succeeded"
            );
        } else {
            warn!(
                job = %result.job,
                firing_id = %result.firing_id,
                trigger = result.trigger.kind(),
                elapsed_ms = result.elapsed_ms,
                stage = ?result.stage,
                error = result.error.as_deref().unwrap_or_default(),
                "job failed"
            );
        }
    }
}

/// Keeps every notification in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    started: Mutex<Vec<FiringInfo>>,
    results: Mutex<Vec<ExecutionResult>>,
    changed: Notify,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn started(&self) -> Vec<FiringInfo> {
        self.started.lock().unwrap().clone()
    }

    pub fn results(&self) -> Vec<ExecutionResult> {
        self.results.lock().unwrap().clone()
    }

    /// Wait until at least `count` results arrived or `timeout` elapsed,
    /// then return whatever has been collected.
    pub async fn wait_for(&self, count: usize, timeout: Duration) -> Vec<ExecutionResult> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let changed = self.changed.notified();
            {
                let results = self.results.lock().unwrap();
                if results.len() >= count {
                    return results.clone();
                }
            }
            if tokio::time::timeout_at(deadline, changed).await.is_err() {
                return self.results();
            }
        }
    }
}

#[async_trait]
impl LogSink for MemorySink {
    async fn job_starting(&self, firing: &FiringInfo) {
        self.started.lock().unwrap().push(firing.clone());
    }

    async fn job_completed(&self, result: &ExecutionResult) {
        self.results.lock().unwrap().push(result.clone());
        self.changed.notify_waiters();
    }
}
