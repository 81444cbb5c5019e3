use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use jobline_core::JobKey;
use jobline_invoke::{ExecutionContext, Invoker};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::sink::LogSink;
use crate::types::{ExecutionResult, FailureStage, FiringInfo, Outcome, Trigger};

/// Runs one firing end to end and reports it to the sinks.
///
/// Opens an [`ExecutionContext`], drives the invoker inside it, then closes
/// the context and hands the [`ExecutionResult`] to every sink. Failures of
/// any stage end up in the result; `execute` itself cannot fail.
pub struct Executor {
    invoker: Invoker,
    sinks: Vec<Arc<dyn LogSink>>,
}

impl Executor {
    pub fn new(invoker: Invoker) -> Self {
        Self {
            invoker,
            sinks: Vec::new(),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn invoker(&self) -> &Invoker {
        &self.invoker
    }

    /// Execute `target` for `job`. Cancelling `abort` interrupts the job body
    /// and yields a Failed result with stage [`FailureStage::Aborted`].
    pub async fn execute(
        &self,
        job: &JobKey,
        target: &str,
        trigger: Trigger,
        abort: &CancellationToken,
    ) -> ExecutionResult {
        let firing_id = Uuid::now_v7();
        let ctx = ExecutionContext::open(job.clone(), target);
        let clock = Instant::now();

        let firing = FiringInfo {
            firing_id,
            job: job.clone(),
            target: target.to_string(),
            trigger: trigger.clone(),
            started_at: ctx.started_at(),
        };
        for sink in &self.sinks {
            sink.job_starting(&firing).await;
        }
        debug!(job = %job, %firing_id, trigger = trigger.kind(), "job starting");

        let failure = tokio::select! {
            biased;
            outcome = ctx.scope(self.invoker.run(target)) => {
                outcome.err().map(|e| (FailureStage::from(e.stage()), e.to_string()))
            }
            _ = abort.cancelled() => {
                Some((FailureStage::Aborted, "firing aborted by forced shutdown".to_string()))
            }
        };

        let elapsed_ms = clock.elapsed().as_millis() as u64;
        let log = ctx.close();
        let (outcome, stage, error) = match failure {
            None => (Outcome::Succeeded, None, None),
            Some((stage, error)) => (Outcome::Failed, Some(stage), Some(error)),
        };
        let result = ExecutionResult {
            firing_id,
            job: job.clone(),
            target: target.to_string(),
            trigger,
            outcome,
            started_at: firing.started_at,
            finished_at: Utc::now(),
            elapsed_ms,
            log,
            stage,
            error,
        };

        match (&result.stage, &result.error) {
            (Some(stage), Some(error)) => {
                warn!(job = %job, %firing_id, %stage, elapsed_ms, "job failed: {error}")
            }
            _ => info!(job = %job, %firing_id, elapsed_ms, "job completed"),
        }

        for sink in &self.sinks {
            sink.job_completed(&result).await;
        }
        result
    }
}
