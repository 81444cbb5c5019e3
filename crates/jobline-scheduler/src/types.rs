use chrono::{DateTime, Utc};
use jobline_core::{JobDefinition, JobKey};
use jobline_invoke::Stage;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Why a firing was issued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Trigger {
    /// Regular cron occurrence.
    Scheduled { at: DateTime<Utc> },
    /// Catch-up for fire times observed too late (engine lagging, job paused).
    Misfire {
        scheduled_at: DateTime<Utc>,
        missed: u32,
    },
    /// Catch-up for fire times that arrived while the job was still busy.
    CatchUp { missed: u32 },
    /// Out-of-band `trigger_now`.
    Manual,
}

impl Trigger {
    pub fn kind(&self) -> &'static str {
        match self {
            Trigger::Scheduled { .. } => "scheduled",
            Trigger::Misfire { .. } => "misfire",
            Trigger::CatchUp { .. } => "catch_up",
            Trigger::Manual => "manual",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Succeeded,
    Failed,
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Outcome::Succeeded => "succeeded",
            Outcome::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for Outcome {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "succeeded" => Ok(Outcome::Succeeded),
            "failed" => Ok(Outcome::Failed),
            other => Err(format!("unknown outcome: {other}")),
        }
    }
}

/// Where a failed firing stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    Parse,
    Resolve,
    Invoke,
    /// Interrupted by a forced shutdown.
    Aborted,
}

impl From<Stage> for FailureStage {
    fn from(stage: Stage) -> Self {
        match stage {
            Stage::Parse => FailureStage::Parse,
            Stage::Resolve => FailureStage::Resolve,
            Stage::Invoke => FailureStage::Invoke,
        }
    }
}

impl std::fmt::Display for FailureStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FailureStage::Parse => "parse",
            FailureStage::Resolve => "resolve",
            FailureStage::Invoke => "invoke",
            FailureStage::Aborted => "aborted",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for FailureStage {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "parse" => Ok(FailureStage::Parse),
            "resolve" => Ok(FailureStage::Resolve),
            "invoke" => Ok(FailureStage::Invoke),
            "aborted" => Ok(FailureStage::Aborted),
            other => Err(format!("unknown failure stage: {other}")),
        }
    }
}

/// Handed to sinks when a firing enters Running.
#[derive(Debug, Clone, Serialize)]
pub struct FiringInfo {
    pub firing_id: Uuid,
    pub job: JobKey,
    pub target: String,
    pub trigger: Trigger,
    pub started_at: DateTime<Utc>,
}

/// Record of one completed firing, handed to every log sink exactly once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// UUID v7, so ids sort by start time.
    pub firing_id: Uuid,
    pub job: JobKey,
    pub target: String,
    pub trigger: Trigger,
    pub outcome: Outcome,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    /// Lines the job body logged, newline separated.
    pub log: String,
    /// Set on failure only.
    pub stage: Option<FailureStage>,
    /// Set on failure only; never empty.
    pub error: Option<String>,
}

impl ExecutionResult {
    pub fn succeeded(&self) -> bool {
        self.outcome == Outcome::Succeeded
    }
}

/// Snapshot of a registered job.
#[derive(Debug, Clone, Serialize)]
pub struct JobInfo {
    pub definition: JobDefinition,
    pub next_fire: Option<DateTime<Utc>>,
    pub last_fired: Option<DateTime<Utc>>,
    /// Firings issued and not yet finished (waiting or running).
    pub in_flight: usize,
}

/// How [`Scheduler::shutdown`](crate::Scheduler::shutdown) treats in-flight firings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShutdownMode {
    /// Let every issued firing run to completion.
    Graceful,
    /// Interrupt running job bodies; waiting firings never start.
    Forced,
}
