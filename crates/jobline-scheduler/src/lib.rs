//! `jobline-scheduler`: cron-driven firing of invocation targets.
//!
//! # Overview
//!
//! A [`Scheduler`] owns the job table. Its timer loop ([`Scheduler::run`])
//! calls [`Scheduler::tick`] every `tick_interval_ms`; each due job gets a
//! firing, which the [`Executor`] runs inside its own execution context and
//! reports to every [`LogSink`].
//!
//! # Misfire policies
//!
//! | Policy      | Fire times observed late or while the job is busy           |
//! |-------------|-------------------------------------------------------------|
//! | `fire_now`  | One catch-up, started as soon as the job is idle            |
//! | `fire_once` | Coalesced into one catch-up on the next tick the job is idle |
//! | `skip`      | Dropped; the job waits for its next regular occurrence      |

pub mod db;
pub mod engine;
pub mod error;
pub mod execution;
pub mod schedule;
pub mod sink;
pub mod types;

pub use db::{LogEntry, SqliteLogSink};
pub use engine::{FiringHandle, Scheduler};
pub use error::{Result, SchedulerError};
pub use execution::Executor;
pub use sink::{LogSink, MemorySink, TracingSink};
pub use types::{
    ExecutionResult, FailureStage, FiringInfo, JobInfo, Outcome, ShutdownMode, Trigger,
};
