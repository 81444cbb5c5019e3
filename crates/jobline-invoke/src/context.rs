//! Per-firing log buffer that job bodies reach without a handle.
//!
//! The current [`ExecutionContext`] is a Tokio task-local bound around the
//! firing's future with [`ExecutionContext::scope`]. Tokio re-enters the
//! task-local on every poll, so the binding follows the firing across await
//! points no matter which worker thread resumes it, and sibling firings on
//! the same worker never see it. Work spawned from a job body inherits the
//! context only through [`spawn`] and [`spawn_blocking`].

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use jobline_core::JobKey;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

tokio::task_local! {
    static CURRENT: ExecutionContext;
}

/// One timestamped line of a firing's log.
#[derive(Debug, Clone, PartialEq)]
pub struct LogLine {
    pub at: DateTime<Utc>,
    pub text: String,
}

impl fmt::Display for LogLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.at.format("%Y-%m-%d %H:%M:%S%.3f"), self.text)
    }
}

#[derive(Debug, Default)]
struct Buffer {
    lines: Vec<LogLine>,
    closed: bool,
}

#[derive(Debug)]
struct Inner {
    job: JobKey,
    target: String,
    started_at: DateTime<Utc>,
    buffer: Mutex<Buffer>,
}

/// Handle to one firing's context. Clones share the same buffer.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    inner: Arc<Inner>,
}

impl ExecutionContext {
    pub fn open(job: JobKey, target: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Inner {
                job,
                target: target.into(),
                started_at: Utc::now(),
                buffer: Mutex::new(Buffer::default()),
            }),
        }
    }

    pub fn job(&self) -> &JobKey {
        &self.inner.job
    }

    pub fn target(&self) -> &str {
        &self.inner.target
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.inner.started_at
    }

    /// Append a line. Returns `false` once the context has been closed.
    pub fn append(&self, text: impl Into<String>) -> bool {
        let mut buffer = self.inner.buffer.lock().expect("context buffer poisoned");
        if buffer.closed {
            warn!(job = %self.inner.job, "log line dropped: firing already completed");
            return false;
        }
        buffer.lines.push(LogLine {
            at: Utc::now(),
            text: text.into(),
        });
        true
    }

    /// Snapshot of the lines appended so far.
    pub fn lines(&self) -> Vec<LogLine> {
        let buffer = self.inner.buffer.lock().expect("context buffer poisoned");
        buffer.lines.clone()
    }

    /// Seal the buffer and return the accumulated log, one line per entry.
    pub fn close(&self) -> String {
        let mut buffer = self.inner.buffer.lock().expect("context buffer poisoned");
        buffer.closed = true;
        buffer
            .lines
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn is_closed(&self) -> bool {
        self.inner.buffer.lock().expect("context buffer poisoned").closed
    }

    /// Run `fut` with this context as the current one.
    pub async fn scope<F: Future>(&self, fut: F) -> F::Output {
        CURRENT.scope(self.clone(), fut).await
    }

    /// The context bound to the calling task, if any.
    pub fn current() -> Option<Self> {
        CURRENT.try_with(Clone::clone).ok()
    }

    pub fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// Append `text` to the current firing's log.
///
/// Returns `false` when called outside a firing or after it completed.
pub fn log(text: impl Into<String>) -> bool {
    let text = text.into();
    match ExecutionContext::current() {
        Some(ctx) => ctx.append(text),
        None => {
            debug!(%text, "job log line outside of a firing");
            false
        }
    }
}

/// `format!`-style shorthand for [`log`].
#[macro_export]
macro_rules! job_log {
    ($($arg:tt)*) => {
        $crate::context::log(::std::format!($($arg)*))
    };
}

/// `tokio::spawn` that carries the current context into the child task.
pub fn spawn<F>(fut: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    match ExecutionContext::current() {
        Some(ctx) => tokio::spawn(CURRENT.scope(ctx, fut)),
        None => tokio::spawn(fut),
    }
}

/// `tokio::task::spawn_blocking` that carries the current context into the
/// blocking closure.
pub fn spawn_blocking<F, R>(f: F) -> JoinHandle<R>
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    match ExecutionContext::current() {
        Some(ctx) => tokio::task::spawn_blocking(move || CURRENT.sync_scope(ctx, f)),
        None => tokio::task::spawn_blocking(f),
    }
}
