use thiserror::Error;

/// Errors that can occur within the scheduler subsystem.
///
/// Management callers should match on the variant (or [`SchedulerError::code`])
/// rather than on the message.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// A job with the same `(name, group)` is already registered.
    #[error("Job already exists: {key}")]
    DuplicateJob { key: String },

    /// No job with the given key is registered.
    #[error("Job not found: {key}")]
    JobNotFound { key: String },

    /// A scheduled firing was still waiting when its job was paused.
    #[error("Job paused: {key}")]
    JobPaused { key: String },

    #[error("Invalid cron expression `{expression}`: {reason}")]
    InvalidCronExpression { expression: String, reason: String },

    /// The scheduler has begun shutting down and accepts no new firings.
    #[error("Scheduler is shutting down")]
    ShuttingDown,

    /// Underlying SQLite / rusqlite error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A persisted job log row could not be decoded.
    #[error("Corrupt job log entry {firing_id}: {reason}")]
    CorruptLogEntry { firing_id: String, reason: String },
}

impl SchedulerError {
    /// Stable machine-readable code for the management surface.
    pub fn code(&self) -> &'static str {
        match self {
            SchedulerError::DuplicateJob { .. } => "DUPLICATE_JOB",
            SchedulerError::JobNotFound { .. } => "JOB_NOT_FOUND",
            SchedulerError::JobPaused { .. } => "JOB_PAUSED",
            SchedulerError::InvalidCronExpression { .. } => "INVALID_CRON",
            SchedulerError::ShuttingDown => "SHUTTING_DOWN",
            SchedulerError::Database(_) => "DATABASE_ERROR",
            SchedulerError::Serialization(_) => "SERIALIZATION_ERROR",
            SchedulerError::CorruptLogEntry { .. } => "CORRUPT_LOG_ENTRY",
        }
    }
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
