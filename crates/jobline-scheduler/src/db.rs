use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jobline_core::JobKey;
use rusqlite::Connection;
use serde::Serialize;
use tracing::{error, warn};

use crate::error::{Result, SchedulerError};
use crate::sink::LogSink;
use crate::types::{ExecutionResult, FailureStage, Outcome, Trigger};

/// Initialise the execution-log schema in `conn`.
///
/// Creates the `job_log` table (idempotent) and an index for the
/// per-job "most recent first" listing.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS job_log (
            firing_id   TEXT    NOT NULL PRIMARY KEY,   -- UUID v7
            job_name    TEXT    NOT NULL,
            job_group   TEXT    NOT NULL,
            target      TEXT    NOT NULL,
            trigger_json TEXT   NOT NULL,               -- JSON-encoded Trigger
            outcome     TEXT    NOT NULL,
            stage       TEXT,                           -- NULL on success
            error       TEXT,                           -- NULL on success
            log         TEXT    NOT NULL,
            started_at  TEXT    NOT NULL,               -- ISO-8601
            finished_at TEXT    NOT NULL,
            elapsed_ms  INTEGER NOT NULL
        ) STRICT;

        CREATE INDEX IF NOT EXISTS idx_job_log_job
            ON job_log (job_group, job_name, started_at);
        ",
    )?;
    Ok(())
}

/// One persisted row of `job_log`.
#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub firing_id: String,
    pub job: JobKey,
    pub target: String,
    pub trigger: Trigger,
    pub outcome: Outcome,
    pub stage: Option<FailureStage>,
    pub error: Option<String>,
    pub log: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub elapsed_ms: u64,
}

/// Log sink that appends every completed firing to SQLite.
pub struct SqliteLogSink {
    conn: Mutex<Connection>,
}

impl SqliteLogSink {
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn record(&self, result: &ExecutionResult) -> Result<()> {
        let trigger = serde_json::to_string(&result.trigger)?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO job_log
             (firing_id, job_name, job_group, target, trigger_json, outcome, stage,
              error, log, started_at, finished_at, elapsed_ms)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12)",
            rusqlite::params![
                result.firing_id.to_string(),
                result.job.name,
                result.job.group,
                result.target,
                trigger,
                result.outcome.to_string(),
                result.stage.map(|s| s.to_string()),
                result.error,
                result.log,
                result.started_at.to_rfc3339(),
                result.finished_at.to_rfc3339(),
                result.elapsed_ms as i64,
            ],
        )?;
        Ok(())
    }

    /// Most recent entries for `key`, newest first.
    pub fn recent(&self, key: &JobKey, limit: usize) -> Result<Vec<LogEntry>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT firing_id, target, trigger_json, outcome, stage, error, log,
                    started_at, finished_at, elapsed_ms
             FROM job_log
             WHERE job_group = ?1 AND job_name = ?2
             ORDER BY started_at DESC, firing_id DESC
             LIMIT ?3",
        )?;

        let entries = stmt
            .query_map(
                rusqlite::params![key.group, key.name, limit as i64],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,         // firing_id
                        row.get::<_, String>(1)?,         // target
                        row.get::<_, String>(2)?,         // trigger JSON
                        row.get::<_, String>(3)?,         // outcome
                        row.get::<_, Option<String>>(4)?, // stage
                        row.get::<_, Option<String>>(5)?, // error
                        row.get::<_, String>(6)?,         // log
                        row.get::<_, String>(7)?,         // started_at
                        row.get::<_, String>(8)?,         // finished_at
                        row.get::<_, i64>(9)?,            // elapsed_ms
                    ))
                },
            )?
            .filter_map(|row| {
                let decoded = row
                    .map_err(SchedulerError::from)
                    .and_then(|raw| decode(key, raw));
                match decoded {
                    Ok(entry) => Some(entry),
                    Err(e) => {
                        warn!(job = %key, code = e.code(), "skipping unreadable job_log row: {e}");
                        None
                    }
                }
            })
            .collect();

        Ok(entries)
    }

    /// Delete the log of `key`, or the whole log when `None`. Returns the row count.
    pub fn clear(&self, key: Option<&JobKey>) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let n = match key {
            Some(key) => conn.execute(
                "DELETE FROM job_log WHERE job_group = ?1 AND job_name = ?2",
                [&key.group, &key.name],
            )?,
            None => conn.execute("DELETE FROM job_log", [])?,
        };
        Ok(n)
    }
}

/// Columns of one `job_log` row, in `recent`'s SELECT order.
type RawRow = (
    String,
    String,
    String,
    String,
    Option<String>,
    Option<String>,
    String,
    String,
    String,
    i64,
);

fn decode(key: &JobKey, raw: RawRow) -> Result<LogEntry> {
    let (
        firing_id,
        target,
        trigger_json,
        outcome,
        stage,
        error,
        log,
        started_at,
        finished_at,
        elapsed_ms,
    ) = raw;
    let stage = match stage {
        Some(s) => Some(s.parse().map_err(|e: String| malformed(&firing_id, e))?),
        None => None,
    };
    Ok(LogEntry {
        job: key.clone(),
        target,
        trigger: serde_json::from_str(&trigger_json)
            .map_err(|e| malformed(&firing_id, e.to_string()))?,
        outcome: outcome.parse().map_err(|e: String| malformed(&firing_id, e))?,
        stage,
        error,
        log,
        started_at: parse_timestamp(&firing_id, &started_at)?,
        finished_at: parse_timestamp(&firing_id, &finished_at)?,
        elapsed_ms: elapsed_ms.max(0) as u64,
        firing_id,
    })
}

fn parse_timestamp(firing_id: &str, s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| malformed(firing_id, e.to_string()))
}

fn malformed(firing_id: &str, reason: String) -> SchedulerError {
    SchedulerError::CorruptLogEntry {
        firing_id: firing_id.to_string(),
        reason,
    }
}

#[async_trait]
impl LogSink for SqliteLogSink {
    async fn job_completed(&self, result: &ExecutionResult) {
        if let Err(e) = self.record(result) {
            error!(job = %result.job, firing_id = %result.firing_id, "failed to persist job log: {e}");
        }
    }
}
