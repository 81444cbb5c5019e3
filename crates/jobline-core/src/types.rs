use serde::{Deserialize, Serialize};
use std::fmt;

/// Group used when a job definition does not name one.
pub const DEFAULT_GROUP: &str = "DEFAULT";

/// Identity of a job: `(name, group)`, unique together.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobKey {
    pub group: String,
    pub name: String,
}

impl JobKey {
    pub fn new(name: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            group: group.into(),
        }
    }

    /// Key in the default group.
    pub fn named(name: impl Into<String>) -> Self {
        Self::new(name, DEFAULT_GROUP)
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.group, self.name)
    }
}

/// What to do with scheduled fire times that were missed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MisfirePolicy {
    /// One catch-up firing, started immediately on recovery.
    #[default]
    FireNow,
    /// Coalesce every missed fire into a single catch-up firing on the next idle tick.
    FireOnce,
    /// Discard missed fires and wait for the next regular occurrence.
    Skip,
}

impl fmt::Display for MisfirePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MisfirePolicy::FireNow => "fire_now",
            MisfirePolicy::FireOnce => "fire_once",
            MisfirePolicy::Skip => "skip",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for MisfirePolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "fire_now" => Ok(MisfirePolicy::FireNow),
            "fire_once" => Ok(MisfirePolicy::FireOnce),
            "skip" => Ok(MisfirePolicy::Skip),
            other => Err(format!("unknown misfire policy: {other}")),
        }
    }
}

/// Registration state of a job definition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Trigger is scheduled and fires on its cron expression.
    #[default]
    Normal,
    /// Registered, but produces no scheduled fires until resumed.
    Paused,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Normal => "normal",
            JobStatus::Paused => "paused",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "normal" => Ok(JobStatus::Normal),
            "paused" => Ok(JobStatus::Paused),
            other => Err(format!("unknown job status: {other}")),
        }
    }
}

/// A cron-triggered job whose work is described by an invocation target
/// such as `ReportJob.GenerateReport('daily')`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDefinition {
    pub name: String,
    #[serde(default = "default_group")]
    pub group: String,
    /// Quartz-style cron expression (seconds field first), evaluated in UTC.
    pub cron: String,
    /// `Component.Method` or `Component.Method(arg, ...)`.
    pub target: String,
    #[serde(default)]
    pub misfire: MisfirePolicy,
    /// When false, firings of this job never overlap with each other.
    #[serde(default)]
    pub concurrent: bool,
    #[serde(default)]
    pub status: JobStatus,
}

impl JobDefinition {
    pub fn new(
        key: JobKey,
        cron: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self {
            name: key.name,
            group: key.group,
            cron: cron.into(),
            target: target.into(),
            misfire: MisfirePolicy::default(),
            concurrent: false,
            status: JobStatus::default(),
        }
    }

    pub fn with_misfire(mut self, misfire: MisfirePolicy) -> Self {
        self.misfire = misfire;
        self
    }

    pub fn with_concurrent(mut self, concurrent: bool) -> Self {
        self.concurrent = concurrent;
        self
    }

    pub fn with_status(mut self, status: JobStatus) -> Self {
        self.status = status;
        self
    }

    pub fn key(&self) -> JobKey {
        JobKey::new(self.name.clone(), self.group.clone())
    }
}

fn default_group() -> String {
    DEFAULT_GROUP.to_string()
}
