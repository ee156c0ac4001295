use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Opaque payload attached to a job and handed to its handler untouched.
pub type JobData = Map<String, Value>;

/// Whether a job runs once or re-arms after every successful run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleType {
    /// Runs once at `next_run_at`.
    Simple,
    /// Re-parses `schedule_expression` after each successful run.
    Recurrent,
}

impl std::fmt::Display for ScheduleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ScheduleType::Simple => "simple",
            ScheduleType::Recurrent => "recurrent",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for ScheduleType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "simple" => Ok(ScheduleType::Simple),
            "recurrent" => Ok(ScheduleType::Recurrent),
            other => Err(format!("unknown schedule type: {other}")),
        }
    }
}

/// Lifecycle state of a job.
///
/// Only `Pending` jobs are picked up by the engine. `Canceled` is reached
/// exclusively through [`crate::Scheduler::cancel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting for its next_run_at time.
    Pending,
    /// Finished; SIMPLE after its single run, RECURRENT once past its limit date.
    Done,
    /// The handler errored, was missing, or the job could not be re-armed.
    Failed,
    /// Stopped by the host application.
    Canceled,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobStatus::Pending => "pending",
            JobStatus::Done => "done",
            JobStatus::Failed => "failed",
            JobStatus::Canceled => "canceled",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "done" => Ok(JobStatus::Done),
            "failed" => Ok(JobStatus::Failed),
            "canceled" => Ok(JobStatus::Canceled),
            other => Err(format!("unknown job status: {other}")),
        }
    }
}

/// A persisted job record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Store-assigned identity; `None` until the first save.
    pub id: Option<String>,
    /// Job definition name used to look up the handler.
    pub name: String,
    pub schedule_type: ScheduleType,
    pub status: JobStatus,
    /// The job is due once now >= next_run_at.
    pub next_run_at: DateTime<Utc>,
    /// Completion time of the most recent successful run.
    pub last_run_at: Option<DateTime<Utc>>,
    /// Recurrence text; empty for SIMPLE jobs.
    pub schedule_expression: String,
    /// RECURRENT jobs finishing after this instant are marked done instead of re-armed.
    pub schedule_limit_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub data: JobData,
}

impl Job {
    /// A new, unsaved SIMPLE job.
    pub fn simple(name: impl Into<String>, next_run_at: DateTime<Utc>, data: JobData) -> Self {
        Self {
            id: None,
            name: name.into(),
            schedule_type: ScheduleType::Simple,
            status: JobStatus::Pending,
            next_run_at,
            last_run_at: None,
            schedule_expression: String::new(),
            schedule_limit_date: None,
            data,
        }
    }

    /// A new, unsaved RECURRENT job.
    pub fn recurrent(
        name: impl Into<String>,
        expression: impl Into<String>,
        next_run_at: DateTime<Utc>,
        limit: Option<DateTime<Utc>>,
        data: JobData,
    ) -> Self {
        Self {
            id: None,
            name: name.into(),
            schedule_type: ScheduleType::Recurrent,
            status: JobStatus::Pending,
            next_run_at,
            last_run_at: None,
            schedule_expression: expression.into(),
            schedule_limit_date: limit,
            data,
        }
    }

    /// Identity for log fields; `-` before the first save.
    pub fn id_str(&self) -> &str {
        self.id.as_deref().unwrap_or("-")
    }

    pub fn is_pending(&self) -> bool {
        self.status == JobStatus::Pending
    }

    pub fn is_done(&self) -> bool {
        self.status == JobStatus::Done
    }

    pub fn has_failed(&self) -> bool {
        self.status == JobStatus::Failed
    }

    pub fn is_canceled(&self) -> bool {
        self.status == JobStatus::Canceled
    }

    pub fn is_simple(&self) -> bool {
        self.schedule_type == ScheduleType::Simple
    }

    pub fn is_recurrent(&self) -> bool {
        self.schedule_type == ScheduleType::Recurrent
    }

    /// True when the job is pending and `now` has reached its next run.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.is_pending() && self.next_run_at <= now
    }
}

/// Query criteria for [`crate::store::JobStore::list`].
///
/// Every criterion that is set must match. An empty filter matches all jobs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobFilter {
    pub name: Option<String>,
    pub status: Option<JobStatus>,
    /// Each key must be present in the job payload with an equal value.
    pub data: JobData,
}

impl JobFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn data(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    pub fn matches(&self, job: &Job) -> bool {
        if self.name.as_ref().is_some_and(|n| *n != job.name) {
            return false;
        }
        if self.status.is_some_and(|s| s != job.status) {
            return false;
        }
        self.data.iter().all(|(k, v)| job.data.get(k) == Some(v))
    }
}
