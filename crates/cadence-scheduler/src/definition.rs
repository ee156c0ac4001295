use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::{
    error::ScheduleError,
    schedule::next_run,
    types::{Job, JobData},
};

/// A SIMPLE job that runs once at a fixed instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OneShot {
    at: DateTime<Utc>,
}

impl OneShot {
    /// Run once at `at`.
    pub fn at<Tz: TimeZone>(at: DateTime<Tz>) -> Self {
        Self {
            at: at.with_timezone(&Utc),
        }
    }

    /// Run once, `offset` from now.
    pub fn after(offset: Duration) -> Self {
        Self {
            at: Utc::now() + offset,
        }
    }

    pub fn next_run_at(&self) -> DateTime<Utc> {
        self.at
    }
}

/// A RECURRENT job re-armed from a schedule string after every success.
///
/// See [`crate::schedule`] for the accepted forms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recurring {
    expression: String,
    until: Option<DateTime<Utc>>,
}

impl Recurring {
    pub fn every(expression: impl Into<String>) -> Self {
        Self {
            expression: expression.into(),
            until: None,
        }
    }

    /// Mark the job done instead of re-arming once a run finishes after `limit`.
    pub fn until<Tz: TimeZone>(self, limit: DateTime<Tz>) -> Self {
        Self {
            until: Some(limit.with_timezone(&Utc)),
            ..self
        }
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    pub fn limit(&self) -> Option<DateTime<Utc>> {
        self.until
    }
}

/// Either kind of schedule, ready to be committed with
/// [`crate::Scheduler::schedule`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleDefinition {
    Once(OneShot),
    Every(Recurring),
}

impl ScheduleDefinition {
    /// Build the unsaved PENDING job. Recurring schedules are parsed here,
    /// relative to `now`.
    pub fn to_job<Tz: TimeZone>(
        &self,
        name: &str,
        data: JobData,
        now: &DateTime<Tz>,
    ) -> Result<Job, ScheduleError> {
        match self {
            ScheduleDefinition::Once(once) => Ok(Job::simple(name, once.at, data)),
            ScheduleDefinition::Every(rec) => {
                let next = next_run(&rec.expression, now)?.with_timezone(&Utc);
                Ok(Job::recurrent(name, rec.expression.clone(), next, rec.until, data))
            }
        }
    }
}

impl From<OneShot> for ScheduleDefinition {
    fn from(once: OneShot) -> Self {
        ScheduleDefinition::Once(once)
    }
}

impl From<Recurring> for ScheduleDefinition {
    fn from(rec: Recurring) -> Self {
        ScheduleDefinition::Every(rec)
    }
}
