use std::any::Any;
use std::convert::Infallible;

use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::{
    error::ScheduleError,
    schedule::next_run,
    scheduler::Scheduler,
    types::{Job, JobStatus},
};

/// What happens to a job whose handler just succeeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Outcome {
    Done,
    Reschedule(DateTime<Utc>),
    /// Recurrent job without an expression to re-arm from.
    MissingExpression,
    InvalidExpression(ScheduleError),
}

/// Decide the post-run transition for `job`, finished at `finished`.
pub(crate) fn after_success<Tz: TimeZone>(job: &Job, finished: &DateTime<Tz>) -> Outcome {
    if job.is_simple() {
        return Outcome::Done;
    }
    if job.schedule_limit_date.is_some_and(|limit| limit < *finished) {
        return Outcome::Done;
    }
    if job.schedule_expression.is_empty() {
        return Outcome::MissingExpression;
    }
    match next_run(&job.schedule_expression, finished) {
        Ok(next) => Outcome::Reschedule(next.with_timezone(&Utc)),
        Err(e) => Outcome::InvalidExpression(e),
    }
}

impl Scheduler {
    /// Drive processing passes until `shutdown` broadcasts `true`.
    ///
    /// Passes run on a supervised task. A panic inside a pass (typically a
    /// handler bug) is logged and the task is started again; it never ends
    /// the loop. Dropping the shutdown sender leaves the loop running for the
    /// rest of the process.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            rate_secs = self.options().processing_rate.as_secs(),
            "scheduler engine started"
        );
        let mut watching = true;

        loop {
            if watching && *shutdown.borrow() {
                info!("scheduler engine shutting down");
                return;
            }

            let mut task = tokio::spawn(self.clone().poll_forever());
            let finished = loop {
                tokio::select! {
                    res = &mut task => break Some(res),
                    changed = shutdown.changed(), if watching => match changed {
                        Ok(()) if *shutdown.borrow() => break None,
                        Ok(()) => {}
                        Err(_) => watching = false,
                    },
                }
            };

            match finished {
                None => {
                    task.abort();
                    info!("scheduler engine shutting down");
                    return;
                }
                Some(Ok(never)) => match never {},
                Some(Err(e)) if e.is_panic() => {
                    error!(
                        "a panic occurred while processing jobs: {}; restarting",
                        panic_message(e.into_panic().as_ref())
                    );
                }
                Some(Err(e)) => {
                    // Only happens when the runtime itself is going away.
                    error!("scheduler task cancelled: {e}");
                    return;
                }
            }
        }
    }

    async fn poll_forever(self) -> Infallible {
        let rate = self.options().processing_rate;
        loop {
            tokio::time::sleep(rate).await;
            self.process_pass();
        }
    }

    /// Run every due job once and persist the resulting state.
    ///
    /// Store failures are logged and never abort the pass, except the
    /// initial listing, which abandons the pass until the next tick.
    pub fn process_pass(&self) {
        let now = self.now().with_timezone(&Utc);
        let jobs = match self.store().list_expired(now) {
            Ok(jobs) => jobs,
            Err(e) => {
                error!("failed to list expired schedules: {e}");
                return;
            }
        };
        if !jobs.is_empty() {
            debug!(count = jobs.len(), "processing due jobs");
        }

        for job in jobs {
            self.process_job(job);
        }
    }

    fn process_job(&self, mut job: Job) {
        let Some(handler) = self.registry().get(&job.name) else {
            error!(
                job_id = %job.id_str(),
                name = %job.name,
                "job was scheduled but no job definition with that name was found"
            );
            self.fail_job(&mut job);
            return;
        };

        if let Err(e) = handler.run(&job) {
            error!(job_id = %job.id_str(), name = %job.name, "job failed: {e}");
            self.fail_job(&mut job);
            return;
        }

        let finished = self.now();
        job.last_run_at = Some(finished.with_timezone(&Utc));

        match after_success(&job, &finished) {
            Outcome::Done => {
                debug!(job_id = %job.id_str(), name = %job.name, "job done");
                if let Err(e) = self.done(&mut job) {
                    error!(job_id = %job.id_str(), "failed to save job after it was done processing: {e}");
                }
            }
            Outcome::Reschedule(next) => {
                job.status = JobStatus::Pending;
                job.next_run_at = next;
                if let Err(e) = self.store().save(&mut job) {
                    error!(job_id = %job.id_str(), "failed to save job to be re-scheduled: {e}");
                    self.fail_job(&mut job);
                    return;
                }
                debug!(job_id = %job.id_str(), name = %job.name, next_run_at = %next, "job re-scheduled");
            }
            Outcome::MissingExpression => {
                error!(job_id = %job.id_str(), "tried to re-schedule recurrent job, but it had no schedule expression");
                self.fail_job(&mut job);
            }
            Outcome::InvalidExpression(e) => {
                error!(job_id = %job.id_str(), "failed to get next schedule date: {e}");
                self.fail_job(&mut job);
            }
        }
    }

    fn fail_job(&self, job: &mut Job) {
        if let Err(e) = self.fail(job) {
            error!(job_id = %job.id_str(), "failed to save job after it failed: {e}");
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
