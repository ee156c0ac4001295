use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    error::StoreResult,
    types::{Job, JobFilter},
};

/// Persistence contract the scheduler depends on.
///
/// Implementations must be safe to share between the engine loop and the
/// host's API calls. Every method may fail; the engine logs and moves on.
pub trait JobStore: Send + Sync {
    /// Prepare the backing storage. Called once by the scheduler; idempotent.
    fn init(&self) -> StoreResult<()>;

    /// All pending jobs whose `next_run_at` is at or before `now`, oldest first.
    fn list_expired(&self, now: DateTime<Utc>) -> StoreResult<Vec<Job>>;

    /// All jobs matching `filter`.
    fn list(&self, filter: &JobFilter) -> StoreResult<Vec<Job>>;

    /// Insert `job` when it has no id (assigning one), otherwise update it in place.
    fn save(&self, job: &mut Job) -> StoreResult<()>;

    /// Remove `job` by id. Deleting an unsaved or unknown job is a no-op.
    fn delete(&self, job: &Job) -> StoreResult<()>;
}

/// Process-local store keyed by job id. Used when no database is configured.
#[derive(Default)]
pub struct MemoryStore {
    jobs: Mutex<BTreeMap<String, Job>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn jobs(&self) -> MutexGuard<'_, BTreeMap<String, Job>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl JobStore for MemoryStore {
    fn init(&self) -> StoreResult<()> {
        Ok(())
    }

    fn list_expired(&self, now: DateTime<Utc>) -> StoreResult<Vec<Job>> {
        let mut due: Vec<Job> = self.jobs().values().filter(|j| j.is_due(now)).cloned().collect();
        due.sort_by_key(|j| j.next_run_at);
        Ok(due)
    }

    fn list(&self, filter: &JobFilter) -> StoreResult<Vec<Job>> {
        Ok(self.jobs().values().filter(|j| filter.matches(j)).cloned().collect())
    }

    fn save(&self, job: &mut Job) -> StoreResult<()> {
        let id = job
            .id
            .get_or_insert_with(|| Uuid::new_v4().to_string())
            .clone();
        self.jobs().insert(id, job.clone());
        Ok(())
    }

    fn delete(&self, job: &Job) -> StoreResult<()> {
        if let Some(id) = &job.id {
            self.jobs().remove(id);
        }
        Ok(())
    }
}
