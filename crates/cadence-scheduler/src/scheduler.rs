use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tracing::info;

use crate::{
    config::{SchedulerConfig, DEFAULT_PROCESSING_RATE_SECS},
    db::SqliteStore,
    definition::ScheduleDefinition,
    error::{Result, SchedulerError},
    registry::{JobHandler, JobRegistry},
    store::{JobStore, MemoryStore},
    types::{Job, JobData, JobFilter, JobStatus},
};

/// Resolved runtime settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerOptions {
    /// Sleep between processing passes.
    pub processing_rate: Duration,
    /// Zone used for "now" and for local-time schedule strings.
    pub timezone: Tz,
    pub delete_on_done: bool,
    pub delete_on_cancel: bool,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            processing_rate: Duration::from_secs(DEFAULT_PROCESSING_RATE_SECS),
            timezone: chrono_tz::UTC,
            delete_on_done: false,
            delete_on_cancel: false,
        }
    }
}

impl SchedulerOptions {
    pub fn from_config(config: &SchedulerConfig) -> Result<Self> {
        Ok(Self {
            processing_rate: config.processing_rate(),
            timezone: config.timezone()?,
            delete_on_done: config.delete_on_done,
            delete_on_cancel: config.delete_on_cancel,
        })
    }
}

/// Handle to one scheduler instance: job definitions, the store, and the
/// settings the background loop runs with.
///
/// Cloning is cheap; every clone shares the same registry and store, so the
/// engine task and the host's API calls see the same definitions.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

struct Inner {
    store: Arc<dyn JobStore>,
    registry: JobRegistry,
    options: SchedulerOptions,
}

impl Scheduler {
    /// Create a scheduler over `store`, initialising the store first.
    pub fn new(store: Arc<dyn JobStore>, options: SchedulerOptions) -> Result<Self> {
        store.init()?;
        info!(
            rate_secs = options.processing_rate.as_secs(),
            timezone = %options.timezone,
            "scheduler initialised"
        );
        Ok(Self {
            inner: Arc::new(Inner {
                store,
                registry: JobRegistry::new(),
                options,
            }),
        })
    }

    /// Build from config: SQLite when `database_path` is set, memory otherwise.
    pub fn from_config(config: &SchedulerConfig) -> Result<Self> {
        let options = SchedulerOptions::from_config(config)?;
        let store: Arc<dyn JobStore> = match &config.database_path {
            Some(path) => {
                info!(%path, "opening SQLite job store");
                Arc::new(SqliteStore::open(path)?)
            }
            None => Arc::new(MemoryStore::new()),
        };
        Self::new(store, options)
    }

    pub fn options(&self) -> &SchedulerOptions {
        &self.inner.options
    }

    /// Current time in the configured zone.
    pub fn now(&self) -> DateTime<Tz> {
        Utc::now().with_timezone(&self.inner.options.timezone)
    }

    /// Register `handler` for jobs named `name`, replacing any previous one.
    pub fn define<H>(&self, name: impl Into<String>, handler: H)
    where
        H: JobHandler + 'static,
    {
        self.inner.registry.define(name, Arc::new(handler));
    }

    pub fn is_defined(&self, name: &str) -> bool {
        self.inner.registry.contains(name)
    }

    /// Persist a new PENDING job for the registered definition `name`.
    ///
    /// Fails with [`SchedulerError::UnknownDefinition`] before touching the
    /// store when nothing is registered under `name`.
    pub fn schedule(
        &self,
        definition: impl Into<ScheduleDefinition>,
        name: &str,
        data: Option<JobData>,
    ) -> Result<Job> {
        if !self.is_defined(name) {
            return Err(SchedulerError::UnknownDefinition {
                name: name.to_string(),
            });
        }
        let definition: ScheduleDefinition = definition.into();
        let mut job = definition.to_job(name, data.unwrap_or_default(), &self.now())?;
        self.inner.store.save(&mut job)?;
        info!(job_id = %job.id_str(), %name, next_run_at = %job.next_run_at, "job scheduled");
        Ok(job)
    }

    pub fn list(&self, filter: &JobFilter) -> Result<Vec<Job>> {
        Ok(self.inner.store.list(filter)?)
    }

    /// Mark `job` DONE; deleted instead of saved when `delete_on_done` is set.
    pub fn done(&self, job: &mut Job) -> Result<()> {
        job.status = JobStatus::Done;
        if self.inner.options.delete_on_done {
            return self.delete(job);
        }
        Ok(self.inner.store.save(job)?)
    }

    /// Mark `job` FAILED and save it.
    pub fn fail(&self, job: &mut Job) -> Result<()> {
        job.status = JobStatus::Failed;
        Ok(self.inner.store.save(job)?)
    }

    /// Mark `job` CANCELED; deleted instead of saved when `delete_on_cancel` is set.
    pub fn cancel(&self, job: &mut Job) -> Result<()> {
        job.status = JobStatus::Canceled;
        if self.inner.options.delete_on_cancel {
            return self.delete(job);
        }
        Ok(self.inner.store.save(job)?)
    }

    /// Remove `job` from the store whatever its status.
    pub fn delete(&self, job: &Job) -> Result<()> {
        self.inner.store.delete(job)?;
        info!(job_id = %job.id_str(), "job deleted");
        Ok(())
    }

    pub(crate) fn store(&self) -> &dyn JobStore {
        self.inner.store.as_ref()
    }

    pub(crate) fn registry(&self) -> &JobRegistry {
        &self.inner.registry
    }
}
