use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;

use crate::types::Job;

/// Error type handlers may return; anything implementing `std::error::Error`
/// converts into it with `?`.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub type HandlerResult = std::result::Result<(), BoxError>;

/// Work executed when a job of a given definition name comes due.
///
/// Handlers run inline on the scheduler task. A slow handler delays every
/// job behind it in the same pass.
pub trait JobHandler: Send + Sync {
    fn run(&self, job: &Job) -> HandlerResult;
}

impl<F> JobHandler for F
where
    F: Fn(&Job) -> HandlerResult + Send + Sync,
{
    fn run(&self, job: &Job) -> HandlerResult {
        self(job)
    }
}

/// Job definition name → handler.
///
/// Lookups happen on every pass, so registrations made after the engine has
/// started take effect on the next tick.
#[derive(Default)]
pub struct JobRegistry {
    handlers: RwLock<HashMap<String, Arc<dyn JobHandler>>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `name`, replacing any previous registration.
    pub fn define(&self, name: impl Into<String>, handler: Arc<dyn JobHandler>) {
        let name = name.into();
        let replaced = self
            .handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.clone(), handler)
            .is_some();
        debug!(%name, replaced, "job definition registered");
    }

    /// Clone of the handler registered under `name`. The registry lock is
    /// released before the caller invokes it.
    pub fn get(&self, name: &str) -> Option<Arc<dyn JobHandler>> {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }
}
