//! `cadence-scheduler` — in-process job scheduler driven by human-readable
//! schedule strings.
//!
//! # Overview
//!
//! Hosts register named handlers on a [`Scheduler`], then commit one-shot or
//! recurring schedules for them. [`Scheduler::run`] wakes every
//! `processing_rate`, runs each due job's handler, and persists the outcome:
//!
//! | Job kind   | Handler ok                                     | Handler error / missing |
//! |------------|------------------------------------------------|-------------------------|
//! | SIMPLE     | `done`                                         | `failed`                |
//! | RECURRENT  | `pending` at the next parsed run, or `done` once past its limit date | `failed` |
//!
//! A recurring job whose expression is empty or no longer parses is marked
//! `failed`. Jobs are only ever `canceled` by [`Scheduler::cancel`].
//!
//! Storage is pluggable through [`JobStore`]; [`MemoryStore`] and
//! [`SqliteStore`] ship with the crate.
//!
//! Several scheduler instances polling one store may run the same job twice;
//! there is no locking around pickup.
//!
//! A handler that panics leaves its job `pending`, so it runs again on every
//! pass. Due jobs are processed oldest first, which means a job that always
//! panics starves every due job scheduled after it until it is canceled or
//! deleted.

pub mod config;
pub mod db;
pub mod definition;
pub mod engine;
pub mod error;
pub mod registry;
pub mod schedule;
pub mod scheduler;
pub mod store;
pub mod types;

pub use config::SchedulerConfig;
pub use db::SqliteStore;
pub use definition::{OneShot, Recurring, ScheduleDefinition};
pub use error::{Result, ScheduleError, SchedulerError, StoreError};
pub use registry::{BoxError, HandlerResult, JobHandler};
pub use schedule::next_run;
pub use scheduler::{Scheduler, SchedulerOptions};
pub use store::{JobStore, MemoryStore};
pub use types::{Job, JobData, JobFilter, JobStatus, ScheduleType};
