use std::num::ParseIntError;

use thiserror::Error;

/// Failure to turn a schedule string into a next-run instant.
///
/// Every variant carries the full input so log lines and API errors can be
/// traced back to the job that produced them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    /// The quantity in `<n> <unit>` is not a non-negative integer.
    #[error("Failed to parse schedule format '{schedule}', invalid duration: {value}, Error: {source}")]
    InvalidDuration {
        schedule: String,
        value: String,
        #[source]
        source: ParseIntError,
    },

    /// The unit in `<n> <unit>` is not one of the supported words.
    #[error("Failed to parse schedule format '{schedule}', invalid time unit: {unit}")]
    InvalidUnit { schedule: String, unit: String },

    /// The first word of `<weekday> at <HH:MM>` is not a weekday.
    #[error("Failed to parse schedule format '{schedule}', invalid weekday: {weekday}")]
    InvalidWeekday { schedule: String, weekday: String },

    /// The clock part of `<weekday> at <HH:MM>` is not a valid 24h time.
    #[error("Failed to parse schedule format '{schedule}', invalid time: {value}")]
    InvalidTime { schedule: String, value: String },

    /// The resulting instant cannot be represented.
    #[error("Failed to parse schedule format '{schedule}', resulting date is out of range")]
    OutOfRange { schedule: String },

    #[error("Invalid schedule format: {0}")]
    InvalidFormat(String),
}

/// Errors raised by a [`crate::store::JobStore`] implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying SQLite / rusqlite error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A job payload could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored timestamp column is outside the representable range.
    #[error("Invalid stored timestamp: {0} microseconds since the epoch")]
    Timestamp(i64),

    /// Free-form failure reported by a third-party store.
    #[error("Store backend error: {0}")]
    Backend(String),
}

/// Errors surfaced by the synchronous scheduler API.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error(transparent)]
    Schedule(#[from] ScheduleError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// No handler is registered under the requested job definition name.
    #[error("No job definition with the name {name} was found")]
    UnknownDefinition { name: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to load the provided location '{0}'")]
    InvalidTimezone(String),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;

pub type StoreResult<T> = std::result::Result<T, StoreError>;
