use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use tracing::debug;
use uuid::Uuid;

use crate::{
    error::{StoreError, StoreResult},
    store::JobStore,
    types::{Job, JobData, JobFilter, JobStatus, ScheduleType},
};

const SELECT_COLUMNS: &str = "SELECT id, name, schedule_type, status, next_run_at, last_run_at,
        schedule_expression, schedule_limit_date, data
 FROM jobs";

/// Initialise the scheduler schema in `conn`.
///
/// Creates the `jobs` table (idempotent) plus the indexes the polling and
/// listing queries rely on.
pub fn init_db(conn: &Connection) -> StoreResult<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS jobs (
            id                   TEXT NOT NULL PRIMARY KEY,
            name                 TEXT NOT NULL,
            schedule_type        TEXT NOT NULL,
            status               TEXT NOT NULL DEFAULT 'pending',
            next_run_at          INTEGER NOT NULL,   -- microseconds since the epoch, UTC
            last_run_at          INTEGER,
            schedule_expression  TEXT NOT NULL DEFAULT '',
            schedule_limit_date  INTEGER,
            data                 TEXT NOT NULL DEFAULT '{}'  -- JSON object
        ) STRICT;

        -- Polling: WHERE status = 'pending' AND next_run_at <= ?
        CREATE INDEX IF NOT EXISTS idx_jobs_next_run_status ON jobs (next_run_at, status);
        CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs (status);
        CREATE INDEX IF NOT EXISTS idx_jobs_name ON jobs (name);
        ",
    )?;
    Ok(())
}

/// [`JobStore`] backed by a single SQLite connection.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Ok(Self::new(conn))
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        Ok(Self::new(Connection::open_in_memory()?))
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl JobStore for SqliteStore {
    fn init(&self) -> StoreResult<()> {
        init_db(&self.conn())
    }

    fn list_expired(&self, now: DateTime<Utc>) -> StoreResult<Vec<Job>> {
        let conn = self.conn();
        let mut stmt = conn.prepare_cached(&format!(
            "{SELECT_COLUMNS} WHERE status = ?1 AND next_run_at <= ?2 ORDER BY next_run_at"
        ))?;
        let rows = stmt
            .query_map(params![JobStatus::Pending.to_string(), encode_ts(now)], read_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(decode_row).collect()
    }

    fn list(&self, filter: &JobFilter) -> StoreResult<Vec<Job>> {
        let conn = self.conn();
        // NULL parameters disable the corresponding criterion.
        let mut stmt = conn.prepare_cached(&format!(
            "{SELECT_COLUMNS}
             WHERE (?1 IS NULL OR name = ?1) AND (?2 IS NULL OR status = ?2)
             ORDER BY next_run_at"
        ))?;
        let status = filter.status.map(|s| s.to_string());
        let rows = stmt
            .query_map(params![filter.name, status], read_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut jobs = Vec::with_capacity(rows.len());
        for row in rows {
            let job = decode_row(row)?;
            if filter.matches(&job) {
                jobs.push(job);
            }
        }
        Ok(jobs)
    }

    fn save(&self, job: &mut Job) -> StoreResult<()> {
        let data = serde_json::to_string(&job.data)?;
        let id = job
            .id
            .get_or_insert_with(|| Uuid::new_v4().to_string())
            .clone();

        self.conn().execute(
            "INSERT INTO jobs
             (id, name, schedule_type, status, next_run_at, last_run_at,
              schedule_expression, schedule_limit_date, data)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9)
             ON CONFLICT(id) DO UPDATE SET
               name=excluded.name, schedule_type=excluded.schedule_type,
               status=excluded.status, next_run_at=excluded.next_run_at,
               last_run_at=excluded.last_run_at,
               schedule_expression=excluded.schedule_expression,
               schedule_limit_date=excluded.schedule_limit_date, data=excluded.data",
            params![
                id,
                job.name,
                job.schedule_type.to_string(),
                job.status.to_string(),
                encode_ts(job.next_run_at),
                job.last_run_at.map(encode_ts),
                job.schedule_expression,
                job.schedule_limit_date.map(encode_ts),
                data,
            ],
        )?;
        debug!(job_id = %id, status = %job.status, "job saved");
        Ok(())
    }

    fn delete(&self, job: &Job) -> StoreResult<()> {
        if let Some(id) = &job.id {
            self.conn().execute("DELETE FROM jobs WHERE id = ?1", [id])?;
        }
        Ok(())
    }
}

/// Raw column values, decoded outside the rusqlite row callback so parse
/// failures surface as [`StoreError`] rather than being dropped.
struct RawJob {
    id: String,
    name: String,
    schedule_type: String,
    status: String,
    next_run_at: i64,
    last_run_at: Option<i64>,
    schedule_expression: String,
    schedule_limit_date: Option<i64>,
    data: String,
}

fn read_row(row: &Row<'_>) -> rusqlite::Result<RawJob> {
    Ok(RawJob {
        id: row.get(0)?,
        name: row.get(1)?,
        schedule_type: row.get(2)?,
        status: row.get(3)?,
        next_run_at: row.get(4)?,
        last_run_at: row.get(5)?,
        schedule_expression: row.get(6)?,
        schedule_limit_date: row.get(7)?,
        data: row.get(8)?,
    })
}

fn decode_row(raw: RawJob) -> StoreResult<Job> {
    let schedule_type: ScheduleType = raw.schedule_type.parse().map_err(StoreError::Backend)?;
    let status: JobStatus = raw.status.parse().map_err(StoreError::Backend)?;
    let data: JobData = serde_json::from_str(&raw.data)?;
    Ok(Job {
        id: Some(raw.id),
        name: raw.name,
        schedule_type,
        status,
        next_run_at: decode_ts(raw.next_run_at)?,
        last_run_at: raw.last_run_at.map(decode_ts).transpose()?,
        schedule_expression: raw.schedule_expression,
        schedule_limit_date: raw.schedule_limit_date.map(decode_ts).transpose()?,
        data,
    })
}

/// Integer microseconds, so SQL comparisons follow chronological order for
/// every instant chrono can represent.
fn encode_ts(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_micros()
}

fn decode_ts(micros: i64) -> StoreResult<DateTime<Utc>> {
    DateTime::from_timestamp_micros(micros).ok_or(StoreError::Timestamp(micros))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::next_run;
    use chrono::{Duration, DurationRound};
    use serde_json::json;

    fn store() -> SqliteStore {
        let store = SqliteStore::open_in_memory().unwrap();
        store.init().unwrap();
        store
    }

    /// Truncated to the stored precision so equality checks hold.
    fn now() -> DateTime<Utc> {
        Utc::now().duration_trunc(Duration::microseconds(1)).unwrap()
    }

    #[test]
    fn init_is_idempotent() {
        let store = store();
        store.init().unwrap();
        store.init().unwrap();
    }

    #[test]
    fn save_inserts_then_updates() {
        let store = store();
        let now = now();
        let data = json!({"to": "ops@example.com", "retries": 2});
        let mut job = Job::recurrent(
            "digest",
            "monday at 09:00",
            now + Duration::hours(1),
            Some(now + Duration::days(30)),
            data.as_object().cloned().unwrap(),
        );

        store.save(&mut job).unwrap();
        assert!(job.id.is_some());

        job.status = JobStatus::Failed;
        job.last_run_at = Some(now);
        store.save(&mut job).unwrap();

        let all = store.list(&JobFilter::new()).unwrap();
        assert_eq!(all, vec![job]);
    }

    #[test]
    fn save_with_unknown_id_inserts() {
        let store = store();
        let mut job = Job::simple("x", now(), JobData::new());
        job.id = Some("imported-1".to_string());
        store.save(&mut job).unwrap();

        let all = store.list(&JobFilter::new()).unwrap();
        assert_eq!(all[0].id.as_deref(), Some("imported-1"));
    }

    #[test]
    fn list_expired_uses_status_and_time() {
        let store = store();
        let now = now();

        let mut due = Job::simple("due", now - Duration::seconds(5), JobData::new());
        let mut at_now = Job::simple("at-now", now, JobData::new());
        let mut later = Job::simple("later", now + Duration::seconds(5), JobData::new());
        let mut canceled = Job::simple("canceled", now - Duration::seconds(5), JobData::new());
        canceled.status = JobStatus::Canceled;
        for job in [&mut due, &mut at_now, &mut later, &mut canceled] {
            store.save(job).unwrap();
        }

        let names: Vec<_> = store
            .list_expired(now)
            .unwrap()
            .into_iter()
            .map(|j| j.name)
            .collect();
        assert_eq!(names, vec!["due", "at-now"]);
    }

    #[test]
    fn far_future_jobs_are_not_due() {
        let store = store();
        let now = now();
        let far = next_run("8000 years", &now).unwrap();

        let mut due = Job::simple("due", now - Duration::seconds(5), JobData::new());
        let mut distant = Job::recurrent("distant", "8000 years", far, None, JobData::new());
        let mut ancient = Job::simple("ancient", now - Duration::days(365 * 3000), JobData::new());
        for job in [&mut due, &mut distant, &mut ancient] {
            store.save(job).unwrap();
        }

        let names: Vec<_> = store
            .list_expired(now)
            .unwrap()
            .into_iter()
            .map(|j| j.name)
            .collect();
        assert_eq!(names, vec!["ancient", "due"]);

        let listed = store.list(&JobFilter::new().name("distant")).unwrap();
        assert_eq!(listed, vec![distant]);
    }

    #[test]
    fn out_of_range_column_is_reported() {
        let store = store();
        store
            .conn()
            .execute(
                "INSERT INTO jobs (id, name, schedule_type, next_run_at) VALUES ('bad', 'x', 'simple', ?1)",
                [i64::MAX],
            )
            .unwrap();

        assert!(matches!(
            store.list(&JobFilter::new()),
            Err(StoreError::Timestamp(v)) if v == i64::MAX
        ));
    }

    #[test]
    fn list_filters_by_name_status_and_data() {
        let store = store();
        let now = now();
        let mut a = Job::simple("mail", now, json!({"user": "u1"}).as_object().cloned().unwrap());
        let mut b = Job::simple("mail", now, json!({"user": "u2"}).as_object().cloned().unwrap());
        let mut c = Job::simple("sms", now, json!({"user": "u1"}).as_object().cloned().unwrap());
        c.status = JobStatus::Done;
        for job in [&mut a, &mut b, &mut c] {
            store.save(job).unwrap();
        }

        assert_eq!(store.list(&JobFilter::new().name("mail")).unwrap().len(), 2);
        assert_eq!(
            store.list(&JobFilter::new().status(JobStatus::Done)).unwrap(),
            vec![c]
        );
        assert_eq!(
            store.list(&JobFilter::new().name("mail").data("user", "u1")).unwrap(),
            vec![a]
        );
        assert_eq!(store.list(&JobFilter::new().data("user", "u1")).unwrap().len(), 2);
    }

    #[test]
    fn delete_removes_row() {
        let store = store();
        let mut job = Job::simple("x", now(), JobData::new());
        store.save(&mut job).unwrap();
        store.delete(&job).unwrap();
        assert!(store.list(&JobFilter::new()).unwrap().is_empty());
    }
}
