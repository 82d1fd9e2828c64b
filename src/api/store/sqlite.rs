//! SQLite-based farm store.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use tokio::sync::Mutex;

use super::{merge_clock_times, FarmStore, NewSubmission, NewTask, NewUser, StoreError};
use crate::model::{
    AttendanceEntry, AttendanceRecord, AttendanceStatus, ReviewDecision, Role, Submission,
    SubmissionStatus, Task, TaskPriority, TaskStatus, User,
};

const SCHEMA: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT NOT NULL UNIQUE,
    display_name TEXT NOT NULL,
    role TEXT NOT NULL,
    password_hash TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS tasks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    description TEXT,
    priority TEXT NOT NULL DEFAULT 'medium',
    due_date TEXT,
    status TEXT NOT NULL DEFAULT 'pending',
    assigned_to INTEGER REFERENCES users(id) ON DELETE SET NULL,
    location TEXT,
    estimated_hours REAL,
    created_by INTEGER NOT NULL REFERENCES users(id),
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_tasks_assigned_to ON tasks(assigned_to);

CREATE TABLE IF NOT EXISTS task_submissions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    task_id INTEGER NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
    worker_id INTEGER NOT NULL REFERENCES users(id),
    notes TEXT NOT NULL,
    photo_url TEXT,
    submitted_at TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending',
    review_notes TEXT,
    reviewed_by INTEGER REFERENCES users(id),
    reviewed_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_submissions_task ON task_submissions(task_id, submitted_at DESC);
CREATE UNIQUE INDEX IF NOT EXISTS idx_submissions_one_pending
    ON task_submissions(task_id) WHERE status = 'pending';

CREATE TABLE IF NOT EXISTS attendance (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    worker_id INTEGER NOT NULL REFERENCES users(id),
    date TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'present',
    clock_in TEXT,
    clock_out TEXT,
    notes TEXT,
    UNIQUE(worker_id, date)
);

CREATE INDEX IF NOT EXISTS idx_attendance_date ON attendance(date);
"#;

const SELECT_TASK: &str = "SELECT t.id, t.title, t.description, t.priority, t.due_date, t.status,
        t.assigned_to, u.display_name, t.location, t.estimated_hours, t.created_by, t.created_at
 FROM tasks t
 LEFT JOIN users u ON u.id = t.assigned_to";

const SELECT_SUBMISSION: &str = "SELECT s.id, s.task_id, t.title, s.worker_id, w.display_name,
        s.notes, s.photo_url, s.submitted_at, s.status, s.review_notes,
        s.reviewed_by, r.display_name, s.reviewed_at
 FROM task_submissions s
 LEFT JOIN tasks t ON t.id = s.task_id
 LEFT JOIN users w ON w.id = s.worker_id
 LEFT JOIN users r ON r.id = s.reviewed_by";

const SELECT_ATTENDANCE: &str = "SELECT a.id, a.worker_id, u.display_name, a.date, a.status,
        a.clock_in, a.clock_out, a.notes
 FROM attendance a
 LEFT JOIN users u ON u.id = a.worker_id";

pub struct SqliteFarmStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteFarmStore {
    pub async fn new(db_path: PathBuf) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                StoreError::Backend(format!("Failed to create store dir: {}", e))
            })?;
        }

        // Open database in blocking task
        let conn = tokio::task::spawn_blocking(move || {
            let conn = Connection::open(&db_path).map_err(|e| {
                StoreError::Backend(format!("Failed to open SQLite database: {}", e))
            })?;
            conn.execute_batch(SCHEMA)
                .map_err(|e| StoreError::Backend(format!("Failed to run schema: {}", e)))?;
            Ok::<_, StoreError>(conn)
        })
        .await??;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.blocking_lock();
            f(&mut conn)
        })
        .await?
    }
}

fn timestamp_text(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn date_text(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn time_text(time: NaiveTime) -> String {
    time.format("%H:%M:%S").to_string()
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|at| at.with_timezone(&Utc))
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

fn parse_time(s: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(s, "%H:%M:%S").ok()
}

fn invalid_column(idx: usize, raw: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        rusqlite::types::Type::Text,
        format!("unexpected value {:?}", raw).into(),
    )
}

fn text_column<T>(row: &Row, idx: usize, parse: impl Fn(&str) -> Option<T>) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    parse(&raw).ok_or_else(|| invalid_column(idx, &raw))
}

fn opt_text_column<T>(
    row: &Row,
    idx: usize,
    parse: impl Fn(&str) -> Option<T>,
) -> rusqlite::Result<Option<T>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|raw| parse(&raw).ok_or_else(|| invalid_column(idx, &raw)))
        .transpose()
}

fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    matches!(e, rusqlite::Error::SqliteFailure(err, _) if err.code == ErrorCode::ConstraintViolation)
}

fn row_to_user(row: &Row) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        display_name: row.get(2)?,
        role: text_column(row, 3, Role::parse)?,
    })
}

fn row_to_task(row: &Row) -> rusqlite::Result<Task> {
    Ok(Task {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        priority: text_column(row, 3, TaskPriority::parse)?,
        due_date: opt_text_column(row, 4, parse_date)?,
        status: text_column(row, 5, TaskStatus::parse)?,
        assigned_to: row.get(6)?,
        assigned_to_name: row.get(7)?,
        location: row.get(8)?,
        estimated_hours: row.get(9)?,
        created_by: row.get(10)?,
        created_at: text_column(row, 11, parse_timestamp)?,
    })
}

fn row_to_submission(row: &Row) -> rusqlite::Result<Submission> {
    Ok(Submission {
        id: row.get(0)?,
        task_id: row.get(1)?,
        task_title: row.get(2)?,
        worker_id: row.get(3)?,
        worker_name: row.get(4)?,
        notes: row.get(5)?,
        photo_url: row.get(6)?,
        submitted_at: text_column(row, 7, parse_timestamp)?,
        status: text_column(row, 8, SubmissionStatus::parse)?,
        review_notes: row.get(9)?,
        reviewed_by: row.get(10)?,
        reviewed_by_name: row.get(11)?,
        reviewed_at: opt_text_column(row, 12, parse_timestamp)?,
    })
}

fn row_to_record(row: &Row) -> rusqlite::Result<AttendanceRecord> {
    Ok(AttendanceRecord {
        id: row.get(0)?,
        worker_id: row.get(1)?,
        worker_name: row.get(2)?,
        date: text_column(row, 3, parse_date)?,
        status: text_column(row, 4, AttendanceStatus::parse)?,
        clock_in: opt_text_column(row, 5, parse_time)?,
        clock_out: opt_text_column(row, 6, parse_time)?,
        notes: row.get(7)?,
    })
}

fn select_task(conn: &Connection, id: i64) -> rusqlite::Result<Option<Task>> {
    conn.query_row(
        &format!("{} WHERE t.id = ?1", SELECT_TASK),
        params![id],
        row_to_task,
    )
    .optional()
}

fn select_submission(conn: &Connection, id: i64) -> rusqlite::Result<Option<Submission>> {
    conn.query_row(
        &format!("{} WHERE s.id = ?1", SELECT_SUBMISSION),
        params![id],
        row_to_submission,
    )
    .optional()
}

fn select_submissions(
    conn: &Connection,
    filter: &str,
    params: impl rusqlite::Params,
) -> rusqlite::Result<Vec<Submission>> {
    let mut stmt = conn.prepare(&format!(
        "{} WHERE {} ORDER BY s.submitted_at DESC, s.id DESC",
        SELECT_SUBMISSION, filter
    ))?;
    let rows = stmt.query_map(params, row_to_submission)?;
    rows.collect()
}

#[async_trait]
impl FarmStore for SqliteFarmStore {
    fn is_persistent(&self) -> bool {
        true
    }

    async fn create_user(&self, new: NewUser) -> Result<User, StoreError> {
        self.with_conn(move |conn| {
            let inserted = conn.execute(
                "INSERT INTO users (username, display_name, role, password_hash, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    new.username,
                    new.display_name,
                    new.role.as_str(),
                    new.password_hash,
                    timestamp_text(Utc::now()),
                ],
            );
            match inserted {
                Ok(_) => Ok(User {
                    id: conn.last_insert_rowid(),
                    username: new.username,
                    display_name: new.display_name,
                    role: new.role,
                }),
                Err(e) if is_constraint_violation(&e) => Err(StoreError::Conflict(format!(
                    "Username {} is taken",
                    new.username
                ))),
                Err(e) => Err(e.into()),
            }
        })
        .await
    }

    async fn find_credentials(
        &self,
        username: &str,
    ) -> Result<Option<(User, String)>, StoreError> {
        let username = username.to_string();
        self.with_conn(move |conn| {
            let found = conn
                .query_row(
                    "SELECT id, username, display_name, role, password_hash
                     FROM users WHERE username = ?1",
                    params![username],
                    |row| Ok((row_to_user(row)?, row.get::<_, String>(4)?)),
                )
                .optional()?;
            Ok(found)
        })
        .await
    }

    async fn get_user(&self, id: i64) -> Result<Option<User>, StoreError> {
        self.with_conn(move |conn| {
            let user = conn
                .query_row(
                    "SELECT id, username, display_name, role FROM users WHERE id = ?1",
                    params![id],
                    row_to_user,
                )
                .optional()?;
            Ok(user)
        })
        .await
    }

    async fn list_tasks(&self, assignee: Option<i64>) -> Result<Vec<Task>, StoreError> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "{} WHERE (?1 IS NULL OR t.assigned_to = ?1)
                 ORDER BY t.created_at DESC, t.id DESC",
                SELECT_TASK
            ))?;
            let tasks = stmt
                .query_map(params![assignee], row_to_task)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(tasks)
        })
        .await
    }

    async fn get_task(&self, id: i64) -> Result<Option<Task>, StoreError> {
        self.with_conn(move |conn| Ok(select_task(conn, id)?)).await
    }

    async fn create_task(&self, new: NewTask) -> Result<Task, StoreError> {
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO tasks (title, description, priority, due_date, status, assigned_to,
                                    location, estimated_hours, created_by, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    new.title,
                    new.description,
                    new.priority.as_str(),
                    new.due_date.map(date_text),
                    TaskStatus::Pending.as_str(),
                    new.assigned_to,
                    new.location,
                    new.estimated_hours,
                    new.created_by,
                    timestamp_text(Utc::now()),
                ],
            )?;
            let id = conn.last_insert_rowid();
            select_task(conn, id)?.ok_or_else(|| StoreError::NotFound(format!("Task {}", id)))
        })
        .await
    }

    async fn update_task_status(&self, id: i64, status: TaskStatus) -> Result<Task, StoreError> {
        self.with_conn(move |conn| {
            let updated = conn.execute(
                "UPDATE tasks SET status = ?1 WHERE id = ?2",
                params![status.as_str(), id],
            )?;
            if updated == 0 {
                return Err(StoreError::NotFound(format!("Task {}", id)));
            }
            select_task(conn, id)?.ok_or_else(|| StoreError::NotFound(format!("Task {}", id)))
        })
        .await
    }

    async fn delete_task(&self, id: i64) -> Result<(), StoreError> {
        self.with_conn(move |conn| {
            let deleted = conn.execute("DELETE FROM tasks WHERE id = ?1", params![id])?;
            if deleted == 0 {
                return Err(StoreError::NotFound(format!("Task {}", id)));
            }
            Ok(())
        })
        .await
    }

    async fn list_submissions(&self, task_id: i64) -> Result<Vec<Submission>, StoreError> {
        self.with_conn(move |conn| Ok(select_submissions(conn, "s.task_id = ?1", params![task_id])?))
            .await
    }

    async fn pending_submissions(&self) -> Result<Vec<Submission>, StoreError> {
        self.with_conn(|conn| Ok(select_submissions(conn, "s.status = 'pending'", params![])?))
            .await
    }

    async fn create_submission(&self, new: NewSubmission) -> Result<Submission, StoreError> {
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let task_exists = tx
                .prepare("SELECT 1 FROM tasks WHERE id = ?1")?
                .exists(params![new.task_id])?;
            if !task_exists {
                return Err(StoreError::NotFound(format!("Task {}", new.task_id)));
            }

            let inserted = tx.execute(
                "INSERT INTO task_submissions (task_id, worker_id, notes, photo_url, submitted_at, status)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    new.task_id,
                    new.worker_id,
                    new.notes,
                    new.photo_url,
                    timestamp_text(Utc::now()),
                    SubmissionStatus::Pending.as_str(),
                ],
            );
            match inserted {
                Ok(_) => {}
                // idx_submissions_one_pending
                Err(e) if is_constraint_violation(&e) => {
                    return Err(StoreError::Conflict(format!(
                        "Task {} already has a submission awaiting review",
                        new.task_id
                    )));
                }
                Err(e) => return Err(e.into()),
            }
            let id = tx.last_insert_rowid();
            let submission = select_submission(&tx, id)?
                .ok_or_else(|| StoreError::NotFound(format!("Submission {}", id)))?;
            tx.commit()?;
            Ok(submission)
        })
        .await
    }

    async fn review_submission(
        &self,
        id: i64,
        decision: ReviewDecision,
        review_notes: Option<String>,
        reviewer_id: i64,
    ) -> Result<Submission, StoreError> {
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let updated = tx.execute(
                "UPDATE task_submissions
                 SET status = ?1, review_notes = ?2, reviewed_by = ?3, reviewed_at = ?4
                 WHERE id = ?5 AND status = 'pending'",
                params![
                    decision.status().as_str(),
                    review_notes,
                    reviewer_id,
                    timestamp_text(Utc::now()),
                    id,
                ],
            )?;
            let submission = select_submission(&tx, id)?
                .ok_or_else(|| StoreError::NotFound(format!("Submission {}", id)))?;
            if updated == 0 {
                return Err(StoreError::Conflict(format!(
                    "Submission {} was already {}",
                    id,
                    submission.status.as_str()
                )));
            }
            tx.commit()?;
            Ok(submission)
        })
        .await
    }

    async fn upsert_attendance(
        &self,
        worker_id: i64,
        entry: &AttendanceEntry,
    ) -> Result<AttendanceRecord, StoreError> {
        let entry = entry.clone();
        self.with_conn(move |conn| {
            let date = date_text(entry.date);
            let tx = conn.transaction()?;
            let stored = tx
                .query_row(
                    "SELECT clock_in, clock_out FROM attendance WHERE worker_id = ?1 AND date = ?2",
                    params![worker_id, date],
                    |row| {
                        Ok((
                            opt_text_column(row, 0, parse_time)?,
                            opt_text_column(row, 1, parse_time)?,
                        ))
                    },
                )
                .optional()?;
            let (clock_in, clock_out) = merge_clock_times(stored, &entry)?;

            tx.execute(
                "INSERT INTO attendance (worker_id, date, status, clock_in, clock_out, notes)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(worker_id, date) DO UPDATE SET
                     status = excluded.status,
                     clock_in = excluded.clock_in,
                     clock_out = excluded.clock_out,
                     notes = COALESCE(excluded.notes, attendance.notes)",
                params![
                    worker_id,
                    date,
                    entry.status.as_str(),
                    clock_in.map(time_text),
                    clock_out.map(time_text),
                    entry.notes,
                ],
            )?;
            let record = tx.query_row(
                &format!("{} WHERE a.worker_id = ?1 AND a.date = ?2", SELECT_ATTENDANCE),
                params![worker_id, date],
                row_to_record,
            )?;
            tx.commit()?;
            Ok(record)
        })
        .await
    }

    async fn list_attendance(
        &self,
        worker_id: Option<i64>,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<AttendanceRecord>, StoreError> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "{} WHERE a.date BETWEEN ?1 AND ?2 AND (?3 IS NULL OR a.worker_id = ?3)
                 ORDER BY a.date DESC, a.worker_id",
                SELECT_ATTENDANCE
            ))?;
            let records = stmt
                .query_map(
                    params![date_text(start), date_text(end), worker_id],
                    row_to_record,
                )?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(records)
        })
        .await
    }
}
