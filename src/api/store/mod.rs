//! Farm storage with pluggable backends.
//!
//! Supports:
//! - `memory`: In-memory storage (non-persistent, for tests and demos)
//! - `sqlite`: SQLite database under the data directory
//!
//! Both backends enforce the workflow invariants themselves: at most one
//! pending submission per task, terminal review decisions, and one
//! attendance record per worker and date.

mod memory;
mod sqlite;

pub use memory::InMemoryFarmStore;
pub use sqlite::SqliteFarmStore;

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::StatusCode;
use chrono::{NaiveDate, NaiveTime};
use thiserror::Error;

use crate::config::{Config, StoreKind};
use crate::model::{
    AttendanceEntry, AttendanceRecord, ReviewDecision, Role, Submission, Task, TaskPriority,
    TaskStatus, User,
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),

    /// The write would break a workflow invariant
    #[error("{0}")]
    Conflict(String),

    /// The merged row would be inconsistent
    #[error("{0}")]
    Invalid(String),

    #[error("Storage error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            StoreError::NotFound(_) => StatusCode::NOT_FOUND,
            StoreError::Conflict(_) => StatusCode::CONFLICT,
            StoreError::Invalid(_) => StatusCode::BAD_REQUEST,
            StoreError::Backend(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Map a store failure onto the handler error shape.
pub fn store_error(e: StoreError) -> (StatusCode, String) {
    if let StoreError::Backend(msg) = &e {
        tracing::error!("Store failure: {}", msg);
    }
    (e.status_code(), e.to_string())
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Backend(e.to_string())
    }
}

impl From<tokio::task::JoinError> for StoreError {
    fn from(e: tokio::task::JoinError) -> Self {
        StoreError::Backend(format!("Task join error: {}", e))
    }
}

/// A user row as created by the owner or a manager.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub display_name: String,
    pub role: Role,
    /// `pbkdf2:iterations:salt:hash`
    pub password_hash: String,
}

#[derive(Debug, Clone)]
pub struct NewTask {
    pub title: String,
    pub description: Option<String>,
    pub priority: TaskPriority,
    pub due_date: Option<NaiveDate>,
    pub assigned_to: Option<i64>,
    pub location: Option<String>,
    pub estimated_hours: Option<f64>,
    pub created_by: i64,
}

#[derive(Debug, Clone)]
pub struct NewSubmission {
    pub task_id: i64,
    pub worker_id: i64,
    pub notes: String,
    pub photo_url: Option<String>,
}

/// Clock times after applying `entry` over the stored ones for that day.
///
/// A clock-in starts a new shift and drops any stored clock-out. A clock-out
/// alone keeps the stored clock-in.
pub(crate) fn merge_clock_times(
    stored: Option<(Option<NaiveTime>, Option<NaiveTime>)>,
    entry: &AttendanceEntry,
) -> Result<(Option<NaiveTime>, Option<NaiveTime>), StoreError> {
    let (stored_in, stored_out) = stored.unwrap_or_default();
    let (clock_in, clock_out) = match entry.clock_in {
        Some(clock_in) => (Some(clock_in), entry.clock_out),
        None => (stored_in, entry.clock_out.or(stored_out)),
    };
    if let (Some(clock_in), Some(clock_out)) = (clock_in, clock_out) {
        if clock_out < clock_in {
            return Err(StoreError::Invalid(format!(
                "clockOut {} is before clockIn {}",
                clock_out, clock_in
            )));
        }
    }
    Ok((clock_in, clock_out))
}

/// Farm store trait - implemented by all storage backends.
#[async_trait]
pub trait FarmStore: Send + Sync {
    /// Whether this store persists data across restarts.
    fn is_persistent(&self) -> bool;

    /// Create a user. Usernames are unique.
    async fn create_user(&self, user: NewUser) -> Result<User, StoreError>;

    /// A user and their stored password hash, for login.
    async fn find_credentials(&self, username: &str)
        -> Result<Option<(User, String)>, StoreError>;

    async fn get_user(&self, id: i64) -> Result<Option<User>, StoreError>;

    /// All tasks, or only those assigned to `assignee`. Newest first.
    async fn list_tasks(&self, assignee: Option<i64>) -> Result<Vec<Task>, StoreError>;

    async fn get_task(&self, id: i64) -> Result<Option<Task>, StoreError>;

    async fn create_task(&self, task: NewTask) -> Result<Task, StoreError>;

    async fn update_task_status(&self, id: i64, status: TaskStatus) -> Result<Task, StoreError>;

    /// Delete a task together with its submissions.
    async fn delete_task(&self, id: i64) -> Result<(), StoreError>;

    /// Submission history of a task, newest first.
    async fn list_submissions(&self, task_id: i64) -> Result<Vec<Submission>, StoreError>;

    /// Every pending submission across tasks, newest first.
    async fn pending_submissions(&self) -> Result<Vec<Submission>, StoreError>;

    /// Record a pending submission.
    ///
    /// Returns `StoreError::Conflict` if the task already has one pending.
    async fn create_submission(&self, submission: NewSubmission)
        -> Result<Submission, StoreError>;

    /// Decide a pending submission.
    ///
    /// Returns `StoreError::Conflict` if it was already decided.
    async fn review_submission(
        &self,
        id: i64,
        decision: ReviewDecision,
        review_notes: Option<String>,
        reviewer_id: i64,
    ) -> Result<Submission, StoreError>;

    /// Insert or update the worker's record for `entry.date`, merging clock
    /// times with [`merge_clock_times`].
    ///
    /// Returns `StoreError::Invalid` if the merged clock-out precedes the
    /// clock-in.
    async fn upsert_attendance(
        &self,
        worker_id: i64,
        entry: &AttendanceEntry,
    ) -> Result<AttendanceRecord, StoreError>;

    /// Records in `[start, end]`, optionally for one worker. Ordered by date
    /// descending, then worker.
    async fn list_attendance(
        &self,
        worker_id: Option<i64>,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<AttendanceRecord>, StoreError>;
}

/// Open the backend selected by the configuration.
pub async fn open(config: &Config) -> Result<Arc<dyn FarmStore>, StoreError> {
    match config.store {
        StoreKind::Memory => {
            tracing::info!("Using in-memory farm store (data is lost on restart)");
            Ok(Arc::new(InMemoryFarmStore::new()))
        }
        StoreKind::Sqlite => {
            let path = config.database_path();
            tracing::info!("Using SQLite farm store at {}", path.display());
            Ok(Arc::new(SqliteFarmStore::new(path).await?))
        }
    }
}


#[cfg(test)]
pub(crate) mod contract {
    //! Behaviour every backend must share.

    use super::*;
    use crate::model::{AttendanceStatus, SubmissionStatus};
    use chrono::NaiveTime;

    pub async fn seed(store: &dyn FarmStore) -> (User, User, Task) {
        let manager = store
            .create_user(NewUser {
                username: "morgan".into(),
                display_name: "Morgan".into(),
                role: Role::Manager,
                password_hash: "x".into(),
            })
            .await
            .unwrap();
        let worker = store
            .create_user(NewUser {
                username: "sam".into(),
                display_name: "Sam".into(),
                role: Role::Worker,
                password_hash: "x".into(),
            })
            .await
            .unwrap();
        let task = store
            .create_task(NewTask {
                title: "Mend north fence".into(),
                description: None,
                priority: TaskPriority::High,
                due_date: NaiveDate::from_ymd_opt(2024, 5, 3),
                assigned_to: Some(worker.id),
                location: Some("North paddock".into()),
                estimated_hours: Some(3.5),
                created_by: manager.id,
            })
            .await
            .unwrap();
        (manager, worker, task)
    }

    fn submission(task: &Task, worker: &User, notes: &str) -> NewSubmission {
        NewSubmission {
            task_id: task.id,
            worker_id: worker.id,
            notes: notes.into(),
            photo_url: None,
        }
    }

    pub async fn duplicate_usernames_conflict(store: &dyn FarmStore) {
        seed(store).await;
        let err = store
            .create_user(NewUser {
                username: "sam".into(),
                display_name: "Other Sam".into(),
                role: Role::Worker,
                password_hash: "x".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        let (user, hash) = store.find_credentials("sam").await.unwrap().unwrap();
        assert_eq!(user.display_name, "Sam");
        assert_eq!(hash, "x");
    }

    pub async fn tasks_resolve_assignee(store: &dyn FarmStore) {
        let (_, worker, task) = seed(store).await;
        assert_eq!(task.assigned_to_name.as_deref(), Some("Sam"));
        assert_eq!(store.list_tasks(Some(worker.id)).await.unwrap().len(), 1);
        assert!(store.list_tasks(Some(worker.id + 100)).await.unwrap().is_empty());

        let updated = store
            .update_task_status(task.id, TaskStatus::InProgress)
            .await
            .unwrap();
        assert_eq!(updated.status, TaskStatus::InProgress);
        assert!(matches!(
            store.update_task_status(999, TaskStatus::Completed).await,
            Err(StoreError::NotFound(_))
        ));
    }

    pub async fn single_pending_submission(store: &dyn FarmStore) {
        let (manager, worker, task) = seed(store).await;
        let first = store
            .create_submission(submission(&task, &worker, "Done"))
            .await
            .unwrap();
        assert_eq!(first.status, SubmissionStatus::Pending);
        assert_eq!(first.worker_name.as_deref(), Some("Sam"));
        assert_eq!(first.task_title.as_deref(), Some("Mend north fence"));

        let err = store
            .create_submission(submission(&task, &worker, "Done again"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        // After a rejection, a resubmission is accepted.
        store
            .review_submission(first.id, ReviewDecision::Rejected, Some("Posts loose".into()), manager.id)
            .await
            .unwrap();
        let second = store
            .create_submission(submission(&task, &worker, "Posts reset"))
            .await
            .unwrap();

        let history = store.list_submissions(task.id).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].id, second.id);
        assert_eq!(store.pending_submissions().await.unwrap().len(), 1);

        // Submissions never move the task's own status.
        let task = store.get_task(task.id).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
    }

    pub async fn reviews_are_terminal(store: &dyn FarmStore) {
        let (manager, worker, task) = seed(store).await;
        let sub = store
            .create_submission(submission(&task, &worker, "Done"))
            .await
            .unwrap();
        let reviewed = store
            .review_submission(sub.id, ReviewDecision::Approved, None, manager.id)
            .await
            .unwrap();
        assert_eq!(reviewed.status, SubmissionStatus::Approved);
        assert_eq!(reviewed.reviewed_by, Some(manager.id));
        assert_eq!(reviewed.reviewed_by_name.as_deref(), Some("Morgan"));
        assert!(reviewed.reviewed_at.is_some());

        let err = store
            .review_submission(sub.id, ReviewDecision::Rejected, None, manager.id)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert!(matches!(
            store
                .review_submission(999, ReviewDecision::Approved, None, manager.id)
                .await,
            Err(StoreError::NotFound(_))
        ));
    }

    pub async fn delete_task_drops_submissions(store: &dyn FarmStore) {
        let (_, worker, task) = seed(store).await;
        store
            .create_submission(submission(&task, &worker, "Done"))
            .await
            .unwrap();
        store.delete_task(task.id).await.unwrap();
        assert!(store.get_task(task.id).await.unwrap().is_none());
        assert!(store.pending_submissions().await.unwrap().is_empty());
        assert!(matches!(
            store.delete_task(task.id).await,
            Err(StoreError::NotFound(_))
        ));
    }

    pub async fn clock_out_keeps_clock_in(store: &dyn FarmStore) {
        let (_, worker, _) = seed(store).await;
        let date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let eight = NaiveTime::from_hms_opt(8, 0, 0).unwrap();
        let five = NaiveTime::from_hms_opt(17, 0, 0).unwrap();

        let opened = store
            .upsert_attendance(
                worker.id,
                &AttendanceEntry {
                    date,
                    status: AttendanceStatus::Present,
                    clock_in: Some(eight),
                    clock_out: None,
                    notes: Some("Early start".into()),
                },
            )
            .await
            .unwrap();
        assert!(opened.is_clocked_in());

        let closed = store
            .upsert_attendance(
                worker.id,
                &AttendanceEntry {
                    date,
                    status: AttendanceStatus::Present,
                    clock_in: None,
                    clock_out: Some(five),
                    notes: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(closed.id, opened.id);
        assert_eq!(closed.clock_in, Some(eight));
        assert_eq!(closed.clock_out, Some(five));
        assert_eq!(closed.notes.as_deref(), Some("Early start"));

        let records = store.list_attendance(None, date, date).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].worker_name.as_deref(), Some("Sam"));
        assert!(store
            .list_attendance(Some(worker.id + 100), date, date)
            .await
            .unwrap()
            .is_empty());
    }

    fn clock(date: NaiveDate, clock_in: Option<NaiveTime>, clock_out: Option<NaiveTime>) -> AttendanceEntry {
        AttendanceEntry {
            date,
            status: AttendanceStatus::Present,
            clock_in,
            clock_out,
            notes: None,
        }
    }

    pub async fn clock_in_after_clock_out_reopens_the_day(store: &dyn FarmStore) {
        let (_, worker, _) = seed(store).await;
        let date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let hm = |h| NaiveTime::from_hms_opt(h, 0, 0);

        store.upsert_attendance(worker.id, &clock(date, hm(8), None)).await.unwrap();
        store.upsert_attendance(worker.id, &clock(date, None, hm(12))).await.unwrap();
        let reopened = store
            .upsert_attendance(worker.id, &clock(date, hm(13), None))
            .await
            .unwrap();
        assert_eq!(reopened.clock_in, hm(13));
        assert_eq!(reopened.clock_out, None);
        assert!(reopened.is_clocked_in());

        // A clock-out before the stored clock-in is refused and changes nothing.
        let err = store
            .upsert_attendance(worker.id, &clock(date, None, hm(11)))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Invalid(_)));
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);

        let records = store.list_attendance(Some(worker.id), date, date).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].clock_in, hm(13));
        assert_eq!(records[0].clock_out, None);
    }
}
