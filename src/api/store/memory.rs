//! In-memory farm store (non-persistent).

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use tokio::sync::RwLock;

use super::{merge_clock_times, FarmStore, NewSubmission, NewTask, NewUser, StoreError};
use crate::model::submission::sort_newest_first;
use crate::model::{
    AttendanceEntry, AttendanceRecord, ReviewDecision, Submission, SubmissionStatus, Task,
    TaskStatus, User,
};

#[derive(Default)]
struct State {
    users: BTreeMap<i64, (User, String)>,
    tasks: BTreeMap<i64, Task>,
    submissions: BTreeMap<i64, Submission>,
    attendance: BTreeMap<i64, AttendanceRecord>,
    next_id: i64,
}

impl State {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn display_name(&self, user_id: i64) -> Option<String> {
        self.users.get(&user_id).map(|(u, _)| u.display_name.clone())
    }

    fn resolve_task(&self, task: &Task) -> Task {
        let mut task = task.clone();
        task.assigned_to_name = task.assigned_to.and_then(|id| self.display_name(id));
        task
    }

    fn resolve_submission(&self, submission: &Submission) -> Submission {
        let mut submission = submission.clone();
        submission.task_title = self.tasks.get(&submission.task_id).map(|t| t.title.clone());
        submission.worker_name = self.display_name(submission.worker_id);
        submission.reviewed_by_name = submission.reviewed_by.and_then(|id| self.display_name(id));
        submission
    }

    fn resolve_record(&self, record: &AttendanceRecord) -> AttendanceRecord {
        let mut record = record.clone();
        record.worker_name = self.display_name(record.worker_id);
        record
    }
}

#[derive(Clone, Default)]
pub struct InMemoryFarmStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryFarmStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FarmStore for InMemoryFarmStore {
    fn is_persistent(&self) -> bool {
        false
    }

    async fn create_user(&self, new: NewUser) -> Result<User, StoreError> {
        let mut state = self.state.write().await;
        if state.users.values().any(|(u, _)| u.username == new.username) {
            return Err(StoreError::Conflict(format!(
                "Username {} is taken",
                new.username
            )));
        }
        let user = User {
            id: state.next_id(),
            username: new.username,
            display_name: new.display_name,
            role: new.role,
        };
        state
            .users
            .insert(user.id, (user.clone(), new.password_hash));
        Ok(user)
    }

    async fn find_credentials(
        &self,
        username: &str,
    ) -> Result<Option<(User, String)>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .users
            .values()
            .find(|(u, _)| u.username == username)
            .cloned())
    }

    async fn get_user(&self, id: i64) -> Result<Option<User>, StoreError> {
        Ok(self.state.read().await.users.get(&id).map(|(u, _)| u.clone()))
    }

    async fn list_tasks(&self, assignee: Option<i64>) -> Result<Vec<Task>, StoreError> {
        let state = self.state.read().await;
        let mut tasks: Vec<Task> = state
            .tasks
            .values()
            .filter(|t| assignee.map_or(true, |id| t.is_assigned_to(id)))
            .map(|t| state.resolve_task(t))
            .collect();
        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(tasks)
    }

    async fn get_task(&self, id: i64) -> Result<Option<Task>, StoreError> {
        let state = self.state.read().await;
        Ok(state.tasks.get(&id).map(|t| state.resolve_task(t)))
    }

    async fn create_task(&self, new: NewTask) -> Result<Task, StoreError> {
        let mut state = self.state.write().await;
        let task = Task {
            id: state.next_id(),
            title: new.title,
            description: new.description,
            priority: new.priority,
            due_date: new.due_date,
            status: TaskStatus::Pending,
            assigned_to: new.assigned_to,
            assigned_to_name: None,
            location: new.location,
            estimated_hours: new.estimated_hours,
            created_by: new.created_by,
            created_at: Utc::now(),
        };
        state.tasks.insert(task.id, task.clone());
        Ok(state.resolve_task(&task))
    }

    async fn update_task_status(&self, id: i64, status: TaskStatus) -> Result<Task, StoreError> {
        let mut state = self.state.write().await;
        let task = state
            .tasks
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("Task {}", id)))?;
        task.status = status;
        let task = task.clone();
        Ok(state.resolve_task(&task))
    }

    async fn delete_task(&self, id: i64) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if state.tasks.remove(&id).is_none() {
            return Err(StoreError::NotFound(format!("Task {}", id)));
        }
        state.submissions.retain(|_, s| s.task_id != id);
        Ok(())
    }

    async fn list_submissions(&self, task_id: i64) -> Result<Vec<Submission>, StoreError> {
        let state = self.state.read().await;
        let mut history: Vec<Submission> = state
            .submissions
            .values()
            .filter(|s| s.task_id == task_id)
            .map(|s| state.resolve_submission(s))
            .collect();
        sort_newest_first(&mut history);
        Ok(history)
    }

    async fn pending_submissions(&self) -> Result<Vec<Submission>, StoreError> {
        let state = self.state.read().await;
        let mut pending: Vec<Submission> = state
            .submissions
            .values()
            .filter(|s| s.is_pending())
            .map(|s| state.resolve_submission(s))
            .collect();
        sort_newest_first(&mut pending);
        Ok(pending)
    }

    async fn create_submission(&self, new: NewSubmission) -> Result<Submission, StoreError> {
        let mut state = self.state.write().await;
        if !state.tasks.contains_key(&new.task_id) {
            return Err(StoreError::NotFound(format!("Task {}", new.task_id)));
        }
        if state
            .submissions
            .values()
            .any(|s| s.task_id == new.task_id && s.is_pending())
        {
            return Err(StoreError::Conflict(format!(
                "Task {} already has a submission awaiting review",
                new.task_id
            )));
        }
        let submission = Submission {
            id: state.next_id(),
            task_id: new.task_id,
            task_title: None,
            worker_id: new.worker_id,
            worker_name: None,
            notes: new.notes,
            photo_url: new.photo_url,
            submitted_at: Utc::now(),
            status: SubmissionStatus::Pending,
            review_notes: None,
            reviewed_by: None,
            reviewed_by_name: None,
            reviewed_at: None,
        };
        state.submissions.insert(submission.id, submission.clone());
        Ok(state.resolve_submission(&submission))
    }

    async fn review_submission(
        &self,
        id: i64,
        decision: ReviewDecision,
        review_notes: Option<String>,
        reviewer_id: i64,
    ) -> Result<Submission, StoreError> {
        let mut state = self.state.write().await;
        let submission = state
            .submissions
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("Submission {}", id)))?;
        if submission.status.is_decided() {
            return Err(StoreError::Conflict(format!(
                "Submission {} was already {}",
                id,
                submission.status.as_str()
            )));
        }
        submission.status = decision.status();
        submission.review_notes = review_notes;
        submission.reviewed_by = Some(reviewer_id);
        submission.reviewed_at = Some(Utc::now());
        let submission = submission.clone();
        Ok(state.resolve_submission(&submission))
    }

    async fn upsert_attendance(
        &self,
        worker_id: i64,
        entry: &AttendanceEntry,
    ) -> Result<AttendanceRecord, StoreError> {
        let mut state = self.state.write().await;
        let existing = state
            .attendance
            .values()
            .find(|r| r.worker_id == worker_id && r.date == entry.date)
            .map(|r| (r.id, r.clock_in, r.clock_out));
        let (clock_in, clock_out) =
            merge_clock_times(existing.map(|(_, i, o)| (i, o)), entry)?;
        let id = match existing {
            Some((id, _, _)) => id,
            None => state.next_id(),
        };
        let record = state
            .attendance
            .entry(id)
            .and_modify(|record| {
                record.status = entry.status;
                record.clock_in = clock_in;
                record.clock_out = clock_out;
                if entry.notes.is_some() {
                    record.notes = entry.notes.clone();
                }
            })
            .or_insert_with(|| AttendanceRecord {
                id,
                worker_id,
                worker_name: None,
                date: entry.date,
                status: entry.status,
                clock_in,
                clock_out,
                notes: entry.notes.clone(),
            })
            .clone();
        Ok(state.resolve_record(&record))
    }

    async fn list_attendance(
        &self,
        worker_id: Option<i64>,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<AttendanceRecord>, StoreError> {
        let state = self.state.read().await;
        let mut records: Vec<AttendanceRecord> = state
            .attendance
            .values()
            .filter(|r| r.date >= start && r.date <= end)
            .filter(|r| worker_id.map_or(true, |id| r.worker_id == id))
            .map(|r| state.resolve_record(r))
            .collect();
        records.sort_by(|a, b| b.date.cmp(&a.date).then(a.worker_id.cmp(&b.worker_id)));
        Ok(records)
    }
}
