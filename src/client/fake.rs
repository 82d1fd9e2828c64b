//! In-process [`FarmApi`] used by unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use tokio::sync::Semaphore;

use super::{ClientError, FarmApi};
use crate::api::store::merge_clock_times;
use crate::model::{
    AttendanceEntry, AttendanceRecord, AttendanceReport, AttendanceStats, ReviewRequest,
    Submission, SubmissionStatus, Task,
};
use crate::workflow::ValidSubmission;

pub const FAKE_WORKER_ID: i64 = 7;

#[derive(Default)]
pub struct FakeApi {
    tasks: Mutex<Vec<Task>>,
    submissions: Mutex<Vec<Submission>>,
    records: Mutex<Vec<AttendanceRecord>>,
    fail_submit: Mutex<Option<ClientError>>,
    fail_attendance: Mutex<VecDeque<ClientError>>,
    attendance_gate: Mutex<Option<Arc<Semaphore>>>,
    requests: AtomicUsize,
    submits: AtomicUsize,
    history_fetches: AtomicUsize,
    attendance_fetches: AtomicUsize,
    attendance_in_flight: AtomicUsize,
    attendance_max_in_flight: AtomicUsize,
    attendance_writes: AtomicUsize,
}

impl FakeApi {
    pub fn push_task(&self, task: Task) {
        self.tasks.lock().unwrap().push(task);
    }

    pub fn push_submission(&self, submission: Submission) {
        self.submissions.lock().unwrap().push(submission);
    }

    pub fn push_record(&self, record: AttendanceRecord) {
        self.records.lock().unwrap().push(record);
    }

    pub fn fail_next_submit(&self, error: ClientError) {
        *self.fail_submit.lock().unwrap() = Some(error);
    }

    pub fn fail_next_attendance(&self, error: ClientError) {
        self.fail_attendance.lock().unwrap().push_back(error);
    }

    /// Block attendance fetches until permits are added to the returned gate.
    pub fn hold_attendance(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.attendance_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    pub fn submit_count(&self) -> usize {
        self.submits.load(Ordering::SeqCst)
    }

    pub fn history_fetches(&self) -> usize {
        self.history_fetches.load(Ordering::SeqCst)
    }

    pub fn attendance_fetches(&self) -> usize {
        self.attendance_fetches.load(Ordering::SeqCst)
    }

    pub fn attendance_max_in_flight(&self) -> usize {
        self.attendance_max_in_flight.load(Ordering::SeqCst)
    }

    pub fn attendance_writes(&self) -> usize {
        self.attendance_writes.load(Ordering::SeqCst)
    }

    fn touch(&self) {
        self.requests.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl FarmApi for FakeApi {
    async fn my_tasks(&self) -> Result<Vec<Task>, ClientError> {
        self.touch();
        Ok(self.tasks.lock().unwrap().clone())
    }

    async fn submissions(&self, task_id: i64) -> Result<Vec<Submission>, ClientError> {
        self.touch();
        self.history_fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .submissions
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.task_id == task_id)
            .cloned()
            .collect())
    }

    async fn submit(
        &self,
        task_id: i64,
        submission: &ValidSubmission,
    ) -> Result<Submission, ClientError> {
        self.touch();
        self.submits.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.fail_submit.lock().unwrap().take() {
            return Err(error);
        }
        let mut all = self.submissions.lock().unwrap();
        if all.iter().any(|s| s.task_id == task_id && s.is_pending()) {
            return Err(ClientError::Conflict("pending submission exists".into()));
        }
        let created = Submission {
            id: all.iter().map(|s| s.id).max().unwrap_or(0) + 1,
            task_id,
            task_title: None,
            worker_id: FAKE_WORKER_ID,
            worker_name: None,
            notes: submission.notes.clone(),
            photo_url: submission
                .photo
                .as_ref()
                .map(|p| format!("/uploads/{}", p.file_name)),
            submitted_at: Utc::now(),
            status: SubmissionStatus::Pending,
            review_notes: None,
            reviewed_by: None,
            reviewed_by_name: None,
            reviewed_at: None,
        };
        all.push(created.clone());
        Ok(created)
    }

    async fn pending_submissions(&self) -> Result<Vec<Submission>, ClientError> {
        self.touch();
        Ok(self
            .submissions
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.is_pending())
            .cloned()
            .collect())
    }

    async fn review(
        &self,
        submission_id: i64,
        review: &ReviewRequest,
    ) -> Result<Submission, ClientError> {
        self.touch();
        let mut all = self.submissions.lock().unwrap();
        let submission = all
            .iter_mut()
            .find(|s| s.id == submission_id)
            .ok_or_else(|| ClientError::NotFound(format!("submission {}", submission_id)))?;
        if submission.status.is_decided() {
            return Err(ClientError::Conflict("already reviewed".into()));
        }
        submission.status = review.status.status();
        submission.review_notes = review.review_notes.clone();
        submission.reviewed_by = Some(1);
        submission.reviewed_by_name = Some("Morgan".to_string());
        submission.reviewed_at = Some(Utc::now());
        Ok(submission.clone())
    }

    async fn attendance(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<AttendanceReport, ClientError> {
        self.touch();
        self.attendance_fetches.fetch_add(1, Ordering::SeqCst);
        let now = self.attendance_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.attendance_max_in_flight.fetch_max(now, Ordering::SeqCst);

        let gate = self.attendance_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
        self.attendance_in_flight.fetch_sub(1, Ordering::SeqCst);

        if let Some(error) = self.fail_attendance.lock().unwrap().pop_front() {
            return Err(error);
        }
        let records: Vec<AttendanceRecord> = self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.date >= start && r.date <= end)
            .cloned()
            .collect();
        let statistics = AttendanceStats::from_records(&records);
        Ok(AttendanceReport {
            records,
            statistics,
        })
    }

    async fn record_attendance(
        &self,
        entry: &AttendanceEntry,
    ) -> Result<AttendanceRecord, ClientError> {
        self.touch();
        self.attendance_writes.fetch_add(1, Ordering::SeqCst);
        let mut records = self.records.lock().unwrap();
        let next_id = records.iter().map(|r| r.id).max().unwrap_or(0) + 1;
        let existing = records
            .iter_mut()
            .find(|r| r.worker_id == FAKE_WORKER_ID && r.date == entry.date);
        let (clock_in, clock_out) = merge_clock_times(
            existing.as_ref().map(|r| (r.clock_in, r.clock_out)),
            entry,
        )
        .map_err(|e| ClientError::BadRequest(e.to_string()))?;
        if let Some(existing) = existing {
            existing.status = entry.status;
            existing.clock_in = clock_in;
            existing.clock_out = clock_out;
            existing.notes = entry.notes.clone().or(existing.notes.take());
            return Ok(existing.clone());
        }
        let record = AttendanceRecord {
            id: next_id,
            worker_id: FAKE_WORKER_ID,
            worker_name: None,
            date: entry.date,
            status: entry.status,
            clock_in,
            clock_out,
            notes: entry.notes.clone(),
        };
        records.push(record.clone());
        Ok(record)
    }
}
