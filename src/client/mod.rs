//! Client side of the farmdesk REST API.
//!
//! [`FarmApi`] is the seam between the workflow/attendance logic and the
//! network: [`HttpFarmApi`] talks to a real server, tests substitute a fake.

mod error;
#[cfg(test)]
pub(crate) mod fake;
mod http;
pub mod session;

pub use error::{classify_http_status, ClientError};
pub use http::HttpFarmApi;
pub use session::{AuthGuard, InvalidReason, LogSessionObserver, Session, SessionObserver};

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::model::{
    AttendanceEntry, AttendanceRecord, AttendanceReport, ReviewRequest, Submission, Task,
};
use crate::workflow::ValidSubmission;

/// Operations the client core needs from the backend.
#[async_trait]
pub trait FarmApi: Send + Sync {
    /// `GET /api/tasks/my-tasks`
    async fn my_tasks(&self) -> Result<Vec<Task>, ClientError>;

    /// `GET /api/task-submissions/{task_id}/submissions`
    async fn submissions(&self, task_id: i64) -> Result<Vec<Submission>, ClientError>;

    /// `POST /api/task-submissions/{task_id}/submit`
    async fn submit(
        &self,
        task_id: i64,
        submission: &ValidSubmission,
    ) -> Result<Submission, ClientError>;

    /// `GET /api/task-submissions/pending`
    async fn pending_submissions(&self) -> Result<Vec<Submission>, ClientError>;

    /// `PATCH /api/task-submissions/submissions/{id}/review`
    async fn review(
        &self,
        submission_id: i64,
        review: &ReviewRequest,
    ) -> Result<Submission, ClientError>;

    /// `GET /api/attendance?startDate&endDate`
    async fn attendance(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<AttendanceReport, ClientError>;

    /// `POST /api/attendance`
    async fn record_attendance(
        &self,
        entry: &AttendanceEntry,
    ) -> Result<AttendanceRecord, ClientError>;
}
