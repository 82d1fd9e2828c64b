//! Completion evidence submitted by workers and reviewed by managers.
//!
//! # Invariants
//! - At most one submission per task is `Pending` at any time.
//! - `Approved` and `Rejected` are terminal for a submission; only a new
//!   submission can follow a rejection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    Pending,
    Approved,
    Rejected,
}

impl SubmissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionStatus::Pending => "pending",
            SubmissionStatus::Approved => "approved",
            SubmissionStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(SubmissionStatus::Pending),
            "approved" => Some(SubmissionStatus::Approved),
            "rejected" => Some(SubmissionStatus::Rejected),
            _ => None,
        }
    }

    pub fn is_decided(&self) -> bool {
        !matches!(self, SubmissionStatus::Pending)
    }
}

/// A reviewer's verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewDecision {
    Approved,
    Rejected,
}

impl ReviewDecision {
    pub fn status(&self) -> SubmissionStatus {
        match self {
            ReviewDecision::Approved => SubmissionStatus::Approved,
            ReviewDecision::Rejected => SubmissionStatus::Rejected,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub id: i64,
    pub task_id: i64,
    /// Title of the task, filled in on review-queue listings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_title: Option<String>,
    pub worker_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_name: Option<String>,
    pub notes: String,
    #[serde(default)]
    pub photo_url: Option<String>,
    pub submitted_at: DateTime<Utc>,
    pub status: SubmissionStatus,
    #[serde(default)]
    pub review_notes: Option<String>,
    #[serde(default)]
    pub reviewed_by: Option<i64>,
    #[serde(default)]
    pub reviewed_by_name: Option<String>,
    #[serde(default)]
    pub reviewed_at: Option<DateTime<Utc>>,
}

impl Submission {
    pub fn is_pending(&self) -> bool {
        self.status == SubmissionStatus::Pending
    }

    /// Chronological order: submission time, then id for equal timestamps.
    pub fn chronological(a: &Submission, b: &Submission) -> Ordering {
        a.submitted_at
            .cmp(&b.submitted_at)
            .then_with(|| a.id.cmp(&b.id))
    }
}

/// The most recent submission by timestamp, independent of list order.
pub fn latest(submissions: &[Submission]) -> Option<&Submission> {
    submissions.iter().max_by(|a, b| Submission::chronological(a, b))
}

/// Sort newest first, the order the submissions endpoint returns.
pub fn sort_newest_first(submissions: &mut [Submission]) {
    submissions.sort_by(|a, b| Submission::chronological(b, a));
}

/// Body of `PATCH /api/task-submissions/submissions/{id}/review`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewRequest {
    pub status: ReviewDecision,
    #[serde(default)]
    pub review_notes: Option<String>,
}
