//! Derivation of submission state and permitted actions.
//!
//! Both functions here are pure: the same task and submission list (in any
//! order) always produce the same result. Every view decides which submission
//! controls to render from [`Gate`] alone.
//!
//! # State derivation
//! ```text
//! any pending              -> PendingReview
//! latest is rejected       -> Rejected(latest)
//! latest is approved       -> Approved(latest)
//! no submissions           -> NoSubmission
//! ```

use chrono::{DateTime, Utc};

use crate::model::submission::latest;
use crate::model::{Submission, SubmissionStatus, Task, TaskStatus};

/// Where a task stands in its submission lifecycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SubmissionState<'a> {
    NoSubmission,
    PendingReview(&'a Submission),
    Rejected(&'a Submission),
    Approved(&'a Submission),
}

/// Derive the submission state from a task's history.
pub fn derive_state(submissions: &[Submission]) -> SubmissionState<'_> {
    let pending = submissions
        .iter()
        .filter(|s| s.is_pending())
        .max_by(|a, b| Submission::chronological(a, b));
    if let Some(pending) = pending {
        return SubmissionState::PendingReview(pending);
    }

    match latest(submissions) {
        None => SubmissionState::NoSubmission,
        Some(s) => match s.status {
            SubmissionStatus::Rejected => SubmissionState::Rejected(s),
            SubmissionStatus::Approved => SubmissionState::Approved(s),
            SubmissionStatus::Pending => SubmissionState::PendingReview(s),
        },
    }
}

/// Submission-related action a view may offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Gate {
    CanSubmit,
    CanResubmit,
    AwaitingReview,
    Locked,
}

impl Gate {
    pub fn allows_submission(&self) -> bool {
        matches!(self, Gate::CanSubmit | Gate::CanResubmit)
    }

    /// Label of the submit button, if one is shown.
    pub fn action_label(&self) -> Option<&'static str> {
        match self {
            Gate::CanSubmit => Some("Submit completion"),
            Gate::CanResubmit => Some("Resubmit"),
            Gate::AwaitingReview | Gate::Locked => None,
        }
    }
}

/// Decide which submission action the task currently permits.
///
/// A pending submission always wins. A cancelled task accepts nothing else.
/// Otherwise only the latest submission matters.
pub fn gate(task: &Task, submissions: &[Submission]) -> Gate {
    match derive_state(submissions) {
        SubmissionState::PendingReview(_) => Gate::AwaitingReview,
        _ if task.status == TaskStatus::Cancelled => Gate::Locked,
        SubmissionState::NoSubmission => Gate::CanSubmit,
        SubmissionState::Rejected(_) => Gate::CanResubmit,
        SubmissionState::Approved(_) => Gate::Locked,
    }
}

/// Notice shown above the submission controls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Banner<'a> {
    AwaitingReview {
        submitted_at: DateTime<Utc>,
    },
    Rejected {
        review_notes: Option<&'a str>,
        reviewed_by: Option<&'a str>,
    },
    Approved {
        reviewed_by: Option<&'a str>,
    },
}

impl<'a> SubmissionState<'a> {
    pub fn latest(&self) -> Option<&'a Submission> {
        match *self {
            SubmissionState::NoSubmission => None,
            SubmissionState::PendingReview(s)
            | SubmissionState::Rejected(s)
            | SubmissionState::Approved(s) => Some(s),
        }
    }

    pub fn banner(&self) -> Option<Banner<'a>> {
        match *self {
            SubmissionState::NoSubmission => None,
            SubmissionState::PendingReview(s) => Some(Banner::AwaitingReview {
                submitted_at: s.submitted_at,
            }),
            SubmissionState::Rejected(s) => Some(Banner::Rejected {
                review_notes: s.review_notes.as_deref(),
                reviewed_by: s.reviewed_by_name.as_deref(),
            }),
            SubmissionState::Approved(s) => Some(Banner::Approved {
                reviewed_by: s.reviewed_by_name.as_deref(),
            }),
        }
    }

    /// Whether the task may be shown as finally completed.
    ///
    /// A rejected or unreviewed submission keeps the task open whatever its
    /// own status says.
    pub fn completion_is_final(&self, task: &Task) -> bool {
        match self {
            SubmissionState::Approved(_) => true,
            SubmissionState::Rejected(_) | SubmissionState::PendingReview(_) => false,
            SubmissionState::NoSubmission => task.status == TaskStatus::Completed,
        }
    }
}
