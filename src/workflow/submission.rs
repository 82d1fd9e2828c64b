//! Worker-side submission flow: draft, local validation, guarded submit.
//!
//! # Submit sequence
//! 1. Validate the draft locally (`ValidationError`, no request made).
//! 2. Re-fetch the task's submissions and re-derive the gate.
//! 3. Refuse with `Conflict` if a submission is already awaiting review.
//! 4. Send; on a server `Conflict`, re-fetch so the view shows the truth.
//!
//! Refreshing history never touches the draft, so a half-written form
//! survives any number of refreshes.

use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, info, warn};

use super::gating::{derive_state, gate, Gate, SubmissionState};
use crate::client::{ClientError, FarmApi};
use crate::model::submission::sort_newest_first;
use crate::model::{Submission, Task};

/// Upper bound on an attached photo (5 MB).
pub const MAX_PHOTO_BYTES: usize = 5 * 1024 * 1024;

/// Input problems caught before any request is made.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Completion notes cannot be empty")]
    EmptyNotes,

    #[error("Photo is {size} bytes; the limit is {limit} bytes")]
    PhotoTooLarge { size: usize, limit: usize },

    #[error("Photo must be an image, got {0}")]
    NotAnImage(String),
}

/// Photo evidence attached to a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Photo {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Bytes,
}

impl Photo {
    pub fn new(file_name: impl Into<String>, content_type: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            bytes: bytes.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Check notes and photo against the submission rules.
///
/// Shared by the client (before sending) and the server (on receipt).
pub fn validate_submission(
    notes: &str,
    photo: Option<&Photo>,
    max_photo_bytes: usize,
) -> Result<(), ValidationError> {
    if notes.trim().is_empty() {
        return Err(ValidationError::EmptyNotes);
    }
    if let Some(photo) = photo {
        if photo.len() > max_photo_bytes {
            return Err(ValidationError::PhotoTooLarge {
                size: photo.len(),
                limit: max_photo_bytes,
            });
        }
        if !photo.content_type.starts_with("image/") {
            return Err(ValidationError::NotAnImage(photo.content_type.clone()));
        }
    }
    Ok(())
}

/// A submission that passed local validation; notes are trimmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidSubmission {
    pub notes: String,
    pub photo: Option<Photo>,
}

/// The submission form as the worker is editing it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubmissionDraft {
    notes: String,
    photo: Option<Photo>,
}

impl SubmissionDraft {
    pub fn new(notes: impl Into<String>) -> Self {
        Self {
            notes: notes.into(),
            photo: None,
        }
    }

    pub fn notes(&self) -> &str {
        &self.notes
    }

    pub fn photo(&self) -> Option<&Photo> {
        self.photo.as_ref()
    }

    pub fn set_notes(&mut self, notes: impl Into<String>) {
        self.notes = notes.into();
    }

    /// Attach a photo, refusing oversized files immediately.
    pub fn attach_photo(&mut self, photo: Photo) -> Result<(), ValidationError> {
        if photo.len() > MAX_PHOTO_BYTES {
            return Err(ValidationError::PhotoTooLarge {
                size: photo.len(),
                limit: MAX_PHOTO_BYTES,
            });
        }
        self.photo = Some(photo);
        Ok(())
    }

    pub fn clear_photo(&mut self) {
        self.photo = None;
    }

    pub fn validate(&self) -> Result<ValidSubmission, ValidationError> {
        validate_submission(&self.notes, self.photo.as_ref(), MAX_PHOTO_BYTES)?;
        Ok(ValidSubmission {
            notes: self.notes.trim().to_string(),
            photo: self.photo.clone(),
        })
    }
}

/// One task's submission history plus the worker's draft for it.
pub struct TaskSubmissions<A: FarmApi + ?Sized> {
    api: Arc<A>,
    task: Task,
    history: Vec<Submission>,
    draft: SubmissionDraft,
}

impl<A: FarmApi + ?Sized> TaskSubmissions<A> {
    pub fn new(api: Arc<A>, task: Task) -> Self {
        Self {
            api,
            task,
            history: Vec::new(),
            draft: SubmissionDraft::default(),
        }
    }

    /// Build the view and fetch its history.
    pub async fn load(api: Arc<A>, task: Task) -> Result<Self, ClientError> {
        let mut view = Self::new(api, task);
        view.refresh().await?;
        Ok(view)
    }

    pub fn task(&self) -> &Task {
        &self.task
    }

    /// Submissions, newest first.
    pub fn history(&self) -> &[Submission] {
        &self.history
    }

    pub fn draft(&self) -> &SubmissionDraft {
        &self.draft
    }

    pub fn draft_mut(&mut self) -> &mut SubmissionDraft {
        &mut self.draft
    }

    pub fn state(&self) -> SubmissionState<'_> {
        derive_state(&self.history)
    }

    pub fn gate(&self) -> Gate {
        gate(&self.task, &self.history)
    }

    /// Replace the cached history with the server's. The draft is untouched.
    pub async fn refresh(&mut self) -> Result<(), ClientError> {
        let mut history = self.api.submissions(self.task.id).await?;
        sort_newest_first(&mut history);
        debug!(
            "Task {} history refreshed: {} submissions",
            self.task.id,
            history.len()
        );
        self.history = history;
        Ok(())
    }

    /// Submit the current draft.
    ///
    /// On success the draft is cleared and the new pending submission heads
    /// the history.
    pub async fn submit(&mut self) -> Result<Submission, ClientError> {
        let valid = self.draft.validate()?;

        self.refresh().await?;
        let current = self.gate();
        if !current.allows_submission() {
            return Err(ClientError::Conflict(match current {
                Gate::AwaitingReview => "a submission is already awaiting review".to_string(),
                _ => "this task no longer accepts submissions".to_string(),
            }));
        }

        match self.api.submit(self.task.id, &valid).await {
            Ok(submission) => {
                info!(
                    "Submitted completion {} for task {}",
                    submission.id, self.task.id
                );
                self.draft = SubmissionDraft::default();
                self.history.insert(0, submission.clone());
                Ok(submission)
            }
            Err(ClientError::Conflict(message)) => {
                if let Err(e) = self.refresh().await {
                    warn!(
                        "Failed to refresh task {} after conflict: {}",
                        self.task.id, e
                    );
                }
                Err(ClientError::Conflict(message))
            }
            Err(e) => Err(e),
        }
    }
}
