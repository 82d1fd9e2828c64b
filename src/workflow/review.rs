//! Manager-side review queue.
//!
//! Decisions are terminal per submission. The server answers `Conflict` when
//! a submission was already decided (for example by another manager), and the
//! queue re-fetches before reporting it.

use std::sync::Arc;

use tracing::{info, warn};

use crate::client::{ClientError, FarmApi};
use crate::model::submission::sort_newest_first;
use crate::model::{ReviewDecision, ReviewRequest, Submission};
use crate::util::non_blank;

/// A reviewer's decision with optional notes for the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewInput {
    pub decision: ReviewDecision,
    pub notes: Option<String>,
}

impl ReviewInput {
    pub fn approve(notes: Option<&str>) -> Self {
        Self {
            decision: ReviewDecision::Approved,
            notes: non_blank(notes),
        }
    }

    pub fn reject(notes: Option<&str>) -> Self {
        Self {
            decision: ReviewDecision::Rejected,
            notes: non_blank(notes),
        }
    }

    pub fn to_request(&self) -> ReviewRequest {
        ReviewRequest {
            status: self.decision,
            review_notes: self.notes.clone(),
        }
    }
}

/// Submissions awaiting a decision, oldest last.
pub struct ReviewQueue<A: FarmApi + ?Sized> {
    api: Arc<A>,
    pending: Vec<Submission>,
}

impl<A: FarmApi + ?Sized> ReviewQueue<A> {
    pub fn new(api: Arc<A>) -> Self {
        Self {
            api,
            pending: Vec::new(),
        }
    }

    pub fn pending(&self) -> &[Submission] {
        &self.pending
    }

    pub async fn refresh(&mut self) -> Result<(), ClientError> {
        let mut pending = self.api.pending_submissions().await?;
        pending.retain(Submission::is_pending);
        sort_newest_first(&mut pending);
        self.pending = pending;
        Ok(())
    }

    /// Record a decision and drop the submission from the queue.
    pub async fn review(
        &mut self,
        submission_id: i64,
        input: &ReviewInput,
    ) -> Result<Submission, ClientError> {
        match self.api.review(submission_id, &input.to_request()).await {
            Ok(reviewed) => {
                info!(
                    "Submission {} {:?} (task {})",
                    reviewed.id, reviewed.status, reviewed.task_id
                );
                self.pending.retain(|s| s.id != submission_id);
                Ok(reviewed)
            }
            Err(ClientError::Conflict(message)) => {
                if let Err(e) = self.refresh().await {
                    warn!("Failed to refresh review queue after conflict: {}", e);
                }
                Err(ClientError::Conflict(message))
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::fake::FakeApi;
    use crate::model::submission::fixtures::submission_at;
    use crate::model::SubmissionStatus;

    #[test]
    fn blank_notes_are_dropped() {
        let input = ReviewInput::reject(Some("   "));
        assert_eq!(input.notes, None);
        assert_eq!(input.to_request().status, ReviewDecision::Rejected);
    }

    #[tokio::test]
    async fn review_removes_from_queue() {
        let api = Arc::new(FakeApi::default());
        api.push_submission(submission_at(1, 8, 0, SubmissionStatus::Pending));
        let mut queue = ReviewQueue::new(api.clone());
        queue.refresh().await.unwrap();
        assert_eq!(queue.pending().len(), 1);

        let reviewed = queue
            .review(1, &ReviewInput::approve(Some("Nice work")))
            .await
            .unwrap();
        assert_eq!(reviewed.status, SubmissionStatus::Approved);
        assert_eq!(reviewed.review_notes.as_deref(), Some("Nice work"));
        assert!(queue.pending().is_empty());
    }

    #[tokio::test]
    async fn deciding_twice_is_a_conflict() {
        let api = Arc::new(FakeApi::default());
        api.push_submission(submission_at(1, 8, 0, SubmissionStatus::Pending));
        let mut queue = ReviewQueue::new(api.clone());
        queue.refresh().await.unwrap();
        queue.review(1, &ReviewInput::reject(Some("Redo"))).await.unwrap();

        let err = queue
            .review(1, &ReviewInput::approve(None))
            .await
            .unwrap_err();
        assert!(err.is_conflict());
        assert!(queue.pending().is_empty());
    }
}
