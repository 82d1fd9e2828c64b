//! Task submission and review workflow.
//!
//! - [`gating`]: pure derivation of submission state and permitted actions
//! - [`submission`]: worker drafts, local validation, guarded submit
//! - [`review`]: manager review queue with terminal decisions

pub mod gating;
pub mod review;
pub mod submission;

pub use gating::{derive_state, gate, Banner, Gate, SubmissionState};
pub use review::{ReviewInput, ReviewQueue};
pub use submission::{
    validate_submission, Photo, SubmissionDraft, TaskSubmissions, ValidSubmission,
    ValidationError, MAX_PHOTO_BYTES,
};
