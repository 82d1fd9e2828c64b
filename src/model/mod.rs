//! Domain types shared by the client core and the bundled server.
//!
//! Everything here is plain serde data; behaviour that depends on more than
//! one record lives in [`crate::workflow`] and [`crate::attendance`].

pub mod attendance;
pub mod submission;
pub mod task;
pub mod user;

pub use attendance::{
    AttendanceEntry, AttendanceRange, AttendanceRecord, AttendanceReport, AttendanceStats,
    AttendanceStatus,
};
pub use submission::{ReviewDecision, ReviewRequest, Submission, SubmissionStatus};
pub use task::{Task, TaskPriority, TaskStatus};
pub use user::{Role, TokenClaims, User};
