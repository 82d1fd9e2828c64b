//! HTTP API for farmdesk.
//!
//! ## Endpoints
//!
//! - `POST /api/auth/login` - Exchange username/password for a JWT
//! - `GET /api/health` - Health check
//! - `GET /api/tasks` - All tasks (manager/owner)
//! - `POST /api/tasks` - Create a task (manager/owner)
//! - `GET /api/tasks/my-tasks` - Tasks assigned to the caller
//! - `PATCH /api/tasks/{id}/status` - Move a task through its lifecycle
//! - `DELETE /api/tasks/{id}` - Delete a task (manager/owner)
//! - `GET /api/task-submissions/{taskId}/submissions` - Submission history, newest first
//! - `POST /api/task-submissions/{taskId}/submit` - Submit completion (multipart `notes`, `photo`)
//! - `GET /api/task-submissions/pending` - Review queue (manager/owner)
//! - `PATCH /api/task-submissions/submissions/{id}/review` - Approve or reject
//! - `GET /api/attendance?startDate&endDate` - Records and statistics
//! - `POST /api/attendance` - Upsert the caller's record for a date
//! - `POST /api/users` - Create an account
//! - `GET /uploads/{file}` - Submitted photos

mod attendance;
pub mod auth;
mod routes;
pub mod store;
mod submissions;
mod tasks;
pub mod types;
mod users;

pub use routes::{router, serve, AppState};
pub use types::*;
