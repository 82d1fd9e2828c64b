//! # farmdesk
//!
//! Task submission review and attendance sync for farm crews.
//!
//! This library provides:
//! - The submission workflow: gating rules that decide what a worker may do
//!   with a task, and the submission/review controllers built on them
//! - A poll-driven attendance synchronizer that derives the clocked-in state
//!   from server records
//! - A typed HTTP client with a session guard that hands off on expiry or 401
//! - The axum server and SQLite/in-memory stores backing all of the above
//!
//! ## Flow
//!
//! ```text
//!   worker ──submit──▶ pending ──review──▶ approved (locked)
//!                         ▲                  │
//!                         └──resubmit── rejected
//! ```
//!
//! ## Modules
//! - `workflow`: gating, submission drafts, review queue
//! - `attendance`: clock reconciliation, poller, elapsed ticker
//! - `client`: `FarmApi` trait, reqwest client, auth guard
//! - `api`: HTTP server, auth, stores

pub mod api;
pub mod attendance;
pub mod client;
pub mod config;
pub mod model;
pub mod util;
pub mod workflow;

pub use config::{ClientConfig, Config};
