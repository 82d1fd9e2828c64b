//! API request and response types.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::model::{Role, TaskPriority, TaskStatus, User};

/// Credentials posted to `/api/auth/login`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    /// Expiry as unix seconds
    pub exp: i64,
    pub user: User,
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub dev_mode: bool,
    /// Whether the store survives a restart
    pub persistent: bool,
}

/// Request to create a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTaskRequest {
    pub title: String,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub priority: TaskPriority,

    #[serde(default)]
    pub due_date: Option<NaiveDate>,

    /// Worker the task is assigned to
    #[serde(default)]
    pub assigned_to: Option<i64>,

    #[serde(default)]
    pub location: Option<String>,

    #[serde(default)]
    pub estimated_hours: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateTaskStatusRequest {
    pub status: TaskStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub display_name: Option<String>,
    pub role: Role,
}
