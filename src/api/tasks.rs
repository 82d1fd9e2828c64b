//! Task endpoints.
//!
//! Managers and owners create, list and delete tasks. Workers see the tasks
//! assigned to them and may move their own tasks through `status`.

use std::sync::Arc;

use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    Json,
};

use super::auth::AuthUser;
use super::routes::{forbidden, AppState};
use super::store::{store_error, NewTask};
use super::types::{CreateTaskRequest, UpdateTaskStatusRequest};
use crate::model::{Role, Task};
use crate::util::non_blank;

/// `GET /api/tasks` - every task (manager/owner).
pub async fn list_tasks(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Vec<Task>>, (StatusCode, String)> {
    if !user.role.can_review() {
        return Err(forbidden("Only managers and owners can list all tasks"));
    }
    let tasks = state.store.list_tasks(None).await.map_err(store_error)?;
    Ok(Json(tasks))
}

/// `GET /api/tasks/my-tasks`
pub async fn my_tasks(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Vec<Task>>, (StatusCode, String)> {
    let tasks = state
        .store
        .list_tasks(Some(user.id))
        .await
        .map_err(store_error)?;
    Ok(Json(tasks))
}

/// `POST /api/tasks`
pub async fn create_task(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<CreateTaskRequest>,
) -> Result<Json<Task>, (StatusCode, String)> {
    if !user.role.can_review() {
        return Err(forbidden("Only managers and owners can create tasks"));
    }
    let title = non_blank(Some(req.title.as_str()))
        .ok_or_else(|| (StatusCode::BAD_REQUEST, "Title cannot be empty".to_string()))?;
    if req.estimated_hours.is_some_and(|h| !h.is_finite() || h < 0.0) {
        return Err((
            StatusCode::BAD_REQUEST,
            "Estimated hours must be a non-negative number".to_string(),
        ));
    }

    if let Some(assignee) = req.assigned_to {
        let worker = state
            .store
            .get_user(assignee)
            .await
            .map_err(store_error)?
            .ok_or_else(|| {
                (
                    StatusCode::BAD_REQUEST,
                    format!("Assignee {} does not exist", assignee),
                )
            })?;
        if worker.role != Role::Worker {
            return Err((
                StatusCode::BAD_REQUEST,
                format!("{} is not a worker", worker.username),
            ));
        }
    }

    let task = state
        .store
        .create_task(NewTask {
            title,
            description: non_blank(req.description.as_deref()),
            priority: req.priority,
            due_date: req.due_date,
            assigned_to: req.assigned_to,
            location: non_blank(req.location.as_deref()),
            estimated_hours: req.estimated_hours,
            created_by: user.id,
        })
        .await
        .map_err(store_error)?;

    tracing::info!("Task {} created by {}", task.id, user.name);
    Ok(Json(task))
}

/// `PATCH /api/tasks/:id/status`
pub async fn update_task_status(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateTaskStatusRequest>,
) -> Result<Json<Task>, (StatusCode, String)> {
    let task = state
        .store
        .get_task(id)
        .await
        .map_err(store_error)?
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("Task {} not found", id)))?;
    if !user.role.can_review() && !task.is_assigned_to(user.id) {
        return Err(forbidden("Task is not assigned to you"));
    }

    let task = state
        .store
        .update_task_status(id, req.status)
        .await
        .map_err(store_error)?;
    tracing::debug!("Task {} is now {}", id, task.status.as_str());
    Ok(Json(task))
}

/// `DELETE /api/tasks/:id`
pub async fn delete_task(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    if !user.role.can_review() {
        return Err(forbidden("Only managers and owners can delete tasks"));
    }
    state.store.delete_task(id).await.map_err(store_error)?;
    tracing::info!("Task {} deleted by {}", id, user.name);
    Ok(Json(serde_json::json!({ "success": true })))
}
