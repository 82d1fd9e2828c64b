//! Task submission endpoints.
//!
//! A worker submits completion evidence (notes plus an optional photo) for a
//! task assigned to them; a manager or owner reviews it. The store rejects a
//! second pending submission and a second decision with 409.

use std::sync::Arc;

use axum::{
    extract::{Extension, Multipart, Path, State},
    http::StatusCode,
    Json,
};
use bytes::BytesMut;

use super::auth::AuthUser;
use super::routes::{forbidden, AppState};
use super::store::{store_error, NewSubmission, StoreError};
use crate::model::{ReviewRequest, Submission, Task};
use crate::util::{non_blank, sanitize_filename};
use crate::workflow::{validate_submission, Photo, ValidationError};

fn validation_error(e: ValidationError) -> (StatusCode, String) {
    let status = match e {
        ValidationError::PhotoTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        ValidationError::EmptyNotes | ValidationError::NotAnImage(_) => StatusCode::BAD_REQUEST,
    };
    (status, e.to_string())
}

async fn load_task(state: &AppState, task_id: i64) -> Result<Task, (StatusCode, String)> {
    state
        .store
        .get_task(task_id)
        .await
        .map_err(store_error)?
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("Task {} not found", task_id)))
}

/// `GET /api/task-submissions/:task_id/submissions` - newest first.
pub async fn list_submissions(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(task_id): Path<i64>,
) -> Result<Json<Vec<Submission>>, (StatusCode, String)> {
    let task = load_task(&state, task_id).await?;
    if !user.role.can_review() && !task.is_assigned_to(user.id) {
        return Err(forbidden("Task is not assigned to you"));
    }
    let history = state
        .store
        .list_submissions(task_id)
        .await
        .map_err(store_error)?;
    Ok(Json(history))
}

/// `GET /api/task-submissions/pending` - review queue.
pub async fn pending_submissions(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Vec<Submission>>, (StatusCode, String)> {
    if !user.role.can_review() {
        return Err(forbidden("Only managers and owners review submissions"));
    }
    let pending = state
        .store
        .pending_submissions()
        .await
        .map_err(store_error)?;
    Ok(Json(pending))
}

/// Read the `notes` and `photo` fields, refusing a photo past `max_bytes`
/// without buffering the rest of it.
async fn read_form(
    multipart: &mut Multipart,
    max_bytes: usize,
) -> Result<(String, Option<Photo>), (StatusCode, String)> {
    let bad_request = |e: axum::extract::multipart::MultipartError| {
        (StatusCode::BAD_REQUEST, e.to_string())
    };
    let mut notes = String::new();
    let mut photo = None;

    while let Some(mut field) = multipart.next_field().await.map_err(bad_request)? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("notes") => {
                notes = field.text().await.map_err(bad_request)?;
            }
            Some("photo") => {
                let file_name = field.file_name().unwrap_or("photo").to_string();
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let mut buf = BytesMut::new();
                while let Some(chunk) = field.chunk().await.map_err(bad_request)? {
                    if buf.len() + chunk.len() > max_bytes {
                        return Err(validation_error(ValidationError::PhotoTooLarge {
                            size: buf.len() + chunk.len(),
                            limit: max_bytes,
                        }));
                    }
                    buf.extend_from_slice(&chunk);
                }
                if !buf.is_empty() {
                    photo = Some(Photo::new(file_name, content_type, buf.freeze()));
                }
            }
            other => {
                tracing::debug!("Ignoring multipart field {:?}", other);
            }
        }
    }
    Ok((notes, photo))
}

/// `POST /api/task-submissions/:task_id/submit` (multipart `notes`, `photo`)
pub async fn submit(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(task_id): Path<i64>,
    mut multipart: Multipart,
) -> Result<Json<Submission>, (StatusCode, String)> {
    let task = load_task(&state, task_id).await?;
    if !task.is_assigned_to(user.id) {
        return Err(forbidden("Only the assignee can submit completion"));
    }

    let max_bytes = state.config.max_photo_bytes;
    let (notes, photo) = read_form(&mut multipart, max_bytes).await?;
    validate_submission(&notes, photo.as_ref(), max_bytes).map_err(validation_error)?;

    let stored_photo = match &photo {
        Some(photo) => {
            let name = format!(
                "{}-{}",
                uuid::Uuid::new_v4(),
                sanitize_filename(&photo.file_name)
            );
            let dir = state.config.uploads_dir();
            tokio::fs::create_dir_all(&dir).await.map_err(|e| {
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Failed to create uploads dir: {}", e),
                )
            })?;
            let path = dir.join(&name);
            tokio::fs::write(&path, &photo.bytes).await.map_err(|e| {
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Failed to store photo: {}", e),
                )
            })?;
            Some((path, format!("/uploads/{}", name)))
        }
        None => None,
    };

    let created = state
        .store
        .create_submission(NewSubmission {
            task_id,
            worker_id: user.id,
            notes: notes.trim().to_string(),
            photo_url: stored_photo.as_ref().map(|(_, url)| url.clone()),
        })
        .await;

    match created {
        Ok(submission) => {
            tracing::info!(
                "Submission {} for task {} by {}",
                submission.id,
                task_id,
                user.name
            );
            Ok(Json(submission))
        }
        Err(e) => {
            if let Some((path, _)) = stored_photo {
                if let Err(rm) = tokio::fs::remove_file(&path).await {
                    tracing::warn!("Failed to remove orphaned photo {}: {}", path.display(), rm);
                }
            }
            if matches!(e, StoreError::Conflict(_)) {
                tracing::debug!("Rejected duplicate pending submission for task {}", task_id);
            }
            Err(store_error(e))
        }
    }
}

/// `PATCH /api/task-submissions/submissions/:id/review`
pub async fn review(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<i64>,
    Json(req): Json<ReviewRequest>,
) -> Result<Json<Submission>, (StatusCode, String)> {
    if !user.role.can_review() {
        return Err(forbidden("Only managers and owners review submissions"));
    }
    let reviewed = state
        .store
        .review_submission(
            id,
            req.status,
            non_blank(req.review_notes.as_deref()),
            user.id,
        )
        .await
        .map_err(store_error)?;
    tracing::info!(
        "Submission {} {} by {}",
        id,
        reviewed.status.as_str(),
        user.name
    );
    Ok(Json(reviewed))
}
