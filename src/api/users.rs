use std::sync::Arc;

use axum::{
    extract::{Extension, State},
    http::StatusCode,
    Json,
};

use super::auth::{hash_password, AuthUser};
use super::routes::{forbidden, AppState};
use super::store::{store_error, NewUser};
use super::types::CreateUserRequest;
use crate::model::User;
use crate::util::non_blank;

const MIN_PASSWORD_LEN: usize = 8;

/// `POST /api/users` - owners create any role, managers create workers.
pub async fn create_user(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<AuthUser>,
    Json(req): Json<CreateUserRequest>,
) -> Result<Json<User>, (StatusCode, String)> {
    if !caller.role.can_create(req.role) {
        return Err(forbidden(&format!(
            "A {} cannot create {} accounts",
            caller.role, req.role
        )));
    }
    let username = non_blank(Some(req.username.as_str()))
        .ok_or_else(|| (StatusCode::BAD_REQUEST, "Username cannot be empty".to_string()))?;
    if req.password.chars().count() < MIN_PASSWORD_LEN {
        return Err((
            StatusCode::BAD_REQUEST,
            format!("Password must be at least {} characters", MIN_PASSWORD_LEN),
        ));
    }

    let user = state
        .store
        .create_user(NewUser {
            display_name: non_blank(req.display_name.as_deref()).unwrap_or_else(|| username.clone()),
            username,
            role: req.role,
            password_hash: hash_password(&req.password),
        })
        .await
        .map_err(store_error)?;

    tracing::info!("{} created {} account {}", caller.name, user.role, user.username);
    Ok(Json(user))
}
