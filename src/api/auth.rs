//! JWT auth for the farm dashboards.
//!
//! - A user posts `{username, password}` to `/api/auth/login`
//! - Server returns an HS256 JWT carrying the user id, display name and role
//! - Every other `/api` route requires `Authorization: Bearer <jwt>`
//!
//! A missing, malformed or expired token is always a 401, which the client
//! treats as "session invalid".

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use thiserror::Error;

use super::routes::AppState;
use super::types::{LoginRequest, LoginResponse};
use crate::model::{Role, TokenClaims, User};

const PBKDF2_ITERATIONS: u32 = 100_000;

/// The authenticated caller, inserted as a request extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub id: i64,
    pub name: String,
    pub role: Role,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PasswordError {
    #[error("Password hash is not in pbkdf2:iterations:salt:hash form")]
    Malformed,
}

/// Hash a password as `pbkdf2:iterations:hex_salt:hex_hash` (PBKDF2-SHA256).
pub fn hash_password(password: &str) -> String {
    let mut salt = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut salt);
    let hash = derive(password, &salt, PBKDF2_ITERATIONS);
    format!(
        "pbkdf2:{}:{}:{}",
        PBKDF2_ITERATIONS,
        hex::encode(salt),
        hex::encode(hash)
    )
}

pub fn verify_password(password: &str, stored: &str) -> Result<bool, PasswordError> {
    let parts: Vec<&str> = stored.split(':').collect();
    let [scheme, iterations, salt, expected] = parts.as_slice() else {
        return Err(PasswordError::Malformed);
    };
    if *scheme != "pbkdf2" {
        return Err(PasswordError::Malformed);
    }
    let iterations: u32 = iterations.parse().map_err(|_| PasswordError::Malformed)?;
    let salt = hex::decode(salt).map_err(|_| PasswordError::Malformed)?;
    let expected = hex::decode(expected).map_err(|_| PasswordError::Malformed)?;
    Ok(digests_match(&derive(password, &salt, iterations), &expected))
}

fn derive(password: &str, salt: &[u8], iterations: u32) -> [u8; 32] {
    let mut out = [0u8; 32];
    pbkdf2::pbkdf2_hmac::<sha2::Sha256>(password.as_bytes(), salt, iterations, &mut out);
    out
}

/// Compares every byte, wherever the digests first differ.
fn digests_match(actual: &[u8], expected: &[u8]) -> bool {
    actual.len() == expected.len()
        && actual
            .iter()
            .zip(expected)
            .fold(0u8, |diff, (a, b)| diff | (a ^ b))
            == 0
}

pub fn issue_jwt(secret: &str, ttl_hours: i64, user: &User) -> anyhow::Result<(String, i64)> {
    let now = Utc::now();
    let exp = now + Duration::hours(ttl_hours.max(1));
    let claims = TokenClaims {
        sub: user.id.to_string(),
        name: user.display_name.clone(),
        role: user.role,
        iat: now.timestamp(),
        exp: exp.timestamp(),
    };
    let token = jsonwebtoken::encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;
    Ok((token, claims.exp))
}

pub fn verify_jwt(token: &str, secret: &str) -> anyhow::Result<TokenClaims> {
    let mut validation = Validation::default();
    validation.leeway = 0;
    let token_data = jsonwebtoken::decode::<TokenClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )?;
    Ok(token_data.claims)
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, (StatusCode, String)> {
    let invalid = || (StatusCode::UNAUTHORIZED, "Invalid username or password".to_string());

    let (user, stored) = state
        .store
        .find_credentials(req.username.trim())
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
        .ok_or_else(invalid)?;

    match verify_password(&req.password, &stored) {
        Ok(true) => {}
        Ok(false) => return Err(invalid()),
        Err(e) => {
            tracing::error!("Stored password for {} is unusable: {}", user.username, e);
            return Err(invalid());
        }
    }

    let (token, exp) = issue_jwt(
        &state.config.auth.jwt_secret,
        state.config.auth.jwt_ttl_hours,
        &user,
    )
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    tracing::info!("User {} ({}) logged in", user.username, user.role);
    Ok(Json(LoginResponse { token, exp, user }))
}

pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let auth_header = req
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("");

    let token = auth_header
        .strip_prefix("Bearer ")
        .or_else(|| auth_header.strip_prefix("bearer "))
        .unwrap_or("");

    if token.is_empty() {
        return (StatusCode::UNAUTHORIZED, "Missing Authorization header").into_response();
    }

    let claims = match verify_jwt(token, &state.config.auth.jwt_secret) {
        Ok(claims) => claims,
        Err(_) => {
            return (StatusCode::UNAUTHORIZED, "Invalid or expired token").into_response();
        }
    };
    let Some(id) = claims.user_id() else {
        return (StatusCode::UNAUTHORIZED, "Invalid token subject").into_response();
    };

    req.extensions_mut().insert(AuthUser {
        id,
        name: claims.name,
        role: claims.role,
    });
    next.run(req).await
}

/// Ensure the configured owner account exists.
pub async fn bootstrap_owner(state: &AppState) -> anyhow::Result<()> {
    let Some(owner) = state.config.auth.bootstrap_owner.as_ref() else {
        return Ok(());
    };
    if state.store.find_credentials(&owner.username).await?.is_some() {
        tracing::debug!("Owner account {} already exists", owner.username);
        return Ok(());
    }
    let user = state
        .store
        .create_user(super::store::NewUser {
            username: owner.username.clone(),
            display_name: owner.username.clone(),
            role: Role::Owner,
            password_hash: hash_password(&owner.password),
        })
        .await?;
    tracing::info!("Created owner account {} (id {})", user.username, user.id);
    Ok(())
}
