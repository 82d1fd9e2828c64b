//! Client-side session guard.
//!
//! - The access token is a JWT issued by `/api/auth/login`.
//! - Before every request the guard checks the token's `exp` claim locally.
//! - On expiry, or when the server answers 401, the session is cleared and the
//!   [`SessionObserver`] is told where the user belongs next.
//!
//! The signature is not checked here; only the server can do that.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use tokio::sync::RwLock;
use tracing::info;

use super::error::ClientError;
use crate::model::{Role, TokenClaims};

/// A bearer token and the claims decoded from it.
#[derive(Debug, Clone)]
pub struct Session {
    token: String,
    claims: TokenClaims,
}

impl Session {
    /// Decode the claims of `token` without verifying its signature.
    pub fn from_token(token: impl Into<String>) -> Result<Self, ClientError> {
        let token = token.into();
        let mut validation = Validation::new(Algorithm::HS256);
        validation.insecure_disable_signature_validation();
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        let data = jsonwebtoken::decode::<TokenClaims>(
            &token,
            &DecodingKey::from_secret(&[]),
            &validation,
        )
        .map_err(|e| ClientError::Parse(format!("Invalid access token: {}", e)))?;

        Ok(Self {
            token,
            claims: data.claims,
        })
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn claims(&self) -> &TokenClaims {
        &self.claims
    }

    pub fn role(&self) -> Role {
        self.claims.role
    }

    pub fn user_id(&self) -> Option<i64> {
        self.claims.user_id()
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.claims.exp, 0).single()
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now.timestamp() >= self.claims.exp
    }
}

/// Why a session stopped being usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidReason {
    /// `exp` passed before the request was made
    Expired,
    /// The server answered 401
    Unauthorized,
    LoggedOut,
}

/// Receives control when the session ends. Implementations clear any UI
/// state and navigate to `role.entry_point()`.
pub trait SessionObserver: Send + Sync {
    fn session_invalid(&self, role: Option<Role>, reason: InvalidReason);
}

/// Observer that only records the handoff in the log.
#[derive(Debug, Default)]
pub struct LogSessionObserver;

impl SessionObserver for LogSessionObserver {
    fn session_invalid(&self, role: Option<Role>, reason: InvalidReason) {
        let target = role.map(|r| r.entry_point()).unwrap_or("/login");
        info!("Session invalid ({:?}), redirecting to {}", reason, target);
    }
}

/// Holds the current session and enforces its expiry.
pub struct AuthGuard {
    session: RwLock<Option<Session>>,
    observer: Arc<dyn SessionObserver>,
}

impl AuthGuard {
    pub fn new(session: Option<Session>, observer: Arc<dyn SessionObserver>) -> Self {
        Self {
            session: RwLock::new(session),
            observer,
        }
    }

    pub async fn session(&self) -> Option<Session> {
        self.session.read().await.clone()
    }

    pub async fn set_session(&self, session: Session) {
        *self.session.write().await = Some(session);
    }

    /// Token to send with the next request.
    ///
    /// Fails with `AuthExpired`, without touching the network, when there is
    /// no session or its expiry has passed.
    pub async fn bearer(&self) -> Result<String, ClientError> {
        self.bearer_at(Utc::now()).await
    }

    pub async fn bearer_at(&self, now: DateTime<Utc>) -> Result<String, ClientError> {
        {
            let session = self.session.read().await;
            match session.as_ref() {
                None => return Err(ClientError::AuthExpired),
                Some(s) if !s.is_expired_at(now) => return Ok(s.token().to_string()),
                Some(_) => {}
            }
        }
        self.invalidate(InvalidReason::Expired).await;
        Err(ClientError::AuthExpired)
    }

    /// Clear the session and hand off to the observer. Only the first
    /// invalidation of a session notifies.
    pub async fn invalidate(&self, reason: InvalidReason) {
        let previous = self.session.write().await.take();
        if let Some(session) = previous {
            self.observer.session_invalid(Some(session.role()), reason);
        }
    }

    pub async fn logout(&self) {
        self.invalidate(InvalidReason::LoggedOut).await;
    }

    pub async fn is_active(&self) -> bool {
        self.session.read().await.is_some()
    }
}
