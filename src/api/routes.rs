//! HTTP routing and server lifecycle.

use std::sync::Arc;

use axum::middleware;
use axum::{
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    response::Json,
    routing::{get, patch, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::config::Config;

use super::attendance;
use super::auth;
use super::store::{self, FarmStore};
use super::submissions;
use super::tasks;
use super::types::HealthResponse;
use super::users;

/// Room for multipart framing and the notes field on top of the photo.
const MULTIPART_OVERHEAD: usize = 1024 * 1024;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn FarmStore>,
}

impl AppState {
    /// Open the configured store and make sure the owner account exists.
    pub async fn open(config: Config) -> anyhow::Result<Arc<Self>> {
        tokio::fs::create_dir_all(config.uploads_dir()).await?;
        let store = store::open(&config).await?;
        let state = Arc::new(Self { config, store });
        auth::bootstrap_owner(&state).await?;
        Ok(state)
    }
}

pub(crate) fn forbidden(msg: &str) -> (StatusCode, String) {
    (StatusCode::FORBIDDEN, msg.to_string())
}

/// Build the full router over `state`.
pub fn router(state: Arc<AppState>) -> Router {
    let public_routes = Router::new()
        .route("/api/health", get(health))
        .route("/api/auth/login", post(auth::login))
        // Photos are embedded directly by the dashboards
        .nest_service("/uploads", ServeDir::new(state.config.uploads_dir()));

    let upload_route = Router::new()
        .route(
            "/api/task-submissions/:task_id/submit",
            post(submissions::submit),
        )
        .layer(DefaultBodyLimit::max(
            state.config.max_photo_bytes + MULTIPART_OVERHEAD,
        ));

    let protected_routes = Router::new()
        .route("/api/tasks", get(tasks::list_tasks).post(tasks::create_task))
        .route("/api/tasks/my-tasks", get(tasks::my_tasks))
        .route("/api/tasks/:id/status", patch(tasks::update_task_status))
        .route("/api/tasks/:id", axum::routing::delete(tasks::delete_task))
        .route(
            "/api/task-submissions/pending",
            get(submissions::pending_submissions),
        )
        .route(
            "/api/task-submissions/:task_id/submissions",
            get(submissions::list_submissions),
        )
        .route(
            "/api/task-submissions/submissions/:id/review",
            patch(submissions::review),
        )
        .route(
            "/api/attendance",
            get(attendance::list_attendance).post(attendance::record_attendance),
        )
        .route("/api/users", post(users::create_user))
        .merge(upload_route)
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            auth::require_auth,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP server.
pub async fn serve(config: Config) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let state = AppState::open(config).await?;
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}

/// Health check endpoint.
async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        dev_mode: state.config.dev_mode,
        persistent: state.store.is_persistent(),
    })
}
