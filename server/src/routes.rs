//! HTTP route handlers for the Timify server.
//!
//! This module provides the HTTP API endpoints:
//!
//! - `POST /tracking-started` - Record that time tracking began today
//! - `GET /health` - Health check endpoint
//!
//! # Architecture
//!
//! All routes share application state through [`AppState`], which contains:
//! - The shared [`TrackingState`] flag
//! - The optional bearer token guarding the mutating endpoint
//! - Server start time for uptime reporting
//!
//! # Example
//!
//! ```rust,no_run
//! use timify_server::routes::{create_router, AppState};
//! use timify_server::tracking::TrackingState;
//!
//! #[tokio::main]
//! async fn main() {
//!     let state = AppState::new(TrackingState::new(), None);
//!     let app = create_router(state);
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await.unwrap();
//!     axum::serve(listener, app).await.unwrap();
//! }
//! ```

use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tower_http::trace::TraceLayer;
use tracing::debug;

use crate::auth::{authorize, AuthError};
use crate::tracking::TrackingState;

// ============================================================================
// Application State
// ============================================================================

/// Shared application state for all route handlers.
#[derive(Clone)]
pub struct AppState {
    /// Daily tracking flag, shared with the scheduled jobs.
    pub tracking: TrackingState,

    /// Bearer token required by `POST /tracking-started`, if any.
    pub api_token: Option<Arc<str>>,

    /// Server start time for uptime calculation.
    pub start_time: Instant,
}

impl AppState {
    /// Creates a new application state.
    ///
    /// # Arguments
    ///
    /// * `tracking` - The tracking flag shared with the reminder monitor
    /// * `api_token` - Optional bearer token for the mutating endpoint
    #[must_use]
    pub fn new(tracking: TrackingState, api_token: Option<String>) -> Self {
        Self {
            tracking,
            api_token: api_token.map(Arc::from),
            start_time: Instant::now(),
        }
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("tracking", &self.tracking)
            .field("api_token", &self.api_token.as_ref().map(|_| "<redacted>"))
            .field("start_time", &self.start_time)
            .finish()
    }
}

// ============================================================================
// Router
// ============================================================================

/// Creates the application router with all routes configured.
///
/// # Returns
///
/// An axum `Router` with the following routes:
/// - `POST /tracking-started` - Mark tracking as started
/// - `GET /health` - Health check endpoint
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/tracking-started", post(post_tracking_started))
        .route("/health", get(get_health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ============================================================================
// Error Response Types
// ============================================================================

/// JSON error response body.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<String>,
}

impl ErrorResponse {
    fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: None,
        }
    }

    fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

// ============================================================================
// POST /tracking-started
// ============================================================================

/// POST /tracking-started - Record that time tracking started today.
///
/// The request body is ignored. Repeated calls are harmless.
///
/// # Authentication
///
/// Only when an API token is configured: `Authorization: Bearer <token>`.
///
/// # Responses
///
/// - `200 OK` - Flag set (empty body)
/// - `401 Unauthorized` - Token missing or invalid
async fn post_tracking_started(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Err(err) = authorize(&headers, state.api_token.as_deref()) {
        debug!(error = %err, "Rejected tracking-started request");
        let code = match err {
            AuthError::MissingToken => "missing_token",
            AuthError::InvalidToken => "invalid_token",
        };
        return (
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse::new(err.to_string()).with_code(code)),
        )
            .into_response();
    }

    state.tracking.mark_started();

    StatusCode::OK.into_response()
}

// ============================================================================
// GET /health - Health Check
// ============================================================================

/// Response body for health check endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Server status (always "ok" if responding).
    pub status: String,

    /// Whether tracking has started since the last reset.
    pub tracking_started: bool,

    /// Server uptime in seconds.
    pub uptime_seconds: u64,
}

/// GET /health - Health check endpoint.
///
/// No authentication required.
///
/// # Response
///
/// ```json
/// {
///   "status": "ok",
///   "tracking_started": false,
///   "uptime_seconds": 3600
/// }
/// ```
async fn get_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        tracking_started: state.tracking.is_started(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
    })
}

// ============================================================================
// Tests
// ============================================================================
