use axum::{
    extract::State,
    http::StatusCode,
    middleware,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;

use crate::auth::{require_update_secret, UpdateSecret};
use crate::error::RefreshError;
use crate::middleware::request_logging;
use crate::models::RefreshSummary;
use crate::refresh::Refresher;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub refresher: Arc<Refresher>,
}

/// Create the API router
pub fn create_router(refresher: Arc<Refresher>, secret: UpdateSecret) -> Router {
    let state = AppState { refresher };

    let protected = Router::new()
        .route("/api/update-stocks", get(update_stocks))
        .route_layer(middleware::from_fn_with_state(secret, require_update_secret))
        .with_state(state);

    Router::new()
        .route("/health", get(health_check))
        .merge(protected)
        .layer(middleware::from_fn(request_logging))
}

// ===== Route Handlers =====

async fn health_check() -> &'static str {
    "OK"
}

/// Run one refresh cycle and report what was written
async fn update_stocks(State(state): State<AppState>) -> Result<Json<UpdateResponse>, ApiError> {
    let summary = state.refresher.run_exclusive().await?;
    Ok(Json(UpdateResponse::from(summary)))
}

// ===== Request/Response Types =====

#[derive(Debug, Serialize)]
pub struct UpdateResponse {
    pub success: bool,
    pub updated: usize,
    pub tickers: Vec<String>,
    pub skipped: usize,
    pub message: String,
}

impl From<RefreshSummary> for UpdateResponse {
    fn from(summary: RefreshSummary) -> Self {
        let message = if summary.updated_count == 0 && summary.skipped_count == 0 {
            "All stocks seem to be up-to-date. No stocks to fetch.".to_string()
        } else {
            format!("Update finished. Processed {} stocks.", summary.updated_count)
        };
        Self {
            success: true,
            updated: summary.updated_count,
            tickers: summary.updated_tickers,
            skipped: summary.skipped_count,
            message,
        }
    }
}

// ===== Error Handling =====

#[derive(Debug)]
pub struct ApiError(RefreshError);

impl From<RefreshError> for ApiError {
    fn from(err: RefreshError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            RefreshError::Unauthorized => StatusCode::UNAUTHORIZED,
            RefreshError::CycleInProgress => StatusCode::CONFLICT,
            RefreshError::DirectoryUnavailable(_)
            | RefreshError::StoreUnavailable(_)
            | RefreshError::Reconciliation(_)
            | RefreshError::Configuration(_) => {
                tracing::error!("Update handler error: {}", self.0);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = Json(json!({
            "success": false,
            "error": self.0.to_string(),
        }));

        (status, body).into_response()
    }
}
