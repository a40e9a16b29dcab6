use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tracing::error;

use crate::auth::TokenConfig;
use crate::config::ScoringConfig;
use crate::errors::ScoringError;
use crate::fights::FightResolutionService;
use crate::ranking::RankingSnapshotService;
use crate::store::ScoringRepository;

/// Shared application state containing all dependencies
#[derive(Clone)]
pub struct AppState {
    pub resolution_service: Arc<FightResolutionService>,
    pub ranking_service: Arc<RankingSnapshotService>,
    pub token_config: TokenConfig,
}

impl AppState {
    pub fn new(
        repository: Arc<dyn ScoringRepository>,
        config: ScoringConfig,
        token_config: TokenConfig,
    ) -> Self {
        Self {
            resolution_service: Arc::new(FightResolutionService::new(
                Arc::clone(&repository),
                config,
            )),
            ranking_service: Arc::new(RankingSnapshotService::new(repository)),
            token_config,
        }
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("JWT error: {0}")]
    JwtError(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::JwtError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Validation(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            AppError::DatabaseError(msg) => {
                error!(error = %msg, "Storage failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Database error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": error_message
        }));

        (status, body).into_response()
    }
}

impl From<ScoringError> for AppError {
    fn from(err: ScoringError) -> Self {
        match err {
            ScoringError::NotFound { .. } => AppError::NotFound(err.to_string()),
            ScoringError::Validation(msg) => AppError::Validation(msg),
            ScoringError::ConcurrencyConflict(msg) => AppError::Conflict(msg),
            ScoringError::Timeout(_) => AppError::Unavailable(err.to_string()),
            ScoringError::Storage(msg) => AppError::DatabaseError(msg),
        }
    }
}
