use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, error};

use crate::engine::archive::ArchiveError;
use crate::models::trip::TransitionError;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("no driver available for your trip, please try again")]
    NoDriverAvailable,

    #[error("dependency failed: {0}")]
    Dependency(String),

    #[error("storage failed: {0}")]
    Storage(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "validation_error",
            AppError::NotFound(_) => "not_found",
            AppError::InvalidState(_) => "invalid_state",
            AppError::NoDriverAvailable => "no_driver_available",
            AppError::Dependency(_) => "dependency_error",
            AppError::Storage(_) => "storage_error",
            AppError::Internal(_) => "internal_error",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::NoDriverAvailable | AppError::Storage(_) | AppError::Dependency(_)
        )
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InvalidState(_) => StatusCode::CONFLICT,
            AppError::NoDriverAvailable => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Dependency(_) => StatusCode::BAD_GATEWAY,
            AppError::Storage(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NoDriverAvailable => AppError::NoDriverAvailable,
            StoreError::TripNotFound(_) | StoreError::NoOpenTrip(_) => {
                AppError::NotFound(err.to_string())
            }
            StoreError::DriverBusy(_) => AppError::InvalidState(err.to_string()),
            StoreError::Transition(transition) => transition.into(),
            StoreError::Sqlite { .. } | StoreError::Corrupt { .. } | StoreError::Poisoned => {
                AppError::Storage(err.to_string())
            }
        }
    }
}

impl From<TransitionError> for AppError {
    fn from(err: TransitionError) -> Self {
        match err {
            TransitionError::NotAssigned { .. } => AppError::NotFound(err.to_string()),
            TransitionError::InvalidState { .. } => AppError::InvalidState(err.to_string()),
        }
    }
}

impl From<ArchiveError> for AppError {
    fn from(err: ArchiveError) -> Self {
        AppError::Dependency(err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        match &self {
            AppError::Storage(_) | AppError::Dependency(_) | AppError::Internal(_) => {
                error!(kind = self.kind(), error = %self, "request failed");
            }
            _ => debug!(kind = self.kind(), error = %self, "request rejected"),
        }

        let body = Json(json!({
            "error": self.to_string(),
            "kind": self.kind(),
            "retryable": self.is_retryable(),
        }));

        (status, body).into_response()
    }
}
