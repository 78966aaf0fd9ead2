use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use skillswap_core::{InvalidId, LifecycleError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("Not authorized")]
    Unauthorized,

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    /// The request is valid but the resource is not in a state that allows
    /// it. `current_status` lets the caller tell a stale read from a bad
    /// request.
    #[error("{message}")]
    Conflict {
        message: String,
        current_status: Option<String>,
    },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("{0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    current_status: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict { .. } => StatusCode::CONFLICT,
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = match self {
            AppError::Conflict {
                message,
                current_status,
            } => ErrorBody {
                message,
                current_status,
            },
            AppError::Database(err) => {
                tracing::error!(error = %err, "database error");
                ErrorBody {
                    message: "Internal server error".to_string(),
                    current_status: None,
                }
            }
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "internal error");
                ErrorBody {
                    message: "Internal server error".to_string(),
                    current_status: None,
                }
            }
            other => ErrorBody {
                message: other.to_string(),
                current_status: None,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<LifecycleError> for AppError {
    fn from(err: LifecycleError) -> Self {
        match err {
            LifecycleError::BidNotFound(_) | LifecycleError::MilestoneNotFound(_) => {
                AppError::NotFound(err.to_string())
            }
            LifecycleError::InvalidAmount | LifecycleError::UnsupportedTransition(_) => {
                AppError::Validation(err.to_string())
            }
            _ => AppError::Conflict {
                current_status: err.current_status(),
                message: err.to_string(),
            },
        }
    }
}

impl From<InvalidId> for AppError {
    fn from(err: InvalidId) -> Self {
        AppError::Validation(err.to_string())
    }
}
