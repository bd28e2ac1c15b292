use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use thiserror::Error;

use crate::external::GatewayError;
use crate::models::ApiResponse;
use crate::services::saga::CompensationResult;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sea_orm::DbErr),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Auth error: {0}")]
    AuthError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Permission denied")]
    PermissionDenied,

    #[error("Concurrent modification: {0}")]
    ConcurrentModification(String),

    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Saga step '{step}' failed: {cause}")]
    SagaFailed {
        step: &'static str,
        cause: Box<AppError>,
        compensations: Vec<CompensationResult>,
    },

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Internal server error: {0}")]
    InternalError(String),

    #[error("JWT error: {0}")]
    JwtError(#[from] jsonwebtoken::errors::Error),

    #[error("JSON serialization/deserialization error: {0}")]
    SerdeJsonError(#[from] serde_json::Error),
}

impl AppError {
    /// The error that actually caused the failure, looking through saga wrappers.
    pub fn root_cause(&self) -> &AppError {
        match self {
            AppError::SagaFailed { cause, .. } => cause.root_cause(),
            other => other,
        }
    }

    /// Failures that may succeed on a later attempt: storage errors, lost
    /// version races and gateway outages.
    pub fn is_transient(&self) -> bool {
        match self.root_cause() {
            AppError::DatabaseError(_) | AppError::ConcurrentModification(_) => true,
            AppError::Gateway(GatewayError::Transport(_)) => true,
            AppError::Gateway(GatewayError::Api { status, .. }) => *status >= 500,
            _ => false,
        }
    }

    /// Compensations run by a failed saga; empty for other errors.
    pub fn compensations(&self) -> Vec<CompensationResult> {
        match self {
            AppError::SagaFailed { compensations, .. } => compensations.clone(),
            _ => Vec::new(),
        }
    }

    fn describe(&self) -> (StatusCode, &'static str, String) {
        match self {
            AppError::ValidationError(msg) => {
                log::warn!("Validation error: {msg}");
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
            }
            AppError::AuthError(msg) => {
                log::warn!("Authentication error: {msg}");
                (StatusCode::UNAUTHORIZED, "AUTH_ERROR", msg.clone())
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::PermissionDenied => {
                log::warn!("Permission denied");
                (
                    StatusCode::FORBIDDEN,
                    "FORBIDDEN",
                    "Permission denied".to_string(),
                )
            }
            AppError::ConcurrentModification(msg) => {
                log::warn!("Concurrent modification: {msg}");
                (
                    StatusCode::CONFLICT,
                    "CONCURRENT_MODIFICATION",
                    msg.clone(),
                )
            }
            AppError::Gateway(err) => {
                if err.is_client_error() {
                    log::warn!("Gateway rejected request: {err}");
                    (
                        StatusCode::BAD_REQUEST,
                        "GATEWAY_ERROR",
                        err.user_message().to_string(),
                    )
                } else {
                    log::error!("Gateway error: {err}");
                    (
                        StatusCode::BAD_GATEWAY,
                        "GATEWAY_ERROR",
                        err.user_message().to_string(),
                    )
                }
            }
            AppError::SagaFailed {
                step,
                cause,
                compensations,
            } => {
                log::error!(
                    "Saga step {step} failed with {} compensation(s) run",
                    compensations.len()
                );
                cause.describe()
            }
            AppError::DatabaseError(err) => {
                log::error!("Database error: {err}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "Database error".to_string(),
                )
            }
            _ => {
                log::error!("Internal error: {self}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "Internal server error".to_string(),
                )
            }
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::AuthError(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::PermissionDenied => StatusCode::FORBIDDEN,
            AppError::ConcurrentModification(_) => StatusCode::CONFLICT,
            AppError::Gateway(err) if err.is_client_error() => StatusCode::BAD_REQUEST,
            AppError::Gateway(_) => StatusCode::BAD_GATEWAY,
            AppError::SagaFailed { cause, .. } => cause.status_code(),
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let (status_code, error_code, message) = self.describe();

        HttpResponse::build(status_code).json(ApiResponse::error(error_code, message))
    }
}
