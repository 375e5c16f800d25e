use crate::models::friend::FriendGraphError;
use crate::models::message::PayloadError;
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use error_types::{error_codes, error_types as kinds, ErrorResponse};
use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error, Clone)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("server start failure: {0}")]
    StartServer(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Conflict(String),

    #[error(transparent)]
    Friend(#[from] FriendGraphError),

    #[error(transparent)]
    Payload(#[from] PayloadError),

    #[error("database error: {0}")]
    Database(String),

    #[error("internal server error: {0}")]
    Internal(String),
}

impl From<tokio_postgres::Error> for AppError {
    fn from(e: tokio_postgres::Error) -> Self {
        AppError::Database(e.to_string())
    }
}

impl From<deadpool_postgres::PoolError> for AppError {
    fn from(e: deadpool_postgres::PoolError) -> Self {
        AppError::Database(e.to_string())
    }
}

impl From<db_pool::DbPoolError> for AppError {
    fn from(e: db_pool::DbPoolError) -> Self {
        AppError::Database(e.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(e: validator::ValidationErrors) -> Self {
        AppError::Validation(e.to_string())
    }
}

impl AppError {
    /// Returns HTTP status code
    pub fn status(&self) -> u16 {
        match self {
            AppError::BadRequest(_) | AppError::Validation(_) | AppError::Payload(_) => 400,
            AppError::Friend(FriendGraphError::UserNotFound) => 404,
            AppError::Friend(_) => 400,
            AppError::NotFound(_) => 404,
            AppError::Forbidden(_) => 403,
            AppError::Conflict(_) => 409,
            AppError::Config(_)
            | AppError::StartServer(_)
            | AppError::Database(_)
            | AppError::Internal(_) => 500,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::BadRequest(_) => error_codes::BAD_REQUEST,
            AppError::Validation(_) => error_codes::VALIDATION_FAILED,
            AppError::Payload(e) => e.code(),
            AppError::Friend(e) => e.code(),
            AppError::NotFound(_) => error_codes::NOT_FOUND,
            AppError::Forbidden(_) => error_codes::NOT_GROUP_MEMBER,
            AppError::Conflict(_) => error_codes::USERNAME_TAKEN,
            AppError::Database(_) => error_codes::DATABASE_ERROR,
            AppError::Config(_) | AppError::StartServer(_) | AppError::Internal(_) => {
                error_codes::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn kind(&self) -> &'static str {
        match self.status() {
            400 => kinds::VALIDATION_ERROR,
            404 => kinds::NOT_FOUND_ERROR,
            403 | 409 => kinds::CONFLICT_ERROR,
            _ => kinds::SERVER_ERROR,
        }
    }

    /// Message shown to clients; server-side failures stay generic
    pub fn public_message(&self) -> String {
        match self {
            AppError::Database(_)
            | AppError::Internal(_)
            | AppError::Config(_)
            | AppError::StartServer(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }

    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse::new(&self.public_message(), self.status(), self.kind(), self.code())
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    fn error_response(&self) -> HttpResponse {
        if self.status() >= 500 {
            tracing::error!(error = %self, "request failed");
        }
        HttpResponse::build(self.status_code()).json(self.to_response())
    }
}
