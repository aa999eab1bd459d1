//! Mapping of pipeline errors onto HTTP responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use log::error;

use crate::error::{DataError, EvaluationError, InputValidationError};

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, ServerError>;

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = match &self {
            ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::Internal(msg) => {
                error!("request failed: {msg}");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

impl From<InputValidationError> for ServerError {
    fn from(err: InputValidationError) -> Self {
        ServerError::BadRequest(err.to_string())
    }
}

impl From<DataError> for ServerError {
    fn from(err: DataError) -> Self {
        ServerError::Internal(err.to_string())
    }
}

impl From<EvaluationError> for ServerError {
    fn from(err: EvaluationError) -> Self {
        ServerError::Internal(err.to_string())
    }
}

impl From<tokio::task::JoinError> for ServerError {
    fn from(err: tokio::task::JoinError) -> Self {
        ServerError::Internal(format!("worker task failed: {err}"))
    }
}
