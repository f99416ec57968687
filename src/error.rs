use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::predict::PredictionError;
use crate::schema::ValidationError;

/// Per-request failures, rendered as `{"error": ...}` with a status code.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("No data provided")]
    NoData,

    #[error("Invalid request body: {0}")]
    InvalidBody(String),

    #[error("Invalid input: {0}")]
    Validation(#[from] ValidationError),

    #[error("Prediction failed: {0}")]
    Prediction(String),

    #[error("Health monitoring failed: {0}")]
    Vitals(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NoData | ApiError::InvalidBody(_) | ApiError::Validation(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Prediction(_) | ApiError::Vitals(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<PredictionError> for ApiError {
    fn from(e: PredictionError) -> Self {
        match e {
            PredictionError::Invalid(v) => ApiError::Validation(v),
            other => ApiError::Prediction(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "error": self.to_string() }))).into_response()
    }
}
