use crate::engine::SubmissionError;
use crate::response::MessageResponse;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use thiserror::Error;
use tracer_common::error::ValidationError;

/// Errors raised before an execution outcome exists. All of them are the
/// caller's problem as far as the response goes: 400 with a message.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("error binding request: {0}")]
    Binding(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("error executing code: {0}")]
    Submission(#[from] SubmissionError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (StatusCode::BAD_REQUEST, Json(MessageResponse::new(self.to_string()))).into_response()
    }
}
