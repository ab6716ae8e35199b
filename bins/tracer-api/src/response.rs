// Response Assembler: maps an execution outcome to an HTTP response

use crate::coordinator::ExecutionOutcome;
use crate::diagnostics::{self, DiagnosticRecord};
use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use serde_json::value::RawValue;
use tracer_common::types::OutputMode;
use tracing::warn;

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

#[derive(Debug, Serialize)]
pub struct DiagnosticResponse {
    pub code: String,
    pub error: DiagnosticDetail,
}

#[derive(Debug, Serialize)]
pub struct DiagnosticDetail {
    pub event: &'static str,
    pub exception_msg: String,
    pub line: u32,
    pub column: u32,
}

impl From<DiagnosticRecord> for DiagnosticResponse {
    fn from(record: DiagnosticRecord) -> Self {
        Self {
            code: record.source_code,
            error: DiagnosticDetail {
                event: record.category.as_str(),
                exception_msg: record.message,
                line: record.line,
                column: record.column,
            },
        }
    }
}

/// Build the response for a finished (or abandoned) execution.
///
/// `filename` is the primary source filename of the request's language,
/// used to locate compiler diagnostics.
pub fn assemble(
    outcome: ExecutionOutcome,
    source_code: &str,
    filename: &str,
    mode: OutputMode,
) -> Response {
    match outcome {
        ExecutionOutcome::TimedOut => (
            StatusCode::GATEWAY_TIMEOUT,
            Json(MessageResponse::new("timeout")),
        )
            .into_response(),

        ExecutionOutcome::Success(raw) => match mode {
            OutputMode::Trace => (StatusCode::OK, Json(raw)).into_response(),
            // Syntax check only; the formatter's bytes go out untouched
            OutputMode::Formatted => match serde_json::from_str::<&RawValue>(&raw).map(|_| ()) {
                Ok(()) => (
                    StatusCode::OK,
                    [(header::CONTENT_TYPE, "application/json")],
                    raw,
                )
                    .into_response(),
                Err(e) => {
                    warn!(error = %e, output_bytes = raw.len(), "Sandbox output is not JSON");
                    (
                        StatusCode::BAD_REQUEST,
                        Json(MessageResponse::new(format!("could not parse output: {}", e))),
                    )
                        .into_response()
                }
            },
        },

        ExecutionOutcome::Failure(raw) => {
            let record = diagnostics::normalize(filename, source_code, &raw);
            (StatusCode::BAD_REQUEST, Json(DiagnosticResponse::from(record))).into_response()
        }
    }
}
