// HTTP route handlers for the Tracer API

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use std::sync::Arc;
use tracer_common::builder;
use tracer_common::types::ExecutionRequest;
use tracing::{debug, info, warn};

use crate::error::ApiError;
use crate::metrics;
use crate::response;
use crate::AppState;

/// POST /execute - Build, run and report on a piece of code
pub async fn execute(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ExecutionRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::Binding(e.body_text()))?;

    debug!(language = %request.language, code = %request.code, "Received code");

    let profile = state.registry.resolve(&request.language).map_err(|e| {
        warn!(language = %request.language, error = %e, "Rejected request");
        e
    })?;
    let task = builder::build_for(profile, &request.code, state.mode)?;

    let timer = metrics::EXECUTION_DURATION.start_timer();
    let outcome = match state.coordinator.execute(task).await {
        Ok(outcome) => outcome,
        Err(e) => {
            timer.stop_and_discard();
            warn!(language = %profile.name, error = %e, "Submission failed");
            metrics::record_outcome("rejected");
            return Err(e.into());
        }
    };
    timer.observe_duration();
    metrics::record_outcome(outcome.label());

    info!(
        language = %profile.name,
        outcome = outcome.label(),
        source_size = request.code.len(),
        "Execution finished"
    );

    Ok(response::assemble(
        outcome,
        &request.code,
        &profile.filename,
        state.mode,
    ))
}

/// GET /status - Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// GET /metrics - Prometheus scrape endpoint
pub async fn scrape_metrics() -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::render(),
    )
}

#[cfg(test)]
mod tests {
    use crate::coordinator::Coordinator;
    use crate::engine::{CompletionCallback, JobEngine, JobHandle, SubmissionError};
    use crate::routes;
    use crate::AppState;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::Router;
    use serde_json::{json, Value};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tower::ServiceExt;
    use tracer_common::profiles::LanguageRegistry;
    use tracer_common::types::{JobState, OutputMode, TaskSpec};
    use uuid::Uuid;

    /// Records submitted tasks and completes them with a fixed state.
    /// `None` holds on to the callback and never completes.
    struct StubEngine {
        state: Option<JobState>,
        submitted: Mutex<Vec<TaskSpec>>,
        pending: Mutex<Vec<CompletionCallback>>,
    }

    impl StubEngine {
        fn new(state: Option<JobState>) -> Arc<Self> {
            Arc::new(Self {
                state,
                submitted: Mutex::new(Vec::new()),
                pending: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl JobEngine for StubEngine {
        async fn submit(&self, task: TaskSpec, on_complete: CompletionCallback) -> Result<JobHandle, SubmissionError> {
            self.submitted.lock().unwrap().push(task);
            match &self.state {
                Some(state) => on_complete(state.clone()),
                None => self.pending.lock().unwrap().push(on_complete),
            }
            Ok(JobHandle { id: Uuid::new_v4() })
        }
    }

    fn app(engine: Arc<StubEngine>, mode: OutputMode) -> Router {
        let state = Arc::new(AppState {
            registry: LanguageRegistry::builtin(),
            coordinator: Coordinator::with_deadline(engine, Duration::from_millis(50)),
            mode,
        });
        Router::new().merge(routes::routes()).with_state(state)
    }

    async fn post_execute(app: Router, body: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri("/execute")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn completed(result: &str) -> Option<JobState> {
        Some(JobState::Completed { result: result.to_string() })
    }

    #[tokio::test]
    async fn test_successful_execution() {
        let engine = StubEngine::new(completed(r#"{"code":"x","trace":[]}"#));
        let (status, body) = post_execute(
            app(engine.clone(), OutputMode::Formatted),
            r#"{"code": "int main() { return 0; }", "language": "c"}"#,
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"code": "x", "trace": []}));

        let submitted = engine.submitted.lock().unwrap();
        assert_eq!(submitted.len(), 1);
        assert_eq!(submitted[0].files["usercode.c"], "int main() { return 0; }");
    }

    #[tokio::test]
    async fn test_compile_error() {
        let engine = StubEngine::new(Some(JobState::Failed {
            error: "/tmp/user_code/usercode.cpp:2:1: error: expected '}' at end of input".to_string(),
        }));
        let (status, body) = post_execute(
            app(engine, OutputMode::Formatted),
            r#"{"code": "int main() {", "language": "c++"}"#,
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body,
            json!({
                "code": "int main() {",
                "error": {
                    "event": "compiler",
                    "exception_msg": "expected '}' at end of input",
                    "line": 2,
                    "column": 1
                }
            })
        );
    }

    #[tokio::test]
    async fn test_unknown_language_never_reaches_engine() {
        let engine = StubEngine::new(completed("{}"));
        let (status, body) = post_execute(
            app(engine.clone(), OutputMode::Formatted),
            r#"{"code": "print(1)", "language": "python"}"#,
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({"message": "unknown language: python"}));
        assert!(engine.submitted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_language() {
        let engine = StubEngine::new(completed("{}"));
        let (status, body) =
            post_execute(app(engine.clone(), OutputMode::Formatted), r#"{"code": "int x;"}"#).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({"message": "language required"}));
        assert!(engine.submitted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_body() {
        let engine = StubEngine::new(completed("{}"));
        let (status, body) = post_execute(app(engine, OutputMode::Formatted), "{not json").await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["message"].as_str().unwrap().starts_with("error binding request"));
    }

    #[tokio::test]
    async fn test_unparseable_output() {
        let engine = StubEngine::new(completed("Traceback (most recent call last):"));
        let (status, body) = post_execute(
            app(engine, OutputMode::Formatted),
            r#"{"code": "int main() {}", "language": "c"}"#,
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["message"].as_str().unwrap().starts_with("could not parse output"));
    }

    #[tokio::test]
    async fn test_timeout() {
        let engine = StubEngine::new(None);
        let (status, body) = post_execute(
            app(engine.clone(), OutputMode::Formatted),
            r#"{"code": "int main() { for (;;); }", "language": "c"}"#,
        )
        .await;

        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(body, json!({"message": "timeout"}));

        // Completing after the handler returned must be a silent no-op
        let pending: Vec<CompletionCallback> = engine.pending.lock().unwrap().drain(..).collect();
        assert_eq!(pending.len(), 1);
        for callback in pending {
            callback(JobState::Completed { result: "{}".to_string() });
        }
    }

    #[tokio::test]
    async fn test_trace_mode() {
        let engine = StubEngine::new(completed("==42== trace"));
        let (status, body) = post_execute(
            app(engine.clone(), OutputMode::Trace),
            r#"{"code": "int main() {}", "language": "c"}"#,
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!("==42== trace"));
        assert!(engine.submitted.lock().unwrap()[0].run.contains("usercode.vgtrace"));
    }

    #[tokio::test]
    async fn test_health_check() {
        let engine = StubEngine::new(None);
        let request = Request::builder().uri("/status").body(Body::empty()).unwrap();
        let response = app(engine, OutputMode::Formatted).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
