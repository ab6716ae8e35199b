/// Job engine boundary
///
/// The engine accepts a task together with a completion callback and owns
/// the job from then on. The callback is invoked exactly once with the
/// terminal `JobState`, on a task of the engine's choosing.
///
/// Production uses `RedisEngine`: tasks are queued for `tracer-worker` and a
/// spawned waiter blocks on the job's result list.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use std::time::Duration;
use thiserror::Error;
use tracer_common::redis as queue;
use tracer_common::types::{JobRequest, JobState, TaskSpec};
use tracing::{debug, warn};
use uuid::Uuid;

/// Extra time the waiter allows on top of the task timeout for queueing
const RESULT_GRACE: Duration = Duration::from_secs(30);

pub type CompletionCallback = Box<dyn FnOnce(JobState) + Send + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobHandle {
    pub id: Uuid,
}

#[derive(Debug, Error)]
pub enum SubmissionError {
    #[error("invalid task: {0}")]
    Invalid(String),

    #[error("failed to queue task: {0}")]
    Rejected(#[from] redis::RedisError),
}

#[async_trait]
pub trait JobEngine: Send + Sync {
    async fn submit(
        &self,
        task: TaskSpec,
        on_complete: CompletionCallback,
    ) -> Result<JobHandle, SubmissionError>;
}

/// Reject specs the backend could never run
pub fn validate(task: &TaskSpec) -> Result<(), SubmissionError> {
    if task.image.trim().is_empty() {
        return Err(SubmissionError::Invalid("missing image".to_string()));
    }
    if task.run.trim().is_empty() {
        return Err(SubmissionError::Invalid("missing run command".to_string()));
    }
    if task.timeout_ms == 0 {
        return Err(SubmissionError::Invalid("timeout must be positive".to_string()));
    }
    if let Some(name) = task
        .files
        .keys()
        .find(|name| name.is_empty() || name.contains('/') || *name == "." || *name == "..")
    {
        return Err(SubmissionError::Invalid(format!("invalid file name '{}'", name)));
    }
    Ok(())
}

pub struct RedisEngine {
    client: redis::Client,
    queue: ConnectionManager,
}

impl RedisEngine {
    pub async fn connect(redis_url: &str) -> anyhow::Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let queue = ConnectionManager::new(client.clone()).await?;
        Ok(Self { client, queue })
    }
}

#[async_trait]
impl JobEngine for RedisEngine {
    async fn submit(
        &self,
        task: TaskSpec,
        on_complete: CompletionCallback,
    ) -> Result<JobHandle, SubmissionError> {
        validate(&task)?;

        let job = JobRequest::new(task);
        let mut conn = self.queue.clone();
        queue::push_job(&mut conn, &job).await?;

        let job_id = job.id;
        let wait = Duration::from_millis(job.task.timeout_ms) + RESULT_GRACE;
        let client = self.client.clone();

        tokio::spawn(async move {
            let state = await_state(&client, &job_id, wait).await;
            debug!(job_id = %job_id, completed = state.is_completed(), "Job state received");
            on_complete(state);
        });

        Ok(JobHandle { id: job_id })
    }
}

/// Wait for the worker to publish a job's terminal state. Any failure to
/// obtain it is itself reported as a failed job.
async fn await_state(client: &redis::Client, job_id: &Uuid, wait: Duration) -> JobState {
    let mut conn = match client.get_multiplexed_async_connection().await {
        Ok(conn) => conn,
        Err(e) => {
            warn!(job_id = %job_id, error = %e, "Failed to open result connection");
            return JobState::Failed {
                error: format!("failed to wait for job result: {}", e),
            };
        }
    };

    match queue::wait_for_state(&mut conn, job_id, wait.as_secs_f64()).await {
        Ok(Some(state)) => state,
        Ok(None) => JobState::Failed {
            error: format!("no result published within {}s", wait.as_secs()),
        },
        Err(e) => {
            warn!(job_id = %job_id, error = %e, "Failed to read job result");
            JobState::Failed {
                error: format!("failed to read job result: {}", e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracer_common::builder;
    use tracer_common::profiles::LanguageRegistry;
    use tracer_common::types::{ExecutionRequest, OutputMode};

    fn task() -> TaskSpec {
        let request = ExecutionRequest {
            code: "int main() { return 0; }".to_string(),
            language: "c".to_string(),
        };
        builder::build(&LanguageRegistry::builtin(), &request, OutputMode::Formatted).unwrap()
    }

    #[test]
    fn test_built_tasks_are_valid() {
        assert!(validate(&task()).is_ok());
    }

    #[test]
    fn test_validate_rejects_malformed_tasks() {
        let mut t = task();
        t.image = String::new();
        assert!(matches!(validate(&t), Err(SubmissionError::Invalid(_))));

        let mut t = task();
        t.run = "  ".to_string();
        assert!(matches!(validate(&t), Err(SubmissionError::Invalid(_))));

        let mut t = task();
        t.timeout_ms = 0;
        assert!(matches!(validate(&t), Err(SubmissionError::Invalid(_))));

        let mut t = task();
        t.files.insert("../escape.c".to_string(), String::new());
        let err = validate(&t).unwrap_err();
        assert_eq!(err.to_string(), "invalid task: invalid file name '../escape.c'");
    }

    #[tokio::test]
    #[ignore] // Requires Redis and a running tracer-worker
    async fn test_redis_engine_round_trip() {
        let engine = RedisEngine::connect("redis://127.0.0.1:6379")
            .await
            .expect("Failed to connect to Redis");

        let (tx, rx) = tokio::sync::oneshot::channel();
        engine
            .submit(task(), Box::new(move |state| {
                let _ = tx.send(state);
            }))
            .await
            .expect("Submission failed");

        let state = rx.await.expect("Callback never fired");
        println!("Job finished: {:?}", state);
    }
}
