/// Execution Coordinator
///
/// Submits a task to the job engine and waits for its terminal state, racing
/// the completion against a fixed deadline:
///
/// `Built → Submitted → {Completed, Failed, TimedOut}`
///
/// The deadline covers submission as well as the wait.
/// The engine's callback is bridged into the wait with a oneshot channel.
/// `Sender::send` never blocks, and when the waiter has already given up it
/// just returns the value, so a late completion has no effect. Giving up
/// only stops the wait; the submitted job runs to completion in the engine.

use crate::engine::{CompletionCallback, JobEngine, SubmissionError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracer_common::types::{JobState, TaskSpec};
use tracing::{debug, error, info, warn};

/// Ceiling for compiling and running one small program, queueing included
pub const EXECUTION_DEADLINE: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    Success(String),
    Failure(String),
    TimedOut,
}

impl ExecutionOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            ExecutionOutcome::Success(_) => "success",
            ExecutionOutcome::Failure(_) => "failure",
            ExecutionOutcome::TimedOut => "timeout",
        }
    }
}

impl From<JobState> for ExecutionOutcome {
    fn from(state: JobState) -> Self {
        match state {
            JobState::Completed { result } => ExecutionOutcome::Success(result),
            JobState::Failed { error } => ExecutionOutcome::Failure(error),
        }
    }
}

#[derive(Clone)]
pub struct Coordinator {
    engine: Arc<dyn JobEngine>,
    deadline: Duration,
}

impl Coordinator {
    pub fn new(engine: Arc<dyn JobEngine>) -> Self {
        Self::with_deadline(engine, EXECUTION_DEADLINE)
    }

    pub fn with_deadline(engine: Arc<dyn JobEngine>, deadline: Duration) -> Self {
        Self { engine, deadline }
    }

    #[tracing::instrument(skip_all, fields(image = %task.image))]
    pub async fn execute(&self, task: TaskSpec) -> Result<ExecutionOutcome, SubmissionError> {
        let (tx, rx) = oneshot::channel::<JobState>();

        let on_complete: CompletionCallback = Box::new(move |state| {
            // Err only means nobody is waiting any more
            let _ = tx.send(state);
        });

        // One deadline covers both queueing the job and waiting for it
        let deadline = tokio::time::Instant::now() + self.deadline;

        let handle = match tokio::time::timeout_at(deadline, self.engine.submit(task, on_complete)).await {
            Ok(submitted) => submitted?,
            Err(_) => {
                warn!(
                    deadline_ms = self.deadline.as_millis() as u64,
                    "Timed out submitting job"
                );
                return Ok(ExecutionOutcome::TimedOut);
            }
        };
        debug!(job_id = %handle.id, "Job submitted");

        match tokio::time::timeout_at(deadline, rx).await {
            Ok(Ok(state)) => {
                info!(job_id = %handle.id, completed = state.is_completed(), "Job finished");
                Ok(state.into())
            }
            Ok(Err(_)) => {
                error!(job_id = %handle.id, "Engine dropped the completion callback");
                Ok(ExecutionOutcome::Failure(
                    "engine dropped the completion callback".to_string(),
                ))
            }
            Err(_) => {
                warn!(
                    job_id = %handle.id,
                    deadline_ms = self.deadline.as_millis() as u64,
                    "Timed out waiting for job"
                );
                Ok(ExecutionOutcome::TimedOut)
            }
        }
    }
}
