/// Job Executor - turns a sandbox run into a terminal job state
///
/// This module is the glue layer between the queue and the engine. A task
/// completes only when its script exits 0; anything else is a failure whose
/// message is the first non-empty of: the output channel, stderr, the exit code.

use crate::engine::{DockerEngine, RunOutput};
use tracer_common::types::{JobRequest, JobState};

/// Largest file a task may place in the sandbox
pub const MAX_FILE_BYTES: usize = 1024 * 1024;

pub async fn execute(job: &JobRequest, engine: &DockerEngine) -> JobState {
    if let Some((name, content)) = job.task.files.iter().find(|(_, c)| c.len() > MAX_FILE_BYTES) {
        tracing::warn!(
            job_id = %job.id,
            file = %name,
            size = content.len(),
            "File exceeds sandbox limit"
        );
        return JobState::Failed {
            error: format!("file '{}' exceeds {} bytes", name, MAX_FILE_BYTES),
        };
    }

    match engine.run_task(&job.task).await {
        Ok(run) => {
            tracing::debug!(
                job_id = %job.id,
                exit_code = ?run.exit_code,
                timed_out = run.timed_out,
                execution_ms = run.execution_time_ms,
                "Sandbox run finished"
            );
            classify(run, job.task.timeout_ms)
        }
        Err(e) => {
            tracing::error!(job_id = %job.id, error = %e, "Sandbox execution failed");
            JobState::Failed {
                error: format!("sandbox error: {:#}", e),
            }
        }
    }
}

pub fn classify(run: RunOutput, timeout_ms: u64) -> JobState {
    if run.timed_out {
        return JobState::Failed {
            error: format!("task timed out after {}ms", timeout_ms),
        };
    }

    if run.exit_code == Some(0) {
        return JobState::Completed { result: run.output };
    }

    let error = if !run.output.trim().is_empty() {
        run.output
    } else if !run.stderr.trim().is_empty() {
        run.stderr
    } else {
        match run.exit_code {
            Some(code) => format!("exit code {}", code),
            None => "task exited without a status".to_string(),
        }
    };

    JobState::Failed { error }
}
