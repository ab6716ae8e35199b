use crate::types::{JobRequest, JobState};
use redis::aio::ConnectionLike;
use redis::{AsyncCommands, RedisResult};

/// Redis queue semantics shared by the API and the worker.
/// Keeps both sides agreeing on key names and payload shapes.

pub const QUEUE_NAME: &str = "tracer:queue:jobs";
pub const RESULT_PREFIX: &str = "tracer:result";

/// Unclaimed results expire; the API may have stopped waiting long ago
pub const RESULT_TTL_SECONDS: u64 = 300;

/// Result list key for a job
pub fn result_key(job_id: &uuid::Uuid) -> String {
    format!("{}:{}", RESULT_PREFIX, job_id)
}

fn serialization_error(e: serde_json::Error) -> redis::RedisError {
    redis::RedisError::from((redis::ErrorKind::TypeError, "serialization error", e.to_string()))
}

fn deserialization_error(e: serde_json::Error) -> redis::RedisError {
    redis::RedisError::from((redis::ErrorKind::TypeError, "deserialization error", e.to_string()))
}

/// Push a job onto the queue (RPUSH, FIFO with BLPOP)
pub async fn push_job<C>(conn: &mut C, job: &JobRequest) -> RedisResult<()>
where
    C: ConnectionLike + Send,
{
    let payload = serde_json::to_string(job).map_err(serialization_error)?;
    conn.rpush(QUEUE_NAME, payload).await
}

/// Pop a job from the queue
/// Uses BLPOP with timeout so the caller can check for shutdown
pub async fn pop_job<C>(conn: &mut C, timeout_seconds: f64) -> RedisResult<Option<JobRequest>>
where
    C: ConnectionLike + Send,
{
    let result: Option<(String, String)> = conn.blpop(QUEUE_NAME, timeout_seconds).await?;

    match result {
        Some((_key, payload)) => {
            let job: JobRequest = serde_json::from_str(&payload).map_err(deserialization_error)?;
            Ok(Some(job))
        }
        None => Ok(None),
    }
}

/// Publish the terminal state of a job
pub async fn publish_state<C>(conn: &mut C, job_id: &uuid::Uuid, state: &JobState) -> RedisResult<()>
where
    C: ConnectionLike + Send,
{
    let key = result_key(job_id);
    let payload = serde_json::to_string(state).map_err(serialization_error)?;

    redis::pipe()
        .atomic()
        .rpush(&key, payload)
        .ignore()
        .cmd("EXPIRE")
        .arg(&key)
        .arg(RESULT_TTL_SECONDS)
        .ignore()
        .query_async(conn)
        .await
}

/// Block until the terminal state of a job is published.
///
/// BLPOP holds the connection for the whole wait, so pass a dedicated
/// connection rather than a shared multiplexed one.
pub async fn wait_for_state<C>(
    conn: &mut C,
    job_id: &uuid::Uuid,
    timeout_seconds: f64,
) -> RedisResult<Option<JobState>>
where
    C: ConnectionLike + Send,
{
    let key = result_key(job_id);
    let result: Option<(String, String)> = conn.blpop(&key, timeout_seconds).await?;

    match result {
        Some((_key, payload)) => {
            let state: JobState = serde_json::from_str(&payload).map_err(deserialization_error)?;
            Ok(Some(state))
        }
        None => Ok(None),
    }
}
