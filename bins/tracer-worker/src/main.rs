mod engine;
mod executor;

use anyhow::Context;
use engine::DockerEngine;
use tracer_common::config::Config;
use tracer_common::redis;
use tokio::signal;
use tracing::{debug, error, info, instrument, warn};

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(true)
            .with_line_number(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(true)
            .with_line_number(true)
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    init_tracing(config.json_logs);

    info!("Tracer Worker booting...");

    let engine = DockerEngine::connect()?;

    let client = ::redis::Client::open(config.redis_url.as_str())?;
    let mut redis_conn = ::redis::aio::ConnectionManager::new(client)
        .await
        .context("Failed to connect to Redis")?;

    info!("Connected to Redis: {}", config.redis_url);
    info!("Queue: {}", redis::QUEUE_NAME);

    // Setup graceful shutdown
    let shutdown = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
        warn!("Received shutdown signal, stopping worker...");
    };

    tokio::select! {
        _ = worker_loop(&mut redis_conn, &engine) => {},
        _ = shutdown => {},
    }

    info!("Worker shutdown complete");
    Ok(())
}

#[instrument(skip(redis_conn, engine))]
async fn worker_loop(
    redis_conn: &mut ::redis::aio::ConnectionManager,
    engine: &DockerEngine,
) {
    loop {
        // BLPOP with 5 second timeout for graceful shutdown
        match redis::pop_job(redis_conn, 5.0).await {
            Ok(Some(job)) => {
                let job_id = job.id;
                let queued_ms = (chrono::Utc::now() - job.submitted_at).num_milliseconds();
                info!(
                    job_id = %job_id,
                    task = %job.task.name,
                    image = %job.task.image,
                    timeout_ms = job.task.timeout_ms,
                    files = job.task.files.len(),
                    queued_ms = queued_ms,
                    "Received job"
                );
                debug!(job_id = %job_id, run = %job.task.run, "Task script");

                let start = std::time::Instant::now();
                let state = executor::execute(&job, engine).await;

                info!(
                    job_id = %job_id,
                    completed = state.is_completed(),
                    execution_ms = start.elapsed().as_millis(),
                    "Execution completed"
                );

                match redis::publish_state(redis_conn, &job_id, &state).await {
                    Ok(_) => {
                        info!(job_id = %job_id, "Result published to Redis");
                    }
                    Err(e) => {
                        // Non-fatal - the waiting side times out on its own
                        error!(job_id = %job_id, error = %e, "Failed to publish result");
                    }
                }
            }
            Ok(None) => {
                // Timeout - check for shutdown
                continue;
            }
            Err(e) => {
                error!(error = %e, "Redis error");
                tokio::time::sleep(tokio::time::Duration::from_secs(1)).await;
            }
        }
    }
}
