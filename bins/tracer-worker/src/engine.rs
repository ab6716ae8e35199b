/// Execution Engine - runs one task in a Docker container
///
/// **Responsibility:**
/// Start the task's image, place its files, run its script and capture what
/// the script wrote to `$TASK_OUTPUT`.
///
/// **Not responsible for:**
/// - Deciding whether the run succeeded (executor's job)
/// - Queueing or publishing results (worker loop's job)
///
/// **Container lifecycle:**
/// 1. Pull the image if it is not cached
/// 2. Create a keep-alive container: network disabled, CPU/memory limits
/// 3. Write files into the working directory via `exec`
/// 4. `exec sh -c <run>` under the task timeout; kill on timeout
/// 5. `exec cat $TASK_OUTPUT`
/// 6. Force-remove the container (drop guard)

use anyhow::{bail, Context, Result};
use base64::{engine::general_purpose, Engine as _};
use bollard::container::{
    Config, CreateContainerOptions, KillContainerOptions, LogOutput, RemoveContainerOptions,
    StartContainerOptions,
};
use bollard::exec::{CreateExecOptions, StartExecOptions, StartExecResults};
use bollard::image::CreateImageOptions;
use bollard::Docker;
use futures_util::stream::StreamExt;
use std::time::{Duration, Instant};
use tracer_common::builder::OUTPUT_VAR;
use tracer_common::types::TaskSpec;
use tracing::{debug, info, warn};

pub const WORKDIR: &str = "/sandbox";
pub const OUTPUT_PATH: &str = "/sandbox/.task_output";

/// Keeps each `exec` argument below the kernel's per-argument limit
const WRITE_CHUNK_BYTES: usize = 96 * 1024;

/// Raw result of running a task's script
#[derive(Debug, Clone, Default)]
pub struct RunOutput {
    /// Contents of `$TASK_OUTPUT` after the script finished
    pub output: String,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i64>,
    pub timed_out: bool,
    pub execution_time_ms: u64,
}

#[derive(Debug, Default)]
struct ExecOutput {
    stdout: String,
    stderr: String,
    exit_code: Option<i64>,
}

/// Raw exec output. Frames may split a UTF-8 character, so bytes are only
/// decoded once the stream has ended.
#[derive(Debug, Default)]
struct FrameBuffer {
    stdout: Vec<u8>,
    stderr: Vec<u8>,
}

impl FrameBuffer {
    fn push(&mut self, frame: LogOutput) {
        match frame {
            LogOutput::StdOut { message } => self.stdout.extend_from_slice(&message),
            LogOutput::StdErr { message } => self.stderr.extend_from_slice(&message),
            _ => {}
        }
    }

    fn finish(self) -> ExecOutput {
        ExecOutput {
            stdout: String::from_utf8_lossy(&self.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&self.stderr).into_owned(),
            exit_code: None,
        }
    }
}

/// Container cleanup guard - guarantees container removal on drop
/// This ensures containers are cleaned up even if execution fails or is cancelled
struct ContainerGuard<'a> {
    docker: &'a Docker,
    container_id: String,
}

impl<'a> ContainerGuard<'a> {
    fn new(docker: &'a Docker, container_id: String) -> Self {
        Self { docker, container_id }
    }
}

impl<'a> Drop for ContainerGuard<'a> {
    fn drop(&mut self) {
        // Cannot be async in Drop
        let container_id = self.container_id.clone();
        let docker = self.docker.clone();

        tokio::spawn(async move {
            let options = RemoveContainerOptions {
                force: true,
                ..Default::default()
            };

            if let Err(e) = docker.remove_container(&container_id, Some(options)).await {
                warn!(container_id = %container_id, error = %e, "Failed to remove container");
            }
        });
    }
}

pub struct DockerEngine {
    docker: Docker,
}

impl DockerEngine {
    pub fn connect() -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()
            .context("Failed to connect to Docker daemon")?;
        Ok(Self { docker })
    }

    /// Ensure the image is available locally, pulling it on a cache miss
    async fn ensure_image(&self, image: &str) -> Result<()> {
        if self.docker.inspect_image(image).await.is_ok() {
            debug!(image = image, "Image cache hit");
            return Ok(());
        }

        warn!(image = image, "Image cache miss, pulling");

        let options = Some(CreateImageOptions {
            from_image: image,
            ..Default::default()
        });

        let mut stream = self.docker.create_image(options, None, None);
        while let Some(result) = stream.next().await {
            result.context("Failed to pull Docker image")?;
        }

        info!(image = image, "Image pulled");
        Ok(())
    }

    /// Run a command in the container and collect its output
    async fn exec(&self, container_id: &str, cmd: Vec<String>) -> Result<ExecOutput> {
        let options = CreateExecOptions {
            cmd: Some(cmd),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            working_dir: Some(WORKDIR.to_string()),
            ..Default::default()
        };

        let exec = self
            .docker
            .create_exec(container_id, options)
            .await
            .context("Failed to create exec")?;

        let started = self
            .docker
            .start_exec(&exec.id, Some(StartExecOptions { detach: false, ..Default::default() }))
            .await
            .context("Failed to start exec")?;

        let mut frames = FrameBuffer::default();

        if let StartExecResults::Attached { mut output, .. } = started {
            while let Some(msg) = output.next().await {
                match msg {
                    Ok(frame) => frames.push(frame),
                    Err(e) => {
                        frames.stderr.extend_from_slice(format!("\n[exec stream error: {}]", e).as_bytes());
                        break;
                    }
                }
            }
        } else {
            bail!("Failed to attach to exec");
        }

        let mut result = frames.finish();
        let inspect = self.docker.inspect_exec(&exec.id).await?;
        result.exit_code = inspect.exit_code;
        Ok(result)
    }

    /// Write a file into the working directory in base64 chunks
    async fn write_file(&self, container_id: &str, name: &str, content: &str) -> Result<()> {
        let encoded = general_purpose::STANDARD.encode(content);
        let staging = format!(".{}.b64", name);

        let clear = self
            .exec(container_id, sh(format!(": > '{}'", staging)))
            .await?;
        if clear.exit_code != Some(0) {
            bail!("Failed to create {}: {}", name, clear.stderr.trim());
        }

        // base64 output is ASCII, so byte chunks are valid str slices
        for chunk in encoded.as_bytes().chunks(WRITE_CHUNK_BYTES) {
            let chunk = String::from_utf8_lossy(chunk);
            let append = self
                .exec(container_id, sh(format!("printf '%s' '{}' >> '{}'", chunk, staging)))
                .await?;
            if append.exit_code != Some(0) {
                bail!("Failed to write {}: {}", name, append.stderr.trim());
            }
        }

        let decode = self
            .exec(
                container_id,
                sh(format!("base64 -d '{staging}' > '{name}' && rm '{staging}'")),
            )
            .await?;
        if decode.exit_code != Some(0) {
            bail!("Failed to decode {}: {}", name, decode.stderr.trim());
        }

        Ok(())
    }

    /// Run a task to completion (or timeout) and capture its output channel
    #[tracing::instrument(skip(self, task), fields(image = %task.image, timeout_ms = task.timeout_ms))]
    pub async fn run_task(&self, task: &TaskSpec) -> Result<RunOutput> {
        self.ensure_image(&task.image)
            .await
            .with_context(|| format!("Failed to ensure Docker image '{}' is available", task.image))?;

        let keep_alive_secs = Duration::from_millis(task.timeout_ms).as_secs() + 60;
        let container_name = format!("tracer-{}", uuid::Uuid::new_v4());

        let config = Config {
            image: Some(task.image.clone()),
            cmd: Some(vec!["sleep".to_string(), keep_alive_secs.to_string()]),
            entrypoint: Some(vec![]),
            env: Some(vec![format!("{}={}", OUTPUT_VAR, OUTPUT_PATH)]),
            working_dir: Some(WORKDIR.to_string()),
            network_disabled: Some(true), // SECURITY: No network access
            host_config: Some(bollard::models::HostConfig {
                memory: Some(task.limits.memory_mb as i64 * 1024 * 1024),
                nano_cpus: Some((task.limits.cpus as f64 * 1_000_000_000.0) as i64),
                ..Default::default()
            }),
            ..Default::default()
        };

        let create_options = CreateContainerOptions {
            name: container_name.as_str(),
            platform: None,
        };

        let container = self
            .docker
            .create_container(Some(create_options), config)
            .await
            .context("Failed to create Docker container")?;

        let container_id = container.id.clone();
        let _guard = ContainerGuard::new(&self.docker, container_id.clone());

        self.docker
            .start_container(&container_id, None::<StartContainerOptions<String>>)
            .await
            .context("Failed to start Docker container")?;

        for (name, content) in &task.files {
            self.write_file(&container_id, name, content)
                .await
                .with_context(|| format!("Failed to place file '{}'", name))?;
        }

        let start_time = Instant::now();
        let timeout = Duration::from_millis(task.timeout_ms);
        let run = tokio::time::timeout(timeout, self.exec(&container_id, sh(task.run.clone()))).await;
        let execution_time_ms = start_time.elapsed().as_millis() as u64;

        let run = match run {
            Ok(result) => result?,
            Err(_) => {
                warn!(execution_time_ms = execution_time_ms, "Task timed out, killing container");
                if let Err(e) = self
                    .docker
                    .kill_container(&container_id, None::<KillContainerOptions<String>>)
                    .await
                {
                    warn!(error = %e, "Failed to kill timed-out container");
                }
                return Ok(RunOutput {
                    timed_out: true,
                    execution_time_ms,
                    ..Default::default()
                });
            }
        };

        let output = self
            .exec(&container_id, vec!["cat".to_string(), OUTPUT_PATH.to_string()])
            .await?
            .stdout;

        debug!(
            exit_code = ?run.exit_code,
            execution_time_ms = execution_time_ms,
            output_bytes = output.len(),
            "Task script finished"
        );

        Ok(RunOutput {
            output,
            stdout: run.stdout,
            stderr: run.stderr,
            exit_code: run.exit_code,
            timed_out: false,
            execution_time_ms,
        })
    }
}

fn sh(script: String) -> Vec<String> {
    vec!["sh".to_string(), "-c".to_string(), script]
}
