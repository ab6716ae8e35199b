use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Body of `POST /execute`. Missing fields bind as empty strings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionRequest {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub language: String,
}

/// How the success path of a task is produced and returned.
///
/// `Formatted` runs the in-sandbox formatting helper and expects JSON back;
/// `Trace` runs the instrumented trace step and hands its artifact back raw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
    #[default]
    Formatted,
    Trace,
}

impl fmt::Display for OutputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputMode::Formatted => write!(f, "formatted"),
            OutputMode::Trace => write!(f, "trace"),
        }
    }
}

impl FromStr for OutputMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "formatted" => Ok(OutputMode::Formatted),
            "trace" => Ok(OutputMode::Trace),
            other => Err(format!("invalid output mode '{}' (expected formatted or trace)", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Limits {
    pub cpus: f32,
    pub memory_mb: u32,
}

/// A single sandbox task: what image to start, which files to place in the
/// working directory and the shell script to run there.
///
/// The script reports its result by writing to the file named by the
/// `TASK_OUTPUT` environment variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub name: String,
    pub image: String,
    pub run: String,
    pub files: BTreeMap<String, String>,
    pub limits: Limits,
    pub timeout_ms: u64,
}

/// Queue envelope shipped from the API to the worker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRequest {
    pub id: Uuid,
    pub task: TaskSpec,
    pub submitted_at: DateTime<Utc>,
}

impl JobRequest {
    pub fn new(task: TaskSpec) -> Self {
        Self {
            id: Uuid::new_v4(),
            task,
            submitted_at: Utc::now(),
        }
    }
}

/// Terminal state of a job as published by the worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobState {
    Completed { result: String },
    Failed { error: String },
}

impl JobState {
    pub fn is_completed(&self) -> bool {
        matches!(self, JobState::Completed { .. })
    }
}
