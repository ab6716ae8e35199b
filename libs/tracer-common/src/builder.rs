/// Task Specification Builder
///
/// Turns a validated request and its language profile into the `TaskSpec`
/// shipped to the job backend. The run command is assembled from typed
/// steps and only rendered to shell text at the very end; every argument
/// comes from the profile table and is quoted, so nothing from the request
/// other than the file contents ever reaches the sandbox.
///
/// Compiled languages follow one shape:
/// 1. move the uploaded source into the build directory
/// 2. compile with stderr redirected into `$TASK_OUTPUT`
/// 3. stop with a non-zero exit if the compiler wrote anything
/// 4. run the post-build step (formatter, or trace command + artifact)

use crate::error::ValidationError;
use crate::profiles::{LanguageProfile, LanguageRegistry};
use crate::types::{ExecutionRequest, Limits, OutputMode, TaskSpec};
use std::collections::BTreeMap;

/// Environment variable naming the task's designated output file
pub const OUTPUT_VAR: &str = "TASK_OUTPUT";

pub const TASK_NAME: &str = "execute code";

/// No optimization and full debug symbols keep diagnostics line-accurate
pub const DEBUG_FLAGS: [&str; 3] = ["-ggdb", "-O0", "-fno-omit-frame-pointer"];

const SOURCE_PLACEHOLDER: &str = "%SOURCE%";
const BINARY_PLACEHOLDER: &str = "%BINARY%";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    MakeDir { path: String },
    Move { from: String, to: String },
    /// Compiler stderr goes to the output channel
    Compile {
        compiler: String,
        flags: Vec<String>,
        source: String,
        binary: String,
    },
    AbortIfOutput,
    /// stdout goes to the output channel
    Run { argv: Vec<String> },
    /// stdout is discarded
    Exec { argv: Vec<String> },
    /// Copies a file into the output channel
    Emit { path: String },
}

impl Step {
    fn render(&self) -> String {
        let output = format!("\"${}\"", OUTPUT_VAR);
        match self {
            Step::MakeDir { path } => format!("mkdir -p {}", quote(path)),
            Step::Move { from, to } => format!("mv {} {}", quote(from), quote(to)),
            Step::Compile { compiler, flags, source, binary } => {
                let mut argv = vec![compiler.clone()];
                argv.extend(flags.iter().cloned());
                argv.push("-o".to_string());
                argv.push(binary.clone());
                argv.push(source.clone());
                format!("{} 2> {}", join(&argv), output)
            }
            Step::AbortIfOutput => format!("if [ -s {} ]; then exit 1; fi", output),
            Step::Run { argv } => format!("{} > {}", join(argv), output),
            Step::Exec { argv } => format!("{} > /dev/null", join(argv)),
            Step::Emit { path } => format!("cat {} > {}", quote(path), output),
        }
    }
}

/// Render steps into one POSIX shell script, one step per line
pub fn render(steps: &[Step]) -> String {
    steps.iter().map(Step::render).collect::<Vec<_>>().join("\n")
}

/// Quote a single shell word. Plain words are left untouched.
pub fn quote(word: &str) -> String {
    let plain = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_-+=.,/:@%".contains(c));
    if plain {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}

fn join(argv: &[String]) -> String {
    argv.iter().map(|a| quote(a)).collect::<Vec<_>>().join(" ")
}

/// Substitute profile placeholders in a helper command
fn apply_template(argv: &[String], profile: &LanguageProfile) -> Vec<String> {
    let source = profile.source_path();
    let binary = profile.binary_path().unwrap_or_default();
    argv.iter()
        .map(|arg| {
            arg.replace(SOURCE_PLACEHOLDER, &source)
                .replace(BINARY_PLACEHOLDER, &binary)
        })
        .collect()
}

/// Ordered steps for a profile in the given mode
pub fn plan(profile: &LanguageProfile, mode: OutputMode) -> Result<Vec<Step>, ValidationError> {
    let mut steps = Vec::new();

    if let Some(toolchain) = &profile.toolchain {
        let source = profile.source_path();
        let flags = toolchain
            .warning_flags
            .iter()
            .cloned()
            .chain(DEBUG_FLAGS.iter().map(|f| f.to_string()))
            .collect();

        steps.push(Step::MakeDir { path: profile.build_dir.clone() });
        steps.push(Step::Move {
            from: profile.filename.clone(),
            to: source.clone(),
        });
        steps.push(Step::Compile {
            compiler: toolchain.compiler.clone(),
            flags,
            source,
            binary: profile.binary_path().unwrap_or_default(),
        });
        steps.push(Step::AbortIfOutput);
    }

    match mode {
        OutputMode::Formatted => steps.push(Step::Run {
            argv: apply_template(&profile.formatter, profile),
        }),
        OutputMode::Trace => {
            let trace = profile
                .trace
                .as_ref()
                .ok_or_else(|| ValidationError::TraceUnsupported(profile.name.clone()))?;
            steps.push(Step::Exec {
                argv: apply_template(&trace.command, profile),
            });
            steps.push(Step::Emit { path: trace.artifact.clone() });
        }
    }

    Ok(steps)
}

/// Build the task for source code in an already resolved profile
pub fn build_for(
    profile: &LanguageProfile,
    code: &str,
    mode: OutputMode,
) -> Result<TaskSpec, ValidationError> {
    let run = render(&plan(profile, mode)?);

    let mut files: BTreeMap<String, String> = profile.auxiliary_files.clone();
    files.insert(profile.filename.clone(), code.to_string());

    Ok(TaskSpec {
        name: TASK_NAME.to_string(),
        image: profile.image.clone(),
        run,
        files,
        limits: Limits {
            cpus: profile.cpu_limit,
            memory_mb: profile.memory_limit_mb,
        },
        timeout_ms: profile.timeout_ms,
    })
}

/// Resolve the request's language and build its task
pub fn build(
    registry: &LanguageRegistry,
    request: &ExecutionRequest,
    mode: OutputMode,
) -> Result<TaskSpec, ValidationError> {
    let profile = registry.resolve(&request.language)?;
    build_for(profile, &request.code, mode)
}
