/// Diagnostic Normalizer
///
/// Classifies the raw failure text of a task (usually gcc/ld stderr) into a
/// single `DiagnosticRecord`.
///
/// **Rules, checked in order on each line, top to bottom:**
/// 1. `<file>:<line>:<col>: ... error: <msg>` for the primary source file → Compiler
/// 2. a `#error` directive → UserDefined
/// 3. anything mentioning `undefined` → Linker
///
/// The first line matching any rule decides the record and ends the scan.
/// If no line matches, the record is Unknown.

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use std::fmt;
use tracing::debug;

pub const UNKNOWN_ERROR_MESSAGE: &str = "unknown compiler error";

lazy_static! {
    /// Whatever follows the filename in a located compiler diagnostic
    static ref LOCATED_ERROR: Regex = Regex::new(r"^:(\d+):(\d+):.*?error:(.*)$").unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Compiler,
    Linker,
    UserDefined,
    Unknown,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Compiler => "compiler",
            Category::Linker => "linker",
            Category::UserDefined => "user_defined",
            Category::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticRecord {
    pub category: Category,
    pub message: String,
    pub line: u32,
    pub column: u32,
    pub source_code: String,
}

/// `<filename>:<line>:<col>: ... error: <msg>`, where the filename starts
/// the line or follows a path separator or whitespace.
fn compiler_error(line: &str, filename: &str) -> Option<(u32, u32, String)> {
    if filename.is_empty() {
        return None;
    }

    line.match_indices(filename)
        .filter(|(idx, _)| {
            line[..*idx]
                .chars()
                .next_back()
                .map_or(true, |c| c == '/' || c.is_whitespace())
        })
        .find_map(|(idx, _)| {
            let caps = LOCATED_ERROR.captures(&line[idx + filename.len()..])?;
            // Out-of-range positions still mark a compiler diagnostic
            let lineno = caps[1].parse().unwrap_or(0);
            let column = caps[2].parse().unwrap_or(0);
            Some((lineno, column, caps[3].trim().to_string()))
        })
}

fn user_error(line: &str) -> Option<String> {
    line.split_once("#error").map(|(_, msg)| msg.trim().to_string())
}

/// e.g. `/tmp/user_code/usercode.c:12: undefined reference to `foo'`
fn linker_error(line: &str, filename: &str) -> Option<(u32, String)> {
    if !line.contains("undefined") {
        return None;
    }

    let parts: Vec<&str> = line.split(':').collect();
    let message = parts.last().map(|m| m.trim()).unwrap_or_default().to_string();
    let lineno = if !filename.is_empty() && parts[0].contains(filename) {
        parts
            .get(1)
            .and_then(|n| n.trim().parse().ok())
            .unwrap_or(0)
    } else {
        0
    };

    Some((lineno, message))
}

/// Classify raw failure text for a program whose primary source file is
/// `filename`.
pub fn normalize(filename: &str, source_code: &str, raw: &str) -> DiagnosticRecord {
    let record = |category, message: String, line, column| DiagnosticRecord {
        category,
        message,
        line,
        column,
        source_code: source_code.to_string(),
    };

    for (idx, line) in raw.lines().enumerate() {
        if let Some((lineno, column, message)) = compiler_error(line, filename) {
            debug!(raw_line = idx, category = "compiler", "Diagnostic matched");
            return record(Category::Compiler, message, lineno, column);
        }

        if let Some(message) = user_error(line) {
            debug!(raw_line = idx, category = "user_defined", "Diagnostic matched");
            return record(Category::UserDefined, message, 0, 0);
        }

        if let Some((lineno, message)) = linker_error(line, filename) {
            debug!(raw_line = idx, category = "linker", "Diagnostic matched");
            return record(Category::Linker, message, lineno, 0);
        }
    }

    debug!(raw_bytes = raw.len(), "No diagnostic rule matched");
    record(Category::Unknown, UNKNOWN_ERROR_MESSAGE.to_string(), 0, 0)
}
