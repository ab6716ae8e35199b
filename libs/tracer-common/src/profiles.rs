// Language profile management
// Loads and validates language profiles from languages.json

use crate::error::ValidationError;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

/// Compiler invocation for compiled languages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Toolchain {
    pub compiler: String,
    /// Name of the produced executable inside `build_dir`
    pub binary: String,
    #[serde(default)]
    pub warning_flags: Vec<String>,
}

/// Instrumented post-build step used in trace mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceStep {
    pub command: Vec<String>,
    /// File the trace command leaves behind; returned verbatim
    pub artifact: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LanguageProfile {
    pub name: String,
    pub image: String,
    /// Primary source filename, as uploaded into the sandbox working directory
    pub filename: String,
    pub build_dir: String,
    #[serde(default)]
    pub toolchain: Option<Toolchain>,
    /// Result-formatting helper. `%SOURCE%` and `%BINARY%` are substituted.
    pub formatter: Vec<String>,
    #[serde(default)]
    pub trace: Option<TraceStep>,
    #[serde(default)]
    pub auxiliary_files: BTreeMap<String, String>,
    pub cpu_limit: f32,
    pub memory_limit_mb: u32,
    pub timeout_ms: u64,
}

impl LanguageProfile {
    /// Path of the source file once moved into the build directory
    pub fn source_path(&self) -> String {
        match self.toolchain {
            Some(_) => format!("{}/{}", self.build_dir.trim_end_matches('/'), self.filename),
            None => self.filename.clone(),
        }
    }

    pub fn binary_path(&self) -> Option<String> {
        self.toolchain
            .as_ref()
            .map(|t| format!("{}/{}", self.build_dir.trim_end_matches('/'), t.binary))
    }

    /// Profile of the original gcc-based service for C and C++
    fn gcc(name: &str, compiler: &str, filename: &str) -> Self {
        Self {
            name: name.to_string(),
            image: "gcc-compiler:latest".to_string(),
            filename: filename.to_string(),
            build_dir: "/tmp/user_code".to_string(),
            toolchain: Some(Toolchain {
                compiler: compiler.to_string(),
                binary: "usercode".to_string(),
                warning_flags: Vec::new(),
            }),
            formatter: vec![
                "python3".to_string(),
                "/tmp/parser/wsgi_backend.py".to_string(),
                name.to_string(),
            ],
            trace: Some(TraceStep {
                command: vec![
                    "python3".to_string(),
                    "/tmp/parser/wsgi_backend.py".to_string(),
                    name.to_string(),
                ],
                artifact: "/tmp/user_code/usercode.vgtrace".to_string(),
            }),
            auxiliary_files: BTreeMap::new(),
            cpu_limit: 1.0,
            memory_limit_mb: 1000,
            timeout_ms: 20_000,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LanguagesFile {
    pub languages: Vec<LanguageProfile>,
}

/// Registry of configured languages.
///
/// Read-only after construction; share it behind an `Arc`.
#[derive(Debug, Clone)]
pub struct LanguageRegistry {
    profiles: HashMap<String, LanguageProfile>,
}

impl LanguageRegistry {
    /// Load language profiles from a languages.json file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;

        let file: LanguagesFile = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;

        Self::from_profiles(file.languages)
    }

    pub fn from_profiles(languages: Vec<LanguageProfile>) -> Result<Self> {
        let mut profiles = HashMap::new();
        for profile in languages {
            if profile.name.trim().is_empty() {
                bail!("Language profile with empty name");
            }
            if profile.name != profile.name.trim() {
                bail!("Language name '{}' has surrounding whitespace", profile.name);
            }
            if profile.filename.is_empty() || profile.filename.contains('/') {
                bail!("Language '{}' has invalid filename '{}'", profile.name, profile.filename);
            }
            if profile.formatter.is_empty() {
                bail!("Language '{}' has no formatter command", profile.name);
            }
            let name = profile.name.clone();
            if profiles.insert(name.clone(), profile).is_some() {
                bail!("Language '{}' is configured twice", name);
            }
        }

        if profiles.is_empty() {
            bail!("No languages configured");
        }

        Ok(Self { profiles })
    }

    /// Built-in C and C++ profiles
    pub fn builtin() -> Self {
        let profiles = [
            LanguageProfile::gcc("c", "gcc", "usercode.c"),
            LanguageProfile::gcc("c++", "g++", "usercode.cpp"),
        ]
        .into_iter()
        .map(|p| (p.name.clone(), p))
        .collect();

        Self { profiles }
    }

    /// Resolve a declared language identifier to its profile
    pub fn resolve(&self, language: &str) -> Result<&LanguageProfile, ValidationError> {
        let language = language.trim();
        if language.is_empty() {
            return Err(ValidationError::MissingLanguage);
        }

        self.profiles
            .get(language)
            .ok_or_else(|| ValidationError::UnknownLanguage(language.to_string()))
    }

    /// List all configured languages
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.profiles.keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_builtin_languages() {
        let registry = LanguageRegistry::builtin();
        assert_eq!(registry.names(), vec!["c", "c++"]);

        let c = registry.resolve("c").unwrap();
        assert_eq!(c.filename, "usercode.c");
        assert_eq!(c.toolchain.as_ref().unwrap().compiler, "gcc");
        assert_eq!(c.source_path(), "/tmp/user_code/usercode.c");
        assert_eq!(c.binary_path().as_deref(), Some("/tmp/user_code/usercode"));

        let cpp = registry.resolve("c++").unwrap();
        assert_eq!(cpp.filename, "usercode.cpp");
        assert_eq!(cpp.toolchain.as_ref().unwrap().compiler, "g++");
    }

    #[test]
    fn test_resolve_trims_language() {
        let registry = LanguageRegistry::builtin();
        assert_eq!(registry.resolve("  c\n").unwrap().name, "c");
    }

    #[test]
    fn test_resolve_rejects_empty_and_unknown() {
        let registry = LanguageRegistry::builtin();
        assert_eq!(registry.resolve(""), Err(ValidationError::MissingLanguage));
        assert_eq!(registry.resolve("   "), Err(ValidationError::MissingLanguage));
        assert_eq!(
            registry.resolve("cobol"),
            Err(ValidationError::UnknownLanguage("cobol".to_string()))
        );
        assert_eq!(
            registry.resolve("cobol").unwrap_err().to_string(),
            "unknown language: cobol"
        );
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"languages": [{{
                "name": "python",
                "image": "python:3.12-slim",
                "filename": "main.py",
                "build_dir": "/tmp/user_code",
                "formatter": ["python3", "/tmp/parser/run.py", "%SOURCE%"],
                "cpu_limit": 0.5,
                "memory_limit_mb": 256,
                "timeout_ms": 10000
            }}]}}"#
        )
        .unwrap();

        let registry = LanguageRegistry::load(file.path()).unwrap();
        let python = registry.resolve("python").unwrap();
        assert!(python.toolchain.is_none());
        assert!(python.auxiliary_files.is_empty());
        assert_eq!(python.source_path(), "main.py");
        assert!(registry.resolve("c").is_err());
    }

    #[test]
    fn test_duplicate_language_rejected() {
        let c = LanguageRegistry::builtin().resolve("c").unwrap().clone();
        let err = LanguageRegistry::from_profiles(vec![c.clone(), c]).unwrap_err();
        assert!(err.to_string().contains("configured twice"));
    }

    #[test]
    fn test_empty_table_rejected() {
        assert!(LanguageRegistry::from_profiles(Vec::new()).is_err());
    }

    #[test]
    fn test_shipped_config_matches_builtin() {
        let registry = LanguageRegistry::load("../../config/languages.json").unwrap();
        let builtin = LanguageRegistry::builtin();
        for name in builtin.names() {
            assert_eq!(registry.resolve(&name).unwrap(), builtin.resolve(&name).unwrap());
        }
    }
}
