// CLI commands for managing language profiles
use anyhow::{bail, Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use tracer_common::builder;
use tracer_common::profiles::{LanguageProfile, LanguageRegistry, LanguagesFile, Toolchain};
use tracer_common::types::{ExecutionRequest, OutputMode, TaskSpec};

/// Fields collected by `add-lang`
pub struct NewLanguage {
    pub name: String,
    pub image: String,
    pub filename: String,
    pub compiler: Option<String>,
    pub formatter: Vec<String>,
    pub build_dir: String,
    pub memory_limit_mb: u32,
    pub cpu_limit: f32,
    pub timeout_ms: u64,
}

/// Load languages configuration
fn load_languages_config(path: &Path) -> Result<LanguagesFile> {
    if !path.exists() {
        return Ok(LanguagesFile { languages: vec![] });
    }

    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

/// Save languages configuration
fn save_languages_config(path: &Path, config: &LanguagesFile) -> Result<()> {
    // Ensure config directory exists
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let json_content = serde_json::to_string_pretty(config)
        .context("Failed to serialize languages.json")?;

    fs::write(path, json_content + "\n")
        .with_context(|| format!("Failed to write {}", path.display()))?;

    Ok(())
}

/// Profile for a new language. The binary is named after the source stem.
pub fn new_profile(lang: NewLanguage) -> LanguageProfile {
    let binary = Path::new(&lang.filename)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "usercode".to_string());

    LanguageProfile {
        name: lang.name,
        image: lang.image,
        filename: lang.filename,
        build_dir: lang.build_dir,
        toolchain: lang.compiler.map(|compiler| Toolchain {
            compiler,
            binary,
            warning_flags: Vec::new(),
        }),
        formatter: lang.formatter,
        trace: None,
        auxiliary_files: BTreeMap::new(),
        cpu_limit: lang.cpu_limit,
        memory_limit_mb: lang.memory_limit_mb,
        timeout_ms: lang.timeout_ms,
    }
}

/// Add a new language profile
pub fn add_language(config_path: &Path, profile: LanguageProfile) -> Result<()> {
    println!("🚀 Adding language: {}", profile.name);

    if profile.timeout_ms == 0 {
        bail!("Timeout must be greater than zero");
    }

    let mut languages_json = load_languages_config(config_path)?;

    if languages_json.languages.iter().any(|l| l.name == profile.name) {
        bail!("Language '{}' already exists in config", profile.name);
    }

    let name = profile.name.clone();
    languages_json.languages.push(profile);

    // Same checks the services run at startup
    LanguageRegistry::from_profiles(languages_json.languages.clone())?;

    println!("📝 Updating {}...", config_path.display());
    save_languages_config(config_path, &languages_json)?;

    println!("✅ Language '{}' added successfully!", name);
    println!("\n📋 Next steps:");
    println!("  1. Make sure the sandbox image provides the formatter");
    println!("  2. Restart tracer-api to pick up the profile");

    Ok(())
}

/// Remove a language profile
pub fn remove_language(config_path: &Path, name: &str, yes: bool) -> Result<()> {
    println!("🗑️  Removing language: {}", name);

    let mut languages_json = load_languages_config(config_path)?;

    let lang_index = languages_json
        .languages
        .iter()
        .position(|l| l.name == name)
        .ok_or_else(|| anyhow::anyhow!("Language '{}' not found in config", name))?;

    if languages_json.languages.len() == 1 {
        bail!("Cannot remove '{}': it is the only configured language", name);
    }

    // Confirm deletion
    if !yes {
        print!("⚠️  This will remove '{}' from {}\n", name, config_path.display());
        print!("\nContinue? (y/N): ");
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;

        if !input.trim().eq_ignore_ascii_case("y") {
            println!("❌ Aborted");
            return Ok(());
        }
    }

    languages_json.languages.remove(lang_index);
    println!("📝 Removing from {}...", config_path.display());
    save_languages_config(config_path, &languages_json)?;

    println!("✅ Language '{}' removed successfully!", name);

    Ok(())
}

/// List all configured languages
pub fn list_languages(config_path: &Path) -> Result<()> {
    let languages_json = load_languages_config(config_path)?;

    if languages_json.languages.is_empty() {
        println!("No languages configured.");
        println!("\n💡 Add a language with: tracer-cli add-lang --name <name> --image <image> --filename <file> --formatter <cmd>...");
        return Ok(());
    }

    println!("📋 Configured Languages:\n");
    println!("{:<10} {:<24} {:<16} {:<10} {:<8} {:<10}",
             "Name", "Image", "File", "Compiler", "Trace", "CPU/Mem");
    println!("{}", "─".repeat(90));

    for lang in &languages_json.languages {
        println!("{:<10} {:<24} {:<16} {:<10} {:<8} {:.1}/{} MB",
                 lang.name,
                 lang.image,
                 lang.filename,
                 lang.toolchain.as_ref().map(|t| t.compiler.as_str()).unwrap_or("-"),
                 if lang.trace.is_some() { "yes" } else { "no" },
                 lang.cpu_limit,
                 lang.memory_limit_mb);
    }

    println!("\n✅ Total: {} language(s)", languages_json.languages.len());

    Ok(())
}

/// Build the task a request for `file` would produce
pub fn build_task(config_path: &Path, language: &str, file: &Path, mode: OutputMode) -> Result<TaskSpec> {
    let registry = if config_path.exists() {
        LanguageRegistry::load(config_path)?
    } else {
        LanguageRegistry::builtin()
    };

    let code = fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;

    let request = ExecutionRequest {
        code,
        language: language.to_string(),
    };

    Ok(builder::build(&registry, &request, mode)?)
}

/// Print the task as JSON
pub fn render_task(config_path: &Path, language: &str, file: &Path, mode: OutputMode) -> Result<()> {
    let task = build_task(config_path, language, file, mode)?;
    println!("{}", serde_json::to_string_pretty(&task)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn clang_language() -> NewLanguage {
        NewLanguage {
            name: "clang".to_string(),
            image: "silkeh/clang:17".to_string(),
            filename: "main.c".to_string(),
            compiler: Some("clang".to_string()),
            formatter: vec!["%BINARY%".to_string()],
            build_dir: "/tmp/user_code".to_string(),
            memory_limit_mb: 512,
            cpu_limit: 1.0,
            timeout_ms: 10000,
        }
    }

    #[test]
    fn test_new_profile_names_binary_after_source() {
        let profile = new_profile(clang_language());
        assert_eq!(profile.toolchain.unwrap().binary, "main");
        assert!(profile.trace.is_none());
    }

    #[test]
    fn test_add_and_remove_language() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config").join("languages.json");

        let seed = LanguagesFile { languages: vec![LanguageRegistry::builtin().resolve("c").unwrap().clone()] };
        save_languages_config(&path, &seed).unwrap();

        add_language(&path, new_profile(clang_language())).unwrap();
        let registry = LanguageRegistry::load(&path).unwrap();
        assert_eq!(registry.names(), vec!["c", "clang"]);

        remove_language(&path, "clang", true).unwrap();
        let registry = LanguageRegistry::load(&path).unwrap();
        assert_eq!(registry.names(), vec!["c"]);
    }

    #[test]
    fn test_add_duplicate_language_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("languages.json");

        add_language(&path, new_profile(clang_language())).unwrap();
        let err = add_language(&path, new_profile(clang_language())).unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    #[test]
    fn test_add_invalid_profile_leaves_file_untouched() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("languages.json");

        let mut lang = clang_language();
        lang.filename = "src/main.c".to_string();
        assert!(add_language(&path, new_profile(lang)).is_err());
        assert!(!path.exists());
    }

    #[test]
    fn test_remove_last_language_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("languages.json");

        add_language(&path, new_profile(clang_language())).unwrap();
        assert!(remove_language(&path, "clang", true).is_err());
        assert!(remove_language(&path, "go", true).is_err());
    }

    #[test]
    fn test_build_task_falls_back_to_builtin_profiles() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("hello.c");
        fs::write(&source, "int main() { return 0; }\n").unwrap();

        let missing = dir.path().join("missing.json");
        let task = build_task(&missing, "c", &source, OutputMode::Formatted).unwrap();
        assert_eq!(task.files["usercode.c"], "int main() { return 0; }\n");
        assert!(task.run.contains("gcc"));

        assert!(build_task(&missing, "cobol", &source, OutputMode::Formatted).is_err());
    }
}
