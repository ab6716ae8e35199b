// Process configuration, read once from the environment at startup

use crate::types::OutputMode;
use anyhow::{anyhow, Result};
use std::path::PathBuf;

pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
pub const DEFAULT_LANGUAGES_CONFIG: &str = "config/languages.json";

#[derive(Debug, Clone)]
pub struct Config {
    pub redis_url: String,
    pub bind_addr: String,
    pub languages_config: PathBuf,
    pub output_mode: OutputMode,
    pub json_logs: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let output_mode = match lookup("OUTPUT_MODE") {
            Some(mode) => mode.parse().map_err(|e: String| anyhow!(e))?,
            None => OutputMode::default(),
        };

        let json_logs = lookup("LOG_FORMAT")
            .map(|f| f.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        Ok(Self {
            redis_url: lookup("REDIS_URL").unwrap_or_else(|| DEFAULT_REDIS_URL.to_string()),
            bind_addr: lookup("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            languages_config: lookup("LANGUAGES_CONFIG")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_LANGUAGES_CONFIG)),
            output_mode,
            json_logs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.redis_url, DEFAULT_REDIS_URL);
        assert_eq!(config.bind_addr, DEFAULT_BIND_ADDR);
        assert_eq!(config.languages_config, PathBuf::from("config/languages.json"));
        assert_eq!(config.output_mode, OutputMode::Formatted);
        assert!(!config.json_logs);
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("REDIS_URL", "redis://cache:6379"),
            ("OUTPUT_MODE", "trace"),
            ("LOG_FORMAT", "JSON"),
        ])
        .unwrap();
        assert_eq!(config.redis_url, "redis://cache:6379");
        assert_eq!(config.output_mode, OutputMode::Trace);
        assert!(config.json_logs);
    }

    #[test]
    fn test_invalid_mode_is_an_error() {
        let err = config_from(&[("OUTPUT_MODE", "debug")]).unwrap_err();
        assert!(err.to_string().contains("invalid output mode"));
    }
}
