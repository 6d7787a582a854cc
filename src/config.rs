use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::model::GenerationParams;

pub const DEFAULT_MODEL: &str = "gpt-4-1106-preview";
pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_ARTIFACTS_DIR: &str = "run_artifacts";
pub const DEFAULT_START_URL: &str = "https://www.google.com/";
pub const MAX_RETRIES: usize = 3;
pub const CRAWL_BACKOFF: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} not set in environment")]
    MissingVar(&'static str),

    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Runtime settings for one agent session.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub model: String,
    pub api_base: String,
    pub api_key: String,
    pub generation: GenerationParams,
    pub max_retries: usize,
    pub artifacts_dir: PathBuf,
    pub crawl_backoff: Duration,
    pub headless: bool,
    pub force_run: bool,
}

impl AgentConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            api_key: api_key.into(),
            generation: GenerationParams::default(),
            max_retries: MAX_RETRIES,
            artifacts_dir: PathBuf::from(DEFAULT_ARTIFACTS_DIR),
            crawl_backoff: CRAWL_BACKOFF,
            headless: false,
            force_run: false,
        }
    }

    /// Build from process environment. Call `dotenvy::dotenv()` first to
    /// pick up a `.env` file.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup("OPENAI_API_KEY")
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::MissingVar("OPENAI_API_KEY"))?;

        let mut config = Self::new(api_key);
        if let Some(model) = lookup("UXPILOT_MODEL") {
            config.model = model;
        }
        if let Some(base) = lookup("OPENAI_BASE_URL") {
            config.api_base = base.trim_end_matches('/').to_string();
        }
        if let Some(dir) = lookup("UXPILOT_ARTIFACTS_DIR") {
            config.artifacts_dir = PathBuf::from(dir);
        }
        if let Some(retries) = lookup("UXPILOT_MAX_RETRIES") {
            config.max_retries = parse_retries(&retries)?;
        }
        Ok(config)
    }
}

pub fn parse_retries(raw: &str) -> Result<usize, ConfigError> {
    match raw.trim().parse::<usize>() {
        Ok(0) => Err(ConfigError::Invalid {
            name: "max retries",
            reason: "must be at least 1".to_string(),
        }),
        Ok(n) => Ok(n),
        Err(e) => Err(ConfigError::Invalid {
            name: "max retries",
            reason: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_match_reference_behavior() {
        let config = AgentConfig::from_lookup(lookup(&[("OPENAI_API_KEY", "sk-test")])).unwrap();
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.generation.temperature, 0.0);
        assert_eq!(config.generation.max_tokens, 500);
        assert_eq!(config.artifacts_dir, PathBuf::from("run_artifacts"));
        assert_eq!(config.crawl_backoff, Duration::from_secs(2));
    }

    #[test]
    fn test_environment_overrides() {
        let config = AgentConfig::from_lookup(lookup(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("OPENAI_BASE_URL", "http://localhost:8080/v1/"),
            ("UXPILOT_MODEL", "local-model"),
            ("UXPILOT_MAX_RETRIES", "5"),
        ]))
        .unwrap();
        assert_eq!(config.api_base, "http://localhost:8080/v1");
        assert_eq!(config.model, "local-model");
        assert_eq!(config.max_retries, 5);
    }

    #[test]
    fn test_missing_key_and_bad_retries() {
        assert!(matches!(
            AgentConfig::from_lookup(lookup(&[])),
            Err(ConfigError::MissingVar("OPENAI_API_KEY"))
        ));
        assert!(parse_retries("0").is_err());
        assert!(parse_retries("three").is_err());
    }
}
