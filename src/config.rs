//! Configuration management for agent-chain.
//!
//! Configuration can be set via environment variables:
//! - `GEMINI_API_KEY` - Required. API key for the completion endpoint.
//! - `GEMINI_MODEL` - Optional. Model identifier. Defaults to `gemini-2.5-flash`.
//! - `GEMINI_BASE_URL` - Optional. Defaults to `https://generativelanguage.googleapis.com/v1beta`.
//! - `TAVILY_API_KEY` - Optional. Web search key. Without it, search runs in degraded mode.
//! - `TAVILY_URL` - Optional. Defaults to `https://api.tavily.com/search`.
//! - `SEARCH_ENABLED` - Optional. Whether `internet_search` is advertised. Defaults to `true`.
//! - `MAX_TOOL_TURNS` - Optional. Completion calls allowed per agent turn. Defaults to `5`.
//! - `REQUEST_TIMEOUT_SECS` - Optional. Per-request timeout. Defaults to `60`.
//! - `MAX_FINISHED_RUNS` - Optional. Finished runs kept in memory. Defaults to `20`.
//! - `DATA_DIR` - Optional. Where `agents.json` lives. Defaults to `./.agent-chain`.
//! - `HOST` - Optional. Server host. Defaults to `127.0.0.1`.
//! - `PORT` - Optional. Server port. Defaults to `3000`.

use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use url::Url;

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_TAVILY_URL: &str = "https://api.tavily.com/search";
pub const DEFAULT_MAX_TOOL_TURNS: usize = 5;
pub const DEFAULT_MAX_FINISHED_RUNS: usize = 20;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Sampling parameters sent with every completion request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub temperature: f32,
    pub top_k: u32,
    pub top_p: f32,
    pub max_output_tokens: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_k: 40,
            top_p: 0.95,
            max_output_tokens: 4096,
        }
    }
}

/// Web search configuration.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Tavily API key. `None` means every search reports itself unavailable.
    pub api_key: Option<String>,

    /// Tavily search endpoint
    pub url: String,

    /// Whether the `internet_search` tool is advertised to the model at all
    pub enabled: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            url: DEFAULT_TAVILY_URL.to_string(),
            enabled: true,
        }
    }
}

impl SearchConfig {
    /// Check if a search credential is present.
    pub fn has_credential(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.trim().is_empty())
    }
}

/// Service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Completion endpoint API key
    pub api_key: String,

    /// Model identifier used for every agent
    pub model: String,

    /// Base URL of the completion API (without the `/models/...` suffix)
    pub base_url: String,

    /// Sampling parameters
    pub generation: GenerationConfig,

    /// Web search configuration
    pub search: SearchConfig,

    /// Maximum completion calls per agent turn
    pub max_tool_turns: usize,

    /// Per-request timeout for both remote APIs
    pub request_timeout: Duration,

    /// Finished runs kept for inspection; older ones are evicted when a new run starts
    pub max_finished_runs: usize,

    /// Directory holding persisted agent definitions
    pub data_dir: PathBuf,

    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingEnvVar` if `GEMINI_API_KEY` is not set.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar("GEMINI_API_KEY".to_string()))?;

        let model = std::env::var("GEMINI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());

        let base_url = parse_url(
            "GEMINI_BASE_URL",
            std::env::var("GEMINI_BASE_URL").unwrap_or_else(|_| DEFAULT_GEMINI_BASE_URL.to_string()),
        )?;

        let search = SearchConfig {
            api_key: std::env::var("TAVILY_API_KEY")
                .ok()
                .filter(|k| !k.trim().is_empty()),
            url: parse_url(
                "TAVILY_URL",
                std::env::var("TAVILY_URL").unwrap_or_else(|_| DEFAULT_TAVILY_URL.to_string()),
            )?,
            enabled: std::env::var("SEARCH_ENABLED")
                .ok()
                .map(|v| {
                    parse_bool(&v)
                        .map_err(|e| ConfigError::InvalidValue("SEARCH_ENABLED".to_string(), e))
                })
                .transpose()?
                .unwrap_or(true),
        };

        let max_tool_turns: usize = std::env::var("MAX_TOOL_TURNS")
            .unwrap_or_else(|_| DEFAULT_MAX_TOOL_TURNS.to_string())
            .parse()
            .map_err(|e| ConfigError::InvalidValue("MAX_TOOL_TURNS".to_string(), format!("{}", e)))?;
        if max_tool_turns == 0 {
            return Err(ConfigError::InvalidValue(
                "MAX_TOOL_TURNS".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        let timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "60".to_string())
            .parse()
            .map_err(|e| {
                ConfigError::InvalidValue("REQUEST_TIMEOUT_SECS".to_string(), format!("{}", e))
            })?;

        let max_finished_runs = std::env::var("MAX_FINISHED_RUNS")
            .unwrap_or_else(|_| DEFAULT_MAX_FINISHED_RUNS.to_string())
            .parse()
            .map_err(|e| {
                ConfigError::InvalidValue("MAX_FINISHED_RUNS".to_string(), format!("{}", e))
            })?;

        let data_dir = std::env::var("DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(".agent-chain"));

        let host = std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());

        let port = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .map_err(|e| ConfigError::InvalidValue("PORT".to_string(), format!("{}", e)))?;

        Ok(Self {
            api_key,
            model,
            base_url,
            generation: GenerationConfig::default(),
            search,
            max_tool_turns,
            request_timeout: Duration::from_secs(timeout_secs),
            max_finished_runs,
            data_dir,
            host,
            port,
        })
    }

    /// Create a config with custom values (useful for testing).
    pub fn new(api_key: String, model: String, data_dir: PathBuf) -> Self {
        Self {
            api_key,
            model,
            base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            generation: GenerationConfig::default(),
            search: SearchConfig::default(),
            max_tool_turns: DEFAULT_MAX_TOOL_TURNS,
            request_timeout: Duration::from_secs(60),
            max_finished_runs: DEFAULT_MAX_FINISHED_RUNS,
            data_dir,
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }

    /// Path of the persisted agent registry.
    pub fn agents_file(&self) -> PathBuf {
        self.data_dir.join("agents.json")
    }
}

fn parse_url(var: &str, value: String) -> Result<String, ConfigError> {
    Url::parse(&value).map_err(|e| ConfigError::InvalidValue(var.to_string(), e.to_string()))?;
    Ok(value.trim_end_matches('/').to_string())
}

fn parse_bool(value: &str) -> Result<bool, String> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "t" | "yes" | "y" | "on" => Ok(true),
        "0" | "false" | "f" | "no" | "n" | "off" => Ok(false),
        other => Err(format!("expected boolean-like value, got: {}", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_bool_accepts_common_spellings() {
        assert_eq!(parse_bool(" Yes "), Ok(true));
        assert_eq!(parse_bool("off"), Ok(false));
        assert!(parse_bool("maybe").is_err());
    }

    #[test]
    fn parse_url_rejects_garbage_and_trims_trailing_slash() {
        assert!(parse_url("X", "not a url".to_string()).is_err());
        assert_eq!(
            parse_url("X", "https://api.tavily.com/search/".to_string()).unwrap(),
            "https://api.tavily.com/search"
        );
    }

    #[test]
    fn test_config_defaults() {
        let config = Config::new("k".into(), DEFAULT_MODEL.into(), PathBuf::from("/tmp/x"));
        assert_eq!(config.max_tool_turns, 5);
        assert!(config.search.enabled);
        assert!(!config.search.has_credential());
        assert_eq!(config.agents_file(), PathBuf::from("/tmp/x/agents.json"));
        assert_eq!(config.generation.max_output_tokens, 4096);
        assert_eq!(config.max_finished_runs, DEFAULT_MAX_FINISHED_RUNS);
    }

    #[test]
    fn default_model_is_a_current_gemini_model() {
        assert_eq!(DEFAULT_MODEL, "gemini-2.5-flash");
        assert!(!DEFAULT_MODEL.starts_with("gemini-1."));
    }
}
