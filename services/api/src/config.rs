use crossfire_core::{engine::EngineConfig, scheduler::SchedulerConfig};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Defines the supported backends for text generation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Provider {
    OpenAI,
    Gemini,
    /// Canned replies and heuristic scoring; needs no API key.
    Mock,
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub provider: Provider,
    pub openai_api_key: Option<String>,
    pub gemini_api_key: Option<String>,
    pub chat_model: String,
    pub feedback_model: String,
    pub log_level: Level,
    pub prompts_path: PathBuf,
    pub engine: EngineConfig,
}

/// Reads an optional variable and parses it, falling back to `default`.
fn parse_var<T: FromStr>(name: &str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        Err(_) => Ok(default),
    }
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let provider_str = std::env::var("LLM_PROVIDER").unwrap_or_else(|_| "openai".to_string());
        let provider = match provider_str.to_lowercase().as_str() {
            "gemini" => Provider::Gemini,
            "mock" => Provider::Mock,
            _ => Provider::OpenAI,
        };

        let openai_api_key = std::env::var("OPENAI_API_KEY").ok();
        let gemini_api_key = std::env::var("GEMINI_API_KEY").ok();

        let chat_model = std::env::var("CHAT_MODEL").unwrap_or_else(|_| "gpt-4o".to_string());
        let feedback_model = std::env::var("FEEDBACK_MODEL").unwrap_or_else(|_| chat_model.clone());

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let prompts_path = std::env::var("PROMPTS_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./prompts"));

        let defaults = SchedulerConfig::default();
        let max_rounds = parse_var("MAX_ROUNDS", defaults.max_rounds)?;
        if max_rounds == 0 {
            return Err(ConfigError::InvalidValue(
                "MAX_ROUNDS".to_string(),
                "must be at least 1".to_string(),
            ));
        }
        let chain_probability = parse_var("CHAIN_PROBABILITY", defaults.chain_probability)?;
        if !(0.0..=1.0).contains(&chain_probability) {
            return Err(ConfigError::InvalidValue(
                "CHAIN_PROBABILITY".to_string(),
                format!("{} is not between 0 and 1", chain_probability),
            ));
        }
        let startup_grace_ms = parse_var(
            "STARTUP_GRACE_MS",
            defaults.startup_grace.as_millis() as u64,
        )?;
        let interruption_window_ms = parse_var("INTERRUPTION_WINDOW_MS", 2000u64)?;

        match provider {
            Provider::OpenAI => {
                if openai_api_key.is_none() {
                    return Err(ConfigError::MissingVar(
                        "OPENAI_API_KEY must be set for 'openai' provider".to_string(),
                    ));
                }
            }
            Provider::Gemini => {
                if gemini_api_key.is_none() {
                    return Err(ConfigError::MissingVar(
                        "GEMINI_API_KEY must be set for 'gemini' provider".to_string(),
                    ));
                }
            }
            Provider::Mock => {}
        }

        Ok(Self {
            bind_address,
            provider,
            openai_api_key,
            gemini_api_key,
            chat_model,
            feedback_model,
            log_level,
            prompts_path,
            engine: EngineConfig {
                scheduler: SchedulerConfig {
                    max_rounds,
                    chain_probability,
                    startup_grace: Duration::from_millis(startup_grace_ms),
                    ..defaults
                },
                interruption_window: Duration::from_millis(interruption_window_ms),
                ..EngineConfig::default()
            },
        })
    }

    /// An offline configuration for unit tests elsewhere in the crate.
    #[cfg(test)]
    pub(crate) fn mock() -> Self {
        Self {
            bind_address: SocketAddr::from(([127, 0, 0, 1], 0)),
            provider: Provider::Mock,
            openai_api_key: None,
            gemini_api_key: None,
            chat_model: "gpt-4o".to_string(),
            feedback_model: "gpt-4o".to_string(),
            log_level: Level::INFO,
            prompts_path: PathBuf::from("./prompts"),
            engine: EngineConfig::default(),
        }
    }
}
