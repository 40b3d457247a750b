use std::net::SocketAddr;
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

/// Defines the supported generation backends.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Provider {
    OpenAI,
    Gemini,
}

impl Provider {
    /// Base URL of the provider's OpenAI-compatible endpoint.
    pub fn api_base(&self) -> &'static str {
        match self {
            Provider::OpenAI => "https://api.openai.com/v1/",
            Provider::Gemini => "https://generativelanguage.googleapis.com/v1beta/openai",
        }
    }
}

/// Where sessions and transcripts are kept.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres { database_url: String },
    Memory,
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub store: StoreBackend,
    pub provider: Provider,
    pub api_key: String,
    pub chat_model: String,
    pub temperature: f32,
    pub generation_timeout: Duration,
    pub log_level: Level,
    pub hf_token: Option<String>,
    pub transcription_model: String,
    pub transcription_fallback_model: Option<String>,
    pub max_audio_bytes: usize,
}

fn parse_var<T>(name: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
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

        let bind_address = parse_var::<SocketAddr>("BIND_ADDRESS", ([0, 0, 0, 0], 3000).into())?;

        let store_str = std::env::var("STORE_BACKEND").unwrap_or_else(|_| "postgres".to_string());
        let store = match store_str.to_lowercase().as_str() {
            "memory" => StoreBackend::Memory,
            "postgres" => StoreBackend::Postgres {
                database_url: std::env::var("DATABASE_URL")
                    .map_err(|_| ConfigError::MissingVar("DATABASE_URL".to_string()))?,
            },
            other => {
                return Err(ConfigError::InvalidValue(
                    "STORE_BACKEND".to_string(),
                    format!("'{}' is not one of 'postgres' or 'memory'", other),
                ));
            }
        };

        let provider_str = std::env::var("LLM_PROVIDER").unwrap_or_else(|_| "openai".to_string());
        let provider = match provider_str.to_lowercase().as_str() {
            "gemini" => Provider::Gemini,
            _ => Provider::OpenAI,
        };

        let api_key = match provider {
            Provider::OpenAI => std::env::var("OPENAI_API_KEY").map_err(|_| {
                ConfigError::MissingVar("OPENAI_API_KEY must be set for 'openai' provider".to_string())
            })?,
            Provider::Gemini => std::env::var("GEMINI_API_KEY").map_err(|_| {
                ConfigError::MissingVar("GEMINI_API_KEY must be set for 'gemini' provider".to_string())
            })?,
        };

        let chat_model = std::env::var("CHAT_MODEL").unwrap_or_else(|_| "gpt-4o".to_string());

        let temperature = parse_var::<f32>("TEMPERATURE", 0.7)?;
        if !(0.0..=2.0).contains(&temperature) {
            return Err(ConfigError::InvalidValue(
                "TEMPERATURE".to_string(),
                format!("{} is outside 0.0..=2.0", temperature),
            ));
        }

        let timeout_secs = parse_var::<u64>("GENERATION_TIMEOUT_SECS", 60)?;
        if timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "GENERATION_TIMEOUT_SECS".to_string(),
                "must be greater than zero".to_string(),
            ));
        }

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let hf_token = std::env::var("HF_TOKEN").ok().filter(|t| !t.trim().is_empty());
        let transcription_model = std::env::var("TRANSCRIPTION_MODEL")
            .unwrap_or_else(|_| "openai/whisper-large-v3".to_string());
        let transcription_fallback_model = match std::env::var("TRANSCRIPTION_FALLBACK_MODEL") {
            Ok(model) if model.trim().is_empty() => None,
            Ok(model) => Some(model),
            Err(_) => Some("openai/whisper-base".to_string()),
        };
        let max_audio_bytes = parse_var::<usize>("MAX_AUDIO_BYTES", 25 * 1024 * 1024)?;

        Ok(Self {
            bind_address,
            store,
            provider,
            api_key,
            chat_model,
            temperature,
            generation_timeout: Duration::from_secs(timeout_secs),
            log_level,
            hf_token,
            transcription_model,
            transcription_fallback_model,
            max_audio_bytes,
        })
    }
}
