use serde::Deserialize;
use std::env;
use std::sync::OnceLock;
use thiserror::Error;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the policy-pipeline server.
#[derive(Debug, Deserialize)]
pub struct Config {
    /// Optional base URL of the generative extraction service. When unset the
    /// deterministic local extractor is used instead.
    pub extractor_url: Option<String>,
    /// Maximum number of vocabulary terms retained by the embedding store.
    pub vocab_max_features: usize,
    /// Fixed character length of raw-text chunk segments.
    pub raw_text_chunk_size: usize,
    /// Default number of chunks returned by similarity search.
    pub search_default_top_k: usize,
    /// Hard ceiling applied to caller-provided `top_k` values.
    pub search_max_top_k: usize,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
}

const DEFAULT_VOCAB_MAX_FEATURES: usize = 1000;
const DEFAULT_RAW_TEXT_CHUNK_SIZE: usize = 1000;
const DEFAULT_SEARCH_TOP_K: usize = 5;
const DEFAULT_SEARCH_MAX_TOP_K: usize = 50;

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            extractor_url: load_env_optional("EXTRACTOR_URL"),
            vocab_max_features: parse_env_or("VOCAB_MAX_FEATURES", DEFAULT_VOCAB_MAX_FEATURES)?,
            raw_text_chunk_size: parse_env_or(
                "RAW_TEXT_CHUNK_SIZE",
                DEFAULT_RAW_TEXT_CHUNK_SIZE,
            )?,
            search_default_top_k: parse_env_or("SEARCH_DEFAULT_TOP_K", DEFAULT_SEARCH_TOP_K)?,
            search_max_top_k: parse_env_or("SEARCH_MAX_TOP_K", DEFAULT_SEARCH_MAX_TOP_K)?,
            server_port: load_env_optional("SERVER_PORT")
                .map(|value| {
                    value
                        .parse()
                        .map_err(|_| ConfigError::InvalidValue("SERVER_PORT".into()))
                })
                .transpose()?,
        })
    }
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_env_or(key: &str, default: usize) -> Result<usize, ConfigError> {
    match load_env_optional(key) {
        Some(value) => {
            let parsed: usize = value
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))?;
            if parsed == 0 {
                return Err(ConfigError::InvalidValue(key.to_string()));
            }
            Ok(parsed)
        }
        None => Ok(default),
    }
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, falling back to defaults when the
/// process did not call [`init_config`] (tests mostly).
pub fn get_config() -> &'static Config {
    CONFIG.get_or_init(|| Config {
        extractor_url: None,
        vocab_max_features: DEFAULT_VOCAB_MAX_FEATURES,
        raw_text_chunk_size: DEFAULT_RAW_TEXT_CHUNK_SIZE,
        search_default_top_k: DEFAULT_SEARCH_TOP_K,
        search_max_top_k: DEFAULT_SEARCH_MAX_TOP_K,
        server_port: None,
    })
}

/// Load configuration from the environment and install it in the global cache.
pub fn init_config() {
    dotenvy::dotenv().ok();
    let config = Config::from_env().expect("Failed to load config from environment");
    tracing::debug!(
        extractor_url = ?config.extractor_url,
        vocab_max_features = config.vocab_max_features,
        raw_text_chunk_size = config.raw_text_chunk_size,
        server_port = ?config.server_port,
        "Loaded configuration"
    );
    let _ = CONFIG.set(config);
}
