use serde::Deserialize;
use std::env;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;

/// Default number of characters per chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;
/// Default number of characters carried over between adjacent chunks.
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;
/// Default embedding model label (dimensions match `intfloat/e5-base`).
pub const DEFAULT_EMBEDDING_MODEL: &str = "intfloat/e5-base";
/// Default vector width produced by the embedding model.
pub const DEFAULT_EMBEDDING_DIMENSION: usize = 768;
/// Default token window of the embedding model.
pub const DEFAULT_EMBEDDING_MAX_TOKENS: usize = 512;
/// Default cap on request bodies (20 MiB) so PDFs fit.
pub const DEFAULT_MAX_BODY_BYTES: usize = 20 * 1024 * 1024;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the docvec server and CLI.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Maximum characters per chunk.
    pub chunk_size: usize,
    /// Characters of the previous chunk repeated at the start of the next one.
    pub chunk_overlap: usize,
    /// Embedding backend used for every chunk.
    pub embedding_provider: EmbeddingProvider,
    /// Model identifier passed to the provider.
    pub embedding_model: String,
    /// Dimensionality of the produced vectors.
    pub embedding_dimension: usize,
    /// Token window; longer chunks are truncated by the model.
    pub embedding_max_tokens: usize,
    /// Upper bound on chunk embeddings running at once across all requests.
    pub embedding_workers: usize,
    /// Optional deadline for a single chunk embedding.
    pub embedding_timeout: Option<Duration>,
    /// Base URL of the Ollama runtime when `embedding_provider` is `ollama`.
    pub ollama_url: Option<String>,
    /// Largest accepted request body.
    pub max_body_bytes: usize,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
}

/// Supported embedding backends.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// In-process deterministic model (tokenize, hash, mean-pool).
    Hashing,
    /// Local Ollama runtime.
    Ollama,
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let optional = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let chunk_size = parse_optional(optional("CHUNK_SIZE"), "CHUNK_SIZE")?
            .unwrap_or(DEFAULT_CHUNK_SIZE);
        let chunk_overlap = parse_optional(optional("CHUNK_OVERLAP"), "CHUNK_OVERLAP")?
            .unwrap_or(DEFAULT_CHUNK_OVERLAP);
        if chunk_size == 0 {
            return Err(ConfigError::InvalidValue("CHUNK_SIZE".into()));
        }
        if chunk_overlap >= chunk_size {
            return Err(ConfigError::InvalidValue("CHUNK_OVERLAP".into()));
        }

        let embedding_provider = match optional("EMBEDDING_PROVIDER") {
            Some(value) => value
                .parse()
                .map_err(|()| ConfigError::InvalidValue("EMBEDDING_PROVIDER".into()))?,
            None => EmbeddingProvider::Hashing,
        };
        let ollama_url = optional("OLLAMA_URL");
        if embedding_provider == EmbeddingProvider::Ollama && ollama_url.is_none() {
            return Err(ConfigError::MissingVariable("OLLAMA_URL".into()));
        }

        let embedding_dimension =
            parse_optional(optional("EMBEDDING_DIMENSION"), "EMBEDDING_DIMENSION")?
                .unwrap_or(DEFAULT_EMBEDDING_DIMENSION);
        if embedding_dimension == 0 {
            return Err(ConfigError::InvalidValue("EMBEDDING_DIMENSION".into()));
        }
        let embedding_max_tokens =
            parse_optional(optional("EMBEDDING_MAX_TOKENS"), "EMBEDDING_MAX_TOKENS")?
                .unwrap_or(DEFAULT_EMBEDDING_MAX_TOKENS)
                .max(1);
        let embedding_workers = parse_optional(optional("EMBEDDING_WORKERS"), "EMBEDDING_WORKERS")?
            .unwrap_or_else(default_workers)
            .max(1);
        let embedding_timeout =
            parse_optional::<u64>(optional("EMBEDDING_TIMEOUT_MS"), "EMBEDDING_TIMEOUT_MS")?
                .filter(|millis| *millis > 0)
                .map(Duration::from_millis);

        Ok(Self {
            chunk_size,
            chunk_overlap,
            embedding_provider,
            embedding_model: optional("EMBEDDING_MODEL")
                .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string()),
            embedding_dimension,
            embedding_max_tokens,
            embedding_workers,
            embedding_timeout,
            ollama_url,
            max_body_bytes: parse_optional(optional("MAX_BODY_BYTES"), "MAX_BODY_BYTES")?
                .unwrap_or(DEFAULT_MAX_BODY_BYTES),
            server_port: parse_optional(optional("SERVER_PORT"), "SERVER_PORT")?,
        })
    }
}

fn parse_optional<T: std::str::FromStr>(
    value: Option<String>,
    key: &str,
) -> Result<Option<T>, ConfigError> {
    value
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|count| count.get())
        .unwrap_or(4)
}

impl std::str::FromStr for EmbeddingProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "hashing" => Ok(Self::Hashing),
            "ollama" => Ok(Self::Ollama),
            _ => Err(()),
        }
    }
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, panicking if initialization has not occurred.
pub fn get_config() -> &'static Config {
    CONFIG.get().expect("Config not initialized")
}

/// Load configuration from the environment and install it in the global cache.
pub fn init_config() {
    dotenvy::dotenv().ok();
    let config = Config::from_env().expect("Failed to load config from environment");
    tracing::debug!(
        chunk_size = config.chunk_size,
        chunk_overlap = config.chunk_overlap,
        embedding_provider = ?config.embedding_provider,
        embedding_model = %config.embedding_model,
        embedding_workers = config.embedding_workers,
        server_port = ?config.server_port,
        "Loaded configuration"
    );
    CONFIG.set(config).expect("Failed to set config");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_environment_is_empty() {
        let config = Config::from_lookup(lookup(&[])).expect("config");
        assert_eq!(config.chunk_size, 1000);
        assert_eq!(config.chunk_overlap, 200);
        assert_eq!(config.embedding_provider, EmbeddingProvider::Hashing);
        assert_eq!(config.embedding_dimension, 768);
        assert_eq!(config.embedding_max_tokens, 512);
        assert!(config.embedding_workers >= 1);
        assert!(config.embedding_timeout.is_none());
        assert!(config.server_port.is_none());
    }

    #[test]
    fn overrides_are_parsed() {
        let config = Config::from_lookup(lookup(&[
            ("CHUNK_SIZE", "64"),
            ("CHUNK_OVERLAP", "8"),
            ("EMBEDDING_WORKERS", "3"),
            ("EMBEDDING_TIMEOUT_MS", "1500"),
            ("SERVER_PORT", "8080"),
            ("EMBEDDING_PROVIDER", "OLLAMA"),
            ("OLLAMA_URL", "http://127.0.0.1:11434"),
        ]))
        .expect("config");
        assert_eq!(config.chunk_size, 64);
        assert_eq!(config.chunk_overlap, 8);
        assert_eq!(config.embedding_workers, 3);
        assert_eq!(config.embedding_timeout, Some(Duration::from_millis(1500)));
        assert_eq!(config.server_port, Some(8080));
        assert_eq!(config.embedding_provider, EmbeddingProvider::Ollama);
    }

    #[test]
    fn overlap_must_be_smaller_than_chunk_size() {
        let error = Config::from_lookup(lookup(&[("CHUNK_SIZE", "100"), ("CHUNK_OVERLAP", "100")]))
            .unwrap_err();
        assert!(matches!(error, ConfigError::InvalidValue(key) if key == "CHUNK_OVERLAP"));
    }

    #[test]
    fn ollama_requires_base_url() {
        let error = Config::from_lookup(lookup(&[("EMBEDDING_PROVIDER", "ollama")])).unwrap_err();
        assert!(matches!(error, ConfigError::MissingVariable(key) if key == "OLLAMA_URL"));
    }

    #[test]
    fn garbage_numbers_are_rejected() {
        let error = Config::from_lookup(lookup(&[("EMBEDDING_WORKERS", "many")])).unwrap_err();
        assert!(matches!(error, ConfigError::InvalidValue(key) if key == "EMBEDDING_WORKERS"));
    }
}
