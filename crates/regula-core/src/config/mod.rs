mod env;
mod types;


pub use types::*;

use std::path::{Path, PathBuf};
use std::time::Duration;

use regula_knowledge::{EmbedderConfig, SplitterConfig};
use regula_llm::{CompletionParams, RetryPolicy};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("{role} uses the openai provider but no API key is set (REGULA_OPENAI_API_KEY or OPENAI_API_KEY)")]
    MissingApiKey { role: &'static str },
}

impl Config {
    /// Load configuration from a TOML file with env var overrides.
    ///
    /// Falls back to defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
            toml::from_str::<Self>(&content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?
        } else {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            Self::default()
        };

        config.apply_env_overrides();
        config.resolve_secrets();
        Ok(config)
    }

    /// Check every option before any component is constructed.
    ///
    /// # Errors
    ///
    /// Returns the first invalid option found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::Invalid("chunk_size must be greater than 0".into()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(ConfigError::Invalid(format!(
                "chunk_overlap ({}) must be less than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.retrieval.k == 0 {
            return Err(ConfigError::Invalid("retrieval.k must be at least 1".into()));
        }
        if self.retrieval.max_turns == 0 {
            return Err(ConfigError::Invalid(
                "retrieval.max_turns must be at least 1".into(),
            ));
        }
        if self.embedding.batch_size == 0 {
            return Err(ConfigError::Invalid(
                "embedding.batch_size must be at least 1".into(),
            ));
        }
        if self.embedding.max_in_flight == 0 {
            return Err(ConfigError::Invalid(
                "embedding.max_in_flight must be at least 1".into(),
            ));
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(ConfigError::Invalid(format!(
                "llm.temperature must be within [0, 2], got {}",
                self.llm.temperature
            )));
        }
        if self.llm.max_tokens == 0 {
            return Err(ConfigError::Invalid("llm.max_tokens must be at least 1".into()));
        }
        if self.llm.max_input_chars < 256 {
            return Err(ConfigError::Invalid(format!(
                "llm.max_input_chars must be at least 256, got {}",
                self.llm.max_input_chars
            )));
        }
        if self.vectorstore.collection_name.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "vectorstore.collection_name must not be empty".into(),
            ));
        }
        if self.secrets.openai_api_key.is_none() {
            if self.embedding.provider == ProviderKind::OpenAi {
                return Err(ConfigError::MissingApiKey { role: "embedding" });
            }
            if self.llm.provider == ProviderKind::OpenAi {
                return Err(ConfigError::MissingApiKey { role: "llm" });
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn splitter_config(&self) -> SplitterConfig {
        SplitterConfig {
            chunk_size: self.chunk_size,
            chunk_overlap: self.chunk_overlap,
            separators: self.separators.clone(),
        }
    }

    #[must_use]
    pub fn embedder_config(&self) -> EmbedderConfig {
        EmbedderConfig {
            batch_size: self.embedding.batch_size,
            max_in_flight: self.embedding.max_in_flight,
        }
    }

    #[must_use]
    pub fn completion_params(&self) -> CompletionParams {
        CompletionParams {
            temperature: self.llm.temperature,
            max_tokens: self.llm.max_tokens,
        }
    }

    #[must_use]
    pub fn llm_retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.timeouts.max_retries,
            Duration::from_secs(self.timeouts.llm_seconds),
        )
    }

    #[must_use]
    pub fn embedding_retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.timeouts.max_retries,
            Duration::from_secs(self.timeouts.embedding_seconds),
        )
    }
}

/// Config path from `--config`, then `REGULA_CONFIG`, then `config/default.toml`.
#[must_use]
pub fn resolve_config_path(cli: Option<&Path>) -> PathBuf {
    if let Some(path) = cli {
        return path.to_path_buf();
    }
    if let Ok(path) = std::env::var("REGULA_CONFIG") {
        return PathBuf::from(path);
    }
    PathBuf::from("config/default.toml")
}
