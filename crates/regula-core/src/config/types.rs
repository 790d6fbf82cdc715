use std::fmt;
use std::path::PathBuf;

use regula_knowledge::SplitterKind;
use regula_knowledge::splitter::DEFAULT_SEPARATORS;
use serde::{Deserialize, Serialize};

use crate::chain::ChainType;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    #[serde(default)]
    pub splitter: SplitterKind,
    #[serde(default = "default_separators")]
    pub separators: Vec<String>,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub vectorstore: VectorStoreConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(skip)]
    pub secrets: ResolvedSecrets,
}

fn default_chunk_size() -> usize {
    1000
}

fn default_chunk_overlap() -> usize {
    200
}

fn default_separators() -> Vec<String> {
    DEFAULT_SEPARATORS.iter().map(|s| (*s).to_owned()).collect()
}

/// Embedding and completion backend selector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    OpenAi,
    Ollama,
}

impl ProviderKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Ollama => "ollama",
        }
    }

    #[must_use]
    pub fn default_base_url(self) -> &'static str {
        match self {
            Self::OpenAi => "https://api.openai.com/v1",
            Self::Ollama => "http://localhost:11434",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub provider: ProviderKind,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    /// Overrides the provider's default endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
    #[serde(default = "default_cache_path")]
    pub cache_path: String,
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".into()
}

fn default_batch_size() -> usize {
    64
}

fn default_max_in_flight() -> usize {
    4
}

fn default_cache_path() -> String {
    "./data/embedding_cache.db".into()
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            model: default_embedding_model(),
            base_url: None,
            batch_size: default_batch_size(),
            max_in_flight: default_max_in_flight(),
            cache_path: default_cache_path(),
        }
    }
}

/// Vector index backend selector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorStoreKind {
    #[default]
    Flat,
    Qdrant,
}

impl VectorStoreKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Flat => "flat",
            Self::Qdrant => "qdrant",
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VectorStoreConfig {
    #[serde(default)]
    pub provider: VectorStoreKind,
    #[serde(default = "default_vectorstore_path")]
    pub path: PathBuf,
    #[serde(default = "default_collection_name")]
    pub collection_name: String,
    #[serde(default = "default_qdrant_url")]
    pub qdrant_url: String,
}

fn default_vectorstore_path() -> PathBuf {
    PathBuf::from("./data/vectorstore")
}

fn default_collection_name() -> String {
    "regulations".into()
}

fn default_qdrant_url() -> String {
    "http://localhost:6334".into()
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            provider: VectorStoreKind::default(),
            path: default_vectorstore_path(),
            collection_name: default_collection_name(),
            qdrant_url: default_qdrant_url(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_k")]
    pub k: usize,
    /// Hits scoring below this are dropped. Unset keeps every hit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score_threshold: Option<f32>,
    #[serde(default)]
    pub chain_type: ChainType,
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,
}

fn default_k() -> usize {
    4
}

fn default_max_turns() -> usize {
    10
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            k: default_k(),
            score_threshold: None,
            chain_type: ChainType::default(),
            max_turns: default_max_turns(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub provider: ProviderKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Largest prompt body, in characters, sent in one summarization call.
    #[serde(default = "default_max_input_chars")]
    pub max_input_chars: usize,
}

fn default_llm_model() -> String {
    "gpt-4o-mini".into()
}

fn default_max_tokens() -> u32 {
    500
}

fn default_max_input_chars() -> usize {
    12_000
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            base_url: None,
            model: default_llm_model(),
            temperature: 0.0,
            max_tokens: default_max_tokens(),
            max_input_chars: default_max_input_chars(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_llm_timeout")]
    pub llm_seconds: u64,
    #[serde(default = "default_embedding_timeout")]
    pub embedding_seconds: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_llm_timeout() -> u64 {
    120
}

fn default_embedding_timeout() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            llm_seconds: default_llm_timeout(),
            embedding_seconds: default_embedding_timeout(),
            max_retries: default_max_retries(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PathsConfig {
    #[serde(default = "default_documents_path")]
    pub documents: PathBuf,
    #[serde(default = "default_supported_formats")]
    pub supported_formats: Vec<String>,
}

fn default_documents_path() -> PathBuf {
    PathBuf::from("./data/documents")
}

fn default_supported_formats() -> Vec<String> {
    ["pdf", "txt", "md", "html", "docx"]
        .iter()
        .map(|s| (*s).to_owned())
        .collect()
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            documents: default_documents_path(),
            supported_formats: default_supported_formats(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

/// Wrapper for sensitive strings with redacted Debug/Display.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

/// Credentials resolved from the environment. Never read from or written to
/// the config file.
#[derive(Debug, Clone, Default)]
pub struct ResolvedSecrets {
    pub openai_api_key: Option<Secret>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            splitter: SplitterKind::default(),
            separators: default_separators(),
            embedding: EmbeddingConfig::default(),
            vectorstore: VectorStoreConfig::default(),
            retrieval: RetrievalConfig::default(),
            llm: LlmConfig::default(),
            timeouts: TimeoutConfig::default(),
            paths: PathsConfig::default(),
            logging: LoggingConfig::default(),
            secrets: ResolvedSecrets::default(),
        }
    }
}
