use std::path::PathBuf;
use std::str::FromStr;

use super::{Config, ProviderKind, Secret, VectorStoreKind};
use crate::chain::ChainType;
use regula_knowledge::SplitterKind;

/// Parse an env var, warning and keeping the configured value when it is malformed.
fn parsed<T: FromStr>(key: &str) -> Option<T> {
    let v = std::env::var(key).ok()?;
    match v.parse::<T>() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            tracing::warn!("ignoring invalid {key} value: {v}");
            None
        }
    }
}

/// Parse a serde-named enum value such as `openai` or `article_aware`.
fn named<T: serde::de::DeserializeOwned>(key: &str) -> Option<T> {
    let v = std::env::var(key).ok()?;
    if let Ok(kind) = serde_json::from_value(serde_json::Value::String(v.clone())) {
        Some(kind)
    } else {
        tracing::warn!("ignoring invalid {key} value: {v}");
        None
    }
}

impl Config {
    pub(crate) fn apply_env_overrides(&mut self) {
        self.apply_env_overrides_chunking();
        self.apply_env_overrides_providers();
        self.apply_env_overrides_retrieval();
    }

    fn apply_env_overrides_chunking(&mut self) {
        if let Some(v) = parsed::<usize>("REGULA_CHUNK_SIZE") {
            self.chunk_size = v;
        }
        if let Some(v) = parsed::<usize>("REGULA_CHUNK_OVERLAP") {
            self.chunk_overlap = v;
        }
        if let Some(kind) = named::<SplitterKind>("REGULA_SPLITTER") {
            self.splitter = kind;
        }
        if let Ok(v) = std::env::var("REGULA_DOCUMENTS_PATH") {
            self.paths.documents = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("REGULA_SUPPORTED_FORMATS") {
            self.paths.supported_formats = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_owned)
                .collect();
        }
    }

    fn apply_env_overrides_providers(&mut self) {
        if let Some(kind) = named::<ProviderKind>("REGULA_EMBEDDING_PROVIDER") {
            self.embedding.provider = kind;
        }
        if let Ok(v) = std::env::var("REGULA_EMBEDDING_MODEL") {
            self.embedding.model = v;
        }
        if let Ok(v) = std::env::var("REGULA_EMBEDDING_BASE_URL") {
            self.embedding.base_url = Some(v);
        }
        if let Some(v) = parsed::<usize>("REGULA_EMBEDDING_BATCH_SIZE") {
            self.embedding.batch_size = v;
        }
        if let Ok(v) = std::env::var("REGULA_EMBEDDING_CACHE_PATH") {
            self.embedding.cache_path = v;
        }
        if let Some(kind) = named::<ProviderKind>("REGULA_LLM_PROVIDER") {
            self.llm.provider = kind;
        }
        if let Ok(v) = std::env::var("REGULA_LLM_BASE_URL") {
            self.llm.base_url = Some(v);
        }
        if let Ok(v) = std::env::var("REGULA_LLM_MODEL") {
            self.llm.model = v;
        }
        if let Some(v) = parsed::<f32>("REGULA_LLM_TEMPERATURE") {
            self.llm.temperature = v;
        }
        if let Some(v) = parsed::<u32>("REGULA_LLM_MAX_TOKENS") {
            self.llm.max_tokens = v;
        }
        if let Some(v) = parsed::<u64>("REGULA_TIMEOUT_LLM") {
            self.timeouts.llm_seconds = v;
        }
        if let Some(v) = parsed::<u64>("REGULA_TIMEOUT_EMBEDDING") {
            self.timeouts.embedding_seconds = v;
        }
        if let Some(v) = parsed::<u32>("REGULA_MAX_RETRIES") {
            self.timeouts.max_retries = v;
        }
    }

    fn apply_env_overrides_retrieval(&mut self) {
        if let Some(kind) = named::<VectorStoreKind>("REGULA_VECTORSTORE_PROVIDER") {
            self.vectorstore.provider = kind;
        }
        if let Ok(v) = std::env::var("REGULA_VECTORSTORE_PATH") {
            self.vectorstore.path = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("REGULA_COLLECTION_NAME") {
            self.vectorstore.collection_name = v;
        }
        if let Ok(v) = std::env::var("REGULA_QDRANT_URL") {
            self.vectorstore.qdrant_url = v;
        }
        if let Some(v) = parsed::<usize>("REGULA_RETRIEVAL_K") {
            self.retrieval.k = v;
        }
        if let Some(v) = parsed::<f32>("REGULA_SCORE_THRESHOLD") {
            self.retrieval.score_threshold = Some(v);
        }
        if let Some(kind) = named::<ChainType>("REGULA_CHAIN_TYPE") {
            self.retrieval.chain_type = kind;
        }
        if let Ok(v) = std::env::var("REGULA_LOG_LEVEL") {
            self.logging.level = v;
        }
    }

    pub(crate) fn resolve_secrets(&mut self) {
        self.secrets.openai_api_key = ["REGULA_OPENAI_API_KEY", "OPENAI_API_KEY"]
            .iter()
            .filter_map(|key| std::env::var(key).ok())
            .find(|v| !v.trim().is_empty())
            .map(Secret::new);
    }
}
