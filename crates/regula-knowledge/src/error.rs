use std::fmt;

use serde::{Deserialize, Serialize};

/// Embedding model identity and vector width an index was built with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorSpec {
    pub model: String,
    pub dimension: usize,
}

impl fmt::Display for VectorSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} dims)", self.model, self.dimension)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
    #[error("embedding provider failed: {0}")]
    Provider(#[from] regula_llm::LlmError),

    #[error("embedding cache error: {0}")]
    Cache(#[from] sqlx::Error),

    #[error("embedding cache migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("embedding dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
}

impl EmbedError {
    /// Whether the underlying provider failure is transient.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Provider(e) if e.is_transient())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("no index built for collection '{0}'; run `regula ingest` first")]
    NotBuilt(String),

    #[error("index mismatch: stored index uses {found}, active embedder is {expected}; rebuild with `regula ingest --rebuild`")]
    Mismatch { expected: VectorSpec, found: VectorSpec },

    #[error("an index build is already running for collection '{0}'")]
    BuildInProgress(String),

    #[error("entry dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("entries embedded with mixed models: {0} and {1}")]
    MixedModels(String, String),

    #[error("corrupt index: {0}")]
    Corrupt(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Qdrant error: {0}")]
    Qdrant(#[from] Box<qdrant_client::QdrantError>),
}
