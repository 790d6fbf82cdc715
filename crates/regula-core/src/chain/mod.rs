//! Answer chains over retrieved regulatory passages.
//!
//! Every mode shares one failure contract: provider failures surface as
//! [`ChainError`], which tells callers whether a retry may help, and a failed
//! call never returns a partial answer.

mod compliance;
mod conversational;
mod prompt;
mod qa;
mod summary;

pub use compliance::{ComplianceAssessment, ComplianceCheckChain, Verdict};
pub use conversational::ConversationalChain;
pub use qa::QaChain;
pub use summary::SummaryChain;

use std::future::Future;
use std::sync::Arc;

use regula_knowledge::{Chunk, EmbedError, Embedder, IndexError, Retriever, SplitterError};
use regula_llm::{EmbeddingProvider, LlmError};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error("embedding failed: {0}")]
    Embed(EmbedError),

    #[error("retrieval failed: {0}")]
    Index(#[from] IndexError),

    #[error("completion failed: {0}")]
    Completion(LlmError),

    #[error("{provider} did not respond within {seconds}s")]
    Timeout { provider: &'static str, seconds: u64 },

    #[error("could not read a verdict from the model response")]
    UnparsableVerdict,

    #[error("summarization did not converge after {rounds} reduce rounds")]
    SummaryDiverged { rounds: usize },

    #[error("nothing to summarize")]
    EmptyInput,

    #[error("invalid summary splitter: {0}")]
    Splitter(#[from] SplitterError),

    #[error("cancelled")]
    Cancelled,
}

impl ChainError {
    /// Whether repeating the same call may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            Self::Embed(e) => e.is_transient(),
            Self::Completion(e) => e.is_transient(),
            Self::Index(e) => matches!(e, IndexError::BuildInProgress(_)),
            Self::UnparsableVerdict
            | Self::SummaryDiverged { .. }
            | Self::EmptyInput
            | Self::Splitter(_)
            | Self::Cancelled => false,
        }
    }
}

impl From<LlmError> for ChainError {
    fn from(e: LlmError) -> Self {
        match e {
            LlmError::Timeout { provider, seconds } => Self::Timeout { provider, seconds },
            other => Self::Completion(other),
        }
    }
}

impl From<EmbedError> for ChainError {
    fn from(e: EmbedError) -> Self {
        match e {
            EmbedError::Provider(LlmError::Timeout { provider, seconds }) => {
                Self::Timeout { provider, seconds }
            }
            other => Self::Embed(other),
        }
    }
}

/// Which chain answers free-text questions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainType {
    #[default]
    Qa,
    Conversational,
    ComplianceCheck,
    Summary,
}

impl ChainType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Qa => "qa",
            Self::Conversational => "conversational",
            Self::ComplianceCheck => "compliance_check",
            Self::Summary => "summary",
        }
    }
}

impl std::fmt::Display for ChainType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An answer and the chunks it was grounded on, best match first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub answer: String,
    pub sources: Vec<Chunk>,
}

impl Answer {
    /// Source provenance lines, e.g. `nis2.pdf (page 3) [Article 21]`.
    #[must_use]
    pub fn source_lines(&self) -> Vec<String> {
        self.sources.iter().map(Chunk::provenance).collect()
    }
}

/// Query embedding plus top-k retrieval, shared by the retrieving chains.
pub struct RetrievalContext<E> {
    embedder: Arc<Embedder<E>>,
    retriever: Retriever,
    k: usize,
    score_threshold: Option<f32>,
}

impl<E> Clone for RetrievalContext<E> {
    fn clone(&self) -> Self {
        Self {
            embedder: Arc::clone(&self.embedder),
            retriever: self.retriever.clone(),
            k: self.k,
            score_threshold: self.score_threshold,
        }
    }
}

impl<E: EmbeddingProvider> RetrievalContext<E> {
    #[must_use]
    pub fn new(
        embedder: Arc<Embedder<E>>,
        retriever: Retriever,
        k: usize,
        score_threshold: Option<f32>,
    ) -> Self {
        Self {
            embedder,
            retriever,
            k,
            score_threshold,
        }
    }

    #[must_use]
    pub fn k(&self) -> usize {
        self.k
    }

    /// Top-k chunks for `query` scoring at least the threshold.
    ///
    /// # Errors
    ///
    /// Returns an error if query embedding or the index search fails.
    pub async fn retrieve(&self, query: &str) -> Result<Vec<Chunk>, ChainError> {
        let vector = self.embedder.embed_query(query).await?;
        Ok(self
            .retriever
            .retrieve(&vector, self.k, self.score_threshold)
            .await?)
    }
}

/// Run `fut` unless `token` is cancelled first.
///
/// Chain futures only commit results after their last await, so dropping one
/// on cancellation leaves conversation state and indexes unchanged.
///
/// # Errors
///
/// Returns `ChainError::Cancelled` if the token fires first, otherwise the
/// future's own result.
pub async fn with_cancellation<T, F>(token: &CancellationToken, fut: F) -> Result<T, ChainError>
where
    F: Future<Output = Result<T, ChainError>>,
{
    tokio::select! {
        biased;
        () = token.cancelled() => {
            tracing::info!("chain call cancelled");
            Err(ChainError::Cancelled)
        }
        result = fut => result,
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use regula_knowledge::{
        Document, DocumentMetadata, Embedder, EmbedderConfig, IndexBackend, IndexEntry,
        IndexManager, Retriever, Splitter, SplitterConfig, SplitterKind,
    };
    use regula_llm::mock::MockProvider;

    use super::RetrievalContext;

    /// A flat index over `texts` (one document each, sectioned `Article N`),
    /// embedded with `provider`; retrieval keeps the top 2.
    pub async fn context(
        dir: &std::path::Path,
        provider: MockProvider,
        texts: &[&str],
        score_threshold: Option<f32>,
    ) -> RetrievalContext<MockProvider> {
        let embedder = Arc::new(Embedder::new(
            provider.with_dimension(512),
            EmbedderConfig::default(),
        ));
        let manager = Arc::new(IndexManager::new(IndexBackend::Flat {
            root: dir.to_path_buf(),
        }));
        let splitter = Splitter::new(SplitterKind::Recursive, SplitterConfig::new(1000, 0)).unwrap();
        let chunks: Vec<_> = texts
            .iter()
            .enumerate()
            .flat_map(|(i, text)| {
                let mut meta = DocumentMetadata::new(format!("doc{i}.txt"), "txt");
                meta.section = Some(format!("Article {}", i + 1));
                splitter.split(&Document::new(*text, meta))
            })
            .collect();
        let vectors = embedder.embed_documents(&chunks).await.unwrap();
        let spec = vectors[0].spec();
        let entries = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| IndexEntry { chunk, vector })
            .collect();
        manager.build("test", spec, entries).await.unwrap();
        RetrievalContext::new(embedder, Retriever::new(manager, "test"), 2, score_threshold)
    }
}
