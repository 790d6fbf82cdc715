//! Application bootstrap: providers, embedding cache, index manager and chains
//! built once from a validated [`Config`].

use std::sync::Arc;

use regula_knowledge::document::DirectoryLoader;
use regula_knowledge::index::QdrantOps;
use regula_knowledge::{
    EmbedError, Embedder, EmbeddingCache, IndexBackend, IndexError, IndexManager, Retriever,
    Splitter, SplitterError,
};
use regula_llm::RetryPolicy;
use regula_llm::any::AnyProvider;
use regula_llm::ollama::OllamaProvider;
use regula_llm::openai::OpenAiProvider;

use crate::chain::{
    ComplianceCheckChain, ConversationalChain, QaChain, RetrievalContext, SummaryChain,
};
use crate::config::{Config, ConfigError, ProviderKind, VectorStoreKind};
use crate::conversation::ConversationState;
use crate::pipeline::IngestionPipeline;

#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Splitter(#[from] SplitterError),

    #[error("failed to open embedding cache: {0}")]
    Cache(#[from] EmbedError),

    #[error("failed to set up vector store: {0}")]
    VectorStore(#[from] IndexError),
}

/// Every long-lived component, shared read-only by all commands.
pub struct App {
    config: Config,
    llm: Arc<AnyProvider>,
    embedder: Arc<Embedder<AnyProvider>>,
    manager: Arc<IndexManager>,
}

impl App {
    /// Validate `config` and build providers, cache and index manager.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, a provider lacks
    /// credentials, or the cache or vector store cannot be opened.
    pub async fn from_config(config: Config) -> Result<Self, BootstrapError> {
        config.validate()?;
        let llm = create_provider(
            &config,
            "llm",
            config.llm.provider,
            config.llm.base_url.as_deref(),
            &config.llm.model,
            config.llm_retry_policy(),
        )?;
        let embedding = create_provider(
            &config,
            "embedding",
            config.embedding.provider,
            config.embedding.base_url.as_deref(),
            &config.embedding.model,
            config.embedding_retry_policy(),
        )?;
        Self::with_providers(config, llm, embedding).await
    }

    /// Build around already-constructed providers.
    ///
    /// # Errors
    ///
    /// Returns an error if the splitter settings are invalid or the cache or
    /// vector store cannot be opened.
    pub async fn with_providers(
        config: Config,
        llm: AnyProvider,
        embedding: AnyProvider,
    ) -> Result<Self, BootstrapError> {
        config.splitter_config().validate()?;
        let cache = EmbeddingCache::open(&config.embedding.cache_path).await?;
        let embedder = Embedder::new(embedding, config.embedder_config()).with_cache(cache);
        let manager = IndexManager::new(create_backend(&config)?);

        tracing::info!(
            llm = %config.llm.provider,
            embedding = %config.embedding.provider,
            model = embedder.model_id(),
            vectorstore = config.vectorstore.provider.as_str(),
            collection = %config.vectorstore.collection_name,
            "regula initialized"
        );
        Ok(Self {
            config,
            llm: Arc::new(llm),
            embedder: Arc::new(embedder),
            manager: Arc::new(manager),
        })
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub fn index_manager(&self) -> &Arc<IndexManager> {
        &self.manager
    }

    #[must_use]
    pub fn retrieval(&self) -> RetrievalContext<AnyProvider> {
        RetrievalContext::new(
            Arc::clone(&self.embedder),
            Retriever::new(
                Arc::clone(&self.manager),
                self.config.vectorstore.collection_name.clone(),
            ),
            self.config.retrieval.k,
            self.config.retrieval.score_threshold,
        )
    }

    #[must_use]
    pub fn qa_chain(&self) -> QaChain<AnyProvider, AnyProvider> {
        QaChain::new(
            Arc::clone(&self.llm),
            self.retrieval(),
            self.config.completion_params(),
        )
    }

    #[must_use]
    pub fn conversational_chain(&self) -> ConversationalChain<AnyProvider, AnyProvider> {
        ConversationalChain::new(
            Arc::clone(&self.llm),
            self.retrieval(),
            self.config.completion_params(),
        )
    }

    #[must_use]
    pub fn compliance_chain(&self) -> ComplianceCheckChain<AnyProvider, AnyProvider> {
        ComplianceCheckChain::new(
            Arc::clone(&self.llm),
            self.retrieval(),
            self.config.completion_params(),
        )
    }

    #[must_use]
    pub fn summary_chain(&self) -> SummaryChain<AnyProvider> {
        SummaryChain::new(
            Arc::clone(&self.llm),
            self.config.completion_params(),
            self.config.llm.max_input_chars,
        )
    }

    #[must_use]
    pub fn new_conversation(&self) -> ConversationState {
        ConversationState::new(self.config.retrieval.max_turns)
    }

    #[must_use]
    pub fn document_loader(&self) -> DirectoryLoader {
        DirectoryLoader::new(
            &self.config.paths.supported_formats,
            regula_knowledge::document::DEFAULT_MAX_FILE_SIZE,
        )
    }

    /// # Errors
    ///
    /// Returns an error if the splitter settings are invalid.
    pub fn ingestion_pipeline(&self) -> Result<IngestionPipeline<AnyProvider>, BootstrapError> {
        let splitter = Splitter::new(self.config.splitter, self.config.splitter_config())?;
        Ok(IngestionPipeline::new(
            self.document_loader(),
            splitter,
            Arc::clone(&self.embedder),
            Arc::clone(&self.manager),
            self.config.vectorstore.collection_name.clone(),
        ))
    }
}

/// Resolve one provider role (`llm` or `embedding`) to a concrete backend.
///
/// # Errors
///
/// Returns `MissingApiKey` for the OpenAI backend without a resolved key.
pub fn create_provider(
    config: &Config,
    role: &'static str,
    kind: ProviderKind,
    base_url: Option<&str>,
    model: &str,
    retry: RetryPolicy,
) -> Result<AnyProvider, ConfigError> {
    let base_url = base_url.unwrap_or(kind.default_base_url());
    let provider: AnyProvider = match kind {
        ProviderKind::OpenAi => {
            let key = config
                .secrets
                .openai_api_key
                .as_ref()
                .ok_or(ConfigError::MissingApiKey { role })?;
            OpenAiProvider::new(key.expose().to_owned(), base_url.to_owned(), model.to_owned()).into()
        }
        ProviderKind::Ollama => OllamaProvider::new(base_url, model.to_owned()).into(),
    };
    tracing::debug!(role, provider = kind.as_str(), model, base_url, "provider created");
    Ok(provider.with_retry_policy(retry))
}

/// # Errors
///
/// Returns an error if the Qdrant client cannot be created.
pub fn create_backend(config: &Config) -> Result<IndexBackend, IndexError> {
    let root = config.vectorstore.path.clone();
    Ok(match config.vectorstore.provider {
        VectorStoreKind::Flat => IndexBackend::Flat { root },
        VectorStoreKind::Qdrant => IndexBackend::Qdrant {
            root,
            ops: QdrantOps::new(&config.vectorstore.qdrant_url)?,
        },
    })
}
