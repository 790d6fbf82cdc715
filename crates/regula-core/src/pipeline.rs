//! Ingestion: load, split, embed, then build and persist the collection index.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use regula_knowledge::document::{DirectoryLoader, SkippedDocument};
use regula_knowledge::{
    DocumentError, EmbedError, Embedder, IndexEntry, IndexError, IndexManager, Splitter,
    VectorSpec,
};
use regula_llm::EmbeddingProvider;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("document loading failed: {0}")]
    Load(#[from] DocumentError),

    #[error("embedding failed: {0}")]
    Embed(#[from] EmbedError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error("no indexable text found under {}", .0.display())]
    NothingToIndex(PathBuf),
}

/// What one ingestion run did.
#[derive(Debug, Default)]
pub struct IngestReport {
    pub documents: usize,
    pub skipped: Vec<SkippedDocument>,
    pub chunks: usize,
    pub cache_hits: usize,
    pub embedded: usize,
    /// Entries in the live index afterwards.
    pub entries: usize,
    /// An existing compatible index was loaded instead of rebuilt.
    pub reused: bool,
}

pub struct IngestionPipeline<E> {
    loader: DirectoryLoader,
    splitter: Splitter,
    embedder: Arc<Embedder<E>>,
    manager: Arc<IndexManager>,
    collection: String,
}

impl<E: EmbeddingProvider> IngestionPipeline<E> {
    #[must_use]
    pub fn new(
        loader: DirectoryLoader,
        splitter: Splitter,
        embedder: Arc<Embedder<E>>,
        manager: Arc<IndexManager>,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            loader,
            splitter,
            embedder,
            manager,
            collection: collection.into(),
        }
    }

    #[must_use]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Index every supported document under `root`.
    ///
    /// Unless `rebuild` is set, a persisted index built by the active embedding
    /// model is loaded and reused. Documents that fail to load are skipped and
    /// listed in the report. Dropping the future before it completes leaves the
    /// previous index live and persisted.
    ///
    /// # Errors
    ///
    /// Returns `Index(Mismatch)` when reusing an index built by another model,
    /// `Index(BuildInProgress)` if the collection is already being built,
    /// `NothingToIndex` if no text was found, or the embedding/backend error.
    pub async fn run(&self, root: &Path, rebuild: bool) -> Result<IngestReport, PipelineError> {
        if !rebuild && let Some(report) = self.reuse().await? {
            return Ok(report);
        }

        let guard = self.manager.begin_build(&self.collection)?;
        let loaded = self.loader.load_directory(root).await?;
        let chunks = self.splitter.split_documents(&loaded.documents);
        tracing::info!(
            documents = loaded.documents.len(),
            skipped = loaded.skipped.len(),
            chunks = chunks.len(),
            "documents split"
        );
        if chunks.is_empty() {
            return Err(PipelineError::NothingToIndex(root.to_path_buf()));
        }

        let (vectors, stats) = self.embedder.embed_documents_with_stats(&chunks).await?;
        let spec = vectors
            .first()
            .map_or_else(|| self.spec(0), regula_knowledge::EmbeddingVector::spec);
        let report = IngestReport {
            documents: loaded.documents.len(),
            skipped: loaded.skipped,
            chunks: chunks.len(),
            cache_hits: stats.cache_hits,
            embedded: stats.computed,
            entries: chunks.len(),
            reused: false,
        };
        let entries = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| IndexEntry { chunk, vector })
            .collect();
        guard.commit(spec, entries).await?;
        Ok(report)
    }

    async fn reuse(&self) -> Result<Option<IngestReport>, PipelineError> {
        let Some(stored) = self.manager.backend().stored_spec(&self.collection).await? else {
            return Ok(None);
        };
        let expected = self.spec(stored.dimension);
        let Some(index) = self.manager.load(&self.collection, &expected).await? else {
            return Ok(None);
        };
        tracing::info!(collection = %self.collection, entries = index.len(), "reusing existing index");
        Ok(Some(IngestReport {
            entries: index.len(),
            reused: true,
            ..IngestReport::default()
        }))
    }

    fn spec(&self, dimension: usize) -> VectorSpec {
        VectorSpec {
            model: self.embedder.model_id().to_owned(),
            dimension,
        }
    }
}
