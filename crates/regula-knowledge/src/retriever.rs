use std::sync::Arc;

use crate::document::Chunk;
use crate::embedder::EmbeddingVector;
use crate::error::IndexError;
use crate::index::{IndexManager, SearchHit};

/// Top-k search over one collection with an optional score floor.
#[derive(Debug, Clone)]
pub struct Retriever {
    manager: Arc<IndexManager>,
    collection: String,
}

impl Retriever {
    #[must_use]
    pub fn new(manager: Arc<IndexManager>, collection: impl Into<String>) -> Self {
        Self {
            manager,
            collection: collection.into(),
        }
    }

    #[must_use]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Search the live index and drop hits scoring below `score_threshold`,
    /// keeping the index's ranking order. A collection that was persisted but
    /// not yet loaded is loaded on first use.
    ///
    /// # Errors
    ///
    /// Returns `NotBuilt` if the collection has no index, or `Mismatch` if the
    /// index was built by a different embedder than the query vector.
    pub async fn retrieve_scored(
        &self,
        query: &EmbeddingVector,
        k: usize,
        score_threshold: Option<f32>,
    ) -> Result<Vec<SearchHit>, IndexError> {
        let index = match self.manager.current(&self.collection) {
            Some(index) => index,
            None => self
                .manager
                .load(&self.collection, &query.spec())
                .await?
                .ok_or_else(|| IndexError::NotBuilt(self.collection.clone()))?,
        };
        let mut hits = index.search(query, k).await?;
        let total = hits.len();
        if let Some(threshold) = score_threshold {
            hits.retain(|h| h.score >= threshold);
        }
        tracing::debug!(
            collection = %self.collection,
            k,
            returned = total,
            kept = hits.len(),
            "retrieved"
        );
        Ok(hits)
    }

    /// Like [`Self::retrieve_scored`], returning only the chunks.
    ///
    /// # Errors
    ///
    /// See [`Self::retrieve_scored`].
    pub async fn retrieve(
        &self,
        query: &EmbeddingVector,
        k: usize,
        score_threshold: Option<f32>,
    ) -> Result<Vec<Chunk>, IndexError> {
        Ok(self
            .retrieve_scored(query, k, score_threshold)
            .await?
            .into_iter()
            .map(|h| h.chunk)
            .collect())
    }
}
