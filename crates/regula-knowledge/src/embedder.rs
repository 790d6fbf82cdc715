//! Batched, cached embedding of chunks and queries.

use std::collections::HashMap;

use futures::stream::{self, StreamExt, TryStreamExt};
use regula_llm::{EmbeddingProvider, LlmError};
use serde::{Deserialize, Serialize};

use crate::cache::EmbeddingCache;
use crate::document::{Chunk, ChunkId};
use crate::error::{EmbedError, VectorSpec};

/// What a vector was computed for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "id")]
pub enum VectorOwner {
    Chunk(ChunkId),
    Query,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingVector {
    pub owner: VectorOwner,
    pub values: Vec<f32>,
    pub model: String,
}

impl EmbeddingVector {
    #[must_use]
    pub fn dimension(&self) -> usize {
        self.values.len()
    }

    /// Model and width of this vector, as an index records them.
    #[must_use]
    pub fn spec(&self) -> VectorSpec {
        VectorSpec {
            model: self.model.clone(),
            dimension: self.dimension(),
        }
    }
}

/// Counters from one `embed_documents` run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EmbedStats {
    pub cache_hits: usize,
    /// Distinct texts sent to the provider.
    pub computed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmbedderConfig {
    pub batch_size: usize,
    pub max_in_flight: usize,
}

impl Default for EmbedderConfig {
    fn default() -> Self {
        Self {
            batch_size: 64,
            max_in_flight: 4,
        }
    }
}

/// Wraps one embedding provider with a content-hash cache and a bounded pool
/// of in-flight batch requests.
#[derive(Debug, Clone)]
pub struct Embedder<P> {
    provider: P,
    cache: Option<EmbeddingCache>,
    config: EmbedderConfig,
}

type HashedVectors = Vec<(String, Vec<f32>)>;

impl<P: EmbeddingProvider> Embedder<P> {
    #[must_use]
    pub fn new(provider: P, config: EmbedderConfig) -> Self {
        Self {
            provider,
            cache: None,
            config: EmbedderConfig {
                batch_size: config.batch_size.max(1),
                max_in_flight: config.max_in_flight.max(1),
            },
        }
    }

    #[must_use]
    pub fn with_cache(mut self, cache: EmbeddingCache) -> Self {
        self.cache = Some(cache);
        self
    }

    #[must_use]
    pub fn model_id(&self) -> &str {
        self.provider.model_id()
    }

    #[must_use]
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Embed chunks, returning one vector per chunk in input order.
    ///
    /// # Errors
    ///
    /// Returns `EmbedError::Provider` if a batch still fails after the
    /// half-size retry, or `DimensionMismatch` if vectors disagree in width.
    pub async fn embed_documents(&self, chunks: &[Chunk]) -> Result<Vec<EmbeddingVector>, EmbedError> {
        self.embed_documents_with_stats(chunks)
            .await
            .map(|(vectors, _)| vectors)
    }

    /// Like [`Self::embed_documents`], also reporting cache hits.
    ///
    /// # Errors
    ///
    /// See [`Self::embed_documents`].
    pub async fn embed_documents_with_stats(
        &self,
        chunks: &[Chunk],
    ) -> Result<(Vec<EmbeddingVector>, EmbedStats), EmbedError> {
        let model = self.provider.model_id().to_owned();
        let hashes: Vec<String> = chunks.iter().map(Chunk::content_hash).collect();

        // Distinct texts in first-seen order.
        let mut texts_by_hash: HashMap<&str, &str> = HashMap::new();
        let mut unique: Vec<String> = Vec::new();
        for (hash, chunk) in hashes.iter().zip(chunks) {
            if texts_by_hash
                .insert(hash.as_str(), chunk.text.as_str())
                .is_none() {
                unique.push(hash.clone());
            }
        }

        let mut resolved = self.cached(&unique, &model).await;
        let mut stats = EmbedStats {
            cache_hits: resolved.len(),
            computed: 0,
        };

        let misses: Vec<(String, String)> = unique
            .iter()
            .filter(|h| !resolved.contains_key(*h))
            .map(|h| (h.clone(), texts_by_hash[h.as_str()].to_owned()))
            .collect();
        stats.computed = misses.len();

        if !misses.is_empty() {
            tracing::debug!(
                misses = misses.len(),
                cache_hits = stats.cache_hits,
                batch_size = self.config.batch_size,
                "embedding chunks"
            );
            let batches: Vec<Vec<(String, String)>> = misses
                .chunks(self.config.batch_size)
                .map(<[_]>::to_vec)
                .collect();

            let computed: Vec<HashedVectors> = stream::iter(batches)
                .map(|batch| self.embed_batch(batch, &model))
                .buffer_unordered(self.config.max_in_flight)
                .try_collect()
                .await?;
            resolved.extend(computed.into_iter().flatten());
        }

        let mut dimension = None;
        let mut out = Vec::with_capacity(chunks.len());
        for (hash, chunk) in hashes.iter().zip(chunks) {
            let values = resolved.get(hash).cloned().ok_or_else(|| {
                EmbedError::Provider(LlmError::EmptyResponse {
                    provider: self.provider.name(),
                })
            })?;
            let expected = *dimension.get_or_insert(values.len());
            if values.len() != expected {
                return Err(EmbedError::DimensionMismatch {
                    expected,
                    got: values.len(),
                });
            }
            out.push(EmbeddingVector {
                owner: VectorOwner::Chunk(chunk.id.clone()),
                values,
                model: model.clone(),
            });
        }

        tracing::info!(
            chunks = chunks.len(),
            cache_hits = stats.cache_hits,
            computed = stats.computed,
            model = %model,
            "chunks embedded"
        );
        Ok((out, stats))
    }

    /// Embed a query. Never cached.
    ///
    /// # Errors
    ///
    /// Returns `EmbedError::Provider` if the provider call fails.
    pub async fn embed_query(&self, text: &str) -> Result<EmbeddingVector, EmbedError> {
        let vectors = self.provider.embed(&[text.to_owned()]).await?;
        let values = vectors
            .into_iter()
            .next()
            .ok_or(EmbedError::Provider(LlmError::EmptyResponse {
                provider: self.provider.name(),
            }))?;
        Ok(EmbeddingVector {
            owner: VectorOwner::Query,
            values,
            model: self.provider.model_id().to_owned(),
        })
    }

    async fn cached(&self, hashes: &[String], model: &str) -> HashMap<String, Vec<f32>> {
        let Some(cache) = &self.cache else {
            return HashMap::new();
        };
        match cache.get_many(hashes, model).await {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!("embedding cache read failed, embedding everything: {e}");
                HashMap::new()
            }
        }
    }

    /// Embed one batch; on failure retry once as two half-size batches.
    async fn embed_batch(
        &self,
        batch: Vec<(String, String)>,
        model: &str,
    ) -> Result<HashedVectors, EmbedError> {
        let texts: Vec<String> = batch.iter().map(|(_, t)| t.clone()).collect();
        let vectors = match self.provider.embed(&texts).await {
            Ok(v) => v,
            Err(e) if batch.len() > 1 && !matches!(e, LlmError::Unauthorized { .. }) => {
                let mid = batch.len() / 2;
                tracing::warn!(
                    batch = batch.len(),
                    half = mid,
                    "embedding batch rejected ({e}), retrying at half size"
                );
                let mut v = self.provider.embed(&texts[..mid]).await?;
                v.extend(self.provider.embed(&texts[mid..]).await?);
                v
            }
            Err(e) => return Err(e.into()),
        };

        let pairs: HashedVectors = batch
            .into_iter()
            .map(|(hash, _)| hash)
            .zip(vectors)
            .collect();

        if let Some(cache) = &self.cache
            && let Err(e) = cache.put_many(model, &pairs).await
        {
            tracing::warn!("embedding cache write failed: {e}");
        }
        Ok(pairs)
    }
}
