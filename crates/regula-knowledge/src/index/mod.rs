//! Vector index backends and per-collection build coordination.

mod flat;
mod manager;
mod qdrant;

pub use flat::FlatIndex;
pub use manager::{BuildGuard, IndexManager};
pub use qdrant::{QdrantIndex, QdrantOps};

use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use crate::document::Chunk;
use crate::embedder::EmbeddingVector;
use crate::error::{IndexError, VectorSpec};

/// A chunk paired with its vector; created at build time, never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub chunk: Chunk,
    pub vector: EmbeddingVector,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub chunk: Chunk,
    pub score: f32,
}

/// Descending score, then ascending sequence index, then chunk id.
pub(crate) fn rank(a: &SearchHit, b: &SearchHit) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.chunk.sequence.cmp(&b.chunk.sequence))
        .then_with(|| a.chunk.id.cmp(&b.chunk.id))
}

/// Check every entry against `spec` before anything is written.
pub(crate) fn validate_entries(spec: &VectorSpec, entries: &[IndexEntry]) -> Result<(), IndexError> {
    for entry in entries {
        if entry.vector.model != spec.model {
            return Err(IndexError::MixedModels(
                spec.model.clone(),
                entry.vector.model.clone(),
            ));
        }
        if entry.vector.dimension() != spec.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: spec.dimension,
                got: entry.vector.dimension(),
            });
        }
    }
    Ok(())
}

/// Where indexes for each collection are built and persisted.
#[derive(Debug, Clone)]
pub enum IndexBackend {
    /// Exact in-memory search, persisted as one JSON file per collection.
    Flat { root: PathBuf },
    /// External Qdrant engine; a local manifest tracks the live generation.
    Qdrant { root: PathBuf, ops: QdrantOps },
}

impl IndexBackend {
    /// Directory holding the persisted state of `collection`.
    #[must_use]
    pub fn collection_dir(&self, collection: &str) -> PathBuf {
        match self {
            Self::Flat { root } | Self::Qdrant { root, .. } => root.join(collection),
        }
    }

    /// Build an index from `entries`. Nothing is persisted.
    ///
    /// # Errors
    ///
    /// Returns an error if entries disagree with `spec` or the backend fails.
    pub async fn build(
        &self,
        collection: &str,
        spec: VectorSpec,
        entries: Vec<IndexEntry>,
    ) -> Result<VectorIndex, IndexError> {
        match self {
            Self::Flat { .. } => Ok(VectorIndex::Flat(FlatIndex::build(collection, spec, entries)?)),
            Self::Qdrant { ops, .. } => {
                let dir = self.collection_dir(collection);
                let index = QdrantIndex::build(ops.clone(), &dir, collection, spec, entries).await?;
                Ok(VectorIndex::Qdrant(index))
            }
        }
    }

    /// Model and dimension of the persisted index of `collection`, if any.
    ///
    /// # Errors
    ///
    /// Returns an IO or format error.
    pub async fn stored_spec(&self, collection: &str) -> Result<Option<VectorSpec>, IndexError> {
        let dir = self.collection_dir(collection);
        match self {
            Self::Flat { .. } => FlatIndex::stored_spec(&dir).await,
            Self::Qdrant { .. } => QdrantIndex::stored_spec(&dir).await,
        }
    }

    /// Load the persisted index of `collection`, if any.
    ///
    /// # Errors
    ///
    /// Returns `Mismatch` if the stored model or dimension differs from
    /// `expected`, or an IO/format error.
    pub async fn load(
        &self,
        collection: &str,
        expected: &VectorSpec,
    ) -> Result<Option<VectorIndex>, IndexError> {
        let dir = self.collection_dir(collection);
        match self {
            Self::Flat { .. } => Ok(FlatIndex::load(&dir, expected)
                .await?
                .map(VectorIndex::Flat)),
            Self::Qdrant { ops, .. } => Ok(QdrantIndex::load(ops.clone(), &dir, expected)
                .await?
                .map(VectorIndex::Qdrant)),
        }
    }
}

/// A built index over one collection.
#[derive(Debug, Clone)]
pub enum VectorIndex {
    Flat(FlatIndex),
    Qdrant(QdrantIndex),
}

impl VectorIndex {
    #[must_use]
    pub fn spec(&self) -> &VectorSpec {
        match self {
            Self::Flat(i) => i.spec(),
            Self::Qdrant(i) => i.spec(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Flat(i) => i.len(),
            Self::Qdrant(i) => i.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// # Errors
    ///
    /// Returns `Mismatch` if `expected` differs from the index's vector spec.
    pub fn ensure_compatible(&self, expected: &VectorSpec) -> Result<(), IndexError> {
        if self.spec() == expected {
            Ok(())
        } else {
            Err(IndexError::Mismatch {
                expected: expected.clone(),
                found: self.spec().clone(),
            })
        }
    }

    /// The `k` most similar chunks, best first; equal scores are ordered by
    /// ascending sequence index.
    ///
    /// # Errors
    ///
    /// Returns `Mismatch` if the query vector's model or width differs from the
    /// index, or a backend error.
    pub async fn search(&self, query: &EmbeddingVector, k: usize) -> Result<Vec<SearchHit>, IndexError> {
        self.ensure_compatible(&query.spec())?;
        if k == 0 {
            return Ok(Vec::new());
        }
        match self {
            Self::Flat(i) => Ok(i.search(&query.values, k)),
            Self::Qdrant(i) => i.search(&query.values, k).await,
        }
    }

    /// Persist to `dir`. Readers of a previous persisted state see either the
    /// old or the new index, never a partial one.
    ///
    /// # Errors
    ///
    /// Returns an IO or serialization error.
    pub async fn persist(&self, dir: &Path) -> Result<(), IndexError> {
        match self {
            Self::Flat(i) => i.persist(dir).await,
            Self::Qdrant(i) => i.persist(dir).await,
        }
    }
}

/// Write `bytes` to `path` via a temporary sibling and a rename.
pub(crate) async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), IndexError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[tokio::test]
    async fn search_rejects_foreign_query_vector() {
        let index = VectorIndex::Flat(
            FlatIndex::build("c", spec(2), vec![entry("a", 0, vec![1.0, 0.0])]).unwrap(),
        );
        let err = index.search(&query(vec![1.0, 0.0, 0.0]), 3).await.unwrap_err();
        assert!(matches!(err, IndexError::Mismatch { .. }));

        let mut other_model = query(vec![1.0, 0.0]);
        other_model.model = "other".into();
        assert!(matches!(
            index.search(&other_model, 3).await,
            Err(IndexError::Mismatch { .. })
        ));
    }

    #[test]
    fn build_rejects_mixed_dimensions() {
        let entries = vec![entry("a", 0, vec![1.0, 0.0]), entry("a", 1, vec![1.0])];
        assert!(matches!(
            FlatIndex::build("c", spec(2), entries),
            Err(IndexError::DimensionMismatch { expected: 2, got: 1 })
        ));
    }

    #[test]
    fn rank_breaks_ties_by_sequence() {
        let hit = |seq, score| SearchHit {
            chunk: entry("a", seq, vec![]).chunk,
            score,
        };
        let mut hits = vec![hit(3, 0.5), hit(1, 0.9), hit(0, 0.5)];
        hits.sort_by(rank);
        let order: Vec<usize> = hits.iter().map(|h| h.chunk.sequence).collect();
        assert_eq!(order, [1, 0, 3]);
    }

    #[tokio::test]
    async fn stored_spec_reads_persisted_header() {
        let dir = tempfile::tempdir().unwrap();
        let backend = IndexBackend::Flat {
            root: dir.path().to_path_buf(),
        };
        assert!(backend.stored_spec("c").await.unwrap().is_none());

        let index = backend
            .build("c", spec(2), vec![entry("a", 0, vec![1.0, 0.0])])
            .await
            .unwrap();
        index.persist(&backend.collection_dir("c")).await.unwrap();
        assert_eq!(backend.stored_spec("c").await.unwrap(), Some(spec(2)));
    }
}
