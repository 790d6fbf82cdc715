use std::path::Path;

use serde::{Deserialize, Serialize};

use super::{IndexEntry, SearchHit, rank, validate_entries, write_atomic};
use crate::document::Chunk;
use crate::error::{IndexError, VectorSpec};

const INDEX_FILE: &str = "index.json";
const FORMAT_VERSION: u32 = 1;

/// Exact cosine-similarity search over all entries in memory.
#[derive(Debug, Clone)]
pub struct FlatIndex {
    collection: String,
    spec: VectorSpec,
    entries: Vec<StoredEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredEntry {
    chunk: Chunk,
    vector: Vec<f32>,
    #[serde(skip)]
    norm: f32,
}

#[derive(Deserialize)]
struct IndexHeader {
    version: u32,
    spec: VectorSpec,
}

#[derive(Serialize, Deserialize)]
struct IndexFile {
    version: u32,
    collection: String,
    spec: VectorSpec,
    entries: Vec<StoredEntry>,
}

impl FlatIndex {
    /// # Errors
    ///
    /// Returns an error if any entry's model or dimension differs from `spec`.
    pub fn build(collection: &str, spec: VectorSpec, entries: Vec<IndexEntry>) -> Result<Self, IndexError> {
        validate_entries(&spec, &entries)?;
        let entries = entries
            .into_iter()
            .map(|e| StoredEntry {
                norm: norm(&e.vector.values),
                vector: e.vector.values,
                chunk: e.chunk,
            })
            .collect();
        Ok(Self {
            collection: collection.to_owned(),
            spec,
            entries,
        })
    }

    #[must_use]
    pub fn spec(&self) -> &VectorSpec {
        &self.spec
    }

    #[must_use]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn search(&self, query: &[f32], k: usize) -> Vec<SearchHit> {
        let query_norm = norm(query);
        let mut hits: Vec<SearchHit> = self
            .entries
            .iter()
            .map(|e| SearchHit {
                chunk: e.chunk.clone(),
                score: cosine(query, query_norm, &e.vector, e.norm),
            })
            .collect();
        hits.sort_by(rank);
        hits.truncate(k);
        hits
    }

    pub(crate) async fn persist(&self, dir: &Path) -> Result<(), IndexError> {
        let file = IndexFile {
            version: FORMAT_VERSION,
            collection: self.collection.clone(),
            spec: self.spec.clone(),
            entries: self.entries.clone(),
        };
        let bytes = serde_json::to_vec(&file)?;
        write_atomic(&dir.join(INDEX_FILE), &bytes).await?;
        tracing::debug!(collection = %self.collection, entries = self.entries.len(), dir = %dir.display(), "flat index persisted");
        Ok(())
    }

    /// Vector spec of the index persisted in `dir`, without loading entries.
    pub(crate) async fn stored_spec(dir: &Path) -> Result<Option<VectorSpec>, IndexError> {
        let bytes = match tokio::fs::read(dir.join(INDEX_FILE)).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let header: IndexHeader = serde_json::from_slice(&bytes)?;
        if header.version != FORMAT_VERSION {
            return Err(IndexError::Corrupt(format!(
                "unsupported index format version {}",
                header.version
            )));
        }
        Ok(Some(header.spec))
    }

    /// Load from `dir`; `Ok(None)` if nothing has been persisted there.
    ///
    /// # Errors
    ///
    /// Returns `Mismatch` if the stored spec differs from `expected`.
    pub async fn load(dir: &Path, expected: &VectorSpec) -> Result<Option<Self>, IndexError> {
        let path = dir.join(INDEX_FILE);
        let bytes = match tokio::fs::read(&path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let file: IndexFile = serde_json::from_slice(&bytes)?;
        if file.version != FORMAT_VERSION {
            return Err(IndexError::Corrupt(format!(
                "unsupported index format version {}",
                file.version
            )));
        }
        if &file.spec != expected {
            return Err(IndexError::Mismatch {
                expected: expected.clone(),
                found: file.spec,
            });
        }
        let mut entries = file.entries;
        for e in &mut entries {
            if e.vector.len() != file.spec.dimension {
                return Err(IndexError::Corrupt(format!(
                    "entry {} has {} dims, index declares {}",
                    e.chunk.id,
                    e.vector.len(),
                    file.spec.dimension
                )));
            }
            e.norm = norm(&e.vector);
        }
        Ok(Some(Self {
            collection: file.collection,
            spec: file.spec,
            entries,
        }))
    }
}

fn norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

fn cosine(a: &[f32], a_norm: f32, b: &[f32], b_norm: f32) -> f32 {
    if a_norm == 0.0 || b_norm == 0.0 {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    dot / (a_norm * b_norm)
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{entry, spec};
    use super::*;

    fn sample() -> FlatIndex {
        FlatIndex::build(
            "nis2",
            spec(3),
            vec![
                entry("a", 0, vec![1.0, 0.0, 0.0]),
                entry("a", 1, vec![0.0, 1.0, 0.0]),
                entry("b", 0, vec![0.7, 0.7, 0.0]),
                entry("b", 1, vec![0.0, 0.0, 1.0]),
            ],
        )
        .unwrap()
    }

    #[test]
    fn returns_top_k_by_cosine() {
        let hits = sample().search(&[1.0, 0.1, 0.0], 2);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk.id.as_str(), "a#0");
        assert_eq!(hits[1].chunk.id.as_str(), "b#0");
        assert!(hits[0].score >= hits[1].score);
    }

    #[test]
    fn equal_scores_ordered_by_sequence() {
        let index = FlatIndex::build(
            "c",
            spec(2),
            vec![
                entry("x", 2, vec![1.0, 0.0]),
                entry("x", 0, vec![1.0, 0.0]),
                entry("x", 1, vec![2.0, 0.0]),
            ],
        )
        .unwrap();
        let seq: Vec<usize> = index
            .search(&[1.0, 0.0], 3)
            .iter()
            .map(|h| h.chunk.sequence)
            .collect();
        assert_eq!(seq, [0, 1, 2]);
    }

    #[test]
    fn k_larger_than_index_returns_all() {
        assert_eq!(sample().search(&[0.0, 0.0, 1.0], 50).len(), 4);
    }

    #[test]
    fn zero_query_scores_zero() {
        assert!(
            sample()
                .search(&[0.0, 0.0, 0.0], 4)
                .iter()
                .all(|h| h.score.abs() < f32::EPSILON)
        );
    }

    #[tokio::test]
    async fn persist_load_round_trip_preserves_results() {
        let dir = tempfile::tempdir().unwrap();
        let index = sample();
        index.persist(dir.path()).await.unwrap();

        let loaded = FlatIndex::load(dir.path(), &spec(3)).await.unwrap().unwrap();
        let query = [0.3, 0.9, 0.1];
        let before = index.search(&query, 3);
        let after = loaded.search(&query, 3);
        assert_eq!(before.len(), after.len());
        for (b, a) in before.iter().zip(&after) {
            assert_eq!(b.chunk, a.chunk);
            assert!((b.score - a.score).abs() < 1e-6);
        }
        assert!(!dir.path().join("index.json.tmp").exists());
    }

    #[tokio::test]
    async fn load_rejects_other_model_or_dimension() {
        let dir = tempfile::tempdir().unwrap();
        sample().persist(dir.path()).await.unwrap();

        assert!(matches!(
            FlatIndex::load(dir.path(), &spec(4)).await,
            Err(IndexError::Mismatch { .. })
        ));
        let other = VectorSpec {
            model: "other-model".into(),
            dimension: 3,
        };
        assert!(matches!(
            FlatIndex::load(dir.path(), &other).await,
            Err(IndexError::Mismatch { .. })
        ));
    }

    #[tokio::test]
    async fn load_missing_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(FlatIndex::load(dir.path(), &spec(3)).await.unwrap().is_none());
    }
}
