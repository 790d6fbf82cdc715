use std::collections::HashMap;
use std::path::Path;

use qdrant_client::Qdrant;
use qdrant_client::qdrant::{
    CreateCollectionBuilder, Distance, PointStruct, ScoredPoint, SearchPointsBuilder,
    UpsertPointsBuilder, VectorParamsBuilder, value::Kind,
};
use serde::{Deserialize, Serialize};

use super::{IndexEntry, SearchHit, rank, validate_entries, write_atomic};
use crate::document::Chunk;
use crate::error::{IndexError, VectorSpec};

const MANIFEST_FILE: &str = "qdrant.json";
const UPSERT_BATCH: usize = 256;
/// Namespace for deterministic point ids derived from chunk ids.
const POINT_NAMESPACE: uuid::Uuid = uuid::Uuid::from_bytes([
    0x8f, 0x1d, 0x52, 0x3a, 0x61, 0x0b, 0x4e, 0x9c, 0xa2, 0x37, 0x5e, 0x14, 0xc0, 0x6d, 0x93, 0x2b,
]);

type QdrantResult<T> = Result<T, Box<qdrant_client::QdrantError>>;

/// Thin wrapper over the [`Qdrant`] client with the collection operations the
/// index needs.
#[derive(Clone)]
pub struct QdrantOps {
    client: Qdrant,
}

impl std::fmt::Debug for QdrantOps {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QdrantOps").finish_non_exhaustive()
    }
}

impl QdrantOps {
    /// # Errors
    ///
    /// Returns an error if the Qdrant client cannot be created.
    pub fn new(url: &str) -> QdrantResult<Self> {
        let client = Qdrant::from_url(url).build().map_err(Box::new)?;
        Ok(Self { client })
    }

    async fn collection_exists(&self, collection: &str) -> QdrantResult<bool> {
        self.client
            .collection_exists(collection)
            .await
            .map_err(Box::new)
    }

    async fn create_collection(&self, collection: &str, vector_size: u64) -> QdrantResult<()> {
        self.client
            .create_collection(
                CreateCollectionBuilder::new(collection)
                    .vectors_config(VectorParamsBuilder::new(vector_size, Distance::Cosine)),
            )
            .await
            .map_err(Box::new)?;
        Ok(())
    }

    async fn delete_collection(&self, collection: &str) -> QdrantResult<()> {
        self.client
            .delete_collection(collection)
            .await
            .map_err(Box::new)?;
        Ok(())
    }

    async fn upsert(&self, collection: &str, points: Vec<PointStruct>) -> QdrantResult<()> {
        self.client
            .upsert_points(UpsertPointsBuilder::new(collection, points).wait(true))
            .await
            .map_err(Box::new)?;
        Ok(())
    }

    async fn search(&self, collection: &str, vector: Vec<f32>, limit: u64) -> QdrantResult<Vec<ScoredPoint>> {
        let builder = SearchPointsBuilder::new(collection, vector, limit).with_payload(true);
        let results = self.client.search_points(builder).await.map_err(Box::new)?;
        Ok(results.result)
    }
}

/// Local record of which physical Qdrant collection holds the live generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct Manifest {
    collection: String,
    physical: String,
    generation: u64,
    spec: VectorSpec,
    entries: usize,
}

/// Index stored in an external Qdrant engine.
///
/// Each build writes a fresh `{collection}_g{N}` physical collection and the
/// manifest is switched to it on persist, so searches never observe a
/// half-filled collection. Generation `N-1` is kept for snapshots still held
/// by readers; the next build drops it before writing `N+1`.
#[derive(Debug, Clone)]
pub struct QdrantIndex {
    ops: QdrantOps,
    manifest: Manifest,
}

impl QdrantIndex {
    pub(crate) async fn build(
        ops: QdrantOps,
        dir: &Path,
        collection: &str,
        spec: VectorSpec,
        entries: Vec<IndexEntry>,
    ) -> Result<Self, IndexError> {
        validate_entries(&spec, &entries)?;

        let live = read_manifest(dir).await?.map_or(0, |m| m.generation);
        let generation = live + 1;
        let physical = generation_name(collection, generation);

        // The generation before the live one, and any leftover from an
        // interrupted build.
        let mut stale = vec![physical.clone()];
        if live > 1 {
            stale.push(generation_name(collection, live - 1));
        }
        for name in &stale {
            if ops.collection_exists(name).await? {
                ops.delete_collection(name).await?;
                tracing::debug!(collection = %name, "dropped stale qdrant generation");
            }
        }
        ops.create_collection(&physical, spec.dimension as u64).await?;

        let count = entries.len();
        let mut points = Vec::with_capacity(UPSERT_BATCH);
        for entry in entries {
            points.push(to_point(entry)?);
            if points.len() == UPSERT_BATCH {
                ops.upsert(&physical, std::mem::take(&mut points)).await?;
            }
        }
        if !points.is_empty() {
            ops.upsert(&physical, points).await?;
        }

        tracing::info!(collection, physical = %physical, entries = count, "qdrant generation built");
        Ok(Self {
            ops,
            manifest: Manifest {
                collection: collection.to_owned(),
                physical,
                generation,
                spec,
                entries: count,
            },
        })
    }

    pub(crate) async fn stored_spec(dir: &Path) -> Result<Option<VectorSpec>, IndexError> {
        Ok(read_manifest(dir).await?.map(|m| m.spec))
    }

    pub(crate) async fn load(
        ops: QdrantOps,
        dir: &Path,
        expected: &VectorSpec,
    ) -> Result<Option<Self>, IndexError> {
        let Some(manifest) = read_manifest(dir).await? else {
            return Ok(None);
        };
        if &manifest.spec != expected {
            return Err(IndexError::Mismatch {
                expected: expected.clone(),
                found: manifest.spec,
            });
        }
        if !ops.collection_exists(&manifest.physical).await? {
            return Err(IndexError::Corrupt(format!(
                "manifest points at missing Qdrant collection '{}'",
                manifest.physical
            )));
        }
        Ok(Some(Self { ops, manifest }))
    }

    #[must_use]
    pub fn spec(&self) -> &VectorSpec {
        &self.manifest.spec
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.manifest.entries
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.manifest.entries == 0
    }

    /// Physical collection currently serving searches.
    #[must_use]
    pub fn physical_collection(&self) -> &str {
        &self.manifest.physical
    }

    pub(crate) async fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>, IndexError> {
        let points = self
            .ops
            .search(&self.manifest.physical, query.to_vec(), k as u64)
            .await?;
        let mut hits = points
            .into_iter()
            .map(|p| {
                Ok(SearchHit {
                    chunk: chunk_from_payload(&p.payload)?,
                    score: p.score,
                })
            })
            .collect::<Result<Vec<_>, IndexError>>()?;
        hits.sort_by(rank);
        Ok(hits)
    }

    /// Switch the manifest to this generation. The previous generation stays
    /// searchable.
    pub(crate) async fn persist(&self, dir: &Path) -> Result<(), IndexError> {
        let bytes = serde_json::to_vec_pretty(&self.manifest)?;
        write_atomic(&dir.join(MANIFEST_FILE), &bytes).await
    }
}

fn generation_name(collection: &str, generation: u64) -> String {
    format!("{collection}_g{generation}")
}

async fn read_manifest(dir: &Path) -> Result<Option<Manifest>, IndexError> {
    match tokio::fs::read(dir.join(MANIFEST_FILE)).await {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn point_id(chunk: &Chunk) -> String {
    uuid::Uuid::new_v5(&POINT_NAMESPACE, chunk.id.as_str().as_bytes()).to_string()
}

fn to_point(entry: IndexEntry) -> Result<PointStruct, IndexError> {
    let id = point_id(&entry.chunk);
    let payload: HashMap<String, qdrant_client::qdrant::Value> = serde_json::from_value(
        serde_json::json!({
            "chunk": serde_json::to_string(&entry.chunk)?,
            "source": entry.chunk.metadata.source,
            "sequence": entry.chunk.sequence,
        }),
    )?;
    Ok(PointStruct::new(id, entry.vector.values, payload))
}

fn chunk_from_payload(
    payload: &HashMap<String, qdrant_client::qdrant::Value>,
) -> Result<Chunk, IndexError> {
    match payload.get("chunk").and_then(|v| v.kind.as_ref()) {
        Some(Kind::StringValue(json)) => Ok(serde_json::from_str(json)?),
        _ => Err(IndexError::Corrupt("point payload missing chunk".into())),
    }
}
