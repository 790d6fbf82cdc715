use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tokio::sync::OwnedMutexGuard;

use super::{IndexBackend, IndexEntry, VectorIndex};
use crate::error::{IndexError, VectorSpec};

#[derive(Debug, Default)]
struct Slot {
    live: RwLock<Option<Arc<VectorIndex>>>,
    build: Arc<tokio::sync::Mutex<()>>,
}

impl Slot {
    fn current(&self) -> Option<Arc<VectorIndex>> {
        self.live
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn install(&self, index: Arc<VectorIndex>) {
        *self.live.write().unwrap_or_else(PoisonError::into_inner) = Some(index);
    }

    /// Install `index` only if nothing is live yet; returns whichever index is
    /// live afterwards.
    fn install_if_empty(&self, index: Arc<VectorIndex>) -> Arc<VectorIndex> {
        let mut live = self.live.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(live.get_or_insert(index))
    }
}

/// Owns the live index of every named collection.
///
/// At most one build runs per collection: a second [`IndexManager::begin_build`]
/// for the same collection fails fast with `BuildInProgress`. Searches take a
/// snapshot of the live index and never wait on a build; the new index replaces
/// the old one in a single swap once it has been persisted.
#[derive(Debug)]
pub struct IndexManager {
    backend: IndexBackend,
    slots: Mutex<HashMap<String, Arc<Slot>>>,
}

/// Exclusive right to rebuild one collection, held from before embedding
/// until [`BuildGuard::commit`].
#[derive(Debug)]
pub struct BuildGuard {
    collection: String,
    backend: IndexBackend,
    slot: Arc<Slot>,
    _lock: OwnedMutexGuard<()>,
}

impl IndexManager {
    #[must_use]
    pub fn new(backend: IndexBackend) -> Self {
        Self {
            backend,
            slots: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn backend(&self) -> &IndexBackend {
        &self.backend
    }

    fn slot(&self, collection: &str) -> Arc<Slot> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(slots.entry(collection.to_owned()).or_default())
    }

    /// Snapshot of the live index, if one has been built or loaded.
    #[must_use]
    pub fn current(&self, collection: &str) -> Option<Arc<VectorIndex>> {
        self.slot(collection).current()
    }

    /// Reserve the build slot of `collection`.
    ///
    /// # Errors
    ///
    /// Returns `BuildInProgress` if another build holds the slot.
    pub fn begin_build(&self, collection: &str) -> Result<BuildGuard, IndexError> {
        let slot = self.slot(collection);
        let lock = Arc::clone(&slot.build)
            .try_lock_owned()
            .map_err(|_| IndexError::BuildInProgress(collection.to_owned()))?;
        tracing::debug!(collection, "index build slot acquired");
        Ok(BuildGuard {
            collection: collection.to_owned(),
            backend: self.backend.clone(),
            slot,
            _lock: lock,
        })
    }

    /// Build, persist and install an index in one step.
    ///
    /// # Errors
    ///
    /// Returns `BuildInProgress` if a build is running, or the build error.
    pub async fn build(
        &self,
        collection: &str,
        spec: VectorSpec,
        entries: Vec<IndexEntry>,
    ) -> Result<Arc<VectorIndex>, IndexError> {
        self.begin_build(collection)?.commit(spec, entries).await
    }

    /// Load the persisted index of `collection` into memory, unless one is
    /// already live. `Ok(None)` if nothing was persisted. An index committed
    /// while the disk read was in flight wins over the one read.
    ///
    /// # Errors
    ///
    /// Returns `Mismatch` if the persisted index was built with another
    /// embedding model or dimension.
    pub async fn load(
        &self,
        collection: &str,
        expected: &VectorSpec,
    ) -> Result<Option<Arc<VectorIndex>>, IndexError> {
        let slot = self.slot(collection);
        if let Some(live) = slot.current() {
            live.ensure_compatible(expected)?;
            return Ok(Some(live));
        }
        let Some(index) = self.backend.load(collection, expected).await? else {
            return Ok(None);
        };
        let index = slot.install_if_empty(Arc::new(index));
        index.ensure_compatible(expected)?;
        tracing::info!(collection, entries = index.len(), "index loaded");
        Ok(Some(index))
    }
}

impl BuildGuard {
    #[must_use]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Build from `entries`, persist, then atomically replace the live index.
    /// If this future is dropped before it completes, the previous index stays
    /// live and persisted.
    ///
    /// # Errors
    ///
    /// Returns an error if entries are inconsistent or the backend fails.
    pub async fn commit(
        self,
        spec: VectorSpec,
        entries: Vec<IndexEntry>,
    ) -> Result<Arc<VectorIndex>, IndexError> {
        let count = entries.len();
        let index = self.backend.build(&self.collection, spec, entries).await?;
        index
            .persist(&self.backend.collection_dir(&self.collection))
            .await?;
        let index = Arc::new(index);
        self.slot.install(Arc::clone(&index));
        tracing::info!(collection = %self.collection, entries = count, "index built");
        Ok(index)
    }
}
