// Vector index module
// Process-wide flat index over log entry embeddings, persisted next to the database

pub mod flat;
pub mod persistence;


use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, info, warn};

pub use flat::{FlatIndex, IndexState, SearchHit};

use crate::IndexError;
use crate::config::Config;
use crate::database::LogEntryId;
use crate::embeddings::EmbeddingVector;

/// Result of an add followed by a persist. The in-memory add stands even
/// when persisting failed.
#[derive(Debug)]
pub struct AddReport {
    pub added: usize,
    pub persist_error: Option<IndexError>,
}

impl AddReport {
    #[inline]
    pub fn persisted(&self) -> bool {
        self.persist_error.is_none()
    }
}

/// Owns the flat index and its id map as one unit.
///
/// Searches share a read lock. Every mutation takes the writer gate first, so
/// an add and the persist that follows it run as one unit with no other
/// mutation in between; the write lock itself is only held while the
/// in-memory index changes.
///
/// The store is dirty while memory holds changes that are not on disk yet.
#[derive(Debug)]
pub struct VectorIndexStore {
    index_path: PathBuf,
    id_map_path: PathBuf,
    index: RwLock<FlatIndex>,
    writer: Mutex<()>,
    dirty: AtomicBool,
}

impl VectorIndexStore {
    /// An empty store; call [`initialize`](Self::initialize) to load from disk
    #[inline]
    pub fn new<P: Into<PathBuf>, Q: Into<PathBuf>>(index_path: P, id_map_path: Q) -> Self {
        Self {
            index_path: index_path.into(),
            id_map_path: id_map_path.into(),
            index: RwLock::new(FlatIndex::new()),
            writer: Mutex::new(()),
            dirty: AtomicBool::new(false),
        }
    }

    #[inline]
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.index_path(), config.id_map_path())
    }

    #[inline]
    pub fn index_path(&self) -> &Path {
        &self.index_path
    }

    #[inline]
    pub fn id_map_path(&self) -> &Path {
        &self.id_map_path
    }

    /// (Re)load the persisted artifacts, replacing the in-memory index.
    ///
    /// Missing or unreadable artifacts give an empty index. Inconsistent ones
    /// give `IndexCorrupt` and also leave the store empty. Returns the number
    /// of vectors loaded.
    pub fn initialize(&self) -> Result<usize, IndexError> {
        let _gate = self.gate()?;

        let (loaded, result) = match persistence::load(&self.index_path, &self.id_map_path) {
            Ok(Some(index)) => {
                let count = index.len();
                info!(
                    "Loaded vector index with {} entries from {}",
                    count,
                    self.index_path.display()
                );
                (index, Ok(count))
            }
            Ok(None) => {
                info!("No usable vector index on disk, starting empty");
                (FlatIndex::new(), Ok(0))
            }
            Err(e) => {
                warn!("Persisted vector index is corrupt, starting empty: {}", e);
                (FlatIndex::new(), Err(e))
            }
        };

        *self.write()? = loaded;
        self.dirty.store(false, Ordering::SeqCst);
        result
    }

    /// Append entries without persisting
    pub fn add(&self, entries: Vec<(LogEntryId, EmbeddingVector)>) -> Result<usize, IndexError> {
        let _gate = self.gate()?;
        self.add_locked(entries)
    }

    /// Append entries and persist the result as one mutation.
    ///
    /// A rejected add is an error and nothing is written. A failed persist is
    /// reported in the [`AddReport`]. When nothing is added and nothing was
    /// pending, the artifacts are left alone.
    pub fn add_and_persist(
        &self,
        entries: Vec<(LogEntryId, EmbeddingVector)>,
    ) -> Result<AddReport, IndexError> {
        let _gate = self.gate()?;
        let added = self.add_locked(entries)?;

        let persist_error = if self.is_dirty() {
            self.persist_locked().err()
        } else {
            None
        };
        if let Some(e) = &persist_error {
            warn!("Index updated in memory but not persisted: {}", e);
        }

        Ok(AddReport {
            added,
            persist_error,
        })
    }

    /// Up to `k` nearest entries by inner product, best first
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>, IndexError> {
        self.read()?.search(query, k)
    }

    /// Write both artifacts to disk
    pub fn persist(&self) -> Result<(), IndexError> {
        let _gate = self.gate()?;
        self.persist_locked()
    }

    /// Persist only if memory changed since the last load or persist.
    ///
    /// Artifacts that were skipped or rejected on load stay untouched on disk
    /// until the index is actually modified. Returns whether anything was written.
    pub fn persist_if_dirty(&self) -> Result<bool, IndexError> {
        let _gate = self.gate()?;
        if !self.is_dirty() {
            return Ok(false);
        }
        self.persist_locked()?;
        Ok(true)
    }

    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    /// Drop the given ids from memory; persist separately
    pub fn remove(&self, log_ids: &[LogEntryId]) -> Result<usize, IndexError> {
        let _gate = self.gate()?;
        let removed = self.write()?.remove(log_ids);
        if removed > 0 {
            self.dirty.store(true, Ordering::SeqCst);
        }
        debug!("Removed {} vectors from index", removed);
        Ok(removed)
    }

    /// Swap in a freshly built index and persist it
    pub fn replace(&self, index: FlatIndex) -> Result<(), IndexError> {
        let _gate = self.gate()?;
        let count = index.len();
        *self.write()? = index;
        self.dirty.store(true, Ordering::SeqCst);
        info!("Replaced vector index with {} entries", count);
        self.persist_locked()
    }

    #[inline]
    pub fn len(&self) -> Result<usize, IndexError> {
        Ok(self.read()?.len())
    }

    #[inline]
    pub fn is_empty(&self) -> Result<bool, IndexError> {
        Ok(self.read()?.is_empty())
    }

    #[inline]
    pub fn state(&self) -> Result<IndexState, IndexError> {
        Ok(self.read()?.state())
    }

    #[inline]
    pub fn dimension(&self) -> Result<Option<usize>, IndexError> {
        Ok(self.read()?.dimension())
    }

    #[inline]
    pub fn contains(&self, log_id: &str) -> Result<bool, IndexError> {
        Ok(self.read()?.contains(log_id))
    }

    #[inline]
    pub fn position_of(&self, log_id: &str) -> Result<Option<usize>, IndexError> {
        Ok(self.read()?.position_of(log_id))
    }

    /// Indexed ids in position order
    #[inline]
    pub fn ids(&self) -> Result<Vec<LogEntryId>, IndexError> {
        Ok(self.read()?.ids().to_vec())
    }

    fn add_locked(&self, entries: Vec<(LogEntryId, EmbeddingVector)>) -> Result<usize, IndexError> {
        let requested = entries.len();
        let added = self.write()?.add(entries)?;
        if added > 0 {
            self.dirty.store(true, Ordering::SeqCst);
        }
        if added < requested {
            debug!(
                "Skipped {} already indexed entries",
                requested - added
            );
        }
        debug!("Added {} vectors to index", added);
        Ok(added)
    }

    fn persist_locked(&self) -> Result<(), IndexError> {
        let encoded = {
            let index = self.read()?;
            persistence::encode(&index)?
        };
        persistence::write(&encoded, &self.index_path, &self.id_map_path)?;
        self.dirty.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn gate(&self) -> Result<MutexGuard<'_, ()>, IndexError> {
        self.writer.lock().map_err(|_| IndexError::LockPoisoned)
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, FlatIndex>, IndexError> {
        self.index.read().map_err(|_| IndexError::LockPoisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, FlatIndex>, IndexError> {
        self.index.write().map_err(|_| IndexError::LockPoisoned)
    }
}
