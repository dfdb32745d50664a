//! Persistence boundary for the lifecycle.
//!
//! The store hands out whole [`StoreDocument`] snapshots. `save` is guarded by
//! the document `version`: a snapshot can only be written back if nobody else
//! saved in between, which closes the read-modify-write race between two
//! handlers touching the same goal.

use crate::document::StoreDocument;
use crate::error::{CondoError, Result};
use crate::paths;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

/// How many times [`update`] reloads after a version conflict.
pub const MAX_UPDATE_ATTEMPTS: usize = 3;

pub trait Store: Send + Sync {
    fn load(&self) -> Result<StoreDocument>;

    /// Persist `doc` if its `version` matches the stored one. Returns the new
    /// version on success.
    fn save(&self, doc: &StoreDocument) -> Result<u64>;

    fn new_id(&self, prefix: &str) -> String {
        format!("{prefix}_{}", Uuid::new_v4().simple())
    }
}

/// Load, mutate and save, reloading on version conflicts.
///
/// `f` may run more than once and must only mutate the document it is given.
pub fn update<S, T, F>(store: &S, mut f: F) -> Result<T>
where
    S: Store + ?Sized,
    F: FnMut(&mut StoreDocument) -> Result<T>,
{
    let mut attempt = 1;
    loop {
        let mut doc = store.load()?;
        let out = f(&mut doc)?;
        match store.save(&doc) {
            Ok(_) => return Ok(out),
            Err(CondoError::VersionConflict { expected, found })
                if attempt < MAX_UPDATE_ATTEMPTS =>
            {
                tracing::debug!(expected, found, attempt, "store version conflict, reloading");
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ---------------------------------------------------------------------------
// JsonFileStore
// ---------------------------------------------------------------------------

/// Store backed by a single JSON file, written atomically.
pub struct JsonFileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Open the store of an initialized project root.
    pub fn open(root: &Path) -> Result<Self> {
        if !paths::condo_dir(root).is_dir() {
            return Err(CondoError::NotInitialized);
        }
        Ok(Self::new(paths::store_path(root)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<StoreDocument> {
        match crate::io::read_optional(&self.path)? {
            Some(data) => Ok(serde_json::from_str(&data)?),
            None => Ok(StoreDocument::default()),
        }
    }
}

impl Store for JsonFileStore {
    fn load(&self) -> Result<StoreDocument> {
        self.read()
    }

    fn save(&self, doc: &StoreDocument) -> Result<u64> {
        let _guard = lock(&self.write_lock);
        let current = self.read()?.version;
        if current != doc.version {
            return Err(CondoError::VersionConflict {
                expected: doc.version,
                found: current,
            });
        }
        let mut next = doc.clone();
        next.version = current + 1;
        let data = serde_json::to_string_pretty(&next)?;
        crate::io::atomic_write(&self.path, data.as_bytes())?;
        Ok(next.version)
    }
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// In-process store for tests and embedders that persist elsewhere.
#[derive(Default)]
pub struct MemoryStore {
    doc: Mutex<StoreDocument>,
}

impl MemoryStore {
    pub fn new(doc: StoreDocument) -> Self {
        Self {
            doc: Mutex::new(doc),
        }
    }
}

impl Store for MemoryStore {
    fn load(&self) -> Result<StoreDocument> {
        Ok(lock(&self.doc).clone())
    }

    fn save(&self, doc: &StoreDocument) -> Result<u64> {
        let mut current = lock(&self.doc);
        if current.version != doc.version {
            return Err(CondoError::VersionConflict {
                expected: doc.version,
                found: current.version,
            });
        }
        let mut next = doc.clone();
        next.version += 1;
        *current = next;
        Ok(current.version)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condo::Condo;
    use tempfile::TempDir;

    #[test]
    fn file_store_round_trips_and_bumps_version() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path().join("store.json"));

        let mut doc = store.load().unwrap();
        assert_eq!(doc.version, 0);
        doc.condos.push(Condo::new("c1", "Website", 1));
        assert_eq!(store.save(&doc).unwrap(), 1);

        let loaded = store.load().unwrap();
        assert_eq!(loaded.version, 1);
        assert_eq!(loaded.condos[0].name, "Website");
    }

    #[test]
    fn stale_snapshot_is_rejected() {
        let store = MemoryStore::default();
        let first = store.load().unwrap();
        let second = store.load().unwrap();
        store.save(&first).unwrap();

        let err = store.save(&second).unwrap_err();
        assert!(matches!(
            err,
            CondoError::VersionConflict {
                expected: 0,
                found: 1
            }
        ));
    }

    #[test]
    fn update_reloads_after_conflict() {
        let store = MemoryStore::default();
        let mut interfered = false;
        let n = update(&store, |doc| {
            if !interfered {
                // Another writer lands between our load and save.
                interfered = true;
                let mut other = store.load()?;
                other.condos.push(Condo::new("other", "Other", 0));
                store.save(&other)?;
            }
            doc.condos.push(Condo::new("mine", "Mine", 0));
            Ok(doc.condos.len())
        })
        .unwrap();

        assert_eq!(n, 2);
        let doc = store.load().unwrap();
        assert_eq!(doc.version, 2);
        assert_eq!(doc.condos.len(), 2);
    }

    #[test]
    fn open_requires_initialized_root() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            JsonFileStore::open(dir.path()),
            Err(CondoError::NotInitialized)
        ));
        std::fs::create_dir_all(dir.path().join(".condo")).unwrap();
        let store = JsonFileStore::open(dir.path()).unwrap();
        assert!(store.path().ends_with(".condo/store.json"));
    }

    #[test]
    fn new_id_uses_prefix() {
        let store = MemoryStore::default();
        let a = store.new_id("goal");
        let b = store.new_id("goal");
        assert!(a.starts_with("goal_"));
        assert_ne!(a, b);
    }
}
