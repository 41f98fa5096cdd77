//! Catalog Store - durable persistence of the catalog document
//!
//! ## Write discipline
//!
//! Every mutation is a full read-modify-write of the document under one
//! process-local lock. The new document is written to a sibling temp file,
//! synced, and renamed over the old one, so readers (which never take the
//! lock) see either the previous or the next document, never a torn one.
//!
//! Cross-process writers are not coordinated; run one writer process per
//! catalog document.

use chrono::Utc;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

use super::{Catalog, CatalogEntry};
use crate::{Error, Result};

/// Durable store for one catalog document.
#[derive(Debug)]
pub struct CatalogStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl CatalogStore {
    /// Create a store for the document at `path` (not touched until first use).
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Document path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the persisted catalog.
    ///
    /// A missing document yields a fresh empty catalog. Does not take the
    /// write lock.
    ///
    /// # Errors
    ///
    /// - [`Error::CorruptCatalog`] if the document exists but is not a valid catalog
    /// - [`Error::Io`] if it cannot be read
    pub fn load(&self) -> Result<Catalog> {
        match fs::read(&self.path) {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|cause| Error::CorruptCatalog {
                path: self.path.clone(),
                cause,
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Catalog::new()),
            Err(e) => Err(Error::Io(e)),
        }
    }

    /// Look up one entry in the persisted catalog.
    ///
    /// # Errors
    /// Same as [`load`](Self::load)
    pub fn get(&self, id: &str) -> Result<Option<CatalogEntry>> {
        Ok(self.load()?.get(id).cloned())
    }

    /// Persist the full catalog, replacing the document atomically.
    ///
    /// Statistics are recomputed and `last_updated` is stamped as part of
    /// the call.
    ///
    /// # Errors
    /// Returns error if the document cannot be written
    pub fn save(&self, catalog: &mut Catalog) -> Result<()> {
        let _guard = self.lock();
        self.persist(catalog)
    }

    /// Insert or replace an entry by id and persist the result.
    ///
    /// Returns the catalog as written.
    ///
    /// # Errors
    /// Returns error if the current document cannot be loaded or the new one
    /// cannot be written
    pub fn upsert(&self, entry: CatalogEntry) -> Result<Catalog> {
        let id = entry.id().to_string();
        let (catalog, replaced) = self.update(|catalog| catalog.upsert(entry).is_some())?;
        debug!(id = %id, replaced, "Catalog entry upserted");
        Ok(catalog)
    }

    /// Move the current document aside and persist an empty catalog.
    ///
    /// This is the explicit recovery path for [`Error::CorruptCatalog`]; the
    /// old document is renamed to `<name>.corrupt-<timestamp>` and kept.
    ///
    /// # Errors
    /// Returns error if the document cannot be renamed or the new one written
    pub fn reinitialize(&self) -> Result<Catalog> {
        let _guard = self.lock();
        if self.path.exists() {
            let aside = self.sibling(&format!("corrupt-{}", Utc::now().format("%Y%m%d_%H%M%S")));
            fs::rename(&self.path, &aside)?;
            warn!(
                "Catalog {} moved aside to {}",
                self.path.display(),
                aside.display()
            );
        }
        let mut catalog = Catalog::new();
        self.persist(&mut catalog)?;
        Ok(catalog)
    }

    /// Read-modify-write under the write lock.
    pub(crate) fn update<T, F>(&self, mutate: F) -> Result<(Catalog, T)>
    where
        F: FnOnce(&mut Catalog) -> T,
    {
        let _guard = self.lock();
        let mut catalog = self.load()?;
        let out = mutate(&mut catalog);
        self.persist(&mut catalog)?;
        Ok((catalog, out))
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        // Guards no data, so a panic in another writer leaves nothing torn
        self.write_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(std::ffi::OsStr::to_os_string)
            .unwrap_or_default();
        name.push(".");
        name.push(suffix);
        self.path.with_file_name(name)
    }

    /// Caller must hold the write lock.
    fn persist(&self, catalog: &mut Catalog) -> Result<()> {
        catalog.recompute_statistics();
        catalog.touch(Utc::now());
        let bytes = serde_json::to_vec_pretty(catalog)?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let tmp = self.sibling("tmp");
        let written = (|| -> std::io::Result<()> {
            let mut file = File::create(&tmp)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
            fs::rename(&tmp, &self.path)
        })();

        if let Err(e) = written {
            let _ = fs::remove_file(&tmp);
            return Err(Error::Io(e));
        }

        sync_parent_dir(&self.path);
        Ok(())
    }
}

/// Make the rename itself durable. Best effort: not every platform can open
/// a directory for syncing.
fn sync_parent_dir(path: &Path) {
    #[cfg(unix)]
    if let Some(parent) = path.parent() {
        if let Ok(dir) = File::open(parent) {
            let _ = dir.sync_all();
        }
    }
    #[cfg(not(unix))]
    let _ = path;
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> CatalogStore {
        CatalogStore::new(dir.path().join("metadata").join("catalog.json"))
    }

    #[test]
    fn test_load_missing_is_empty() {
        let dir = TempDir::new().unwrap();
        let catalog = store_in(&dir).load().unwrap();
        assert!(catalog.is_empty());
        assert_eq!(catalog.statistics().total_simulations(), 0);
        assert!(catalog.statistics().last_updated().is_none());
    }

    #[test]
    fn test_save_stamps_and_leaves_no_temp_file() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        let mut catalog = Catalog::new();
        store.save(&mut catalog).unwrap();

        assert!(catalog.statistics().last_updated().is_some());
        assert!(store.path().exists());
        assert!(!store.sibling("tmp").exists());
    }

    #[test]
    fn test_corrupt_document_is_reported() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        fs::write(store.path(), b"{\"simulations\": [").unwrap();

        let err = store.load().unwrap_err();
        assert!(matches!(err, Error::CorruptCatalog { .. }));

        // Upsert must refuse rather than overwrite
        let entry = CatalogEntry::builder("a", "/in/a.mat", "/lake/a.mat").build();
        assert!(store.upsert(entry).is_err());
        assert_eq!(fs::read(store.path()).unwrap(), b"{\"simulations\": [");
    }

    #[test]
    fn test_reinitialize_moves_document_aside() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        fs::write(store.path(), b"garbage").unwrap();

        let catalog = store.reinitialize().unwrap();
        assert!(catalog.is_empty());
        assert!(store.load().unwrap().is_empty());

        let aside: Vec<_> = fs::read_dir(store.path().parent().unwrap())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains(".corrupt-"))
            .collect();
        assert_eq!(aside.len(), 1);
        assert_eq!(fs::read(aside[0].path()).unwrap(), b"garbage");
    }

    #[test]
    fn test_get_after_upsert() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let entry = CatalogEntry::builder("a", "/in/a.mat", "/lake/a.mat")
            .size_bytes(7)
            .build();
        let id = entry.id().to_string();
        store.upsert(entry).unwrap();

        let found = store.get(&id).unwrap().unwrap();
        assert_eq!(found.id(), id);
        assert_eq!(found.size_bytes(), 7);
        assert!(store.get("missing").unwrap().is_none());
    }
}
