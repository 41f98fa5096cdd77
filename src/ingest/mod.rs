//! Ingestion Organizer - places artifacts into the partitioned store
//!
//! ## Algorithm
//!
//! ```text
//! source ──copy──> {tier}/{YYYY-MM-DD}/{name}_{YYYYMMDD_HHMMSS}{ext}
//!                          │
//!                          └──> CatalogStore::upsert (only after the copy succeeded)
//! ```
//!
//! The source is never modified. The catalog lock is only taken for the
//! final upsert; the copy happens before it.

mod registry;

pub use registry::IngestRegistry;

use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use std::fs::{self, File, FileTimes, OpenOptions};
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::catalog::{partition_key, simulation_id, ArtifactKind, CatalogEntry, CatalogStore};
use crate::layout::LakeLayout;
use crate::{Error, Result};

/// Outcome of a successful ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestReceipt {
    /// Catalog id assigned to the artifact
    pub simulation_id: String,
    /// Location of the stored copy
    pub stored_path: PathBuf,
    /// The entry as registered
    #[serde(skip)]
    pub entry: CatalogEntry,
}

/// Ingestion counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IngestStats {
    /// Successful ingestions
    pub files_ingested: u64,
    /// Failed ingestions
    pub ingest_errors: u64,
    /// Time of the last successful ingestion
    pub last_ingested: Option<DateTime<Utc>>,
}

/// Copies artifacts into the lake and registers them in the catalog.
#[derive(Debug)]
pub struct IngestionOrganizer {
    layout: LakeLayout,
    store: Arc<CatalogStore>,
    registry: IngestRegistry,
    files_ingested: AtomicU64,
    ingest_errors: AtomicU64,
    /// Millis since epoch; `i64::MIN` means never
    last_ingested_ms: AtomicI64,
}

impl IngestionOrganizer {
    /// Create an organizer writing below `layout` and registering in `store`.
    #[must_use]
    pub fn new(layout: LakeLayout, store: Arc<CatalogStore>, registry: IngestRegistry) -> Self {
        Self {
            layout,
            store,
            registry,
            files_ingested: AtomicU64::new(0),
            ingest_errors: AtomicU64::new(0),
            last_ingested_ms: AtomicI64::new(i64::MIN),
        }
    }

    /// Ingest one artifact.
    ///
    /// # Arguments
    ///
    /// * `source` - Artifact to copy; must exist and be non-empty
    /// * `logical_name` - Simulation name; defaults to the source file stem
    ///
    /// # Errors
    ///
    /// - [`Error::SourceNotFound`] / [`Error::EmptySource`] for a bad source
    /// - [`Error::InvalidInput`] for an unusable name
    /// - [`Error::ArtifactExists`] if the same name was ingested within the same second
    /// - [`Error::CopyFailed`] if the copy cannot complete; the catalog is untouched
    /// - Catalog errors from the final upsert (the copy is removed again)
    pub fn organize(&self, source: &Path, logical_name: Option<&str>) -> Result<IngestReceipt> {
        let result = self.organize_at(source, logical_name, Utc::now());
        match &result {
            Ok(receipt) => {
                self.files_ingested.fetch_add(1, Ordering::Relaxed);
                self.last_ingested_ms
                    .store(receipt.entry.created_at().timestamp_millis(), Ordering::Relaxed);
            }
            Err(e) => {
                self.ingest_errors.fetch_add(1, Ordering::Relaxed);
                warn!("Failed to ingest {}: {e}", source.display());
            }
        }
        result
    }

    /// Ingest an artifact unless this source was already claimed.
    ///
    /// Returns `Ok(None)` for a duplicate. A failed ingestion releases the
    /// claim so the source can be retried.
    ///
    /// # Errors
    /// Same as [`organize`](Self::organize)
    pub fn organize_new(
        &self,
        source: &Path,
        logical_name: Option<&str>,
    ) -> Result<Option<IngestReceipt>> {
        let key = fs::canonicalize(source).unwrap_or_else(|_| source.to_path_buf());
        if !self.registry.try_claim(&key) {
            debug!("Skipping already ingested {}", source.display());
            return Ok(None);
        }
        match self.organize(source, logical_name) {
            Ok(receipt) => Ok(Some(receipt)),
            Err(e) => {
                self.registry.release(&key);
                Err(e)
            }
        }
    }

    /// Ingestion counters since this organizer was created.
    #[must_use]
    pub fn stats(&self) -> IngestStats {
        let last_ms = self.last_ingested_ms.load(Ordering::Relaxed);
        IngestStats {
            files_ingested: self.files_ingested.load(Ordering::Relaxed),
            ingest_errors: self.ingest_errors.load(Ordering::Relaxed),
            last_ingested: if last_ms == i64::MIN {
                None
            } else {
                Utc.timestamp_millis_opt(last_ms).single()
            },
        }
    }

    /// The dedup registry.
    #[must_use]
    pub const fn registry(&self) -> &IngestRegistry {
        &self.registry
    }

    pub(crate) fn organize_at(
        &self,
        source: &Path,
        logical_name: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<IngestReceipt> {
        let metadata = fs::metadata(source).map_err(|e| match e.kind() {
            ErrorKind::NotFound => Error::SourceNotFound(source.to_path_buf()),
            _ => Error::Io(e),
        })?;
        if !metadata.is_file() {
            return Err(Error::InvalidInput(format!(
                "Source is not a regular file: {}",
                source.display()
            )));
        }
        if metadata.len() == 0 {
            return Err(Error::EmptySource(source.to_path_buf()));
        }

        let logical_name = resolve_name(source, logical_name)?;
        let kind = ArtifactKind::from_path(source);
        let id = simulation_id(&logical_name, now);
        let file_name = match source.extension().and_then(|ext| ext.to_str()) {
            Some(ext) => format!("{id}.{ext}"),
            None => id.clone(),
        };

        let target_dir = self.layout.partition_dir(kind, &partition_key(now));
        let target = target_dir.join(file_name);

        fs::create_dir_all(&target_dir).map_err(|cause| Error::CopyFailed {
            from: source.to_path_buf(),
            to: target.clone(),
            cause,
        })?;

        match copy_preserving_times(source, &target) {
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(Error::ArtifactExists(id));
            }
            Err(cause) => {
                return Err(Error::CopyFailed {
                    from: source.to_path_buf(),
                    to: target,
                    cause,
                });
            }
        }

        let entry = match self.register(logical_name, source, &target, now) {
            Ok(entry) => entry,
            Err(e) => {
                let _ = fs::remove_file(&target);
                return Err(e);
            }
        };

        info!("Organized {} -> {}", source.display(), target.display());

        Ok(IngestReceipt {
            simulation_id: id,
            stored_path: target,
            entry,
        })
    }

    /// Record a stored copy in the catalog. The caller removes the copy on error.
    fn register(
        &self,
        logical_name: String,
        source: &Path,
        target: &Path,
        now: DateTime<Utc>,
    ) -> Result<CatalogEntry> {
        // Size of what is actually stored, not of the source
        let size_bytes = fs::metadata(target)?.len();

        let entry = CatalogEntry::builder(logical_name, source, target)
            .created_at(now)
            .size_bytes(size_bytes)
            .build();
        self.store.upsert(entry.clone())?;
        Ok(entry)
    }
}

fn resolve_name(source: &Path, logical_name: Option<&str>) -> Result<String> {
    let name = match logical_name {
        Some(name) => name.trim().to_string(),
        None => source
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or_default()
            .to_string(),
    };
    if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
        return Err(Error::InvalidInput(format!(
            "Unusable simulation name {name:?} for {}",
            source.display()
        )));
    }
    Ok(name)
}

/// Copy into a file that must not exist yet, carrying over permissions and
/// access/modification times. A partial destination is removed on failure.
fn copy_preserving_times(from: &Path, to: &Path) -> io::Result<u64> {
    let mut src = File::open(from)?;
    let metadata = src.metadata()?;
    let mut dst = OpenOptions::new().write(true).create_new(true).open(to)?;

    let copied = (|| -> io::Result<u64> {
        let copied = io::copy(&mut src, &mut dst)?;
        let mut times = FileTimes::new();
        if let Ok(modified) = metadata.modified() {
            times = times.set_modified(modified);
        }
        if let Ok(accessed) = metadata.accessed() {
            times = times.set_accessed(accessed);
        }
        dst.set_times(times)?;
        dst.set_permissions(metadata.permissions())?;
        dst.sync_all()?;
        Ok(copied)
    })();

    if copied.is_err() {
        drop(dst);
        let _ = fs::remove_file(to);
    }
    copied
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn organizer(root: &Path) -> IngestionOrganizer {
        let layout = LakeLayout::create(root).unwrap();
        let store = Arc::new(CatalogStore::new(layout.catalog_path()));
        IngestionOrganizer::new(layout, store, IngestRegistry::new(16))
    }

    fn write_source(dir: &Path, name: &str, body: &[u8]) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_resolve_name_defaults_to_stem() {
        assert_eq!(resolve_name(Path::new("/in/pump.mat"), None).unwrap(), "pump");
        assert_eq!(resolve_name(Path::new("/in/pump.mat"), Some("p1")).unwrap(), "p1");
        assert!(resolve_name(Path::new("/in/pump.mat"), Some("a/b")).is_err());
        assert!(resolve_name(Path::new("/in/pump.mat"), Some("  ")).is_err());
    }

    #[test]
    fn test_organize_raw_into_partition() {
        let tmp = TempDir::new().unwrap();
        let org = organizer(&tmp.path().join("lake"));
        let src = write_source(tmp.path(), "pump.mat", b"MATLAB 5.0");
        let now = Utc.with_ymd_and_hms(2024, 1, 15, 14, 30, 5).unwrap();

        let receipt = org.organize_at(&src, None, now).unwrap();

        assert_eq!(receipt.simulation_id, "pump_20240115_143005");
        assert!(receipt
            .stored_path
            .ends_with("raw/2024-01-15/pump_20240115_143005.mat"));
        assert!(receipt.stored_path.exists());
        assert!(src.exists(), "source must be left in place");
        assert_eq!(receipt.entry.size_bytes(), 10);
        assert_eq!(receipt.entry.artifact_kind(), ArtifactKind::Raw);
    }

    #[test]
    fn test_organize_table_into_processed_tier() {
        let tmp = TempDir::new().unwrap();
        let org = organizer(&tmp.path().join("lake"));
        let src = write_source(tmp.path(), "run.csv", b"time,x\n0,1\n");
        let now = Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap();

        let receipt = org.organize_at(&src, Some("run1"), now).unwrap();
        assert!(receipt
            .stored_path
            .ends_with("processed/2024-01-15/run1_20240115_000000.csv"));
        assert_eq!(receipt.entry.artifact_kind(), ArtifactKind::Processed);
    }

    #[test]
    fn test_same_second_collision_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let org = organizer(&tmp.path().join("lake"));
        let src = write_source(tmp.path(), "pump.mat", b"x");
        let now = Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap();

        org.organize_at(&src, None, now).unwrap();
        let err = org.organize_at(&src, None, now).unwrap_err();
        assert!(matches!(err, Error::ArtifactExists(_)));
    }

    #[test]
    fn test_unrecorded_copy_is_removed() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("lake");
        let org = organizer(&root);
        fs::write(org.layout.catalog_path(), b"{ truncated").unwrap();
        let src = write_source(tmp.path(), "pump.mat", b"x");
        let now = Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap();

        let err = org.organize_at(&src, None, now).unwrap_err();
        assert!(matches!(err, Error::CorruptCatalog { .. }));

        let partition = org.layout.partition_dir(ArtifactKind::Raw, "2024-01-15");
        assert!(!partition.join("pump_20240115_000000.mat").exists());
        assert!(src.exists());
    }

    #[test]
    fn test_missing_and_empty_sources() {
        let tmp = TempDir::new().unwrap();
        let org = organizer(&tmp.path().join("lake"));

        let err = org.organize(&tmp.path().join("nope.mat"), None).unwrap_err();
        assert!(matches!(err, Error::SourceNotFound(_)));

        let empty = write_source(tmp.path(), "empty.mat", b"");
        let err = org.organize(&empty, None).unwrap_err();
        assert!(matches!(err, Error::EmptySource(_)));

        let stats = org.stats();
        assert_eq!(stats.ingest_errors, 2);
        assert_eq!(stats.files_ingested, 0);
        assert!(stats.last_ingested.is_none());
    }

    #[test]
    fn test_organize_new_dedups() {
        let tmp = TempDir::new().unwrap();
        let org = organizer(&tmp.path().join("lake"));
        let src = write_source(tmp.path(), "pump.mat", b"x");

        assert!(org.organize_new(&src, None).unwrap().is_some());
        assert!(org.organize_new(&src, None).unwrap().is_none());
        assert_eq!(org.registry().len(), 1);
        assert_eq!(org.stats().files_ingested, 1);
        assert!(org.stats().last_ingested.is_some());
    }

    #[test]
    fn test_failed_ingest_releases_claim() {
        let tmp = TempDir::new().unwrap();
        let org = organizer(&tmp.path().join("lake"));
        let src = write_source(tmp.path(), "late.mat", b"");

        assert!(org.organize_new(&src, None).is_err());
        fs::write(&src, b"now written").unwrap();
        assert!(org.organize_new(&src, None).unwrap().is_some());
    }
}
