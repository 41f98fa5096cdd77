//! Lifecycle Manager - moves aged artifacts into the archive tier
//!
//! ## Sweep
//!
//! 1. Snapshot the catalog (no lock)
//! 2. For every active entry older than the cutoff, move
//!    `stored_path` to `archive/{year(created_at)}/{basename}`
//! 3. Record all successful moves with one catalog update
//!
//! Physical moves happen outside the catalog lock. A per-entry failure is
//! logged and skipped; the sweep continues. Sweeps are serialized with each
//! other and can be interrupted between entries.

use chrono::{DateTime, Datelike, Duration, Utc};
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};

use crate::catalog::{CatalogEntry, CatalogStore};
use crate::layout::LakeLayout;
use crate::{Error, Result};

/// One entry the sweep had to skip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SweepFailure {
    /// Catalog id
    pub id: String,
    /// Why it was skipped
    pub reason: String,
}

/// Outcome of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Ids archived by this sweep
    pub archived: Vec<String>,
    /// Entries that were due but could not be moved
    pub failures: Vec<SweepFailure>,
    /// The sweep stopped early on request
    pub interrupted: bool,
}

impl SweepReport {
    /// Number of entries newly archived.
    #[must_use]
    pub fn archived_count(&self) -> usize {
        self.archived.len()
    }
}

struct PlannedMove {
    id: String,
    from: PathBuf,
    to: PathBuf,
}

/// Relocates aged entries from the active tiers into the archive tier.
#[derive(Debug)]
pub struct LifecycleManager {
    layout: LakeLayout,
    store: Arc<CatalogStore>,
    sweep_lock: Mutex<()>,
}

impl LifecycleManager {
    /// Create a manager for the given layout and catalog.
    #[must_use]
    pub fn new(layout: LakeLayout, store: Arc<CatalogStore>) -> Self {
        Self {
            layout,
            store,
            sweep_lock: Mutex::new(()),
        }
    }

    /// Archive every active entry created more than `max_age_days` ago.
    ///
    /// Re-running is safe: archived entries are skipped.
    ///
    /// # Errors
    ///
    /// - [`Error::CorruptCatalog`] if the catalog cannot be read
    /// - Catalog write errors; moves already made are rolled back first
    pub fn sweep(&self, max_age_days: u32) -> Result<SweepReport> {
        self.sweep_at(Utc::now(), max_age_days, &AtomicBool::new(false))
    }

    /// Like [`sweep`](Self::sweep), checking `stop` before each entry.
    ///
    /// Entries moved before the stop was observed are still recorded.
    ///
    /// # Errors
    /// Same as [`sweep`](Self::sweep)
    pub fn sweep_until(&self, max_age_days: u32, stop: &AtomicBool) -> Result<SweepReport> {
        self.sweep_at(Utc::now(), max_age_days, stop)
    }

    pub(crate) fn sweep_at(
        &self,
        now: DateTime<Utc>,
        max_age_days: u32,
        stop: &AtomicBool,
    ) -> Result<SweepReport> {
        let _sweep = self
            .sweep_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let cutoff = now - Duration::days(i64::from(max_age_days));
        let catalog = self.store.load()?;

        let mut due: Vec<&CatalogEntry> = catalog
            .entries()
            .filter(|entry| !entry.is_archived() && entry.created_at() < cutoff)
            .collect();
        due.sort_by_key(|entry| entry.created_at());

        let mut report = SweepReport::default();
        let mut moved = Vec::with_capacity(due.len());

        for entry in due {
            if stop.load(Ordering::Relaxed) {
                report.interrupted = true;
                info!("Archive sweep interrupted after {} moves", moved.len());
                break;
            }

            let planned = self.plan(entry);
            match move_file(&planned.from, &planned.to) {
                Ok(()) => {
                    debug!(
                        "Archived {} -> {}",
                        planned.from.display(),
                        planned.to.display()
                    );
                    moved.push(planned);
                }
                Err(e) => {
                    warn!("Skipping archive of {}: {e}", planned.id);
                    report.failures.push(SweepFailure {
                        id: planned.id,
                        reason: e.to_string(),
                    });
                }
            }
        }

        if moved.is_empty() {
            return Ok(report);
        }

        let recorded = self.store.update(|catalog| {
            moved
                .iter()
                .filter_map(|planned| {
                    let entry = catalog.entry_mut(&planned.id)?;
                    if entry.is_archived() {
                        return None;
                    }
                    entry.mark_archived(planned.to.clone());
                    Some(planned.id.clone())
                })
                .collect::<Vec<_>>()
        });

        match recorded {
            Ok((_, archived)) => {
                info!("Archived {} simulations", archived.len());
                report.archived = archived;
                Ok(report)
            }
            Err(e) => {
                for planned in moved.iter().rev() {
                    if let Err(undo) = move_file(&planned.to, &planned.from) {
                        warn!("Could not restore {}: {undo}", planned.from.display());
                    }
                }
                Err(e)
            }
        }
    }

    fn plan(&self, entry: &CatalogEntry) -> PlannedMove {
        let from = entry.stored_path().to_path_buf();
        let file_name = from
            .file_name()
            .map_or_else(|| entry.id().into(), std::ffi::OsStr::to_os_string);
        let to = self
            .layout
            .archive_year_dir(entry.created_at().year())
            .join(file_name);
        PlannedMove {
            id: entry.id().to_string(),
            from,
            to,
        }
    }
}

/// Rename, falling back to copy + remove across filesystems. Refuses to
/// replace an existing destination.
fn move_file(from: &Path, to: &Path) -> Result<()> {
    let failed = |cause: io::Error| Error::MoveFailed {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        cause,
    };

    if !from.is_file() {
        return Err(failed(io::Error::new(
            io::ErrorKind::NotFound,
            "source file is missing",
        )));
    }
    if to.exists() {
        return Err(failed(io::Error::new(
            io::ErrorKind::AlreadyExists,
            "destination already exists",
        )));
    }
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent).map_err(failed)?;
    }

    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(rename_err) => {
            if fs::copy(from, to).is_err() {
                let _ = fs::remove_file(to);
                return Err(failed(rename_err));
            }
            fs::remove_file(from).map_err(|e| {
                let _ = fs::remove_file(to);
                failed(e)
            })
        }
    }
}
