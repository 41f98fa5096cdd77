//! Resolve a catalog entry to its tabular data file
//!
//! Order, first match wins:
//!
//! 1. The entry's current file (archive copy once archived), if it is a table
//! 2. A table with the same stem next to it in the processed tier
//!    (`processed/{partition}/` then `processed/`)
//! 3. A scan of the processed tier, preferring an exact stem match on the id,
//!    then names containing the id, then `{name}_*` stems, then any name
//!    containing the logical name
//!
//! Step 3 is permissive: a logical name that is a substring of another
//! (`run1` / `run10`) can match the wrong file. Candidates are ordered so
//! the outcome is deterministic and an ambiguous pick is logged.

use std::path::PathBuf;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::catalog::{ArtifactKind, CatalogEntry};
use crate::layout::{is_table_path, LakeLayout, TABLE_EXTENSIONS};
use crate::{Error, Result};

/// Maps catalog entries to table files.
#[derive(Debug, Clone)]
pub struct TableResolver {
    layout: LakeLayout,
}

impl TableResolver {
    /// Create a resolver over the lake's processed tier.
    #[must_use]
    pub const fn new(layout: LakeLayout) -> Self {
        Self { layout }
    }

    /// Find the table for `entry`.
    ///
    /// # Errors
    ///
    /// - [`Error::DataFileMissing`] if the entry is itself a table whose file
    ///   is gone and no fallback exists
    /// - [`Error::TableNotFound`] if nothing matches
    pub fn resolve(&self, entry: &CatalogEntry) -> Result<PathBuf> {
        let current = entry.current_path();
        if is_table_path(current) && current.is_file() {
            return Ok(current.to_path_buf());
        }

        if let Some(sibling) = self.sibling(entry) {
            debug!("Resolved {} to sibling {}", entry.id(), sibling.display());
            return Ok(sibling);
        }

        if let Some(found) = self.scan(entry) {
            debug!("Resolved {} by scan to {}", entry.id(), found.display());
            return Ok(found);
        }

        if entry.artifact_kind() == ArtifactKind::Processed {
            Err(Error::DataFileMissing {
                id: entry.id().to_string(),
                path: current.to_path_buf(),
            })
        } else {
            Err(Error::TableNotFound(entry.id().to_string()))
        }
    }

    fn sibling(&self, entry: &CatalogEntry) -> Option<PathBuf> {
        let stem = entry
            .stored_path()
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or(entry.id());
        let processed = self.layout.processed_dir();
        let dirs = [processed.join(entry.partition_key()), processed];

        dirs.iter()
            .flat_map(|dir| {
                TABLE_EXTENSIONS
                    .iter()
                    .map(move |ext| dir.join(format!("{stem}.{ext}")))
            })
            .find(|candidate| candidate.is_file())
    }

    fn scan(&self, entry: &CatalogEntry) -> Option<PathBuf> {
        let mut tables: Vec<(PathBuf, String)> = WalkDir::new(self.layout.processed_dir())
            .into_iter()
            .filter_map(std::result::Result::ok)
            .filter(|e| e.file_type().is_file() && is_table_path(e.path()))
            .filter_map(|e| {
                let stem = e.path().file_stem()?.to_str()?.to_string();
                Some((e.into_path(), stem))
            })
            .collect();
        tables.sort();

        let id = entry.id();
        let name = entry.logical_name();
        let name_prefix = format!("{name}_");

        let tiers: [&dyn Fn(&str) -> bool; 4] = [
            &|stem: &str| stem == id,
            &|stem: &str| stem.contains(id),
            &|stem: &str| stem.starts_with(&name_prefix),
            &|stem: &str| !name.is_empty() && stem.contains(name),
        ];

        for rule in tiers {
            let mut hits = tables.iter().filter(|(_, stem)| rule(stem.as_str()));
            if let Some((first, _)) = hits.next() {
                let others = hits.count();
                if others > 0 {
                    warn!(
                        "Ambiguous table match for {}: picked {} over {} other(s)",
                        id,
                        first.display(),
                        others
                    );
                }
                return Some(first.clone());
            }
        }
        None
    }
}
