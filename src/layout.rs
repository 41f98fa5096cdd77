//! On-disk layout of the lake
//!
//! ```text
//! {root}/
//! ├── raw/2024-01-15/pump_20240115_143000.mat
//! ├── processed/2024-01-15/pump_20240115_143000.csv
//! ├── archive/2023/pump_20231102_090000.mat
//! └── metadata/catalog.json
//! ```
//!
//! Date partitions come from the ingestion time, archive buckets from the
//! year of the ingestion time.

use crate::catalog::ArtifactKind;
use crate::Result;
use std::path::{Path, PathBuf};

/// Extensions of processed tabular files
pub const TABLE_EXTENSIONS: [&str; 2] = ["csv", "parquet"];

/// File name of the catalog document
pub const CATALOG_FILE_NAME: &str = "catalog.json";

/// Directory layout rooted at one lake directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LakeLayout {
    root: PathBuf,
}

impl LakeLayout {
    /// Describe a layout without touching the filesystem
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Describe a layout and create its tier directories
    ///
    /// # Errors
    /// Returns error if a directory cannot be created
    pub fn create(root: impl Into<PathBuf>) -> Result<Self> {
        let layout = Self::new(root);
        for dir in [
            layout.raw_dir(),
            layout.processed_dir(),
            layout.archive_dir(),
            layout.metadata_dir(),
        ] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(layout)
    }

    /// Lake root
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Raw tier
    #[must_use]
    pub fn raw_dir(&self) -> PathBuf {
        self.root.join("raw")
    }

    /// Processed tier
    #[must_use]
    pub fn processed_dir(&self) -> PathBuf {
        self.root.join("processed")
    }

    /// Archive tier
    #[must_use]
    pub fn archive_dir(&self) -> PathBuf {
        self.root.join("archive")
    }

    /// Metadata directory
    #[must_use]
    pub fn metadata_dir(&self) -> PathBuf {
        self.root.join("metadata")
    }

    /// Catalog document path
    #[must_use]
    pub fn catalog_path(&self) -> PathBuf {
        self.metadata_dir().join(CATALOG_FILE_NAME)
    }

    /// Active tier directory for an artifact kind
    #[must_use]
    pub fn tier_dir(&self, kind: ArtifactKind) -> PathBuf {
        match kind {
            ArtifactKind::Raw => self.raw_dir(),
            ArtifactKind::Processed => self.processed_dir(),
        }
    }

    /// Date partition directory (`partition_key` is `YYYY-MM-DD`)
    #[must_use]
    pub fn partition_dir(&self, kind: ArtifactKind, partition_key: &str) -> PathBuf {
        self.tier_dir(kind).join(partition_key)
    }

    /// Year bucket in the archive tier
    #[must_use]
    pub fn archive_year_dir(&self, year: i32) -> PathBuf {
        self.archive_dir().join(year.to_string())
    }
}

/// Lower-cased extension of a path, without the dot
pub(crate) fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
}

/// True if the path carries a processed-table extension
#[must_use]
pub fn is_table_path(path: &Path) -> bool {
    extension_of(path).is_some_and(|ext| TABLE_EXTENSIONS.contains(&ext.as_str()))
}
