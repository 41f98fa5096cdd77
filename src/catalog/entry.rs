//! Catalog Entry - metadata for one ingested artifact

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

use crate::layout::{extension_of, TABLE_EXTENSIONS};

/// Storage form of an artifact, inferred from its file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    /// Raw simulation export (`.mat`, and anything unrecognized)
    Raw,
    /// Processed tabular data (`.csv`, `.parquet`)
    Processed,
}

impl ArtifactKind {
    /// Infer the kind from an extension, with or without the leading dot.
    #[must_use]
    pub fn from_extension(ext: &str) -> Self {
        let ext = ext.trim_start_matches('.').to_ascii_lowercase();
        if TABLE_EXTENSIONS.contains(&ext.as_str()) {
            Self::Processed
        } else {
            Self::Raw
        }
    }

    /// Infer the kind from a path's extension.
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        extension_of(path).map_or(Self::Raw, |ext| Self::from_extension(&ext))
    }
}

/// Format the catalog id for an artifact: `{logical_name}_{YYYYMMDD_HHMMSS}`.
#[must_use]
pub fn simulation_id(logical_name: &str, created_at: DateTime<Utc>) -> String {
    format!("{logical_name}_{}", created_at.format("%Y%m%d_%H%M%S"))
}

/// Format the date partition for an ingestion time: `YYYY-MM-DD`.
#[must_use]
pub fn partition_key(created_at: DateTime<Utc>) -> String {
    created_at.format("%Y-%m-%d").to_string()
}

/// Catalog Entry records where an ingested artifact lives and what it is.
///
/// Only `archived` and `archive_path` change after creation, and only
/// through the lifecycle sweep. `stored_path` is never rewritten, so holders
/// of an old path can detect staleness through [`is_archived`](Self::is_archived).
///
/// Keys this version does not know about are kept in `extra` and written
/// back untouched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CatalogEntry {
    #[serde(default)]
    id: String,
    #[serde(rename = "simulation_name")]
    logical_name: String,
    #[serde(rename = "original_file")]
    source_path: PathBuf,
    #[serde(rename = "organized_path")]
    stored_path: PathBuf,
    #[serde(default)]
    file_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    artifact_kind: Option<ArtifactKind>,
    size_bytes: u64,
    #[serde(rename = "created", with = "super::timestamp")]
    created_at: DateTime<Utc>,
    #[serde(rename = "date_partition", default)]
    partition_key: String,
    #[serde(default)]
    archived: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    archive_path: Option<PathBuf>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl CatalogEntry {
    /// Create a builder with the required fields.
    ///
    /// # Arguments
    ///
    /// * `logical_name` - Simulation name
    /// * `source_path` - Where the artifact was ingested from
    /// * `stored_path` - Where the artifact lives in the lake
    #[must_use]
    pub fn builder(
        logical_name: impl Into<String>,
        source_path: impl Into<PathBuf>,
        stored_path: impl Into<PathBuf>,
    ) -> CatalogEntryBuilder {
        CatalogEntryBuilder::new(logical_name, source_path, stored_path)
    }

    /// Get the catalog id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Get the simulation name.
    #[must_use]
    pub fn logical_name(&self) -> &str {
        &self.logical_name
    }

    /// Get the original ingestion source.
    #[must_use]
    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    /// Get the active-tier location recorded at ingestion.
    #[must_use]
    pub fn stored_path(&self) -> &Path {
        &self.stored_path
    }

    /// Get the recorded file type (lower-cased extension with dot, e.g. `.mat`).
    #[must_use]
    pub fn file_type(&self) -> &str {
        &self.file_type
    }

    /// Get the artifact kind; older documents without one fall back to the file type.
    #[must_use]
    pub fn artifact_kind(&self) -> ArtifactKind {
        self.artifact_kind
            .unwrap_or_else(|| ArtifactKind::from_extension(&self.file_type))
    }

    /// Get the size in bytes of the stored copy.
    #[must_use]
    pub const fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    /// Get the ingestion time.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Get the date partition (`YYYY-MM-DD`).
    #[must_use]
    pub fn partition_key(&self) -> &str {
        &self.partition_key
    }

    /// Check whether the lifecycle sweep moved this artifact.
    #[must_use]
    pub const fn is_archived(&self) -> bool {
        self.archived
    }

    /// Get the archive location, once archived.
    #[must_use]
    pub fn archive_path(&self) -> Option<&Path> {
        self.archive_path.as_deref()
    }

    /// Where the artifact physically is right now.
    #[must_use]
    pub fn current_path(&self) -> &Path {
        match (&self.archive_path, self.archived) {
            (Some(path), true) => path,
            _ => &self.stored_path,
        }
    }

    /// Fields carried through from newer writers.
    #[must_use]
    pub const fn extra_fields(&self) -> &Map<String, Value> {
        &self.extra
    }

    /// Fill fields that older documents leave out: the id comes from the
    /// catalog key, a missing partition from `created_at`.
    pub(crate) fn resolve_defaults(&mut self, id: String) {
        self.id = id;
        if self.partition_key.is_empty() {
            self.partition_key = partition_key(self.created_at);
        }
    }

    pub(crate) fn mark_archived(&mut self, archive_path: PathBuf) {
        self.archived = true;
        self.archive_path = Some(archive_path);
    }
}

/// Builder for `CatalogEntry`.
#[derive(Debug)]
pub struct CatalogEntryBuilder {
    logical_name: String,
    source_path: PathBuf,
    stored_path: PathBuf,
    created_at: Option<DateTime<Utc>>,
    size_bytes: u64,
}

impl CatalogEntryBuilder {
    /// Create a new builder with required fields.
    #[must_use]
    pub fn new(
        logical_name: impl Into<String>,
        source_path: impl Into<PathBuf>,
        stored_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            logical_name: logical_name.into(),
            source_path: source_path.into(),
            stored_path: stored_path.into(),
            created_at: None,
            size_bytes: 0,
        }
    }

    /// Set the ingestion time (defaults to now).
    #[must_use]
    pub fn created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    /// Set the stored size.
    #[must_use]
    pub fn size_bytes(mut self, size_bytes: u64) -> Self {
        self.size_bytes = size_bytes;
        self
    }

    /// Build the `CatalogEntry`, deriving id, partition, and kind.
    #[must_use]
    pub fn build(self) -> CatalogEntry {
        let created_at = self.created_at.unwrap_or_else(Utc::now);
        let file_type = extension_of(&self.stored_path)
            .map(|ext| format!(".{ext}"))
            .unwrap_or_default();
        CatalogEntry {
            id: simulation_id(&self.logical_name, created_at),
            artifact_kind: Some(ArtifactKind::from_path(&self.stored_path)),
            partition_key: partition_key(created_at),
            logical_name: self.logical_name,
            source_path: self.source_path,
            stored_path: self.stored_path,
            file_type,
            size_bytes: self.size_bytes,
            created_at,
            archived: false,
            archive_path: None,
            extra: Map::new(),
        }
    }
}
