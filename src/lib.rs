//! # simlake: Simulation Data Lake Catalog & Query Engine
//!
//! **Version**: 0.1.0
//!
//! simlake ingests time-series simulation exports into a date-partitioned
//! directory tree, keeps a JSON catalog of everything ingested, moves aged
//! artifacts into a year-bucketed archive, and answers time-window /
//! variable / down-sampling queries against the underlying tables.
//!
//! ## Design Principles
//!
//! - **Single source of truth**: the catalog document; every mutation is a
//!   full read-modify-write under one lock, persisted by atomic replace
//! - **Copy in, move out**: ingestion never touches its source, archival
//!   moves and never rewrites `stored_path`
//! - **Per-request failure**: query errors never affect catalog state
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use simlake::query::QueryParams;
//! use simlake::DataLake;
//!
//! let lake = DataLake::builder().root("data").build()?;
//!
//! let receipt = lake.ingest("exports/run1.csv".as_ref(), None)?;
//! let result = lake.query(
//!     &receipt.simulation_id,
//!     &QueryParams::new().time_window(2.0, 5.0).sample_count(100),
//! )?;
//! println!("{} rows", result.data_points);
//!
//! let archived = lake.archive_older_than(30)?;
//! println!("archived {archived}");
//! # Ok::<(), simlake::Error>(())
//! ```
//!
//! ## Concurrency
//!
//! One `DataLake` per catalog document per process. Share it behind an
//! `Arc`; every method takes `&self`. Writers from several processes are
//! not coordinated.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod catalog;
pub mod config;
pub mod error;
pub mod ingest;
pub mod layout;
pub mod lifecycle;
pub mod query;
#[cfg(feature = "tokio")]
pub mod scheduler;

pub use error::{Error, ErrorKind, Result};

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use catalog::{Catalog, CatalogEntry, CatalogFilter, CatalogStore, CatalogSummary};
use config::LakeConfig;
use ingest::{IngestReceipt, IngestRegistry, IngestionOrganizer};
use layout::LakeLayout;
use lifecycle::{LifecycleManager, SweepReport};
use query::{QueryEngine, QueryParams, QueryResult, VariableStats};

/// A data lake rooted at one directory.
#[derive(Debug)]
pub struct DataLake {
    layout: LakeLayout,
    store: Arc<CatalogStore>,
    organizer: IngestionOrganizer,
    lifecycle: LifecycleManager,
    engine: QueryEngine,
    archive_after_days: u32,
    sweep_interval: Duration,
}

impl DataLake {
    /// Create a new lake builder
    #[must_use]
    pub fn builder() -> DataLakeBuilder {
        DataLakeBuilder::default()
    }

    /// Open (creating directories as needed) the lake at `root` with defaults.
    ///
    /// # Errors
    /// Returns error if the directory tree cannot be created
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        Self::builder().root(root).build()
    }

    /// Open the lake described by `config`.
    ///
    /// # Errors
    /// Returns error if the configuration is invalid or the directory tree
    /// cannot be created
    pub fn from_config(config: &LakeConfig) -> Result<Self> {
        Self::builder().config(config.clone()).build()
    }

    /// Directory layout
    #[must_use]
    pub const fn layout(&self) -> &LakeLayout {
        &self.layout
    }

    /// Catalog store
    #[must_use]
    pub fn store(&self) -> &CatalogStore {
        &self.store
    }

    /// Ingestion organizer
    #[must_use]
    pub const fn organizer(&self) -> &IngestionOrganizer {
        &self.organizer
    }

    /// Lifecycle manager
    #[must_use]
    pub const fn lifecycle(&self) -> &LifecycleManager {
        &self.lifecycle
    }

    /// Query engine
    #[must_use]
    pub const fn engine(&self) -> &QueryEngine {
        &self.engine
    }

    /// Configured archive age threshold in days
    #[must_use]
    pub const fn archive_after_days(&self) -> u32 {
        self.archive_after_days
    }

    /// Configured background sweep period
    #[must_use]
    pub const fn sweep_interval(&self) -> Duration {
        self.sweep_interval
    }

    /// Current catalog.
    ///
    /// # Errors
    /// Returns [`Error::CorruptCatalog`] if the document cannot be parsed
    pub fn catalog(&self) -> Result<Catalog> {
        self.store.load()
    }

    /// One catalog entry.
    ///
    /// # Errors
    /// Returns [`Error::SimulationNotFound`] for an unknown id
    pub fn simulation(&self, id: &str) -> Result<CatalogEntry> {
        self.store
            .get(id)?
            .ok_or_else(|| Error::SimulationNotFound(id.to_string()))
    }

    /// Entries matching `filter`, newest first.
    ///
    /// # Errors
    /// Returns [`Error::CorruptCatalog`] if the document cannot be parsed
    pub fn list(&self, filter: &CatalogFilter) -> Result<Vec<CatalogEntry>> {
        Ok(self
            .store
            .load()?
            .list(filter)
            .into_iter()
            .cloned()
            .collect())
    }

    /// Aggregate overview of the catalog.
    ///
    /// # Errors
    /// Returns [`Error::CorruptCatalog`] if the document cannot be parsed
    pub fn summary(&self) -> Result<CatalogSummary> {
        Ok(self.store.load()?.summary())
    }

    /// Ingest one artifact. See [`IngestionOrganizer::organize`].
    ///
    /// # Errors
    /// See [`IngestionOrganizer::organize`]
    pub fn ingest(&self, source: &Path, logical_name: Option<&str>) -> Result<IngestReceipt> {
        self.organizer.organize(source, logical_name)
    }

    /// Ingest unless this source was already seen. See
    /// [`IngestionOrganizer::organize_new`].
    ///
    /// # Errors
    /// See [`IngestionOrganizer::organize`]
    pub fn ingest_new(
        &self,
        source: &Path,
        logical_name: Option<&str>,
    ) -> Result<Option<IngestReceipt>> {
        self.organizer.organize_new(source, logical_name)
    }

    /// Archive entries older than `max_age_days`; returns how many were archived.
    ///
    /// # Errors
    /// See [`LifecycleManager::sweep`]
    pub fn archive_older_than(&self, max_age_days: u32) -> Result<usize> {
        Ok(self.lifecycle.sweep(max_age_days)?.archived_count())
    }

    /// Archive entries older than `max_age_days` with a full report.
    ///
    /// # Errors
    /// See [`LifecycleManager::sweep`]
    pub fn sweep(&self, max_age_days: u32) -> Result<SweepReport> {
        self.lifecycle.sweep(max_age_days)
    }

    /// Interruptible [`sweep`](Self::sweep).
    ///
    /// # Errors
    /// See [`LifecycleManager::sweep`]
    pub fn sweep_until(&self, max_age_days: u32, stop: &AtomicBool) -> Result<SweepReport> {
        self.lifecycle.sweep_until(max_age_days, stop)
    }

    /// Query a simulation. See [`QueryEngine::query`].
    ///
    /// # Errors
    /// See [`QueryEngine::query`]
    pub fn query(&self, simulation_id: &str, params: &QueryParams) -> Result<QueryResult> {
        self.engine.query(simulation_id, params)
    }

    /// Statistics of one variable. See [`QueryEngine::variable_stats`].
    ///
    /// # Errors
    /// See [`QueryEngine::variable_stats`]
    pub fn variable_stats(
        &self,
        simulation_id: &str,
        variable: &str,
        params: &QueryParams,
    ) -> Result<VariableStats> {
        self.engine.variable_stats(simulation_id, variable, params)
    }

    /// Variables of a simulation. See [`QueryEngine::variables`].
    ///
    /// # Errors
    /// See [`QueryEngine::variables`]
    pub fn variables(&self, simulation_id: &str) -> Result<Vec<String>> {
        self.engine.variables(simulation_id)
    }

    /// Snapshot of lake health. Never fails; an unreadable catalog is
    /// reported as degraded.
    #[must_use]
    pub fn health(&self) -> HealthReport {
        let stats = self.organizer.stats();
        let (status, simulations_count, catalog_error) = match self.store.load() {
            Ok(catalog) => (HealthStatus::Healthy, Some(catalog.len()), None),
            Err(e) => (HealthStatus::Degraded, None, Some(e.to_string())),
        };
        HealthReport {
            status,
            timestamp: Utc::now(),
            simulations_count,
            data_directory: self.layout.root().to_path_buf(),
            files_ingested: stats.files_ingested,
            ingest_errors: stats.ingest_errors,
            last_ingested: stats.last_ingested,
            catalog_error,
        }
    }
}

/// Overall health.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Catalog readable
    Healthy,
    /// Catalog unreadable
    Degraded,
}

/// Health snapshot for monitoring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    /// Overall status
    pub status: HealthStatus,
    /// When the snapshot was taken
    pub timestamp: DateTime<Utc>,
    /// Catalog size, if the catalog could be read
    pub simulations_count: Option<usize>,
    /// Lake root
    pub data_directory: PathBuf,
    /// Successful ingestions since startup
    pub files_ingested: u64,
    /// Failed ingestions since startup
    pub ingest_errors: u64,
    /// Last successful ingestion
    pub last_ingested: Option<DateTime<Utc>>,
    /// Why the catalog could not be read
    #[serde(skip_serializing_if = "Option::is_none")]
    pub catalog_error: Option<String>,
}

/// Lake builder
#[derive(Debug, Default)]
pub struct DataLakeBuilder {
    config: LakeConfig,
}

impl DataLakeBuilder {
    /// Start from a full configuration
    #[must_use]
    pub fn config(mut self, config: LakeConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the lake root directory
    #[must_use]
    pub fn root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.data_dir = root.into();
        self
    }

    /// Set the archive age threshold used by the background sweeper
    #[must_use]
    pub fn archive_after_days(mut self, days: u32) -> Self {
        self.config.archive_after_days = days;
        self
    }

    /// Set the background sweep period
    #[must_use]
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.config.sweep_interval_secs = interval.as_secs();
        self
    }

    /// Bound the ingest dedup registry
    #[must_use]
    pub fn dedup_capacity(mut self, capacity: usize) -> Self {
        self.config.dedup_capacity = capacity;
        self
    }

    /// Build the lake, creating its directory tree
    ///
    /// # Errors
    ///
    /// Returns error if the configuration is invalid or a directory cannot
    /// be created
    pub fn build(self) -> Result<DataLake> {
        let config = self.config;
        config.validate()?;

        let layout = LakeLayout::create(&config.data_dir)?;
        let store = Arc::new(CatalogStore::new(layout.catalog_path()));

        tracing::info!("Data lake opened at {}", layout.root().display());

        Ok(DataLake {
            organizer: IngestionOrganizer::new(
                layout.clone(),
                Arc::clone(&store),
                IngestRegistry::new(config.dedup_capacity),
            ),
            lifecycle: LifecycleManager::new(layout.clone(), Arc::clone(&store)),
            engine: QueryEngine::new(Arc::clone(&store), layout.clone()),
            archive_after_days: config.archive_after_days,
            sweep_interval: config.sweep_interval(),
            layout,
            store,
        })
    }
}
