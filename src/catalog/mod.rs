//! Artifact catalog
//!
//! The catalog is the single source of truth for what the lake holds and
//! where each artifact lives. It is persisted as one JSON document:
//!
//! ```text
//! {
//!   "version": "1.0",
//!   "created": "...",
//!   "simulations": { "<id>": CatalogEntry, ... },
//!   "statistics": { "total_simulations", "total_size_bytes",
//!                   "total_size_mb", "last_updated" }
//! }
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use simlake::catalog::{CatalogEntry, CatalogStore};
//!
//! # fn main() -> simlake::Result<()> {
//! # let dir = std::env::temp_dir().join(format!("simlake-doc-{}", std::process::id()));
//! # std::fs::create_dir_all(&dir)?;
//! let store = CatalogStore::new(dir.join("catalog.json"));
//!
//! let entry = CatalogEntry::builder("pump", "/in/pump.mat", "/lake/raw/pump.mat")
//!     .size_bytes(1024)
//!     .build();
//! let catalog = store.upsert(entry)?;
//!
//! assert_eq!(catalog.statistics().total_size_bytes(), 1024);
//! # std::fs::remove_dir_all(&dir)?;
//! # Ok(())
//! # }
//! ```

mod document;
mod entry;
mod store;
mod timestamp;

pub use document::{
    Catalog, CatalogFilter, CatalogStatistics, CatalogSummary, DateRange, RecentSimulation,
    CATALOG_VERSION,
};
pub use entry::{partition_key, simulation_id, ArtifactKind, CatalogEntry, CatalogEntryBuilder};
pub use store::CatalogStore;
