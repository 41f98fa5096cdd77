//! Ingest dedup registry
//!
//! Remembers which source paths have been claimed for ingestion so that a
//! file-ready event firing twice for the same file ingests it once.
//!
//! ## Lifecycle
//!
//! One registry per [`DataLake`](crate::DataLake), created when the lake is
//! built and never cleared. It grows until `capacity` and then evicts the
//! oldest claim first, so a very old path can be ingested again after many
//! newer ones have been seen.

use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

/// Bounded, concurrent set of claimed source paths.
#[derive(Debug)]
pub struct IngestRegistry {
    claims: DashMap<PathBuf, u64>,
    next_seq: AtomicU64,
    capacity: usize,
}

impl IngestRegistry {
    /// Create an empty registry holding at most `capacity` paths.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            claims: DashMap::with_capacity(capacity.min(1024)),
            next_seq: AtomicU64::new(0),
            capacity: capacity.max(1),
        }
    }

    /// Claim a path. Returns `false` if it is already claimed.
    pub fn try_claim(&self, path: &Path) -> bool {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let inserted = match self.claims.entry(path.to_path_buf()) {
            dashmap::mapref::entry::Entry::Occupied(_) => false,
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(seq);
                true
            }
        };
        if inserted {
            self.evict_overflow();
        }
        inserted
    }

    /// Forget a claim so the path can be ingested again.
    pub fn release(&self, path: &Path) {
        self.claims.remove(path);
    }

    /// Check whether a path is currently claimed.
    #[must_use]
    pub fn contains(&self, path: &Path) -> bool {
        self.claims.contains_key(path)
    }

    /// Number of remembered paths.
    #[must_use]
    pub fn len(&self) -> usize {
        self.claims.len()
    }

    /// Check if no path is remembered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.claims.is_empty()
    }

    /// Maximum number of remembered paths.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    fn evict_overflow(&self) {
        while self.claims.len() > self.capacity {
            let oldest = self
                .claims
                .iter()
                .min_by_key(|claim| *claim.value())
                .map(|claim| claim.key().clone());
            match oldest {
                Some(path) => {
                    self.claims.remove(&path);
                }
                None => break,
            }
        }
    }
}
