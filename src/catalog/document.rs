//! Catalog - the aggregate persisted as one JSON document

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use super::CatalogEntry;

/// Document format version written by this crate
pub const CATALOG_VERSION: &str = "1.0";

/// Number of entries reported in [`CatalogSummary::recent_simulations`]
const RECENT_LIMIT: usize = 5;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

#[allow(clippy::cast_precision_loss)]
fn bytes_to_mb(bytes: u64) -> f64 {
    bytes as f64 / BYTES_PER_MB
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn default_version() -> String {
    CATALOG_VERSION.to_string()
}

/// Map keys are authoritative for ids; entries written by older tooling
/// carry no `id` field at all, and sometimes no `date_partition`.
fn deserialize_entries<'de, D>(deserializer: D) -> Result<BTreeMap<String, CatalogEntry>, D::Error>
where
    D: Deserializer<'de>,
{
    let mut entries = BTreeMap::<String, CatalogEntry>::deserialize(deserializer)?;
    for (id, entry) in &mut entries {
        entry.resolve_defaults(id.clone());
    }
    Ok(entries)
}

/// Aggregate statistics, derived from the entry set on every write.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CatalogStatistics {
    #[serde(default)]
    total_simulations: usize,
    #[serde(default)]
    total_size_bytes: u64,
    #[serde(default)]
    total_size_mb: f64,
    #[serde(default, with = "super::timestamp::option")]
    last_updated: Option<DateTime<Utc>>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl CatalogStatistics {
    /// Number of entries.
    #[must_use]
    pub const fn total_simulations(&self) -> usize {
        self.total_simulations
    }

    /// Sum of all entries' `size_bytes`.
    #[must_use]
    pub const fn total_size_bytes(&self) -> u64 {
        self.total_size_bytes
    }

    /// `total_size_bytes` in mebibytes.
    #[must_use]
    pub const fn total_size_mb(&self) -> f64 {
        self.total_size_mb
    }

    /// Time of the last persisted write.
    #[must_use]
    pub const fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.last_updated
    }
}

/// The full catalog: every entry keyed by id, plus derived statistics.
///
/// ## Invariant
///
/// After [`upsert`](Self::upsert) or any persisted write,
/// `statistics.total_simulations == len()` and
/// `statistics.total_size_bytes` is the sum of the entries' sizes. Both are
/// recomputed from scratch, never adjusted incrementally.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Catalog {
    #[serde(default = "default_version")]
    version: String,
    #[serde(with = "super::timestamp", default = "Utc::now")]
    created: DateTime<Utc>,
    #[serde(default, deserialize_with = "deserialize_entries")]
    simulations: BTreeMap<String, CatalogEntry>,
    #[serde(default)]
    statistics: CatalogStatistics,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}

impl Catalog {
    /// Create an empty catalog stamped with the current time.
    #[must_use]
    pub fn new() -> Self {
        Self {
            version: default_version(),
            created: Utc::now(),
            simulations: BTreeMap::new(),
            statistics: CatalogStatistics::default(),
            extra: Map::new(),
        }
    }

    /// Document format version.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// When the catalog was first created.
    #[must_use]
    pub const fn created(&self) -> DateTime<Utc> {
        self.created
    }

    /// Aggregate statistics.
    #[must_use]
    pub const fn statistics(&self) -> &CatalogStatistics {
        &self.statistics
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.simulations.len()
    }

    /// True if no artifact has been cataloged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.simulations.is_empty()
    }

    /// Look up an entry by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&CatalogEntry> {
        self.simulations.get(id)
    }

    /// Iterate over all entries in id order.
    pub fn entries(&self) -> impl Iterator<Item = &CatalogEntry> {
        self.simulations.values()
    }

    /// Insert or replace an entry by id and recompute statistics.
    ///
    /// Returns the replaced entry, if any.
    pub fn upsert(&mut self, entry: CatalogEntry) -> Option<CatalogEntry> {
        let previous = self.simulations.insert(entry.id().to_string(), entry);
        self.recompute_statistics();
        previous
    }

    pub(crate) fn entry_mut(&mut self, id: &str) -> Option<&mut CatalogEntry> {
        self.simulations.get_mut(id)
    }

    pub(crate) fn recompute_statistics(&mut self) {
        let total_size_bytes: u64 = self.simulations.values().map(CatalogEntry::size_bytes).sum();
        self.statistics.total_simulations = self.simulations.len();
        self.statistics.total_size_bytes = total_size_bytes;
        self.statistics.total_size_mb = bytes_to_mb(total_size_bytes);
    }

    pub(crate) fn touch(&mut self, now: DateTime<Utc>) {
        self.statistics.last_updated = Some(now);
    }

    /// List entries matching a filter, newest first.
    ///
    /// # Example
    ///
    /// ```rust
    /// use simlake::catalog::{Catalog, CatalogEntry, CatalogFilter};
    ///
    /// let mut catalog = Catalog::new();
    /// catalog.upsert(CatalogEntry::builder("pump", "/in/pump.mat", "/lake/raw/p.mat").build());
    /// catalog.upsert(CatalogEntry::builder("valve", "/in/valve.mat", "/lake/raw/v.mat").build());
    ///
    /// let pumps = catalog.list(&CatalogFilter::new().name_pattern("PUMP"));
    /// assert_eq!(pumps.len(), 1);
    /// ```
    #[must_use]
    pub fn list(&self, filter: &CatalogFilter) -> Vec<&CatalogEntry> {
        let mut matches: Vec<&CatalogEntry> = self
            .simulations
            .values()
            .filter(|entry| filter.matches(entry))
            .collect();
        matches.sort_by(|a, b| b.created_at().cmp(&a.created_at()));
        matches
    }

    /// Summarize the catalog for dashboards.
    #[must_use]
    pub fn summary(&self) -> CatalogSummary {
        let total_size_bytes: u64 = self.simulations.values().map(CatalogEntry::size_bytes).sum();

        let date_range = self
            .simulations
            .values()
            .map(CatalogEntry::created_at)
            .fold(None, |range: Option<DateRange>, created| {
                Some(match range {
                    None => DateRange {
                        earliest: created,
                        latest: created,
                    },
                    Some(r) => DateRange {
                        earliest: r.earliest.min(created),
                        latest: r.latest.max(created),
                    },
                })
            });

        let mut file_types = BTreeMap::new();
        for entry in self.simulations.values() {
            let key = if entry.file_type().is_empty() {
                "unknown".to_string()
            } else {
                entry.file_type().to_string()
            };
            *file_types.entry(key).or_insert(0) += 1;
        }

        let recent_simulations = self
            .list(&CatalogFilter::new())
            .into_iter()
            .take(RECENT_LIMIT)
            .map(|entry| RecentSimulation {
                id: entry.id().to_string(),
                name: entry.logical_name().to_string(),
                created: entry.created_at(),
                size_mb: round2(bytes_to_mb(entry.size_bytes())),
            })
            .collect();

        CatalogSummary {
            total_simulations: self.simulations.len(),
            total_size_mb: round2(bytes_to_mb(total_size_bytes)),
            date_range,
            file_types,
            recent_simulations,
        }
    }
}

/// Listing filter; all criteria are optional and combine with AND.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogFilter {
    date_from: Option<NaiveDate>,
    date_to: Option<NaiveDate>,
    name_pattern: Option<String>,
    exclude_archived: bool,
}

impl CatalogFilter {
    /// Match everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep entries ingested on or after this date.
    #[must_use]
    pub fn date_from(mut self, date: NaiveDate) -> Self {
        self.date_from = Some(date);
        self
    }

    /// Keep entries ingested on or before this date.
    #[must_use]
    pub fn date_to(mut self, date: NaiveDate) -> Self {
        self.date_to = Some(date);
        self
    }

    /// Keep entries whose name contains this text (case-insensitive).
    #[must_use]
    pub fn name_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.name_pattern = Some(pattern.into().to_lowercase());
        self
    }

    /// Drop entries already moved to the archive tier.
    #[must_use]
    pub fn exclude_archived(mut self) -> Self {
        self.exclude_archived = true;
        self
    }

    fn matches(&self, entry: &CatalogEntry) -> bool {
        let date = entry.created_at().date_naive();
        if self.date_from.is_some_and(|from| date < from) {
            return false;
        }
        if self.date_to.is_some_and(|to| date > to) {
            return false;
        }
        if let Some(pattern) = &self.name_pattern {
            if !entry.logical_name().to_lowercase().contains(pattern.as_str()) {
                return false;
            }
        }
        !(self.exclude_archived && entry.is_archived())
    }
}

/// Earliest and latest ingestion time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateRange {
    /// Oldest `created_at`
    pub earliest: DateTime<Utc>,
    /// Newest `created_at`
    pub latest: DateTime<Utc>,
}

/// One row of [`CatalogSummary::recent_simulations`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecentSimulation {
    /// Catalog id
    pub id: String,
    /// Simulation name
    pub name: String,
    /// Ingestion time
    pub created: DateTime<Utc>,
    /// Stored size in MB, 2 decimals
    pub size_mb: f64,
}

/// Dashboard summary of the whole catalog.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogSummary {
    /// Number of entries
    pub total_simulations: usize,
    /// Total stored size in MB, 2 decimals
    pub total_size_mb: f64,
    /// Ingestion time span, absent for an empty catalog
    pub date_range: Option<DateRange>,
    /// Entry count per file type
    pub file_types: BTreeMap<String, usize>,
    /// Most recent entries, newest first
    pub recent_simulations: Vec<RecentSimulation>,
}
