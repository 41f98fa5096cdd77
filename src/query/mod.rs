//! Query Engine - filtered, resampled slices of simulation tables
//!
//! ## Pipeline
//!
//! ```text
//! catalog entry ─resolve─> table file ─load─> Float64 batch
//!     ─select(variables)─> ─filter(time window)─> time_range
//!     ─sample(stride)─> rows
//! ```
//!
//! Every stage is an Arrow compute kernel over one `RecordBatch`. Queries
//! read the catalog without locking and never modify it.
//!
//! ## Example
//!
//! ```rust
//! use simlake::query::QueryParams;
//!
//! let params = QueryParams::new()
//!     .variables(["temperature", "pressure"])
//!     .time_window(2.0, 5.0)
//!     .sample_count(100);
//! assert!(params.validate().is_ok());
//! ```

mod resolve;
mod stats;
mod table;

pub use resolve::TableResolver;
pub use stats::{Percentiles, VariableStats};
pub use table::{DataRow, TimeSeriesTable, TIME_COLUMN};

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::catalog::{CatalogEntry, CatalogStore};
use crate::layout::LakeLayout;
use crate::{Error, Result};

/// Query parameters; every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryParams {
    /// Columns to keep (plus time), in this order
    pub variables: Option<Vec<String>>,
    /// Inclusive lower time bound
    pub time_start: Option<f64>,
    /// Inclusive upper time bound
    pub time_end: Option<f64>,
    /// Target row count for stride decimation
    pub sample_count: Option<usize>,
}

impl QueryParams {
    /// No filters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict to these variables.
    #[must_use]
    pub fn variables<I, S>(mut self, variables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.variables = Some(variables.into_iter().map(Into::into).collect());
        self
    }

    /// Inclusive lower time bound.
    #[must_use]
    pub fn time_start(mut self, start: f64) -> Self {
        self.time_start = Some(start);
        self
    }

    /// Inclusive upper time bound.
    #[must_use]
    pub fn time_end(mut self, end: f64) -> Self {
        self.time_end = Some(end);
        self
    }

    /// Both time bounds.
    #[must_use]
    pub fn time_window(self, start: f64, end: f64) -> Self {
        self.time_start(start).time_end(end)
    }

    /// Target row count.
    #[must_use]
    pub fn sample_count(mut self, count: usize) -> Self {
        self.sample_count = Some(count);
        self
    }

    /// Reject parameters no table could satisfy.
    ///
    /// # Errors
    /// Returns [`Error::InvalidInput`] for a zero sample count, non-finite
    /// bounds, or `time_start > time_end`
    pub fn validate(&self) -> Result<()> {
        if self.sample_count == Some(0) {
            return Err(Error::InvalidInput(
                "sample_count must be positive".to_string(),
            ));
        }
        for (label, bound) in [("time_start", self.time_start), ("time_end", self.time_end)] {
            if bound.is_some_and(|v| !v.is_finite()) {
                return Err(Error::InvalidInput(format!("{label} must be finite")));
            }
        }
        if let (Some(start), Some(end)) = (self.time_start, self.time_end) {
            if start > end {
                return Err(Error::InvalidInput(format!(
                    "time_start ({start}) is after time_end ({end})"
                )));
            }
        }
        Ok(())
    }
}

/// Time span of the filtered rows, before sampling.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct TimeRange {
    /// Smallest time value, `None` if no rows matched
    pub start: Option<f64>,
    /// Largest time value, `None` if no rows matched
    pub end: Option<f64>,
}

/// Result of one query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResult {
    /// Catalog id
    pub simulation_id: String,
    /// Logical name of the simulation
    pub simulation_name: String,
    /// Returned variables, time excluded
    pub variables: Vec<String>,
    /// Rows returned, after sampling
    pub data_points: usize,
    /// Span of the filtered rows
    pub time_range: TimeRange,
    /// Row-oriented payload
    pub data: Vec<DataRow>,
}

/// Answers queries against the tables behind catalog entries.
#[derive(Debug, Clone)]
pub struct QueryEngine {
    store: Arc<CatalogStore>,
    resolver: TableResolver,
}

impl QueryEngine {
    /// Create an engine reading `store` and resolving tables under `layout`.
    #[must_use]
    pub const fn new(store: Arc<CatalogStore>, layout: LakeLayout) -> Self {
        Self {
            store,
            resolver: TableResolver::new(layout),
        }
    }

    /// Run a query.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidInput`] for invalid parameters
    /// - [`Error::SimulationNotFound`] for an unknown id
    /// - [`Error::TableNotFound`] / [`Error::DataFileMissing`] if no data file resolves
    /// - [`Error::MalformedTable`] if the file cannot be parsed
    pub fn query(&self, simulation_id: &str, params: &QueryParams) -> Result<QueryResult> {
        params.validate()?;
        let (entry, table) = self.open(simulation_id)?;

        let window = Self::window(&table, params)?;
        let (start, end) = window.time_range();
        let sampled = match params.sample_count {
            Some(count) => window.sample(count)?,
            None => window,
        };
        let data = sampled.rows();

        Ok(QueryResult {
            simulation_id: entry.id().to_string(),
            simulation_name: entry.logical_name().to_string(),
            variables: sampled.variables(),
            data_points: data.len(),
            time_range: TimeRange { start, end },
            data,
        })
    }

    /// Statistics of one variable after the time window and variable
    /// selection of `params`. `sample_count` is ignored.
    ///
    /// # Errors
    ///
    /// - [`Error::VariableNotFound`] if the column is absent after selection
    /// - [`Error::EmptySeries`] if every value is null or NaN
    /// - Same lookup errors as [`query`](Self::query)
    pub fn variable_stats(
        &self,
        simulation_id: &str,
        variable: &str,
        params: &QueryParams,
    ) -> Result<VariableStats> {
        params.validate()?;
        let (entry, table) = self.open(simulation_id)?;
        let window = Self::window(&table, params)?;
        let values = window
            .column(variable)
            .ok_or_else(|| Error::VariableNotFound {
                id: entry.id().to_string(),
                variable: variable.to_string(),
            })?;
        VariableStats::compute(variable, values)
    }

    /// Variable names of a simulation's table, time excluded, in file order.
    ///
    /// # Errors
    /// Same lookup errors as [`query`](Self::query)
    pub fn variables(&self, simulation_id: &str) -> Result<Vec<String>> {
        let (_, table) = self.open(simulation_id)?;
        Ok(table.variables())
    }

    fn open(&self, simulation_id: &str) -> Result<(CatalogEntry, TimeSeriesTable)> {
        let entry = self
            .store
            .get(simulation_id)?
            .ok_or_else(|| Error::SimulationNotFound(simulation_id.to_string()))?;
        let path = self.resolver.resolve(&entry)?;
        let table = TimeSeriesTable::load(&path).map_err(|e| match e {
            Error::Io(io) if io.kind() == std::io::ErrorKind::NotFound => Error::DataFileMissing {
                id: entry.id().to_string(),
                path: path.clone(),
            },
            other => other,
        })?;
        Ok((entry, table))
    }

    fn window(table: &TimeSeriesTable, params: &QueryParams) -> Result<TimeSeriesTable> {
        table
            .select(params.variables.as_deref())?
            .filter_time(params.time_start, params.time_end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_validation() {
        assert!(QueryParams::new().validate().is_ok());
        assert!(QueryParams::new().sample_count(0).validate().is_err());
        assert!(QueryParams::new().time_window(5.0, 2.0).validate().is_err());
        assert!(QueryParams::new().time_start(f64::NAN).validate().is_err());
        assert!(QueryParams::new().time_window(2.0, 2.0).validate().is_ok());
    }

    #[test]
    fn test_params_from_json() {
        let params: QueryParams =
            serde_json::from_str(r#"{"variables": ["a", "b"], "sample_count": 10}"#).unwrap();
        assert_eq!(params.variables.as_deref(), Some(&["a".to_string(), "b".to_string()][..]));
        assert_eq!(params.sample_count, Some(10));
        assert!(params.time_start.is_none());
    }
}
