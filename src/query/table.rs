//! Time-series tables backed by Arrow record batches
//!
//! A table is loaded whole into a single `RecordBatch` whose columns are all
//! `Float64`. Numeric columns are cast on load, anything else is dropped.
//! A column with no values at all (Arrow infers `Null` for it, and for every
//! column of a header-only CSV) is kept as an all-null series. The `time`
//! column is mandatory.

use arrow::array::{Array, ArrayRef, AsArray, Float64Array, UInt32Array};
use arrow::compute::{self, kernels::cmp};
use arrow::datatypes::{DataType, Field, Float64Type, Schema};
use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;
use serde_json::{Map, Value};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use crate::layout::extension_of;
use crate::{Error, Result};

/// Name of the mandatory time column
pub const TIME_COLUMN: &str = "time";

/// One output record, keys in column order. Null and NaN values are JSON
/// `null`.
pub type DataRow = Map<String, Value>;

/// A numeric time-series table.
#[derive(Debug, Clone)]
pub struct TimeSeriesTable {
    path: PathBuf,
    batch: RecordBatch,
    time_idx: usize,
}

impl TimeSeriesTable {
    /// Load a CSV or Parquet table, chosen by extension.
    ///
    /// # Errors
    ///
    /// - [`Error::MalformedTable`] if the file cannot be parsed, has an
    ///   unsupported extension, or lacks a numeric `time` column
    /// - [`Error::Io`] if the file cannot be opened
    pub fn load(path: &Path) -> Result<Self> {
        let (schema, batches) = match extension_of(path).as_deref() {
            Some("csv") => read_csv(path)?,
            Some("parquet") => read_parquet(path)?,
            _ => {
                return Err(Error::MalformedTable {
                    path: path.to_path_buf(),
                    reason: "unsupported table format".to_string(),
                })
            }
        };
        let batch = compute::concat_batches(&schema, &batches).map_err(|e| malformed(path, &e))?;
        Self::from_batch(path, batch)
    }

    /// Normalize an in-memory batch: numeric and all-null columns to
    /// `Float64`, others dropped.
    ///
    /// # Errors
    /// Returns [`Error::MalformedTable`] if there is no numeric `time` column
    pub fn from_batch(path: impl Into<PathBuf>, batch: RecordBatch) -> Result<Self> {
        let path = path.into();
        let schema = batch.schema();

        let mut fields = Vec::with_capacity(schema.fields().len());
        let mut columns: Vec<ArrayRef> = Vec::with_capacity(schema.fields().len());
        let mut time_idx = None;

        for (field, column) in schema.fields().iter().zip(batch.columns()) {
            if !is_series_type(field.data_type()) {
                if field.name() == TIME_COLUMN {
                    return Err(Error::MalformedTable {
                        path,
                        reason: format!("column '{TIME_COLUMN}' is not numeric"),
                    });
                }
                debug!("Dropping non-numeric column '{}'", field.name());
                continue;
            }
            let column = if field.data_type() == &DataType::Float64 {
                Arc::clone(column)
            } else {
                compute::cast(column, &DataType::Float64).map_err(|e| malformed(&path, &e))?
            };
            if field.name() == TIME_COLUMN && time_idx.is_none() {
                time_idx = Some(fields.len());
            }
            fields.push(Field::new(field.name(), DataType::Float64, true));
            columns.push(column);
        }

        let Some(time_idx) = time_idx else {
            return Err(Error::MalformedTable {
                path,
                reason: format!("missing '{TIME_COLUMN}' column"),
            });
        };

        let batch = RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)
            .map_err(|e| malformed(&path, &e))?;
        Ok(Self {
            path,
            batch,
            time_idx,
        })
    }

    /// Source path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Underlying batch.
    #[must_use]
    pub const fn batch(&self) -> &RecordBatch {
        &self.batch
    }

    /// Number of rows.
    #[must_use]
    pub fn num_rows(&self) -> usize {
        self.batch.num_rows()
    }

    /// Variable names in file order, time excluded.
    #[must_use]
    pub fn variables(&self) -> Vec<String> {
        self.batch
            .schema()
            .fields()
            .iter()
            .enumerate()
            .filter(|(idx, _)| *idx != self.time_idx)
            .map(|(_, field)| field.name().clone())
            .collect()
    }

    /// The time column.
    #[must_use]
    pub fn time(&self) -> &Float64Array {
        self.batch.column(self.time_idx).as_primitive::<Float64Type>()
    }

    /// A column by name.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&Float64Array> {
        let idx = self.batch.schema().index_of(name).ok()?;
        self.batch.column(idx).as_primitive_opt::<Float64Type>()
    }

    /// Keep `time` plus the requested variables, in the requested order.
    ///
    /// Unknown names and duplicates are dropped; `None` keeps every variable.
    ///
    /// # Errors
    /// Returns [`Error::MalformedTable`] if the projection fails
    pub fn select(&self, variables: Option<&[String]>) -> Result<Self> {
        let Some(requested) = variables else {
            return Ok(self.clone());
        };
        let schema = self.batch.schema();
        let mut indices = vec![self.time_idx];
        for name in requested {
            if let Ok(idx) = schema.index_of(name) {
                if !indices.contains(&idx) {
                    indices.push(idx);
                }
            }
        }
        let batch = self
            .batch
            .project(&indices)
            .map_err(|e| malformed(&self.path, &e))?;
        Ok(self.with_batch(batch, 0))
    }

    /// Keep rows with `start <= time <= end`; absent bounds are open.
    ///
    /// Rows with a null or NaN time never match a bound.
    ///
    /// # Errors
    /// Returns [`Error::MalformedTable`] if a kernel fails
    pub fn filter_time(&self, start: Option<f64>, end: Option<f64>) -> Result<Self> {
        let time = &self.comparable_time();
        let lower = start
            .map(|start| cmp::gt_eq(time, &Float64Array::new_scalar(start)))
            .transpose();
        let upper = end
            .map(|end| cmp::lt_eq(time, &Float64Array::new_scalar(end)))
            .transpose();

        let mask = match (
            lower.map_err(|e| malformed(&self.path, &e))?,
            upper.map_err(|e| malformed(&self.path, &e))?,
        ) {
            (None, None) => return Ok(self.clone()),
            (Some(mask), None) | (None, Some(mask)) => mask,
            (Some(lower), Some(upper)) => {
                compute::and(&lower, &upper).map_err(|e| malformed(&self.path, &e))?
            }
        };

        let batch =
            compute::filter_record_batch(&self.batch, &mask).map_err(|e| malformed(&self.path, &e))?;
        Ok(self.with_batch(batch, self.time_idx))
    }

    /// Smallest and largest time value, ignoring nulls and NaN.
    #[must_use]
    pub fn time_range(&self) -> (Option<f64>, Option<f64>) {
        let time = self.comparable_time();
        (compute::min(&time), compute::max(&time))
    }

    /// The time column with NaN read as null. The float kernels order NaN
    /// above every number, so it would otherwise pass a lower bound.
    fn comparable_time(&self) -> Float64Array {
        self.time()
            .iter()
            .map(|t| t.filter(|v| !v.is_nan()))
            .collect()
    }

    /// Decimate to roughly `target` rows by fixed stride.
    ///
    /// When the table has more than `target` rows, every
    /// `floor(rows / target)`-th row is kept, starting with the first. The
    /// result can hold slightly more than `target` rows when `target` does not
    /// divide the row count.
    ///
    /// # Errors
    /// Returns [`Error::InvalidInput`] for a zero target
    pub fn sample(&self, target: usize) -> Result<Self> {
        if target == 0 {
            return Err(Error::InvalidInput("sample_count must be positive".to_string()));
        }
        let rows = self.num_rows();
        if rows <= target {
            return Ok(self.clone());
        }
        let stride = rows / target;
        let indices: UInt32Array = (0..rows)
            .step_by(stride)
            .map(|i| u32::try_from(i).unwrap_or(u32::MAX))
            .collect();
        let batch = compute::take_record_batch(&self.batch, &indices)
            .map_err(|e| malformed(&self.path, &e))?;
        Ok(self.with_batch(batch, self.time_idx))
    }

    /// Row-oriented copy of the data, `time` included.
    #[must_use]
    pub fn rows(&self) -> Vec<DataRow> {
        let schema = self.batch.schema();
        let columns: Vec<(&str, &Float64Array)> = schema
            .fields()
            .iter()
            .zip(self.batch.columns())
            .filter_map(|(field, column)| {
                column
                    .as_primitive_opt::<Float64Type>()
                    .map(|values| (field.name().as_str(), values))
            })
            .collect();

        (0..self.num_rows())
            .map(|row| {
                columns
                    .iter()
                    .map(|(name, values)| {
                        let value = if values.is_null(row) {
                            Value::Null
                        } else {
                            // Non-finite values have no JSON number and become null
                            Value::from(values.value(row))
                        };
                        ((*name).to_string(), value)
                    })
                    .collect()
            })
            .collect()
    }

    fn with_batch(&self, batch: RecordBatch, time_idx: usize) -> Self {
        Self {
            path: self.path.clone(),
            batch,
            time_idx,
        }
    }
}

/// Columns that become variables. `Null` is what inference yields for a
/// column without a single value.
fn is_series_type(data_type: &DataType) -> bool {
    data_type.is_numeric() || data_type == &DataType::Null
}

type Batches = (Arc<Schema>, Vec<RecordBatch>);

fn read_csv(path: &Path) -> Result<Batches> {
    use arrow::csv::reader::Format;
    use arrow::csv::ReaderBuilder;

    let format = Format::default().with_header(true);
    let (schema, _) = format
        .infer_schema(File::open(path)?, None)
        .map_err(|e| malformed(path, &e))?;
    let schema = Arc::new(schema);

    let reader = ReaderBuilder::new(Arc::clone(&schema))
        .with_format(format)
        .build(File::open(path)?)
        .map_err(|e| malformed(path, &e))?;

    let batches = reader
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| malformed(path, &e))?;
    Ok((schema, batches))
}

fn read_parquet(path: &Path) -> Result<Batches> {
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

    let builder = ParquetRecordBatchReaderBuilder::try_new(File::open(path)?).map_err(|e| {
        Error::MalformedTable {
            path: path.to_path_buf(),
            reason: format!("Failed to parse Parquet file: {e}"),
        }
    })?;
    let schema = Arc::clone(builder.schema());
    let reader = builder.build().map_err(|e| Error::MalformedTable {
        path: path.to_path_buf(),
        reason: format!("Failed to create Parquet reader: {e}"),
    })?;

    let batches = reader
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| malformed(path, &e))?;
    Ok((schema, batches))
}

fn malformed(path: &Path, e: &ArrowError) -> Error {
    Error::MalformedTable {
        path: path.to_path_buf(),
        reason: e.to_string(),
    }
}
