//! Error types for simlake
//!
//! Every public operation returns either a well-formed value or exactly one
//! of these errors. [`Error::kind`] folds the variants into the four coarse
//! categories transport layers care about.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse error taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Unknown simulation, variable, or data file
    NotFound,
    /// Malformed parameters or input that can never succeed as given
    Invalid,
    /// Copy, move, or read failure
    IoFailure,
    /// The persisted catalog document cannot be parsed
    CorruptCatalog,
}

/// simlake error types
#[derive(Error, Debug)]
pub enum Error {
    /// No catalog entry with this id
    #[error("Simulation not found: {0}")]
    SimulationNotFound(String),

    /// Ingestion source does not exist
    #[error("Source file not found: {}", .0.display())]
    SourceNotFound(PathBuf),

    /// Ingestion source exists but holds no bytes
    #[error("Source file is empty: {}", .0.display())]
    EmptySource(PathBuf),

    /// An artifact with the same id is already stored
    #[error("Artifact already exists: {0}\nRetry after the timestamp rolls over or pass a different name")]
    ArtifactExists(String),

    /// Copy into the partitioned store failed; the catalog was not touched
    #[error("Copy failed: {} -> {}: {cause}", .from.display(), .to.display())]
    CopyFailed {
        /// Source path
        from: PathBuf,
        /// Destination path
        to: PathBuf,
        /// Underlying I/O failure
        #[source]
        cause: std::io::Error,
    },

    /// Move into the archive tier failed
    #[error("Move failed: {} -> {}: {cause}", .from.display(), .to.display())]
    MoveFailed {
        /// Source path
        from: PathBuf,
        /// Destination path
        to: PathBuf,
        /// Underlying I/O failure
        #[source]
        cause: std::io::Error,
    },

    /// Catalog document exists but is not valid
    #[error("Corrupt catalog at {}: {cause}\nRun CatalogStore::reinitialize() to move it aside", .path.display())]
    CorruptCatalog {
        /// Catalog document path
        path: PathBuf,
        /// Parse failure
        #[source]
        cause: serde_json::Error,
    },

    /// No tabular data file could be resolved for a simulation
    #[error("No table found for simulation: {0}")]
    TableNotFound(String),

    /// Catalog references a table that no longer exists on disk
    #[error("Data file missing for simulation {id}: {}", .path.display())]
    DataFileMissing {
        /// Simulation id
        id: String,
        /// Path recorded in the catalog
        path: PathBuf,
    },

    /// Underlying table cannot be parsed
    #[error("Malformed table {}: {reason}", .path.display())]
    MalformedTable {
        /// Table path
        path: PathBuf,
        /// What went wrong
        reason: String,
    },

    /// Column absent after filtering
    #[error("Variable '{variable}' not found in simulation {id}")]
    VariableNotFound {
        /// Simulation id
        id: String,
        /// Requested column
        variable: String,
    },

    /// Every value of the series is null or NaN
    #[error("Variable '{0}' has no values")]
    EmptySeries(String),

    /// Invalid input parameters
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration file error
    #[error("Config error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Map this error onto the coarse taxonomy
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::SimulationNotFound(_)
            | Self::SourceNotFound(_)
            | Self::TableNotFound(_)
            | Self::DataFileMissing { .. }
            | Self::VariableNotFound { .. } => ErrorKind::NotFound,
            Self::EmptySource(_)
            | Self::ArtifactExists(_)
            | Self::EmptySeries(_)
            | Self::InvalidInput(_)
            | Self::Config(_) => ErrorKind::Invalid,
            Self::CopyFailed { .. }
            | Self::MoveFailed { .. }
            | Self::MalformedTable { .. }
            | Self::Io(_)
            | Self::Serialization(_) => ErrorKind::IoFailure,
            Self::CorruptCatalog { .. } => ErrorKind::CorruptCatalog,
        }
    }

    /// Shorthand for `kind() == ErrorKind::NotFound`
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}
