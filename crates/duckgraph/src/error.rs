//! Error types for the DuckDB graph store

use thiserror::Error;

/// Graph store error type
#[derive(Error, Debug)]
pub enum GraphError {
    /// Database connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Schema creation error
    #[error("Schema error: {0}")]
    Schema(String),

    /// The store on disk was created with a different schema layout
    #[error("Incompatible schema: found version {found:?}, expected {expected}")]
    IncompatibleSchema {
        /// Recorded version, if any record was found
        found: Option<i32>,
        /// Version this build writes
        expected: i32,
    },

    /// Invalid store configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// A property value could not be encoded or decoded
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// A property could not be written while creating an element
    #[error("Failed to write property '{name}' on element {element}: {source}")]
    PropertyWrite {
        element: i64,
        name: String,
        #[source]
        source: Box<GraphError>,
    },

    /// Several properties could not be written while creating an element
    #[error("Failed to write {} properties on element {element}", .failures.len())]
    PropertyWrites {
        element: i64,
        /// One [`GraphError::PropertyWrite`] per failed property
        failures: Vec<GraphError>,
    },

    /// Invalid operation
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// Functionality owned by the indexing layer, not by this store
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Filesystem error on the storage folder
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Underlying duckdb error
    #[error("DuckDB error: {0}")]
    DuckDb(#[from] duckdb::Error),
}

/// Result type for graph store operations
pub type GraphResult<T> = Result<T, GraphError>;

impl From<serde_json::Error> for GraphError {
    fn from(err: serde_json::Error) -> Self {
        Self::Encoding(err.to_string())
    }
}

impl From<hex::FromHexError> for GraphError {
    fn from(err: hex::FromHexError) -> Self {
        Self::Encoding(format!("invalid blob encoding: {}", err))
    }
}

impl From<toml::de::Error> for GraphError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(err.to_string())
    }
}

impl GraphError {
    /// Whether this error came from the property codec rather than the engine
    pub fn is_encoding(&self) -> bool {
        match self {
            Self::Encoding(_) => true,
            Self::PropertyWrite { source, .. } => source.is_encoding(),
            Self::PropertyWrites { failures, .. } => failures.iter().any(Self::is_encoding),
            _ => false,
        }
    }
}
