//! Store configuration
//!
//! Settings applied when a [`GraphStore`](crate::GraphStore) opens its
//! connection. Can be built in code or read from a TOML file.

use crate::error::{GraphError, GraphResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default name of the database file inside the storage folder
pub const DEFAULT_DATABASE_FILE: &str = "graph.duckdb";

/// Graph store configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Log every SQL statement under the `duckgraph::sql` target
    pub debug_sql: bool,
    /// Engine memory limit, e.g. `"2GB"`
    pub memory_limit: Option<String>,
    /// Engine worker threads
    pub threads: Option<u32>,
    /// Rows fetched per page by traversal sequences
    pub page_size: usize,
    /// Buffered rows that trigger a flush in batch mode
    pub batch_flush_threshold: usize,
    /// File name of the database inside the storage folder
    pub database_file: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            debug_sql: false,
            memory_limit: None,
            threads: None,
            page_size: 256,
            batch_flush_threshold: 10_000,
            database_file: DEFAULT_DATABASE_FILE.to_string(),
        }
    }
}

impl StoreConfig {
    /// Create a configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a configuration from TOML text
    pub fn from_toml_str(text: &str) -> GraphResult<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read a configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> GraphResult<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    pub fn with_debug_sql(mut self, enabled: bool) -> Self {
        self.debug_sql = enabled;
        self
    }

    pub fn with_memory_limit(mut self, limit: impl Into<String>) -> Self {
        self.memory_limit = Some(limit.into());
        self
    }

    pub fn with_threads(mut self, threads: u32) -> Self {
        self.threads = Some(threads);
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_batch_flush_threshold(mut self, threshold: usize) -> Self {
        self.batch_flush_threshold = threshold;
        self
    }

    pub fn with_database_file(mut self, name: impl Into<String>) -> Self {
        self.database_file = name.into();
        self
    }

    /// Reject settings the store cannot run with
    pub fn validate(&self) -> GraphResult<()> {
        if self.page_size == 0 {
            return Err(GraphError::Config("page_size must be at least 1".into()));
        }
        if self.batch_flush_threshold == 0 {
            return Err(GraphError::Config(
                "batch_flush_threshold must be at least 1".into(),
            ));
        }
        if self.database_file.trim().is_empty() {
            return Err(GraphError::Config("database_file must not be empty".into()));
        }
        if self.threads == Some(0) {
            return Err(GraphError::Config("threads must be at least 1".into()));
        }
        Ok(())
    }

    /// Engine `SET` statements derived from this configuration
    pub(crate) fn engine_settings(&self) -> Vec<String> {
        let mut settings = Vec::new();
        if let Some(limit) = &self.memory_limit {
            settings.push(format!("SET memory_limit = '{}';", limit.replace('\'', "''")));
        }
        if let Some(threads) = self.threads {
            settings.push(format!("SET threads = {};", threads));
        }
        settings
    }
}
