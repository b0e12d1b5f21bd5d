//! Store configuration, loadable from TOML.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config value: {0}")]
    Invalid(String),
}

/// Top-level configuration for both stores and the analytics defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StoreConfig {
    pub columnar: ColumnarConfig,
    pub relational: RelationalConfig,
    pub analytics: AnalyticsConfig,
}

impl StoreConfig {
    /// Load from a TOML file. Missing sections and keys take defaults; a
    /// missing file is an error.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: StoreConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.columnar.max_rows_per_file == 0 {
            return Err(ConfigError::Invalid(
                "columnar.max_rows_per_file must be >= 1".into(),
            ));
        }
        if self.analytics.default_window == 0 {
            return Err(ConfigError::Invalid(
                "analytics.default_window must be >= 1".into(),
            ));
        }
        Ok(())
    }
}

/// Parquet compression codec for partition files.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    #[default]
    Snappy,
    Zstd,
    Lz4,
    Uncompressed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ColumnarConfig {
    /// Root directory of the partitioned dataset.
    pub root: PathBuf,
    pub compression: Compression,
    /// Partitions with more rows are split across several files.
    pub max_rows_per_file: usize,
}

impl Default for ColumnarConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("market_data"),
            compression: Compression::Snappy,
            max_rows_per_file: 1_000_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RelationalConfig {
    pub db_path: PathBuf,
    /// DDL file; the bundled schema is used when absent.
    pub schema_path: Option<PathBuf>,
}

impl Default for RelationalConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("market_data.db"),
            schema_path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AnalyticsConfig {
    pub default_window: usize,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self { default_window: 5 }
    }
}
