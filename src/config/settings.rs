//! TOML-based configuration for queryshape.
//!
//! Example configuration:
//! ```toml
//! [sql]
//! dialect = "sqlite"
//! parser_dialect = "generic"
//!
//! [odata]
//! count_on_paging = true
//! max_expand_depth = 8
//! ```

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::sql::{Dialect, SqlFormatter, SqlParser};

/// Error type for settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    pub sql: SqlSettings,
    pub odata: ODataSettings,
}

/// SQL output and input dialects.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SqlSettings {
    /// Dialect the formatter writes.
    pub dialect: Dialect,

    /// Grammar used to read SQL text.
    pub parser_dialect: Dialect,
}

impl SqlSettings {
    pub fn formatter(&self) -> SqlFormatter<'static> {
        SqlFormatter::for_dialect(self.dialect)
    }

    pub fn parser(&self) -> SqlParser {
        SqlParser::for_dialect(self.parser_dialect)
    }
}

/// OData output and expand limits.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ODataSettings {
    /// Emit `$count=true` whenever `$top` is emitted.
    pub count_on_paging: bool,

    /// Nested `$expand` levels the parser accepts.
    pub max_expand_depth: usize,
}

impl Default for ODataSettings {
    fn default() -> Self {
        Self {
            count_on_paging: true,
            max_expand_depth: 8,
        }
    }
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SettingsError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, SettingsError> {
        Ok(toml::from_str(content)?)
    }

    /// Load settings from the default config file locations.
    ///
    /// Searches in order:
    /// 1. Environment variable `QUERYSHAPE_CONFIG`
    /// 2. `./queryshape.toml`
    pub fn load() -> Result<Self, SettingsError> {
        if let Ok(path) = env::var("QUERYSHAPE_CONFIG") {
            return Self::from_file(&path);
        }

        let local_config = PathBuf::from("queryshape.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        Ok(Settings::default())
    }
}
