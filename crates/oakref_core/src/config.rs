//! File-based configuration.
//!
//! ```toml
//! database_path = "oaks.db"
//! schema_path = "schema.json"
//!
//! [logging]
//! level = "info"
//! dir = "/var/log/oakref"
//! ```
//!
//! Relative paths resolve against the config file's directory.

use crate::logging::default_log_level;
use serde::Deserialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

/// Core runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CoreConfig {
    pub database_path: PathBuf,
    /// Schema document file; the built-in schema is used when absent.
    #[serde(default)]
    pub schema_path: Option<PathBuf>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    #[serde(default)]
    pub level: Option<String>,
    /// File logging is disabled when absent.
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

impl LoggingConfig {
    pub fn level_or_default(&self) -> &str {
        self.level.as_deref().unwrap_or(default_log_level())
    }
}

/// Config loading failure.
#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, error: std::io::Error },
    Parse { path: PathBuf, error: toml::de::Error },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, error } => {
                write!(f, "cannot read config `{}`: {error}", path.display())
            }
            Self::Parse { path, error } => {
                write!(f, "invalid config `{}`: {error}", path.display())
            }
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { error, .. } => Some(error),
            Self::Parse { error, .. } => Some(error),
        }
    }
}

/// Reads and parses a TOML config file.
pub fn load_config(path: impl AsRef<Path>) -> Result<CoreConfig, ConfigError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|error| ConfigError::Io {
        path: path.to_path_buf(),
        error,
    })?;
    let base = path.parent().unwrap_or_else(|| Path::new(""));
    parse_config(&text, base).map_err(|error| ConfigError::Parse {
        path: path.to_path_buf(),
        error,
    })
}

/// Parses config text, resolving relative paths against `base`.
pub fn parse_config(text: &str, base: &Path) -> Result<CoreConfig, toml::de::Error> {
    let mut config: CoreConfig = toml::from_str(text)?;
    config.database_path = resolve(base, &config.database_path);
    config.schema_path = config.schema_path.map(|path| resolve(base, &path));
    config.logging.dir = config.logging.dir.map(|path| resolve(base, &path));
    Ok(config)
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}
