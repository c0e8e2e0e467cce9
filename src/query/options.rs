//! Cursor options and their file-backed configuration profiles.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default chunk size for [`super::RangeCursorWrapper`].
pub const DEFAULT_RANGE_STEP: i64 = 1_000;

/// Environment variable naming the configuration file used by [`CursorConfig::load`].
pub const CONFIG_ENV: &str = "DBUTILS_CONFIG";

/// Options accepted by the chunking cursors.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CursorOptions {
    /// Rows (or key units) per chunk; a negative step walks keys in descending order.
    pub step: i64,
    /// Maximum number of rows to yield.
    pub limit: Option<usize>,
    /// Inclusive lower key bound; computed with MIN() when absent.
    pub min_id: Option<i64>,
    /// Inclusive upper key bound; computed with MAX() when absent.
    pub max_id: Option<i64>,
    /// Forces an explicit ORDER BY on the key. `None` means sorted.
    pub sorted: Option<bool>,
    /// Relations attached to every chunk; `"author.profile"` also eager-loads
    /// `profile` on the fetched authors.
    pub select_related: Vec<String>,
}

impl Default for CursorOptions {
    fn default() -> Self {
        Self {
            step: DEFAULT_RANGE_STEP,
            limit: None,
            min_id: None,
            max_id: None,
            sorted: None,
            select_related: Vec::new(),
        }
    }
}

impl CursorOptions {
    /// Large unsorted windows for bulk exports.
    pub fn batch() -> Self {
        Self {
            step: 10_000,
            sorted: Some(false),
            ..Self::default()
        }
    }

    /// Key-ordered chunks of the default size.
    pub fn ordered() -> Self {
        Self {
            sorted: Some(true),
            ..Self::default()
        }
    }

    /// Sets the chunk size.
    pub fn step(mut self, step: i64) -> Self {
        self.step = step;
        self
    }

    /// Caps the number of yielded rows.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Sets the inclusive lower key bound.
    pub fn min_id(mut self, min_id: i64) -> Self {
        self.min_id = Some(min_id);
        self
    }

    /// Sets the inclusive upper key bound.
    pub fn max_id(mut self, max_id: i64) -> Self {
        self.max_id = Some(max_id);
        self
    }

    /// Forces or disables explicit key ordering.
    pub fn sorted(mut self, sorted: bool) -> Self {
        self.sorted = Some(sorted);
        self
    }

    /// Adds a relation to attach on every chunk.
    pub fn select_related(mut self, relation: impl Into<String>) -> Self {
        self.select_related.push(relation.into());
        self
    }

    /// Whether chunks get an explicit key ordering. Without an explicit
    /// `max_id` ordering is always applied.
    pub fn effective_sorted(&self) -> bool {
        self.sorted.unwrap_or(true) || self.max_id.is_none()
    }
}

/// Named cursor option profiles loaded from TOML or JSON.
///
/// ```toml
/// [cursor]
/// step = 500
///
/// [profiles.export]
/// step = 10000
/// sorted = false
/// select_related = ["author"]
/// ```
#[derive(Debug, Default)]
pub struct CursorConfig {
    path: Option<PathBuf>,
    data: RawConfig,
}

impl CursorConfig {
    /// Loads the configuration from `explicit`, falling back to the file named
    /// by `DBUTILS_CONFIG`. A missing file yields the defaults.
    pub fn load(explicit: Option<PathBuf>) -> Result<Self, ConfigError> {
        let path = explicit.or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));
        let data = match path.as_ref() {
            Some(config_path) if config_path.exists() => read_file(config_path)?,
            _ => RawConfig::default(),
        };
        let config = Self { path, data };
        config.validate()?;
        Ok(config)
    }

    /// Parses a TOML document.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let data = toml::from_str(contents).map_err(|source| ConfigError::Toml { source })?;
        let config = Self { path: None, data };
        config.validate()?;
        Ok(config)
    }

    /// Reads the configuration from a JSON value, as handed over by bindings.
    pub fn from_json(value: serde_json::Value) -> Result<Self, ConfigError> {
        let data = serde_json::from_value(value).map_err(|source| ConfigError::Json { source })?;
        let config = Self { path: None, data };
        config.validate()?;
        Ok(config)
    }

    /// File the configuration was read from, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Names of the configured profiles.
    pub fn profiles(&self) -> impl Iterator<Item = &str> {
        self.data.profiles.keys().map(String::as_str)
    }

    /// Resolves the options for `profile`, layered over the `[cursor]` defaults.
    pub fn options(&self, profile: Option<&str>) -> Result<CursorOptions, ConfigError> {
        let base = self.data.cursor.clone();
        let Some(name) = profile else {
            return Ok(base);
        };
        let raw = self
            .data
            .profiles
            .get(name)
            .ok_or_else(|| ConfigError::ProfileNotFound {
                name: name.to_string(),
            })?;
        Ok(raw.overlay(base))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.data.cursor.step == 0 {
            return Err(ConfigError::InvalidStep {
                profile: "cursor".to_string(),
            });
        }
        for (name, raw) in &self.data.profiles {
            if raw.step == Some(0) {
                return Err(ConfigError::InvalidStep {
                    profile: name.clone(),
                });
            }
        }
        Ok(())
    }
}

fn read_file(path: &Path) -> Result<RawConfig, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct RawConfig {
    #[serde(default)]
    cursor: CursorOptions,
    #[serde(default)]
    profiles: HashMap<String, RawProfile>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
struct RawProfile {
    step: Option<i64>,
    limit: Option<usize>,
    min_id: Option<i64>,
    max_id: Option<i64>,
    sorted: Option<bool>,
    select_related: Option<Vec<String>>,
}

impl RawProfile {
    fn overlay(&self, mut base: CursorOptions) -> CursorOptions {
        if let Some(step) = self.step {
            base.step = step;
        }
        if let Some(limit) = self.limit {
            base.limit = Some(limit);
        }
        if let Some(min_id) = self.min_id {
            base.min_id = Some(min_id);
        }
        if let Some(max_id) = self.max_id {
            base.max_id = Some(max_id);
        }
        if let Some(sorted) = self.sorted {
            base.sorted = Some(sorted);
        }
        if let Some(related) = &self.select_related {
            base.select_related = related.clone();
        }
        base
    }
}

/// Errors raised while loading cursor configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read cursor config {path}: {source}")]
    Read {
        /// File that failed to load.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// The configuration file is not valid TOML for this schema.
    #[error("failed to parse cursor config {path}: {source}")]
    Parse {
        /// File that failed to parse.
        path: PathBuf,
        /// Underlying TOML error.
        source: toml::de::Error,
    },
    /// An in-memory TOML document failed to parse.
    #[error("failed to parse cursor config: {source}")]
    Toml {
        /// Underlying TOML error.
        source: toml::de::Error,
    },
    /// A JSON configuration value failed to deserialize.
    #[error("failed to decode cursor config: {source}")]
    Json {
        /// Underlying JSON error.
        source: serde_json::Error,
    },
    /// The requested profile does not exist.
    #[error("cursor profile '{name}' not found")]
    ProfileNotFound {
        /// Requested profile.
        name: String,
    },
    /// A profile configured a zero step.
    #[error("cursor profile '{profile}' must use a non-zero step")]
    InvalidStep {
        /// Offending profile (`cursor` for the defaults).
        profile: String,
    },
}
