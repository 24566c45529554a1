//! Run parameters: the period key and the shared store's connection settings.

use std::fmt;
use std::str::FromStr;

use crate::error::{PipelineError, Result};

/// Period used when a run is invoked without one.
pub const DEFAULT_PERIOD: u8 = 6;

/// Calendar-month period key, always in `1..=12`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Period(u8);

impl Period {
    pub fn new(month: u8) -> Result<Self> {
        if (1..=12).contains(&month) {
            Ok(Self(month))
        } else {
            Err(PipelineError::Config(format!(
                "period must be between 1 and 12, got {month}"
            )))
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }

    /// Name of the store table holding this period's ratings.
    pub fn table_name(self) -> String {
        format!("ratings_month_{}", self.0)
    }

    /// File name of the published artifact for this period.
    pub fn artifact_file_name(self) -> String {
        format!("aggregated_ratings_month_{}.csv", self.0)
    }
}

impl Default for Period {
    fn default() -> Self {
        Self(DEFAULT_PERIOD)
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Period {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        let month = s
            .trim()
            .parse::<u8>()
            .map_err(|_| PipelineError::Config(format!("invalid period '{s}'")))?;
        Period::new(month)
    }
}

/// Connection settings for the shared ratings store.
///
/// Read once at process start and handed explicitly to the store adapters.
#[derive(Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            host: "storage-db".to_string(),
            port: 5432,
            database: "ratings".to_string(),
            user: "postgres".to_string(),
            password: "postgres".to_string(),
        }
    }
}

impl fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl StoreConfig {
    /// Loads `DB_HOST`, `DB_PORT`, `DB_NAME`, `DB_USER` and `DB_PASSWORD`,
    /// falling back to the defaults for unset variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let port = match lookup("DB_PORT") {
            Some(raw) => raw
                .trim()
                .parse::<u16>()
                .map_err(|e| PipelineError::Config(format!("invalid DB_PORT '{raw}': {e}")))?,
            None => defaults.port,
        };

        Ok(Self {
            host: lookup("DB_HOST").unwrap_or(defaults.host),
            port,
            database: lookup("DB_NAME").unwrap_or(defaults.database),
            user: lookup("DB_USER").unwrap_or(defaults.user),
            password: lookup("DB_PASSWORD").unwrap_or(defaults.password),
        })
    }
}
